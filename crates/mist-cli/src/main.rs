use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mist_placement::Objective;

mod commands;

#[derive(Parser)]
#[command(
    name = "mist",
    about = "Mist — policy-aware service placement for edge and fog nodes",
    version,
    propagate_version = true,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Solve a placement problem and report where each request runs.
    ///
    /// Input documents are TOML or JSON, chosen by file extension.
    Optimize {
        #[arg(long)]
        nodes: PathBuf,
        #[arg(long)]
        services: PathBuf,
        #[arg(long)]
        requests: Option<PathBuf>,
        #[arg(long)]
        resource_policies: Option<PathBuf>,
        #[arg(long)]
        service_policies: Option<PathBuf>,
        /// Objective: avg or minmax
        #[arg(short, long, default_value = "avg")]
        objective: Objective,
        /// Write the model in LP format before solving
        #[arg(long)]
        debug_lp: Option<PathBuf>,
        /// Write the solution table as CSV
        #[arg(long)]
        csv: Option<PathBuf>,
        /// Write Deployment/Service manifests for the solution
        #[arg(long, requires_all = ["container_specs", "ports"])]
        manifests: Option<PathBuf>,
        /// Containers per service
        #[arg(long)]
        container_specs: Option<PathBuf>,
        /// Port per service
        #[arg(long)]
        ports: Option<PathBuf>,
        /// Extra Deployment labels per service
        #[arg(long)]
        service_labels: Option<PathBuf>,
    },
    /// Generate requestor-side Deployments and volume claims.
    Materialize {
        #[arg(long)]
        requests: PathBuf,
        /// Containers per requested service
        #[arg(long)]
        request_specs: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mist=info".parse()?)
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Optimize {
            nodes,
            services,
            requests,
            resource_policies,
            service_policies,
            objective,
            debug_lp,
            csv,
            manifests,
            container_specs,
            ports,
            service_labels,
        } => {
            let scenario = mist_core::ScenarioPaths {
                nodes,
                services,
                requests,
                resource_policies,
                service_policies,
            };
            let outputs = commands::optimize::Outputs {
                debug_lp,
                csv,
                manifests,
                container_specs,
                ports,
                service_labels,
            };
            commands::optimize::optimize(&scenario, objective, &outputs)
        }
        Commands::Materialize {
            requests,
            request_specs,
            output,
        } => commands::materialize::materialize(&requests, &request_specs, &output),
    }
}
