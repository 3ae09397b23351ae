use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use tracing::info;

use mist_core::scenario::read_document;
use mist_core::{Scenario, ScenarioPaths};
use mist_kube::{ContainerSpecs, ServiceLabels, ServicePorts, manifest_list, solution_manifests};
use mist_placement::{Objective, PlacementOptimizer};

/// Optional files written by `mist optimize`.
#[derive(Debug, Default)]
pub struct Outputs {
    pub debug_lp: Option<PathBuf>,
    pub csv: Option<PathBuf>,
    pub manifests: Option<PathBuf>,
    pub container_specs: Option<PathBuf>,
    pub ports: Option<PathBuf>,
    pub service_labels: Option<PathBuf>,
}

pub fn optimize(paths: &ScenarioPaths, objective: Objective, outputs: &Outputs) -> anyhow::Result<()> {
    let scenario = Scenario::load(paths)?;
    let mut optimizer = PlacementOptimizer::new(scenario)?;
    optimizer.select_objective(objective);

    if let Some(path) = &outputs.debug_lp {
        optimizer
            .write_lp(path)
            .with_context(|| format!("failed to write {}", path.display()))?;
        info!(path = %path.display(), "model written");
    }

    if !optimizer.optimize() {
        let verdict = optimizer
            .verdict()
            .map(|v| v.label())
            .unwrap_or("NOT SOLVED");
        bail!("no placement found ({verdict})");
    }
    let Some(table) = optimizer.solution_table() else {
        bail!("solver reported success without a solution");
    };

    if let Some(objective) = optimizer.objective_value() {
        println!("objective: {objective:.4}");
    }
    for row in table.rows() {
        println!("{} ({} → {}) on {}", row.request, row.requestor, row.service, row.node);
    }

    if let Some(path) = &outputs.csv {
        std::fs::write(path, table.to_csv())
            .with_context(|| format!("failed to write {}", path.display()))?;
        println!("✓ Wrote {}", path.display());
    }

    if let Some(path) = &outputs.manifests {
        let (Some(specs), Some(ports)) = (&outputs.container_specs, &outputs.ports) else {
            bail!("--manifests needs --container-specs and --ports");
        };
        let specs: ContainerSpecs = read_document(specs)?;
        let ports: ServicePorts = read_document(ports)?;
        let labels: ServiceLabels = match &outputs.service_labels {
            Some(path) => read_document(path)?,
            None => ServiceLabels::new(),
        };
        let items = solution_manifests(&table, &specs, &ports, &labels)?;
        write_list(path, items)?;
        println!("✓ Wrote {}", path.display());
    }

    Ok(())
}

pub(crate) fn write_list(path: &Path, items: Vec<serde_json::Value>) -> anyhow::Result<()> {
    let list = manifest_list(items);
    std::fs::write(path, serde_json::to_string_pretty(&list)?)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(dir: &Path, name: &str, content: &str) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, content).unwrap();
        path
    }

    fn scenario(dir: &Path) -> ScenarioPaths {
        ScenarioPaths {
            nodes: write(
                dir,
                "nodes.toml",
                r#"
[edge-1]
ram = 4
cpu = 4
storage = 4
owner = "alice"
"#,
            ),
            services: write(
                dir,
                "services.json",
                r#"{"web": {"developer": "carol", "ram": 1, "cpu": 1, "storage": 1}}"#,
            ),
            requests: Some(write(
                dir,
                "requests.json",
                r#"{"r1": {"node": "edge-1", "service": "web"}}"#,
            )),
            ..Default::default()
        }
    }

    #[test]
    fn writes_csv_lp_and_manifests() {
        let dir = tempfile::tempdir().unwrap();
        let paths = scenario(dir.path());
        let outputs = Outputs {
            debug_lp: Some(dir.path().join("model.lp")),
            csv: Some(dir.path().join("solution.csv")),
            manifests: Some(dir.path().join("manifests.json")),
            container_specs: Some(write(
                dir.path(),
                "containers.json",
                r#"{"web": [{"name": "web", "image": "nginx:1.27"}]}"#,
            )),
            ports: Some(write(dir.path(), "ports.toml", "web = 8080\n")),
            service_labels: None,
        };

        optimize(&paths, Objective::Average, &outputs).unwrap();

        let csv = std::fs::read_to_string(dir.path().join("solution.csv")).unwrap();
        assert_eq!(csv.lines().nth(1), Some("r1,edge-1,web,edge-1"));
        let lp = std::fs::read_to_string(dir.path().join("model.lp")).unwrap();
        assert!(lp.contains("z_r1_edge-1"));
        let list: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.path().join("manifests.json")).unwrap())
                .unwrap();
        assert_eq!(list["kind"], "List");
        assert_eq!(list["items"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn edge_lab_demo_solves() {
        let demo = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/edge-lab");
        let paths = ScenarioPaths {
            nodes: demo.join("nodes.toml"),
            services: demo.join("services.toml"),
            requests: Some(demo.join("requests.toml")),
            resource_policies: Some(demo.join("resource_policies.toml")),
            service_policies: Some(demo.join("service_policies.toml")),
        };
        let dir = tempfile::tempdir().unwrap();
        let outputs = Outputs {
            csv: Some(dir.path().join("solution.csv")),
            manifests: Some(dir.path().join("manifests.json")),
            container_specs: Some(demo.join("containers.json")),
            ports: Some(demo.join("ports.toml")),
            ..Default::default()
        };

        optimize(&paths, Objective::MinMax, &outputs).unwrap();

        // Gateway CPU is capped below both services together; the
        // archiver cannot run on the jetson or the cameras.
        let csv = std::fs::read_to_string(dir.path().join("solution.csv")).unwrap();
        assert!(csv.contains("north-detect,cam-north,detector,jetson"));
        assert!(csv.contains("south-detect,cam-south,detector,jetson"));
        assert!(csv.contains("south-archive,cam-south,archiver,gateway"));
    }

    #[test]
    fn infeasible_placement_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = scenario(dir.path());
        paths.resource_policies = Some(write(
            dir.path(),
            "resource_policies.json",
            r#"[{"node": "edge-1", "user": "alice", "max_ram": 10}]"#,
        ));

        let err = optimize(&paths, Objective::MinMax, &Outputs::default()).unwrap_err();
        assert!(err.to_string().contains("INFEASIBLE"));
    }
}
