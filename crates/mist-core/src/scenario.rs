//! Scenario loading from TOML or JSON documents.
//!
//! Nodes, services and requests are documents keyed by identifier.
//! Policies are lists: a bare JSON array, or `[[policies]]` tables in
//! TOML (which has no top-level arrays). Requests and both policy
//! collections are optional.

use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::types::{Nodes, Requests, ResourcePolicy, ServicePolicy, Services};

/// Input files describing one placement problem.
#[derive(Debug, Clone, Default)]
pub struct ScenarioPaths {
    pub nodes: PathBuf,
    pub services: PathBuf,
    pub requests: Option<PathBuf>,
    pub resource_policies: Option<PathBuf>,
    pub service_policies: Option<PathBuf>,
}

/// Raw entity collections, as loaded. Not yet validated.
#[derive(Debug, Clone, Default)]
pub struct Scenario {
    pub nodes: Nodes,
    pub services: Services,
    pub requests: Requests,
    pub resource_policies: Vec<ResourcePolicy>,
    pub service_policies: Vec<ServicePolicy>,
}

#[derive(Deserialize)]
struct PolicyDocument<T> {
    #[serde(default = "Vec::new")]
    policies: Vec<T>,
}

impl Scenario {
    pub fn load(paths: &ScenarioPaths) -> anyhow::Result<Self> {
        let nodes: Nodes = read_document(&paths.nodes)?;
        let services: Services = read_document(&paths.services)?;
        let requests: Requests = match &paths.requests {
            Some(path) => read_document(path)?,
            None => Requests::new(),
        };
        let resource_policies = match &paths.resource_policies {
            Some(path) => read_policies(path)?,
            None => Vec::new(),
        };
        let service_policies = match &paths.service_policies {
            Some(path) => read_policies(path)?,
            None => Vec::new(),
        };

        debug!(
            nodes = nodes.len(),
            services = services.len(),
            requests = requests.len(),
            resource_policies = resource_policies.len(),
            service_policies = service_policies.len(),
            "scenario loaded"
        );

        Ok(Self {
            nodes,
            services,
            requests,
            resource_policies,
            service_policies,
        })
    }
}

/// Document encodings understood by the loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Toml,
    Json,
}

impl Format {
    pub fn from_path(path: &Path) -> anyhow::Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("toml") => Ok(Format::Toml),
            Some("json") => Ok(Format::Json),
            _ => bail!(
                "unsupported document format for {} (expected .toml or .json)",
                path.display()
            ),
        }
    }
}

/// Read a keyed document. An empty file yields the default value.
pub fn read_document<T>(path: &Path) -> anyhow::Result<T>
where
    T: DeserializeOwned + Default,
{
    let format = Format::from_path(path)?;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(T::default());
    }
    let parsed = match format {
        Format::Toml => toml::from_str(&content)
            .with_context(|| format!("invalid TOML in {}", path.display()))?,
        Format::Json => serde_json::from_str(&content)
            .with_context(|| format!("invalid JSON in {}", path.display()))?,
    };
    Ok(parsed)
}

/// Read a policy list.
pub fn read_policies<T: DeserializeOwned>(path: &Path) -> anyhow::Result<Vec<T>> {
    let format = Format::from_path(path)?;
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    let policies = match format {
        Format::Toml => {
            let doc: PolicyDocument<T> = toml::from_str(&content)
                .with_context(|| format!("invalid TOML in {}", path.display()))?;
            doc.policies
        }
        Format::Json => serde_json::from_str(&content)
            .with_context(|| format!("invalid JSON in {}", path.display()))?,
    };
    Ok(policies)
}
