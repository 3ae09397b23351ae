//! Request manifests: the requestor side of each request.
//!
//! A request becomes a single-replica Deployment pinned to its requestor
//! node. Every container gets its own PersistentVolumeClaim mounted at
//! [`PERSISTENT_MOUNT_PATH`].

use serde_json::{Value, json};
use tracing::debug;

use mist_core::Requests;

use crate::error::{KubeError, KubeResult};
use crate::manifest::{ContainerSpecs, containers_for, hostname_affinity, labels};

const MIST_TYPE: &str = "request";

pub const PERSISTENT_MOUNT_PATH: &str = "/persistent/";
pub const CLAIM_STORAGE_CLASS: &str = "standard";
pub const CLAIM_SIZE: &str = "1Gi";

/// Deployment and volume claims for every request.
pub fn request_manifests(
    requests: &Requests,
    request_specs: &ContainerSpecs,
) -> KubeResult<Vec<Value>> {
    let mut manifests = Vec::new();

    for (request_id, request) in requests {
        let base = containers_for(request_specs, &request.service)?;
        let app = format!("{}-request-app", request.service);
        let selector = labels(&app, MIST_TYPE);

        let mut containers = Vec::with_capacity(base.len());
        let mut volumes = Vec::with_capacity(base.len());
        for (idx, container) in base.iter().enumerate() {
            let volume = format!("{request_id}-{idx}-volume");
            let claim = format!("{request_id}-{idx}-claim");

            let mut container = container.clone();
            let fields = container
                .as_object_mut()
                .ok_or_else(|| KubeError::InvalidContainer {
                    owner: request_id.clone(),
                    index: idx,
                })?;
            fields.insert(
                "volumeMounts".into(),
                json!([{ "name": volume, "mountPath": PERSISTENT_MOUNT_PATH }]),
            );
            containers.push(container);
            volumes.push(json!({
                "name": volume,
                "persistentVolumeClaim": { "claimName": claim },
            }));

            manifests.push(json!({
                "apiVersion": "v1",
                "kind": "PersistentVolumeClaim",
                "metadata": { "name": claim, "labels": selector },
                "spec": {
                    "storageClassName": CLAIM_STORAGE_CLASS,
                    "accessModes": ["ReadWriteOnce"],
                    "resources": { "requests": { "storage": CLAIM_SIZE } },
                }
            }));
        }

        debug!(request = %request_id, node = %request.node, claims = containers.len(), "request manifests");

        manifests.push(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": format!("{request_id}-deployment"),
                "labels": selector,
            },
            "spec": {
                "replicas": 1,
                "selector": { "matchLabels": selector },
                "template": {
                    "metadata": { "labels": selector },
                    "spec": {
                        "affinity": hostname_affinity([request.node.as_str()]),
                        "containers": containers,
                        "volumes": volumes,
                    }
                }
            }
        }));
    }

    Ok(manifests)
}
