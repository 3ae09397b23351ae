//! mist-kube — Kubernetes manifests for Mist placements.
//!
//! Two generators, both producing plain `serde_json::Value` objects:
//!
//! - [`solution_manifests`] turns a solved placement into one Deployment
//!   and one NodePort Service per placed service, pinned to the nodes the
//!   optimizer chose.
//! - [`request_manifests`] turns requests into requestor-side Deployments,
//!   one PersistentVolumeClaim per container.
//!
//! [`manifest_list`] wraps either output in a `v1 List` that `kubectl
//! apply -f` accepts as a single document.

pub mod error;
pub mod manifest;
pub mod request;
pub mod solution;

pub use error::{KubeError, KubeResult};
pub use manifest::{ContainerSpecs, ServiceLabels, ServicePorts, manifest_list};
pub use request::request_manifests;
pub use solution::solution_manifests;
