//! Building blocks shared by both generators.

use std::collections::BTreeMap;

use serde_json::{Map, Value, json};

use mist_core::ServiceId;

use crate::error::{KubeError, KubeResult};

/// Container definitions per service, as they appear under
/// `spec.template.spec.containers`.
pub type ContainerSpecs = BTreeMap<ServiceId, Vec<Value>>;

/// Exposed TCP port per service.
pub type ServicePorts = BTreeMap<ServiceId, u16>;

/// Extra Deployment labels per service.
pub type ServiceLabels = BTreeMap<ServiceId, BTreeMap<String, String>>;

/// Label key that tells Mist-generated objects apart.
pub const MIST_TYPE_LABEL: &str = "mist-type";

/// Node label matched by the affinity rules.
pub const HOSTNAME_LABEL: &str = "kubernetes.io/hostname";

/// Wrap manifests in a `v1 List`.
pub fn manifest_list(items: Vec<Value>) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "List",
        "items": items,
    })
}

/// `app` plus `mist-type` labels.
pub(crate) fn labels(app: &str, mist_type: &str) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("app".into(), Value::String(app.to_string()));
    map.insert(MIST_TYPE_LABEL.into(), Value::String(mist_type.to_string()));
    map
}

/// Required node affinity: any one of `nodes`, by hostname.
pub(crate) fn hostname_affinity<'a>(nodes: impl IntoIterator<Item = &'a str>) -> Value {
    let terms: Vec<Value> = nodes
        .into_iter()
        .map(|node| {
            json!({
                "matchExpressions": [{
                    "key": HOSTNAME_LABEL,
                    "operator": "In",
                    "values": [node],
                }]
            })
        })
        .collect();
    json!({
        "nodeAffinity": {
            "requiredDuringSchedulingIgnoredDuringExecution": {
                "nodeSelectorTerms": terms,
            }
        }
    })
}

/// Look up the containers of `service`.
pub(crate) fn containers_for<'a>(
    specs: &'a ContainerSpecs,
    service: &str,
) -> KubeResult<&'a [Value]> {
    specs
        .get(service)
        .map(Vec::as_slice)
        .ok_or_else(|| KubeError::MissingContainers(service.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_wraps_items() {
        let list = manifest_list(vec![json!({"kind": "Service"})]);
        assert_eq!(list["apiVersion"], "v1");
        assert_eq!(list["kind"], "List");
        assert_eq!(list["items"][0]["kind"], "Service");
    }

    #[test]
    fn affinity_has_one_term_per_node() {
        let affinity = hostname_affinity(["edge-1", "edge-2"]);
        let terms = &affinity["nodeAffinity"]["requiredDuringSchedulingIgnoredDuringExecution"]
            ["nodeSelectorTerms"];
        assert_eq!(terms.as_array().unwrap().len(), 2);
        let expr = &terms[1]["matchExpressions"][0];
        assert_eq!(expr["key"], HOSTNAME_LABEL);
        assert_eq!(expr["operator"], "In");
        assert_eq!(expr["values"], json!(["edge-2"]));
    }

    #[test]
    fn missing_containers_is_an_error() {
        let specs = ContainerSpecs::new();
        assert!(matches!(
            containers_for(&specs, "web"),
            Err(KubeError::MissingContainers(s)) if s == "web"
        ));
    }
}
