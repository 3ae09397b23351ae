//! From a solved placement to an applicable manifest list.

use std::collections::BTreeMap;

use serde_json::json;

use mist_core::*;
use mist_kube::{ContainerSpecs, ServiceLabels, ServicePorts, manifest_list, solution_manifests};
use mist_placement::PlacementOptimizer;

fn scenario() -> Scenario {
    let node = |owner: &str| Node {
        id: String::new(),
        ram: 4.0,
        cpu: 4.0,
        storage: 4.0,
        owner: owner.to_string(),
        location: BTreeMap::new(),
        latency: BTreeMap::new(),
        metadata: Metadata::new(),
    };
    let mut scenario = Scenario::default();
    scenario.nodes.insert("edge-1".into(), node("alice"));
    scenario.nodes.insert("edge-2".into(), node("bob"));
    scenario.services.insert(
        "web".into(),
        Service {
            id: String::new(),
            developer: "carol".into(),
            ram: 1.0,
            cpu: 1.0,
            storage: 1.0,
            metadata: Metadata::new(),
        },
    );
    for (id, requestor) in [("r1", "edge-1"), ("r2", "edge-2")] {
        scenario.requests.insert(
            id.into(),
            Request {
                id: String::new(),
                node: requestor.into(),
                service: "web".into(),
                metadata: Metadata::new(),
            },
        );
    }
    // Only bob's node may host web.
    let mut policy = ServicePolicy::new("web", "carol");
    policy.allowed_owners = Some(["bob".to_string()].into());
    scenario.service_policies.push(policy);
    scenario
}

#[test]
fn solved_placement_becomes_manifest_list() {
    let mut optimizer = PlacementOptimizer::new(scenario()).unwrap();
    optimizer.objective_average();
    assert!(optimizer.optimize());
    let table = optimizer.solution_table().unwrap();

    let specs = ContainerSpecs::from([(
        "web".to_string(),
        vec![json!({"name": "web", "image": "nginx:1.27"})],
    )]);
    let ports = ServicePorts::from([("web".to_string(), 80)]);
    let manifests = solution_manifests(&table, &specs, &ports, &ServiceLabels::new()).unwrap();
    let list = manifest_list(manifests);

    let items = list["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    let deployment = &items[0];
    assert_eq!(deployment["spec"]["replicas"], 1);
    let values = &deployment["spec"]["template"]["spec"]["affinity"]["nodeAffinity"]
        ["requiredDuringSchedulingIgnoredDuringExecution"]["nodeSelectorTerms"][0]
        ["matchExpressions"][0]["values"];
    assert_eq!(values, &json!(["edge-2"]));
    assert_eq!(items[1]["kind"], "Service");
}
