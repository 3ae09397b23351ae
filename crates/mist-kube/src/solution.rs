//! Solution manifests: where each service runs, as Kubernetes objects.
//!
//! Every service with at least one placed request gets a Deployment with
//! one replica per distinct hosting node, kept on those nodes by a
//! required hostname affinity, and a NodePort Service in front of it.

use serde_json::{Value, json};
use tracing::debug;

use mist_placement::SolutionTable;

use crate::error::{KubeError, KubeResult};
use crate::manifest::{
    ContainerSpecs, ServiceLabels, ServicePorts, containers_for, hostname_affinity, labels,
};

const MIST_TYPE: &str = "service";

/// Deployment and Service manifests for every placed service.
pub fn solution_manifests(
    table: &SolutionTable,
    container_specs: &ContainerSpecs,
    service_ports: &ServicePorts,
    service_labels: &ServiceLabels,
) -> KubeResult<Vec<Value>> {
    let mut manifests = Vec::new();

    for service in table.services() {
        let nodes = table.nodes_for(service);
        let containers = containers_for(container_specs, service)?;
        let port = service_ports
            .get(service)
            .copied()
            .ok_or_else(|| KubeError::MissingPort(service.to_string()))?;

        let app = format!("{service}-app");
        let selector = labels(&app, MIST_TYPE);
        let mut deployment_labels = selector.clone();
        if let Some(extra) = service_labels.get(service) {
            for (key, value) in extra {
                deployment_labels
                    .entry(key.clone())
                    .or_insert_with(|| Value::String(value.clone()));
            }
        }

        debug!(service, replicas = nodes.len(), port, "service manifests");

        manifests.push(json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {
                "name": format!("{service}-deployment"),
                "labels": deployment_labels,
            },
            "spec": {
                "replicas": nodes.len(),
                "selector": { "matchLabels": selector },
                "template": {
                    "metadata": { "labels": selector },
                    "spec": {
                        "affinity": hostname_affinity(nodes.iter().copied()),
                        "containers": containers,
                    }
                }
            }
        }));

        manifests.push(json!({
            "apiVersion": "v1",
            "kind": "Service",
            "metadata": {
                "name": format!("{service}-service"),
                "labels": { "mist-type": MIST_TYPE },
            },
            "spec": {
                "type": "NodePort",
                "selector": { "app": app },
                "ports": [{
                    "protocol": "TCP",
                    "name": format!("{service}-service-port"),
                    "port": port,
                    "targetPort": port,
                }]
            }
        }));
    }

    Ok(manifests)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mist_placement::Assignment;
    use std::collections::BTreeMap;

    fn make_row(request: &str, service: &str, node: &str) -> Assignment {
        Assignment {
            request: request.into(),
            requestor: "edge-0".into(),
            service: service.into(),
            node: node.into(),
        }
    }

    fn make_specs() -> (ContainerSpecs, ServicePorts) {
        let mut specs = ContainerSpecs::new();
        specs.insert("web".into(), vec![json!({"name": "web", "image": "nginx:1.27"})]);
        specs.insert("db".into(), vec![json!({"name": "db", "image": "redis:7"})]);
        let ports = ServicePorts::from([("web".to_string(), 8080), ("db".to_string(), 6379)]);
        (specs, ports)
    }

    #[test]
    fn one_replica_per_distinct_node() {
        let table = SolutionTable::new(vec![
            make_row("r1", "web", "edge-1"),
            make_row("r2", "web", "edge-1"),
            make_row("r3", "web", "edge-2"),
            make_row("r4", "db", "edge-2"),
        ]);
        let (specs, ports) = make_specs();
        let manifests =
            solution_manifests(&table, &specs, &ports, &ServiceLabels::new()).unwrap();

        // db first: services are visited in name order.
        assert_eq!(manifests.len(), 4);
        let web = &manifests[2];
        assert_eq!(web["kind"], "Deployment");
        assert_eq!(web["metadata"]["name"], "web-deployment");
        assert_eq!(web["spec"]["replicas"], 2);
        let terms = &web["spec"]["template"]["spec"]["affinity"]["nodeAffinity"]
            ["requiredDuringSchedulingIgnoredDuringExecution"]["nodeSelectorTerms"];
        assert_eq!(terms.as_array().unwrap().len(), 2);
        assert_eq!(web["spec"]["template"]["spec"]["containers"][0]["image"], "nginx:1.27");
        assert_eq!(web["spec"]["selector"]["matchLabels"]["app"], "web-app");
        assert_eq!(web["spec"]["selector"]["matchLabels"]["mist-type"], "service");
    }

    #[test]
    fn service_exposes_node_port() {
        let table = SolutionTable::new(vec![make_row("r1", "web", "edge-1")]);
        let (specs, ports) = make_specs();
        let manifests =
            solution_manifests(&table, &specs, &ports, &ServiceLabels::new()).unwrap();

        let svc = &manifests[1];
        assert_eq!(svc["kind"], "Service");
        assert_eq!(svc["metadata"]["name"], "web-service");
        assert_eq!(svc["spec"]["type"], "NodePort");
        assert_eq!(svc["spec"]["selector"]["app"], "web-app");
        assert_eq!(svc["spec"]["ports"][0]["port"], 8080);
        assert_eq!(svc["spec"]["ports"][0]["targetPort"], 8080);
        assert_eq!(svc["spec"]["ports"][0]["protocol"], "TCP");
    }

    #[test]
    fn extra_labels_never_override_selector_labels() {
        let table = SolutionTable::new(vec![make_row("r1", "web", "edge-1")]);
        let (specs, ports) = make_specs();
        let extra = ServiceLabels::from([(
            "web".to_string(),
            BTreeMap::from([
                ("tier".to_string(), "frontend".to_string()),
                ("app".to_string(), "hijack".to_string()),
            ]),
        )]);
        let manifests = solution_manifests(&table, &specs, &ports, &extra).unwrap();

        let meta_labels = &manifests[0]["metadata"]["labels"];
        assert_eq!(meta_labels["tier"], "frontend");
        assert_eq!(meta_labels["app"], "web-app");
    }

    #[test]
    fn missing_port_is_an_error() {
        let table = SolutionTable::new(vec![make_row("r1", "web", "edge-1")]);
        let (specs, _) = make_specs();
        let err = solution_manifests(&table, &specs, &ServicePorts::new(), &ServiceLabels::new())
            .unwrap_err();
        assert!(matches!(err, KubeError::MissingPort(s) if s == "web"));
    }

    #[test]
    fn empty_solution_yields_no_manifests() {
        let (specs, ports) = make_specs();
        let manifests = solution_manifests(
            &SolutionTable::default(),
            &specs,
            &ports,
            &ServiceLabels::new(),
        )
        .unwrap();
        assert!(manifests.is_empty());
    }
}
