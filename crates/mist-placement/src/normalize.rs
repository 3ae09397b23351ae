//! Domain normalization — tag entities with their identifiers and keep
//! only the policies their authors are entitled to set.
//!
//! Policies are filtered into fresh collections by predicate. A policy
//! that fails its ownership check is dropped without error; a policy or
//! request that names an entity that does not exist aborts the build.

use tracing::{debug, info};

use mist_core::{
    ModelError, ModelResult, Node, Nodes, Request, Requests, ResourcePolicy, Scenario, Service,
    ServicePolicy, Services,
};

/// Validated entity collections every later stage works from.
#[derive(Debug, Clone, Default)]
pub struct Domain {
    pub nodes: Nodes,
    pub services: Services,
    pub requests: Requests,
    pub resource_policies: Vec<ResourcePolicy>,
    pub service_policies: Vec<ServicePolicy>,
}

impl Domain {
    /// Look up a node. Only fails for identifiers outside the domain.
    pub fn node(&self, id: &str) -> ModelResult<&Node> {
        self.nodes.get(id).ok_or_else(|| ModelError::UnknownNode {
            node: id.to_string(),
            referenced_by: "lookup".to_string(),
        })
    }

    pub fn service(&self, id: &str) -> ModelResult<&Service> {
        self.services.get(id).ok_or_else(|| ModelError::UnknownService {
            service: id.to_string(),
            referenced_by: "lookup".to_string(),
        })
    }

    /// Resource policies scoping exactly `node`.
    pub fn resource_policies_for<'a>(
        &'a self,
        node: &'a str,
    ) -> impl Iterator<Item = &'a ResourcePolicy> + 'a {
        self.resource_policies.iter().filter(move |rp| rp.node == node)
    }

    /// Requests asking for `service`.
    pub fn requests_for<'a>(&'a self, service: &'a str) -> impl Iterator<Item = &'a Request> + 'a {
        self.requests.values().filter(move |r| r.service == service)
    }
}

/// Build a [`Domain`] from raw collections.
pub fn normalize(scenario: Scenario) -> ModelResult<Domain> {
    let Scenario {
        mut nodes,
        mut services,
        mut requests,
        resource_policies,
        service_policies,
    } = scenario;

    for (id, node) in nodes.iter_mut() {
        node.id = id.clone();
    }
    for (id, service) in services.iter_mut() {
        service.id = id.clone();
    }
    for (id, request) in requests.iter_mut() {
        request.id = id.clone();
    }

    for request in requests.values() {
        if !nodes.contains_key(&request.node) {
            return Err(ModelError::UnknownNode {
                node: request.node.clone(),
                referenced_by: format!("request `{}`", request.id),
            });
        }
        if !services.contains_key(&request.service) {
            return Err(ModelError::UnknownService {
                service: request.service.clone(),
                referenced_by: format!("request `{}`", request.id),
            });
        }
    }

    let raw_resource = resource_policies.len();
    let mut kept_resource = Vec::with_capacity(raw_resource);
    for policy in resource_policies {
        let node = nodes.get(&policy.node).ok_or_else(|| ModelError::UnknownNode {
            node: policy.node.clone(),
            referenced_by: format!("resource policy of `{}`", policy.user),
        })?;
        if policy.user == node.owner {
            kept_resource.push(policy);
        } else {
            debug!(
                node = %policy.node,
                user = %policy.user,
                owner = %node.owner,
                "dropping resource policy not authored by the node owner"
            );
        }
    }

    let raw_service = service_policies.len();
    let mut kept_service = Vec::with_capacity(raw_service);
    for policy in service_policies {
        let service = services
            .get(&policy.service)
            .ok_or_else(|| ModelError::UnknownService {
                service: policy.service.clone(),
                referenced_by: format!("service policy of `{}`", policy.developer),
            })?;
        if policy.developer == service.developer {
            kept_service.push(policy);
        } else {
            debug!(
                service = %policy.service,
                developer = %policy.developer,
                actual = %service.developer,
                "dropping service policy not authored by the service developer"
            );
        }
    }

    info!(
        nodes = nodes.len(),
        services = services.len(),
        requests = requests.len(),
        resource_policies = kept_resource.len(),
        dropped_resource_policies = raw_resource - kept_resource.len(),
        service_policies = kept_service.len(),
        dropped_service_policies = raw_service - kept_service.len(),
        "domain normalized"
    );

    Ok(Domain {
        nodes,
        services,
        requests,
        resource_policies: kept_resource,
        service_policies: kept_service,
    })
}
