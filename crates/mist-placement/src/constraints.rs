//! Constraint builder — fulfillment, capacity, authorization, geography
//! and metadata compatibility.
//!
//! Per-policy families are emitted once per (entity, policy) pair, never
//! conjoined: an entity under k applicable policies gets k constraints.
//! Each is named `{family}_{entity}_{index}` with a running index over
//! the matching policies.

use mist_core::{FULL_CAPACITY_PERCENT, MetadataRule, ModelResult, Resource};
use tracing::debug;

use crate::indicator::PresenceVars;
use crate::linear::{Comparison, LinearExpr, LinearModel};
use crate::normalize::Domain;
use crate::variables::AssignmentVars;

/// Emit every constraint family.
pub fn build_constraints(
    model: &mut LinearModel,
    domain: &Domain,
    z: &AssignmentVars,
    p: &PresenceVars,
) -> ModelResult<()> {
    let before = model.constraints().len();

    request_fulfillment(model, domain, z)?;
    for resource in Resource::ALL {
        capacity_limit(model, domain, p, resource)?;
    }
    allowed_developers(model, domain, p)?;
    allowed_requestors(model, domain, z)?;
    maximum_distance(model, domain, z)?;
    maximum_latency(model, domain, z)?;
    for rule in MetadataRule::ALL {
        resource_metadata(model, domain, p, rule)?;
        service_metadata(model, domain, p, rule)?;
    }
    allowed_owners(model, domain, p)?;

    debug!(
        constraints = model.constraints().len() - before,
        "placement constraints emitted"
    );
    Ok(())
}

fn flag(allowed: bool) -> f64 {
    if allowed { 1.0 } else { 0.0 }
}

/// Every request lands on exactly one node.
fn request_fulfillment(
    model: &mut LinearModel,
    domain: &Domain,
    z: &AssignmentVars,
) -> ModelResult<()> {
    for request in domain.requests.keys() {
        let sum: LinearExpr = z.row(request).map(|(_, v)| LinearExpr::from(v)).sum();
        model.add_constraint(
            format!("request_fulfillment_{request}"),
            sum,
            Comparison::Eq,
            1.0,
        );
    }
    Ok(())
}

/// Fraction of a node's capacity available to services: the strictest
/// percentage among the policies scoping it, or all of it.
pub fn capacity_fraction(domain: &Domain, node: &str, resource: Resource) -> f64 {
    domain
        .resource_policies_for(node)
        .map(|rp| rp.max_percent(resource))
        .fold(FULL_CAPACITY_PERCENT, f64::min)
        / 100.0
}

/// Services present on a node fit within its allowed share.
fn capacity_limit(
    model: &mut LinearModel,
    domain: &Domain,
    p: &PresenceVars,
    resource: Resource,
) -> ModelResult<()> {
    for (node_id, node) in &domain.nodes {
        let mut consumed = LinearExpr::new();
        for (service_id, service) in &domain.services {
            consumed.add_term(p.get(node_id, service_id)?, service.footprint(resource));
        }
        let limit = capacity_fraction(domain, node_id, resource) * node.capacity(resource);
        model.add_constraint(
            format!("{}_limit_{node_id}", resource.name()),
            consumed,
            Comparison::Le,
            limit,
        );
    }
    Ok(())
}

/// A node may only host services whose developer its owner allows.
fn allowed_developers(
    model: &mut LinearModel,
    domain: &Domain,
    p: &PresenceVars,
) -> ModelResult<()> {
    for (service_id, service) in &domain.services {
        let mut idx = 0;
        for rp in &domain.resource_policies {
            let Some(allowed) = &rp.allowed_developers else {
                continue;
            };
            model.add_constraint(
                format!("allowed_developers_{service_id}_{idx}"),
                LinearExpr::from(p.get(&rp.node, service_id)?),
                Comparison::Le,
                flag(allowed.contains(&service.developer)),
            );
            idx += 1;
        }
    }
    Ok(())
}

/// A node may only serve requestors whose owner its owner allows.
fn allowed_requestors(
    model: &mut LinearModel,
    domain: &Domain,
    z: &AssignmentVars,
) -> ModelResult<()> {
    for (request_id, request) in &domain.requests {
        let requestor_owner = &domain.node(&request.node)?.owner;
        let mut idx = 0;
        for rp in &domain.resource_policies {
            let Some(allowed) = &rp.allowed_users else {
                continue;
            };
            model.add_constraint(
                format!("allowed_requestors_{request_id}_{idx}"),
                LinearExpr::from(z.get(request_id, &rp.node)?),
                Comparison::Le,
                flag(allowed.contains(requestor_owner)),
            );
            idx += 1;
        }
    }
    Ok(())
}

fn maximum_distance(
    model: &mut LinearModel,
    domain: &Domain,
    z: &AssignmentVars,
) -> ModelResult<()> {
    for (request_id, request) in &domain.requests {
        let mut idx = 0;
        for rp in &domain.resource_policies {
            let Some(max_distance) = rp.max_distance else {
                continue;
            };
            let distance = domain.node(&rp.node)?.distance_to(&request.node);
            model.add_constraint(
                format!("max_distance_{request_id}_{idx}"),
                LinearExpr::term(z.get(request_id, &rp.node)?, distance),
                Comparison::Le,
                max_distance,
            );
            idx += 1;
        }
    }
    Ok(())
}

fn maximum_latency(
    model: &mut LinearModel,
    domain: &Domain,
    z: &AssignmentVars,
) -> ModelResult<()> {
    for (request_id, request) in &domain.requests {
        let mut idx = 0;
        for rp in &domain.resource_policies {
            let Some(max_latency) = rp.max_latency else {
                continue;
            };
            let latency = domain.node(&rp.node)?.latency_to(&request.node);
            model.add_constraint(
                format!("max_latency_{request_id}_{idx}"),
                LinearExpr::term(z.get(request_id, &rp.node)?, latency),
                Comparison::Le,
                max_latency,
            );
            idx += 1;
        }
    }
    Ok(())
}

/// Resource-policy metadata rules, checked against service metadata.
fn resource_metadata(
    model: &mut LinearModel,
    domain: &Domain,
    p: &PresenceVars,
    rule: MetadataRule,
) -> ModelResult<()> {
    for (service_id, service) in &domain.services {
        let mut idx = 0;
        for rp in &domain.resource_policies {
            let Some(governed) = rp.metadata(rule) else {
                continue;
            };
            model.add_constraint(
                format!("{}_resource_{service_id}_{idx}", rule.name()),
                LinearExpr::from(p.get(&rp.node, service_id)?),
                Comparison::Le,
                flag(rule.is_satisfied(governed, &service.metadata)),
            );
            idx += 1;
        }
    }
    Ok(())
}

/// Service-policy metadata rules, checked against node metadata.
fn service_metadata(
    model: &mut LinearModel,
    domain: &Domain,
    p: &PresenceVars,
    rule: MetadataRule,
) -> ModelResult<()> {
    for (node_id, node) in &domain.nodes {
        let mut idx = 0;
        for sp in &domain.service_policies {
            let Some(governed) = sp.metadata(rule) else {
                continue;
            };
            model.add_constraint(
                format!("{}_service_{node_id}_{idx}", rule.name()),
                LinearExpr::from(p.get(node_id, &sp.service)?),
                Comparison::Le,
                flag(rule.is_satisfied(governed, &node.metadata)),
            );
            idx += 1;
        }
    }
    Ok(())
}

/// A service may only run on nodes whose owner its developer allows.
fn allowed_owners(model: &mut LinearModel, domain: &Domain, p: &PresenceVars) -> ModelResult<()> {
    for (node_id, node) in &domain.nodes {
        let mut idx = 0;
        for sp in &domain.service_policies {
            let Some(allowed) = &sp.allowed_owners else {
                continue;
            };
            model.add_constraint(
                format!("allowed_owners_{node_id}_{idx}"),
                LinearExpr::from(p.get(node_id, &sp.service)?),
                Comparison::Le,
                flag(allowed.contains(&node.owner)),
            );
            idx += 1;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicator::link_presence;
    use crate::linear::Constraint;
    use crate::normalize::{fixtures::*, normalize};
    use mist_core::*;

    fn build(scenario: Scenario) -> (LinearModel, Domain, AssignmentVars, PresenceVars) {
        let domain = normalize(scenario).unwrap();
        let mut model = LinearModel::new("t");
        let z = AssignmentVars::create(&mut model, &domain);
        let p = link_presence(&mut model, &domain, &z).unwrap();
        build_constraints(&mut model, &domain, &z, &p).unwrap();
        (model, domain, z, p)
    }

    fn constraint<'a>(model: &'a LinearModel, name: &str) -> &'a Constraint {
        model
            .constraints()
            .iter()
            .find(|c| c.name == name)
            .unwrap_or_else(|| panic!("missing constraint {name}"))
    }

    #[test]
    fn fulfillment_sums_every_node() {
        let (model, _, z, _) = build(small_scenario());
        let c = constraint(&model, "request_fulfillment_r1");
        assert_eq!(c.cmp, Comparison::Eq);
        assert_eq!(c.rhs, 1.0);
        assert_eq!(c.expr.coefficient(z.get("r1", "n1").unwrap()), 1.0);
        assert_eq!(c.expr.coefficient(z.get("r1", "n2").unwrap()), 1.0);
    }

    #[test]
    fn capacity_uses_full_capacity_without_policy() {
        let (model, _, _, p) = build(small_scenario());
        let c = constraint(&model, "ram_limit_n1");
        assert_eq!(c.rhs, 4.0);
        assert_eq!(c.expr.coefficient(p.get("n1", "s1").unwrap()), 2.0);
    }

    #[test]
    fn capacity_takes_strictest_scoping_policy() {
        let mut scenario = small_scenario();
        let mut loose = ResourcePolicy::new("n1", "alice");
        loose.max_ram = Some(75.0);
        let mut strict = ResourcePolicy::new("n1", "alice");
        strict.max_ram = Some(50.0);
        let mut other_node = ResourcePolicy::new("n2", "bob");
        other_node.max_ram = Some(10.0);
        scenario.resource_policies = vec![loose, strict, other_node];

        let (model, _, _, _) = build(scenario);
        assert_eq!(constraint(&model, "ram_limit_n1").rhs, 2.0);
        assert_eq!(constraint(&model, "cpu_limit_n1").rhs, 4.0);
        assert!((constraint(&model, "ram_limit_n2").rhs - 0.4).abs() < 1e-12);
    }

    #[test]
    fn developer_allow_list_checks_each_service() {
        let mut scenario = small_scenario();
        scenario.services.insert("s2".into(), make_service("dave", 1.0, 1.0, 1.0));
        let mut rp = ResourcePolicy::new("n1", "alice");
        rp.allowed_developers = Some(["carol".to_string()].into());
        scenario.resource_policies.push(rp);

        let (model, _, _, p) = build(scenario);
        let allowed = constraint(&model, "allowed_developers_s1_0");
        let denied = constraint(&model, "allowed_developers_s2_0");
        assert_eq!(allowed.rhs, 1.0);
        assert_eq!(denied.rhs, 0.0);
        assert_eq!(denied.expr.coefficient(p.get("n1", "s2").unwrap()), 1.0);
    }

    #[test]
    fn requestor_allow_list_uses_requestor_owner() {
        let mut scenario = small_scenario();
        scenario.requests.insert("r2".into(), make_request("n2", "s1"));
        let mut rp = ResourcePolicy::new("n1", "alice");
        rp.allowed_users = Some(["alice".to_string()].into());
        scenario.resource_policies.push(rp);

        let (model, _, z, _) = build(scenario);
        let own = constraint(&model, "allowed_requestors_r1_0");
        let foreign = constraint(&model, "allowed_requestors_r2_0");
        assert_eq!(own.rhs, 1.0);
        assert_eq!(foreign.rhs, 0.0);
        assert_eq!(foreign.expr.coefficient(z.get("r2", "n1").unwrap()), 1.0);
    }

    #[test]
    fn one_constraint_per_matching_policy() {
        let mut scenario = small_scenario();
        for limit in [5.0, 10.0] {
            let mut rp = ResourcePolicy::new("n2", "bob");
            rp.max_distance = Some(limit);
            scenario.resource_policies.push(rp);
        }
        scenario
            .nodes
            .get_mut("n2")
            .unwrap()
            .location
            .insert("n1".into(), 7.0);

        let (model, _, z, _) = build(scenario);
        let first = constraint(&model, "max_distance_r1_0");
        let second = constraint(&model, "max_distance_r1_1");
        let var = z.get("r1", "n2").unwrap();
        assert_eq!(first.expr.coefficient(var), 7.0);
        assert_eq!(first.rhs, 5.0);
        assert_eq!(second.rhs, 10.0);
        assert!(!first.is_satisfied(|_| 1.0));
        assert!(second.is_satisfied(|_| 1.0));
    }

    #[test]
    fn missing_latency_entry_is_unconstrained() {
        let mut scenario = small_scenario();
        let mut rp = ResourcePolicy::new("n2", "bob");
        rp.max_latency = Some(1.0);
        scenario.resource_policies.push(rp);

        let (model, _, _, _) = build(scenario);
        let c = constraint(&model, "max_latency_r1_0");
        assert!(c.expr.is_constant());
        assert_eq!(c.rhs, 1.0);
    }

    #[test]
    fn resource_metadata_rules_cap_presence() {
        let mut scenario = small_scenario();
        scenario
            .services
            .get_mut("s1")
            .unwrap()
            .metadata
            .insert("memory_gb".into(), 6.0.into());
        let mut rp = ResourcePolicy::new("n1", "alice");
        rp.upper_bound_metadata = Some([("memory_gb".to_string(), 4.0.into())].into());
        rp.lower_bound_metadata = Some([("memory_gb".to_string(), 2.0.into())].into());
        rp.forced_metadata = Some([("tier".to_string(), "gold".into())].into());
        scenario.resource_policies.push(rp);

        let (model, _, _, _) = build(scenario);
        assert_eq!(constraint(&model, "upper_bound_metadata_resource_s1_0").rhs, 0.0);
        assert_eq!(constraint(&model, "lower_bound_metadata_resource_s1_0").rhs, 1.0);
        assert_eq!(constraint(&model, "forced_metadata_resource_s1_0").rhs, 0.0);
    }

    #[test]
    fn service_metadata_rules_check_every_node() {
        let mut scenario = small_scenario();
        scenario
            .nodes
            .get_mut("n1")
            .unwrap()
            .metadata
            .insert("arch".into(), "arm64".into());
        scenario
            .nodes
            .get_mut("n2")
            .unwrap()
            .metadata
            .insert("arch".into(), "x86_64".into());
        let mut sp = ServicePolicy::new("s1", "carol");
        sp.forced_metadata = Some([("arch".to_string(), "arm64".into())].into());
        scenario.service_policies.push(sp);

        let (model, _, _, p) = build(scenario);
        let n1 = constraint(&model, "forced_metadata_service_n1_0");
        let n2 = constraint(&model, "forced_metadata_service_n2_0");
        assert_eq!(n1.rhs, 1.0);
        assert_eq!(n2.rhs, 0.0);
        assert_eq!(n2.expr.coefficient(p.get("n2", "s1").unwrap()), 1.0);
    }

    #[test]
    fn owner_allow_list_checks_each_node() {
        let mut scenario = small_scenario();
        let mut sp = ServicePolicy::new("s1", "carol");
        sp.allowed_owners = Some(["bob".to_string()].into());
        scenario.service_policies.push(sp);

        let (model, _, _, _) = build(scenario);
        assert_eq!(constraint(&model, "allowed_owners_n1_0").rhs, 0.0);
        assert_eq!(constraint(&model, "allowed_owners_n2_0").rhs, 1.0);
    }

    #[test]
    fn unauthorized_policies_emit_nothing() {
        let mut scenario = small_scenario();
        let mut rp = ResourcePolicy::new("n1", "mallory");
        rp.allowed_developers = Some(Default::default());
        scenario.resource_policies.push(rp);

        let (model, _, _, _) = build(scenario);
        assert!(
            model
                .constraints()
                .iter()
                .all(|c| !c.name.starts_with("allowed_developers"))
        );
    }
}
