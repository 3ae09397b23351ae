//! Objective builder — distance-to-violation expressions and the two
//! objective strategies built from them.
//!
//! Every slack expression is something to maximize: it shrinks as an
//! assignment approaches (or crosses) a policy limit. Slacks are only
//! used in the objective, never as hard constraints.
//!
//! - **Average** maximizes the sum of every slack instance.
//! - **Min-max** adds one free variable per category, bounds it by every
//!   instance of that category (so it settles on the worst one) and
//!   maximizes the sum of those worst cases.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use mist_core::{Metadata, ModelResult, Resource};
use tracing::debug;

use crate::constraints::capacity_fraction;
use crate::indicator::PresenceVars;
use crate::linear::{Comparison, LinearExpr, LinearModel, VarId, VarKind};
use crate::normalize::Domain;
use crate::variables::AssignmentVars;

/// Objective strategy, selected once per model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Objective {
    Average,
    MinMax,
}

impl fmt::Display for Objective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Objective::Average => "avg",
            Objective::MinMax => "minmax",
        })
    }
}

impl FromStr for Objective {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "avg" | "average" => Ok(Objective::Average),
            "minmax" | "min-max" => Ok(Objective::MinMax),
            other => Err(format!("unsupported objective `{other}` (expected avg or minmax)")),
        }
    }
}

/// A family of comparable slack expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum SlackCategory {
    ResourceUpperBound,
    ResourceLowerBound,
    ServiceUpperBound,
    ServiceLowerBound,
    Distance,
    Latency,
    Capacity(Resource),
}

impl SlackCategory {
    pub const ALL: [SlackCategory; 9] = [
        SlackCategory::ResourceUpperBound,
        SlackCategory::ResourceLowerBound,
        SlackCategory::ServiceUpperBound,
        SlackCategory::ServiceLowerBound,
        SlackCategory::Distance,
        SlackCategory::Latency,
        SlackCategory::Capacity(Resource::Ram),
        SlackCategory::Capacity(Resource::Cpu),
        SlackCategory::Capacity(Resource::Storage),
    ];

    /// Name of the category's worst-case variable in the min-max model.
    pub fn var_name(self) -> &'static str {
        match self {
            SlackCategory::ResourceUpperBound => "ub_rp",
            SlackCategory::ResourceLowerBound => "lb_rp",
            SlackCategory::ServiceUpperBound => "ub_sp",
            SlackCategory::ServiceLowerBound => "lb_sp",
            SlackCategory::Distance => "dist",
            SlackCategory::Latency => "lat",
            SlackCategory::Capacity(resource) => resource.name(),
        }
    }
}

/// Clamped linear interpolation of `x` from `[0, max]` onto `[0, 1]`.
pub fn interp_unit(x: f64, max: f64) -> f64 {
    if max <= 0.0 {
        return if x > 0.0 { 1.0 } else { 0.0 };
    }
    (x / max).clamp(0.0, 1.0)
}

/// `bound - (bound - d)·z`: the full bound while unassigned, the
/// interpolated gap `d` once assigned.
fn gated(bound: f64, gap: f64, max: f64, z: VarId) -> LinearExpr {
    let d = interp_unit(gap, max);
    LinearExpr::constant(bound) - LinearExpr::term(z, bound - d)
}

/// Largest numeric bound on `key` across a set of metadata maps.
fn max_bound<'a>(maps: impl Iterator<Item = &'a Metadata>, key: &str) -> Option<f64> {
    maps.filter_map(|m| m.get(key).and_then(|v| v.as_number()))
        .fold(None, |acc, v| Some(acc.map_or(v, |a: f64| a.max(v))))
}

/// All slack instances of a model, grouped by category.
#[derive(Debug, Clone, Default)]
pub struct Slacks {
    by_category: BTreeMap<SlackCategory, Vec<LinearExpr>>,
}

impl Slacks {
    pub fn collect(domain: &Domain, z: &AssignmentVars, p: &PresenceVars) -> ModelResult<Self> {
        let mut slacks = Slacks::default();
        slacks.resource_upper_bounds(domain, z)?;
        slacks.resource_lower_bounds(domain, z)?;
        slacks.service_upper_bounds(domain, z)?;
        slacks.service_lower_bounds(domain, z)?;
        slacks.distances(domain, z)?;
        slacks.latencies(domain, z)?;
        for resource in Resource::ALL {
            slacks.capacities(domain, p, resource)?;
        }
        Ok(slacks)
    }

    pub fn instances(&self, category: SlackCategory) -> &[LinearExpr] {
        self.by_category
            .get(&category)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn push(&mut self, category: SlackCategory, expr: LinearExpr) {
        self.by_category.entry(category).or_default().push(expr);
    }

    /// Service metadata against resource-policy upper bounds.
    fn resource_upper_bounds(&mut self, domain: &Domain, z: &AssignmentVars) -> ModelResult<()> {
        for rp in &domain.resource_policies {
            let Some(bounds) = &rp.upper_bound_metadata else {
                continue;
            };
            for (key, bound) in bounds {
                let Some(bound) = bound.as_number() else {
                    continue;
                };
                let all = domain
                    .resource_policies
                    .iter()
                    .filter_map(|other| other.upper_bound_metadata.as_ref());
                let Some(max) = max_bound(all, key) else {
                    continue;
                };
                for (request_id, request) in &domain.requests {
                    let service = domain.service(&request.service)?;
                    let Some(value) = service.metadata.get(key).and_then(|v| v.as_number()) else {
                        continue;
                    };
                    let var = z.get(request_id, &rp.node)?;
                    self.push(
                        SlackCategory::ResourceUpperBound,
                        gated(bound, bound - value, max, var),
                    );
                }
            }
        }
        Ok(())
    }

    /// Service metadata against resource-policy lower bounds.
    fn resource_lower_bounds(&mut self, domain: &Domain, z: &AssignmentVars) -> ModelResult<()> {
        for rp in &domain.resource_policies {
            let Some(bounds) = &rp.lower_bound_metadata else {
                continue;
            };
            for (key, bound) in bounds {
                let Some(bound) = bound.as_number() else {
                    continue;
                };
                let all = domain
                    .resource_policies
                    .iter()
                    .filter_map(|other| other.lower_bound_metadata.as_ref());
                let Some(max) = max_bound(all, key) else {
                    continue;
                };
                for (request_id, request) in &domain.requests {
                    let service = domain.service(&request.service)?;
                    let Some(value) = service.metadata.get(key).and_then(|v| v.as_number()) else {
                        continue;
                    };
                    let var = z.get(request_id, &rp.node)?;
                    self.push(
                        SlackCategory::ResourceLowerBound,
                        gated(bound, value - bound, max, var),
                    );
                }
            }
        }
        Ok(())
    }

    /// Node metadata against service-policy upper bounds.
    fn service_upper_bounds(&mut self, domain: &Domain, z: &AssignmentVars) -> ModelResult<()> {
        for sp in &domain.service_policies {
            let Some(bounds) = &sp.upper_bound_metadata else {
                continue;
            };
            for (key, bound) in bounds {
                let Some(bound) = bound.as_number() else {
                    continue;
                };
                let all = domain
                    .service_policies
                    .iter()
                    .filter_map(|other| other.upper_bound_metadata.as_ref());
                let Some(max) = max_bound(all, key) else {
                    continue;
                };
                for request in domain.requests_for(&sp.service) {
                    for (node_id, node) in &domain.nodes {
                        let Some(value) = node.metadata.get(key).and_then(|v| v.as_number())
                        else {
                            continue;
                        };
                        let var = z.get(&request.id, node_id)?;
                        self.push(
                            SlackCategory::ServiceUpperBound,
                            gated(bound, bound - value, max, var),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// Node metadata against service-policy lower bounds.
    fn service_lower_bounds(&mut self, domain: &Domain, z: &AssignmentVars) -> ModelResult<()> {
        for sp in &domain.service_policies {
            let Some(bounds) = &sp.lower_bound_metadata else {
                continue;
            };
            for (key, bound) in bounds {
                let Some(bound) = bound.as_number() else {
                    continue;
                };
                let all = domain
                    .service_policies
                    .iter()
                    .filter_map(|other| other.lower_bound_metadata.as_ref());
                let Some(max) = max_bound(all, key) else {
                    continue;
                };
                for request in domain.requests_for(&sp.service) {
                    for (node_id, node) in &domain.nodes {
                        let Some(value) = node.metadata.get(key).and_then(|v| v.as_number())
                        else {
                            continue;
                        };
                        let var = z.get(&request.id, node_id)?;
                        self.push(
                            SlackCategory::ServiceLowerBound,
                            gated(bound, value - bound, max, var),
                        );
                    }
                }
            }
        }
        Ok(())
    }

    /// `(max_distance - d·z) / max_distance` per (policy, request).
    fn distances(&mut self, domain: &Domain, z: &AssignmentVars) -> ModelResult<()> {
        for rp in &domain.resource_policies {
            let Some(max) = rp.max_distance.filter(|m| *m > 0.0) else {
                continue;
            };
            let node = domain.node(&rp.node)?;
            for (request_id, request) in &domain.requests {
                let used = node.distance_to(&request.node);
                let var = z.get(request_id, &rp.node)?;
                self.push(
                    SlackCategory::Distance,
                    LinearExpr::constant(1.0) - LinearExpr::term(var, used / max),
                );
            }
        }
        Ok(())
    }

    fn latencies(&mut self, domain: &Domain, z: &AssignmentVars) -> ModelResult<()> {
        for rp in &domain.resource_policies {
            let Some(max) = rp.max_latency.filter(|m| *m > 0.0) else {
                continue;
            };
            let node = domain.node(&rp.node)?;
            for (request_id, request) in &domain.requests {
                let used = node.latency_to(&request.node);
                let var = z.get(request_id, &rp.node)?;
                self.push(
                    SlackCategory::Latency,
                    LinearExpr::constant(1.0) - LinearExpr::term(var, used / max),
                );
            }
        }
        Ok(())
    }

    /// Allowed share of a node's capacity minus the share services take.
    fn capacities(
        &mut self,
        domain: &Domain,
        p: &PresenceVars,
        resource: Resource,
    ) -> ModelResult<()> {
        for (node_id, node) in &domain.nodes {
            let capacity = node.capacity(resource);
            if capacity <= 0.0 {
                continue;
            }
            let mut expr = LinearExpr::constant(capacity_fraction(domain, node_id, resource));
            for (service_id, service) in &domain.services {
                let var = p.get(node_id, service_id)?;
                expr.add_term(var, -service.footprint(resource) / capacity);
            }
            self.push(SlackCategory::Capacity(resource), expr);
        }
        Ok(())
    }
}

impl Objective {
    /// Install this objective on `model`.
    pub fn apply(self, model: &mut LinearModel, slacks: &Slacks) {
        let objective = match self {
            Objective::Average => average(slacks),
            Objective::MinMax => min_max(model, slacks),
        };
        debug!(objective = %self, slacks = slacks.len(), "objective built");
        model.set_objective(objective);
    }
}

fn average(slacks: &Slacks) -> LinearExpr {
    SlackCategory::ALL
        .iter()
        .flat_map(|c| slacks.instances(*c).iter().cloned())
        .sum()
}

fn min_max(model: &mut LinearModel, slacks: &Slacks) -> LinearExpr {
    let mut objective = LinearExpr::new();
    for category in SlackCategory::ALL {
        let instances = slacks.instances(category);
        // An empty category would leave its variable unbounded.
        if instances.is_empty() {
            continue;
        }
        let worst = model.add_var(category.var_name(), VarKind::FREE);
        for (idx, instance) in instances.iter().enumerate() {
            model.add_constraint(
                format!("{}_{idx}", category.var_name()),
                LinearExpr::from(worst) - instance.clone(),
                Comparison::Le,
                0.0,
            );
        }
        objective += LinearExpr::from(worst);
    }
    objective
}
