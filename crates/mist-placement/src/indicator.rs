//! Presence indicators `p[n][s]`: node `n` hosts service `s` at least once.
//!
//! The OR over the assignment variables is linearized with
//!
//! ```text
//! p[n][s] <= Σ_{r: service(r) = s} z[r][n]     (no presence without a request)
//! p[n][s] >= z[r][n]   for each such r          (any request forces presence)
//! ```
//!
//! With no request for `s` the sum is empty and `p[n][s]` is pinned to 0.

use std::collections::BTreeMap;

use mist_core::{ModelError, ModelResult, NodeId, ServiceId};

use crate::linear::{Comparison, LinearExpr, LinearModel, VarId};
use crate::normalize::Domain;
use crate::variables::AssignmentVars;

/// One binary variable per (node, service) pair, named `p_{node}_{service}`.
#[derive(Debug, Clone, Default)]
pub struct PresenceVars {
    grid: BTreeMap<NodeId, BTreeMap<ServiceId, VarId>>,
}

impl PresenceVars {
    pub fn get(&self, node: &str, service: &str) -> ModelResult<VarId> {
        let row = self.grid.get(node).ok_or_else(|| ModelError::UnknownNode {
            node: node.to_string(),
            referenced_by: format!("presence of service `{service}`"),
        })?;
        row.get(service).copied().ok_or_else(|| ModelError::UnknownService {
            service: service.to_string(),
            referenced_by: format!("presence on node `{node}`"),
        })
    }

    /// Presence variables of one node, by service.
    pub fn row(&self, node: &str) -> impl Iterator<Item = (&ServiceId, VarId)> + '_ {
        self.grid
            .get(node)
            .into_iter()
            .flat_map(|row| row.iter().map(|(s, v)| (s, *v)))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &ServiceId, VarId)> + '_ {
        self.grid
            .iter()
            .flat_map(|(n, row)| row.iter().map(move |(s, v)| (n, s, *v)))
    }
}

/// Create the presence indicators and link them to the assignments.
pub fn link_presence(
    model: &mut LinearModel,
    domain: &Domain,
    z: &AssignmentVars,
) -> ModelResult<PresenceVars> {
    let mut presence = PresenceVars::default();

    for node in domain.nodes.keys() {
        let row = presence.grid.entry(node.clone()).or_default();
        for service in domain.services.keys() {
            let p = model.add_binary(format!("p_{node}_{service}"));
            row.insert(service.clone(), p);

            let assigned = domain
                .requests_for(service)
                .map(|r| z.get(&r.id, node))
                .collect::<ModelResult<Vec<VarId>>>()?;

            let sum: LinearExpr = assigned.iter().map(|v| LinearExpr::from(*v)).sum();
            model.add_constraint(
                format!("presence_sum_{node}_{service}"),
                LinearExpr::from(p) - sum,
                Comparison::Le,
                0.0,
            );
            for (idx, var) in assigned.iter().enumerate() {
                model.add_constraint(
                    format!("presence_{node}_{service}_{idx}"),
                    LinearExpr::from(p) - LinearExpr::from(*var),
                    Comparison::Ge,
                    0.0,
                );
            }
        }
    }

    Ok(presence)
}
