//! Turns solved assignment variables back into rows of
//! (request, requestor, service, node).

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use mist_core::{NodeId, RequestId, ServiceId};

use crate::linear::{LinearModel, VarId};
use crate::normalize::Domain;
use crate::variables::AssignmentVars;

/// Binary values above this count as selected.
pub const SELECTED_THRESHOLD: f64 = 0.5;

/// One placed request.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Assignment {
    pub request: RequestId,
    pub requestor: NodeId,
    pub service: ServiceId,
    /// The node the request was placed on.
    pub node: NodeId,
}

/// The placement produced by one solve, ordered by request id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SolutionTable {
    rows: Vec<Assignment>,
}

impl SolutionTable {
    pub fn new(mut rows: Vec<Assignment>) -> Self {
        rows.sort();
        Self { rows }
    }

    pub fn rows(&self) -> &[Assignment] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Node a request was placed on.
    pub fn node_of(&self, request: &str) -> Option<&str> {
        self.rows
            .iter()
            .find(|a| a.request == request)
            .map(|a| a.node.as_str())
    }

    /// Distinct services with at least one placed request.
    pub fn services(&self) -> BTreeSet<&str> {
        self.rows.iter().map(|a| a.service.as_str()).collect()
    }

    /// Distinct nodes hosting `service`.
    pub fn nodes_for(&self, service: &str) -> BTreeSet<&str> {
        self.rows
            .iter()
            .filter(|a| a.service == service)
            .map(|a| a.node.as_str())
            .collect()
    }

    /// Render as CSV with a header row.
    pub fn to_csv(&self) -> String {
        let mut out = String::from("Request ID,Requestor,Service,Deployment node\n");
        for a in &self.rows {
            let _ = writeln!(
                out,
                "{},{},{},{}",
                csv_field(&a.request),
                csv_field(&a.requestor),
                csv_field(&a.service),
                csv_field(&a.node)
            );
        }
        out
    }
}

fn csv_field(value: &str) -> String {
    if value.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", value.replace('"', "\"\""))
    } else {
        value.to_string()
    }
}

/// Names of the selected assignment variables.
pub fn selected_assignments(
    model: &LinearModel,
    z: &AssignmentVars,
    values: &BTreeMap<VarId, f64>,
) -> Vec<String> {
    z.iter()
        .filter(|(_, _, var)| is_selected(values, *var))
        .map(|(_, _, var)| model.var(var).name.clone())
        .collect()
}

/// Rebuild the assignment table from solved values.
pub fn extract(
    domain: &Domain,
    z: &AssignmentVars,
    values: &BTreeMap<VarId, f64>,
) -> SolutionTable {
    let rows = z
        .iter()
        .filter(|(_, _, var)| is_selected(values, *var))
        .filter_map(|(request_id, node_id, _)| {
            let request = domain.requests.get(request_id)?;
            Some(Assignment {
                request: request_id.clone(),
                requestor: request.node.clone(),
                service: request.service.clone(),
                node: node_id.clone(),
            })
        })
        .collect();
    SolutionTable::new(rows)
}

fn is_selected(values: &BTreeMap<VarId, f64>, var: VarId) -> bool {
    values.get(&var).is_some_and(|v| *v > SELECTED_THRESHOLD)
}
