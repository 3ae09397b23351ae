//! Assignment variables `z[r][n]`: request `r` runs on node `n`.

use std::collections::BTreeMap;

use mist_core::{ModelError, ModelResult, NodeId, RequestId};

use crate::linear::{LinearModel, VarId};
use crate::normalize::Domain;

/// One binary variable per (request, node) pair, named `z_{request}_{node}`.
#[derive(Debug, Clone, Default)]
pub struct AssignmentVars {
    grid: BTreeMap<RequestId, BTreeMap<NodeId, VarId>>,
    owners: BTreeMap<VarId, (RequestId, NodeId)>,
}

impl AssignmentVars {
    pub fn create(model: &mut LinearModel, domain: &Domain) -> Self {
        let mut vars = Self::default();
        for request in domain.requests.keys() {
            let row = vars.grid.entry(request.clone()).or_default();
            for node in domain.nodes.keys() {
                let var = model.add_binary(format!("z_{request}_{node}"));
                row.insert(node.clone(), var);
                vars.owners.insert(var, (request.clone(), node.clone()));
            }
        }
        vars
    }

    pub fn get(&self, request: &str, node: &str) -> ModelResult<VarId> {
        let row = self
            .grid
            .get(request)
            .ok_or_else(|| ModelError::UnknownRequest(request.to_string()))?;
        row.get(node).copied().ok_or_else(|| ModelError::UnknownNode {
            node: node.to_string(),
            referenced_by: format!("assignment of request `{request}`"),
        })
    }

    /// All variables of one request, by node.
    pub fn row(&self, request: &str) -> impl Iterator<Item = (&NodeId, VarId)> + '_ {
        self.grid
            .get(request)
            .into_iter()
            .flat_map(|row| row.iter().map(|(n, v)| (n, *v)))
    }

    /// The (request, node) pair a variable stands for.
    pub fn owner(&self, var: VarId) -> Option<(&str, &str)> {
        self.owners
            .get(&var)
            .map(|(r, n)| (r.as_str(), n.as_str()))
    }

    pub fn iter(&self) -> impl Iterator<Item = (&RequestId, &NodeId, VarId)> + '_ {
        self.grid
            .iter()
            .flat_map(|(r, row)| row.iter().map(move |(n, v)| (r, n, *v)))
    }

    pub fn len(&self) -> usize {
        self.owners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.owners.is_empty()
    }
}
