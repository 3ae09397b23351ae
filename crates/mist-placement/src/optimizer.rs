//! Optimizer lifecycle: build, select an objective, solve once.
//!
//! ```text
//! Built ──select objective──▶ ObjectiveSet ──optimize──▶ Optimized
//! ```
//!
//! Transitions only go forward. Repeating one (a second objective, a
//! second solve) is refused: the call logs a warning, returns `false`
//! and leaves the model untouched.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{info, warn};

use mist_core::{ModelResult, Scenario};

use crate::constraints::build_constraints;
use crate::indicator::{PresenceVars, link_presence};
use crate::linear::{LinearModel, VarId};
use crate::normalize::{Domain, normalize};
use crate::objective::{Objective, Slacks};
use crate::solution::{SolutionTable, extract, selected_assignments};
use crate::solver::{MicrolpBackend, SolveOutcome, SolverBackend, Verdict};
use crate::variables::AssignmentVars;

/// Name given to every placement model.
pub const MODEL_NAME: &str = "MistPlacement";

/// Lifecycle state of a placement model.
#[derive(Debug, Clone, PartialEq)]
pub enum ModelState {
    /// Variables and constraints assembled, no objective yet.
    Built,
    /// Exactly one objective installed.
    ObjectiveSet(Objective),
    /// The solver ran. Terminal.
    Optimized { objective: Objective, verdict: Verdict },
}

/// One placement problem, from entities to assignment.
///
/// Owns its model exclusively; use one instance per problem.
pub struct PlacementOptimizer<B: SolverBackend = MicrolpBackend> {
    domain: Domain,
    model: LinearModel,
    z: AssignmentVars,
    p: PresenceVars,
    slacks: Slacks,
    backend: B,
    state: ModelState,
    outcome: Option<SolveOutcome>,
}

impl PlacementOptimizer<MicrolpBackend> {
    /// Build the model for `scenario` with the default solver.
    pub fn new(scenario: Scenario) -> ModelResult<Self> {
        Self::with_backend(scenario, MicrolpBackend)
    }
}

impl<B: SolverBackend> PlacementOptimizer<B> {
    pub fn with_backend(scenario: Scenario, backend: B) -> ModelResult<Self> {
        let domain = normalize(scenario)?;
        let mut model = LinearModel::new(MODEL_NAME);
        let z = AssignmentVars::create(&mut model, &domain);
        let p = link_presence(&mut model, &domain, &z)?;
        build_constraints(&mut model, &domain, &z, &p)?;
        let slacks = Slacks::collect(&domain, &z, &p)?;

        info!(
            variables = model.vars().len(),
            constraints = model.constraints().len(),
            slacks = slacks.len(),
            solver = backend.name(),
            "placement model built"
        );

        Ok(Self {
            domain,
            model,
            z,
            p,
            slacks,
            backend,
            state: ModelState::Built,
            outcome: None,
        })
    }

    pub fn state(&self) -> &ModelState {
        &self.state
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn model(&self) -> &LinearModel {
        &self.model
    }

    /// Install `objective`. Only the first selection takes effect.
    pub fn select_objective(&mut self, objective: Objective) -> bool {
        match &self.state {
            ModelState::Built => {
                objective.apply(&mut self.model, &self.slacks);
                self.state = ModelState::ObjectiveSet(objective);
                true
            }
            ModelState::ObjectiveSet(current) | ModelState::Optimized { objective: current, .. } => {
                warn!(
                    requested = %objective,
                    current = %current,
                    "objective already selected; ignoring"
                );
                false
            }
        }
    }

    pub fn objective_average(&mut self) -> bool {
        self.select_objective(Objective::Average)
    }

    pub fn objective_min_max(&mut self) -> bool {
        self.select_objective(Objective::MinMax)
    }

    /// Solve the model once. Returns whether a usable solution exists.
    pub fn optimize(&mut self) -> bool {
        let objective = match &self.state {
            ModelState::ObjectiveSet(objective) => *objective,
            ModelState::Built => {
                warn!("no objective selected; refusing to optimize");
                return false;
            }
            ModelState::Optimized { .. } => {
                warn!("model already optimized");
                return false;
            }
        };

        let outcome = self.backend.solve(&self.model);
        match &outcome.verdict {
            Verdict::Optimal => info!(objective = ?outcome.objective, "optimal solution found"),
            Verdict::Infeasible => warn!("infeasible model"),
            Verdict::Error(reason) => warn!(%reason, "solver failed"),
            other => info!(verdict = other.label(), "solve finished"),
        }

        let success = outcome.verdict.is_success();
        self.state = ModelState::Optimized {
            objective,
            verdict: outcome.verdict.clone(),
        };
        self.outcome = Some(outcome);
        success
    }

    /// The solver verdict, once optimized.
    pub fn verdict(&self) -> Option<&Verdict> {
        match &self.state {
            ModelState::Optimized { verdict, .. } => Some(verdict),
            _ => None,
        }
    }

    pub fn objective_value(&self) -> Option<f64> {
        self.outcome.as_ref().and_then(|o| o.objective)
    }

    /// Raw model in LP text form. Available in every state.
    pub fn lp_string(&self) -> String {
        self.model.to_lp_string()
    }

    pub fn write_lp(&self, path: &Path) -> std::io::Result<()> {
        std::fs::write(path, self.lp_string())
    }

    /// Every variable's solved value by name, after a successful solve.
    pub fn solution_values(&self) -> Option<BTreeMap<String, f64>> {
        let values = self.solved()?;
        Some(
            values
                .iter()
                .map(|(var, value)| (self.model.var(*var).name.clone(), *value))
                .collect(),
        )
    }

    /// Names of the selected assignment variables.
    pub fn summarized_solution(&self) -> Option<Vec<String>> {
        let values = self.solved()?;
        Some(selected_assignments(&self.model, &self.z, values))
    }

    /// The placement as a table of (request, requestor, service, node).
    pub fn solution_table(&self) -> Option<SolutionTable> {
        let values = self.solved()?;
        Some(extract(&self.domain, &self.z, values))
    }

    /// Solved value of `z[request][node]`.
    pub fn assignment_value(&self, request: &str, node: &str) -> Option<f64> {
        let var = self.z.get(request, node).ok()?;
        self.solved()?.get(&var).copied()
    }

    /// Solved value of `p[node][service]`.
    pub fn presence_value(&self, node: &str, service: &str) -> Option<f64> {
        let var = self.p.get(node, service).ok()?;
        self.solved()?.get(&var).copied()
    }

    fn solved(&self) -> Option<&BTreeMap<VarId, f64>> {
        self.outcome
            .as_ref()
            .filter(|o| o.verdict.is_success() && !o.values.is_empty())
            .map(|o| &o.values)
    }
}
