//! Solver adapter — hands a [`LinearModel`] to a MILP backend.
//!
//! Backends are stateless: every call to [`SolverBackend::solve`] builds
//! its own problem from the model and returns values keyed by
//! [`VarId`].

use std::collections::BTreeMap;

use microlp::{ComparisonOp, OptimizationDirection, Problem};
use tracing::debug;

use crate::linear::{Comparison, LinearModel, VarId, VarKind};

/// Outcome class of a solve.
#[derive(Debug, Clone, PartialEq)]
pub enum Verdict {
    Optimal,
    /// A feasible but not proven optimal solution (e.g. a time limit hit).
    Feasible,
    Infeasible,
    Unbounded,
    /// The backend failed for reasons unrelated to the model's feasibility.
    Error(String),
}

impl Verdict {
    /// Whether the run counts as a success for the caller.
    pub fn is_success(&self) -> bool {
        matches!(self, Verdict::Optimal | Verdict::Feasible | Verdict::Unbounded)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Verdict::Optimal => "OPTIMAL",
            Verdict::Feasible => "FEASIBLE",
            Verdict::Infeasible => "INFEASIBLE",
            Verdict::Unbounded => "UNBOUNDED",
            Verdict::Error(_) => "ERROR",
        }
    }
}

/// Verdict plus solved values.
#[derive(Debug, Clone)]
pub struct SolveOutcome {
    pub verdict: Verdict,
    /// Solved value per variable. Empty when no solution was produced.
    pub values: BTreeMap<VarId, f64>,
    pub objective: Option<f64>,
}

impl SolveOutcome {
    pub fn without_solution(verdict: Verdict) -> Self {
        Self {
            verdict,
            values: BTreeMap::new(),
            objective: None,
        }
    }
}

/// A mixed-integer linear solver.
pub trait SolverBackend {
    fn name(&self) -> &'static str;

    /// Maximize the model's objective subject to its constraints.
    fn solve(&self, model: &LinearModel) -> SolveOutcome;
}

/// Pure-Rust branch-and-bound backend.
#[derive(Debug, Clone, Copy, Default)]
pub struct MicrolpBackend;

impl SolverBackend for MicrolpBackend {
    fn name(&self) -> &'static str {
        "microlp"
    }

    fn solve(&self, model: &LinearModel) -> SolveOutcome {
        let objective = model.objective().cloned().unwrap_or_default();
        if model.vars().is_empty() {
            let feasible = model.constraints().iter().all(|c| c.cmp.holds(0.0, c.rhs));
            return SolveOutcome {
                verdict: if feasible { Verdict::Optimal } else { Verdict::Infeasible },
                values: BTreeMap::new(),
                objective: feasible.then(|| objective.constant_term()),
            };
        }
        let mut problem = Problem::new(OptimizationDirection::Maximize);

        let vars: Vec<microlp::Variable> = model
            .vars()
            .iter()
            .enumerate()
            .map(|(idx, var)| {
                let weight = objective.coefficient(VarId(idx));
                match var.kind {
                    VarKind::Binary => problem.add_binary_var(weight),
                    VarKind::Continuous { lower, upper } => problem.add_var(weight, (lower, upper)),
                }
            })
            .collect();

        for constraint in model.constraints() {
            // microlp rejects empty rows; a constant row is either trivially
            // true or makes the whole model infeasible.
            if constraint.expr.is_constant() {
                if constraint.cmp.holds(0.0, constraint.rhs) {
                    continue;
                }
                debug!(constraint = %constraint.name, "constant constraint violated");
                return SolveOutcome::without_solution(Verdict::Infeasible);
            }
            let op = match constraint.cmp {
                Comparison::Le => ComparisonOp::Le,
                Comparison::Ge => ComparisonOp::Ge,
                Comparison::Eq => ComparisonOp::Eq,
            };
            let row: Vec<(microlp::Variable, f64)> = constraint
                .expr
                .terms()
                .map(|(var, coeff)| (vars[var.index()], coeff))
                .collect();
            problem.add_constraint(row, op, constraint.rhs);
        }

        match problem.solve() {
            Ok(solution) => {
                let values = vars
                    .iter()
                    .enumerate()
                    .map(|(idx, handle)| (VarId(idx), solution[*handle]))
                    .collect();
                SolveOutcome {
                    verdict: Verdict::Optimal,
                    values,
                    objective: Some(solution.objective() + objective.constant_term()),
                }
            }
            Err(microlp::Error::Infeasible) => SolveOutcome::without_solution(Verdict::Infeasible),
            Err(microlp::Error::Unbounded) => SolveOutcome::without_solution(Verdict::Unbounded),
            Err(other) => SolveOutcome::without_solution(Verdict::Error(other.to_string())),
        }
    }
}
