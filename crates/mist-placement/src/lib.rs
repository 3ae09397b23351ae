//! mist-placement — MILP formulation of the Mist placement problem.
//!
//! A [`PlacementOptimizer`] takes a [`mist_core::Scenario`], normalizes it,
//! creates one binary assignment variable per (request, node) pair and one
//! presence indicator per (node, service) pair, and emits the hard
//! constraints: every request served exactly once, node capacity, who may
//! deploy or request what, geographic limits and metadata rules.
//!
//! The objective is selected once, either the average of all slacks or
//! the sum of each slack category's worst case, and the model is handed
//! to a [`SolverBackend`] (by default the pure-Rust [`MicrolpBackend`]).
//! Results come back as a [`SolutionTable`].

pub mod constraints;
pub mod indicator;
pub mod linear;
pub mod normalize;
pub mod objective;
pub mod optimizer;
pub mod solution;
pub mod solver;
pub mod variables;

pub use linear::{Comparison, LinearExpr, LinearModel, VarId, VarKind};
pub use normalize::{Domain, normalize};
pub use objective::{Objective, SlackCategory};
pub use optimizer::{ModelState, PlacementOptimizer};
pub use solution::{Assignment, SolutionTable};
pub use solver::{MicrolpBackend, SolveOutcome, SolverBackend, Verdict};
