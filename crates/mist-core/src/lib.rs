//! mist-core — domain model for the Mist placement optimizer.
//!
//! Nodes, services, requests and the two policy kinds are plain serde
//! types keyed by identifier. Collections are `BTreeMap`s so that every
//! downstream consumer (variable naming, constraint emission, LP export)
//! iterates in a stable order.

pub mod error;
pub mod scenario;
pub mod types;

pub use error::{ModelError, ModelResult};
pub use scenario::{Scenario, ScenarioPaths};
pub use types::*;
