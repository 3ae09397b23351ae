//! Error types for building a placement model.

use thiserror::Error;

/// Result type alias for model construction.
pub type ModelResult<T> = Result<T, ModelError>;

/// Errors that make a placement model impossible to build.
///
/// Unauthorized policies are not errors: they are dropped during
/// normalization. Only references to entities that do not exist are.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown node `{node}` referenced by {referenced_by}")]
    UnknownNode { node: String, referenced_by: String },

    #[error("unknown service `{service}` referenced by {referenced_by}")]
    UnknownService {
        service: String,
        referenced_by: String,
    },

    #[error("unknown request `{0}`")]
    UnknownRequest(String),
}
