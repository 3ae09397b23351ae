//! Manifest generation errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum KubeError {
    #[error("no container spec for service `{0}`")]
    MissingContainers(String),

    #[error("no port for service `{0}`")]
    MissingPort(String),

    #[error("container {index} of `{owner}` is not an object")]
    InvalidContainer { owner: String, index: usize },
}

pub type KubeResult<T> = Result<T, KubeError>;
