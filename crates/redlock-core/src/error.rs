use std::time::Duration;

use thiserror::Error;

/// Failure reported by a single lock instance.
///
/// Instance errors never reach callers of the quorum algorithm: the fan-out
/// logs them and counts the instance as a failed vote.
#[derive(Error, Debug)]
pub enum InstanceError {
    /// The backend answered but rejected or could not run the command.
    #[error("backend error: {0}")]
    Backend(String),

    /// The backend could not be reached.
    #[error("instance unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete within the instance's own deadline.
    #[error("instance call timed out after {0:?}")]
    Timeout(Duration),

    /// Any other backend specific failure.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl InstanceError {
    pub fn backend(msg: impl Into<String>) -> Self {
        Self::Backend(msg.into())
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }
}
