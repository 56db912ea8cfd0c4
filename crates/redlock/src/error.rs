use thiserror::Error;

/// Unified error type for the `redlock` crate.
///
/// Aggregates errors from the sub-crates and from configuration loading into a
/// single type for application-level error handling.
#[derive(Error, Debug)]
pub enum Error {
    /// A repeating acquire or extend gave up, or a precondition failed.
    #[error("Lock error: {0}")]
    Lock(#[from] redlock_lease::RedlockError),

    /// Error reported by a lock instance outside the quorum fan-out.
    #[error("Instance error: {0}")]
    Instance(#[from] redlock_core::InstanceError),

    /// Options could not be parsed.
    #[error("Configuration error: {0}")]
    Config(#[from] serde_json::Error),

    /// Options parsed but are not usable.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The tracing subscriber or exporter could not be installed.
    #[error("Telemetry error: {0}")]
    Telemetry(String),

    /// Standard IO error.
    #[error("IO error: {0}")]
    IO(#[from] std::io::Error),
}

impl Error {
    /// Whether this is the cancellation flavour of a repeater failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Lock(e) if e.is_cancelled())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
