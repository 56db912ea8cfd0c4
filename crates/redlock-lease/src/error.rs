use thiserror::Error;

/// Errors surfaced by the quorum engine.
///
/// Instance failures never appear here. They are logged and counted by the
/// fan-out; only repeater decisions and preconditions become errors.
#[derive(Error, Debug)]
pub enum RedlockError {
    /// The repeater refused another attempt.
    #[error("unable to obtain lock to ['{resource}'] = '{nonce}' on {attempts} attempts")]
    Exhausted {
        resource: String,
        nonce: String,
        attempts: u32,
    },

    /// The cancellation bound repeater observed a cancelled token.
    #[error("locking ['{resource}'] = '{nonce}' cancelled after {attempts} attempts")]
    Cancelled {
        resource: String,
        nonce: String,
        attempts: u32,
    },

    /// A non-empty instance set was required.
    #[error("instance set must not be empty")]
    NoInstances,

    /// Error produced by a custom repeater.
    #[error(transparent)]
    Custom(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl RedlockError {
    pub fn exhausted(resource: &str, nonce: &str, attempts: u32) -> Self {
        Self::Exhausted {
            resource: resource.to_string(),
            nonce: nonce.to_string(),
            attempts,
        }
    }

    pub fn cancelled(resource: &str, nonce: &str, attempts: u32) -> Self {
        Self::Cancelled {
            resource: resource.to_string(),
            nonce: nonce.to_string(),
            attempts,
        }
    }

    /// Number of failed attempts, for repeater errors.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            Self::Exhausted { attempts, .. } | Self::Cancelled { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }
}
