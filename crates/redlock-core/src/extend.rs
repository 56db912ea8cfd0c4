use serde::{Deserialize, Serialize};

use crate::InstanceError;

/// Outcome of [`LockInstance::try_extend`](crate::LockInstance::try_extend) on one instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtendResult {
    /// Same owner, TTL refreshed.
    Extended,
    /// The resource was free and has been claimed again for the same nonce.
    Reacquired,
    /// Another nonce currently holds the resource.
    AlreadyAcquiredByAnotherOwner,
    /// Nothing is stored and reacquisition was not requested.
    NotHeld,
}

impl ExtendResult {
    pub fn is_success(self) -> bool {
        matches!(self, Self::Extended | Self::Reacquired)
    }

    pub fn is_failure(self) -> bool {
        !self.is_success()
    }

    /// Numeric code returned by scripted backends (positive on success).
    pub fn code(self) -> i64 {
        match self {
            Self::Extended => 1,
            Self::Reacquired => 2,
            Self::AlreadyAcquiredByAnotherOwner => -1,
            Self::NotHeld => -2,
        }
    }
}

impl TryFrom<i64> for ExtendResult {
    type Error = InstanceError;

    fn try_from(code: i64) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(Self::Extended),
            2 => Ok(Self::Reacquired),
            -1 => Ok(Self::AlreadyAcquiredByAnotherOwner),
            -2 => Ok(Self::NotHeld),
            other => Err(InstanceError::backend(format!(
                "unexpected extend result code {other}"
            ))),
        }
    }
}
