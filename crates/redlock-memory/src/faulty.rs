use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use redlock_core::{ExtendResult, InstanceError, InstanceLockInfo, LockInstance, Metadata};

/// Instance whose every operation fails with a backend error.
///
/// Error messages name the operation and the instance, e.g.
/// `"unlock_async failed on faulty:b"`, so tests can tell them apart.
#[derive(Debug, Clone)]
pub struct FaultyInstance {
    name: String,
}

impl FaultyInstance {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Message carried by the error of operation `op`.
    pub fn error_message(&self, op: &str) -> String {
        format!("{op} failed on {self}")
    }

    fn fail(&self, op: &str) -> InstanceError {
        InstanceError::Backend(self.error_message(op))
    }
}

impl fmt::Display for FaultyInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "faulty:{}", self.name)
    }
}

#[async_trait]
impl LockInstance for FaultyInstance {
    fn min_validity(&self, ttl: Duration, locking_duration: Duration) -> Duration {
        ttl.saturating_sub(locking_duration)
    }

    fn try_lock(
        &self,
        _resource: &str,
        _nonce: &str,
        _ttl: Duration,
        _metadata: Option<&Metadata>,
    ) -> Result<bool, InstanceError> {
        Err(self.fail("try_lock"))
    }

    async fn try_lock_async(
        &self,
        _resource: &str,
        _nonce: &str,
        _ttl: Duration,
        _metadata: Option<&Metadata>,
    ) -> Result<bool, InstanceError> {
        Err(self.fail("try_lock_async"))
    }

    fn unlock(&self, _resource: &str, _nonce: &str) -> Result<(), InstanceError> {
        Err(self.fail("unlock"))
    }

    async fn unlock_async(&self, _resource: &str, _nonce: &str) -> Result<(), InstanceError> {
        Err(self.fail("unlock_async"))
    }

    fn try_extend(
        &self,
        _resource: &str,
        _nonce: &str,
        _ttl: Duration,
        _try_reacquire: bool,
    ) -> Result<ExtendResult, InstanceError> {
        Err(self.fail("try_extend"))
    }

    async fn try_extend_async(
        &self,
        _resource: &str,
        _nonce: &str,
        _ttl: Duration,
        _try_reacquire: bool,
    ) -> Result<ExtendResult, InstanceError> {
        Err(self.fail("try_extend_async"))
    }

    fn get_info(&self, _resource: &str) -> Result<Option<InstanceLockInfo>, InstanceError> {
        Err(self.fail("get_info"))
    }

    async fn get_info_async(
        &self,
        _resource: &str,
    ) -> Result<Option<InstanceLockInfo>, InstanceError> {
        Err(self.fail("get_info_async"))
    }
}
