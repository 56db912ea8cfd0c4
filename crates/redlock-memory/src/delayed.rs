use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use redlock_core::{ExtendResult, InstanceError, InstanceLockInfo, LockInstance, Metadata};

use crate::MemoryInstance;

/// [`MemoryInstance`] that answers `try_lock` and `try_extend` only after a
/// fixed delay, like a backend on a slow link.
///
/// The state change happens after the delay, so an `unlock` issued while a
/// call is in flight runs first. `unlock` and `get_info` answer at once.
#[derive(Debug, Clone)]
pub struct DelayedInstance {
    inner: Arc<MemoryInstance>,
    delay: Duration,
}

impl DelayedInstance {
    pub fn new(inner: Arc<MemoryInstance>, delay: Duration) -> Self {
        Self { inner, delay }
    }

    pub fn inner(&self) -> &Arc<MemoryInstance> {
        &self.inner
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }
}

impl fmt::Display for DelayedInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "delayed:{}", self.inner.name())
    }
}

#[async_trait]
impl LockInstance for DelayedInstance {
    fn min_validity(&self, ttl: Duration, locking_duration: Duration) -> Duration {
        self.inner.min_validity(ttl, locking_duration)
    }

    fn try_lock(
        &self,
        resource: &str,
        nonce: &str,
        ttl: Duration,
        metadata: Option<&Metadata>,
    ) -> Result<bool, InstanceError> {
        std::thread::sleep(self.delay);
        self.inner.try_lock(resource, nonce, ttl, metadata)
    }

    async fn try_lock_async(
        &self,
        resource: &str,
        nonce: &str,
        ttl: Duration,
        metadata: Option<&Metadata>,
    ) -> Result<bool, InstanceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.try_lock(resource, nonce, ttl, metadata)
    }

    fn unlock(&self, resource: &str, nonce: &str) -> Result<(), InstanceError> {
        self.inner.unlock(resource, nonce)
    }

    async fn unlock_async(&self, resource: &str, nonce: &str) -> Result<(), InstanceError> {
        self.inner.unlock(resource, nonce)
    }

    fn try_extend(
        &self,
        resource: &str,
        nonce: &str,
        ttl: Duration,
        try_reacquire: bool,
    ) -> Result<ExtendResult, InstanceError> {
        std::thread::sleep(self.delay);
        self.inner.try_extend(resource, nonce, ttl, try_reacquire)
    }

    async fn try_extend_async(
        &self,
        resource: &str,
        nonce: &str,
        ttl: Duration,
        try_reacquire: bool,
    ) -> Result<ExtendResult, InstanceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.try_extend(resource, nonce, ttl, try_reacquire)
    }

    fn get_info(&self, resource: &str) -> Result<Option<InstanceLockInfo>, InstanceError> {
        self.inner.get_info(resource)
    }

    async fn get_info_async(
        &self,
        resource: &str,
    ) -> Result<Option<InstanceLockInfo>, InstanceError> {
        self.inner.get_info(resource)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;

    #[test]
    fn test_lock_waits_for_delay() {
        let mem = Arc::new(MemoryInstance::new("a"));
        let delayed = DelayedInstance::new(Arc::clone(&mem), Duration::from_millis(30));

        let started = Instant::now();
        assert!(delayed.try_lock("r", "n", Duration::from_secs(5), None).unwrap());
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert!(mem.contains("r", "n"));
        assert_eq!(delayed.to_string(), "delayed:a");
    }

    #[tokio::test]
    async fn test_unlock_is_immediate() {
        let mem = Arc::new(MemoryInstance::new("a"));
        let delayed = DelayedInstance::new(Arc::clone(&mem), Duration::from_secs(30));
        mem.try_lock("r", "n", Duration::from_secs(5), None).unwrap();

        let started = Instant::now();
        delayed.unlock_async("r", "n").await.unwrap();
        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(!mem.contains("r", "n"));
    }
}
