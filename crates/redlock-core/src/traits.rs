use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::{ExtendResult, InstanceError, InstanceLockInfo, Metadata};

/// One independent storage node taking part in a Redlock quorum.
///
/// Every operation comes in a blocking and an `async` form with identical
/// semantics. Implementations must be atomic per call:
///
/// * `try_lock` is a check-and-set: it stores `nonce` only if nothing is stored.
/// * `unlock` is a check-and-delete: it removes the value only if it equals `nonce`.
/// * `try_extend` is a check-and-refresh, optionally claiming a free resource.
///
/// Backend failures are returned as errors and never swallowed here; the
/// quorum engine decides what to do with them. The `Display` impl is used to
/// identify the instance in diagnostics.
#[async_trait]
pub trait LockInstance: fmt::Display + Send + Sync {
    /// Estimate of how long a lock stays trustworthy on this instance.
    ///
    /// # Arguments
    /// * `ttl` - TTL requested from the backend.
    /// * `locking_duration` - Wall-clock time of the whole fan-out round.
    fn min_validity(&self, ttl: Duration, locking_duration: Duration) -> Duration;

    /// Set `resource = nonce` with the given TTL if the resource is free.
    ///
    /// # Returns
    /// * `Ok(true)` only if this call stored the nonce.
    fn try_lock(
        &self,
        resource: &str,
        nonce: &str,
        ttl: Duration,
        metadata: Option<&Metadata>,
    ) -> Result<bool, InstanceError>;

    async fn try_lock_async(
        &self,
        resource: &str,
        nonce: &str,
        ttl: Duration,
        metadata: Option<&Metadata>,
    ) -> Result<bool, InstanceError>;

    /// Delete `resource` if it is currently held by `nonce`. No-op otherwise.
    fn unlock(&self, resource: &str, nonce: &str) -> Result<(), InstanceError>;

    async fn unlock_async(&self, resource: &str, nonce: &str) -> Result<(), InstanceError>;

    /// Refresh the TTL of `resource` if it is held by `nonce`.
    ///
    /// With `try_reacquire` set, a free resource is claimed for `nonce` and
    /// [`ExtendResult::Reacquired`] is returned.
    fn try_extend(
        &self,
        resource: &str,
        nonce: &str,
        ttl: Duration,
        try_reacquire: bool,
    ) -> Result<ExtendResult, InstanceError>;

    async fn try_extend_async(
        &self,
        resource: &str,
        nonce: &str,
        ttl: Duration,
        try_reacquire: bool,
    ) -> Result<ExtendResult, InstanceError>;

    /// Read the current owner of `resource`, `None` if it is not held.
    fn get_info(&self, resource: &str) -> Result<Option<InstanceLockInfo>, InstanceError>;

    async fn get_info_async(&self, resource: &str)
    -> Result<Option<InstanceLockInfo>, InstanceError>;
}
