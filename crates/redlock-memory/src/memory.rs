use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use redlock_core::{
    ClockDrift, ExtendResult, InstanceError, InstanceLockInfo, LockInstance, Metadata,
};

type MinValidityFn = dyn Fn(Duration, Duration) -> Duration + Send + Sync;

struct Entry {
    nonce: String,
    metadata: Metadata,
    /// `None` when the TTL does not fit into an `Instant`.
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(nonce: &str, ttl: Duration, metadata: Metadata) -> Self {
        Self {
            nonce: nonce.to_string(),
            metadata,
            expires_at: Instant::now().checked_add(ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn refresh(&mut self, ttl: Duration) {
        self.expires_at = Instant::now().checked_add(ttl);
    }
}

/// Lock instance backed by a `HashMap` guarded by a `Mutex`.
///
/// Entries expire lazily: an expired entry is dropped the next time its
/// resource is touched. Every call holds the mutex for its whole duration,
/// which makes each operation atomic in the same way a backend script is.
pub struct MemoryInstance {
    name: String,
    min_validity: Box<MinValidityFn>,
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryInstance {
    /// Instance whose validity is simply `ttl - locking_duration`.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_min_validity(name, |ttl, elapsed| ttl.saturating_sub(elapsed))
    }

    pub fn with_drift(name: impl Into<String>, drift: ClockDrift) -> Self {
        Self::with_min_validity(name, move |ttl, elapsed| drift.min_validity(ttl, elapsed))
    }

    pub fn with_min_validity<F>(name: impl Into<String>, min_validity: F) -> Self
    where
        F: Fn(Duration, Duration) -> Duration + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            min_validity: Box::new(min_validity),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether `resource` is currently held by `nonce`.
    pub fn contains(&self, resource: &str, nonce: &str) -> bool {
        match self.live_entries() {
            Ok(mut entries) => {
                purge_expired(&mut entries, resource);
                entries.get(resource).is_some_and(|e| e.nonce == nonce)
            }
            Err(_) => false,
        }
    }

    /// Remove `resource` regardless of its owner.
    pub fn force_unlock(&self, resource: &str) {
        if let Ok(mut entries) = self.live_entries() {
            entries.remove(resource);
        }
    }

    /// Lock `resource` for `nonce` on every instance, failing on the first one
    /// that already holds it.
    pub fn lock_all(
        resource: &str,
        nonce: &str,
        ttl: Duration,
        instances: &[Arc<MemoryInstance>],
    ) -> Result<(), InstanceError> {
        for instance in instances {
            if !instance.try_lock(resource, nonce, ttl, None)? {
                return Err(InstanceError::backend(format!(
                    "already locked: ['{resource}'] on {instance}"
                )));
            }
        }
        Ok(())
    }

    fn live_entries(&self) -> Result<MutexGuard<'_, HashMap<String, Entry>>, InstanceError> {
        self.entries
            .lock()
            .map_err(|e| InstanceError::backend(format!("{} poisoned: {e}", self.name)))
    }
}

fn purge_expired(entries: &mut HashMap<String, Entry>, resource: &str) {
    if entries
        .get(resource)
        .is_some_and(|e| e.is_expired(Instant::now()))
    {
        entries.remove(resource);
    }
}

impl fmt::Display for MemoryInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "mem:{}", self.name)
    }
}

impl fmt::Debug for MemoryInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryInstance")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl LockInstance for MemoryInstance {
    fn min_validity(&self, ttl: Duration, locking_duration: Duration) -> Duration {
        (self.min_validity)(ttl, locking_duration)
    }

    fn try_lock(
        &self,
        resource: &str,
        nonce: &str,
        ttl: Duration,
        metadata: Option<&Metadata>,
    ) -> Result<bool, InstanceError> {
        let mut entries = self.live_entries()?;
        purge_expired(&mut entries, resource);
        if entries.contains_key(resource) {
            return Ok(false);
        }
        let metadata = metadata.cloned().unwrap_or_default();
        entries.insert(resource.to_string(), Entry::new(nonce, ttl, metadata));
        Ok(true)
    }

    async fn try_lock_async(
        &self,
        resource: &str,
        nonce: &str,
        ttl: Duration,
        metadata: Option<&Metadata>,
    ) -> Result<bool, InstanceError> {
        self.try_lock(resource, nonce, ttl, metadata)
    }

    fn unlock(&self, resource: &str, nonce: &str) -> Result<(), InstanceError> {
        let mut entries = self.live_entries()?;
        if entries.get(resource).is_some_and(|e| e.nonce == nonce) {
            entries.remove(resource);
        }
        Ok(())
    }

    async fn unlock_async(&self, resource: &str, nonce: &str) -> Result<(), InstanceError> {
        self.unlock(resource, nonce)
    }

    fn try_extend(
        &self,
        resource: &str,
        nonce: &str,
        ttl: Duration,
        try_reacquire: bool,
    ) -> Result<ExtendResult, InstanceError> {
        let mut entries = self.live_entries()?;
        purge_expired(&mut entries, resource);
        match entries.get_mut(resource) {
            Some(entry) if entry.nonce == nonce => {
                entry.refresh(ttl);
                Ok(ExtendResult::Extended)
            }
            Some(_) => Ok(ExtendResult::AlreadyAcquiredByAnotherOwner),
            None if try_reacquire => {
                entries.insert(
                    resource.to_string(),
                    Entry::new(nonce, ttl, Metadata::new()),
                );
                Ok(ExtendResult::Reacquired)
            }
            None => Ok(ExtendResult::NotHeld),
        }
    }

    async fn try_extend_async(
        &self,
        resource: &str,
        nonce: &str,
        ttl: Duration,
        try_reacquire: bool,
    ) -> Result<ExtendResult, InstanceError> {
        self.try_extend(resource, nonce, ttl, try_reacquire)
    }

    fn get_info(&self, resource: &str) -> Result<Option<InstanceLockInfo>, InstanceError> {
        let mut entries = self.live_entries()?;
        purge_expired(&mut entries, resource);
        let now = Instant::now();
        Ok(entries.get(resource).map(|e| {
            InstanceLockInfo::new(
                e.nonce.clone(),
                e.metadata.clone(),
                e.expires_at.map(|at| at.saturating_duration_since(now)),
            )
        }))
    }

    async fn get_info_async(
        &self,
        resource: &str,
    ) -> Result<Option<InstanceLockInfo>, InstanceError> {
        self.get_info(resource)
    }
}
