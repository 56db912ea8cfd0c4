use std::fmt;
use std::sync::{Arc, OnceLock};

use rayon::{ThreadPool, ThreadPoolBuilder};
use redlock_core::LockInstance;
use tracing::warn;

use crate::RedlockError;
use crate::lock_result::quorum;

/// Ordered, immutable set of instances taking part in one quorum.
///
/// Cloning is cheap and shares the same instances. Changing the fleet means
/// building a new set.
///
/// Blocking fan-outs run on a pool owned by the set with one thread per
/// instance, built on first use and shared by clones.
#[derive(Clone)]
pub struct InstanceSet {
    instances: Arc<[Arc<dyn LockInstance>]>,
    pool: Arc<OnceLock<Option<ThreadPool>>>,
}

impl InstanceSet {
    /// Builds a set, possibly empty. An empty set never grants a lock.
    pub fn new(instances: impl IntoIterator<Item = Arc<dyn LockInstance>>) -> Self {
        Self {
            instances: instances.into_iter().collect(),
            pool: Arc::new(OnceLock::new()),
        }
    }

    /// Builds a set that must contain at least one instance.
    pub fn non_empty(
        instances: impl IntoIterator<Item = Arc<dyn LockInstance>>,
    ) -> Result<Self, RedlockError> {
        let set = Self::new(instances);
        if set.is_empty() {
            return Err(RedlockError::NoInstances);
        }
        Ok(set)
    }

    /// Builds a set from instances of one concrete type.
    pub fn from_instances<T>(instances: impl IntoIterator<Item = Arc<T>>) -> Self
    where
        T: LockInstance + 'static,
    {
        Self::new(
            instances
                .into_iter()
                .map(|i| i as Arc<dyn LockInstance>),
        )
    }

    pub fn empty() -> Self {
        Self::new(std::iter::empty())
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// Number of agreeing instances needed to trust a round.
    pub fn quorum(&self) -> usize {
        quorum(self.len())
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn LockInstance>> {
        self.instances.iter()
    }

    pub(crate) fn as_slice(&self) -> &[Arc<dyn LockInstance>] {
        &self.instances
    }

    /// `None` when the pool could not be built; callers then use the global
    /// rayon pool.
    pub(crate) fn pool(&self) -> Option<&ThreadPool> {
        self.pool
            .get_or_init(|| {
                ThreadPoolBuilder::new()
                    .num_threads(self.len().max(1))
                    .thread_name(|i| format!("redlock-fanout-{i}"))
                    .build()
                    .map_err(|e| {
                        warn!(error = %e, "fan-out pool unavailable, using global rayon pool");
                    })
                    .ok()
            })
            .as_ref()
    }
}

impl Default for InstanceSet {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for InstanceSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.instances.iter().map(|i| i.to_string()))
            .finish()
    }
}

impl FromIterator<Arc<dyn LockInstance>> for InstanceSet {
    fn from_iter<I: IntoIterator<Item = Arc<dyn LockInstance>>>(iter: I) -> Self {
        Self::new(iter)
    }
}
