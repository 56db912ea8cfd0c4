//! Concurrent dispatch of one instance operation across an [`InstanceSet`].
//!
//! Every per-instance call is wrapped so that its error is logged once at
//! `ERROR` and counted as a failed vote. Nothing thrown by an instance ever
//! leaves this module.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use futures::future::join_all;
use rayon::prelude::*;
use redlock_core::{InstanceError, InstanceLockInfo, LockInstance, Metadata};
use tracing::{Dispatch, Span, dispatcher};

use crate::InstanceSet;
use crate::lock_result::{LockResult, RoundTimer};

impl InstanceSet {
    /// Try to lock `resource` on every instance in parallel, blocking until
    /// all of them answered.
    pub fn try_lock_all(
        &self,
        resource: &str,
        nonce: &str,
        ttl: Duration,
        metadata: Option<&Metadata>,
    ) -> LockResult {
        if self.is_empty() {
            return LockResult::empty();
        }
        let timer = RoundTimer::start(self, ttl);
        let locked = self.count_parallel(|instance| {
            lock_safe(instance, resource, nonce, ttl, metadata)
        });
        timer.finish(locked)
    }

    pub async fn try_lock_all_async(
        &self,
        resource: &str,
        nonce: &str,
        ttl: Duration,
        metadata: Option<&Metadata>,
    ) -> LockResult {
        if self.is_empty() {
            return LockResult::empty();
        }
        let timer = RoundTimer::start(self, ttl);
        let votes = join_all(
            self.iter()
                .map(|instance| lock_safe_async(instance.as_ref(), resource, nonce, ttl, metadata)),
        )
        .await;
        timer.finish(count_votes(&votes))
    }

    /// Release `resource` on every instance. Failures are only logged.
    pub fn unlock_all(&self, resource: &str, nonce: &str) {
        if self.is_empty() {
            return;
        }
        self.map_parallel(|instance| unlock_safe(instance, resource, nonce));
    }

    pub async fn unlock_all_async(&self, resource: &str, nonce: &str) {
        if self.is_empty() {
            return;
        }
        join_all(
            self.iter()
                .map(|instance| unlock_safe_async(instance.as_ref(), resource, nonce)),
        )
        .await;
    }

    /// Extend `resource` on every instance, counting
    /// [`redlock_core::ExtendResult::is_success`] answers as votes.
    pub fn try_extend_all(
        &self,
        resource: &str,
        nonce: &str,
        ttl: Duration,
        try_reacquire: bool,
    ) -> LockResult {
        if self.is_empty() {
            return LockResult::empty();
        }
        let timer = RoundTimer::start(self, ttl);
        let extended = self.count_parallel(|instance| {
            extend_safe(instance, resource, nonce, ttl, try_reacquire)
        });
        timer.finish(extended)
    }

    pub async fn try_extend_all_async(
        &self,
        resource: &str,
        nonce: &str,
        ttl: Duration,
        try_reacquire: bool,
    ) -> LockResult {
        if self.is_empty() {
            return LockResult::empty();
        }
        let timer = RoundTimer::start(self, ttl);
        let votes = join_all(self.iter().map(|instance| {
            extend_safe_async(instance.as_ref(), resource, nonce, ttl, try_reacquire)
        }))
        .await;
        timer.finish(count_votes(&votes))
    }

    /// Snapshot of `resource` on each instance, in set order.
    ///
    /// An instance that fails to answer is logged and reported as `None`,
    /// the same as an instance where the resource is free.
    pub fn get_info_all(&self, resource: &str) -> Vec<Option<InstanceLockInfo>> {
        self.map_parallel(|instance| info_safe(instance, resource))
    }

    pub async fn get_info_all_async(&self, resource: &str) -> Vec<Option<InstanceLockInfo>> {
        join_all(
            self.iter()
                .map(|instance| info_safe_async(instance.as_ref(), resource)),
        )
        .await
    }

    fn count_parallel<F>(&self, op: F) -> usize
    where
        F: Fn(&dyn LockInstance) -> bool + Send + Sync,
    {
        let votes = AtomicUsize::new(0);
        self.map_parallel(|instance| {
            if op(instance) {
                votes.fetch_add(1, Ordering::Relaxed);
            }
        });
        votes.into_inner()
    }

    /// Runs `op` for every instance at the same time and returns the results
    /// in set order.
    ///
    /// Each instance gets its own job on the set's pool, so a round lasts as
    /// long as its slowest instance. Worker threads do not inherit the
    /// caller's subscriber, so the current dispatcher and span are carried
    /// over explicitly.
    fn map_parallel<T, F>(&self, op: F) -> Vec<T>
    where
        T: Send,
        F: Fn(&dyn LockInstance) -> T + Send + Sync,
    {
        if self.is_empty() {
            return Vec::new();
        }
        let dispatch = dispatcher::get_default(Dispatch::clone);
        let span = Span::current();
        let run = || {
            self.as_slice()
                .par_iter()
                .with_max_len(1)
                .map(|instance| {
                    dispatcher::with_default(&dispatch, || {
                        span.in_scope(|| op(instance.as_ref()))
                    })
                })
                .collect::<Vec<T>>()
        };
        match self.pool() {
            Some(pool) => pool.install(run),
            None => run(),
        }
    }
}

fn count_votes(votes: &[bool]) -> usize {
    votes.iter().filter(|&&vote| vote).count()
}

fn log_failure(
    op: &'static str,
    instance: &dyn LockInstance,
    resource: &str,
    nonce: &str,
    error: &InstanceError,
) {
    tracing::error!(
        op,
        resource,
        nonce,
        instance = %instance,
        error = %error,
        "lock instance call failed"
    );
}

fn lock_safe(
    instance: &dyn LockInstance,
    resource: &str,
    nonce: &str,
    ttl: Duration,
    metadata: Option<&Metadata>,
) -> bool {
    instance
        .try_lock(resource, nonce, ttl, metadata)
        .unwrap_or_else(|e| {
            log_failure("try_lock", instance, resource, nonce, &e);
            false
        })
}

async fn lock_safe_async(
    instance: &dyn LockInstance,
    resource: &str,
    nonce: &str,
    ttl: Duration,
    metadata: Option<&Metadata>,
) -> bool {
    instance
        .try_lock_async(resource, nonce, ttl, metadata)
        .await
        .unwrap_or_else(|e| {
            log_failure("try_lock", instance, resource, nonce, &e);
            false
        })
}

fn unlock_safe(instance: &dyn LockInstance, resource: &str, nonce: &str) {
    if let Err(e) = instance.unlock(resource, nonce) {
        log_failure("unlock", instance, resource, nonce, &e);
    }
}

async fn unlock_safe_async(instance: &dyn LockInstance, resource: &str, nonce: &str) {
    if let Err(e) = instance.unlock_async(resource, nonce).await {
        log_failure("unlock", instance, resource, nonce, &e);
    }
}

fn extend_safe(
    instance: &dyn LockInstance,
    resource: &str,
    nonce: &str,
    ttl: Duration,
    try_reacquire: bool,
) -> bool {
    match instance.try_extend(resource, nonce, ttl, try_reacquire) {
        Ok(result) => result.is_success(),
        Err(e) => {
            log_failure("try_extend", instance, resource, nonce, &e);
            false
        }
    }
}

async fn extend_safe_async(
    instance: &dyn LockInstance,
    resource: &str,
    nonce: &str,
    ttl: Duration,
    try_reacquire: bool,
) -> bool {
    match instance
        .try_extend_async(resource, nonce, ttl, try_reacquire)
        .await
    {
        Ok(result) => result.is_success(),
        Err(e) => {
            log_failure("try_extend", instance, resource, nonce, &e);
            false
        }
    }
}

fn info_safe(instance: &dyn LockInstance, resource: &str) -> Option<InstanceLockInfo> {
    instance.get_info(resource).unwrap_or_else(|e| {
        log_failure("get_info", instance, resource, "", &e);
        None
    })
}

async fn info_safe_async(instance: &dyn LockInstance, resource: &str) -> Option<InstanceLockInfo> {
    instance.get_info_async(resource).await.unwrap_or_else(|e| {
        log_failure("get_info", instance, resource, "", &e);
        None
    })
}
