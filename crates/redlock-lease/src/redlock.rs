use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use redlock_core::Metadata;
use tracing::{debug, trace};

use crate::clock::{self, Clock};
use crate::{InstanceSet, LockResult, RedlockError, Repeater};

/// An acquired Redlock.
///
/// A handle only exists after a quorum of instances agreed on its nonce.
/// Releasing is idempotent and also happens on drop. Dropping a handle runs a
/// blocking fan-out, so async callers should prefer
/// [`Redlock::release_async`] first.
///
/// The validity deadline is the only field that changes after construction
/// (through a successful extend) and may be read concurrently.
#[derive(Debug)]
pub struct Redlock {
    resource: String,
    nonce: String,
    ttl: Duration,
    valid_until: AtomicI64,
    released: AtomicBool,
    instances: InstanceSet,
}

impl Redlock {
    fn acquired(
        resource: &str,
        nonce: &str,
        ttl: Duration,
        instances: &InstanceSet,
        valid_until: DateTime<Utc>,
    ) -> Self {
        Self {
            resource: resource.to_string(),
            nonce: nonce.to_string(),
            ttl,
            valid_until: AtomicI64::new(clock::to_nanos(valid_until)),
            released: AtomicBool::new(false),
            instances: instances.clone(),
        }
    }

    /// Single acquisition attempt.
    ///
    /// Returns `None` when no quorum was reached or the validity window was
    /// used up. In that case every instance is asked to drop `nonce` before
    /// returning, so no partial lock survives.
    pub fn try_lock(
        resource: &str,
        nonce: &str,
        ttl: Duration,
        instances: &InstanceSet,
        metadata: Option<&Metadata>,
        clock: Option<&Clock>,
    ) -> Option<Self> {
        debug!(resource, nonce, ttl = ?ttl, instances = instances.len(), "trying to lock");
        let result = instances.try_lock_all(resource, nonce, ttl, metadata);
        match decide("lock", &result, resource, nonce, clock) {
            Some(valid_until) => Some(Self::acquired(resource, nonce, ttl, instances, valid_until)),
            None => {
                debug!(resource, nonce, "rolling back partial lock");
                instances.unlock_all(resource, nonce);
                None
            }
        }
    }

    pub async fn try_lock_async(
        resource: &str,
        nonce: &str,
        ttl: Duration,
        instances: &InstanceSet,
        metadata: Option<&Metadata>,
        clock: Option<&Clock>,
    ) -> Option<Self> {
        debug!(resource, nonce, ttl = ?ttl, instances = instances.len(), "trying to lock");
        let result = instances
            .try_lock_all_async(resource, nonce, ttl, metadata)
            .await;
        match decide("lock", &result, resource, nonce, clock) {
            Some(valid_until) => Some(Self::acquired(resource, nonce, ttl, instances, valid_until)),
            None => {
                debug!(resource, nonce, "rolling back partial lock");
                instances.unlock_all_async(resource, nonce).await;
                None
            }
        }
    }

    /// Repeats [`Redlock::try_lock`] with the same nonce until it succeeds or
    /// `repeater` gives up, waiting a random delay below `max_wait` in between.
    ///
    /// # Errors
    /// The error built by [`Repeater::create_error`], carrying the number of
    /// failed attempts.
    #[allow(clippy::too_many_arguments)]
    pub fn lock<R>(
        resource: &str,
        nonce: &str,
        ttl: Duration,
        instances: &InstanceSet,
        metadata: Option<&Metadata>,
        repeater: &mut R,
        max_wait: Duration,
        clock: Option<&Clock>,
    ) -> Result<Self, RedlockError>
    where
        R: Repeater + ?Sized,
    {
        repeat(repeater, max_wait, resource, nonce, || {
            Self::try_lock(resource, nonce, ttl, instances, metadata, clock)
        })
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn lock_async<R>(
        resource: &str,
        nonce: &str,
        ttl: Duration,
        instances: &InstanceSet,
        metadata: Option<&Metadata>,
        repeater: &mut R,
        max_wait: Duration,
        clock: Option<&Clock>,
    ) -> Result<Self, RedlockError>
    where
        R: Repeater + ?Sized,
    {
        repeat_async(repeater, max_wait, resource, nonce, move || {
            Self::try_lock_async(resource, nonce, ttl, instances, metadata, clock)
        })
        .await
    }

    /// Like [`Redlock::lock`], but reports exhaustion as `None`.
    #[allow(clippy::too_many_arguments)]
    pub fn try_lock_repeat<R>(
        resource: &str,
        nonce: &str,
        ttl: Duration,
        instances: &InstanceSet,
        metadata: Option<&Metadata>,
        repeater: &mut R,
        max_wait: Duration,
        clock: Option<&Clock>,
    ) -> Option<Self>
    where
        R: Repeater + ?Sized,
    {
        Self::lock(
            resource, nonce, ttl, instances, metadata, repeater, max_wait, clock,
        )
        .ok()
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn try_lock_repeat_async<R>(
        resource: &str,
        nonce: &str,
        ttl: Duration,
        instances: &InstanceSet,
        metadata: Option<&Metadata>,
        repeater: &mut R,
        max_wait: Duration,
        clock: Option<&Clock>,
    ) -> Option<Self>
    where
        R: Repeater + ?Sized,
    {
        Self::lock_async(
            resource, nonce, ttl, instances, metadata, repeater, max_wait, clock,
        )
        .await
        .ok()
    }

    /// Single extension attempt with this handle's resource, nonce and TTL.
    ///
    /// On success the new deadline replaces the old one and is returned. On
    /// failure the handle is left untouched; whether that means the lock is
    /// lost is up to the caller. A released handle never extends.
    pub fn try_extend(&self, try_reacquire: bool, clock: Option<&Clock>) -> Option<DateTime<Utc>> {
        if self.is_released() {
            return None;
        }
        debug!(resource = %self.resource, nonce = %self.nonce, try_reacquire, "trying to extend");
        let result =
            self.instances
                .try_extend_all(&self.resource, &self.nonce, self.ttl, try_reacquire);
        if self.released_during_extend() {
            self.instances.unlock_all(&self.resource, &self.nonce);
            return None;
        }
        self.apply_extension(&result, clock)
    }

    pub async fn try_extend_async(
        &self,
        try_reacquire: bool,
        clock: Option<&Clock>,
    ) -> Option<DateTime<Utc>> {
        if self.is_released() {
            return None;
        }
        debug!(resource = %self.resource, nonce = %self.nonce, try_reacquire, "trying to extend");
        let result = self
            .instances
            .try_extend_all_async(&self.resource, &self.nonce, self.ttl, try_reacquire)
            .await;
        if self.released_during_extend() {
            self.instances
                .unlock_all_async(&self.resource, &self.nonce)
                .await;
            return None;
        }
        self.apply_extension(&result, clock)
    }

    /// Repeats [`Redlock::try_extend`] until it succeeds or `repeater` gives up.
    ///
    /// # Errors
    /// The error built by [`Repeater::create_error`].
    pub fn extend<R>(
        &self,
        try_reacquire: bool,
        repeater: &mut R,
        max_wait: Duration,
        clock: Option<&Clock>,
    ) -> Result<DateTime<Utc>, RedlockError>
    where
        R: Repeater + ?Sized,
    {
        repeat(repeater, max_wait, &self.resource, &self.nonce, || {
            self.try_extend(try_reacquire, clock)
        })
    }

    pub async fn extend_async<R>(
        &self,
        try_reacquire: bool,
        repeater: &mut R,
        max_wait: Duration,
        clock: Option<&Clock>,
    ) -> Result<DateTime<Utc>, RedlockError>
    where
        R: Repeater + ?Sized,
    {
        repeat_async(repeater, max_wait, &self.resource, &self.nonce, move || {
            self.try_extend_async(try_reacquire, clock)
        })
        .await
    }

    /// Like [`Redlock::extend`], but reports exhaustion as `None`.
    pub fn try_extend_repeat<R>(
        &self,
        try_reacquire: bool,
        repeater: &mut R,
        max_wait: Duration,
        clock: Option<&Clock>,
    ) -> Option<DateTime<Utc>>
    where
        R: Repeater + ?Sized,
    {
        self.extend(try_reacquire, repeater, max_wait, clock).ok()
    }

    pub async fn try_extend_repeat_async<R>(
        &self,
        try_reacquire: bool,
        repeater: &mut R,
        max_wait: Duration,
        clock: Option<&Clock>,
    ) -> Option<DateTime<Utc>>
    where
        R: Repeater + ?Sized,
    {
        self.extend_async(try_reacquire, repeater, max_wait, clock)
            .await
            .ok()
    }

    /// Release the resource on every instance.
    ///
    /// Only the first call does anything. Instance failures are logged and
    /// otherwise ignored; leftovers expire with their TTL.
    pub fn release(&self) {
        if !self.begin_release() {
            return;
        }
        self.instances.unlock_all(&self.resource, &self.nonce);
    }

    pub async fn release_async(&self) {
        if !self.begin_release() {
            return;
        }
        self.instances
            .unlock_all_async(&self.resource, &self.nonce)
            .await;
    }

    fn begin_release(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }
        if self.instances.is_empty() {
            return false;
        }
        debug!(resource = %self.resource, nonce = %self.nonce, "releasing lock");
        true
    }

    /// A release that ran while the extend round was in flight may have been
    /// overtaken by a reacquire; the caller unlocks again when this is true.
    fn released_during_extend(&self) -> bool {
        if !self.is_released() {
            return false;
        }
        debug!(
            resource = %self.resource,
            nonce = %self.nonce,
            "released during extend, unlocking again"
        );
        true
    }

    fn apply_extension(&self, result: &LockResult, clock: Option<&Clock>) -> Option<DateTime<Utc>> {
        let valid_until = decide("extend", result, &self.resource, &self.nonce, clock)?;
        self.valid_until
            .store(clock::to_nanos(valid_until), Ordering::Release);
        Some(valid_until)
    }

    pub fn resource(&self) -> &str {
        &self.resource
    }

    pub fn nonce(&self) -> &str {
        &self.nonce
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn instances(&self) -> &InstanceSet {
        &self.instances
    }

    /// Deadline up to which the lock can be trusted.
    pub fn valid_until(&self) -> DateTime<Utc> {
        clock::from_nanos(self.valid_until.load(Ordering::Acquire))
    }

    /// Time left before [`Redlock::valid_until`], zero once it passed.
    pub fn remaining_validity(&self, now: DateTime<Utc>) -> Duration {
        (self.valid_until() - now).to_std().unwrap_or(Duration::ZERO)
    }

    /// Not released and still inside its validity window at `now`.
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        !self.is_released() && self.valid_until() > now
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }
}

/// An empty handle over no instances. Releasing it does nothing.
impl Default for Redlock {
    fn default() -> Self {
        Self {
            resource: String::new(),
            nonce: String::new(),
            ttl: Duration::ZERO,
            valid_until: AtomicI64::new(0),
            released: AtomicBool::new(false),
            instances: InstanceSet::empty(),
        }
    }
}

impl Drop for Redlock {
    fn drop(&mut self) {
        self.release();
    }
}

fn decide(
    op: &'static str,
    result: &LockResult,
    resource: &str,
    nonce: &str,
    clock: Option<&Clock>,
) -> Option<DateTime<Utc>> {
    let valid_until = result.valid_until(clock::now(clock));
    match valid_until {
        Some(until) => debug!(
            op,
            resource,
            nonce,
            locked_on = result.locked_count(),
            quorum = result.quorum(),
            elapsed = ?result.elapsed(),
            valid_until = %until,
            "quorum reached"
        ),
        None => debug!(
            op,
            resource,
            nonce,
            locked_on = result.locked_count(),
            quorum = result.quorum(),
            elapsed = ?result.elapsed(),
            min_validity = ?result.min_validity(),
            "quorum not reached"
        ),
    }
    valid_until
}

fn repeat<T, R>(
    repeater: &mut R,
    max_wait: Duration,
    resource: &str,
    nonce: &str,
    mut attempt: impl FnMut() -> Option<T>,
) -> Result<T, RedlockError>
where
    R: Repeater + ?Sized,
{
    let mut attempts: u32 = 0;
    loop {
        if let Some(value) = attempt() {
            return Ok(value);
        }
        attempts = attempts.saturating_add(1);
        if !repeater.next() {
            trace!(resource, nonce, attempts, "repeater stopped");
            return Err(repeater.create_error(resource, nonce, attempts));
        }
        trace!(resource, nonce, attempts, max_wait = ?max_wait, "repeating attempt");
        repeater.wait_random(max_wait);
    }
}

async fn repeat_async<T, R, F, Fut>(
    repeater: &mut R,
    max_wait: Duration,
    resource: &str,
    nonce: &str,
    mut attempt: F,
) -> Result<T, RedlockError>
where
    R: Repeater + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let mut attempts: u32 = 0;
    loop {
        if let Some(value) = attempt().await {
            return Ok(value);
        }
        attempts = attempts.saturating_add(1);
        if !repeater.next() {
            trace!(resource, nonce, attempts, "repeater stopped");
            return Err(repeater.create_error(resource, nonce, attempts));
        }
        trace!(resource, nonce, attempts, max_wait = ?max_wait, "repeating attempt");
        repeater.wait_random_async(max_wait).await;
    }
}
