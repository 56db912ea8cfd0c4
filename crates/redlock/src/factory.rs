use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use redlock_core::Metadata;
use redlock_lease::{
    AutoExtender, CancellationRepeater, Clock, InstanceSet, MaxRetries, Redlock, RedlockError,
    Repeater,
};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{LockPolicy, OptionsPolicy, RedlockOptions, Result};

/// Entry point for acquiring locks over a fixed set of instances.
///
/// Each acquisition gets a fresh nonce from the [`LockPolicy`]; retries of the
/// same acquisition reuse it. TTL and wait defaults also come from the policy.
#[derive(Clone)]
pub struct RedlockFactory {
    instances: InstanceSet,
    policy: Arc<dyn LockPolicy>,
    clock: Option<Clock>,
}

impl RedlockFactory {
    /// Factory with [`RedlockOptions::default`].
    ///
    /// # Errors
    /// [`RedlockError::NoInstances`] when `instances` is empty.
    pub fn new(instances: InstanceSet) -> Result<Self> {
        Self::builder().instances(instances).build()
    }

    pub fn builder() -> RedlockFactoryBuilder {
        RedlockFactoryBuilder::default()
    }

    pub fn instances(&self) -> &InstanceSet {
        &self.instances
    }

    pub fn policy(&self) -> &dyn LockPolicy {
        self.policy.as_ref()
    }

    pub fn clock(&self) -> Option<&Clock> {
        self.clock.as_ref()
    }

    /// One attempt with the default TTL.
    pub fn try_create(&self, resource: &str) -> Option<Redlock> {
        self.try_create_with(resource, self.policy.default_ttl(resource), None)
    }

    pub fn try_create_with(
        &self,
        resource: &str,
        ttl: Duration,
        metadata: Option<&Metadata>,
    ) -> Option<Redlock> {
        let nonce = self.policy.nonce(resource, ttl);
        Redlock::try_lock(
            resource,
            &nonce,
            ttl,
            &self.instances,
            metadata,
            self.clock.as_ref(),
        )
    }

    pub async fn try_create_async(&self, resource: &str) -> Option<Redlock> {
        self.try_create_with_async(resource, self.policy.default_ttl(resource), None)
            .await
    }

    pub async fn try_create_with_async(
        &self,
        resource: &str,
        ttl: Duration,
        metadata: Option<&Metadata>,
    ) -> Option<Redlock> {
        let nonce = self.policy.nonce(resource, ttl);
        Redlock::try_lock_async(
            resource,
            &nonce,
            ttl,
            &self.instances,
            metadata,
            self.clock.as_ref(),
        )
        .await
    }

    /// Like [`RedlockFactory::create`], but a repeater giving up yields
    /// `None` instead of an error.
    pub fn try_create_repeat<R>(
        &self,
        resource: &str,
        ttl: Duration,
        metadata: Option<&Metadata>,
        repeater: &mut R,
    ) -> Option<Redlock>
    where
        R: Repeater + ?Sized,
    {
        let nonce = self.policy.nonce(resource, ttl);
        let max_wait = self.policy.default_max_wait(resource, ttl);
        Redlock::try_lock_repeat(
            resource,
            &nonce,
            ttl,
            &self.instances,
            metadata,
            repeater,
            max_wait,
            self.clock.as_ref(),
        )
    }

    pub async fn try_create_repeat_async<R>(
        &self,
        resource: &str,
        ttl: Duration,
        metadata: Option<&Metadata>,
        repeater: &mut R,
    ) -> Option<Redlock>
    where
        R: Repeater + ?Sized,
    {
        let nonce = self.policy.nonce(resource, ttl);
        let max_wait = self.policy.default_max_wait(resource, ttl);
        Redlock::try_lock_repeat_async(
            resource,
            &nonce,
            ttl,
            &self.instances,
            metadata,
            repeater,
            max_wait,
            self.clock.as_ref(),
        )
        .await
    }

    /// Attempts until `repeater` gives up, waiting the policy's max wait.
    ///
    /// # Errors
    /// The repeater's terminal error, wrapped in [`crate::Error::Lock`].
    pub fn create<R>(
        &self,
        resource: &str,
        ttl: Duration,
        metadata: Option<&Metadata>,
        repeater: &mut R,
    ) -> Result<Redlock>
    where
        R: Repeater + ?Sized,
    {
        let nonce = self.policy.nonce(resource, ttl);
        let max_wait = self.policy.default_max_wait(resource, ttl);
        debug!(resource, nonce = %nonce, max_wait = ?max_wait, "creating lock");
        let lock = Redlock::lock(
            resource,
            &nonce,
            ttl,
            &self.instances,
            metadata,
            repeater,
            max_wait,
            self.clock.as_ref(),
        )?;
        Ok(lock)
    }

    pub async fn create_async<R>(
        &self,
        resource: &str,
        ttl: Duration,
        metadata: Option<&Metadata>,
        repeater: &mut R,
    ) -> Result<Redlock>
    where
        R: Repeater + ?Sized,
    {
        let nonce = self.policy.nonce(resource, ttl);
        let max_wait = self.policy.default_max_wait(resource, ttl);
        debug!(resource, nonce = %nonce, max_wait = ?max_wait, "creating lock");
        let lock = Redlock::lock_async(
            resource,
            &nonce,
            ttl,
            &self.instances,
            metadata,
            repeater,
            max_wait,
            self.clock.as_ref(),
        )
        .await?;
        Ok(lock)
    }

    /// [`RedlockFactory::create`] with the policy's retry count.
    pub fn create_with_retries(&self, resource: &str, ttl: Duration) -> Result<Redlock> {
        let mut repeater = MaxRetries::new(self.policy.default_max_retries(resource));
        self.create(resource, ttl, None, &mut repeater)
    }

    pub async fn create_with_retries_async(
        &self,
        resource: &str,
        ttl: Duration,
    ) -> Result<Redlock> {
        let mut repeater = MaxRetries::new(self.policy.default_max_retries(resource));
        self.create_async(resource, ttl, None, &mut repeater).await
    }

    /// Default TTL and default retry count.
    pub fn create_default(&self, resource: &str) -> Result<Redlock> {
        self.create_with_retries(resource, self.policy.default_ttl(resource))
    }

    pub async fn create_default_async(&self, resource: &str) -> Result<Redlock> {
        self.create_with_retries_async(resource, self.policy.default_ttl(resource))
            .await
    }

    /// Keeps trying until `token` is cancelled.
    ///
    /// # Errors
    /// [`RedlockError::Cancelled`] once the token fired.
    pub fn create_until_cancelled(
        &self,
        resource: &str,
        ttl: Duration,
        token: CancellationToken,
    ) -> Result<Redlock> {
        self.create(resource, ttl, None, &mut CancellationRepeater::new(token))
    }

    pub async fn create_until_cancelled_async(
        &self,
        resource: &str,
        ttl: Duration,
        token: CancellationToken,
    ) -> Result<Redlock> {
        self.create_async(resource, ttl, None, &mut CancellationRepeater::new(token))
            .await
    }

    /// Keeps `lock` alive in the background using this factory's clock.
    ///
    /// # Panics
    /// When called outside a tokio runtime.
    pub fn auto_extend(&self, lock: Arc<Redlock>, interval: Duration) -> AutoExtender {
        AutoExtender::spawn(lock, interval, false, self.clock.clone())
    }
}

impl fmt::Debug for RedlockFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedlockFactory")
            .field("instances", &self.instances)
            .field("clock", &self.clock.as_ref().map(|_| "custom"))
            .finish_non_exhaustive()
    }
}

/// Builder for `RedlockFactory`.
#[derive(Default)]
pub struct RedlockFactoryBuilder {
    instances: Option<InstanceSet>,
    policy: Option<Arc<dyn LockPolicy>>,
    clock: Option<Clock>,
}

impl RedlockFactoryBuilder {
    /// Sets the instances (required, non-empty).
    pub fn instances(mut self, instances: InstanceSet) -> Self {
        self.instances = Some(instances);
        self
    }

    /// Sets a custom policy. Replaces any options given before.
    pub fn policy(mut self, policy: impl LockPolicy + 'static) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    /// Uses an [`OptionsPolicy`] over `options`.
    pub fn options(self, options: RedlockOptions) -> Self {
        self.policy(OptionsPolicy::new(options))
    }

    /// Sets the clock used for validity deadlines (default: system UTC).
    pub fn clock(mut self, clock: Clock) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the factory.
    ///
    /// # Errors
    /// [`RedlockError::NoInstances`] when no instance was given.
    pub fn build(self) -> Result<RedlockFactory> {
        let instances = self.instances.unwrap_or_default();
        if instances.is_empty() {
            return Err(RedlockError::NoInstances.into());
        }
        Ok(RedlockFactory {
            instances,
            policy: self
                .policy
                .unwrap_or_else(|| Arc::new(OptionsPolicy::default())),
            clock: self.clock,
        })
    }
}
