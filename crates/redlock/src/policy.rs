use std::time::Duration;

use uuid::Uuid;

use crate::RedlockOptions;

/// Supplies nonces and per-resource defaults to the factory.
pub trait LockPolicy: Send + Sync {
    /// A fresh owner token for one acquisition.
    ///
    /// Defaults to a random UUID rendered as 32 hex characters.
    fn nonce(&self, _resource: &str, _ttl: Duration) -> String {
        Uuid::new_v4().simple().to_string()
    }

    fn default_ttl(&self, resource: &str) -> Duration;

    fn default_max_wait(&self, resource: &str, ttl: Duration) -> Duration;

    fn default_max_retries(&self, resource: &str) -> u32;
}

/// Same defaults for every resource, taken from [`RedlockOptions`].
#[derive(Debug, Clone, Default)]
pub struct OptionsPolicy {
    options: RedlockOptions,
}

impl OptionsPolicy {
    pub fn new(options: RedlockOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RedlockOptions {
        &self.options
    }
}

impl LockPolicy for OptionsPolicy {
    fn default_ttl(&self, _resource: &str) -> Duration {
        self.options.default_ttl()
    }

    fn default_max_wait(&self, _resource: &str, _ttl: Duration) -> Duration {
        self.options.default_max_wait()
    }

    fn default_max_retries(&self, _resource: &str) -> u32 {
        self.options.default_max_retries
    }
}
