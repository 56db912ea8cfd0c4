use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Defaults applied by [`RedlockFactory`](crate::RedlockFactory) when a call
/// does not specify them.
///
/// Missing JSON fields fall back to their defaults:
///
/// ```
/// use redlock::RedlockOptions;
///
/// let options = RedlockOptions::from_json(r#"{ "default_ttl_ms": 5000 }"#).unwrap();
/// assert_eq!(options.default_ttl_ms, 5000);
/// assert_eq!(options.default_max_wait_ms, 200);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedlockOptions {
    /// Lock TTL used when none is given.
    pub default_ttl_ms: u64,
    /// Upper bound of the random wait between attempts.
    pub default_max_wait_ms: u64,
    /// Repeats allowed by the retrying entry points.
    pub default_max_retries: u32,
}

impl Default for RedlockOptions {
    fn default() -> Self {
        Self {
            default_ttl_ms: 30_000,
            default_max_wait_ms: 200,
            default_max_retries: 3,
        }
    }
}

impl RedlockOptions {
    pub fn builder() -> RedlockOptionsBuilder {
        RedlockOptionsBuilder::default()
    }

    /// Parses and validates options from a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// A zero TTL could never produce a positive validity window.
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl_ms == 0 {
            return Err(Error::InvalidConfig(
                "default_ttl_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn default_ttl(&self) -> Duration {
        Duration::from_millis(self.default_ttl_ms)
    }

    pub fn default_max_wait(&self) -> Duration {
        Duration::from_millis(self.default_max_wait_ms)
    }
}

/// Builder for `RedlockOptions`.
#[derive(Debug, Default)]
pub struct RedlockOptionsBuilder {
    default_ttl: Option<Duration>,
    default_max_wait: Option<Duration>,
    default_max_retries: Option<u32>,
}

impl RedlockOptionsBuilder {
    /// Sets the default TTL (default: 30s).
    pub fn default_ttl(mut self, ttl: Duration) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Sets the maximum wait between attempts (default: 200ms).
    pub fn default_max_wait(mut self, max_wait: Duration) -> Self {
        self.default_max_wait = Some(max_wait);
        self
    }

    /// Sets the number of repeats for retrying calls (default: 3).
    pub fn default_max_retries(mut self, retries: u32) -> Self {
        self.default_max_retries = Some(retries);
        self
    }

    /// Builds and validates the options.
    pub fn build(self) -> Result<RedlockOptions> {
        let defaults = RedlockOptions::default();
        let options = RedlockOptions {
            default_ttl_ms: self
                .default_ttl
                .map_or(defaults.default_ttl_ms, duration_ms),
            default_max_wait_ms: self
                .default_max_wait
                .map_or(defaults.default_max_wait_ms, duration_ms),
            default_max_retries: self
                .default_max_retries
                .unwrap_or(defaults.default_max_retries),
        };
        options.validate()?;
        Ok(options)
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
