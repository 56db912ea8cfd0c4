use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::{RedlockError, random_delay};

/// Policy consulted between failed attempts of a repeating lock or extend.
///
/// Only [`Repeater::next`] is required. The waits default to a uniformly
/// random delay in `[0, max_wait)` and the terminal error defaults to
/// [`RedlockError::Exhausted`].
#[async_trait]
pub trait Repeater: Send + Sync {
    /// Called after each failed attempt. `false` ends the loop.
    fn next(&mut self) -> bool;

    fn wait_random(&self, max_wait: Duration) {
        std::thread::sleep(random_delay(max_wait));
    }

    async fn wait_random_async(&self, max_wait: Duration) {
        tokio::time::sleep(random_delay(max_wait)).await;
    }

    /// Error returned once [`Repeater::next`] said stop.
    fn create_error(&self, resource: &str, nonce: &str, attempts: u32) -> RedlockError {
        RedlockError::exhausted(resource, nonce, attempts)
    }
}

/// Single attempt, no retry.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoRepeat;

#[async_trait]
impl Repeater for NoRepeat {
    fn next(&mut self) -> bool {
        false
    }
}

/// Allows up to `max` repeats after the first attempt.
#[derive(Debug, Clone, Copy)]
pub struct MaxRetries {
    max: u32,
    used: u32,
}

impl MaxRetries {
    pub fn new(max: u32) -> Self {
        Self { max, used: 0 }
    }

    pub fn remaining(&self) -> u32 {
        self.max - self.used
    }
}

#[async_trait]
impl Repeater for MaxRetries {
    fn next(&mut self) -> bool {
        if self.used < self.max {
            self.used += 1;
            true
        } else {
            false
        }
    }
}

/// Repeats until `token` is cancelled.
///
/// Async waits end early on cancellation. The terminal error is
/// [`RedlockError::Cancelled`].
#[derive(Debug, Clone)]
pub struct CancellationRepeater {
    token: CancellationToken,
}

impl CancellationRepeater {
    pub fn new(token: CancellationToken) -> Self {
        Self { token }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

#[async_trait]
impl Repeater for CancellationRepeater {
    fn next(&mut self) -> bool {
        !self.token.is_cancelled()
    }

    async fn wait_random_async(&self, max_wait: Duration) {
        tokio::select! {
            _ = self.token.cancelled() => {}
            _ = tokio::time::sleep(random_delay(max_wait)) => {}
        }
    }

    fn create_error(&self, resource: &str, nonce: &str, attempts: u32) -> RedlockError {
        RedlockError::cancelled(resource, nonce, attempts)
    }
}
