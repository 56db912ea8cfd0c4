use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Clock drift budget used to turn a requested TTL into a trustworthy validity window.
///
/// `min_validity = ttl - locking_duration - ttl * factor - constant`, saturating at zero.
/// The constant absorbs storage expiry resolution and rounding of the TTL when it
/// is sent to the backend in whole milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClockDrift {
    pub factor: f64,
    pub constant: Duration,
}

impl ClockDrift {
    pub const fn new(factor: f64, constant: Duration) -> Self {
        Self { factor, constant }
    }

    /// Redis expires keys with up to 1 ms error, and the TTL is truncated to whole
    /// milliseconds on the way out.
    pub const fn redis() -> Self {
        Self::new(0.01, Duration::from_millis(2))
    }

    /// No drift budget at all. Only meaningful for in-process instances.
    pub const fn none() -> Self {
        Self::new(0.0, Duration::ZERO)
    }

    /// `ttl - locking_duration - ttl * factor - constant`, saturating at zero.
    ///
    /// A NaN or negative factor counts as zero. A factor above one counts as
    /// one, so the drift never exceeds the TTL.
    pub fn min_validity(&self, ttl: Duration, locking_duration: Duration) -> Duration {
        let factor = if self.factor.is_nan() {
            0.0
        } else {
            self.factor.clamp(0.0, 1.0)
        };
        let drift = Duration::try_from_secs_f64(ttl.as_secs_f64() * factor).unwrap_or(ttl);
        ttl.saturating_sub(locking_duration)
            .saturating_sub(drift)
            .saturating_sub(self.constant)
    }
}

impl Default for ClockDrift {
    fn default() -> Self {
        Self::redis()
    }
}
