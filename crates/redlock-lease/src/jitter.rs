use std::time::Duration;

use rand::Rng;

/// Uniformly random delay in `[0, max_wait)`.
///
/// Draws from the thread-local generator, which is seeded from the operating
/// system, so competing processes do not retry in lockstep. A zero `max_wait`
/// yields a zero delay.
pub fn random_delay(max_wait: Duration) -> Duration {
    let max = u64::try_from(max_wait.as_nanos()).unwrap_or(u64::MAX);
    if max == 0 {
        return Duration::ZERO;
    }
    Duration::from_nanos(rand::rng().random_range(0..max))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_delay_within_bounds() {
        let max = Duration::from_millis(5);
        for _ in 0..10_000 {
            assert!(random_delay(max) < max);
        }
    }

    #[test]
    fn test_zero_max_wait() {
        assert_eq!(random_delay(Duration::ZERO), Duration::ZERO);
    }

    #[test]
    fn test_delays_are_spread() {
        let max = Duration::from_secs(1);
        let first = random_delay(max);
        assert!((0..32).any(|_| random_delay(max) != first));
    }
}
