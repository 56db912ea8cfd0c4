use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};

use crate::InstanceSet;

/// Majority needed among `instance_count` instances.
pub fn quorum(instance_count: usize) -> usize {
    instance_count / 2 + 1
}

/// Aggregate of one fan-out round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockResult {
    locked_count: usize,
    min_validity: Duration,
    elapsed: Duration,
    instance_count: usize,
}

impl LockResult {
    pub fn new(
        locked_count: usize,
        min_validity: Duration,
        elapsed: Duration,
        instance_count: usize,
    ) -> Self {
        Self {
            locked_count,
            min_validity,
            elapsed,
            instance_count,
        }
    }

    /// Result of a round over no instances.
    pub fn empty() -> Self {
        Self::new(0, Duration::ZERO, Duration::ZERO, 0)
    }

    pub fn locked_count(&self) -> usize {
        self.locked_count
    }

    pub fn min_validity(&self) -> Duration {
        self.min_validity
    }

    pub fn elapsed(&self) -> Duration {
        self.elapsed
    }

    pub fn instance_count(&self) -> usize {
        self.instance_count
    }

    pub fn quorum(&self) -> usize {
        quorum(self.instance_count)
    }

    /// A majority agreed and the weakest instance still has validity left.
    pub fn is_locked(&self) -> bool {
        self.locked_count >= self.quorum() && self.min_validity > Duration::ZERO
    }

    /// `now + min_validity` when the round is locked.
    pub fn valid_until(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        if !self.is_locked() {
            return None;
        }
        let validity = TimeDelta::from_std(self.min_validity).ok()?;
        now.checked_add_signed(validity)
    }
}

/// Measures a round and reduces per-instance validity to its minimum.
pub(crate) struct RoundTimer<'a> {
    instances: &'a InstanceSet,
    ttl: Duration,
    started: Instant,
}

impl<'a> RoundTimer<'a> {
    pub(crate) fn start(instances: &'a InstanceSet, ttl: Duration) -> Self {
        Self {
            instances,
            ttl,
            started: Instant::now(),
        }
    }

    pub(crate) fn finish(self, locked_count: usize) -> LockResult {
        let elapsed = self.started.elapsed();
        // Elapsed covers the whole round: the slowest reply eats into every
        // instance's window.
        let min_validity = self
            .instances
            .iter()
            .map(|i| i.min_validity(self.ttl, elapsed))
            .min()
            .unwrap_or(Duration::ZERO);
        LockResult::new(locked_count, min_validity, elapsed, self.instances.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALIDITY: Duration = Duration::from_secs(10);

    #[test]
    fn test_quorum_values() {
        assert_eq!(quorum(0), 1);
        assert_eq!(quorum(1), 1);
        assert_eq!(quorum(2), 2);
        assert_eq!(quorum(3), 2);
        assert_eq!(quorum(4), 3);
        assert_eq!(quorum(5), 3);
    }

    #[test]
    fn test_quorum_boundary_for_all_sizes() {
        for n in 1..=16 {
            let q = quorum(n);
            let below = LockResult::new(q - 1, VALIDITY, Duration::ZERO, n);
            let at = LockResult::new(q, VALIDITY, Duration::ZERO, n);
            assert!(!below.is_locked(), "n={n} locked with {} votes", q - 1);
            assert!(at.is_locked(), "n={n} not locked with {q} votes");
        }
    }

    #[test]
    fn test_zero_validity_is_not_locked() {
        let result = LockResult::new(3, Duration::ZERO, Duration::ZERO, 3);
        assert!(!result.is_locked());
        assert!(result.valid_until(Utc::now()).is_none());
    }

    #[test]
    fn test_empty_is_never_locked() {
        let result = LockResult::empty();
        assert!(!result.is_locked());
        assert_eq!(result.quorum(), 1);
    }

    #[test]
    fn test_valid_until_adds_min_validity() {
        let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
        let result = LockResult::new(2, VALIDITY, Duration::from_millis(3), 3);
        assert_eq!(
            result.valid_until(now),
            Some(DateTime::from_timestamp(1_700_000_010, 0).unwrap())
        );
    }
}
