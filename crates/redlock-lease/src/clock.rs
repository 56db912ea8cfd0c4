use std::sync::Arc;

use chrono::{DateTime, Utc};

/// Source of the current UTC time used to compute validity deadlines.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// A clock frozen at `at`.
pub fn fixed_clock(at: DateTime<Utc>) -> Clock {
    Arc::new(move || at)
}

pub(crate) fn now(clock: Option<&Clock>) -> DateTime<Utc> {
    match clock {
        Some(clock) => clock(),
        None => Utc::now(),
    }
}

/// Deadlines are stored as nanoseconds since the epoch so they fit an `AtomicI64`.
pub(crate) fn to_nanos(at: DateTime<Utc>) -> i64 {
    at.timestamp_nanos_opt().unwrap_or(i64::MAX)
}

pub(crate) fn from_nanos(nanos: i64) -> DateTime<Utc> {
    DateTime::from_timestamp_nanos(nanos)
}
