//! Quorum lease logic for the Redlock algorithm.
//!
//! A [`Redlock`] is acquired by asking every instance of an [`InstanceSet`] to
//! store the same nonce. The lock is trusted only if a majority agreed and the
//! weakest instance still reports a positive validity window after the time
//! spent asking. Partial acquisitions are always rolled back.

mod auto_extend;
mod clock;
mod error;
mod fanout;
mod instances;
mod jitter;
mod lock_result;
mod redlock;
mod repeater;

pub use auto_extend::{AutoExtendStats, AutoExtender};
pub use clock::{Clock, fixed_clock, system_clock};
pub use error::RedlockError;
pub use instances::InstanceSet;
pub use jitter::random_delay;
pub use lock_result::{LockResult, quorum};
pub use redlock::Redlock;
pub use repeater::{CancellationRepeater, MaxRetries, NoRepeat, Repeater};
