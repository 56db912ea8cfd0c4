//! Redlock distributed locking.
//!
//! A lock is held when a majority of independent instances store the same
//! random nonce for a resource, and only for as long as the weakest of them
//! can still vouch for it after clock drift is accounted for.
//!
//! ```no_run
//! use redlock::prelude::*;
//! # fn instances() -> InstanceSet { InstanceSet::empty() }
//!
//! let factory = RedlockFactory::builder()
//!     .instances(instances())
//!     .options(RedlockOptions::default())
//!     .build()?;
//!
//! let lock = factory.create_default("orders:42")?;
//! // critical section, valid until lock.valid_until()
//! lock.release();
//! # Ok::<(), redlock::Error>(())
//! ```

pub mod error;
pub mod factory;
pub mod options;
pub mod policy;
pub mod telemetry;

pub use redlock_core;
pub use redlock_lease;

pub use error::{Error, Result};
pub use factory::{RedlockFactory, RedlockFactoryBuilder};
pub use options::{RedlockOptions, RedlockOptionsBuilder};
pub use policy::{LockPolicy, OptionsPolicy};

pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::factory::RedlockFactory;
    pub use crate::options::RedlockOptions;
    pub use crate::policy::{LockPolicy, OptionsPolicy};
    pub use redlock_core::{
        ClockDrift, ExtendResult, InstanceError, InstanceLockInfo, LockInstance, Metadata,
    };
    pub use redlock_lease::{
        AutoExtender, CancellationRepeater, Clock, InstanceSet, MaxRetries, NoRepeat, Redlock,
        RedlockError, Repeater,
    };
}
