mod drift;
mod error;
mod extend;
mod info;
mod traits;

pub use drift::ClockDrift;
pub use error::InstanceError;
pub use extend::ExtendResult;
pub use info::{InstanceLockInfo, Metadata};
pub use traits::LockInstance;
