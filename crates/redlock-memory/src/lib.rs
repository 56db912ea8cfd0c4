//! In-memory [`LockInstance`](redlock_core::LockInstance) implementations and a
//! `tracing` layer that records events, for tests and local development.

mod capture;
mod delayed;
mod faulty;
mod memory;

use std::sync::Arc;
use std::time::Duration;

use redlock_core::LockInstance;

pub use capture::{CapturedEvent, LogCapture};
pub use delayed::DelayedInstance;
pub use faulty::FaultyInstance;
pub use memory::MemoryInstance;

/// Creates `count` in-memory instances named `mem-0`, `mem-1`, ...
pub fn memory_instances(count: usize) -> Vec<Arc<MemoryInstance>> {
    (0..count)
        .map(|i| Arc::new(MemoryInstance::new(format!("mem-{i}"))))
        .collect()
}

/// Creates `count` always-failing instances named `faulty-0`, `faulty-1`, ...
pub fn faulty_instances(count: usize) -> Vec<Arc<FaultyInstance>> {
    (0..count)
        .map(|i| Arc::new(FaultyInstance::new(format!("faulty-{i}"))))
        .collect()
}

/// Wraps `count` in-memory instances named `mem-0`, `mem-1`, ... so that
/// locking and extending each take `delay`.
pub fn delayed_instances(count: usize, delay: Duration) -> Vec<Arc<DelayedInstance>> {
    memory_instances(count)
        .into_iter()
        .map(|mem| Arc::new(DelayedInstance::new(mem, delay)))
        .collect()
}

/// Erases the concrete instance type so different kinds can share one set.
pub fn erased<T: LockInstance + 'static>(instances: &[Arc<T>]) -> Vec<Arc<dyn LockInstance>> {
    instances
        .iter()
        .map(|i| Arc::clone(i) as Arc<dyn LockInstance>)
        .collect()
}
