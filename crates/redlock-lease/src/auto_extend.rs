use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::{Clock, Redlock};

const NO_RESULT: u8 = 0;
const EXTENDED: u8 = 1;
const FAILED: u8 = 2;

/// Counters of an [`AutoExtender`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AutoExtendStats {
    pub extend_count: u64,
    pub success_count: u64,
    pub fail_count: u64,
    /// Outcome of the latest attempt, `None` before the first one.
    pub last_result: Option<bool>,
}

struct Counters {
    extend_count: AtomicU64,
    success_count: AtomicU64,
    fail_count: AtomicU64,
    last_result: AtomicU8,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            extend_count: AtomicU64::new(0),
            success_count: AtomicU64::new(0),
            fail_count: AtomicU64::new(0),
            last_result: AtomicU8::new(NO_RESULT),
        }
    }
}

impl Counters {
    fn record(&self, extended: bool) {
        self.extend_count.fetch_add(1, Ordering::Relaxed);
        if extended {
            self.success_count.fetch_add(1, Ordering::Relaxed);
            self.last_result.store(EXTENDED, Ordering::Release);
        } else {
            self.fail_count.fetch_add(1, Ordering::Relaxed);
            self.last_result.store(FAILED, Ordering::Release);
        }
    }

    fn snapshot(&self) -> AutoExtendStats {
        AutoExtendStats {
            extend_count: self.extend_count.load(Ordering::Relaxed),
            success_count: self.success_count.load(Ordering::Relaxed),
            fail_count: self.fail_count.load(Ordering::Relaxed),
            last_result: match self.last_result.load(Ordering::Acquire) {
                EXTENDED => Some(true),
                FAILED => Some(false),
                _ => None,
            },
        }
    }
}

/// Background task extending a shared lock at a fixed interval.
///
/// The task ends when [`AutoExtender::stop`] is called, when the extender is
/// dropped, or when the lock has been released. A failed extension is
/// recorded and logged but does not stop the task; the next tick tries again.
pub struct AutoExtender {
    token: CancellationToken,
    counters: Arc<Counters>,
    handle: Option<JoinHandle<()>>,
}

impl AutoExtender {
    /// Spawn the extender on the current tokio runtime.
    ///
    /// # Panics
    /// When called outside a tokio runtime.
    pub fn spawn(
        lock: Arc<Redlock>,
        interval: Duration,
        try_reacquire: bool,
        clock: Option<Clock>,
    ) -> Self {
        let token = CancellationToken::new();
        let counters = Arc::new(Counters::default());
        let period = interval.max(Duration::from_millis(1));

        let handle = tokio::spawn({
            let token = token.clone();
            let counters = Arc::clone(&counters);
            async move {
                let mut ticker = tokio::time::interval(period);
                // the first tick completes immediately; the lock was just taken
                ticker.tick().await;
                loop {
                    tokio::select! {
                        _ = token.cancelled() => break,
                        _ = ticker.tick() => {}
                    }
                    if lock.is_released() {
                        debug!(resource = lock.resource(), "lock released, auto extend stops");
                        break;
                    }
                    let extended = lock.try_extend_async(try_reacquire, clock.as_ref()).await;
                    counters.record(extended.is_some());
                    if extended.is_none() {
                        warn!(
                            resource = lock.resource(),
                            nonce = lock.nonce(),
                            "auto extend failed"
                        );
                    }
                }
            }
        });

        Self {
            token,
            counters,
            handle: Some(handle),
        }
    }

    pub fn stats(&self) -> AutoExtendStats {
        self.counters.snapshot()
    }

    /// Signal the task to stop after its current attempt.
    pub fn stop(&self) {
        self.token.cancel();
    }

    /// Stop the task and wait for it to finish.
    pub async fn shutdown(mut self) -> AutoExtendStats {
        self.token.cancel();
        if let Some(handle) = self.handle.take() {
            // a panicked or aborted task has nothing left to clean up
            let _ = handle.await;
        }
        self.counters.snapshot()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }
}

impl Drop for AutoExtender {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
