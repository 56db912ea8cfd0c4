use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use chrono::{DateTime, TimeDelta, Utc};
use redlock_core::{LockInstance, Metadata};
use redlock_lease::{
    Clock, InstanceSet, MaxRetries, NoRepeat, Redlock, RedlockError, Repeater, fixed_clock,
};
use redlock_memory::{
    DelayedInstance, FaultyInstance, LogCapture, MemoryInstance, delayed_instances, erased,
    faulty_instances, memory_instances,
};

const TTL: Duration = Duration::from_secs(60);
const NO_WAIT: Duration = Duration::ZERO;

fn set_of(instances: &[Arc<MemoryInstance>]) -> InstanceSet {
    InstanceSet::from_instances(instances.iter().cloned())
}

fn delayed_set(instances: &[Arc<DelayedInstance>]) -> InstanceSet {
    InstanceSet::from_instances(instances.iter().cloned())
}

fn mixed(faulty: usize, healthy: usize) -> (InstanceSet, Vec<Arc<MemoryInstance>>) {
    let mems = memory_instances(healthy);
    let mut all = erased(&faulty_instances(faulty));
    all.extend(erased(&mems));
    (InstanceSet::new(all), mems)
}

/// Clock that moves forward by one second every time it is read.
fn ticking_clock() -> Clock {
    let start = Utc::now().timestamp();
    let ticks = Arc::new(AtomicI64::new(0));
    Arc::new(move || {
        let tick = ticks.fetch_add(1, Ordering::SeqCst);
        DateTime::from_timestamp(start + tick, 0).unwrap_or_default()
    })
}

#[test]
fn test_lock_and_release_on_three_instances() {
    let mems = memory_instances(3);
    let instances = set_of(&mems);

    let lock = Redlock::try_lock("r", "n", TTL, &instances, None, None)
        .expect("quorum of healthy instances must lock");
    assert!(mems.iter().all(|m| m.contains("r", "n")));
    assert_eq!(lock.nonce(), "n");
    assert_eq!(lock.resource(), "r");

    drop(lock);
    assert!(mems.iter().all(|m| !m.contains("r", "n")));
    assert!(mems.iter().all(|m| m.try_lock("r", "other", TTL, None).unwrap()));
}

#[test]
fn test_foreign_majority_blocks_and_is_untouched() {
    let mems = memory_instances(3);
    MemoryInstance::lock_all("r", "n2", TTL, &mems[..2]).unwrap();
    let instances = set_of(&mems);

    let lock = Redlock::try_lock("r", "n", TTL, &instances, None, None);

    assert!(lock.is_none());
    assert!(mems.iter().all(|m| !m.contains("r", "n")), "partial lock survived");
    assert!(mems[0].contains("r", "n2"));
    assert!(mems[1].contains("r", "n2"));
}

#[test]
fn test_valid_until_uses_injected_clock() {
    let mems = memory_instances(3);
    let instances = set_of(&mems);
    let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    let clock = fixed_clock(now);

    let lock = Redlock::try_lock("r", "n", TTL, &instances, None, Some(&clock)).unwrap();

    assert!(lock.valid_until() > now);
    assert!(lock.valid_until() <= now + TimeDelta::seconds(60));
    assert!(lock.is_valid_at(now));
    assert!(lock.remaining_validity(now) <= TTL);
}

#[test]
fn test_drift_can_consume_whole_validity() {
    let mems: Vec<Arc<MemoryInstance>> = (0..3)
        .map(|i| {
            Arc::new(MemoryInstance::with_min_validity(format!("m{i}"), |_, _| {
                Duration::ZERO
            }))
        })
        .collect();
    let instances = set_of(&mems);

    assert!(Redlock::try_lock("r", "n", TTL, &instances, None, None).is_none());
    assert!(mems.iter().all(|m| !m.contains("r", "n")));
}

#[test]
fn test_weakest_instance_caps_validity() {
    let mems = vec![
        Arc::new(MemoryInstance::new("a")),
        Arc::new(MemoryInstance::new("b")),
        Arc::new(MemoryInstance::with_min_validity("slow", |_, _| {
            Duration::from_secs(5)
        })),
    ];
    let instances = set_of(&mems);
    let now = DateTime::from_timestamp(1_700_000_000, 0).unwrap();

    let lock = Redlock::try_lock("r", "n", TTL, &instances, None, Some(&fixed_clock(now))).unwrap();
    assert_eq!(lock.valid_until(), now + TimeDelta::seconds(5));
}

#[test]
fn test_release_is_idempotent() {
    let mems = memory_instances(3);
    let instances = set_of(&mems);
    let lock = Redlock::try_lock("r", "n", TTL, &instances, None, None).unwrap();

    lock.release();
    assert!(lock.is_released());
    // someone else takes it in between
    assert!(mems[0].try_lock("r", "n2", TTL, None).unwrap());

    lock.release();
    drop(lock);
    assert!(mems[0].contains("r", "n2"));
}

#[test]
fn test_empty_set_never_locks() {
    let instances = InstanceSet::empty();

    assert!(Redlock::try_lock("r", "n", TTL, &instances, None, None).is_none());
    let err = Redlock::lock("r", "n", TTL, &instances, None, &mut NoRepeat, NO_WAIT, None)
        .unwrap_err();
    assert_eq!(err.attempts(), Some(1));
    assert!(matches!(
        InstanceSet::non_empty(Vec::new()),
        Err(RedlockError::NoInstances)
    ));
}

#[test]
fn test_extend_keeps_nonce_and_moves_deadline() {
    let mems = memory_instances(3);
    let instances = set_of(&mems);
    let clock = ticking_clock();

    let lock = Redlock::try_lock("r", "n", TTL, &instances, None, Some(&clock)).unwrap();
    let before = lock.valid_until();

    let extended = lock.try_extend(false, Some(&clock)).expect("extend must succeed");

    assert!(extended > before);
    assert_eq!(lock.valid_until(), extended);
    assert_eq!(lock.nonce(), "n");
    assert!(mems.iter().all(|m| m.contains("r", "n")));
}

#[test]
fn test_failed_extend_leaves_deadline() {
    let mems = memory_instances(3);
    let instances = set_of(&mems);
    let clock = ticking_clock();
    let lock = Redlock::try_lock("r", "n", TTL, &instances, None, Some(&clock)).unwrap();
    let before = lock.valid_until();

    for mem in &mems[..2] {
        mem.force_unlock("r");
        mem.try_lock("r", "thief", TTL, None).unwrap();
    }

    assert!(lock.try_extend(false, Some(&clock)).is_none());
    assert!(lock.try_extend(true, Some(&clock)).is_none());
    assert_eq!(lock.valid_until(), before);
    assert!(!lock.is_released());
}

#[test]
fn test_extend_reacquires_expired_lock() {
    let mems = memory_instances(3);
    let instances = set_of(&mems);
    let lock = Redlock::try_lock("r", "n", TTL, &instances, None, None).unwrap();
    mems.iter().for_each(|m| m.force_unlock("r"));

    assert!(lock.try_extend(false, None).is_none());
    assert!(lock.try_extend(true, None).is_some());
    assert!(mems.iter().all(|m| m.contains("r", "n")));
}

#[test]
fn test_released_handle_does_not_extend() {
    let mems = memory_instances(3);
    let instances = set_of(&mems);
    let lock = Redlock::try_lock("r", "n", TTL, &instances, None, None).unwrap();
    lock.release();

    assert!(lock.try_extend(true, None).is_none());
    assert!(mems.iter().all(|m| !m.contains("r", "n")));
}

#[test]
fn test_unreleased_empty_handle_does_not_extend() {
    let lock = Redlock::default();

    assert!(lock.try_extend(false, None).is_none());
    assert!(lock.try_extend(true, None).is_none());
    assert!(!lock.is_released());
}

#[test]
fn test_release_during_reacquire_leaves_nothing_held() {
    let delayed = delayed_instances(3, Duration::from_millis(200));
    let instances = delayed_set(&delayed);
    let lock = Redlock::try_lock("r", "n", TTL, &instances, None, None).unwrap();
    delayed.iter().for_each(|d| d.inner().force_unlock("r"));

    let extended = thread::scope(|s| {
        let extend = s.spawn(|| lock.try_extend(true, None));
        thread::sleep(Duration::from_millis(50));
        lock.release();
        extend.join().unwrap()
    });

    assert!(extended.is_none());
    assert!(lock.is_released());
    assert!(delayed.iter().all(|d| !d.inner().contains("r", "n")));
}

#[test]
fn test_slow_instances_are_contacted_concurrently() {
    let delay = Duration::from_millis(200);
    let delayed = delayed_instances(8, delay);
    let instances = delayed_set(&delayed);

    let started = Instant::now();
    let lock = Redlock::try_lock("r", "n", Duration::from_secs(2), &instances, None, None);
    let elapsed = started.elapsed();

    assert!(lock.is_some(), "a round as slow as one instance must still lock");
    assert!(elapsed < delay * 4, "round took {elapsed:?}");

    let result = instances.try_extend_all("r", "n", Duration::from_secs(2), false);
    assert_eq!(result.locked_count(), 8);
    assert!(result.elapsed() < delay * 4);
}

#[test]
fn test_minority_failures_are_logged_not_fatal() {
    let capture = LogCapture::new();
    let (instances, mems) = mixed(2, 3);

    let lock = tracing::subscriber::with_default(capture.subscriber(), || {
        Redlock::try_lock("r", "n", TTL, &instances, None, None)
    });

    let lock = lock.expect("3 of 5 is a quorum");
    let errors = capture.errors();
    assert_eq!(errors.len(), 2, "one error per failing instance: {errors:?}");
    for event in &errors {
        assert_eq!(event.field("resource"), Some("r"));
        assert_eq!(event.field("nonce"), Some("n"));
        assert_eq!(event.field("op"), Some("try_lock"));
        assert!(event.field("instance").unwrap().starts_with("faulty:"));
    }
    assert!(mems.iter().all(|m| m.contains("r", "n")));

    // release happens outside the capture, its unlock errors are not counted
    drop(lock);
}

#[test]
fn test_majority_failures_roll_back_and_log_unlocks() {
    let capture = LogCapture::new();
    let (instances, mems) = mixed(3, 2);

    let lock = tracing::subscriber::with_default(capture.subscriber(), || {
        Redlock::try_lock("r", "n", TTL, &instances, None, None)
    });

    assert!(lock.is_none());
    assert!(mems.iter().all(|m| !m.contains("r", "n")));

    let errors = capture.errors();
    assert_eq!(errors.len(), 6, "{errors:?}");
    let unlocks = errors.iter().filter(|e| e.field("op") == Some("unlock")).count();
    assert_eq!(unlocks, 3);
    let faulty = FaultyInstance::new("faulty-0");
    assert!(
        errors
            .iter()
            .any(|e| e.field("error").is_some_and(|m| m.contains(&faulty.error_message("unlock"))))
    );
}

#[test]
fn test_lock_reports_attempts_on_exhaustion() {
    let mems = memory_instances(3);
    MemoryInstance::lock_all("r", "other", TTL, &mems).unwrap();
    let instances = set_of(&mems);

    let err = Redlock::lock("r", "n", TTL, &instances, None, &mut NoRepeat, NO_WAIT, None)
        .unwrap_err();
    assert!(matches!(
        &err,
        RedlockError::Exhausted { resource, nonce, attempts: 1 } if resource == "r" && nonce == "n"
    ));

    let err = Redlock::lock(
        "r",
        "n",
        TTL,
        &instances,
        None,
        &mut MaxRetries::new(3),
        Duration::from_millis(2),
        None,
    )
    .unwrap_err();
    assert_eq!(err.attempts(), Some(4));

    assert!(
        Redlock::try_lock_repeat("r", "n", TTL, &instances, None, &mut NoRepeat, NO_WAIT, None)
            .is_none()
    );
}

/// Frees the resource on the third failed attempt.
struct UnlockingRepeater {
    mems: Vec<Arc<MemoryInstance>>,
    calls: u32,
}

impl Repeater for UnlockingRepeater {
    fn next(&mut self) -> bool {
        self.calls += 1;
        if self.calls == 3 {
            self.mems.iter().for_each(|m| m.force_unlock("r"));
        }
        true
    }

    fn wait_random(&self, _max_wait: Duration) {}
}

#[test]
fn test_lock_retries_with_same_nonce() {
    let mems = memory_instances(3);
    MemoryInstance::lock_all("r", "other", TTL, &mems).unwrap();
    let instances = set_of(&mems);
    let mut repeater = UnlockingRepeater {
        mems: mems.clone(),
        calls: 0,
    };

    let lock = Redlock::lock("r", "n", TTL, &instances, None, &mut repeater, NO_WAIT, None).unwrap();

    assert_eq!(repeater.calls, 3);
    assert_eq!(lock.nonce(), "n");
    assert!(mems.iter().all(|m| m.contains("r", "n")));
}

/// Backoff doubling from 1 ms, giving up after four waits.
struct Backoff {
    next_wait: Duration,
    waits: Vec<Duration>,
}

impl Repeater for Backoff {
    fn next(&mut self) -> bool {
        if self.waits.len() == 4 {
            return false;
        }
        self.waits.push(self.next_wait);
        self.next_wait *= 2;
        true
    }

    fn wait_random(&self, _max_wait: Duration) {
        if let Some(wait) = self.waits.last() {
            std::thread::sleep(*wait);
        }
    }

    fn create_error(&self, resource: &str, _nonce: &str, attempts: u32) -> RedlockError {
        RedlockError::Custom(format!("gave up on {resource} after {attempts}").into())
    }
}

#[test]
fn test_custom_repeater_controls_error() {
    let mems = memory_instances(1);
    MemoryInstance::lock_all("r", "other", TTL, &mems).unwrap();
    let instances = set_of(&mems);
    let mut backoff = Backoff {
        next_wait: Duration::from_millis(1),
        waits: Vec::new(),
    };

    let err = Redlock::lock("r", "n", TTL, &instances, None, &mut backoff, NO_WAIT, None)
        .unwrap_err();

    assert_eq!(err.to_string(), "gave up on r after 5");
    assert_eq!(
        backoff.waits,
        [1, 2, 4, 8].map(Duration::from_millis).to_vec()
    );
}

#[test]
fn test_extend_with_repeater() {
    let mems = memory_instances(3);
    let instances = set_of(&mems);
    let lock = Redlock::try_lock("r", "n", TTL, &instances, None, None).unwrap();
    assert!(lock.extend(false, &mut NoRepeat, NO_WAIT, None).is_ok());

    mems.iter().for_each(|m| {
        m.force_unlock("r");
        m.try_lock("r", "thief", TTL, None).unwrap();
    });
    let err = lock
        .extend(false, &mut MaxRetries::new(1), NO_WAIT, None)
        .unwrap_err();
    assert_eq!(err.attempts(), Some(2));
    assert!(
        lock.try_extend_repeat(true, &mut NoRepeat, NO_WAIT, None)
            .is_none()
    );
}

#[test]
fn test_metadata_and_info() {
    let mems = memory_instances(3);
    let instances = set_of(&mems);
    let mut metadata = Metadata::new();
    metadata.insert("owner".to_string(), "worker-7".to_string());

    let _lock = Redlock::try_lock("r", "n", TTL, &instances, Some(&metadata), None).unwrap();

    let infos = instances.get_info_all("r");
    assert_eq!(infos.len(), 3);
    for info in infos {
        let info = info.expect("every instance holds the lock");
        assert!(info.is_owned_by("n"));
        assert_eq!(info.metadata, metadata);
    }
    assert!(instances.get_info_all("free").iter().all(Option::is_none));
}

#[test]
fn test_info_errors_are_logged_as_none() {
    let capture = LogCapture::new();
    let (instances, _mems) = mixed(1, 2);

    let infos = tracing::subscriber::with_default(capture.subscriber(), || {
        instances.get_info_all("r")
    });

    assert_eq!(infos.len(), 3);
    assert_eq!(capture.errors().len(), 1);
}

#[test]
fn test_instance_set_quorum() {
    let (instances, _) = mixed(2, 3);
    assert_eq!(instances.len(), 5);
    assert_eq!(instances.quorum(), 3);

    let listed: Vec<String> = instances.iter().map(|i| i.to_string()).collect();
    assert_eq!(listed[0], "faulty:faulty-0");
    assert_eq!(listed[4], "mem:mem-2");

    let dynamic: Arc<dyn LockInstance> = Arc::new(MemoryInstance::new("x"));
    let single: InstanceSet = std::iter::once(dynamic).collect();
    assert_eq!(single.quorum(), 1);
}
