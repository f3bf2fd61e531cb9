// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cross-process behavior of the shared rate limiter.
//!
//! Every `RateLimiter` opens its own handles on the state and lock files, so two instances in one
//! test contend exactly like two processes would.

use std::path::Path;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, UNIX_EPOCH};

use tick::{Clock, ClockControl};
use tollgate::config::LimiterConfig;
use tollgate::limiter::{Admission, RateLimiter, RejectReason};

fn control() -> ClockControl {
    ClockControl::new_at(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
}

fn limiter(path: &Path, capacity: u32, clock: Clock) -> RateLimiter {
    RateLimiter::new(LimiterConfig::new(path, capacity).with_window(Duration::from_secs(3600)), clock).unwrap()
}

#[test]
fn two_processes_share_one_window() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rate_limit_state.json");
    let control = control();
    let poller = limiter(&path, 2, control.to_clock());
    let sweeper = limiter(&path, 2, control.to_clock());

    assert!(poller.check_and_increment().unwrap().is_allowed());
    assert!(sweeper.check_and_increment().unwrap().is_allowed());
    assert!(matches!(
        poller.check_and_increment().unwrap(),
        Admission::Rejected {
            reason: RejectReason::WindowFull,
            ..
        }
    ));
    assert!(!sweeper.check_and_increment().unwrap().is_allowed());

    control.advance(Duration::from_secs(3600));

    assert!(sweeper.check_and_increment().unwrap().is_allowed());
}

#[test]
fn concurrent_increments_are_never_lost() {
    const THREADS: usize = 8;
    const CALLS: usize = 10;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rate_limit_state.json");
    let control = control();
    let barrier = Arc::new(Barrier::new(THREADS));

    let admitted: usize = thread::scope(|scope| {
        let handles: Vec<_> = (0..THREADS)
            .map(|_| {
                let limiter = RateLimiter::new(
                    LimiterConfig::new(&path, 50).with_lock_timeout(Duration::from_secs(30)),
                    control.to_clock(),
                )
                .unwrap();
                let barrier = Arc::clone(&barrier);
                scope.spawn(move || {
                    barrier.wait();
                    (0..CALLS)
                        .filter(|_| matches!(limiter.check_and_increment().unwrap(), Admission::Admitted { .. }))
                        .count()
                })
            })
            .collect();

        handles.into_iter().map(|handle| handle.join().unwrap()).sum()
    });

    assert_eq!(admitted, 50);
    let status = limiter(&path, 50, control.to_clock()).status().unwrap();
    assert_eq!(status.window_count, 50);
}

#[test]
fn panic_from_one_process_blocks_all() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rate_limit_state.json");
    let control = control();
    let poller = limiter(&path, 100, control.to_clock());
    let sweeper = limiter(&path, 100, control.to_clock());

    poller.trigger_panic().unwrap();

    assert!(matches!(
        sweeper.check_and_increment().unwrap(),
        Admission::Rejected {
            reason: RejectReason::Panic,
            retry_after
        } if retry_after == Duration::from_secs(3600)
    ));

    control.advance(Duration::from_secs(3600));

    assert!(sweeper.check_and_increment().unwrap().is_allowed());
    assert!(poller.check_and_increment().unwrap().is_allowed());
}

#[test]
fn state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rate_limit_state.json");
    let control = control();

    {
        let before = limiter(&path, 2, control.to_clock());
        before.check_and_increment().unwrap();
        before.check_and_increment().unwrap();
    }

    let after = limiter(&path, 2, control.to_clock());
    assert!(!after.check_and_increment().unwrap().is_allowed());
}

#[test]
fn held_lock_fails_open() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rate_limit_state.json");
    let limiter = RateLimiter::new(
        LimiterConfig::new(&path, 1).with_lock_timeout(Duration::from_millis(100)),
        control().to_clock(),
    )
    .unwrap();
    let lock = std::fs::File::create(limiter.lock_path()).unwrap();
    lock.lock().unwrap();

    assert_eq!(limiter.check_and_increment().unwrap(), Admission::FailOpen);
    assert_eq!(limiter.check_and_increment().unwrap(), Admission::FailOpen);

    lock.unlock().unwrap();
    assert!(matches!(limiter.check_and_increment().unwrap(), Admission::Admitted { window_count: 1, .. }));
}

#[test]
fn persisted_layout_is_stable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rate_limit_state.json");
    limiter(&path, 5, control().to_clock()).check_and_increment().unwrap();

    let json: serde_json::Value = serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();

    assert_eq!(json["version"], 1);
    assert_eq!(json["windowCount"], 1);
    assert_eq!(json["windowStartTimestamp"], 1_700_000_000.0);
    assert_eq!(json["panicUntilTimestamp"], 0.0);
    assert_eq!(json["lastActionTimestamp"], 1_700_000_000.0);
}
