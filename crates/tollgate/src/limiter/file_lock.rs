// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fs::{self, File, OpenOptions, TryLockError};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use tick::Clock;

use super::LimiterError;
use super::state::parent_dir;

/// How often a contended lock is retried.
pub(crate) const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

/// Exclusive advisory lock on the limiter's lock file, released on drop.
///
/// The lock belongs to the open file description, so two handles in the same process contend
/// with each other exactly like two processes do.
#[derive(Debug)]
pub(crate) struct LockGuard {
    file: File,
    path: PathBuf,
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Err(error) = self.file.unlock() {
            tracing::event!(
                name: "tollgate.limiter.unlock_failed",
                tracing::Level::WARN,
                limiter.lock_path = %self.path.display(),
                error = %error,
            );
        }
    }
}

/// Acquires the lock, blocking the current thread for at most `timeout`.
///
/// Returns `Ok(None)` when the timeout expires.
pub(crate) fn acquire_blocking(path: &Path, timeout: Duration) -> Result<Option<LockGuard>, LimiterError> {
    let file = open(path)?;
    let deadline = Instant::now().checked_add(timeout);

    loop {
        if try_lock(&file, path)? {
            return Ok(Some(LockGuard {
                file,
                path: path.to_path_buf(),
            }));
        }

        let now = Instant::now();
        if deadline.is_some_and(|deadline| now >= deadline) {
            return Ok(None);
        }

        thread::sleep(deadline.map_or(LOCK_POLL_INTERVAL, |deadline| LOCK_POLL_INTERVAL.min(deadline - now)));
    }
}

/// Acquires the lock, waiting on the clock between attempts for at most `timeout`.
///
/// Returns `Ok(None)` when the timeout expires.
pub(crate) async fn acquire(path: &Path, timeout: Duration, clock: &Clock) -> Result<Option<LockGuard>, LimiterError> {
    let file = open(path)?;
    let stopwatch = clock.stopwatch();

    loop {
        if try_lock(&file, path)? {
            return Ok(Some(LockGuard {
                file,
                path: path.to_path_buf(),
            }));
        }

        let elapsed = stopwatch.elapsed();
        if elapsed >= timeout {
            return Ok(None);
        }

        clock.delay(LOCK_POLL_INTERVAL.min(timeout - elapsed)).await;
    }
}

fn open(path: &Path) -> Result<File, LimiterError> {
    let dir = parent_dir(path);
    fs::create_dir_all(dir).map_err(|error| LimiterError::io(dir, error))?;

    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|error| LimiterError::io(path, error))
}

fn try_lock(file: &File, path: &Path) -> Result<bool, LimiterError> {
    match file.try_lock() {
        Ok(()) => Ok(true),
        Err(TryLockError::WouldBlock) => Ok(false),
        Err(TryLockError::Error(error)) => Err(LimiterError::io(path, error)),
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use tick::ClockControl;

    use super::*;

    #[test]
    fn acquire_blocking_free_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json.lock");

        let guard = acquire_blocking(&path, Duration::from_millis(100)).unwrap();

        assert!(guard.is_some());
        assert!(path.exists());
    }

    #[test]
    fn acquire_blocking_times_out_while_held() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json.lock");
        let _held = acquire_blocking(&path, Duration::from_millis(100)).unwrap().unwrap();

        let started = Instant::now();
        let guard = acquire_blocking(&path, Duration::from_millis(100)).unwrap();

        assert!(guard.is_none());
        assert!(started.elapsed() >= Duration::from_millis(100));
    }

    #[test]
    fn drop_releases_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json.lock");

        drop(acquire_blocking(&path, Duration::from_millis(100)).unwrap());

        assert!(acquire_blocking(&path, Duration::from_millis(100)).unwrap().is_some());
    }

    #[test]
    fn creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deeper/state.json.lock");

        assert!(acquire_blocking(&path, Duration::from_millis(100)).unwrap().is_some());
    }

    #[tokio::test]
    async fn acquire_times_out_on_clock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json.lock");
        let _held = acquire_blocking(&path, Duration::from_millis(100)).unwrap().unwrap();
        let control = ClockControl::new().auto_advance_timers(true);

        let guard = acquire(&path, Duration::from_millis(200), &control.to_clock()).await.unwrap();

        assert!(guard.is_none());
    }

    #[tokio::test]
    async fn acquire_free_lock() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json.lock");

        let guard = acquire(&path, Duration::from_millis(200), &Clock::new_frozen()).await.unwrap();

        assert!(guard.is_some());
    }
}
