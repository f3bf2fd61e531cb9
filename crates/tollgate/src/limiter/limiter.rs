// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use serde::Serialize;
use tick::Clock;

use super::admission::decide;
use super::file_lock::{self, LockGuard};
use super::{Admission, LimiterError, state};
use crate::config::{ConfigError, LimiterConfig};
use crate::time::{ceil_secs, from_unix_seconds, unix_seconds};

/// A rolling-window call budget shared by every process that points at the same state file.
///
/// Each admission is a read-modify-write of the state file under an exclusive lock on a sibling
/// `<state>.lock` file, so no increment is lost and the window count is totally ordered across
/// processes. When the lock cannot be acquired within the lock timeout the call is let through
/// uncounted ([`Admission::FailOpen`]) and the event is logged at error level.
///
/// [`trigger_panic`][Self::trigger_panic] blocks every cooperating process until the cooldown
/// passes.
///
/// # Examples
///
/// ```
/// use std::time::{Duration, UNIX_EPOCH};
///
/// use tick::Clock;
/// use tollgate::config::LimiterConfig;
/// use tollgate::limiter::RateLimiter;
///
/// let dir = tempfile::tempdir()?;
/// let clock = Clock::new_frozen_at(UNIX_EPOCH + Duration::from_secs(1_700_000_000));
/// let limiter = RateLimiter::new(LimiterConfig::new(dir.path().join("state.json"), 2), clock)?;
///
/// assert!(limiter.check_and_increment()?.is_allowed());
/// assert!(limiter.check_and_increment()?.is_allowed());
/// assert!(!limiter.check_and_increment()?.is_allowed());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct RateLimiter {
    config: LimiterConfig,
    lock_path: PathBuf,
    clock: Clock,
}

impl RateLimiter {
    /// Creates a limiter over the configured state file. Nothing is touched on disk until the
    /// first operation.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `config` does not pass [`LimiterConfig::validate`].
    pub fn new(config: LimiterConfig, clock: Clock) -> Result<Self, ConfigError> {
        config.validate()?;
        let lock_path = lock_path_for(&config.state_path);

        Ok(Self { config, lock_path, clock })
    }

    /// The limiter settings.
    #[must_use]
    pub fn config(&self) -> &LimiterConfig {
        &self.config
    }

    /// Path of the shared state file.
    #[must_use]
    pub fn state_path(&self) -> &Path {
        &self.config.state_path
    }

    /// Path of the lock file guarding the state file.
    #[must_use]
    pub fn lock_path(&self) -> &Path {
        &self.lock_path
    }

    /// Counts one call against the shared window, blocking the thread while the lock is
    /// contended.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError`] when the state or lock file cannot be accessed. A lock timeout is
    /// not an error: the call is admitted as [`Admission::FailOpen`].
    pub fn check_and_increment(&self) -> Result<Admission, LimiterError> {
        match file_lock::acquire_blocking(&self.lock_path, self.config.lock_timeout)? {
            Some(guard) => self.admit_locked(&guard),
            None => Ok(self.fail_open()),
        }
    }

    /// Same as [`check_and_increment`][Self::check_and_increment], but waits for a contended
    /// lock on the clock instead of blocking the thread.
    ///
    /// # Errors
    ///
    /// Same as [`check_and_increment`][Self::check_and_increment].
    pub async fn check_and_increment_async(&self) -> Result<Admission, LimiterError> {
        match file_lock::acquire(&self.lock_path, self.config.lock_timeout, &self.clock).await? {
            Some(guard) => self.admit_locked(&guard),
            None => Ok(self.fail_open()),
        }
    }

    /// Starts fleet-wide panic mode: every process is blocked until the cooldown passes.
    ///
    /// An already active panic that lasts longer is kept. Returns when panic mode ends.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError::LockTimeout`] when the lock cannot be acquired in time, or
    /// [`LimiterError::Io`] when the state cannot be persisted.
    pub fn trigger_panic(&self) -> Result<SystemTime, LimiterError> {
        let guard = file_lock::acquire_blocking(&self.lock_path, self.config.lock_timeout)?.ok_or_else(|| self.lock_timeout())?;
        self.panic_locked(&guard)
    }

    /// Same as [`trigger_panic`][Self::trigger_panic], but waits for a contended lock on the
    /// clock instead of blocking the thread.
    ///
    /// # Errors
    ///
    /// Same as [`trigger_panic`][Self::trigger_panic].
    pub async fn trigger_panic_async(&self) -> Result<SystemTime, LimiterError> {
        let guard = file_lock::acquire(&self.lock_path, self.config.lock_timeout, &self.clock)
            .await?
            .ok_or_else(|| self.lock_timeout())?;
        self.panic_locked(&guard)
    }

    /// Dashboard view of the shared state.
    ///
    /// The state file is only ever replaced atomically, so it is read without taking the lock.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError`] when the state file cannot be read.
    pub fn status(&self) -> Result<RateLimitStatus, LimiterError> {
        let state = state::load(&self.config.state_path)?;
        let now = unix_seconds(self.clock.system_time());
        let panic_remaining = Duration::try_from_secs_f64(state.panic_until - now).ok().filter(|left| !left.is_zero());

        Ok(RateLimitStatus {
            window_count: state.window_count,
            window_start: state.window_start,
            panic_until: state.panic_until,
            last_action: state.last_action,
            capacity_per_window: self.config.capacity_per_window,
            window_seconds: self.config.window.as_secs(),
            panic_active: panic_remaining.is_some(),
            panic_remaining_seconds: panic_remaining.map(ceil_secs),
        })
    }

    fn admit_locked(&self, _guard: &LockGuard) -> Result<Admission, LimiterError> {
        let path = &self.config.state_path;
        let mut state = state::load(path)?;
        let now = unix_seconds(self.clock.system_time());

        let admission = decide(&mut state, now, self.config.capacity_per_window, self.config.window);

        match admission {
            Admission::Admitted { window_count, remaining } => {
                state::save(path, &state)?;
                tracing::event!(
                    name: "tollgate.limiter.admitted",
                    tracing::Level::DEBUG,
                    limiter.window_count = window_count,
                    limiter.remaining = remaining,
                );
            }
            Admission::Rejected { reason, retry_after } => {
                tracing::event!(
                    name: "tollgate.limiter.rejected",
                    tracing::Level::WARN,
                    limiter.reason = reason.as_str(),
                    limiter.retry_after = ceil_secs(retry_after),
                    limiter.window_count = state.window_count,
                );
            }
            Admission::FailOpen => {}
        }

        Ok(admission)
    }

    fn panic_locked(&self, _guard: &LockGuard) -> Result<SystemTime, LimiterError> {
        let path = &self.config.state_path;
        let mut state = state::load(path)?;
        let now = self.clock.system_time();

        let requested = unix_seconds(now) + self.config.panic_cooldown.as_secs_f64();
        state.panic_until = state.panic_until.max(requested);
        state::save(path, &state)?;

        tracing::event!(
            name: "tollgate.limiter.panic",
            tracing::Level::WARN,
            limiter.panic_until = state.panic_until,
            limiter.cooldown = self.config.panic_cooldown.as_secs(),
        );

        Ok(from_unix_seconds(state.panic_until)
            .or_else(|| now.checked_add(self.config.panic_cooldown))
            .unwrap_or(now))
    }

    fn fail_open(&self) -> Admission {
        tracing::event!(
            name: "tollgate.limiter.fail_open",
            tracing::Level::ERROR,
            limiter.lock_path = %self.lock_path.display(),
            limiter.lock_timeout_ms = u64::try_from(self.config.lock_timeout.as_millis()).unwrap_or(u64::MAX),
        );

        Admission::FailOpen
    }

    fn lock_timeout(&self) -> LimiterError {
        LimiterError::LockTimeout {
            path: self.lock_path.clone(),
        }
    }
}

/// Dashboard view of the shared limiter state.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct RateLimitStatus {
    /// Calls counted in the current window.
    pub window_count: u32,

    /// Start of the current window in fractional UNIX seconds, `0.0` when unset.
    pub window_start: f64,

    /// End of panic mode in fractional UNIX seconds, `0.0` when never triggered.
    pub panic_until: f64,

    /// Last admitted call in fractional UNIX seconds, `0.0` when none.
    pub last_action: f64,

    /// Configured calls per window.
    pub capacity_per_window: u32,

    /// Configured window length in seconds.
    pub window_seconds: u64,

    /// Whether panic mode currently blocks every call.
    pub panic_active: bool,

    /// Whole seconds until panic mode ends, while active.
    pub panic_remaining_seconds: Option<u64>,
}

fn lock_path_for(state_path: &Path) -> PathBuf {
    let mut lock_path = OsString::from(state_path.as_os_str());
    lock_path.push(".lock");
    PathBuf::from(lock_path)
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::time::UNIX_EPOCH;

    use tick::ClockControl;

    use super::*;
    use crate::limiter::RejectReason;

    fn control() -> ClockControl {
        ClockControl::new_at(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }

    fn limiter(dir: &Path, capacity: u32, clock: Clock) -> RateLimiter {
        RateLimiter::new(LimiterConfig::new(dir.join("state.json"), capacity), clock).unwrap()
    }

    #[test]
    fn static_assertions() {
        static_assertions::assert_impl_all!(RateLimiter: Send, Sync);
    }

    #[test]
    fn zero_window_is_rejected() {
        let dir = tempfile::tempdir().unwrap();

        let error = RateLimiter::new(
            LimiterConfig::new(dir.path().join("state.json"), 5).with_window(Duration::ZERO),
            control().to_clock(),
        )
        .unwrap_err();

        assert!(matches!(error, ConfigError::Invalid { .. }));
    }

    #[test]
    fn lock_path_is_sibling() {
        assert_eq!(lock_path_for(Path::new("/data/state.json")), PathBuf::from("/data/state.json.lock"));
    }

    #[test]
    fn capacity_then_reject_then_window_reset() {
        let dir = tempfile::tempdir().unwrap();
        let control = control();
        let limiter = limiter(dir.path(), 2, control.to_clock());

        assert!(limiter.check_and_increment().unwrap().is_allowed());
        assert!(limiter.check_and_increment().unwrap().is_allowed());
        assert!(matches!(
            limiter.check_and_increment().unwrap(),
            Admission::Rejected {
                reason: RejectReason::WindowFull,
                ..
            }
        ));

        control.advance(Duration::from_secs(3600));

        assert_eq!(
            limiter.check_and_increment().unwrap(),
            Admission::Admitted {
                window_count: 1,
                remaining: 1
            }
        );
    }

    #[test]
    fn panic_blocks_until_cooldown() {
        let dir = tempfile::tempdir().unwrap();
        let control = control();
        let limiter = limiter(dir.path(), 100, control.to_clock());

        let until = limiter.trigger_panic().unwrap();

        assert_eq!(until, control.to_clock().system_time() + Duration::from_secs(3600));
        assert!(matches!(
            limiter.check_and_increment().unwrap(),
            Admission::Rejected {
                reason: RejectReason::Panic,
                ..
            }
        ));

        control.advance(Duration::from_secs(3599));
        assert!(!limiter.check_and_increment().unwrap().is_allowed());

        control.advance(Duration::from_secs(1));
        assert!(limiter.check_and_increment().unwrap().is_allowed());
    }

    #[test]
    fn trigger_panic_keeps_longer_panic() {
        let dir = tempfile::tempdir().unwrap();
        let control = control();
        let limiter = limiter(dir.path(), 100, control.to_clock());
        let first = limiter.trigger_panic().unwrap();

        let shorter = RateLimiter::new(
            LimiterConfig::new(dir.path().join("state.json"), 100).with_panic_cooldown(Duration::from_secs(60)),
            control.to_clock(),
        )
        .unwrap();

        assert_eq!(shorter.trigger_panic().unwrap(), first);
    }

    #[test]
    fn status_reports_state() {
        let dir = tempfile::tempdir().unwrap();
        let control = control();
        let limiter = limiter(dir.path(), 5, control.to_clock());
        limiter.check_and_increment().unwrap();
        limiter.trigger_panic().unwrap();

        let status = limiter.status().unwrap();

        assert_eq!(status.window_count, 1);
        assert_eq!(status.capacity_per_window, 5);
        assert!(status.panic_active);
        assert_eq!(status.panic_remaining_seconds, Some(3600));
        assert!((status.window_start - 1_700_000_000.0).abs() < f64::EPSILON);
    }

    #[test]
    fn status_of_untouched_limiter() {
        let dir = tempfile::tempdir().unwrap();
        let limiter = limiter(dir.path(), 5, control().to_clock());

        let status = limiter.status().unwrap();

        assert_eq!(status.window_count, 0);
        assert!(!status.panic_active);
        assert_eq!(status.panic_remaining_seconds, None);
    }

    #[test]
    fn lock_timeout_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let limiter = RateLimiter::new(
            LimiterConfig::new(dir.path().join("state.json"), 1).with_lock_timeout(Duration::from_millis(50)),
            control().to_clock(),
        )
        .unwrap();
        let _held = file_lock::acquire_blocking(limiter.lock_path(), Duration::from_millis(50)).unwrap().unwrap();

        assert_eq!(limiter.check_and_increment().unwrap(), Admission::FailOpen);
        assert!(matches!(limiter.trigger_panic(), Err(LimiterError::LockTimeout { .. })));
    }

    #[tokio::test]
    async fn async_variant_shares_state() {
        let dir = tempfile::tempdir().unwrap();
        let limiter = limiter(dir.path(), 1, control().to_clock());

        assert!(limiter.check_and_increment_async().await.unwrap().is_allowed());
        assert!(!limiter.check_and_increment().unwrap().is_allowed());
    }

    #[tokio::test]
    async fn async_lock_timeout_fails_open() {
        let dir = tempfile::tempdir().unwrap();
        let control = control().auto_advance_timers(true);
        let limiter = RateLimiter::new(
            LimiterConfig::new(dir.path().join("state.json"), 1).with_lock_timeout(Duration::from_millis(100)),
            control.to_clock(),
        )
        .unwrap();
        let _held = file_lock::acquire_blocking(limiter.lock_path(), Duration::from_millis(50)).unwrap().unwrap();

        assert_eq!(limiter.check_and_increment_async().await.unwrap(), Admission::FailOpen);
    }
}
