// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use super::state::LimiterState;

/// Outcome of [`RateLimiter::check_and_increment`][super::RateLimiter::check_and_increment].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum Admission {
    /// The call was counted against the window and may proceed.
    Admitted {
        /// Calls counted in the current window, including this one.
        window_count: u32,
        /// Calls still available in the current window.
        remaining: u32,
    },

    /// The call must not proceed.
    Rejected {
        /// Why the call was rejected.
        reason: RejectReason,
        /// Time until the rejection reason lapses.
        retry_after: Duration,
    },

    /// The lock could not be acquired in time and the call was let through uncounted.
    FailOpen,
}

impl Admission {
    /// Whether the call may proceed.
    #[must_use]
    pub const fn is_allowed(&self) -> bool {
        !matches!(self, Self::Rejected { .. })
    }
}

/// Why the limiter rejected a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum RejectReason {
    /// Panic mode is active fleet-wide.
    Panic,

    /// The current window's budget is used up.
    WindowFull,
}

impl RejectReason {
    /// Stable name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Panic => "panic",
            Self::WindowFull => "window_full",
        }
    }
}

/// Applies one admission decision to the loaded state. `now` is in UNIX seconds.
///
/// The caller persists the state only when the call was admitted.
pub(crate) fn decide(state: &mut LimiterState, now: f64, capacity: u32, window: Duration) -> Admission {
    if now < state.panic_until {
        return Admission::Rejected {
            reason: RejectReason::Panic,
            retry_after: seconds_until(state.panic_until, now),
        };
    }

    let window_secs = window.as_secs_f64();
    let unset = state.window_start <= 0.0;
    let elapsed = now - state.window_start >= window_secs;
    let skewed = state.window_start - now > window_secs;

    if unset || elapsed || skewed {
        state.window_count = 0;
        state.window_start = now;
    }

    if state.window_count >= capacity {
        return Admission::Rejected {
            reason: RejectReason::WindowFull,
            retry_after: seconds_until(state.window_start + window_secs, now),
        };
    }

    state.window_count = state.window_count.saturating_add(1);
    state.last_action = now;

    Admission::Admitted {
        window_count: state.window_count,
        remaining: capacity.saturating_sub(state.window_count),
    }
}

fn seconds_until(deadline: f64, now: f64) -> Duration {
    Duration::try_from_secs_f64(deadline - now).unwrap_or(Duration::ZERO)
}
