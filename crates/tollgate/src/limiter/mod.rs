// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Cross-process shared rate limiting.
//!
//! Independent processes that share one provider account (a fast poll loop and a slow
//! historical sweep, say) must also share one call budget, otherwise each process spends the
//! full quota and the account is throttled. The [`RateLimiter`] keeps the budget in a small JSON
//! state file next to an advisory lock file:
//!
//! ```text
//! rate_limit_state.json       {"version":1,"windowCount":3,"windowStartTimestamp":..,"panicUntilTimestamp":..,"lastActionTimestamp":..}
//! rate_limit_state.json.lock  exclusive lock held during every read-modify-write
//! ```
//!
//! Window arithmetic is relative to the persisted window start, which tolerates modest clock
//! skew between machines sharing the file over a network mount.

use std::time::Duration;

mod admission;
mod error;
mod file_lock;
#[expect(clippy::module_inception, reason = "the limiter type lives in its own file like its siblings")]
mod limiter;
mod state;

pub use admission::{Admission, RejectReason};
pub use error::LimiterError;
pub use limiter::{RateLimitStatus, RateLimiter};

/// Default state file, relative to the working directory.
pub const DEFAULT_STATE_FILE: &str = "rate_limit_state.json";

/// Default number of calls admitted per window.
pub const DEFAULT_CAPACITY_PER_WINDOW: u32 = 60;

/// Default window length.
pub const DEFAULT_WINDOW: Duration = Duration::from_secs(3600);

/// Default panic cooldown.
pub const DEFAULT_PANIC_COOLDOWN: Duration = Duration::from_secs(3600);

/// Default bounded wait for the state file lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);
