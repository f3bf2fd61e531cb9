// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! The failure policy: which action to recommend for a classified failure.
//!
//! The [`ErrorHandler`] never fails and never waits. It returns an [`ErrorAction`] and leaves
//! the retry loop to the caller.

use std::time::Duration;

mod action;
mod context;
mod handler;

pub use action::{ActionType, ErrorAction};
pub use context::ErrorContext;
pub use handler::ErrorHandler;

/// Default number of consecutive rate limits tolerated before escalating.
pub const DEFAULT_ESCALATION_THRESHOLD: u32 = 5;

/// Default gap after which a rate limit no longer extends the streak.
pub const DEFAULT_STREAK_WINDOW: Duration = Duration::from_secs(15 * 60);

/// Default backoff for rate limits without a provider hint.
pub const DEFAULT_RATE_LIMIT_DELAY: Duration = Duration::from_secs(60);

/// Default backoff for transient provider failures.
pub const DEFAULT_TRANSIENT_DELAY: Duration = Duration::from_secs(5);

/// Default backoff for transport failures.
pub const DEFAULT_NETWORK_DELAY: Duration = Duration::from_secs(5);

/// Default backoff for provider server failures.
pub const DEFAULT_SERVER_DELAY: Duration = Duration::from_secs(10);
