// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Per endpoint class circuit breakers.
//!
//! The provider enforces different quotas and failure tolerances per kind of call, so every
//! endpoint class gets its own [`CircuitBreaker`]:
//!
//! ```text
//!            failures >= failure_threshold
//!   CLOSED ─────────────────────────────────► OPEN
//!     ▲                                       │  ▲
//!     │ successes >= success_threshold        │  │ any probe failure
//!     │                                       ▼  │
//!     └──────────────────────────────────── HALF_OPEN
//!                     recovery_timeout elapsed (first probe)
//! ```
//!
//! Built-in class defaults:
//!
//! | class | failure threshold | recovery timeout | half-open calls | success threshold |
//! |---|---|---|---|---|
//! | `comments`, `private_replies` | 3 | 120 s | 2 | 2 |
//! | `insights` | 10 | 60 s | 3 | 2 |
//! | `messages` and any other class | 5 | 60 s | 3 | 2 |

use std::time::Duration;

mod args;
#[expect(clippy::module_inception, reason = "the breaker type lives in its own file like its siblings")]
mod breaker;
mod callbacks;
mod engine;
mod error;
mod registry;
mod snapshot;
mod state;
mod transition;

pub use args::OnStateChangeArgs;
pub use breaker::CircuitBreaker;
pub use error::BreakerError;
pub use registry::CircuitBreakerRegistry;
pub use snapshot::{CircuitMetrics, CircuitSnapshot};
pub use state::CircuitState;
pub use transition::{Transition, TransitionReason};

use crate::config::BreakerConfig;

const DEFAULT: BreakerConfig = BreakerConfig::new(5, Duration::from_secs(60), 3, 2);
const REPLIES: BreakerConfig = BreakerConfig::new(3, Duration::from_secs(120), 2, 2);
const INSIGHTS: BreakerConfig = BreakerConfig::new(10, Duration::from_secs(60), 3, 2);

/// Built-in circuit settings of an endpoint class.
#[must_use]
pub fn defaults_for_endpoint_class(endpoint_class: &str) -> BreakerConfig {
    match endpoint_class {
        "comments" | "private_replies" => REPLIES,
        "insights" => INSIGHTS,
        _ => DEFAULT,
    }
}
