// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

/// Error returned by [`CircuitBreaker::call`][super::CircuitBreaker::call].
///
/// Only the open-circuit condition is produced by the breaker itself. Failures of the wrapped
/// call are passed through unchanged in [`Inner`][Self::Inner] after they were counted.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum BreakerError<E> {
    /// The circuit rejected the call without invoking it.
    #[error("circuit for endpoint class '{endpoint_class}' is open")]
    Open {
        /// The endpoint class of the rejecting circuit.
        endpoint_class: String,
        /// Time until the circuit admits a probe. `None` when the circuit is half-open and all
        /// probe slots are taken.
        retry_after: Option<Duration>,
    },

    /// The wrapped call failed.
    #[error(transparent)]
    Inner(E),
}

impl<E> BreakerError<E> {
    /// Returns the wrapped call's error, if that is what failed.
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Inner(error) => Some(error),
            Self::Open { .. } => None,
        }
    }

    /// Time until the rejecting circuit admits a probe, when known.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Open { retry_after, .. } => *retry_after,
            Self::Inner(_) => None,
        }
    }

    /// Whether the circuit rejected the call.
    #[must_use]
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }
}
