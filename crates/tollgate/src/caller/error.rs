// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::error::Error;
use std::fmt::{self, Display, Formatter};
use std::time::Duration;

use recoverable::{Recovery, RecoveryInfo};

use crate::classify::FailureRecord;
use crate::limiter::{LimiterError, RejectReason};
use crate::policy::{ActionType, ErrorAction};
use crate::time::ceil_secs;

/// Error returned by [`ProtectedCaller::execute`][super::ProtectedCaller::execute].
///
/// Callers match on the variant instead of inspecting messages. Only
/// [`Failed`][Self::Failed] means the outbound call actually ran.
#[derive(Debug)]
#[non_exhaustive]
pub enum CallError<E> {
    /// The shared rate limit rejected the call. The call was not made.
    RateLimited {
        /// Why the limiter rejected the call.
        reason: RejectReason,
        /// Time until the limiter admits calls again.
        retry_after: Duration,
    },

    /// The shared rate limit state could not be accessed. The call was not made.
    Limiter(LimiterError),

    /// The endpoint class's circuit is open. The call was not made.
    CircuitOpen {
        /// The endpoint class of the open circuit.
        endpoint_class: String,
        /// Time until the circuit admits a probe, when known.
        retry_after: Option<Duration>,
    },

    /// The call ran and failed.
    Failed {
        /// The call's own error.
        source: E,
        /// The classified failure.
        failure: FailureRecord,
        /// The recommended handling.
        action: ErrorAction,
    },
}

impl<E> CallError<E> {
    /// The recommended handling, for failures of calls that ran.
    #[must_use]
    pub const fn action(&self) -> Option<&ErrorAction> {
        match self {
            Self::Failed { action, .. } => Some(action),
            _ => None,
        }
    }

    /// The classified failure, for calls that ran.
    #[must_use]
    pub const fn failure(&self) -> Option<&FailureRecord> {
        match self {
            Self::Failed { failure, .. } => Some(failure),
            _ => None,
        }
    }

    /// How long to wait before trying again, when there is a hint.
    #[must_use]
    pub const fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => Some(*retry_after),
            Self::CircuitOpen { retry_after, .. } => *retry_after,
            Self::Failed { action, .. } => action.delay,
            Self::Limiter(_) => None,
        }
    }

    /// Returns the call's own error, for calls that ran.
    pub fn into_source(self) -> Option<E> {
        match self {
            Self::Failed { source, .. } => Some(source),
            _ => None,
        }
    }
}

impl<E> Display for CallError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::RateLimited { reason, retry_after } => {
                write!(f, "rate limit rejected the call ({}), retry in {}s", reason.as_str(), ceil_secs(*retry_after))
            }
            Self::Limiter(_) => f.write_str("rate limit state is unavailable"),
            Self::CircuitOpen { endpoint_class, .. } => write!(f, "circuit for endpoint class '{endpoint_class}' is open"),
            Self::Failed { failure, action, .. } => {
                write!(f, "call failed with a {} failure, recommended action {}", failure.category(), action.action)
            }
        }
    }
}

impl<E: Error + 'static> Error for CallError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Limiter(error) => Some(error),
            Self::Failed { source, .. } => Some(source),
            Self::RateLimited { .. } | Self::CircuitOpen { .. } => None,
        }
    }
}

impl<E> Recovery for CallError<E> {
    fn recovery(&self) -> RecoveryInfo {
        match self {
            Self::RateLimited { retry_after, .. } => RecoveryInfo::unavailable().delay(*retry_after),
            Self::CircuitOpen { retry_after, .. } => match retry_after {
                Some(delay) => RecoveryInfo::unavailable().delay(*delay),
                None => RecoveryInfo::unavailable(),
            },
            Self::Limiter(_) => RecoveryInfo::unknown(),
            Self::Failed { action, .. } => match (action.action, action.delay) {
                (ActionType::Retry | ActionType::RetryWithBackoff, Some(delay)) => RecoveryInfo::retry().delay(delay),
                (ActionType::Retry | ActionType::RetryWithBackoff, None) => RecoveryInfo::retry(),
                (ActionType::CircuitBreak, Some(delay)) => RecoveryInfo::unavailable().delay(delay),
                (ActionType::CircuitBreak, None) => RecoveryInfo::unavailable(),
                (ActionType::Fail | ActionType::Reauth | ActionType::Ignore, _) => RecoveryInfo::never(),
            },
        }
    }
}
