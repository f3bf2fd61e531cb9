// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Display;
use std::time::Duration;

use serde::Serialize;

use crate::classify::ErrorCategory;

/// What the caller is advised to do about a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[non_exhaustive]
pub enum ActionType {
    /// Retry right away.
    Retry,

    /// Retry after the recommended delay.
    RetryWithBackoff,

    /// Give up on this request.
    Fail,

    /// A human must re-authenticate before further calls can succeed.
    Reauth,

    /// Stop calling the endpoint class until its circuit recovers.
    CircuitBreak,

    /// The failure needs no handling.
    Ignore,
}

impl ActionType {
    /// Returns the name used in logs and dashboards.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Retry => "RETRY",
            Self::RetryWithBackoff => "RETRY_WITH_BACKOFF",
            Self::Fail => "FAIL",
            Self::Reauth => "REAUTH",
            Self::CircuitBreak => "CIRCUIT_BREAK",
            Self::Ignore => "IGNORE",
        }
    }
}

impl Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The recommended handling of one classified failure.
///
/// Actions are advice only. The resilience layer never sleeps or retries on its own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct ErrorAction {
    /// What to do.
    pub action: ActionType,

    /// How long to wait before retrying, if a retry makes sense.
    #[serde(rename = "delaySeconds", serialize_with = "serialize_delay")]
    pub delay: Option<Duration>,

    /// A localized, non-technical message safe to show to end users.
    pub safe_message: &'static str,

    /// Whether operators should be paged.
    pub should_alert: bool,

    /// The category the action was derived from.
    pub category: ErrorCategory,
}

impl ErrorAction {
    /// Whether the action recommends another attempt.
    #[must_use]
    pub const fn is_retry(&self) -> bool {
        matches!(self.action, ActionType::Retry | ActionType::RetryWithBackoff)
    }
}

#[expect(clippy::ref_option, reason = "serde passes fields by reference")]
fn serialize_delay<S: serde::Serializer>(delay: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error> {
    match delay {
        Some(delay) => serializer.serialize_some(&delay.as_secs_f64()),
        None => serializer.serialize_none(),
    }
}
