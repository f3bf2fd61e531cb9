// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;
use std::time::Duration;

use recoverable::{Recovery, RecoveryInfo};

use super::ErrorCategory;

/// Normalized, provider-agnostic description of one failure.
///
/// Records are immutable and only produced by the [`ErrorClassifier`][super::ErrorClassifier], so
/// the category is always derived from the static classification tables and never assigned ad
/// hoc.
///
/// The [`Debug`] output includes the raw message and the provider trace ID. Use
/// [`safe_message`][super::safe_message] for anything that reaches end users.
#[derive(Debug, Clone, PartialEq)]
pub struct FailureRecord {
    pub(crate) code: Option<i64>,
    pub(crate) message: String,
    pub(crate) category: ErrorCategory,
    pub(crate) retryable: bool,
    pub(crate) retry_after: Option<Duration>,
    pub(crate) requires_reauth: bool,
    pub(crate) subcode: Option<i64>,
    pub(crate) trace_id: Option<String>,
    pub(crate) raw: Option<Arc<serde_json::Value>>,
}

impl FailureRecord {
    pub(crate) fn new(category: ErrorCategory, message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            category,
            retryable: false,
            retry_after: None,
            requires_reauth: false,
            subcode: None,
            trace_id: None,
            raw: None,
        }
    }

    /// Provider error code, or the HTTP status when the code was missing and the status decided
    /// the category.
    #[must_use]
    pub fn code(&self) -> Option<i64> {
        self.code
    }

    /// Technical message from the provider or the transport. Not safe for end users.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The derived failure category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        self.category
    }

    /// Whether repeating the same call later may succeed.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.retryable
    }

    /// How long to wait before retrying, when the provider or the signature table supplied it.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    /// Whether the credential must be replaced before any further call can succeed.
    #[must_use]
    pub fn requires_reauth(&self) -> bool {
        self.requires_reauth
    }

    /// Provider error subcode.
    #[must_use]
    pub fn subcode(&self) -> Option<i64> {
        self.subcode
    }

    /// Provider trace ID for support requests.
    #[must_use]
    pub fn trace_id(&self) -> Option<&str> {
        self.trace_id.as_deref()
    }

    /// The raw response payload the record was classified from, if any.
    #[must_use]
    pub fn raw(&self) -> Option<&serde_json::Value> {
        self.raw.as_deref()
    }
}

impl Recovery for FailureRecord {
    fn recovery(&self) -> RecoveryInfo {
        if !self.retryable {
            return RecoveryInfo::never();
        }

        match self.retry_after {
            Some(delay) => RecoveryInfo::retry().delay(delay),
            None => RecoveryInfo::retry(),
        }
    }
}
