// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt::Display;

use serde::{Deserialize, Serialize};

/// Normalized category of a provider or transport failure.
///
/// The category decides how a failure is handled: whether it is worth retrying, whether a human
/// needs to re-authenticate, and whether operators should be paged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCategory {
    /// The credential is expired, revoked or lacks the required grant. Fatal until a human
    /// re-authenticates.
    Authentication,

    /// The provider is throttling the application, the page or the user. Recoverable, but
    /// repeated throttling escalates to a circuit break.
    RateLimit,

    /// A short-lived provider hiccup.
    Transient,

    /// A local or transport problem: timeouts, resets, DNS or TLS failures.
    Network,

    /// The provider failed with a 5xx condition.
    Server,

    /// The request itself is wrong. Not recoverable without a code change.
    Client,

    /// Nothing matched. Treated conservatively: not retried and always alerted.
    Unknown,
}

impl ErrorCategory {
    /// All categories, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Authentication,
        Self::RateLimit,
        Self::Transient,
        Self::Network,
        Self::Server,
        Self::Client,
        Self::Unknown,
    ];

    /// Returns the stable, lowercase name used in logs and dashboards.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::RateLimit => "rate_limit",
            Self::Transient => "transient",
            Self::Network => "network",
            Self::Server => "server",
            Self::Client => "client",
            Self::Unknown => "unknown",
        }
    }
}

impl Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn as_str_is_unique() {
        let mut names: Vec<_> = ErrorCategory::ALL.iter().map(|c| c.as_str()).collect();
        names.sort_unstable();
        names.dedup();

        assert_eq!(names.len(), ErrorCategory::ALL.len());
    }

    #[test]
    fn display_matches_as_str() {
        assert_eq!(ErrorCategory::RateLimit.to_string(), "rate_limit");
    }

    #[test]
    fn serializes_in_screaming_snake_case() {
        let json = serde_json::to_string(&ErrorCategory::RateLimit).unwrap();

        assert_eq!(json, "\"RATE_LIMIT\"");
    }
}
