// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::ErrorCategory;

/// Classification metadata for a known provider error code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CodeEntry {
    pub(crate) category: ErrorCategory,
    pub(crate) retryable: bool,
    pub(crate) requires_reauth: bool,
    pub(crate) description: &'static str,
}

impl CodeEntry {
    const fn new(category: ErrorCategory, retryable: bool, requires_reauth: bool, description: &'static str) -> Self {
        Self {
            category,
            retryable,
            requires_reauth,
            description,
        }
    }
}

/// Looks up a provider error code in the static code table.
pub(crate) const fn lookup(code: i64) -> Option<CodeEntry> {
    use ErrorCategory::{Authentication, Client, RateLimit, Server, Transient};

    let entry = match code {
        102 => CodeEntry::new(Authentication, false, true, "session expired"),
        190 => CodeEntry::new(Authentication, false, true, "access token expired"),
        191 => CodeEntry::new(Authentication, false, true, "access token has expired"),

        4 => CodeEntry::new(RateLimit, true, false, "app rate limit reached"),
        17 => CodeEntry::new(RateLimit, true, false, "user rate limit reached"),
        32 => CodeEntry::new(RateLimit, true, false, "page request limit reached"),
        613 => CodeEntry::new(RateLimit, true, false, "api throttling"),
        80000 => CodeEntry::new(RateLimit, true, false, "page rate limit (business use case)"),
        80001 => CodeEntry::new(RateLimit, true, false, "page rate limit (page token)"),
        80004 => CodeEntry::new(RateLimit, true, false, "too many messages to a single thread"),
        80006 => CodeEntry::new(RateLimit, true, false, "messenger rate limit"),

        2 => CodeEntry::new(Transient, true, false, "service temporarily unavailable"),
        1200 => CodeEntry::new(Transient, true, false, "temporary error"),

        500 => CodeEntry::new(Server, true, false, "internal server error"),
        503 => CodeEntry::new(Server, true, false, "service unavailable"),

        100 => CodeEntry::new(Client, false, false, "invalid parameter"),
        200 => CodeEntry::new(Client, false, false, "permissions error"),
        803 => CodeEntry::new(Client, false, false, "object not found"),

        _ => return None,
    };

    Some(entry)
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use super::*;

    const KNOWN_CODES: [i64; 18] = [102, 190, 191, 4, 17, 32, 613, 80000, 80001, 80004, 80006, 2, 1200, 500, 503, 100, 200, 803];

    #[test]
    fn all_known_codes_resolve() {
        for code in KNOWN_CODES {
            assert!(lookup(code).is_some(), "code {code} must be in the table");
        }
    }

    #[test]
    fn unknown_codes_do_not_resolve() {
        assert_eq!(lookup(0), None);
        assert_eq!(lookup(-1), None);
        assert_eq!(lookup(368), None);
    }

    #[test]
    fn only_authentication_requires_reauth() {
        for code in KNOWN_CODES {
            let entry = lookup(code).unwrap();

            assert_eq!(entry.requires_reauth, entry.category == ErrorCategory::Authentication, "code {code}");
        }
    }

    #[test]
    fn client_and_authentication_are_not_retryable() {
        for code in KNOWN_CODES {
            let entry = lookup(code).unwrap();
            let expected = !matches!(entry.category, ErrorCategory::Authentication | ErrorCategory::Client);

            assert_eq!(entry.retryable, expected, "code {code}");
        }
    }
}
