// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use data_privacy::{classified, taxonomy};
use serde::Deserialize;

/// Data classes of the values this crate keeps out of logs and telemetry.
#[taxonomy(tollgate)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TollgateTaxonomy {
    /// Access tokens and application secrets.
    Credential,
}

/// A secret credential such as an access token or an application secret.
///
/// The value is classified as [`TollgateTaxonomy::Credential`]. Its `Debug` and `Display`
/// output name the data class and never the value, and a
/// [`RedactionEngine`](data_privacy::RedactionEngine) can produce redacted forms of it.
/// Cloning is cheap.
#[classified(TollgateTaxonomy::Credential)]
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct SecretToken(Arc<str>);

impl SecretToken {
    /// Wraps a secret value.
    #[must_use]
    pub fn new(value: impl Into<Arc<str>>) -> Self {
        Self(value.into())
    }

    /// Returns the secret value for use in a request.
    #[must_use]
    pub fn as_declassified(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SecretToken {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for SecretToken {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use data_privacy::simple_redactor::{SimpleRedactor, SimpleRedactorMode};
    use data_privacy::{RedactedToString, RedactionEngine};

    use super::*;

    #[test]
    fn formatting_never_shows_the_value() {
        let token = SecretToken::new("EAAB-very-secret");

        assert!(!format!("{token:?}").contains("EAAB"));
        assert!(!format!("{token}").contains("EAAB"));
        assert_eq!(token.as_declassified(), "EAAB-very-secret");
    }

    #[test]
    fn redaction_engine_masks_the_value() {
        let engine = RedactionEngine::builder()
            .add_class_redactor(
                TollgateTaxonomy::Credential.data_class(),
                SimpleRedactor::with_mode(SimpleRedactorMode::Replace('*')),
            )
            .build();
        let token = SecretToken::new("abcd");

        let redacted = token.to_redacted_string(&engine);

        assert!(!redacted.contains("abcd"));
        assert!(redacted.chars().all(|c| c == '*' || c == '"'));
    }

    #[test]
    fn deserializes_from_plain_string() {
        let token: SecretToken = serde_json::from_str("\"abc\"").unwrap();

        assert_eq!(token, SecretToken::from("abc"));
    }
}
