// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::error::Error;
use std::sync::Arc;

use serde_json::Value;

use super::envelope::ErrorEnvelope;
use super::{ErrorCategory, FailureRecord, Locale, code_table, network, safe_message};

const UNKNOWN_MESSAGE: &str = "unknown error";

/// Turns provider error payloads and transport errors into [`FailureRecord`]s.
///
/// Classification is pure and total: the same input always yields the same category,
/// retryability and re-authentication requirement, and no input makes it fail. The category comes
/// from the static provider code table first, then from the HTTP status range, and is
/// [`ErrorCategory::Unknown`] otherwise.
///
/// # Examples
///
/// ```
/// use tollgate::classify::{ErrorCategory, ErrorClassifier};
///
/// let classifier = ErrorClassifier::default();
/// let body = br#"{"error": {"code": 190, "message": "Access token expired"}}"#;
///
/// let record = classifier.classify_response(body, Some(400));
///
/// assert_eq!(record.category(), ErrorCategory::Authentication);
/// assert!(record.requires_reauth());
/// assert!(!record.is_retryable());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ErrorClassifier {
    locale: Locale,
}

impl ErrorClassifier {
    /// Creates a classifier producing safe messages in the given locale.
    #[must_use]
    pub const fn new(locale: Locale) -> Self {
        Self { locale }
    }

    /// The locale used by [`safe_message`][Self::safe_message].
    #[must_use]
    pub const fn locale(&self) -> Locale {
        self.locale
    }

    /// Classifies a raw response body. A body that is not valid JSON is treated as an empty
    /// error envelope, so the HTTP status alone decides the category.
    #[must_use]
    pub fn classify_response(&self, body: &[u8], http_status: Option<u16>) -> FailureRecord {
        let value = serde_json::from_slice::<Value>(body).unwrap_or(Value::Null);
        self.classify_owned(value, http_status)
    }

    /// Classifies an already parsed response payload.
    #[must_use]
    pub fn classify_value(&self, value: &Value, http_status: Option<u16>) -> FailureRecord {
        self.classify_owned(value.clone(), http_status)
    }

    /// Classifies an error raised by the transport or by the caller's own code.
    ///
    /// The whole `source()` chain is inspected for transport failures. Anything that does not
    /// look like one is [`ErrorCategory::Unknown`].
    #[must_use]
    pub fn classify_error(&self, error: &(dyn Error + 'static)) -> FailureRecord {
        match network::detect(error) {
            Some(failure) => {
                let mut record = FailureRecord::new(ErrorCategory::Network, format!("{}: {error}", failure.label()));
                record.retryable = true;
                record.retry_after = Some(failure.retry_after());
                record
            }
            None => FailureRecord::new(ErrorCategory::Unknown, format!("unexpected error: {error}")),
        }
    }

    /// Returns the end-user message for a record in this classifier's locale.
    #[must_use]
    pub const fn safe_message(&self, record: &FailureRecord) -> &'static str {
        safe_message(record.category, self.locale)
    }

    fn classify_owned(&self, value: Value, http_status: Option<u16>) -> FailureRecord {
        let envelope = ErrorEnvelope::from_value(&value);
        let entry = envelope.code.and_then(code_table::lookup);
        let message = envelope
            .message
            .or_else(|| entry.map(|entry| entry.description.to_owned()))
            .unwrap_or_else(|| UNKNOWN_MESSAGE.to_owned());

        let mut record = FailureRecord::new(ErrorCategory::Unknown, message);
        record.code = envelope.code;
        record.subcode = envelope.subcode;
        record.trace_id = envelope.trace_id;
        record.raw = (!value.is_null()).then(|| Arc::new(value));

        if let Some(entry) = entry {
            record.category = entry.category;
            record.retryable = entry.retryable;
            record.requires_reauth = entry.requires_reauth;
            record.retry_after = envelope.retry_after;
            return record;
        }

        match http_status {
            Some(status) if status >= 500 => {
                record.category = ErrorCategory::Server;
                record.retryable = true;
                record.retry_after = envelope.retry_after;
                record.code = record.code.or(Some(i64::from(status)));
            }
            Some(status) if status >= 400 => {
                record.category = ErrorCategory::Client;
                record.code = record.code.or(Some(i64::from(status)));
            }
            _ => {}
        }

        record
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::io;
    use std::time::Duration;

    use serde_json::json;

    use super::*;

    #[test]
    fn known_code_uses_table() {
        let record = ErrorClassifier::default().classify_value(&json!({ "error": { "code": 613, "message": "throttled" } }), Some(400));

        assert_eq!(record.category(), ErrorCategory::RateLimit);
        assert!(record.is_retryable());
        assert_eq!(record.code(), Some(613));
        assert_eq!(record.message(), "throttled");
        assert!(record.raw().is_some());
    }

    #[test]
    fn missing_message_uses_code_description() {
        let record = ErrorClassifier::default().classify_value(&json!({ "error": { "code": 190 } }), Some(400));

        assert_eq!(record.message(), "access token expired");
    }

    #[test]
    fn table_wins_over_status() {
        let record = ErrorClassifier::default().classify_value(&json!({ "error": { "code": 100 } }), Some(503));

        assert_eq!(record.category(), ErrorCategory::Client);
        assert!(!record.is_retryable());
    }

    #[test]
    fn unknown_code_falls_back_to_server_status() {
        let record = ErrorClassifier::default().classify_value(
            &json!({ "error": { "code": 9999, "error_data": { "retry_after": 12 } } }),
            Some(502),
        );

        assert_eq!(record.category(), ErrorCategory::Server);
        assert!(record.is_retryable());
        assert_eq!(record.code(), Some(9999));
        assert_eq!(record.retry_after(), Some(Duration::from_secs(12)));
    }

    #[test]
    fn missing_code_takes_status() {
        let record = ErrorClassifier::default().classify_response(b"<html>bad gateway</html>", Some(404));

        assert_eq!(record.category(), ErrorCategory::Client);
        assert_eq!(record.code(), Some(404));
        assert_eq!(record.message(), UNKNOWN_MESSAGE);
        assert!(record.raw().is_none());
    }

    #[test]
    fn no_status_is_unknown() {
        let record = ErrorClassifier::default().classify_response(b"{}", None);

        assert_eq!(record.category(), ErrorCategory::Unknown);
        assert!(!record.is_retryable());
        assert_eq!(record.code(), None);
    }

    #[test]
    fn success_status_is_unknown() {
        let record = ErrorClassifier::default().classify_response(b"{}", Some(200));

        assert_eq!(record.category(), ErrorCategory::Unknown);
        assert_eq!(record.code(), None);
    }

    #[test]
    fn io_timeout_is_network() {
        let error = io::Error::new(io::ErrorKind::TimedOut, "read");

        let record = ErrorClassifier::default().classify_error(&error);

        assert_eq!(record.category(), ErrorCategory::Network);
        assert!(record.is_retryable());
        assert_eq!(record.retry_after(), Some(Duration::from_secs(5)));
        assert_eq!(record.message(), "network error: read");
    }

    #[test]
    fn tls_error_waits_longer() {
        let error = io::Error::other("tls handshake eof");

        let record = ErrorClassifier::default().classify_error(&error);

        assert_eq!(record.category(), ErrorCategory::Network);
        assert_eq!(record.retry_after(), Some(Duration::from_secs(10)));
    }

    #[test]
    fn unmatched_error_is_unknown() {
        let error = io::Error::other("widget exploded");

        let record = ErrorClassifier::default().classify_error(&error);

        assert_eq!(record.category(), ErrorCategory::Unknown);
        assert!(!record.is_retryable());
        assert_eq!(record.retry_after(), None);
    }

    #[test]
    fn safe_message_follows_locale() {
        let record = ErrorClassifier::default().classify_response(b"{}", None);

        assert_eq!(
            ErrorClassifier::new(Locale::English).safe_message(&record),
            "Sorry, something went wrong. Please try again."
        );
        assert_eq!(ErrorClassifier::default().safe_message(&record), "ขออภัยค่ะ มีข้อผิดพลาดเกิดขึ้น กรุณาลองใหม่");
    }
}
