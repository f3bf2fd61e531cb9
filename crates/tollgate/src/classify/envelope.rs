// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::Duration;

use serde_json::Value;

/// The fields of a provider error payload that take part in classification.
///
/// Payloads look like
/// `{"error": {"code": 4, "message": "..", "error_subcode": 2446079, "fbtrace_id": "..", "error_data": {"retry_after": 30}}}`.
/// Extraction is lenient: a missing or mistyped field is treated as absent, and codes sent as
/// numeric strings are accepted.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct ErrorEnvelope {
    pub(crate) code: Option<i64>,
    pub(crate) message: Option<String>,
    pub(crate) subcode: Option<i64>,
    pub(crate) trace_id: Option<String>,
    pub(crate) retry_after: Option<Duration>,
}

impl ErrorEnvelope {
    pub(crate) fn from_value(value: &Value) -> Self {
        let Some(error) = value.get("error").filter(|error| error.is_object()) else {
            return Self::default();
        };

        Self {
            code: error.get("code").and_then(integer),
            message: error.get("message").and_then(Value::as_str).map(str::to_owned),
            subcode: error.get("error_subcode").and_then(integer),
            trace_id: error.get("fbtrace_id").and_then(Value::as_str).map(str::to_owned),
            retry_after: error
                .get("error_data")
                .and_then(|data| data.get("retry_after"))
                .and_then(seconds),
        }
    }
}

fn integer(value: &Value) -> Option<i64> {
    match value {
        Value::Number(number) => number.as_i64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn seconds(value: &Value) -> Option<Duration> {
    let seconds = match value {
        Value::Number(number) => number.as_f64()?,
        Value::String(text) => text.trim().parse().ok()?,
        _ => return None,
    };

    if seconds.is_sign_negative() {
        return None;
    }

    Duration::try_from_secs_f64(seconds).ok()
}
