// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::error::Error;
use std::fmt;

use serde_json::Value;

use super::{Classify, ErrorClassifier, FailureRecord};

/// An error returned by an outbound provider call.
///
/// This is a ready-made error type for closures passed to
/// [`ProtectedCaller::execute`][crate::ProtectedCaller::execute]. Callers with their own error
/// types implement [`Classify`] for them instead.
#[derive(Debug)]
#[non_exhaustive]
pub enum ProviderError {
    /// The provider answered with an error payload.
    Response {
        /// The HTTP status of the response, if known.
        status: Option<u16>,
        /// The response payload.
        body: Value,
    },

    /// The request never produced a provider response.
    Transport(Box<dyn Error + Send + Sync>),
}

impl ProviderError {
    /// Creates a response error from a parsed payload.
    #[must_use]
    pub fn response(status: Option<u16>, body: impl Into<Value>) -> Self {
        Self::Response { status, body: body.into() }
    }

    /// Creates a response error from a raw body. Bodies that are not JSON are kept as `null`.
    #[must_use]
    pub fn from_body(status: Option<u16>, body: &[u8]) -> Self {
        Self::Response {
            status,
            body: serde_json::from_slice(body).unwrap_or(Value::Null),
        }
    }

    /// Creates a transport error.
    pub fn transport(error: impl Into<Box<dyn Error + Send + Sync>>) -> Self {
        Self::Transport(error.into())
    }
}

impl Classify for ProviderError {
    fn classify(&self, classifier: &ErrorClassifier) -> FailureRecord {
        match self {
            Self::Response { status, body } => classifier.classify_value(body, *status),
            Self::Transport(_) => classifier.classify_error(self),
        }
    }
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Response { status: Some(status), .. } => write!(f, "provider rejected the request (http status {status})"),
            Self::Response { status: None, .. } => f.write_str("provider rejected the request (http status unknown)"),
            Self::Transport(error) => write!(f, "transport failure: {error}"),
        }
    }
}

impl Error for ProviderError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Response { .. } => None,
            Self::Transport(error) => Some(&**error),
        }
    }
}
