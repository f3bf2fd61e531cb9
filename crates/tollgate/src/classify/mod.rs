// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Classification of provider and transport failures.
//!
//! Every failure that reaches the resilience layer is normalized into a [`FailureRecord`] by the
//! [`ErrorClassifier`]. The record's [`ErrorCategory`] then drives the recommended action, the
//! circuit breaker bookkeeping and the end-user message.
//!
//! Provider error codes are looked up in a static table:
//!
//! | Codes | Category | Retryable | Re-auth |
//! |---|---|---|---|
//! | 102, 190, 191 | [`Authentication`][ErrorCategory::Authentication] | no | yes |
//! | 4, 17, 32, 613, 80000, 80001, 80004, 80006 | [`RateLimit`][ErrorCategory::RateLimit] | yes | no |
//! | 2, 1200 | [`Transient`][ErrorCategory::Transient] | yes | no |
//! | 500, 503 | [`Server`][ErrorCategory::Server] | yes | no |
//! | 100, 200, 803 | [`Client`][ErrorCategory::Client] | no | no |
//!
//! Unknown codes fall back to the HTTP status: `5xx` is a retryable server failure, `4xx` a
//! client failure, and anything else is [`Unknown`][ErrorCategory::Unknown].

mod category;
mod classifier;
mod code_table;
mod envelope;
mod failure_record;
mod network;
mod provider_error;
mod safe_message;

use std::error::Error;
use std::io;

pub use category::ErrorCategory;
pub use classifier::ErrorClassifier;
pub use failure_record::FailureRecord;
pub use provider_error::ProviderError;
pub use safe_message::{Locale, safe_message};

/// Turns an outbound call's error into a [`FailureRecord`].
///
/// [`ProtectedCaller`][crate::ProtectedCaller] requires the error type of every protected call to
/// implement this trait.
///
/// # Examples
///
/// ```
/// use tollgate::classify::{Classify, ErrorClassifier, FailureRecord};
///
/// #[derive(Debug)]
/// struct SendFailed {
///     status: u16,
///     body: Vec<u8>,
/// }
///
/// impl Classify for SendFailed {
///     fn classify(&self, classifier: &ErrorClassifier) -> FailureRecord {
///         classifier.classify_response(&self.body, Some(self.status))
///     }
/// }
/// ```
pub trait Classify {
    /// Classifies this error.
    fn classify(&self, classifier: &ErrorClassifier) -> FailureRecord;
}

impl Classify for FailureRecord {
    fn classify(&self, _classifier: &ErrorClassifier) -> FailureRecord {
        self.clone()
    }
}

impl Classify for io::Error {
    fn classify(&self, classifier: &ErrorClassifier) -> FailureRecord {
        classifier.classify_error(self)
    }
}

impl Classify for Box<dyn Error + Send + Sync> {
    fn classify(&self, classifier: &ErrorClassifier) -> FailureRecord {
        classifier.classify_error(&**self)
    }
}

impl<T: Classify + ?Sized> Classify for &T {
    fn classify(&self, classifier: &ErrorClassifier) -> FailureRecord {
        (**self).classify(classifier)
    }
}
