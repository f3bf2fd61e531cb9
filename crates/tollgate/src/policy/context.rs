// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Where a failure happened. Only used to enrich logs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct ErrorContext {
    /// The endpoint class of the failed call.
    pub endpoint_class: Option<String>,

    /// A caller-chosen name of the operation, such as `send_reply`.
    pub operation: Option<String>,
}

impl ErrorContext {
    /// Creates an empty context.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the endpoint class.
    #[must_use]
    pub fn with_endpoint_class(mut self, endpoint_class: impl Into<String>) -> Self {
        self.endpoint_class = Some(endpoint_class.into());
        self
    }

    /// Sets the operation name.
    #[must_use]
    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = Some(operation.into());
        self
    }

    pub(crate) fn endpoint_class_or_unknown(&self) -> &str {
        self.endpoint_class.as_deref().unwrap_or("unknown")
    }

    pub(crate) fn operation_or_unknown(&self) -> &str {
        self.operation.as_deref().unwrap_or("unknown")
    }
}
