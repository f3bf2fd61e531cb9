// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::error::Error;

/// Error returned by an [`Introspect`][super::Introspect] implementation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum IntrospectError {
    /// The introspection request did not complete in time.
    #[error("token introspection timed out")]
    Timeout,

    /// The introspection endpoint answered with an error.
    #[error("token introspection rejected with status {status}: {message}")]
    Rejected {
        /// HTTP status of the response.
        status: u16,
        /// Provider message describing the rejection.
        message: String,
    },

    /// The request failed before a response was received.
    #[error("token introspection transport failure")]
    Transport(#[source] Box<dyn Error + Send + Sync>),
}

/// Error returned when the credential cannot be used.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum AuthError {
    /// The provider reported the credential as invalid or expired, or its known expiry has
    /// passed. A human has to issue a new credential.
    #[error("access token is expired or invalid: {message}")]
    Expired {
        /// What the provider or the expiry check reported.
        message: String,
    },

    /// The credential could not be validated.
    #[error("access token validation failed")]
    ValidationFailed(#[source] IntrospectError),

    /// The credential is known to be invalid.
    #[error("access token is not valid")]
    Invalid,
}
