// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::SystemTime;

use super::{IntrospectError, SecretToken};

/// Asks the provider what it knows about a credential.
///
/// This is the seam between the [`TokenManager`][super::TokenManager] and the provider's token
/// introspection ("debug token") endpoint. Production code uses
/// [`GraphIntrospector`][super::GraphIntrospector] (feature `graph`). Tests and deployments
/// without an introspection endpoint use [`StaticIntrospector`] or their own implementation.
pub trait Introspect: Send + Sync {
    /// Introspects the credential.
    ///
    /// Implementations return [`IntrospectError::Timeout`] when the request timed out. The
    /// manager then keeps trusting its cached validity.
    fn introspect(&self, token: &SecretToken) -> impl Future<Output = Result<Introspection, IntrospectError>> + Send;
}

/// What the provider reported about a credential.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[non_exhaustive]
pub struct Introspection {
    /// Whether the credential is usable.
    pub is_valid: bool,

    /// When the credential expires. `None` means it does not expire or the provider did not say.
    pub expires_at: Option<SystemTime>,

    /// Granted permissions.
    pub scopes: Vec<String>,

    /// The credential type reported by the provider.
    pub token_type: Option<String>,

    /// The application the credential was issued to.
    pub app_id: Option<String>,

    /// The provider's explanation when the credential is not usable.
    pub error_message: Option<String>,
}

impl Introspection {
    /// A usable credential without further details.
    #[must_use]
    pub fn valid() -> Self {
        Self {
            is_valid: true,
            ..Self::default()
        }
    }

    /// An unusable credential.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self {
            is_valid: false,
            error_message: Some(message.into()),
            ..Self::default()
        }
    }

    /// Sets the expiry.
    #[must_use]
    pub const fn with_expires_at(mut self, expires_at: SystemTime) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Sets the granted permissions.
    #[must_use]
    pub fn with_scopes<S: Into<String>>(mut self, scopes: impl IntoIterator<Item = S>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the application ID.
    #[must_use]
    pub fn with_app_id(mut self, app_id: impl Into<String>) -> Self {
        self.app_id = Some(app_id.into());
        self
    }
}

/// An [`Introspect`] implementation that always reports the same result.
///
/// Useful for deployments whose provider has no introspection endpoint and for tests.
#[derive(Debug, Clone)]
pub struct StaticIntrospector {
    result: Introspection,
}

impl StaticIntrospector {
    /// Always reports the given result.
    #[must_use]
    pub const fn new(result: Introspection) -> Self {
        Self { result }
    }

    /// Always reports the credential as valid.
    #[must_use]
    pub fn valid() -> Self {
        Self::new(Introspection::valid())
    }
}

impl Introspect for StaticIntrospector {
    async fn introspect(&self, _token: &SecretToken) -> Result<Introspection, IntrospectError> {
        Ok(self.result.clone())
    }
}
