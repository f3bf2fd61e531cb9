// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::{Duration, SystemTime};

use serde::Serialize;

use super::SecretToken;

/// The current credential and what is known about it.
///
/// Values are immutable. The [`TokenManager`][super::TokenManager] swaps in a new instance on
/// every validation or rotation.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    pub(crate) token: SecretToken,
    pub(crate) expires_at: Option<SystemTime>,
    pub(crate) token_type: String,
    pub(crate) last_validated: Option<SystemTime>,
    pub(crate) is_valid: bool,
    pub(crate) scopes: Vec<String>,
    pub(crate) app_id: Option<String>,
    // Bumped by every rotation so in-flight validations of an older token can be recognized.
    pub(crate) rotation: u64,
}

impl TokenInfo {
    pub(crate) fn new(token: SecretToken, expires_at: Option<SystemTime>, token_type: String, rotation: u64) -> Self {
        Self {
            token,
            expires_at,
            token_type,
            last_validated: None,
            is_valid: true,
            scopes: Vec::new(),
            app_id: None,
            rotation,
        }
    }

    /// The credential.
    #[must_use]
    pub fn token(&self) -> &SecretToken {
        &self.token
    }

    /// When the credential expires, if known.
    #[must_use]
    pub fn expires_at(&self) -> Option<SystemTime> {
        self.expires_at
    }

    /// The credential type, such as `PAGE_ACCESS_TOKEN`.
    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// When the credential was last validated successfully.
    #[must_use]
    pub fn last_validated(&self) -> Option<SystemTime> {
        self.last_validated
    }

    /// Whether the last validation considered the credential usable.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.is_valid
    }

    /// The permissions granted to the credential.
    #[must_use]
    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    /// The application the credential was issued to.
    #[must_use]
    pub fn app_id(&self) -> Option<&str> {
        self.app_id.as_deref()
    }
}

/// Dashboard view of the credential. Never contains the secret itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct TokenStatus {
    /// Whether the last validation considered the credential usable.
    pub is_valid: bool,

    /// Expiry as fractional UNIX seconds, if known.
    pub expires_at: Option<f64>,

    /// Whole seconds until expiry, zero once expired, if known.
    pub expires_in_seconds: Option<u64>,

    /// Whether the credential expires within the refresh threshold.
    pub is_near_expiration: bool,

    /// Last successful validation as fractional UNIX seconds.
    pub last_validated: Option<f64>,

    /// The credential type.
    pub token_type: String,

    /// The permissions granted to the credential.
    pub scopes: Vec<String>,

    /// The application the credential was issued to.
    pub app_id: Option<String>,
}

pub(crate) fn remaining(expires_at: Option<SystemTime>, now: SystemTime) -> Option<Duration> {
    expires_at.map(|expires_at| expires_at.duration_since(now).unwrap_or(Duration::ZERO))
}
