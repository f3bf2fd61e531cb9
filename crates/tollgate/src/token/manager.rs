// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime};

use tick::Clock;

use super::info::remaining;
use super::{
    AuthError, DEFAULT_REFRESH_THRESHOLD, DEFAULT_TOKEN_TYPE, DEFAULT_VALIDATION_TTL, Introspect, IntrospectError, Introspection,
    SecretToken, TokenInfo, TokenStatus,
};
use crate::config::{ConfigError, CredentialConfig};
use crate::constants::ERR_POISONED_LOCK;
use crate::time::{ceil_secs, unix_seconds};

/// Tracks the validity and expiry of the provider credential.
///
/// Validation results are trusted for a freshness window (5 minutes by default). Inside the
/// window [`validate`][Self::validate] answers from the cache. Outside it, the introspection
/// endpoint is asked again. A stale result never invalidates the credential on its own.
///
/// The credential is replaced as a whole by [`update_token`][Self::update_token]. A validation
/// that was in flight during a rotation is discarded, so it cannot mark the new credential with
/// the old one's result.
///
/// # Examples
///
/// ```
/// use tick::Clock;
/// use tollgate::token::{StaticIntrospector, TokenManager};
///
/// # futures::executor::block_on(async {
/// let manager = TokenManager::new("EAAB...", StaticIntrospector::valid(), Clock::new_frozen());
///
/// let token = manager.get_valid_token(true).await?;
/// assert_eq!(token.as_declassified(), "EAAB...");
/// # Ok::<(), tollgate::token::AuthError>(())
/// # }).unwrap();
/// ```
#[derive(Debug)]
pub struct TokenManager<I> {
    info: Mutex<Arc<TokenInfo>>,
    introspector: I,
    clock: Clock,
    validation_ttl: Duration,
    refresh_threshold: Duration,
}

impl<I: Introspect> TokenManager<I> {
    /// Creates a manager for the given credential with the default freshness window and refresh
    /// threshold.
    #[must_use]
    pub fn new(token: impl Into<SecretToken>, introspector: I, clock: Clock) -> Self {
        Self {
            info: Mutex::new(Arc::new(TokenInfo::new(token.into(), None, DEFAULT_TOKEN_TYPE.to_owned(), 0))),
            introspector,
            clock,
            validation_ttl: DEFAULT_VALIDATION_TTL,
            refresh_threshold: DEFAULT_REFRESH_THRESHOLD,
        }
    }

    /// Creates a manager from the credential configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when no initial token is configured.
    pub fn from_config(config: &CredentialConfig, introspector: I, clock: Clock) -> Result<Self, ConfigError> {
        let token = config.initial_token.clone().ok_or_else(|| ConfigError::Invalid {
            problems: vec!["credential.initialToken must be set".to_owned()],
        })?;

        Ok(Self::new(token, introspector, clock)
            .with_token_type(config.token_type.clone())
            .with_validation_ttl(config.validation_ttl)
            .with_refresh_threshold(config.refresh_threshold))
    }

    /// Sets the credential type reported on dashboards.
    #[must_use]
    pub fn with_token_type(self, token_type: impl Into<String>) -> Self {
        let token_type = token_type.into();
        self.replace(|current| TokenInfo {
            token_type,
            ..current.clone()
        });
        self
    }

    /// Sets how long a validation result is trusted.
    #[must_use]
    pub const fn with_validation_ttl(mut self, validation_ttl: Duration) -> Self {
        self.validation_ttl = validation_ttl;
        self
    }

    /// Sets how long before expiry the credential counts as near expiration.
    #[must_use]
    pub const fn with_refresh_threshold(mut self, refresh_threshold: Duration) -> Self {
        self.refresh_threshold = refresh_threshold;
        self
    }

    /// Returns the current credential state.
    #[must_use]
    pub fn current(&self) -> Arc<TokenInfo> {
        Arc::clone(&self.info.lock().expect(ERR_POISONED_LOCK))
    }

    /// Validates the credential with the provider.
    ///
    /// Unless `force` is set, a validation younger than the freshness window is answered from
    /// the cache without calling the provider. When the introspection request times out, the
    /// cached validity is returned and nothing changes.
    ///
    /// # Errors
    ///
    /// - [`AuthError::Expired`] when the provider reports the credential as invalid or expired.
    /// - [`AuthError::ValidationFailed`] when the endpoint rejected the request or the transport
    ///   failed.
    ///
    /// In both cases the credential is marked invalid.
    pub async fn validate(&self, force: bool) -> Result<bool, AuthError> {
        let current = self.current();
        let now = self.clock.system_time();

        if !force && self.is_fresh(&current, now) {
            return Ok(current.is_valid);
        }

        let outcome = self.introspector.introspect(&current.token).await;

        match outcome {
            Ok(introspection) if introspection.is_valid => {
                let applied = self.apply(&current, |info| {
                    apply_introspection(info, introspection, now);
                });

                if applied {
                    tracing::event!(
                        name: "tollgate.token.validated",
                        tracing::Level::INFO,
                        token.expires_at = self.current().expires_at.map(unix_seconds),
                    );
                    Ok(true)
                } else {
                    Ok(self.current().is_valid)
                }
            }
            Ok(introspection) => {
                let message = introspection.error_message.unwrap_or_else(|| "token invalid".to_owned());

                if !self.apply(&current, mark_invalid) {
                    return Ok(self.current().is_valid);
                }

                tracing::event!(
                    name: "tollgate.token.invalid",
                    tracing::Level::ERROR,
                    token.error = %message,
                );
                Err(AuthError::Expired { message })
            }
            Err(IntrospectError::Timeout) => {
                tracing::event!(
                    name: "tollgate.token.validation_timeout",
                    tracing::Level::WARN,
                    token.is_valid = current.is_valid,
                );
                Ok(current.is_valid)
            }
            Err(error) => {
                if !self.apply(&current, mark_invalid) {
                    return Ok(self.current().is_valid);
                }

                tracing::event!(
                    name: "tollgate.token.validation_failed",
                    tracing::Level::ERROR,
                    error = %error,
                );
                Err(AuthError::ValidationFailed(error))
            }
        }
    }

    /// Returns the credential, optionally validating it first.
    ///
    /// A credential close to its expiry is returned with a warning logged. The provider's page
    /// tokens cannot be refreshed automatically, so a human has to rotate it.
    ///
    /// # Errors
    ///
    /// - Any error of [`validate`][Self::validate] when `validate` is set.
    /// - [`AuthError::Invalid`] when validation reports the credential as not valid.
    /// - [`AuthError::Expired`] when the known expiry has passed.
    pub async fn get_valid_token(&self, validate: bool) -> Result<SecretToken, AuthError> {
        if validate && !self.validate(false).await? {
            return Err(AuthError::Invalid);
        }

        let info = self.current();
        let now = self.clock.system_time();

        if is_expired(&info, now) {
            tracing::event!(
                name: "tollgate.token.expired",
                tracing::Level::ERROR,
                token.expires_at = info.expires_at.map(unix_seconds),
            );
            return Err(AuthError::Expired {
                message: "access token has expired, manual re-authentication required".to_owned(),
            });
        }

        if self.near_expiration(&info, now) {
            tracing::event!(
                name: "tollgate.token.near_expiration",
                tracing::Level::WARN,
                token.expires_in = remaining(info.expires_at, now).map(ceil_secs),
            );
        }

        Ok(info.token.clone())
    }

    /// Whether the credential expires within the refresh threshold. Always `false` while the
    /// expiry is unknown.
    #[must_use]
    pub fn is_near_expiration(&self) -> bool {
        self.near_expiration(&self.current(), self.clock.system_time())
    }

    /// Whether the known expiry has passed. Always `false` while the expiry is unknown.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        is_expired(&self.current(), self.clock.system_time())
    }

    /// Time left until expiry, zero once expired, or `None` while the expiry is unknown.
    #[must_use]
    pub fn expires_in(&self) -> Option<Duration> {
        remaining(self.current().expires_at, self.clock.system_time())
    }

    /// Replaces the credential as a whole.
    ///
    /// The new credential starts out valid and unvalidated, and keeps the configured token type.
    pub fn update_token(&self, token: impl Into<SecretToken>, expires_at: Option<SystemTime>) {
        let token = token.into();
        self.replace(|current| TokenInfo::new(token, expires_at, current.token_type.clone(), current.rotation.wrapping_add(1)));

        tracing::event!(
            name: "tollgate.token.updated",
            tracing::Level::INFO,
            token.expires_at = expires_at.map(unix_seconds),
        );
    }

    /// Dashboard view of the credential.
    #[must_use]
    pub fn status(&self) -> TokenStatus {
        let info = self.current();
        let now = self.clock.system_time();

        TokenStatus {
            is_valid: info.is_valid,
            expires_at: info.expires_at.map(unix_seconds),
            expires_in_seconds: remaining(info.expires_at, now).map(|left| left.as_secs()),
            is_near_expiration: self.near_expiration(&info, now),
            last_validated: info.last_validated.map(unix_seconds),
            token_type: info.token_type.clone(),
            scopes: info.scopes.clone(),
            app_id: info.app_id.clone(),
        }
    }

    fn is_fresh(&self, info: &TokenInfo, now: SystemTime) -> bool {
        info.last_validated
            .is_some_and(|validated| now.duration_since(validated).unwrap_or(Duration::ZERO) < self.validation_ttl)
    }

    fn near_expiration(&self, info: &TokenInfo, now: SystemTime) -> bool {
        info.expires_at
            .is_some_and(|expires_at| now.checked_add(self.refresh_threshold).is_none_or(|horizon| horizon >= expires_at))
    }

    fn replace(&self, update: impl FnOnce(&TokenInfo) -> TokenInfo) {
        let mut info = self.info.lock().expect(ERR_POISONED_LOCK);
        *info = Arc::new(update(&info));
    }

    /// Applies a validation outcome unless the credential was rotated in the meantime.
    fn apply(&self, validated: &TokenInfo, update: impl FnOnce(&mut TokenInfo)) -> bool {
        let mut info = self.info.lock().expect(ERR_POISONED_LOCK);

        if info.rotation != validated.rotation {
            tracing::event!(
                name: "tollgate.token.validation_discarded",
                tracing::Level::DEBUG,
                token.rotation = info.rotation,
            );
            return false;
        }

        let mut next = TokenInfo::clone(&info);
        update(&mut next);
        *info = Arc::new(next);
        true
    }
}

fn apply_introspection(info: &mut TokenInfo, introspection: Introspection, now: SystemTime) {
    info.is_valid = true;
    info.last_validated = Some(now);
    info.expires_at = introspection.expires_at.or(info.expires_at);
    info.scopes = introspection.scopes;

    if let Some(token_type) = introspection.token_type {
        info.token_type = token_type;
    }
    if introspection.app_id.is_some() {
        info.app_id = introspection.app_id;
    }
}

fn mark_invalid(info: &mut TokenInfo) {
    info.is_valid = false;
}

fn is_expired(info: &TokenInfo, now: SystemTime) -> bool {
    info.expires_at.is_some_and(|expires_at| now >= expires_at)
}
