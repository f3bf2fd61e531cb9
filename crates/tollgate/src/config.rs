// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Configuration of the resilience layer.
//!
//! [`TollgateConfig`] is deserialized from JSON with camelCase keys. Every section and field
//! has a default, so an empty document `{}` is a valid configuration:
//!
//! ```json
//! {
//!   "circuits": {
//!     "comments": { "failureThreshold": 3, "recoveryTimeoutSeconds": 120, "halfOpenMaxCalls": 2, "successThreshold": 2 }
//!   },
//!   "rateLimit": { "statePath": "/var/lib/bot/rate_limit.json", "capacityPerWindow": 60, "windowSeconds": 3600, "panicCooldownSeconds": 3600 },
//!   "policy": { "rateLimitEscalationThreshold": 5 },
//!   "credential": { "initialToken": "...", "appId": "...", "appSecret": "...", "introspectionEndpoint": "https://graph.facebook.com/debug_token" },
//!   "locale": "thai"
//! }
//! ```
//!
//! Tunable numbers live here. The classification and action tables themselves are fixed.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::breaker::defaults_for_endpoint_class;
use crate::classify::Locale;
use crate::token::SecretToken;

/// Longest duration any setting accepts.
pub const MAX_DURATION: Duration = Duration::from_secs(365 * 24 * 60 * 60);

/// Longest accepted wait for the state file lock of the rate limiter.
pub const MAX_LOCK_TIMEOUT: Duration = Duration::from_secs(10 * 60);

/// Error returned when loading or validating a configuration.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("failed to read configuration file {}", path.display())]
    Io {
        /// The path that was read.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid JSON or does not match the expected shape.
    #[error("failed to parse configuration")]
    Parse(#[from] serde_json::Error),

    /// The configuration parsed but contains values that cannot work.
    #[error("invalid configuration: {}", problems.join("; "))]
    Invalid {
        /// Every problem that was found.
        problems: Vec<String>,
    },
}

/// Root configuration of the resilience layer.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
#[non_exhaustive]
pub struct TollgateConfig {
    /// Per endpoint class circuit breaker overrides. Classes without an entry use the built-in
    /// defaults.
    pub circuits: BTreeMap<String, BreakerConfig>,

    /// The shared, cross-process rate limit.
    pub rate_limit: LimiterConfig,

    /// Tuning of the failure policy.
    pub policy: PolicyConfig,

    /// The provider credential.
    pub credential: CredentialConfig,

    /// Language of the end-user failure messages.
    pub locale: Locale,
}

impl TollgateConfig {
    /// Parses and validates a configuration from a JSON string.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON and [`ConfigError::Invalid`] when
    /// [`validate`][Self::validate] fails.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise the same errors as
    /// [`from_json_str`][Self::from_json_str].
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_json_str(&json)
    }

    /// Returns the circuit settings for an endpoint class: the configured override, else the
    /// built-in default for the class.
    #[must_use]
    pub fn circuit(&self, endpoint_class: &str) -> BreakerConfig {
        self.circuits
            .get(endpoint_class)
            .copied()
            .unwrap_or_else(|| defaults_for_endpoint_class(endpoint_class))
    }

    /// Checks the configuration for values that cannot work.
    ///
    /// All problems are collected before returning, so a single run reports everything that
    /// needs fixing.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        for (endpoint_class, circuit) in &self.circuits {
            circuit.collect_problems(&format!("circuits.{endpoint_class}"), &mut problems);
        }

        self.rate_limit.collect_problems(&mut problems);
        self.policy.collect_problems(&mut problems);
        self.credential.collect_problems(&mut problems);

        into_result(problems)
    }
}

/// Thresholds of one circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
#[non_exhaustive]
pub struct BreakerConfig {
    /// Consecutive failures that open a closed circuit.
    pub failure_threshold: u32,

    /// How long a circuit stays open after its last failure before it admits a probe.
    #[serde(rename = "recoveryTimeoutSeconds", with = "seconds")]
    pub recovery_timeout: Duration,

    /// Maximum number of probe calls admitted while half-open.
    pub half_open_max_calls: u32,

    /// Successful probes needed to close a half-open circuit.
    pub success_threshold: u32,
}

impl BreakerConfig {
    /// Creates circuit settings.
    ///
    /// The values are not checked here. [`CircuitBreakerRegistry::with_circuit`] and
    /// [`TollgateConfig::validate`] check them, and [`validate`][Self::validate] can be called
    /// directly before handing the settings to a [`CircuitBreaker`].
    ///
    /// [`CircuitBreakerRegistry::with_circuit`]: crate::breaker::CircuitBreakerRegistry::with_circuit
    /// [`CircuitBreaker`]: crate::breaker::CircuitBreaker
    #[must_use]
    pub const fn new(failure_threshold: u32, recovery_timeout: Duration, half_open_max_calls: u32, success_threshold: u32) -> Self {
        Self {
            failure_threshold,
            recovery_timeout,
            half_open_max_calls,
            success_threshold,
        }
    }

    /// Checks the settings for values that cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        self.collect_problems("circuit", &mut problems);
        into_result(problems)
    }

    fn collect_problems(&self, prefix: &str, problems: &mut Vec<String>) {
        if self.failure_threshold == 0 {
            problems.push(format!("{prefix}.failureThreshold must be at least 1"));
        }
        if self.success_threshold == 0 {
            problems.push(format!("{prefix}.successThreshold must be at least 1"));
        }
        if self.half_open_max_calls < self.success_threshold {
            problems.push(format!(
                "{prefix}.halfOpenMaxCalls ({}) must be at least successThreshold ({}), otherwise the circuit can never close",
                self.half_open_max_calls, self.success_threshold
            ));
        }
        check_positive(problems, &format!("{prefix}.recoveryTimeoutSeconds"), self.recovery_timeout, MAX_DURATION);
    }
}

/// Settings of the shared rate limiter.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
#[non_exhaustive]
pub struct LimiterConfig {
    /// Path of the shared state file. The lock file is created next to it.
    pub state_path: PathBuf,

    /// Calls admitted per window across all cooperating processes.
    pub capacity_per_window: u32,

    /// Length of the rolling window.
    #[serde(rename = "windowSeconds", with = "seconds")]
    pub window: Duration,

    /// How long panic mode blocks every call once triggered.
    #[serde(rename = "panicCooldownSeconds", with = "seconds")]
    pub panic_cooldown: Duration,

    /// Bounded wait for the state file lock. The limiter admits the call when it expires.
    #[serde(rename = "lockTimeoutMillis", with = "millis")]
    pub lock_timeout: Duration,
}

impl LimiterConfig {
    /// Creates limiter settings for a state file with the default window, cooldown and lock
    /// timeout.
    ///
    /// Neither this nor the `with_*` setters check the values. [`RateLimiter::new`] and
    /// [`TollgateConfig::validate`] do.
    ///
    /// [`RateLimiter::new`]: crate::limiter::RateLimiter::new
    #[must_use]
    pub fn new(state_path: impl Into<PathBuf>, capacity_per_window: u32) -> Self {
        Self {
            state_path: state_path.into(),
            capacity_per_window,
            ..Self::default()
        }
    }

    /// Sets the window length.
    #[must_use]
    pub const fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }

    /// Sets the panic cooldown.
    #[must_use]
    pub const fn with_panic_cooldown(mut self, panic_cooldown: Duration) -> Self {
        self.panic_cooldown = panic_cooldown;
        self
    }

    /// Sets the lock timeout.
    #[must_use]
    pub const fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    /// Checks the settings for values that cannot work.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] listing every problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();
        self.collect_problems(&mut problems);
        into_result(problems)
    }

    fn collect_problems(&self, problems: &mut Vec<String>) {
        if self.state_path.as_os_str().is_empty() {
            problems.push("rateLimit.statePath must not be empty".to_owned());
        }
        if self.capacity_per_window == 0 {
            problems.push("rateLimit.capacityPerWindow must be at least 1".to_owned());
        }
        check_positive(problems, "rateLimit.windowSeconds", self.window, MAX_DURATION);
        check_positive(problems, "rateLimit.panicCooldownSeconds", self.panic_cooldown, MAX_DURATION);
        check_positive(problems, "rateLimit.lockTimeoutMillis", self.lock_timeout, MAX_LOCK_TIMEOUT);
    }
}

impl Default for LimiterConfig {
    fn default() -> Self {
        Self {
            state_path: PathBuf::from(crate::limiter::DEFAULT_STATE_FILE),
            capacity_per_window: crate::limiter::DEFAULT_CAPACITY_PER_WINDOW,
            window: crate::limiter::DEFAULT_WINDOW,
            panic_cooldown: crate::limiter::DEFAULT_PANIC_COOLDOWN,
            lock_timeout: crate::limiter::DEFAULT_LOCK_TIMEOUT,
        }
    }
}

/// Tuning of the failure policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
#[non_exhaustive]
pub struct PolicyConfig {
    /// Consecutive rate limit classifications tolerated before escalating to a circuit break.
    pub rate_limit_escalation_threshold: u32,

    /// A rate limit classification older than this no longer extends the streak.
    #[serde(rename = "rateLimitStreakWindowSeconds", with = "seconds")]
    pub rate_limit_streak_window: Duration,

    /// Backoff recommended for rate limits when the provider gives no hint.
    #[serde(rename = "rateLimitDelaySeconds", with = "seconds")]
    pub rate_limit_delay: Duration,

    /// Backoff recommended for transient provider failures.
    #[serde(rename = "transientDelaySeconds", with = "seconds")]
    pub transient_delay: Duration,

    /// Backoff recommended for transport failures.
    #[serde(rename = "networkDelaySeconds", with = "seconds")]
    pub network_delay: Duration,

    /// Backoff recommended for provider server failures.
    #[serde(rename = "serverDelaySeconds", with = "seconds")]
    pub server_delay: Duration,
}

impl PolicyConfig {
    fn collect_problems(&self, problems: &mut Vec<String>) {
        if self.rate_limit_escalation_threshold == 0 {
            problems.push("policy.rateLimitEscalationThreshold must be at least 1".to_owned());
        }
        check_positive(problems, "policy.rateLimitStreakWindowSeconds", self.rate_limit_streak_window, MAX_DURATION);
        check_at_most(problems, "policy.rateLimitDelaySeconds", self.rate_limit_delay, MAX_DURATION);
        check_at_most(problems, "policy.transientDelaySeconds", self.transient_delay, MAX_DURATION);
        check_at_most(problems, "policy.networkDelaySeconds", self.network_delay, MAX_DURATION);
        check_at_most(problems, "policy.serverDelaySeconds", self.server_delay, MAX_DURATION);
    }
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            rate_limit_escalation_threshold: crate::policy::DEFAULT_ESCALATION_THRESHOLD,
            rate_limit_streak_window: crate::policy::DEFAULT_STREAK_WINDOW,
            rate_limit_delay: crate::policy::DEFAULT_RATE_LIMIT_DELAY,
            transient_delay: crate::policy::DEFAULT_TRANSIENT_DELAY,
            network_delay: crate::policy::DEFAULT_NETWORK_DELAY,
            server_delay: crate::policy::DEFAULT_SERVER_DELAY,
        }
    }
}

/// The provider credential and how it is validated.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
#[non_exhaustive]
pub struct CredentialConfig {
    /// The access token used at startup.
    pub initial_token: Option<SecretToken>,

    /// Token type reported on dashboards.
    pub token_type: String,

    /// Application ID used to authenticate introspection requests.
    pub app_id: Option<String>,

    /// Application secret used to authenticate introspection requests.
    pub app_secret: Option<SecretToken>,

    /// URL of the provider's token introspection endpoint.
    pub introspection_endpoint: String,

    /// How long a validation result is trusted.
    #[serde(rename = "validationTtlSeconds", with = "seconds")]
    pub validation_ttl: Duration,

    /// How long before expiry the token is reported as near expiration.
    #[serde(rename = "refreshThresholdSeconds", with = "seconds")]
    pub refresh_threshold: Duration,

    /// Timeout of a single introspection request.
    #[serde(rename = "requestTimeoutSeconds", with = "seconds")]
    pub request_timeout: Duration,
}

impl CredentialConfig {
    fn collect_problems(&self, problems: &mut Vec<String>) {
        if self.introspection_endpoint.trim().is_empty() {
            problems.push("credential.introspectionEndpoint must not be empty".to_owned());
        }
        check_positive(problems, "credential.validationTtlSeconds", self.validation_ttl, MAX_DURATION);
        check_at_most(problems, "credential.refreshThresholdSeconds", self.refresh_threshold, MAX_DURATION);
        check_positive(problems, "credential.requestTimeoutSeconds", self.request_timeout, MAX_DURATION);
    }
}

impl Default for CredentialConfig {
    fn default() -> Self {
        Self {
            initial_token: None,
            token_type: crate::token::DEFAULT_TOKEN_TYPE.to_owned(),
            app_id: None,
            app_secret: None,
            introspection_endpoint: crate::token::DEFAULT_INTROSPECTION_ENDPOINT.to_owned(),
            validation_ttl: crate::token::DEFAULT_VALIDATION_TTL,
            refresh_threshold: crate::token::DEFAULT_REFRESH_THRESHOLD,
            request_timeout: crate::token::DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

fn check_positive(problems: &mut Vec<String>, key: &str, value: Duration, max: Duration) {
    if value.is_zero() {
        problems.push(format!("{key} must be greater than zero"));
    }
    check_at_most(problems, key, value, max);
}

fn check_at_most(problems: &mut Vec<String>, key: &str, value: Duration, max: Duration) {
    if value > max {
        problems.push(format!("{key} must be at most {max:?}"));
    }
}

fn into_result(problems: Vec<String>) -> Result<(), ConfigError> {
    if problems.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Invalid { problems })
    }
}

mod seconds {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub(super) fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_secs())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
