// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Arc;

use tick::Clock;

use super::CallError;
use crate::breaker::{BreakerError, CircuitBreaker, CircuitBreakerRegistry, CircuitSnapshot};
use crate::classify::{Classify, ErrorCategory, ErrorClassifier};
use crate::config::{ConfigError, TollgateConfig};
use crate::limiter::{Admission, LimiterError, RateLimitStatus, RateLimiter};
use crate::policy::{ActionType, ErrorContext, ErrorHandler};
use crate::token::{AuthError, Introspect, SecretToken, TokenManager, TokenStatus};

/// Runs outbound provider calls behind the shared rate limit and the endpoint class's circuit.
///
/// Build one instance per process and share it, for example in an `Arc`. Failures are
/// classified and come back with a recommended action. Nothing is retried automatically.
///
/// # Examples
///
/// ```
/// use tick::Clock;
/// use tollgate::{CallError, ProtectedCaller};
/// use tollgate::classify::ProviderError;
/// use tollgate::config::TollgateConfig;
/// use tollgate::policy::ActionType;
/// use tollgate::token::StaticIntrospector;
///
/// # futures::executor::block_on(async {
/// let dir = tempfile::tempdir()?;
/// let state_path = dir.path().join("rate_limit.json");
/// let config = TollgateConfig::from_json_str(&format!(
///     r#"{{"rateLimit": {{"statePath": {:?}}}, "credential": {{"initialToken": "EAAB..."}}}}"#,
///     state_path.display().to_string(),
/// ))?;
/// let caller = ProtectedCaller::new(&config, Clock::new_frozen(), StaticIntrospector::valid())?;
///
/// let result = caller
///     .execute("comments", || async {
///         Err::<(), _>(ProviderError::response(Some(400), serde_json::json!({"error": {"code": 190}})))
///     })
///     .await;
///
/// match result {
///     Err(CallError::Failed { action, .. }) => assert_eq!(action.action, ActionType::Reauth),
///     other => panic!("unexpected: {other:?}"),
/// }
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # }).unwrap();
/// ```
#[derive(Debug)]
pub struct ProtectedCaller<I> {
    limiter: RateLimiter,
    circuits: CircuitBreakerRegistry,
    handler: ErrorHandler,
    tokens: TokenManager<I>,
}

impl<I: Introspect> ProtectedCaller<I> {
    /// Builds the whole resilience layer from a configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when the configuration does not validate or names no
    /// initial token.
    pub fn new(config: &TollgateConfig, clock: Clock, introspector: I) -> Result<Self, ConfigError> {
        config.validate()?;

        let tokens = TokenManager::from_config(&config.credential, introspector, clock.clone())?;
        let limiter = RateLimiter::new(config.rate_limit.clone(), clock.clone())?;
        let circuits = CircuitBreakerRegistry::from_config(config, clock.clone());
        let handler = ErrorHandler::new(ErrorClassifier::new(config.locale), config.policy, clock);

        Ok(Self::from_parts(limiter, circuits, handler, tokens))
    }

    /// Assembles a caller from separately built components.
    #[must_use]
    pub const fn from_parts(limiter: RateLimiter, circuits: CircuitBreakerRegistry, handler: ErrorHandler, tokens: TokenManager<I>) -> Self {
        Self {
            limiter,
            circuits,
            handler,
            tokens,
        }
    }

    /// Runs `operation` for `endpoint_class` behind the shared rate limit and the class's circuit.
    ///
    /// `operation` is only invoked when both admit the call. On failure, the error is classified
    /// and handled: a rate limit puts every cooperating process into panic mode, and an escalated
    /// rate limit streak forces the circuit open.
    ///
    /// # Errors
    ///
    /// - [`CallError::RateLimited`] or [`CallError::Limiter`] when the shared budget rejects the
    ///   call or cannot be read.
    /// - [`CallError::CircuitOpen`] when the class's circuit rejects the call.
    /// - [`CallError::Failed`] when `operation` fails.
    pub async fn execute<T, E, F, Fut>(&self, endpoint_class: &str, operation: F) -> Result<T, CallError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify,
    {
        match self.limiter.check_and_increment_async().await.map_err(CallError::Limiter)? {
            Admission::Rejected { reason, retry_after } => return Err(CallError::RateLimited { reason, retry_after }),
            Admission::Admitted { .. } | Admission::FailOpen => {}
        }

        let circuit = self.circuits.get(endpoint_class);

        match circuit.call(operation).await {
            Ok(value) => {
                self.handler.record_success();
                Ok(value)
            }
            Err(BreakerError::Open { endpoint_class, retry_after }) => Err(CallError::CircuitOpen { endpoint_class, retry_after }),
            Err(BreakerError::Inner(source)) => Err(self.on_failure(&circuit, source).await),
        }
    }

    /// Dashboard view of one endpoint class's circuit. The circuit is created if needed.
    #[must_use]
    pub fn circuit_state(&self, endpoint_class: &str) -> CircuitSnapshot {
        self.circuits.get(endpoint_class).snapshot()
    }

    /// Dashboard views of every circuit created so far.
    #[must_use]
    pub fn all_circuit_states(&self) -> Vec<CircuitSnapshot> {
        self.circuits.all_snapshots()
    }

    /// Dashboard view of the shared rate limit.
    ///
    /// # Errors
    ///
    /// Returns [`LimiterError`] when the state file cannot be read.
    pub fn rate_limit_status(&self) -> Result<RateLimitStatus, LimiterError> {
        self.limiter.status()
    }

    /// Dashboard view of the credential.
    #[must_use]
    pub fn token_status(&self) -> TokenStatus {
        self.tokens.status()
    }

    /// Returns the credential after validating it.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the credential is invalid, expired or cannot be validated.
    pub async fn valid_token(&self) -> Result<SecretToken, AuthError> {
        self.tokens.get_valid_token(true).await
    }

    /// The shared rate limiter.
    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    /// The circuits of this process.
    #[must_use]
    pub const fn circuits(&self) -> &CircuitBreakerRegistry {
        &self.circuits
    }

    /// The failure policy.
    #[must_use]
    pub const fn handler(&self) -> &ErrorHandler {
        &self.handler
    }

    /// The credential tracker.
    #[must_use]
    pub const fn tokens(&self) -> &TokenManager<I> {
        &self.tokens
    }

    async fn on_failure<E: Classify>(&self, circuit: &Arc<CircuitBreaker>, source: E) -> CallError<E> {
        let failure = source.classify(self.handler.classifier());
        let context = ErrorContext::new().with_endpoint_class(circuit.endpoint_class());
        let action = self.handler.handle(&failure, &context);

        if failure.category() == ErrorCategory::RateLimit
            && let Err(error) = self.limiter.trigger_panic_async().await
        {
            tracing::event!(
                name: "tollgate.caller.panic_failed",
                tracing::Level::ERROR,
                caller.endpoint_class = circuit.endpoint_class(),
                error = %error,
            );
        }

        if action.action == ActionType::CircuitBreak {
            circuit.force_open();
        }

        CallError::Failed { source, failure, action }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::{Duration, UNIX_EPOCH};

    use serde_json::json;
    use tick::ClockControl;

    use super::*;
    use crate::breaker::CircuitState;
    use crate::classify::ProviderError;
    use crate::limiter::RejectReason;
    use crate::token::StaticIntrospector;

    fn control() -> ClockControl {
        ClockControl::new_at(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
    }

    fn caller(dir: &Path, capacity: u32, control: &ClockControl) -> ProtectedCaller<StaticIntrospector> {
        let config = TollgateConfig::from_json_str(
            &json!({
                "rateLimit": { "statePath": dir.join("state.json"), "capacityPerWindow": capacity },
                "credential": { "initialToken": "EAAB" },
            })
            .to_string(),
        )
        .unwrap();

        ProtectedCaller::new(&config, control.to_clock(), StaticIntrospector::valid()).unwrap()
    }

    fn provider_error(code: i64) -> ProviderError {
        ProviderError::response(Some(400), json!({"error": {"code": code, "message": "failed"}}))
    }

    #[test]
    fn static_assertions() {
        static_assertions::assert_impl_all!(ProtectedCaller<StaticIntrospector>: Send, Sync);
    }

    #[tokio::test]
    async fn success_passes_value_through() {
        let dir = tempfile::tempdir().unwrap();
        let caller = caller(dir.path(), 10, &control());

        let value = caller.execute("messages", || async { Ok::<_, ProviderError>(42) }).await.unwrap();

        assert_eq!(value, 42);
        assert_eq!(caller.rate_limit_status().unwrap().window_count, 1);
    }

    #[tokio::test]
    async fn exhausted_budget_skips_call() {
        let dir = tempfile::tempdir().unwrap();
        let caller = caller(dir.path(), 1, &control());
        let invoked = AtomicU32::new(0);
        let call = || async {
            invoked.fetch_add(1, Ordering::SeqCst);
            Ok::<_, ProviderError>(())
        };

        caller.execute("messages", call).await.unwrap();
        let error = caller.execute("messages", call).await.unwrap_err();

        assert!(matches!(
            error,
            CallError::RateLimited {
                reason: RejectReason::WindowFull,
                ..
            }
        ));
        assert_eq!(invoked.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_open_circuit() {
        let dir = tempfile::tempdir().unwrap();
        let caller = caller(dir.path(), 100, &control());

        for _ in 0..3 {
            let error = caller.execute("comments", || async { Err::<(), _>(ProviderError::response(Some(500), json!({}))) }).await.unwrap_err();
            assert_eq!(error.action().unwrap().action, ActionType::RetryWithBackoff);
        }
        let error = caller.execute("comments", || async { Ok::<_, ProviderError>(()) }).await.unwrap_err();

        assert!(matches!(error, CallError::CircuitOpen { ref endpoint_class, .. } if endpoint_class == "comments"));
        assert_eq!(caller.circuit_state("comments").state, CircuitState::Open);
    }

    #[tokio::test]
    async fn rate_limit_triggers_panic() {
        let dir = tempfile::tempdir().unwrap();
        let caller = caller(dir.path(), 100, &control());

        let error = caller.execute("messages", || async { Err::<(), _>(provider_error(4)) }).await.unwrap_err();

        assert_eq!(error.failure().unwrap().category(), ErrorCategory::RateLimit);
        assert!(caller.rate_limit_status().unwrap().panic_active);
        let next = caller.execute("insights", || async { Ok::<_, ProviderError>(()) }).await.unwrap_err();
        assert!(matches!(next, CallError::RateLimited { reason: RejectReason::Panic, .. }));
    }

    #[tokio::test]
    async fn escalation_forces_circuit_open() {
        let dir = tempfile::tempdir().unwrap();
        let control = control();
        let caller = caller(dir.path(), 100, &control);

        for _ in 0..5 {
            let action = caller.handler().handle_error(&provider_error(4), &ErrorContext::new());
            assert_eq!(action.action, ActionType::RetryWithBackoff);
        }
        let error = caller.execute("insights", || async { Err::<(), _>(provider_error(4)) }).await.unwrap_err();

        assert_eq!(error.action().unwrap().action, ActionType::CircuitBreak);
        assert_eq!(caller.circuit_state("insights").state, CircuitState::Open);
    }

    #[tokio::test]
    async fn success_resets_rate_limit_streak() {
        let dir = tempfile::tempdir().unwrap();
        let caller = caller(dir.path(), 100, &control());
        caller.handler().handle_error(&provider_error(4), &ErrorContext::new());

        caller.execute("messages", || async { Ok::<_, ProviderError>(()) }).await.unwrap();

        assert_eq!(caller.handler().rate_limit_streak(), 0);
    }

    #[tokio::test]
    async fn dashboards() {
        let dir = tempfile::tempdir().unwrap();
        let caller = caller(dir.path(), 100, &control());
        caller.execute("comments", || async { Ok::<_, ProviderError>(()) }).await.unwrap();
        caller.execute("messages", || async { Ok::<_, ProviderError>(()) }).await.unwrap();

        let classes: Vec<_> = caller.all_circuit_states().into_iter().map(|s| s.endpoint_class).collect();

        assert_eq!(classes, ["comments", "messages"]);
        assert!(caller.token_status().is_valid);
        assert_eq!(caller.valid_token().await.unwrap().as_declassified(), "EAAB");
    }

    #[test]
    fn missing_token_is_rejected() {
        let error = ProtectedCaller::new(&TollgateConfig::default(), control().to_clock(), StaticIntrospector::valid()).unwrap_err();

        assert!(matches!(error, ConfigError::Invalid { .. }));
    }
}
