// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Mutex;

use tick::Clock;

use super::callbacks::OnStateChange;
use super::engine::{Engine, EnterResult, Moment, Outcome, Ticket};
use super::{BreakerError, CircuitSnapshot, CircuitState, OnStateChangeArgs, Transition};
use crate::config::BreakerConfig;
use crate::constants::ERR_POISONED_LOCK;
use crate::time::ceil_secs;

/// A circuit breaker guarding one endpoint class.
///
/// The circuit opens after `failure_threshold` consecutive failures and rejects calls without
/// invoking them until `recovery_timeout` has passed since the last failure. It then admits up to
/// `half_open_max_calls` probes: `success_threshold` successes close it again, a single failure
/// reopens it.
///
/// Transitions are serialized by an internal mutex that is never held across the wrapped call.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
///
/// use tick::Clock;
/// use tollgate::breaker::{BreakerError, CircuitBreaker, CircuitState};
/// use tollgate::config::BreakerConfig;
///
/// # futures::executor::block_on(async {
/// let breaker = CircuitBreaker::new("comments", BreakerConfig::new(1, Duration::from_secs(60), 1, 1), Clock::new_frozen());
///
/// let failed: Result<(), BreakerError<&str>> = breaker.call(|| async { Err("boom") }).await;
/// assert!(matches!(failed, Err(BreakerError::Inner("boom"))));
/// assert_eq!(breaker.state(), CircuitState::Open);
///
/// let rejected = breaker.call(|| async { Ok::<_, &str>(()) }).await;
/// assert!(matches!(rejected, Err(BreakerError::Open { .. })));
/// # });
/// ```
#[derive(Debug)]
pub struct CircuitBreaker {
    endpoint_class: String,
    config: BreakerConfig,
    engine: Mutex<Engine>,
    clock: Clock,
    on_state_change: Option<OnStateChange>,
}

impl CircuitBreaker {
    /// Creates a closed circuit.
    ///
    /// `config` is used as given. Check hand-built settings with [`BreakerConfig::validate`]
    /// first.
    #[must_use]
    pub fn new(endpoint_class: impl Into<String>, config: BreakerConfig, clock: Clock) -> Self {
        Self {
            endpoint_class: endpoint_class.into(),
            config,
            engine: Mutex::new(Engine::new()),
            clock,
            on_state_change: None,
        }
    }

    /// Registers a callback invoked after every state change, for example to page an operator
    /// when a circuit opens.
    #[must_use]
    pub fn on_state_change<F>(self, callback: F) -> Self
    where
        F: Fn(OnStateChangeArgs<'_>) + Send + Sync + 'static,
    {
        self.with_callback(Some(OnStateChange::new(callback)))
    }

    pub(crate) fn with_callback(mut self, callback: Option<OnStateChange>) -> Self {
        self.on_state_change = callback;
        self
    }

    /// The endpoint class this circuit guards.
    #[must_use]
    pub fn endpoint_class(&self) -> &str {
        &self.endpoint_class
    }

    /// The circuit's thresholds.
    #[must_use]
    pub const fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// The current state.
    ///
    /// An open circuit whose recovery timeout has passed still reports [`CircuitState::Open`]
    /// until the next call moves it to half-open.
    #[must_use]
    pub fn state(&self) -> CircuitState {
        self.engine.lock().expect(ERR_POISONED_LOCK).state()
    }

    /// Runs `operation` through the circuit.
    ///
    /// Any `Err` counts as a failure and is returned as [`BreakerError::Inner`] after the
    /// bookkeeping. When the circuit rejects the call, `operation` is not invoked.
    ///
    /// A call whose future is dropped before completing is counted as lost and frees its probe
    /// slot.
    ///
    /// # Errors
    ///
    /// Returns [`BreakerError::Open`] when the circuit rejects the call, and
    /// [`BreakerError::Inner`] when `operation` fails.
    pub async fn call<T, E, F, Fut>(&self, operation: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let permit = self.enter()?;
        let result = operation().await;
        permit.complete(if result.is_ok() { Outcome::Success } else { Outcome::Failure });

        result.map_err(BreakerError::Inner)
    }

    /// Opens the circuit as if it had just failed.
    ///
    /// Returns `false` when the circuit was already open. An open circuit's recovery timer is
    /// left untouched.
    pub fn force_open(&self) -> bool {
        let now = self.now();
        let transition = self.engine.lock().expect(ERR_POISONED_LOCK).force_open(now);
        let opened = transition.is_some();
        self.report(transition);
        opened
    }

    /// Dashboard view of the circuit.
    #[must_use]
    pub fn snapshot(&self) -> CircuitSnapshot {
        let now = self.clock.instant();
        self.engine
            .lock()
            .expect(ERR_POISONED_LOCK)
            .snapshot(&self.endpoint_class, &self.config, now)
    }

    fn now(&self) -> Moment {
        Moment {
            instant: self.clock.instant(),
            time: self.clock.system_time(),
        }
    }

    fn enter<E>(&self) -> Result<Permit<'_>, BreakerError<E>> {
        let now = self.now();
        let result = self.engine.lock().expect(ERR_POISONED_LOCK).enter(now, &self.config);

        match result {
            EnterResult::Accepted { ticket, transition } => {
                self.report(transition);
                Ok(Permit {
                    breaker: self,
                    ticket,
                    completed: false,
                })
            }
            EnterResult::Rejected { retry_after } => {
                tracing::event!(
                    name: "tollgate.circuit.rejected",
                    tracing::Level::WARN,
                    circuit.endpoint_class = self.endpoint_class.as_str(),
                    circuit.state = self.state().as_str(),
                    circuit.retry_after = retry_after.map(ceil_secs),
                );

                Err(BreakerError::Open {
                    endpoint_class: self.endpoint_class.clone(),
                    retry_after,
                })
            }
        }
    }

    fn exit(&self, ticket: Ticket, outcome: Outcome) {
        let now = self.now();
        let transition = self.engine.lock().expect(ERR_POISONED_LOCK).exit(ticket, outcome, now, &self.config);
        self.report(transition);
    }

    fn report(&self, transition: Option<Transition>) {
        let Some(transition) = transition else {
            return;
        };

        let endpoint_class = self.endpoint_class.as_str();
        match transition.to() {
            CircuitState::Open => tracing::event!(
                name: "tollgate.circuit.opened",
                tracing::Level::WARN,
                circuit.endpoint_class = endpoint_class,
                circuit.from = transition.from().as_str(),
                circuit.reason = transition.reason().as_str(),
                circuit.recovery_timeout = self.config.recovery_timeout.as_secs(),
            ),
            CircuitState::HalfOpen => tracing::event!(
                name: "tollgate.circuit.half_open",
                tracing::Level::INFO,
                circuit.endpoint_class = endpoint_class,
                circuit.from = transition.from().as_str(),
                circuit.reason = transition.reason().as_str(),
            ),
            CircuitState::Closed => tracing::event!(
                name: "tollgate.circuit.closed",
                tracing::Level::INFO,
                circuit.endpoint_class = endpoint_class,
                circuit.from = transition.from().as_str(),
                circuit.reason = transition.reason().as_str(),
            ),
        }

        if let Some(callback) = &self.on_state_change {
            callback.call(OnStateChangeArgs {
                endpoint_class,
                transition: &transition,
            });
        }
    }
}

/// An admitted call. Dropping it without an outcome counts the call as lost.
#[derive(Debug)]
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    ticket: Ticket,
    completed: bool,
}

impl Permit<'_> {
    fn complete(mut self, outcome: Outcome) {
        self.completed = true;
        self.breaker.exit(self.ticket, outcome);
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.completed {
            self.breaker.exit(self.ticket, Outcome::Abandoned);
        }
    }
}

#[cfg_attr(coverage_nightly, coverage(off))]
#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, OnceLock, Weak};
    use std::time::Duration;

    use futures::FutureExt;
    use tick::ClockControl;

    use super::*;
    use crate::breaker::TransitionReason;

    fn breaker(control: &ClockControl, config: BreakerConfig) -> CircuitBreaker {
        CircuitBreaker::new("comments", config, control.to_clock())
    }

    async fn fail(breaker: &CircuitBreaker) -> Result<(), BreakerError<&'static str>> {
        breaker.call(|| async { Err("boom") }).await
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<u32, BreakerError<&'static str>> {
        breaker.call(|| async { Ok(7) }).await
    }

    #[test]
    fn static_assertions() {
        static_assertions::assert_impl_all!(CircuitBreaker: Send, Sync, std::fmt::Debug);
    }

    #[tokio::test]
    async fn open_circuit_does_not_invoke_operation() {
        let control = ClockControl::new();
        let breaker = breaker(&control, BreakerConfig::new(3, Duration::from_secs(120), 2, 2));
        for _ in 0..3 {
            assert!(matches!(fail(&breaker).await, Err(BreakerError::Inner("boom"))));
        }

        let invoked = AtomicU32::new(0);
        let result = breaker
            .call(|| async {
                invoked.fetch_add(1, Ordering::SeqCst);
                Ok::<_, &str>(())
            })
            .await;

        assert_eq!(breaker.state(), CircuitState::Open);
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        match result {
            Err(BreakerError::Open { endpoint_class, retry_after }) => {
                assert_eq!(endpoint_class, "comments");
                assert_eq!(retry_after, Some(Duration::from_secs(120)));
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn recovers_through_half_open() {
        let control = ClockControl::new();
        let breaker = breaker(&control, BreakerConfig::new(1, Duration::from_secs(60), 2, 2));
        fail(&breaker).await.unwrap_err();

        control.advance(Duration::from_secs(60));

        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        assert_eq!(breaker.state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn callback_sees_every_transition() {
        let control = ClockControl::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let breaker = breaker(&control, BreakerConfig::new(1, Duration::from_secs(60), 1, 1)).on_state_change(move |args| {
            assert_eq!(args.endpoint_class(), "comments");
            seen_clone.lock().unwrap().push((args.from(), args.to(), args.reason()));
        });

        fail(&breaker).await.unwrap_err();
        control.advance(Duration::from_secs(60));
        fail(&breaker).await.unwrap_err();
        control.advance(Duration::from_secs(60));
        succeed(&breaker).await.unwrap();

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                (CircuitState::Closed, CircuitState::Open, TransitionReason::FailureThreshold),
                (CircuitState::Open, CircuitState::HalfOpen, TransitionReason::RecoveryTimeout),
                (CircuitState::HalfOpen, CircuitState::Open, TransitionReason::ProbeFailed),
                (CircuitState::Open, CircuitState::HalfOpen, TransitionReason::RecoveryTimeout),
                (CircuitState::HalfOpen, CircuitState::Closed, TransitionReason::ProbesSucceeded),
            ]
        );
    }

    #[tokio::test]
    async fn callback_may_inspect_breaker() {
        let control = ClockControl::new();
        let handle: Arc<OnceLock<Weak<CircuitBreaker>>> = Arc::default();
        let handle_clone = Arc::clone(&handle);
        let states = Arc::new(Mutex::new(Vec::new()));
        let states_clone = Arc::clone(&states);
        let breaker = Arc::new(
            breaker(&control, BreakerConfig::new(1, Duration::from_secs(60), 1, 1)).on_state_change(move |_| {
                let state = handle_clone.get().and_then(Weak::upgrade).map(|breaker| breaker.state());
                states_clone.lock().unwrap().push(state);
            }),
        );
        handle.set(Arc::downgrade(&breaker)).unwrap();

        fail(&breaker).await.unwrap_err();

        assert_eq!(*states.lock().unwrap(), vec![Some(CircuitState::Open)]);
    }

    #[tokio::test]
    async fn dropped_probe_frees_slot() {
        let control = ClockControl::new();
        let breaker = breaker(&control, BreakerConfig::new(1, Duration::from_secs(60), 1, 1));
        fail(&breaker).await.unwrap_err();
        control.advance(Duration::from_secs(60));

        let pending = breaker.call(std::future::pending::<Result<(), &str>>);
        assert!(pending.now_or_never().is_none());

        assert_eq!(breaker.state(), CircuitState::HalfOpen);
        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        assert_eq!(breaker.state(), CircuitState::Closed);
        assert_eq!(breaker.snapshot().metrics.lost, 1);
    }

    #[tokio::test]
    async fn force_open_rejects_and_reports() {
        let control = ClockControl::new();
        let breaker = breaker(&control, BreakerConfig::new(5, Duration::from_secs(60), 3, 2));

        assert!(breaker.force_open());
        assert!(!breaker.force_open());

        let rejected = succeed(&breaker).await.unwrap_err();
        assert_eq!(rejected.retry_after(), Some(Duration::from_secs(60)));
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.recent_transitions.len(), 1);
        assert_eq!(snapshot.recent_transitions[0].reason(), TransitionReason::Forced);
    }

    #[tokio::test]
    async fn snapshot_serializes_for_dashboards() {
        let control = ClockControl::new_at(std::time::UNIX_EPOCH + Duration::from_secs(1_700_000_000));
        let breaker = breaker(&control, BreakerConfig::new(1, Duration::from_secs(120), 2, 2));
        fail(&breaker).await.unwrap_err();

        let json = serde_json::to_value(breaker.snapshot()).unwrap();

        assert_eq!(json["endpointClass"], "comments");
        assert_eq!(json["state"], "OPEN");
        assert_eq!(json["openRemainingSeconds"], 120);
        assert_eq!(json["config"]["recoveryTimeoutSeconds"], 120);
        assert_eq!(json["recentTransitions"][0]["to"], "OPEN");
        assert_eq!(json["recentTransitions"][0]["reason"], "failure_threshold");
        assert_eq!(json["recentTransitions"][0]["timestamp"], 1_700_000_000.0);
    }
}
