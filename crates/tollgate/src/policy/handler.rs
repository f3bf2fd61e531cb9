// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use tick::Clock;

use super::{ActionType, ErrorAction, ErrorContext};
use crate::classify::{Classify, ErrorCategory, ErrorClassifier, FailureRecord};
use crate::config::PolicyConfig;
use crate::constants::ERR_POISONED_LOCK;

/// Maps classified failures to recommended actions.
///
/// | Category | Action | Default delay | Alert |
/// |---|---|---|---|
/// | `AUTHENTICATION` | [`Reauth`][ActionType::Reauth] | none | yes |
/// | `RATE_LIMIT` | [`RetryWithBackoff`][ActionType::RetryWithBackoff] | 60 s | no |
/// | `TRANSIENT`, `NETWORK` | [`RetryWithBackoff`][ActionType::RetryWithBackoff] | 5 s | no |
/// | `SERVER` | [`RetryWithBackoff`][ActionType::RetryWithBackoff] | 10 s | no |
/// | `CLIENT` | [`Fail`][ActionType::Fail] | none | no |
/// | `UNKNOWN` | [`Fail`][ActionType::Fail] | none | yes |
///
/// A delay supplied by the provider replaces the default. Rate limits are also counted: once
/// more than `rate_limit_escalation_threshold` of them arrive with no success in between, the
/// action escalates to [`CircuitBreak`][ActionType::CircuitBreak]. A rate limit that arrives
/// more than `rate_limit_streak_window` after the previous one starts a new streak.
///
/// # Examples
///
/// ```
/// use tick::Clock;
/// use tollgate::classify::ErrorClassifier;
/// use tollgate::config::PolicyConfig;
/// use tollgate::policy::{ActionType, ErrorContext, ErrorHandler};
///
/// let handler = ErrorHandler::new(ErrorClassifier::default(), PolicyConfig::default(), Clock::new_frozen());
///
/// let action = handler.handle_response(br#"{"error": {"code": 190, "message": "Error validating access token"}}"#, Some(400), &ErrorContext::new());
///
/// assert_eq!(action.action, ActionType::Reauth);
/// assert!(action.should_alert);
/// ```
#[derive(Debug)]
pub struct ErrorHandler {
    classifier: ErrorClassifier,
    config: PolicyConfig,
    clock: Clock,
    streak: Mutex<Streak>,
}

#[derive(Debug, Default)]
struct Streak {
    count: u32,
    last: Option<Instant>,
}

impl ErrorHandler {
    /// Creates a handler.
    #[must_use]
    pub fn new(classifier: ErrorClassifier, config: PolicyConfig, clock: Clock) -> Self {
        Self {
            classifier,
            config,
            clock,
            streak: Mutex::new(Streak::default()),
        }
    }

    /// The classifier used by [`handle_error`][Self::handle_error] and
    /// [`handle_response`][Self::handle_response].
    #[must_use]
    pub const fn classifier(&self) -> &ErrorClassifier {
        &self.classifier
    }

    /// The policy tuning.
    #[must_use]
    pub const fn config(&self) -> &PolicyConfig {
        &self.config
    }

    /// Recommends an action for a classified failure.
    pub fn handle(&self, failure: &FailureRecord, context: &ErrorContext) -> ErrorAction {
        let category = failure.category();
        let (mut action, default_delay, should_alert) = self.table(category);
        let delay = failure.retry_after().or(default_delay);

        if category == ErrorCategory::RateLimit {
            let streak = self.extend_streak();
            if streak > self.config.rate_limit_escalation_threshold {
                action = ActionType::CircuitBreak;
                tracing::event!(
                    name: "tollgate.policy.escalated",
                    tracing::Level::ERROR,
                    policy.endpoint_class = context.endpoint_class_or_unknown(),
                    policy.operation = context.operation_or_unknown(),
                    policy.rate_limit_streak = streak,
                );
            }
        }

        let recommendation = ErrorAction {
            action,
            delay,
            safe_message: self.classifier.safe_message(failure),
            should_alert,
            category,
        };

        log_action(&recommendation, failure, context);
        recommendation
    }

    /// Classifies an error and recommends an action for it.
    pub fn handle_error<E: Classify + ?Sized>(&self, error: &E, context: &ErrorContext) -> ErrorAction {
        self.handle(&error.classify(&self.classifier), context)
    }

    /// Classifies a provider response body and recommends an action for it.
    pub fn handle_response(&self, body: &[u8], http_status: Option<u16>, context: &ErrorContext) -> ErrorAction {
        self.handle(&self.classifier.classify_response(body, http_status), context)
    }

    /// Ends the current rate limit streak. Call after every successful provider call.
    pub fn record_success(&self) {
        *self.streak.lock().expect(ERR_POISONED_LOCK) = Streak::default();
    }

    /// Rate limit classifications in the current streak.
    #[must_use]
    pub fn rate_limit_streak(&self) -> u32 {
        let now = self.clock.instant();
        let streak = self.streak.lock().expect(ERR_POISONED_LOCK);

        if self.streak_expired(&streak, now) { 0 } else { streak.count }
    }

    const fn table(&self, category: ErrorCategory) -> (ActionType, Option<Duration>, bool) {
        match category {
            ErrorCategory::Authentication => (ActionType::Reauth, None, true),
            ErrorCategory::RateLimit => (ActionType::RetryWithBackoff, Some(self.config.rate_limit_delay), false),
            ErrorCategory::Transient => (ActionType::RetryWithBackoff, Some(self.config.transient_delay), false),
            ErrorCategory::Network => (ActionType::RetryWithBackoff, Some(self.config.network_delay), false),
            ErrorCategory::Server => (ActionType::RetryWithBackoff, Some(self.config.server_delay), false),
            ErrorCategory::Client => (ActionType::Fail, None, false),
            ErrorCategory::Unknown => (ActionType::Fail, None, true),
        }
    }

    fn extend_streak(&self) -> u32 {
        let now = self.clock.instant();
        let mut streak = self.streak.lock().expect(ERR_POISONED_LOCK);

        if self.streak_expired(&streak, now) {
            streak.count = 0;
        }

        streak.count = streak.count.saturating_add(1);
        streak.last = Some(now);
        streak.count
    }

    fn streak_expired(&self, streak: &Streak, now: Instant) -> bool {
        streak
            .last
            .is_some_and(|last| now.saturating_duration_since(last) > self.config.rate_limit_streak_window)
    }
}

fn log_action(action: &ErrorAction, failure: &FailureRecord, context: &ErrorContext) {
    if action.should_alert {
        tracing::event!(
            name: "tollgate.policy.action",
            tracing::Level::ERROR,
            policy.endpoint_class = context.endpoint_class_or_unknown(),
            policy.operation = context.operation_or_unknown(),
            policy.action = action.action.as_str(),
            failure.category = failure.category().as_str(),
            failure.code = failure.code(),
            failure.message = failure.message(),
        );
    } else {
        tracing::event!(
            name: "tollgate.policy.action",
            tracing::Level::WARN,
            policy.endpoint_class = context.endpoint_class_or_unknown(),
            policy.operation = context.operation_or_unknown(),
            policy.action = action.action.as_str(),
            policy.delay = action.delay.map(|delay| delay.as_secs_f64()),
            failure.category = failure.category().as_str(),
            failure.code = failure.code(),
        );
    }
}
