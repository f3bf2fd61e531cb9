// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::VecDeque;
use std::time::{Duration, Instant, SystemTime};

use super::{CircuitMetrics, CircuitSnapshot, CircuitState, Transition, TransitionReason};
use crate::config::BreakerConfig;
use crate::time::{ceil_secs, unix_seconds};

/// Capacity of the recent transitions ring.
pub(crate) const TRANSITION_HISTORY: usize = 32;

/// A point in time read from the clock, outside any lock.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Moment {
    pub(crate) instant: Instant,
    pub(crate) time: SystemTime,
}

/// Identifies the state a call was admitted in.
///
/// Every transition bumps the circuit's epoch. Results that come back with an older epoch were
/// admitted under a state that no longer exists and must not drive transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Ticket {
    epoch: u64,
    probe: bool,
}

#[derive(Debug)]
pub(crate) enum EnterResult {
    Accepted { ticket: Ticket, transition: Option<Transition> },
    Rejected { retry_after: Option<Duration> },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Outcome {
    Success,
    Failure,
    Abandoned,
}

#[derive(Debug, Default, Clone, Copy)]
struct Counters {
    calls: u64,
    successes: u64,
    failures: u64,
    rejected: u64,
    lost: u64,
}

/// The state machine of one circuit. Callers serialize access through a mutex.
#[derive(Debug)]
pub(crate) struct Engine {
    state: CircuitState,
    failure_count: u32,
    success_count: u32,
    half_open_calls: u32,
    last_failure: Option<Moment>,
    epoch: u64,
    counters: Counters,
    transitions: VecDeque<Transition>,
}

impl Engine {
    pub(crate) fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failure_count: 0,
            success_count: 0,
            half_open_calls: 0,
            last_failure: None,
            epoch: 0,
            counters: Counters::default(),
            transitions: VecDeque::with_capacity(TRANSITION_HISTORY),
        }
    }

    pub(crate) const fn state(&self) -> CircuitState {
        self.state
    }

    pub(crate) fn enter(&mut self, now: Moment, config: &BreakerConfig) -> EnterResult {
        match self.state {
            CircuitState::Closed => self.accept(false, None),
            CircuitState::Open => match self.open_remaining(now.instant, config) {
                Some(remaining) => self.reject(Some(remaining)),
                None => {
                    let transition = self.transition(CircuitState::HalfOpen, TransitionReason::RecoveryTimeout, now);
                    self.half_open_calls = 1;
                    self.accept(true, Some(transition))
                }
            },
            CircuitState::HalfOpen => {
                if self.half_open_calls >= config.half_open_max_calls {
                    self.reject(None)
                } else {
                    self.half_open_calls += 1;
                    self.accept(true, None)
                }
            }
        }
    }

    pub(crate) fn exit(&mut self, ticket: Ticket, outcome: Outcome, now: Moment, config: &BreakerConfig) -> Option<Transition> {
        if ticket.epoch != self.epoch {
            self.counters.lost += 1;
            if outcome == Outcome::Failure && self.state == CircuitState::Open {
                self.last_failure = Some(now);
            }
            return None;
        }

        match (self.state, outcome) {
            (_, Outcome::Abandoned) => {
                self.counters.lost += 1;
                if ticket.probe && self.state == CircuitState::HalfOpen {
                    self.half_open_calls = self.half_open_calls.saturating_sub(1);
                }
                None
            }
            (CircuitState::Closed, Outcome::Success) => {
                self.counters.successes += 1;
                self.failure_count = 0;
                None
            }
            (CircuitState::Closed, Outcome::Failure) => {
                self.counters.failures += 1;
                self.failure_count = self.failure_count.saturating_add(1);
                self.last_failure = Some(now);
                (self.failure_count >= config.failure_threshold)
                    .then(|| self.transition(CircuitState::Open, TransitionReason::FailureThreshold, now))
            }
            (CircuitState::HalfOpen, Outcome::Success) => {
                self.counters.successes += 1;
                self.success_count = self.success_count.saturating_add(1);
                (self.success_count >= config.success_threshold)
                    .then(|| self.transition(CircuitState::Closed, TransitionReason::ProbesSucceeded, now))
            }
            (CircuitState::HalfOpen, Outcome::Failure) => {
                self.counters.failures += 1;
                self.last_failure = Some(now);
                Some(self.transition(CircuitState::Open, TransitionReason::ProbeFailed, now))
            }
            // Every transition into OPEN bumps the epoch, so no current ticket exists.
            (CircuitState::Open, Outcome::Success | Outcome::Failure) => None,
        }
    }

    pub(crate) fn force_open(&mut self, now: Moment) -> Option<Transition> {
        if self.state == CircuitState::Open {
            return None;
        }

        self.last_failure = Some(now);
        Some(self.transition(CircuitState::Open, TransitionReason::Forced, now))
    }

    pub(crate) fn snapshot(&self, endpoint_class: &str, config: &BreakerConfig, now: Instant) -> CircuitSnapshot {
        let counters = self.counters;
        let outcomes = counters.successes + counters.failures;
        #[expect(clippy::cast_precision_loss, reason = "a ratio for dashboards")]
        let failure_rate = if outcomes == 0 {
            0.0
        } else {
            counters.failures as f64 / outcomes as f64
        };

        CircuitSnapshot {
            endpoint_class: endpoint_class.to_owned(),
            state: self.state,
            failure_count: self.failure_count,
            success_count: self.success_count,
            half_open_calls: self.half_open_calls,
            last_failure_timestamp: self.last_failure.map(|moment| unix_seconds(moment.time)),
            open_remaining_seconds: self
                .open_remaining(now, config)
                .filter(|_| self.state == CircuitState::Open)
                .map(ceil_secs),
            config: *config,
            metrics: CircuitMetrics {
                total_calls: counters.calls,
                successes: counters.successes,
                failures: counters.failures,
                rejected: counters.rejected,
                lost: counters.lost,
                failure_rate,
            },
            recent_transitions: self.transitions.iter().cloned().collect(),
        }
    }

    fn open_remaining(&self, now: Instant, config: &BreakerConfig) -> Option<Duration> {
        let since_failure = now.saturating_duration_since(self.last_failure?.instant);
        Some(config.recovery_timeout.saturating_sub(since_failure)).filter(|remaining| !remaining.is_zero())
    }

    fn accept(&mut self, probe: bool, transition: Option<Transition>) -> EnterResult {
        self.counters.calls += 1;

        EnterResult::Accepted {
            ticket: Ticket { epoch: self.epoch, probe },
            transition,
        }
    }

    fn reject(&mut self, retry_after: Option<Duration>) -> EnterResult {
        self.counters.rejected += 1;
        EnterResult::Rejected { retry_after }
    }

    fn transition(&mut self, to: CircuitState, reason: TransitionReason, now: Moment) -> Transition {
        let transition = Transition {
            from: self.state,
            to,
            reason,
            at: now.time,
        };

        self.state = to;
        self.epoch += 1;
        self.success_count = 0;
        self.half_open_calls = 0;
        if to == CircuitState::Closed {
            self.failure_count = 0;
        }

        if self.transitions.len() == TRANSITION_HISTORY {
            self.transitions.pop_front();
        }
        self.transitions.push_back(transition.clone());

        transition
    }
}
