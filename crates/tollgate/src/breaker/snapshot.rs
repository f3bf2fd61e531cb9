// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use serde::Serialize;

use super::{CircuitState, Transition};
use crate::config::BreakerConfig;

/// Dashboard view of one circuit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CircuitSnapshot {
    /// The endpoint class the circuit guards.
    pub endpoint_class: String,

    /// The current state.
    pub state: CircuitState,

    /// Consecutive failures counted while closed.
    pub failure_count: u32,

    /// Successful probes in the current half-open period.
    pub success_count: u32,

    /// Probes admitted in the current half-open period.
    pub half_open_calls: u32,

    /// Last counted failure in fractional UNIX seconds.
    pub last_failure_timestamp: Option<f64>,

    /// Whole seconds until an open circuit admits a probe.
    pub open_remaining_seconds: Option<u64>,

    /// The circuit's thresholds.
    pub config: BreakerConfig,

    /// Lifetime counters.
    pub metrics: CircuitMetrics,

    /// Most recent transitions, oldest first.
    pub recent_transitions: Vec<Transition>,
}

/// Lifetime counters of one circuit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct CircuitMetrics {
    /// Calls admitted.
    pub total_calls: u64,

    /// Admitted calls that succeeded.
    pub successes: u64,

    /// Admitted calls that failed.
    pub failures: u64,

    /// Calls rejected without being invoked.
    pub rejected: u64,

    /// Results ignored because they arrived after the circuit changed state, or never arrived.
    pub lost: u64,

    /// `failures / (successes + failures)`, `0.0` before the first outcome.
    pub failure_rate: f64,
}
