// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::time::SystemTime;

use serde::Serialize;

use super::CircuitState;

/// Why a circuit changed state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum TransitionReason {
    /// Consecutive failures reached the failure threshold.
    FailureThreshold,

    /// The recovery timeout passed and a probe was admitted.
    RecoveryTimeout,

    /// Successful probes reached the success threshold.
    ProbesSucceeded,

    /// A probe failed.
    ProbeFailed,

    /// An operator or the failure policy opened the circuit.
    Forced,
}

impl TransitionReason {
    /// Returns the name used in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FailureThreshold => "failure_threshold",
            Self::RecoveryTimeout => "recovery_timeout",
            Self::ProbesSucceeded => "probes_succeeded",
            Self::ProbeFailed => "probe_failed",
            Self::Forced => "forced",
        }
    }
}

/// One recorded state change of a circuit.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Transition {
    pub(crate) from: CircuitState,
    pub(crate) to: CircuitState,
    pub(crate) reason: TransitionReason,
    #[serde(rename = "timestamp", serialize_with = "crate::time::serialize_unix_seconds")]
    pub(crate) at: SystemTime,
}

impl Transition {
    /// The state the circuit left.
    #[must_use]
    pub const fn from(&self) -> CircuitState {
        self.from
    }

    /// The state the circuit entered.
    #[must_use]
    pub const fn to(&self) -> CircuitState {
        self.to
    }

    /// Why the circuit changed state.
    #[must_use]
    pub const fn reason(&self) -> TransitionReason {
        self.reason
    }

    /// When the change happened.
    #[must_use]
    pub const fn at(&self) -> SystemTime {
        self.at
    }
}
