// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use super::{CircuitState, Transition, TransitionReason};

/// Arguments for the [`on_state_change`][super::CircuitBreaker::on_state_change] callback.
///
/// The callback runs after the circuit's lock is released, so it may inspect the breaker.
#[derive(Debug)]
#[non_exhaustive]
pub struct OnStateChangeArgs<'a> {
    pub(crate) endpoint_class: &'a str,
    pub(crate) transition: &'a Transition,
}

impl OnStateChangeArgs<'_> {
    /// The endpoint class of the circuit that changed state.
    #[must_use]
    pub fn endpoint_class(&self) -> &str {
        self.endpoint_class
    }

    /// The full transition record.
    #[must_use]
    pub fn transition(&self) -> &Transition {
        self.transition
    }

    /// The state the circuit left.
    #[must_use]
    pub fn from(&self) -> CircuitState {
        self.transition.from()
    }

    /// The state the circuit entered.
    #[must_use]
    pub fn to(&self) -> CircuitState {
        self.transition.to()
    }

    /// Why the circuit changed state.
    #[must_use]
    pub fn reason(&self) -> TransitionReason {
        self.transition.reason()
    }
}
