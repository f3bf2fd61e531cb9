// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use tick::Clock;

use super::callbacks::OnStateChange;
use super::{CircuitBreaker, CircuitSnapshot, OnStateChangeArgs, defaults_for_endpoint_class};
use crate::config::{BreakerConfig, ConfigError, TollgateConfig};
use crate::constants::ERR_POISONED_LOCK;

/// The circuits of one process, keyed by endpoint class.
///
/// Circuits are created on first use with the configured override for their class, else the
/// built-in class default, and live as long as the registry. The registry is process-local:
/// another process sharing the same provider account keeps its own circuits.
#[derive(Debug)]
pub struct CircuitBreakerRegistry {
    circuits: Mutex<BTreeMap<String, Arc<CircuitBreaker>>>,
    overrides: BTreeMap<String, BreakerConfig>,
    clock: Clock,
    on_state_change: Option<OnStateChange>,
}

impl CircuitBreakerRegistry {
    /// Creates an empty registry using the built-in class defaults.
    #[must_use]
    pub fn new(clock: Clock) -> Self {
        Self {
            circuits: Mutex::new(BTreeMap::new()),
            overrides: BTreeMap::new(),
            clock,
            on_state_change: None,
        }
    }

    /// Creates an empty registry with the circuit overrides of a configuration.
    #[must_use]
    pub fn from_config(config: &TollgateConfig, clock: Clock) -> Self {
        Self {
            overrides: config.circuits.clone(),
            ..Self::new(clock)
        }
    }

    /// Overrides the settings of one endpoint class. Circuits that already exist keep theirs.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] when `config` does not pass
    /// [`BreakerConfig::validate`].
    pub fn with_circuit(mut self, endpoint_class: impl Into<String>, config: BreakerConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        self.overrides.insert(endpoint_class.into(), config);
        Ok(self)
    }

    /// Registers a callback invoked after every state change of every circuit created from now
    /// on.
    #[must_use]
    pub fn on_state_change<F>(mut self, callback: F) -> Self
    where
        F: Fn(OnStateChangeArgs<'_>) + Send + Sync + 'static,
    {
        self.on_state_change = Some(OnStateChange::new(callback));
        self
    }

    /// The settings a circuit for `endpoint_class` is created with.
    #[must_use]
    pub fn config_for(&self, endpoint_class: &str) -> BreakerConfig {
        self.overrides
            .get(endpoint_class)
            .copied()
            .unwrap_or_else(|| defaults_for_endpoint_class(endpoint_class))
    }

    /// Returns the circuit of `endpoint_class`, creating it on first use.
    pub fn get(&self, endpoint_class: &str) -> Arc<CircuitBreaker> {
        let mut circuits = self.circuits.lock().expect(ERR_POISONED_LOCK);

        if let Some(circuit) = circuits.get(endpoint_class) {
            return Arc::clone(circuit);
        }

        let circuit = Arc::new(
            CircuitBreaker::new(endpoint_class, self.config_for(endpoint_class), self.clock.clone())
                .with_callback(self.on_state_change.clone()),
        );
        circuits.insert(endpoint_class.to_owned(), Arc::clone(&circuit));

        tracing::event!(
            name: "tollgate.circuit.created",
            tracing::Level::DEBUG,
            circuit.endpoint_class = endpoint_class,
        );

        circuit
    }

    /// Returns the circuit of `endpoint_class` only if it was already created.
    #[must_use]
    pub fn find(&self, endpoint_class: &str) -> Option<Arc<CircuitBreaker>> {
        self.circuits.lock().expect(ERR_POISONED_LOCK).get(endpoint_class).cloned()
    }

    /// Dashboard views of every created circuit, ordered by endpoint class.
    #[must_use]
    pub fn all_snapshots(&self) -> Vec<CircuitSnapshot> {
        let circuits: Vec<_> = self.circuits.lock().expect(ERR_POISONED_LOCK).values().cloned().collect();
        circuits.iter().map(|circuit| circuit.snapshot()).collect()
    }
}
