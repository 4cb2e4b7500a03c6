// src/resilience/circuit_breaker.rs - Per-provider circuit breaker
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,   // Normal operation
    Open,     // Failures detected, blocking requests
    HalfOpen, // Testing recovery with a single trial call
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half-open",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct CircuitBreakerConfig {
    /// Consecutive failures that open the circuit.
    pub failure_threshold: u32,
    /// How long the circuit stays open before a trial call.
    pub open_duration: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: crate::constants::BREAKER_FAILURE_THRESHOLD,
            open_duration: Duration::from_secs(crate::constants::BREAKER_OPEN_SECS),
        }
    }
}

#[derive(Debug)]
struct BreakerState {
    state: CircuitState,
    consecutive_failures: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            consecutive_failures: 0,
            opened_at: None,
            trial_in_flight: false,
        }
    }
}

/// Keyed circuit breaker shared by every adapter call to a provider.
#[derive(Debug)]
pub struct CircuitBreaker {
    config: CircuitBreakerConfig,
    states: Arc<Mutex<HashMap<String, BreakerState>>>,
}

impl CircuitBreaker {
    pub fn new(config: CircuitBreakerConfig) -> Self {
        Self {
            config,
            states: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Gate a call to `provider`. An open circuit denies the request; a
    /// half-open circuit admits exactly one trial call at a time.
    pub fn is_request_allowed(&self, provider: &str) -> bool {
        let mut states = self.states.lock();
        let state = states
            .entry(provider.to_string())
            .or_insert_with(BreakerState::new);

        match state.state {
            CircuitState::Closed => true,
            CircuitState::Open => {
                let elapsed = state.opened_at.map(|t| t.elapsed()).unwrap_or_default();
                if elapsed >= self.config.open_duration {
                    info!("Circuit breaker for {} transitioning to HALF_OPEN", provider);
                    state.state = CircuitState::HalfOpen;
                    state.trial_in_flight = true;
                    true
                } else {
                    false
                }
            }
            CircuitState::HalfOpen => {
                if state.trial_in_flight {
                    false
                } else {
                    state.trial_in_flight = true;
                    true
                }
            }
        }
    }

    pub fn record_success(&self, provider: &str) {
        let mut states = self.states.lock();
        let state = states
            .entry(provider.to_string())
            .or_insert_with(BreakerState::new);

        state.consecutive_failures = 0;
        state.trial_in_flight = false;
        if state.state != CircuitState::Closed {
            info!("Circuit breaker for {} transitioning to CLOSED", provider);
            state.state = CircuitState::Closed;
            state.opened_at = None;
        }
    }

    pub fn record_failure(&self, provider: &str) {
        let mut states = self.states.lock();
        let state = states
            .entry(provider.to_string())
            .or_insert_with(BreakerState::new);

        state.consecutive_failures += 1;
        state.trial_in_flight = false;

        match state.state {
            CircuitState::Closed => {
                if state.consecutive_failures >= self.config.failure_threshold {
                    warn!(
                        "Circuit breaker for {} transitioning to OPEN (failures: {})",
                        provider, state.consecutive_failures
                    );
                    state.state = CircuitState::Open;
                    state.opened_at = Some(Instant::now());
                }
            }
            CircuitState::HalfOpen => {
                warn!("Circuit breaker for {} transitioning back to OPEN", provider);
                state.state = CircuitState::Open;
                state.opened_at = Some(Instant::now());
            }
            CircuitState::Open => {}
        }
    }

    pub fn state(&self, provider: &str) -> CircuitState {
        let states = self.states.lock();
        states
            .get(provider)
            .map(|s| s.state)
            .unwrap_or(CircuitState::Closed)
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerConfig::default())
    }
}
