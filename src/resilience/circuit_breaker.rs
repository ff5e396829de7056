//! Per-upstream circuit breaker.
//!
//! Closed admits every call and counts failures in a rolling window. Reaching
//! the threshold opens the circuit; while open, calls are rejected without
//! touching the network. Once the cooldown has passed the next caller becomes
//! the single half-open trial and its outcome decides whether the circuit
//! closes or opens again.
//!
//! State lives under one mutex per breaker. The lock is only held for the
//! bookkeeping, never across an await, so every transition is linearizable.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use tracing::info;

use super::config::CircuitBreakerConfig;
use crate::error::LlmError;

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CircuitState {
    /// Normal operation - requests are allowed
    Closed,
    /// Circuit is open - requests are rejected
    Open,
    /// Cooldown elapsed - a single trial request is allowed
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "closed",
            CircuitState::Open => "open",
            CircuitState::HalfOpen => "half_open",
        }
    }
}

impl std::fmt::Display for CircuitState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a guarded call ended, from the breaker's point of view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    /// Failure that says something about upstream health
    Failure,
    /// Failure that does not count, e.g. a 400 caused by the caller
    Ignored,
}

#[derive(Debug)]
struct BreakerState {
    status: CircuitState,
    /// Failure times inside the window, oldest first, at most `failure_threshold`
    failures: VecDeque<Instant>,
    success_count: u32,
    opened_at: Option<Instant>,
    trial_in_flight: bool,
    total_failures: u64,
    total_successes: u64,
    last_state_change: Instant,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            status: CircuitState::Closed,
            failures: VecDeque::new(),
            success_count: 0,
            opened_at: None,
            trial_in_flight: false,
            total_failures: 0,
            total_successes: 0,
            last_state_change: Instant::now(),
        }
    }
}

/// Circuit breaker statistics
#[derive(Debug, Clone)]
pub struct CircuitBreakerStats {
    pub state: CircuitState,
    pub failure_count: u32,
    pub success_count: u32,
    pub total_failures: u64,
    pub total_successes: u64,
    pub trial_in_flight: bool,
    pub time_since_last_state_change: Duration,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    upstream: String,
    config: CircuitBreakerConfig,
    state: Mutex<BreakerState>,
}

impl CircuitBreaker {
    pub fn new(upstream: impl Into<String>, config: CircuitBreakerConfig) -> Self {
        Self {
            upstream: upstream.into(),
            config,
            state: Mutex::new(BreakerState::new()),
        }
    }

    pub fn upstream(&self) -> &str {
        &self.upstream
    }

    pub fn config(&self) -> &CircuitBreakerConfig {
        &self.config
    }

    fn lock(&self) -> MutexGuard<'_, BreakerState> {
        // No update panics halfway through, so a poisoned lock still holds valid state.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Ask to make one call.
    ///
    /// The returned permit must be resolved with [`BreakerPermit::record`].
    /// Dropping it unresolved releases a half-open trial slot without
    /// changing the state.
    pub fn try_acquire(self: &Arc<Self>) -> Result<BreakerPermit, LlmError> {
        let mut state = self.lock();
        let trial = match state.status {
            CircuitState::Closed => false,
            CircuitState::Open => {
                let cooled = state
                    .opened_at
                    .is_none_or(|at| at.elapsed() >= self.config.cooldown);
                if !cooled {
                    return Err(self.rejection());
                }
                self.transition(&mut state, CircuitState::HalfOpen);
                state.trial_in_flight = true;
                true
            }
            CircuitState::HalfOpen => {
                if state.trial_in_flight {
                    return Err(self.rejection());
                }
                state.trial_in_flight = true;
                true
            }
        };
        drop(state);

        Ok(BreakerPermit {
            breaker: Arc::clone(self),
            trial,
            resolved: false,
        })
    }

    /// Current state. Reading never moves the circuit out of Open; that
    /// happens when the next caller asks for a permit.
    pub fn state(&self) -> CircuitState {
        self.lock().status
    }

    pub fn stats(&self) -> CircuitBreakerStats {
        let state = self.lock();
        CircuitBreakerStats {
            state: state.status,
            failure_count: state.failures.len() as u32,
            success_count: state.success_count,
            total_failures: state.total_failures,
            total_successes: state.total_successes,
            trial_in_flight: state.trial_in_flight,
            time_since_last_state_change: state.last_state_change.elapsed(),
        }
    }

    /// Reset the circuit breaker to closed state
    pub fn reset(&self) {
        let mut state = self.lock();
        self.transition(&mut state, CircuitState::Closed);
        state.failures.clear();
        state.success_count = 0;
        state.trial_in_flight = false;
    }

    /// Force the circuit to open (for manual intervention)
    pub fn force_open(&self) {
        let mut state = self.lock();
        self.transition(&mut state, CircuitState::Open);
        state.opened_at = Some(Instant::now());
    }

    fn rejection(&self) -> LlmError {
        LlmError::CircuitOpen {
            upstream: self.upstream.clone(),
        }
    }

    fn resolve(&self, trial: bool, outcome: CallOutcome) {
        let mut state = self.lock();
        if trial {
            state.trial_in_flight = false;
        }

        match outcome {
            CallOutcome::Success => state.total_successes += 1,
            CallOutcome::Failure => state.total_failures += 1,
            CallOutcome::Ignored => {}
        }

        match (state.status, outcome) {
            (CircuitState::HalfOpen, CallOutcome::Success | CallOutcome::Ignored) if trial => {
                self.transition(&mut state, CircuitState::Closed);
            }
            (CircuitState::HalfOpen, CallOutcome::Failure) if trial => {
                self.transition(&mut state, CircuitState::Open);
                state.opened_at = Some(Instant::now());
            }
            (CircuitState::Closed, CallOutcome::Success) => {
                state.success_count += 1;
            }
            (CircuitState::Closed, CallOutcome::Failure) => {
                let now = Instant::now();
                let window = self.config.window;
                while state
                    .failures
                    .front()
                    .is_some_and(|at| now.duration_since(*at) >= window)
                {
                    state.failures.pop_front();
                }
                let threshold = self.config.failure_threshold.max(1) as usize;
                if state.failures.len() >= threshold {
                    state.failures.pop_front();
                }
                state.failures.push_back(now);
                if state.failures.len() >= threshold {
                    self.transition(&mut state, CircuitState::Open);
                    state.opened_at = Some(now);
                }
            }
            // Calls admitted before the circuit opened may still finish; their
            // outcome no longer affects an open or half-open circuit.
            _ => {}
        }
    }

    fn release_trial(&self) {
        let mut state = self.lock();
        state.trial_in_flight = false;
    }

    fn transition(&self, state: &mut BreakerState, to: CircuitState) {
        let from = state.status;
        if from == to {
            return;
        }
        state.status = to;
        state.last_state_change = Instant::now();
        match to {
            CircuitState::Closed => {
                state.failures.clear();
                state.success_count = 0;
                state.opened_at = None;
            }
            CircuitState::Open => {
                state.success_count = 0;
            }
            CircuitState::HalfOpen => {}
        }
        info!(
            upstream = %self.upstream,
            "Circuit breaker state transition: {} -> {}",
            from.as_str(),
            to.as_str()
        );
    }
}

/// Admission to make one call through a [`CircuitBreaker`].
#[derive(Debug)]
#[must_use = "record the call outcome or the breaker learns nothing"]
pub struct BreakerPermit {
    breaker: Arc<CircuitBreaker>,
    trial: bool,
    resolved: bool,
}

impl BreakerPermit {
    /// Whether this permit is the half-open trial call
    pub fn is_trial(&self) -> bool {
        self.trial
    }

    pub fn record(mut self, outcome: CallOutcome) {
        self.resolved = true;
        self.breaker.resolve(self.trial, outcome);
    }
}

impl Drop for BreakerPermit {
    fn drop(&mut self) {
        if !self.resolved && self.trial {
            self.breaker.release_trial();
        }
    }
}
