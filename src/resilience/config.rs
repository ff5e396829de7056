use std::time::Duration;

use serde::Deserialize;

use crate::defaults;
use crate::retry::RetryPolicy;

/// Circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct CircuitBreakerConfig {
    /// Failures within `window` that open the circuit
    pub failure_threshold: u32,
    /// Time the circuit stays open before a trial call is admitted
    #[serde(with = "crate::utils::duration_ms", rename = "cooldown_ms")]
    pub cooldown: Duration,
    /// Rolling window for failure counting
    #[serde(with = "crate::utils::duration_ms", rename = "window_ms")]
    pub window: Duration,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: defaults::circuit_breaker::FAILURE_THRESHOLD,
            cooldown: defaults::circuit_breaker::COOLDOWN,
            window: defaults::circuit_breaker::WINDOW,
        }
    }
}

impl CircuitBreakerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub const fn with_cooldown(mut self, cooldown: Duration) -> Self {
        self.cooldown = cooldown;
        self
    }

    pub const fn with_window(mut self, window: Duration) -> Self {
        self.window = window;
        self
    }
}

/// Bulkhead configuration
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct BulkheadConfig {
    /// Calls allowed in flight at once
    pub max_concurrent: usize,
    /// Callers allowed to queue for a slot; zero rejects as soon as all slots are taken
    pub max_waiting: usize,
    /// Longest a queued caller waits before it is rejected
    #[serde(with = "crate::utils::duration_ms", rename = "max_wait_ms")]
    pub max_wait: Duration,
}

impl Default for BulkheadConfig {
    fn default() -> Self {
        Self {
            max_concurrent: defaults::bulkhead::MAX_CONCURRENT,
            max_waiting: defaults::bulkhead::MAX_WAITING,
            max_wait: defaults::bulkhead::MAX_WAIT,
        }
    }
}

impl BulkheadConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub const fn with_max_concurrent(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent = max_concurrent;
        self
    }

    pub const fn with_max_waiting(mut self, max_waiting: usize) -> Self {
        self.max_waiting = max_waiting;
        self
    }

    pub const fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }
}

/// Per-upstream resilience thresholds.
///
/// ```json
/// {
///   "circuit_breaker": { "failure_threshold": 3, "cooldown_ms": 10000 },
///   "bulkhead": { "max_concurrent": 8, "max_waiting": 0 },
///   "retry": { "max_attempts": 4 }
/// }
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ResilienceConfig {
    pub circuit_breaker: CircuitBreakerConfig,
    pub bulkhead: BulkheadConfig,
    pub retry: RetryPolicy,
}

impl ResilienceConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_circuit_breaker(mut self, config: CircuitBreakerConfig) -> Self {
        self.circuit_breaker = config;
        self
    }

    pub fn with_bulkhead(mut self, config: BulkheadConfig) -> Self {
        self.bulkhead = config;
        self
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_partial_config_with_defaults() {
        let cfg: ResilienceConfig = serde_json::from_value(serde_json::json!({
            "circuit_breaker": { "failure_threshold": 3, "cooldown_ms": 250 },
            "bulkhead": { "max_waiting": 0 },
            "retry": { "max_attempts": 4 }
        }))
        .unwrap();

        assert_eq!(cfg.circuit_breaker.failure_threshold, 3);
        assert_eq!(cfg.circuit_breaker.cooldown, Duration::from_millis(250));
        assert_eq!(cfg.circuit_breaker.window, defaults::circuit_breaker::WINDOW);
        assert_eq!(cfg.bulkhead.max_waiting, 0);
        assert_eq!(cfg.bulkhead.max_concurrent, defaults::bulkhead::MAX_CONCURRENT);
        assert_eq!(cfg.retry.max_attempts, 4);
    }
}
