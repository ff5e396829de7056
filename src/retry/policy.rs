//! Retry Mechanism Module
//!
//! Backoff policy and executor for upstream calls. The executor keeps every
//! failed attempt so plugs can record the full history on the request, even
//! when a later attempt succeeds.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tokio::time::sleep;

use super::classifier::{RetryClass, classify};
use crate::defaults;
use crate::error::LlmError;

/// Retry policy configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Maximum number of attempts, the first call included
    pub max_attempts: u32,
    /// Initial delay between retries
    #[serde(with = "crate::utils::duration_ms", rename = "initial_delay_ms")]
    pub initial_delay: Duration,
    /// Maximum delay between retries; also caps provider `retry_after` hints
    #[serde(with = "crate::utils::duration_ms", rename = "max_delay_ms")]
    pub max_delay: Duration,
    /// Backoff multiplier (for exponential backoff)
    pub backoff_multiplier: f64,
    /// Whether to add jitter to transient delays
    pub use_jitter: bool,
    /// Maximum jitter percentage (0.0 to 1.0)
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: defaults::retry::MAX_ATTEMPTS,
            initial_delay: defaults::retry::INITIAL_DELAY,
            max_delay: defaults::retry::MAX_DELAY,
            backoff_multiplier: defaults::retry::BACKOFF_MULTIPLIER,
            use_jitter: true,
            jitter_factor: defaults::retry::JITTER_FACTOR,
        }
    }
}

/// Outcome of consulting the policy after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry { delay: Duration },
    GiveUp,
}

impl RetryPolicy {
    /// Create a new retry policy
    pub fn new() -> Self {
        Self::default()
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::default().with_max_attempts(1)
    }

    /// Set maximum attempts
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Set initial delay
    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Set maximum delay
    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Set backoff multiplier
    pub const fn with_backoff_multiplier(mut self, multiplier: f64) -> Self {
        self.backoff_multiplier = multiplier;
        self
    }

    /// Enable or disable jitter
    pub const fn with_jitter(mut self, use_jitter: bool) -> Self {
        self.use_jitter = use_jitter;
        self
    }

    /// Set jitter factor
    pub const fn with_jitter_factor(mut self, factor: f64) -> Self {
        self.jitter_factor = factor.clamp(0.0, 1.0);
        self
    }

    /// Decide what to do after `attempts_made` attempts, the last of which
    /// failed with `error`.
    pub fn decide(&self, error: &LlmError, attempts_made: u32) -> RetryDecision {
        if attempts_made >= self.max_attempts.max(1) {
            return RetryDecision::GiveUp;
        }
        let retry_index = attempts_made.saturating_sub(1);
        match classify(error) {
            RetryClass::NonRetryable => RetryDecision::GiveUp,
            RetryClass::Transient => RetryDecision::Retry {
                delay: self.calculate_delay(retry_index),
            },
            RetryClass::RateLimited {
                retry_after: Some(hint),
            } => RetryDecision::Retry {
                delay: hint.min(self.max_delay),
            },
            RetryClass::RateLimited { retry_after: None } => RetryDecision::Retry {
                delay: self.calculate_delay(retry_index),
            },
        }
    }

    /// Calculate delay for a given retry index (0 for the first retry)
    pub fn calculate_delay(&self, retry_index: u32) -> Duration {
        let base_delay = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(retry_index as i32);

        let delay = Duration::from_millis(base_delay as u64).min(self.max_delay);

        if self.use_jitter {
            self.add_jitter(delay)
        } else {
            delay
        }
    }

    /// Add jitter to a delay
    fn add_jitter(&self, delay: Duration) -> Duration {
        let jitter_range = delay.as_millis() as f64 * self.jitter_factor;
        if jitter_range <= 0.0 {
            return delay;
        }
        let mut rng = rand::thread_rng();
        let jitter = rng.gen_range(-jitter_range..=jitter_range);

        let new_delay = delay.as_millis() as f64 + jitter;
        Duration::from_millis(new_delay.max(0.0) as u64)
    }
}

/// A failed attempt kept for diagnostics.
#[derive(Debug, Clone)]
pub struct AttemptFailure {
    /// 1-based attempt number
    pub attempt: u32,
    pub error: LlmError,
    pub class: RetryClass,
}

/// Everything the executor observed while retrying one operation.
#[derive(Debug)]
pub struct RetryReport<T> {
    pub outcome: Result<T, LlmError>,
    /// Every failed attempt in order, the final one included
    pub failures: Vec<AttemptFailure>,
    pub attempts: u32,
}

impl<T> RetryReport<T> {
    pub fn into_result(self) -> Result<T, LlmError> {
        self.outcome
    }
}

/// Retry executor that handles the actual retry logic
#[derive(Debug, Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
}

impl RetryExecutor {
    /// Create a new retry executor
    pub const fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Execute `operation` until it succeeds or the policy gives up.
    ///
    /// The closure receives the 1-based attempt number.
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> RetryReport<T>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, LlmError>>,
    {
        let mut failures = Vec::new();
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            match operation(attempt).await {
                Ok(value) => {
                    return RetryReport {
                        outcome: Ok(value),
                        failures,
                        attempts: attempt,
                    };
                }
                Err(error) => {
                    let decision = self.policy.decide(&error, attempt);
                    failures.push(AttemptFailure {
                        attempt,
                        error: error.clone(),
                        class: classify(&error),
                    });
                    match decision {
                        RetryDecision::GiveUp => {
                            return RetryReport {
                                outcome: Err(error),
                                failures,
                                attempts: attempt,
                            };
                        }
                        RetryDecision::Retry { delay } => {
                            tracing::debug!(
                                attempt,
                                delay_ms = delay.as_millis() as u64,
                                error = %error,
                                "retrying after failure"
                            );
                            sleep(delay).await;
                        }
                    }
                }
            }
        }
    }
}
