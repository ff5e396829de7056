//! Retry classification.
//!
//! The classifier is the single source of truth for two questions: should a
//! failure be retried, and does it count against the upstream's circuit
//! breaker. Both answers depend only on the error value.

use std::time::Duration;

use crate::error::LlmError;

/// Retry class of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    /// Timeouts, connection resets, 5xx
    Transient,
    /// 429 or a provider rate-limit signal, with the provider's hint if any
    RateLimited { retry_after: Option<Duration> },
    /// Validation, auth, malformed requests and local rejections
    NonRetryable,
}

impl RetryClass {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, RetryClass::NonRetryable)
    }
}

/// Classify an error.
pub fn classify(error: &LlmError) -> RetryClass {
    match error {
        LlmError::TimeoutError(_)
        | LlmError::ConnectionError(_)
        | LlmError::HttpError(_)
        | LlmError::StreamInterrupted(_) => RetryClass::Transient,
        LlmError::RateLimitError { retry_after, .. } => RetryClass::RateLimited {
            retry_after: *retry_after,
        },
        LlmError::ApiError { code: 429, .. } => RetryClass::RateLimited { retry_after: None },
        LlmError::ApiError { code, .. } if *code == 408 || (500..=599).contains(code) => {
            RetryClass::Transient
        }
        // Local rejections are surfaced immediately. Retrying them would only
        // consume the retry budget against the same closed gate.
        LlmError::CircuitOpen { .. } | LlmError::BulkheadFull { .. } => RetryClass::NonRetryable,
        LlmError::InvalidInput(_)
        | LlmError::ConfigurationError(_)
        | LlmError::AuthenticationError(_)
        | LlmError::ApiError { .. }
        | LlmError::ParseError(_)
        | LlmError::JsonError(_)
        | LlmError::Cancelled
        | LlmError::InternalError(_) => RetryClass::NonRetryable,
    }
}

/// Whether a failure counts against the upstream's breaker threshold.
///
/// A caller's bad request must not punish the upstream's health score.
pub fn counts_against_breaker(error: &LlmError) -> bool {
    classify(error).is_retryable()
}
