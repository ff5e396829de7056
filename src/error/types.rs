//! Core error types.

use std::time::Duration;

use thiserror::Error;

/// Coarse error category used for presentation and metrics labels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Authentication,
    RateLimit,
    Client,
    Server,
    Network,
    Parsing,
    Validation,
    Configuration,
    Resilience,
    Stream,
    Internal,
}

/// Operational error returned by transports, adapters and resilience primitives.
#[derive(Debug, Clone, Error)]
pub enum LlmError {
    /// Caller input failed a precondition
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Missing or inconsistent provider configuration
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    /// Upstream asked us to slow down. `retry_after` carries the provider hint.
    #[error("Rate limit exceeded: {message}")]
    RateLimitError {
        message: String,
        retry_after: Option<Duration>,
    },

    /// Generic upstream API failure with HTTP status
    #[error("API error {code}: {message}")]
    ApiError {
        code: u16,
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Request timed out: {0}")]
    TimeoutError(String),

    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("HTTP error: {0}")]
    HttpError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("JSON error: {0}")]
    JsonError(String),

    /// Breaker for the upstream is open; no network call was attempted
    #[error("Circuit open for upstream '{upstream}'")]
    CircuitOpen { upstream: String },

    /// Concurrency limit for the upstream was reached
    #[error("Bulkhead full for upstream '{upstream}'")]
    BulkheadFull { upstream: String },

    /// Connection dropped after the stream started
    #[error("Stream interrupted: {0}")]
    StreamInterrupted(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl LlmError {
    /// Create an API error with status code and message
    pub fn api_error(code: u16, message: impl Into<String>) -> Self {
        Self::ApiError {
            code,
            message: message.into(),
            details: None,
        }
    }

    /// Create an API error carrying structured details (e.g. the provider body)
    pub fn api_error_with_details(
        code: u16,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self::ApiError {
            code,
            message: message.into(),
            details: Some(details),
        }
    }

    /// Create a rate limit error without a retry hint
    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::RateLimitError {
            message: message.into(),
            retry_after: None,
        }
    }

    /// HTTP status code associated with this error, if any
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::ApiError { code, .. } => Some(*code),
            Self::RateLimitError { .. } => Some(429),
            Self::AuthenticationError(_) => Some(401),
            _ => None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidInput(_) => ErrorCategory::Validation,
            Self::ConfigurationError(_) => ErrorCategory::Configuration,
            Self::AuthenticationError(_) => ErrorCategory::Authentication,
            Self::RateLimitError { .. } => ErrorCategory::RateLimit,
            Self::ApiError { code, .. } if *code >= 500 => ErrorCategory::Server,
            Self::ApiError { .. } => ErrorCategory::Client,
            Self::TimeoutError(_) | Self::ConnectionError(_) | Self::HttpError(_) => {
                ErrorCategory::Network
            }
            Self::ParseError(_) | Self::JsonError(_) => ErrorCategory::Parsing,
            Self::CircuitOpen { .. } | Self::BulkheadFull { .. } => ErrorCategory::Resilience,
            Self::StreamInterrupted(_) | Self::Cancelled => ErrorCategory::Stream,
            Self::InternalError(_) => ErrorCategory::Internal,
        }
    }

    /// Whether the retry classifier would retry this error.
    pub fn is_retryable(&self) -> bool {
        crate::retry::classify(self).is_retryable()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn categories_follow_status() {
        assert_eq!(LlmError::api_error(503, "x").category(), ErrorCategory::Server);
        assert_eq!(LlmError::api_error(404, "x").category(), ErrorCategory::Client);
        assert_eq!(
            LlmError::CircuitOpen {
                upstream: "a".into()
            }
            .category(),
            ErrorCategory::Resilience
        );
    }

    #[test]
    fn status_code_for_rate_limit_is_429() {
        assert_eq!(LlmError::rate_limited("slow down").status_code(), Some(429));
        assert_eq!(LlmError::TimeoutError("t".into()).status_code(), None);
    }
}
