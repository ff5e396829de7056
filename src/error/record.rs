//! Recorded error history.
//!
//! Every failure a plug observes is appended to the request as an
//! [`ErrorRecord`]. The kind mirrors the pipeline's error taxonomy rather than
//! the transport-level [`LlmError`] variants.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::types::LlmError;
use crate::retry::{RetryClass, classify};

/// Error taxonomy recorded on a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Caller input failed a precondition
    Validation,
    /// A plug panicked; produced only by the pipeline runner
    PlugCrash,
    CircuitOpen,
    BulkheadFull,
    RetryableTransient,
    RetryableRateLimited,
    /// Upstream rejected the call and retrying will not help (auth, 4xx)
    NonRetryable,
    StreamInterrupted,
    /// Provider settings could not be resolved
    Configuration,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Validation => "validation_error",
            ErrorKind::PlugCrash => "plug_crash",
            ErrorKind::CircuitOpen => "circuit_open",
            ErrorKind::BulkheadFull => "bulkhead_full",
            ErrorKind::RetryableTransient => "retryable_transient",
            ErrorKind::RetryableRateLimited => "retryable_rate_limited",
            ErrorKind::NonRetryable => "non_retryable",
            ErrorKind::StreamInterrupted => "stream_interrupted",
            ErrorKind::Configuration => "configuration_error",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One entry in a request's error history.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    /// Name of the plug that produced the record
    pub plug: Option<String>,
    pub message: String,
    /// Upstream HTTP status, when known
    pub status: Option<u16>,
    /// 1-based attempt number for upstream calls
    pub attempt: Option<u32>,
    pub retry_after: Option<Duration>,
    pub at: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            plug: None,
            message: message.into(),
            status: None,
            attempt: None,
            retry_after: None,
            at: Utc::now(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn plug_crash(plug: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::PlugCrash, message).with_plug(plug)
    }

    /// Map an operational error onto the recorded taxonomy.
    pub fn from_error(error: &LlmError) -> Self {
        let kind = match error {
            LlmError::InvalidInput(_) => ErrorKind::Validation,
            LlmError::ConfigurationError(_) => ErrorKind::Configuration,
            LlmError::CircuitOpen { .. } => ErrorKind::CircuitOpen,
            LlmError::BulkheadFull { .. } => ErrorKind::BulkheadFull,
            LlmError::StreamInterrupted(_) => ErrorKind::StreamInterrupted,
            other => match classify(other) {
                RetryClass::Transient => ErrorKind::RetryableTransient,
                RetryClass::RateLimited { .. } => ErrorKind::RetryableRateLimited,
                RetryClass::NonRetryable => ErrorKind::NonRetryable,
            },
        };
        let retry_after = match error {
            LlmError::RateLimitError { retry_after, .. } => *retry_after,
            _ => None,
        };
        Self {
            kind,
            plug: None,
            message: error.to_string(),
            status: error.status_code(),
            attempt: None,
            retry_after,
            at: Utc::now(),
        }
    }

    pub fn with_plug(mut self, plug: impl Into<String>) -> Self {
        self.plug = Some(plug.into());
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }
}
