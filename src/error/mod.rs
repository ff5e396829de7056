//! Error Handling Module
//!
//! This module provides error handling for the pipeline and resilience layer:
//! - Operational error type (`LlmError`, `ErrorCategory`) returned by transports,
//!   adapters and the resilience primitives
//! - Recorded error history (`ErrorRecord`, `ErrorKind`) carried on a `Request`
//! - Type conversions from common error types
//!
//! # Example
//!
//! ```rust,ignore
//! use relaykit::error::{LlmError, ErrorCategory};
//!
//! let error = LlmError::api_error(404, "Not found");
//! assert_eq!(error.category(), ErrorCategory::Client);
//! assert!(!error.is_retryable());
//! ```

mod conversions;
pub mod record;
pub mod types;

pub use record::*;
pub use types::*;
