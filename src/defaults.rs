//! Default Configuration Values
//!
//! Numeric defaults for the resilience layer and HTTP execution. Deployments
//! are expected to override these through [`crate::config`]; the values here
//! only apply when nothing else is supplied.

use std::time::Duration;

/// HTTP client defaults
pub mod http {
    use super::*;

    /// Default request timeout for a single upstream call.
    ///
    /// Large models routinely take 10-20 seconds to answer, plus proxy latency.
    pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

    /// Default User-Agent string for HTTP requests
    pub const USER_AGENT: &str = concat!("relaykit/", env!("CARGO_PKG_VERSION"));
}

/// Circuit breaker defaults
pub mod circuit_breaker {
    use super::*;

    pub const FAILURE_THRESHOLD: u32 = 5;
    pub const COOLDOWN: Duration = Duration::from_secs(30);
    pub const WINDOW: Duration = Duration::from_secs(60);
}

/// Bulkhead defaults
pub mod bulkhead {
    use super::*;

    pub const MAX_CONCURRENT: usize = 32;
    pub const MAX_WAITING: usize = 64;
    pub const MAX_WAIT: Duration = Duration::from_secs(5);
}

/// Retry defaults
pub mod retry {
    use super::*;

    pub const MAX_ATTEMPTS: u32 = 3;
    pub const INITIAL_DELAY: Duration = Duration::from_millis(500);
    pub const MAX_DELAY: Duration = Duration::from_secs(30);
    pub const BACKOFF_MULTIPLIER: f64 = 2.0;
    pub const JITTER_FACTOR: f64 = 0.1;
}

/// Streaming defaults
pub mod streaming {
    /// Number of events buffered between the connection reader and the consumer.
    pub const CHANNEL_CAPACITY: usize = 16;
}
