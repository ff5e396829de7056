//! Resilience layer: circuit breakers and bulkheads keyed by upstream.
//!
//! Retry classification lives in [`crate::retry`]; this module only decides
//! whether a call may start and how many may run at once.

pub mod bulkhead;
pub mod circuit_breaker;
pub mod config;
pub mod registry;

pub use bulkhead::{Bulkhead, BulkheadPermit};
pub use circuit_breaker::{
    BreakerPermit, CallOutcome, CircuitBreaker, CircuitBreakerStats, CircuitState,
};
pub use config::{BulkheadConfig, CircuitBreakerConfig, ResilienceConfig};
pub use registry::{ResilienceRegistry, outcome_of};
