//! Retry module
//! - classifier.rs: deterministic classification of failures
//! - policy.rs: backoff policy and retry executor

pub mod classifier;
pub mod policy;

pub use classifier::*;
pub use policy::*;
