//! Utility modules

pub mod cancel;
pub mod duration_ms;
