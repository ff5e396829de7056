//! Execution layer: how requests reach an upstream.

pub mod http;
