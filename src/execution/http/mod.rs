//! HTTP Utilities
//!
//! - transport.rs: injectable transport trait and wire types
//! - reqwest_transport.rs: the `reqwest`-backed transport
//! - errors.rs: mapping of HTTP failures to typed errors

pub mod errors;
pub mod reqwest_transport;
pub mod transport;

pub use errors::{classify_http_error, retry_after};
pub use reqwest_transport::ReqwestTransport;
pub use transport::*;
