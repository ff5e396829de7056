//! Core data types threaded through the pipeline.

pub mod message;
pub mod metadata;
pub mod options;
pub mod provider;
pub mod request;
pub mod response;

pub use message::*;
pub use metadata::*;
pub use options::*;
pub use provider::*;
pub use request::*;
pub use response::*;
