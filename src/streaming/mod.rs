//! Streaming Module
//!
//! - types.rs: events, stream aliases and the consumer handle
//! - bridge.rs: bounded producer/consumer bridge with cancellation
//! - sse.rs: SSE byte streams to events through a provider adapter

pub mod bridge;
pub mod sse;
pub mod types;

pub use bridge::StreamBridge;
pub use sse::{parse_sse_body, sse_event_stream};
pub use types::{ChatStream, ChatStreamEvent, ChatStreamHandle, EventStream};
