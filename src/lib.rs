//! # relaykit
//!
//! Request pipeline and resilience layer for unified LLM clients.
//!
//! A caller builds a [`Request`] and runs it through an ordered list of plugs.
//! Plugs that talk to an upstream provider wrap their network call in the
//! resilience layer: a per-upstream circuit breaker, a bounded bulkhead and a
//! classified retry policy.
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use relaykit::prelude::*;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let registry = Arc::new(ResilienceRegistry::new(ResilienceConfig::default()));
//! let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new(reqwest::Client::new()));
//! let adapter: Arc<dyn ProviderAdapter> = Arc::new(OpenAiCompatibleAdapter::new());
//!
//! let pipeline = Pipeline::new()
//!     .plug(ValidateInput::new())
//!     .plug(ResolveConfig::new(EnvConfig::new()))
//!     .plug(BuildPayload::new(adapter.clone()))
//!     .plug(CallUpstream::new(transport, registry))
//!     .plug(ParseResponse::new(adapter));
//!
//! let request = Request::builder("openai")
//!     .message(ChatMessage::user("Hello"))
//!     .model("gpt-4o-mini")
//!     .build();
//!
//! match pipeline.run(request).await {
//!     Ok(done) => println!("{:?}", done.result().map(|r| &r.content)),
//!     Err(failed) => eprintln!("{:?}", failed.errors()),
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]

pub mod adapters;
pub mod config;
pub mod defaults;
pub mod error;
pub mod execution;
pub mod observability;
pub mod pipeline;
pub mod plugs;
pub mod resilience;
pub mod retry;
pub mod streaming;
pub mod types;
pub mod utils;

pub use error::LlmError;
pub use pipeline::{Pipeline, Plug, PlugEntry, PlugOptions, run};
pub use types::Request;

/// Commonly used items.
pub mod prelude {
    pub use crate::adapters::{OpenAiCompatibleAdapter, ProviderAdapter, SseEvent, UpstreamPayload};
    pub use crate::config::{
        ConfigSource, EnvConfig, LayeredConfig, ProviderSettings, ResolvedConfig, StaticConfig,
    };
    pub use crate::error::{ErrorCategory, ErrorKind, ErrorRecord, LlmError};
    pub use crate::execution::http::{HttpTransport, ReqwestTransport};
    pub use crate::pipeline::{FnPlug, Pipeline, Plug, PlugEntry, PlugOptions, run};
    pub use crate::plugs::{
        BuildPayload, CallUpstream, ParseResponse, ResolveConfig, StreamUpstream, ValidateInput,
    };
    pub use crate::resilience::{
        Bulkhead, BulkheadConfig, CircuitBreaker, CircuitBreakerConfig, CircuitState,
        ResilienceConfig, ResilienceRegistry,
    };
    pub use crate::retry::{RetryClass, RetryDecision, RetryExecutor, RetryPolicy, classify};
    pub use crate::streaming::{ChatStreamEvent, ChatStreamHandle, StreamBridge};
    pub use crate::types::{
        ChatMessage, ChatResult, MessageRole, Request, RequestOptions, RequestState, Usage,
    };
    pub use crate::utils::cancel::CancelHandle;
}
