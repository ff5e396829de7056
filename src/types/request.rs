//! The unit of work flowing through the pipeline.
//!
//! A [`Request`] is owned by exactly one pipeline run at a time. Plugs receive
//! it by value and return the updated value; every update is a consuming
//! method, so there is no shared mutable request across runs. Identity, input
//! and options are immutable after construction; `errors` only grows; `state`
//! only moves forward.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

use super::message::ChatMessage;
use super::metadata::RequestMetadata;
use super::options::RequestOptions;
use super::provider::{ProviderId, RequestId};
use super::response::{ChatResult, UpstreamResponse};
use crate::config::ResolvedConfig;
use crate::error::ErrorRecord;
use crate::streaming::ChatStreamHandle;

/// Open key-value store used for `assigns` and `private`.
pub type Assigns = HashMap<String, Value>;

/// Lifecycle state of a request within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestState {
    Pending,
    Executing,
    Streaming,
    Completed,
    Error,
}

impl RequestState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RequestState::Pending => "pending",
            RequestState::Executing => "executing",
            RequestState::Streaming => "streaming",
            RequestState::Completed => "completed",
            RequestState::Error => "error",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestState::Completed | RequestState::Error)
    }

    fn rank(&self) -> u8 {
        match self {
            RequestState::Pending => 0,
            RequestState::Executing => 1,
            RequestState::Streaming => 2,
            RequestState::Completed | RequestState::Error => 3,
        }
    }

    /// Whether moving from `self` to `next` keeps the lifecycle monotonic.
    pub fn can_transition_to(&self, next: RequestState) -> bool {
        !self.is_terminal() && next.rank() > self.rank()
    }
}

impl std::fmt::Display for RequestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug)]
pub struct Request {
    id: RequestId,
    provider: ProviderId,
    input: Arc<[ChatMessage]>,
    options: Arc<RequestOptions>,
    config: Option<Arc<ResolvedConfig>>,
    state: RequestState,
    halted: bool,
    assigns: Assigns,
    private: Assigns,
    errors: Vec<ErrorRecord>,
    response: Option<UpstreamResponse>,
    result: Option<ChatResult>,
    metadata: RequestMetadata,
    stream: Option<ChatStreamHandle>,
}

impl Request {
    pub fn new(
        provider: impl Into<ProviderId>,
        input: Vec<ChatMessage>,
        options: RequestOptions,
    ) -> Self {
        Self {
            id: RequestId::new(),
            provider: provider.into(),
            input: input.into(),
            options: Arc::new(options),
            config: None,
            state: RequestState::Pending,
            halted: false,
            assigns: Assigns::new(),
            private: Assigns::new(),
            errors: Vec::new(),
            response: None,
            result: None,
            metadata: RequestMetadata::default(),
            stream: None,
        }
    }

    pub fn builder(provider: impl Into<ProviderId>) -> RequestBuilder {
        RequestBuilder::new(provider)
    }

    /// Start a new request for the next conversation turn.
    ///
    /// The new request gets a fresh id and lifecycle; provider, options and
    /// resolved config carry over.
    pub fn next_turn(&self, message: ChatMessage) -> Request {
        let mut input = self.input.to_vec();
        input.push(message);
        let mut next = Request::new(self.provider.clone(), input, RequestOptions::default());
        next.options = Arc::clone(&self.options);
        next.config = self.config.clone();
        next
    }

    // ---- accessors -------------------------------------------------------

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn provider(&self) -> &ProviderId {
        &self.provider
    }

    pub fn input(&self) -> &[ChatMessage] {
        &self.input
    }

    pub fn options(&self) -> &RequestOptions {
        &self.options
    }

    pub fn config(&self) -> Option<&ResolvedConfig> {
        self.config.as_deref()
    }

    /// Shared handle to the resolved config, for use after the request has
    /// been moved on.
    pub fn shared_config(&self) -> Option<Arc<ResolvedConfig>> {
        self.config.clone()
    }

    pub fn state(&self) -> RequestState {
        self.state
    }

    pub fn is_halted(&self) -> bool {
        self.halted
    }

    pub fn assigns(&self) -> &Assigns {
        &self.assigns
    }

    pub fn assign(&self, key: &str) -> Option<&Value> {
        self.assigns.get(key)
    }

    /// Pipeline-internal store. Only built-in plugs should rely on its contents.
    pub fn private(&self) -> &Assigns {
        &self.private
    }

    pub fn errors(&self) -> &[ErrorRecord] {
        &self.errors
    }

    pub fn response(&self) -> Option<&UpstreamResponse> {
        self.response.as_ref()
    }

    pub fn result(&self) -> Option<&ChatResult> {
        self.result.as_ref()
    }

    pub fn metadata(&self) -> &RequestMetadata {
        &self.metadata
    }

    pub fn has_stream(&self) -> bool {
        self.stream.is_some()
    }

    // ---- updates ---------------------------------------------------------

    /// Advance the lifecycle. Regressions and moves out of a terminal state
    /// are ignored.
    pub fn transition(mut self, next: RequestState) -> Self {
        if self.state == next {
            return self;
        }
        if self.state.can_transition_to(next) {
            self.state = next;
        } else {
            tracing::warn!(
                request_id = %self.id,
                from = %self.state,
                to = %next,
                "ignoring non-monotonic state transition"
            );
        }
        self
    }

    /// Stop the pipeline after the current plug.
    pub fn halt(mut self) -> Self {
        self.halted = true;
        self
    }

    /// Record an error, move to `Error` and stop the pipeline.
    ///
    /// A request that already completed keeps `Completed`, since terminal
    /// states never change; the runner still reports such a run as failed.
    pub fn halt_with_error(self, record: ErrorRecord) -> Self {
        self.push_error(record).transition(RequestState::Error).halt()
    }

    /// Record an error without stopping the pipeline.
    pub fn push_error(mut self, record: ErrorRecord) -> Self {
        self.errors.push(record);
        self
    }

    pub fn put_assign(mut self, key: impl Into<String>, value: Value) -> Self {
        self.assigns.insert(key.into(), value);
        self
    }

    pub fn put_private(mut self, key: impl Into<String>, value: Value) -> Self {
        self.private.insert(key.into(), value);
        self
    }

    /// Attach the resolved configuration. Configuration is set once; later
    /// calls keep the first value.
    pub fn put_config(mut self, config: Arc<ResolvedConfig>) -> Self {
        if self.config.is_some() {
            tracing::warn!(request_id = %self.id, "config already resolved; keeping first value");
        } else {
            self.config = Some(config);
        }
        self
    }

    pub fn put_response(mut self, response: UpstreamResponse) -> Self {
        self.response = Some(response);
        self
    }

    pub fn put_result(mut self, result: ChatResult) -> Self {
        self.result = Some(result);
        self
    }

    pub fn put_stream(mut self, stream: ChatStreamHandle) -> Self {
        self.stream = Some(stream);
        self
    }

    pub fn update_metadata(mut self, f: impl FnOnce(&mut RequestMetadata)) -> Self {
        f(&mut self.metadata);
        self
    }

    /// Take the stream handle out of the request.
    pub fn take_stream(&mut self) -> Option<ChatStreamHandle> {
        self.stream.take()
    }

    pub fn into_stream(mut self) -> Option<ChatStreamHandle> {
        self.stream.take()
    }

    /// Copy of everything but the stream handle: a handle has a single
    /// consumer, so a snapshot never aliases it.
    pub(crate) fn snapshot(&self) -> Request {
        Request {
            id: self.id,
            provider: self.provider.clone(),
            input: Arc::clone(&self.input),
            options: Arc::clone(&self.options),
            config: self.config.clone(),
            state: self.state,
            halted: self.halted,
            assigns: self.assigns.clone(),
            private: self.private.clone(),
            errors: self.errors.clone(),
            response: self.response.clone(),
            result: self.result.clone(),
            metadata: self.metadata.clone(),
            stream: None,
        }
    }
}

/// Builder for [`Request`]
#[derive(Debug)]
pub struct RequestBuilder {
    provider: ProviderId,
    input: Vec<ChatMessage>,
    options: RequestOptions,
    assigns: Assigns,
    config: Option<Arc<ResolvedConfig>>,
}

impl RequestBuilder {
    pub fn new(provider: impl Into<ProviderId>) -> Self {
        Self {
            provider: provider.into(),
            input: Vec::new(),
            options: RequestOptions::default(),
            assigns: Assigns::new(),
            config: None,
        }
    }

    pub fn message(mut self, message: ChatMessage) -> Self {
        self.input.push(message);
        self
    }

    pub fn messages(mut self, messages: impl IntoIterator<Item = ChatMessage>) -> Self {
        self.input.extend(messages);
        self
    }

    pub fn options(mut self, options: RequestOptions) -> Self {
        self.options = options;
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.options.model = model.into();
        self
    }

    pub fn temperature(mut self, temperature: f32) -> Self {
        self.options.temperature = Some(temperature);
        self
    }

    pub fn max_tokens(mut self, max_tokens: u32) -> Self {
        self.options.max_tokens = Some(max_tokens);
        self
    }

    pub fn stream(mut self, stream: bool) -> Self {
        self.options.stream = stream;
        self
    }

    pub fn assign(mut self, key: impl Into<String>, value: Value) -> Self {
        self.assigns.insert(key.into(), value);
        self
    }

    pub fn config(mut self, config: ResolvedConfig) -> Self {
        self.config = Some(Arc::new(config));
        self
    }

    pub fn build(self) -> Request {
        let mut request = Request::new(self.provider, self.input, self.options);
        request.assigns = self.assigns;
        request.config = self.config;
        request
    }
}
