//! Shared fakes for integration tests: a scripted transport and pipeline
//! builders wired against it.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use relaykit::execution::http::{
    HttpStreamResponse, HttpTransport, HttpTransportRequest, HttpTransportResponse,
};
use relaykit::prelude::*;
use reqwest::header::HeaderMap;
use serde_json::{Value, json};

/// One scripted upstream reply.
#[derive(Debug, Clone)]
pub enum Reply {
    Json(u16, Value),
    /// SSE body delivered in small chunks
    Sse(u16, String),
    /// SSE body that stays open after the given prefix
    SseThenHang(String),
    /// Transport-level failure
    Fail(LlmError),
    /// Never answers
    Hang,
}

/// Transport that pops one reply per call; an exhausted script answers 200
/// with an empty chat completion.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    replies: Mutex<VecDeque<Reply>>,
    calls: AtomicUsize,
    requests: Mutex<Vec<HttpTransportRequest>>,
}

impl ScriptedTransport {
    pub fn new(replies: impl IntoIterator<Item = Reply>) -> Arc<Self> {
        Arc::new(Self {
            replies: Mutex::new(replies.into_iter().collect()),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpTransportRequest> {
        self.requests.lock().unwrap().clone()
    }

    fn next_reply(&self, request: HttpTransportRequest) -> Reply {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request);
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Reply::Json(200, completion("ok")))
    }
}

fn chunked(body: &str) -> Vec<Result<Bytes, LlmError>> {
    body.as_bytes()
        .chunks(11)
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect()
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn execute_json(
        &self,
        request: HttpTransportRequest,
    ) -> Result<HttpTransportResponse, LlmError> {
        match self.next_reply(request) {
            Reply::Json(status, body) => Ok(HttpTransportResponse {
                status,
                headers: HeaderMap::new(),
                body: serde_json::to_vec(&body).unwrap(),
            }),
            Reply::Fail(err) => Err(err),
            Reply::Hang => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
            other => panic!("unexpected reply for a JSON call: {other:?}"),
        }
    }

    async fn execute_stream(
        &self,
        request: HttpTransportRequest,
    ) -> Result<HttpStreamResponse, LlmError> {
        match self.next_reply(request) {
            Reply::Sse(status, body) => Ok(HttpStreamResponse {
                status,
                headers: HeaderMap::new(),
                body: Box::pin(futures::stream::iter(chunked(&body))),
            }),
            Reply::SseThenHang(prefix) => Ok(HttpStreamResponse {
                status: 200,
                headers: HeaderMap::new(),
                body: Box::pin(
                    futures::stream::iter(chunked(&prefix)).chain(futures::stream::pending()),
                ),
            }),
            Reply::Json(status, body) => Ok(HttpStreamResponse {
                status,
                headers: HeaderMap::new(),
                body: Box::pin(futures::stream::iter(chunked(&body.to_string()))),
            }),
            Reply::Fail(err) => Err(err),
            Reply::Hang => {
                futures::future::pending::<()>().await;
                unreachable!()
            }
        }
    }
}

pub fn completion(content: &str) -> Value {
    json!({
        "id": "chatcmpl-test",
        "model": "gpt-4o-mini",
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": content},
            "finish_reason": "stop"
        }],
        "usage": {"prompt_tokens": 5, "completion_tokens": 2, "total_tokens": 7}
    })
}

pub fn sse_chunk(delta: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({"choices": [{"index": 0, "delta": {"content": delta}}]})
    )
}

pub fn sse_body(deltas: &[&str]) -> String {
    let mut body: String = deltas.iter().map(|d| sse_chunk(d)).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy::new()
        .with_max_attempts(max_attempts)
        .with_initial_delay(Duration::from_millis(1))
        .with_max_delay(Duration::from_millis(5))
        .with_jitter(false)
}

pub fn static_config() -> StaticConfig {
    StaticConfig::new().with_provider(
        "openai",
        ProviderSettings::new()
            .with_base_url("http://upstream.test/v1")
            .with_api_key("sk-test"),
    )
}

pub fn adapter() -> Arc<dyn ProviderAdapter> {
    Arc::new(OpenAiCompatibleAdapter::new())
}

pub fn chat_pipeline(
    transport: Arc<ScriptedTransport>,
    registry: Arc<ResilienceRegistry>,
    config: StaticConfig,
    retry: RetryPolicy,
) -> Pipeline {
    Pipeline::new()
        .plug(ValidateInput::new())
        .plug(ResolveConfig::new(config))
        .plug(BuildPayload::new(adapter()))
        .plug(CallUpstream::new(transport, registry).with_retry_policy(retry))
        .plug(ParseResponse::new(adapter()))
}

pub fn stream_pipeline(
    transport: Arc<ScriptedTransport>,
    registry: Arc<ResilienceRegistry>,
    config: StaticConfig,
    retry: RetryPolicy,
) -> Pipeline {
    Pipeline::new()
        .plug(ValidateInput::new())
        .plug(ResolveConfig::new(config))
        .plug(BuildPayload::new(adapter()))
        .plug(StreamUpstream::new(transport, registry, adapter()).with_retry_policy(retry))
}

pub fn chat_request(text: &str) -> Request {
    Request::builder("openai")
        .message(ChatMessage::user(text))
        .model("gpt-4o-mini")
        .build()
}
