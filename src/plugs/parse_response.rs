use std::sync::Arc;

use async_trait::async_trait;

use super::missing;
use crate::adapters::ProviderAdapter;
use crate::error::ErrorRecord;
use crate::pipeline::{Plug, PlugOptions};
use crate::types::{Request, RequestState};

/// Turns the raw upstream response into a [`ChatResult`](crate::types::ChatResult)
/// and completes the request.
#[derive(Clone)]
pub struct ParseResponse {
    adapter: Arc<dyn ProviderAdapter>,
}

impl ParseResponse {
    pub fn new(adapter: Arc<dyn ProviderAdapter>) -> Self {
        Self { adapter }
    }
}

impl std::fmt::Debug for ParseResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParseResponse")
            .field("provider", &self.adapter.provider_id())
            .finish()
    }
}

#[async_trait]
impl Plug for ParseResponse {
    fn name(&self) -> &str {
        "parse_response"
    }

    async fn call(&self, request: Request, _opts: &PlugOptions) -> Request {
        let Some(response) = request.response() else {
            return request.halt_with_error(missing(self.name(), "upstream response"));
        };
        match self.adapter.parse_response(response) {
            Ok(result) => {
                let usage = result.usage;
                request
                    .update_metadata(|m| {
                        if let Some(usage) = &usage {
                            m.add_usage(usage);
                        }
                    })
                    .put_result(result)
                    .transition(RequestState::Completed)
            }
            Err(err) => {
                request.halt_with_error(ErrorRecord::from_error(&err).with_plug(self.name()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::adapters::OpenAiCompatibleAdapter;
    use crate::error::ErrorKind;
    use crate::types::{ChatMessage, UpstreamResponse, Usage};

    fn request_with(body: serde_json::Value) -> Request {
        Request::builder("openai")
            .message(ChatMessage::user("hi"))
            .model("gpt-4o-mini")
            .build()
            .transition(RequestState::Executing)
            .put_response(UpstreamResponse {
                status: 200,
                headers: Default::default(),
                body,
            })
    }

    fn plug() -> ParseResponse {
        ParseResponse::new(Arc::new(OpenAiCompatibleAdapter::new()))
    }

    #[tokio::test]
    async fn completes_with_result_and_usage() {
        let req = request_with(json!({
            "id": "chatcmpl-1",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "Hello!"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 9, "completion_tokens": 3, "total_tokens": 12}
        }));
        let out = plug().call(req, &PlugOptions::default()).await;

        assert_eq!(out.state(), RequestState::Completed);
        assert_eq!(out.result().unwrap().content, "Hello!");
        assert_eq!(out.metadata().usage, Usage::new(9, 3));
    }

    #[tokio::test]
    async fn malformed_body_halts() {
        let out = plug()
            .call(request_with(json!({"unexpected": true})), &PlugOptions::default())
            .await;
        assert!(out.is_halted());
        assert_eq!(out.state(), RequestState::Error);
        assert_eq!(out.errors()[0].plug.as_deref(), Some("parse_response"));
    }

    #[tokio::test]
    async fn requires_response() {
        let req = Request::builder("openai")
            .message(ChatMessage::user("hi"))
            .model("gpt-4o-mini")
            .build();
        let out = plug().call(req, &PlugOptions::default()).await;
        assert_eq!(out.errors()[0].kind, ErrorKind::Configuration);
    }
}
