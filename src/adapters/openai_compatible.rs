//! OpenAI Compatible Provider Adapter
//!
//! Chat Completions wire format, which most hosted and self-hosted providers
//! (OpenAI, DeepSeek, Groq, OpenRouter, vLLM, Ollama) accept.

use serde::Deserialize;
use serde_json::{Map, Value, json};

use super::{ProviderAdapter, SseEvent, UpstreamPayload};
use crate::error::LlmError;
use crate::streaming::ChatStreamEvent;
use crate::types::{ChatResult, Request, UpstreamResponse, Usage};

const CHAT_ENDPOINT: &str = "/chat/completions";

#[derive(Debug, Clone)]
pub struct OpenAiCompatibleAdapter {
    provider_id: String,
    base_url: String,
}

impl Default for OpenAiCompatibleAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl OpenAiCompatibleAdapter {
    pub fn new() -> Self {
        Self {
            provider_id: "openai".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
        }
    }

    pub fn with_provider_id(mut self, provider_id: impl Into<String>) -> Self {
        self.provider_id = provider_id.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

#[derive(Debug, Deserialize)]
struct WireUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: u32,
}

impl From<WireUsage> for Usage {
    fn from(u: WireUsage) -> Self {
        Usage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens.max(u.prompt_tokens + u.completion_tokens),
        }
    }
}

#[derive(Debug, Deserialize)]
struct WireMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChoice {
    message: WireMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireResponse {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    model: Option<String>,
    #[serde(default)]
    choices: Vec<WireChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

#[derive(Debug, Deserialize)]
struct WireDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChunkChoice {
    #[serde(default)]
    index: Option<usize>,
    #[serde(default)]
    delta: Option<WireDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct WireChunk {
    #[serde(default)]
    choices: Vec<WireChunkChoice>,
    #[serde(default)]
    usage: Option<WireUsage>,
}

fn error_message(body: &Value) -> Option<&str> {
    body.get("error")?.get("message")?.as_str()
}

impl ProviderAdapter for OpenAiCompatibleAdapter {
    fn provider_id(&self) -> &str {
        &self.provider_id
    }

    fn default_base_url(&self) -> &str {
        &self.base_url
    }

    fn build_payload(&self, request: &Request) -> Result<UpstreamPayload, LlmError> {
        if request.input().is_empty() {
            return Err(LlmError::InvalidInput("messages must not be empty".into()));
        }
        let options = request.options();

        let messages: Vec<Value> = request
            .input()
            .iter()
            .map(|m| {
                let mut msg = json!({ "role": m.role.as_str(), "content": m.content });
                if let Some(name) = &m.name {
                    msg["name"] = Value::String(name.clone());
                }
                msg
            })
            .collect();

        let mut body = Map::new();
        // Extra params go in first so the typed options always win.
        for (k, v) in &options.extra {
            body.insert(k.clone(), v.clone());
        }
        body.insert("model".into(), Value::String(options.model.clone()));
        body.insert("messages".into(), Value::Array(messages));
        if let Some(t) = options.temperature {
            body.insert("temperature".into(), json!(t));
        }
        if let Some(p) = options.top_p {
            body.insert("top_p".into(), json!(p));
        }
        if let Some(max) = options.max_tokens {
            body.insert("max_tokens".into(), json!(max));
        }
        if !options.stop.is_empty() {
            body.insert("stop".into(), json!(options.stop));
        }
        if options.stream {
            body.insert("stream".into(), Value::Bool(true));
        }

        Ok(UpstreamPayload {
            endpoint: CHAT_ENDPOINT.to_string(),
            body: Value::Object(body),
        })
    }

    fn parse_response(&self, response: &UpstreamResponse) -> Result<ChatResult, LlmError> {
        if let Some(message) = error_message(&response.body) {
            return Err(LlmError::api_error_with_details(
                response.status,
                message,
                response.body.clone(),
            ));
        }
        let wire: WireResponse = serde_json::from_value(response.body.clone()).map_err(|e| {
            LlmError::ParseError(format!("Invalid chat completion response: {e}"))
        })?;
        let choice = wire.choices.into_iter().next().ok_or_else(|| {
            LlmError::ParseError("chat completion response has no choices".into())
        })?;

        Ok(ChatResult {
            id: wire.id,
            model: wire.model,
            content: choice.message.content.unwrap_or_default(),
            finish_reason: choice.finish_reason,
            usage: wire.usage.map(Usage::from),
        })
    }

    fn parse_stream_event(&self, event: &SseEvent) -> Result<Vec<ChatStreamEvent>, LlmError> {
        let data = event.data.trim();
        if data.is_empty() {
            return Ok(vec![]);
        }
        if data == "[DONE]" {
            return Ok(vec![ChatStreamEvent::end(None)]);
        }

        let json: Value = serde_json::from_str(data)
            .map_err(|e| LlmError::ParseError(format!("Failed to parse SSE JSON: {e}")))?;
        if let Some(message) = error_message(&json) {
            return Err(LlmError::StreamInterrupted(message.to_string()));
        }
        let chunk: WireChunk = serde_json::from_value(json)
            .map_err(|e| LlmError::ParseError(format!("Invalid chat completion chunk: {e}")))?;

        let mut out = Vec::new();
        let mut finish = None;
        for choice in chunk.choices {
            let content = choice
                .delta
                .and_then(|d| d.content)
                .filter(|c| !c.is_empty());
            if let Some(content) = content {
                out.push(ChatStreamEvent::ContentDelta {
                    delta: content,
                    index: choice.index,
                });
            }
            if choice.finish_reason.is_some() {
                finish = choice.finish_reason;
            }
        }
        if let Some(usage) = chunk.usage {
            out.push(ChatStreamEvent::UsageUpdate {
                usage: usage.into(),
            });
        }
        if finish.is_some() {
            out.push(ChatStreamEvent::end(finish));
        }
        Ok(out)
    }
}
