//! Provider Adapter System
//!
//! An adapter owns everything provider-specific: the endpoint, the JSON
//! request body, how auth is presented, and how responses and stream chunks
//! map back to provider-agnostic types. The built-in plugs only ever talk to
//! providers through this trait.

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue};
use secrecy::ExposeSecret;
use serde_json::Value;

use crate::config::ProviderSettings;
use crate::error::LlmError;
use crate::streaming::ChatStreamEvent;
use crate::types::{ChatResult, Request, UpstreamResponse};

pub mod openai_compatible;

pub use openai_compatible::OpenAiCompatibleAdapter;

/// Request body and endpoint path for one upstream call.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamPayload {
    /// Path appended to the base URL, e.g. `/chat/completions`
    pub endpoint: String,
    pub body: Value,
}

/// One server-sent event as received.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SseEvent {
    pub event: String,
    pub data: String,
    pub id: String,
}

impl SseEvent {
    pub fn data(data: impl Into<String>) -> Self {
        Self {
            event: "message".to_string(),
            data: data.into(),
            id: String::new(),
        }
    }
}

pub trait ProviderAdapter: Send + Sync {
    fn provider_id(&self) -> &str;

    /// Base URL used when the resolved settings carry none
    fn default_base_url(&self) -> &str;

    fn build_payload(&self, request: &Request) -> Result<UpstreamPayload, LlmError>;

    fn parse_response(&self, response: &UpstreamResponse) -> Result<ChatResult, LlmError>;

    /// Events carried by one SSE event; empty for keep-alives.
    fn parse_stream_event(&self, event: &SseEvent) -> Result<Vec<ChatStreamEvent>, LlmError>;

    /// Headers for one call
    fn request_headers(&self, settings: &ProviderSettings) -> Result<HeaderMap, LlmError> {
        bearer_headers(settings)
    }
}

/// Bearer auth from the API key plus any configured extra headers.
pub fn bearer_headers(settings: &ProviderSettings) -> Result<HeaderMap, LlmError> {
    let mut headers = HeaderMap::new();
    if let Some(key) = &settings.api_key {
        let mut value = HeaderValue::from_str(&format!("Bearer {}", key.expose_secret()))
            .map_err(|_| {
                LlmError::ConfigurationError("API key is not a valid header value".into())
            })?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }
    for (name, value) in &settings.headers {
        let name = HeaderName::from_bytes(name.as_bytes())
            .map_err(|_| LlmError::ConfigurationError(format!("invalid header name '{name}'")))?;
        let value = HeaderValue::from_str(value).map_err(|_| {
            LlmError::ConfigurationError(format!("invalid value for header '{name}'"))
        })?;
        headers.insert(name, value);
    }
    Ok(headers)
}

/// Join a base URL and an endpoint path without doubling slashes.
pub fn join_url(base: &str, endpoint: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        endpoint.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_url_normalises_slashes() {
        assert_eq!(
            join_url("https://api.example.com/v1/", "/chat/completions"),
            "https://api.example.com/v1/chat/completions"
        );
        assert_eq!(join_url("http://h", "x"), "http://h/x");
    }

    #[test]
    fn request_headers_mark_auth_sensitive() {
        let adapter = OpenAiCompatibleAdapter::new();
        let settings = ProviderSettings::new()
            .with_api_key("sk-1")
            .with_header("x-org", "acme");
        let headers = adapter.request_headers(&settings).unwrap();
        let auth = headers.get(AUTHORIZATION).unwrap();
        assert!(auth.is_sensitive());
        assert_eq!(auth.to_str().unwrap(), "Bearer sk-1");
        assert_eq!(headers.get("x-org").unwrap(), "acme");
    }
}
