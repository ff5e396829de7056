//! HTTP transport abstraction.
//!
//! Plugs never talk to `reqwest` directly. They hand a fully built request to
//! an [`HttpTransport`], which makes testing with scripted transports and
//! swapping the client straightforward.

use std::pin::Pin;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use reqwest::header::HeaderMap;

use crate::error::LlmError;
use crate::types::{ProviderId, RequestId};

/// Body of a streaming response.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, LlmError>> + Send>>;

/// Transport-level request data for JSON POST requests.
#[derive(Debug, Clone)]
pub struct HttpTransportRequest {
    pub request_id: RequestId,
    pub provider_id: ProviderId,
    pub url: String,
    pub headers: HeaderMap,
    pub body: serde_json::Value,
    /// Limit for the whole exchange, body included
    pub timeout: Option<Duration>,
}

/// Transport-level response data.
#[derive(Debug, Clone)]
pub struct HttpTransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: Vec<u8>,
}

impl HttpTransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json(&self) -> Result<serde_json::Value, LlmError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            LlmError::ParseError(format!("upstream returned invalid JSON: {e}"))
        })
    }
}

/// Streaming response: status and headers arrive first, the body follows.
pub struct HttpStreamResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: ByteStream,
}

impl HttpStreamResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Drain the body as text. Used to classify a failed handshake.
    pub async fn into_text(self) -> String {
        let mut body = self.body;
        let mut buf = Vec::new();
        while let Some(chunk) = body.next().await {
            match chunk {
                Ok(bytes) => buf.extend_from_slice(&bytes),
                Err(_) => break,
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl std::fmt::Debug for HttpStreamResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpStreamResponse")
            .field("status", &self.status)
            .field("headers", &self.headers)
            .finish_non_exhaustive()
    }
}

/// Custom HTTP transport.
///
/// Any status code is a successful exchange at this level; callers decide what
/// a non-2xx status means. `Err` is reserved for failures to get a response at
/// all (connect, timeout, TLS, malformed framing).
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn execute_json(
        &self,
        request: HttpTransportRequest,
    ) -> Result<HttpTransportResponse, LlmError>;

    async fn execute_stream(
        &self,
        request: HttpTransportRequest,
    ) -> Result<HttpStreamResponse, LlmError>;
}
