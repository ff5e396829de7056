use async_trait::async_trait;
use futures::StreamExt;

use super::transport::{
    HttpStreamResponse, HttpTransport, HttpTransportRequest, HttpTransportResponse,
};
use crate::defaults;
use crate::error::LlmError;

/// [`HttpTransport`] backed by a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// Client with the crate's user agent and default request timeout.
    pub fn with_defaults() -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .user_agent(defaults::http::USER_AGENT)
            .timeout(defaults::http::REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::ConfigurationError(format!("failed to build HTTP client: {e}")))?;
        Ok(Self::new(client))
    }

    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }

    fn build(&self, request: &HttpTransportRequest, with_timeout: bool) -> reqwest::RequestBuilder {
        let mut builder = self
            .client
            .post(&request.url)
            .headers(request.headers.clone())
            .json(&request.body);
        if let (true, Some(timeout)) = (with_timeout, request.timeout) {
            builder = builder.timeout(timeout);
        }
        builder
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn execute_json(
        &self,
        request: HttpTransportRequest,
    ) -> Result<HttpTransportResponse, LlmError> {
        tracing::debug!(
            request_id = %request.request_id,
            provider = %request.provider_id,
            url = %request.url,
            "sending upstream request"
        );
        let response = self.build(&request, true).send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?.to_vec();
        Ok(HttpTransportResponse {
            status,
            headers,
            body,
        })
    }

    async fn execute_stream(
        &self,
        request: HttpTransportRequest,
    ) -> Result<HttpStreamResponse, LlmError> {
        tracing::debug!(
            request_id = %request.request_id,
            provider = %request.provider_id,
            url = %request.url,
            "opening upstream stream"
        );
        // A whole-response timeout would cut long generations short; the
        // handshake deadline is enforced by the caller instead.
        let response = self.build(&request, false).send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(|e| LlmError::StreamInterrupted(e.to_string())));
        Ok(HttpStreamResponse {
            status,
            headers,
            body: Box::pin(body),
        })
    }
}
