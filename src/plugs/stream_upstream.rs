use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{PreparedCall, apply_report, prepare_call};
use crate::adapters::ProviderAdapter;
use crate::error::LlmError;
use crate::execution::http::{
    HttpStreamResponse, HttpTransport, HttpTransportRequest, classify_http_error,
};
use crate::pipeline::{Plug, PlugOptions};
use crate::resilience::{BulkheadPermit, ResilienceRegistry, outcome_of};
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::streaming::{StreamBridge, sse_event_stream};
use crate::types::{Request, RequestState};

/// Opens a streaming upstream call and attaches a [`ChatStreamHandle`] to
/// the request.
///
/// Only the handshake is retried and counted by the breaker. Once the first
/// bytes arrive the bulkhead slot stays taken until the stream finishes or is
/// cancelled. The call deadline then bounds each wait for the next chunk,
/// unless the bridge carries its own idle timeout.
///
/// [`ChatStreamHandle`]: crate::streaming::ChatStreamHandle
#[derive(Clone)]
pub struct StreamUpstream {
    transport: Arc<dyn HttpTransport>,
    registry: Arc<ResilienceRegistry>,
    adapter: Arc<dyn ProviderAdapter>,
    bridge: StreamBridge,
    retry_policy: Option<RetryPolicy>,
}

impl StreamUpstream {
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        registry: Arc<ResilienceRegistry>,
        adapter: Arc<dyn ProviderAdapter>,
    ) -> Self {
        Self {
            transport,
            registry,
            adapter,
            bridge: StreamBridge::default(),
            retry_policy: None,
        }
    }

    pub fn with_bridge(mut self, bridge: StreamBridge) -> Self {
        self.bridge = bridge;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }
}

impl std::fmt::Debug for StreamUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamUpstream")
            .field("provider", &self.adapter.provider_id())
            .field("bridge", &self.bridge)
            .finish_non_exhaustive()
    }
}

async fn open_stream(
    transport: &dyn HttpTransport,
    request: HttpTransportRequest,
    deadline: Option<Duration>,
) -> Result<HttpStreamResponse, LlmError> {
    let provider = request.provider_id.clone();
    let handshake = transport.execute_stream(request);
    let response = match deadline {
        Some(limit) => tokio::time::timeout(limit, handshake).await.map_err(|_| {
            LlmError::TimeoutError(format!(
                "stream handshake did not complete within {}ms",
                limit.as_millis()
            ))
        })??,
        None => handshake.await?,
    };

    if !response.is_success() {
        let status = response.status;
        let headers = response.headers.clone();
        let text = response.into_text().await;
        return Err(classify_http_error(provider.as_str(), status, &text, &headers));
    }
    Ok(response)
}

#[async_trait]
impl Plug for StreamUpstream {
    fn name(&self) -> &str {
        "stream_upstream"
    }

    async fn call(&self, request: Request, opts: &PlugOptions) -> Request {
        let prepared = prepare_call(
            self.name(),
            &request,
            opts,
            &self.registry,
            self.retry_policy.as_ref(),
            |settings| self.adapter.request_headers(settings),
        );
        let PreparedCall {
            key,
            policy,
            deadline,
            mut transport_request,
        } = match prepared {
            Ok(prepared) => prepared,
            Err(record) => return request.halt_with_error(record),
        };
        if let Value::Object(body) = &mut transport_request.body {
            body.insert("stream".to_string(), Value::Bool(true));
        }

        let request = request.transition(RequestState::Executing);
        let report = RetryExecutor::new(policy)
            .execute(|attempt| {
                let registry = Arc::clone(&self.registry);
                let transport = Arc::clone(&self.transport);
                let transport_request = transport_request.clone();
                let key = key.clone();
                async move {
                    tracing::debug!(upstream = %key, attempt, "opening upstream stream");
                    let (breaker, bulkhead) = registry.admit(&key).await?;
                    let result = open_stream(transport.as_ref(), transport_request, deadline).await;
                    breaker.record(outcome_of(&result));
                    result.map(|response| (response, bulkhead))
                }
            })
            .await;

        match apply_report::<(HttpStreamResponse, BulkheadPermit)>(request, self.name(), report) {
            (request, Some((response, permit))) => {
                let events = sse_event_stream(response.body, Arc::clone(&self.adapter));
                let bridge = match (self.bridge.idle_timeout(), deadline) {
                    (None, Some(limit)) => self.bridge.with_idle_timeout(limit),
                    _ => self.bridge,
                };
                let handle = bridge.spawn_with_guard(events, permit);
                request
                    .put_stream(handle)
                    .transition(RequestState::Streaming)
            }
            (request, None) => request,
        }
    }
}
