use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::HeaderMap;

use super::{PreparedCall, apply_report, header_pairs, prepare_call};
use crate::adapters::{ProviderAdapter, bearer_headers};
use crate::config::ProviderSettings;
use crate::error::LlmError;
use crate::execution::http::{HttpTransport, HttpTransportRequest, classify_http_error};
use crate::pipeline::{Plug, PlugOptions};
use crate::resilience::ResilienceRegistry;
use crate::retry::{RetryExecutor, RetryPolicy};
use crate::types::{Request, RequestState, UpstreamResponse};

/// Sends the built payload upstream and stores the raw response.
///
/// Every attempt goes through the upstream's breaker and bulkhead, bounded by
/// the call deadline. Failed attempts are retried per the retry policy and
/// each one is recorded on the request.
#[derive(Clone)]
pub struct CallUpstream {
    transport: Arc<dyn HttpTransport>,
    registry: Arc<ResilienceRegistry>,
    adapter: Option<Arc<dyn ProviderAdapter>>,
    retry_policy: Option<RetryPolicy>,
}

impl CallUpstream {
    pub fn new(transport: Arc<dyn HttpTransport>, registry: Arc<ResilienceRegistry>) -> Self {
        Self {
            transport,
            registry,
            adapter: None,
            retry_policy: None,
        }
    }

    /// Let `adapter` build the request headers instead of plain bearer auth.
    pub fn with_adapter(mut self, adapter: Arc<dyn ProviderAdapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Override the retry policy from the provider's resilience config.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    fn headers(&self, settings: &ProviderSettings) -> Result<HeaderMap, LlmError> {
        match &self.adapter {
            Some(adapter) => adapter.request_headers(settings),
            None => bearer_headers(settings),
        }
    }
}

impl std::fmt::Debug for CallUpstream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallUpstream")
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

async fn send_json(
    transport: &dyn HttpTransport,
    request: HttpTransportRequest,
) -> Result<UpstreamResponse, LlmError> {
    let provider = request.provider_id.clone();
    let response = transport.execute_json(request).await?;
    if !response.is_success() {
        return Err(classify_http_error(
            provider.as_str(),
            response.status,
            &response.text(),
            &response.headers,
        ));
    }
    Ok(UpstreamResponse {
        status: response.status,
        headers: header_pairs(&response.headers),
        body: response.json()?,
    })
}

#[async_trait]
impl Plug for CallUpstream {
    fn name(&self) -> &str {
        "call_upstream"
    }

    async fn call(&self, request: Request, opts: &PlugOptions) -> Request {
        let prepared = prepare_call(
            self.name(),
            &request,
            opts,
            &self.registry,
            self.retry_policy.as_ref(),
            |settings| self.headers(settings),
        );
        let PreparedCall {
            key,
            policy,
            deadline,
            transport_request,
        } = match prepared {
            Ok(prepared) => prepared,
            Err(record) => return request.halt_with_error(record),
        };

        let request = request.transition(RequestState::Executing);
        let report = RetryExecutor::new(policy)
            .execute(|attempt| {
                let registry = Arc::clone(&self.registry);
                let transport = Arc::clone(&self.transport);
                let transport_request = transport_request.clone();
                let key = key.clone();
                async move {
                    tracing::debug!(upstream = %key, attempt, "calling upstream");
                    registry
                        .execute(&key, deadline, || {
                            send_json(transport.as_ref(), transport_request)
                        })
                        .await
                }
            })
            .await;

        match apply_report(request, self.name(), report) {
            (request, Some(response)) => request.put_response(response),
            (request, None) => request,
        }
    }
}
