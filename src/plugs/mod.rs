//! Built-in plugs.
//!
//! The default chat pipeline is
//! `[ValidateInput, ResolveConfig, BuildPayload, CallUpstream, ParseResponse]`;
//! for streaming, `StreamUpstream` replaces the last two.

mod build_payload;
mod call_upstream;
mod parse_response;
mod resolve_config;
mod stream_upstream;
mod validate;

use std::collections::HashMap;
use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::Value;

pub use build_payload::BuildPayload;
pub use call_upstream::CallUpstream;
pub use parse_response::ParseResponse;
pub use resolve_config::ResolveConfig;
pub use stream_upstream::StreamUpstream;
pub use validate::ValidateInput;

use crate::config::{ProviderSettings, ResolvedConfig};
use crate::error::{ErrorKind, ErrorRecord, LlmError};
use crate::execution::http::HttpTransportRequest;
use crate::pipeline::PlugOptions;
use crate::resilience::ResilienceRegistry;
use crate::retry::{RetryPolicy, RetryReport};
use crate::types::Request;

/// `private` key holding the upstream URL built by [`BuildPayload`]
pub const UPSTREAM_URL_KEY: &str = "upstream.url";
/// `private` key holding the upstream JSON body built by [`BuildPayload`]
pub const UPSTREAM_BODY_KEY: &str = "upstream.body";

/// Deadline for one upstream call: the plug's own, else the provider's.
fn call_deadline(opts: &PlugOptions, config: &ResolvedConfig) -> Option<Duration> {
    opts.deadline.or(config.settings.timeout)
}

/// Everything an upstream plug needs before its first attempt.
struct PreparedCall {
    key: String,
    policy: RetryPolicy,
    deadline: Option<Duration>,
    transport_request: HttpTransportRequest,
}

/// Collect config, payload and headers from `request`, and make sure the
/// upstream's breaker and bulkhead exist with the provider's thresholds.
fn prepare_call(
    plug: &str,
    request: &Request,
    opts: &PlugOptions,
    registry: &ResilienceRegistry,
    retry_override: Option<&RetryPolicy>,
    headers: impl FnOnce(&ProviderSettings) -> Result<HeaderMap, LlmError>,
) -> Result<PreparedCall, ErrorRecord> {
    let config = request
        .config()
        .ok_or_else(|| missing(plug, "provider config"))?;
    let url = request
        .private()
        .get(UPSTREAM_URL_KEY)
        .and_then(Value::as_str)
        .ok_or_else(|| missing(plug, "upstream url"))?;
    let body = request
        .private()
        .get(UPSTREAM_BODY_KEY)
        .ok_or_else(|| missing(plug, "upstream body"))?;
    let headers =
        headers(&config.settings).map_err(|e| ErrorRecord::from_error(&e).with_plug(plug))?;

    let key = config.upstream_key().to_string();
    registry.breaker_with(&key, config.resilience.circuit_breaker.clone());
    registry.bulkhead_with(&key, config.resilience.bulkhead.clone());

    let deadline = call_deadline(opts, config);
    Ok(PreparedCall {
        key,
        policy: retry_override
            .cloned()
            .unwrap_or_else(|| config.resilience.retry.clone()),
        deadline,
        transport_request: HttpTransportRequest {
            request_id: request.id(),
            provider_id: request.provider().clone(),
            url: url.to_string(),
            headers,
            body: body.clone(),
            timeout: deadline,
        },
    })
}

/// Header pairs kept on the recorded response. Values that are not UTF-8
/// are dropped.
fn header_pairs(headers: &HeaderMap) -> HashMap<String, String> {
    headers
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| (name.as_str().to_string(), v.to_string()))
        })
        .collect()
}

fn missing(plug: &str, what: &str) -> ErrorRecord {
    ErrorRecord::new(
        ErrorKind::Configuration,
        format!("{what} not set; {plug} must run after the plug that sets it"),
    )
    .with_plug(plug)
}

/// Append every failed attempt to `request`. A final failure halts the
/// request; its record is the last entry.
fn apply_report<T>(request: Request, plug: &str, report: RetryReport<T>) -> (Request, Option<T>) {
    let RetryReport {
        outcome,
        mut failures,
        attempts,
    } = report;
    let mut request = request.update_metadata(|m| m.add_attempts(attempts));

    let final_failure = match outcome {
        Ok(_) => None,
        Err(_) => failures.pop(),
    };
    for failure in failures {
        request = request.push_error(
            ErrorRecord::from_error(&failure.error)
                .with_plug(plug)
                .with_attempt(failure.attempt),
        );
    }

    match (outcome, final_failure) {
        (Ok(value), _) => (request, Some(value)),
        (Err(err), failure) => {
            let attempt = failure.map_or(attempts, |f| f.attempt);
            tracing::warn!(plug, attempts, error = %err, "upstream call failed");
            let record = ErrorRecord::from_error(&err)
                .with_plug(plug)
                .with_attempt(attempt);
            (request.halt_with_error(record), None)
        }
    }
}
