//! HTTP failure classification.

use std::time::Duration;

use chrono::{DateTime, Utc};
use reqwest::header::HeaderMap;

use crate::error::LlmError;

const REQUEST_ID_HEADERS: [&str; 5] = [
    "x-request-id",
    "x-openai-request-id",
    "x-trace-id",
    "traceparent",
    "x-correlation-id",
];

/// Map a non-success HTTP response to a typed error.
///
/// 429 carries the provider's `Retry-After` (or `retry-after-ms`) hint so the
/// retry policy can honour it. 5xx keep their status as `ApiError`, which the
/// classifier treats as transient.
pub fn classify_http_error(
    provider_id: &str,
    status: u16,
    body_text: &str,
    headers: &HeaderMap,
) -> LlmError {
    let request_ids: Vec<String> = REQUEST_ID_HEADERS
        .iter()
        .filter_map(|name| header_str(headers, name).map(|v| format!("{name}={v}")))
        .collect();
    let ids_suffix = if request_ids.is_empty() {
        String::new()
    } else {
        format!(" ids=[{}]", request_ids.join(","))
    };
    let body_sample: String = body_text.chars().take(200).collect();
    let message = provider_message(body_text).unwrap_or_else(|| body_sample.clone());

    match status {
        429 => LlmError::RateLimitError {
            message: format!("provider={provider_id} http=429{ids_suffix} {message}"),
            retry_after: retry_after(headers),
        },
        401 => LlmError::AuthenticationError(format!(
            "provider={provider_id} unauthorized{ids_suffix} {message}"
        )),
        400 | 403 if looks_rate_limited(body_text) => LlmError::RateLimitError {
            message: format!("provider={provider_id} rate limited{ids_suffix} {message}"),
            retry_after: retry_after(headers),
        },
        _ => {
            let details = match serde_json::from_str::<serde_json::Value>(body_text) {
                Ok(json) => serde_json::json!({
                    "status": status,
                    "provider": provider_id,
                    "response": json,
                    "request_ids": request_ids,
                }),
                Err(_) => serde_json::json!({
                    "status": status,
                    "provider": provider_id,
                    "raw": body_sample,
                    "request_ids": request_ids,
                }),
            };
            let message = if message.trim().is_empty() {
                "api error".to_string()
            } else {
                message
            };
            LlmError::api_error_with_details(status, message, details)
        }
    }
}

/// Retry hint from `retry-after-ms` or `Retry-After` (seconds or HTTP date).
pub fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    let ms = header_str(headers, "retry-after-ms")
        .and_then(|v| v.trim().parse::<f64>().ok())
        .filter(|ms| ms.is_finite() && *ms >= 0.0);
    if let Some(ms) = ms {
        return Some(Duration::from_millis(ms as u64));
    }

    let raw = header_str(headers, "retry-after")?;
    let raw = raw.trim();
    if let Ok(secs) = raw.parse::<f64>() {
        return Duration::try_from_secs_f64(secs).ok();
    }
    let at = DateTime::parse_from_rfc2822(raw).ok()?.with_timezone(&Utc);
    Some((at - Utc::now()).to_std().unwrap_or(Duration::ZERO))
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

/// `error.message` from an OpenAI-style error envelope.
fn provider_message(body_text: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body_text).ok()?;
    json.pointer("/error/message")
        .or_else(|| json.get("message"))
        .and_then(|m| m.as_str())
        .map(str::to_string)
}

fn looks_rate_limited(body_text: &str) -> bool {
    let lower = body_text.to_lowercase();
    lower.contains("rate limit")
        || lower.contains("rate_limit_exceeded")
        || lower.contains("resource_exhausted")
        || lower.contains("ratelimitexceeded")
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn rate_limit_keeps_retry_after_seconds() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("3"));
        match classify_http_error("openai", 429, "{}", &headers) {
            LlmError::RateLimitError { retry_after, .. } => {
                assert_eq!(retry_after, Some(Duration::from_secs(3)))
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn retry_after_ms_takes_precedence() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("10"));
        headers.insert("retry-after-ms", HeaderValue::from_static("250"));
        assert_eq!(retry_after(&headers), Some(Duration::from_millis(250)));
    }

    #[test]
    fn unrepresentable_retry_after_is_dropped() {
        let mut headers = HeaderMap::new();
        headers.insert("retry-after", HeaderValue::from_static("1e30"));
        match classify_http_error("openai", 429, "{}", &headers) {
            LlmError::RateLimitError { retry_after, .. } => assert_eq!(retry_after, None),
            other => panic!("expected rate limit, got {other:?}"),
        }

        headers.insert("retry-after", HeaderValue::from_static("-4"));
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn past_http_date_means_now() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "retry-after",
            HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), Some(Duration::ZERO));
    }

    #[test]
    fn unauthorized_is_authentication_error() {
        let body = r#"{"error":{"message":"Incorrect API key provided"}}"#;
        let err = classify_http_error("openai", 401, body, &HeaderMap::new());
        match err {
            LlmError::AuthenticationError(msg) => assert!(msg.contains("Incorrect API key")),
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn server_error_keeps_status_and_body() {
        let mut headers = HeaderMap::new();
        headers.insert("x-request-id", HeaderValue::from_static("req_1"));
        let err = classify_http_error("openai", 502, "<html>bad gateway</html>", &headers);
        match err {
            LlmError::ApiError { code, details, .. } => {
                assert_eq!(code, 502);
                let details = details.unwrap();
                assert_eq!(details["raw"], "<html>bad gateway</html>");
                assert_eq!(details["request_ids"][0], "x-request-id=req_1");
            }
            other => panic!("unexpected error variant: {other:?}"),
        }
    }

    #[test]
    fn quota_envelope_on_403_is_rate_limited() {
        let body = r#"{"error":{"status":"RESOURCE_EXHAUSTED","message":"slow down"}}"#;
        let err = classify_http_error("gemini", 403, body, &HeaderMap::new());
        assert!(matches!(err, LlmError::RateLimitError { .. }));
    }
}
