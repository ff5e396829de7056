use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use relaykit::execution::http::{HttpTransport, HttpTransportRequest, ReqwestTransport};
use relaykit::prelude::*;
use relaykit::types::RequestId;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use serde_json::json;
use wiremock::matchers::{body_partial_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn transport_request(url: String) -> HttpTransportRequest {
    let mut headers = HeaderMap::new();
    headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer sk-wire"));
    HttpTransportRequest {
        request_id: RequestId::new(),
        provider_id: "openai".into(),
        url,
        headers,
        body: json!({"model": "gpt-4o-mini"}),
        timeout: Some(Duration::from_secs(5)),
    }
}

#[tokio::test]
async fn posts_json_and_returns_any_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-wire"))
        .and(body_partial_json(json!({"model": "gpt-4o-mini"})))
        .respond_with(
            ResponseTemplate::new(503)
                .insert_header("x-request-id", "req-42")
                .set_body_json(json!({"error": {"message": "overloaded"}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let transport = ReqwestTransport::with_defaults().unwrap();
    let response = transport
        .execute_json(transport_request(format!(
            "{}/v1/chat/completions",
            server.uri()
        )))
        .await
        .unwrap();

    assert_eq!(response.status, 503);
    assert!(!response.is_success());
    assert_eq!(response.headers["x-request-id"], "req-42");
    assert_eq!(response.json().unwrap()["error"]["message"], "overloaded");
}

#[tokio::test]
async fn slow_upstream_hits_the_request_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let mut request = transport_request(format!("{}/v1/chat/completions", server.uri()));
    request.timeout = Some(Duration::from_millis(50));
    let err = ReqwestTransport::new(reqwest::Client::new())
        .execute_json(request)
        .await
        .unwrap_err();

    assert!(classify(&err).is_retryable(), "got {err:?}");
}

#[tokio::test]
async fn streams_the_body_in_chunks() {
    let server = MockServer::start().await;
    let body = "data: {\"choices\":[{\"index\":0,\"delta\":{\"content\":\"Hi\"}}]}\n\ndata: [DONE]\n\n";
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .insert_header("content-type", "text/event-stream")
                .set_body_string(body),
        )
        .mount(&server)
        .await;

    let response = ReqwestTransport::new(reqwest::Client::new())
        .execute_stream(transport_request(format!(
            "{}/v1/chat/completions",
            server.uri()
        )))
        .await
        .unwrap();
    assert!(response.is_success());

    let mut received = Vec::new();
    let mut stream = response.body;
    while let Some(chunk) = stream.next().await {
        received.extend_from_slice(&chunk.unwrap());
    }
    assert_eq!(String::from_utf8(received).unwrap(), body);
}

#[tokio::test]
async fn full_pipeline_against_a_mock_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/v1/chat/completions"))
        .and(header("authorization", "Bearer sk-mock"))
        .and(body_partial_json(json!({
            "model": "gpt-4o-mini",
            "messages": [{"role": "user", "content": "ping"}]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "id": "chatcmpl-9",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": "pong"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 3, "completion_tokens": 1, "total_tokens": 4}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let adapter: Arc<dyn ProviderAdapter> = Arc::new(OpenAiCompatibleAdapter::new());
    let config = StaticConfig::new().with_provider(
        "openai",
        ProviderSettings::new()
            .with_base_url(format!("{}/v1", server.uri()))
            .with_api_key("sk-mock"),
    );
    let pipeline = Pipeline::new()
        .plug(ValidateInput::new())
        .plug(ResolveConfig::new(config))
        .plug(BuildPayload::new(Arc::clone(&adapter)))
        .plug(CallUpstream::new(
            Arc::new(ReqwestTransport::with_defaults().unwrap()),
            Arc::new(ResilienceRegistry::default()),
        ))
        .plug(ParseResponse::new(adapter));

    let request = Request::builder("openai")
        .message(ChatMessage::user("ping"))
        .model("gpt-4o-mini")
        .build();
    let done = pipeline.run(request).await.unwrap();

    assert_eq!(done.state(), RequestState::Completed);
    let result = done.result().unwrap();
    assert_eq!(result.content, "pong");
    assert_eq!(result.finish_reason.as_deref(), Some("stop"));
    assert_eq!(done.metadata().usage.total_tokens, 4);
    assert_eq!(done.response().unwrap().status, 200);
}
