//! Server-sent events to [`ChatStreamEvent`]s.

use std::sync::Arc;

use eventsource_stream::Eventsource;
use futures::StreamExt;

use super::types::{ChatStream, ChatStreamEvent};
use crate::adapters::{ProviderAdapter, SseEvent};
use crate::error::LlmError;
use crate::execution::http::ByteStream;

/// Parse an HTTP body as SSE and let `adapter` turn each event into
/// stream events.
///
/// The stream ends after the first terminal event. A transport or framing
/// error ends it with `Err(StreamInterrupted)`.
pub fn sse_event_stream(body: ByteStream, adapter: Arc<dyn ProviderAdapter>) -> ChatStream {
    let stream = async_stream::stream! {
        let mut events = body.eventsource();
        while let Some(item) = events.next().await {
            let event = match item {
                Ok(event) => SseEvent {
                    event: event.event,
                    data: event.data,
                    id: event.id,
                },
                Err(err) => {
                    yield Err(LlmError::StreamInterrupted(err.to_string()));
                    return;
                }
            };

            match adapter.parse_stream_event(&event) {
                Ok(parsed) => {
                    for parsed_event in parsed {
                        let terminal = parsed_event.is_terminal();
                        yield Ok(parsed_event);
                        if terminal {
                            return;
                        }
                    }
                }
                Err(err) => {
                    yield Err(err);
                    return;
                }
            }
        }
    };
    Box::pin(stream)
}

/// Events parsed from a fixed SSE payload, for adapters and tests that
/// already hold the whole body.
pub async fn parse_sse_body(
    body: &str,
    adapter: Arc<dyn ProviderAdapter>,
) -> Result<Vec<ChatStreamEvent>, LlmError> {
    let bytes = bytes::Bytes::copy_from_slice(body.as_bytes());
    let source: ByteStream = Box::pin(futures::stream::iter([Ok::<_, LlmError>(bytes)]));
    let mut stream = sse_event_stream(source, adapter);
    let mut out = Vec::new();
    while let Some(event) = stream.next().await {
        out.push(event?);
    }
    Ok(out)
}
