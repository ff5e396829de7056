//! Core Streaming Types

use std::pin::Pin;
use std::task::{Context, Poll};

use futures::{Stream, StreamExt};
use serde::Serialize;

use crate::error::{ErrorRecord, LlmError};
use crate::types::Usage;
use crate::utils::cancel::CancelHandle;

/// One event delivered to a stream consumer.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChatStreamEvent {
    /// Incremental text
    ContentDelta { delta: String, index: Option<usize> },
    /// Token usage reported mid-stream or at the end
    UsageUpdate { usage: Usage },
    /// Provider-specific event passed through untouched
    Custom {
        event_type: String,
        data: serde_json::Value,
    },
    /// Upstream finished normally
    StreamEnd { finish_reason: Option<String> },
    /// Upstream failed after the stream started
    Error { error: ErrorRecord },
    /// Consumer or caller cancelled the stream
    Cancelled,
}

impl ChatStreamEvent {
    pub fn delta(text: impl Into<String>) -> Self {
        ChatStreamEvent::ContentDelta {
            delta: text.into(),
            index: None,
        }
    }

    pub fn end(finish_reason: Option<String>) -> Self {
        ChatStreamEvent::StreamEnd { finish_reason }
    }

    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ChatStreamEvent::StreamEnd { .. }
                | ChatStreamEvent::Error { .. }
                | ChatStreamEvent::Cancelled
        )
    }
}

/// Upstream-side stream, before it is bridged to a consumer.
pub type ChatStream = Pin<Box<dyn Stream<Item = Result<ChatStreamEvent, LlmError>> + Send>>;

/// Consumer-side stream of events. Failures arrive as
/// [`ChatStreamEvent::Error`] rather than as `Err` items.
pub type EventStream = Pin<Box<dyn Stream<Item = ChatStreamEvent> + Send>>;

/// Chat stream with first-class cancellation handle.
///
/// The stream ends after the first terminal event and stays ended. Dropping
/// the handle cancels the producer, which closes the upstream connection.
pub struct ChatStreamHandle {
    stream: EventStream,
    cancel: CancelHandle,
    finished: bool,
}

impl ChatStreamHandle {
    pub fn new(stream: EventStream, cancel: CancelHandle) -> Self {
        Self {
            stream,
            cancel,
            finished: false,
        }
    }

    /// Request cancellation. The consumer sees [`ChatStreamEvent::Cancelled`]
    /// next, then the end of the stream.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Clone of the cancel handle, for cancelling from another task.
    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    /// Drain the stream, concatenating content deltas.
    ///
    /// Fails with the stream's error or [`LlmError::Cancelled`] if the stream
    /// did not end normally.
    pub async fn collect_text(mut self) -> Result<String, LlmError> {
        let mut text = String::new();
        while let Some(event) = self.next().await {
            match event {
                ChatStreamEvent::ContentDelta { delta, .. } => text.push_str(&delta),
                ChatStreamEvent::StreamEnd { .. } => return Ok(text),
                ChatStreamEvent::Error { error } => {
                    return Err(LlmError::StreamInterrupted(error.message));
                }
                ChatStreamEvent::Cancelled => return Err(LlmError::Cancelled),
                ChatStreamEvent::UsageUpdate { .. } | ChatStreamEvent::Custom { .. } => {}
            }
        }
        Ok(text)
    }
}

impl Stream for ChatStreamHandle {
    type Item = ChatStreamEvent;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.finished {
            return Poll::Ready(None);
        }
        match self.stream.as_mut().poll_next(cx) {
            Poll::Ready(Some(event)) => {
                if event.is_terminal() {
                    self.finished = true;
                }
                Poll::Ready(Some(event))
            }
            Poll::Ready(None) => {
                self.finished = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ChatStreamHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl std::fmt::Debug for ChatStreamHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatStreamHandle")
            .field("cancelled", &self.cancel.is_cancelled())
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
