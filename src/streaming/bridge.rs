//! Producer/consumer bridge between an upstream stream and its consumer.
//!
//! The producer runs on its own task and pushes events into a bounded
//! channel; when the consumer lags, `send` suspends the producer and with it
//! the upstream read. Cancellation is shared: the consumer yields
//! [`ChatStreamEvent::Cancelled`] and ends, the producer drops the source.
//! With an idle timeout set, an upstream that goes quiet for longer than the
//! limit ends the stream with an error and releases whatever the producer holds.

use std::time::Duration;

use futures::{Stream, StreamExt};
use tokio::sync::mpsc;

use super::types::{ChatStreamEvent, ChatStreamHandle};
use crate::defaults;
use crate::error::{ErrorKind, ErrorRecord, LlmError};
use crate::utils::cancel::CancelHandle;

#[derive(Debug, Clone, Copy)]
pub struct StreamBridge {
    capacity: usize,
    idle_timeout: Option<Duration>,
}

impl Default for StreamBridge {
    fn default() -> Self {
        Self::new(defaults::streaming::CHANNEL_CAPACITY)
    }
}

impl StreamBridge {
    /// Bridge buffering at most `capacity` undelivered events.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            idle_timeout: None,
        }
    }

    /// Longest wait for the next upstream item. Time spent blocked on a
    /// slow consumer does not count.
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout
    }

    /// Start forwarding `source` and return the consumer handle.
    pub fn spawn<S>(&self, source: S) -> ChatStreamHandle
    where
        S: Stream<Item = Result<ChatStreamEvent, LlmError>> + Send + 'static,
    {
        self.spawn_with_guard(source, ())
    }

    /// Like [`spawn`](Self::spawn), keeping `guard` alive until the producer
    /// finishes. Used to hold a bulkhead permit for the life of the stream.
    pub fn spawn_with_guard<S, G>(&self, source: S, guard: G) -> ChatStreamHandle
    where
        S: Stream<Item = Result<ChatStreamEvent, LlmError>> + Send + 'static,
        G: Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.capacity);
        let cancel = CancelHandle::new();

        tokio::spawn(produce(source, tx, cancel.clone(), self.idle_timeout, guard));

        ChatStreamHandle::new(Box::pin(consume(rx, cancel.clone())), cancel)
    }
}

async fn produce<S, G>(
    source: S,
    tx: mpsc::Sender<ChatStreamEvent>,
    cancel: CancelHandle,
    idle_timeout: Option<Duration>,
    guard: G,
) where
    S: Stream<Item = Result<ChatStreamEvent, LlmError>> + Send + 'static,
{
    let _guard = guard;
    let mut source = Box::pin(source);

    loop {
        let pull = async {
            match idle_timeout {
                Some(limit) => tokio::time::timeout(limit, source.next())
                    .await
                    .map_err(|_| limit),
                None => Ok(source.next().await),
            }
        };
        let next = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            next = pull => next,
        };

        let event = match next {
            Err(limit) => {
                tracing::warn!(idle_ms = limit.as_millis() as u64, "upstream stream went idle");
                ChatStreamEvent::Error {
                    error: ErrorRecord::new(
                        ErrorKind::StreamInterrupted,
                        format!("upstream sent nothing within {}ms", limit.as_millis()),
                    ),
                }
            }
            Ok(Some(Ok(event))) => event,
            Ok(Some(Err(err))) => {
                tracing::warn!(error = %err, "upstream stream failed");
                ChatStreamEvent::Error {
                    error: ErrorRecord::new(ErrorKind::StreamInterrupted, err.to_string()),
                }
            }
            Ok(None) => ChatStreamEvent::end(None),
        };
        let terminal = event.is_terminal();

        tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            sent = tx.send(event) => {
                if sent.is_err() {
                    break;
                }
            }
        }
        if terminal {
            break;
        }
    }
    tracing::trace!("stream producer finished");
}

fn consume(
    mut rx: mpsc::Receiver<ChatStreamEvent>,
    cancel: CancelHandle,
) -> impl Stream<Item = ChatStreamEvent> + Send {
    async_stream::stream! {
        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    yield ChatStreamEvent::Cancelled;
                    break;
                }
                received = rx.recv() => match received {
                    Some(event) => {
                        let terminal = event.is_terminal();
                        yield event;
                        if terminal {
                            break;
                        }
                    }
                    None => {
                        yield ChatStreamEvent::Error {
                            error: ErrorRecord::new(
                                ErrorKind::StreamInterrupted,
                                "stream producer stopped without a terminal event",
                            ),
                        };
                        break;
                    }
                }
            }
        }
    }
}
