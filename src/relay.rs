//! Streaming relay: upstream SSE in, plain text out
//!
//! [`relay`] opens the upstream request and hands back a [`RelayStream`]
//! right away. A spawned pump reads upstream chunks, frames them with
//! [`SseParser`], filters them through [`DeltaExtractor`] and pushes the
//! surviving text into the stream. Each relay owns its parser, extractor and
//! channel; nothing is shared between concurrent relays.

use std::pin::Pin;
use std::task::{Context, Poll};

use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tracing::Instrument;

use crate::client::{ByteStream, CompletionClient};
use crate::delta::{DeltaExtractor, Extracted};
use crate::request::CompletionRequest;
use crate::sse::{SseEvent, SseParser};
use crate::{Error, Result};

/// Fragments buffered between the pump and a slow consumer
pub(crate) const RELAY_BUFFER: usize = 16;

/// How a relay session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayStatus {
    /// `[DONE]` arrived or upstream ended cleanly
    Completed,
    /// Transport failure or an invalid payload; the stream ended in error
    Failed(String),
    /// The consumer dropped the stream before the end
    Cancelled,
}

/// Result of one relay session, delivered once the pump stops
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayOutcome {
    /// Every fragment that was forwarded, in order
    pub text: String,
    pub status: RelayStatus,
}

/// Write half of a relay stream.
///
/// Dropping the sender closes the stream gracefully.
#[derive(Debug)]
pub struct RelaySender {
    tx: mpsc::Sender<Result<Bytes>>,
}

impl RelaySender {
    /// Push one fragment, waiting while the consumer's buffer is full.
    ///
    /// Fails with [`Error::Cancelled`] once the consumer has gone.
    pub async fn enqueue(&self, text: &str) -> Result<()> {
        self.tx
            .send(Ok(Bytes::copy_from_slice(text.as_bytes())))
            .await
            .map_err(|_| Error::Cancelled)
    }

    /// Terminate the stream abnormally; the consumer reads `err` as its
    /// last item.
    pub async fn error(self, err: Error) {
        let _ = self.tx.send(Err(err)).await;
    }

    /// Terminate the stream gracefully.
    pub fn close(self) {}

    /// Resolves once the consumer has dropped its end
    pub async fn closed(&self) {
        self.tx.closed().await
    }
}

/// Read half of a relay stream: forwarded text as UTF-8 bytes.
///
/// Ends with `None` on a graceful close; an `Err` item means the relay
/// aborted and no more items follow.
#[derive(Debug)]
pub struct RelayStream {
    rx: mpsc::Receiver<Result<Bytes>>,
}

impl Stream for RelayStream {
    type Item = Result<Bytes>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Connected sender/stream pair
pub(crate) fn relay_channel() -> (RelaySender, RelayStream) {
    let (tx, rx) = mpsc::channel(RELAY_BUFFER);
    (RelaySender { tx }, RelayStream { rx })
}

/// A running relay session
#[derive(Debug)]
pub struct Relay {
    pub stream: RelayStream,
    /// Fires once with the session's outcome
    pub outcome: oneshot::Receiver<RelayOutcome>,
}

/// Start a relay for `request` using `api_key`.
///
/// Upstream failures (transport or non-2xx status) are returned directly and
/// no stream is created.
pub async fn relay(
    client: &dyn CompletionClient,
    request: &CompletionRequest,
    api_key: &str,
) -> Result<Relay> {
    let body = client.stream_completion(request, api_key).await?;
    Ok(spawn_relay(body, request.model()))
}

/// Wire an already-open upstream body to a new relay stream.
pub fn spawn_relay(body: ByteStream, model: &str) -> Relay {
    let (sink, stream) = relay_channel();
    let (outcome_tx, outcome) = oneshot::channel();

    let span = tracing::info_span!(
        "relay",
        id = %uuid::Uuid::new_v4(),
        model = %model
    );

    tokio::spawn(
        async move {
            let result = pump(body, sink).await;
            match &result.status {
                RelayStatus::Completed => tracing::info!(
                    "Relay completed ({} bytes forwarded)",
                    result.text.len()
                ),
                RelayStatus::Failed(reason) => tracing::error!("Relay failed: {}", reason),
                RelayStatus::Cancelled => tracing::info!("Relay cancelled by consumer"),
            }
            let _ = outcome_tx.send(result);
        }
        .instrument(span),
    );

    Relay { stream, outcome }
}

enum Flow {
    Continue,
    Finished(RelayStatus),
}

async fn pump(mut body: ByteStream, sink: RelaySender) -> RelayOutcome {
    let mut parser = SseParser::new();
    let mut extractor = DeltaExtractor::new();
    let mut text = String::new();

    let status = loop {
        let chunk = tokio::select! {
            _ = sink.closed() => break RelayStatus::Cancelled,
            chunk = body.next() => chunk,
        };

        let (events, at_end) = match chunk {
            Some(Ok(bytes)) => (parser.feed(&bytes), false),
            Some(Err(e)) => {
                let reason = e.to_string();
                sink.error(e).await;
                break RelayStatus::Failed(reason);
            }
            None => (parser.finish(), true),
        };

        match forward(events, &mut extractor, &sink, &mut text).await {
            Flow::Finished(RelayStatus::Failed(reason)) => {
                sink.error(Error::Payload(reason.clone())).await;
                break RelayStatus::Failed(reason);
            }
            Flow::Finished(status) => break status,
            Flow::Continue if at_end => {
                tracing::debug!("Upstream ended without [DONE]");
                break RelayStatus::Completed;
            }
            Flow::Continue => {}
        }
    };

    // `body` drops with this frame, releasing the upstream connection.
    RelayOutcome { text, status }
}

/// Push the text of `events` downstream, stopping at the first terminal one.
async fn forward(
    events: Vec<SseEvent>,
    extractor: &mut DeltaExtractor,
    sink: &RelaySender,
    text: &mut String,
) -> Flow {
    for event in events {
        match extractor.extract(&event) {
            Ok(Extracted::Text(fragment)) if fragment.is_empty() => {}
            Ok(Extracted::Text(fragment)) => {
                if sink.enqueue(&fragment).await.is_err() {
                    return Flow::Finished(RelayStatus::Cancelled);
                }
                text.push_str(&fragment);
            }
            Ok(Extracted::Skip) => {}
            Ok(Extracted::Done) => {
                tracing::debug!("Received [DONE]");
                return Flow::Finished(RelayStatus::Completed);
            }
            Err(Error::Payload(reason)) => return Flow::Finished(RelayStatus::Failed(reason)),
            Err(e) => return Flow::Finished(RelayStatus::Failed(e.to_string())),
        }
    }
    Flow::Continue
}
