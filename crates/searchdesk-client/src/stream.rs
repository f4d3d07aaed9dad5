//! Generation event stream: SSE frames relayed from a reader task into an
//! mpsc channel, and the single-subscription holder used by the pipeline.

use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use searchdesk_core::types::LegacyResults;

use crate::backend::SearchBackend;
use crate::error::ClientResult;
use crate::sse::{SseDecoder, SseFrame};

pub const EVENT_BUFFER: usize = 256;

#[derive(Debug, Clone, PartialEq)]
pub enum StreamEvent {
    /// Search results announced once per session, before any tokens.
    Greeting(LegacyResults),
    /// One generated text fragment.
    Publish(String),
    Error(String),
}

#[derive(Debug, Deserialize)]
struct MessageEnvelope {
    message: String,
}

/// Channel name the backend publishes a session's events on.
pub fn channel_name(session_id: &str) -> String {
    format!("generate.{session_id}")
}

/// Map one SSE frame to a stream event. Unknown event names are skipped.
pub fn parse_frame(frame: &SseFrame) -> Option<StreamEvent> {
    match frame.event.as_str() {
        "greeting" => Some(
            serde_json::from_str::<MessageEnvelope>(&frame.data)
                .and_then(|envelope| serde_json::from_str::<LegacyResults>(&envelope.message))
                .map(StreamEvent::Greeting)
                .unwrap_or_else(|e| StreamEvent::Error(format!("malformed greeting: {e}"))),
        ),
        "publish" => Some(
            serde_json::from_str::<MessageEnvelope>(&frame.data)
                .map(|envelope| StreamEvent::Publish(envelope.message))
                .unwrap_or_else(|e| StreamEvent::Error(format!("malformed publish: {e}"))),
        ),
        "error" => Some(StreamEvent::Error(frame.data.clone())),
        other => {
            debug!(event = other, "ignoring stream event");
            None
        }
    }
}

/// An open subscription. Closing (or dropping) it aborts the reader task,
/// so nothing from this session is delivered afterwards.
#[derive(Debug)]
pub struct ChannelHandle {
    session_id: String,
    events: mpsc::Receiver<StreamEvent>,
    relay: Option<JoinHandle<()>>,
}

impl ChannelHandle {
    pub fn new(session_id: impl Into<String>, events: mpsc::Receiver<StreamEvent>, relay: Option<JoinHandle<()>>) -> Self {
        Self { session_id: session_id.into(), events, relay }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Next event, or `None` once the stream has ended or been closed.
    pub async fn next_event(&mut self) -> Option<StreamEvent> {
        self.events.recv().await
    }

    /// An already-received event, without waiting.
    pub fn try_next_event(&mut self) -> Option<StreamEvent> {
        self.events.try_recv().ok()
    }

    pub fn close(&mut self) {
        if let Some(relay) = self.relay.take() {
            relay.abort();
            debug!(session = %self.session_id, "closed generation channel");
        }
        self.events.close();
        while self.events.try_recv().is_ok() {}
    }
}

impl Drop for ChannelHandle {
    fn drop(&mut self) {
        self.close();
    }
}

/// Relay a `text/event-stream` response body into a new [`ChannelHandle`].
/// Read failures become a final [`StreamEvent::Error`].
pub fn spawn_relay(session_id: String, response: reqwest::Response) -> ChannelHandle {
    let (tx, rx) = mpsc::channel(EVENT_BUFFER);
    let task_session = session_id.clone();
    let relay = tokio::spawn(async move {
        let mut bytes_stream = response.bytes_stream();
        let mut decoder = SseDecoder::new();
        while let Some(chunk_result) = bytes_stream.next().await {
            let chunk = match chunk_result {
                Ok(chunk) => chunk,
                Err(error) => {
                    warn!(session = %task_session, %error, "stream read failed");
                    let _ = tx.send(StreamEvent::Error(format!("stream read failed: {error}"))).await;
                    return;
                }
            };
            for frame in decoder.push(&chunk) {
                if let Some(event) = parse_frame(&frame) {
                    if tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
        }
        debug!(session = %task_session, "stream ended");
    });
    ChannelHandle::new(session_id, rx, Some(relay))
}

/// Holds at most one open subscription.
#[derive(Debug, Default)]
pub struct StreamingChannel {
    current: Option<ChannelHandle>,
}

impl StreamingChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Close the current subscription, then subscribe to `session_id`.
    pub async fn open<B: SearchBackend + ?Sized>(&mut self, backend: &B, session_id: &str) -> ClientResult<()> {
        self.close();
        let handle = backend.open_stream(session_id).await?;
        self.current = Some(handle);
        Ok(())
    }

    pub fn current_mut(&mut self) -> Option<&mut ChannelHandle> {
        self.current.as_mut()
    }

    pub fn session_id(&self) -> Option<&str> {
        self.current.as_ref().map(|h| h.session_id())
    }

    pub fn is_open(&self) -> bool {
        self.current.is_some()
    }

    pub fn close(&mut self) {
        if let Some(mut handle) = self.current.take() {
            handle.close();
        }
    }
}
