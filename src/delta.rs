//! Delta payload decoding and the forwarding filter

use serde::{Deserialize, Deserializer};

use crate::{sse::SseEvent, Error, Result};

/// Payload the provider sends as its last event
pub const DONE_SENTINEL: &str = "[DONE]";

/// Fragments that must be forwarded before newline-bearing fragments stop
/// being dropped
const LEADING_FRAGMENTS: usize = 2;

/// One `chat.completion.chunk` frame
#[derive(Debug, Clone, Deserialize)]
pub struct DeltaPayload {
    pub id: String,
    pub object: String,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Choice {
    pub delta: Delta,
    pub index: u32,
    /// Always present on the wire; `null` until the last frame
    #[serde(deserialize_with = "required_nullable")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Delta {
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Rejects a missing key while still accepting `null`
fn required_nullable<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Option::<String>::deserialize(deserializer)
}

impl DeltaPayload {
    /// Decode and shape-check one event payload
    pub fn parse(data: &str) -> Result<Self> {
        let payload: DeltaPayload =
            serde_json::from_str(data).map_err(|e| Error::Payload(format!("{}: {}", e, data)))?;

        if payload.choices.is_empty() {
            return Err(Error::Payload(format!("no choices in chunk: {}", data)));
        }

        Ok(payload)
    }

    /// `choices[0].delta.content`
    pub fn content(&self) -> Option<&str> {
        self.choices
            .first()
            .and_then(|choice| choice.delta.content.as_deref())
    }
}

/// What one event means for the relay
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extracted {
    /// Forward this fragment
    Text(String),
    /// Nothing to forward for this event
    Skip,
    /// Provider sent the end-of-stream sentinel
    Done,
}

/// Per-relay filter turning SSE events into forwardable text.
///
/// Some providers open a completion with bare newlines. Until two fragments
/// have been forwarded, any fragment containing `\n` is dropped; after that
/// everything passes through.
#[derive(Debug, Default)]
pub struct DeltaExtractor {
    emitted: usize,
}

impl DeltaExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fragments forwarded so far
    pub fn emitted(&self) -> usize {
        self.emitted
    }

    /// Classify one event. A payload that is not a valid chunk is an error.
    pub fn extract(&mut self, event: &SseEvent) -> Result<Extracted> {
        let data = match event.data() {
            Some(data) => data,
            None => return Ok(Extracted::Skip),
        };

        if data == DONE_SENTINEL {
            return Ok(Extracted::Done);
        }

        let payload = DeltaPayload::parse(data)?;

        // An empty string is still a fragment and counts; only a missing
        // `content` key is skipped.
        let text = match payload.content() {
            Some(text) => text,
            None => return Ok(Extracted::Skip),
        };

        if self.emitted < LEADING_FRAGMENTS && text.contains('\n') {
            tracing::debug!(
                "Suppressing leading fragment {:?} ({} forwarded so far)",
                text,
                self.emitted
            );
            return Ok(Extracted::Skip);
        }

        self.emitted += 1;
        Ok(Extracted::Text(text.to_string()))
    }
}
