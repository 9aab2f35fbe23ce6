//! Re-exports from all modules
mod client;
mod config;
mod delta;
mod message;
mod relay;
mod request;
mod sse;
mod store;

#[cfg(feature = "gate")]
pub mod gate;

#[cfg(test)]
mod mock_server;

use thiserror::Error;

/// Result type for chat-relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for chat-relay operations
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (e.g. no credential available)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Inbound request failed validation
    #[error("Validation error: {0}")]
    Validation(String),

    /// Upstream answered with a non-success status
    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A completed SSE event carried an unusable payload
    #[error("Invalid delta payload: {0}")]
    Payload(String),

    /// The downstream consumer went away
    #[error("Relay cancelled by consumer")]
    Cancelled,
}

pub use client::{ByteStream, CompletionClient, OpenAIClient};
pub use config::{AppConfig, ProviderConfig};
pub use delta::{Choice, Delta, DeltaExtractor, DeltaPayload, Extracted, DONE_SENTINEL};
pub use message::{Message, MessageRole};
pub use relay::{relay, spawn_relay, Relay, RelayOutcome, RelaySender, RelayStatus, RelayStream};
pub use request::{CompletionRequest, ModelSelector};
pub use sse::{SseEvent, SseParser};
pub use store::{InMemoryMessageStore, MessageStore, StoredMessage};
