//! HTTP request handlers for the gateway

use crate::gate::error::GatewayError;
use crate::{
    relay, CompletionClient, CompletionRequest, Message, MessageRole, MessageStore,
    ModelSelector, ProviderConfig, Relay, RelayOutcome, RelayStatus, StoredMessage,
};
use axum::{
    body::{Body, Bytes},
    extract::State,
    http::{header, HeaderMap},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::sync::oneshot;
use tracing::{error, info, warn};

/// Header carrying the caller's own provider key (`X-OPENAI-API-KEY`)
pub const API_KEY_HEADER: &str = "x-openai-api-key";

/// Gateway state shared across handlers
#[derive(Clone)]
pub struct GatewayState {
    pub client: Arc<dyn CompletionClient>,
    pub provider: Arc<ProviderConfig>,
    pub store: Option<Arc<dyn MessageStore>>,
}

/// Body of `POST /api/generate`
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateRequest {
    #[serde(default)]
    pub model: ModelSelector,
    pub messages: Vec<Message>,
    /// Chat to persist the reply under
    #[serde(default)]
    pub chat_id: Option<String>,
    /// Sender name recorded with the persisted reply
    #[serde(default)]
    pub name: Option<String>,
}

impl GenerateRequest {
    /// Accepts either the object form or a bare message array.
    pub fn from_json(body: &[u8]) -> Result<Self, GatewayError> {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| GatewayError::InvalidRequest(format!("malformed JSON: {}", e)))?;

        if value.is_array() {
            let messages: Vec<Message> = serde_json::from_value(value)
                .map_err(|e| GatewayError::InvalidRequest(e.to_string()))?;
            return Ok(GenerateRequest {
                model: ModelSelector::default(),
                messages,
                chat_id: None,
                name: None,
            });
        }

        serde_json::from_value(value).map_err(|e| GatewayError::InvalidRequest(e.to_string()))
    }
}

/// Caller's header key first, then the server-held one
fn resolve_api_key(headers: &HeaderMap, provider: &ProviderConfig) -> Option<String> {
    headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .or_else(|| provider.api_key())
        .map(str::to_string)
}

/// Relay a streamed completion to the caller as plain text
pub async fn generate(
    State(state): State<GatewayState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, GatewayError> {
    let request = GenerateRequest::from_json(&body)?;

    let api_key =
        resolve_api_key(&headers, &state.provider).ok_or(GatewayError::MissingCredential)?;

    let completion = CompletionRequest::new(request.model, request.messages)?;

    info!(
        "Generate request for model: {} ({} messages)",
        completion.model(),
        completion.messages().len()
    );

    let Relay { stream, outcome } = relay(state.client.as_ref(), &completion, &api_key)
        .await
        .map_err(|e| {
            error!("Upstream request failed: {}", e);
            GatewayError::from(e)
        })?;

    if let (Some(chat_id), Some(store)) = (request.chat_id, state.store.clone()) {
        tokio::spawn(persist_reply(outcome, store, chat_id, request.name));
    }

    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8"),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(stream),
    )
        .into_response())
}

/// Save the assistant reply once the relay has completed
async fn persist_reply(
    outcome: oneshot::Receiver<RelayOutcome>,
    store: Arc<dyn MessageStore>,
    chat_id: String,
    name: Option<String>,
) {
    let outcome = match outcome.await {
        Ok(outcome) => outcome,
        Err(_) => {
            warn!("Relay for chat {} ended without an outcome", chat_id);
            return;
        }
    };

    if outcome.status != RelayStatus::Completed {
        info!("Not persisting reply for chat {}: {:?}", chat_id, outcome.status);
        return;
    }

    if outcome.text.is_empty() {
        warn!("Relay for chat {} produced no text, nothing to persist", chat_id);
        return;
    }

    let message = StoredMessage {
        chat_id: chat_id.clone(),
        role: MessageRole::Assistant,
        content: outcome.text,
        name,
    };

    if let Err(e) = store.save(message).await {
        error!("Failed to persist reply for chat {}: {}", chat_id, e);
    }
}

/// Handle model list request
pub async fn list_models() -> Json<Value> {
    let data: Vec<Value> = ModelSelector::ALL
        .iter()
        .map(|model| {
            json!({
                "id": model.as_str(),
                "object": "model",
                "max_tokens": model.max_output_tokens()
            })
        })
        .collect();

    Json(json!({
        "object": "list",
        "data": data
    }))
}

/// Health check handler
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}
