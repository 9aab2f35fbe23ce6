//! Mock HTTP server for testing the relay offline
//!
//! wiremock-based stand-in for the OpenAI chat-completions endpoint, so tests
//! run without real API keys.

use wiremock::{
    matchers::{header, method, path},
    Mock, MockServer, ResponseTemplate,
};

/// One `chat.completion.chunk` frame as the provider formats it
pub fn chunk_json(delta: serde_json::Value, finish_reason: Option<&str>) -> String {
    serde_json::json!({
        "id": "chatcmpl-mock",
        "object": "chat.completion.chunk",
        "created": 1234567890,
        "model": "gpt-4",
        "choices": [{
            "index": 0,
            "delta": delta,
            "finish_reason": finish_reason
        }]
    })
    .to_string()
}

/// Full SSE body: role frame, one frame per content chunk, stop frame, `[DONE]`
pub fn sse_body(chunks: &[&str]) -> String {
    let mut sse_response = String::new();

    sse_response.push_str(&format!(
        "data: {}\n\n",
        chunk_json(serde_json::json!({"role": "assistant"}), None)
    ));

    for chunk in chunks {
        sse_response.push_str(&format!(
            "data: {}\n\n",
            chunk_json(serde_json::json!({"content": chunk}), None)
        ));
    }

    sse_response.push_str(&format!(
        "data: {}\n\n",
        chunk_json(serde_json::json!({}), Some("stop"))
    ));
    sse_response.push_str("data: [DONE]\n\n");
    sse_response
}

/// OpenAI mock server for testing
pub struct OpenAIMockServer {
    server: MockServer,
}

impl OpenAIMockServer {
    /// Create a new OpenAI mock server
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        Self { server }
    }

    /// Get the base URL of this mock server
    pub fn base_url(&self) -> String {
        self.server.uri()
    }

    /// Setup a streaming chat completion (SSE) for any caller
    pub async fn mock_chat_streaming(&self, chunks: Vec<&str>) {
        self.mock_raw_sse(sse_body(&chunks)).await;
    }

    /// Setup a streaming chat completion that only answers `api_key`
    pub async fn mock_chat_streaming_for_key(&self, api_key: &str, chunks: Vec<&str>) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("Authorization", format!("Bearer {}", api_key).as_str()))
            .and(header("Content-Type", "application/json"))
            .respond_with(
                ResponseTemplate::new(200).set_body_raw(sse_body(&chunks), "text/event-stream"),
            )
            .mount(&self.server)
            .await;
    }

    /// Setup an arbitrary SSE body
    pub async fn mock_raw_sse(&self, body: String) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&self.server)
            .await;
    }

    /// Setup a non-success answer
    pub async fn mock_error(&self, status: u16, body: &str) {
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(status).set_body_raw(body.to_string(), "application/json"),
            )
            .mount(&self.server)
            .await;
    }

    /// JSON bodies of every request received so far
    pub async fn received_bodies(&self) -> Vec<serde_json::Value> {
        self.server
            .received_requests()
            .await
            .unwrap_or_default()
            .iter()
            .filter_map(|request| request.body_json().ok())
            .collect()
    }
}
