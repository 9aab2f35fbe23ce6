//! Gateway tests: drive the axum router in-process
#![cfg(feature = "gate")]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::body::Body;
use axum::http::{header, Request, StatusCode};
use axum::Router;
use bytes::Bytes;
use chat_relay::gate::server::router;
use chat_relay::gate::{GatewayConfig, GatewayState};
use chat_relay::{
    ByteStream, CompletionClient, CompletionRequest, InMemoryMessageStore, MessageRole,
    OpenAIClient, ProviderConfig,
};
use http_body_util::BodyExt;
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn frame(content: &str) -> String {
    format!(
        "data: {}\n\n",
        json!({
            "id": "chatcmpl-test",
            "object": "chat.completion.chunk",
            "created": 1700000000,
            "model": "gpt-4",
            "choices": [{"delta": {"content": content}, "index": 0, "finish_reason": null}]
        })
    )
}

fn sse(contents: &[&str]) -> String {
    let mut body: String = contents.iter().map(|c| frame(c)).collect();
    body.push_str("data: [DONE]\n\n");
    body
}

/// Upstream stand-in that replays a fixed SSE body and records every call
struct FakeClient {
    body: String,
    calls: AtomicUsize,
    keys: Mutex<Vec<String>>,
    models: Mutex<Vec<String>>,
}

impl FakeClient {
    fn new(body: String) -> Arc<Self> {
        Arc::new(Self {
            body,
            calls: AtomicUsize::new(0),
            keys: Mutex::new(Vec::new()),
            models: Mutex::new(Vec::new()),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl CompletionClient for FakeClient {
    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        api_key: &str,
    ) -> chat_relay::Result<ByteStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.keys.lock().unwrap().push(api_key.to_string());
        self.models.lock().unwrap().push(request.model().to_string());

        // Split mid-frame to exercise reassembly through the gateway
        let bytes = self.body.as_bytes();
        let chunks: Vec<chat_relay::Result<Bytes>> = bytes
            .chunks(5)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();
        Ok(Box::pin(futures::stream::iter(chunks)))
    }
}

fn app_with(
    client: Arc<dyn CompletionClient>,
    provider: ProviderConfig,
    store: Option<Arc<InMemoryMessageStore>>,
) -> Router {
    let state = GatewayState {
        client,
        provider: Arc::new(provider),
        store: store.map(|s| s as Arc<dyn chat_relay::MessageStore>),
    };
    router(state, &GatewayConfig::default())
}

fn generate(body: Value, api_key: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("POST")
        .uri("/api/generate")
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(key) = api_key {
        builder = builder.header("X-OPENAI-API-KEY", key);
    }
    builder.body(Body::from(body.to_string())).unwrap()
}

fn hello_body() -> Value {
    json!({
        "model": "gpt-4",
        "messages": [{"role": "user", "content": "Say hello", "name": "ada"}]
    })
}

async fn body_text(response: axum::response::Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

#[tokio::test]
async fn test_missing_credential_is_400_without_upstream_call() {
    let client = FakeClient::new(sse(&["never"]));
    let app = app_with(client.clone(), ProviderConfig::default(), None);

    let response = app.oneshot(generate(hello_body(), None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "Missing X-OPENAI-API-KEY header");
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_malformed_body_is_400() {
    let client = FakeClient::new(sse(&["never"]));
    let app = app_with(client.clone(), ProviderConfig::default(), None);

    let request = Request::builder()
        .method("POST")
        .uri("/api/generate")
        .header("X-OPENAI-API-KEY", "sk-test")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn test_schema_violations_are_400() {
    let bodies = [
        json!({"model": "gpt-4", "messages": [{"role": "user", "content": ""}]}),
        json!({"model": "gpt-4", "messages": []}),
        json!({"model": "davinci", "messages": [{"role": "user", "content": "hi"}]}),
        json!({"messages": [{"role": "user", "content": "hi", "name": "x".repeat(101)}]}),
    ];

    for body in bodies {
        let client = FakeClient::new(sse(&["never"]));
        let app = app_with(client.clone(), ProviderConfig::default(), None);
        let response = app.oneshot(generate(body.clone(), Some("sk-test"))).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "body: {}", body);
        assert_eq!(client.calls(), 0);
    }
}

#[tokio::test]
async fn test_streams_plain_text() {
    let client = FakeClient::new(sse(&["\n", "\n", "Hello", " world"]));
    let app = app_with(client.clone(), ProviderConfig::default(), None);

    let response = app
        .oneshot(generate(hello_body(), Some("sk-caller")))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    assert_eq!(body_text(response).await, "Hello world");
    assert_eq!(client.keys.lock().unwrap().as_slice(), ["sk-caller"]);
}

#[tokio::test]
async fn test_bare_array_body_uses_gpt4() {
    let client = FakeClient::new(sse(&["ok"]));
    let app = app_with(client.clone(), ProviderConfig::default(), None);

    let body = json!([{"role": "user", "content": "hi"}]);
    let response = app.oneshot(generate(body, Some("sk"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
    assert_eq!(client.models.lock().unwrap().as_slice(), ["gpt-4"]);
}

#[tokio::test]
async fn test_server_held_key_is_fallback() {
    let client = FakeClient::new(sse(&["ok"]));
    let provider = ProviderConfig::openai("http://unused".to_string(), "sk-server".to_string());
    let app = app_with(client.clone(), provider, None);

    let response = app.oneshot(generate(hello_body(), None)).await.unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "ok");
    assert_eq!(client.keys.lock().unwrap().as_slice(), ["sk-server"]);
}

#[tokio::test]
async fn test_invalid_payload_aborts_body() {
    let mut upstream = frame("partial");
    upstream.push_str("data: not valid json\n\n");
    upstream.push_str(&frame(" lost"));
    let client = FakeClient::new(upstream);
    let app = app_with(client, ProviderConfig::default(), None);

    let response = app.oneshot(generate(hello_body(), Some("sk"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let result = response.into_body().collect().await;
    assert!(result.is_err(), "body should end in error");
}

#[tokio::test]
async fn test_completed_reply_is_persisted() {
    let client = FakeClient::new(sse(&["Stored", " reply"]));
    let store = Arc::new(InMemoryMessageStore::new());
    let app = app_with(client, ProviderConfig::default(), Some(store.clone()));

    let body = json!({
        "messages": [{"role": "user", "content": "hi"}],
        "chat_id": "chat-1",
        "name": "Assistant"
    });
    let response = app.oneshot(generate(body, Some("sk"))).await.unwrap();
    assert_eq!(body_text(response).await, "Stored reply");

    let mut saved = Vec::new();
    for _ in 0..100 {
        saved = store.messages("chat-1");
        if !saved.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    assert_eq!(saved.len(), 1);
    assert_eq!(saved[0].role, MessageRole::Assistant);
    assert_eq!(saved[0].content, "Stored reply");
    assert_eq!(saved[0].name.as_deref(), Some("Assistant"));
}

#[tokio::test]
async fn test_failed_reply_is_not_persisted() {
    let mut upstream = frame("partial");
    upstream.push_str("data: {\"broken\": true}\n\n");
    let client = FakeClient::new(upstream);
    let store = Arc::new(InMemoryMessageStore::new());
    let app = app_with(client, ProviderConfig::default(), Some(store.clone()));

    let body = json!({"messages": [{"role": "user", "content": "hi"}], "chat_id": "chat-2"});
    let response = app.oneshot(generate(body, Some("sk"))).await.unwrap();
    assert!(response.into_body().collect().await.is_err());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(store.messages("chat-2").is_empty());
}

#[tokio::test]
async fn test_upstream_status_error_is_502() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(401)
                .set_body_raw(r#"{"error":{"message":"bad key"}}"#, "application/json"),
        )
        .mount(&server)
        .await;

    let provider = ProviderConfig {
        api_base: server.uri(),
        ..ProviderConfig::default()
    };
    let client = Arc::new(OpenAIClient::new(provider.clone()).unwrap());
    let app = app_with(client, provider, None);

    let response = app.oneshot(generate(hello_body(), Some("sk-bad"))).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let text = body_text(response).await;
    assert!(text.contains("401"), "{}", text);
    assert!(text.contains("bad key"), "{}", text);
}

#[tokio::test]
async fn test_end_to_end_through_http_upstream() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse(&["Hi", " from", " upstream"]), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let provider = ProviderConfig {
        api_base: server.uri(),
        ..ProviderConfig::default()
    };
    let client = Arc::new(OpenAIClient::new(provider.clone()).unwrap());
    let app = app_with(client, provider, None);

    let response = app.oneshot(generate(hello_body(), Some("sk"))).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Hi from upstream");

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert_eq!(received[0].headers["authorization"], "Bearer sk");
    let sent: Value = received[0].body_json().unwrap();
    assert_eq!(sent["stream"], true);
    assert_eq!(sent["max_tokens"], 4000);
    assert_eq!(sent["messages"][0]["name"], "ada");
}

#[tokio::test]
async fn test_health_and_models() {
    let app = app_with(FakeClient::new(String::new()), ProviderConfig::default(), None);

    let response = app
        .clone()
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let health: Value = serde_json::from_str(&body_text(response).await).unwrap();
    assert_eq!(health["status"], "ok");

    let response = app
        .oneshot(Request::get("/api/models").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let models: Value = serde_json::from_str(&body_text(response).await).unwrap();
    let ids: Vec<&str> = models["data"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, ["gpt-3.5-turbo", "gpt-4"]);
}
