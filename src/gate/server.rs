//! Gateway HTTP server

use crate::gate::config::GatewayConfig;
use crate::gate::handlers::{self, GatewayState};
use crate::{AppConfig, InMemoryMessageStore, OpenAIClient};
use axum::{
    extract::Request,
    middleware::{self, Next},
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tower_http::{cors::CorsLayer, timeout::TimeoutLayer, trace::TraceLayer};
use tracing::info;

/// Build the gateway routes around `state`.
///
/// `timeout_secs` bounds the wait for response headers only; a relayed body
/// may stream for longer.
pub fn router(state: GatewayState, config: &GatewayConfig) -> Router {
    Router::new()
        .route("/api/generate", post(handlers::generate))
        .route("/api/models", get(handlers::list_models))
        .route("/health", get(handlers::health_check))
        .with_state(state)
        .layer(middleware::from_fn(logging_middleware))
        .layer(TimeoutLayer::new(Duration::from_secs(config.timeout_secs)))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Start the gateway server
pub async fn start_server(config: AppConfig) -> anyhow::Result<()> {
    if config.provider.api_key().is_none() {
        info!("No server-held API key; callers must send X-OPENAI-API-KEY");
    }

    let client = OpenAIClient::new(config.provider.clone())?;
    let state = GatewayState {
        client: Arc::new(client),
        provider: Arc::new(config.provider.clone()),
        store: Some(Arc::new(InMemoryMessageStore::new())),
    };

    let app = router(state, &config.server);

    let addr: SocketAddr = config
        .server
        .bind_addr()
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid address {}: {}", config.server.bind_addr(), e))?;

    info!("Starting chat relay on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Chat relay stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}

/// Logging middleware
async fn logging_middleware(req: Request, next: Next) -> axum::response::Response {
    let start = Instant::now();
    let method = req.method().clone();
    let uri = req.uri().clone();

    let response = next.run(req).await;

    let duration = start.elapsed();
    let status = response.status();

    info!("{} {} {} {:?}", method, uri, status, duration);

    response
}
