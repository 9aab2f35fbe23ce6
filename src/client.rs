//! Upstream completion client

use super::{config::ProviderConfig, request::CompletionRequest, Error, Result};
use bytes::Bytes;
use futures::stream::{Stream, StreamExt};
use reqwest::Client as HttpClient;
use std::pin::Pin;
use std::time::Duration;

/// Raw upstream body as a source of byte chunks
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Build an HTTP client with specified timeouts
fn build_http_client(
    timeout: Duration,
    connect_timeout: Duration,
) -> std::result::Result<HttpClient, reqwest::Error> {
    HttpClient::builder()
        .timeout(timeout)
        .connect_timeout(connect_timeout)
        .build()
}

/// Trait for streamed chat-completion providers
#[async_trait::async_trait]
pub trait CompletionClient: Send + Sync {
    /// POST `request` upstream with `api_key` as the bearer credential.
    ///
    /// Resolves only once the provider has answered with a success status;
    /// transport failures and non-2xx answers come back as errors and no
    /// body is handed out.
    async fn stream_completion(&self, request: &CompletionRequest, api_key: &str)
        -> Result<ByteStream>;
}

/// OpenAI chat-completions client
pub struct OpenAIClient {
    config: ProviderConfig,
    http_client: HttpClient,
}

impl OpenAIClient {
    /// Create a new OpenAI client
    pub fn new(config: ProviderConfig) -> Result<Self> {
        Ok(OpenAIClient {
            http_client: build_http_client(config.timeout(), config.connect_timeout())?,
            config,
        })
    }

    /// Get the API base URL
    pub fn api_base(&self) -> &str {
        &self.config.api_base
    }
}

#[async_trait::async_trait]
impl CompletionClient for OpenAIClient {
    async fn stream_completion(
        &self,
        request: &CompletionRequest,
        api_key: &str,
    ) -> Result<ByteStream> {
        let url = self.config.completions_url();

        tracing::debug!(
            "POST {} (model: {}, messages: {})",
            url,
            request.model(),
            request.messages().len()
        );

        let response = self
            .http_client
            .post(&url)
            .header("Content-Type", "application/json")
            .header("Authorization", format!("Bearer {}", api_key))
            .json(request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            tracing::warn!("Upstream rejected completion request ({}): {}", status, body);
            return Err(Error::Upstream {
                status: status.as_u16(),
                body,
            });
        }

        Ok(Box::pin(response.bytes_stream().map(|chunk| chunk.map_err(Error::from))))
    }
}
