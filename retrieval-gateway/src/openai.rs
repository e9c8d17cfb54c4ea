//! OpenAI embedding provider using the OpenAI embeddings API.
//!
//! This module is only available when the `openai` feature is enabled.

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};

/// The default OpenAI API base URL.
const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model for OpenAI embeddings.
const DEFAULT_MODEL: &str = "text-embedding-3-small";

/// The default dimensionality for `text-embedding-3-small`.
const DEFAULT_DIMENSIONS: usize = 1536;

/// Maximum number of inputs accepted by one embeddings request.
const MAX_BATCH_SIZE: usize = 2048;

const PROVIDER: &str = "OpenAI";

/// An [`EmbeddingProvider`] backed by the OpenAI embeddings API.
///
/// Uses `reqwest` to call the `/embeddings` endpoint directly.
///
/// # Configuration
///
/// - `model` – defaults to `text-embedding-3-small`.
/// - `dimensions` – optional Matryoshka dimension override.
/// - `base_url` – defaults to `https://api.openai.com/v1`; point it at any
///   OpenAI-compatible server.
/// - `api_key` – from the constructor or the `OPENAI_API_KEY` environment variable.
///
/// Rate limits (429), server errors (5xx) and transport failures are reported
/// as retryable; every other non-success status is permanent.
///
/// # Example
///
/// ```rust,ignore
/// use retrieval_gateway::openai::OpenAIEmbeddingProvider;
///
/// let provider = OpenAIEmbeddingProvider::new("sk-...")?;
/// let embedding = provider.embed("hello world").await?;
/// ```
pub struct OpenAIEmbeddingProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    dimensions: usize,
    /// If set, passed to the API for Matryoshka dimension truncation.
    request_dimensions: Option<usize>,
}

impl OpenAIEmbeddingProvider {
    /// Create a new provider with the given API key.
    ///
    /// Uses the default model (`text-embedding-3-small`) and dimensions (1536).
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::ConfigError("OpenAI API key must not be empty".into()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            base_url: OPENAI_BASE_URL.into(),
            model: DEFAULT_MODEL.into(),
            dimensions: DEFAULT_DIMENSIONS,
            request_dimensions: None,
        })
    }

    /// Create a new provider from the environment.
    ///
    /// Reads `OPENAI_API_KEY` (required), and optionally `OPENAI_BASE_URL`,
    /// `EMBEDDING_MODEL` and `EMBEDDING_DIMENSIONS`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("OPENAI_API_KEY").map_err(|_| {
            RagError::ConfigError("OPENAI_API_KEY environment variable not set".into())
        })?;
        let mut provider = Self::new(api_key)?;

        if let Ok(base_url) = std::env::var("OPENAI_BASE_URL") {
            provider = provider.with_base_url(base_url);
        }
        if let Ok(model) = std::env::var("EMBEDDING_MODEL") {
            provider = provider.with_model(model);
        }
        if let Ok(raw) = std::env::var("EMBEDDING_DIMENSIONS") {
            let dims = raw.trim().parse().map_err(|e| {
                RagError::ConfigError(format!("invalid EMBEDDING_DIMENSIONS '{raw}': {e}"))
            })?;
            provider = provider.with_dimensions(dims);
        }
        Ok(provider)
    }

    /// Set the model name (e.g. `text-embedding-3-large`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the API base URL (without the trailing `/embeddings`).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Set the output dimensions (Matryoshka support).
    ///
    /// When set, the API returns embeddings truncated to this size.
    /// This also updates the value returned by [`dimensions()`](EmbeddingProvider::dimensions).
    pub fn with_dimensions(mut self, dims: usize) -> Self {
        self.dimensions = dims;
        self.request_dimensions = Some(dims);
        self
    }

    fn status_error(status: StatusCode, detail: &str) -> RagError {
        let message = format!("API returned {status}: {detail}");
        if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
            RagError::transient_embedding(PROVIDER, message)
        } else {
            RagError::permanent_embedding(PROVIDER, message)
        }
    }
}

// ── OpenAI API request/response types ──────────────────────────────

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for OpenAIEmbeddingProvider {
    fn name(&self) -> &str {
        PROVIDER
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(provider = PROVIDER, text_len = text.len(), "embedding single text");

        let results = self.embed_batch(&[text]).await?;
        results
            .into_iter()
            .next()
            .ok_or_else(|| RagError::permanent_embedding(PROVIDER, "API returned empty response"))
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = PROVIDER, batch_size = texts.len(), model = %self.model, "embedding batch");

        let request_body = EmbeddingRequest {
            model: &self.model,
            input: texts.to_vec(),
            dimensions: self.request_dimensions,
        };

        let response = self
            .client
            .post(format!("{}/embeddings", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request_body)
            .send()
            .await
            .map_err(|e| {
                error!(provider = PROVIDER, error = %e, "request failed");
                RagError::transient_embedding(PROVIDER, format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);

            error!(provider = PROVIDER, %status, "API error");
            return Err(Self::status_error(status, &detail));
        }

        let embedding_response: EmbeddingResponse = response.json().await.map_err(|e| {
            error!(provider = PROVIDER, error = %e, "failed to parse response");
            RagError::permanent_embedding(PROVIDER, format!("failed to parse response: {e}"))
        })?;

        let mut data = embedding_response.data;
        data.sort_by_key(|d| d.index);
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_batch_size(&self) -> usize {
        MAX_BATCH_SIZE
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::*;

    fn provider(server: &mockito::Server) -> OpenAIEmbeddingProvider {
        OpenAIEmbeddingProvider::new("sk-test").unwrap().with_base_url(server.url()).with_dimensions(2)
    }

    #[test]
    fn rejects_empty_api_key() {
        assert!(matches!(OpenAIEmbeddingProvider::new(""), Err(RagError::ConfigError(_))));
    }

    #[tokio::test]
    async fn reorders_response_by_index() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/embeddings")
            .match_header("authorization", "Bearer sk-test")
            .match_body(Matcher::PartialJson(json!({
                "model": "text-embedding-3-small",
                "input": ["first", "second"],
                "dimensions": 2
            })))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(
                json!({
                    "data": [
                        {"index": 1, "embedding": [0.0, 1.0]},
                        {"index": 0, "embedding": [1.0, 0.0]}
                    ]
                })
                .to_string(),
            )
            .create_async()
            .await;

        let vectors = provider(&server).embed_batch(&["first", "second"]).await.unwrap();
        assert_eq!(vectors, vec![vec![1.0, 0.0], vec![0.0, 1.0]]);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn rate_limits_are_retryable() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .with_status(429)
            .with_body(json!({"error": {"message": "slow down"}}).to_string())
            .create_async()
            .await;

        let err = provider(&server).embed("hi").await.unwrap_err();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("slow down"));
    }

    #[tokio::test]
    async fn server_errors_are_retryable() {
        let mut server = mockito::Server::new_async().await;
        server.mock("POST", "/embeddings").with_status(503).create_async().await;

        assert!(provider(&server).embed("hi").await.unwrap_err().is_retryable());
    }

    #[tokio::test]
    async fn auth_failures_are_permanent() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/embeddings")
            .with_status(401)
            .with_body(json!({"error": {"message": "invalid api key"}}).to_string())
            .create_async()
            .await;

        let err = provider(&server).embed("hi").await.unwrap_err();
        assert!(!err.is_retryable());
        assert!(err.to_string().contains("invalid api key"));
    }
}
