//! Batching, timeout and retry wrapper around an [`EmbeddingProvider`].

use std::sync::Arc;
use std::time::Duration;

use futures::{StreamExt, TryStreamExt, stream};
use tracing::{debug, error};

use crate::config::RagConfig;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::retry::RetryPolicy;

/// Turns arbitrary numbers of texts into embeddings through one provider.
///
/// Inputs are split into provider-sized batches that run concurrently (up to
/// `max_concurrent_batches` at a time) and are reassembled in input order.
/// Every provider request carries a timeout and is repeated according to the
/// injected [`RetryPolicy`]. A timed-out request counts as a transient failure.
///
/// # Example
///
/// ```rust,ignore
/// let embedder = Embedder::new(Arc::new(provider))
///     .with_retry_policy(RetryPolicy::new(5))
///     .with_batch_size(64);
/// let vectors = embedder.embed(&["first", "second"]).await?;
/// ```
#[derive(Clone)]
pub struct Embedder {
    provider: Arc<dyn EmbeddingProvider>,
    retry: RetryPolicy,
    batch_size: usize,
    max_concurrent_batches: usize,
    timeout: Duration,
}

impl Embedder {
    /// Wrap a provider using the default [`RagConfig`] settings.
    pub fn new(provider: Arc<dyn EmbeddingProvider>) -> Self {
        Self::from_config(provider, &RagConfig::default())
    }

    /// Wrap a provider using the batching, timeout and retry settings of `config`.
    pub fn from_config(provider: Arc<dyn EmbeddingProvider>, config: &RagConfig) -> Self {
        Self {
            provider,
            retry: RetryPolicy::from_config(&config.retry),
            batch_size: config.embedding_batch_size.max(1),
            max_concurrent_batches: config.max_concurrent_batches.max(1),
            timeout: config.embedding_timeout,
        }
    }

    /// Replace the retry policy.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Set the maximum number of texts per provider request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Set the maximum number of provider requests in flight.
    pub fn with_max_concurrent_batches(mut self, n: usize) -> Self {
        self.max_concurrent_batches = n.max(1);
        self
    }

    /// Set the timeout for each provider request.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The wrapped provider.
    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    /// Dimensionality of the produced vectors.
    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Embed every text, returning one vector per input in input order.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmbeddingError`] if any batch fails after the retry
    /// policy is exhausted, fails permanently, or returns malformed output.
    pub async fn embed(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let batch_size = self.batch_size.min(self.provider.max_batch_size()).max(1);
        debug!(
            provider = self.provider.name(),
            inputs = texts.len(),
            batch_size,
            "embedding texts"
        );

        let batches: Vec<Vec<Vec<f32>>> = stream::iter(texts.chunks(batch_size))
            .map(|batch| self.embed_batch(batch))
            .buffered(self.max_concurrent_batches)
            .try_collect()
            .await?;

        Ok(batches.into_iter().flatten().collect())
    }

    /// Embed a single text.
    ///
    /// # Errors
    ///
    /// See [`embed`](Embedder::embed).
    pub async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let mut vectors = self.embed(&[text]).await?;
        vectors.pop().ok_or_else(|| {
            RagError::permanent_embedding(self.provider.name(), "provider returned no embedding")
        })
    }

    async fn embed_batch(&self, batch: &[&str]) -> Result<Vec<Vec<f32>>> {
        let provider = self.provider.as_ref();
        let timeout = self.timeout;

        let vectors = self
            .retry
            .run("embed_batch", move || async move {
                match tokio::time::timeout(timeout, provider.embed_batch(batch)).await {
                    Ok(result) => result,
                    Err(_) => Err(RagError::transient_embedding(
                        provider.name(),
                        format!("request timed out after {timeout:?}"),
                    )),
                }
            })
            .await
            .inspect_err(|e| {
                error!(provider = provider.name(), batch_size = batch.len(), error = %e, "embedding failed");
            })?;

        self.check_output(batch.len(), &vectors)?;
        Ok(vectors)
    }

    fn check_output(&self, expected: usize, vectors: &[Vec<f32>]) -> Result<()> {
        let name = self.provider.name();
        if vectors.len() != expected {
            return Err(RagError::permanent_embedding(
                name,
                format!("expected {expected} embeddings, provider returned {}", vectors.len()),
            ));
        }
        let dimensions = self.provider.dimensions();
        if let Some(bad) = vectors.iter().find(|v| v.len() != dimensions) {
            return Err(RagError::permanent_embedding(
                name,
                format!("expected {dimensions}-dimensional embeddings, got {}", bad.len()),
            ));
        }
        Ok(())
    }
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Embedder")
            .field("provider", &self.provider.name())
            .field("retry", &self.retry)
            .field("batch_size", &self.batch_size)
            .field("max_concurrent_batches", &self.max_concurrent_batches)
            .field("timeout", &self.timeout)
            .finish()
    }
}
