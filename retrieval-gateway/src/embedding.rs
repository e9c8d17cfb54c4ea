//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;

use crate::error::Result;

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends (OpenAI, local models, etc.)
/// behind a unified async interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// Providers report failures as [`RagError::EmbeddingError`](crate::RagError::EmbeddingError),
/// setting `retryable` for rate limits, server errors and transport failures so
/// that the [`Embedder`](crate::Embedder) retry policy can tell them apart from
/// permanent failures such as invalid input or rejected credentials.
///
/// # Example
///
/// ```rust,ignore
/// use retrieval_gateway::EmbeddingProvider;
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world").await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Short provider name used in logs and errors.
    fn name(&self) -> &str;

    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// Must return one vector per input, in input order.
    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;

    /// Largest number of inputs accepted by one [`embed_batch`](EmbeddingProvider::embed_batch) call.
    fn max_batch_size(&self) -> usize {
        usize::MAX
    }
}
