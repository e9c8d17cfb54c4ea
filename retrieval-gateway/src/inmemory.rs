//! In-memory vector store using cosine similarity.
//!
//! This module provides [`InMemoryVectorStore`], a dependency-free vector store
//! backed by an insertion-ordered list protected by a `tokio::sync::RwLock`. It
//! is suitable for development, testing, and small-scale deployments.

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

use crate::document::{Chunk, DocumentChunks, QueryResult, QueryWithEmbedding, SearchResult};
use crate::error::{RagError, Result};
use crate::vectorstore::{DeleteTarget, VectorStore};

const BACKEND: &str = "in-memory";

/// An in-memory vector store using cosine similarity for search.
///
/// Chunks are kept in insertion order so that equal scores rank the earlier
/// chunk first. Each document's chunk set is replaced under a single write
/// lock, so readers never observe a half-replaced document.
///
/// # Example
///
/// ```rust,ignore
/// use retrieval_gateway::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// store.upsert(&documents).await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryVectorStore {
    chunks: RwLock<Vec<Chunk>>,
}

impl InMemoryVectorStore {
    /// Create a new empty in-memory vector store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored chunks.
    pub async fn len(&self) -> usize {
        self.chunks.read().await.len()
    }

    /// Whether the store holds no chunks.
    pub async fn is_empty(&self) -> bool {
        self.chunks.read().await.is_empty()
    }
}

/// Compute cosine similarity between two vectors.
///
/// Returns 0.0 if either vector has zero magnitude or the lengths differ.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

fn check_document(document: &DocumentChunks) -> Result<()> {
    for chunk in &document.chunks {
        if chunk.document_id != document.document_id {
            return Err(RagError::ValidationError(format!(
                "chunk '{}' belongs to '{}', not '{}'",
                chunk.id, chunk.document_id, document.document_id
            )));
        }
        if chunk.embedding.is_empty() {
            return Err(RagError::ValidationError(format!("chunk '{}' has no embedding", chunk.id)));
        }
    }
    Ok(())
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn upsert(&self, documents: &[DocumentChunks]) -> Result<Vec<String>> {
        for document in documents {
            check_document(document)?;
        }

        let mut ids: Vec<String> = Vec::with_capacity(documents.len());
        let mut chunks = self.chunks.write().await;
        for document in documents {
            chunks.retain(|c| c.document_id != document.document_id);
            chunks.extend(document.chunks.iter().cloned());
            if !ids.contains(&document.document_id) {
                ids.push(document.document_id.clone());
            }
        }

        debug!(backend = BACKEND, documents = ids.len(), stored = chunks.len(), "upserted");
        Ok(ids)
    }

    async fn search(&self, query: &QueryWithEmbedding) -> Result<QueryResult> {
        if let Some(filter) = &query.filter {
            filter.validate()?;
        }

        let chunks = self.chunks.read().await;
        let mut scored: Vec<SearchResult> = chunks
            .iter()
            .filter(|chunk| query.filter.as_ref().is_none_or(|f| f.matches(chunk)))
            .map(|chunk| SearchResult {
                chunk: chunk.clone(),
                score: cosine_similarity(&chunk.embedding, &query.embedding),
            })
            .collect();
        drop(chunks);

        // stable: ties keep insertion order
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(query.top_k);

        Ok(QueryResult { query: query.query.clone(), results: scored })
    }

    async fn delete(&self, target: &DeleteTarget) -> Result<bool> {
        target.validate()?;

        let mut chunks = self.chunks.write().await;
        let before = chunks.len();
        match target {
            DeleteTarget::All => chunks.clear(),
            DeleteTarget::Ids(ids) => chunks.retain(|c| !ids.contains(&c.document_id)),
            DeleteTarget::Filter(filter) => chunks.retain(|c| !filter.matches(c)),
        }
        let removed = before - chunks.len();

        debug!(backend = BACKEND, removed, "deleted chunks");
        Ok(removed > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::ChunkMetadata;
    use crate::filter::MetadataFilter;

    fn chunk(document_id: &str, index: usize, embedding: Vec<f32>) -> Chunk {
        Chunk {
            id: Chunk::chunk_id(document_id, index),
            text: format!("{document_id} chunk {index}"),
            embedding,
            metadata: ChunkMetadata { chunk_index: index, ..Default::default() },
            document_id: document_id.to_string(),
        }
    }

    fn doc(document_id: &str, embeddings: &[Vec<f32>]) -> DocumentChunks {
        DocumentChunks {
            document_id: document_id.to_string(),
            chunks: embeddings.iter().enumerate().map(|(i, e)| chunk(document_id, i, e.clone())).collect(),
        }
    }

    fn query(embedding: Vec<f32>, top_k: usize) -> QueryWithEmbedding {
        QueryWithEmbedding { query: "q".into(), filter: None, top_k, embedding }
    }

    #[test]
    fn cosine_handles_degenerate_vectors() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert_eq!(cosine_similarity(&[1.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn upsert_replaces_previous_chunk_set() {
        let store = InMemoryVectorStore::new();
        store.upsert(&[doc("a", &[vec![1.0, 0.0], vec![0.0, 1.0], vec![1.0, 1.0]])]).await.unwrap();
        assert_eq!(store.len().await, 3);

        store.upsert(&[doc("a", &[vec![1.0, 0.0]])]).await.unwrap();
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn ties_keep_insertion_order() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(&[doc("first", &[vec![1.0, 0.0]]), doc("second", &[vec![2.0, 0.0]])])
            .await
            .unwrap();

        let result = store.search(&query(vec![1.0, 0.0], 5)).await.unwrap();
        let ids: Vec<&str> = result.results.iter().map(|r| r.chunk.id.as_str()).collect();
        assert_eq!(ids, vec!["first-0", "second-0"]);
    }

    #[tokio::test]
    async fn rejects_chunks_without_embeddings() {
        let store = InMemoryVectorStore::new();
        let err = store.upsert(&[doc("a", &[Vec::new()])]).await.unwrap_err();
        assert!(matches!(err, RagError::ValidationError(_)));
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn delete_by_ids_filter_and_all() {
        let store = InMemoryVectorStore::new();
        store
            .upsert(&[doc("a", &[vec![1.0]]), doc("b", &[vec![1.0]]), doc("c", &[vec![1.0]])])
            .await
            .unwrap();

        assert!(store.delete(&DeleteTarget::Ids(vec!["a".into()])).await.unwrap());
        assert!(!store.delete(&DeleteTarget::Ids(vec!["a".into()])).await.unwrap());

        let filter = MetadataFilter::for_document("b");
        assert!(store.delete(&DeleteTarget::Filter(filter)).await.unwrap());
        assert_eq!(store.len().await, 1);

        assert!(store.delete(&DeleteTarget::All).await.unwrap());
        assert!(store.is_empty().await);
        assert!(!store.delete(&DeleteTarget::All).await.unwrap());
    }

    #[tokio::test]
    async fn invalid_filter_is_rejected() {
        let store = InMemoryVectorStore::new();
        let filter = MetadataFilter { author: Some(String::new()), ..Default::default() };
        let mut q = query(vec![1.0], 1);
        q.filter = Some(filter.clone());

        assert!(matches!(store.search(&q).await, Err(RagError::InvalidFilter(_))));
        assert!(matches!(
            store.delete(&DeleteTarget::Filter(filter)).await,
            Err(RagError::InvalidFilter(_))
        ));
    }
}
