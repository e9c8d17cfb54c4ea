//! Vector store trait for storing and searching vector embeddings.

use async_trait::async_trait;
use futures::future::try_join_all;

use crate::document::{DocumentChunks, QueryResult, QueryWithEmbedding};
use crate::error::{RagError, Result};
use crate::filter::MetadataFilter;

/// What a [`VectorStore::delete`] call removes.
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteTarget {
    /// Every stored chunk.
    All,
    /// Every chunk belonging to the listed document ids.
    Ids(Vec<String>),
    /// Every chunk matching the filter.
    Filter(MetadataFilter),
}

impl DeleteTarget {
    /// Check that the target selects something narrower than "everything"
    /// unless it is [`DeleteTarget::All`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] for an empty id list, a blank id
    /// or a filter without conditions, and [`RagError::InvalidFilter`] for a
    /// malformed filter.
    pub fn validate(&self) -> Result<()> {
        match self {
            Self::All => Ok(()),
            Self::Ids(ids) if ids.is_empty() => {
                Err(RagError::ValidationError("ids must not be empty".into()))
            }
            Self::Ids(ids) if ids.iter().any(|id| id.trim().is_empty()) => {
                Err(RagError::ValidationError("ids must not be blank".into()))
            }
            Self::Ids(_) => Ok(()),
            Self::Filter(filter) if filter.is_empty() => Err(RagError::ValidationError(
                "delete filter has no conditions; use delete_all to remove everything".into(),
            )),
            Self::Filter(filter) => filter.validate(),
        }
    }
}

/// A storage backend for document chunks with similarity search.
///
/// Implementations keep one index of embedded [`Chunk`](crate::Chunk)s keyed by
/// document id. An upsert replaces the complete chunk set of each document it
/// names, so re-ingesting a document never leaves stale chunks behind.
///
/// # Example
///
/// ```rust,ignore
/// use retrieval_gateway::{InMemoryVectorStore, VectorStore};
///
/// let store = InMemoryVectorStore::new();
/// let ids = store.upsert(&documents).await?;
/// let results = store.query(&queries).await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Short backend name used in logs and errors.
    fn backend(&self) -> &str;

    /// Replace the stored chunk set of every document in `documents`.
    ///
    /// Returns the document ids in input order. Replacement is all-or-nothing
    /// from the caller's perspective.
    async fn upsert(&self, documents: &[DocumentChunks]) -> Result<Vec<String>>;

    /// Return the `top_k` chunks most similar to the query embedding that
    /// match its filter, ordered by descending score.
    async fn search(&self, query: &QueryWithEmbedding) -> Result<QueryResult>;

    /// Run several searches concurrently.
    ///
    /// Results are returned in input order; the first failure fails the batch.
    async fn query(&self, queries: &[QueryWithEmbedding]) -> Result<Vec<QueryResult>> {
        try_join_all(queries.iter().map(|q| self.search(q))).await
    }

    /// Remove chunks. Returns whether anything was removed.
    async fn delete(&self, target: &DeleteTarget) -> Result<bool>;
}
