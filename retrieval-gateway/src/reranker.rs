//! Reranker hook for re-scoring retrieved chunks before thresholding.

use async_trait::async_trait;

use crate::document::SearchResult;
use crate::error::Result;

/// A reranker that re-scores and reorders the results of one query.
///
/// The [`RetrievalService`](crate::RetrievalService) calls the reranker after
/// the vector search and before the similarity threshold is applied, then
/// re-sorts by the returned scores. Implementations can use cross-encoder
/// models, LLM-based scoring, or simple heuristics.
#[async_trait]
pub trait Reranker: Send + Sync {
    /// Rerank search results given the original query text.
    ///
    /// Returns results with potentially updated scores. Order is not
    /// significant; the caller sorts by score.
    async fn rerank(&self, query: &str, results: Vec<SearchResult>) -> Result<Vec<SearchResult>>;
}

/// A no-op reranker that returns results unchanged.
///
/// # Example
///
/// ```rust,ignore
/// use retrieval_gateway::NoOpReranker;
///
/// let reranker = NoOpReranker;
/// let reranked = reranker.rerank("query", results).await?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpReranker;

#[async_trait]
impl Reranker for NoOpReranker {
    async fn rerank(&self, _query: &str, results: Vec<SearchResult>) -> Result<Vec<SearchResult>> {
        Ok(results)
    }
}
