//! Retrieval service orchestrator.
//!
//! The [`RetrievalService`] coordinates ingestion (chunk → embed → store),
//! file ingestion with its metadata side-store record, batched queries
//! (embed → search → rerank → threshold) and deletion, by composing an
//! [`Embedder`], a [`VectorStore`], the [`Chunker`]s, an optional
//! [`Reranker`] and a [`MetadataStore`].
//!
//! # Example
//!
//! ```rust,ignore
//! use retrieval_gateway::{RetrievalService, RagConfig, InMemoryVectorStore, Query};
//!
//! let service = RetrievalService::builder()
//!     .config(RagConfig::default())
//!     .embedding_provider(Arc::new(my_provider))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! let ids = service.upsert(documents).await?;
//! let results = service.query(&[Query::new("search query")]).await?;
//! ```

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, error, info};
use uuid::Uuid;

use crate::api::{
    DeleteRequest, DeleteResponse, FileUpsert, QueryRequest, QueryResponse, UpsertRequest,
    UpsertResponse,
};
use crate::chunking::{Chunker, ChunkingStrategy, LineChunker, TokenChunker};
use crate::config::RagConfig;
use crate::document::{Document, DocumentChunks, Query, QueryResult, QueryWithEmbedding};
use crate::embedder::Embedder;
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::metadata::{InMemoryMetadataStore, MetadataRecord, MetadataStore};
use crate::reranker::Reranker;
use crate::tokenizer::{Cl100kTokenizer, Tokenizer};
use crate::vectorstore::{DeleteTarget, VectorStore};

/// Stages an ingest request moves through.
///
/// `Received → Chunked → Embedded → Stored → Acknowledged`; any failure moves
/// the request to `Failed` and nothing is acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    /// The request passed validation and ids are assigned.
    Received,
    /// Every document has been chunked.
    Chunked,
    /// Every chunk has an embedding.
    Embedded,
    /// The vector store accepted the chunk sets.
    Stored,
    /// The ids have been returned to the caller.
    Acknowledged,
    /// A stage failed.
    Failed,
}

impl IngestStage {
    /// Lowercase stage name used in logs.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Chunked => "chunked",
            Self::Embedded => "embedded",
            Self::Stored => "stored",
            Self::Acknowledged => "acknowledged",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Tracks one ingest request through its stages.
struct IngestProgress {
    stage: IngestStage,
    documents: usize,
}

impl IngestProgress {
    fn start(documents: usize) -> Self {
        debug!(stage = %IngestStage::Received, documents, "ingest received");
        Self { stage: IngestStage::Received, documents }
    }

    fn advance(&mut self, next: IngestStage) {
        debug!(from = %self.stage, to = %next, documents = self.documents, "ingest stage");
        self.stage = next;
    }

    fn fail(&mut self, document_id: Option<&str>, err: RagError) -> RagError {
        error!(
            stage = %IngestStage::Failed,
            failed_after = %self.stage,
            document.id = document_id.unwrap_or("-"),
            documents = self.documents,
            error = %err,
            "ingest failed"
        );
        self.stage = IngestStage::Failed;
        err
    }
}

/// The retrieval service.
///
/// Construct one via [`RetrievalService::builder()`].
pub struct RetrievalService {
    config: RagConfig,
    embedder: Embedder,
    vector_store: Arc<dyn VectorStore>,
    token_chunker: Arc<dyn Chunker>,
    line_chunker: Arc<dyn Chunker>,
    reranker: Option<Arc<dyn Reranker>>,
    metadata_store: Arc<dyn MetadataStore>,
}

impl RetrievalService {
    /// Create a new [`RetrievalServiceBuilder`].
    pub fn builder() -> RetrievalServiceBuilder {
        RetrievalServiceBuilder::default()
    }

    /// Return a reference to the service configuration.
    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Return a reference to the embedder.
    pub fn embedder(&self) -> &Embedder {
        &self.embedder
    }

    /// Return a reference to the vector store.
    pub fn vector_store(&self) -> &Arc<dyn VectorStore> {
        &self.vector_store
    }

    /// Return a reference to the metadata side-store.
    pub fn metadata_store(&self) -> &Arc<dyn MetadataStore> {
        &self.metadata_store
    }

    fn chunker(&self, strategy: ChunkingStrategy) -> &Arc<dyn Chunker> {
        match strategy {
            ChunkingStrategy::Tokens => &self.token_chunker,
            ChunkingStrategy::Lines => &self.line_chunker,
        }
    }

    /// Ingest documents with the default `tokens` strategy.
    ///
    /// See [`upsert_with_strategy`](RetrievalService::upsert_with_strategy).
    pub async fn upsert(&self, documents: Vec<Document>) -> Result<Vec<String>> {
        self.upsert_with_strategy(documents, ChunkingStrategy::Tokens).await
    }

    /// Ingest documents: chunk → embed → store.
    ///
    /// Documents without an id get a random UUID. Every chunk of every
    /// document is embedded in one [`Embedder`] call and all chunk sets are
    /// handed to the vector store in one upsert, so either every document is
    /// replaced or none is. Returns the document ids in input order.
    ///
    /// # Errors
    ///
    /// - [`RagError::ValidationError`] for an empty request, a blank id or a
    ///   duplicated id, before any external call.
    /// - [`RagError::EmbeddingError`] if embedding fails after retries.
    /// - [`RagError::StoreUnavailable`] if the store fails or times out.
    pub async fn upsert_with_strategy(
        &self,
        documents: Vec<Document>,
        strategy: ChunkingStrategy,
    ) -> Result<Vec<String>> {
        let documents = assign_ids(documents)?;
        let mut progress = IngestProgress::start(documents.len());

        // 1. Chunk every document
        let chunker = self.chunker(strategy);
        let mut chunk_sets = Vec::with_capacity(documents.len());
        for (document_id, document) in &documents {
            let chunks = chunker
                .chunk(document)
                .map_err(|e| progress.fail(Some(document_id.as_str()), e))?;
            debug!(document.id = %document_id, chunk_count = chunks.len(), %strategy, "chunked document");
            chunk_sets.push(DocumentChunks { document_id: document_id.clone(), chunks });
        }
        progress.advance(IngestStage::Chunked);

        // 2. Embed all chunk texts in one call
        let texts: Vec<&str> =
            chunk_sets.iter().flat_map(|set| set.chunks.iter().map(|c| c.text.as_str())).collect();
        let embeddings = self.embedder.embed(&texts).await.map_err(|e| progress.fail(None, e))?;
        let chunk_count = embeddings.len();

        // 3. Attach embeddings in order
        let mut embeddings = embeddings.into_iter();
        for chunk in chunk_sets.iter_mut().flat_map(|set| set.chunks.iter_mut()) {
            chunk.embedding = embeddings.next().unwrap_or_default();
        }
        progress.advance(IngestStage::Embedded);

        // 4. Replace every chunk set in the store
        let ids = self
            .with_store_timeout("upsert", self.vector_store.upsert(&chunk_sets))
            .await
            .map_err(|e| progress.fail(None, e))?;
        progress.advance(IngestStage::Stored);

        info!(
            documents = ids.len(),
            chunk_count,
            backend = self.vector_store.backend(),
            "ingested documents"
        );
        progress.advance(IngestStage::Acknowledged);
        Ok(ids)
    }

    /// Ingest the documents of an [`UpsertRequest`].
    pub async fn upsert_request(&self, request: UpsertRequest) -> Result<UpsertResponse> {
        let ids = self.upsert(request.documents).await?;
        Ok(UpsertResponse { ids })
    }

    /// Ingest one file's extracted text and record its form fields in the
    /// metadata side-store.
    ///
    /// # Errors
    ///
    /// As [`upsert_with_strategy`](RetrievalService::upsert_with_strategy),
    /// plus [`RagError::ValidationError`] for a malformed timestamp and any
    /// metadata side-store error. A side-store failure is reported even though
    /// the chunks are already stored.
    pub async fn upsert_file(&self, upload: FileUpsert) -> Result<UpsertResponse> {
        let document = upload.to_document()?;
        let metadata = document.metadata.clone().unwrap_or_default();

        let ids = self.upsert_with_strategy(vec![document], upload.chunking_strategy).await?;
        let id = ids.first().cloned().ok_or_else(|| {
            RagError::store_unavailable(self.vector_store.backend(), "upsert returned no id")
        })?;

        let record = MetadataRecord {
            id: id.clone(),
            source: metadata.source,
            author: metadata.author,
            timestamp: metadata.created_at,
            source_id: metadata.source_id,
            groups: metadata.tags,
        };
        self.metadata_store.replace(record).await.map_err(|e| {
            error!(document.id = %id, error = %e, "metadata side-store write failed");
            e
        })?;

        info!(document.id = %id, strategy = %upload.chunking_strategy, "ingested file");
        Ok(UpsertResponse { ids })
    }

    /// Answer a batch of queries.
    ///
    /// All query texts are embedded in one [`Embedder`] call. Each query's
    /// results are reranked (when a reranker is configured), cut at the
    /// similarity threshold, sorted by descending score with ties in store
    /// order, and truncated to `top_k`. Results are in input order.
    ///
    /// # Errors
    ///
    /// - [`RagError::ValidationError`] for a blank query or `top_k == 0`, and
    ///   [`RagError::InvalidFilter`] for a malformed filter, before any
    ///   external call.
    /// - [`RagError::EmbeddingError`] or [`RagError::StoreUnavailable`] if any
    ///   query fails; no partial results are returned.
    pub async fn query(&self, queries: &[Query]) -> Result<Vec<QueryResult>> {
        if queries.is_empty() {
            return Ok(Vec::new());
        }

        let mut top_ks = Vec::with_capacity(queries.len());
        for query in queries {
            top_ks.push(self.validate_query(query)?);
        }

        let texts: Vec<&str> = queries.iter().map(|q| q.query.as_str()).collect();
        let embeddings = self.embedder.embed(&texts).await.map_err(|e| {
            error!(queries = queries.len(), error = %e, "query embedding failed");
            e
        })?;

        let requests: Vec<QueryWithEmbedding> = queries
            .iter()
            .zip(top_ks)
            .zip(embeddings)
            .map(|((query, top_k), embedding)| QueryWithEmbedding {
                query: query.query.clone(),
                filter: query.filter.clone(),
                top_k,
                embedding,
            })
            .collect();

        let raw = self.with_store_timeout("query", self.vector_store.query(&requests)).await?;

        let mut answers = Vec::with_capacity(raw.len());
        for (request, result) in requests.iter().zip(raw) {
            answers.push(self.finish(request, result).await?);
        }

        info!(queries = answers.len(), "query completed");
        Ok(answers)
    }

    /// Answer the queries of a [`QueryRequest`].
    pub async fn query_request(&self, request: QueryRequest) -> Result<QueryResponse> {
        let results = self.query(&request.queries).await?;
        Ok(QueryResponse { results })
    }

    fn validate_query(&self, query: &Query) -> Result<usize> {
        if query.query.trim().is_empty() {
            return Err(RagError::ValidationError("query text must not be empty".into()));
        }
        let top_k = query.top_k.unwrap_or(self.config.top_k);
        if top_k == 0 {
            return Err(RagError::ValidationError("top_k must be greater than 0".into()));
        }
        if let Some(filter) = &query.filter {
            filter.validate()?;
        }
        Ok(top_k)
    }

    async fn finish(&self, request: &QueryWithEmbedding, result: QueryResult) -> Result<QueryResult> {
        let mut results = match &self.reranker {
            Some(reranker) => reranker.rerank(&request.query, result.results).await.map_err(|e| {
                error!(error = %e, "reranking failed");
                e
            })?,
            None => result.results,
        };

        if let Some(threshold) = self.config.similarity_threshold {
            results.retain(|r| r.score >= threshold);
        }
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(request.top_k);

        Ok(QueryResult { query: result.query, results })
    }

    /// Delete chunks selected by exactly one of ids, filter or `delete_all`.
    ///
    /// `success` reports whether the vector store removed anything. After the
    /// store delete, metadata side-store records go with it: every source's
    /// record for deleted ids, the filter's `document_id` under the filter's
    /// `source` (or under every source when none is given), and every record
    /// for `delete_all`.
    ///
    /// # Errors
    ///
    /// - [`RagError::ValidationError`] / [`RagError::InvalidFilter`] for a
    ///   malformed request, before any store call. A filter without
    ///   conditions is rejected; deleting everything needs `delete_all`.
    /// - [`RagError::StoreUnavailable`] if the store fails or times out.
    /// - Any metadata side-store error.
    pub async fn delete(&self, request: &DeleteRequest) -> Result<DeleteResponse> {
        let target = request.target()?;

        let removed = self.with_store_timeout("delete", self.vector_store.delete(&target)).await?;

        let records = match &target {
            DeleteTarget::All => self.metadata_store.clear().await?,
            DeleteTarget::Ids(ids) => {
                let mut records = 0;
                for id in ids {
                    records += self.metadata_store.remove_all_sources(id).await?;
                }
                records
            }
            DeleteTarget::Filter(filter) => match (&filter.document_id, &filter.source) {
                (Some(id), Some(source)) => {
                    usize::from(self.metadata_store.remove(Some(source.as_str()), id).await?)
                }
                (Some(id), None) => self.metadata_store.remove_all_sources(id).await?,
                (None, _) => 0,
            },
        };

        info!(removed, records, backend = self.vector_store.backend(), "delete completed");
        Ok(DeleteResponse { success: removed })
    }

    async fn with_store_timeout<T, F>(&self, operation: &str, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        let backend = self.vector_store.backend();
        let timeout = self.config.store_timeout;
        let result = match tokio::time::timeout(timeout, fut).await {
            Ok(result) => result,
            Err(_) => Err(RagError::store_unavailable(
                backend,
                format!("{operation} timed out after {timeout:?}"),
            )),
        };
        result.inspect_err(|e| {
            if !e.is_client_error() {
                error!(backend, operation, error = %e, "vector store call failed");
            }
        })
    }
}

/// Reject empty requests and blank or duplicate ids; assign missing ids.
fn assign_ids(documents: Vec<Document>) -> Result<Vec<(String, Document)>> {
    if documents.is_empty() {
        return Err(RagError::ValidationError("at least one document is required".into()));
    }

    let mut seen = HashSet::new();
    let mut assigned = Vec::with_capacity(documents.len());
    for mut document in documents {
        let id = match document.id.take() {
            Some(id) if id.trim().is_empty() => {
                return Err(RagError::ValidationError("document id must not be blank".into()));
            }
            Some(id) => id,
            None => Uuid::new_v4().to_string(),
        };
        if !seen.insert(id.clone()) {
            return Err(RagError::ValidationError(format!("duplicate document id '{id}'")));
        }
        document.id = Some(id.clone());
        assigned.push((id, document));
    }
    Ok(assigned)
}

/// Builder for constructing a [`RetrievalService`].
///
/// A vector store and either an embedding provider or a ready [`Embedder`]
/// are required. Everything else has a default: [`RagConfig::default()`],
/// the `cl100k_base` tokenizer, token and line chunkers sized from the
/// config, no reranker, and an [`InMemoryMetadataStore`].
///
/// # Example
///
/// ```rust,ignore
/// let service = RetrievalService::builder()
///     .config(config)
///     .embedding_provider(Arc::new(provider))
///     .vector_store(store)
///     .reranker(Arc::new(reranker))  // optional
///     .build()?;
/// ```
#[derive(Default)]
pub struct RetrievalServiceBuilder {
    config: Option<RagConfig>,
    embedding_provider: Option<Arc<dyn EmbeddingProvider>>,
    embedder: Option<Embedder>,
    vector_store: Option<Arc<dyn VectorStore>>,
    tokenizer: Option<Arc<dyn Tokenizer>>,
    token_chunker: Option<Arc<dyn Chunker>>,
    line_chunker: Option<Arc<dyn Chunker>>,
    reranker: Option<Arc<dyn Reranker>>,
    metadata_store: Option<Arc<dyn MetadataStore>>,
}

impl RetrievalServiceBuilder {
    /// Set the service configuration.
    pub fn config(mut self, config: RagConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the embedding provider; it is wrapped in an [`Embedder`] built from the config.
    pub fn embedding_provider(mut self, provider: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedding_provider = Some(provider);
        self
    }

    /// Set a fully configured [`Embedder`]. Takes precedence over
    /// [`embedding_provider`](RetrievalServiceBuilder::embedding_provider).
    pub fn embedder(mut self, embedder: Embedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the vector store backend.
    pub fn vector_store(mut self, store: Arc<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    /// Set the tokenizer used by the default chunkers.
    pub fn tokenizer(mut self, tokenizer: Arc<dyn Tokenizer>) -> Self {
        self.tokenizer = Some(tokenizer);
        self
    }

    /// Replace the chunker used for `strategy`.
    pub fn chunker(mut self, strategy: ChunkingStrategy, chunker: Arc<dyn Chunker>) -> Self {
        match strategy {
            ChunkingStrategy::Tokens => self.token_chunker = Some(chunker),
            ChunkingStrategy::Lines => self.line_chunker = Some(chunker),
        }
        self
    }

    /// Set an optional reranker for post-search result re-scoring.
    pub fn reranker(mut self, reranker: Arc<dyn Reranker>) -> Self {
        self.reranker = Some(reranker);
        self
    }

    /// Set the metadata side-store.
    pub fn metadata_store(mut self, store: Arc<dyn MetadataStore>) -> Self {
        self.metadata_store = Some(store);
        self
    }

    /// Build the [`RetrievalService`], validating that all required fields are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a required field is missing or the
    /// default tokenizer cannot be loaded.
    pub fn build(self) -> Result<RetrievalService> {
        let config = self.config.unwrap_or_default();
        let vector_store = self
            .vector_store
            .ok_or_else(|| RagError::ConfigError("vector_store is required".to_string()))?;
        let embedder = match (self.embedder, self.embedding_provider) {
            (Some(embedder), _) => embedder,
            (None, Some(provider)) => Embedder::from_config(provider, &config),
            (None, None) => {
                return Err(RagError::ConfigError(
                    "embedding_provider or embedder is required".to_string(),
                ));
            }
        };

        let needs_tokenizer = self.token_chunker.is_none() || self.line_chunker.is_none();
        let tokenizer: Option<Arc<dyn Tokenizer>> = match self.tokenizer {
            Some(tokenizer) => Some(tokenizer),
            None if needs_tokenizer => Some(Arc::new(Cl100kTokenizer::new()?)),
            None => None,
        };
        let token_chunker: Arc<dyn Chunker> = match (self.token_chunker, &tokenizer) {
            (Some(chunker), _) => chunker,
            (None, Some(tokenizer)) => Arc::new(TokenChunker::from_config(tokenizer.clone(), &config)),
            (None, None) => return Err(RagError::ConfigError("tokenizer is required".to_string())),
        };
        let line_chunker: Arc<dyn Chunker> = match (self.line_chunker, &tokenizer) {
            (Some(chunker), _) => chunker,
            (None, Some(tokenizer)) => Arc::new(LineChunker::from_config(tokenizer.clone(), &config)),
            (None, None) => return Err(RagError::ConfigError("tokenizer is required".to_string())),
        };

        let metadata_store: Arc<dyn MetadataStore> = match self.metadata_store {
            Some(store) => store,
            None => Arc::new(InMemoryMetadataStore::new()),
        };

        Ok(RetrievalService {
            config,
            embedder,
            vector_store,
            token_chunker,
            line_chunker,
            reranker: self.reranker,
            metadata_store,
        })
    }
}
