//! Qdrant vector store backend.
//!
//! Provides [`QdrantVectorStore`] which implements [`VectorStore`] using
//! the [qdrant-client](https://docs.rs/qdrant-client) crate over gRPC.
//!
//! # Example
//!
//! ```rust,ignore
//! use retrieval_gateway::qdrant::QdrantVectorStore;
//!
//! let store = QdrantVectorStore::new("http://localhost:6334", "documents")?;
//! store.create_collection(1536).await?;
//! store.upsert(&documents).await?;
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    Condition, CountPointsBuilder, CreateCollectionBuilder, DeletePointsBuilder, Distance, Filter,
    PointStruct, Range, ScoredPoint, SearchPointsBuilder, UpsertPointsBuilder,
    Value as QdrantValue, VectorParamsBuilder,
};
use qdrant_client::{Payload, Qdrant};
use serde_json::json;
use tracing::debug;
use uuid::Uuid;

use crate::document::{
    Chunk, ChunkMetadata, DocumentChunks, DocumentMetadata, QueryResult, QueryWithEmbedding,
    SearchResult,
};
use crate::error::{RagError, Result};
use crate::filter::MetadataFilter;
use crate::vectorstore::{DeleteTarget, VectorStore};

const BACKEND: &str = "qdrant";

/// A [`VectorStore`] backed by [Qdrant](https://qdrant.tech/).
///
/// All chunks live in one collection with cosine distance. Point ids are
/// UUID v5 hashes of the chunk ids; chunk fields are stored as top-level
/// payload keys so that metadata filters run inside Qdrant. `created_at` is
/// additionally stored as Unix seconds under `created_at_ts` for range filters.
///
/// Replacing a document first writes the new points and then deletes the
/// document's points that are not part of the new set, both with
/// `wait = true`. A failure between the two calls leaves the new chunks next
/// to stale ones, never a document without chunks.
pub struct QdrantVectorStore {
    client: Qdrant,
    collection: String,
}

impl QdrantVectorStore {
    /// Create a new Qdrant vector store connecting to the given URL.
    pub fn new(url: &str, collection: impl Into<String>) -> Result<Self> {
        let client = Qdrant::from_url(url).build().map_err(Self::map_err)?;
        Ok(Self { client, collection: collection.into() })
    }

    /// Create a new Qdrant vector store from an existing client.
    pub fn from_client(client: Qdrant, collection: impl Into<String>) -> Self {
        Self { client, collection: collection.into() }
    }

    /// Create the collection if it does not exist yet.
    pub async fn create_collection(&self, dimensions: usize) -> Result<()> {
        let collections = self.client.list_collections().await.map_err(Self::map_err)?;
        let exists = collections.collections.iter().any(|c| c.name == self.collection);
        if exists {
            debug!(collection = %self.collection, "qdrant collection already exists, skipping creation");
            return Ok(());
        }

        self.client
            .create_collection(
                CreateCollectionBuilder::new(&self.collection)
                    .vectors_config(VectorParamsBuilder::new(dimensions as u64, Distance::Cosine)),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, dimensions, "created qdrant collection");
        Ok(())
    }

    fn map_err(e: qdrant_client::QdrantError) -> RagError {
        RagError::store_unavailable(BACKEND, e.to_string())
    }

    fn point_id(chunk_id: &str) -> String {
        Uuid::new_v5(&Uuid::NAMESPACE_OID, chunk_id.as_bytes()).to_string()
    }

    fn to_point(chunk: &Chunk) -> Result<PointStruct> {
        let meta = &chunk.metadata.document;
        let payload = json!({
            "chunk_id": chunk.id,
            "text": chunk.text,
            "document_id": chunk.document_id,
            "chunk_index": chunk.metadata.chunk_index,
            "source": meta.source,
            "source_id": meta.source_id,
            "url": meta.url,
            "author": meta.author,
            "created_at": meta.created_at.map(|t| t.to_rfc3339()),
            "created_at_ts": meta.created_at.map(|t| t.timestamp()),
            "tags": meta.tags,
        });
        let payload = Payload::try_from(payload).map_err(Self::map_err)?;
        Ok(PointStruct::new(Self::point_id(&chunk.id), chunk.embedding.clone(), payload))
    }

    fn documents_filter(ids: Vec<String>) -> Filter {
        Filter::must([Condition::matches("document_id", ids)])
    }

    /// Points of the given documents whose ids are not in `keep`.
    fn stale_points_filter(ids: Vec<String>, keep: Vec<String>) -> Filter {
        let mut filter = Self::documents_filter(ids);
        if !keep.is_empty() {
            filter.must_not = vec![Condition::has_id(keep)];
        }
        filter
    }

    async fn count(&self, filter: Filter) -> Result<u64> {
        let response = self
            .client
            .count(CountPointsBuilder::new(&self.collection).filter(filter).exact(true))
            .await
            .map_err(Self::map_err)?;
        Ok(response.result.map(|r| r.count).unwrap_or_default())
    }
}

/// Translate a metadata filter into Qdrant `must` conditions.
fn filter_conditions(filter: &MetadataFilter) -> Vec<Condition> {
    let mut conditions = Vec::new();
    let fields = [
        ("document_id", &filter.document_id),
        ("source", &filter.source),
        ("source_id", &filter.source_id),
        ("author", &filter.author),
    ];
    for (key, value) in fields {
        if let Some(value) = value {
            conditions.push(Condition::matches(key, value.clone()));
        }
    }
    if filter.start_date.is_some() || filter.end_date.is_some() {
        conditions.push(Condition::range(
            "created_at_ts",
            Range {
                gte: filter.start_date.map(|t| t.timestamp() as f64),
                lte: filter.end_date.map(|t| t.timestamp() as f64),
                ..Default::default()
            },
        ));
    }
    for tag in &filter.tags {
        conditions.push(Condition::matches("tags", tag.clone()));
    }
    conditions
}

fn to_qdrant_filter(filter: &MetadataFilter) -> Result<Filter> {
    filter.validate()?;
    Ok(Filter::must(filter_conditions(filter)))
}

fn extract_string(value: &QdrantValue) -> Option<String> {
    match &value.kind {
        Some(Kind::StringValue(s)) => Some(s.clone()),
        _ => None,
    }
}

fn extract_strings(value: &QdrantValue) -> Vec<String> {
    match &value.kind {
        Some(Kind::ListValue(list)) => list.values.iter().filter_map(extract_string).collect(),
        _ => Vec::new(),
    }
}

fn extract_usize(value: &QdrantValue) -> Option<usize> {
    match &value.kind {
        Some(Kind::IntegerValue(n)) => usize::try_from(*n).ok(),
        Some(Kind::DoubleValue(n)) if *n >= 0.0 => Some(*n as usize),
        _ => None,
    }
}

fn to_search_result(scored: ScoredPoint) -> SearchResult {
    let payload = &scored.payload;
    let string = |key: &str| payload.get(key).and_then(extract_string);

    let document_id = string("document_id").unwrap_or_default();
    let created_at = string("created_at")
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc));

    let metadata = ChunkMetadata {
        document: DocumentMetadata {
            source: string("source"),
            source_id: string("source_id"),
            url: string("url"),
            created_at,
            author: string("author"),
            document_id: Some(document_id.clone()),
            tags: payload.get("tags").map(extract_strings).unwrap_or_default(),
        },
        chunk_index: payload.get("chunk_index").and_then(extract_usize).unwrap_or_default(),
    };

    SearchResult {
        chunk: Chunk {
            id: string("chunk_id").unwrap_or_default(),
            text: string("text").unwrap_or_default(),
            embedding: Vec::new(),
            metadata,
            document_id,
        },
        score: scored.score,
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    fn backend(&self) -> &str {
        BACKEND
    }

    async fn upsert(&self, documents: &[DocumentChunks]) -> Result<Vec<String>> {
        let mut ids: Vec<String> = Vec::with_capacity(documents.len());
        for document in documents {
            if !ids.contains(&document.document_id) {
                ids.push(document.document_id.clone());
            }
        }
        if ids.is_empty() {
            return Ok(ids);
        }

        // the last chunk set wins when a document id repeats
        let chunks: Vec<&Chunk> = documents
            .iter()
            .enumerate()
            .filter(|(i, d)| !documents[i + 1..].iter().any(|later| later.document_id == d.document_id))
            .flat_map(|(_, d)| d.chunks.iter())
            .collect();
        let keep: Vec<String> = chunks.iter().map(|c| Self::point_id(&c.id)).collect();
        let points = chunks.into_iter().map(Self::to_point).collect::<Result<Vec<_>>>()?;
        let count = points.len();

        if !points.is_empty() {
            self.client
                .upsert_points(UpsertPointsBuilder::new(&self.collection, points).wait(true))
                .await
                .map_err(Self::map_err)?;
        }

        self.client
            .delete_points(
                DeletePointsBuilder::new(&self.collection)
                    .points(Self::stale_points_filter(ids.clone(), keep))
                    .wait(true),
            )
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, documents = ids.len(), count, "upserted chunks to qdrant");
        Ok(ids)
    }

    async fn search(&self, query: &QueryWithEmbedding) -> Result<QueryResult> {
        let mut request =
            SearchPointsBuilder::new(&self.collection, query.embedding.clone(), query.top_k as u64)
                .with_payload(true);
        if let Some(filter) = &query.filter {
            request = request.filter(to_qdrant_filter(filter)?);
        }

        let response = self.client.search_points(request).await.map_err(Self::map_err)?;
        let results = response.result.into_iter().map(to_search_result).collect();

        Ok(QueryResult { query: query.query.clone(), results })
    }

    async fn delete(&self, target: &DeleteTarget) -> Result<bool> {
        target.validate()?;

        let filter = match target {
            DeleteTarget::All => Filter::default(),
            DeleteTarget::Ids(ids) => Self::documents_filter(ids.clone()),
            DeleteTarget::Filter(filter) => to_qdrant_filter(filter)?,
        };

        let matched = self.count(filter.clone()).await?;
        if matched == 0 {
            return Ok(false);
        }

        self.client
            .delete_points(DeletePointsBuilder::new(&self.collection).points(filter).wait(true))
            .await
            .map_err(Self::map_err)?;

        debug!(collection = %self.collection, count = matched, "deleted points from qdrant");
        Ok(true)
    }
}
