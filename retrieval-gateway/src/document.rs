//! Data types for documents, chunks, queries, and search results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::filter::MetadataFilter;

/// Descriptive attributes attached to a [`Document`] and inherited by its chunks.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DocumentMetadata {
    /// Where the document came from (e.g. `email`, `file`, `chat`, `interview`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Identifier of the document inside its source system.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Optional URL pointing to the original content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// When the original content was created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Author of the original content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// The owning document id. Always set on stored chunks.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Free-form group tags.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// A source document submitted for ingestion.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Document {
    /// Unique identifier. Assigned by the service when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// The raw text content of the document.
    pub text: String,
    /// Optional metadata inherited by every chunk.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<DocumentMetadata>,
}

impl Document {
    /// Create a document with an explicit id and no metadata.
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self { id: Some(id.into()), text: text.into(), metadata: None }
    }

    /// Attach metadata to the document.
    pub fn with_metadata(mut self, metadata: DocumentMetadata) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

/// Metadata stored with each [`Chunk`]: the parent's metadata plus its position.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ChunkMetadata {
    /// Metadata inherited from the parent document.
    #[serde(flatten)]
    pub document: DocumentMetadata,
    /// Position of the chunk within its document, starting at zero.
    pub chunk_index: usize,
}

/// A segment of a [`Document`] with its vector embedding.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Chunk {
    /// Unique identifier for the chunk, `{document_id}-{chunk_index}`.
    pub id: String,
    /// The text content of the chunk.
    pub text: String,
    /// The vector embedding for this chunk's text. Empty until embedded.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub embedding: Vec<f32>,
    /// Metadata inherited from the parent document plus chunk-specific fields.
    pub metadata: ChunkMetadata,
    /// The ID of the parent [`Document`].
    pub document_id: String,
}

impl Chunk {
    /// Derive the chunk id for a document id and chunk position.
    pub fn chunk_id(document_id: &str, index: usize) -> String {
        format!("{document_id}-{index}")
    }
}

/// The complete chunk set of one document, as handed to a vector store.
///
/// Stores replace every previously stored chunk of `document_id` with `chunks`.
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentChunks {
    /// The document whose chunk set is replaced.
    pub document_id: String,
    /// The new chunk set (may be empty, which clears the document).
    pub chunks: Vec<Chunk>,
}

/// A retrieved [`Chunk`] paired with a relevance score.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    /// The retrieved chunk.
    pub chunk: Chunk,
    /// The similarity score (higher is more relevant).
    pub score: f32,
}

/// A natural-language query with an optional metadata filter.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Query {
    /// The query text.
    pub query: String,
    /// Optional conjunction of metadata conditions.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<MetadataFilter>,
    /// Number of results to return; the configured default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_k: Option<usize>,
}

impl Query {
    /// Create an unfiltered query.
    pub fn new(query: impl Into<String>) -> Self {
        Self { query: query.into(), filter: None, top_k: None }
    }

    /// Restrict the query with a metadata filter.
    pub fn with_filter(mut self, filter: MetadataFilter) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Override the number of results.
    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = Some(top_k);
        self
    }
}

/// A query whose text has already been embedded and whose `top_k` is resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryWithEmbedding {
    /// The original query text.
    pub query: String,
    /// Optional metadata filter.
    pub filter: Option<MetadataFilter>,
    /// Number of results to retrieve.
    pub top_k: usize,
    /// The query embedding.
    pub embedding: Vec<f32>,
}

/// The ranked results for one query.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct QueryResult {
    /// The original query text.
    pub query: String,
    /// Results ordered by descending score; ties keep insertion order.
    pub results: Vec<SearchResult>,
}
