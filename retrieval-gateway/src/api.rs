//! Request and response models for the gateway operations.
//!
//! These are the serde shapes an HTTP layer deserializes into and serializes
//! from; the [`RetrievalService`](crate::RetrievalService) consumes them directly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::chunking::ChunkingStrategy;
use crate::document::{Document, DocumentMetadata, Query, QueryResult};
use crate::error::{RagError, Result};
use crate::filter::MetadataFilter;
use crate::vectorstore::DeleteTarget;

/// Documents to ingest.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpsertRequest {
    /// The documents, in the order their ids are returned.
    pub documents: Vec<Document>,
}

/// Ids of the ingested documents, in request order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct UpsertResponse {
    /// Document ids, including server-assigned ones.
    pub ids: Vec<String>,
}

/// A single file whose text has already been extracted, plus its form fields.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FileUpsert {
    /// Document id; assigned by the service when absent.
    #[serde(default)]
    pub document_id: Option<String>,
    /// The extracted text.
    pub text: String,
    /// Author of the file.
    #[serde(default)]
    pub author: Option<String>,
    /// RFC 3339 creation timestamp.
    #[serde(default)]
    pub timestamp: Option<String>,
    /// Source collection (e.g. `file`, `email`).
    #[serde(default)]
    pub source: Option<String>,
    /// Identifier inside the source system.
    #[serde(default)]
    pub source_id: Option<String>,
    /// Comma-separated group tags.
    #[serde(default)]
    pub groups: Option<String>,
    /// How the text is split.
    #[serde(default)]
    pub chunking_strategy: ChunkingStrategy,
}

impl FileUpsert {
    /// Parse the form fields into a [`Document`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] if `timestamp` is not RFC 3339.
    pub fn to_document(&self) -> Result<Document> {
        let created_at = self
            .timestamp
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| {
                DateTime::parse_from_rfc3339(t)
                    .map(|t| t.with_timezone(&Utc))
                    .map_err(|e| RagError::ValidationError(format!("invalid timestamp '{t}': {e}")))
            })
            .transpose()?;

        let metadata = DocumentMetadata {
            source: self.source.clone(),
            source_id: self.source_id.clone(),
            created_at,
            author: self.author.clone(),
            tags: self.groups.as_deref().map(parse_groups).unwrap_or_default(),
            ..DocumentMetadata::default()
        };

        Ok(Document { id: self.document_id.clone(), text: self.text.clone(), metadata: Some(metadata) })
    }
}

fn parse_groups(groups: &str) -> Vec<String> {
    groups.split(',').map(str::trim).filter(|g| !g.is_empty()).map(String::from).collect()
}

/// A batch of queries.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryRequest {
    /// The queries, answered in order.
    pub queries: Vec<Query>,
}

/// One [`QueryResult`] per query, in request order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct QueryResponse {
    /// Results per query.
    pub results: Vec<QueryResult>,
}

/// Selects what to delete. Exactly one selector must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct DeleteRequest {
    /// Document ids whose chunks are removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ids: Option<Vec<String>>,
    /// Chunks matching this filter are removed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<MetadataFilter>,
    /// Remove everything.
    #[serde(default)]
    pub delete_all: bool,
}

impl DeleteRequest {
    /// Delete the given documents.
    pub fn ids(ids: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self { ids: Some(ids.into_iter().map(Into::into).collect()), ..Self::default() }
    }

    /// Delete every chunk matching `filter`.
    pub fn filter(filter: MetadataFilter) -> Self {
        Self { filter: Some(filter), ..Self::default() }
    }

    /// Delete everything.
    pub fn all() -> Self {
        Self { delete_all: true, ..Self::default() }
    }

    /// Resolve the request to a single [`DeleteTarget`].
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] unless exactly one of a non-empty
    /// `ids` list, a filter with at least one condition, or `delete_all = true`
    /// is given, and [`RagError::InvalidFilter`] for a malformed filter.
    /// Deleting everything always requires the explicit flag.
    pub fn target(&self) -> Result<DeleteTarget> {
        let selected = usize::from(self.ids.is_some())
            + usize::from(self.filter.is_some())
            + usize::from(self.delete_all);

        let target = match (selected, &self.ids, &self.filter) {
            (0, _, _) => {
                return Err(RagError::ValidationError(
                    "one of ids, filter or delete_all is required".into(),
                ));
            }
            (1, Some(ids), _) => DeleteTarget::Ids(ids.clone()),
            (1, None, Some(filter)) => DeleteTarget::Filter(filter.clone()),
            (1, None, None) => DeleteTarget::All,
            _ => {
                return Err(RagError::ValidationError(
                    "only one of ids, filter or delete_all may be set".into(),
                ));
            }
        };
        target.validate()?;
        Ok(target)
    }
}

/// Outcome of a delete.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct DeleteResponse {
    /// Whether anything was removed from the vector store.
    pub success: bool,
}
