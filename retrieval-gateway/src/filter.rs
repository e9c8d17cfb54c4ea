//! Metadata filters for narrowing queries and deletions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::document::Chunk;
use crate::error::{RagError, Result};

/// A conjunction of conditions over chunk metadata.
///
/// Every field that is set must match. `start_date` and `end_date` bound the
/// chunk's `created_at` inclusively; a chunk without `created_at` never matches
/// a time range. Every tag in `tags` must be present on the chunk.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MetadataFilter {
    /// Exact parent document id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub document_id: Option<String>,
    /// Exact source.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Exact source id.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
    /// Exact author.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    /// Earliest accepted `created_at` (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_date: Option<DateTime<Utc>>,
    /// Latest accepted `created_at` (inclusive).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_date: Option<DateTime<Utc>>,
    /// Tags that must all be present.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl MetadataFilter {
    /// A filter matching a single document.
    pub fn for_document(document_id: impl Into<String>) -> Self {
        Self { document_id: Some(document_id.into()), ..Self::default() }
    }

    /// Whether no condition is set (the filter matches everything).
    pub fn is_empty(&self) -> bool {
        self.document_id.is_none()
            && self.source.is_none()
            && self.source_id.is_none()
            && self.author.is_none()
            && self.start_date.is_none()
            && self.end_date.is_none()
            && self.tags.is_empty()
    }

    /// Check that the filter is well formed.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidFilter`] if a string condition or tag is blank,
    /// or if `start_date` is after `end_date`.
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("document_id", &self.document_id),
            ("source", &self.source),
            ("source_id", &self.source_id),
            ("author", &self.author),
        ];
        for (name, value) in fields {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(RagError::InvalidFilter(format!("{name} must not be blank")));
            }
        }
        if self.tags.iter().any(|t| t.trim().is_empty()) {
            return Err(RagError::InvalidFilter("tags must not contain blank entries".into()));
        }
        if let (Some(start), Some(end)) = (self.start_date, self.end_date) {
            if start > end {
                return Err(RagError::InvalidFilter(format!(
                    "start_date ({start}) is after end_date ({end})"
                )));
            }
        }
        Ok(())
    }

    /// Evaluate the filter against a stored chunk.
    pub fn matches(&self, chunk: &Chunk) -> bool {
        let meta = &chunk.metadata.document;

        if self.document_id.as_ref().is_some_and(|id| *id != chunk.document_id) {
            return false;
        }
        if !equals(&self.source, &meta.source)
            || !equals(&self.source_id, &meta.source_id)
            || !equals(&self.author, &meta.author)
        {
            return false;
        }
        if self.start_date.is_some() || self.end_date.is_some() {
            let Some(created_at) = meta.created_at else {
                return false;
            };
            if self.start_date.is_some_and(|start| created_at < start)
                || self.end_date.is_some_and(|end| created_at > end)
            {
                return false;
            }
        }
        self.tags.iter().all(|tag| meta.tags.contains(tag))
    }
}

fn equals(expected: &Option<String>, actual: &Option<String>) -> bool {
    match expected {
        Some(expected) => actual.as_ref() == Some(expected),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::document::{ChunkMetadata, DocumentMetadata};

    fn chunk(created_at: Option<DateTime<Utc>>, tags: &[&str]) -> Chunk {
        Chunk {
            id: "doc1-0".into(),
            text: "hello".into(),
            embedding: Vec::new(),
            metadata: ChunkMetadata {
                document: DocumentMetadata {
                    source: Some("email".into()),
                    author: Some("ada".into()),
                    created_at,
                    document_id: Some("doc1".into()),
                    tags: tags.iter().map(|t| t.to_string()).collect(),
                    ..DocumentMetadata::default()
                },
                chunk_index: 0,
            },
            document_id: "doc1".into(),
        }
    }

    fn day(d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn empty_filter_matches_everything() {
        let filter = MetadataFilter::default();
        assert!(filter.is_empty());
        assert!(filter.matches(&chunk(None, &[])));
    }

    #[test]
    fn equality_conditions_are_conjunctive() {
        let c = chunk(None, &[]);
        let mut filter = MetadataFilter::for_document("doc1");
        filter.source = Some("email".into());
        assert!(filter.matches(&c));

        filter.author = Some("grace".into());
        assert!(!filter.matches(&c));
    }

    #[test]
    fn time_range_is_inclusive_and_requires_created_at() {
        let c = chunk(Some(day(10)), &[]);
        let filter =
            MetadataFilter { start_date: Some(day(10)), end_date: Some(day(10)), ..Default::default() };
        assert!(filter.matches(&c));

        let later = MetadataFilter { start_date: Some(day(11)), ..Default::default() };
        assert!(!later.matches(&c));

        assert!(!filter.matches(&chunk(None, &[])));
    }

    #[test]
    fn every_tag_must_be_present() {
        let c = chunk(None, &["sales", "emea"]);
        let filter = MetadataFilter { tags: vec!["sales".into()], ..Default::default() };
        assert!(filter.matches(&c));

        let filter =
            MetadataFilter { tags: vec!["sales".into(), "apac".into()], ..Default::default() };
        assert!(!filter.matches(&c));
    }

    #[test]
    fn rejects_inverted_range_and_blank_fields() {
        let inverted =
            MetadataFilter { start_date: Some(day(12)), end_date: Some(day(1)), ..Default::default() };
        assert!(matches!(inverted.validate(), Err(RagError::InvalidFilter(_))));

        let blank = MetadataFilter { source: Some("  ".into()), ..Default::default() };
        assert!(matches!(blank.validate(), Err(RagError::InvalidFilter(_))));

        let blank_tag = MetadataFilter { tags: vec![String::new()], ..Default::default() };
        assert!(matches!(blank_tag.validate(), Err(RagError::InvalidFilter(_))));

        assert!(MetadataFilter::for_document("doc1").validate().is_ok());
    }
}
