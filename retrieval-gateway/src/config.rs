//! Configuration for the retrieval pipeline and vector store selection.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RagError, Result};
use crate::inmemory::InMemoryVectorStore;
use crate::vectorstore::VectorStore;

/// Retry settings for embedding provider calls.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RetryConfig {
    /// Total number of attempts, including the first one.
    pub max_attempts: u32,
    /// Delay before the first retry; doubles on each further retry.
    pub initial_delay: Duration,
    /// Upper bound for a single backoff delay.
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(10),
        }
    }
}

/// Configuration parameters for the retrieval pipeline.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RagConfig {
    /// Maximum chunk size in tokens.
    pub chunk_size: usize,
    /// Number of overlapping tokens between consecutive chunks.
    pub chunk_overlap: usize,
    /// Maximum number of chunks produced for a single document.
    pub max_chunks: usize,
    /// Number of results returned when a query does not set `top_k`.
    pub top_k: usize,
    /// Minimum similarity score for results. `None` keeps every result.
    pub similarity_threshold: Option<f32>,
    /// Maximum number of texts sent to the embedding provider in one request.
    pub embedding_batch_size: usize,
    /// Maximum number of embedding requests in flight for one call.
    pub max_concurrent_batches: usize,
    /// Timeout applied to every embedding provider request.
    pub embedding_timeout: Duration,
    /// Timeout applied to every vector store call.
    pub store_timeout: Duration,
    /// Retry policy for embedding provider requests.
    pub retry: RetryConfig,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 200,
            chunk_overlap: 40,
            max_chunks: 10_000,
            top_k: 3,
            similarity_threshold: None,
            embedding_batch_size: 128,
            max_concurrent_batches: 4,
            embedding_timeout: Duration::from_secs(30),
            store_timeout: Duration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}

impl RagConfig {
    /// Create a new builder for constructing a [`RagConfig`].
    pub fn builder() -> RagConfigBuilder {
        RagConfigBuilder::default()
    }

    /// Build a configuration from defaults overridden by environment variables.
    ///
    /// Recognised variables: `CHUNK_SIZE`, `CHUNK_OVERLAP`, `MAX_NUM_CHUNKS`,
    /// `DEFAULT_TOP_K`, `EMBEDDINGS_BATCH_SIZE`, `EMBEDDING_TIMEOUT_SECS`,
    /// `STORE_TIMEOUT_SECS`, `EMBEDDING_MAX_ATTEMPTS`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if a variable cannot be parsed or the
    /// resulting configuration is invalid.
    pub fn from_env() -> Result<Self> {
        let mut builder = Self::builder();
        if let Some(v) = env_var("CHUNK_SIZE")? {
            builder = builder.chunk_size(v);
        }
        if let Some(v) = env_var("CHUNK_OVERLAP")? {
            builder = builder.chunk_overlap(v);
        }
        if let Some(v) = env_var("MAX_NUM_CHUNKS")? {
            builder = builder.max_chunks(v);
        }
        if let Some(v) = env_var("DEFAULT_TOP_K")? {
            builder = builder.top_k(v);
        }
        if let Some(v) = env_var("EMBEDDINGS_BATCH_SIZE")? {
            builder = builder.embedding_batch_size(v);
        }
        if let Some(v) = env_var("EMBEDDING_TIMEOUT_SECS")? {
            builder = builder.embedding_timeout(Duration::from_secs(v));
        }
        if let Some(v) = env_var("STORE_TIMEOUT_SECS")? {
            builder = builder.store_timeout(Duration::from_secs(v));
        }
        if let Some(v) = env_var("EMBEDDING_MAX_ATTEMPTS")? {
            let retry = RetryConfig { max_attempts: v, ..RetryConfig::default() };
            builder = builder.retry(retry);
        }
        builder.build()
    }
}

/// Read and parse an optional environment variable.
fn env_var<T: FromStr>(name: &str) -> Result<Option<T>>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| RagError::ConfigError(format!("invalid {name} '{raw}': {e}"))),
        Err(_) => Ok(None),
    }
}

/// Smallest accepted `chunk_size`: one UTF-8 character can take four byte-level tokens.
pub const MIN_CHUNK_SIZE: usize = 4;

/// Builder for constructing a validated [`RagConfig`].
#[derive(Debug, Clone, Default)]
pub struct RagConfigBuilder {
    config: RagConfig,
}

impl RagConfigBuilder {
    /// Set the maximum chunk size in tokens.
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.config.chunk_size = size;
        self
    }

    /// Set the overlap between consecutive chunks in tokens.
    pub fn chunk_overlap(mut self, overlap: usize) -> Self {
        self.config.chunk_overlap = overlap;
        self
    }

    /// Set the maximum number of chunks per document.
    pub fn max_chunks(mut self, max_chunks: usize) -> Self {
        self.config.max_chunks = max_chunks;
        self
    }

    /// Set the default number of results per query.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the minimum similarity threshold for filtering results.
    pub fn similarity_threshold(mut self, threshold: f32) -> Self {
        self.config.similarity_threshold = Some(threshold);
        self
    }

    /// Set the maximum number of texts per embedding request.
    pub fn embedding_batch_size(mut self, size: usize) -> Self {
        self.config.embedding_batch_size = size;
        self
    }

    /// Set the maximum number of concurrent embedding requests.
    pub fn max_concurrent_batches(mut self, n: usize) -> Self {
        self.config.max_concurrent_batches = n;
        self
    }

    /// Set the timeout for each embedding provider request.
    pub fn embedding_timeout(mut self, timeout: Duration) -> Self {
        self.config.embedding_timeout = timeout;
        self
    }

    /// Set the timeout for each vector store call.
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.config.store_timeout = timeout;
        self
    }

    /// Set the retry policy for embedding requests.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.config.retry = retry;
        self
    }

    /// Build the [`RagConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if:
    /// - `chunk_size < MIN_CHUNK_SIZE` or `chunk_overlap >= chunk_size`
    /// - `top_k`, `max_chunks`, `embedding_batch_size` or `max_concurrent_batches` is zero
    /// - `retry.max_attempts == 0`
    /// - `similarity_threshold` is not finite
    pub fn build(self) -> Result<RagConfig> {
        let c = &self.config;
        if c.chunk_size < MIN_CHUNK_SIZE {
            return Err(RagError::ConfigError(format!(
                "chunk_size must be at least {MIN_CHUNK_SIZE}, got {}",
                c.chunk_size
            )));
        }
        if c.chunk_overlap >= c.chunk_size {
            return Err(RagError::ConfigError(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        let positive = [
            ("top_k", c.top_k),
            ("max_chunks", c.max_chunks),
            ("embedding_batch_size", c.embedding_batch_size),
            ("max_concurrent_batches", c.max_concurrent_batches),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, v)| *v == 0) {
            return Err(RagError::ConfigError(format!("{name} must be greater than zero")));
        }
        if c.retry.max_attempts == 0 {
            return Err(RagError::ConfigError("retry.max_attempts must be at least 1".to_string()));
        }
        if c.similarity_threshold.is_some_and(|t| !t.is_finite()) {
            return Err(RagError::ConfigError("similarity_threshold must be finite".to_string()));
        }
        Ok(self.config)
    }
}

/// Selects the vector store backend at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(tag = "backend", rename_all = "lowercase")]
pub enum VectorStoreConfig {
    /// Process-local store; contents are lost on restart.
    #[default]
    InMemory,
    /// A Qdrant collection reached over gRPC.
    Qdrant {
        /// Qdrant gRPC endpoint.
        url: String,
        /// Collection holding the chunks.
        collection: String,
    },
    /// A PostgreSQL table using the pgvector extension.
    PgVector {
        /// PostgreSQL connection string.
        database_url: String,
        /// Table holding the chunks.
        table: String,
    },
}

impl VectorStoreConfig {
    /// Read the backend selection from the environment.
    ///
    /// `DATASTORE` chooses the backend (`memory`, `qdrant`, `pgvector`;
    /// defaults to `memory`). Qdrant reads `QDRANT_URL` and `QDRANT_COLLECTION`;
    /// pgvector reads `DATABASE_URL` (required) and `PG_TABLE`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] for an unknown backend or a missing
    /// required variable.
    pub fn from_env() -> Result<Self> {
        let backend = std::env::var("DATASTORE").unwrap_or_else(|_| "memory".to_string());
        match backend.trim().to_ascii_lowercase().as_str() {
            "memory" | "inmemory" => Ok(Self::InMemory),
            "qdrant" => Ok(Self::Qdrant {
                url: std::env::var("QDRANT_URL")
                    .unwrap_or_else(|_| "http://localhost:6334".to_string()),
                collection: std::env::var("QDRANT_COLLECTION")
                    .unwrap_or_else(|_| "documents".to_string()),
            }),
            "pgvector" | "postgres" => Ok(Self::PgVector {
                database_url: std::env::var("DATABASE_URL").map_err(|_| {
                    RagError::ConfigError("DATABASE_URL environment variable not set".into())
                })?,
                table: std::env::var("PG_TABLE").unwrap_or_else(|_| "document_chunks".to_string()),
            }),
            other => Err(RagError::ConfigError(format!("unknown DATASTORE '{other}'"))),
        }
    }

    /// Connect to the configured backend and prepare it for `dimensions`-sized vectors.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the backend was not compiled in, or
    /// [`RagError::StoreUnavailable`] if it cannot be reached.
    pub async fn connect(&self, dimensions: usize) -> Result<Arc<dyn VectorStore>> {
        match self {
            Self::InMemory => {
                info!(backend = "in-memory", "using in-memory vector store");
                Ok(Arc::new(InMemoryVectorStore::new()))
            }
            #[cfg(feature = "qdrant")]
            Self::Qdrant { url, collection } => {
                let store = crate::qdrant::QdrantVectorStore::new(url, collection)?;
                store.create_collection(dimensions).await?;
                info!(backend = "qdrant", url, collection, "connected to vector store");
                Ok(Arc::new(store))
            }
            #[cfg(feature = "pgvector")]
            Self::PgVector { database_url, table } => {
                let store = crate::pgvector::PgVectorStore::new(database_url, table).await?;
                store.create_table(dimensions).await?;
                info!(backend = "pgvector", table, "connected to vector store");
                Ok(Arc::new(store))
            }
            #[allow(unreachable_patterns)]
            other => {
                let _ = dimensions;
                Err(RagError::ConfigError(format!(
                    "backend {other:?} requires a cargo feature that is not enabled"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let config = RagConfig::default();
        assert_eq!(config.chunk_size, 200);
        assert_eq!(config.chunk_overlap, 40);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.retry.max_attempts, 3);
        assert!(config.similarity_threshold.is_none());
        assert_eq!(RagConfig::builder().build().unwrap(), config);
    }

    #[test]
    fn builder_sets_values() {
        let config = RagConfig::builder()
            .chunk_size(40)
            .chunk_overlap(10)
            .top_k(5)
            .similarity_threshold(0.25)
            .embedding_batch_size(16)
            .build()
            .unwrap();
        assert_eq!(config.chunk_size, 40);
        assert_eq!(config.chunk_overlap, 10);
        assert_eq!(config.top_k, 5);
        assert_eq!(config.similarity_threshold, Some(0.25));
        assert_eq!(config.embedding_batch_size, 16);
    }

    #[test]
    fn rejects_inconsistent_values() {
        assert!(RagConfig::builder().chunk_size(100).chunk_overlap(100).build().is_err());
        assert!(RagConfig::builder().chunk_size(0).chunk_overlap(0).build().is_err());
        assert!(RagConfig::builder().chunk_size(2).chunk_overlap(0).build().is_err());
        assert!(RagConfig::builder().chunk_size(MIN_CHUNK_SIZE).chunk_overlap(0).build().is_ok());
        assert!(RagConfig::builder().top_k(0).build().is_err());
        assert!(RagConfig::builder().embedding_batch_size(0).build().is_err());
        assert!(RagConfig::builder().similarity_threshold(f32::NAN).build().is_err());

        let no_attempts = RetryConfig { max_attempts: 0, ..RetryConfig::default() };
        assert!(RagConfig::builder().retry(no_attempts).build().is_err());
    }

    #[test]
    fn store_config_deserializes_tagged() {
        let config: VectorStoreConfig = serde_json::from_str(
            r#"{"backend":"qdrant","url":"http://localhost:6334","collection":"docs"}"#,
        )
        .unwrap();
        assert_eq!(
            config,
            VectorStoreConfig::Qdrant {
                url: "http://localhost:6334".into(),
                collection: "docs".into()
            }
        );

        let config: VectorStoreConfig = serde_json::from_str(r#"{"backend":"inmemory"}"#).unwrap();
        assert_eq!(config, VectorStoreConfig::InMemory);
    }

    #[tokio::test]
    async fn connects_in_memory_store() {
        let store = VectorStoreConfig::InMemory.connect(8).await.unwrap();
        assert_eq!(store.backend(), "in-memory");
    }
}
