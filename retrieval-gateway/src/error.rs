//! Error types for the `retrieval-gateway` crate.

use thiserror::Error;

/// Errors that can occur in retrieval operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// The request was rejected before any external call was made.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// A metadata filter could not be applied.
    #[error("Invalid filter: {0}")]
    InvalidFilter(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingError {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
        /// Whether repeating the request may succeed (rate limits, 5xx, timeouts).
        retryable: bool,
    },

    /// The vector store backend could not serve the request.
    #[error("Vector store unavailable ({backend}): {message}")]
    StoreUnavailable {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// An error occurred during document chunking.
    #[error("Chunking error: {0}")]
    ChunkingError(String),

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// The metadata side-store rejected a write or removal.
    #[error("Metadata store error: {0}")]
    MetadataStoreError(String),
}

impl RagError {
    /// Build a transient embedding error that the retry policy may repeat.
    pub fn transient_embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingError { provider: provider.into(), message: message.into(), retryable: true }
    }

    /// Build a permanent embedding error (invalid input, auth failure).
    pub fn permanent_embedding(provider: impl Into<String>, message: impl Into<String>) -> Self {
        Self::EmbeddingError {
            provider: provider.into(),
            message: message.into(),
            retryable: false,
        }
    }

    /// Build a store error for the named backend.
    pub fn store_unavailable(backend: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StoreUnavailable { backend: backend.into(), message: message.into() }
    }

    /// Whether the error is transient and the operation may be repeated.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::EmbeddingError { retryable: true, .. })
    }

    /// Whether the error was caused by the caller's input.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::ValidationError(_) | Self::InvalidFilter(_))
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
