//! # retrieval-gateway
//!
//! Document ingestion and similarity retrieval behind narrow async traits.
//!
//! ## Overview
//!
//! The gateway accepts documents, splits them into overlapping token windows,
//! embeds the windows through an [`EmbeddingProvider`], stores the vectors in a
//! [`VectorStore`], and answers batches of natural-language queries with
//! optional metadata filters. [`RetrievalService`] ties the pieces together:
//!
//! - [`TokenChunker`] / [`LineChunker`] - deterministic overlapping chunking
//! - [`Embedder`] - batching, per-request timeouts and [`RetryPolicy`]
//! - [`InMemoryVectorStore`] - default backend; Qdrant and pgvector behind features
//! - [`MetadataStore`] - side-store for file ingest metadata
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use retrieval_gateway::{
//!     Document, InMemoryVectorStore, Query, RagConfig, RetrievalService,
//!     openai::OpenAIEmbeddingProvider,
//! };
//!
//! let service = RetrievalService::builder()
//!     .config(RagConfig::from_env()?)
//!     .embedding_provider(Arc::new(OpenAIEmbeddingProvider::from_env()?))
//!     .vector_store(Arc::new(InMemoryVectorStore::new()))
//!     .build()?;
//!
//! service.upsert(vec![Document::new("doc1", "Rust is a systems language.")]).await?;
//! let results = service.query(&[Query::new("what is rust?")]).await?;
//! ```
//!
//! ## Features
//!
//! | Feature | Enables |
//! |---------|---------|
//! | `openai` (default) | [`openai::OpenAIEmbeddingProvider`] |
//! | `qdrant` | `qdrant::QdrantVectorStore` |
//! | `pgvector` | `pgvector::PgVectorStore` |
//! | `full` | all of the above |

pub mod api;
pub mod chunking;
pub mod config;
pub mod document;
pub mod embedder;
pub mod embedding;
pub mod error;
pub mod filter;
pub mod inmemory;
pub mod metadata;
#[cfg(feature = "openai")]
pub mod openai;
#[cfg(feature = "pgvector")]
pub mod pgvector;
pub mod pipeline;
#[cfg(feature = "qdrant")]
pub mod qdrant;
pub mod reranker;
pub mod retry;
pub mod tokenizer;
pub mod vectorstore;

pub use api::{
    DeleteRequest, DeleteResponse, FileUpsert, QueryRequest, QueryResponse, UpsertRequest,
    UpsertResponse,
};
pub use chunking::{Chunker, ChunkingStrategy, LineChunker, TokenChunker};
pub use config::{MIN_CHUNK_SIZE, RagConfig, RagConfigBuilder, RetryConfig, VectorStoreConfig};
pub use document::{
    Chunk, ChunkMetadata, Document, DocumentChunks, DocumentMetadata, Query, QueryResult,
    QueryWithEmbedding, SearchResult,
};
pub use embedder::Embedder;
pub use embedding::EmbeddingProvider;
pub use error::{RagError, Result};
pub use filter::MetadataFilter;
pub use inmemory::InMemoryVectorStore;
pub use metadata::{InMemoryMetadataStore, MetadataRecord, MetadataStore};
#[cfg(feature = "openai")]
pub use openai::OpenAIEmbeddingProvider;
pub use pipeline::{IngestStage, RetrievalService, RetrievalServiceBuilder};
pub use reranker::{NoOpReranker, Reranker};
pub use retry::RetryPolicy;
pub use tokenizer::{CharTokenizer, Cl100kTokenizer, Tokenizer};
pub use vectorstore::{DeleteTarget, VectorStore};
