//! # Ingest and query
//!
//! Runs the retrieval service end to end: upsert documents, upsert a
//! transcript file with the `lines` strategy, answer a batch of filtered
//! queries, then delete.
//!
//! The backend comes from `DATASTORE` (default `memory`). When
//! `OPENAI_API_KEY` is set the OpenAI embeddings API is used; otherwise a
//! deterministic hash embedder keeps the demo offline.
//!
//! Run: `RUST_LOG=retrieval_gateway=debug cargo run --example ingest_and_query`

use std::sync::Arc;

use async_trait::async_trait;
use retrieval_gateway::{
    ChunkingStrategy, DeleteRequest, Document, DocumentMetadata, EmbeddingProvider, FileUpsert,
    MetadataFilter, OpenAIEmbeddingProvider, Query, QueryRequest, RagConfig, RetrievalService,
    UpsertRequest, VectorStoreConfig,
};
use tracing_subscriber::EnvFilter;

/// Bag-of-words hashing embedder for running without an API key.
struct HashEmbeddingProvider {
    dimensions: usize,
}

#[async_trait]
impl EmbeddingProvider for HashEmbeddingProvider {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, text: &str) -> retrieval_gateway::Result<Vec<f32>> {
        let mut embedding = vec![0.0f32; self.dimensions];
        for word in text.split_whitespace() {
            let hash = word
                .to_lowercase()
                .bytes()
                .fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
            embedding[(hash % self.dimensions as u64) as usize] += 1.0;
        }
        Ok(embedding)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

fn embedding_provider() -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    if std::env::var("OPENAI_API_KEY").is_ok() {
        return Ok(Arc::new(OpenAIEmbeddingProvider::from_env()?));
    }
    Ok(Arc::new(HashEmbeddingProvider { dimensions: 256 }))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // -- 1. Wire the service from the environment -------------------------
    let config = RagConfig::from_env()?;
    let provider = embedding_provider()?;
    let store = VectorStoreConfig::from_env()?.connect(provider.dimensions()).await?;

    let service = RetrievalService::builder()
        .config(config)
        .embedding_provider(provider)
        .vector_store(store)
        .build()?;

    // -- 2. Upsert documents ----------------------------------------------
    let rust = DocumentMetadata {
        source: Some("file".into()),
        author: Some("ferris".into()),
        created_at: Some("2024-05-01T09:00:00Z".parse()?),
        tags: vec!["languages".into()],
        ..Default::default()
    };
    let request = UpsertRequest {
        documents: vec![
            Document::new(
                "rust",
                "Rust is a systems programming language focused on safety, speed, and \
                 concurrency. It achieves memory safety without a garbage collector.",
            )
            .with_metadata(rust),
            Document::new(
                "rag",
                "Retrieval gateways chunk documents, embed the chunks, and store them in a \
                 vector index. Queries are embedded the same way and matched by similarity.",
            ),
            Document { text: "A document without an id gets one assigned.".into(), ..Default::default() },
        ],
    };
    let response = service.upsert_request(request).await?;
    println!("upserted: {:?}", response.ids);

    // -- 3. Upsert a transcript file ----------------------------------------
    let transcript = FileUpsert {
        document_id: Some("standup".into()),
        text: "Ada: the index rebuild finished overnight.\n\
               Grace: query latency is back under 50ms.\n\
               Ada: next we tune the chunk overlap.\n"
            .into(),
        author: Some("ada".into()),
        timestamp: Some("2024-05-02T10:00:00Z".into()),
        source: Some("chat".into()),
        groups: Some("engineering, standup".into()),
        chunking_strategy: ChunkingStrategy::Lines,
        ..Default::default()
    };
    service.upsert_file(transcript).await?;

    // -- 4. Query -----------------------------------------------------------
    let request = QueryRequest {
        queries: vec![
            Query::new("how does rust stay memory safe?"),
            Query::new("what happened to query latency?").with_filter(MetadataFilter {
                tags: vec!["standup".into()],
                ..Default::default()
            }),
            Query::new("vector index").with_top_k(1),
        ],
    };
    let response = service.query_request(request).await?;
    for result in &response.results {
        println!("\nQuery: {}", result.query);
        for (i, hit) in result.results.iter().enumerate() {
            println!("  {}. [{:.3}] {} :: {}", i + 1, hit.score, hit.chunk.id, hit.chunk.text.trim());
        }
    }

    // -- 5. Delete ----------------------------------------------------------
    service.delete(&DeleteRequest::ids(["rag"])).await?;
    let standup = MetadataFilter {
        document_id: Some("standup".into()),
        source: Some("chat".into()),
        ..Default::default()
    };
    service.delete(&DeleteRequest::filter(standup)).await?;
    println!("\ndeleted 'rag' and 'standup'");

    Ok(())
}
