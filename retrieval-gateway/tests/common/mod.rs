//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use retrieval_gateway::{
    EmbeddingProvider, InMemoryVectorStore, RagConfig, RagError, Result, RetrievalService,
    Tokenizer,
};

pub const DIMENSIONS: usize = 64;

/// Deterministic bag-of-words embedder: identical texts get identical vectors.
#[derive(Debug, Default)]
pub struct HashEmbedder {
    /// Texts containing this marker fail permanently.
    pub fail_on: Option<String>,
    pub calls: AtomicUsize,
}

impl HashEmbedder {
    pub fn failing_on(marker: &str) -> Self {
        Self { fail_on: Some(marker.to_string()), ..Self::default() }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

fn fnv1a(word: &str) -> u64 {
    word.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| (hash ^ u64::from(b)).wrapping_mul(0x100_0000_01b3))
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    fn name(&self) -> &str {
        "hash"
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if self.fail_on.as_deref().is_some_and(|marker| text.contains(marker)) {
            return Err(RagError::permanent_embedding("hash", format!("refusing '{text}'")));
        }
        let mut vector = vec![0.0; DIMENSIONS];
        for word in text.split_whitespace() {
            let word = word.to_lowercase();
            vector[(fnv1a(&word) % DIMENSIONS as u64) as usize] += 1.0;
        }
        Ok(vector)
    }

    async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }

    fn dimensions(&self) -> usize {
        DIMENSIONS
    }
}

/// Two ASCII characters per token, with a single-character tail token.
#[derive(Debug, Clone, Copy, Default)]
pub struct BigramTokenizer;

impl Tokenizer for BigramTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.as_bytes()
            .chunks(2)
            .map(|pair| match pair {
                [a, b] => 128 + u32::from(*a) * 128 + u32::from(*b),
                [a] => u32::from(*a),
                _ => unreachable!(),
            })
            .collect()
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        let mut text = String::new();
        for &token in tokens {
            if token >= 128 {
                let pair = token - 128;
                text.push(char::from((pair / 128) as u8));
                text.push(char::from((pair % 128) as u8));
            } else {
                text.push(char::from(token as u8));
            }
        }
        Ok(text)
    }
}

/// A service over an in-memory store with the given chunk sizes.
pub fn service(
    chunk_size: usize,
    chunk_overlap: usize,
    tokenizer: Arc<dyn Tokenizer>,
) -> (RetrievalService, Arc<InMemoryVectorStore>) {
    let config =
        RagConfig::builder().chunk_size(chunk_size).chunk_overlap(chunk_overlap).build().unwrap();
    let store = Arc::new(InMemoryVectorStore::new());
    let service = RetrievalService::builder()
        .config(config)
        .embedding_provider(Arc::new(HashEmbedder::default()))
        .vector_store(store.clone())
        .tokenizer(tokenizer)
        .build()
        .unwrap();
    (service, store)
}

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}
