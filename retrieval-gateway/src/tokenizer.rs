//! Tokenizers used to measure chunk windows.
//!
//! Chunk sizes are expressed in tokens. [`Cl100kTokenizer`] uses the
//! `cl100k_base` BPE shared by current OpenAI embedding models;
//! [`CharTokenizer`] counts Unicode scalar values and needs no vocabulary.

use tiktoken_rs::CoreBPE;

use crate::error::{RagError, Result};

/// Converts text to and from token ids.
///
/// `decode(encode(text)) == text` must hold for any text, and decoding the
/// concatenation of two encodings must equal the concatenation of the texts.
pub trait Tokenizer: Send + Sync {
    /// Encode text into token ids.
    fn encode(&self, text: &str) -> Vec<u32>;

    /// Decode a run of token ids back into text.
    fn decode(&self, tokens: &[u32]) -> Result<String>;

    /// Count the tokens in `text`.
    fn count(&self, text: &str) -> usize {
        self.encode(text).len()
    }
}

/// The `cl100k_base` byte-pair encoding.
pub struct Cl100kTokenizer {
    bpe: CoreBPE,
}

impl Cl100kTokenizer {
    /// Load the embedded `cl100k_base` vocabulary.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the vocabulary cannot be loaded.
    pub fn new() -> Result<Self> {
        let bpe = tiktoken_rs::cl100k_base()
            .map_err(|e| RagError::ConfigError(format!("failed to load cl100k_base: {e}")))?;
        Ok(Self { bpe })
    }
}

impl std::fmt::Debug for Cl100kTokenizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Cl100kTokenizer").finish_non_exhaustive()
    }
}

impl Tokenizer for Cl100kTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        // Special-token markup inside documents is ordinary text.
        self.bpe.encode_ordinary(text)
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        self.bpe
            .decode(tokens.to_vec())
            .map_err(|e| RagError::ChunkingError(format!("failed to decode tokens: {e}")))
    }
}

/// One token per Unicode scalar value.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharTokenizer;

impl Tokenizer for CharTokenizer {
    fn encode(&self, text: &str) -> Vec<u32> {
        text.chars().map(u32::from).collect()
    }

    fn decode(&self, tokens: &[u32]) -> Result<String> {
        tokens
            .iter()
            .map(|t| {
                char::from_u32(*t)
                    .ok_or_else(|| RagError::ChunkingError(format!("invalid char token {t}")))
            })
            .collect()
    }

    fn count(&self, text: &str) -> usize {
        text.chars().count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn char_tokenizer_round_trips_unicode() {
        let text = "naïve café — ok";
        let tokens = CharTokenizer.encode(text);
        assert_eq!(tokens.len(), CharTokenizer.count(text));
        assert_eq!(CharTokenizer.decode(&tokens).unwrap(), text);
    }

    #[test]
    fn char_tokenizer_rejects_surrogates() {
        assert!(CharTokenizer.decode(&[0xD800]).is_err());
    }

    #[test]
    fn cl100k_counts_common_words() {
        let tokenizer = Cl100kTokenizer::new().unwrap();
        let tokens = tokenizer.encode("Hello world");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokenizer.decode(&tokens).unwrap(), "Hello world");
    }
}
