//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`TokenChunker`] - sentence-aware windows of at most `chunk_size` tokens
//! - [`LineChunker`] - windows of whole lines, for transcripts and other line-structured text
//!
//! Both produce consecutive windows that overlap by up to `chunk_overlap`
//! tokens, and both are deterministic: the same text and settings always
//! yield the same chunk boundaries and ids.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::config::RagConfig;
use crate::document::{Chunk, ChunkMetadata, Document};
use crate::error::{RagError, Result};
use crate::tokenizer::Tokenizer;

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no embeddings.
/// Embeddings are attached later by the retrieval service.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document text is empty or whitespace.
    /// Each returned chunk has an empty embedding vector.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ValidationError`] if the document has no id, or
    /// [`RagError::ChunkingError`] if the text cannot be tokenized.
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>>;
}

/// Which [`Chunker`] to apply to a document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkingStrategy {
    /// Sentence-aware token windows.
    #[default]
    Tokens,
    /// Whole-line windows.
    Lines,
}

impl fmt::Display for ChunkingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tokens => f.write_str("tokens"),
            Self::Lines => f.write_str("lines"),
        }
    }
}

impl FromStr for ChunkingStrategy {
    type Err = RagError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tokens" => Ok(Self::Tokens),
            "lines" => Ok(Self::Lines),
            other => Err(RagError::ValidationError(format!(
                "unknown chunking strategy '{other}' (expected 'tokens' or 'lines')"
            ))),
        }
    }
}

/// Splits text into overlapping windows of at most `chunk_size` tokens.
///
/// The text is first split into sentence units (after `\n`, `. `, `! ` and `? `).
/// A window that does not reach the end of the text is cut at the last unit
/// boundary past its midpoint; when no such boundary exists the window is
/// hard-cut at `chunk_size` tokens. The next window starts `chunk_overlap`
/// tokens before the previous cut.
///
/// Chunk IDs are generated as `{document_id}-{chunk_index}`. Each chunk inherits
/// the parent document's metadata plus a `chunk_index` field.
///
/// # Example
///
/// ```rust,ignore
/// use retrieval_gateway::{CharTokenizer, TokenChunker};
///
/// let chunker = TokenChunker::new(Arc::new(CharTokenizer), 256, 50);
/// let chunks = chunker.chunk(&document)?;
/// ```
#[derive(Clone)]
pub struct TokenChunker {
    tokenizer: Arc<dyn Tokenizer>,
    chunk_size: usize,
    chunk_overlap: usize,
    max_chunks: usize,
}

impl TokenChunker {
    /// Create a new `TokenChunker`.
    ///
    /// # Arguments
    ///
    /// * `tokenizer` - measures window sizes
    /// * `chunk_size` - maximum number of tokens per chunk
    /// * `chunk_overlap` - number of overlapping tokens between consecutive chunks
    pub fn new(tokenizer: Arc<dyn Tokenizer>, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { tokenizer, chunk_size: chunk_size.max(1), chunk_overlap, max_chunks: usize::MAX }
    }

    /// Create a chunker using the sizes from a [`RagConfig`].
    pub fn from_config(tokenizer: Arc<dyn Tokenizer>, config: &RagConfig) -> Self {
        Self::new(tokenizer, config.chunk_size, config.chunk_overlap)
            .with_max_chunks(config.max_chunks)
    }

    /// Cap the number of chunks produced per document.
    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks;
        self
    }

    fn windows(&self, text: &str) -> Result<Vec<String>> {
        let mut tokens = Vec::new();
        let mut boundaries = Vec::new();
        for unit in split_sentences(text) {
            tokens.extend(self.tokenizer.encode(unit));
            boundaries.push(tokens.len());
        }
        token_windows(self.tokenizer.as_ref(), &tokens, &boundaries, self.window())
    }

    fn window(&self) -> Window {
        Window { size: self.chunk_size, overlap: self.chunk_overlap, max: self.max_chunks }
    }
}

impl fmt::Debug for TokenChunker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenChunker")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("max_chunks", &self.max_chunks)
            .finish_non_exhaustive()
    }
}

impl Chunker for TokenChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        let document_id = require_id(document)?;
        if document.text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let windows = self.windows(&document.text)?;
        Ok(build_chunks(document, document_id, windows))
    }
}

/// Groups whole lines into windows of at most `chunk_size` tokens.
///
/// Intended for transcripts and other line-oriented text where a speaker turn
/// should never be split. Overlap carries the trailing lines of the previous
/// window whose combined size fits in `chunk_overlap` tokens. A single line
/// longer than `chunk_size` is hard-wrapped into token windows.
#[derive(Clone)]
pub struct LineChunker {
    tokenizer: Arc<dyn Tokenizer>,
    chunk_size: usize,
    chunk_overlap: usize,
    max_chunks: usize,
}

impl LineChunker {
    /// Create a new `LineChunker`.
    pub fn new(tokenizer: Arc<dyn Tokenizer>, chunk_size: usize, chunk_overlap: usize) -> Self {
        Self { tokenizer, chunk_size: chunk_size.max(1), chunk_overlap, max_chunks: usize::MAX }
    }

    /// Create a chunker using the sizes from a [`RagConfig`].
    pub fn from_config(tokenizer: Arc<dyn Tokenizer>, config: &RagConfig) -> Self {
        Self::new(tokenizer, config.chunk_size, config.chunk_overlap)
            .with_max_chunks(config.max_chunks)
    }

    /// Cap the number of chunks produced per document.
    pub fn with_max_chunks(mut self, max_chunks: usize) -> Self {
        self.max_chunks = max_chunks;
        self
    }

    fn windows(&self, text: &str) -> Result<Vec<String>> {
        let mut windows = Vec::new();
        let mut current: Vec<(&str, usize)> = Vec::new();
        let mut current_tokens = 0;

        for line in text.split_inclusive('\n') {
            let count = self.tokenizer.count(line);

            if count > self.chunk_size {
                push_lines(&mut windows, &current);
                current.clear();
                current_tokens = 0;
                let tokens = self.tokenizer.encode(line);
                let wrap = Window { max: usize::MAX, ..self.window() };
                windows.extend(token_windows(self.tokenizer.as_ref(), &tokens, &[], wrap)?);
                continue;
            }

            if current_tokens + count > self.chunk_size {
                push_lines(&mut windows, &current);

                let mut carried = 0;
                let mut keep = current.len();
                while keep > 0 && carried + current[keep - 1].1 <= self.chunk_overlap {
                    keep -= 1;
                    carried += current[keep].1;
                }
                current.drain(..keep);
                while carried + count > self.chunk_size && !current.is_empty() {
                    carried -= current.remove(0).1;
                }
                current_tokens = carried;
            }

            current.push((line, count));
            current_tokens += count;
        }
        push_lines(&mut windows, &current);

        if windows.len() > self.max_chunks {
            warn!(
                produced = windows.len(),
                max_chunks = self.max_chunks,
                "document exceeds chunk limit, dropping trailing lines"
            );
            windows.truncate(self.max_chunks);
        }
        Ok(windows)
    }

    fn window(&self) -> Window {
        Window { size: self.chunk_size, overlap: self.chunk_overlap, max: self.max_chunks }
    }
}

impl fmt::Debug for LineChunker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineChunker")
            .field("chunk_size", &self.chunk_size)
            .field("chunk_overlap", &self.chunk_overlap)
            .field("max_chunks", &self.max_chunks)
            .finish_non_exhaustive()
    }
}

impl Chunker for LineChunker {
    fn chunk(&self, document: &Document) -> Result<Vec<Chunk>> {
        let document_id = require_id(document)?;
        if document.text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let windows = self.windows(&document.text)?;
        Ok(build_chunks(document, document_id, windows))
    }
}

/// Window sizing shared by both chunkers.
#[derive(Debug, Clone, Copy)]
struct Window {
    size: usize,
    overlap: usize,
    max: usize,
}

fn require_id(document: &Document) -> Result<&str> {
    document
        .id
        .as_deref()
        .ok_or_else(|| RagError::ValidationError("document id must be assigned before chunking".into()))
}

fn build_chunks(document: &Document, document_id: &str, windows: Vec<String>) -> Vec<Chunk> {
    let mut inherited = document.metadata.clone().unwrap_or_default();
    inherited.document_id = Some(document_id.to_string());

    windows
        .into_iter()
        .enumerate()
        .map(|(i, text)| Chunk {
            id: Chunk::chunk_id(document_id, i),
            text,
            embedding: Vec::new(),
            metadata: ChunkMetadata { document: inherited.clone(), chunk_index: i },
            document_id: document_id.to_string(),
        })
        .collect()
}

/// Append the concatenated lines as a window unless they are blank.
fn push_lines(windows: &mut Vec<String>, lines: &[(&str, usize)]) {
    let text: String = lines.iter().map(|(line, _)| *line).collect();
    if !text.trim().is_empty() {
        windows.push(text);
    }
}

/// Split text after sentence and line terminators, keeping the terminator
/// attached to the preceding unit.
fn split_sentences(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut units = Vec::new();
    let mut start = 0;
    let mut i = 0;

    while i < bytes.len() {
        let end = match bytes[i] {
            b'\n' => Some(i + 1),
            b'.' | b'!' | b'?' if bytes.get(i + 1) == Some(&b' ') => Some(i + 2),
            _ => None,
        };
        if let Some(end) = end {
            units.push(&text[start..end]);
            start = end;
            i = end;
        } else {
            i += 1;
        }
    }

    if start < text.len() {
        units.push(&text[start..]);
    }
    units
}

/// Cut a token sequence into overlapping windows, preferring unit boundaries.
///
/// `boundaries` holds ascending token offsets at which a unit ends.
fn token_windows(
    tokenizer: &dyn Tokenizer,
    tokens: &[u32],
    boundaries: &[usize],
    window: Window,
) -> Result<Vec<String>> {
    let mut windows = Vec::new();
    let mut start = 0;

    while start < tokens.len() {
        if windows.len() == window.max {
            warn!(max_chunks = window.max, "document exceeds chunk limit, dropping trailing text");
            break;
        }

        let mut end = (start + window.size).min(tokens.len());
        if end < tokens.len() {
            let midpoint = start + window.size / 2;
            let idx = boundaries.partition_point(|&b| b <= end);
            if let Some(&boundary) = idx.checked_sub(1).and_then(|i| boundaries.get(i)) {
                if boundary > midpoint {
                    end = boundary;
                }
            }
        }

        let (text, aligned_start, aligned_end) = decode_aligned(tokenizer, tokens, start, end)?;
        if !text.trim().is_empty() {
            windows.push(text);
        }

        if aligned_end >= tokens.len() {
            break;
        }
        let next = aligned_end.saturating_sub(window.overlap);
        start = if next > aligned_start { next } else { aligned_end };
    }

    Ok(windows)
}

/// Decode `tokens[start..end]`, nudging the edges inwards when a hard cut
/// splits a multi-byte character across tokens. A window too narrow to hold
/// one whole character grows past `end` until it does.
fn decode_aligned(
    tokenizer: &dyn Tokenizer,
    tokens: &[u32],
    start: usize,
    end: usize,
) -> Result<(String, usize, usize)> {
    let first_error = match tokenizer.decode(&tokens[start..end]) {
        Ok(text) => return Ok((text, start, end)),
        Err(e) => e,
    };

    // A UTF-8 character spans at most four byte-level tokens.
    for shift_end in 0..4 {
        for shift_start in 0..4 {
            let (s, e) = (start + shift_start, end.saturating_sub(shift_end));
            if s >= e || (s == start && e == end) {
                continue;
            }
            if let Ok(text) = tokenizer.decode(&tokens[s..e]) {
                return Ok((text, s, e));
            }
        }
    }

    for grow in 1..4 {
        let e = (end + grow).min(tokens.len());
        for shift_start in 0..4 {
            let s = start + shift_start;
            if s >= e {
                break;
            }
            if let Ok(text) = tokenizer.decode(&tokens[s..e]) {
                return Ok((text, s, e));
            }
        }
        if e == tokens.len() {
            break;
        }
    }
    Err(first_error)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::DocumentMetadata;
    use crate::tokenizer::CharTokenizer;

    fn chars() -> Arc<dyn Tokenizer> {
        Arc::new(CharTokenizer)
    }

    #[test]
    fn splits_after_terminators() {
        let units = split_sentences("One. Two! Three?\nFour");
        assert_eq!(units, vec!["One. ", "Two! ", "Three?\n", "Four"]);
        assert_eq!(split_sentences("3.14 is pi"), vec!["3.14 is pi"]);
    }

    #[test]
    fn empty_and_blank_text_produce_no_chunks() {
        let chunker = TokenChunker::new(chars(), 10, 2);
        assert!(chunker.chunk(&Document::new("d", "")).unwrap().is_empty());
        assert!(chunker.chunk(&Document::new("d", "  \n\n ")).unwrap().is_empty());
    }

    #[test]
    fn short_text_is_one_chunk() {
        let chunker = TokenChunker::new(chars(), 200, 40);
        let chunks = chunker.chunk(&Document::new("doc", "Short text.")).unwrap();
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].id, "doc-0");
        assert_eq!(chunks[0].text, "Short text.");
    }

    #[test]
    fn requires_document_id() {
        let chunker = TokenChunker::new(chars(), 10, 2);
        let document = Document { id: None, text: "hello".into(), metadata: None };
        assert!(matches!(chunker.chunk(&document), Err(RagError::ValidationError(_))));
    }

    #[test]
    fn prefers_sentence_boundaries() {
        let chunker = TokenChunker::new(chars(), 20, 0);
        let text = "Alpha beta gamma. Delta epsilon zeta.";
        let chunks = chunker.chunk(&Document::new("doc", text)).unwrap();
        assert_eq!(chunks[0].text, "Alpha beta gamma. ");
        assert_eq!(chunks[1].text, "Delta epsilon zeta.");
    }

    #[test]
    fn hard_cuts_overlap_by_configured_tokens() {
        let chunker = TokenChunker::new(chars(), 10, 4);
        let chunks = chunker.chunk(&Document::new("doc", "abcdefghijklmnop")).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["abcdefghij", "ghijklmnop"]);
    }

    #[test]
    fn chunks_inherit_metadata() {
        let metadata = DocumentMetadata {
            author: Some("ada".into()),
            tags: vec!["notes".into()],
            ..DocumentMetadata::default()
        };
        let document = Document::new("doc", "abcdefghijklmnop").with_metadata(metadata);
        let chunks = TokenChunker::new(chars(), 10, 4).chunk(&document).unwrap();

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.document_id, "doc");
            assert_eq!(chunk.metadata.chunk_index, i);
            assert_eq!(chunk.metadata.document.document_id.as_deref(), Some("doc"));
            assert_eq!(chunk.metadata.document.author.as_deref(), Some("ada"));
            assert_eq!(chunk.metadata.document.tags, vec!["notes".to_string()]);
            assert!(chunk.embedding.is_empty());
        }
    }

    #[test]
    fn caps_chunk_count() {
        let chunker = TokenChunker::new(chars(), 4, 0).with_max_chunks(2);
        let chunks = chunker.chunk(&Document::new("doc", "aaaabbbbccccdddd")).unwrap();
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].text, "bbbb");
    }

    #[test]
    fn line_chunker_keeps_lines_whole() {
        let chunker = LineChunker::new(chars(), 12, 0);
        let text = "A: hello\nB: hi there\nA: bye\n";
        let chunks = chunker.chunk(&Document::new("call", text)).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["A: hello\n", "B: hi there\n", "A: bye\n"]);
    }

    #[test]
    fn line_chunker_carries_trailing_lines_as_overlap() {
        let chunker = LineChunker::new(chars(), 10, 4);
        let text = "aaa\nbbb\nccc\nddd\n";
        let chunks = chunker.chunk(&Document::new("t", text)).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        assert_eq!(texts, vec!["aaa\nbbb\n", "bbb\nccc\n", "ccc\nddd\n"]);
    }

    #[test]
    fn line_chunker_wraps_oversized_lines() {
        let chunker = LineChunker::new(chars(), 5, 0);
        let chunks = chunker.chunk(&Document::new("t", "ab\nabcdefghij\ncd")).unwrap();
        let texts: Vec<&str> = chunks.iter().map(|c| c.text.as_str()).collect();
        // The wrapped line's trailing newline is a blank window and is skipped.
        assert_eq!(texts, vec!["ab\n", "abcde", "fghij", "cd"]);
    }

    #[test]
    fn parses_strategy() {
        assert_eq!("tokens".parse::<ChunkingStrategy>().unwrap(), ChunkingStrategy::Tokens);
        assert_eq!(" Lines ".parse::<ChunkingStrategy>().unwrap(), ChunkingStrategy::Lines);
        assert!("paragraphs".parse::<ChunkingStrategy>().is_err());
        assert_eq!(ChunkingStrategy::Lines.to_string(), "lines");
    }
}
