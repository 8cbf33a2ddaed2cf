//! Document chunking.
//!
//! This module provides the [`Chunker`] trait and [`RecursiveChunker`], which
//! splits text into overlapping windows that end at the coarsest available
//! boundary: paragraphs, then lines, then sentences, then words, and finally
//! a hard character cut.
//!
//! All lengths are measured in `char`s so multi-byte text never splits inside
//! a code point.

use crate::config::RagConfig;
use crate::document::{Chunk, Document, MetadataValue};

/// Separator groups tried from coarsest to finest granularity.
const SEPARATOR_LEVELS: &[&[&str]] = &[&["\n\n"], &["\n"], &[". ", "! ", "? "], &[" "]];

/// A strategy for splitting documents into chunks.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty text.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;

    /// Split every document in order, concatenating the chunks.
    fn split_documents(&self, documents: &[Document]) -> Vec<Chunk> {
        documents.iter().flat_map(|document| self.chunk(document)).collect()
    }
}

/// Splits text hierarchically while keeping an exact overlap between chunks.
///
/// Every chunk holds at most `chunk_size` characters. Chunk *n + 1* starts
/// exactly `chunk_overlap` characters before the end of chunk *n*, so the tail
/// of one chunk is always the head of the next. Each chunk inherits the parent
/// document's metadata plus `chunk_index` and `start_index` fields.
///
/// # Example
///
/// ```rust
/// use orinda_rag::{Chunker, Document, RecursiveChunker};
///
/// let chunker = RecursiveChunker::new(1000, 150);
/// let chunks = chunker.chunk(&Document::new("A short note."));
/// assert_eq!(chunks.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size`: maximum number of characters per chunk (at least 1)
    /// * `chunk_overlap`: characters shared by consecutive chunks, clamped below `chunk_size`
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Self {
        let chunk_size = chunk_size.max(1);
        Self { chunk_size, chunk_overlap: chunk_overlap.min(chunk_size - 1) }
    }

    /// Create a chunker from the pipeline configuration.
    pub fn from_config(config: &RagConfig) -> Self {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    /// Split raw text, returning `(start_char_index, text)` pairs.
    pub fn split_text(&self, text: &str) -> Vec<(usize, String)> {
        let chars: Vec<char> = text.chars().collect();
        let total = chars.len();
        if total == 0 {
            return Vec::new();
        }
        if total <= self.chunk_size {
            return vec![(0, text.to_string())];
        }

        let mut spans = Vec::new();
        let mut start = 0;
        loop {
            let window_end = start + self.chunk_size;
            if window_end >= total {
                spans.push((start, total));
                break;
            }
            // The next chunk must start strictly after this one.
            let min_end = start + self.chunk_overlap + 1;
            let end = find_break(&chars, min_end, window_end, SEPARATOR_LEVELS);
            spans.push((start, end));
            start = end - self.chunk_overlap;
        }

        spans.into_iter().map(|(start, end)| (start, chars[start..end].iter().collect())).collect()
    }
}

/// Find the latest chunk end in `min_end..=max_end` that falls just after a
/// separator, trying each separator level in turn before cutting at `max_end`.
fn find_break(chars: &[char], min_end: usize, max_end: usize, levels: &[&[&str]]) -> usize {
    let Some((separators, finer)) = levels.split_first() else {
        return max_end;
    };

    for end in (min_end..=max_end).rev() {
        if separators.iter().any(|separator| ends_with(&chars[..end], separator)) {
            return end;
        }
    }

    find_break(chars, min_end, max_end, finer)
}

fn ends_with(chars: &[char], separator: &str) -> bool {
    let len = separator.chars().count();
    chars.len() >= len && chars[chars.len() - len..].iter().copied().eq(separator.chars())
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        self.split_text(&document.text)
            .into_iter()
            .enumerate()
            .map(|(i, (start, text))| {
                let mut metadata = document.metadata.clone();
                metadata.insert("chunk_index".to_string(), MetadataValue::from(i));
                metadata.insert("start_index".to_string(), MetadataValue::from(start));
                Chunk { text, metadata }
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_len(s: &str) -> usize {
        s.chars().count()
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        let chunker = RecursiveChunker::new(100, 10);
        assert!(chunker.chunk(&Document::new("")).is_empty());
    }

    #[test]
    fn short_text_is_a_single_chunk() {
        let chunker = RecursiveChunker::new(100, 10);
        let chunks = chunker.chunk(&Document::new("hello world"));
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].text, "hello world");
        assert_eq!(chunks[0].metadata["chunk_index"], MetadataValue::Number(0.0));
    }

    #[test]
    fn prefers_paragraph_breaks() {
        let para_a = "a".repeat(60);
        let para_b = "b".repeat(60);
        let text = format!("{para_a}\n\n{para_b}");
        let chunker = RecursiveChunker::new(100, 10);
        let spans = chunker.split_text(&text);
        assert_eq!(spans[0].1, format!("{para_a}\n\n"));
    }

    #[test]
    fn falls_back_to_word_breaks() {
        let text = "word ".repeat(50);
        let chunker = RecursiveChunker::new(42, 5);
        for (_, chunk) in chunker.split_text(&text).iter().rev().skip(1) {
            assert!(chunk.ends_with(' '), "chunk {chunk:?} should end on a word boundary");
        }
    }

    #[test]
    fn hard_cut_without_separators() {
        let text = "x".repeat(250);
        let chunker = RecursiveChunker::new(100, 20);
        let spans = chunker.split_text(&text);
        assert_eq!(spans[0], (0, "x".repeat(100)));
        assert_eq!(spans[1].0, 80);
    }

    #[test]
    fn consecutive_chunks_share_exact_overlap() {
        let text = "The quick brown fox jumps over the lazy dog. ".repeat(80);
        let chunker = RecursiveChunker::new(1000, 150);
        let chunks = chunker.split_text(&text);
        assert!(chunks.len() > 2);
        for pair in chunks.windows(2) {
            let (_, current) = &pair[0];
            let (_, next) = &pair[1];
            assert!(char_len(current) <= 1000);
            let tail: String = current.chars().skip(char_len(current) - 150).collect();
            let head: String = next.chars().take(150).collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn handles_multibyte_text() {
        let text = "ünïcødé ✓ ".repeat(40);
        let chunker = RecursiveChunker::new(50, 10);
        let chunks = chunker.split_text(&text);
        assert!(chunks.iter().all(|(_, c)| char_len(c) <= 50));
    }

    #[test]
    fn metadata_is_inherited() {
        let doc = Document::new("x".repeat(30)).with_metadata("page", 2usize);
        let chunks = RecursiveChunker::new(20, 5).chunk(&doc);
        assert_eq!(chunks.len(), 2);
        assert!(chunks.iter().all(|c| c.metadata["page"] == MetadataValue::Number(2.0)));
        assert_eq!(chunks[1].metadata["start_index"], MetadataValue::Number(15.0));
    }

    #[test]
    fn overlap_is_clamped_below_size() {
        let chunker = RecursiveChunker::new(10, 50);
        let spans = chunker.split_text(&"y".repeat(30));
        assert!(spans.len() > 1);
        assert!(spans.windows(2).all(|w| w[1].0 > w[0].0));
    }
}
