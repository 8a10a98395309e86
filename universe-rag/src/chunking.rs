//! Document chunking strategies.
//!
//! This module provides the [`Chunker`] trait and two implementations:
//!
//! - [`FixedSizeChunker`] - consecutive character windows with configurable overlap
//! - [`RecursiveChunker`] - splits hierarchically by paragraphs, sentences, then words
//!
//! Sizes are measured in characters (Unicode scalar values), never bytes, so
//! CJK text is cut on character boundaries.

use std::collections::VecDeque;

use crate::document::{Chunk, Document};
use crate::error::{RagError, Result};

/// Separators tried by [`RecursiveChunker`], coarsest first.
const SEPARATORS: [&str; 8] = ["\n\n", "\n", "。", ". ", "！", "! ", "？", " "];

/// A strategy for splitting documents into chunks.
///
/// Implementations produce [`Chunk`]s with text and metadata but no embeddings.
/// Embeddings are attached later by the index builder.
pub trait Chunker: Send + Sync {
    /// Split a document into chunks.
    ///
    /// Returns an empty `Vec` if the document has empty content.
    /// Each returned chunk has an empty embedding vector.
    fn chunk(&self, document: &Document) -> Vec<Chunk>;
}

/// Split `document` into fixed character windows.
///
/// Equivalent to `FixedSizeChunker::new(chunk_size, chunk_overlap)?.chunk(document)`.
///
/// # Errors
///
/// Returns [`RagError::ConfigError`] if `chunk_size == 0` or
/// `chunk_overlap >= chunk_size`. No chunks are produced in that case.
pub fn split(document: &Document, chunk_size: usize, chunk_overlap: usize) -> Result<Vec<Chunk>> {
    Ok(FixedSizeChunker::new(chunk_size, chunk_overlap)?.chunk(document))
}

fn validate(chunk_size: usize, chunk_overlap: usize) -> Result<()> {
    if chunk_size == 0 {
        return Err(RagError::ConfigError("chunk_size must be greater than zero".to_string()));
    }
    if chunk_overlap >= chunk_size {
        return Err(RagError::ConfigError(format!(
            "chunk_overlap ({chunk_overlap}) must be less than chunk_size ({chunk_size})"
        )));
    }
    Ok(())
}

fn char_len(text: &str) -> usize {
    text.chars().count()
}

fn make_chunk(document: &Document, sequence_index: usize, text: String) -> Chunk {
    Chunk {
        id: format!("{}_{sequence_index}", document.id),
        document_id: document.id.clone(),
        sequence_index,
        text,
        embedding: Vec::new(),
        metadata: document.metadata.clone(),
    }
}

/// Splits text into fixed-size windows by character count with configurable overlap.
///
/// Each window starts `chunk_size - chunk_overlap` characters after the
/// previous one; the last window may be shorter and ends the split.
///
/// # Example
///
/// ```rust,ignore
/// use universe_rag::FixedSizeChunker;
///
/// let chunker = FixedSizeChunker::new(500, 150)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct FixedSizeChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl FixedSizeChunker {
    /// Create a new `FixedSizeChunker`.
    ///
    /// # Arguments
    ///
    /// * `chunk_size` - maximum number of characters per chunk
    /// * `chunk_overlap` - number of overlapping characters between consecutive chunks
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_overlap >= chunk_size` or
    /// `chunk_size == 0`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }
}

/// Character windows over `text`, returned as owned strings.
fn split_by_size(text: &str, chunk_size: usize, chunk_overlap: usize) -> Vec<String> {
    // Byte offset of every character boundary, including the end of the text.
    let boundaries: Vec<usize> =
        text.char_indices().map(|(i, _)| i).chain(std::iter::once(text.len())).collect();
    let char_count = boundaries.len() - 1;
    if char_count == 0 {
        return Vec::new();
    }

    let step = chunk_size - chunk_overlap;
    let mut windows = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(char_count);
        windows.push(text[boundaries[start]..boundaries[end]].to_string());
        if end == char_count {
            break;
        }
        start += step;
    }

    windows
}

impl Chunker for FixedSizeChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        split_by_size(&document.content, self.chunk_size, self.chunk_overlap)
            .into_iter()
            .enumerate()
            .map(|(i, text)| make_chunk(document, i, text))
            .collect()
    }
}

/// Splits text hierarchically: paragraphs → lines → sentences → words.
///
/// Segments are merged greedily up to `chunk_size` characters. When a chunk
/// is emitted, trailing segments totalling at most `chunk_overlap`
/// characters are carried into the next one. A segment that alone exceeds
/// `chunk_size` is split with the next separator, and finally by fixed
/// character windows.
///
/// # Example
///
/// ```rust,ignore
/// use universe_rag::RecursiveChunker;
///
/// let chunker = RecursiveChunker::new(500, 150)?;
/// let chunks = chunker.chunk(&document);
/// ```
#[derive(Debug, Clone)]
pub struct RecursiveChunker {
    chunk_size: usize,
    chunk_overlap: usize,
}

impl RecursiveChunker {
    /// Create a new `RecursiveChunker`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if `chunk_overlap >= chunk_size` or
    /// `chunk_size == 0`.
    pub fn new(chunk_size: usize, chunk_overlap: usize) -> Result<Self> {
        validate(chunk_size, chunk_overlap)?;
        Ok(Self { chunk_size, chunk_overlap })
    }
}

/// Split text at a separator while keeping the separator attached to the preceding segment.
fn split_keeping_separator<'a>(text: &'a str, separator: &str) -> Vec<&'a str> {
    let mut result = Vec::new();
    let mut start = 0;

    while let Some(pos) = text[start..].find(separator) {
        let end = start + pos + separator.len();
        result.push(&text[start..end]);
        start = end;
    }

    if start < text.len() {
        result.push(&text[start..]);
    }

    result
}

/// Split text by the first separator, then merge segments into chunks that
/// respect `chunk_size`, recursing with the remaining separators for
/// oversized segments.
fn split_and_merge(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
    separators: &[&str],
) -> Vec<String> {
    if char_len(text) <= chunk_size {
        return vec![text.to_string()];
    }
    let Some((separator, remaining)) = separators.split_first() else {
        return split_by_size(text, chunk_size, chunk_overlap);
    };

    let mut chunks = Vec::new();
    let mut window: VecDeque<&str> = VecDeque::new();
    let mut window_len = 0;

    for segment in split_keeping_separator(text, separator) {
        let segment_len = char_len(segment);

        if segment_len > chunk_size {
            if !window.is_empty() {
                chunks.push(window.iter().copied().collect::<String>());
                window.clear();
                window_len = 0;
            }
            chunks.extend(split_and_merge(segment, chunk_size, chunk_overlap, remaining));
            continue;
        }

        if window_len + segment_len > chunk_size && !window.is_empty() {
            chunks.push(window.iter().copied().collect::<String>());
            // Keep at most `chunk_overlap` trailing characters, and leave room for the segment.
            while window_len > chunk_overlap || window_len + segment_len > chunk_size {
                let Some(front) = window.pop_front() else { break };
                window_len -= char_len(front);
            }
        }

        window.push_back(segment);
        window_len += segment_len;
    }

    if !window.is_empty() {
        chunks.push(window.iter().copied().collect::<String>());
    }

    chunks
}

impl Chunker for RecursiveChunker {
    fn chunk(&self, document: &Document) -> Vec<Chunk> {
        if document.content.is_empty() {
            return Vec::new();
        }

        split_and_merge(&document.content, self.chunk_size, self.chunk_overlap, &SEPARATORS)
            .into_iter()
            .map(|text| text.trim().to_string())
            .filter(|text| !text.is_empty())
            .enumerate()
            .map(|(i, text)| make_chunk(document, i, text))
            .collect()
    }
}
