//! Fixed-size character chunking with overlap

use crate::{Config, Result, TarsError};

/// A chunk of text with its position in the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// The text content
    pub text: String,
    /// Chunk index within the document
    pub index: usize,
    /// First character covered (char offset, inclusive)
    pub start: usize,
    /// Last character covered (char offset, exclusive)
    pub end: usize,
}

/// Splits text into windows of `chunk_size` characters where consecutive
/// windows share `overlap` characters.
///
/// Sizes count Unicode scalar values, not bytes. Boundaries depend on
/// nothing but the two parameters and the text length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Chunker {
    chunk_size: usize,
    overlap: usize,
}

impl Chunker {
    /// Create a chunker; `overlap` must be smaller than `chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self> {
        if chunk_size == 0 || overlap >= chunk_size {
            return Err(TarsError::Config(format!(
                "invalid chunking parameters: size {chunk_size}, overlap {overlap}"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.chunk_size, config.chunk_overlap)
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Split `text` into ordered chunks. Empty text yields no chunks.
    pub fn split(&self, text: &str) -> Vec<Chunk> {
        // Byte offset of every char boundary, including the end of the text
        let bounds: Vec<usize> = text
            .char_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();
        let char_count = bounds.len() - 1;

        let mut chunks = Vec::new();
        let mut start = 0;
        while start < char_count {
            let end = (start + self.chunk_size).min(char_count);
            chunks.push(Chunk {
                text: text[bounds[start]..bounds[end]].to_string(),
                index: chunks.len(),
                start,
                end,
            });

            if end == char_count {
                break;
            }
            start = end - self.overlap;
        }

        chunks
    }
}
