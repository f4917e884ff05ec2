//! Vector storage for embedded chunks

mod flat;

pub use flat::FlatStore;

use serde::{Deserialize, Serialize};

use crate::chunk::Chunk;
use crate::embed::Embedded;
use crate::Result;

/// Metadata stored with each vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkPayload {
    /// Source file the chunk came from
    pub filename: String,
    /// Chunk index within the file
    pub chunk_index: usize,
    /// The actual text content
    pub text: String,
    /// Whether the vector is a fallback placeholder
    #[serde(default)]
    pub fallback: bool,
}

/// A search result.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Cosine similarity to the query
    pub score: f32,
    pub payload: ChunkPayload,
}

/// Persistent collection of embedded chunks.
///
/// Writes may be buffered until [`VectorStore::flush`]; reads always see
/// the buffered state.
pub trait VectorStore {
    /// Store one file's chunks with their embeddings, replacing chunks
    /// with the same filename and index.
    fn upsert(&mut self, filename: &str, chunks: &[Chunk], embeddings: Vec<Embedded>)
    -> Result<usize>;

    /// Remove every chunk of `filename`, returning how many were removed.
    fn delete_file(&mut self, filename: &str) -> Result<usize>;

    /// The `k` chunks most similar to `query`, best first. Equal scores
    /// keep insertion order.
    fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>>;

    /// Number of stored chunks.
    fn count(&self) -> Result<usize>;

    fn is_empty(&self) -> Result<bool> {
        Ok(self.count()? == 0)
    }

    /// Distinct filenames with stored chunks, sorted.
    fn filenames(&self) -> Result<Vec<String>>;

    /// Drop every chunk.
    fn clear(&mut self) -> Result<()>;

    /// Persist buffered writes.
    fn flush(&mut self) -> Result<()>;
}

/// Cosine similarity of two equal-length vectors; 0.0 when either is zero.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}
