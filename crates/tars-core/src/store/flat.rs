//! Exhaustive-scan vector store persisted as <db_dir>/store.json

use std::cmp::Reverse;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::{cosine_similarity, ChunkPayload, SearchResult, VectorStore};
use crate::chunk::Chunk;
use crate::embed::Embedded;
use crate::{layout, Result, TarsError};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredChunk {
    /// Monotonic id; its order is insertion order
    id: u64,
    #[serde(flatten)]
    payload: ChunkPayload,
    embedding: Vec<f32>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreFile {
    /// Fixed by the first vector stored
    dimension: Option<usize>,
    next_id: u64,
    /// Kept sorted by id
    chunks: Vec<StoredChunk>,
}

/// Vector store holding every vector in memory and scanning all of them on
/// search.
pub struct FlatStore {
    path: PathBuf,
    data: StoreFile,
    dirty: bool,
}

impl FlatStore {
    /// Open the store in `db_dir`, initializing an empty one if none exists.
    pub fn open(db_dir: &Path) -> Result<Self> {
        Self::open_at(layout::store_path(db_dir))
    }

    /// Open the store file at `path`, creating it empty if missing.
    pub fn open_at(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if path.exists() {
            let content = std::fs::read(&path)?;
            let data: StoreFile = serde_json::from_slice(&content)
                .map_err(|e| TarsError::Storage(format!("corrupt store {}: {e}", path.display())))?;
            debug!("Opened store with {} chunks", data.chunks.len());
            return Ok(Self {
                path,
                data,
                dirty: false,
            });
        }

        let mut store = Self {
            path,
            data: StoreFile::default(),
            dirty: true,
        };
        store.flush()?;
        info!("Initialized empty store at {}", store.path.display());
        Ok(store)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Dimension of the stored vectors, once known.
    pub fn dimension(&self) -> Option<usize> {
        self.data.dimension
    }

    fn check_dimension(&self, expected: Option<usize>, actual: usize) -> Result<()> {
        if actual == 0 {
            return Err(TarsError::Storage("empty embedding vector".to_string()));
        }
        match expected {
            Some(expected) if expected != actual => Err(TarsError::Storage(format!(
                "dimension mismatch: store holds {expected}-d vectors, got {actual}-d \
                 (rebuild the index after changing the embedding model)"
            ))),
            _ => Ok(()),
        }
    }
}

impl VectorStore for FlatStore {
    fn upsert(
        &mut self,
        filename: &str,
        chunks: &[Chunk],
        embeddings: Vec<Embedded>,
    ) -> Result<usize> {
        if chunks.len() != embeddings.len() {
            return Err(TarsError::Storage(format!(
                "{} chunks but {} embeddings for {filename}",
                chunks.len(),
                embeddings.len()
            )));
        }
        if chunks.is_empty() {
            return Ok(0);
        }

        // Validate the whole batch before touching the data
        let dimension = self.data.dimension.or(Some(embeddings[0].vector().len()));
        for embedded in &embeddings {
            self.check_dimension(dimension, embedded.vector().len())?;
        }

        let indices: BTreeSet<usize> = chunks.iter().map(|c| c.index).collect();
        self.data
            .chunks
            .retain(|c| !(c.payload.filename == filename && indices.contains(&c.payload.chunk_index)));

        for (chunk, embedded) in chunks.iter().zip(embeddings) {
            let fallback = embedded.is_fallback();
            self.data.chunks.push(StoredChunk {
                id: self.data.next_id,
                payload: ChunkPayload {
                    filename: filename.to_string(),
                    chunk_index: chunk.index,
                    text: chunk.text.clone(),
                    fallback,
                },
                embedding: embedded.into_vector(),
            });
            self.data.next_id += 1;
        }

        self.data.dimension = dimension;
        self.dirty = true;
        debug!("Stored {} chunks for {}", chunks.len(), filename);
        Ok(chunks.len())
    }

    fn delete_file(&mut self, filename: &str) -> Result<usize> {
        let before = self.data.chunks.len();
        self.data.chunks.retain(|c| c.payload.filename != filename);
        let removed = before - self.data.chunks.len();
        if removed > 0 {
            self.dirty = true;
        }
        Ok(removed)
    }

    fn similarity_search(&self, query: &[f32], k: usize) -> Result<Vec<SearchResult>> {
        if k == 0 || self.data.chunks.is_empty() {
            return Ok(Vec::new());
        }
        self.check_dimension(self.data.dimension, query.len())?;

        let mut scored: Vec<(f32, &StoredChunk)> = self
            .data
            .chunks
            .iter()
            .map(|c| (cosine_similarity(query, &c.embedding), c))
            .collect();

        scored.sort_by_key(|(score, chunk)| (Reverse(OrderedFloat(*score)), chunk.id));

        Ok(scored
            .into_iter()
            .take(k)
            .map(|(score, chunk)| SearchResult {
                score,
                payload: chunk.payload.clone(),
            })
            .collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.data.chunks.len())
    }

    fn filenames(&self) -> Result<Vec<String>> {
        let names: BTreeSet<&str> = self
            .data
            .chunks
            .iter()
            .map(|c| c.payload.filename.as_str())
            .collect();
        Ok(names.into_iter().map(str::to_string).collect())
    }

    fn clear(&mut self) -> Result<()> {
        self.data = StoreFile::default();
        self.dirty = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }
        let content = serde_json::to_vec(&self.data)?;
        layout::write_atomic(&self.path, &content)?;
        self.dirty = false;
        Ok(())
    }
}
