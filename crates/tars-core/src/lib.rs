//! tars-core: incremental document indexing and retrieval
//!
//! This library keeps a vector store of text chunks in sync with a flat
//! directory of documents and serves nearest-neighbour context for the
//! conversation loop in `tars-cli`. Embeddings come from an HTTP service
//! (`/v1/embeddings`), cached in memory and degraded to a fallback vector
//! when the service is unavailable.

pub mod cache;
pub mod chunk;
pub mod config;
pub mod consts;
pub mod conversation;
pub mod embed;
pub mod fingerprint;
pub mod index;
pub mod layout;
pub mod llm;
pub mod manifest;
pub mod persona;
pub mod retrieve;
pub mod retry;
pub mod source;
pub mod store;

pub use cache::{CachedEmbedder, EmbeddingCache};
pub use chunk::{Chunk, Chunker};
pub use config::{Config, FallbackPolicy};
pub use consts::*;
pub use conversation::Conversation;
pub use embed::{Embed, Embedded, EmbeddingClient};
pub use index::Indexer;
pub use llm::{Complete, CompletionClient};
pub use manifest::IndexManifest;
pub use persona::Persona;
pub use retrieve::Retriever;
pub use retry::RetryPolicy;
pub use store::{FlatStore, SearchResult, VectorStore};

#[derive(Debug, thiserror::Error)]
pub enum TarsError {
    #[error("Config error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Embedding error: {0}")]
    Embedding(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Language model error: {0}")]
    Llm(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type Result<T> = std::result::Result<T, TarsError>;
