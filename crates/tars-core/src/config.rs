//! Configuration handling for <db_dir>/config.json

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{
    layout, Result, TarsError, DEFAULT_BASE_URL, DEFAULT_CACHE_CAPACITY, DEFAULT_CACHE_FLUSH_SECS,
    DEFAULT_CHUNK_OVERLAP, DEFAULT_CHUNK_SIZE, DEFAULT_COMPLETION_MODEL, DEFAULT_EMBEDDING_MODEL,
    DEFAULT_EXTENSION, DEFAULT_MAX_RETRIES, DEFAULT_RETRY_DELAY_SECS, DEFAULT_TIMEOUT_SECS,
    DEFAULT_TOP_K, FALLBACK_DIM,
};

/// What the indexer does with chunks whose embedding fell back to zeros.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Leave the file unrecorded so the next run retries it.
    #[default]
    Skip,
    /// Store the zero vectors (tagged) and record the file anyway.
    Store,
}

/// Configuration stored in <db_dir>/config.json
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Base URL of the embedding/completion service
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model name sent to /v1/embeddings
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    /// Model name sent to /v1/completions
    #[serde(default = "default_completion_model")]
    pub completion_model: String,

    /// Dimension of the fallback vector
    #[serde(default = "default_fallback_dimension")]
    pub fallback_dimension: usize,

    /// Chunk size in characters
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Chunk overlap in characters
    #[serde(default = "default_chunk_overlap")]
    pub chunk_overlap: usize,

    /// Extension of the source documents (without the dot)
    #[serde(default = "default_extension")]
    pub extension: String,

    /// Maximum number of cached embeddings
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,

    /// Seconds between full cache flushes
    #[serde(default = "default_cache_flush_secs")]
    pub cache_flush_secs: u64,

    /// HTTP timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Chunks returned per retrieval
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    #[serde(default)]
    pub fallback_policy: FallbackPolicy,

    /// Remove chunks of files that disappeared from the source directory
    #[serde(default = "default_prune_deleted")]
    pub prune_deleted: bool,

    /// Attempts made by the conversation loop around each call
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Seconds between those attempts
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,
}

fn default_base_url() -> String {
    DEFAULT_BASE_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_completion_model() -> String {
    DEFAULT_COMPLETION_MODEL.to_string()
}

fn default_fallback_dimension() -> usize {
    FALLBACK_DIM
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_chunk_overlap() -> usize {
    DEFAULT_CHUNK_OVERLAP
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

fn default_cache_flush_secs() -> u64 {
    DEFAULT_CACHE_FLUSH_SECS
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

fn default_prune_deleted() -> bool {
    true
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_retry_delay_secs() -> u64 {
    DEFAULT_RETRY_DELAY_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            embedding_model: default_embedding_model(),
            completion_model: default_completion_model(),
            fallback_dimension: default_fallback_dimension(),
            chunk_size: default_chunk_size(),
            chunk_overlap: default_chunk_overlap(),
            extension: default_extension(),
            cache_capacity: default_cache_capacity(),
            cache_flush_secs: default_cache_flush_secs(),
            timeout_secs: default_timeout_secs(),
            top_k: default_top_k(),
            fallback_policy: FallbackPolicy::default(),
            prune_deleted: default_prune_deleted(),
            max_retries: default_max_retries(),
            retry_delay_secs: default_retry_delay_secs(),
        }
    }
}

impl Config {
    /// Load config from the db directory, falling back to defaults.
    pub fn load(db_dir: &Path) -> Result<Self> {
        let path = layout::config_path(db_dir);
        let config: Self = if path.exists() {
            let content = std::fs::read_to_string(&path)?;
            serde_json::from_str(&content)?
        } else {
            Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    /// Save config to the db directory.
    pub fn save(&self, db_dir: &Path) -> Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        layout::write_atomic(&layout::config_path(db_dir), content.as_bytes())
    }

    /// Override fields from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_with(|key| std::env::var(key).ok())
    }

    /// Override fields from `lookup`, using the same variable names as the
    /// `.env` file read by the CLI.
    pub fn apply_env_with<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("LM_STUDIO_URL") {
            self.base_url = url;
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.embedding_model = model;
        }
        if let Some(model) = lookup("LM_STUDIO_MODEL") {
            self.completion_model = model;
        }
        if let Some(value) = lookup("MAX_RETRIES") {
            self.max_retries = parse_env("MAX_RETRIES", &value)?;
        }
        if let Some(value) = lookup("RETRY_DELAY") {
            self.retry_delay_secs = parse_env("RETRY_DELAY", &value)?;
        }
        self.validate()
    }

    /// Check the invariants the chunker and cache rely on.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(TarsError::Config("chunk_size must be positive".to_string()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(TarsError::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.cache_capacity == 0 {
            return Err(TarsError::Config(
                "cache_capacity must be positive".to_string(),
            ));
        }
        if self.fallback_dimension == 0 {
            return Err(TarsError::Config(
                "fallback_dimension must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Base URL with a scheme and without a trailing slash.
    pub fn service_url(&self) -> String {
        let url = self.base_url.trim().trim_end_matches('/');
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("http://{url}")
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn cache_flush_interval(&self) -> Duration {
        Duration::from_secs(self.cache_flush_secs)
    }

    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| TarsError::Config(format!("{key} is not a valid number: {value:?}")))
}
