//! Bounded in-memory cache of embeddings keyed by the exact input text.

use std::num::NonZeroUsize;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

use lru::LruCache;
use serde::Serialize;
use tracing::debug;

use crate::embed::{Embed, Embedded};
use crate::{Config, Result, TarsError};

/// Counters describing cache behaviour since creation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Number of entries currently cached.
    pub entries: usize,
    /// Maximum number of entries.
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    /// Entries dropped to make room for newer ones.
    pub evictions: u64,
    /// Full clears, whether scheduled or manual.
    pub flushes: u64,
}

/// LRU cache of embeddings with a periodic full flush.
///
/// Once more than `flush_interval` has passed since the last flush, the
/// whole cache is cleared before the next lookup. The cache never changes
/// results, only how often the embedder is called.
pub struct EmbeddingCache {
    entries: LruCache<String, Vec<f32>>,
    flush_interval: Duration,
    last_flush: Instant,
    stats: CacheStats,
}

impl EmbeddingCache {
    pub fn new(capacity: NonZeroUsize, flush_interval: Duration) -> Self {
        Self {
            entries: LruCache::new(capacity),
            flush_interval,
            last_flush: Instant::now(),
            stats: CacheStats {
                capacity: capacity.get(),
                ..CacheStats::default()
            },
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let capacity = NonZeroUsize::new(config.cache_capacity)
            .ok_or_else(|| TarsError::Config("cache_capacity must be positive".to_string()))?;
        Ok(Self::new(capacity, config.cache_flush_interval()))
    }

    /// Look up a cached vector.
    pub fn get(&mut self, text: &str) -> Option<Vec<f32>> {
        self.get_at(text, Instant::now())
    }

    /// Cache `vector` for `text`, evicting the least recently used entry
    /// when full.
    pub fn insert(&mut self, text: &str, vector: Vec<f32>) {
        if let Some((evicted, _)) = self.entries.push(text.to_string(), vector) {
            if evicted != text {
                self.stats.evictions += 1;
            }
        }
    }

    /// Return the cached vector for `text`, or embed it and cache the result.
    ///
    /// Fallback vectors are passed through but never cached.
    pub fn get_or_embed<E: Embed + ?Sized>(&mut self, text: &str, embedder: &E) -> Embedded {
        self.get_or_embed_at(text, embedder, Instant::now())
    }

    /// Drop every entry.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.last_flush = Instant::now();
        self.stats.flushes += 1;
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            ..self.stats
        }
    }

    fn get_at(&mut self, text: &str, now: Instant) -> Option<Vec<f32>> {
        self.flush_if_due(now);
        match self.entries.get(text) {
            Some(vector) => {
                self.stats.hits += 1;
                Some(vector.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    fn get_or_embed_at<E: Embed + ?Sized>(
        &mut self,
        text: &str,
        embedder: &E,
        now: Instant,
    ) -> Embedded {
        if let Some(vector) = self.get_at(text, now) {
            return Embedded::Vector(vector);
        }

        let embedded = embedder.embed(text);
        if let Embedded::Vector(vector) = &embedded {
            self.insert(text, vector.clone());
        }
        embedded
    }

    fn flush_if_due(&mut self, now: Instant) {
        if now.saturating_duration_since(self.last_flush) > self.flush_interval {
            debug!("Flushing {} cached embeddings", self.entries.len());
            self.entries.clear();
            self.last_flush = now;
            self.stats.flushes += 1;
        }
    }
}

/// An embedder whose results pass through an [`EmbeddingCache`].
///
/// Indexing and retrieval share one instance so that query and document
/// vectors come from the same model.
pub struct CachedEmbedder<E> {
    inner: E,
    cache: Mutex<EmbeddingCache>,
}

impl<E: Embed> CachedEmbedder<E> {
    pub fn new(inner: E, cache: EmbeddingCache) -> Self {
        Self {
            inner,
            cache: Mutex::new(cache),
        }
    }

    pub fn inner(&self) -> &E {
        &self.inner
    }

    pub fn stats(&self) -> CacheStats {
        self.lock().stats()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    // The cache is never authoritative, so a poisoned lock is still usable.
    fn lock(&self) -> std::sync::MutexGuard<'_, EmbeddingCache> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<E: Embed> Embed for CachedEmbedder<E> {
    fn model(&self) -> &str {
        self.inner.model()
    }

    fn embed(&self, text: &str) -> Embedded {
        self.lock().get_or_embed(text, &self.inner)
    }
}
