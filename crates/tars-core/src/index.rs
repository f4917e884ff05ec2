//! Indexing logic: scan the source directory, chunk, embed, store

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::chunk::Chunker;
use crate::config::FallbackPolicy;
use crate::embed::{Embed, Embedded};
use crate::fingerprint::fingerprint_bytes;
use crate::manifest::IndexManifest;
use crate::source::{self, Document};
use crate::store::VectorStore;
use crate::{Config, Result, TarsError};

/// Progress events emitted during indexing.
#[derive(Debug, Clone)]
pub enum ProgressEvent<'a> {
    /// Fingerprinting candidate files.
    Scanning { count: usize },
    /// Indexing a changed file.
    Indexing {
        current: usize,
        total: usize,
        filename: &'a str,
    },
    /// Embedding the chunks of the current file.
    Embedding { current: usize, total: usize },
}

/// Type alias for progress callback.
pub type ProgressCallback = Box<dyn Fn(ProgressEvent) + Send>;

/// Stats from an indexing run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IndexStats {
    pub files_scanned: usize,
    pub files_indexed: usize,
    pub files_unchanged: usize,
    pub files_skipped: usize,
    pub files_pruned: usize,
    pub chunks_created: usize,
}

/// Why a single file did not make it into the index.
enum FileFailure {
    /// Read, decode or embedding problem; retried next run.
    Skipped(TarsError),
    /// The vector store rejected the write; ends the run.
    Store(TarsError),
}

/// Brings the vector store and manifest in line with a source directory.
///
/// The indexer is the only writer of both. Files are handled one at a time
/// and either complete fully or leave no trace in the manifest.
pub struct Indexer<'a> {
    db_dir: PathBuf,
    chunker: Chunker,
    extension: String,
    fallback_policy: FallbackPolicy,
    prune_deleted: bool,
    embedder: &'a dyn Embed,
    store: &'a mut dyn VectorStore,
    manifest: IndexManifest,
    progress_callback: Option<ProgressCallback>,
}

impl<'a> Indexer<'a> {
    /// Create an indexer writing its manifest into `db_dir`.
    pub fn new(
        db_dir: &Path,
        config: &Config,
        embedder: &'a dyn Embed,
        store: &'a mut dyn VectorStore,
    ) -> Result<Self> {
        Ok(Self {
            db_dir: db_dir.to_path_buf(),
            chunker: Chunker::from_config(config)?,
            extension: config.extension.clone(),
            fallback_policy: config.fallback_policy,
            prune_deleted: config.prune_deleted,
            embedder,
            store,
            manifest: IndexManifest::load(db_dir)?,
            progress_callback: None,
        })
    }

    /// Set a callback to receive progress updates during indexing.
    pub fn set_progress_callback(&mut self, callback: ProgressCallback) {
        self.progress_callback = Some(callback);
    }

    fn emit_progress(&self, event: ProgressEvent) {
        if let Some(ref callback) = self.progress_callback {
            callback(event);
        }
    }

    pub fn manifest(&self) -> &IndexManifest {
        &self.manifest
    }

    /// Forget everything indexed so far; the next run re-indexes all files.
    pub fn reset(&mut self) -> Result<()> {
        self.store.clear()?;
        self.manifest = IndexManifest::default();
        self.finish()
    }

    /// Index every changed file in `source_dir`.
    pub fn run(&mut self, source_dir: &Path) -> Result<IndexStats> {
        info!(
            "Indexing {} with {}",
            source_dir.display(),
            self.embedder.model()
        );
        let sources = source::list_sources(source_dir, &self.extension)?;
        let mut stats = IndexStats::default();

        if self.prune_deleted {
            let present: HashSet<&str> = sources.iter().map(|s| s.filename.as_str()).collect();
            let stale: Vec<String> = self
                .manifest
                .filenames()
                .filter(|name| !present.contains(name))
                .map(str::to_string)
                .collect();

            for filename in stale {
                // The manifest entry stays so the next run retries the delete
                if let Err(e) = self.store.delete_file(&filename) {
                    return Err(self.abort(&format!("pruning {filename}"), e));
                }
                self.manifest.forget(&filename);
                debug!("Pruned {}", filename);
                stats.files_pruned += 1;
            }
        }

        let mut changed = Vec::new();
        for source in &sources {
            stats.files_scanned += 1;
            self.emit_progress(ProgressEvent::Scanning {
                count: stats.files_scanned,
            });

            let bytes = match std::fs::read(&source.path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    warn!("Skipping {}: {}", source.path.display(), e);
                    stats.files_skipped += 1;
                    continue;
                }
            };

            if self
                .manifest
                .is_unchanged(&source.filename, &fingerprint_bytes(&bytes))
            {
                stats.files_unchanged += 1;
                continue;
            }

            changed.push(source);
        }

        let total = changed.len();
        for (i, source) in changed.into_iter().enumerate() {
            let filename = source.filename.as_str();
            self.emit_progress(ProgressEvent::Indexing {
                current: i + 1,
                total,
                filename,
            });

            match self.index_file(filename, &source.path) {
                Ok(chunk_count) => {
                    stats.files_indexed += 1;
                    stats.chunks_created += chunk_count;
                }
                Err(FileFailure::Skipped(e)) => {
                    warn!("Failed to index {}: {}", filename, e);
                    stats.files_skipped += 1;
                }
                Err(FileFailure::Store(e)) => {
                    self.manifest.forget(filename);
                    return Err(self.abort(filename, e));
                }
            }
        }

        self.finish()?;

        info!(
            "Indexed {} files ({} chunks), {} unchanged, {} skipped, {} pruned",
            stats.files_indexed,
            stats.chunks_created,
            stats.files_unchanged,
            stats.files_skipped,
            stats.files_pruned
        );
        Ok(stats)
    }

    /// Read, chunk, embed and store one document, then record the
    /// fingerprint of the bytes actually indexed.
    fn index_file(
        &mut self,
        filename: &str,
        path: &Path,
    ) -> std::result::Result<usize, FileFailure> {
        let bytes = std::fs::read(path).map_err(|e| FileFailure::Skipped(e.into()))?;
        let doc = Document::from_bytes(filename, bytes).map_err(FileFailure::Skipped)?;
        let chunks = self.chunker.split(&doc.text);

        let mut embeddings: Vec<Embedded> = Vec::with_capacity(chunks.len());
        for (i, chunk) in chunks.iter().enumerate() {
            self.emit_progress(ProgressEvent::Embedding {
                current: i + 1,
                total: chunks.len(),
            });
            embeddings.push(self.embedder.embed(&chunk.text));
        }

        let fallbacks = embeddings.iter().filter(|e| e.is_fallback()).count();
        if fallbacks > 0 {
            match self.fallback_policy {
                FallbackPolicy::Skip => {
                    return Err(FileFailure::Skipped(TarsError::Embedding(format!(
                        "{fallbacks} of {} chunks got a fallback embedding",
                        chunks.len()
                    ))));
                }
                FallbackPolicy::Store => {
                    warn!("Storing {} fallback embeddings for {}", fallbacks, filename);
                }
            }
        }

        self.store
            .delete_file(&doc.filename)
            .map_err(FileFailure::Store)?;
        self.store
            .upsert(&doc.filename, &chunks, embeddings)
            .map_err(FileFailure::Store)?;

        self.manifest.record(doc.filename, doc.fingerprint);
        Ok(chunks.len())
    }

    /// Persist the store before the manifest so the manifest never names
    /// chunks that are not on disk.
    fn finish(&mut self) -> Result<()> {
        self.store.flush()?;
        self.manifest.save(&self.db_dir)
    }

    /// Keep what already succeeded and hand back the error that ended the
    /// run.
    fn abort(&mut self, what: &str, error: TarsError) -> TarsError {
        if let Err(e) = self.finish() {
            warn!("Could not save partial index after store failure: {}", e);
        }
        TarsError::Index(format!("vector store failed on {what}: {error}"))
    }
}
