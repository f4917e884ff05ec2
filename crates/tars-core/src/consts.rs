/// Default directory holding the manifest, store and config
pub const DEFAULT_DB_DIR: &str = "db";

/// Default directory scanned for source documents
pub const DEFAULT_DATA_DIR: &str = "data";

/// Manifest file name inside the db directory
pub const MANIFEST_FILE: &str = "processed_files.json";

/// Vector store file name inside the db directory
pub const STORE_FILE: &str = "store.json";

/// Config file name inside the db directory
pub const CONFIG_FILE: &str = "config.json";

/// Default embedding/completion service (LM Studio)
pub const DEFAULT_BASE_URL: &str = "http://localhost:1234";

/// Default embedding model
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-nomic-embed-text-v1.5";

/// Default completion model
pub const DEFAULT_COMPLETION_MODEL: &str = "local-model";

/// Dimension of the fallback embedding vector
pub const FALLBACK_DIM: usize = 384;

/// Default chunk size in characters
pub const DEFAULT_CHUNK_SIZE: usize = 300;

/// Default chunk overlap in characters
pub const DEFAULT_CHUNK_OVERLAP: usize = 30;

/// Default number of cached embeddings
pub const DEFAULT_CACHE_CAPACITY: usize = 1000;

/// Default interval between full cache flushes (1 hour)
pub const DEFAULT_CACHE_FLUSH_SECS: u64 = 3600;

/// Default HTTP timeout for embedding and completion calls
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Only files with this extension are indexed by default
pub const DEFAULT_EXTENSION: &str = "txt";

/// Default number of chunks returned per query
pub const DEFAULT_TOP_K: usize = 2;

/// Default attempts for calls made by the conversation loop
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default delay between attempts (seconds)
pub const DEFAULT_RETRY_DELAY_SECS: u64 = 3;

/// Prefix marking a retrieval failure in place of context text
pub const ERROR_TAG: &str = "[ERROR]";
