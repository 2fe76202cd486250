//! Embeddings cache and incremental refresh.
//!
//! The ledger remembers what every source file hashed to and which entities
//! it produced; the cache file persists embeddings plus the ledger so a
//! restart can skip unchanged files entirely.

mod ledger;
mod persistence;
mod refresh;
mod walker;

pub use ledger::{FileLedger, LedgerEntry, calculate_hash, detect_language, get_utc_timestamp};
pub use persistence::{
    CACHE_EXTENSION, CACHE_VERSION, CacheLoad, CacheMetadata, CacheStats, ClearScope,
    EmbeddingCache, LoadedCache, project_key,
};
pub use refresh::{
    AnalyzerError, FileRefresh, IncrementalIndexer, RefreshOutcome, RefreshReport, SourceAnalyzer,
};
pub use walker::{FileWalker, IGNORE_FILE_NAME};
