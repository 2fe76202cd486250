//! On-disk embeddings cache
//!
//! One file per project, named after a hash of the project root so several
//! projects can share a cache directory. Layout:
//!
//! ```text
//! [magic "CXKB"][u32 LE metadata length][bincode metadata][lz4(bincode payload)]
//! ```
//!
//! Metadata sits uncompressed in front so `load` can reject a file written
//! for another model or dimension without inflating the payload. `stats`
//! decodes the whole file, so truncated payloads show up as unusable. A file
//! that cannot be read or decoded is reported as not found; a file from
//! another format version, model or dimension is reported as invalid.
//!
//! File access is serialized per cache path across the whole process, so
//! several handles on one project never interleave reads and writes.

use super::ledger::{FileLedger, LedgerEntry, get_utc_timestamp};
use crate::error::{CacheError, CacheResult};
use crate::vector::{EmbeddingRecord, VectorStore};
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Magic bytes to identify knowledge-base cache files
const MAGIC_BYTES: &[u8; 4] = b"CXKB";

/// Version of the cache format
pub const CACHE_VERSION: u32 = 1;

pub const CACHE_EXTENSION: &str = "kbcache";

const HEADER_SIZE: usize = 8;

/// Compatibility record stored at the front of every cache file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub model_id: String,
    pub dimensions: usize,
    pub version: u32,
    pub entity_count: usize,
    /// UTC seconds since UNIX_EPOCH when the file was written
    pub timestamp: u64,
    pub file_count: usize,
    pub project_root: PathBuf,
}

#[derive(Debug, Serialize, Deserialize)]
struct CachePayload {
    records: Vec<EmbeddingRecord>,
    ledger: Vec<LedgerEntry>,
}

/// Contents of a valid cache file
#[derive(Debug, Clone)]
pub struct LoadedCache {
    pub metadata: CacheMetadata,
    pub records: Vec<EmbeddingRecord>,
    pub ledger: Vec<LedgerEntry>,
}

impl LoadedCache {
    /// Import into live stores. Records of the wrong dimension are skipped.
    pub fn restore_into(self, store: &VectorStore, ledger: &FileLedger) -> usize {
        let mut restored = 0;
        for record in self.records {
            if store.upsert(record).is_ok() {
                restored += 1;
            }
        }
        ledger.extend(self.ledger);
        restored
    }
}

/// Outcome of [`EmbeddingCache::load`]
#[derive(Debug, Clone)]
pub enum CacheLoad {
    Loaded(LoadedCache),
    /// Missing, unreadable or corrupt; regenerate everything
    NotFound,
    /// Readable but incompatible with the active model; regenerate everything
    Invalid {
        reason: String,
        metadata: Option<CacheMetadata>,
    },
}

impl CacheLoad {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Self::Loaded(_))
    }

    pub fn status(&self) -> &'static str {
        match self {
            Self::Loaded(_) => "loaded",
            Self::NotFound => "not_found",
            Self::Invalid { .. } => "invalid",
        }
    }
}

/// Summary returned by [`EmbeddingCache::stats`]
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub path: PathBuf,
    pub exists: bool,
    pub valid: bool,
    pub file_size: u64,
    pub metadata: Option<CacheMetadata>,
    pub invalid_reason: Option<String>,
}

/// Which cache files [`EmbeddingCache::clear`] deletes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearScope {
    /// This project's file only
    Current,
    /// Every cache file in the directory
    All,
    /// Cache files last written more than `days` days ago
    OlderThan { days: u64 },
}

enum Parsed {
    Ok(CacheMetadata, Option<CachePayload>),
    Corrupt(String),
}

/// One lock per cache file, shared by every handle in the process.
static FILE_LOCKS: LazyLock<DashMap<PathBuf, Arc<Mutex<()>>>> = LazyLock::new(DashMap::new);

fn file_lock(path: &Path) -> Arc<Mutex<()>> {
    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    FILE_LOCKS.entry(key).or_default().clone()
}

/// Handle on one project's cache file
#[derive(Debug)]
pub struct EmbeddingCache {
    directory: PathBuf,
    project_root: PathBuf,
    path: PathBuf,
    io_lock: Arc<Mutex<()>>,
}

impl EmbeddingCache {
    pub fn new(directory: impl Into<PathBuf>, project_root: impl AsRef<Path>) -> Self {
        let directory = directory.into();
        let project_root = project_root.as_ref().to_path_buf();
        let path = directory.join(format!(
            "{}.{CACHE_EXTENSION}",
            project_key(&project_root)
        ));
        let io_lock = file_lock(&path);
        Self {
            directory,
            project_root,
            path,
            io_lock,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Write every embedding and ledger entry to disk.
    ///
    /// The file is written to a temporary sibling and renamed into place, so
    /// a crash mid-save leaves the previous cache intact.
    pub fn save(&self, store: &VectorStore, ledger: &FileLedger) -> CacheResult<CacheMetadata> {
        let records = store.list_embeddings(None);
        let ledger = ledger.entries();

        let metadata = CacheMetadata {
            model_id: store.model_id().to_string(),
            dimensions: store.dimension().get(),
            version: CACHE_VERSION,
            entity_count: records.len(),
            timestamp: get_utc_timestamp(),
            file_count: ledger.len(),
            project_root: self.project_root.clone(),
        };

        let config = bincode::config::standard();
        let metadata_bytes = bincode::serde::encode_to_vec(&metadata, config)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        let payload_bytes = bincode::serde::encode_to_vec(&CachePayload { records, ledger }, config)
            .map_err(|e| CacheError::Serialization(e.to_string()))?;
        let compressed = lz4_flex::compress_prepend_size(&payload_bytes);

        let metadata_len = u32::try_from(metadata_bytes.len())
            .map_err(|_| CacheError::Serialization("metadata too large".to_string()))?;

        let mut buffer = Vec::with_capacity(HEADER_SIZE + metadata_bytes.len() + compressed.len());
        buffer.extend_from_slice(MAGIC_BYTES);
        buffer.extend_from_slice(&metadata_len.to_le_bytes());
        buffer.extend_from_slice(&metadata_bytes);
        buffer.extend_from_slice(&compressed);

        let io_err = |source| CacheError::Io {
            path: self.path.clone(),
            source,
        };

        let _guard = self.io_lock.lock();
        fs::create_dir_all(&self.directory).map_err(io_err)?;

        let mut temp = tempfile::NamedTempFile::new_in(&self.directory).map_err(io_err)?;
        temp.write_all(&buffer).map_err(io_err)?;
        temp.as_file().sync_all().map_err(io_err)?;
        temp.persist(&self.path).map_err(|e| io_err(e.error))?;

        info!(
            "[cache] saved {} embeddings for {} files to {} ({} bytes)",
            metadata.entity_count,
            metadata.file_count,
            self.path.display(),
            buffer.len()
        );
        Ok(metadata)
    }

    /// Load the cache if it matches the active model.
    pub fn load(&self, model_id: &str, dimensions: usize) -> CacheLoad {
        let read = {
            let _guard = self.io_lock.lock();
            fs::read(&self.path)
        };
        let bytes = match read {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("[cache] no cache file at {}", self.path.display());
                return CacheLoad::NotFound;
            }
            Err(e) => return self.corrupt(format!("unreadable: {e}")),
        };

        let metadata = match parse(&bytes, false) {
            Parsed::Ok(metadata, _) => metadata,
            Parsed::Corrupt(reason) => return self.corrupt(reason),
        };
        if let Some(reason) = incompatibility(&metadata, model_id, dimensions) {
            warn!("[cache] cache {} is invalid: {reason}", self.path.display());
            return CacheLoad::Invalid {
                reason,
                metadata: Some(metadata),
            };
        }

        let (metadata, payload) = match parse(&bytes, true) {
            Parsed::Ok(metadata, Some(payload)) => (metadata, payload),
            Parsed::Ok(..) => return CacheLoad::NotFound,
            Parsed::Corrupt(reason) => return self.corrupt(reason),
        };

        info!(
            "[cache] loaded {} embeddings for {} files from {}",
            payload.records.len(),
            payload.ledger.len(),
            self.path.display()
        );
        CacheLoad::Loaded(LoadedCache {
            metadata,
            records: payload.records,
            ledger: payload.ledger,
        })
    }

    fn corrupt(&self, reason: String) -> CacheLoad {
        warn!(
            "[cache] ignoring corrupt cache {}: {reason}",
            self.path.display()
        );
        CacheLoad::NotFound
    }

    /// Describe the cache file without importing it.
    ///
    /// With `expected` set to `(model_id, dimensions)`, a file written for a
    /// different model is reported as invalid.
    pub fn stats(&self, expected: Option<(&str, usize)>) -> CacheStats {
        let mut stats = CacheStats {
            path: self.path.clone(),
            exists: false,
            valid: false,
            file_size: 0,
            metadata: None,
            invalid_reason: None,
        };

        let _guard = self.io_lock.lock();
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) => {
                if e.kind() != std::io::ErrorKind::NotFound {
                    stats.exists = true;
                    stats.invalid_reason = Some(format!("unreadable: {e}"));
                }
                return stats;
            }
        };
        stats.exists = true;
        stats.file_size = bytes.len() as u64;

        match parse(&bytes, true) {
            Parsed::Ok(metadata, _) => {
                stats.invalid_reason = expected
                    .and_then(|(model_id, dims)| incompatibility(&metadata, model_id, dims))
                    .or_else(|| {
                        (metadata.version != CACHE_VERSION).then(|| {
                            format!(
                                "format version {} != {CACHE_VERSION}",
                                metadata.version
                            )
                        })
                    });
                stats.valid = stats.invalid_reason.is_none();
                stats.metadata = Some(metadata);
            }
            Parsed::Corrupt(reason) => stats.invalid_reason = Some(reason),
        }
        stats
    }

    /// Delete cache files. Returns how many were removed.
    pub fn clear(&self, scope: ClearScope) -> CacheResult<usize> {
        if scope == ClearScope::Current {
            let _guard = self.io_lock.lock();
            return match fs::remove_file(&self.path) {
                Ok(()) => {
                    info!("[cache] removed {}", self.path.display());
                    Ok(1)
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
                Err(source) => Err(CacheError::Io {
                    path: self.path.clone(),
                    source,
                }),
            };
        }

        let entries = match fs::read_dir(&self.directory) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(source) => {
                return Err(CacheError::Io {
                    path: self.directory.clone(),
                    source,
                });
            }
        };

        let cutoff = match scope {
            ClearScope::OlderThan { days } => SystemTime::now()
                .checked_sub(Duration::from_secs(days.saturating_mul(86_400))),
            _ => None,
        };

        let mut removed = 0;
        for entry in entries.filter_map(Result::ok) {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(CACHE_EXTENSION) {
                continue;
            }

            if let ClearScope::OlderThan { .. } = scope {
                let modified = entry.metadata().and_then(|m| m.modified()).ok();
                let is_old = match (modified, cutoff) {
                    (Some(modified), Some(cutoff)) => modified < cutoff,
                    _ => false,
                };
                if !is_old {
                    continue;
                }
            }

            let lock = file_lock(&path);
            let _guard = lock.lock();
            match fs::remove_file(&path) {
                Ok(()) => {}
                // Another handle got there first
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(source) => return Err(CacheError::Io { path, source }),
            }
            debug!("[cache] removed {}", path.display());
            removed += 1;
        }

        info!(
            "[cache] cleared {removed} cache file(s) from {}",
            self.directory.display()
        );
        Ok(removed)
    }
}

/// First 16 hex chars of SHA256 over the canonical project root.
pub fn project_key(project_root: &Path) -> String {
    let canonical = project_root
        .canonicalize()
        .unwrap_or_else(|_| project_root.to_path_buf());
    let mut hasher = Sha256::new();
    hasher.update(canonical.to_string_lossy().as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    digest[..16].to_string()
}

fn incompatibility(metadata: &CacheMetadata, model_id: &str, dimensions: usize) -> Option<String> {
    if metadata.version != CACHE_VERSION {
        return Some(format!(
            "format version {} != {CACHE_VERSION}",
            metadata.version
        ));
    }
    if metadata.dimensions != dimensions {
        return Some(format!(
            "dimension {} != configured {dimensions}",
            metadata.dimensions
        ));
    }
    if metadata.model_id != model_id {
        return Some(format!(
            "model '{}' != configured '{model_id}'",
            metadata.model_id
        ));
    }
    None
}

fn parse(bytes: &[u8], with_payload: bool) -> Parsed {
    if bytes.len() < HEADER_SIZE || &bytes[..4] != MAGIC_BYTES {
        return Parsed::Corrupt("bad magic bytes".to_string());
    }

    let mut len_bytes = [0u8; 4];
    len_bytes.copy_from_slice(&bytes[4..HEADER_SIZE]);
    let metadata_len = u32::from_le_bytes(len_bytes) as usize;
    let Some(metadata_end) = HEADER_SIZE.checked_add(metadata_len) else {
        return Parsed::Corrupt("metadata length overflow".to_string());
    };
    let Some(metadata_bytes) = bytes.get(HEADER_SIZE..metadata_end) else {
        return Parsed::Corrupt("truncated metadata".to_string());
    };

    let config = bincode::config::standard();
    let metadata: CacheMetadata = match bincode::serde::decode_from_slice(metadata_bytes, config) {
        Ok((metadata, _)) => metadata,
        Err(e) => return Parsed::Corrupt(format!("metadata: {e}")),
    };

    // Another format version may lay the payload out differently
    if !with_payload || metadata.version != CACHE_VERSION {
        return Parsed::Ok(metadata, None);
    }

    let payload_bytes = match lz4_flex::decompress_size_prepended(&bytes[metadata_end..]) {
        Ok(bytes) => bytes,
        Err(e) => return Parsed::Corrupt(format!("payload: {e}")),
    };
    let payload: CachePayload = match bincode::serde::decode_from_slice(&payload_bytes, config) {
        Ok((payload, _)) => payload,
        Err(e) => return Parsed::Corrupt(format!("payload: {e}")),
    };

    if payload.records.len() != metadata.entity_count {
        return Parsed::Corrupt(format!(
            "entity count {} != recorded {}",
            payload.records.len(),
            metadata.entity_count
        ));
    }
    if payload
        .records
        .iter()
        .any(|r| r.vector.len() != metadata.dimensions)
    {
        return Parsed::Corrupt("record dimension differs from metadata".to_string());
    }

    Parsed::Ok(metadata, Some(payload))
}
