//! Error types for the code knowledge base
//!
//! This module provides structured error types using thiserror. Lookups that
//! find nothing never produce an error; these enums cover invalid parameters,
//! I/O on the cache file, and failures reported by external collaborators.

use crate::vector::VectorError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors raised at the graph algorithm call boundary
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GraphError {
    /// Option value outside its accepted range, rejected before computation starts
    #[error("Invalid parameter '{name}' = {value}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: String,
        reason: &'static str,
    },
}

impl GraphError {
    pub fn invalid(name: &'static str, value: impl ToString, reason: &'static str) -> Self {
        Self::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    pub fn status_code(&self) -> String {
        match self {
            Self::InvalidParameter { .. } => "INVALID_PARAMETER",
        }
        .to_string()
    }
}

/// Errors from writing or deleting cache files
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cache I/O failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to serialize cache: {0}")]
    Serialization(String),

    #[error("Cache is disabled in settings")]
    Disabled,
}

impl CacheError {
    pub fn status_code(&self) -> String {
        match self {
            Self::Io { .. } => "CACHE_IO_ERROR",
            Self::Serialization(_) => "CACHE_SERIALIZATION_ERROR",
            Self::Disabled => "CACHE_DISABLED",
        }
        .to_string()
    }

    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::Io { .. } => vec![
                "Check disk space and permissions of the cache directory",
                "Set cache.directory in .codeatlas/settings.toml to a writable location",
            ],
            Self::Serialization(_) => vec!["Run 'codeatlas cache clear' and re-index"],
            Self::Disabled => vec!["Set cache.enabled = true to persist embeddings"],
        }
    }
}

/// Errors reported while refreshing files into the stores
#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Failed to read file '{path}': {source}")]
    FileRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Analyzer failed on '{path}': {reason}")]
    Analyzer { path: PathBuf, reason: String },

    #[error("No analyzer supports '{path}'")]
    UnsupportedFile { path: PathBuf },

    #[error("Embedding generation failed for '{path}': {source}")]
    Embedding { path: PathBuf, source: VectorError },

    #[error("Failed to build worker pool: {0}")]
    WorkerPool(String),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl IndexError {
    pub fn status_code(&self) -> String {
        match self {
            Self::FileRead { .. } => "FILE_READ_ERROR",
            Self::Analyzer { .. } => "ANALYZER_ERROR",
            Self::UnsupportedFile { .. } => "UNSUPPORTED_FILE",
            Self::Embedding { .. } => "EMBEDDING_ERROR",
            Self::WorkerPool(_) => "WORKER_POOL_ERROR",
            Self::Cache(e) => return e.status_code(),
        }
        .to_string()
    }

    pub fn recovery_suggestions(&self) -> Vec<&'static str> {
        match self {
            Self::FileRead { .. } => vec![
                "Check that the file exists and you have read permissions",
                "Ensure the file is not locked by another process",
            ],
            Self::Embedding { .. } => vec![
                "Verify the embedding model is available in the model cache directory",
                "Run a full refresh after changing semantic.model",
            ],
            Self::Cache(e) => e.recovery_suggestions(),
            _ => vec![],
        }
    }
}

/// Errors raised by hybrid retrieval
#[derive(Error, Debug)]
pub enum RetrievalError {
    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Vector(#[from] VectorError),

    #[error("A text query needs an embedding generator; pass a vector query instead")]
    NoEmbedder,

    #[error("Invalid retrieval option '{name}': {reason}")]
    InvalidOption {
        name: &'static str,
        reason: &'static str,
    },
}

impl RetrievalError {
    pub fn status_code(&self) -> String {
        match self {
            Self::Graph(e) => return e.status_code(),
            Self::Vector(_) => "VECTOR_ERROR",
            Self::NoEmbedder => "NO_EMBEDDER",
            Self::InvalidOption { .. } => "INVALID_PARAMETER",
        }
        .to_string()
    }
}

/// Result type alias for graph algorithm calls
pub type GraphResult<T> = Result<T, GraphError>;

/// Result type alias for cache file operations
pub type CacheResult<T> = Result<T, CacheError>;

/// Result type alias for refresh operations
pub type IndexResult<T> = Result<T, IndexError>;

/// Result type alias for retrieval queries
pub type RetrievalResult<T> = Result<T, RetrievalError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        let err = GraphError::invalid("damping", -0.5, "must be within [0, 1]");
        assert_eq!(err.status_code(), "INVALID_PARAMETER");
        assert!(err.to_string().contains("damping"));

        let err = IndexError::Cache(CacheError::Disabled);
        assert_eq!(err.status_code(), "CACHE_DISABLED");

        let err = RetrievalError::from(GraphError::invalid("max_depth", 0, "must be positive"));
        assert_eq!(err.status_code(), "INVALID_PARAMETER");
    }

    #[test]
    fn test_recovery_suggestions() {
        let err = IndexError::FileRead {
            path: PathBuf::from("lib/a.ex"),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "gone"),
        };
        assert!(!err.recovery_suggestions().is_empty());
        assert!(err.to_string().contains("lib/a.ex"));
    }
}
