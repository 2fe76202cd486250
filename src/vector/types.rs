//! Type-safe wrappers and core types for the vector store.
//!
//! Embedding records are keyed by [`NodeId`] and carry the exact text that
//! was embedded, so a later refresh can tell what a vector was built from.

use crate::types::{NodeId, NodeKind};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Dimension of all-MiniLM-L6-v2 and BGE-small embeddings.
pub const VECTOR_DIMENSION_384: usize = 384;

/// Type-safe wrapper for vector dimensions.
///
/// Ensures runtime validation of vector dimensions to prevent mismatches
/// between the active model and stored records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VectorDimension(usize);

impl VectorDimension {
    /// Creates a new `VectorDimension` with validation.
    ///
    /// Returns an error if the dimension is zero.
    pub fn new(dim: usize) -> Result<Self, VectorError> {
        if dim == 0 {
            return Err(VectorError::InvalidDimension {
                dimension: 0,
                reason: "Vector dimension cannot be zero",
            });
        }
        Ok(Self(dim))
    }

    /// Creates a standard 384-dimensional vector dimension.
    #[must_use]
    pub const fn dimension_384() -> Self {
        Self(VECTOR_DIMENSION_384)
    }

    #[must_use]
    pub const fn get(&self) -> usize {
        self.0
    }

    /// Validates that a vector has the expected dimension.
    pub fn validate_vector(&self, vector: &[f32]) -> Result<(), VectorError> {
        if vector.len() != self.0 {
            return Err(VectorError::DimensionMismatch {
                expected: self.0,
                actual: vector.len(),
            });
        }
        Ok(())
    }
}

impl std::fmt::Display for VectorDimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One stored embedding.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub node_type: NodeKind,
    pub node_id: NodeId,
    pub vector: Vec<f32>,
    pub source_text: String,
}

impl EmbeddingRecord {
    pub fn new(node_id: NodeId, vector: Vec<f32>, source_text: impl Into<String>) -> Self {
        Self {
            node_type: node_id.kind(),
            node_id,
            vector,
            source_text: source_text.into(),
        }
    }
}

/// A single similarity search hit.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchHit {
    pub node_id: NodeId,
    pub node_type: NodeKind,
    pub similarity: f32,
    pub source_text: String,
}

/// Options for [`crate::vector::VectorStore::search`].
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOptions {
    pub limit: usize,
    /// Minimum cosine similarity, inclusive
    pub threshold: f32,
    pub node_type: Option<NodeKind>,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            limit: 10,
            threshold: 0.2,
            node_type: None,
        }
    }
}

impl SearchOptions {
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_node_type(mut self, node_type: NodeKind) -> Self {
        self.node_type = Some(node_type);
        self
    }
}

/// Errors that can occur during vector operations.
///
/// All error messages include actionable suggestions for resolution.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum VectorError {
    #[error(
        "Vector dimension mismatch: expected {expected}, got {actual}\nSuggestion: Ensure all vectors use the same embedding model"
    )]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("Invalid vector dimension: {dimension}\nReason: {reason}")]
    InvalidDimension {
        dimension: usize,
        reason: &'static str,
    },

    #[error(
        "Embedding generation failed: {0}\nSuggestion: Verify the embedding model is properly initialized"
    )]
    EmbeddingFailed(String),

    #[error("Unknown embedding model '{0}'\nSuggestion: Use one of {1}")]
    UnknownModel(String, &'static str),

    #[error("Invalid search threshold: {0}\nReason: threshold must be a finite value in [-1.0, 1.0]")]
    InvalidThreshold(f32),
}
