//! Code knowledge base: a graph of modules and functions, their embeddings,
//! and hybrid retrieval over both.
//!
//! The [`KnowledgeBase`] service object ties the pieces together: a
//! [`GraphStore`] for structure, a [`VectorStore`] for semantics, and an
//! [`EmbeddingCache`] plus [`IncrementalIndexer`] so that re-indexing after a
//! small edit only touches the files that changed.

pub mod cache;
pub mod config;
pub mod display;
pub mod error;
pub mod graph;
pub mod knowledge;
pub mod logging;
pub mod retrieval;
pub mod types;
pub mod vector;

// Explicit exports for better API clarity
pub use cache::{
    CacheLoad, ClearScope, EmbeddingCache, FileLedger, IncrementalIndexer, RefreshReport,
    SourceAnalyzer,
};
pub use config::Settings;
pub use error::{
    CacheError, CacheResult, GraphError, GraphResult, IndexError, IndexResult, RetrievalError,
    RetrievalResult,
};
pub use graph::{GraphSnapshot, GraphStore};
pub use knowledge::{KnowledgeBase, RestoreStatus};
pub use retrieval::{HybridRetriever, QueryInput, QueryOptions, RankedResult, Strategy};
pub use types::{Edge, EdgeKind, FileFacts, Node, NodeId, NodeKind, Visibility};
pub use vector::{EmbeddingGenerator, EmbeddingRecord, VectorError, VectorStore};
