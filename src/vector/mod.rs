//! Embedding storage and semantic search.
//!
//! The store is a brute-force O(N) scan over an in-memory table. At tens of
//! thousands of entities a linear cosine pass stays well inside interactive
//! latency, so there is no approximate index to keep consistent on refresh.

mod embedding;
mod similarity;
mod store;
mod types;

#[cfg(test)]
pub use embedding::MockEmbeddingGenerator;
pub use embedding::{
    EmbeddingGenerator, FastEmbedGenerator, SUPPORTED_MODELS, model_dimension, node_text,
    parse_embedding_model,
};
pub use similarity::cosine_similarity;
pub use store::VectorStore;
pub(crate) use store::compare_hits;
pub use types::{
    EmbeddingRecord, SearchHit, SearchOptions, VECTOR_DIMENSION_384, VectorDimension, VectorError,
};
