//! Hybrid retrieval over the graph and vector stores.
//!
//! [`reciprocal_rank_fusion`] is the pure ranking primitive;
//! [`HybridRetriever`] gathers the candidate lists and applies a [`Strategy`].

mod fusion;
mod hybrid;

pub use fusion::{DEFAULT_RRF_K, reciprocal_rank_fusion, rrf_score};
pub use hybrid::{HybridRetriever, QueryInput, QueryOptions, RankedResult, Strategy};
