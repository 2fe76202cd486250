//! Knowledge graph of modules, functions and their relations.
//!
//! [`GraphStore`] owns the live tables and accepts concurrent writers.
//! Every algorithm is a pure function over a [`GraphSnapshot`] taken from the
//! store, so long computations never hold a lock and never see a write that
//! lands after the snapshot was taken.
//!
//! # Example
//!
//! ```
//! use codeatlas::graph::{GraphStore, PageRankOptions, pagerank};
//! use codeatlas::types::{Edge, Node, NodeId};
//!
//! let store = GraphStore::new();
//! store.upsert_node(Node::function("Billing", "charge", 2));
//! store.upsert_node(Node::function("Billing", "log", 1));
//! store.upsert_edge(Edge::calls(
//!     NodeId::function("Billing", "charge", 2),
//!     NodeId::function("Billing", "log", 1),
//! ));
//!
//! let ranks = pagerank(&store.snapshot(), &PageRankOptions::default()).unwrap();
//! assert_eq!(ranks.ranked()[0].0, NodeId::function("Billing", "log", 1));
//! ```

mod centrality;
mod community;
mod pagerank;
mod paths;
mod snapshot;
mod stats;
mod store;

pub use centrality::{
    BetweennessOptions, CentralityOptions, CentralityResult, DegreeCentrality, NodeCap,
    betweenness_centrality, closeness_centrality, degree_centrality,
};
pub use community::{CommunityOptions, CommunityResult, detect_communities, label_propagation};
pub use pagerank::{PageRankOptions, PageRankResult, pagerank};
pub use paths::{PathOptions, PathResult, find_paths};
pub use snapshot::{Adjacency, GraphSnapshot};
pub use stats::{GraphStats, graph_stats};
pub use store::GraphStore;
