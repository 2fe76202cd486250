//! Whole-graph summary.

use super::pagerank::{PageRankOptions, pagerank};
use super::snapshot::GraphSnapshot;
use crate::error::GraphResult;
use crate::types::{EdgeKind, NodeId, NodeKind};
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default, Serialize)]
pub struct GraphStats {
    pub node_count: usize,
    pub edge_count: usize,
    pub nodes_by_kind: BTreeMap<NodeKind, usize>,
    pub edges_by_kind: BTreeMap<EdgeKind, usize>,
    /// Mean out-degree over the selected edge kinds
    pub average_degree: f64,
    /// Directed density E / (N (N - 1)) over the selected edge kinds
    pub density: f64,
    pub dangling_edges: usize,
    pub top_ranked: Vec<(NodeId, f64)>,
}

/// Summarise a snapshot, including the `top_n` PageRank leaders.
pub fn graph_stats(
    snapshot: &GraphSnapshot,
    options: &PageRankOptions,
    top_n: usize,
) -> GraphResult<GraphStats> {
    let mut nodes_by_kind = BTreeMap::new();
    for node in snapshot.nodes() {
        *nodes_by_kind.entry(node.kind()).or_insert(0) += 1;
    }
    let mut edges_by_kind = BTreeMap::new();
    for edge in snapshot.edges() {
        *edges_by_kind.entry(edge.kind).or_insert(0) += 1;
    }

    let n = snapshot.node_count();
    let adjacency = snapshot.adjacency(&options.edge_kinds);
    let links: usize = adjacency.outgoing.iter().map(Vec::len).sum();

    let average_degree = if n == 0 { 0.0 } else { links as f64 / n as f64 };
    let density = if n < 2 {
        0.0
    } else {
        links as f64 / (n as f64 * (n - 1) as f64)
    };

    let top_ranked = if top_n == 0 {
        Vec::new()
    } else {
        pagerank(snapshot, options)?.top(top_n)
    };

    Ok(GraphStats {
        node_count: n,
        edge_count: snapshot.edge_count(),
        nodes_by_kind,
        edges_by_kind,
        average_degree,
        density,
        dangling_edges: snapshot.dangling_edge_count(),
        top_ranked,
    })
}
