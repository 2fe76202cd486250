//! Immutable point-in-time view of the graph.
//!
//! Algorithms never touch the live tables. They take a [`GraphSnapshot`],
//! which owns sorted copies of nodes and edges, and run on dense indices.
//! Node index order equals `NodeId` order, so iterating by index is also the
//! deterministic tie-break order.

use crate::types::{Edge, EdgeKind, Node, NodeId, NodeKind};
use std::collections::HashMap;

#[derive(Debug)]
pub struct GraphSnapshot {
    generation: u64,
    nodes: Vec<Node>,
    index: HashMap<NodeId, usize>,
    edges: Vec<Edge>,
    dangling_edges: usize,
}

/// Dense adjacency lists over the snapshot's node indices.
///
/// Parallel edges of different kinds between the same pair are merged into
/// one entry with their weights summed. Lists are sorted by neighbour index.
#[derive(Debug, Clone, Default)]
pub struct Adjacency {
    pub outgoing: Vec<Vec<(usize, f64)>>,
    pub incoming: Vec<Vec<(usize, f64)>>,
}

impl Adjacency {
    pub fn len(&self) -> usize {
        self.outgoing.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outgoing.is_empty()
    }

    pub fn out_degree(&self, idx: usize) -> usize {
        self.outgoing[idx].len()
    }

    pub fn in_degree(&self, idx: usize) -> usize {
        self.incoming[idx].len()
    }

    /// Distinct neighbours in either direction.
    pub fn degree(&self, idx: usize) -> usize {
        self.out_degree(idx) + self.in_degree(idx)
    }

    pub fn out_weight(&self, idx: usize) -> f64 {
        self.outgoing[idx].iter().map(|(_, w)| w).sum()
    }
}

impl GraphSnapshot {
    pub(crate) fn new(generation: u64, mut nodes: Vec<Node>, mut edges: Vec<Edge>) -> Self {
        nodes.sort_by(|a, b| a.id.cmp(&b.id));
        edges.sort_by(|a, b| {
            (&a.from, &a.to, a.kind).cmp(&(&b.from, &b.to, b.kind))
        });

        let index: HashMap<NodeId, usize> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| (node.id.clone(), i))
            .collect();

        let dangling_edges = edges
            .iter()
            .filter(|e| !index.contains_key(&e.from) || !index.contains_key(&e.to))
            .count();

        if dangling_edges > 0 {
            tracing::debug!(
                "[graph] snapshot {generation}: {dangling_edges} edge(s) reference missing nodes"
            );
        }

        Self {
            generation,
            nodes,
            index,
            edges,
            dangling_edges,
        }
    }

    /// Write generation of the store when this snapshot was taken.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// All nodes, sorted by id.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    /// All edges including dangling ones, sorted by `(from, to, kind)`.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    pub fn nodes_of_kind(&self, kind: NodeKind) -> impl Iterator<Item = &Node> {
        self.nodes.iter().filter(move |n| n.kind() == kind)
    }

    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &Edge> {
        self.edges.iter().filter(move |e| e.kind == kind)
    }

    pub fn index_of(&self, id: &NodeId) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn node_id(&self, idx: usize) -> &NodeId {
        &self.nodes[idx].id
    }

    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.index_of(id).map(|i| &self.nodes[i])
    }

    /// Edges whose `from` or `to` node is not in the snapshot.
    ///
    /// These come from forward references or files that failed to analyze.
    /// Algorithms skip them.
    pub fn dangling_edge_count(&self) -> usize {
        self.dangling_edges
    }

    /// Build adjacency over edges of the given kinds.
    ///
    /// An empty `kinds` slice selects every kind.
    pub fn adjacency(&self, kinds: &[EdgeKind]) -> Adjacency {
        let n = self.nodes.len();
        let mut out_maps: Vec<HashMap<usize, f64>> = vec![HashMap::new(); n];

        for edge in &self.edges {
            if !kinds.is_empty() && !kinds.contains(&edge.kind) {
                continue;
            }
            let (Some(from), Some(to)) = (self.index_of(&edge.from), self.index_of(&edge.to))
            else {
                continue;
            };
            *out_maps[from].entry(to).or_default() += edge.weight;
        }

        let mut outgoing: Vec<Vec<(usize, f64)>> = Vec::with_capacity(n);
        let mut incoming: Vec<Vec<(usize, f64)>> = vec![Vec::new(); n];

        for (from, targets) in out_maps.into_iter().enumerate() {
            let mut list: Vec<(usize, f64)> = targets.into_iter().collect();
            list.sort_by_key(|(to, _)| *to);
            for &(to, weight) in &list {
                incoming[to].push((from, weight));
            }
            outgoing.push(list);
        }
        // `from` is visited in ascending order, so incoming lists are already sorted

        Adjacency { outgoing, incoming }
    }
}
