//! Concurrent node/edge tables.
//!
//! All tables are `DashMap`s, so writes to distinct entities proceed in
//! parallel and a single upsert is never observed half-applied. Secondary
//! indexes (outgoing, incoming, by-file) hold keys only; edges and nodes live
//! in exactly one table each.

use super::snapshot::GraphSnapshot;
use crate::types::{Edge, EdgeKey, EdgeKind, Node, NodeId, NodeKind};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct GraphStore {
    nodes: DashMap<NodeId, Node>,
    edges: DashMap<EdgeKey, Edge>,
    outgoing: DashMap<NodeId, HashSet<EdgeKey>>,
    incoming: DashMap<NodeId, HashSet<EdgeKey>>,
    by_file: DashMap<PathBuf, HashSet<NodeId>>,
    generation: AtomicU64,
    snapshot: Mutex<Option<Arc<GraphSnapshot>>>,
}

impl GraphStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn bump(&self) {
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Monotonic counter advanced by every mutation.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Insert or overwrite a node. Returns the previous value.
    pub fn upsert_node(&self, node: Node) -> Option<Node> {
        let id = node.id.clone();
        let file = node.file.clone();
        let previous = self.nodes.insert(id.clone(), node);

        if let Some(old_file) = previous.as_ref().and_then(|p| p.file.as_ref()) {
            if file.as_ref() != Some(old_file) {
                self.unindex_file(old_file, &id);
            }
        }
        if let Some(file) = file {
            self.by_file.entry(file).or_default().insert(id);
        }

        self.bump();
        previous
    }

    pub fn upsert_nodes(&self, nodes: impl IntoIterator<Item = Node>) {
        for node in nodes {
            self.upsert_node(node);
        }
    }

    /// Insert or overwrite an edge, keyed by `(from, to, kind)`.
    pub fn upsert_edge(&self, edge: Edge) -> Option<Edge> {
        let key = edge.key();
        let previous = self.edges.insert(key.clone(), edge);
        self.index_edge(key);
        self.bump();
        previous
    }

    /// Insert an edge, adding its weight to an existing edge with the same key.
    ///
    /// Used to count call sites: three calls from `f` to `g` become one edge
    /// of weight 3.
    pub fn accumulate_edge(&self, edge: Edge) {
        let key = edge.key();
        let weight = edge.weight;
        self.edges
            .entry(key.clone())
            .and_modify(|existing| existing.weight += weight)
            .or_insert(edge);
        self.index_edge(key);
        self.bump();
    }

    pub fn upsert_edges(&self, edges: impl IntoIterator<Item = Edge>) {
        for edge in edges {
            self.upsert_edge(edge);
        }
    }

    fn index_edge(&self, key: EdgeKey) {
        self.outgoing
            .entry(key.from.clone())
            .or_default()
            .insert(key.clone());
        self.incoming.entry(key.to.clone()).or_default().insert(key);
    }

    fn unindex_file(&self, file: &Path, id: &NodeId) {
        if let Some(mut ids) = self.by_file.get_mut(file) {
            ids.remove(id);
        }
        self.by_file.remove_if(file, |_, ids| ids.is_empty());
    }

    pub fn get_node(&self, id: &NodeId) -> Option<Node> {
        self.nodes.get(id).map(|entry| entry.clone())
    }

    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    pub fn get_edge(&self, key: &EdgeKey) -> Option<Edge> {
        self.edges.get(key).map(|entry| entry.clone())
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// Nodes of one kind (or all), sorted by id.
    pub fn list_nodes(&self, kind: Option<NodeKind>) -> Vec<Node> {
        let snapshot = self.snapshot();
        snapshot
            .nodes()
            .iter()
            .filter(|n| kind.is_none_or(|k| n.kind() == k))
            .cloned()
            .collect()
    }

    /// Edges of one kind (or all), sorted by `(from, to, kind)`.
    pub fn list_edges(&self, kind: Option<EdgeKind>) -> Vec<Edge> {
        let snapshot = self.snapshot();
        snapshot
            .edges()
            .iter()
            .filter(|e| kind.is_none_or(|k| e.kind == k))
            .cloned()
            .collect()
    }

    /// Edges pointing at `id`. Unknown ids yield an empty list.
    pub fn get_incoming_edges(&self, id: &NodeId, kind: Option<EdgeKind>) -> Vec<Edge> {
        self.collect_edges(&self.incoming, id, kind)
    }

    /// Edges leaving `id`. Unknown ids yield an empty list.
    pub fn get_outgoing_edges(&self, id: &NodeId, kind: Option<EdgeKind>) -> Vec<Edge> {
        self.collect_edges(&self.outgoing, id, kind)
    }

    fn collect_edges(
        &self,
        index: &DashMap<NodeId, HashSet<EdgeKey>>,
        id: &NodeId,
        kind: Option<EdgeKind>,
    ) -> Vec<Edge> {
        // Copy keys out first so no index shard stays locked while reading edges
        let keys: Vec<EdgeKey> = match index.get(id) {
            Some(keys) => keys
                .iter()
                .filter(|k| kind.is_none_or(|want| k.kind == want))
                .cloned()
                .collect(),
            None => return Vec::new(),
        };

        let mut edges: Vec<Edge> = keys.iter().filter_map(|k| self.get_edge(k)).collect();
        edges.sort_by(|a, b| a.key().cmp(&b.key()));
        edges
    }

    pub fn remove_edge(&self, key: &EdgeKey) -> Option<Edge> {
        let (_, edge) = self.edges.remove(key)?;
        if let Some(mut keys) = self.outgoing.get_mut(&key.from) {
            keys.remove(key);
        }
        if let Some(mut keys) = self.incoming.get_mut(&key.to) {
            keys.remove(key);
        }
        self.bump();
        Some(edge)
    }

    /// Remove a node and every edge touching it.
    ///
    /// Edges are cascaded even when the node itself is absent, which cleans
    /// up dangling edges that referenced it.
    pub fn remove_node(&self, id: &NodeId) -> Option<Node> {
        let removed = self.nodes.remove(id).map(|(_, node)| node);
        if let Some(file) = removed.as_ref().and_then(|n| n.file.as_ref()) {
            self.unindex_file(file, id);
        }

        if let Some((_, keys)) = self.outgoing.remove(id) {
            for key in keys {
                self.edges.remove(&key);
                if let Some(mut other) = self.incoming.get_mut(&key.to) {
                    other.remove(&key);
                }
            }
        }
        if let Some((_, keys)) = self.incoming.remove(id) {
            for key in keys {
                self.edges.remove(&key);
                if let Some(mut other) = self.outgoing.get_mut(&key.from) {
                    other.remove(&key);
                }
            }
        }

        self.bump();
        removed
    }

    /// Drop the outgoing edges of `id`, optionally only of one kind.
    ///
    /// Returns the number of edges removed.
    pub fn remove_outgoing_edges(&self, id: &NodeId, kind: Option<EdgeKind>) -> usize {
        let keys: Vec<EdgeKey> = match self.outgoing.get(id) {
            Some(keys) => keys
                .iter()
                .filter(|k| kind.is_none_or(|want| k.kind == want))
                .cloned()
                .collect(),
            None => return 0,
        };

        keys.iter().filter(|k| self.remove_edge(k).is_some()).count()
    }

    /// Ids of the nodes defined in `file`, sorted.
    pub fn nodes_in_file(&self, file: &Path) -> Vec<NodeId> {
        let mut ids: Vec<NodeId> = self
            .by_file
            .get(file)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        ids.sort();
        ids
    }

    /// Files that currently own at least one node, sorted.
    pub fn files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.by_file.iter().map(|e| e.key().clone()).collect();
        files.sort();
        files
    }

    /// Remove every node defined in `file` (with cascading edges).
    ///
    /// Returns the removed ids, sorted.
    pub fn remove_file(&self, file: &Path) -> Vec<NodeId> {
        let ids = self.nodes_in_file(file);
        for id in &ids {
            self.remove_node(id);
        }
        self.by_file.remove(file);
        ids
    }

    pub fn clear(&self) {
        self.nodes.clear();
        self.edges.clear();
        self.outgoing.clear();
        self.incoming.clear();
        self.by_file.clear();
        self.bump();
        *self.snapshot.lock() = None;
    }

    /// Point-in-time view for algorithms.
    ///
    /// Reuses the previous snapshot while no write has happened since it was
    /// taken. Building a snapshot reads one shard at a time, so writers are
    /// never blocked for the duration of a build.
    pub fn snapshot(&self) -> Arc<GraphSnapshot> {
        let generation = self.generation();
        let mut cached = self.snapshot.lock();
        if let Some(snapshot) = cached.as_ref() {
            if snapshot.generation() == generation {
                return Arc::clone(snapshot);
            }
        }

        let nodes: Vec<Node> = self.nodes.iter().map(|e| e.value().clone()).collect();
        let edges: Vec<Edge> = self.edges.iter().map(|e| e.value().clone()).collect();
        let snapshot = Arc::new(GraphSnapshot::new(generation, nodes, edges));

        *cached = Some(Arc::clone(&snapshot));
        snapshot
    }
}
