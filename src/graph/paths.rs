//! Bounded simple-path enumeration.
//!
//! Depth-first search with on-path membership to reject cycles. Three bounds
//! keep dense graphs from exploding: `max_depth` (edges per path),
//! `max_paths` (results) and `max_expansions` (edges examined). A reverse BFS
//! from the target prunes branches that cannot reach it within the remaining
//! depth.

use super::snapshot::GraphSnapshot;
use crate::config::GraphConfig;
use crate::error::{GraphError, GraphResult};
use crate::types::{EdgeKind, NodeId};
use serde::Serialize;
use std::collections::{BTreeSet, VecDeque};

#[derive(Debug, Clone, PartialEq)]
pub struct PathOptions {
    pub max_depth: usize,
    pub max_paths: usize,
    pub max_expansions: usize,
    /// Nodes with more outgoing neighbours than this are reported
    pub high_degree_threshold: usize,
    pub edge_kinds: Vec<EdgeKind>,
}

impl Default for PathOptions {
    fn default() -> Self {
        Self {
            max_depth: 5,
            max_paths: 100,
            max_expansions: 100_000,
            high_degree_threshold: 10,
            edge_kinds: vec![EdgeKind::Calls],
        }
    }
}

impl PathOptions {
    pub fn from_settings(config: &GraphConfig) -> Self {
        Self {
            max_depth: config.max_depth,
            max_paths: config.max_paths,
            max_expansions: config.max_expansions,
            high_degree_threshold: config.high_degree_threshold,
            ..Self::default()
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn with_max_paths(mut self, max_paths: usize) -> Self {
        self.max_paths = max_paths;
        self
    }

    pub fn validate(&self) -> GraphResult<()> {
        if self.max_depth == 0 {
            return Err(GraphError::invalid("max_depth", 0, "must be at least 1"));
        }
        if self.max_paths == 0 {
            return Err(GraphError::invalid("max_paths", 0, "must be at least 1"));
        }
        if self.max_expansions == 0 {
            return Err(GraphError::invalid(
                "max_expansions",
                0,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct PathResult {
    /// Node sequences from source to target, shortest first
    pub paths: Vec<Vec<NodeId>>,
    /// Search stopped at `max_paths` or `max_expansions`; more paths may exist
    pub truncated: bool,
    /// Visited nodes whose out-degree exceeded the threshold, sorted
    pub high_degree_nodes: Vec<NodeId>,
    /// Edges examined
    pub expansions: usize,
}

/// Enumerate simple paths from `from` to `to`.
///
/// Unknown endpoints and `from == to` yield an empty result.
pub fn find_paths(
    snapshot: &GraphSnapshot,
    from: &NodeId,
    to: &NodeId,
    options: &PathOptions,
) -> GraphResult<PathResult> {
    options.validate()?;

    let (Some(source), Some(target)) = (snapshot.index_of(from), snapshot.index_of(to)) else {
        return Ok(PathResult::default());
    };
    if source == target {
        return Ok(PathResult::default());
    }

    let adjacency = snapshot.adjacency(&options.edge_kinds);
    let n = adjacency.len();

    // Shortest distance from each node to the target, within max_depth
    let mut to_target = vec![usize::MAX; n];
    to_target[target] = 0;
    let mut queue = VecDeque::from([target]);
    while let Some(v) = queue.pop_front() {
        if to_target[v] >= options.max_depth {
            continue;
        }
        for &(u, _) in &adjacency.incoming[v] {
            if to_target[u] == usize::MAX {
                to_target[u] = to_target[v] + 1;
                queue.push_back(u);
            }
        }
    }

    let mut result = PathResult::default();
    if to_target[source] == usize::MAX {
        return Ok(result);
    }

    let mut high_degree: BTreeSet<usize> = BTreeSet::new();
    let flag = |v: usize, high_degree: &mut BTreeSet<usize>| {
        let degree = adjacency.out_degree(v);
        if degree > options.high_degree_threshold && high_degree.insert(v) {
            tracing::warn!(
                "[graph] path search crossing high-degree node {} ({degree} neighbours)",
                snapshot.node_id(v)
            );
        }
    };

    let mut on_path = vec![false; n];
    let mut path: Vec<usize> = vec![source];
    let mut frames: Vec<(usize, usize)> = vec![(source, 0)];
    let mut found: Vec<Vec<usize>> = Vec::new();
    on_path[source] = true;
    flag(source, &mut high_degree);

    while let Some(frame) = frames.last_mut() {
        let (v, next) = *frame;
        frame.1 += 1;
        let Some(&(w, _)) = adjacency.outgoing[v].get(next) else {
            frames.pop();
            path.pop();
            on_path[v] = false;
            continue;
        };

        if result.expansions >= options.max_expansions {
            result.truncated = true;
            tracing::warn!(
                "[graph] path search from {from} to {to} hit the expansion budget ({})",
                options.max_expansions
            );
            break;
        }
        result.expansions += 1;

        if on_path[w] {
            continue;
        }

        // Edges in the path once w is appended
        let depth = path.len();
        if w == target {
            if depth <= options.max_depth {
                let mut complete = path.clone();
                complete.push(w);
                found.push(complete);
                if found.len() >= options.max_paths {
                    result.truncated = true;
                    break;
                }
            }
            continue;
        }

        if to_target[w] == usize::MAX || depth + to_target[w] > options.max_depth {
            continue;
        }

        flag(w, &mut high_degree);
        on_path[w] = true;
        path.push(w);
        frames.push((w, 0));
    }

    let ids = |p: &[usize]| p.iter().map(|&i| snapshot.node_id(i)).collect::<Vec<_>>();
    found.sort_by(|a, b| a.len().cmp(&b.len()).then_with(|| ids(a).cmp(&ids(b))));

    result.paths = found
        .into_iter()
        .map(|p| p.into_iter().map(|i| snapshot.node_id(i).clone()).collect())
        .collect();
    result.high_degree_nodes = high_degree
        .into_iter()
        .map(|i| snapshot.node_id(i).clone())
        .collect();

    Ok(result)
}
