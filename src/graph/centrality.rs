//! Betweenness, closeness and degree centrality.
//!
//! Betweenness uses Brandes' algorithm on the directed, unweighted graph:
//! one BFS per source plus a reverse dependency sweep, O(V·E) overall. The
//! all-pairs measures are bounded by `max_nodes`; larger graphs are cut down
//! to the highest-degree nodes and the result records the cap.

use super::snapshot::{Adjacency, GraphSnapshot};
use crate::config::GraphConfig;
use crate::error::{GraphError, GraphResult};
use crate::types::{EdgeKind, NodeId};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};

#[derive(Debug, Clone, PartialEq)]
pub struct CentralityOptions {
    pub max_nodes: usize,
    pub normalize: bool,
    pub edge_kinds: Vec<EdgeKind>,
}

pub type BetweennessOptions = CentralityOptions;

impl Default for CentralityOptions {
    fn default() -> Self {
        Self {
            max_nodes: 1000,
            normalize: false,
            edge_kinds: vec![EdgeKind::Calls],
        }
    }
}

impl CentralityOptions {
    pub fn from_settings(config: &GraphConfig) -> Self {
        Self {
            max_nodes: config.betweenness_max_nodes,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> GraphResult<()> {
        if self.max_nodes == 0 {
            return Err(GraphError::invalid(
                "max_nodes",
                self.max_nodes,
                "must be at least 1",
            ));
        }
        Ok(())
    }
}

/// Applied when a graph exceeded `max_nodes`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NodeCap {
    /// Nodes kept (the highest-degree ones)
    pub limit: usize,
    /// Nodes in the full snapshot
    pub total: usize,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CentralityResult {
    /// Score per analysed node. Nodes dropped by the cap are absent.
    pub scores: HashMap<NodeId, f64>,
    pub cap: Option<NodeCap>,
}

impl CentralityResult {
    pub fn score(&self, id: &NodeId) -> Option<f64> {
        self.scores.get(id).copied()
    }

    pub fn is_capped(&self) -> bool {
        self.cap.is_some()
    }

    /// Scores sorted descending, ties broken by node id.
    pub fn ranked(&self) -> Vec<(NodeId, f64)> {
        let mut ranked: Vec<(NodeId, f64)> = self
            .scores
            .iter()
            .map(|(id, s)| (id.clone(), *s))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }
}

/// Adjacency restricted to the analysed nodes, with local indices.
struct Working {
    /// Local index -> snapshot index
    members: Vec<usize>,
    outgoing: Vec<Vec<usize>>,
    cap: Option<NodeCap>,
}

fn working_set(adjacency: &Adjacency, max_nodes: usize) -> Working {
    let n = adjacency.len();

    if n <= max_nodes {
        let outgoing = adjacency
            .outgoing
            .iter()
            .map(|targets| targets.iter().map(|(to, _)| *to).collect())
            .collect();
        return Working {
            members: (0..n).collect(),
            outgoing,
            cap: None,
        };
    }

    // Highest degree first; index order (= NodeId order) breaks ties
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        adjacency
            .degree(b)
            .cmp(&adjacency.degree(a))
            .then(a.cmp(&b))
    });
    let mut members: Vec<usize> = order.into_iter().take(max_nodes).collect();
    members.sort_unstable();

    let local: HashMap<usize, usize> = members
        .iter()
        .enumerate()
        .map(|(local, &global)| (global, local))
        .collect();

    let outgoing = members
        .iter()
        .map(|&global| {
            adjacency.outgoing[global]
                .iter()
                .filter_map(|(to, _)| local.get(to).copied())
                .collect()
        })
        .collect();

    tracing::warn!("[graph] centrality capped to {max_nodes} of {n} nodes (highest degree kept)");

    Working {
        members,
        outgoing,
        cap: Some(NodeCap {
            limit: max_nodes,
            total: n,
        }),
    }
}

/// Brandes betweenness centrality.
pub fn betweenness_centrality(
    snapshot: &GraphSnapshot,
    options: &BetweennessOptions,
) -> GraphResult<CentralityResult> {
    options.validate()?;
    if snapshot.is_empty() {
        return Ok(CentralityResult::default());
    }

    let adjacency = snapshot.adjacency(&options.edge_kinds);
    let working = working_set(&adjacency, options.max_nodes);
    let n = working.members.len();
    let mut centrality = vec![0.0f64; n];

    let mut stack: Vec<usize> = Vec::with_capacity(n);
    let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
    let mut sigma = vec![0.0f64; n];
    let mut distance = vec![-1i64; n];
    let mut delta = vec![0.0f64; n];
    let mut queue = VecDeque::new();

    for source in 0..n {
        stack.clear();
        for list in &mut predecessors {
            list.clear();
        }
        sigma.fill(0.0);
        distance.fill(-1);
        delta.fill(0.0);

        sigma[source] = 1.0;
        distance[source] = 0;
        queue.push_back(source);

        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &w in &working.outgoing[v] {
                if distance[w] < 0 {
                    distance[w] = distance[v] + 1;
                    queue.push_back(w);
                }
                if distance[w] == distance[v] + 1 {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += sigma[v] / sigma[w] * (1.0 + delta[w]);
            }
            if w != source {
                centrality[w] += delta[w];
            }
        }
    }

    if options.normalize && n > 2 {
        let scale = ((n - 1) * (n - 2)) as f64;
        for c in &mut centrality {
            *c /= scale;
        }
    }

    Ok(CentralityResult {
        scores: collect_scores(snapshot, &working.members, centrality),
        cap: working.cap,
    })
}

/// Closeness centrality with the Wasserman-Faust correction.
///
/// For a node reaching `r` others at total distance `D`, the score is
/// `(r / D) * (r / (n - 1))`, so nodes in small components are not
/// over-rewarded. Nodes that reach nothing score 0.
pub fn closeness_centrality(
    snapshot: &GraphSnapshot,
    options: &CentralityOptions,
) -> GraphResult<CentralityResult> {
    options.validate()?;
    if snapshot.is_empty() {
        return Ok(CentralityResult::default());
    }

    let adjacency = snapshot.adjacency(&options.edge_kinds);
    let working = working_set(&adjacency, options.max_nodes);
    let n = working.members.len();
    let mut closeness = vec![0.0f64; n];
    let mut distance = vec![usize::MAX; n];
    let mut queue = VecDeque::new();

    for source in 0..n {
        distance.fill(usize::MAX);
        distance[source] = 0;
        queue.push_back(source);

        let mut reached = 0usize;
        let mut total = 0usize;
        while let Some(v) = queue.pop_front() {
            for &w in &working.outgoing[v] {
                if distance[w] == usize::MAX {
                    distance[w] = distance[v] + 1;
                    reached += 1;
                    total += distance[w];
                    queue.push_back(w);
                }
            }
        }

        if reached > 0 && n > 1 {
            let r = reached as f64;
            closeness[source] = (r / total as f64) * (r / (n - 1) as f64);
        }
    }

    Ok(CentralityResult {
        scores: collect_scores(snapshot, &working.members, closeness),
        cap: working.cap,
    })
}

fn collect_scores(
    snapshot: &GraphSnapshot,
    members: &[usize],
    values: Vec<f64>,
) -> HashMap<NodeId, f64> {
    members
        .iter()
        .zip(values)
        .map(|(&global, value)| (snapshot.node_id(global).clone(), value))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DegreeCentrality {
    pub node_id: NodeId,
    pub in_degree: usize,
    pub out_degree: usize,
    pub total: usize,
}

/// In/out degree per node over distinct neighbours, sorted by total
/// descending then node id.
pub fn degree_centrality(snapshot: &GraphSnapshot, kinds: &[EdgeKind]) -> Vec<DegreeCentrality> {
    let adjacency = snapshot.adjacency(kinds);
    let mut degrees: Vec<DegreeCentrality> = (0..snapshot.node_count())
        .map(|i| DegreeCentrality {
            node_id: snapshot.node_id(i).clone(),
            in_degree: adjacency.in_degree(i),
            out_degree: adjacency.out_degree(i),
            total: adjacency.degree(i),
        })
        .collect();
    degrees.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.node_id.cmp(&b.node_id)));
    degrees
}
