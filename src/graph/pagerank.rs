//! PageRank by power iteration.
//!
//! PR(i) = (1-d)/N + d * (Σ PR(j) * share(j→i) + D/N)
//!
//! where D is the total rank held by dangling nodes (no outgoing edges),
//! spread uniformly so the scores keep summing to 1.

use super::snapshot::GraphSnapshot;
use crate::config::GraphConfig;
use crate::error::{GraphError, GraphResult};
use crate::types::{EdgeKind, NodeId};
use serde::Serialize;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct PageRankOptions {
    pub damping: f64,
    pub max_iterations: usize,
    /// Stop when the L1 change between iterations drops below this
    pub tolerance: f64,
    /// Edge kinds that count as links. Empty means all kinds.
    pub edge_kinds: Vec<EdgeKind>,
    /// Split rank by edge weight instead of uniformly across targets
    pub weighted: bool,
    /// Rescale final scores to sum to exactly 1
    pub normalize: bool,
}

impl Default for PageRankOptions {
    fn default() -> Self {
        Self {
            damping: 0.85,
            max_iterations: 100,
            tolerance: 1e-6,
            edge_kinds: vec![EdgeKind::Calls],
            weighted: false,
            normalize: true,
        }
    }
}

impl PageRankOptions {
    pub fn from_settings(config: &GraphConfig) -> Self {
        Self {
            damping: config.damping,
            max_iterations: config.max_iterations,
            tolerance: config.tolerance,
            ..Self::default()
        }
    }

    pub fn with_edge_kinds(mut self, kinds: impl Into<Vec<EdgeKind>>) -> Self {
        self.edge_kinds = kinds.into();
        self
    }

    pub fn validate(&self) -> GraphResult<()> {
        if !(0.0..=1.0).contains(&self.damping) {
            return Err(GraphError::invalid(
                "damping",
                self.damping,
                "must be within [0, 1]",
            ));
        }
        if self.max_iterations == 0 {
            return Err(GraphError::invalid(
                "max_iterations",
                self.max_iterations,
                "must be at least 1",
            ));
        }
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(GraphError::invalid(
                "tolerance",
                self.tolerance,
                "must be a finite, non-negative number",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct PageRankResult {
    pub scores: HashMap<NodeId, f64>,
    pub iterations: usize,
    pub converged: bool,
}

impl PageRankResult {
    pub fn score(&self, id: &NodeId) -> Option<f64> {
        self.scores.get(id).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.scores.is_empty()
    }

    /// Scores sorted descending, ties broken by node id.
    pub fn ranked(&self) -> Vec<(NodeId, f64)> {
        let mut ranked: Vec<(NodeId, f64)> = self
            .scores
            .iter()
            .map(|(id, score)| (id.clone(), *score))
            .collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        ranked
    }

    pub fn top(&self, n: usize) -> Vec<(NodeId, f64)> {
        let mut ranked = self.ranked();
        ranked.truncate(n);
        ranked
    }
}

/// Compute PageRank over the snapshot.
///
/// An empty snapshot yields an empty, converged result.
pub fn pagerank(snapshot: &GraphSnapshot, options: &PageRankOptions) -> GraphResult<PageRankResult> {
    options.validate()?;

    let n = snapshot.node_count();
    if n == 0 {
        return Ok(PageRankResult {
            converged: true,
            ..Default::default()
        });
    }

    let adjacency = snapshot.adjacency(&options.edge_kinds);
    let d = options.damping;
    let nf = n as f64;

    // Per-node list of (target, fraction of rank sent); empty means dangling
    let shares: Vec<Vec<(usize, f64)>> = adjacency
        .outgoing
        .iter()
        .map(|targets| {
            if options.weighted {
                let total: f64 = targets.iter().map(|(_, w)| w.max(0.0)).sum();
                if total <= 0.0 {
                    return Vec::new();
                }
                targets
                    .iter()
                    .map(|&(to, w)| (to, w.max(0.0) / total))
                    .collect()
            } else {
                let share = 1.0 / targets.len().max(1) as f64;
                targets.iter().map(|&(to, _)| (to, share)).collect()
            }
        })
        .collect();

    let mut rank = vec![1.0 / nf; n];
    let mut iterations = 0;
    let mut converged = false;

    for iteration in 1..=options.max_iterations {
        let dangling_mass: f64 = shares
            .iter()
            .zip(&rank)
            .filter(|(targets, _)| targets.is_empty())
            .map(|(_, r)| r)
            .sum();

        let base = (1.0 - d) / nf + d * dangling_mass / nf;
        let mut next = vec![base; n];

        for (from, targets) in shares.iter().enumerate() {
            let outflow = d * rank[from];
            for &(to, share) in targets {
                next[to] += outflow * share;
            }
        }

        let delta: f64 = next.iter().zip(&rank).map(|(a, b)| (a - b).abs()).sum();
        rank = next;
        iterations = iteration;

        if delta < options.tolerance {
            converged = true;
            break;
        }
    }

    if !converged {
        tracing::debug!(
            "[graph] pagerank stopped after {iterations} iterations without converging"
        );
    }

    if options.normalize {
        let total: f64 = rank.iter().sum();
        if total > 0.0 {
            for r in &mut rank {
                *r /= total;
            }
        }
    }

    let scores = rank
        .into_iter()
        .enumerate()
        .map(|(i, score)| (snapshot.node_id(i).clone(), score))
        .collect();

    Ok(PageRankResult {
        scores,
        iterations,
        converged,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Edge, Node};

    fn chain() -> GraphSnapshot {
        let ids: Vec<NodeId> = ["a", "b", "c"]
            .iter()
            .map(|n| NodeId::function("M", *n, 0))
            .collect();
        GraphSnapshot::new(
            0,
            ids.iter().cloned().map(Node::new).collect(),
            vec![
                Edge::calls(ids[0].clone(), ids[1].clone()),
                Edge::calls(ids[1].clone(), ids[2].clone()),
            ],
        )
    }

    #[test]
    fn test_scores_sum_to_one_with_dangling_node() {
        let result = pagerank(&chain(), &PageRankOptions::default()).unwrap();
        let total: f64 = result.scores.values().sum();

        assert!((total - 1.0).abs() < 1e-9);
        assert!(result.scores.values().all(|s| *s >= 0.0));
        assert!(result.converged);

        let ranked = result.ranked();
        assert_eq!(ranked[0].0, NodeId::function("M", "c", 0));
    }

    #[test]
    fn test_unnormalized_still_sums_close_to_one() {
        let options = PageRankOptions {
            normalize: false,
            ..Default::default()
        };
        let result = pagerank(&chain(), &options).unwrap();
        let total: f64 = result.scores.values().sum();
        assert!((total - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_invalid_damping_rejected() {
        for damping in [-0.1, 1.5, f64::NAN] {
            let options = PageRankOptions {
                damping,
                ..Default::default()
            };
            assert!(matches!(
                pagerank(&chain(), &options),
                Err(GraphError::InvalidParameter { name: "damping", .. })
            ));
        }
    }

    #[test]
    fn test_empty_graph() {
        let empty = GraphSnapshot::new(0, Vec::new(), Vec::new());
        let result = pagerank(&empty, &PageRankOptions::default()).unwrap();
        assert!(result.is_empty());
    }

    #[test]
    fn test_max_iterations_caps_work() {
        let options = PageRankOptions {
            max_iterations: 1,
            tolerance: 0.0,
            ..Default::default()
        };
        let result = pagerank(&chain(), &options).unwrap();
        assert_eq!(result.iterations, 1);
        assert!(!result.converged);
    }
}
