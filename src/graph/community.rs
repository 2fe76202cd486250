//! Community detection.
//!
//! Louvain modularity optimisation on the symmetrised graph:
//!
//! Q = Σ_c [ in_c / 2m - γ (tot_c / 2m)² ]
//!
//! where `in_c` is the weight inside community `c` (ordered pairs), `tot_c`
//! the summed degree of its members and γ the resolution. Nodes are visited
//! in id order and candidate communities in ascending order, and a node only
//! moves on a strictly better gain, so reruns on an unchanged graph give the
//! same partition.

use super::snapshot::{Adjacency, GraphSnapshot};
use crate::config::GraphConfig;
use crate::error::{GraphError, GraphResult};
use crate::types::{EdgeKind, NodeId};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

const EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq)]
pub struct CommunityOptions {
    /// Scales the expected-edges term; higher values give smaller communities
    pub resolution: f64,
    /// Keep aggregating communities into super-nodes until gain is negligible
    pub hierarchical: bool,
    pub max_levels: usize,
    /// Local-moving sweeps per level
    pub max_passes: usize,
    /// Modularity gain below which hierarchical aggregation stops
    pub min_gain: f64,
    pub edge_kinds: Vec<EdgeKind>,
}

impl Default for CommunityOptions {
    fn default() -> Self {
        Self {
            resolution: 1.0,
            hierarchical: false,
            max_levels: 10,
            max_passes: 100,
            min_gain: 1e-7,
            edge_kinds: vec![EdgeKind::Calls],
        }
    }
}

impl CommunityOptions {
    pub fn from_settings(config: &GraphConfig) -> Self {
        Self {
            resolution: config.resolution,
            ..Self::default()
        }
    }

    pub fn hierarchical(mut self) -> Self {
        self.hierarchical = true;
        self
    }

    pub fn validate(&self) -> GraphResult<()> {
        if !self.resolution.is_finite() || self.resolution <= 0.0 {
            return Err(GraphError::invalid(
                "resolution",
                self.resolution,
                "must be a positive, finite number",
            ));
        }
        if self.max_levels == 0 {
            return Err(GraphError::invalid("max_levels", 0, "must be at least 1"));
        }
        if self.max_passes == 0 {
            return Err(GraphError::invalid("max_passes", 0, "must be at least 1"));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct CommunityResult {
    /// Final community per node; ids are dense, numbered by first member in id order
    pub assignments: HashMap<NodeId, usize>,
    pub community_count: usize,
    pub modularity: f64,
    /// Assignment after each aggregation level, finest first
    pub levels: Vec<HashMap<NodeId, usize>>,
}

impl CommunityResult {
    pub fn community_of(&self, id: &NodeId) -> Option<usize> {
        self.assignments.get(id).copied()
    }

    /// Members of each community, indexed by community id, each list sorted.
    pub fn members(&self) -> Vec<Vec<NodeId>> {
        let mut groups = vec![Vec::new(); self.community_count];
        for (id, &community) in &self.assignments {
            if let Some(group) = groups.get_mut(community) {
                group.push(id.clone());
            }
        }
        for group in &mut groups {
            group.sort();
        }
        groups
    }
}

/// Undirected weighted graph used by the optimisers.
#[derive(Debug, Clone)]
struct Undirected {
    /// Neighbours other than self, sorted, symmetric
    neighbours: Vec<Vec<(usize, f64)>>,
    /// Self weight A_ii, counted for both directions
    loops: Vec<f64>,
    degree: Vec<f64>,
    /// Σ degree (2m)
    total: f64,
}

impl Undirected {
    fn from_adjacency(adjacency: &Adjacency) -> Self {
        let n = adjacency.len();
        let mut maps: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); n];
        let mut loops = vec![0.0; n];

        for (from, targets) in adjacency.outgoing.iter().enumerate() {
            for &(to, weight) in targets {
                if from == to {
                    loops[from] += 2.0 * weight;
                } else {
                    *maps[from].entry(to).or_default() += weight;
                    *maps[to].entry(from).or_default() += weight;
                }
            }
        }

        Self::from_parts(maps, loops)
    }

    fn from_parts(maps: Vec<BTreeMap<usize, f64>>, loops: Vec<f64>) -> Self {
        let neighbours: Vec<Vec<(usize, f64)>> =
            maps.into_iter().map(|m| m.into_iter().collect()).collect();
        let degree: Vec<f64> = neighbours
            .iter()
            .zip(&loops)
            .map(|(nbrs, own)| own + nbrs.iter().map(|(_, w)| w).sum::<f64>())
            .collect();
        let total = degree.iter().sum();

        Self {
            neighbours,
            loops,
            degree,
            total,
        }
    }

    fn len(&self) -> usize {
        self.degree.len()
    }

    /// Collapse each community into a super-node. `community` must be dense.
    fn aggregate(&self, community: &[usize], count: usize) -> Self {
        let mut maps: Vec<BTreeMap<usize, f64>> = vec![BTreeMap::new(); count];
        let mut loops = vec![0.0; count];

        for (i, nbrs) in self.neighbours.iter().enumerate() {
            let c = community[i];
            loops[c] += self.loops[i];
            for &(j, weight) in nbrs {
                let d = community[j];
                if c == d {
                    loops[c] += weight;
                } else {
                    *maps[c].entry(d).or_default() += weight;
                }
            }
        }

        Self::from_parts(maps, loops)
    }

    fn modularity(&self, community: &[usize], resolution: f64) -> f64 {
        if self.total <= 0.0 {
            return 0.0;
        }
        let count = community.iter().max().map_or(0, |c| c + 1);
        let mut inside = vec![0.0; count];
        let mut totals = vec![0.0; count];

        for (i, nbrs) in self.neighbours.iter().enumerate() {
            let c = community[i];
            totals[c] += self.degree[i];
            inside[c] += self.loops[i];
            for &(j, weight) in nbrs {
                if community[j] == c {
                    inside[c] += weight;
                }
            }
        }

        inside
            .iter()
            .zip(&totals)
            .map(|(inner, tot)| inner / self.total - resolution * (tot / self.total).powi(2))
            .sum()
    }
}

/// One Louvain local-moving phase. Returns whether any node moved.
fn local_moving(
    graph: &Undirected,
    community: &mut [usize],
    resolution: f64,
    max_passes: usize,
) -> bool {
    let n = graph.len();
    let mut totals = vec![0.0; n];
    for i in 0..n {
        totals[community[i]] += graph.degree[i];
    }

    let mut moved_any = false;
    for _ in 0..max_passes {
        let mut moved = false;

        for i in 0..n {
            let current = community[i];
            let k_i = graph.degree[i];

            let mut weight_to: BTreeMap<usize, f64> = BTreeMap::new();
            for &(j, weight) in &graph.neighbours[i] {
                *weight_to.entry(community[j]).or_default() += weight;
            }

            totals[current] -= k_i;
            let gain = |c: usize, w: f64| w - resolution * totals[c] * k_i / graph.total;

            let mut best = current;
            let mut best_gain = gain(current, weight_to.get(&current).copied().unwrap_or(0.0));
            for (&candidate, &w) in &weight_to {
                if candidate == current {
                    continue;
                }
                let candidate_gain = gain(candidate, w);
                if candidate_gain > best_gain + EPSILON {
                    best = candidate;
                    best_gain = candidate_gain;
                }
            }

            totals[best] += k_i;
            if best != current {
                community[i] = best;
                moved = true;
            }
        }

        if !moved {
            break;
        }
        moved_any = true;
    }

    moved_any
}

/// Renumber labels densely by first appearance. Returns the label count.
fn renumber(labels: &mut [usize]) -> usize {
    let mut mapping: HashMap<usize, usize> = HashMap::new();
    for label in labels.iter_mut() {
        let next = mapping.len();
        *label = *mapping.entry(*label).or_insert(next);
    }
    mapping.len()
}

fn to_map(snapshot: &GraphSnapshot, labels: &[usize]) -> HashMap<NodeId, usize> {
    labels
        .iter()
        .enumerate()
        .map(|(i, &c)| (snapshot.node_id(i).clone(), c))
        .collect()
}

fn finish(
    snapshot: &GraphSnapshot,
    graph: &Undirected,
    labels: &[usize],
    levels: Vec<HashMap<NodeId, usize>>,
    resolution: f64,
) -> CommunityResult {
    CommunityResult {
        assignments: to_map(snapshot, labels),
        community_count: labels.iter().max().map_or(0, |c| c + 1),
        modularity: graph.modularity(labels, resolution),
        levels,
    }
}

/// Louvain community detection.
///
/// Edge direction is ignored. Without edges every node is its own community.
pub fn detect_communities(
    snapshot: &GraphSnapshot,
    options: &CommunityOptions,
) -> GraphResult<CommunityResult> {
    options.validate()?;
    let n = snapshot.node_count();
    if n == 0 {
        return Ok(CommunityResult::default());
    }

    let original = Undirected::from_adjacency(&snapshot.adjacency(&options.edge_kinds));
    let mut node_community: Vec<usize> = (0..n).collect();

    if original.total <= 0.0 {
        let levels = vec![to_map(snapshot, &node_community)];
        return Ok(finish(
            snapshot,
            &original,
            &node_community,
            levels,
            options.resolution,
        ));
    }

    let mut current = original.clone();
    let mut levels = Vec::new();
    let mut quality = original.modularity(&node_community, options.resolution);

    for level in 0..options.max_levels {
        let mut community: Vec<usize> = (0..current.len()).collect();
        let moved = local_moving(&current, &mut community, options.resolution, options.max_passes);
        if !moved {
            break;
        }

        let count = renumber(&mut community);
        for c in node_community.iter_mut() {
            *c = community[*c];
        }
        levels.push(to_map(snapshot, &node_community));

        let next_quality = original.modularity(&node_community, options.resolution);
        let gain = next_quality - quality;
        quality = next_quality;

        tracing::debug!(
            "[graph] louvain level {level}: {count} communities, modularity {quality:.4}"
        );

        if !options.hierarchical || gain < options.min_gain || count == current.len() {
            break;
        }
        current = current.aggregate(&community, count);
    }

    if levels.is_empty() {
        levels.push(to_map(snapshot, &node_community));
    }

    Ok(finish(
        snapshot,
        &original,
        &node_community,
        levels,
        options.resolution,
    ))
}

/// Deterministic label propagation.
///
/// Each node adopts the label with the largest neighbour weight, keeping its
/// own label on ties when it is among the best, otherwise the smallest.
pub fn label_propagation(
    snapshot: &GraphSnapshot,
    options: &CommunityOptions,
) -> GraphResult<CommunityResult> {
    options.validate()?;
    let n = snapshot.node_count();
    if n == 0 {
        return Ok(CommunityResult::default());
    }

    let graph = Undirected::from_adjacency(&snapshot.adjacency(&options.edge_kinds));
    let mut labels: Vec<usize> = (0..n).collect();

    for _ in 0..options.max_passes {
        let mut changed = false;
        for i in 0..n {
            let mut weight_by_label: BTreeMap<usize, f64> = BTreeMap::new();
            for &(j, weight) in &graph.neighbours[i] {
                *weight_by_label.entry(labels[j]).or_default() += weight;
            }
            let Some(best_weight) = weight_by_label.values().copied().reduce(f64::max) else {
                continue;
            };

            let current = labels[i];
            let keeps_current = weight_by_label
                .get(&current)
                .is_some_and(|w| (best_weight - w).abs() <= EPSILON);
            if keeps_current {
                continue;
            }

            if let Some((&label, _)) = weight_by_label
                .iter()
                .find(|(_, w)| (best_weight - **w).abs() <= EPSILON)
            {
                labels[i] = label;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }

    renumber(&mut labels);
    let levels = vec![to_map(snapshot, &labels)];
    Ok(finish(snapshot, &graph, &labels, levels, options.resolution))
}
