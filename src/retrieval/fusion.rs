//! Reciprocal Rank Fusion.
//!
//! score(d) = Σ 1 / (k + rank_L(d)) over every list L containing d,
//! with 1-based ranks. A list that does not contain d adds nothing.

use std::collections::{HashMap, HashSet};
use std::hash::Hash;

/// Default RRF constant.
pub const DEFAULT_RRF_K: f64 = 60.0;

/// Contribution of a single 1-based rank.
#[inline]
pub fn rrf_score(rank: usize, k: f64) -> f64 {
    1.0 / (k + rank as f64)
}

/// Fuse ranked lists into one list, highest score first.
///
/// Only the first occurrence of a key within one list counts. Equal scores
/// are ordered by the key's `Ord` so the output is deterministic.
pub fn reciprocal_rank_fusion<K>(lists: &[&[K]], k: f64) -> Vec<(K, f64)>
where
    K: Clone + Eq + Hash + Ord,
{
    let mut scores: HashMap<K, f64> = HashMap::new();

    for list in lists {
        let mut seen: HashSet<&K> = HashSet::with_capacity(list.len());
        for (position, key) in list.iter().enumerate() {
            if !seen.insert(key) {
                continue;
            }
            *scores.entry(key.clone()).or_insert(0.0) += rrf_score(position + 1, k);
        }
    }

    let mut fused: Vec<(K, f64)> = scores.into_iter().collect();
    fused.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    fused
}
