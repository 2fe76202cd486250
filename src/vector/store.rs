//! In-memory embedding store with brute-force cosine search.
//!
//! Records are held in a `DashMap` keyed by [`NodeId`], so writers touching
//! distinct nodes never contend and readers never wait on a whole-table lock.
//! Every record in a store has the store's single configured dimension.

use super::similarity::cosine_similarity;
use super::types::{EmbeddingRecord, SearchHit, SearchOptions, VectorDimension, VectorError};
use crate::types::{NodeId, NodeKind};
use dashmap::DashMap;
use std::cmp::Ordering;

#[derive(Debug)]
pub struct VectorStore {
    records: DashMap<NodeId, EmbeddingRecord>,
    dimension: VectorDimension,
    model_id: String,
}

impl VectorStore {
    pub fn new(dimension: VectorDimension, model_id: impl Into<String>) -> Self {
        Self {
            records: DashMap::new(),
            dimension,
            model_id: model_id.into(),
        }
    }

    pub fn dimension(&self) -> VectorDimension {
        self.dimension
    }

    pub fn model_id(&self) -> &str {
        &self.model_id
    }

    /// Insert or replace the record for `record.node_id`.
    pub fn upsert(&self, record: EmbeddingRecord) -> Result<(), VectorError> {
        self.dimension.validate_vector(&record.vector)?;
        self.records.insert(record.node_id.clone(), record);
        Ok(())
    }

    /// Insert a batch, stopping at the first dimension mismatch.
    ///
    /// Records before the failing one stay stored.
    pub fn upsert_batch(
        &self,
        records: impl IntoIterator<Item = EmbeddingRecord>,
    ) -> Result<usize, VectorError> {
        let mut count = 0;
        for record in records {
            self.upsert(record)?;
            count += 1;
        }
        Ok(count)
    }

    pub fn get(&self, node_id: &NodeId) -> Option<EmbeddingRecord> {
        self.records.get(node_id).map(|entry| entry.clone())
    }

    pub fn contains(&self, node_id: &NodeId) -> bool {
        self.records.contains_key(node_id)
    }

    pub fn remove(&self, node_id: &NodeId) -> Option<EmbeddingRecord> {
        self.records.remove(node_id).map(|(_, record)| record)
    }

    pub fn remove_many<'a>(&self, node_ids: impl IntoIterator<Item = &'a NodeId>) -> usize {
        node_ids
            .into_iter()
            .filter(|id| self.records.remove(*id).is_some())
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn clear(&self) {
        self.records.clear();
    }

    /// Snapshot of stored records, sorted by node id.
    pub fn list_embeddings(&self, node_type: Option<NodeKind>) -> Vec<EmbeddingRecord> {
        let mut records: Vec<EmbeddingRecord> = self
            .records
            .iter()
            .filter(|entry| node_type.is_none_or(|kind| entry.node_type == kind))
            .map(|entry| entry.value().clone())
            .collect();
        records.sort_by(|a, b| a.node_id.cmp(&b.node_id));
        records
    }

    /// Brute-force similarity search.
    ///
    /// Returns at most `options.limit` hits with `similarity >= threshold`,
    /// highest first, ties broken by node id.
    pub fn search(
        &self,
        query: &[f32],
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, VectorError> {
        self.search_excluding(query, options, None)
    }

    /// Nearest neighbours of a stored embedding, excluding the seed itself.
    ///
    /// An unknown seed yields an empty result.
    pub fn similar_to(
        &self,
        node_id: &NodeId,
        options: &SearchOptions,
    ) -> Result<Vec<SearchHit>, VectorError> {
        let Some(seed) = self.get(node_id) else {
            return Ok(Vec::new());
        };
        self.search_excluding(&seed.vector, options, Some(node_id))
    }

    fn search_excluding(
        &self,
        query: &[f32],
        options: &SearchOptions,
        exclude: Option<&NodeId>,
    ) -> Result<Vec<SearchHit>, VectorError> {
        self.dimension.validate_vector(query)?;
        if !options.threshold.is_finite() || !(-1.0..=1.0).contains(&options.threshold) {
            return Err(VectorError::InvalidThreshold(options.threshold));
        }
        if options.limit == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<SearchHit> = self
            .records
            .iter()
            .filter(|entry| options.node_type.is_none_or(|kind| entry.node_type == kind))
            .filter(|entry| exclude != Some(entry.key()))
            .filter_map(|entry| {
                let similarity = cosine_similarity(query, &entry.vector);
                (similarity >= options.threshold).then(|| SearchHit {
                    node_id: entry.node_id.clone(),
                    node_type: entry.node_type,
                    similarity,
                    source_text: entry.source_text.clone(),
                })
            })
            .collect();

        hits.sort_by(compare_hits);
        hits.truncate(options.limit);
        Ok(hits)
    }
}

/// Descending similarity, then ascending node id.
pub(crate) fn compare_hits(a: &SearchHit, b: &SearchHit) -> Ordering {
    b.similarity
        .total_cmp(&a.similarity)
        .then_with(|| a.node_id.cmp(&b.node_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_2d() -> VectorStore {
        VectorStore::new(VectorDimension::new(2).unwrap(), "test-model")
    }

    #[test]
    fn test_upsert_rejects_wrong_dimension() {
        let store = store_2d();
        let err = store
            .upsert(EmbeddingRecord::new(
                NodeId::module("A"),
                vec![1.0, 0.0, 0.0],
                "a",
            ))
            .unwrap_err();
        assert_eq!(
            err,
            VectorError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        );
        assert!(store.is_empty());
    }

    #[test]
    fn test_search_threshold_excludes_orthogonal() {
        let store = store_2d();
        store
            .upsert(EmbeddingRecord::new(NodeId::module("X"), vec![1.0, 0.0], "x"))
            .unwrap();
        store
            .upsert(EmbeddingRecord::new(NodeId::module("Y"), vec![0.0, 1.0], "y"))
            .unwrap();

        let hits = store
            .search(&[1.0, 0.0], &SearchOptions::default().with_threshold(0.5))
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node_id, NodeId::module("X"));
    }

    #[test]
    fn test_ties_break_by_node_id() {
        let store = store_2d();
        for name in ["C", "A", "B"] {
            store
                .upsert(EmbeddingRecord::new(NodeId::module(name), vec![1.0, 1.0], name))
                .unwrap();
        }

        let hits = store
            .search(&[1.0, 1.0], &SearchOptions::default().with_limit(2))
            .unwrap();
        let ids: Vec<_> = hits.iter().map(|h| h.node_id.to_string()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[test]
    fn test_similar_to_excludes_seed() {
        let store = store_2d();
        store
            .upsert(EmbeddingRecord::new(NodeId::module("A"), vec![1.0, 0.1], "a"))
            .unwrap();
        store
            .upsert(EmbeddingRecord::new(NodeId::module("B"), vec![1.0, 0.2], "b"))
            .unwrap();

        let hits = store
            .similar_to(&NodeId::module("A"), &SearchOptions::default())
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].node_id, NodeId::module("B"));

        let none = store
            .similar_to(&NodeId::module("Missing"), &SearchOptions::default())
            .unwrap();
        assert!(none.is_empty());
    }

    #[test]
    fn test_query_dimension_and_threshold_validation() {
        let store = store_2d();
        assert!(matches!(
            store.search(&[1.0], &SearchOptions::default()),
            Err(VectorError::DimensionMismatch { .. })
        ));
        assert!(matches!(
            store.search(&[1.0, 0.0], &SearchOptions::default().with_threshold(f32::NAN)),
            Err(VectorError::InvalidThreshold(_))
        ));
        assert!(
            store
                .search(&[1.0, 0.0], &SearchOptions::default().with_limit(0))
                .unwrap()
                .is_empty()
        );
    }
}
