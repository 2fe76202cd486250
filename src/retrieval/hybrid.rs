//! Hybrid retriever: semantic similarity fused with graph importance.
//!
//! The semantic list comes from the vector store, the graph list orders the
//! same candidates by PageRank. [`Strategy`] decides how the two lists are
//! combined. Either list may be empty; the other one then decides alone.

use super::fusion::reciprocal_rank_fusion;
use crate::config::Settings;
use crate::error::{RetrievalError, RetrievalResult};
use crate::graph::{Adjacency, GraphSnapshot, GraphStore, PageRankOptions, pagerank};
use crate::types::{EdgeKind, NodeId, NodeKind};
use crate::vector::{EmbeddingGenerator, SearchHit, SearchOptions, VectorError, VectorStore};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::debug;

/// How the semantic and graph rankings are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Reciprocal Rank Fusion of both lists
    #[default]
    Fusion,
    /// Similarity first, importance breaks exact ties
    SemanticFirst,
    /// Importance first, similarity breaks exact ties
    GraphFirst,
}

impl Strategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fusion => "fusion",
            Self::SemanticFirst => "semantic_first",
            Self::GraphFirst => "graph_first",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Strategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "fusion" | "rrf" => Ok(Self::Fusion),
            "semantic_first" | "semantic" => Ok(Self::SemanticFirst),
            "graph_first" | "graph" => Ok(Self::GraphFirst),
            other => Err(format!("unknown retrieval strategy '{other}'")),
        }
    }
}

/// What the caller is looking for.
#[derive(Debug, Clone, PartialEq)]
pub enum QueryInput {
    /// Natural language, embedded with the retriever's generator
    Text(String),
    /// A precomputed query embedding
    Vector(Vec<f32>),
}

impl QueryInput {
    /// True when there is nothing to compare against.
    pub fn is_empty(&self) -> bool {
        match self {
            Self::Text(text) => text.trim().is_empty(),
            Self::Vector(vector) => vector.is_empty(),
        }
    }
}

impl From<&str> for QueryInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<String> for QueryInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<Vec<f32>> for QueryInput {
    fn from(vector: Vec<f32>) -> Self {
        Self::Vector(vector)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QueryOptions {
    pub strategy: Strategy,
    pub limit: usize,
    /// Minimum similarity for semantic candidates
    pub threshold: f32,
    pub node_type: Option<NodeKind>,
    pub rrf_k: f64,
    /// Semantic candidates fetched per requested result
    pub candidate_multiplier: usize,
    /// Pull in direct graph neighbours of semantic hits
    pub expand_neighbors: bool,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self::from_settings(&Settings::default())
    }
}

impl QueryOptions {
    pub fn from_settings(settings: &Settings) -> Self {
        let retrieval = &settings.retrieval;
        Self {
            strategy: retrieval.strategy,
            limit: retrieval.limit,
            threshold: settings.semantic.threshold,
            node_type: None,
            rrf_k: retrieval.rrf_k,
            candidate_multiplier: retrieval.candidate_multiplier,
            expand_neighbors: retrieval.expand_neighbors,
        }
    }

    pub fn with_strategy(mut self, strategy: Strategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_threshold(mut self, threshold: f32) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_node_type(mut self, node_type: NodeKind) -> Self {
        self.node_type = Some(node_type);
        self
    }

    pub fn with_neighbors(mut self, expand: bool) -> Self {
        self.expand_neighbors = expand;
        self
    }

    pub fn validate(&self) -> RetrievalResult<()> {
        if !self.rrf_k.is_finite() || self.rrf_k < 0.0 {
            return Err(RetrievalError::InvalidOption {
                name: "rrf_k",
                reason: "must be a finite, non-negative number",
            });
        }
        if self.candidate_multiplier == 0 {
            return Err(RetrievalError::InvalidOption {
                name: "candidate_multiplier",
                reason: "must be at least 1",
            });
        }
        Ok(())
    }
}

/// One entry of a hybrid result list.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedResult {
    pub node_id: NodeId,
    pub kind: NodeKind,
    /// Strategy-specific ordering score
    pub score: f64,
    pub similarity: Option<f32>,
    /// PageRank of the node, when it is in the graph
    pub importance: Option<f64>,
    /// 1-based position in the semantic list
    pub semantic_rank: Option<usize>,
    /// 1-based position in the graph list
    pub graph_rank: Option<usize>,
    pub text: Option<String>,
}

/// Graph-side state derived from one snapshot generation.
struct GraphView {
    snapshot: Arc<GraphSnapshot>,
    neighbors: Adjacency,
    importance: HashMap<NodeId, f64>,
    /// All nodes by importance, highest first
    ranked: Vec<NodeId>,
}

impl GraphView {
    fn neighbors_of(&self, id: &NodeId) -> Vec<NodeId> {
        let Some(idx) = self.snapshot.index_of(id) else {
            return Vec::new();
        };
        self.neighbors.outgoing[idx]
            .iter()
            .chain(&self.neighbors.incoming[idx])
            .map(|&(other, _)| self.snapshot.node_id(other).clone())
            .collect()
    }
}

/// Answers queries against a graph store and a vector store.
pub struct HybridRetriever {
    graph: Arc<GraphStore>,
    vectors: Arc<VectorStore>,
    embedder: Option<Arc<dyn EmbeddingGenerator>>,
    pagerank: PageRankOptions,
    view: Mutex<Option<Arc<GraphView>>>,
}

impl HybridRetriever {
    pub fn new(graph: Arc<GraphStore>, vectors: Arc<VectorStore>) -> Self {
        Self {
            graph,
            vectors,
            embedder: None,
            pagerank: PageRankOptions::default(),
            view: Mutex::new(None),
        }
    }

    pub fn from_settings(
        graph: Arc<GraphStore>,
        vectors: Arc<VectorStore>,
        settings: &Settings,
    ) -> Self {
        Self::new(graph, vectors).with_pagerank(PageRankOptions::from_settings(&settings.graph))
    }

    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingGenerator>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn with_pagerank(mut self, options: PageRankOptions) -> Self {
        self.pagerank = options;
        self
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Run a query and return at most `options.limit` results.
    ///
    /// Text queries need an embedding generator. An empty query ranks by graph
    /// importance alone; an empty graph leaves the semantic order untouched.
    pub fn query(
        &self,
        input: impl Into<QueryInput>,
        options: &QueryOptions,
    ) -> RetrievalResult<Vec<RankedResult>> {
        options.validate()?;
        if options.limit == 0 {
            return Ok(Vec::new());
        }

        let input = input.into();
        let hits = match self.query_vector(&input)? {
            Some(vector) => self.vectors.search(
                &vector,
                &SearchOptions {
                    limit: options.limit.saturating_mul(options.candidate_multiplier),
                    threshold: options.threshold,
                    node_type: options.node_type,
                },
            )?,
            None => Vec::new(),
        };

        let view = self.graph_view()?;
        let candidates = self.candidates(&hits, &view, options);

        let semantic: Vec<NodeId> = hits.iter().map(|hit| hit.node_id.clone()).collect();
        let mut graph: Vec<NodeId> = candidates
            .iter()
            .filter(|id| view.importance.contains_key(*id))
            .cloned()
            .collect();
        graph.sort_by(|a, b| compare_importance(&view.importance, a, b));

        debug!(
            "[retrieval] {} semantic hits, {} graph candidates, strategy {}",
            semantic.len(),
            graph.len(),
            options.strategy
        );

        let similarity: HashMap<&NodeId, &SearchHit> =
            hits.iter().map(|hit| (&hit.node_id, hit)).collect();
        let semantic_rank: HashMap<&NodeId, usize> =
            semantic.iter().enumerate().map(|(i, id)| (id, i + 1)).collect();
        let graph_rank: HashMap<&NodeId, usize> =
            graph.iter().enumerate().map(|(i, id)| (id, i + 1)).collect();

        let build = |id: &NodeId, score: f64| {
            let hit = similarity.get(id);
            RankedResult {
                node_id: id.clone(),
                kind: id.kind(),
                score,
                similarity: hit.map(|h| h.similarity),
                importance: view.importance.get(id).copied(),
                semantic_rank: semantic_rank.get(id).copied(),
                graph_rank: graph_rank.get(id).copied(),
                text: hit
                    .map(|h| h.source_text.clone())
                    .or_else(|| view.snapshot.node(id).and_then(|node| node.text.clone())),
            }
        };

        let mut results: Vec<RankedResult> = match options.strategy {
            Strategy::Fusion => reciprocal_rank_fusion(&[&semantic[..], &graph[..]], options.rrf_k)
                .into_iter()
                .map(|(id, score)| build(&id, score))
                .collect(),
            Strategy::SemanticFirst => {
                let mut results: Vec<RankedResult> = candidates
                    .iter()
                    .map(|id| {
                        let score = similarity.get(id).map_or(0.0, |h| f64::from(h.similarity));
                        build(id, score)
                    })
                    .collect();
                results.sort_by(|a, b| {
                    cmp_desc(a.similarity, b.similarity)
                        .then_with(|| cmp_desc(a.importance, b.importance))
                        .then_with(|| a.node_id.cmp(&b.node_id))
                });
                results
            }
            Strategy::GraphFirst => {
                let mut results: Vec<RankedResult> = candidates
                    .iter()
                    .map(|id| build(id, view.importance.get(id).copied().unwrap_or(0.0)))
                    .collect();
                results.sort_by(|a, b| {
                    cmp_desc(a.importance, b.importance)
                        .then_with(|| cmp_desc(a.similarity, b.similarity))
                        .then_with(|| a.node_id.cmp(&b.node_id))
                });
                results
            }
        };

        results.truncate(options.limit);
        Ok(results)
    }

    fn query_vector(&self, input: &QueryInput) -> RetrievalResult<Option<Vec<f32>>> {
        if input.is_empty() {
            return Ok(None);
        }
        match input {
            QueryInput::Vector(vector) => Ok(Some(vector.clone())),
            QueryInput::Text(text) => {
                let embedder = self.embedder.as_ref().ok_or(RetrievalError::NoEmbedder)?;
                let mut embeddings = embedder.generate_embeddings(&[text.as_str()])?;
                if embeddings.is_empty() {
                    return Err(VectorError::EmbeddingFailed(
                        "generator returned no embedding for the query".to_string(),
                    )
                    .into());
                }
                Ok(Some(embeddings.swap_remove(0)))
            }
        }
    }

    /// Semantic hits plus their neighbours, or every graph node when there
    /// are no hits.
    fn candidates(
        &self,
        hits: &[SearchHit],
        view: &GraphView,
        options: &QueryOptions,
    ) -> Vec<NodeId> {
        let wanted = |id: &NodeId| options.node_type.is_none_or(|kind| id.kind() == kind);

        if hits.is_empty() {
            return view.ranked.iter().filter(|id| wanted(*id)).cloned().collect();
        }

        let mut candidates: BTreeSet<NodeId> = hits.iter().map(|hit| hit.node_id.clone()).collect();
        if options.expand_neighbors {
            for hit in hits {
                candidates.extend(view.neighbors_of(&hit.node_id).into_iter().filter(wanted));
            }
        }
        candidates.into_iter().collect()
    }

    /// Importance for the current graph generation, computed at most once per
    /// generation.
    fn graph_view(&self) -> RetrievalResult<Arc<GraphView>> {
        let snapshot = self.graph.snapshot();
        let mut cached = self.view.lock();
        if let Some(view) = cached.as_ref() {
            if view.snapshot.generation() == snapshot.generation() {
                return Ok(Arc::clone(view));
            }
        }

        let ranks = pagerank(&snapshot, &self.pagerank)?;
        let ranked = ranks.ranked().into_iter().map(|(id, _)| id).collect();
        let view = Arc::new(GraphView {
            neighbors: snapshot.adjacency(&EdgeKind::ALL),
            importance: ranks.scores,
            ranked,
            snapshot,
        });
        *cached = Some(Arc::clone(&view));
        Ok(view)
    }
}

impl fmt::Debug for HybridRetriever {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HybridRetriever")
            .field("nodes", &self.graph.node_count())
            .field("embeddings", &self.vectors.len())
            .field("has_embedder", &self.embedder.is_some())
            .finish()
    }
}

fn compare_importance(importance: &HashMap<NodeId, f64>, a: &NodeId, b: &NodeId) -> Ordering {
    let score = |id: &NodeId| importance.get(id).copied().unwrap_or(0.0);
    score(b).total_cmp(&score(a)).then_with(|| a.cmp(b))
}

/// Descending order with `None` last.
fn cmp_desc<T: PartialOrd>(a: Option<T>, b: Option<T>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.partial_cmp(&a).unwrap_or(Ordering::Equal),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}
