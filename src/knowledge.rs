//! The knowledge base service object.
//!
//! Owns one project's graph store, vector store and file ledger, plus the
//! embedding cache that persists the last two. Construct one per process (or
//! per test) and tear it down with [`KnowledgeBase::shutdown`].

use crate::cache::{
    CacheLoad, CacheMetadata, CacheStats, ClearScope, EmbeddingCache, FileLedger,
    IncrementalIndexer, SourceAnalyzer,
};
use crate::config::Settings;
use crate::error::{CacheError, CacheResult, RetrievalResult};
use crate::graph::GraphStore;
use crate::retrieval::{HybridRetriever, QueryInput, QueryOptions, RankedResult};
use crate::vector::{
    EmbeddingGenerator, FastEmbedGenerator, VectorDimension, VectorError, VectorStore,
    model_dimension,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What [`KnowledgeBase::restore`] found on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RestoreStatus {
    Restored { embeddings: usize, files: usize },
    NotFound,
    /// Cache exists but was written for another model, dimension or format
    Invalid { reason: String },
    Disabled,
}

impl RestoreStatus {
    pub fn is_restored(&self) -> bool {
        matches!(self, Self::Restored { .. })
    }
}

pub struct KnowledgeBase {
    settings: Arc<Settings>,
    project_root: PathBuf,
    graph: Arc<GraphStore>,
    vectors: Arc<VectorStore>,
    ledger: Arc<FileLedger>,
    embedder: Option<Arc<dyn EmbeddingGenerator>>,
    cache: EmbeddingCache,
    retriever: HybridRetriever,
}

impl KnowledgeBase {
    /// Create an empty knowledge base.
    ///
    /// The vector store takes its dimension and model id from `embedder`.
    /// Without one it uses `semantic.model` and that model's known dimension, which
    /// still allows vector queries and restoring a matching cache.
    pub fn new(
        settings: Settings,
        project_root: impl AsRef<Path>,
        embedder: Option<Arc<dyn EmbeddingGenerator>>,
    ) -> Self {
        let settings = Arc::new(settings);
        let project_root = project_root.as_ref().to_path_buf();

        let (dimension, model_id) = match &embedder {
            Some(embedder) => (embedder.dimension(), embedder.model_id().to_string()),
            None => (
                model_dimension(&settings.semantic.model)
                    .and_then(|dim| VectorDimension::new(dim).ok())
                    .unwrap_or_else(VectorDimension::dimension_384),
                settings.semantic.model.clone(),
            ),
        };

        let graph = Arc::new(GraphStore::new());
        let vectors = Arc::new(VectorStore::new(dimension, model_id));
        let ledger = Arc::new(FileLedger::new());
        let cache = EmbeddingCache::new(settings.cache.resolved_directory(), &project_root);

        let mut retriever =
            HybridRetriever::from_settings(Arc::clone(&graph), Arc::clone(&vectors), &settings);
        if let Some(embedder) = &embedder {
            retriever = retriever.with_embedder(Arc::clone(embedder));
        }

        debug!(
            "[kb] initialised for {} (model {}, {} dims, cache {})",
            project_root.display(),
            vectors.model_id(),
            vectors.dimension(),
            cache.path().display()
        );

        Self {
            settings,
            project_root,
            graph,
            vectors,
            ledger,
            embedder,
            cache,
            retriever,
        }
    }

    /// Create a knowledge base backed by the configured fastembed model.
    pub fn with_default_embedder(
        settings: Settings,
        project_root: impl AsRef<Path>,
    ) -> Result<Self, VectorError> {
        let embedder = FastEmbedGenerator::from_settings(&settings.semantic)?;
        Ok(Self::new(settings, project_root, Some(Arc::new(embedder))))
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn graph(&self) -> &Arc<GraphStore> {
        &self.graph
    }

    pub fn vectors(&self) -> &Arc<VectorStore> {
        &self.vectors
    }

    pub fn ledger(&self) -> &Arc<FileLedger> {
        &self.ledger
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    pub fn has_embedder(&self) -> bool {
        self.embedder.is_some()
    }

    /// Load embeddings and the file ledger from the cache file.
    ///
    /// A compatible cache replaces the current vector store and ledger
    /// contents. The graph is never persisted; the next refresh rebuilds it,
    /// reusing every restored embedding. Anything short of a valid cache leaves
    /// the stores as they were, so the next refresh regenerates everything.
    #[must_use = "Restore status tells whether a full regeneration is needed"]
    pub fn restore(&self) -> RestoreStatus {
        if !self.settings.cache.enabled {
            return RestoreStatus::Disabled;
        }

        let dims = self.vectors.dimension().get();
        match self.cache.load(self.vectors.model_id(), dims) {
            CacheLoad::Loaded(loaded) => {
                self.vectors.clear();
                self.ledger.clear();
                let embeddings = loaded.restore_into(&self.vectors, &self.ledger);
                let files = self.ledger.len();
                info!("[kb] restored {embeddings} embeddings for {files} files from cache");
                RestoreStatus::Restored { embeddings, files }
            }
            CacheLoad::NotFound => {
                info!("[kb] no usable cache at {}", self.cache.path().display());
                RestoreStatus::NotFound
            }
            CacheLoad::Invalid { reason, .. } => {
                warn!("[kb] cache ignored, full regeneration required: {reason}");
                RestoreStatus::Invalid { reason }
            }
        }
    }

    /// Build an incremental indexer over this knowledge base's stores.
    pub fn indexer(&self, analyzer: Arc<dyn SourceAnalyzer>) -> IncrementalIndexer {
        let indexer = IncrementalIndexer::new(
            Arc::clone(&self.graph),
            Arc::clone(&self.vectors),
            Arc::clone(&self.ledger),
            analyzer,
            &self.settings,
        );
        match &self.embedder {
            Some(embedder) => indexer.with_embedder(Arc::clone(embedder)),
            None => indexer,
        }
    }

    pub fn retriever(&self) -> &HybridRetriever {
        &self.retriever
    }

    pub fn query(
        &self,
        input: impl Into<QueryInput>,
        options: &QueryOptions,
    ) -> RetrievalResult<Vec<RankedResult>> {
        self.retriever.query(input, options)
    }

    /// Default query options from settings.
    pub fn query_options(&self) -> QueryOptions {
        QueryOptions::from_settings(&self.settings)
    }

    /// Write embeddings and the ledger to the cache file.
    #[must_use = "Save errors should be handled to ensure data is persisted"]
    pub fn persist(&self) -> CacheResult<CacheMetadata> {
        if !self.settings.cache.enabled {
            return Err(CacheError::Disabled);
        }
        self.cache.save(&self.vectors, &self.ledger)
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats(Some((
            self.vectors.model_id(),
            self.vectors.dimension().get(),
        )))
    }

    pub fn clear_cache(&self, scope: ClearScope) -> CacheResult<usize> {
        self.cache.clear(scope)
    }

    /// Persist (when `cache.save_on_shutdown` is set) and drop all state.
    ///
    /// Nothing is written when the stores are empty, so a process that never
    /// indexed does not overwrite a good cache.
    pub fn shutdown(self) -> CacheResult<Option<CacheMetadata>> {
        let cache = &self.settings.cache;
        let has_state = !self.vectors.is_empty() || !self.ledger.is_empty();

        let saved = if cache.enabled && cache.save_on_shutdown && has_state {
            let metadata = self.cache.save(&self.vectors, &self.ledger)?;
            info!(
                "[kb] saved {} embeddings to {}",
                metadata.entity_count,
                self.cache.path().display()
            );
            Some(metadata)
        } else {
            None
        };

        self.graph.clear();
        self.vectors.clear();
        self.ledger.clear();
        Ok(saved)
    }
}

impl std::fmt::Debug for KnowledgeBase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KnowledgeBase")
            .field("project_root", &self.project_root)
            .field("nodes", &self.graph.node_count())
            .field("edges", &self.graph.edge_count())
            .field("embeddings", &self.vectors.len())
            .field("files", &self.ledger.len())
            .field("cache", &self.cache.path())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::LedgerEntry;
    use crate::types::NodeId;
    use crate::vector::{EmbeddingRecord, MockEmbeddingGenerator};
    use tempfile::TempDir;

    fn settings(cache_dir: &Path) -> Settings {
        let mut settings = Settings::default();
        settings.cache.directory = Some(cache_dir.to_path_buf());
        settings
    }

    fn knowledge_base(cache_dir: &Path, root: &Path) -> KnowledgeBase {
        KnowledgeBase::new(
            settings(cache_dir),
            root,
            Some(Arc::new(MockEmbeddingGenerator::new())),
        )
    }

    #[test]
    fn test_restore_without_cache_is_not_found() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge_base(dir.path(), dir.path());
        assert_eq!(kb.restore(), RestoreStatus::NotFound);
    }

    #[test]
    fn test_shutdown_then_restore() {
        let dir = TempDir::new().unwrap();
        let id = NodeId::module("Billing");

        let kb = knowledge_base(dir.path(), dir.path());
        kb.vectors()
            .upsert(EmbeddingRecord::new(id.clone(), vec![0.5; 8], "module Billing"))
            .unwrap();
        kb.ledger()
            .insert(LedgerEntry::new("lib/billing.ex", b"x", vec![id.clone()]));
        let saved = kb.shutdown().unwrap().unwrap();
        assert_eq!(saved.entity_count, 1);

        let kb = knowledge_base(dir.path(), dir.path());
        assert_eq!(
            kb.restore(),
            RestoreStatus::Restored {
                embeddings: 1,
                files: 1
            }
        );
        assert_eq!(kb.vectors().get(&id).unwrap().vector, vec![0.5; 8]);
    }

    #[test]
    fn test_empty_shutdown_writes_nothing() {
        let dir = TempDir::new().unwrap();
        let kb = knowledge_base(dir.path(), dir.path());
        let path = kb.cache().path().to_path_buf();
        assert!(kb.shutdown().unwrap().is_none());
        assert!(!path.exists());
    }

    #[test]
    fn test_disabled_cache() {
        let dir = TempDir::new().unwrap();
        let mut settings = settings(dir.path());
        settings.cache.enabled = false;
        let kb = KnowledgeBase::new(settings, dir.path(), None);

        assert_eq!(kb.restore(), RestoreStatus::Disabled);
        assert!(matches!(kb.persist(), Err(CacheError::Disabled)));
    }
}
