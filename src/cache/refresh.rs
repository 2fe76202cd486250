//! Incremental refresh
//!
//! Drives the analyzer over source files and keeps the graph, the vector
//! store and the file ledger consistent with what is on disk. A file whose
//! content hash matches its ledger entry is skipped; a changed file has its
//! stale entities replaced and only its own entities re-embedded.

use super::ledger::{FileLedger, LedgerEntry, calculate_hash};
use super::walker::FileWalker;
use crate::config::Settings;
use crate::error::{IndexError, IndexResult};
use crate::graph::GraphStore;
use crate::types::{FileFacts, Node, NodeId};
use crate::vector::{EmbeddingGenerator, EmbeddingRecord, VectorStore, node_text};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

pub type AnalyzerError = Box<dyn std::error::Error + Send + Sync>;

/// Boundary to the language-specific parsers.
///
/// Implementations turn one file's content into graph facts. They are called
/// from several worker threads at once.
pub trait SourceAnalyzer: Send + Sync {
    fn analyze(&self, path: &Path, content: &str) -> Result<FileFacts, AnalyzerError>;

    /// Whether this analyzer understands `path`
    fn supports(&self, _path: &Path) -> bool {
        true
    }
}

/// What a single-file refresh did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Hash matched and every entity was present; nothing touched
    Unchanged,
    /// Hash matched but the stores were missing entities (cold start);
    /// facts were re-ingested and only missing embeddings generated
    Restored,
    /// Content changed or the file was new
    Reindexed,
    /// The file was dropped from every store
    Removed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileRefresh {
    pub path: PathBuf,
    pub outcome: RefreshOutcome,
    /// Entities the file defines after the refresh
    pub entities: usize,
    pub embedded: usize,
    pub removed: usize,
}

impl FileRefresh {
    fn new(path: &Path, outcome: RefreshOutcome) -> Self {
        Self {
            path: path.to_path_buf(),
            outcome,
            entities: 0,
            embedded: 0,
            removed: 0,
        }
    }
}

/// Statistics collected during a directory refresh
#[derive(Debug, Default)]
pub struct RefreshReport {
    pub files_scanned: usize,
    pub files_unchanged: usize,
    pub files_restored: usize,
    pub files_reindexed: usize,
    pub files_removed: usize,
    pub files_failed: usize,
    pub entities_embedded: usize,
    pub entities_removed: usize,
    pub elapsed: Duration,
    /// Errors encountered (limited to first 100)
    pub errors: Vec<(PathBuf, String)>,
    start_time: Option<Instant>,
}

impl RefreshReport {
    pub fn new() -> Self {
        Self {
            start_time: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn stop_timing(&mut self) {
        if let Some(start) = self.start_time.take() {
            self.elapsed = start.elapsed();
        }
    }

    /// Add an error (limited to first 100 errors)
    pub fn add_error(&mut self, path: PathBuf, error: String) {
        if self.errors.len() < 100 {
            self.errors.push((path, error));
        }
        self.files_failed += 1;
    }

    pub fn record(&mut self, refresh: &FileRefresh) {
        match refresh.outcome {
            RefreshOutcome::Unchanged => self.files_unchanged += 1,
            RefreshOutcome::Restored => self.files_restored += 1,
            RefreshOutcome::Reindexed => self.files_reindexed += 1,
            RefreshOutcome::Removed => self.files_removed += 1,
        }
        self.entities_embedded += refresh.embedded;
        self.entities_removed += refresh.removed;
    }
}

impl fmt::Display for RefreshReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} scanned, {} unchanged, {} restored, {} reindexed, {} removed, {} failed; {} embedded, {} entities dropped in {:.2}s",
            self.files_scanned,
            self.files_unchanged,
            self.files_restored,
            self.files_reindexed,
            self.files_removed,
            self.files_failed,
            self.entities_embedded,
            self.entities_removed,
            self.elapsed.as_secs_f64()
        )
    }
}

/// Keeps the stores in step with source files
pub struct IncrementalIndexer {
    graph: Arc<GraphStore>,
    vectors: Arc<VectorStore>,
    ledger: Arc<FileLedger>,
    analyzer: Arc<dyn SourceAnalyzer>,
    embedder: Option<Arc<dyn EmbeddingGenerator>>,
    walker: FileWalker,
    threads: usize,
    batch_size: usize,
}

impl IncrementalIndexer {
    pub fn new(
        graph: Arc<GraphStore>,
        vectors: Arc<VectorStore>,
        ledger: Arc<FileLedger>,
        analyzer: Arc<dyn SourceAnalyzer>,
        settings: &Settings,
    ) -> Self {
        Self {
            graph,
            vectors,
            ledger,
            analyzer,
            embedder: None,
            walker: FileWalker::new(&settings.indexing),
            threads: settings.indexing.parallel_threads.max(1),
            batch_size: settings.semantic.batch_size.max(1),
        }
    }

    /// Generate embeddings for refreshed entities with `embedder`.
    ///
    /// Without one, refresh maintains the graph and ledger only.
    pub fn with_embedder(mut self, embedder: Arc<dyn EmbeddingGenerator>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Read `path` from disk and refresh it.
    pub fn refresh_file(&self, path: &Path) -> IndexResult<FileRefresh> {
        if !self.analyzer.supports(path) {
            return Err(IndexError::UnsupportedFile {
                path: path.to_path_buf(),
            });
        }
        let content = std::fs::read_to_string(path).map_err(|source| IndexError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        self.refresh_content(path, &content)
    }

    /// Refresh `path` using already-loaded content.
    pub fn refresh_content(&self, path: &Path, content: &str) -> IndexResult<FileRefresh> {
        let content_hash = calculate_hash(content.as_bytes());
        let previous = self.ledger.get(path);

        if let Some(entry) = previous.as_ref().filter(|e| !e.has_changed(&content_hash)) {
            if self.is_complete(&entry.entities) {
                debug!("[refresh] {} unchanged", path.display());
                let mut refresh = FileRefresh::new(path, RefreshOutcome::Unchanged);
                refresh.entities = entry.entities.len();
                return Ok(refresh);
            }
            return self.restore(path, content, entry);
        }

        self.reindex(path, content, previous)
    }

    /// Hash matched; bring missing graph entities and embeddings back.
    fn restore(&self, path: &Path, content: &str, entry: &LedgerEntry) -> IndexResult<FileRefresh> {
        let facts = self.analyze(path, content)?;
        let ids: BTreeSet<NodeId> = facts.node_ids().cloned().collect();

        // Surviving outgoing edges would be double counted by accumulation
        for id in &ids {
            self.graph.remove_outgoing_edges(id, None);
        }
        let nodes = self.ingest(path, facts);

        let missing: Vec<&Node> = nodes
            .iter()
            .filter(|node| !self.vectors.contains(&node.id))
            .collect();
        let embedded = self.embed(path, &missing)?;

        let stale: Vec<&NodeId> = entry
            .entities
            .iter()
            .filter(|id| !ids.contains(*id) && !self.owned_elsewhere(id, path))
            .collect();
        for id in &stale {
            self.graph.remove_node(id);
        }
        let removed = self.vectors.remove_many(stale.iter().copied());

        self.ledger
            .insert(LedgerEntry::new(path, content.as_bytes(), ids.iter().cloned().collect()));

        debug!(
            "[refresh] {} restored ({embedded} embedded)",
            path.display()
        );
        Ok(FileRefresh {
            path: path.to_path_buf(),
            outcome: RefreshOutcome::Restored,
            entities: ids.len(),
            embedded,
            removed,
        })
    }

    /// New or changed file; replace everything it owns.
    fn reindex(
        &self,
        path: &Path,
        content: &str,
        previous: Option<LedgerEntry>,
    ) -> IndexResult<FileRefresh> {
        let facts = self.analyze(path, content)?;
        let ids: BTreeSet<NodeId> = facts.node_ids().cloned().collect();

        let mut old: BTreeSet<NodeId> = previous
            .map(|e| e.entities)
            .unwrap_or_default()
            .into_iter()
            .collect();
        old.extend(self.graph.nodes_in_file(path));

        let mut removed = 0;
        for id in &old {
            if ids.contains(id) {
                self.graph.remove_outgoing_edges(id, None);
            } else if !self.owned_elsewhere(id, path) {
                self.graph.remove_node(id);
                self.vectors.remove(id);
                removed += 1;
            }
        }

        let nodes = self.ingest(path, facts);
        let all: Vec<&Node> = nodes.iter().collect();
        let embedded = self.embed(path, &all)?;

        self.ledger
            .insert(LedgerEntry::new(path, content.as_bytes(), ids.iter().cloned().collect()));

        debug!(
            "[refresh] {} reindexed ({} entities, {embedded} embedded, {removed} removed)",
            path.display(),
            ids.len()
        );
        Ok(FileRefresh {
            path: path.to_path_buf(),
            outcome: RefreshOutcome::Reindexed,
            entities: ids.len(),
            embedded,
            removed,
        })
    }

    fn analyze(&self, path: &Path, content: &str) -> IndexResult<FileFacts> {
        self.analyzer
            .analyze(path, content)
            .map_err(|e| IndexError::Analyzer {
                path: path.to_path_buf(),
                reason: e.to_string(),
            })
    }

    /// Upsert facts, stamping each node with its source file.
    fn ingest(&self, path: &Path, facts: FileFacts) -> Vec<Node> {
        let nodes: Vec<Node> = facts
            .nodes
            .into_iter()
            .map(|node| node.with_file(path))
            .collect();
        self.graph.upsert_nodes(nodes.iter().cloned());
        for edge in facts.edges {
            self.graph.accumulate_edge(edge);
        }
        nodes
    }

    /// True when `id` now belongs to a different file, e.g. after a rename.
    fn owned_elsewhere(&self, id: &NodeId, path: &Path) -> bool {
        self.graph
            .get_node(id)
            .and_then(|node| node.file)
            .is_some_and(|file| file != path)
    }

    fn is_complete(&self, entities: &[NodeId]) -> bool {
        entities.iter().all(|id| {
            self.graph.contains_node(id)
                && (self.embedder.is_none() || self.vectors.contains(id))
        })
    }

    fn embed(&self, path: &Path, nodes: &[&Node]) -> IndexResult<usize> {
        let Some(embedder) = self.embedder.as_ref() else {
            return Ok(0);
        };

        let mut embedded = 0;
        for chunk in nodes.chunks(self.batch_size) {
            let texts: Vec<String> = chunk.iter().map(|node| node_text(node)).collect();
            let text_refs: Vec<&str> = texts.iter().map(String::as_str).collect();
            let embedding_error = |source| IndexError::Embedding {
                path: path.to_path_buf(),
                source,
            };

            let vectors = embedder
                .generate_embeddings(&text_refs)
                .map_err(embedding_error)?;

            for ((node, vector), text) in chunk.iter().zip(vectors).zip(texts) {
                self.vectors
                    .upsert(EmbeddingRecord::new(node.id.clone(), vector, text))
                    .map_err(embedding_error)?;
                embedded += 1;
            }
        }
        Ok(embedded)
    }

    /// Drop everything derived from `path`.
    ///
    /// Entities that another file has since taken over are left alone.
    pub fn remove_file(&self, path: &Path) -> FileRefresh {
        let mut ids: BTreeSet<NodeId> = self
            .ledger
            .remove(path)
            .map(|e| e.entities)
            .unwrap_or_default()
            .into_iter()
            .filter(|id| !self.owned_elsewhere(id, path))
            .collect();
        ids.extend(self.graph.remove_file(path));

        for id in &ids {
            self.graph.remove_node(id);
            self.vectors.remove(id);
        }

        debug!("[refresh] {} removed ({} entities)", path.display(), ids.len());
        let mut refresh = FileRefresh::new(path, RefreshOutcome::Removed);
        refresh.removed = ids.len();
        refresh
    }

    /// Refresh every matching file under `root` on a bounded worker pool.
    ///
    /// Ledger entries under `root` whose file no longer exists are removed.
    /// Per-file failures are collected in the report; they do not abort the
    /// run.
    pub fn refresh_directory(&self, root: &Path) -> IndexResult<RefreshReport> {
        let mut report = RefreshReport::new();
        let files = self.walker.walk(root);
        report.files_scanned = files.len();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.threads)
            .build()
            .map_err(|e| IndexError::WorkerPool(e.to_string()))?;

        let results: Vec<(PathBuf, IndexResult<FileRefresh>)> = pool.install(|| {
            files
                .par_iter()
                .filter(|path| self.analyzer.supports(path))
                .map(|path| (path.clone(), self.refresh_file(path)))
                .collect()
        });

        for (path, result) in results {
            match result {
                Ok(refresh) => report.record(&refresh),
                Err(e) => {
                    warn!("[refresh] {}: {e}", path.display());
                    report.add_error(path, e.to_string());
                }
            }
        }

        // `files` is sorted by the walker
        for tracked in self.ledger.paths() {
            if tracked.starts_with(root) && files.binary_search(&tracked).is_err() {
                let refresh = self.remove_file(&tracked);
                report.record(&refresh);
            }
        }

        report.stop_timing();
        info!("[refresh] {}: {report}", root.display());
        Ok(report)
    }

    /// Clear every store and rebuild from `root`.
    pub fn full_refresh(&self, root: &Path) -> IndexResult<RefreshReport> {
        self.graph.clear();
        self.vectors.clear();
        self.ledger.clear();
        self.refresh_directory(root)
    }
}
