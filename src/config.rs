//! Configuration module for the code knowledge base.
//!
//! This module provides a layered configuration system that supports:
//! - Default values
//! - TOML configuration file
//! - Environment variable overrides
//!
//! # Environment Variables
//!
//! Environment variables must be prefixed with `CA_` and use double underscores
//! to separate nested levels:
//! - `CA_GRAPH__DAMPING=0.9` sets `graph.damping`
//! - `CA_CACHE__ENABLED=false` sets `cache.enabled`
//! - `CA_INDEXING__PARALLEL_THREADS=8` sets `indexing.parallel_threads`

use crate::retrieval::Strategy;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Name of the per-project configuration directory
pub const CONFIG_DIR_NAME: &str = ".codeatlas";

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Version of the configuration schema
    #[serde(default = "default_version")]
    pub version: u32,

    /// Project root (where .codeatlas is located)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project_root: Option<PathBuf>,

    /// Global debug mode
    #[serde(default)]
    pub debug: bool,

    #[serde(default)]
    pub graph: GraphConfig,

    #[serde(default)]
    pub semantic: SemanticConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub retrieval: RetrievalConfig,

    #[serde(default)]
    pub indexing: IndexingConfig,
}

/// Defaults and caps for graph algorithms
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct GraphConfig {
    #[serde(default = "default_damping")]
    pub damping: f64,

    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// L1 convergence tolerance for PageRank
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,

    /// Node cap for betweenness and closeness centrality
    #[serde(default = "default_betweenness_max_nodes")]
    pub betweenness_max_nodes: usize,

    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    #[serde(default = "default_max_paths")]
    pub max_paths: usize,

    /// Work budget for a single path search
    #[serde(default = "default_max_expansions")]
    pub max_expansions: usize,

    /// Out-degree above which path search flags a node
    #[serde(default = "default_high_degree_threshold")]
    pub high_degree_threshold: usize,

    /// Louvain resolution
    #[serde(default = "default_resolution")]
    pub resolution: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct SemanticConfig {
    /// Model to use for embeddings
    #[serde(default = "default_embedding_model")]
    pub model: String,

    /// Similarity threshold for search results
    #[serde(default = "default_similarity_threshold")]
    pub threshold: f32,

    /// Texts per embedding batch
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Where downloaded models are kept
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_cache_dir: Option<PathBuf>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory holding one cache file per project
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    #[serde(default = "default_true")]
    pub save_on_shutdown: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct RetrievalConfig {
    #[serde(default)]
    pub strategy: Strategy,

    /// Reciprocal Rank Fusion constant
    #[serde(default = "default_rrf_k")]
    pub rrf_k: f64,

    #[serde(default = "default_limit")]
    pub limit: usize,

    /// Semantic candidates fetched per requested result
    #[serde(default = "default_candidate_multiplier")]
    pub candidate_multiplier: usize,

    /// Add one hop of graph neighbours to the candidate set
    #[serde(default = "default_true")]
    pub expand_neighbors: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct IndexingConfig {
    /// Number of parallel threads for indexing
    #[serde(default = "default_parallel_threads")]
    pub parallel_threads: usize,

    /// File extensions handed to the analyzer
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,

    /// Extra glob patterns to skip during walking
    #[serde(default)]
    pub ignore_patterns: Vec<String>,
}

// Default value functions
fn default_version() -> u32 {
    1
}
fn default_true() -> bool {
    true
}
fn default_damping() -> f64 {
    0.85
}
fn default_max_iterations() -> usize {
    100
}
fn default_tolerance() -> f64 {
    1e-6
}
fn default_betweenness_max_nodes() -> usize {
    1000
}
fn default_max_depth() -> usize {
    5
}
fn default_max_paths() -> usize {
    100
}
fn default_max_expansions() -> usize {
    100_000
}
fn default_high_degree_threshold() -> usize {
    10
}
fn default_resolution() -> f64 {
    1.0
}
fn default_embedding_model() -> String {
    "AllMiniLML6V2".to_string()
}
fn default_similarity_threshold() -> f32 {
    0.2
}
fn default_batch_size() -> usize {
    64
}
fn default_rrf_k() -> f64 {
    60.0
}
fn default_limit() -> usize {
    10
}
fn default_candidate_multiplier() -> usize {
    3
}
fn default_parallel_threads() -> usize {
    num_cpus::get()
}
fn default_extensions() -> Vec<String> {
    ["ex", "exs", "erl", "hrl", "py", "rs", "js", "ts"]
        .iter()
        .map(|ext| ext.to_string())
        .collect()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: default_version(),
            project_root: None,
            debug: false,
            graph: GraphConfig::default(),
            semantic: SemanticConfig::default(),
            cache: CacheConfig::default(),
            retrieval: RetrievalConfig::default(),
            indexing: IndexingConfig::default(),
        }
    }
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            damping: default_damping(),
            max_iterations: default_max_iterations(),
            tolerance: default_tolerance(),
            betweenness_max_nodes: default_betweenness_max_nodes(),
            max_depth: default_max_depth(),
            max_paths: default_max_paths(),
            max_expansions: default_max_expansions(),
            high_degree_threshold: default_high_degree_threshold(),
            resolution: default_resolution(),
        }
    }
}

impl Default for SemanticConfig {
    fn default() -> Self {
        Self {
            model: default_embedding_model(),
            threshold: default_similarity_threshold(),
            batch_size: default_batch_size(),
            model_cache_dir: None,
        }
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: None,
            save_on_shutdown: true,
        }
    }
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            rrf_k: default_rrf_k(),
            limit: default_limit(),
            candidate_multiplier: default_candidate_multiplier(),
            expand_neighbors: true,
        }
    }
}

impl Default for IndexingConfig {
    fn default() -> Self {
        Self {
            parallel_threads: default_parallel_threads(),
            extensions: default_extensions(),
            ignore_patterns: Vec::new(),
        }
    }
}

impl SemanticConfig {
    /// Model cache directory, falling back to the user cache dir
    pub fn resolved_model_cache_dir(&self) -> PathBuf {
        self.model_cache_dir.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("codeatlas")
                .join("models")
        })
    }
}

impl CacheConfig {
    /// Cache directory, falling back to the user cache dir
    pub fn resolved_directory(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("codeatlas")
                .join("embeddings")
        })
    }
}

impl Settings {
    /// Load configuration from all sources
    pub fn load() -> Result<Self, Box<figment::Error>> {
        let config_path = Self::find_workspace_config()
            .unwrap_or_else(|| PathBuf::from(CONFIG_DIR_NAME).join("settings.toml"));

        Self::figment(config_path)
            .extract()
            .map_err(Box::new)
            .map(|mut settings: Settings| {
                if settings.project_root.is_none() {
                    settings.project_root = Self::workspace_root();
                }
                settings
            })
    }

    /// Load configuration from a specific file
    pub fn load_from(path: impl AsRef<Path>) -> Result<Self, Box<figment::Error>> {
        Self::figment(path.as_ref().to_path_buf())
            .extract()
            .map_err(Box::new)
    }

    fn figment(config_path: PathBuf) -> Figment {
        Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(config_path))
            // Double underscore separates nested levels, single underscore stays in field names
            .merge(Env::prefixed("CA_").map(|key| {
                key.as_str().to_lowercase().replace("__", ".").into()
            }))
    }

    /// Find the settings file by looking for .codeatlas from the current directory up
    fn find_workspace_config() -> Option<PathBuf> {
        Self::workspace_root().map(|root| root.join(CONFIG_DIR_NAME).join("settings.toml"))
    }

    /// Get the workspace root directory (where .codeatlas is located)
    pub fn workspace_root() -> Option<PathBuf> {
        let current = std::env::current_dir().ok()?;

        current
            .ancestors()
            .find(|ancestor| ancestor.join(CONFIG_DIR_NAME).is_dir())
            .map(Path::to_path_buf)
    }

    /// Project root used to key the embedding cache
    pub fn resolved_project_root(&self) -> PathBuf {
        self.project_root
            .clone()
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."))
    }

    /// Save current configuration to file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), Box<dyn std::error::Error>> {
        let parent = path.as_ref().parent().ok_or("Invalid path")?;
        std::fs::create_dir_all(parent)?;

        let toml_string = toml::to_string_pretty(self)?;
        std::fs::write(path, toml_string)?;

        Ok(())
    }
}
