//! CLI entry point for the code knowledge base.
//!
//! Inspects configuration, manages the embedding cache, and runs graph
//! algorithms over analyzer fact files.

use anyhow::{Context, Result, bail};
use clap::{
    Parser, Subcommand, ValueEnum,
    builder::styling::{AnsiColor, Effects, Styles},
};
use codeatlas::cache::ClearScope;
use codeatlas::config::{CONFIG_DIR_NAME, Settings};
use codeatlas::display::{
    create_cache_stats_table, create_community_table, create_graph_stats_table,
    create_paths_table, create_ranking_table,
};
use codeatlas::graph::{
    CentralityOptions, CommunityOptions, GraphStore, PageRankOptions, PathOptions,
    betweenness_centrality, closeness_centrality, degree_centrality, detect_communities,
    find_paths, graph_stats, label_propagation, pagerank,
};
use codeatlas::types::{FileFacts, NodeId};
use codeatlas::{KnowledgeBase, logging};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::info;

fn clap_cargo_style() -> Styles {
    Styles::styled()
        .header(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .usage(AnsiColor::Cyan.on_default() | Effects::BOLD)
        .literal(AnsiColor::Green.on_default())
        .placeholder(AnsiColor::Green.on_default())
}

/// Code knowledge base
#[derive(Parser)]
#[command(
    name = "codeatlas",
    version = env!("CARGO_PKG_VERSION"),
    about = "Code knowledge graph, embeddings cache and hybrid retrieval",
    next_line_help = true,
    styles = clap_cargo_style()
)]
struct Cli {
    /// Path to custom settings.toml file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Create .codeatlas/settings.toml with default configuration")]
    Init {
        /// Overwrite an existing settings file
        #[arg(short, long)]
        force: bool,
    },

    #[command(about = "Display the effective configuration")]
    Config,

    #[command(about = "Inspect or delete embedding cache files")]
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    #[command(
        about = "Run graph algorithms over analyzer facts",
        after_help = "Facts files hold one {\"nodes\": [...], \"edges\": [...]} object or an array of them.\n\nExamples:\n  codeatlas graph rank --facts facts.json --metric betweenness\n  codeatlas graph paths --facts facts.json MyApp.Web.call/2 MyApp.Repo.insert/2\n  codeatlas graph communities --facts facts.json --hierarchical"
    )]
    Graph {
        #[command(subcommand)]
        query: GraphQuery,
    },
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show the current project's cache file and whether it is usable
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Delete cache files (current project by default)
    Clear {
        /// Delete every cache file in the cache directory
        #[arg(long, conflicts_with = "older_than")]
        all: bool,

        /// Delete cache files written more than N days ago
        #[arg(long, value_name = "DAYS")]
        older_than: Option<u64>,
    },
}

#[derive(Subcommand)]
enum GraphQuery {
    /// Rank nodes by importance
    Rank {
        #[arg(long)]
        facts: PathBuf,

        #[arg(long, value_enum, default_value_t = Metric::Pagerank)]
        metric: Metric,

        #[arg(short, long, default_value_t = 20)]
        limit: usize,

        #[arg(long)]
        json: bool,
    },

    /// Enumerate bounded simple paths between two nodes
    Paths {
        #[arg(long)]
        facts: PathBuf,

        /// Source node, e.g. `Billing` or `Billing.charge/2`
        from: NodeId,

        /// Target node
        to: NodeId,

        #[arg(long)]
        max_depth: Option<usize>,

        #[arg(long)]
        max_paths: Option<usize>,

        #[arg(long)]
        json: bool,
    },

    /// Detect communities
    Communities {
        #[arg(long)]
        facts: PathBuf,

        /// Keep aggregating communities into super-nodes
        #[arg(long)]
        hierarchical: bool,

        /// Use label propagation instead of Louvain
        #[arg(long)]
        label_propagation: bool,

        /// Members listed per community
        #[arg(long, default_value_t = 8)]
        show: usize,

        #[arg(long)]
        json: bool,
    },

    /// Whole-graph statistics
    Stats {
        #[arg(long)]
        facts: PathBuf,

        /// Top PageRank entries to include
        #[arg(long, default_value_t = 10)]
        top: usize,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Metric {
    Pagerank,
    Betweenness,
    Closeness,
    Degree,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum FactsFile {
    Many(Vec<FileFacts>),
    One(FileFacts),
}

#[derive(Serialize)]
struct RankedRow {
    node: String,
    score: f64,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let settings = match load_settings(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Configuration error: {e:#}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(cli.debug || settings.debug);

    match run(cli.command, settings) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    match path {
        Some(path) => Settings::load_from(path)
            .map_err(|e| anyhow::anyhow!("{e}"))
            .with_context(|| format!("failed to load settings from {}", path.display())),
        None => Ok(Settings::load().unwrap_or_else(|e| {
            eprintln!("Configuration error: {e}. Using default configuration.");
            Settings::default()
        })),
    }
}

fn run(command: Commands, settings: Settings) -> Result<()> {
    match command {
        Commands::Init { force } => init_config(force),
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&settings)?);
            Ok(())
        }
        Commands::Cache { action } => run_cache(action, settings),
        Commands::Graph { query } => run_graph(query, &settings),
    }
}

fn init_config(force: bool) -> Result<()> {
    let path = PathBuf::from(CONFIG_DIR_NAME).join("settings.toml");
    if path.exists() && !force {
        bail!(
            "configuration file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }
    Settings::default()
        .save(&path)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("failed to write {}", path.display()))?;
    println!("Created configuration file at: {}", path.display());
    Ok(())
}

fn run_cache(action: CacheAction, settings: Settings) -> Result<()> {
    let root = settings.resolved_project_root();
    let kb = KnowledgeBase::new(settings, &root, None);

    match action {
        CacheAction::Stats { json } => {
            let stats = kb.cache_stats();
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", create_cache_stats_table(&stats));
            }
        }
        CacheAction::Clear { all, older_than } => {
            let scope = match (all, older_than) {
                (true, _) => ClearScope::All,
                (false, Some(days)) => ClearScope::OlderThan { days },
                (false, None) => ClearScope::Current,
            };
            let removed = kb.clear_cache(scope)?;
            println!("Removed {removed} cache file(s) from {}", kb.cache().directory().display());
        }
    }
    Ok(())
}

fn load_facts(path: &Path) -> Result<GraphStore> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read facts file {}", path.display()))?;
    let facts = match serde_json::from_str::<FactsFile>(&content)
        .with_context(|| format!("invalid facts file {}", path.display()))?
    {
        FactsFile::Many(many) => many,
        FactsFile::One(one) => vec![one],
    };

    let store = GraphStore::new();
    for file in facts {
        store.upsert_nodes(file.nodes);
        for edge in file.edges {
            store.accumulate_edge(edge);
        }
    }
    info!(
        "Loaded {} nodes and {} edges from {}",
        store.node_count(),
        store.edge_count(),
        path.display()
    );
    Ok(store)
}

fn run_graph(query: GraphQuery, settings: &Settings) -> Result<()> {
    let graph = &settings.graph;

    match query {
        GraphQuery::Rank {
            facts,
            metric,
            limit,
            json,
        } => {
            let snapshot = load_facts(&facts)?.snapshot();
            let (title, mut ranked) = match metric {
                Metric::Pagerank => (
                    "PageRank",
                    pagerank(&snapshot, &PageRankOptions::from_settings(graph))?.ranked(),
                ),
                Metric::Betweenness => {
                    let result =
                        betweenness_centrality(&snapshot, &CentralityOptions::from_settings(graph))?;
                    if let Some(cap) = result.cap {
                        eprintln!(
                            "Note: betweenness computed on {} of {} nodes",
                            cap.limit, cap.total
                        );
                    }
                    ("Betweenness", result.ranked())
                }
                Metric::Closeness => {
                    let result =
                        closeness_centrality(&snapshot, &CentralityOptions::from_settings(graph))?;
                    ("Closeness", result.ranked())
                }
                Metric::Degree => {
                    let degrees = degree_centrality(&snapshot, &[]);
                    let mut ranked: Vec<(NodeId, f64)> = degrees
                        .into_iter()
                        .map(|d| (d.node_id, d.total as f64))
                        .collect();
                    ranked.sort_by(|a, b| b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
                    ("Degree", ranked)
                }
            };
            ranked.truncate(limit);

            if json {
                let rows: Vec<RankedRow> = ranked
                    .iter()
                    .map(|(id, score)| RankedRow {
                        node: id.to_string(),
                        score: *score,
                    })
                    .collect();
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                println!("{}", create_ranking_table(title, &ranked));
            }
        }

        GraphQuery::Paths {
            facts,
            from,
            to,
            max_depth,
            max_paths,
            json,
        } => {
            let snapshot = load_facts(&facts)?.snapshot();
            let mut options = PathOptions::from_settings(graph);
            if let Some(depth) = max_depth {
                options = options.with_max_depth(depth);
            }
            if let Some(paths) = max_paths {
                options = options.with_max_paths(paths);
            }

            let result = find_paths(&snapshot, &from, &to, &options)?;
            if json {
                let paths: Vec<Vec<String>> = result
                    .paths
                    .iter()
                    .map(|path| path.iter().map(ToString::to_string).collect())
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "paths": paths,
                        "truncated": result.truncated,
                        "high_degree_nodes": result
                            .high_degree_nodes
                            .iter()
                            .map(ToString::to_string)
                            .collect::<Vec<_>>(),
                    }))?
                );
            } else if result.paths.is_empty() {
                println!("No paths from {from} to {to} within depth {}", options.max_depth);
            } else {
                println!("{}", create_paths_table(&result));
                if result.truncated {
                    eprintln!("Note: search stopped early; more paths may exist");
                }
                if !result.high_degree_nodes.is_empty() {
                    let hubs: Vec<String> =
                        result.high_degree_nodes.iter().map(ToString::to_string).collect();
                    eprintln!("High-degree nodes on the search frontier: {}", hubs.join(", "));
                }
            }
        }

        GraphQuery::Communities {
            facts,
            hierarchical,
            label_propagation: use_labels,
            show,
            json,
        } => {
            let snapshot = load_facts(&facts)?.snapshot();
            let mut options = CommunityOptions::from_settings(graph);
            if hierarchical {
                options = options.hierarchical();
            }
            let result = if use_labels {
                label_propagation(&snapshot, &options)?
            } else {
                detect_communities(&snapshot, &options)?
            };

            if json {
                let communities: Vec<Vec<String>> = result
                    .members()
                    .iter()
                    .map(|members| members.iter().map(ToString::to_string).collect())
                    .collect();
                println!(
                    "{}",
                    serde_json::to_string_pretty(&serde_json::json!({
                        "community_count": result.community_count,
                        "modularity": result.modularity,
                        "levels": result.levels.len(),
                        "communities": communities,
                    }))?
                );
            } else {
                println!(
                    "{} communities, modularity {:.4}",
                    result.community_count, result.modularity
                );
                println!("{}", create_community_table(&result, show));
            }
        }

        GraphQuery::Stats { facts, top, json } => {
            let snapshot = load_facts(&facts)?.snapshot();
            let stats = graph_stats(&snapshot, &PageRankOptions::from_settings(graph), top)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", create_graph_stats_table(&stats));
                if !stats.top_ranked.is_empty() {
                    println!("{}", create_ranking_table("PageRank", &stats.top_ranked));
                }
            }
        }
    }
    Ok(())
}
