//! Terminal tables for the CLI.

pub mod tables;

pub use tables::{
    create_cache_stats_table, create_community_table, create_graph_stats_table,
    create_paths_table, create_ranking_table,
};
