//! Table formatting for CLI output.

use crate::cache::CacheStats;
use crate::graph::{CommunityResult, GraphStats, PathResult};
use crate::types::NodeId;
use comfy_table::{
    Attribute, Cell, CellAlignment, Color, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL,
};

fn table_with_headers(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold))
            .collect::<Vec<_>>(),
    );
    table
}

/// Ranked scores (PageRank, betweenness, ...) as `# | Node | Score`.
pub fn create_ranking_table(title: &str, ranked: &[(NodeId, f64)]) -> String {
    let mut table = table_with_headers(&["#", "Node", title]);
    for (position, (id, score)) in ranked.iter().enumerate() {
        table.add_row(vec![
            Cell::new(position + 1).set_alignment(CellAlignment::Right),
            Cell::new(id),
            Cell::new(format!("{score:.6}")).set_alignment(CellAlignment::Right),
        ]);
    }
    table.to_string()
}

/// One row per community, largest first.
pub fn create_community_table(result: &CommunityResult, max_members: usize) -> String {
    let mut table = table_with_headers(&["Community", "Size", "Members"]);

    let mut communities: Vec<(usize, Vec<NodeId>)> =
        result.members().into_iter().enumerate().collect();
    communities.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then(a.0.cmp(&b.0)));

    for (community, members) in communities {
        let mut shown: Vec<String> = members
            .iter()
            .take(max_members)
            .map(ToString::to_string)
            .collect();
        if members.len() > max_members {
            shown.push(format!("… {} more", members.len() - max_members));
        }
        table.add_row(vec![
            Cell::new(community),
            Cell::new(members.len()).set_alignment(CellAlignment::Right),
            Cell::new(shown.join(", ")),
        ]);
    }
    table.to_string()
}

pub fn create_paths_table(result: &PathResult) -> String {
    let mut table = table_with_headers(&["#", "Length", "Path"]);
    for (position, path) in result.paths.iter().enumerate() {
        let rendered: Vec<String> = path.iter().map(ToString::to_string).collect();
        table.add_row(vec![
            Cell::new(position + 1),
            Cell::new(path.len().saturating_sub(1)),
            Cell::new(rendered.join(" → ")),
        ]);
    }
    table.to_string()
}

pub fn create_graph_stats_table(stats: &GraphStats) -> String {
    let mut table = table_with_headers(&["Metric", "Value"]);
    table.add_row(vec!["Nodes".to_string(), stats.node_count.to_string()]);
    for (kind, count) in &stats.nodes_by_kind {
        table.add_row(vec![format!("  {}", kind.as_str()), count.to_string()]);
    }
    table.add_row(vec!["Edges".to_string(), stats.edge_count.to_string()]);
    for (kind, count) in &stats.edges_by_kind {
        table.add_row(vec![format!("  {}", kind.as_str()), count.to_string()]);
    }
    table.add_row(vec![
        "Average out-degree".to_string(),
        format!("{:.3}", stats.average_degree),
    ]);
    table.add_row(vec!["Density".to_string(), format!("{:.5}", stats.density)]);

    // Dangling edges point at nodes no analyzer produced
    let dangling = Cell::new(stats.dangling_edges);
    table.add_row(vec![
        Cell::new("Dangling edges"),
        if stats.dangling_edges > 0 {
            dangling.fg(Color::Yellow).add_attribute(Attribute::Bold)
        } else {
            dangling
        },
    ]);
    table.to_string()
}

pub fn create_cache_stats_table(stats: &CacheStats) -> String {
    let mut table = table_with_headers(&["Property", "Value"]);
    table.add_row(vec!["Path".to_string(), stats.path.display().to_string()]);
    table.add_row(vec!["Exists".to_string(), stats.exists.to_string()]);

    let valid = Cell::new(stats.valid);
    table.add_row(vec![
        Cell::new("Valid"),
        if stats.valid {
            valid.fg(Color::Green)
        } else {
            valid.fg(Color::Red)
        },
    ]);
    table.add_row(vec!["File size".to_string(), format!("{} bytes", stats.file_size)]);

    if let Some(metadata) = &stats.metadata {
        table.add_row(vec!["Model".to_string(), metadata.model_id.clone()]);
        table.add_row(vec!["Dimensions".to_string(), metadata.dimensions.to_string()]);
        table.add_row(vec!["Format version".to_string(), metadata.version.to_string()]);
        table.add_row(vec!["Embeddings".to_string(), metadata.entity_count.to_string()]);
        table.add_row(vec!["Files".to_string(), metadata.file_count.to_string()]);
        table.add_row(vec![
            "Written".to_string(),
            format_timestamp(metadata.timestamp),
        ]);
    }
    if let Some(reason) = &stats.invalid_reason {
        table.add_row(vec!["Invalid because".to_string(), reason.clone()]);
    }
    table.to_string()
}

fn format_timestamp(secs: u64) -> String {
    i64::try_from(secs)
        .ok()
        .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
        .map(|time| time.format("%Y-%m-%d %H:%M:%S UTC").to_string())
        .unwrap_or_else(|| secs.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ranking_table() {
        let table = create_ranking_table(
            "PageRank",
            &[(NodeId::function("Billing", "charge", 2), 0.5)],
        );
        assert!(table.contains("PageRank"));
        assert!(table.contains("Billing.charge/2"));
        assert!(table.contains("0.500000"));
    }

    #[test]
    fn test_paths_table() {
        let result = PathResult {
            paths: vec![vec![NodeId::module("A"), NodeId::module("C")]],
            ..PathResult::default()
        };
        let table = create_paths_table(&result);
        assert!(table.contains("A → C"));
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0), "1970-01-01 00:00:00 UTC");
    }
}
