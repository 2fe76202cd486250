//! Graph algorithms over realistic call graphs.

mod common;

use codeatlas::graph::{
    BetweennessOptions, CommunityOptions, PageRankOptions, PathOptions, betweenness_centrality,
    detect_communities, find_paths, graph_stats, pagerank,
};
use codeatlas::{Edge, GraphError, GraphStore, Node, NodeId};
use common::{m, module_graph};

#[test]
fn test_pagerank_is_a_distribution() {
    let store = module_graph(&[
        ("Router", "Billing"),
        ("Router", "Accounts"),
        ("Billing", "Payments"),
        ("Accounts", "Payments"),
        ("Payments", "Gateway"),
        ("Gateway", "Logger"),
        ("Billing", "Logger"),
    ]);
    // Isolated node with no edges at all
    store.upsert_node(Node::module("Unused"));

    let result = pagerank(&store.snapshot(), &PageRankOptions::default()).unwrap();
    assert_eq!(result.scores.len(), 7);

    let total: f64 = result.scores.values().sum();
    assert!((total - 1.0).abs() < 1e-6, "sum was {total}");
    assert!(result.scores.values().all(|s| *s >= 0.0));

    // Everything flows into the logger eventually
    let ranked = result.ranked();
    assert_eq!(ranked[0].0, m("Logger"));
    assert!(result.score(&m("Payments")).unwrap() > result.score(&m("Router")).unwrap());
}

#[test]
fn test_pagerank_rejects_bad_damping() {
    let store = module_graph(&[("A", "B")]);
    for damping in [-0.1, 1.5] {
        let options = PageRankOptions {
            damping,
            ..PageRankOptions::default()
        };
        let err = pagerank(&store.snapshot(), &options).unwrap_err();
        assert!(matches!(
            err,
            GraphError::InvalidParameter {
                name: "damping",
                ..
            }
        ));
    }
}

#[test]
fn test_triangle_yields_both_routes() {
    let store = module_graph(&[("A", "B"), ("B", "C"), ("A", "C")]);
    let result = find_paths(&store.snapshot(), &m("A"), &m("C"), &PathOptions::default()).unwrap();

    assert_eq!(
        result.paths,
        vec![vec![m("A"), m("C")], vec![m("A"), m("B"), m("C")]]
    );
    assert!(!result.truncated);
}

#[test]
fn test_path_search_rejects_zero_depth() {
    let store = module_graph(&[("A", "B")]);
    let err = find_paths(
        &store.snapshot(),
        &m("A"),
        &m("B"),
        &PathOptions::default().with_max_depth(0),
    )
    .unwrap_err();
    assert!(matches!(
        err,
        GraphError::InvalidParameter {
            name: "max_depth",
            ..
        }
    ));
}

#[test]
fn test_high_degree_hub_stays_bounded() {
    // Source fans out to 200 helpers, each of which reaches the sink two ways
    let store = GraphStore::new();
    store.upsert_node(Node::module("Source"));
    store.upsert_node(Node::module("Sink"));
    for i in 0..200 {
        let helper = format!("Helper{i:03}");
        let relay = format!("Relay{i:03}");
        store.upsert_node(Node::module(helper.clone()));
        store.upsert_node(Node::module(relay.clone()));
        store.upsert_edge(Edge::calls(m("Source"), m(&helper)));
        store.upsert_edge(Edge::calls(m(&helper), m("Sink")));
        store.upsert_edge(Edge::calls(m(&helper), m(&relay)));
        store.upsert_edge(Edge::calls(m(&relay), m("Sink")));
    }

    let options = PathOptions::default()
        .with_max_depth(5)
        .with_max_paths(10);
    let result = find_paths(&store.snapshot(), &m("Source"), &m("Sink"), &options).unwrap();

    assert_eq!(result.paths.len(), 10);
    assert!(result.truncated);
    assert!(result.paths.iter().all(|p| p.len() - 1 <= 5));
    assert!(result.paths.iter().all(|p| p.first() == Some(&m("Source"))));
    assert!(result.paths.iter().all(|p| p.last() == Some(&m("Sink"))));
    assert!(result.high_degree_nodes.contains(&m("Source")));
}

#[test]
fn test_betweenness_ranks_the_bridge_highest() {
    // Two clusters joined only through Bridge
    let store = module_graph(&[
        ("A1", "A2"),
        ("A2", "A3"),
        ("A3", "Bridge"),
        ("Bridge", "B1"),
        ("B1", "B2"),
        ("B2", "B3"),
    ]);

    let result = betweenness_centrality(&store.snapshot(), &BetweennessOptions::default()).unwrap();
    assert!(!result.is_capped());
    assert_eq!(result.ranked()[0].0, m("Bridge"));
    assert_eq!(result.score(&m("A1")), Some(0.0));
    assert_eq!(result.score(&m("B3")), Some(0.0));
}

#[test]
fn test_betweenness_cap_limits_analysed_nodes() {
    let mut edges = Vec::new();
    let names: Vec<String> = (0..30).map(|i| format!("N{i:02}")).collect();
    for pair in names.windows(2) {
        edges.push((pair[0].as_str(), pair[1].as_str()));
    }
    let store = module_graph(&edges);

    let options = BetweennessOptions {
        max_nodes: 10,
        ..BetweennessOptions::default()
    };
    let result = betweenness_centrality(&store.snapshot(), &options).unwrap();

    assert!(result.is_capped());
    assert_eq!(result.scores.len(), 10);
    let cap = result.cap.unwrap();
    assert_eq!((cap.limit, cap.total), (10, 30));
}

fn two_cliques() -> GraphStore {
    let left = ["Auth", "Session", "Token", "User"];
    let right = ["Cart", "Order", "Invoice", "Shipment"];
    let mut edges = Vec::new();
    for group in [&left, &right] {
        for a in group.iter() {
            for b in group.iter() {
                if a < b {
                    edges.push((*a, *b));
                }
            }
        }
    }
    edges.push(("User", "Order"));
    module_graph(&edges)
}

#[test]
fn test_louvain_separates_cliques() {
    let store = two_cliques();
    let result = detect_communities(&store.snapshot(), &CommunityOptions::default()).unwrap();

    assert_eq!(result.community_count, 2);
    assert!(result.modularity > 0.3);
    let auth = result.community_of(&m("Auth")).unwrap();
    let cart = result.community_of(&m("Cart")).unwrap();
    assert_ne!(auth, cart);
    for name in ["Session", "Token", "User"] {
        assert_eq!(result.community_of(&m(name)), Some(auth));
    }
    for name in ["Order", "Invoice", "Shipment"] {
        assert_eq!(result.community_of(&m(name)), Some(cart));
    }
}

#[test]
fn test_louvain_is_deterministic() {
    let store = two_cliques();
    let snapshot = store.snapshot();
    let first = detect_communities(&snapshot, &CommunityOptions::default().hierarchical()).unwrap();
    for _ in 0..5 {
        let again =
            detect_communities(&snapshot, &CommunityOptions::default().hierarchical()).unwrap();
        assert_eq!(again.assignments, first.assignments);
        assert_eq!(again.modularity, first.modularity);
    }
}

#[test]
fn test_stats_report_dangling_and_leaders() {
    let store = module_graph(&[("A", "B"), ("C", "B")]);
    store.upsert_edge(Edge::calls(m("A"), NodeId::function("Missing", "run", 0)));

    let stats = graph_stats(&store.snapshot(), &PageRankOptions::default(), 1).unwrap();
    assert_eq!(stats.node_count, 3);
    assert_eq!(stats.edge_count, 3);
    assert_eq!(stats.dangling_edges, 1);
    assert_eq!(stats.top_ranked.len(), 1);
    assert_eq!(stats.top_ranked[0].0, m("B"));
}
