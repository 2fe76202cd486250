//! End-to-end incremental refresh: edit, delete and cold-start scenarios.

mod common;

use codeatlas::cache::RefreshOutcome;
use codeatlas::{
    EdgeKind, EmbeddingGenerator, EmbeddingRecord, KnowledgeBase, NodeId, RestoreStatus,
    SourceAnalyzer,
};
use common::{LineAnalyzer, TestEmbedder, TestProject, sample_code};
use std::sync::Arc;

fn knowledge_base(project: &TestProject) -> (KnowledgeBase, Arc<TestEmbedder>) {
    let embedder = Arc::new(TestEmbedder::new());
    let generator: Arc<dyn EmbeddingGenerator> = embedder.clone();
    let kb = KnowledgeBase::new(project.settings(), project.path(), Some(generator));
    (kb, embedder)
}

fn analyzer() -> Arc<dyn SourceAnalyzer> {
    Arc::new(LineAnalyzer)
}

fn sample_project() -> TestProject {
    let project = TestProject::new();
    project.add_file("lib/billing.ex", sample_code::BILLING);
    project.add_file("lib/payments.ex", sample_code::PAYMENTS);
    project.add_file("lib/gateway.ex", sample_code::GATEWAY);
    project.add_file("README.md", "not indexed");
    project
}

fn records_outside(kb: &KnowledgeBase, module: &str) -> Vec<EmbeddingRecord> {
    kb.vectors()
        .list_embeddings(None)
        .into_iter()
        .filter(|r| r.node_id.module_name() != module)
        .collect()
}

#[test]
fn test_initial_refresh_indexes_everything() {
    let project = sample_project();
    let (kb, embedder) = knowledge_base(&project);

    let report = kb.indexer(analyzer()).refresh_directory(project.path()).unwrap();

    assert_eq!(report.files_scanned, 3);
    assert_eq!(report.files_reindexed, 3);
    assert_eq!(report.files_failed, 0);
    assert_eq!(report.entities_embedded, 7);
    assert_eq!(embedder.embedded_count(), 7);
    assert_eq!(kb.graph().node_count(), 7);
    assert_eq!(kb.vectors().len(), 7);
    assert_eq!(kb.ledger().len(), 3);

    let charge = NodeId::function("Billing", "charge", 2);
    let node = kb.graph().get_node(&charge).unwrap();
    assert_eq!(node.file.as_deref(), Some(project.file("lib/billing.ex").as_path()));
    assert_eq!(kb.graph().get_outgoing_edges(&charge, None).len(), 1);
}

#[test]
fn test_only_changed_file_is_reembedded() {
    let project = sample_project();
    let (kb, embedder) = knowledge_base(&project);
    let indexer = kb.indexer(analyzer());
    indexer.refresh_directory(project.path()).unwrap();

    let untouched_before = records_outside(&kb, "Billing");
    embedder.take_seen();
    let count_before = embedder.embedded_count();

    project.add_file("lib/billing.ex", sample_code::BILLING_EDITED);
    let report = indexer.refresh_directory(project.path()).unwrap();

    assert_eq!(report.files_reindexed, 1);
    assert_eq!(report.files_unchanged, 2);
    assert_eq!(report.entities_embedded, 2);
    assert_eq!(report.entities_removed, 2);
    assert_eq!(embedder.embedded_count() - count_before, 2);

    let seen = embedder.take_seen();
    assert_eq!(seen.len(), 2);
    assert!(seen.iter().all(|text| text.contains("Billing")), "{seen:?}");

    // Entities of unchanged files keep their exact vectors
    assert_eq!(records_outside(&kb, "Billing"), untouched_before);

    // Vanished entities are gone from both stores
    for gone in [
        NodeId::function("Billing", "charge", 2),
        NodeId::function("Billing", "refund", 1),
    ] {
        assert!(!kb.graph().contains_node(&gone));
        assert!(!kb.vectors().contains(&gone));
    }
    let charge = NodeId::function("Billing", "charge", 3);
    assert!(kb.vectors().contains(&charge));
    assert_eq!(
        kb.graph().get_outgoing_edges(&charge, None)[0].to,
        NodeId::function("Payments", "submit", 1)
    );
    // Only the new caller remains on the callee side
    let submit = NodeId::function("Payments", "submit", 1);
    let callers = kb.graph().get_incoming_edges(&submit, Some(EdgeKind::Calls));
    assert_eq!(callers.len(), 1);
    assert_eq!(callers[0].from, charge);
}

#[test]
fn test_unchanged_rerun_does_no_work() {
    let project = sample_project();
    let (kb, embedder) = knowledge_base(&project);
    let indexer = kb.indexer(analyzer());
    indexer.refresh_directory(project.path()).unwrap();
    let generation = kb.graph().generation();
    let count = embedder.embedded_count();

    let report = indexer.refresh_directory(project.path()).unwrap();
    assert_eq!(report.files_unchanged, 3);
    assert_eq!(report.files_reindexed, 0);
    assert_eq!(embedder.embedded_count(), count);
    assert_eq!(kb.graph().generation(), generation);

    let single = indexer.refresh_file(&project.file("lib/gateway.ex")).unwrap();
    assert_eq!(single.outcome, RefreshOutcome::Unchanged);
    assert_eq!(single.entities, 2);
}

#[test]
fn test_deleted_file_is_dropped() {
    let project = sample_project();
    let (kb, _embedder) = knowledge_base(&project);
    let indexer = kb.indexer(analyzer());
    indexer.refresh_directory(project.path()).unwrap();

    project.remove_file("lib/gateway.ex");
    let report = indexer.refresh_directory(project.path()).unwrap();

    assert_eq!(report.files_removed, 1);
    assert_eq!(report.entities_removed, 2);
    assert!(!kb.ledger().contains(&project.file("lib/gateway.ex")));
    assert!(!kb.graph().contains_node(&NodeId::module("Gateway")));
    assert!(!kb.vectors().contains(&NodeId::function("Gateway", "post", 2)));
    assert_eq!(kb.graph().node_count(), 5);
    assert_eq!(kb.vectors().len(), 5);

    // The cross-file call into the deleted file went with it
    let submit = NodeId::function("Payments", "submit", 1);
    assert!(kb.graph().get_outgoing_edges(&submit, None).is_empty());
}

#[test]
fn test_renamed_file_keeps_its_entities() {
    let project = sample_project();
    let (kb, _embedder) = knowledge_base(&project);
    let indexer = kb.indexer(analyzer());
    indexer.refresh_directory(project.path()).unwrap();

    project.add_file("lib/http_gateway.ex", sample_code::GATEWAY);
    project.remove_file("lib/gateway.ex");
    let report = indexer.refresh_directory(project.path()).unwrap();

    assert_eq!(report.files_removed, 1);
    assert_eq!(report.entities_removed, 0);
    assert_eq!(kb.graph().node_count(), 7);
    assert_eq!(kb.vectors().len(), 7);

    let post = NodeId::function("Gateway", "post", 2);
    let node = kb.graph().get_node(&post).unwrap();
    assert_eq!(node.file.as_deref(), Some(project.file("lib/http_gateway.ex").as_path()));
    assert!(kb.vectors().contains(&post));
    assert!(kb.graph().contains_node(&NodeId::module("Gateway")));
    assert!(!kb.ledger().contains(&project.file("lib/gateway.ex")));

    // The cross-file call still lands on the moved function
    let submit = NodeId::function("Payments", "submit", 1);
    let calls = kb.graph().get_outgoing_edges(&submit, Some(EdgeKind::Calls));
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].to, post);

    // A save right after the rename still carries the moved entities
    let saved = kb.shutdown().unwrap().expect("state should be saved");
    assert_eq!(saved.entity_count, 7);
    assert_eq!(saved.file_count, 3);
}

#[test]
fn test_entity_moved_between_changed_files_survives() {
    let project = sample_project();
    let (kb, _embedder) = knowledge_base(&project);
    let indexer = kb.indexer(analyzer());
    indexer.refresh_directory(project.path()).unwrap();

    // Payments.submit/1 moves out of payments.ex into a new file
    project.add_file("lib/payments.ex", "module Payments\n");
    let moved = indexer
        .refresh_content(
            &project.file("lib/submit.ex"),
            "module Payments\ndef submit/1 submits a payment\n",
        )
        .unwrap();
    assert_eq!(moved.outcome, RefreshOutcome::Reindexed);
    indexer.refresh_file(&project.file("lib/payments.ex")).unwrap();

    let submit = NodeId::function("Payments", "submit", 1);
    let node = kb.graph().get_node(&submit).unwrap();
    assert_eq!(node.file.as_deref(), Some(project.file("lib/submit.ex").as_path()));
    assert!(kb.vectors().contains(&submit));
}

#[test]
fn test_analyzer_failure_is_isolated() {
    let project = sample_project();
    project.add_file("lib/broken.ex", "module Broken\nfrobnicate everything\n");
    let (kb, _embedder) = knowledge_base(&project);

    let report = kb.indexer(analyzer()).refresh_directory(project.path()).unwrap();

    assert_eq!(report.files_failed, 1);
    assert_eq!(report.files_reindexed, 3);
    assert_eq!(report.errors.len(), 1);
    assert!(report.errors[0].0.ends_with("lib/broken.ex"));
    assert!(!kb.graph().contains_node(&NodeId::module("Broken")));
}

#[test]
fn test_cold_start_reuses_cached_embeddings() {
    let project = sample_project();
    let (kb, _embedder) = knowledge_base(&project);
    kb.indexer(analyzer()).refresh_directory(project.path()).unwrap();
    let nodes = kb.graph().node_count();
    let edges = kb.graph().edge_count();
    let records = kb.vectors().list_embeddings(None);

    let saved = kb.shutdown().unwrap().expect("state should be saved");
    assert_eq!(saved.entity_count, 7);
    assert_eq!(saved.file_count, 3);

    // Fresh process
    let (kb, embedder) = knowledge_base(&project);
    assert_eq!(
        kb.restore(),
        RestoreStatus::Restored {
            embeddings: 7,
            files: 3
        }
    );
    assert!(kb.graph().is_empty());

    let report = kb.indexer(analyzer()).refresh_directory(project.path()).unwrap();
    assert_eq!(report.files_restored, 3);
    assert_eq!(embedder.embedded_count(), 0);
    assert_eq!(kb.graph().node_count(), nodes);
    assert_eq!(kb.graph().edge_count(), edges);
    assert_eq!(kb.vectors().list_embeddings(None), records);

    // Edges were not double counted by the restore
    let charge = NodeId::function("Billing", "charge", 2);
    let calls = kb.graph().get_outgoing_edges(&charge, None);
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].weight, 1.0);
}

#[test]
fn test_cold_start_after_offline_edit() {
    let project = sample_project();
    let (kb, _embedder) = knowledge_base(&project);
    kb.indexer(analyzer()).refresh_directory(project.path()).unwrap();
    kb.shutdown().unwrap();

    project.add_file("lib/billing.ex", sample_code::BILLING_EDITED);

    let (kb, embedder) = knowledge_base(&project);
    assert!(kb.restore().is_restored());
    let report = kb.indexer(analyzer()).refresh_directory(project.path()).unwrap();

    assert_eq!(report.files_restored, 2);
    assert_eq!(report.files_reindexed, 1);
    assert_eq!(embedder.embedded_count(), 2);
    assert!(!kb.vectors().contains(&NodeId::function("Billing", "refund", 1)));
    assert_eq!(kb.vectors().len(), 6);
}
