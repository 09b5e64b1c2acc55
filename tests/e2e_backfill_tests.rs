//! End-to-end tests for the embedding backfill
//!
//! Missing vectors are computed through a fake embedder, persisted in the
//! record store and made searchable by a rebuild.

mod common;

use common::{
    fixed_clock, rebuild_time, FakeEmbedder, TestIndexer, ALIAS, FAILING_MARKER, PREVIOUS_INDEX,
    REBUILT_INDEX,
};
use keeps_indexer::backfill::{BackfillCoordinator, BackfillError};
use keeps_indexer::record_store::{EmbeddingField, RecordStore};
use keeps_indexer::search::{EngineOp, RebuildError, SearchEngine};
use std::sync::Arc;

fn coordinator(indexer: &TestIndexer, embedder: Arc<FakeEmbedder>) -> BackfillCoordinator {
    BackfillCoordinator::new(indexer.store.clone(), embedder, indexer.builder.clone())
}

#[tokio::test]
async fn test_backfill_skips_failed_record_and_reindexes_the_rest() {
    let indexer = TestIndexer::with_clock(fixed_clock(rebuild_time()));
    indexer.engine.seed_index(PREVIOUS_INDEX, Some(ALIAS));
    let failing_title = format!("{} title", FAILING_MARKER);
    let failing_content = format!("{} content", FAILING_MARKER);
    let keeps = indexer.insert_keeps(&[
        ("Groceries", "milk, eggs"),
        ("Ideas", "write more tests"),
        (failing_title.as_str(), failing_content.as_str()),
        ("Travel", "passport"),
    ]);
    let embedder = Arc::new(FakeEmbedder::new());

    let report = coordinator(&indexer, embedder.clone())
        .run_backfill(ALIAS)
        .await
        .unwrap();

    assert_eq!(report.candidates, 4);
    assert_eq!(report.updated, 3);
    assert_eq!(report.fields_written, 6);
    assert_eq!(report.fields_failed, 2);
    assert_eq!(embedder.calls(), 8);

    let rebuild = report.rebuild.unwrap();
    assert_eq!(rebuild.index, REBUILT_INDEX);
    assert_eq!(rebuild.documents, 4);

    // The failed keep is still indexed, just without vectors
    let failed_doc = indexer.engine.get_document(ALIAS, &keeps[2].id).unwrap();
    assert!(failed_doc.get("title_vector").is_none());
    let doc = indexer.engine.get_document(ALIAS, &keeps[0].id).unwrap();
    assert_eq!(doc["title_vector"], serde_json::json!([9.0, 1.0, 0.0]));
    assert_eq!(doc["content_vector"], serde_json::json!([10.0, 1.0, 0.0]));

    // Only the failed keep is picked up by the next run
    let missing = indexer
        .store
        .list_keeps_missing_embeddings(&EmbeddingField::ALL)
        .unwrap();
    assert_eq!(missing.len(), 1);
    assert_eq!(missing[0].id, keeps[2].id);
}

#[tokio::test]
async fn test_nothing_to_backfill_means_no_rebuild() {
    let indexer = TestIndexer::new();
    indexer.engine.seed_index(PREVIOUS_INDEX, Some(ALIAS));
    indexer.insert_keeps(&[("Groceries", "milk, eggs")]);
    let embedder = Arc::new(FakeEmbedder::new());

    let first = coordinator(&indexer, embedder.clone())
        .run_backfill(ALIAS)
        .await
        .unwrap();
    assert_eq!(first.updated, 1);
    let rebuilt = first.rebuild.unwrap().index;

    let second = coordinator(&indexer, embedder.clone())
        .run_backfill(ALIAS)
        .await
        .unwrap();
    assert_eq!(second.candidates, 0);
    assert_eq!(second.updated, 0);
    assert!(second.rebuild.is_none());
    assert_eq!(embedder.calls(), 2);
    assert_eq!(
        indexer.engine.get_alias(ALIAS).await.unwrap(),
        vec![rebuilt]
    );
}

#[tokio::test]
async fn test_all_embeddings_failing_means_no_rebuild() {
    let indexer = TestIndexer::new();
    indexer.engine.seed_index(PREVIOUS_INDEX, Some(ALIAS));
    let title = format!("{} note", FAILING_MARKER);
    indexer.insert_keeps(&[(title.as_str(), FAILING_MARKER)]);

    let report = coordinator(&indexer, Arc::new(FakeEmbedder::new()))
        .run_backfill(ALIAS)
        .await
        .unwrap();

    assert_eq!(report.fields_failed, 2);
    assert!(report.rebuild.is_none());
    assert_eq!(indexer.versions(), vec![PREVIOUS_INDEX.to_string()]);
}

#[tokio::test]
async fn test_vectors_survive_a_failed_rebuild() {
    let indexer = TestIndexer::new();
    indexer.engine.seed_index(PREVIOUS_INDEX, Some(ALIAS));
    indexer.insert_keeps(&[("Groceries", "milk, eggs"), ("Ideas", "tests")]);
    indexer.engine.fail_on(EngineOp::Bulk);

    let err = coordinator(&indexer, Arc::new(FakeEmbedder::new()))
        .run_backfill(ALIAS)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        BackfillError::Rebuild {
            updated: 2,
            source: RebuildError::Bulk { .. }
        }
    ));
    assert!(indexer
        .store
        .list_keeps_missing_embeddings(&EmbeddingField::ALL)
        .unwrap()
        .is_empty());
    assert_eq!(
        indexer.engine.get_alias(ALIAS).await.unwrap(),
        vec![PREVIOUS_INDEX.to_string()]
    );
}
