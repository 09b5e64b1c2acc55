//! End-to-end tests for scheduled indexing jobs
//!
//! Drives the backfill and reindex jobs through the scheduler, from dispatch
//! on the worker pool to the alias switch.

mod common;

use common::{wait_for, FakeEmbedder, TestIndexer, ALIAS};
use keeps_indexer::background_jobs::jobs::{EmbeddingBackfillJob, SearchReindexJob};
use keeps_indexer::background_jobs::{
    JobContext, JobError, JobInfo, JobRunStatus, JobScheduler, SchedulerHandle,
};
use keeps_indexer::embedding::Embedder;
use keeps_indexer::record_store::{EmbeddingField, RecordStore};
use keeps_indexer::search::SearchEngine;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn scheduler_for(indexer: &TestIndexer, with_embedder: bool) -> JobScheduler {
    let context = JobContext::new(
        indexer.store.clone(),
        indexer.engine.clone(),
        indexer.builder.clone(),
        with_embedder.then(|| Arc::new(FakeEmbedder::new()) as Arc<dyn Embedder>),
        ALIAS,
    );
    JobScheduler::new(context, 4, Duration::from_secs(10))
}

async fn wait_for_finished_run(handle: &SchedulerHandle, job_id: &str) -> JobInfo {
    for _ in 0..300 {
        let info = handle.get_job(job_id).await.expect("job is registered");
        let finished = info
            .last_run
            .as_ref()
            .is_some_and(|run| run.finished_at.is_some());
        if finished && !info.is_running {
            return info;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Timed out waiting for {} to finish", job_id);
}

#[tokio::test]
async fn test_triggered_backfill_job_reaches_the_index() {
    let indexer = TestIndexer::new();
    let keeps = indexer.insert_keeps(&[("Groceries", "milk, eggs"), ("Ideas", "tests")]);
    let scheduler = scheduler_for(&indexer, true);
    let handle = scheduler.handle();
    scheduler
        .register_job(Arc::new(EmbeddingBackfillJob::new("0 0 3 * * *", None)))
        .await
        .unwrap();

    handle.trigger_job("embedding_backfill").await.unwrap();
    let info = wait_for_finished_run(&handle, "embedding_backfill").await;

    let last_run = info.last_run.unwrap();
    assert_eq!(last_run.status, JobRunStatus::Completed);
    assert_eq!(last_run.triggered_by, "manual");
    assert!(indexer
        .store
        .list_keeps_missing_embeddings(&EmbeddingField::ALL)
        .unwrap()
        .is_empty());
    assert_eq!(indexer.engine.get_alias(ALIAS).await.unwrap().len(), 1);
    let doc = indexer.engine.get_document(ALIAS, &keeps[1].id).unwrap();
    assert!(doc["content_vector"].is_array());
}

#[tokio::test]
async fn test_backfill_job_without_embedder_fails_cleanly() {
    let indexer = TestIndexer::new();
    let scheduler = scheduler_for(&indexer, false);
    let handle = scheduler.handle();
    scheduler
        .register_job(Arc::new(EmbeddingBackfillJob::new("@every 1h", None)))
        .await
        .unwrap();

    handle.trigger_job("embedding_backfill").await.unwrap();
    let info = wait_for_finished_run(&handle, "embedding_backfill").await;

    assert_eq!(info.last_run.unwrap().status, JobRunStatus::Failed);
    assert!(indexer.versions().is_empty());
}

#[tokio::test]
async fn test_scheduled_reindex_runs_and_cleans_up() {
    let indexer = TestIndexer::new();
    indexer.insert_keeps(&[("Groceries", "milk, eggs")]);
    let scheduler = scheduler_for(&indexer, false);
    let handle = scheduler.handle();
    scheduler
        .register_job(Arc::new(SearchReindexJob::new(
            "@every 200ms",
            Some(Duration::from_secs(5)),
        )))
        .await
        .unwrap();

    scheduler.start();
    let engine = indexer.engine.clone();
    wait_for("two scheduled rebuilds", || !engine.deleted_indices().is_empty()).await;
    scheduler.stop().await;

    let info = wait_for_finished_run(&handle, "search_reindex").await;
    let last_run = info.last_run.unwrap();
    assert_eq!(last_run.status, JobRunStatus::Completed);
    assert_eq!(last_run.triggered_by, "schedule");

    let current = indexer.engine.get_alias(ALIAS).await.unwrap();
    assert_eq!(current.len(), 1);
    let engine = indexer.engine.clone();
    let versions_left = move || {
        engine
            .index_names()
            .into_iter()
            .filter(|name| name.starts_with("app-keeps_"))
            .count()
    };
    wait_for("superseded versions to be deleted", || versions_left() == 1).await;
    assert_eq!(indexer.versions(), current);
    assert_eq!(indexer.engine.document_count(ALIAS), Some(1));
}

#[tokio::test]
async fn test_overlapping_reindex_ticks_are_skipped() {
    let indexer = TestIndexer::new();
    indexer.insert_keeps(&[("Groceries", "milk, eggs")]);
    let scheduler = scheduler_for(&indexer, false);

    let active = Arc::new(AtomicUsize::new(0));
    let max_active = Arc::new(AtomicUsize::new(0));
    let runs = Arc::new(AtomicUsize::new(0));
    let (a, m, r) = (active.clone(), max_active.clone(), runs.clone());
    scheduler
        .register("reindex_keeps", "@every 100ms", move |ctx: JobContext| {
            let (active, max_active, runs) = (a.clone(), m.clone(), r.clone());
            async move {
                runs.fetch_add(1, Ordering::SeqCst);
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_active.fetch_max(now, Ordering::SeqCst);

                // Slower than the schedule
                tokio::time::sleep(Duration::from_millis(350)).await;
                let result = ctx.index_builder.rebuild(&ctx.alias).await;

                active.fetch_sub(1, Ordering::SeqCst);
                result?;
                anyhow::Ok(())
            }
        })
        .await
        .unwrap();

    scheduler.start();
    tokio::time::sleep(Duration::from_millis(1200)).await;
    scheduler.stop().await;

    assert_eq!(max_active.load(Ordering::SeqCst), 1);
    let runs = runs.load(Ordering::SeqCst);
    assert!((2..=4).contains(&runs), "unexpected number of runs: {}", runs);
}

#[tokio::test]
async fn test_manual_trigger_during_run_is_refused() {
    let indexer = TestIndexer::new();
    let scheduler = scheduler_for(&indexer, false);
    let handle = scheduler.handle();
    scheduler
        .register("slow_reindex", "@every 1h", |ctx: JobContext| async move {
            tokio::time::sleep(Duration::from_millis(200)).await;
            ctx.index_builder.rebuild(&ctx.alias).await?;
            anyhow::Ok(())
        })
        .await
        .unwrap();

    handle.trigger_job("slow_reindex").await.unwrap();
    assert_eq!(
        handle.trigger_job("slow_reindex").await,
        Err(JobError::AlreadyRunning)
    );

    wait_for_finished_run(&handle, "slow_reindex").await;
    assert_eq!(indexer.versions().len(), 1);
}

#[tokio::test]
async fn test_timed_out_job_releases_its_lock() {
    let indexer = TestIndexer::new();
    let context = JobContext::new(
        indexer.store.clone(),
        indexer.engine.clone(),
        indexer.builder.clone(),
        None,
        ALIAS,
    );
    // Closures get the scheduler default timeout
    let scheduler = JobScheduler::new(context, 2, Duration::from_millis(100));
    let handle = scheduler.handle();
    scheduler
        .register("stuck", "@every 1h", |_ctx: JobContext| async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            anyhow::Ok(())
        })
        .await
        .unwrap();

    handle.trigger_job("stuck").await.unwrap();
    let info = wait_for_finished_run(&handle, "stuck").await;
    let last_run = info.last_run.unwrap();
    assert_eq!(last_run.status, JobRunStatus::TimedOut);
    assert!(last_run.error_message.unwrap().contains("timed out"));

    handle.trigger_job("stuck").await.unwrap();
}

#[tokio::test]
async fn test_reindex_and_backfill_firing_together_leave_one_index() {
    let indexer = TestIndexer::new();
    indexer.engine.seed_index(common::PREVIOUS_INDEX, Some(ALIAS));
    let keeps = indexer.insert_keeps(&[("Groceries", "milk, eggs"), ("Ideas", "tests")]);
    let scheduler = scheduler_for(&indexer, true);
    let handle = scheduler.handle();
    scheduler
        .register_job(Arc::new(SearchReindexJob::new("@every 1h", None)))
        .await
        .unwrap();
    scheduler
        .register_job(Arc::new(EmbeddingBackfillJob::new("@every 1h", None)))
        .await
        .unwrap();

    handle.trigger_job("search_reindex").await.unwrap();
    handle.trigger_job("embedding_backfill").await.unwrap();
    let reindex = wait_for_finished_run(&handle, "search_reindex").await;
    let backfill = wait_for_finished_run(&handle, "embedding_backfill").await;

    assert_eq!(reindex.last_run.unwrap().status, JobRunStatus::Completed);
    assert_eq!(backfill.last_run.unwrap().status, JobRunStatus::Completed);

    let current = indexer.engine.get_alias(ALIAS).await.unwrap();
    assert_eq!(current.len(), 1);
    let engine = indexer.engine.clone();
    let versions_left = move || {
        engine
            .index_names()
            .into_iter()
            .filter(|name| name.starts_with("app-keeps_"))
            .count()
    };
    wait_for("superseded versions to be deleted", || versions_left() == 1).await;
    assert_eq!(indexer.versions(), current);
    assert_eq!(indexer.engine.document_count(ALIAS), Some(2));
    assert!(indexer.engine.get_document(ALIAS, &keeps[0].id).is_some());
}
