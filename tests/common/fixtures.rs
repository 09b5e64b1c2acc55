//! Test fixture creation for the record store and the search pipeline

#![allow(dead_code)]

use super::constants::*;
use chrono::{DateTime, TimeZone, Utc};
use keeps_indexer::record_store::{Keep, NewKeep, RecordStore, SqliteRecordStore};
use keeps_indexer::search::{Clock, IndexBuilder, IndexBuilderSettings, InMemorySearchEngine};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// A file-backed record store, an in-memory search engine and an index
/// builder wired to both.
pub struct TestIndexer {
    pub store: Arc<SqliteRecordStore>,
    pub engine: Arc<InMemorySearchEngine>,
    pub builder: Arc<IndexBuilder>,
    // Keeps the database file alive
    _dir: TempDir,
}

impl TestIndexer {
    pub fn new() -> Self {
        Self::build(None)
    }

    /// Index names are derived from `clock` instead of the wall clock.
    pub fn with_clock(clock: Clock) -> Self {
        Self::build(Some(clock))
    }

    fn build(clock: Option<Clock>) -> Self {
        let dir = TempDir::new().expect("Failed to create temp dir");
        let store = Arc::new(
            SqliteRecordStore::new(dir.path().join("keeps.db")).expect("Failed to open store"),
        );
        let engine = Arc::new(InMemorySearchEngine::new());
        let mut builder = IndexBuilder::new(
            engine.clone(),
            store.clone(),
            IndexBuilderSettings {
                bulk_max_bytes: 64 * 1024,
                bulk_max_items: 2,
                dimensions: DIMENSIONS,
            },
        );
        if let Some(clock) = clock {
            builder = builder.with_clock(clock);
        }
        Self {
            store,
            engine,
            builder: Arc::new(builder),
            _dir: dir,
        }
    }

    /// Insert one keep per `(title, content)` pair.
    pub fn insert_keeps(&self, keeps: &[(&str, &str)]) -> Vec<Keep> {
        keeps
            .iter()
            .map(|(title, content)| {
                self.store
                    .insert_keep(&NewKeep {
                        title: title.to_string(),
                        content: content.to_string(),
                        labels: vec!["test".to_string()],
                    })
                    .expect("Failed to insert keep")
            })
            .collect()
    }

    /// Physical indices that are versions of [`ALIAS`].
    pub fn versions(&self) -> Vec<String> {
        self.engine
            .index_names()
            .into_iter()
            .filter(|name| name.starts_with(&format!("{}_", ALIAS)))
            .collect()
    }
}

pub fn fixed_clock(at: DateTime<Utc>) -> Clock {
    Arc::new(move || at)
}

/// 2024-01-02 00:00:00 UTC
pub fn rebuild_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap()
}

/// Poll `condition` until it holds, panicking after a few seconds.
pub async fn wait_for<F>(what: &str, mut condition: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..300 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Timed out waiting for {}", what);
}
