//! Zero-downtime rebuild of a keeps index.
//!
//! A rebuild writes every indexable keep into a brand new physical index and
//! only then repoints the alias, so readers keep querying the previous index
//! until the new one is complete. Superseded indices are removed afterwards by
//! a detached [`IndexJanitor`] task.

use super::alias_switcher::AliasSwitcher;
use super::bulk_writer::BulkWriter;
use super::document::{DocumentError, KeepDocument};
use super::engine::{SearchEngine, SearchError};
use super::index_version::IndexVersion;
use super::janitor::IndexJanitor;
use super::mapping;
use crate::config::SearchSettings;
use crate::metrics;
use crate::record_store::RecordStore;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use thiserror::Error;
use tracing::{error, info, warn};

type AliasLock = Arc<tokio::sync::Mutex<()>>;

pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

#[derive(Debug, Error)]
pub enum RebuildError {
    #[error("Failed to create index {index}: {source}")]
    CreateIndex {
        index: String,
        #[source]
        source: SearchError,
    },

    #[error("Failed to fetch keeps for {index}: {reason:#}")]
    FetchRecords { index: String, reason: anyhow::Error },

    #[error("Bulk indexing into {index} failed: {source}")]
    Bulk {
        index: String,
        #[source]
        source: SearchError,
    },

    /// The new index is complete but unreferenced; it is kept for diagnosis
    /// and removed by the next successful rebuild's cleanup.
    #[error("Failed to point alias {alias} to {index}: {source}")]
    AliasSwitch {
        alias: String,
        index: String,
        #[source]
        source: SearchError,
    },
}

/// Summary of a successful rebuild.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RebuildReport {
    /// Physical index the alias now points to.
    pub index: String,
    /// Documents sent to the engine.
    pub documents: usize,
    /// Documents the engine rejected individually.
    pub failed: usize,
    /// Keeps left out because no document could be built for them.
    pub skipped: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct IndexBuilderSettings {
    pub bulk_max_bytes: usize,
    pub bulk_max_items: usize,
    pub dimensions: usize,
}

impl From<&SearchSettings> for IndexBuilderSettings {
    fn from(settings: &SearchSettings) -> Self {
        Self {
            bulk_max_bytes: settings.bulk_max_bytes,
            bulk_max_items: settings.bulk_max_items,
            dimensions: settings.dimensions,
        }
    }
}

pub struct IndexBuilder {
    engine: Arc<dyn SearchEngine>,
    records: Arc<dyn RecordStore>,
    settings: IndexBuilderSettings,
    switcher: AliasSwitcher,
    janitor: IndexJanitor,
    clock: Clock,
    last_version: Mutex<Option<DateTime<Utc>>>,
    /// One writer per alias. Held from index creation until the alias is
    /// switched, so a cleanup can never see another rebuild's index mid-build.
    alias_locks: Mutex<HashMap<String, AliasLock>>,
}

impl IndexBuilder {
    pub fn new(
        engine: Arc<dyn SearchEngine>,
        records: Arc<dyn RecordStore>,
        settings: IndexBuilderSettings,
    ) -> Self {
        Self {
            switcher: AliasSwitcher::new(engine.clone()),
            janitor: IndexJanitor::new(engine.clone()),
            engine,
            records,
            settings,
            clock: Arc::new(Utc::now),
            last_version: Mutex::new(None),
            alias_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the source of index timestamps.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Build a fresh index for `alias` from all indexable keeps and switch
    /// the alias to it.
    ///
    /// Rebuilds of the same alias run one after the other; a caller arriving
    /// while another rebuild is in progress waits for it to finish.
    pub async fn rebuild(&self, alias: &str) -> Result<RebuildReport, RebuildError> {
        let lock = self.alias_lock(alias);
        let _guard = match lock.clone().try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                info!("Waiting for the running rebuild of {} to finish", alias);
                lock.lock_owned().await
            }
        };

        let result = self.rebuild_inner(alias).await;
        match &result {
            Ok(report) => {
                metrics::record_rebuild("success");
                info!(
                    "Rebuilt {} as {}: {} documents, {} failed, {} skipped",
                    alias, report.index, report.documents, report.failed, report.skipped
                );
            }
            Err(e) => {
                metrics::record_rebuild("failure");
                error!("Rebuild of {} failed: {}", alias, e);
            }
        }
        result
    }

    async fn rebuild_inner(&self, alias: &str) -> Result<RebuildReport, RebuildError> {
        let index = self.next_version(alias).name();
        info!("Creating index {} for alias {}", index, alias);

        self.engine
            .create_index(&index, &mapping::index_body(self.settings.dimensions))
            .await
            .map_err(|source| RebuildError::CreateIndex {
                index: index.clone(),
                source,
            })?;

        let keeps = match self.records.list_indexable_keeps() {
            Ok(keeps) => keeps,
            Err(reason) => {
                self.discard(&index).await;
                return Err(RebuildError::FetchRecords { index, reason });
            }
        };

        let mut writer = BulkWriter::new(
            self.engine.clone(),
            self.settings.bulk_max_bytes,
            self.settings.bulk_max_items,
        );
        let mut skipped = 0;
        for keep in &keeps {
            let queued = KeepDocument::from_keep(keep, self.settings.dimensions).and_then(|doc| {
                writer
                    .add_document(&index, &keep.id, &doc)
                    .map_err(DocumentError::from)
            });
            if let Err(e) = queued {
                warn!("Skipping keep {}: {}", keep.id, e);
                skipped += 1;
                continue;
            }
            if let Err(source) = writer.maybe_flush().await {
                self.discard(&index).await;
                return Err(RebuildError::Bulk { index, source });
            }
        }
        if let Err(source) = writer.flush().await {
            self.discard(&index).await;
            return Err(RebuildError::Bulk { index, source });
        }

        if let Err(e) = self.engine.refresh(&index).await {
            warn!("Failed to refresh {}, documents will show up later: {}", index, e);
        }

        self.switcher
            .switch(alias, &index)
            .await
            .map_err(|source| RebuildError::AliasSwitch {
                alias: alias.to_string(),
                index: index.clone(),
                source,
            })?;

        self.janitor.spawn_cleanup(alias, &index);

        let totals = writer.totals();
        Ok(RebuildReport {
            index,
            documents: totals.items,
            failed: totals.failed,
            skipped,
        })
    }

    fn alias_lock(&self, alias: &str) -> AliasLock {
        let mut locks = self.alias_locks.lock().unwrap_or_else(|e| e.into_inner());
        locks.entry(alias.to_string()).or_default().clone()
    }

    /// Timestamps only have second resolution, two rebuilds within the same
    /// second get consecutive seconds.
    fn next_version(&self, alias: &str) -> IndexVersion {
        let now = (self.clock)();
        // Truncate to what the name can represent
        let now = DateTime::from_timestamp(now.timestamp(), 0).unwrap_or(now);

        let mut last = self.last_version.lock().unwrap_or_else(|e| e.into_inner());
        let at = match *last {
            Some(previous) if now <= previous => previous + ChronoDuration::seconds(1),
            _ => now,
        };
        *last = Some(at);
        IndexVersion::new(alias, at)
    }

    async fn discard(&self, index: &str) {
        match self
            .engine
            .delete_indices(&[index.to_string()], true)
            .await
        {
            Ok(()) => info!("Deleted partially built index {}", index),
            Err(e) => error!("Failed to delete partially built index {}: {}", index, e),
        }
    }
}
