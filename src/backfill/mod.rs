//! Backfill of missing keep embeddings.
//!
//! Every run looks for keeps lacking one of the target embeddings, computes
//! the missing vectors one field at a time and writes each one back as soon
//! as it is available. If anything was written the search index is rebuilt
//! so the new vectors become searchable.

use crate::embedding::Embedder;
use crate::metrics;
use crate::record_store::{EmbeddingField, RecordStore};
use crate::search::{IndexBuilder, RebuildError, RebuildReport};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum BackfillError {
    #[error("Failed to query keeps missing embeddings: {0:#}")]
    Query(anyhow::Error),

    /// The vectors were persisted but the index did not converge.
    #[error("Backfilled {updated} keeps but the index rebuild failed: {source}")]
    Rebuild {
        updated: usize,
        #[source]
        source: RebuildError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    /// Keeps that lacked at least one target field.
    pub candidates: usize,
    /// Keeps with at least one field written.
    pub updated: usize,
    pub fields_written: usize,
    pub fields_failed: usize,
    /// Fields whose source text is blank, nothing to embed.
    pub fields_skipped: usize,
    /// Present when a rebuild ran.
    pub rebuild: Option<RebuildReport>,
}

pub struct BackfillCoordinator {
    records: Arc<dyn RecordStore>,
    embedder: Arc<dyn Embedder>,
    builder: Arc<IndexBuilder>,
    fields: Vec<EmbeddingField>,
}

impl BackfillCoordinator {
    pub fn new(
        records: Arc<dyn RecordStore>,
        embedder: Arc<dyn Embedder>,
        builder: Arc<IndexBuilder>,
    ) -> Self {
        Self {
            records,
            embedder,
            builder,
            fields: EmbeddingField::ALL.to_vec(),
        }
    }

    /// Restrict the backfill to some of the embedding fields.
    pub fn with_fields(mut self, fields: &[EmbeddingField]) -> Self {
        self.fields = fields.to_vec();
        self
    }

    pub async fn run_backfill(&self, alias: &str) -> Result<BackfillReport, BackfillError> {
        let keeps = self
            .records
            .list_keeps_missing_embeddings(&self.fields)
            .map_err(BackfillError::Query)?;

        let mut report = BackfillReport {
            candidates: keeps.len(),
            ..Default::default()
        };
        if keeps.is_empty() {
            debug!("No keeps missing embeddings");
            return Ok(report);
        }
        info!("Backfilling embeddings for {} keeps", keeps.len());

        for keep in &keeps {
            let mut written = 0;
            for field in keep.missing_fields(&self.fields) {
                let text = keep.embedding_source(field);
                if text.trim().is_empty() {
                    report.fields_skipped += 1;
                    continue;
                }

                let vector = match self.embedder.embed(text).await {
                    Ok(vector) => vector,
                    Err(e) => {
                        warn!("Failed to embed {} of keep {}: {}", field, keep.id, e);
                        metrics::record_backfill_field(field.as_str(), "failure");
                        report.fields_failed += 1;
                        continue;
                    }
                };

                match self
                    .records
                    .set_keep_embedding(&keep.id, field, &vector, Utc::now())
                {
                    Ok(()) => {
                        metrics::record_backfill_field(field.as_str(), "success");
                        report.fields_written += 1;
                        written += 1;
                    }
                    Err(e) => {
                        warn!("Failed to store {} embedding of keep {}: {:#}", field, keep.id, e);
                        metrics::record_backfill_field(field.as_str(), "failure");
                        report.fields_failed += 1;
                    }
                }
            }
            if written > 0 {
                report.updated += 1;
            }
        }

        info!(
            "Backfill wrote {} fields on {} keeps ({} failed, {} skipped)",
            report.fields_written, report.updated, report.fields_failed, report.fields_skipped
        );

        if report.updated == 0 {
            return Ok(report);
        }

        let rebuild = self
            .builder
            .rebuild(alias)
            .await
            .map_err(|source| BackfillError::Rebuild {
                updated: report.updated,
                source,
            })?;
        report.rebuild = Some(rebuild);
        Ok(report)
    }
}
