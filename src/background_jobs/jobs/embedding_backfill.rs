//! Embedding backfill job.
//!
//! Computes the vectors missing on stored keeps, then rebuilds the search
//! index when at least one keep changed.

use crate::backfill::BackfillCoordinator;
use crate::background_jobs::{BackgroundJob, JobContext, JobError};
use crate::record_store::EmbeddingField;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

pub const JOB_ID: &str = "embedding_backfill";

pub struct EmbeddingBackfillJob {
    schedule: String,
    timeout: Option<Duration>,
    fields: Vec<EmbeddingField>,
}

impl EmbeddingBackfillJob {
    pub fn new(schedule: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            schedule: schedule.into(),
            timeout,
            fields: EmbeddingField::ALL.to_vec(),
        }
    }

    pub fn with_fields(mut self, fields: &[EmbeddingField]) -> Self {
        self.fields = fields.to_vec();
        self
    }
}

#[async_trait]
impl BackgroundJob for EmbeddingBackfillJob {
    fn id(&self) -> &str {
        JOB_ID
    }

    fn description(&self) -> &str {
        "Compute missing keep embeddings and reindex"
    }

    fn schedule(&self) -> &str {
        &self.schedule
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let embedder = ctx.embedder.clone().ok_or_else(|| {
            JobError::ExecutionFailed("No embedding service configured".to_string())
        })?;

        let coordinator = BackfillCoordinator::new(
            Arc::clone(&ctx.record_store),
            embedder,
            Arc::clone(&ctx.index_builder),
        )
        .with_fields(&self.fields);

        let report = coordinator
            .run_backfill(&ctx.alias)
            .await
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        if let Some(rebuild) = &report.rebuild {
            info!(
                "Backfill updated {} of {} keeps, reindexed into {}",
                report.updated, report.candidates, rebuild.index
            );
        }
        Ok(())
    }
}
