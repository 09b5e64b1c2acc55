//! Periodic full rebuild of the keeps search index.
//!
//! Builds a fresh versioned index from the record store and moves the alias
//! onto it, so the index converges even if incremental updates were lost.

use crate::background_jobs::{BackgroundJob, JobContext, JobError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::info;

pub const JOB_ID: &str = "search_reindex";

pub struct SearchReindexJob {
    schedule: String,
    timeout: Option<Duration>,
}

impl SearchReindexJob {
    pub fn new(schedule: impl Into<String>, timeout: Option<Duration>) -> Self {
        Self {
            schedule: schedule.into(),
            timeout,
        }
    }
}

#[async_trait]
impl BackgroundJob for SearchReindexJob {
    fn id(&self) -> &str {
        JOB_ID
    }

    fn description(&self) -> &str {
        "Rebuild the keeps search index and switch the alias to it"
    }

    fn schedule(&self) -> &str {
        &self.schedule
    }

    fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        let report = ctx
            .index_builder
            .rebuild(&ctx.alias)
            .await
            .map_err(|e| JobError::ExecutionFailed(e.to_string()))?;

        info!(
            "Reindexed {} keeps into {} ({} failed, {} skipped)",
            report.documents, report.index, report.failed, report.skipped
        );
        Ok(())
    }
}
