use super::job::JobError;
use super::schedule::JobSchedule;
use super::scheduler::SchedulerCore;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Information about a registered job.
#[derive(Debug, Clone, Serialize)]
pub struct JobInfo {
    pub id: String,
    pub description: String,
    pub schedule: JobScheduleInfo,
    pub is_running: bool,
    pub last_run: Option<JobRunInfo>,
    pub next_run_at: Option<DateTime<Utc>>,
}

/// Serializable schedule information.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobScheduleInfo {
    #[serde(rename = "type")]
    pub schedule_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,
}

impl From<&JobSchedule> for JobScheduleInfo {
    fn from(schedule: &JobSchedule) -> Self {
        match schedule {
            JobSchedule::Cron { expr, .. } => JobScheduleInfo {
                schedule_type: "cron".to_string(),
                cron: Some(expr.clone()),
                interval_ms: None,
            },
            JobSchedule::Interval(duration) => JobScheduleInfo {
                schedule_type: "interval".to_string(),
                interval_ms: Some(duration.as_millis() as u64),
                cron: None,
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum JobRunStatus {
    Running,
    Completed,
    Failed,
    TimedOut,
    Panicked,
}

impl JobRunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobRunStatus::Running => "running",
            JobRunStatus::Completed => "completed",
            JobRunStatus::Failed => "failed",
            JobRunStatus::TimedOut => "timed_out",
            JobRunStatus::Panicked => "panicked",
        }
    }
}

/// Serializable job run information. Only the latest run of each job is
/// kept, in memory.
#[derive(Debug, Clone, Serialize)]
pub struct JobRunInfo {
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub status: JobRunStatus,
    pub error_message: Option<String>,
    pub triggered_by: String,
}

impl JobRunInfo {
    pub(super) fn running(started_at: DateTime<Utc>, triggered_by: &str) -> Self {
        Self {
            started_at,
            finished_at: None,
            status: JobRunStatus::Running,
            error_message: None,
            triggered_by: triggered_by.to_string(),
        }
    }
}

/// Handle to inspect and trigger jobs from outside the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    core: Arc<SchedulerCore>,
}

impl SchedulerHandle {
    pub(super) fn new(core: Arc<SchedulerCore>) -> Self {
        Self { core }
    }

    /// Get information about all registered jobs.
    pub async fn list_jobs(&self) -> Vec<JobInfo> {
        let state = self.core.state.read().await;
        let mut jobs: Vec<JobInfo> = state
            .jobs
            .iter()
            .map(|(id, job)| job.info(id))
            .collect();

        // Sort by job ID for consistent ordering
        jobs.sort_by(|a, b| a.id.cmp(&b.id));
        jobs
    }

    /// Get information about a specific job.
    pub async fn get_job(&self, job_id: &str) -> Option<JobInfo> {
        let state = self.core.state.read().await;
        state.jobs.get(job_id).map(|job| job.info(job_id))
    }

    /// Run a job now, outside its schedule.
    ///
    /// Goes through the same lock and worker pool as scheduled runs, so it
    /// fails with `AlreadyRunning` or `PoolSaturated` instead of waiting.
    pub async fn trigger_job(&self, job_id: &str) -> Result<(), JobError> {
        self.core.dispatch(job_id, "manual").await
    }

    /// Check if a job is currently running.
    pub async fn is_job_running(&self, job_id: &str) -> bool {
        let state = self.core.state.read().await;
        state.jobs.get(job_id).map(|j| j.running).unwrap_or(false)
    }

    /// Check if a job with the given ID exists.
    pub async fn job_exists(&self, job_id: &str) -> bool {
        let state = self.core.state.read().await;
        state.jobs.contains_key(job_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_job_schedule_info_from_cron() {
        let schedule = JobSchedule::parse("0 0 3 * * *").unwrap();
        let info = JobScheduleInfo::from(&schedule);

        assert_eq!(info.schedule_type, "cron");
        assert_eq!(info.cron, Some("0 0 3 * * *".to_string()));
        assert!(info.interval_ms.is_none());
    }

    #[test]
    fn test_job_schedule_info_from_interval() {
        let schedule = JobSchedule::Interval(Duration::from_secs(3600));
        let info = JobScheduleInfo::from(&schedule);

        assert_eq!(info.schedule_type, "interval");
        assert_eq!(info.interval_ms, Some(3_600_000));
        assert!(info.cron.is_none());
    }

    #[test]
    fn test_job_run_info_serialization() {
        let run = JobRunInfo {
            finished_at: Some(Utc::now()),
            status: JobRunStatus::TimedOut,
            error_message: Some("Job timed out after 1s".to_string()),
            ..JobRunInfo::running(Utc::now(), "schedule")
        };

        let json = serde_json::to_value(&run).unwrap();
        assert_eq!(json["status"], "timed_out");
        assert_eq!(json["triggered_by"], "schedule");
        // Should be RFC3339 format
        assert!(json["started_at"].as_str().unwrap().contains('T'));
        assert_eq!(run.status.as_str(), "timed_out");
    }
}
