use super::context::JobContext;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::future::Future;
use std::time::Duration;

/// Errors that can occur when dispatching or executing a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobError {
    NotFound,
    AlreadyRunning,
    PoolSaturated,
    SchedulerStopped,
    ExecutionFailed(String),
    Timeout(Duration),
    Panicked(String),
}

impl std::fmt::Display for JobError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobError::NotFound => write!(f, "Job not found"),
            JobError::AlreadyRunning => write!(f, "Job is already running"),
            JobError::PoolSaturated => write!(f, "Worker pool is saturated"),
            JobError::SchedulerStopped => write!(f, "Scheduler is stopped"),
            JobError::ExecutionFailed(msg) => write!(f, "Execution failed: {}", msg),
            JobError::Timeout(after) => write!(f, "Job timed out after {:?}", after),
            JobError::Panicked(msg) => write!(f, "Job panicked: {}", msg),
        }
    }
}

impl std::error::Error for JobError {}

impl From<anyhow::Error> for JobError {
    fn from(e: anyhow::Error) -> Self {
        JobError::ExecutionFailed(format!("{:#}", e))
    }
}

/// Trait for background jobs.
///
/// Jobs run as tokio tasks on the scheduler's worker pool. A job is never
/// executed concurrently with itself.
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    /// Unique name of this job.
    fn id(&self) -> &str;

    /// Description of what this job does.
    fn description(&self) -> &str {
        ""
    }

    /// Cron expression or `@every <duration>`, parsed at registration.
    fn schedule(&self) -> &str;

    /// Upper bound for one execution. `None` uses the scheduler default.
    fn timeout(&self) -> Option<Duration> {
        None
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError>;
}

type JobHandler = dyn Fn(JobContext) -> BoxFuture<'static, anyhow::Result<()>> + Send + Sync;

/// A job made of a name, a schedule and a closure.
pub struct FnJob {
    id: String,
    schedule: String,
    handler: Box<JobHandler>,
}

impl FnJob {
    pub fn new<F, Fut>(id: impl Into<String>, schedule: impl Into<String>, handler: F) -> Self
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        Self {
            id: id.into(),
            schedule: schedule.into(),
            handler: Box::new(move |ctx| Box::pin(handler(ctx))),
        }
    }
}

#[async_trait]
impl BackgroundJob for FnJob {
    fn id(&self) -> &str {
        &self.id
    }

    fn schedule(&self) -> &str {
        &self.schedule
    }

    async fn execute(&self, ctx: &JobContext) -> Result<(), JobError> {
        (self.handler)(ctx.clone()).await.map_err(JobError::from)
    }
}
