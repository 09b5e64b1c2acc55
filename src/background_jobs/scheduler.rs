use super::context::JobContext;
use super::handle::{JobInfo, JobRunInfo, JobRunStatus, JobScheduleInfo, SchedulerHandle};
use super::job::{BackgroundJob, FnJob, JobError};
use super::schedule::{JobSchedule, ScheduleParseError};
use super::worker_pool::{PoolRejection, WorkerPool};
use crate::metrics;
use chrono::{DateTime, Utc};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::{Mutex, Notify, OwnedMutexGuard, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Longest the scheduler loop sleeps without re-checking its jobs.
const MAX_SLEEP: Duration = Duration::from_secs(60);

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Job {0} is already registered")]
    DuplicateJob(String),

    #[error("Invalid schedule for job {job}: {source}")]
    InvalidSchedule {
        job: String,
        #[source]
        source: ScheduleParseError,
    },
}

pub(super) struct RegisteredJob {
    job: Arc<dyn BackgroundJob>,
    schedule: JobSchedule,
    /// Held for the whole execution; a tick that can't take it is skipped.
    lock: Arc<Mutex<()>>,
    next_run: Option<DateTime<Utc>>,
    pub(super) running: bool,
    last_run: Option<JobRunInfo>,
}

impl RegisteredJob {
    pub(super) fn info(&self, id: &str) -> JobInfo {
        JobInfo {
            id: id.to_string(),
            description: self.job.description().to_string(),
            schedule: JobScheduleInfo::from(&self.schedule),
            is_running: self.running,
            last_run: self.last_run.clone(),
            next_run_at: self.next_run,
        }
    }
}

/// Shared state between scheduler and handle.
#[derive(Default)]
pub(super) struct SharedJobState {
    pub(super) jobs: HashMap<String, RegisteredJob>,
}

pub(super) struct SchedulerCore {
    pub(super) state: RwLock<SharedJobState>,
    pool: WorkerPool,
    context: JobContext,
    default_timeout: Duration,
    /// Wakes the loop when the registry changes.
    wake: Notify,
    shutdown: CancellationToken,
    started: AtomicBool,
}

/// Runs registered jobs on their schedules.
///
/// Each job has its own lock, so at most one execution per job is in
/// progress; job bodies run on a bounded [`WorkerPool`].
pub struct JobScheduler {
    core: Arc<SchedulerCore>,
    loop_handle: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl JobScheduler {
    pub fn new(context: JobContext, pool_capacity: usize, default_timeout: Duration) -> Self {
        Self {
            core: Arc::new(SchedulerCore {
                state: RwLock::new(SharedJobState::default()),
                pool: WorkerPool::new(pool_capacity),
                context,
                default_timeout,
                wake: Notify::new(),
                shutdown: CancellationToken::new(),
                started: AtomicBool::new(false),
            }),
            loop_handle: std::sync::Mutex::new(None),
        }
    }

    pub fn handle(&self) -> SchedulerHandle {
        SchedulerHandle::new(Arc::clone(&self.core))
    }

    /// Register a closure as a job.
    pub async fn register<F, Fut>(
        &self,
        name: &str,
        schedule: &str,
        handler: F,
    ) -> Result<(), SchedulerError>
    where
        F: Fn(JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.register_job(Arc::new(FnJob::new(name, schedule, handler)))
            .await
    }

    /// Register a job with the scheduler.
    pub async fn register_job(&self, job: Arc<dyn BackgroundJob>) -> Result<(), SchedulerError> {
        let job_id = job.id().to_string();
        let mut state = self.core.state.write().await;
        if state.jobs.contains_key(&job_id) {
            return Err(SchedulerError::DuplicateJob(job_id));
        }
        let schedule =
            JobSchedule::parse(job.schedule()).map_err(|source| SchedulerError::InvalidSchedule {
                job: job_id.clone(),
                source,
            })?;

        info!(
            "Registering job: {} [{}] - {}",
            job_id,
            schedule,
            job.description()
        );
        let next_run = schedule.next_after(Utc::now());
        state.jobs.insert(
            job_id,
            RegisteredJob {
                job,
                schedule,
                lock: Arc::new(Mutex::new(())),
                next_run,
                running: false,
                last_run: None,
            },
        );
        drop(state);

        self.core.wake.notify_one();
        Ok(())
    }

    /// Get the number of registered jobs.
    pub async fn job_count(&self) -> usize {
        self.core.state.read().await.jobs.len()
    }

    /// Start firing schedules. Calling it again has no effect.
    pub fn start(&self) {
        if self.core.shutdown.is_cancelled() {
            warn!("Job scheduler was stopped and cannot be restarted");
            return;
        }
        if self.core.started.swap(true, Ordering::SeqCst) {
            debug!("Job scheduler already started");
            return;
        }
        let handle = tokio::spawn(Arc::clone(&self.core).run());
        *self.loop_handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Stop firing schedules and close the worker pool.
    ///
    /// Executions already in progress run to completion on their own.
    pub async fn stop(&self) {
        info!("Stopping job scheduler");
        self.core.shutdown.cancel();
        self.core.pool.close();

        let handle = self
            .loop_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            if let Err(e) = handle.await {
                error!("Scheduler loop ended abnormally: {}", e);
            }
        }
    }
}

impl SchedulerCore {
    /// Main scheduler loop.
    async fn run(self: Arc<Self>) {
        let job_count = self.state.read().await.jobs.len();
        info!("Starting job scheduler with {} registered jobs", job_count);

        loop {
            let sleep_duration = self.time_until_next_due().await;
            debug!(
                "Scheduler sleeping for {:?} until next scheduled job",
                sleep_duration
            );

            tokio::select! {
                _ = tokio::time::sleep(sleep_duration) => {
                    self.run_due_jobs().await;
                }
                _ = self.wake.notified() => {
                    debug!("Job registry changed");
                }
                _ = self.shutdown.cancelled() => {
                    info!("Scheduler received shutdown signal");
                    break;
                }
            }
        }

        info!("Job scheduler stopped");
    }

    async fn time_until_next_due(&self) -> Duration {
        let now = Utc::now();
        let state = self.state.read().await;
        let mut min_duration = MAX_SLEEP;
        for next_run in state.jobs.values().filter_map(|j| j.next_run) {
            if next_run <= now {
                return Duration::ZERO;
            }
            let duration = (next_run - now).to_std().unwrap_or(Duration::ZERO);
            min_duration = min_duration.min(duration);
        }
        min_duration
    }

    /// Fire every job whose next run is due. Missed ticks are not replayed:
    /// the next run is computed from now.
    async fn run_due_jobs(self: &Arc<Self>) {
        let now = Utc::now();
        let due: Vec<String> = {
            let mut state = self.state.write().await;
            state
                .jobs
                .iter_mut()
                .filter_map(|(job_id, job)| {
                    let next_run = job.next_run?;
                    if next_run > now {
                        return None;
                    }
                    job.next_run = job.schedule.next_after(now);
                    Some(job_id.clone())
                })
                .collect()
        };

        for job_id in due {
            // Refusals are logged and counted by dispatch
            let _ = self.dispatch(&job_id, "schedule").await;
        }
    }

    /// Start one execution of a job without waiting for it.
    pub(super) async fn dispatch(
        self: &Arc<Self>,
        job_id: &str,
        triggered_by: &str,
    ) -> Result<(), JobError> {
        if self.shutdown.is_cancelled() {
            return Err(JobError::SchedulerStopped);
        }

        let mut state = self.state.write().await;
        let entry = state.jobs.get_mut(job_id).ok_or(JobError::NotFound)?;

        let guard = match Arc::clone(&entry.lock).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                info!(
                    "Skipping job {} (triggered_by: {}): already running",
                    job_id, triggered_by
                );
                metrics::record_background_job_skipped(job_id);
                return Err(JobError::AlreadyRunning);
            }
        };

        let job = Arc::clone(&entry.job);
        let timeout = job.timeout().unwrap_or(self.default_timeout);
        let started_at = Utc::now();
        let task = Arc::clone(self).execute(
            job,
            guard,
            job_id.to_string(),
            triggered_by.to_string(),
            started_at,
            timeout,
        );

        match self.pool.try_spawn(task) {
            Ok(_) => {
                entry.running = true;
                entry.last_run = Some(JobRunInfo::running(started_at, triggered_by));
                Ok(())
            }
            Err(PoolRejection::Saturated) => {
                warn!(
                    "Cannot dispatch job {} (triggered_by: {}): worker pool is saturated ({} slots)",
                    job_id,
                    triggered_by,
                    self.pool.capacity()
                );
                metrics::record_background_job_dispatch_failure(job_id);
                Err(JobError::PoolSaturated)
            }
            Err(PoolRejection::Closed) => {
                warn!("Cannot dispatch job {}: scheduler is stopped", job_id);
                Err(JobError::SchedulerStopped)
            }
        }
    }

    /// Body of a worker task. The job lock is released when this returns.
    async fn execute(
        self: Arc<Self>,
        job: Arc<dyn BackgroundJob>,
        _guard: OwnedMutexGuard<()>,
        job_id: String,
        triggered_by: String,
        started_at: DateTime<Utc>,
        timeout: Duration,
    ) {
        info!("Starting job: {} (triggered_by: {})", job_id, triggered_by);
        metrics::set_background_job_running(&job_id, true);

        let ctx = self.context.clone();
        let start_time = Instant::now();
        // A nested task turns a panic into a JoinError instead of unwinding here
        let result = tokio::spawn(async move {
            match tokio::time::timeout(timeout, job.execute(&ctx)).await {
                Ok(result) => result,
                Err(_) => Err(JobError::Timeout(timeout)),
            }
        })
        .await;
        let elapsed = start_time.elapsed();

        let (status, error_msg, status_label) = match result {
            Ok(Ok(())) => {
                info!("Job {} completed successfully in {:?}", job_id, elapsed);
                (JobRunStatus::Completed, None, "success")
            }
            Ok(Err(e @ JobError::Timeout(_))) => {
                error!("Job {} timed out after {:?}", job_id, elapsed);
                (JobRunStatus::TimedOut, Some(e.to_string()), "timeout")
            }
            Ok(Err(e)) => {
                error!("Job {} failed after {:?}: {}", job_id, elapsed, e);
                (JobRunStatus::Failed, Some(e.to_string()), "failed")
            }
            Err(e) if e.is_panic() => {
                let e = JobError::Panicked(panic_message(e.into_panic()));
                error!("Job {} panicked after {:?}: {}", job_id, elapsed, e);
                (JobRunStatus::Panicked, Some(e.to_string()), "panic")
            }
            Err(e) => {
                error!("Job {} was aborted after {:?}: {}", job_id, elapsed, e);
                (
                    JobRunStatus::Failed,
                    Some(format!("Task aborted: {}", e)),
                    "failed",
                )
            }
        };

        // Record metrics
        metrics::record_background_job_execution(&job_id, status_label, elapsed);
        metrics::set_background_job_running(&job_id, false);

        let mut state = self.state.write().await;
        if let Some(entry) = state.jobs.get_mut(&job_id) {
            entry.running = false;
            entry.last_run = Some(JobRunInfo {
                started_at,
                finished_at: Some(Utc::now()),
                status,
                error_message: error_msg,
                triggered_by,
            });
        }
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
