//! Background job scheduling and execution system.
//!
//! Jobs are registered with a cron expression or an `@every <duration>`
//! interval. The scheduler fires them on a bounded worker pool, never lets a
//! job overlap with itself and keeps the outcome of each job's latest run.

mod context;
mod handle;
mod job;
pub mod jobs;
mod schedule;
mod scheduler;
mod worker_pool;

pub use context::JobContext;
pub use handle::{JobInfo, JobRunInfo, JobRunStatus, JobScheduleInfo, SchedulerHandle};
pub use job::{BackgroundJob, FnJob, JobError};
pub use schedule::{JobSchedule, ScheduleParseError};
pub use scheduler::{JobScheduler, SchedulerError};
pub use worker_pool::{PoolRejection, WorkerPool};
