//! Keeps Indexer Library
//!
//! This library exposes the internal modules for testing and potential reuse.

pub mod backfill;
pub mod background_jobs;
pub mod config;
pub mod embedding;
pub mod metrics;
pub mod record_store;
pub mod search;
pub mod sqlite_persistence;

// Re-export commonly used types for convenience
pub use backfill::{BackfillCoordinator, BackfillError, BackfillReport};
pub use background_jobs::{JobContext, JobScheduler, SchedulerHandle};
pub use record_store::{RecordStore, SqliteRecordStore};
pub use search::{IndexBuilder, SearchEngine};
