//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.
//!
//! # Example
//!
//! ```no_run
//! mod common;
//! use common::{TestIndexer, ALIAS};
//!
//! #[tokio::test]
//! async fn test_rebuild() {
//!     let indexer = TestIndexer::new();
//!     indexer.insert_keeps(&[("title", "content")]);
//!     let report = indexer.builder.rebuild(ALIAS).await.unwrap();
//!     assert_eq!(report.documents, 1);
//! }
//! ```

mod constants;
mod fakes;
mod fixtures;

pub use constants::*;
pub use fakes::FakeEmbedder;
pub use fixtures::{fixed_clock, rebuild_time, wait_for, TestIndexer};
