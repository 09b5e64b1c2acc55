mod alias_switcher;
mod bulk_writer;
mod document;
mod engine;
mod factory;
mod http_engine;
mod index_builder;
mod index_version;
mod janitor;
pub mod mapping;
mod memory_engine;

pub use alias_switcher::AliasSwitcher;
pub use bulk_writer::{BulkFlushOutcome, BulkWriter};
pub use document::{DocumentError, KeepDocument};
pub use engine::*;
pub use factory::create_search_engine;
pub use http_engine::{BasicAuth, HttpSearchEngine};
pub use index_builder::{Clock, IndexBuilder, IndexBuilderSettings, RebuildError, RebuildReport};
pub use index_version::IndexVersion;
pub use janitor::IndexJanitor;
pub use memory_engine::{EngineOp, InMemorySearchEngine};
