use crate::embedding::Embedder;
use crate::record_store::RecordStore;
use crate::search::{IndexBuilder, SearchEngine};
use std::sync::Arc;

/// Context provided to jobs during execution.
///
/// Holds the shared service handles jobs reach their collaborators through.
#[derive(Clone)]
pub struct JobContext {
    /// Source records.
    pub record_store: Arc<dyn RecordStore>,

    pub search_engine: Arc<dyn SearchEngine>,

    /// Rebuild pipeline bound to `search_engine` and `record_store`.
    pub index_builder: Arc<IndexBuilder>,

    /// `None` when no embedding service is configured.
    pub embedder: Option<Arc<dyn Embedder>>,

    /// Alias readers query.
    pub alias: String,
}

impl JobContext {
    /// Create a new job context with the given dependencies.
    pub fn new(
        record_store: Arc<dyn RecordStore>,
        search_engine: Arc<dyn SearchEngine>,
        index_builder: Arc<IndexBuilder>,
        embedder: Option<Arc<dyn Embedder>>,
        alias: impl Into<String>,
    ) -> Self {
        Self {
            record_store,
            search_engine,
            index_builder,
            embedder,
            alias: alias.into(),
        }
    }

    #[cfg(test)]
    pub(crate) fn for_tests() -> Self {
        use crate::record_store::SqliteRecordStore;
        use crate::search::{IndexBuilderSettings, InMemorySearchEngine};

        let record_store: Arc<dyn RecordStore> =
            Arc::new(SqliteRecordStore::in_memory().expect("in-memory store"));
        let search_engine: Arc<dyn SearchEngine> = Arc::new(InMemorySearchEngine::new());
        let index_builder = Arc::new(IndexBuilder::new(
            search_engine.clone(),
            record_store.clone(),
            IndexBuilderSettings {
                bulk_max_bytes: 1024 * 1024,
                bulk_max_items: 100,
                dimensions: 3,
            },
        ));
        Self::new(record_store, search_engine, index_builder, None, "test-keeps")
    }
}
