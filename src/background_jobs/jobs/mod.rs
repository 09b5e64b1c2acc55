//! Specific background job implementations.

pub mod embedding_backfill;
pub mod search_reindex;

pub use embedding_backfill::EmbeddingBackfillJob;
pub use search_reindex::SearchReindexJob;
