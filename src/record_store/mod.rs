//! Entity storage for keeps, the source records of the search index.

mod models;
mod schema;
mod sqlite_record_store;

pub use models::*;
pub use schema::KEEPS_VERSIONED_SCHEMAS;
pub use sqlite_record_store::SqliteRecordStore;

use anyhow::Result;
use chrono::{DateTime, Utc};

pub trait RecordStore: Send + Sync {
    /// All keeps eligible for indexing (not soft-deleted), labels included.
    fn list_indexable_keeps(&self) -> Result<Vec<Keep>>;

    /// Indexable keeps that lack at least one of the given derived fields.
    fn list_keeps_missing_embeddings(&self, fields: &[EmbeddingField]) -> Result<Vec<Keep>>;

    /// Write a single derived field and bump the keep's `updated_at`.
    fn set_keep_embedding(
        &self,
        keep_id: &str,
        field: EmbeddingField,
        vector: &[f32],
        updated_at: DateTime<Utc>,
    ) -> Result<()>;

    fn insert_keep(&self, keep: &NewKeep) -> Result<Keep>;

    /// Returns false if no live keep had the given id.
    fn soft_delete_keep(&self, keep_id: &str) -> Result<bool>;
}
