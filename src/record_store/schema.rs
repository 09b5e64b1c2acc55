//! SQLite schema definitions for the keeps database.

use crate::sqlite_column;
use crate::sqlite_persistence::{Column, ForeignKey, SqlType, Table, VersionedSchema};

// =============================================================================
// Version 1 - Keeps and labels
// =============================================================================

const KEEPS_TABLE_V1: Table = Table {
    name: "keeps",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("content", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
        sqlite_column!("deleted_at", &SqlType::Integer),
    ],
    indices: &[("idx_keeps_deleted_at", "deleted_at")],
    unique_constraints: &[],
};

const KEEP_ID_FOREIGN_KEY: ForeignKey = ForeignKey {
    foreign_table: "keeps",
    foreign_column: "id",
    cascade_on_delete: true,
};

const KEEP_LABELS_TABLE_V1: Table = Table {
    name: "keep_labels",
    columns: &[
        sqlite_column!(
            "keep_id",
            &SqlType::Text,
            non_null = true,
            foreign_key = Some(&KEEP_ID_FOREIGN_KEY)
        ),
        sqlite_column!("label", &SqlType::Text, non_null = true),
    ],
    indices: &[("idx_keep_labels_keep_id", "keep_id")],
    unique_constraints: &[&["keep_id", "label"]],
};

// =============================================================================
// Version 2 - Embedding columns
// =============================================================================

const KEEPS_TABLE_V2: Table = Table {
    name: "keeps",
    columns: &[
        sqlite_column!("id", &SqlType::Text, is_primary_key = true),
        sqlite_column!("title", &SqlType::Text, non_null = true),
        sqlite_column!("content", &SqlType::Text, non_null = true),
        sqlite_column!("created_at", &SqlType::Integer, non_null = true),
        sqlite_column!("updated_at", &SqlType::Integer, non_null = true),
        sqlite_column!("deleted_at", &SqlType::Integer),
        // JSON arrays of f32
        sqlite_column!("title_embedding", &SqlType::Text),
        sqlite_column!("content_embedding", &SqlType::Text),
    ],
    indices: &[("idx_keeps_deleted_at", "deleted_at")],
    unique_constraints: &[],
};

fn migrate_v1_to_v2(conn: &rusqlite::Connection) -> anyhow::Result<()> {
    conn.execute("ALTER TABLE keeps ADD COLUMN title_embedding TEXT", [])?;
    conn.execute("ALTER TABLE keeps ADD COLUMN content_embedding TEXT", [])?;
    Ok(())
}

pub const KEEPS_VERSIONED_SCHEMAS: &[VersionedSchema] = &[
    VersionedSchema {
        version: 1,
        tables: &[KEEPS_TABLE_V1, KEEP_LABELS_TABLE_V1],
        migration: None,
    },
    VersionedSchema {
        version: 2,
        tables: &[KEEPS_TABLE_V2, KEEP_LABELS_TABLE_V1],
        migration: Some(migrate_v1_to_v2),
    },
];
