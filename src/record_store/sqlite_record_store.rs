use super::models::{EmbeddingField, Keep, NewKeep};
use super::schema::KEEPS_VERSIONED_SCHEMAS;
use super::RecordStore;
use crate::sqlite_persistence::BASE_DB_VERSION;
use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tracing::info;

const KEEP_COLUMNS: &str =
    "id, title, content, created_at, updated_at, title_embedding, content_embedding";

pub struct SqliteRecordStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let is_new_db = !path.exists();

        let mut conn = Connection::open(path).context("Failed to open keeps database")?;
        conn.execute("PRAGMA foreign_keys = ON;", [])?;

        let latest = KEEPS_VERSIONED_SCHEMAS
            .last()
            .context("No keeps schema defined")?;

        if is_new_db {
            info!("Creating new keeps database at {:?}", path);
            latest.create(&conn)?;
        } else {
            let raw_version: i64 = conn.query_row("PRAGMA user_version;", [], |row| row.get(0))?;
            let db_version = raw_version - BASE_DB_VERSION as i64;
            if db_version < 1 {
                anyhow::bail!(
                    "Keeps database version {} is invalid (expected >= 1)",
                    db_version
                );
            }

            let schema = KEEPS_VERSIONED_SCHEMAS
                .iter()
                .find(|s| s.version == db_version as usize)
                .with_context(|| format!("Unknown keeps database version {}", db_version))?;
            schema.validate(&conn).with_context(|| {
                format!(
                    "Keeps database schema validation failed for version {}",
                    db_version
                )
            })?;

            if (db_version as usize) < latest.version {
                info!(
                    "Migrating keeps database from version {} to {}",
                    db_version, latest.version
                );
                Self::migrate(&mut conn, db_version as usize)?;
            }
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open a throwaway database, for tests and the memory search backend.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        KEEPS_VERSIONED_SCHEMAS
            .last()
            .context("No keeps schema defined")?
            .create(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn migrate(conn: &mut Connection, from_version: usize) -> Result<()> {
        let tx = conn.transaction()?;
        let mut latest_from = from_version;
        for schema in KEEPS_VERSIONED_SCHEMAS
            .iter()
            .filter(|s| s.version > from_version)
        {
            if let Some(migration_fn) = schema.migration {
                migration_fn(&tx).with_context(|| {
                    format!("Failed to run migration to version {}", schema.version)
                })?;
            }
            latest_from = schema.version;
        }
        tx.execute(
            &format!("PRAGMA user_version = {}", BASE_DB_VERSION + latest_from),
            [],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("Keeps database mutex poisoned"))
    }

    fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(ts, 0).single().unwrap_or_default()
    }

    fn parse_vector(raw: Option<String>) -> Option<Vec<f32>> {
        raw.and_then(|s| serde_json::from_str(&s).ok())
    }

    fn row_to_keep(row: &rusqlite::Row) -> rusqlite::Result<Keep> {
        Ok(Keep {
            id: row.get("id")?,
            title: row.get("title")?,
            content: row.get("content")?,
            labels: Vec::new(),
            created_at: Self::timestamp_to_datetime(row.get("created_at")?),
            updated_at: Self::timestamp_to_datetime(row.get("updated_at")?),
            title_embedding: Self::parse_vector(row.get("title_embedding")?),
            content_embedding: Self::parse_vector(row.get("content_embedding")?),
        })
    }

    fn query_keeps(conn: &Connection, where_clause: &str) -> Result<Vec<Keep>> {
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM keeps WHERE {} ORDER BY created_at, id",
            KEEP_COLUMNS, where_clause
        ))?;
        let mut keeps = stmt
            .query_map([], Self::row_to_keep)?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        // Eager-load labels in one pass instead of one query per keep
        let mut labels_stmt = conn.prepare(
            "SELECT l.keep_id, l.label FROM keep_labels l
             JOIN keeps k ON k.id = l.keep_id
             WHERE k.deleted_at IS NULL ORDER BY l.label",
        )?;
        let mut labels: HashMap<String, Vec<String>> = HashMap::new();
        let rows = labels_stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;
        for row in rows {
            let (keep_id, label) = row?;
            labels.entry(keep_id).or_default().push(label);
        }
        for keep in &mut keeps {
            if let Some(keep_labels) = labels.remove(&keep.id) {
                keep.labels = keep_labels;
            }
        }
        Ok(keeps)
    }
}

impl RecordStore for SqliteRecordStore {
    fn list_indexable_keeps(&self) -> Result<Vec<Keep>> {
        let conn = self.lock()?;
        Self::query_keeps(&conn, "deleted_at IS NULL")
    }

    fn list_keeps_missing_embeddings(&self, fields: &[EmbeddingField]) -> Result<Vec<Keep>> {
        if fields.is_empty() {
            return Ok(Vec::new());
        }
        let missing = fields
            .iter()
            .map(|f| format!("{} IS NULL", f.column()))
            .collect::<Vec<_>>()
            .join(" OR ");
        let conn = self.lock()?;
        Self::query_keeps(&conn, &format!("deleted_at IS NULL AND ({})", missing))
    }

    fn set_keep_embedding(
        &self,
        keep_id: &str,
        field: EmbeddingField,
        vector: &[f32],
        updated_at: DateTime<Utc>,
    ) -> Result<()> {
        // JSON has no NaN or infinity, such a vector would read back as missing
        if let Some(position) = vector.iter().position(|v| !v.is_finite()) {
            anyhow::bail!(
                "Embedding for keep {} has a non-finite value at position {}",
                keep_id,
                position
            );
        }
        let encoded = serde_json::to_string(vector).context("Failed to encode embedding")?;
        let conn = self.lock()?;
        let changed = conn.execute(
            &format!(
                "UPDATE keeps SET {} = ?1, updated_at = ?2 WHERE id = ?3",
                field.column()
            ),
            params![encoded, updated_at.timestamp(), keep_id],
        )?;
        if changed == 0 {
            anyhow::bail!("Keep {} not found", keep_id);
        }
        Ok(())
    }

    fn insert_keep(&self, keep: &NewKeep) -> Result<Keep> {
        let now = Utc::now();
        let id = uuid::Uuid::new_v4().to_string();

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO keeps (id, title, content, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            params![id, keep.title, keep.content, now.timestamp()],
        )?;
        for label in &keep.labels {
            tx.execute(
                "INSERT OR IGNORE INTO keep_labels (keep_id, label) VALUES (?1, ?2)",
                params![id, label],
            )?;
        }
        tx.commit()?;

        let mut labels = keep.labels.clone();
        labels.sort();
        labels.dedup();
        Ok(Keep {
            id,
            title: keep.title.clone(),
            content: keep.content.clone(),
            labels,
            created_at: Self::timestamp_to_datetime(now.timestamp()),
            updated_at: Self::timestamp_to_datetime(now.timestamp()),
            title_embedding: None,
            content_embedding: None,
        })
    }

    fn soft_delete_keep(&self, keep_id: &str) -> Result<bool> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE keeps SET deleted_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            params![Utc::now().timestamp(), keep_id],
        )?;
        Ok(changed > 0)
    }
}
