use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use color_eyre::eyre::{Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use super::DedupStore;

/// SQLite-backed dedup store. One file, one bucket per store handle.
pub struct SqliteStore {
    db: Arc<Mutex<Connection>>,
    bucket: String,
}

impl SqliteStore {
    /// Open (or create) the database file and hold it exclusively for the
    /// lifetime of the handle.
    pub fn open(path: &Path, bucket: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .wrap_err_with(|| format!("failed to create {}", parent.display()))?;
            }
        }

        let db = Connection::open(path)
            .wrap_err_with(|| format!("failed to open store {}", path.display()))?;
        let mode: String = db
            .query_row("PRAGMA locking_mode = EXCLUSIVE", [], |row| row.get(0))
            .wrap_err("failed to set exclusive locking mode")?;
        tracing::debug!(path = %path.display(), mode = %mode, "dedup store opened");

        Ok(Self::from_connection(db, bucket))
    }

    /// In-memory store (tests).
    pub fn in_memory(bucket: &str) -> Result<Self> {
        let db = Connection::open_in_memory().wrap_err("failed to open in-memory SQLite")?;
        Ok(Self::from_connection(db, bucket))
    }

    fn from_connection(db: Connection, bucket: &str) -> Self {
        Self {
            db: Arc::new(Mutex::new(db)),
            bucket: bucket.to_string(),
        }
    }

    pub fn bucket(&self) -> &str {
        &self.bucket
    }

    /// Number of non-empty records in this bucket.
    pub async fn count(&self) -> Result<usize> {
        let db = self.db.lock().await;
        if !table_exists(&db)? {
            return Ok(0);
        }
        let count: i64 = db
            .query_row(
                "SELECT COUNT(*) FROM records WHERE bucket = ?1 AND value <> ''",
                params![self.bucket],
                |row| row.get(0),
            )
            .wrap_err("failed to count records")?;
        Ok(count as usize)
    }
}

fn table_exists(db: &Connection) -> Result<bool> {
    let found: Option<String> = db
        .query_row(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name = 'records'",
            [],
            |row| row.get(0),
        )
        .optional()
        .wrap_err("failed to inspect store schema")?;
    Ok(found.is_some())
}

fn ensure_table(db: &Connection) -> Result<()> {
    db.execute_batch(
        "CREATE TABLE IF NOT EXISTS records (
            bucket    TEXT NOT NULL,
            key       TEXT NOT NULL,
            value     TEXT NOT NULL,
            stored_at TEXT NOT NULL,
            PRIMARY KEY (bucket, key)
        );",
    )
    .wrap_err("failed to create records table")
}

fn lookup(db: &Connection, bucket: &str, key: &str) -> Result<bool> {
    let value: Option<String> = db
        .query_row(
            "SELECT value FROM records WHERE bucket = ?1 AND key = ?2",
            params![bucket, key],
            |row| row.get(0),
        )
        .optional()
        .wrap_err("failed to read record")?;
    Ok(value.is_some_and(|v| !v.is_empty()))
}

fn upsert(db: &Connection, bucket: &str, key: &str, value: &str) -> Result<()> {
    db.execute(
        "INSERT INTO records (bucket, key, value, stored_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(bucket, key) DO UPDATE SET value = excluded.value, stored_at = excluded.stored_at",
        params![bucket, key, value, chrono::Utc::now().to_rfc3339()],
    )
    .wrap_err("failed to write record")?;
    Ok(())
}

#[async_trait]
impl DedupStore for SqliteStore {
    async fn exists(&self, key: &str) -> Result<bool> {
        let db = self.db.lock().await;
        if !table_exists(&db)? {
            return Ok(false);
        }
        lookup(&db, &self.bucket, key)
    }

    async fn put(&self, key: &str, value: &str) -> Result<()> {
        let db = self.db.lock().await;
        ensure_table(&db)?;
        upsert(&db, &self.bucket, key, value)
    }

    async fn insert_if_absent(&self, key: &str, value: &str) -> Result<bool> {
        let mut db = self.db.lock().await;
        ensure_table(&db)?;
        let tx = db.transaction().wrap_err("failed to begin transaction")?;
        if lookup(&tx, &self.bucket, key)? {
            return Ok(false);
        }
        upsert(&tx, &self.bucket, key, value)?;
        tx.commit().wrap_err("failed to commit record")?;
        Ok(true)
    }
}
