//! SQLite-backed key/value store.
//!
//! Keeps the export history on disk. Several namespaces can share one
//! database file; quotas are enforced per namespace.

use std::path::Path;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use tokio::sync::Mutex;

use crate::domain::{AppError, Result};

use super::store::{check_quota, entry_size, KeyValueStore};

/// Namespace used for export history data.
pub const HISTORY_NAMESPACE: &str = "chat_exports";

/// Key/value store persisted in SQLite.
pub struct SqliteStore {
    conn: Mutex<Connection>,
    namespace: String,
    quota_bytes: Option<u64>,
}

impl SqliteStore {
    /// Opens or creates the store database.
    ///
    /// # Errors
    /// Returns error if database cannot be opened or schema creation fails.
    pub fn open(path: &Path, namespace: impl Into<String>, quota_bytes: Option<u64>) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| AppError::io("Failed to create storage directory", e))?;
        }

        let conn = Connection::open(path).map_err(AppError::database)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )
        .map_err(AppError::database)?;

        Self::init_schema(&conn)?;

        tracing::debug!(path = %path.display(), "Opened history store");

        Ok(Self {
            conn: Mutex::new(conn),
            namespace: namespace.into(),
            quota_bytes,
        })
    }

    /// Initialize database schema.
    fn init_schema(conn: &Connection) -> Result<()> {
        conn.execute_batch(
            r"
            CREATE TABLE IF NOT EXISTS kv_store (
                namespace TEXT NOT NULL,
                key TEXT NOT NULL,
                value TEXT NOT NULL,
                updated_at TEXT NOT NULL DEFAULT (datetime('now')),
                PRIMARY KEY (namespace, key)
            );
            ",
        )
        .map_err(AppError::database)?;

        Ok(())
    }

    fn usage(conn: &Connection, namespace: &str) -> Result<u64> {
        conn.query_row(
            r"
            SELECT COALESCE(SUM(length(CAST(key AS BLOB)) + length(CAST(value AS BLOB))), 0)
            FROM kv_store WHERE namespace = ?1
            ",
            [namespace],
            |row| row.get::<_, i64>(0),
        )
        .map(|bytes| u64::try_from(bytes).unwrap_or_default())
        .map_err(AppError::database)
    }
}

#[async_trait]
impl KeyValueStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        conn.query_row(
            "SELECT value FROM kv_store WHERE namespace = ?1 AND key = ?2",
            params![&self.namespace, key],
            |row| row.get(0),
        )
        .optional()
        .map_err(AppError::database)
    }

    async fn set(&self, key: &str, value: String) -> Result<()> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(AppError::database)?;

        if self.quota_bytes.is_some() {
            let current = Self::usage(&tx, &self.namespace)?;
            let replaced = tx
                .query_row(
                    "SELECT value FROM kv_store WHERE namespace = ?1 AND key = ?2",
                    params![&self.namespace, key],
                    |row| row.get::<_, String>(0),
                )
                .optional()
                .map_err(AppError::database)?
                .map_or(0, |old| entry_size(key, &old));
            check_quota(key, &value, current, replaced, self.quota_bytes)?;
        }

        tx.execute(
            r"
            INSERT INTO kv_store (namespace, key, value)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(namespace, key) DO UPDATE SET
                value = excluded.value,
                updated_at = datetime('now')
            ",
            params![&self.namespace, key, &value],
        )
        .map_err(AppError::database)?;

        tx.commit().map_err(AppError::database)
    }

    async fn remove(&self, key: &str) -> Result<()> {
        let conn = self.conn.lock().await;
        conn.execute(
            "DELETE FROM kv_store WHERE namespace = ?1 AND key = ?2",
            params![&self.namespace, key],
        )
        .map_err(AppError::database)?;
        Ok(())
    }

    async fn bytes_in_use(&self) -> Result<u64> {
        let conn = self.conn.lock().await;
        Self::usage(&conn, &self.namespace)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_open_creates_schema() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("nested/history.db"), "ns", None).unwrap();

        let count: i64 = store
            .conn
            .lock()
            .await
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='kv_store'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_roundtrip_and_namespaces() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.db");
        let a = SqliteStore::open(&path, "a", None).unwrap();
        let b = SqliteStore::open(&path, "b", None).unwrap();

        a.set("key", "value-a".into()).await.unwrap();
        b.set("key", "value-b".into()).await.unwrap();
        a.set("key", "value-a2".into()).await.unwrap();

        assert_eq!(a.get("key").await.unwrap().as_deref(), Some("value-a2"));
        assert_eq!(b.get("key").await.unwrap().as_deref(), Some("value-b"));
        assert_eq!(a.bytes_in_use().await.unwrap(), 3 + 8);

        a.remove("key").await.unwrap();
        a.remove("key").await.unwrap();
        assert!(a.get("key").await.unwrap().is_none());
        assert!(b.get("key").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_quota_is_enforced() {
        let dir = tempdir().unwrap();
        let store = SqliteStore::open(&dir.path().join("q.db"), HISTORY_NAMESPACE, Some(16)).unwrap();

        store.set("k", "0123456789".into()).await.unwrap();
        let err = store.set("other", "0123456789".into()).await.unwrap_err();
        assert!(matches!(err, AppError::StorageQuota { .. }));
        assert!(store.get("other").await.unwrap().is_none());
    }
}
