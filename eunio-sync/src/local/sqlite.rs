//! Local SQLite store for offline-first operations
//!
//! Provides:
//! - One table per collection keyed by `(user_id, id)`
//! - A `sync_status` column driving the pending-sync queue
//! - Tombstones for deletes that still have to reach the remote store
//! - Secure deletion so purged health data is overwritten on disk

use super::LocalStore;
use crate::error::{SyncError, SyncResult};
use crate::models::{Collection, Document, LocalEntry, RecordKey, SyncStatus};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use logger_redacted::correlation_id;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;

/// Configuration for the local database
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalDbConfig {
    /// Path to the database file
    pub db_path: String,
    /// Maximum number of connections in the pool
    pub max_connections: u32,
    /// Whether to enable WAL mode
    pub enable_wal: bool,
    /// Whether to enable secure deletion (overwrites freed pages)
    pub enable_secure_delete: bool,
    /// Create the database file when it does not exist
    pub create_if_missing: bool,
}

impl Default for LocalDbConfig {
    fn default() -> Self {
        Self {
            db_path: "eunio_local.db".to_string(),
            max_connections: 5,
            enable_wal: true,
            enable_secure_delete: true,
            create_if_missing: true,
        }
    }
}

fn table(collection: Collection) -> &'static str {
    collection.as_str()
}

fn encode_time(at: DateTime<Utc>) -> String {
    // Fixed width keeps lexical order equal to time order
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

fn decode_time(raw: &str) -> SyncResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SyncError::DataSync(format!("Invalid timestamp {}: {}", raw, e)))
}

fn entry_from_row(collection: Collection, row: &SqliteRow) -> SyncResult<LocalEntry> {
    let fields: String = row.try_get("fields")?;
    let last_modified: String = row.try_get("last_modified")?;
    let version: i64 = row.try_get("v")?;
    let sync_status: String = row.try_get("sync_status")?;
    let updated_at: String = row.try_get("updated_at")?;

    Ok(LocalEntry {
        document: Document {
            collection,
            user_id: row.try_get("user_id")?,
            id: row.try_get("id")?,
            last_modified: decode_time(&last_modified)?,
            version: u32::try_from(version)
                .map_err(|_| SyncError::DataSync(format!("Invalid schema version: {}", version)))?,
            manual: row.try_get("manual")?,
            fields: serde_json::from_str(&fields)
                .map_err(|e| SyncError::DataSync(format!("Corrupt record payload: {}", e)))?,
        },
        sync_status: SyncStatus::from_str(&sync_status)?,
        deleted: row.try_get("deleted")?,
        updated_at: decode_time(&updated_at)?,
    })
}

/// SQLite-backed local store
pub struct SqliteLocalStore {
    pool: SqlitePool,
}

impl SqliteLocalStore {
    /// Open (and if needed create) the database and its schema
    pub async fn new(config: LocalDbConfig) -> SyncResult<Self> {
        let mut options = SqliteConnectOptions::from_str(&format!("sqlite:{}", config.db_path))?
            .create_if_missing(config.create_if_missing)
            .foreign_keys(true);

        // Better concurrency between the UI reads and the sync writer
        if config.enable_wal {
            options = options.journal_mode(SqliteJournalMode::Wal);
        }

        // Per-connection pragma, so it goes on the connect options
        if config.enable_secure_delete {
            options = options.pragma("secure_delete", "ON");
        }

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .connect_with(options)
            .await?;

        let store = Self { pool };
        store.initialize_schema().await?;

        tracing::debug!(db_path = %config.db_path, "Opened local database");

        Ok(store)
    }

    /// Initialize database schema
    async fn initialize_schema(&self) -> SyncResult<()> {
        for collection in Collection::ALL {
            let name = table(collection);
            sqlx::query(&format!(
                r#"
                CREATE TABLE IF NOT EXISTS {name} (
                    user_id TEXT NOT NULL,
                    id TEXT NOT NULL,
                    fields TEXT NOT NULL,
                    last_modified TEXT NOT NULL,
                    v INTEGER NOT NULL,
                    manual INTEGER NOT NULL DEFAULT 0,
                    sync_status TEXT NOT NULL,
                    deleted INTEGER NOT NULL DEFAULT 0,
                    updated_at TEXT NOT NULL,
                    PRIMARY KEY (user_id, id)
                )
                "#
            ))
            .execute(&self.pool)
            .await?;

            sqlx::query(&format!(
                "CREATE INDEX IF NOT EXISTS idx_{name}_sync_status ON {name}(sync_status)"
            ))
            .execute(&self.pool)
            .await?;
        }

        Ok(())
    }

    async fn set_status(
        &self,
        collection: Collection,
        key: &RecordKey,
        status: SyncStatus,
        expected_last_modified: DateTime<Utc>,
    ) -> SyncResult<bool> {
        let result = sqlx::query(&format!(
            r#"
            UPDATE {} SET sync_status = ?, updated_at = ?
            WHERE user_id = ? AND id = ? AND last_modified = ?
            "#,
            table(collection)
        ))
        .bind(status.as_str())
        .bind(encode_time(Utc::now()))
        .bind(&key.user_id)
        .bind(&key.id)
        .bind(encode_time(expected_last_modified))
        .execute(&self.pool)
        .await?;

        let updated = result.rows_affected() > 0;
        tracing::debug!(
            collection = %collection,
            user = %correlation_id(&key.user_id),
            id = %key.id,
            status = status.as_str(),
            updated,
            "Updated sync status"
        );

        Ok(updated)
    }

    /// Get database pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Vacuum the database to reclaim space and securely drop freed pages.
    /// Worth calling after a full data reset.
    pub async fn vacuum(&self) -> SyncResult<()> {
        sqlx::query("VACUUM").execute(&self.pool).await?;
        Ok(())
    }

    /// Close database connection
    pub async fn close(self) -> SyncResult<()> {
        self.pool.close().await;
        Ok(())
    }
}

#[async_trait]
impl LocalStore for SqliteLocalStore {
    async fn get(&self, collection: Collection, key: &RecordKey) -> SyncResult<Option<LocalEntry>> {
        let row = sqlx::query(&format!(
            "SELECT * FROM {} WHERE user_id = ? AND id = ?",
            table(collection)
        ))
        .bind(&key.user_id)
        .bind(&key.id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| entry_from_row(collection, &row)).transpose()
    }

    async fn save(&self, entry: LocalEntry) -> SyncResult<()> {
        let document = &entry.document;
        sqlx::query(&format!(
            r#"
            INSERT OR REPLACE INTO {} (
                user_id, id, fields, last_modified, v,
                manual, sync_status, deleted, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            table(document.collection)
        ))
        .bind(&document.user_id)
        .bind(&document.id)
        .bind(document.fields.to_string())
        .bind(encode_time(document.last_modified))
        .bind(i64::from(document.version))
        .bind(document.manual)
        .bind(entry.sync_status.as_str())
        .bind(entry.deleted)
        .bind(encode_time(entry.updated_at))
        .execute(&self.pool)
        .await?;

        tracing::debug!(
            collection = %document.collection,
            user = %correlation_id(&document.user_id),
            id = %document.id,
            status = entry.sync_status.as_str(),
            deleted = entry.deleted,
            "Saved local record"
        );

        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &RecordKey) -> SyncResult<()> {
        sqlx::query(&format!(
            "DELETE FROM {} WHERE user_id = ? AND id = ?",
            table(collection)
        ))
        .bind(&key.user_id)
        .bind(&key.id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_pending_sync(&self, collection: Collection) -> SyncResult<Vec<LocalEntry>> {
        let rows = sqlx::query(&format!(
            r#"
            SELECT * FROM {}
            WHERE sync_status != ?
            ORDER BY last_modified ASC
            "#,
            table(collection)
        ))
        .bind(SyncStatus::Synced.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| entry_from_row(collection, row))
            .collect()
    }

    async fn list_for_user(&self, collection: Collection, user_id: &str) -> SyncResult<Vec<LocalEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT * FROM {} WHERE user_id = ? AND deleted = 0 ORDER BY id ASC",
            table(collection)
        ))
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| entry_from_row(collection, row))
            .collect()
    }

    async fn purge_tombstone(
        &self,
        collection: Collection,
        key: &RecordKey,
        expected_last_modified: DateTime<Utc>,
    ) -> SyncResult<bool> {
        let result = sqlx::query(&format!(
            "DELETE FROM {} WHERE user_id = ? AND id = ? AND deleted = 1 AND last_modified = ?",
            table(collection)
        ))
        .bind(&key.user_id)
        .bind(&key.id)
        .bind(encode_time(expected_last_modified))
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn mark_synced(
        &self,
        collection: Collection,
        key: &RecordKey,
        expected_last_modified: DateTime<Utc>,
    ) -> SyncResult<bool> {
        self.set_status(collection, key, SyncStatus::Synced, expected_last_modified)
            .await
    }

    async fn mark_failed(
        &self,
        collection: Collection,
        key: &RecordKey,
        expected_last_modified: DateTime<Utc>,
    ) -> SyncResult<bool> {
        self.set_status(collection, key, SyncStatus::Failed, expected_last_modified)
            .await
    }

    async fn purge_user(&self, user_id: &str) -> SyncResult<u64> {
        let mut tx = self.pool.begin().await?;
        let mut removed = 0;
        for collection in Collection::ALL {
            let result = sqlx::query(&format!("DELETE FROM {} WHERE user_id = ?", table(collection)))
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
            removed += result.rows_affected();
        }
        tx.commit().await?;

        tracing::info!(user = %correlation_id(user_id), removed, "Purged local user data");

        Ok(removed)
    }
}
