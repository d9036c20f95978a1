//! On-device storage port
//!
//! Stores are dumb: they persist [`LocalEntry`] rows and never decide sync
//! policy. "Not found" is `None` or an empty list; only storage-layer
//! failures are errors.

pub mod memory;
pub mod sqlite;

use crate::error::SyncResult;
use crate::models::{Collection, LocalEntry, RecordKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryLocalStore;
pub use sqlite::{LocalDbConfig, SqliteLocalStore};

#[async_trait]
pub trait LocalStore: Send + Sync {
    /// Row for a key, tombstones included.
    async fn get(&self, collection: Collection, key: &RecordKey) -> SyncResult<Option<LocalEntry>>;

    /// Insert or replace the row for the entry's key.
    async fn save(&self, entry: LocalEntry) -> SyncResult<()>;

    /// Remove the row entirely.
    async fn delete(&self, collection: Collection, key: &RecordKey) -> SyncResult<()>;

    /// Rows whose status is not SYNCED, oldest change first.
    async fn list_pending_sync(&self, collection: Collection) -> SyncResult<Vec<LocalEntry>>;

    /// Live (non-tombstoned) rows of a user ordered by id.
    async fn list_for_user(&self, collection: Collection, user_id: &str) -> SyncResult<Vec<LocalEntry>>;

    /// Remove a tombstone, but only while it is still the row carrying
    /// `expected_last_modified`. Returns whether a row was removed.
    async fn purge_tombstone(
        &self,
        collection: Collection,
        key: &RecordKey,
        expected_last_modified: DateTime<Utc>,
    ) -> SyncResult<bool>;

    /// Compare-and-set: the status changes only if the row still carries
    /// `expected_last_modified`, so an edit saved while a push was in flight
    /// stays dirty. Returns whether the row was updated.
    async fn mark_synced(
        &self,
        collection: Collection,
        key: &RecordKey,
        expected_last_modified: DateTime<Utc>,
    ) -> SyncResult<bool>;

    /// Same guard as [`mark_synced`](Self::mark_synced).
    async fn mark_failed(
        &self,
        collection: Collection,
        key: &RecordKey,
        expected_last_modified: DateTime<Utc>,
    ) -> SyncResult<bool>;

    /// Drop every row of a user in every collection (app data reset).
    async fn purge_user(&self, user_id: &str) -> SyncResult<u64>;
}
