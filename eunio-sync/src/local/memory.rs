//! In-memory local store
//!
//! Same contract as the SQLite store; used by tests and by hosts that keep
//! their own persistence. Writes can be made to fail to exercise the
//! local-failure path.

use super::LocalStore;
use crate::error::{SyncError, SyncResult};
use crate::models::{Collection, LocalEntry, RecordKey, SyncStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;

type Rows = BTreeMap<(Collection, RecordKey), LocalEntry>;

#[derive(Default)]
pub struct MemoryLocalStore {
    rows: RwLock<Rows>,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryLocalStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every mutating call fail with a storage error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of successful mutating calls.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }

    fn begin_write(&self) -> SyncResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(SyncError::DataSync("simulated storage failure".to_string()));
        }
        Ok(())
    }

    fn finish_write(&self) {
        self.writes.fetch_add(1, Ordering::SeqCst);
    }

    async fn set_status(
        &self,
        collection: Collection,
        key: &RecordKey,
        status: SyncStatus,
        expected_last_modified: DateTime<Utc>,
    ) -> SyncResult<bool> {
        self.begin_write()?;
        let mut rows = self.rows.write().await;
        let updated = match rows.get_mut(&(collection, key.clone())) {
            Some(entry) if entry.document.last_modified == expected_last_modified => {
                entry.sync_status = status;
                entry.updated_at = Utc::now();
                true
            }
            _ => false,
        };
        self.finish_write();
        Ok(updated)
    }
}

#[async_trait]
impl LocalStore for MemoryLocalStore {
    async fn get(&self, collection: Collection, key: &RecordKey) -> SyncResult<Option<LocalEntry>> {
        Ok(self.rows.read().await.get(&(collection, key.clone())).cloned())
    }

    async fn save(&self, entry: LocalEntry) -> SyncResult<()> {
        self.begin_write()?;
        self.rows
            .write()
            .await
            .insert((entry.collection(), entry.key()), entry);
        self.finish_write();
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &RecordKey) -> SyncResult<()> {
        self.begin_write()?;
        self.rows.write().await.remove(&(collection, key.clone()));
        self.finish_write();
        Ok(())
    }

    async fn list_pending_sync(&self, collection: Collection) -> SyncResult<Vec<LocalEntry>> {
        let rows = self.rows.read().await;
        let mut pending: Vec<LocalEntry> = rows
            .iter()
            .filter(|((c, _), entry)| *c == collection && entry.is_dirty())
            .map(|(_, entry)| entry.clone())
            .collect();
        pending.sort_by_key(|entry| entry.document.last_modified);
        Ok(pending)
    }

    async fn list_for_user(&self, collection: Collection, user_id: &str) -> SyncResult<Vec<LocalEntry>> {
        let rows = self.rows.read().await;
        Ok(rows
            .iter()
            .filter(|((c, key), entry)| *c == collection && key.user_id == user_id && !entry.deleted)
            .map(|(_, entry)| entry.clone())
            .collect())
    }

    async fn purge_tombstone(
        &self,
        collection: Collection,
        key: &RecordKey,
        expected_last_modified: DateTime<Utc>,
    ) -> SyncResult<bool> {
        self.begin_write()?;
        let mut rows = self.rows.write().await;
        let slot = (collection, key.clone());
        let matches = rows.get(&slot).is_some_and(|entry| {
            entry.deleted && entry.document.last_modified == expected_last_modified
        });
        if matches {
            rows.remove(&slot);
        }
        self.finish_write();
        Ok(matches)
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
        self.begin_write()?;
        let mut rows = self.rows.write().await;
        let before = rows.len();
        rows.retain(|(_, key), _| key.user_id != user_id);
        let removed = before - rows.len();
        self.finish_write();
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Document, Syncable, UserPreferences};

    fn doc(user: &str) -> Document {
        UserPreferences::new(user).to_document().unwrap()
    }

    #[tokio::test]
    async fn test_save_get_and_pending() {
        let store = MemoryLocalStore::new();
        store.save(LocalEntry::pending(doc("a"))).await.unwrap();
        store.save(LocalEntry::synced(doc("b"))).await.unwrap();

        let key = RecordKey::for_user("a");
        assert!(store.get(Collection::Preferences, &key).await.unwrap().is_some());
        assert!(store.get(Collection::Settings, &key).await.unwrap().is_none());

        let pending = store.list_pending_sync(Collection::Preferences).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key(), key);

        let stamp = pending[0].document.last_modified;
        assert!(store.mark_synced(Collection::Preferences, &key, stamp).await.unwrap());
        assert!(store.list_pending_sync(Collection::Preferences).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_status_marks_skip_newer_rows() {
        let store = MemoryLocalStore::new();
        let pushed = doc("a");
        let mut edited = pushed.clone();
        edited.last_modified = pushed.last_modified + chrono::Duration::seconds(1);
        store.save(LocalEntry::pending(edited)).await.unwrap();

        let key = RecordKey::for_user("a");
        let stamp = pushed.last_modified;
        assert!(!store.mark_synced(Collection::Preferences, &key, stamp).await.unwrap());
        assert!(!store.mark_failed(Collection::Preferences, &key, stamp).await.unwrap());
        let row = store.get(Collection::Preferences, &key).await.unwrap().unwrap();
        assert_eq!(row.sync_status, SyncStatus::Pending);
    }

    #[tokio::test]
    async fn test_purge_tombstone_only_when_unchanged() {
        let store = MemoryLocalStore::new();
        let tombstone = doc("a");
        let stamp = tombstone.last_modified;
        let key = RecordKey::for_user("a");

        // Recreated after the delete: the live row must survive
        store.save(LocalEntry::pending(tombstone.clone())).await.unwrap();
        assert!(!store.purge_tombstone(Collection::Preferences, &key, stamp).await.unwrap());
        assert_eq!(store.len().await, 1);

        store.save(LocalEntry::tombstone(tombstone)).await.unwrap();
        assert!(store.purge_tombstone(Collection::Preferences, &key, stamp).await.unwrap());
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_failing_writes_leave_no_trace() {
        let store = MemoryLocalStore::new();
        store.set_fail_writes(true);
        let err = store.save(LocalEntry::pending(doc("a"))).await.unwrap_err();
        assert!(err.is_local_storage());
        assert!(store.is_empty().await);
        assert_eq!(store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_tombstones_hidden_from_listing() {
        let store = MemoryLocalStore::new();
        store.save(LocalEntry::tombstone(doc("a"))).await.unwrap();
        assert!(store.list_for_user(Collection::Preferences, "a").await.unwrap().is_empty());
        assert_eq!(store.list_pending_sync(Collection::Preferences).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_purge_user() {
        let store = MemoryLocalStore::new();
        store.save(LocalEntry::pending(doc("a"))).await.unwrap();
        store.save(LocalEntry::pending(doc("b"))).await.unwrap();
        assert_eq!(store.purge_user("a").await.unwrap(), 1);
        assert_eq!(store.len().await, 1);
    }
}
