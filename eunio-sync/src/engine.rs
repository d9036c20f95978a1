//! Offline-first orchestration over the local and remote stores
//!
//! The engine works on untyped [`Document`]s and owns every `sync_status`
//! transition. Typed repositories validate and stamp records before handing
//! them over.
//!
//! - Reads never wait on the network when a local copy exists.
//! - Writes always land locally first; the remote push is best effort.
//! - Deletes are tombstones until the remote store confirms them, and lose
//!   to a remote edit made after them.
//! - Status changes are compare-and-set on `last_modified`: an edit saved
//!   while its predecessor was being pushed stays dirty.
//! - Explicit sync runs last-write-wins resolution with optimistic
//!   concurrency on the remote side.

use crate::conflict::{self, Winner};
use crate::error::{SyncError, SyncResult};
use crate::events::{self, SyncEvent, SyncRequest, SyncRequestSender};
use crate::local::LocalStore;
use crate::models::{next_modification_time, Collection, Document, LocalEntry, RecordKey, SyncStatus};
use crate::network::NetworkMonitor;
use crate::remote::{HistoryEntry, RemoteStore, ResolutionStrategy};
use crate::retry::RetryPolicy;
use chrono::{DateTime, Utc};
use logger_redacted::{correlation_id, redact};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Re-resolution rounds after an optimistic-concurrency conflict
pub const MAX_CONFLICT_ROUNDS: usize = 3;

/// What a per-record reconciliation did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Neither store has the record
    NothingToSync,
    /// Only the local copy existed; it was uploaded
    Pushed,
    /// Only the remote copy existed; it was cached locally
    Pulled,
    /// Local tombstone propagated and purged
    Deleted,
    /// Both copies were already identical
    UpToDate,
    /// Copies differed and were resolved
    Resolved {
        strategy: ResolutionStrategy,
        local_wins: bool,
    },
}

pub struct SyncEngine {
    local: Arc<dyn LocalStore>,
    remote: Arc<dyn RemoteStore>,
    network: Arc<dyn NetworkMonitor>,
    retry: RetryPolicy,
    events: broadcast::Sender<SyncEvent>,
    requests: Option<SyncRequestSender>,
}

impl SyncEngine {
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        network: Arc<dyn NetworkMonitor>,
    ) -> Self {
        Self {
            local,
            remote,
            network,
            retry: RetryPolicy::default(),
            events: events::event_channel(),
            requests: None,
        }
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Failed write-path pushes are handed to this channel.
    pub fn with_request_sender(mut self, requests: SyncRequestSender) -> Self {
        self.requests = Some(requests);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    pub fn local(&self) -> &Arc<dyn LocalStore> {
        &self.local
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub fn network(&self) -> &Arc<dyn NetworkMonitor> {
        &self.network
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    pub fn is_online(&self) -> bool {
        self.network.is_connected()
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn enqueue(&self, collection: Collection, key: &RecordKey) {
        if let Some(requests) = &self.requests {
            let request = SyncRequest {
                collection,
                key: key.clone(),
            };
            if requests.send(request).is_err() {
                debug!(%collection, "Sync worker gone, record left for the next pass");
            }
        }
    }

    /// Raw local row, tombstones included.
    pub async fn local_entry(
        &self,
        collection: Collection,
        key: &RecordKey,
    ) -> SyncResult<Option<LocalEntry>> {
        self.local.get(collection, key).await
    }

    /// Read-through: local copy first, then a single remote attempt when
    /// online. Transient remote failures read as a miss.
    pub async fn get(&self, collection: Collection, key: &RecordKey) -> SyncResult<Option<Document>> {
        if let Some(entry) = self.local.get(collection, key).await? {
            return Ok((!entry.deleted).then_some(entry.document));
        }
        if !self.is_online() {
            return Ok(None);
        }

        match self.remote.get(collection, key).await {
            Ok(Some(document)) => {
                self.local.save(LocalEntry::synced(document.clone())).await?;
                debug!(%collection, user = %correlation_id(&key.user_id), "Cached remote record");
                self.emit(SyncEvent::RecordChanged {
                    collection,
                    key: key.clone(),
                });
                Ok(Some(document))
            }
            Ok(None) => Ok(None),
            Err(err) if err.is_retryable() => {
                warn!(%collection, error = %err, "Remote read failed, treating as miss");
                Ok(None)
            }
            Err(err) => Err(err),
        }
    }

    /// Write path: persist locally as PENDING, then one push attempt when
    /// online. Only local failures are errors; the returned status tells the
    /// caller where the record ended up.
    pub async fn save(&self, document: Document) -> SyncResult<SyncStatus> {
        let collection = document.collection;
        let key = document.key();
        let stamp = document.last_modified;

        self.local.save(LocalEntry::pending(document.clone())).await?;
        self.emit(SyncEvent::RecordChanged {
            collection,
            key: key.clone(),
        });

        if !self.is_online() {
            debug!(%collection, user = %correlation_id(&key.user_id), "Offline, record queued");
            return Ok(SyncStatus::Pending);
        }

        match self.remote.save(document).await {
            Ok(()) => {
                if self.finish_synced(collection, &key, stamp).await? {
                    Ok(SyncStatus::Synced)
                } else {
                    Ok(SyncStatus::Pending)
                }
            }
            Err(err) => {
                self.record_failure(collection, &key, stamp, &err).await?;
                self.enqueue(collection, &key);
                Ok(SyncStatus::Failed)
            }
        }
    }

    /// Batch variant of [`save`](Self::save) with a single remote round trip.
    pub async fn save_many(&self, documents: Vec<Document>) -> SyncResult<SyncStatus> {
        if documents.is_empty() {
            return Ok(SyncStatus::Synced);
        }
        for document in &documents {
            self.local.save(LocalEntry::pending(document.clone())).await?;
            self.emit(SyncEvent::RecordChanged {
                collection: document.collection,
                key: document.key(),
            });
        }
        if !self.is_online() {
            debug!(count = documents.len(), "Offline, batch queued");
            return Ok(SyncStatus::Pending);
        }

        let targets: Vec<(Collection, RecordKey, DateTime<Utc>)> = documents
            .iter()
            .map(|d| (d.collection, d.key(), d.last_modified))
            .collect();
        match self.remote.save_batch(documents).await {
            Ok(()) => {
                let mut all_synced = true;
                for (collection, key, stamp) in &targets {
                    all_synced &= self.finish_synced(*collection, key, *stamp).await?;
                }
                Ok(if all_synced {
                    SyncStatus::Synced
                } else {
                    SyncStatus::Pending
                })
            }
            Err(err) => {
                for (collection, key, stamp) in &targets {
                    self.record_failure(*collection, key, *stamp, &err).await?;
                    self.enqueue(*collection, key);
                }
                Ok(SyncStatus::Failed)
            }
        }
    }

    /// Tombstone locally; when online reconcile the tombstone right away.
    pub async fn delete(&self, collection: Collection, key: &RecordKey) -> SyncResult<()> {
        let previous = self.local.get(collection, key).await?;
        let mut document = match previous {
            Some(entry) => entry.document,
            None => Document {
                collection,
                user_id: key.user_id.clone(),
                id: key.id.clone(),
                last_modified: next_modification_time(None),
                version: 0,
                manual: true,
                fields: serde_json::Value::Null,
            },
        };
        document.last_modified = next_modification_time(Some(document.last_modified));
        let tombstone = document.clone();

        self.local.save(LocalEntry::tombstone(document)).await?;
        self.emit(SyncEvent::RecordDeleted {
            collection,
            key: key.clone(),
        });

        if !self.is_online() {
            debug!(%collection, user = %correlation_id(&key.user_id), "Offline, delete queued");
            return Ok(());
        }

        match self.reconcile_tombstone(collection, key, &tombstone).await {
            Ok(_) => Ok(()),
            Err(err) if err.is_local_storage() => Err(err),
            Err(err) => {
                self.record_failure(collection, key, tombstone.last_modified, &err)
                    .await?;
                self.enqueue(collection, key);
                Ok(())
            }
        }
    }

    /// Reconcile one record with the remote store.
    ///
    /// Surfaces failures: offline is a `Network` error, exhausted retries and
    /// non-retryable remote errors leave the local copy untouched and FAILED.
    pub async fn sync_with_conflict_resolution(
        &self,
        collection: Collection,
        key: &RecordKey,
    ) -> SyncResult<SyncOutcome> {
        if !self.is_online() {
            return Err(SyncError::Network("device is offline".to_string()));
        }

        let local = self.local.get(collection, key).await?;
        let local_stamp = local.as_ref().map(|entry| entry.document.last_modified);
        let result = self.reconcile(collection, key, local).await;

        match &result {
            Ok(outcome) => {
                info!(
                    %collection,
                    user = %correlation_id(&key.user_id),
                    outcome = ?outcome,
                    "Record reconciled"
                );
            }
            Err(err) if !err.is_local_storage() => {
                if let Some(stamp) = local_stamp {
                    self.record_failure(collection, key, stamp, err).await?;
                }
            }
            Err(_) => {}
        }
        result
    }

    async fn reconcile(
        &self,
        collection: Collection,
        key: &RecordKey,
        local: Option<LocalEntry>,
    ) -> SyncResult<SyncOutcome> {
        if let Some(entry) = &local {
            if entry.deleted {
                return self.reconcile_tombstone(collection, key, &entry.document).await;
            }
        }

        let mut remote = self.fetch_remote(collection, key).await?;

        let Some(local) = local else {
            return match remote {
                None => Ok(SyncOutcome::NothingToSync),
                Some(document) => {
                    self.local.save(LocalEntry::synced(document)).await?;
                    self.emit(SyncEvent::RecordChanged {
                        collection,
                        key: key.clone(),
                    });
                    self.emit(SyncEvent::RecordSynced {
                        collection,
                        key: key.clone(),
                    });
                    Ok(SyncOutcome::Pulled)
                }
            };
        };
        let local = local.document;

        let mut round = 0;
        loop {
            round += 1;
            let Some(remote_doc) = remote.take() else {
                self.retry
                    .run("remote_save", || self.remote.save(local.clone()))
                    .await?;
                self.finish_synced(collection, key, local.last_modified).await?;
                return Ok(SyncOutcome::Pushed);
            };

            if local.same_content(&remote_doc) {
                self.finish_synced(collection, key, local.last_modified).await?;
                return Ok(SyncOutcome::UpToDate);
            }

            let resolution = conflict::resolve(&local, &remote_doc);
            let outcome = SyncOutcome::Resolved {
                strategy: resolution.strategy,
                local_wins: resolution.local_wins(),
            };
            let entry = conflict::history_entry(&local, &remote_doc, &resolution);

            match resolution.winner {
                Winner::Remote => {
                    self.local.save(LocalEntry::synced(remote_doc)).await?;
                    self.emit(SyncEvent::RecordChanged {
                        collection,
                        key: key.clone(),
                    });
                    self.finish_resolved(collection, key, entry).await;
                    return Ok(outcome);
                }
                Winner::Local => {
                    let expected = remote_doc.last_modified;
                    let pushed = self
                        .retry
                        .run("conditional_update", || {
                            self.remote.conditional_update(local.clone(), expected)
                        })
                        .await;
                    match pushed {
                        Ok(()) => {
                            self.mark_pushed(collection, key, local.last_modified).await?;
                            self.finish_resolved(collection, key, entry).await;
                            return Ok(outcome);
                        }
                        Err(err) if err.is_conflict() && round < MAX_CONFLICT_ROUNDS => {
                            debug!(%collection, round, "Remote moved during push, re-resolving");
                            remote = self.fetch_remote(collection, key).await?;
                        }
                        Err(err) => return Err(err),
                    }
                }
            }
        }
    }

    async fn fetch_remote(
        &self,
        collection: Collection,
        key: &RecordKey,
    ) -> SyncResult<Option<Document>> {
        self.retry
            .run("remote_get", || self.remote.get(collection, key))
            .await
    }

    /// Propagate a local tombstone. A remote copy edited after the delete
    /// wins and is restored locally; otherwise the remote copy is removed
    /// with a conditional delete, re-resolving when it moves underneath.
    async fn reconcile_tombstone(
        &self,
        collection: Collection,
        key: &RecordKey,
        tombstone: &Document,
    ) -> SyncResult<SyncOutcome> {
        let mut round = 0;
        loop {
            round += 1;
            let Some(remote_doc) = self.fetch_remote(collection, key).await? else {
                self.finish_deleted(collection, key, tombstone.last_modified)
                    .await?;
                return Ok(SyncOutcome::Deleted);
            };

            let resolution = conflict::resolve(tombstone, &remote_doc);
            if resolution.winner == Winner::Remote {
                let entry = conflict::history_entry(tombstone, &remote_doc, &resolution);
                self.local.save(LocalEntry::synced(remote_doc)).await?;
                self.emit(SyncEvent::RecordChanged {
                    collection,
                    key: key.clone(),
                });
                self.finish_resolved(collection, key, entry).await;
                return Ok(SyncOutcome::Resolved {
                    strategy: resolution.strategy,
                    local_wins: false,
                });
            }

            let expected = remote_doc.last_modified;
            let deleted = self
                .retry
                .run("conditional_delete", || {
                    self.remote.conditional_delete(collection, key, expected)
                })
                .await;
            match deleted {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) if err.is_conflict() && round < MAX_CONFLICT_ROUNDS => {
                    debug!(%collection, round, "Remote moved during delete, re-resolving");
                    continue;
                }
                Err(err) => return Err(err),
            }
            self.finish_deleted(collection, key, tombstone.last_modified)
                .await?;
            return Ok(SyncOutcome::Deleted);
        }
    }

    async fn finish_deleted(
        &self,
        collection: Collection,
        key: &RecordKey,
        tombstone_stamp: DateTime<Utc>,
    ) -> SyncResult<()> {
        if self
            .local
            .purge_tombstone(collection, key, tombstone_stamp)
            .await?
        {
            debug!(%collection, user = %correlation_id(&key.user_id), "Tombstone purged");
        } else {
            debug!(%collection, user = %correlation_id(&key.user_id), "Record recreated during delete, kept");
            self.enqueue(collection, key);
        }
        Ok(())
    }

    /// Mark the pushed revision SYNCED. A newer local edit that landed during
    /// the push stays dirty and is queued again.
    async fn mark_pushed(
        &self,
        collection: Collection,
        key: &RecordKey,
        pushed: DateTime<Utc>,
    ) -> SyncResult<bool> {
        let marked = self.local.mark_synced(collection, key, pushed).await?;
        if !marked {
            debug!(
                %collection,
                user = %correlation_id(&key.user_id),
                "Local copy changed during push, left dirty"
            );
            self.enqueue(collection, key);
        }
        Ok(marked)
    }

    async fn finish_synced(
        &self,
        collection: Collection,
        key: &RecordKey,
        pushed: DateTime<Utc>,
    ) -> SyncResult<bool> {
        if !self.mark_pushed(collection, key, pushed).await? {
            return Ok(false);
        }
        self.emit(SyncEvent::RecordSynced {
            collection,
            key: key.clone(),
        });
        Ok(true)
    }

    async fn finish_resolved(&self, collection: Collection, key: &RecordKey, entry: HistoryEntry) {
        info!(
            %collection,
            user = %correlation_id(&key.user_id),
            strategy = entry.strategy.as_str(),
            local_wins = entry.local_wins,
            changed = entry.changed_fields.len(),
            "Conflict resolved"
        );
        self.emit(SyncEvent::ConflictResolved {
            collection,
            key: key.clone(),
            strategy: entry.strategy,
            local_wins: entry.local_wins,
        });
        self.emit(SyncEvent::RecordSynced {
            collection,
            key: key.clone(),
        });
        // The audit log must not undo a resolution that already landed
        if let Err(err) = self.remote.append_history(entry).await {
            warn!(%collection, error = %err, "Failed to append resolution history");
        }
    }

    async fn record_failure(
        &self,
        collection: Collection,
        key: &RecordKey,
        attempted: DateTime<Utc>,
        err: &SyncError,
    ) -> SyncResult<()> {
        warn!(
            %collection,
            user = %correlation_id(&key.user_id),
            error = %err,
            "Remote push failed, record marked FAILED"
        );
        self.local.mark_failed(collection, key, attempted).await?;
        self.emit(SyncEvent::RecordFailed {
            collection,
            key: key.clone(),
            error: redact(&err.to_string()),
        });
        Ok(())
    }

    /// Remote documents of a user in `[from_id, to_id]`, cached locally as
    /// SYNCED where no local row exists. Empty when offline or on a
    /// transient failure.
    pub async fn pull_range(
        &self,
        collection: Collection,
        user_id: &str,
        from_id: &str,
        to_id: &str,
    ) -> SyncResult<Vec<Document>> {
        if !self.is_online() {
            return Ok(Vec::new());
        }
        let documents = match self
            .remote
            .query_range(collection, user_id, from_id, to_id)
            .await
        {
            Ok(documents) => documents,
            Err(err) if err.is_retryable() => {
                warn!(%collection, error = %err, "Remote range query failed, treating as empty");
                return Ok(Vec::new());
            }
            Err(err) => return Err(err),
        };

        let mut result = Vec::with_capacity(documents.len());
        for document in documents {
            let key = document.key();
            match self.local.get(collection, &key).await? {
                Some(entry) if entry.deleted => {}
                Some(entry) => result.push(entry.document),
                None => {
                    self.local.save(LocalEntry::synced(document.clone())).await?;
                    self.emit(SyncEvent::RecordChanged { collection, key });
                    result.push(document);
                }
            }
        }
        Ok(result)
    }

    /// Resolution audit log, most recent first.
    pub async fn history(
        &self,
        collection: Collection,
        user_id: &str,
        limit: usize,
    ) -> SyncResult<Vec<HistoryEntry>> {
        if !self.is_online() {
            return Err(SyncError::Network("device is offline".to_string()));
        }
        self.retry
            .run("remote_history", || self.remote.history(collection, user_id, limit))
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::MemoryLocalStore;
    use crate::models::{Syncable, UserPreferences, UserSettings};
    use crate::network::WatchNetworkMonitor;
    use crate::remote::{FaultKind, MemoryRemoteStore, MockRemoteStore};
    use chrono::Duration;

    struct Harness {
        local: Arc<MemoryLocalStore>,
        remote: Arc<MemoryRemoteStore>,
        network: Arc<WatchNetworkMonitor>,
        engine: SyncEngine,
    }

    fn harness(online: bool) -> Harness {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemoteStore::new());
        let network = Arc::new(if online {
            WatchNetworkMonitor::online()
        } else {
            WatchNetworkMonitor::offline()
        });
        let engine = SyncEngine::new(local.clone(), remote.clone(), network.clone());
        Harness {
            local,
            remote,
            network,
            engine,
        }
    }

    fn settings_doc(user: &str) -> Document {
        UserSettings::defaults(user).to_document().unwrap()
    }

    /// Writes `edit` to the local store as PENDING while a push is in flight.
    struct EditDuringPush {
        inner: Arc<MemoryRemoteStore>,
        local: Arc<MemoryLocalStore>,
        edit: Document,
    }

    #[async_trait::async_trait]
    impl RemoteStore for EditDuringPush {
        async fn get(&self, collection: Collection, key: &RecordKey) -> SyncResult<Option<Document>> {
            self.inner.get(collection, key).await
        }

        async fn save(&self, document: Document) -> SyncResult<()> {
            self.local.save(LocalEntry::pending(self.edit.clone())).await?;
            self.inner.save(document).await
        }

        async fn update(&self, document: Document) -> SyncResult<()> {
            self.inner.update(document).await
        }

        async fn delete(&self, collection: Collection, key: &RecordKey) -> SyncResult<()> {
            self.inner.delete(collection, key).await
        }

        async fn conditional_update(
            &self,
            document: Document,
            expected_last_modified: DateTime<Utc>,
        ) -> SyncResult<()> {
            self.inner
                .conditional_update(document, expected_last_modified)
                .await
        }

        async fn conditional_delete(
            &self,
            collection: Collection,
            key: &RecordKey,
            expected_last_modified: DateTime<Utc>,
        ) -> SyncResult<()> {
            self.inner
                .conditional_delete(collection, key, expected_last_modified)
                .await
        }

        async fn exists(&self, collection: Collection, key: &RecordKey) -> SyncResult<bool> {
            self.inner.exists(collection, key).await
        }

        async fn query_range(
            &self,
            collection: Collection,
            user_id: &str,
            from_id: &str,
            to_id: &str,
        ) -> SyncResult<Vec<Document>> {
            self.inner
                .query_range(collection, user_id, from_id, to_id)
                .await
        }

        async fn save_batch(&self, documents: Vec<Document>) -> SyncResult<()> {
            self.inner.save_batch(documents).await
        }

        async fn append_history(&self, entry: HistoryEntry) -> SyncResult<()> {
            self.inner.append_history(entry).await
        }

        async fn history(
            &self,
            collection: Collection,
            user_id: &str,
            limit: usize,
        ) -> SyncResult<Vec<HistoryEntry>> {
            self.inner.history(collection, user_id, limit).await
        }
    }

    #[tokio::test]
    async fn test_offline_save_never_calls_remote() {
        let mut remote = MockRemoteStore::new();
        remote.expect_save().times(0);
        remote.expect_get().times(0);

        let local = Arc::new(MemoryLocalStore::new());
        let engine = SyncEngine::new(
            local.clone(),
            Arc::new(remote),
            Arc::new(WatchNetworkMonitor::offline()),
        );

        let doc = settings_doc("u1");
        let status = engine.save(doc.clone()).await.unwrap();
        assert_eq!(status, SyncStatus::Pending);

        let stored = local.get(Collection::Settings, &doc.key()).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Pending);
        assert_eq!(stored.document, doc);
    }

    #[tokio::test]
    async fn test_online_save_marks_synced() {
        let h = harness(true);
        let doc = settings_doc("u1");
        assert_eq!(h.engine.save(doc.clone()).await.unwrap(), SyncStatus::Synced);
        assert_eq!(h.remote.peek(Collection::Settings, &doc.key()).await, Some(doc.clone()));
        let stored = h.local.get(Collection::Settings, &doc.key()).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Synced);
    }

    #[tokio::test]
    async fn test_failed_push_is_swallowed_and_queued() {
        let (tx, mut rx) = events::sync_request_channel();
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemoteStore::new());
        let engine = SyncEngine::new(
            local.clone(),
            remote.clone(),
            Arc::new(WatchNetworkMonitor::online()),
        )
        .with_request_sender(tx);

        remote.fail_next(1, FaultKind::Server).await;
        let doc = settings_doc("u1");
        assert_eq!(engine.save(doc.clone()).await.unwrap(), SyncStatus::Failed);

        let stored = local.get(Collection::Settings, &doc.key()).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Failed);
        let request = rx.try_recv().unwrap();
        assert_eq!(request.key, doc.key());
        assert_eq!(request.collection, Collection::Settings);
    }

    #[tokio::test]
    async fn test_local_failure_surfaces() {
        let h = harness(true);
        h.local.set_fail_writes(true);
        let err = h.engine.save(settings_doc("u1")).await.unwrap_err();
        assert!(err.is_local_storage());
        assert_eq!(h.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_read_through_caches_remote_copy() {
        let h = harness(true);
        let doc = settings_doc("u1");
        h.remote.insert(doc.clone()).await;

        let fetched = h.engine.get(Collection::Settings, &doc.key()).await.unwrap();
        assert_eq!(fetched, Some(doc.clone()));
        let cached = h.local.get(Collection::Settings, &doc.key()).await.unwrap().unwrap();
        assert_eq!(cached.sync_status, SyncStatus::Synced);

        // Second read is served locally
        let calls = h.remote.call_count();
        h.engine.get(Collection::Settings, &doc.key()).await.unwrap();
        assert_eq!(h.remote.call_count(), calls);
    }

    #[tokio::test]
    async fn test_read_through_transient_failure_is_miss() {
        let h = harness(true);
        h.remote.insert(settings_doc("u1")).await;
        h.remote.fail_next(1, FaultKind::Timeout).await;
        let key = RecordKey::for_user("u1");
        assert_eq!(h.engine.get(Collection::Settings, &key).await.unwrap(), None);

        h.remote.fail_next(1, FaultKind::Authentication).await;
        let err = h.engine.get(Collection::Settings, &key).await.unwrap_err();
        assert!(matches!(err, SyncError::Authentication(_)));
    }

    #[tokio::test]
    async fn test_offline_read_of_missing_record() {
        let h = harness(false);
        h.remote.insert(settings_doc("u1")).await;
        let key = RecordKey::for_user("u1");
        assert_eq!(h.engine.get(Collection::Settings, &key).await.unwrap(), None);
        assert_eq!(h.remote.call_count(), 0);
    }

    #[tokio::test]
    async fn test_delete_offline_then_sync() {
        let h = harness(false);
        let doc = settings_doc("u1");
        h.remote.insert(doc.clone()).await;
        h.local.save(LocalEntry::synced(doc.clone())).await.unwrap();

        h.engine.delete(Collection::Settings, &doc.key()).await.unwrap();
        assert_eq!(h.engine.get(Collection::Settings, &doc.key()).await.unwrap(), None);
        let tombstone = h.local.get(Collection::Settings, &doc.key()).await.unwrap().unwrap();
        assert!(tombstone.deleted);
        assert!(tombstone.document.last_modified > doc.last_modified);

        h.network.set_connected(true);
        let outcome = h
            .engine
            .sync_with_conflict_resolution(Collection::Settings, &doc.key())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Deleted);
        assert!(h.local.get(Collection::Settings, &doc.key()).await.unwrap().is_none());
        assert!(h.remote.peek(Collection::Settings, &doc.key()).await.is_none());
    }

    #[tokio::test]
    async fn test_delete_loses_to_later_remote_edit() {
        let h = harness(false);
        let doc = settings_doc("u1");
        h.local.save(LocalEntry::synced(doc.clone())).await.unwrap();
        h.engine.delete(Collection::Settings, &doc.key()).await.unwrap();
        let tombstone = h.local.get(Collection::Settings, &doc.key()).await.unwrap().unwrap();

        // Another device edits after the offline delete
        let mut edited = doc.clone();
        edited.last_modified = tombstone.document.last_modified + Duration::seconds(30);
        edited.fields["cycle"]["averageCycleLength"] = 31.into();
        h.remote.insert(edited.clone()).await;

        h.network.set_connected(true);
        let outcome = h
            .engine
            .sync_with_conflict_resolution(Collection::Settings, &doc.key())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Resolved {
                strategy: ResolutionStrategy::RemoteNewer,
                local_wins: false
            }
        );
        assert_eq!(h.remote.peek(Collection::Settings, &doc.key()).await, Some(edited.clone()));
        let restored = h.local.get(Collection::Settings, &doc.key()).await.unwrap().unwrap();
        assert!(!restored.deleted);
        assert_eq!(restored.sync_status, SyncStatus::Synced);
        assert_eq!(restored.document, edited);
        assert_eq!(
            h.engine.get(Collection::Settings, &doc.key()).await.unwrap(),
            Some(edited)
        );
    }

    #[tokio::test]
    async fn test_online_delete_keeps_later_remote_edit() {
        let h = harness(true);
        let doc = settings_doc("u1");
        h.local.save(LocalEntry::synced(doc.clone())).await.unwrap();
        let mut edited = doc.clone();
        edited.last_modified = doc.last_modified + Duration::hours(1);
        edited.fields["privacy"]["dataSharingEnabled"] = true.into();
        h.remote.insert(edited.clone()).await;

        h.engine.delete(Collection::Settings, &doc.key()).await.unwrap();
        assert_eq!(h.remote.peek(Collection::Settings, &doc.key()).await, Some(edited.clone()));
        let stored = h.local.get(Collection::Settings, &doc.key()).await.unwrap().unwrap();
        assert!(!stored.deleted);
        assert_eq!(stored.document, edited);
    }

    #[tokio::test]
    async fn test_edit_during_push_stays_pending() {
        let local = Arc::new(MemoryLocalStore::new());
        let first = settings_doc("u1");
        let mut second = first.clone();
        second.last_modified = first.last_modified + Duration::seconds(1);
        second.fields["cycle"]["averageCycleLength"] = 35.into();
        let inner = Arc::new(MemoryRemoteStore::new());
        let remote = Arc::new(EditDuringPush {
            inner: inner.clone(),
            local: local.clone(),
            edit: second.clone(),
        });
        let engine = SyncEngine::new(
            local.clone(),
            remote,
            Arc::new(WatchNetworkMonitor::online()),
        );
        let mut rx = engine.subscribe();

        let status = engine.save(first.clone()).await.unwrap();
        assert_eq!(status, SyncStatus::Pending);
        assert_eq!(inner.peek(Collection::Settings, &first.key()).await, Some(first.clone()));

        let stored = local.get(Collection::Settings, &first.key()).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Pending);
        assert_eq!(stored.document, second);
        let pending = local.list_pending_sync(Collection::Settings).await.unwrap();
        assert_eq!(pending.len(), 1);

        // Only the change event; nothing claims the newer edit is synced
        assert!(matches!(rx.recv().await.unwrap(), SyncEvent::RecordChanged { .. }));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_sync_leaves_record_pending() {
        let h = harness(true);
        let doc = settings_doc("u1");
        h.local.save(LocalEntry::pending(doc.clone())).await.unwrap();
        h.remote
            .fail_key(Collection::Settings, doc.key(), FaultKind::Network)
            .await;

        let result = tokio::time::timeout(
            std::time::Duration::from_secs(3),
            h.engine
                .sync_with_conflict_resolution(Collection::Settings, &doc.key()),
        )
        .await;
        assert!(result.is_err());
        assert!(h.remote.call_count() < 5);

        let stored = h.local.get(Collection::Settings, &doc.key()).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Pending);
        assert_eq!(stored.document, doc);
    }

    #[tokio::test]
    async fn test_sync_offline_is_network_error() {
        let h = harness(false);
        let err = h
            .engine
            .sync_with_conflict_resolution(Collection::Settings, &RecordKey::for_user("u1"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
    }

    #[tokio::test]
    async fn test_sync_push_pull_and_nothing() {
        let h = harness(true);
        let key = RecordKey::for_user("u1");
        assert_eq!(
            h.engine
                .sync_with_conflict_resolution(Collection::Settings, &key)
                .await
                .unwrap(),
            SyncOutcome::NothingToSync
        );

        h.remote.insert(settings_doc("u1")).await;
        assert_eq!(
            h.engine
                .sync_with_conflict_resolution(Collection::Settings, &key)
                .await
                .unwrap(),
            SyncOutcome::Pulled
        );

        let prefs = UserPreferences::new("u1").to_document().unwrap();
        h.local.save(LocalEntry::pending(prefs.clone())).await.unwrap();
        assert_eq!(
            h.engine
                .sync_with_conflict_resolution(Collection::Preferences, &key)
                .await
                .unwrap(),
            SyncOutcome::Pushed
        );
        assert_eq!(h.remote.peek(Collection::Preferences, &key).await, Some(prefs));
    }

    #[tokio::test]
    async fn test_newer_remote_overwrites_local() {
        let h = harness(true);
        let local = settings_doc("u1");
        let mut remote = local.clone();
        remote.last_modified = local.last_modified + Duration::seconds(10);
        remote.fields["cycle"]["averageCycleLength"] = 30.into();
        h.local.save(LocalEntry::pending(local.clone())).await.unwrap();
        h.remote.insert(remote.clone()).await;

        let outcome = h
            .engine
            .sync_with_conflict_resolution(Collection::Settings, &local.key())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Resolved {
                strategy: ResolutionStrategy::RemoteNewer,
                local_wins: false
            }
        );
        let stored = h.local.get(Collection::Settings, &local.key()).await.unwrap().unwrap();
        assert_eq!(stored.document, remote);
        assert_eq!(stored.sync_status, SyncStatus::Synced);

        let history = h.remote.history(Collection::Settings, "u1", 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].changed_fields, vec!["cycle"]);
    }

    #[tokio::test]
    async fn test_identical_copies_are_up_to_date() {
        let h = harness(true);
        let doc = settings_doc("u1");
        h.local.save(LocalEntry::pending(doc.clone())).await.unwrap();
        h.remote.insert(doc.clone()).await;

        let outcome = h
            .engine
            .sync_with_conflict_resolution(Collection::Settings, &doc.key())
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::UpToDate);
        assert!(h.remote.history(Collection::Settings, "u1", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_local_winner_retries_after_concurrency_conflict() {
        let mut remote = MockRemoteStore::new();
        let local_doc = settings_doc("u1");
        let mut stale = local_doc.clone();
        stale.last_modified = local_doc.last_modified - Duration::seconds(10);
        stale.fields["privacy"]["dataSharingEnabled"] = true.into();
        let mut moved = stale.clone();
        moved.last_modified = local_doc.last_modified - Duration::seconds(5);

        let mut reads = vec![moved.clone(), stale.clone()];
        remote
            .expect_get()
            .times(2)
            .returning(move |_, _| Ok(reads.pop()));
        let mut attempts = 0;
        remote
            .expect_conditional_update()
            .times(2)
            .returning(move |doc, expected| {
                attempts += 1;
                if attempts == 1 {
                    Err(SyncError::Conflict {
                        key: doc.key().to_string(),
                        expected,
                        actual: None,
                    })
                } else {
                    Ok(())
                }
            });
        remote.expect_append_history().times(1).returning(|_| Ok(()));

        let local = Arc::new(MemoryLocalStore::new());
        local.save(LocalEntry::pending(local_doc.clone())).await.unwrap();
        let engine = SyncEngine::new(
            local.clone(),
            Arc::new(remote),
            Arc::new(WatchNetworkMonitor::online()),
        );

        let outcome = engine
            .sync_with_conflict_resolution(Collection::Settings, &local_doc.key())
            .await
            .unwrap();
        assert_eq!(
            outcome,
            SyncOutcome::Resolved {
                strategy: ResolutionStrategy::LocalNewer,
                local_wins: true
            }
        );
        let stored = local.get(Collection::Settings, &local_doc.key()).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Synced);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_retries_mark_failed_and_keep_local() {
        let h = harness(true);
        let doc = settings_doc("u1");
        h.local.save(LocalEntry::pending(doc.clone())).await.unwrap();
        h.remote
            .fail_key(Collection::Settings, doc.key(), FaultKind::Network)
            .await;

        let err = h
            .engine
            .sync_with_conflict_resolution(Collection::Settings, &doc.key())
            .await
            .unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(h.remote.call_count(), 5);

        let stored = h.local.get(Collection::Settings, &doc.key()).await.unwrap().unwrap();
        assert_eq!(stored.sync_status, SyncStatus::Failed);
        assert_eq!(stored.document, doc);
    }

    #[tokio::test]
    async fn test_save_many_single_round_trip() {
        let h = harness(true);
        let docs = vec![settings_doc("u1"), settings_doc("u2")];
        assert_eq!(h.engine.save_many(docs).await.unwrap(), SyncStatus::Synced);
        assert_eq!(h.remote.call_count(), 1);
        assert!(h.local.list_pending_sync(Collection::Settings).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_events_are_published() {
        let h = harness(true);
        let mut rx = h.engine.subscribe();
        let doc = settings_doc("u1");
        h.engine.save(doc.clone()).await.unwrap();
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::RecordChanged {
                collection: Collection::Settings,
                key: doc.key()
            }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            SyncEvent::RecordSynced {
                collection: Collection::Settings,
                key: doc.key()
            }
        );
    }
}
