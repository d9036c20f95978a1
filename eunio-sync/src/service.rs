//! Batch sync orchestration
//!
//! A pass walks every dirty local row (PENDING or FAILED, tombstones
//! included) of every collection and reconciles it on its own retry budget.
//! One bad record never blocks the rest of the queue.

use crate::engine::{SyncEngine, SyncOutcome};
use crate::error::{SyncError, SyncResult};
use crate::events::{SyncEvent, SyncRequestReceiver};
use crate::models::{Collection, RecordKey};
use crate::network::{ConnectionType, NetworkState};
use logger_redacted::{correlation_id, redact};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Aggregated result of a sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub total_records: usize,
    pub success_count: usize,
    pub failure_count: usize,
    /// Redacted, one per failed record
    pub errors: Vec<String>,
}

impl SyncReport {
    /// Count one record. Local storage failures abort the pass.
    pub(crate) fn record(
        &mut self,
        collection: Collection,
        key: &RecordKey,
        result: SyncResult<SyncOutcome>,
    ) -> SyncResult<()> {
        self.total_records += 1;
        match result {
            Ok(_) => self.success_count += 1,
            Err(err) if err.is_local_storage() => return Err(err),
            Err(err) => {
                self.failure_count += 1;
                self.errors.push(redact(&format!(
                    "{} {}/{}: {}",
                    collection,
                    correlation_id(&key.user_id),
                    key.id,
                    err
                )));
            }
        }
        Ok(())
    }

    pub fn merge(&mut self, other: SyncReport) {
        self.total_records += other.total_records;
        self.success_count += other.success_count;
        self.failure_count += other.failure_count;
        self.errors.extend(other.errors);
    }

    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncOptions {
    /// Run a pass whenever connectivity comes back
    pub auto_sync_on_reconnect: bool,
    /// Skip automatic passes on cellular connections
    pub wifi_only: bool,
}

impl Default for SyncOptions {
    fn default() -> Self {
        Self {
            auto_sync_on_reconnect: true,
            wifi_only: false,
        }
    }
}

impl SyncOptions {
    fn allows(&self, state: &NetworkState) -> bool {
        state.connected && !(self.wifi_only && state.connection_type == ConnectionType::Cellular)
    }
}

pub struct SyncService {
    engine: Arc<SyncEngine>,
    options: SyncOptions,
}

impl SyncService {
    pub fn new(engine: Arc<SyncEngine>, options: SyncOptions) -> Self {
        Self { engine, options }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    /// Dirty rows per collection.
    pub async fn pending_counts(&self) -> SyncResult<Vec<(Collection, usize)>> {
        let mut counts = Vec::with_capacity(Collection::ALL.len());
        for collection in Collection::ALL {
            let pending = self.engine.local().list_pending_sync(collection).await?;
            counts.push((collection, pending.len()));
        }
        Ok(counts)
    }

    pub async fn sync_all(&self) -> SyncResult<SyncReport> {
        self.sync_collections(&Collection::ALL).await
    }

    pub async fn sync_collection(&self, collection: Collection) -> SyncResult<SyncReport> {
        self.sync_collections(&[collection]).await
    }

    async fn sync_collections(&self, collections: &[Collection]) -> SyncResult<SyncReport> {
        if !self.engine.is_online() {
            return Err(SyncError::Network("device is offline".to_string()));
        }

        let mut queue = Vec::new();
        for &collection in collections {
            for entry in self.engine.local().list_pending_sync(collection).await? {
                queue.push((collection, entry.key()));
            }
        }

        info!(total = queue.len(), "Starting sync pass");
        self.engine.emit(SyncEvent::SyncStarted {
            total_records: queue.len(),
        });

        let mut report = SyncReport::default();
        for (collection, key) in queue {
            let result = self
                .engine
                .sync_with_conflict_resolution(collection, &key)
                .await;
            report.record(collection, &key, result)?;
        }

        info!(
            total = report.total_records,
            succeeded = report.success_count,
            failed = report.failure_count,
            "Sync pass finished"
        );
        self.engine.emit(SyncEvent::SyncCompleted {
            success_count: report.success_count,
            failure_count: report.failure_count,
        });
        Ok(report)
    }

    /// Drain write-path requests until every sender is dropped. Requests
    /// seen while offline are skipped; the record stays dirty for the next
    /// pass.
    pub async fn run_worker(&self, mut requests: SyncRequestReceiver) {
        while let Some(request) = requests.recv().await {
            if !self.engine.is_online() {
                debug!(collection = %request.collection, "Offline, deferring queued sync");
                continue;
            }
            let result = self
                .engine
                .sync_with_conflict_resolution(request.collection, &request.key)
                .await;
            match result {
                Ok(outcome) => debug!(
                    collection = %request.collection,
                    user = %correlation_id(&request.key.user_id),
                    outcome = ?outcome,
                    "Queued sync done"
                ),
                Err(err) => warn!(
                    collection = %request.collection,
                    user = %correlation_id(&request.key.user_id),
                    error = %err,
                    "Queued sync failed"
                ),
            }
        }
        debug!("Sync request channel closed, worker exiting");
    }

    pub fn spawn_worker(self: &Arc<Self>, requests: SyncRequestReceiver) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move { service.run_worker(requests).await })
    }

    /// Run a full pass every time connectivity goes from offline to online.
    pub fn spawn_auto_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        let mut changes = service.engine.network().subscribe();
        let mut was_connected = changes.borrow_and_update().connected;
        tokio::spawn(async move {
            while changes.changed().await.is_ok() {
                let state = *changes.borrow_and_update();
                let restored = state.connected && !was_connected;
                was_connected = state.connected;

                if !restored || !service.options.auto_sync_on_reconnect {
                    continue;
                }
                if !service.options.allows(&state) {
                    debug!(connection = ?state.connection_type, "Auto-sync skipped on this connection");
                    continue;
                }

                info!("Connectivity restored, syncing");
                match service.sync_all().await {
                    Ok(report) if !report.is_success() => {
                        warn!(failed = report.failure_count, "Auto-sync left records dirty")
                    }
                    Ok(_) => {}
                    Err(err) => error!(error = %err, "Auto-sync failed"),
                }
            }
        })
    }

    /// Drop every local row of the user (app data reset). Remote data is
    /// untouched.
    pub async fn reset_local_data(&self, user_id: &str) -> SyncResult<u64> {
        let removed = self.engine.local().purge_user(user_id).await?;
        info!(user = %correlation_id(user_id), removed, "Local data reset");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::local::{LocalStore, MemoryLocalStore};
    use crate::models::{LocalEntry, Syncable, UserPreferences, UserSettings};
    use crate::network::{NetworkMonitor, WatchNetworkMonitor};
    use crate::remote::{FaultKind, MemoryRemoteStore};
    use std::time::Duration;

    struct Fixture {
        service: Arc<SyncService>,
        local: Arc<MemoryLocalStore>,
        remote: Arc<MemoryRemoteStore>,
        network: Arc<WatchNetworkMonitor>,
    }

    fn fixture(online: bool, options: SyncOptions) -> Fixture {
        let local = Arc::new(MemoryLocalStore::new());
        let remote = Arc::new(MemoryRemoteStore::new());
        let network = Arc::new(if online {
            WatchNetworkMonitor::online()
        } else {
            WatchNetworkMonitor::offline()
        });
        let engine = Arc::new(SyncEngine::new(local.clone(), remote.clone(), network.clone()));
        Fixture {
            service: Arc::new(SyncService::new(engine, options)),
            local,
            remote,
            network,
        }
    }

    async fn seed_pending(local: &MemoryLocalStore, users: &[&str]) {
        for user in users {
            let doc = UserSettings::defaults(*user).to_document().unwrap();
            local.save(LocalEntry::pending(doc)).await.unwrap();
        }
    }

    #[test]
    fn test_report_redacts_errors() {
        let mut report = SyncReport::default();
        let key = RecordKey::for_user("jane@example.com");
        report
            .record(
                Collection::Settings,
                &key,
                Err(SyncError::Permission("denied for jane@example.com".into())),
            )
            .unwrap();
        report
            .record(Collection::Settings, &key, Ok(SyncOutcome::Pushed))
            .unwrap();
        assert_eq!(report.total_records, 2);
        assert_eq!(report.failure_count, 1);
        assert!(!report.errors[0].contains("jane@example.com"));
    }

    #[tokio::test]
    async fn test_sync_all_offline_fails() {
        let f = fixture(false, SyncOptions::default());
        assert!(matches!(
            f.service.sync_all().await,
            Err(SyncError::Network(_))
        ));
    }

    #[tokio::test]
    async fn test_partial_failure_isolation() {
        let f = fixture(true, SyncOptions::default());
        seed_pending(&f.local, &["a", "b", "c"]).await;
        f.remote
            .fail_key(Collection::Settings, RecordKey::for_user("b"), FaultKind::Authentication)
            .await;

        let report = f.service.sync_all().await.unwrap();
        assert_eq!(report.total_records, 3);
        assert_eq!(report.success_count, 2);
        assert_eq!(report.failure_count, 1);
        assert_eq!(report.errors.len(), 1);

        let pending = f.local.list_pending_sync(Collection::Settings).await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].key(), RecordKey::for_user("b"));
    }

    #[tokio::test]
    async fn test_sync_collection_limits_scope() {
        let f = fixture(true, SyncOptions::default());
        seed_pending(&f.local, &["a"]).await;
        let prefs = UserPreferences::new("a").to_document().unwrap();
        f.local.save(LocalEntry::pending(prefs)).await.unwrap();

        let report = f.service.sync_collection(Collection::Preferences).await.unwrap();
        assert_eq!(report.total_records, 1);
        let counts = f.service.pending_counts().await.unwrap();
        assert!(counts.contains(&(Collection::Settings, 1)));
        assert!(counts.contains(&(Collection::Preferences, 0)));
    }

    #[tokio::test]
    async fn test_worker_drains_requests() {
        let f = fixture(true, SyncOptions::default());
        seed_pending(&f.local, &["a"]).await;
        let (tx, rx) = crate::events::sync_request_channel();
        tx.send(crate::events::SyncRequest {
            collection: Collection::Settings,
            key: RecordKey::for_user("a"),
        })
        .unwrap();
        drop(tx);

        f.service.run_worker(rx).await;
        assert!(f.remote.peek(Collection::Settings, &RecordKey::for_user("a")).await.is_some());
    }

    #[tokio::test]
    async fn test_auto_sync_on_reconnect() {
        let f = fixture(false, SyncOptions::default());
        seed_pending(&f.local, &["a", "b"]).await;
        let mut events = f.service.engine().subscribe();
        let handle = f.service.spawn_auto_sync();

        f.network.set_connected(true);
        let completed = tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if let Ok(SyncEvent::SyncCompleted { success_count, .. }) = events.recv().await {
                    return success_count;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(completed, 2);
        assert!(f.network.is_connected());
        handle.abort();
    }

    #[tokio::test]
    async fn test_wifi_only_skips_cellular() {
        let options = SyncOptions {
            wifi_only: true,
            ..Default::default()
        };
        assert!(!options.allows(&NetworkState::online(ConnectionType::Cellular)));
        assert!(options.allows(&NetworkState::online(ConnectionType::Wifi)));
        assert!(!options.allows(&NetworkState::offline()));
    }

    #[tokio::test]
    async fn test_reset_local_data() {
        let f = fixture(false, SyncOptions::default());
        seed_pending(&f.local, &["a", "b"]).await;
        assert_eq!(f.service.reset_local_data("a").await.unwrap(), 1);
        assert_eq!(f.local.len().await, 1);
    }
}
