//! Offline-first synchronization layer for Eunio
//!
//! Provides:
//! - Local SQLite store that keeps every record available offline
//! - Remote document gateway client with classified failures
//! - Last-write-wins conflict resolution with manual tie-break
//! - Exponential backoff for transient remote failures
//! - Connectivity-aware batch sync with partial-failure isolation

pub mod backup;
pub mod conflict;
pub mod engine;
pub mod error;
pub mod events;
pub mod local;
pub mod migration;
pub mod models;
pub mod network;
pub mod remote;
pub mod repository;
pub mod retry;
pub mod service;

pub use engine::{SyncEngine, SyncOutcome};
pub use error::{SyncError, SyncResult};
pub use events::{SyncEvent, SyncRequest};
pub use local::{LocalDbConfig, LocalStore, MemoryLocalStore, SqliteLocalStore};
pub use models::{Collection, DailyLog, Document, RecordKey, SyncStatus, Syncable, UserPreferences, UserSettings};
pub use network::{ConnectionType, NetworkMonitor, NetworkState, WatchNetworkMonitor};
pub use remote::{HttpRemoteConfig, HttpRemoteStore, MemoryRemoteStore, RemoteStore};
pub use repository::{LogRepository, PreferencesRepository, SettingsRepository};
pub use retry::RetryPolicy;
pub use service::{SyncOptions, SyncReport, SyncService};

use std::sync::Arc;
use tokio::task::JoinHandle;

/// Fully wired sync layer: one engine shared by the repositories and the
/// sync service, with the write-path queue feeding the service's worker.
pub struct EunioSync {
    pub preferences: PreferencesRepository,
    pub settings: SettingsRepository,
    pub logs: LogRepository,
    pub service: Arc<SyncService>,
    worker: JoinHandle<()>,
    auto_sync: Option<JoinHandle<()>>,
}

impl EunioSync {
    /// Wire the layer and start the background worker (plus auto-sync when
    /// enabled). Must be called inside a tokio runtime.
    pub fn new(
        local: Arc<dyn LocalStore>,
        remote: Arc<dyn RemoteStore>,
        network: Arc<dyn NetworkMonitor>,
        retry: RetryPolicy,
        options: SyncOptions,
    ) -> Self {
        let (requests, queue) = events::sync_request_channel();
        let engine = Arc::new(
            SyncEngine::new(local, remote, network)
                .with_retry_policy(retry)
                .with_request_sender(requests),
        );
        let auto_sync_enabled = options.auto_sync_on_reconnect;
        let service = Arc::new(SyncService::new(engine.clone(), options));
        let worker = service.spawn_worker(queue);
        let auto_sync = auto_sync_enabled.then(|| service.spawn_auto_sync());

        Self {
            preferences: PreferencesRepository::new(engine.clone()),
            settings: SettingsRepository::new(engine.clone()),
            logs: LogRepository::new(engine),
            service,
            worker,
            auto_sync,
        }
    }

    /// SQLite store plus HTTP gateway.
    pub async fn open(
        database: LocalDbConfig,
        remote: HttpRemoteConfig,
        network: Arc<dyn NetworkMonitor>,
        retry: RetryPolicy,
        options: SyncOptions,
    ) -> SyncResult<Self> {
        let local = SqliteLocalStore::new(database).await?;
        let remote = HttpRemoteStore::new(remote)?;
        Ok(Self::new(Arc::new(local), Arc::new(remote), network, retry, options))
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        self.service.engine()
    }
}

// The worker holds the engine, and the engine holds the worker's sender
impl Drop for EunioSync {
    fn drop(&mut self) {
        self.worker.abort();
        if let Some(auto_sync) = &self.auto_sync {
            auto_sync.abort();
        }
    }
}
