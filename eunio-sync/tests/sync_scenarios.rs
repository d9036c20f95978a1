//! End-to-end sync scenarios over the in-memory and SQLite stores

use chrono::{Duration, NaiveDate};
use eunio_sync::models::UnitSystem;
use eunio_sync::remote::{FaultKind, ResolutionStrategy};
use eunio_sync::{
    Collection, DailyLog, EunioSync, LocalDbConfig, LocalStore, MemoryLocalStore,
    MemoryRemoteStore, RecordKey, RemoteStore, RetryPolicy, SqliteLocalStore, SyncError,
    SyncOptions, SyncOutcome, SyncStatus, Syncable, UserPreferences, UserSettings,
    WatchNetworkMonitor,
};
use std::sync::Arc;
use tempfile::NamedTempFile;

struct World {
    sync: EunioSync,
    local: Arc<MemoryLocalStore>,
    remote: Arc<MemoryRemoteStore>,
    network: Arc<WatchNetworkMonitor>,
}

fn world(online: bool) -> World {
    let local = Arc::new(MemoryLocalStore::new());
    let remote = Arc::new(MemoryRemoteStore::new());
    let network = Arc::new(if online {
        WatchNetworkMonitor::online()
    } else {
        WatchNetworkMonitor::offline()
    });
    let options = SyncOptions {
        auto_sync_on_reconnect: false,
        ..Default::default()
    };
    let sync = EunioSync::new(
        local.clone(),
        remote.clone(),
        network.clone(),
        RetryPolicy::no_retry(),
        options,
    );
    World {
        sync,
        local,
        remote,
        network,
    }
}

fn day(d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
}

#[tokio::test]
async fn test_offline_edits_reach_the_cloud_after_reconnect() {
    let w = world(false);

    w.sync
        .preferences
        .set_unit_system("u1", UnitSystem::Imperial)
        .await
        .unwrap();
    w.sync
        .settings
        .update("u1", |s| s.cycle.average_cycle_length = 30)
        .await
        .unwrap();
    w.sync.logs.save_log(DailyLog::new("u1", day(1))).await.unwrap();
    assert_eq!(w.remote.call_count(), 0);

    w.network.set_connected(true);
    let report = w.sync.service.sync_all().await.unwrap();
    assert_eq!(report.total_records, 3);
    assert!(report.is_success());

    let remote_settings = w
        .remote
        .peek(Collection::Settings, &RecordKey::for_user("u1"))
        .await
        .unwrap();
    let settings = UserSettings::from_document(&remote_settings).unwrap();
    assert_eq!(settings.cycle.average_cycle_length, 30);

    for collection in Collection::ALL {
        assert!(w.local.list_pending_sync(collection).await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn test_newer_remote_edit_wins_over_stale_local_copy() {
    let w = world(false);
    let local = w
        .sync
        .settings
        .update("u1", |s| s.display.high_contrast_mode = true)
        .await
        .unwrap();

    // Another device saved later
    let mut other_device = UserSettings::defaults("u1");
    other_device.cycle.average_cycle_length = 26;
    other_device.last_modified = local.last_modified + Duration::seconds(30);
    w.remote.insert(other_device.to_document().unwrap()).await;

    w.network.set_connected(true);
    let outcome = w.sync.settings.sync("u1").await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Resolved {
            strategy: ResolutionStrategy::RemoteNewer,
            local_wins: false
        }
    );

    let resolved = w.sync.settings.get("u1").await.unwrap().unwrap();
    assert_eq!(resolved, other_device);

    let history = w.sync.settings.history("u1", 5).await.unwrap();
    assert_eq!(history.len(), 1);
    assert!(!history[0].local_wins);
}

#[tokio::test]
async fn test_manual_remote_wins_timestamp_tie() {
    let w = world(false);
    let local = w.sync.preferences.save(UserPreferences::new("u1")).await.unwrap();

    let mut remote = local.clone().with_manual_units(UnitSystem::Imperial);
    remote.last_modified = local.last_modified;
    w.remote.insert(remote.to_document().unwrap()).await;

    w.network.set_connected(true);
    let outcome = w.sync.preferences.sync("u1").await.unwrap();
    assert_eq!(
        outcome,
        SyncOutcome::Resolved {
            strategy: ResolutionStrategy::ManualTieBreak,
            local_wins: false
        }
    );
    let stored = w.sync.preferences.get("u1").await.unwrap().unwrap();
    assert_eq!(stored.unit_system, UnitSystem::Imperial);
}

#[tokio::test]
async fn test_one_failing_record_does_not_block_the_batch() {
    let w = world(false);
    for d in [1, 2, 3] {
        w.sync.logs.save_log(DailyLog::new("u1", day(d))).await.unwrap();
    }
    let blocked = RecordKey::new("u1", "2024-05-02");
    w.remote
        .fail_key(Collection::DailyLogs, blocked.clone(), FaultKind::Server)
        .await;

    w.network.set_connected(true);
    let report = w.sync.service.sync_collection(Collection::DailyLogs).await.unwrap();
    assert_eq!(report.total_records, 3);
    assert_eq!(report.success_count, 2);
    assert_eq!(report.failure_count, 1);

    let pending = w.local.list_pending_sync(Collection::DailyLogs).await.unwrap();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].key(), blocked);
    assert_eq!(pending[0].sync_status, SyncStatus::Failed);

    // Failed records stay eligible for the next pass
    w.remote.clear_faults().await;
    let retry = w.sync.service.sync_all().await.unwrap();
    assert_eq!(retry.total_records, 1);
    assert!(retry.is_success());
}

#[tokio::test]
async fn test_invalid_settings_never_touch_storage() {
    let w = world(true);
    let mut settings = UserSettings::defaults("u1");
    settings.cycle.average_cycle_length = 50;
    assert!(matches!(
        w.sync.settings.save(settings).await,
        Err(SyncError::Validation(_))
    ));
    assert_eq!(w.local.write_count(), 0);
    assert_eq!(w.remote.call_count(), 0);
}

#[tokio::test]
async fn test_saving_identical_content_twice_keeps_one_record() {
    let w = world(true);
    let prefs = UserPreferences::new("u1").with_manual_units(UnitSystem::Imperial);
    let first = w.sync.preferences.save(prefs.clone()).await.unwrap();
    let second = w.sync.preferences.save(prefs).await.unwrap();

    assert!(second.last_modified > first.last_modified);
    assert_eq!(w.remote.document_count().await, 1);
    let rows = w.local.list_for_user(Collection::Preferences, "u1").await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].document.fields["unitSystem"], "IMPERIAL");
}

#[tokio::test]
async fn test_sqlite_store_survives_reopen() {
    let temp_file = NamedTempFile::new().unwrap();
    let config = LocalDbConfig {
        db_path: temp_file.path().to_str().unwrap().to_string(),
        ..Default::default()
    };
    let remote = Arc::new(MemoryRemoteStore::new());

    {
        let store = Arc::new(SqliteLocalStore::new(config.clone()).await.unwrap());
        let sync = EunioSync::new(
            store,
            remote.clone(),
            Arc::new(WatchNetworkMonitor::offline()),
            RetryPolicy::no_retry(),
            SyncOptions::default(),
        );
        let mut log = DailyLog::new("u1", day(9));
        log.notes = Some("first day".into());
        sync.logs.save_log(log).await.unwrap();
    }

    let store = Arc::new(SqliteLocalStore::new(config).await.unwrap());
    let pending = store.list_pending_sync(Collection::DailyLogs).await.unwrap();
    assert_eq!(pending.len(), 1);
    let log = DailyLog::from_document(&pending[0].document).unwrap();
    assert_eq!(log.notes.as_deref(), Some("first day"));
    assert!(remote.history(Collection::DailyLogs, "u1", 1).await.unwrap().is_empty());
}
