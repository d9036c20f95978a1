//! Settings repository
//!
//! Adds read repair of old schema versions, backup/restore/export and
//! access to the remote resolution history on top of the generic
//! repository.

use super::Repository;
use crate::backup::{SettingsBackup, SettingsExport};
use crate::engine::{SyncEngine, SyncOutcome};
use crate::error::{SyncError, SyncResult};
use crate::migration::decode_settings;
use crate::models::{Collection, RecordKey, Syncable, UserSettings};
use crate::remote::HistoryEntry;
use logger_redacted::correlation_id;
use std::sync::Arc;

#[derive(Clone)]
pub struct SettingsRepository {
    records: Repository<UserSettings>,
}

impl SettingsRepository {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            records: Repository::new(engine),
        }
    }

    fn engine(&self) -> &Arc<SyncEngine> {
        self.records.engine()
    }

    /// Stored settings; older schema versions are migrated and written back
    /// as PENDING.
    pub async fn get(&self, user_id: &str) -> SyncResult<Option<UserSettings>> {
        let key = RecordKey::for_user(user_id);
        let Some(document) = self.engine().get(Collection::Settings, &key).await? else {
            return Ok(None);
        };

        let (settings, repaired) = decode_settings(&document)?;
        if !repaired {
            return Ok(Some(settings));
        }
        tracing::info!(
            user = %correlation_id(user_id),
            from = document.version,
            to = settings.version,
            "Repairing stored settings"
        );
        Ok(Some(self.records.save(settings).await?))
    }

    pub async fn get_or_default(&self, user_id: &str) -> SyncResult<UserSettings> {
        Ok(self
            .get(user_id)
            .await?
            .unwrap_or_else(|| UserSettings::defaults(user_id)))
    }

    pub async fn save(&self, settings: UserSettings) -> SyncResult<UserSettings> {
        self.records.save(settings).await
    }

    /// Read, modify and save. The closure sees defaults for a new user.
    pub async fn update<F>(&self, user_id: &str, change: F) -> SyncResult<UserSettings>
    where
        F: FnOnce(&mut UserSettings),
    {
        let mut settings = self.get_or_default(user_id).await?;
        change(&mut settings);
        self.save(settings).await
    }

    pub async fn reset_to_defaults(&self, user_id: &str) -> SyncResult<UserSettings> {
        self.save(UserSettings::defaults(user_id)).await
    }

    pub async fn delete(&self, user_id: &str) -> SyncResult<()> {
        self.records.delete(&RecordKey::for_user(user_id)).await
    }

    pub async fn sync(&self, user_id: &str) -> SyncResult<SyncOutcome> {
        self.records.sync(&RecordKey::for_user(user_id)).await
    }

    /// Versioned JSON backup of the current settings.
    pub async fn backup(&self, user_id: &str) -> SyncResult<String> {
        let settings = self.get_or_default(user_id).await?;
        SettingsBackup::new(&settings).to_json()
    }

    /// Restore a backup for `user_id`. The payload is parsed strictly and
    /// re-validated; the restored record is saved as a fresh mutation.
    pub async fn restore(&self, user_id: &str, json: &str) -> SyncResult<UserSettings> {
        let backup = SettingsBackup::parse(json)?;
        if backup.user_id() != user_id {
            return Err(SyncError::validation(
                "backup belongs to a different user",
            ));
        }
        let mut settings = backup.into_settings();
        if settings.version < UserSettings::CURRENT_VERSION {
            settings = crate::migration::migrate_settings(settings, UserSettings::CURRENT_VERSION)?;
        }
        settings.validate()?;
        tracing::info!(user = %correlation_id(user_id), "Restoring settings from backup");
        self.save(settings).await
    }

    pub async fn export(&self, user_id: &str) -> SyncResult<String> {
        let settings = self.get_or_default(user_id).await?;
        SettingsExport::new(&settings).to_json()
    }

    /// Remote audit log of resolved conflicts, most recent first.
    pub async fn history(&self, user_id: &str, limit: usize) -> SyncResult<Vec<HistoryEntry>> {
        self.engine()
            .history(Collection::Settings, user_id, limit)
            .await
    }
}
