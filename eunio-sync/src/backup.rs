//! Settings backup and export payloads
//!
//! A backup is a JSON object tagged by its format version `v`. Parsing is
//! strict: unknown versions and unknown top-level fields are rejected rather
//! than guessed at.

use crate::error::{SyncError, SyncResult};
use crate::models::{CustomizationFlags, Syncable, UserSettings};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const BACKUP_FORMAT_VERSION: u64 = 1;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct SettingsBackupV1 {
    pub v: u64,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub settings: UserSettings,
}

#[derive(Debug, Clone, PartialEq)]
pub enum SettingsBackup {
    V1(SettingsBackupV1),
}

impl SettingsBackup {
    pub fn new(settings: &UserSettings) -> Self {
        SettingsBackup::V1(SettingsBackupV1 {
            v: BACKUP_FORMAT_VERSION,
            user_id: settings.user_id.clone(),
            created_at: Utc::now(),
            settings: settings.clone(),
        })
    }

    pub fn parse(json: &str) -> SyncResult<Self> {
        let value: Value = serde_json::from_str(json)?;
        let version = value
            .get("v")
            .and_then(Value::as_u64)
            .ok_or_else(|| SyncError::Serialization("backup is missing its version tag".into()))?;

        match version {
            1 => {
                let backup: SettingsBackupV1 = serde_json::from_value(value)?;
                if backup.user_id != backup.settings.user_id {
                    return Err(SyncError::validation(
                        "backup owner does not match the settings it contains",
                    ));
                }
                backup.settings.validate()?;
                Ok(SettingsBackup::V1(backup))
            }
            other => Err(SyncError::UnsupportedBackupVersion(other)),
        }
    }

    pub fn to_json(&self) -> SyncResult<String> {
        match self {
            SettingsBackup::V1(backup) => Ok(serde_json::to_string_pretty(backup)?),
        }
    }

    pub fn user_id(&self) -> &str {
        match self {
            SettingsBackup::V1(backup) => &backup.user_id,
        }
    }

    pub fn settings(&self) -> &UserSettings {
        match self {
            SettingsBackup::V1(backup) => &backup.settings,
        }
    }

    pub fn into_settings(self) -> UserSettings {
        match self {
            SettingsBackup::V1(backup) => backup.settings,
        }
    }
}

/// User-facing export: the backup plus portability metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsExport {
    pub exported_at: DateTime<Utc>,
    pub app_version: String,
    pub customization: CustomizationFlags,
    pub backup: SettingsBackupV1,
}

impl SettingsExport {
    pub fn new(settings: &UserSettings) -> Self {
        let backup = match SettingsBackup::new(settings) {
            SettingsBackup::V1(backup) => backup,
        };
        Self {
            exported_at: Utc::now(),
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            customization: settings.customization_flags(),
            backup,
        }
    }

    pub fn to_json(&self) -> SyncResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
