//! Settings schema migrations
//!
//! Forward-only. Each step rewrites the raw JSON of the previous version so
//! documents written by old clients can be read even when they no longer
//! deserialize into the current struct.
//!
//! v1 -> v2: adds the `display` and `sync` groups with their defaults.

use crate::error::{SyncError, SyncResult};
use crate::models::{Document, DisplayPreferences, SyncPreferences, UserSettings};
use serde_json::{Map, Value};

/// Upgrade a settings record to `target_version`.
///
/// Downgrades and versions beyond [`UserSettings::CURRENT_VERSION`] fail with
/// [`SyncError::Migration`]. Fields untouched by a step are preserved.
pub fn migrate_settings(record: UserSettings, target_version: u32) -> SyncResult<UserSettings> {
    let from = record.version;
    if from == target_version {
        return Ok(record);
    }
    check_path(from, target_version)?;
    let fields = migrate_settings_fields(serde_json::to_value(&record)?, from, target_version)?;
    Ok(serde_json::from_value(fields)?)
}

/// Apply the JSON migration steps `from -> to`.
pub fn migrate_settings_fields(mut fields: Value, from: u32, to: u32) -> SyncResult<Value> {
    check_path(from, to)?;
    let object = fields
        .as_object_mut()
        .ok_or_else(|| SyncError::Serialization("settings document is not an object".into()))?;

    let mut version = from;
    while version < to {
        match version {
            1 => v1_to_v2(object)?,
            other => {
                return Err(SyncError::Migration {
                    from: other,
                    to: other + 1,
                })
            }
        }
        version += 1;
        object.insert("version".to_string(), Value::from(version));
    }
    Ok(fields)
}

/// Decode a stored settings document, upgrading old schema versions.
///
/// Returns the record and whether it was migrated, so the caller can write
/// the repaired copy back.
pub fn decode_settings(document: &Document) -> SyncResult<(UserSettings, bool)> {
    let current = UserSettings::CURRENT_VERSION;
    if document.version > current {
        return Err(SyncError::Migration {
            from: document.version,
            to: current,
        });
    }
    if document.version == current {
        return Ok((serde_json::from_value(document.fields.clone())?, false));
    }

    let fields = migrate_settings_fields(document.fields.clone(), document.version, current)?;
    let settings: UserSettings = serde_json::from_value(fields)?;
    tracing::debug!(from = document.version, to = current, "Migrated stored settings");
    Ok((settings, true))
}

fn check_path(from: u32, to: u32) -> SyncResult<()> {
    if from == 0 || to < from || to > UserSettings::CURRENT_VERSION {
        return Err(SyncError::Migration { from, to });
    }
    Ok(())
}

fn v1_to_v2(object: &mut Map<String, Value>) -> SyncResult<()> {
    if !object.contains_key("display") {
        object.insert(
            "display".to_string(),
            serde_json::to_value(DisplayPreferences::default())?,
        );
    }
    if !object.contains_key("sync") {
        object.insert(
            "sync".to_string(),
            serde_json::to_value(SyncPreferences::default())?,
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Syncable;

    fn v1_fields() -> Value {
        let mut fields = serde_json::to_value(UserSettings::defaults("u1")).unwrap();
        let object = fields.as_object_mut().unwrap();
        object.remove("display");
        object.remove("sync");
        object.insert("version".into(), 1.into());
        object["cycle"]["averageCycleLength"] = 31.into();
        fields
    }

    #[test]
    fn test_downgrade_rejected() {
        let settings = UserSettings::defaults("u1");
        let err = migrate_settings(settings, 1).unwrap_err();
        assert!(matches!(err, SyncError::Migration { from: 2, to: 1 }));
    }

    #[test]
    fn test_target_beyond_current_rejected() {
        let settings = UserSettings::defaults("u1");
        let err = migrate_settings(settings, UserSettings::CURRENT_VERSION + 1).unwrap_err();
        assert!(matches!(err, SyncError::Migration { .. }));
    }

    #[test]
    fn test_forward_migration_preserves_fields() {
        let mut settings = UserSettings::defaults("u1");
        settings.version = 1;
        settings.cycle.average_cycle_length = 33;
        settings.display.text_size_scale = 1.5;

        let migrated = migrate_settings(settings.clone(), 2).unwrap();
        assert_eq!(migrated.version, 2);
        assert_eq!(migrated.cycle.average_cycle_length, 33);
        assert_eq!(migrated.display.text_size_scale, 1.5);
        assert_eq!(migrated.last_modified, settings.last_modified);
    }

    #[test]
    fn test_same_version_is_noop() {
        let settings = UserSettings::defaults("u1");
        assert_eq!(migrate_settings(settings.clone(), 2).unwrap(), settings);
    }

    #[test]
    fn test_decode_repairs_v1_document() {
        let mut document = UserSettings::defaults("u1").to_document().unwrap();
        document.version = 1;
        document.fields = v1_fields();

        let (settings, repaired) = decode_settings(&document).unwrap();
        assert!(repaired);
        assert_eq!(settings.version, 2);
        assert_eq!(settings.cycle.average_cycle_length, 31);
        assert_eq!(settings.display, DisplayPreferences::default());
        assert_eq!(settings.sync, SyncPreferences::default());
    }

    #[test]
    fn test_decode_rejects_future_document() {
        let mut document = UserSettings::defaults("u1").to_document().unwrap();
        document.version = 9;
        assert!(matches!(
            decode_settings(&document),
            Err(SyncError::Migration { from: 9, to: 2 })
        ));
    }
}
