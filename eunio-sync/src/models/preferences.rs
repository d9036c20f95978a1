//! User preferences record

use super::{validate_user_id, Collection, RecordKey, Syncable};
use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum UnitSystem {
    #[default]
    Metric,
    Imperial,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserPreferences {
    pub user_id: String,
    pub unit_system: UnitSystem,
    /// Chosen by the user rather than derived from the device locale
    pub is_manually_set: bool,
    pub last_modified: DateTime<Utc>,
    pub version: u32,
}

impl UserPreferences {
    pub const CURRENT_VERSION: u32 = 1;

    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            unit_system: UnitSystem::default(),
            is_manually_set: false,
            last_modified: Utc::now(),
            version: Self::CURRENT_VERSION,
        }
    }

    /// Preferences after the user explicitly picked a unit system.
    pub fn with_manual_units(mut self, unit_system: UnitSystem) -> Self {
        self.unit_system = unit_system;
        self.is_manually_set = true;
        self
    }
}

impl Syncable for UserPreferences {
    const COLLECTION: Collection = Collection::Preferences;

    fn key(&self) -> RecordKey {
        RecordKey::for_user(self.user_id.clone())
    }

    fn last_modified(&self) -> DateTime<Utc> {
        self.last_modified
    }

    fn set_last_modified(&mut self, at: DateTime<Utc>) {
        self.last_modified = at;
    }

    fn is_manual(&self) -> bool {
        self.is_manually_set
    }

    fn schema_version(&self) -> u32 {
        self.version
    }

    fn validate(&self) -> SyncResult<()> {
        validate_user_id(&self.user_id)?;
        if self.version == 0 || self.version > Self::CURRENT_VERSION {
            return Err(SyncError::validation(format!(
                "unsupported preferences version {}",
                self.version
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_document_round_trip() {
        let prefs = UserPreferences::new("user-1").with_manual_units(UnitSystem::Imperial);
        let doc = prefs.to_document().unwrap();
        assert_eq!(doc.collection, Collection::Preferences);
        assert_eq!(doc.id, "user-1");
        assert!(doc.manual);
        assert_eq!(doc.fields["unitSystem"], "IMPERIAL");
        assert_eq!(UserPreferences::from_document(&doc).unwrap(), prefs);
    }

    #[test]
    fn test_validation() {
        assert!(UserPreferences::new("u").validate().is_ok());
        assert!(UserPreferences::new("  ").validate().is_err());

        let mut future = UserPreferences::new("u");
        future.version = 9;
        assert!(matches!(future.validate(), Err(SyncError::Validation(_))));
    }
}
