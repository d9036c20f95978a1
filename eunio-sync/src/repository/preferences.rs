//! Preferences repository

use super::Repository;
use crate::engine::{SyncEngine, SyncOutcome};
use crate::error::SyncResult;
use crate::models::{RecordKey, UnitSystem, UserPreferences};
use std::sync::Arc;

#[derive(Clone)]
pub struct PreferencesRepository {
    records: Repository<UserPreferences>,
}

impl PreferencesRepository {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            records: Repository::new(engine),
        }
    }

    pub async fn get(&self, user_id: &str) -> SyncResult<Option<UserPreferences>> {
        self.records.get(&RecordKey::for_user(user_id)).await
    }

    /// Stored preferences, or unsaved defaults for a new user.
    pub async fn get_or_default(&self, user_id: &str) -> SyncResult<UserPreferences> {
        Ok(self
            .get(user_id)
            .await?
            .unwrap_or_else(|| UserPreferences::new(user_id)))
    }

    pub async fn save(&self, preferences: UserPreferences) -> SyncResult<UserPreferences> {
        self.records.save(preferences).await
    }

    /// Record an explicit unit choice by the user.
    pub async fn set_unit_system(
        &self,
        user_id: &str,
        unit_system: UnitSystem,
    ) -> SyncResult<UserPreferences> {
        let current = self.get_or_default(user_id).await?;
        self.save(current.with_manual_units(unit_system)).await
    }

    pub async fn clear(&self, user_id: &str) -> SyncResult<()> {
        self.records.delete(&RecordKey::for_user(user_id)).await
    }

    pub async fn sync(&self, user_id: &str) -> SyncResult<SyncOutcome> {
        self.records.sync(&RecordKey::for_user(user_id)).await
    }
}
