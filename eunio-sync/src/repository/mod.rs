//! Typed repositories over the sync engine
//!
//! [`Repository`] adds validation, timestamp stamping and decoding on top of
//! the untyped [`SyncEngine`]. The per-entity repositories add the extras of
//! their record type.

pub mod logs;
pub mod preferences;
pub mod settings;

use crate::engine::{SyncEngine, SyncOutcome};
use crate::error::SyncResult;
use crate::models::{next_modification_time, RecordKey, SyncStatus, Syncable};
use std::marker::PhantomData;
use std::sync::Arc;

pub use logs::LogRepository;
pub use preferences::PreferencesRepository;
pub use settings::SettingsRepository;

pub struct Repository<R> {
    engine: Arc<SyncEngine>,
    _record: PhantomData<fn() -> R>,
}

impl<R> Clone for Repository<R> {
    fn clone(&self) -> Self {
        Self {
            engine: self.engine.clone(),
            _record: PhantomData,
        }
    }
}

impl<R: Syncable> Repository<R> {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        Self {
            engine,
            _record: PhantomData,
        }
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.engine
    }

    pub async fn get(&self, key: &RecordKey) -> SyncResult<Option<R>> {
        match self.engine.get(R::COLLECTION, key).await? {
            Some(document) => Ok(Some(R::from_document(&document)?)),
            None => Ok(None),
        }
    }

    /// Validate, stamp and store. Returns the record as stored; a failed
    /// remote push still counts as success.
    pub async fn save(&self, record: R) -> SyncResult<R> {
        record.validate()?;
        let record = self.stamp(record).await?;
        self.engine.save(record.to_document()?).await?;
        Ok(record)
    }

    /// All-or-nothing validation, then one batched push.
    pub async fn save_many(&self, records: Vec<R>) -> SyncResult<Vec<R>> {
        for record in &records {
            record.validate()?;
        }
        let mut stamped = Vec::with_capacity(records.len());
        for record in records {
            stamped.push(self.stamp(record).await?);
        }
        let documents = stamped
            .iter()
            .map(R::to_document)
            .collect::<SyncResult<Vec<_>>>()?;
        self.engine.save_many(documents).await?;
        Ok(stamped)
    }

    pub async fn delete(&self, key: &RecordKey) -> SyncResult<()> {
        self.engine.delete(R::COLLECTION, key).await
    }

    pub async fn sync(&self, key: &RecordKey) -> SyncResult<SyncOutcome> {
        self.engine.sync_with_conflict_resolution(R::COLLECTION, key).await
    }

    /// Local rows of a user, tombstones excluded.
    pub async fn list_for_user(&self, user_id: &str) -> SyncResult<Vec<R>> {
        self.engine
            .local()
            .list_for_user(R::COLLECTION, user_id)
            .await?
            .iter()
            .map(|entry| R::from_document(&entry.document))
            .collect()
    }

    pub async fn sync_status(&self, key: &RecordKey) -> SyncResult<Option<SyncStatus>> {
        Ok(self
            .engine
            .local_entry(R::COLLECTION, key)
            .await?
            .map(|entry| entry.sync_status))
    }

    /// Keys of this user's records that still need a push.
    pub async fn dirty_keys(&self, user_id: &str) -> SyncResult<Vec<RecordKey>> {
        Ok(self
            .engine
            .local()
            .list_pending_sync(R::COLLECTION)
            .await?
            .into_iter()
            .map(|entry| entry.key())
            .filter(|key| key.user_id == user_id)
            .collect())
    }

    async fn stamp(&self, mut record: R) -> SyncResult<R> {
        let previous = self
            .engine
            .local_entry(R::COLLECTION, &record.key())
            .await?
            .map(|entry| entry.document.last_modified);
        record.set_last_modified(next_modification_time(previous));
        Ok(record)
    }
}
