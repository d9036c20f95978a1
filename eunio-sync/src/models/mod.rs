//! Domain records and the storage envelope they travel in
//!
//! Every record crosses the storage boundary as a [`Document`]: a small
//! envelope carrying the key, `last_modified`, the schema version `v`, the
//! manual/customized tie-break flag and the record itself as a JSON object.
//! Local rows wrap the document in a [`LocalEntry`] that adds the sync status.

pub mod daily_log;
pub mod preferences;
pub mod settings;

use crate::error::{SyncError, SyncResult};
use chrono::{DateTime, Duration, SubsecRound, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

pub use daily_log::{
    CervicalMucus, DailyLog, Mood, OvulationTestResult, PeriodFlow, Protection, SexualActivity,
    Symptom,
};
pub use preferences::{UnitSystem, UserPreferences};
pub use settings::{
    CustomizationFlags, CyclePreferences, DisplayPreferences, HapticIntensity,
    NotificationPreferences, PrivacyPreferences, ReminderPreference, SyncPreferences,
    TemperatureUnit, UnitPreferences, UserSettings, WeightUnit,
};

/// Entity collections; one local table and one remote collection each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Preferences,
    Settings,
    DailyLogs,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Preferences,
        Collection::Settings,
        Collection::DailyLogs,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Collection::Preferences => "preferences",
            Collection::Settings => "settings",
            Collection::DailyLogs => "daily_logs",
        }
    }

    pub fn from_str(s: &str) -> SyncResult<Self> {
        match s {
            "preferences" => Ok(Collection::Preferences),
            "settings" => Ok(Collection::Settings),
            "daily_logs" => Ok(Collection::DailyLogs),
            _ => Err(SyncError::Internal(format!("Unknown collection: {}", s))),
        }
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-record sync state. Owned by the engine; stores only persist it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncStatus {
    Pending,
    Synced,
    Failed,
}

impl SyncStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Pending => "PENDING",
            SyncStatus::Synced => "SYNCED",
            SyncStatus::Failed => "FAILED",
        }
    }

    pub fn from_str(s: &str) -> SyncResult<Self> {
        match s {
            "PENDING" => Ok(SyncStatus::Pending),
            "SYNCED" => Ok(SyncStatus::Synced),
            "FAILED" => Ok(SyncStatus::Failed),
            _ => Err(SyncError::DataSync(format!("Unknown sync status: {}", s))),
        }
    }

    /// A record is dirty until it has been durably pushed.
    pub fn is_dirty(&self) -> bool {
        *self != SyncStatus::Synced
    }
}

/// Storage key. Preferences and settings use `id == user_id`; daily logs use
/// the ISO date.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RecordKey {
    pub user_id: String,
    pub id: String,
}

impl RecordKey {
    pub fn new(user_id: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            id: id.into(),
        }
    }

    /// Key of a one-record-per-user collection.
    pub fn for_user(user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        Self {
            id: user_id.clone(),
            user_id,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.user_id, self.id)
    }
}

/// Storage envelope shared by the local and remote stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    pub collection: Collection,
    pub user_id: String,
    pub id: String,
    pub last_modified: DateTime<Utc>,
    /// Schema version of `fields`
    #[serde(rename = "v")]
    pub version: u32,
    /// Explicit user action; wins timestamp ties
    pub manual: bool,
    pub fields: serde_json::Value,
}

impl Document {
    pub fn key(&self) -> RecordKey {
        RecordKey::new(self.user_id.clone(), self.id.clone())
    }

    /// Same stored state on both sides; nothing to push or pull.
    pub fn same_content(&self, other: &Document) -> bool {
        self.last_modified == other.last_modified
            && self.version == other.version
            && self.manual == other.manual
            && self.fields == other.fields
    }

    /// Top-level field names whose values differ between the two documents.
    pub fn diff_fields(&self, other: &Document) -> Vec<String> {
        let mut diffs = Vec::new();
        if let (Some(ours), Some(theirs)) = (self.fields.as_object(), other.fields.as_object()) {
            for (name, value) in ours {
                if theirs.get(name) != Some(value) {
                    diffs.push(name.clone());
                }
            }
            for name in theirs.keys() {
                if !ours.contains_key(name) {
                    diffs.push(name.clone());
                }
            }
        }
        diffs.sort();
        diffs
    }
}

/// A local row: the document plus its sync bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalEntry {
    pub document: Document,
    pub sync_status: SyncStatus,
    /// Tombstone waiting for its delete to reach the remote store
    pub deleted: bool,
    pub updated_at: DateTime<Utc>,
}

impl LocalEntry {
    pub fn pending(document: Document) -> Self {
        Self::with_status(document, SyncStatus::Pending)
    }

    pub fn synced(document: Document) -> Self {
        Self::with_status(document, SyncStatus::Synced)
    }

    pub fn tombstone(document: Document) -> Self {
        Self {
            deleted: true,
            ..Self::pending(document)
        }
    }

    fn with_status(document: Document, sync_status: SyncStatus) -> Self {
        Self {
            document,
            sync_status,
            deleted: false,
            updated_at: Utc::now(),
        }
    }

    pub fn collection(&self) -> Collection {
        self.document.collection
    }

    pub fn key(&self) -> RecordKey {
        self.document.key()
    }

    pub fn is_dirty(&self) -> bool {
        self.sync_status.is_dirty()
    }
}

/// A domain record that can be stored locally and synced remotely.
pub trait Syncable: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    const COLLECTION: Collection;

    fn key(&self) -> RecordKey;

    fn last_modified(&self) -> DateTime<Utc>;

    fn set_last_modified(&mut self, at: DateTime<Utc>);

    /// Whether the value came from an explicit user action.
    fn is_manual(&self) -> bool;

    fn schema_version(&self) -> u32;

    /// Domain invariants checked before any storage write.
    fn validate(&self) -> SyncResult<()>;

    fn to_document(&self) -> SyncResult<Document> {
        let key = self.key();
        Ok(Document {
            collection: Self::COLLECTION,
            user_id: key.user_id,
            id: key.id,
            last_modified: self.last_modified(),
            version: self.schema_version(),
            manual: self.is_manual(),
            fields: serde_json::to_value(self)?,
        })
    }

    fn from_document(document: &Document) -> SyncResult<Self> {
        if document.collection != Self::COLLECTION {
            return Err(SyncError::Internal(format!(
                "Expected a {} document, got {}",
                Self::COLLECTION,
                document.collection
            )));
        }
        Ok(serde_json::from_value(document.fields.clone())?)
    }
}

/// Next `last_modified` for a record: wall clock at millisecond precision,
/// bumped past `previous` so the value strictly increases per mutation.
pub fn next_modification_time(previous: Option<DateTime<Utc>>) -> DateTime<Utc> {
    let now = Utc::now().trunc_subsecs(3);
    match previous {
        Some(prev) if now <= prev => prev + Duration::milliseconds(1),
        _ => now,
    }
}

pub(crate) fn validate_user_id(user_id: &str) -> SyncResult<()> {
    if user_id.trim().is_empty() {
        return Err(SyncError::validation("user_id must not be empty"));
    }
    Ok(())
}
