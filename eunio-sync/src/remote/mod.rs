//! Cloud document-store port
//!
//! One collection per entity type, document id equal to the local key. The
//! store knows nothing about local state. Failures are classified so the
//! engine can tell transient errors (network, timeout, 5xx) from permanent
//! ones (authentication, permission, not found, conflict).

pub mod http;
pub mod memory;

use crate::error::SyncResult;
use crate::models::{Collection, Document, RecordKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub use http::{HttpRemoteConfig, HttpRemoteStore};
pub use memory::{FaultKind, MemoryRemoteStore};

/// How a sync resolution was decided
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    /// Local copy was strictly newer
    LocalNewer,
    /// Remote copy was strictly newer
    RemoteNewer,
    /// Same timestamp; the manually set side won
    ManualTieBreak,
    /// Same timestamp and same manual flag; local kept
    LocalTieBreak,
}

impl ResolutionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LocalNewer => "local_newer",
            Self::RemoteNewer => "remote_newer",
            Self::ManualTieBreak => "manual_tie_break",
            Self::LocalTieBreak => "local_tie_break",
        }
    }
}

/// Audit entry describing one resolved divergence between the stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub collection: Collection,
    pub user_id: String,
    pub record_id: String,
    pub strategy: ResolutionStrategy,
    pub local_wins: bool,
    pub local_last_modified: DateTime<Utc>,
    pub remote_last_modified: DateTime<Utc>,
    /// Top-level fields that differed
    pub changed_fields: Vec<String>,
    pub resolved_at: DateTime<Utc>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait RemoteStore: Send + Sync {
    async fn get(&self, collection: Collection, key: &RecordKey) -> SyncResult<Option<Document>>;

    /// Create or overwrite.
    async fn save(&self, document: Document) -> SyncResult<()>;

    /// Overwrite an existing document; `NotFound` when absent.
    async fn update(&self, document: Document) -> SyncResult<()>;

    async fn delete(&self, collection: Collection, key: &RecordKey) -> SyncResult<()>;

    /// Overwrite only if the stored `last_modified` still equals `expected`,
    /// otherwise fail with `Conflict`.
    async fn conditional_update(
        &self,
        document: Document,
        expected_last_modified: DateTime<Utc>,
    ) -> SyncResult<()>;

    /// Delete only if the stored `last_modified` still equals `expected`,
    /// otherwise fail with `Conflict`. Already gone counts as deleted.
    async fn conditional_delete(
        &self,
        collection: Collection,
        key: &RecordKey,
        expected_last_modified: DateTime<Utc>,
    ) -> SyncResult<()>;

    async fn exists(&self, collection: Collection, key: &RecordKey) -> SyncResult<bool>;

    /// Documents of a user with `from_id <= id <= to_id`, ordered by id.
    async fn query_range(
        &self,
        collection: Collection,
        user_id: &str,
        from_id: &str,
        to_id: &str,
    ) -> SyncResult<Vec<Document>>;

    /// Upsert several documents in one round trip.
    async fn save_batch(&self, documents: Vec<Document>) -> SyncResult<()>;

    async fn append_history(&self, entry: HistoryEntry) -> SyncResult<()>;

    /// Most recent first.
    async fn history(
        &self,
        collection: Collection,
        user_id: &str,
        limit: usize,
    ) -> SyncResult<Vec<HistoryEntry>>;
}
