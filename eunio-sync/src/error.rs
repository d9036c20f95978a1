//! Error types for the sync layer

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Authentication error: {0}")]
    Authentication(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Conflict on {key}: expected last_modified {expected}, found {actual:?}")]
    Conflict {
        key: String,
        expected: DateTime<Utc>,
        actual: Option<DateTime<Utc>>,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Local storage error: {0}")]
    DataSync(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: cannot migrate from version {from} to {to}")]
    Migration { from: u32, to: u32 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unsupported backup version: {0}")]
    UnsupportedBackupVersion(u64),

    #[error("Remote rejected request ({status}): {message}")]
    Remote { status: u16, message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Transient failures that the backoff policy is allowed to retry.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            SyncError::Network(_) | SyncError::Timeout(_) | SyncError::Server { .. }
        )
    }

    /// Failures of the on-device store. These are never swallowed.
    pub fn is_local_storage(&self) -> bool {
        matches!(self, SyncError::DataSync(_) | SyncError::Database(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, SyncError::Conflict { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        SyncError::Validation(message.into())
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::Serialization(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(err.to_string())
        } else if err.is_decode() {
            SyncError::Serialization(err.to_string())
        } else {
            SyncError::Network(err.to_string())
        }
    }
}

pub type SyncResult<T> = Result<T, SyncError>;
