//! Last-write-wins conflict resolution
//!
//! Pure function of the two documents, so both devices converge on the same
//! winner regardless of which one runs the sync.

use crate::models::Document;
use crate::remote::{HistoryEntry, ResolutionStrategy};
use chrono::Utc;
use std::cmp::Ordering;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Winner {
    Local,
    Remote,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub winner: Winner,
    pub strategy: ResolutionStrategy,
}

impl Resolution {
    pub fn local_wins(&self) -> bool {
        self.winner == Winner::Local
    }
}

/// Newer `last_modified` wins. On a tie the manually set side wins; when both
/// or neither are manual the local copy is kept.
pub fn resolve(local: &Document, remote: &Document) -> Resolution {
    let (winner, strategy) = match local.last_modified.cmp(&remote.last_modified) {
        Ordering::Greater => (Winner::Local, ResolutionStrategy::LocalNewer),
        Ordering::Less => (Winner::Remote, ResolutionStrategy::RemoteNewer),
        Ordering::Equal => match (local.manual, remote.manual) {
            (false, true) => (Winner::Remote, ResolutionStrategy::ManualTieBreak),
            (true, false) => (Winner::Local, ResolutionStrategy::ManualTieBreak),
            _ => (Winner::Local, ResolutionStrategy::LocalTieBreak),
        },
    };
    Resolution { winner, strategy }
}

/// Audit record for a resolution between two differing documents.
pub fn history_entry(local: &Document, remote: &Document, resolution: &Resolution) -> HistoryEntry {
    HistoryEntry {
        id: Uuid::new_v4(),
        collection: local.collection,
        user_id: local.user_id.clone(),
        record_id: local.id.clone(),
        strategy: resolution.strategy,
        local_wins: resolution.local_wins(),
        local_last_modified: local.last_modified,
        remote_last_modified: remote.last_modified,
        changed_fields: local.diff_fields(remote),
        resolved_at: Utc::now(),
    }
}
