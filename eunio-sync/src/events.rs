//! Change and progress notifications
//!
//! Published on a tokio broadcast channel. Slow subscribers lag and miss
//! events rather than slowing down the engine.

use crate::models::{Collection, RecordKey};
use crate::remote::ResolutionStrategy;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

pub const EVENT_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    /// Local row written (save, pull or repair)
    RecordChanged { collection: Collection, key: RecordKey },
    /// Local row removed
    RecordDeleted { collection: Collection, key: RecordKey },
    /// Record reached the SYNCED state
    RecordSynced { collection: Collection, key: RecordKey },
    /// Push failed; record is dirty until the next pass
    RecordFailed {
        collection: Collection,
        key: RecordKey,
        error: String,
    },
    ConflictResolved {
        collection: Collection,
        key: RecordKey,
        strategy: ResolutionStrategy,
        local_wins: bool,
    },
    SyncStarted { total_records: usize },
    SyncCompleted {
        success_count: usize,
        failure_count: usize,
    },
}

/// Work handed from the write path to the background worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncRequest {
    pub collection: Collection,
    pub key: RecordKey,
}

pub type SyncRequestSender = mpsc::UnboundedSender<SyncRequest>;
pub type SyncRequestReceiver = mpsc::UnboundedReceiver<SyncRequest>;

pub fn sync_request_channel() -> (SyncRequestSender, SyncRequestReceiver) {
    mpsc::unbounded_channel()
}

pub fn event_channel() -> broadcast::Sender<SyncEvent> {
    let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}
