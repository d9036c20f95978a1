//! In-memory document store
//!
//! Behaves like the cloud store, including optimistic-concurrency checks,
//! and lets tests inject failures: the next N calls, or every call touching
//! one key.

use super::{HistoryEntry, RemoteStore};
use crate::error::{SyncError, SyncResult};
use crate::models::{Collection, Document, RecordKey};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

/// Failure to inject
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    Network,
    Timeout,
    Server,
    Authentication,
    Permission,
}

impl FaultKind {
    fn to_error(self, target: &str) -> SyncError {
        match self {
            FaultKind::Network => SyncError::Network(format!("connection reset ({})", target)),
            FaultKind::Timeout => SyncError::Timeout(format!("deadline exceeded ({})", target)),
            FaultKind::Server => SyncError::Server {
                status: 503,
                message: format!("unavailable ({})", target),
            },
            FaultKind::Authentication => {
                SyncError::Authentication(format!("token expired ({})", target))
            }
            FaultKind::Permission => {
                SyncError::Permission(format!("missing permission ({})", target))
            }
        }
    }
}

#[derive(Default)]
struct Faults {
    next: Vec<FaultKind>,
    keys: HashMap<(Collection, RecordKey), FaultKind>,
}

#[derive(Default)]
pub struct MemoryRemoteStore {
    documents: RwLock<BTreeMap<(Collection, RecordKey), Document>>,
    history: RwLock<Vec<HistoryEntry>>,
    faults: RwLock<Faults>,
    calls: AtomicUsize,
}

impl MemoryRemoteStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` calls with `kind`.
    pub async fn fail_next(&self, count: usize, kind: FaultKind) {
        let mut faults = self.faults.write().await;
        faults.next.extend(std::iter::repeat(kind).take(count));
    }

    /// Fail every call that targets `key` until cleared.
    pub async fn fail_key(&self, collection: Collection, key: RecordKey, kind: FaultKind) {
        self.faults.write().await.keys.insert((collection, key), kind);
    }

    pub async fn clear_faults(&self) {
        let mut faults = self.faults.write().await;
        faults.next.clear();
        faults.keys.clear();
    }

    /// Total calls received, failed ones included.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Seed a document without counting a call.
    pub async fn insert(&self, document: Document) {
        self.documents
            .write()
            .await
            .insert((document.collection, document.key()), document);
    }

    /// Read a document without counting a call.
    pub async fn peek(&self, collection: Collection, key: &RecordKey) -> Option<Document> {
        self.documents.read().await.get(&(collection, key.clone())).cloned()
    }

    pub async fn document_count(&self) -> usize {
        self.documents.read().await.len()
    }

    async fn enter(&self, target: Option<(Collection, &RecordKey)>) -> SyncResult<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut faults = self.faults.write().await;
        if let Some((collection, key)) = target {
            if let Some(kind) = faults.keys.get(&(collection, key.clone())) {
                return Err(kind.to_error(&format!("{}/{}", collection, key)));
            }
        }
        if !faults.next.is_empty() {
            let kind = faults.next.remove(0);
            return Err(kind.to_error("injected"));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    async fn get(&self, collection: Collection, key: &RecordKey) -> SyncResult<Option<Document>> {
        self.enter(Some((collection, key))).await?;
        Ok(self.peek(collection, key).await)
    }

    async fn save(&self, document: Document) -> SyncResult<()> {
        let key = document.key();
        self.enter(Some((document.collection, &key))).await?;
        self.insert(document).await;
        Ok(())
    }

    async fn update(&self, document: Document) -> SyncResult<()> {
        let key = document.key();
        self.enter(Some((document.collection, &key))).await?;
        let mut documents = self.documents.write().await;
        match documents.get_mut(&(document.collection, key.clone())) {
            Some(stored) => {
                *stored = document;
                Ok(())
            }
            None => Err(SyncError::NotFound(format!("{}/{}", document.collection, key))),
        }
    }

    async fn delete(&self, collection: Collection, key: &RecordKey) -> SyncResult<()> {
        self.enter(Some((collection, key))).await?;
        self.documents.write().await.remove(&(collection, key.clone()));
        Ok(())
    }

    async fn conditional_update(
        &self,
        document: Document,
        expected_last_modified: DateTime<Utc>,
    ) -> SyncResult<()> {
        let key = document.key();
        self.enter(Some((document.collection, &key))).await?;
        let mut documents = self.documents.write().await;
        let slot = (document.collection, key.clone());
        let actual = documents.get(&slot).map(|stored| stored.last_modified);
        if actual != Some(expected_last_modified) {
            return Err(SyncError::Conflict {
                key: format!("{}/{}", document.collection, key),
                expected: expected_last_modified,
                actual,
            });
        }
        documents.insert(slot, document);
        Ok(())
    }

    async fn conditional_delete(
        &self,
        collection: Collection,
        key: &RecordKey,
        expected_last_modified: DateTime<Utc>,
    ) -> SyncResult<()> {
        self.enter(Some((collection, key))).await?;
        let mut documents = self.documents.write().await;
        let slot = (collection, key.clone());
        match documents.get(&slot).map(|stored| stored.last_modified) {
            None => Ok(()),
            Some(actual) if actual == expected_last_modified => {
                documents.remove(&slot);
                Ok(())
            }
            Some(actual) => Err(SyncError::Conflict {
                key: format!("{}/{}", collection, key),
                expected: expected_last_modified,
                actual: Some(actual),
            }),
        }
    }

    async fn exists(&self, collection: Collection, key: &RecordKey) -> SyncResult<bool> {
        self.enter(Some((collection, key))).await?;
        Ok(self.peek(collection, key).await.is_some())
    }

    async fn query_range(
        &self,
        collection: Collection,
        user_id: &str,
        from_id: &str,
        to_id: &str,
    ) -> SyncResult<Vec<Document>> {
        self.enter(None).await?;
        let documents = self.documents.read().await;
        Ok(documents
            .iter()
            .filter(|((c, key), _)| {
                *c == collection
                    && key.user_id == user_id
                    && key.id.as_str() >= from_id
                    && key.id.as_str() <= to_id
            })
            .map(|(_, doc)| doc.clone())
            .collect())
    }

    async fn save_batch(&self, documents: Vec<Document>) -> SyncResult<()> {
        self.enter(None).await?;
        let mut stored = self.documents.write().await;
        for document in documents {
            stored.insert((document.collection, document.key()), document);
        }
        Ok(())
    }

    async fn append_history(&self, entry: HistoryEntry) -> SyncResult<()> {
        self.enter(None).await?;
        self.history.write().await.push(entry);
        Ok(())
    }

    async fn history(
        &self,
        collection: Collection,
        user_id: &str,
        limit: usize,
    ) -> SyncResult<Vec<HistoryEntry>> {
        self.enter(None).await?;
        let history = self.history.read().await;
        Ok(history
            .iter()
            .rev()
            .filter(|entry| entry.collection == collection && entry.user_id == user_id)
            .take(limit)
            .cloned()
            .collect())
    }
}
