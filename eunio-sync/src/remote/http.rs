/// HTTP document gateway
///
/// REST front of the cloud document store. Layout:
///
/// - `GET|PUT|PATCH|DELETE|HEAD {base}/v1/{collection}/{user_id}/{id}`
/// - `GET {base}/v1/{collection}/{user_id}?from=..&to=..` for range reads
/// - `POST {base}/v1/batch` for batched upserts
/// - `POST|GET {base}/v1/history/{collection}/{user_id}` for the audit log
///
/// Conditional updates and deletes send the expected `lastModified` in
/// `If-Match`; the gateway answers 412 when the stored document moved on.

use super::{HistoryEntry, RemoteStore};
use crate::error::{SyncError, SyncResult};
use crate::models::{Collection, Document, RecordKey};
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::{header, Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Remote gateway configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpRemoteConfig {
    /// Gateway base URL
    pub base_url: String,
    /// Bearer token of the signed-in user
    pub auth_token: Option<String>,
    /// Per-request timeout
    pub timeout_secs: u64,
}

impl Default for HttpRemoteConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            auth_token: None,
            timeout_secs: 30,
        }
    }
}

#[derive(Debug, Serialize)]
struct BatchRequest<'a> {
    documents: &'a [Document],
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ConflictBody {
    last_modified: Option<DateTime<Utc>>,
}

/// Map a non-success status to the sync error taxonomy.
pub(crate) fn classify_status(status: StatusCode, body: &str, target: &str) -> SyncError {
    let message = if body.is_empty() {
        format!("{} {}", status, target)
    } else {
        format!("{} {}: {}", status, target, body)
    };
    match status {
        StatusCode::UNAUTHORIZED => SyncError::Authentication(message),
        StatusCode::FORBIDDEN => SyncError::Permission(message),
        StatusCode::NOT_FOUND => SyncError::NotFound(target.to_string()),
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => SyncError::Timeout(message),
        StatusCode::TOO_MANY_REQUESTS => SyncError::Server {
            status: status.as_u16(),
            message,
        },
        s if s.is_server_error() => SyncError::Server {
            status: s.as_u16(),
            message,
        },
        s => SyncError::Remote {
            status: s.as_u16(),
            message,
        },
    }
}

pub struct HttpRemoteStore {
    base: Url,
    config: HttpRemoteConfig,
    client: Client,
}

impl HttpRemoteStore {
    pub fn new(config: HttpRemoteConfig) -> SyncResult<Self> {
        let base = Url::parse(&config.base_url)
            .map_err(|e| SyncError::Internal(format!("Invalid remote base URL: {}", e)))?;
        if base.cannot_be_a_base() {
            return Err(SyncError::Internal(format!(
                "Remote base URL cannot have paths: {}",
                config.base_url
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SyncError::Internal(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            base,
            config,
            client,
        })
    }

    fn url(&self, segments: &[&str]) -> SyncResult<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::Internal("Remote base URL cannot have paths".to_string()))?
            .pop_if_empty()
            .push("v1")
            .extend(segments);
        Ok(url)
    }

    fn document_url(&self, collection: Collection, key: &RecordKey) -> SyncResult<Url> {
        self.url(&[collection.as_str(), &key.user_id, &key.id])
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> SyncResult<Response> {
        Ok(self.authorize(request).send().await?)
    }

    /// 409 / 412 on an `If-Match` request means the stored document moved on.
    async fn check_precondition(
        response: Response,
        target: String,
        expected: DateTime<Utc>,
    ) -> SyncResult<Response> {
        if matches!(
            response.status(),
            StatusCode::PRECONDITION_FAILED | StatusCode::CONFLICT
        ) {
            let body: ConflictBody = response.json().await.unwrap_or_default();
            return Err(SyncError::Conflict {
                key: target,
                expected,
                actual: body.last_modified,
            });
        }
        Ok(response)
    }

    async fn expect_success(response: Response, target: &str) -> SyncResult<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body, target))
    }
}

#[async_trait]
impl RemoteStore for HttpRemoteStore {
    async fn get(&self, collection: Collection, key: &RecordKey) -> SyncResult<Option<Document>> {
        let target = format!("{}/{}", collection, key);
        let response = self
            .send(self.client.get(self.document_url(collection, key)?))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success(response, &target).await?;
        Ok(Some(response.json().await?))
    }

    async fn save(&self, document: Document) -> SyncResult<()> {
        let key = document.key();
        let target = format!("{}/{}", document.collection, key);
        let url = self.document_url(document.collection, &key)?;
        let response = self.send(self.client.put(url).json(&document)).await?;
        Self::expect_success(response, &target).await?;
        Ok(())
    }

    async fn update(&self, document: Document) -> SyncResult<()> {
        let key = document.key();
        let target = format!("{}/{}", document.collection, key);
        let url = self.document_url(document.collection, &key)?;
        let response = self.send(self.client.patch(url).json(&document)).await?;
        Self::expect_success(response, &target).await?;
        Ok(())
    }

    async fn delete(&self, collection: Collection, key: &RecordKey) -> SyncResult<()> {
        let target = format!("{}/{}", collection, key);
        let response = self
            .send(self.client.delete(self.document_url(collection, key)?))
            .await?;
        // Already gone is as good as deleted
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Self::expect_success(response, &target).await?;
        Ok(())
    }

    async fn conditional_update(
        &self,
        document: Document,
        expected_last_modified: DateTime<Utc>,
    ) -> SyncResult<()> {
        let key = document.key();
        let target = format!("{}/{}", document.collection, key);
        let url = self.document_url(document.collection, &key)?;
        let request = self
            .client
            .put(url)
            .header(
                header::IF_MATCH,
                expected_last_modified.to_rfc3339_opts(SecondsFormat::Nanos, true),
            )
            .json(&document);
        let response = self.send(request).await?;
        let response = Self::check_precondition(response, target.clone(), expected_last_modified).await?;
        Self::expect_success(response, &target).await?;
        Ok(())
    }

    async fn conditional_delete(
        &self,
        collection: Collection,
        key: &RecordKey,
        expected_last_modified: DateTime<Utc>,
    ) -> SyncResult<()> {
        let target = format!("{}/{}", collection, key);
        let request = self
            .client
            .delete(self.document_url(collection, key)?)
            .header(
                header::IF_MATCH,
                expected_last_modified.to_rfc3339_opts(SecondsFormat::Nanos, true),
            );
        let response = self.send(request).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        let response = Self::check_precondition(response, target.clone(), expected_last_modified).await?;
        Self::expect_success(response, &target).await?;
        Ok(())
    }

    async fn exists(&self, collection: Collection, key: &RecordKey) -> SyncResult<bool> {
        let target = format!("{}/{}", collection, key);
        let response = self
            .send(self.client.head(self.document_url(collection, key)?))
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        Self::expect_success(response, &target).await?;
        Ok(true)
    }

    async fn query_range(
        &self,
        collection: Collection,
        user_id: &str,
        from_id: &str,
        to_id: &str,
    ) -> SyncResult<Vec<Document>> {
        let target = format!("{}/{}", collection, user_id);
        let url = self.url(&[collection.as_str(), user_id])?;
        let request = self
            .client
            .get(url)
            .query(&[("from", from_id), ("to", to_id)]);
        let response = Self::expect_success(self.send(request).await?, &target).await?;
        Ok(response.json().await?)
    }

    async fn save_batch(&self, documents: Vec<Document>) -> SyncResult<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let request = self
            .client
            .post(self.url(&["batch"])?)
            .json(&BatchRequest {
                documents: &documents,
            });
        Self::expect_success(self.send(request).await?, "batch").await?;
        Ok(())
    }

    async fn append_history(&self, entry: HistoryEntry) -> SyncResult<()> {
        let target = format!("history/{}/{}", entry.collection, entry.user_id);
        let url = self.url(&["history", entry.collection.as_str(), &entry.user_id])?;
        let response = self.send(self.client.post(url).json(&entry)).await?;
        Self::expect_success(response, &target).await?;
        Ok(())
    }

    async fn history(
        &self,
        collection: Collection,
        user_id: &str,
        limit: usize,
    ) -> SyncResult<Vec<HistoryEntry>> {
        let target = format!("history/{}/{}", collection, user_id);
        let url = self.url(&["history", collection.as_str(), user_id])?;
        let request = self.client.get(url).query(&[("limit", limit)]);
        let response = Self::expect_success(self.send(request).await?, &target).await?;
        Ok(response.json().await?)
    }
}
