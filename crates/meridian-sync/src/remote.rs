//! # Remote Record Client
//!
//! Access to the record-oriented collaboration API, addressed by
//! `(base, table, record id)`.
//!
//! ## Request Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       HttpRecordClient::send                            │
//! │                                                                         │
//! │   throttle ──► request ──► 2xx ──────────────► decode body             │
//! │      ▲            │                                                     │
//! │      │            ├──► 429 ──► wait (Retry-After | backoff) ──┐        │
//! │      │            │            bounded by max_rate_limit_retries│        │
//! │      └────────────┼────────────────────────────────────────────┘        │
//! │                   └──► other ──► SyncError::Remote { status, message } │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Listing
//! `list_records` follows the `offset` token the API returns with each page
//! (page size 100) until a page arrives without one.

use std::time::Duration;

use async_trait::async_trait;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use reqwest::header::RETRY_AFTER;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::RemoteSettings;
use crate::error::{EngineResult, SyncError};
use meridian_core::{FieldMap, RemoteRecord, REMOTE_PAGE_SIZE};

// =============================================================================
// Client Trait
// =============================================================================

/// Operations the coordinator needs from the collaboration API.
///
/// One call per mutation; nothing is batched.
#[async_trait]
pub trait RemoteRecordClient: Send + Sync {
    /// Every record of a table, across all pages.
    async fn list_records(&self, base_id: &str, table: &str) -> EngineResult<Vec<RemoteRecord>>;

    async fn create(&self, base_id: &str, table: &str, fields: &FieldMap)
        -> EngineResult<RemoteRecord>;

    async fn update(
        &self,
        base_id: &str,
        table: &str,
        remote_id: &str,
        fields: &FieldMap,
    ) -> EngineResult<RemoteRecord>;

    async fn delete(&self, base_id: &str, table: &str, remote_id: &str) -> EngineResult<()>;
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct WireRecord {
    id: String,
    #[serde(default)]
    fields: FieldMap,
    #[serde(rename = "createdTime", default)]
    created_time: Option<DateTime<Utc>>,
}

impl From<WireRecord> for RemoteRecord {
    fn from(wire: WireRecord) -> Self {
        RemoteRecord {
            remote_id: Some(wire.id),
            fields: wire.fields,
            created_time: wire.created_time,
        }
    }
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    records: Vec<WireRecord>,
    #[serde(default)]
    offset: Option<String>,
}

#[derive(Debug, Serialize)]
struct FieldsBody<'a> {
    fields: &'a FieldMap,
}

// =============================================================================
// HTTP Client
// =============================================================================

/// reqwest-backed [`RemoteRecordClient`] with throttling and 429 handling.
pub struct HttpRecordClient {
    http: Client,
    base_url: Url,
    api_key: String,
    min_interval: Duration,
    max_rate_limit_retries: u32,
    timeout_secs: u64,
    last_request: Mutex<Option<Instant>>,
}

impl HttpRecordClient {
    pub fn new(settings: &RemoteSettings) -> EngineResult<Self> {
        let base_url = Url::parse(&settings.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::InvalidUrl(settings.base_url.clone()));
        }

        let http = Client::builder()
            .timeout(settings.request_timeout())
            .build()
            .map_err(|e| SyncError::Internal(format!("HTTP client setup failed: {}", e)))?;

        Ok(HttpRecordClient {
            http,
            base_url,
            api_key: settings.api_key.clone(),
            min_interval: settings.min_request_interval(),
            max_rate_limit_retries: settings.max_rate_limit_retries,
            timeout_secs: settings.request_timeout_secs,
            last_request: Mutex::new(None),
        })
    }

    fn table_url(&self, base_id: &str, table: &str, record_id: Option<&str>) -> EngineResult<Url> {
        let mut url = self.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| SyncError::InvalidUrl(self.base_url.to_string()))?;
            segments.pop_if_empty().push(base_id).push(table);
            if let Some(id) = record_id {
                segments.push(id);
            }
        }
        Ok(url)
    }

    /// Waits until the minimum interval since the previous request has passed.
    async fn throttle(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let ready_at = previous + self.min_interval;
            if ready_at > Instant::now() {
                tokio::time::sleep_until(ready_at).await;
            }
        }
        *last = Some(Instant::now());
    }

    /// Sends a request built by `build`, absorbing bounded `429` responses.
    async fn send<F>(&self, build: F) -> EngineResult<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let mut backoff = ExponentialBackoff {
            current_interval: Duration::from_secs(1),
            initial_interval: Duration::from_secs(1),
            max_interval: Duration::from_secs(30),
            max_elapsed_time: None,
            ..Default::default()
        };
        let mut retries = 0;

        loop {
            self.throttle().await;

            let response = build()
                .bearer_auth(&self.api_key)
                .send()
                .await
                .map_err(|e| self.transport_error(e))?;

            let status = response.status();
            if status.is_success() {
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS {
                if retries >= self.max_rate_limit_retries {
                    return Err(SyncError::RateLimited(retries));
                }
                let wait = retry_after(&response)
                    .or_else(|| backoff.next_backoff())
                    .unwrap_or(self.min_interval);
                retries += 1;
                warn!(retries, ?wait, "Rate limited by remote, waiting");
                tokio::time::sleep(wait).await;
                continue;
            }

            return Err(remote_error(response).await);
        }
    }

    fn transport_error(&self, err: reqwest::Error) -> SyncError {
        if err.is_timeout() {
            SyncError::Timeout(self.timeout_secs)
        } else {
            SyncError::from(err)
        }
    }
}

#[async_trait]
impl RemoteRecordClient for HttpRecordClient {
    async fn list_records(&self, base_id: &str, table: &str) -> EngineResult<Vec<RemoteRecord>> {
        let url = self.table_url(base_id, table, None)?;
        let page_size = REMOTE_PAGE_SIZE.to_string();
        let mut offset: Option<String> = None;
        let mut records = Vec::new();
        let mut pages = 0;

        loop {
            let response = self
                .send(|| {
                    let mut query = vec![("pageSize", page_size.as_str())];
                    if let Some(token) = offset.as_deref() {
                        query.push(("offset", token));
                    }
                    self.http.get(url.clone()).query(&query)
                })
                .await?;

            let page: ListResponse = response.json().await?;
            pages += 1;
            debug!(table, page = pages, count = page.records.len(), "Fetched remote page");
            records.extend(page.records.into_iter().map(RemoteRecord::from));

            match page.offset.filter(|token| !token.is_empty()) {
                Some(token) if offset.as_deref() == Some(token.as_str()) => {
                    warn!(table, page = pages, offset = %token, "Remote offset did not advance");
                    return Err(SyncError::Pagination(format!(
                        "offset '{}' did not advance",
                        token
                    )));
                }
                Some(token) => offset = Some(token),
                None => break,
            }
        }

        info!(table, pages, count = records.len(), "Listed remote records");
        Ok(records)
    }

    async fn create(
        &self,
        base_id: &str,
        table: &str,
        fields: &FieldMap,
    ) -> EngineResult<RemoteRecord> {
        let url = self.table_url(base_id, table, None)?;
        let body = FieldsBody { fields };
        let response = self.send(|| self.http.post(url.clone()).json(&body)).await?;
        let record: WireRecord = response.json().await?;
        debug!(table, remote_id = %record.id, "Created remote record");
        Ok(record.into())
    }

    async fn update(
        &self,
        base_id: &str,
        table: &str,
        remote_id: &str,
        fields: &FieldMap,
    ) -> EngineResult<RemoteRecord> {
        let url = self.table_url(base_id, table, Some(remote_id))?;
        let body = FieldsBody { fields };
        let response = self.send(|| self.http.patch(url.clone()).json(&body)).await?;
        let record: WireRecord = response.json().await?;
        debug!(table, remote_id, "Updated remote record");
        Ok(record.into())
    }

    async fn delete(&self, base_id: &str, table: &str, remote_id: &str) -> EngineResult<()> {
        let url = self.table_url(base_id, table, Some(remote_id))?;
        self.send(|| self.http.delete(url.clone())).await?;
        debug!(table, remote_id, "Deleted remote record");
        Ok(())
    }
}

// =============================================================================
// Response Helpers
// =============================================================================

fn retry_after(response: &Response) -> Option<Duration> {
    response
        .headers()
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

/// Turns a non-2xx response into a typed error, keeping the API's message.
pub(crate) async fn remote_error(response: Response) -> SyncError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    SyncError::Remote {
        status,
        message: error_message(&body),
    }
}

fn error_message(body: &str) -> String {
    let parsed: Option<serde_json::Value> = serde_json::from_str(body).ok();
    let from_json = parsed.as_ref().and_then(|value| {
        let error = value.get("error")?;
        error
            .get("message")
            .and_then(|m| m.as_str())
            .or_else(|| error.as_str())
            .map(str::to_string)
    });

    from_json.unwrap_or_else(|| {
        let trimmed = body.trim();
        if trimmed.is_empty() {
            "no response body".to_string()
        } else {
            trimmed.chars().take(200).collect()
        }
    })
}
