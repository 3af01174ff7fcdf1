//! # POS API Client
//!
//! Cursor-paginated reads of the two POS datasets.
//!
//! ```text
//! GET {base}/inventory?limit=250[&cursor=...]  →  {"inventory_levels": [...], "cursor": "..."}
//! GET {base}/receipts?limit=250[&cursor=...]   →  {"receipts": [...], "cursor": "..."}
//! ```
//!
//! The first request carries no cursor. A missing or empty cursor in the
//! response marks the last page.

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::PosSettings;
use crate::error::{EngineResult, SyncError};
use crate::remote::remote_error;
use meridian_core::{InventoryLevel, Page, Receipt};

/// A source of cursor-paginated items.
#[async_trait]
pub trait PageSource<T>: Send + Sync {
    /// Fetches one page. `cursor` is `None` on the first request.
    async fn fetch_page(&self, cursor: Option<&str>, limit: usize) -> EngineResult<Page<T>>;
}

#[derive(Debug, Deserialize)]
struct InventoryResponse {
    #[serde(default)]
    inventory_levels: Vec<InventoryLevel>,
    #[serde(default)]
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ReceiptsResponse {
    #[serde(default)]
    receipts: Vec<Receipt>,
    #[serde(default)]
    cursor: Option<String>,
}

/// reqwest-backed client for the POS API.
pub struct HttpPosClient {
    http: Client,
    base_url: Url,
    token: String,
}

impl HttpPosClient {
    pub fn new(settings: &PosSettings) -> EngineResult<Self> {
        let base_url = Url::parse(&settings.base_url)?;
        if base_url.cannot_be_a_base() {
            return Err(SyncError::InvalidUrl(settings.base_url.clone()));
        }

        let http = Client::builder()
            .timeout(settings.page_timeout())
            .build()
            .map_err(|e| SyncError::Internal(format!("HTTP client setup failed: {}", e)))?;

        Ok(HttpPosClient {
            http,
            base_url,
            token: settings.token.clone(),
        })
    }

    fn endpoint(&self, resource: &str) -> EngineResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| SyncError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .push(resource);
        Ok(url)
    }

    async fn get_page<R: DeserializeOwned>(
        &self,
        resource: &str,
        cursor: Option<&str>,
        limit: usize,
    ) -> EngineResult<R> {
        let url = self.endpoint(resource)?;
        let limit = limit.to_string();
        let mut query = vec![("limit", limit.as_str())];
        if let Some(cursor) = cursor.filter(|c| !c.is_empty()) {
            query.push(("cursor", cursor));
        }

        debug!(resource, ?cursor, "Requesting POS page");
        let response = self
            .http
            .get(url)
            .query(&query)
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(remote_error(response).await);
        }

        Ok(response.json().await?)
    }
}

#[async_trait]
impl PageSource<InventoryLevel> for HttpPosClient {
    async fn fetch_page(
        &self,
        cursor: Option<&str>,
        limit: usize,
    ) -> EngineResult<Page<InventoryLevel>> {
        let body: InventoryResponse = self.get_page("inventory", cursor, limit).await?;
        Ok(Page::new(body.inventory_levels, body.cursor))
    }
}

#[async_trait]
impl PageSource<Receipt> for HttpPosClient {
    async fn fetch_page(&self, cursor: Option<&str>, limit: usize) -> EngineResult<Page<Receipt>> {
        let body: ReceiptsResponse = self.get_page("receipts", cursor, limit).await?;
        Ok(Page::new(body.receipts, body.cursor))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::extract::Query;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::get;
    use axum::{Json, Router};
    use meridian_core::Money;
    use serde_json::json;
    use std::collections::HashMap;

    async fn inventory(
        Query(query): Query<HashMap<String, String>>,
        headers: HeaderMap,
    ) -> axum::response::Response {
        if headers.get("authorization").and_then(|v| v.to_str().ok()) != Some("Bearer pos-token") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        assert_eq!(query.get("limit").map(String::as_str), Some("2"));

        match query.get("cursor").map(String::as_str) {
            None => Json(json!({
                "inventory_levels": [
                    {"variant_id": "v1", "store_id": "s1", "in_stock": 4},
                    {"variant_id": "v2", "store_id": "s1", "in_stock": 0}
                ],
                "cursor": "abc"
            }))
            .into_response(),
            Some("abc") => Json(json!({
                "inventory_levels": [{"variant_id": "v3", "store_id": "s1", "in_stock": 9.5}],
                "cursor": ""
            }))
            .into_response(),
            Some(_) => StatusCode::BAD_REQUEST.into_response(),
        }
    }

    async fn receipts() -> axum::response::Response {
        Json(json!({
            "receipts": [{
                "receipt_number": "1-1001",
                "receipt_date": "2024-03-01T10:00:00Z",
                "total_money": 12.5,
                "line_items": [{"item_name": "Tea", "quantity": 2, "price": 6.25, "total_money": 12.5}]
            }]
        }))
        .into_response()
    }

    async fn spawn_pos() -> HttpPosClient {
        let app = Router::new()
            .route("/v1.0/inventory", get(inventory))
            .route("/v1.0/receipts", get(receipts));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        HttpPosClient::new(&PosSettings {
            base_url: format!("http://{}/v1.0", addr),
            token: "pos-token".to_string(),
            page_size: 2,
            page_timeout_secs: 5,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_inventory_pages_follow_cursor() {
        let client = spawn_pos().await;

        let first = PageSource::<InventoryLevel>::fetch_page(&client, None, 2).await.unwrap();
        assert_eq!(first.items.len(), 2);
        assert_eq!(first.next_cursor(), Some("abc"));

        let second = PageSource::<InventoryLevel>::fetch_page(&client, Some("abc"), 2)
            .await
            .unwrap();
        assert_eq!(second.items[0].variant_id, "v3");
        assert_eq!(second.next_cursor(), None);
    }

    #[tokio::test]
    async fn test_receipts_decode_money_as_cents() {
        let client = spawn_pos().await;

        let page = PageSource::<Receipt>::fetch_page(&client, None, 2).await.unwrap();

        assert_eq!(page.items.len(), 1);
        assert_eq!(page.items[0].total_money, Money::from_cents(1250));
        assert_eq!(page.items[0].line_items[0].price, Money::from_cents(625));
        assert_eq!(page.next_cursor(), None);
    }

    #[tokio::test]
    async fn test_rejected_cursor_is_remote_error() {
        let client = spawn_pos().await;

        let err = PageSource::<InventoryLevel>::fetch_page(&client, Some("stale"), 2)
            .await
            .unwrap_err();

        assert!(matches!(err, SyncError::Remote { status: 400, .. }));
    }
}
