//! Table configuration CRUD.
//!
//! Every write validates the full input first and reloads the scheduler
//! afterwards so interval and active changes take effect immediately.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use tracing::info;

use crate::error::{ApiError, ApiResult};
use crate::AppState;
use meridian_core::validation::validate_table_input;
use meridian_core::{TableConfig, TableConfigInput};

/// `?id=` on the single-table routes.
#[derive(Debug, Deserialize)]
pub struct IdQuery {
    pub id: Option<i64>,
}

impl IdQuery {
    pub fn require(&self) -> ApiResult<i64> {
        self.id.ok_or_else(|| ApiError::malformed("id is required"))
    }
}

pub async fn list_tables(State(state): State<AppState>) -> ApiResult<Json<Vec<TableConfig>>> {
    Ok(Json(state.db.table_configs().list().await?))
}

pub async fn create_table(
    State(state): State<AppState>,
    payload: Result<Json<TableConfigInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<TableConfig>)> {
    let Json(input) = payload?;
    validate_table_input(&input)?;

    let config = state.db.table_configs().create(&input).await?;
    info!(id = config.id, table = %config.name, "Table configured");

    state.reload_scheduler();
    Ok((StatusCode::CREATED, Json(config)))
}

pub async fn get_table(
    State(state): State<AppState>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Json<TableConfig>> {
    let id = query?.require()?;
    state
        .db
        .table_configs()
        .get(id)
        .await?
        .map(Json)
        .ok_or_else(|| ApiError::not_found("TableConfig", &id.to_string()))
}

pub async fn update_table(
    State(state): State<AppState>,
    query: Result<Query<IdQuery>, QueryRejection>,
    payload: Result<Json<TableConfigInput>, JsonRejection>,
) -> ApiResult<Json<TableConfig>> {
    let id = query?.require()?;
    let Json(input) = payload?;
    validate_table_input(&input)?;

    let config = state.db.table_configs().update(id, &input).await?;
    info!(id, table = %config.name, "Table config updated");

    state.reload_scheduler();
    Ok(Json(config))
}

pub async fn delete_table(
    State(state): State<AppState>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<StatusCode> {
    let id = query?.require()?;
    let config = state.db.table_configs().delete(id).await?;
    info!(id, table = %config.name, "Table config removed");

    state.reload_scheduler();
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use crate::testing::{
        body_json, create_orders, orders_body, send, test_state, test_state_with, StubRemote,
    };
    use axum::http::StatusCode;
    use meridian_sync::{LockKey, Scheduler};
    use serde_json::json;

    #[tokio::test]
    async fn test_create_and_list() {
        let state = test_state().await;
        let id = create_orders(&state).await;

        let response = send(&state, "GET", "/tables", None).await;
        assert_eq!(response.status(), StatusCode::OK);

        let tables = body_json(response).await;
        assert_eq!(tables.as_array().unwrap().len(), 1);
        assert_eq!(tables[0]["id"], id);
        assert_eq!(tables[0]["name"], "orders");
        assert_eq!(tables[0]["active"], true);
    }

    #[tokio::test]
    async fn test_create_rejects_bad_input() {
        let state = test_state().await;

        let missing_name = json!({
            "remote_table_id": "tblOrders",
            "mapping": "{}",
            "sync_direction": "pull"
        });
        let response = send(&state, "POST", "/tables", Some(missing_name)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "MALFORMED_REQUEST");

        let mut bad_direction = orders_body();
        bad_direction["sync_direction"] = json!("sideways");
        let response = send(&state, "POST", "/tables", Some(bad_direction)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(body_json(response).await["code"], "VALIDATION_ERROR");

        let mut bad_mapping = orders_body();
        bad_mapping["mapping"] = json!("[1, 2]");
        let response = send(&state, "POST", "/tables", Some(bad_mapping)).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        assert_eq!(state.db.table_configs().list().await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_duplicate_name_conflicts() {
        let state = test_state().await;
        create_orders(&state).await;

        let response = send(&state, "POST", "/tables", Some(orders_body())).await;
        assert_eq!(response.status(), StatusCode::CONFLICT);
        assert_eq!(body_json(response).await["code"], "DUPLICATE");
    }

    #[tokio::test]
    async fn test_get_update_delete() {
        let state = test_state().await;
        let id = create_orders(&state).await;
        let uri = format!("/table?id={}", id);

        let response = send(&state, "GET", &uri, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["sync_interval"], 15);

        let mut changed = orders_body();
        changed["sync_interval"] = json!(60);
        changed["sync_direction"] = json!("both");
        let response = send(&state, "PUT", &uri, Some(changed)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let updated = body_json(response).await;
        assert_eq!(updated["sync_interval"], 60);
        assert_eq!(updated["sync_direction"], "both");

        let response = send(&state, "DELETE", &uri, None).await;
        assert_eq!(response.status(), StatusCode::NO_CONTENT);

        let response = send(&state, "GET", &uri, None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_id_is_required_and_numeric() {
        let state = test_state().await;

        let response = send(&state, "GET", "/table", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&state, "DELETE", "/table?id=abc", None).await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(&state, "DELETE", "/table?id=99", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_wrong_method() {
        let state = test_state().await;
        let response = send(&state, "DELETE", "/tables", None).await;
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
    }

    #[tokio::test]
    async fn test_writes_do_not_wait_for_a_running_sync() {
        let state = test_state_with(StubRemote {
            list_delay: Some(Duration::from_secs(5)),
        })
        .await;
        let id = create_orders(&state).await;

        // The new table is overdue, so the scheduler starts a slow sync at once.
        let scheduler = Scheduler::new(state.db.clone(), state.coordinator.clone(), None).start();
        let state = state.with_scheduler(scheduler.clone());
        for _ in 0..100 {
            if state.coordinator.locks().is_running(LockKey::Table(id)) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(state.coordinator.locks().is_running(LockKey::Table(id)));

        let mut changed = orders_body();
        changed["sync_interval"] = json!(30);
        let response = tokio::time::timeout(
            Duration::from_secs(1),
            send(&state, "PUT", &format!("/table?id={}", id), Some(changed)),
        )
        .await
        .expect("update waited for the scheduler");
        assert_eq!(response.status(), StatusCode::OK);

        scheduler.stop().await;
    }
}
