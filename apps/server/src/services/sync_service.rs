//! Sync triggers, status and run history.

use axum::extract::rejection::QueryRejection;
use axum::extract::{Query, State};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::ApiResult;
use crate::services::table_service::IdQuery;
use crate::AppState;
use meridian_core::SyncResult;
use meridian_sync::{SchedulerState, TableStatus};

const DEFAULT_HISTORY_LIMIT: u32 = 50;
const MAX_HISTORY_LIMIT: u32 = 500;

/// `POST /sync?id=` runs one table; `POST /sync` runs every active table.
///
/// Partial failures still answer `200` with the run's `SyncResult`.
pub async fn trigger_sync(
    State(state): State<AppState>,
    query: Result<Query<IdQuery>, QueryRejection>,
) -> ApiResult<Response> {
    let Query(query) = query?;

    match query.id {
        Some(id) => {
            let result = state.coordinator.sync_table(id).await?;
            info!(
                table = %result.table_name,
                synced = result.records_synced,
                errors = result.records_error,
                "Manual sync finished"
            );
            Ok(Json(result).into_response())
        }
        None => {
            let results = state.coordinator.sync_all().await?;
            info!(tables = results.len(), "Manual sync of all tables finished");
            Ok(Json(results).into_response())
        }
    }
}

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    /// `None` when the server runs without a scheduler.
    pub scheduler: Option<SchedulerState>,
    pub running: Vec<String>,
    pub tables: Vec<TableStatus>,
}

pub async fn status(State(state): State<AppState>) -> ApiResult<Json<StatusResponse>> {
    let scheduler = match &state.scheduler {
        Some(handle) => Some(handle.state().await),
        None => None,
    };

    Ok(Json(StatusResponse {
        scheduler,
        running: state.coordinator.locks().running(),
        tables: state.coordinator.status().await?,
    }))
}

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub table: Option<String>,
    pub limit: Option<u32>,
}

/// Most recent runs first.
pub async fn history(
    State(state): State<AppState>,
    query: Result<Query<HistoryQuery>, QueryRejection>,
) -> ApiResult<Json<Vec<SyncResult>>> {
    let Query(query) = query?;
    let limit = query
        .limit
        .unwrap_or(DEFAULT_HISTORY_LIMIT)
        .clamp(1, MAX_HISTORY_LIMIT);

    let runs = state
        .db
        .history()
        .recent(query.table.as_deref().filter(|t| !t.is_empty()), limit)
        .await?;
    Ok(Json(runs))
}
