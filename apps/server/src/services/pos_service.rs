//! POS ingestion triggers and the daily schedule.
//!
//! The triggers answer in plain text: `200` when the run was clean, `500`
//! with the collected messages when any page or batch failed.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use tracing::info;

use crate::error::{ApiError, ApiResult, ErrorCode};
use crate::AppState;
use meridian_core::validation::validate_pos_schedule;
use meridian_core::{PosDataset, PosSchedule, SyncResult};

pub async fn ingest_inventory(State(state): State<AppState>) -> ApiResult<(StatusCode, String)> {
    ingest(&state, PosDataset::InventoryLevels).await
}

pub async fn ingest_receipts(State(state): State<AppState>) -> ApiResult<(StatusCode, String)> {
    ingest(&state, PosDataset::Receipts).await
}

async fn ingest(state: &AppState, dataset: PosDataset) -> ApiResult<(StatusCode, String)> {
    let pos = state.pos.as_ref().ok_or_else(|| {
        ApiError::new(ErrorCode::NotConfigured, "POS API token is not configured")
    })?;

    let result = pos.run(dataset).await?;
    info!(
        dataset = %dataset,
        synced = result.records_synced,
        errors = result.records_error,
        "Manual POS ingestion finished"
    );

    Ok(summarize(dataset, &result))
}

fn summarize(dataset: PosDataset, result: &SyncResult) -> (StatusCode, String) {
    if result.is_success() {
        (
            StatusCode::OK,
            format!(
                "{} ingestion completed: {} records saved",
                dataset, result.records_synced
            ),
        )
    } else {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!(
                "{} ingestion finished with errors: {} records saved, {} failed: {}",
                dataset,
                result.records_synced,
                result.records_error,
                result.error_messages.join("; ")
            ),
        )
    }
}

pub async fn get_schedule(State(state): State<AppState>) -> ApiResult<Json<PosSchedule>> {
    Ok(Json(state.db.settings().pos_schedule().await?))
}

pub async fn update_schedule(
    State(state): State<AppState>,
    payload: Result<Json<PosSchedule>, JsonRejection>,
) -> ApiResult<Json<PosSchedule>> {
    let Json(schedule) = payload?;
    validate_pos_schedule(&schedule)?;

    state.db.settings().set_pos_schedule(&schedule).await?;
    info!(
        inventory = %schedule.inventory_time,
        receipts = %schedule.receipts_time,
        "POS schedule updated"
    );

    state.reload_scheduler();
    Ok(Json(schedule))
}
