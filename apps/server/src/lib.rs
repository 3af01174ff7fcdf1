//! # Meridian Server
//!
//! HTTP surface for the sync engine.
//!
//! ## Routes
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Meridian HTTP API                              │
//! │                                                                         │
//! │  Tables                          Sync                                   │
//! │  ──────                          ────                                   │
//! │  GET    /tables                  POST /sync[?id=]   SyncResult(s)       │
//! │  POST   /tables        201       GET  /status       tables + scheduler  │
//! │  GET    /table?id=               GET  /history?table=&limit=            │
//! │  PUT    /table?id=                                                      │
//! │  DELETE /table?id=     204       POS                                    │
//! │                                  ───                                    │
//! │  GET    /health                  POST /pos/inventory   plain text       │
//! │                                  POST /pos/receipts    plain text       │
//! │                                  GET|PUT /pos/schedule                  │
//! │                                                                         │
//! │  Config changes reload the scheduler so new intervals apply at once.   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod services;

use axum::routing::{get, post};
use axum::Router;
use tracing::warn;

use meridian_db::Database;
use meridian_sync::{PosIngestion, SchedulerHandle, SyncCoordinator};

pub use error::{ApiError, ApiResult, ErrorCode};

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub db: Database,
    pub coordinator: SyncCoordinator,
    /// `None` when no POS token is configured.
    pub pos: Option<PosIngestion>,
    /// `None` when the scheduler is not running (tests, one-shot tools).
    pub scheduler: Option<SchedulerHandle>,
}

impl AppState {
    pub fn new(db: Database, coordinator: SyncCoordinator) -> Self {
        AppState {
            db,
            coordinator,
            pos: None,
            scheduler: None,
        }
    }

    pub fn with_pos(mut self, pos: PosIngestion) -> Self {
        self.pos = Some(pos);
        self
    }

    pub fn with_scheduler(mut self, scheduler: SchedulerHandle) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    /// Queues a re-registration of scheduled jobs after a config change.
    ///
    /// Does not wait for the scheduler. A failed request is logged; the
    /// config change itself already succeeded.
    pub fn reload_scheduler(&self) {
        if let Some(scheduler) = &self.scheduler {
            if let Err(e) = scheduler.request_reload() {
                warn!(error = %e, "Scheduler reload request failed");
            }
        }
    }
}

/// Builds the HTTP router with all endpoints.
pub fn build_router(state: AppState) -> Router {
    use services::{health_service, pos_service, sync_service, table_service};

    Router::new()
        .route(
            "/tables",
            get(table_service::list_tables).post(table_service::create_table),
        )
        .route(
            "/table",
            get(table_service::get_table)
                .put(table_service::update_table)
                .delete(table_service::delete_table),
        )
        .route("/sync", post(sync_service::trigger_sync))
        .route("/status", get(sync_service::status))
        .route("/history", get(sync_service::history))
        .route("/pos/inventory", post(pos_service::ingest_inventory))
        .route("/pos/receipts", post(pos_service::ingest_receipts))
        .route(
            "/pos/schedule",
            get(pos_service::get_schedule).put(pos_service::update_schedule),
        )
        .route("/health", get(health_service::health))
        .with_state(state)
}
