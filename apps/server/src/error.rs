//! # API Error Type
//!
//! Unified error type for HTTP handlers.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Meridian                               │
//! │                                                                         │
//! │  ValidationError ──┐                                                    │
//! │  CoreError ────────┤                                                    │
//! │  DbError ──────────┼──► ApiError { code, message } ──► status + JSON    │
//! │  SyncError ────────┤                                                    │
//! │  JsonRejection ────┘                                                    │
//! │                                                                         │
//! │  Client sees:                                                           │
//! │  409 { "code": "ALREADY_RUNNING",                                       │
//! │        "message": "Sync already running for table 'orders'" }           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Partial sync failures are not errors here: a run that finished with
//! `records_error > 0` is still a `200` carrying its `SyncResult`.

use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use tracing::error;

use meridian_core::{CoreError, ValidationError};
use meridian_db::DbError;
use meridian_sync::SyncError;

/// Error body returned by every failing endpoint.
///
/// ```json
/// { "code": "NOT_FOUND", "message": "TableConfig not found: 7" }
/// ```
#[derive(Debug, Clone, Serialize, thiserror::Error)]
#[error("{message}")]
pub struct ApiError {
    /// Machine-readable error code
    pub code: ErrorCode,

    /// Human-readable error message
    pub message: String,
}

/// Error codes for API responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Body or query string could not be read (400)
    MalformedRequest,

    /// Input validation failed (400)
    ValidationError,

    /// A stored table config is unusable (400)
    InvalidTableConfig,

    /// The POS API has no credentials configured (400)
    NotConfigured,

    /// Resource not found (404)
    NotFound,

    /// Unique name already taken (409)
    Duplicate,

    /// The table or dataset is syncing right now (409)
    AlreadyRunning,

    /// Database operation failed (500)
    DatabaseError,

    /// Remote API call failed outside a run (500)
    RemoteError,

    /// Internal server error (500)
    Internal,
}

impl ErrorCode {
    pub fn status(self) -> StatusCode {
        match self {
            ErrorCode::MalformedRequest
            | ErrorCode::ValidationError
            | ErrorCode::InvalidTableConfig
            | ErrorCode::NotConfigured => StatusCode::BAD_REQUEST,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::Duplicate | ErrorCode::AlreadyRunning => StatusCode::CONFLICT,
            ErrorCode::DatabaseError | ErrorCode::RemoteError | ErrorCode::Internal => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        ApiError {
            code,
            message: message.into(),
        }
    }

    pub fn not_found(resource: &str, id: &str) -> Self {
        ApiError::new(ErrorCode::NotFound, format!("{} not found: {}", resource, id))
    }

    pub fn validation(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::ValidationError, message)
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::MalformedRequest, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ApiError::new(ErrorCode::Internal, message)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.code.status(), Json(self)).into_response()
    }
}

// =============================================================================
// Conversions
// =============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::validation(err.to_string())
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(e) => e.into(),
            CoreError::Conversion { .. } => ApiError::validation(err.to_string()),
            CoreError::UnknownDirection(_) | CoreError::InvalidMapping { .. } => {
                ApiError::new(ErrorCode::InvalidTableConfig, err.to_string())
            }
        }
    }
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { entity, id } => ApiError::not_found(&entity, &id),
            DbError::UniqueViolation { field, value } => ApiError::new(
                ErrorCode::Duplicate,
                format!("{} '{}' already exists", field, value),
            ),
            DbError::ForeignKeyViolation { message } => {
                error!("Foreign key violation: {}", message);
                ApiError::validation("Invalid reference")
            }
            DbError::ConnectionFailed(_) | DbError::PoolExhausted => {
                ApiError::new(ErrorCode::DatabaseError, "Database unavailable")
            }
            other => {
                error!(error = %other, "Database operation failed");
                ApiError::new(ErrorCode::DatabaseError, other.to_string())
            }
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Core(e) => e.into(),
            SyncError::Database(e) => e.into(),
            SyncError::TableNotFound(id) => ApiError::not_found("TableConfig", &id.to_string()),
            SyncError::AlreadyRunning(_) => ApiError::new(ErrorCode::AlreadyRunning, err.to_string()),
            SyncError::Remote { .. }
            | SyncError::Http(_)
            | SyncError::RateLimited(_)
            | SyncError::Timeout(_)
            | SyncError::Pagination(_) => ApiError::new(ErrorCode::RemoteError, err.to_string()),
            other => {
                error!(error = %other, "Engine error");
                ApiError::internal(other.to_string())
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::malformed(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::malformed(rejection.body_text())
    }
}
