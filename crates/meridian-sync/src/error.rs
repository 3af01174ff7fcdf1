//! # Engine Error Types
//!
//! Error types for sync and ingestion runs.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Engine Error Categories                            │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Remote      │  │      Run Control        │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Remote{status} │  │  TableNotFound          │ │
//! │  │  InvalidUrl     │  │  Http           │  │  AlreadyRunning         │ │
//! │  │  ConfigLoad     │  │  RateLimited    │  │  DeadlineExceeded       │ │
//! │  │  Core (mapping) │  │  Timeout        │  │  Pagination             │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────────────────────────────────┐  │
//! │  │    Database     │  │                 Internal                    │  │
//! │  │  Database(DbErr)│  │  Serialization, Internal, ShuttingDown,     │  │
//! │  │                 │  │  ChannelError                               │  │
//! │  └─────────────────┘  └─────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

use meridian_core::{CoreError, ValidationError};
use meridian_db::DbError;

/// Result type alias for engine operations.
pub type EngineResult<T> = Result<T, SyncError>;

/// Engine error type covering all sync and ingestion failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid engine configuration.
    #[error("Invalid engine configuration: {0}")]
    InvalidConfig(String),

    /// Invalid endpoint URL.
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Failed to load config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// A table's stored configuration is unusable (direction, mapping).
    #[error("Table configuration error: {0}")]
    Core(#[from] CoreError),

    // =========================================================================
    // Run Control Errors
    // =========================================================================
    /// No table configuration with this id.
    #[error("Table {0} not found")]
    TableNotFound(i64),

    /// The table already has a run in progress.
    #[error("Sync already running for table '{0}'")]
    AlreadyRunning(String),

    /// The run's overall deadline passed.
    #[error("Run deadline of {0} seconds exceeded")]
    DeadlineExceeded(u64),

    /// The cursor protocol broke down mid-ingestion.
    #[error("Pagination failed: {0}")]
    Pagination(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The remote API answered with a non-success status.
    #[error("Remote returned {status}: {message}")]
    Remote { status: u16, message: String },

    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// Still rate limited after the bounded number of retries.
    #[error("Rate limited by remote after {0} retries")]
    RateLimited(u32),

    /// Request timeout.
    #[error("Request timed out after {0} seconds")]
    Timeout(u64),

    // =========================================================================
    // Database Errors
    // =========================================================================
    /// Local persistence failed.
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Payload could not be encoded or decoded.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Internal engine error.
    #[error("Internal error: {0}")]
    Internal(String),

    /// The scheduler is shutting down.
    #[error("Scheduler is shutting down")]
    ShuttingDown,

    /// Channel send/receive failed.
    #[error("Channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<ValidationError> for SyncError {
    fn from(err: ValidationError) -> Self {
        SyncError::Core(CoreError::Validation(err))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(err: serde_json::Error) -> Self {
        SyncError::SerializationFailed(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            return SyncError::Timeout(0);
        }
        if err.is_decode() {
            return SyncError::SerializationFailed(err.to_string());
        }
        match err.status() {
            Some(status) => SyncError::Remote {
                status: status.as_u16(),
                message: err.to_string(),
            },
            None => SyncError::Http(err.to_string()),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl SyncError {
    /// Returns true if the failed operation may succeed when repeated.
    ///
    /// ## Retryable Errors
    /// - Transport failures and timeouts
    /// - Rate limiting
    /// - Remote 5xx and 429 responses
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Http(_) | SyncError::Timeout(_) | SyncError::RateLimited(_) => true,
            SyncError::Remote { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::Core(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Http("connection reset".into()).is_retryable());
        assert!(SyncError::Timeout(30).is_retryable());
        assert!(SyncError::Remote { status: 503, message: "down".into() }.is_retryable());
        assert!(SyncError::Remote { status: 429, message: "slow down".into() }.is_retryable());

        assert!(!SyncError::Remote { status: 422, message: "bad field".into() }.is_retryable());
        assert!(!SyncError::InvalidConfig("bad config".into()).is_retryable());
        assert!(!SyncError::AlreadyRunning("orders".into()).is_retryable());
    }

    #[test]
    fn test_config_errors() {
        let err: SyncError = CoreError::UnknownDirection("sideways".into()).into();
        assert!(err.is_config_error());
        assert!(err.to_string().contains("sideways"));

        let err: SyncError = ValidationError::required("name").into();
        assert!(err.is_config_error());

        assert!(!SyncError::TableNotFound(7).is_config_error());
    }

    #[test]
    fn test_error_display() {
        let err = SyncError::Remote { status: 500, message: "boom".into() };
        assert_eq!(err.to_string(), "Remote returned 500: boom");
    }
}
