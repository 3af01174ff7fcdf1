//! # meridian-core: Pure Domain Logic for the Meridian Sync Engine
//!
//! Types and pure functions shared by every layer. No I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Meridian Architecture                              │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                 apps/server (axum HTTP)                         │   │
//! │  │    /tables  /sync  /status  /history  /pos/*                    │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 meridian-sync (engine)                          │   │
//! │  │    Scheduler ──► Coordinator ──► Remote / POS clients           │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │             ★ meridian-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  mapping  │  │   money   │  │ validation│  │   │
//! │  │   │TableConfig│  │  Mapping  │  │   Money   │  │  config   │  │   │
//! │  │   │SyncResult │  │  Outcome  │  │  cents    │  │  checks   │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK                            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                 meridian-db (SQLite)                            │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (TableConfig, RemoteRecord, SyncResult, POS types)
//! - [`mapping`] - Bidirectional field mapping
//! - [`money`] - Integer-cent money for POS amounts
//! - [`error`] - Domain error types
//! - [`validation`] - Configuration validation
//!
//! ## Example Usage
//!
//! ```rust
//! use meridian_core::mapping::FieldMapping;
//! use serde_json::json;
//!
//! let mapping = FieldMapping::parse(r#"{"sku": "SKU"}"#).unwrap();
//! let remote = json!({"SKU": "A1", "Notes": "rush"});
//!
//! let local = mapping.to_local_fields(remote.as_object().unwrap());
//! assert_eq!(local["sku"], json!("A1"));
//! assert_eq!(local["Notes"], json!("rush"));
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod mapping;
pub mod money;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use mapping::{FieldMap, FieldMapping, MappingOutcome};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Records per transactional batch when ingesting POS pages.
pub const DEFAULT_BATCH_SIZE: usize = 250;

/// Page size requested from the collaboration API when listing records.
pub const REMOTE_PAGE_SIZE: usize = 100;

/// Upper bound on local rows read for one push phase.
pub const MAX_PUSH_ROWS: usize = 1000;

/// Column name that carries the remote identifier in local source queries.
pub const REMOTE_ID_COLUMN: &str = "remote_id";

/// Largest accepted sync interval (one week).
pub const MAX_SYNC_INTERVAL_MINUTES: i64 = 7 * 24 * 60;
