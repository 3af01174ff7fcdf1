//! # meridian-sync: Sync Engine for Meridian
//!
//! Moves records between a remote collaboration API, a POS API and the local
//! SQLite store.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Sync Engine                                    │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 Scheduler (event loop task)                      │  │
//! │  │                                                                  │  │
//! │  │  One job per active table (every N minutes)                      │  │
//! │  │  Two daily POS jobs (inventory, receipts)                        │  │
//! │  └──────────────┬───────────────────────────────┬───────────────────┘  │
//! │                 ▼                               ▼                       │
//! │  ┌────────────────────────────┐  ┌────────────────────────────────┐    │
//! │  │ SyncCoordinator            │  │ PosIngestion                   │    │
//! │  │                            │  │                                │    │
//! │  │ pull: list → map → batches │  │ PaginatedIngestor cursor loop  │    │
//! │  │ push: rows → create/update │  │ full reload / accumulate       │    │
//! │  └──────────────┬─────────────┘  └───────────────┬────────────────┘    │
//! │                 ▼                                ▼                      │
//! │  ┌────────────────────────────┐  ┌────────────────────────────────┐    │
//! │  │ RemoteRecordClient         │  │ PageSource<T>                  │    │
//! │  │ (HttpRecordClient)         │  │ (HttpPosClient)                │    │
//! │  └────────────────────────────┘  └────────────────────────────────┘    │
//! │                                                                         │
//! │  Both sides write through meridian-db and append to sync history.      │
//! │  TableLocks keeps a table to one run at a time.                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//! - [`config`] - Engine configuration (TOML file + env overrides)
//! - [`error`] - Engine error type
//! - [`remote`] - Collaboration API client
//! - [`pos_client`] - POS API client
//! - [`retry`] - Retry policy and remote write operations
//! - [`ingest`] - Cursor-paginated batch ingestion
//! - [`locks`] - Per-table run locks
//! - [`coordinator`] - Table pull/push runs
//! - [`pos_jobs`] - POS dataset ingestion
//! - [`scheduler`] - Recurring triggers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use meridian_sync::{EngineConfig, HttpRecordClient, Scheduler, SyncCoordinator};
//!
//! let config = EngineConfig::load(None)?;
//! let client = Arc::new(HttpRecordClient::new(&config.remote)?);
//! let coordinator = SyncCoordinator::new(db.clone(), client, &config.remote.base_id)
//!     .with_settings(&config.sync);
//!
//! let result = coordinator.sync_table(table_id).await?;
//! println!("{} synced, {} failed", result.records_synced, result.records_error);
//!
//! let handle = Scheduler::new(db, coordinator, None).start();
//! handle.stop().await;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod coordinator;
pub mod error;
pub mod ingest;
pub mod locks;
pub mod pos_client;
pub mod pos_jobs;
pub mod remote;
pub mod retry;
pub mod scheduler;

#[cfg(test)]
mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{
    DatabaseSettings, EngineConfig, PosSettings, RemoteSettings, ServerSettings, SyncSettings,
};
pub use coordinator::{SyncCoordinator, TableStatus};
pub use error::{EngineResult, SyncError};
pub use ingest::{BatchSink, PaginatedIngestor};
pub use locks::{LockKey, TableLockGuard, TableLocks};
pub use pos_client::{HttpPosClient, PageSource};
pub use pos_jobs::PosIngestion;
pub use remote::{HttpRecordClient, RemoteRecordClient};
pub use retry::{RemoteOp, RetryPolicy};
pub use scheduler::{
    JobKey, JobKind, JobRegistry, Recurrence, Scheduler, SchedulerHandle, SchedulerState,
};
