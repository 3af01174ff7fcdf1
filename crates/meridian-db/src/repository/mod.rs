//! # Repository Module
//!
//! Database repository implementations for the sync engine.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Layout                                    │
//! │                                                                         │
//! │  Coordinator / HTTP handler                                            │
//! │       │                                                                 │
//! │       │  db.records().upsert_batch("orders", &batch)                   │
//! │       ▼                                                                 │
//! │  ┌──────────────────────┐   ┌──────────────────────┐                   │
//! │  │ TableConfigRepository│   │SyncedRecordRepository│                   │
//! │  │  list / get / create │   │  upsert_batch        │                   │
//! │  │  update / delete     │   │  list_local_rows     │                   │
//! │  │  touch_last_sync     │   │  link_remote_id      │                   │
//! │  └──────────────────────┘   └──────────────────────┘                   │
//! │  ┌──────────────────────┐   ┌──────────────────────┐                   │
//! │  │    PosRepository     │   │SyncHistoryRepository │                   │
//! │  │  upsert_inventory    │   │  record / recent     │                   │
//! │  │  upsert_receipts     │   └──────────────────────┘                   │
//! │  │  clear_old_data      │   ┌──────────────────────┐                   │
//! │  └──────────────────────┘   │  SettingsRepository  │                   │
//! │                             │  pos_schedule        │                   │
//! │                             └──────────────────────┘                   │
//! │                                                                         │
//! │  Every batch write runs in ONE transaction: all rows or none.          │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod history;
pub mod pos;
pub mod records;
pub mod settings;
pub mod table_config;

/// Row counts from one batch upsert.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpsertStats {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertStats {
    /// Total rows written.
    pub fn total(&self) -> usize {
        self.inserted + self.updated
    }
}
