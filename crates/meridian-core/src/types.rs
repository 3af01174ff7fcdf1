//! # Domain Types
//!
//! Core domain types used throughout the Meridian sync engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │  TableConfig    │   │  RemoteRecord   │   │   SyncResult    │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │   │  remote_id?     │   │  run_id (UUID)  │       │
//! │  │  name (unique)  │   │  fields         │   │  synced/error   │       │
//! │  │  mapping (JSON) │   │  created_time   │   │  messages       │       │
//! │  │  direction      │   └─────────────────┘   └─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │ InventoryLevel  │   │    Receipt      │   │   PosSchedule   │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  variant_id  ┐  │   │  receipt_number │   │  inventory_time │       │
//! │  │  store_id    ┘key│   │  money (cents)  │   │  receipts_time  │       │
//! │  │  in_stock       │   │  line_items     │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Stored vs Typed Values
//! `TableConfig` keeps `sync_direction` and `field_mapping` exactly as stored.
//! [`TableConfig::direction`] and [`TableConfig::mapping`] parse them, so a bad
//! value fails that one table's run instead of every read of the table list.

use chrono::{DateTime, NaiveTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult, ValidationError};
use crate::mapping::{FieldMap, FieldMapping};
use crate::money::{self, Money};

// =============================================================================
// Sync Direction
// =============================================================================

/// Which way records flow for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "lowercase")]
pub enum SyncDirection {
    /// Remote → local.
    Pull,
    /// Local → remote.
    Push,
    /// Pull, then push.
    Both,
}

impl SyncDirection {
    pub const ALL: [SyncDirection; 3] =
        [SyncDirection::Pull, SyncDirection::Push, SyncDirection::Both];

    /// The stored / wire form.
    pub const fn as_str(&self) -> &'static str {
        match self {
            SyncDirection::Pull => "pull",
            SyncDirection::Push => "push",
            SyncDirection::Both => "both",
        }
    }

    /// Returns true if this direction runs a pull phase.
    pub const fn includes_pull(&self) -> bool {
        matches!(self, SyncDirection::Pull | SyncDirection::Both)
    }

    /// Returns true if this direction runs a push phase.
    pub const fn includes_push(&self) -> bool {
        matches!(self, SyncDirection::Push | SyncDirection::Both)
    }
}

impl fmt::Display for SyncDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SyncDirection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pull" => Ok(SyncDirection::Pull),
            "push" => Ok(SyncDirection::Push),
            "both" => Ok(SyncDirection::Both),
            other => Err(CoreError::UnknownDirection(other.to_string())),
        }
    }
}

// =============================================================================
// Table Configuration
// =============================================================================

/// A configured table: how one local table maps to one remote table.
///
/// Read fresh before every sync run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
#[ts(export)]
pub struct TableConfig {
    pub id: i64,

    /// Local table name; unique across configs.
    pub name: String,

    /// Remote table identifier within the configured base.
    pub remote_table_id: String,

    pub description: String,

    /// JSON object string: local_field -> remote_field.
    #[serde(rename = "mapping")]
    pub field_mapping: String,

    /// Optional DDL executed when the table is created.
    #[serde(rename = "create_sql")]
    pub local_create_statement: Option<String>,

    /// Optional SELECT that supplies rows for push.
    #[serde(rename = "source_sql")]
    pub local_source_query: Option<String>,

    /// Minutes between scheduled runs; 0 means manual only.
    #[serde(rename = "sync_interval")]
    pub sync_interval_minutes: i64,

    /// Stored direction label; see [`TableConfig::direction`].
    pub sync_direction: String,

    #[ts(as = "Option<String>")]
    pub last_sync_time: Option<DateTime<Utc>>,

    pub active: bool,

    #[ts(as = "String")]
    pub created_at: DateTime<Utc>,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl TableConfig {
    /// Parses the stored direction.
    pub fn direction(&self) -> CoreResult<SyncDirection> {
        self.sync_direction.parse()
    }

    /// Parses the stored field mapping.
    pub fn mapping(&self) -> CoreResult<FieldMapping> {
        FieldMapping::parse(&self.field_mapping).map_err(|e| CoreError::InvalidMapping {
            table: self.name.clone(),
            reason: e.to_string(),
        })
    }

    /// Returns true if the recurring scheduler should register this table.
    pub fn is_scheduled(&self) -> bool {
        self.active && self.sync_interval_minutes > 0
    }
}

/// Request body for creating or replacing a table configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct TableConfigInput {
    pub name: String,
    pub remote_table_id: String,
    #[serde(default)]
    pub description: String,
    /// JSON object string: local_field -> remote_field.
    pub mapping: String,
    #[serde(default)]
    pub create_sql: Option<String>,
    #[serde(default)]
    pub source_sql: Option<String>,
    #[serde(default)]
    pub sync_interval: i64,
    pub sync_direction: String,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

// =============================================================================
// Records
// =============================================================================

/// A record as the remote collaboration API sees it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct RemoteRecord {
    /// Remote identifier; `None` until the record exists remotely.
    pub remote_id: Option<String>,

    #[ts(type = "Record<string, unknown>")]
    pub fields: FieldMap,

    #[ts(as = "Option<String>")]
    pub created_time: Option<DateTime<Utc>>,
}

impl RemoteRecord {
    pub fn new(remote_id: impl Into<String>, fields: FieldMap) -> Self {
        RemoteRecord {
            remote_id: Some(remote_id.into()),
            fields,
            created_time: None,
        }
    }
}

/// A local row read for the push direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct LocalRow {
    /// Row id in the synced-record store, when the row came from it.
    pub local_row_id: Option<i64>,

    /// Remote identifier; `None` means the push creates the record.
    pub remote_id: Option<String>,

    #[ts(type = "Record<string, unknown>")]
    pub fields: FieldMap,
}

impl LocalRow {
    /// Human-readable label used in error messages.
    pub fn label(&self, position: usize) -> String {
        match (&self.remote_id, self.local_row_id) {
            (Some(id), _) => format!("record {}", id),
            (None, Some(row)) => format!("local row {}", row),
            (None, None) => format!("row #{}", position + 1),
        }
    }
}

// =============================================================================
// Sync Result
// =============================================================================

/// Outcome of one sync or ingestion run.
///
/// Built through [`SyncTally`] and immutable once returned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SyncResult {
    #[ts(as = "String")]
    pub run_id: Uuid,
    pub table_name: String,
    /// Direction label as configured (may be an unknown value on config errors).
    pub direction: String,
    pub records_fetched: i64,
    pub records_synced: i64,
    pub records_error: i64,
    #[ts(as = "String")]
    pub start_time: DateTime<Utc>,
    #[ts(as = "String")]
    pub end_time: DateTime<Utc>,
    pub error_messages: Vec<String>,
}

impl SyncResult {
    /// A run that failed before touching any record.
    pub fn failed(
        table_name: impl Into<String>,
        direction: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        let mut tally = SyncTally::start(table_name, direction);
        tally.note(message);
        tally.finish()
    }

    /// Returns true if nothing went wrong.
    pub fn is_success(&self) -> bool {
        self.records_error == 0 && self.error_messages.is_empty()
    }

    /// Wall-clock duration of the run in milliseconds.
    pub fn duration_ms(&self) -> i64 {
        (self.end_time - self.start_time).num_milliseconds()
    }
}

/// Mutable accumulator for a run in progress.
///
/// ```rust
/// use meridian_core::SyncTally;
///
/// let mut tally = SyncTally::start("orders", "push");
/// tally.fetched(3);
/// tally.synced(2);
/// tally.failed(1, "record B: remote returned 500");
///
/// let result = tally.finish();
/// assert_eq!(result.records_synced, 2);
/// assert_eq!(result.records_error, 1);
/// assert_eq!(result.error_messages.len(), 1);
/// ```
#[derive(Debug, Clone)]
pub struct SyncTally {
    run_id: Uuid,
    table_name: String,
    direction: String,
    start_time: DateTime<Utc>,
    fetched: i64,
    synced: i64,
    errors: i64,
    messages: Vec<String>,
}

impl SyncTally {
    pub fn start(table_name: impl Into<String>, direction: impl Into<String>) -> Self {
        Self::start_at(table_name, direction, Utc::now())
    }

    pub fn start_at(
        table_name: impl Into<String>,
        direction: impl Into<String>,
        start_time: DateTime<Utc>,
    ) -> Self {
        SyncTally {
            run_id: Uuid::new_v4(),
            table_name: table_name.into(),
            direction: direction.into(),
            start_time,
            fetched: 0,
            synced: 0,
            errors: 0,
            messages: Vec::new(),
        }
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Records read from the source side.
    pub fn fetched(&mut self, count: usize) {
        self.fetched += count as i64;
    }

    /// Records written successfully.
    pub fn synced(&mut self, count: usize) {
        self.synced += count as i64;
    }

    /// Records that failed, with one message describing the failure.
    pub fn failed(&mut self, count: usize, message: impl Into<String>) {
        self.errors += count as i64;
        self.messages.push(message.into());
    }

    /// A message that does not correspond to failed records.
    pub fn note(&mut self, message: impl Into<String>) {
        self.messages.push(message.into());
    }

    pub fn synced_count(&self) -> i64 {
        self.synced
    }

    pub fn error_count(&self) -> i64 {
        self.errors
    }

    pub fn finish(self) -> SyncResult {
        self.finish_at(Utc::now())
    }

    pub fn finish_at(self, end_time: DateTime<Utc>) -> SyncResult {
        SyncResult {
            run_id: self.run_id,
            table_name: self.table_name,
            direction: self.direction,
            records_fetched: self.fetched,
            records_synced: self.synced,
            records_error: self.errors,
            start_time: self.start_time,
            end_time,
            error_messages: self.messages,
        }
    }
}

// =============================================================================
// POS Types
// =============================================================================

/// Stock on hand for one variant at one store.
///
/// Natural key: `(variant_id, store_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct InventoryLevel {
    pub variant_id: String,
    pub store_id: String,
    #[serde(default)]
    pub in_stock: f64,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A POS receipt. Natural key: `receipt_number`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Receipt {
    pub receipt_number: String,
    #[serde(default = "default_receipt_type")]
    pub receipt_type: String,
    #[ts(as = "String")]
    pub receipt_date: DateTime<Utc>,
    #[serde(default)]
    pub store_id: Option<String>,
    #[serde(default, with = "money::decimal")]
    #[ts(type = "number")]
    pub total_money: Money,
    #[serde(default, with = "money::decimal")]
    #[ts(type = "number")]
    pub total_tax: Money,
    #[serde(default, with = "money::decimal")]
    #[ts(type = "number")]
    pub total_discount: Money,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub cancelled_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub line_items: Vec<ReceiptLineItem>,
}

fn default_receipt_type() -> String {
    "SALE".to_string()
}

/// One line of a receipt; replaced wholesale when the receipt is upserted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct ReceiptLineItem {
    #[serde(default)]
    pub item_id: Option<String>,
    #[serde(default)]
    pub variant_id: Option<String>,
    #[serde(default)]
    pub item_name: String,
    #[serde(default)]
    pub sku: Option<String>,
    #[serde(default)]
    pub quantity: f64,
    #[serde(default, with = "money::decimal")]
    #[ts(type = "number")]
    pub price: Money,
    #[serde(default, with = "money::decimal")]
    #[ts(type = "number")]
    pub total_money: Money,
}

/// One page from a cursor-paginated source.
#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub cursor: Option<String>,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, cursor: Option<String>) -> Self {
        Page { items, cursor }
    }

    /// The cursor for the next request; `None` once the source is exhausted.
    ///
    /// An empty string is treated the same as a missing cursor.
    pub fn next_cursor(&self) -> Option<&str> {
        self.cursor.as_deref().filter(|c| !c.is_empty())
    }
}

/// The POS datasets the engine ingests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "snake_case")]
pub enum PosDataset {
    InventoryLevels,
    Receipts,
}

impl PosDataset {
    /// Local table (and history label) for this dataset.
    pub const fn table_name(&self) -> &'static str {
        match self {
            PosDataset::InventoryLevels => "inventory_levels",
            PosDataset::Receipts => "receipts",
        }
    }

    /// Inventory is a full reload; receipts accumulate.
    pub const fn is_full_reload(&self) -> bool {
        matches!(self, PosDataset::InventoryLevels)
    }
}

impl fmt::Display for PosDataset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.table_name())
    }
}

/// Times of day (UTC, `HH:MM`) at which the POS jobs fire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct PosSchedule {
    pub inventory_time: String,
    pub receipts_time: String,
}

impl Default for PosSchedule {
    fn default() -> Self {
        PosSchedule {
            inventory_time: "02:00".to_string(),
            receipts_time: "03:00".to_string(),
        }
    }
}

impl PosSchedule {
    /// The configured time for a dataset.
    pub fn time_for(&self, dataset: PosDataset) -> Result<NaiveTime, ValidationError> {
        match dataset {
            PosDataset::InventoryLevels => {
                crate::validation::parse_time_of_day("inventory_time", &self.inventory_time)
            }
            PosDataset::Receipts => {
                crate::validation::parse_time_of_day("receipts_time", &self.receipts_time)
            }
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
