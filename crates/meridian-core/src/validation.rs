//! # Validation Module
//!
//! Input validation for table configurations and POS schedule settings.
//!
//! ## Validation Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: HTTP handler                                                 │
//! │  ├── Type validation (JSON deserialization)                            │
//! │  └── THIS MODULE: mapping, direction, SQL shape, times of day         │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Database (SQLite)                                            │
//! │  ├── NOT NULL constraints                                              │
//! │  └── UNIQUE(name) on table_configs                                     │
//! │                                                                         │
//! │  Everything here runs at create/update time, never at sync time.      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use meridian_core::validation::{validate_direction, parse_time_of_day};
//! use meridian_core::SyncDirection;
//!
//! assert_eq!(validate_direction("both").unwrap(), SyncDirection::Both);
//! assert!(parse_time_of_day("inventory_time", "25:00").is_err());
//! ```

use chrono::NaiveTime;

use crate::error::ValidationError;
use crate::mapping::FieldMapping;
use crate::types::{PosDataset, PosSchedule, SyncDirection, TableConfigInput};
use crate::MAX_SYNC_INTERVAL_MINUTES;

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

/// Table names owned by the engine itself.
const RESERVED_TABLE_NAMES: [&str; 7] = [
    "table_configs",
    "synced_records",
    "inventory_levels",
    "receipts",
    "receipt_line_items",
    "sync_history",
    "app_settings",
];

// =============================================================================
// String Validators
// =============================================================================

/// Validates a local table name.
///
/// ## Rules
/// - Must not be empty, at most 64 characters
/// - Letters, digits and underscores only; must not start with a digit
/// - Must not shadow an engine table
///
/// ## Example
/// ```rust
/// use meridian_core::validation::validate_table_name;
///
/// assert!(validate_table_name("orders").is_ok());
/// assert!(validate_table_name("1orders").is_err());
/// assert!(validate_table_name("receipts").is_err());
/// ```
pub fn validate_table_name(name: &str) -> ValidationResult<()> {
    let name = name.trim();

    if name.is_empty() {
        return Err(ValidationError::required("name"));
    }

    if name.len() > 64 {
        return Err(ValidationError::TooLong {
            field: "name".to_string(),
            max: 64,
        });
    }

    let mut chars = name.chars();
    let starts_ok = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    if !starts_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ValidationError::invalid_format(
            "name",
            "must contain only letters, digits and underscores and not start with a digit",
        ));
    }

    if RESERVED_TABLE_NAMES.contains(&name.to_ascii_lowercase().as_str()) {
        return Err(ValidationError::invalid_format(
            "name",
            format!("'{}' is reserved", name),
        ));
    }

    Ok(())
}

/// Validates the remote table identifier.
pub fn validate_remote_table_id(remote_table_id: &str) -> ValidationResult<()> {
    let remote_table_id = remote_table_id.trim();

    if remote_table_id.is_empty() {
        return Err(ValidationError::required("remote_table_id"));
    }

    if remote_table_id.len() > 100 {
        return Err(ValidationError::TooLong {
            field: "remote_table_id".to_string(),
            max: 100,
        });
    }

    Ok(())
}

pub fn validate_description(description: &str) -> ValidationResult<()> {
    if description.len() > 500 {
        return Err(ValidationError::TooLong {
            field: "description".to_string(),
            max: 500,
        });
    }
    Ok(())
}

// =============================================================================
// Sync Settings
// =============================================================================

/// Parses a direction label into the closed enum.
pub fn validate_direction(direction: &str) -> ValidationResult<SyncDirection> {
    direction
        .parse()
        .map_err(|_| ValidationError::NotAllowed {
            field: "sync_direction".to_string(),
            allowed: SyncDirection::ALL
                .iter()
                .map(|d| d.as_str().to_string())
                .collect(),
        })
}

/// Validates the sync interval in minutes (0 = manual only, max one week).
pub fn validate_sync_interval(minutes: i64) -> ValidationResult<()> {
    if !(0..=MAX_SYNC_INTERVAL_MINUTES).contains(&minutes) {
        return Err(ValidationError::OutOfRange {
            field: "sync_interval".to_string(),
            min: 0,
            max: MAX_SYNC_INTERVAL_MINUTES,
        });
    }
    Ok(())
}

// =============================================================================
// SQL Shape
// =============================================================================

/// Returns true if `sql` is a single statement (an optional trailing `;`).
fn is_single_statement(sql: &str) -> bool {
    let trimmed = sql.trim().trim_end_matches(';');
    !trimmed.contains(';')
}

fn starts_with_keyword(sql: &str, keyword: &str) -> bool {
    let head = sql.trim_start();
    head.len() >= keyword.len() && head[..keyword.len()].eq_ignore_ascii_case(keyword)
}

/// Validates an optional local CREATE TABLE statement.
pub fn validate_create_sql(sql: &str) -> ValidationResult<()> {
    if !starts_with_keyword(sql, "CREATE TABLE") {
        return Err(ValidationError::invalid_format(
            "create_sql",
            "must be a CREATE TABLE statement",
        ));
    }
    if !is_single_statement(sql) {
        return Err(ValidationError::invalid_format(
            "create_sql",
            "must be a single statement",
        ));
    }
    Ok(())
}

/// Validates an optional local source query used for push.
pub fn validate_source_sql(sql: &str) -> ValidationResult<()> {
    if !starts_with_keyword(sql, "SELECT") && !starts_with_keyword(sql, "WITH") {
        return Err(ValidationError::invalid_format(
            "source_sql",
            "must be a SELECT query",
        ));
    }
    if !is_single_statement(sql) {
        return Err(ValidationError::invalid_format(
            "source_sql",
            "must be a single statement",
        ));
    }
    Ok(())
}

// =============================================================================
// Aggregate Validators
// =============================================================================

/// Validates a full table configuration request.
///
/// Returns the parsed direction and mapping so callers do not parse twice.
pub fn validate_table_input(
    input: &TableConfigInput,
) -> ValidationResult<(SyncDirection, FieldMapping)> {
    validate_table_name(&input.name)?;
    validate_remote_table_id(&input.remote_table_id)?;
    validate_description(&input.description)?;
    let mapping = FieldMapping::parse(&input.mapping)?;
    let direction = validate_direction(&input.sync_direction)?;
    validate_sync_interval(input.sync_interval)?;

    if let Some(sql) = non_blank(&input.create_sql) {
        validate_create_sql(sql)?;
    }
    if let Some(sql) = non_blank(&input.source_sql) {
        validate_source_sql(sql)?;
    }

    Ok((direction, mapping))
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.trim().is_empty())
}

// =============================================================================
// Time of Day
// =============================================================================

/// Parses a strict `HH:MM` (24-hour) time of day.
pub fn parse_time_of_day(field: &str, value: &str) -> ValidationResult<NaiveTime> {
    let value = value.trim();
    let well_formed = value.len() == 5 && value.as_bytes()[2] == b':';

    if !well_formed {
        return Err(ValidationError::invalid_format(field, "expected HH:MM"));
    }

    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| ValidationError::invalid_format(field, "expected HH:MM"))
}

/// Validates both POS job times.
pub fn validate_pos_schedule(schedule: &PosSchedule) -> ValidationResult<()> {
    schedule.time_for(PosDataset::InventoryLevels)?;
    schedule.time_for(PosDataset::Receipts)?;
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> TableConfigInput {
        TableConfigInput {
            name: "orders".to_string(),
            remote_table_id: "tblOrders".to_string(),
            description: "Customer orders".to_string(),
            mapping: r#"{"sku": "SKU"}"#.to_string(),
            create_sql: Some("CREATE TABLE orders (sku TEXT)".to_string()),
            source_sql: None,
            sync_interval: 30,
            sync_direction: "both".to_string(),
            active: true,
        }
    }

    #[test]
    fn test_valid_input() {
        let (direction, mapping) = validate_table_input(&input()).unwrap();
        assert_eq!(direction, SyncDirection::Both);
        assert_eq!(mapping.len(), 1);
    }

    #[test]
    fn test_rejects_bad_direction() {
        let mut bad = input();
        bad.sync_direction = "sideways".to_string();
        assert!(matches!(
            validate_table_input(&bad),
            Err(ValidationError::NotAllowed { .. })
        ));
    }

    #[test]
    fn test_rejects_bad_mapping() {
        let mut bad = input();
        bad.mapping = r#"{"sku": "SKU", "code": "SKU"}"#.to_string();
        assert!(validate_table_input(&bad).is_err());
    }

    #[test]
    fn test_interval_bounds() {
        assert!(validate_sync_interval(0).is_ok());
        assert!(validate_sync_interval(MAX_SYNC_INTERVAL_MINUTES).is_ok());
        assert!(validate_sync_interval(-1).is_err());
        assert!(validate_sync_interval(MAX_SYNC_INTERVAL_MINUTES + 1).is_err());
    }

    #[test]
    fn test_sql_shape() {
        assert!(validate_create_sql("create table t (a TEXT);").is_ok());
        assert!(validate_create_sql("DROP TABLE t").is_err());
        assert!(validate_create_sql("CREATE TABLE t (a TEXT); DROP TABLE x").is_err());

        assert!(validate_source_sql("SELECT * FROM orders").is_ok());
        assert!(validate_source_sql("with x as (select 1) select * from x").is_ok());
        assert!(validate_source_sql("DELETE FROM orders").is_err());
    }

    #[test]
    fn test_blank_optional_sql_is_ignored() {
        let mut blank = input();
        blank.create_sql = Some("   ".to_string());
        assert!(validate_table_input(&blank).is_ok());
    }

    #[test]
    fn test_time_of_day() {
        assert_eq!(
            parse_time_of_day("t", "02:30").unwrap(),
            NaiveTime::from_hms_opt(2, 30, 0).unwrap()
        );
        assert!(parse_time_of_day("t", "2:30").is_err());
        assert!(parse_time_of_day("t", "24:00").is_err());
        assert!(parse_time_of_day("t", "noon").is_err());
    }

    #[test]
    fn test_pos_schedule() {
        assert!(validate_pos_schedule(&PosSchedule::default()).is_ok());
        let bad = PosSchedule {
            inventory_time: "02:00".to_string(),
            receipts_time: "3pm".to_string(),
        };
        assert!(validate_pos_schedule(&bad).is_err());
    }
}
