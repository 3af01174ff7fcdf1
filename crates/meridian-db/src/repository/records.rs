//! # Synced Record Repository
//!
//! Local storage for records exchanged with the collaboration API.
//!
//! ## Upsert by External Key
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  upsert_batch("orders", [A, B, C])                                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │  for each record:                                              │   │
//! │  │    SELECT id WHERE table_name = ? AND remote_id = ?            │   │
//! │  │      ├── found   → UPDATE fields, created_time, updated_at     │   │
//! │  │      └── missing → INSERT                                      │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT  (any error → whole batch rolled back, earlier batches stand) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Push Sources
//! `list_local_rows` reads from the config's `local_source_query` when one is
//! set, otherwise from this table's stored records. Source-query columns are
//! decoded by their SQLite storage class into JSON values; a `remote_id`
//! column, if present, becomes the row's remote identifier.
//!
//! Source-query rows have no `local_row_id`, so ids assigned by a create are
//! not written back. A source that must update on later pushes has to select
//! the remote id itself, usually by joining this table.

use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, SqlitePool, TypeInfo, ValueRef};
use tracing::debug;

use super::UpsertStats;
use crate::error::{DbError, DbResult};
use meridian_core::{FieldMap, LocalRow, RemoteRecord, TableConfig, REMOTE_ID_COLUMN};

/// Repository for synced records.
#[derive(Debug, Clone)]
pub struct SyncedRecordRepository {
    pool: SqlitePool,
}

impl SyncedRecordRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncedRecordRepository { pool }
    }

    /// Upserts one batch in a single transaction.
    ///
    /// Records without a remote id are always inserted.
    pub async fn upsert_batch(
        &self,
        table_name: &str,
        records: &[RemoteRecord],
    ) -> DbResult<UpsertStats> {
        let now = Utc::now();
        let mut stats = UpsertStats::default();
        let mut tx = self.pool.begin().await?;

        for record in records {
            let fields = serde_json::to_string(&record.fields)?;

            let existing: Option<i64> = match &record.remote_id {
                Some(remote_id) => {
                    sqlx::query_scalar(
                        "SELECT id FROM synced_records WHERE table_name = ?1 AND remote_id = ?2",
                    )
                    .bind(table_name)
                    .bind(remote_id)
                    .fetch_optional(&mut *tx)
                    .await?
                }
                None => None,
            };

            match existing {
                Some(id) => {
                    sqlx::query(
                        r#"
                        UPDATE synced_records
                        SET fields = ?1,
                            created_time = COALESCE(?2, created_time),
                            updated_at = ?3
                        WHERE id = ?4
                        "#,
                    )
                    .bind(&fields)
                    .bind(record.created_time)
                    .bind(now)
                    .bind(id)
                    .execute(&mut *tx)
                    .await?;
                    stats.updated += 1;
                }
                None => {
                    sqlx::query(
                        r#"
                        INSERT INTO synced_records (table_name, remote_id, fields, created_time, updated_at)
                        VALUES (?1, ?2, ?3, ?4, ?5)
                        "#,
                    )
                    .bind(table_name)
                    .bind(record.remote_id.as_deref())
                    .bind(&fields)
                    .bind(record.created_time)
                    .bind(now)
                    .execute(&mut *tx)
                    .await?;
                    stats.inserted += 1;
                }
            }
        }

        tx.commit().await?;

        debug!(
            table = %table_name,
            inserted = stats.inserted,
            updated = stats.updated,
            "Batch committed"
        );

        Ok(stats)
    }

    /// Stores a locally created row that has no remote counterpart yet.
    pub async fn insert_local(&self, table_name: &str, fields: &FieldMap) -> DbResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO synced_records (table_name, remote_id, fields, created_time, updated_at)
            VALUES (?1, NULL, ?2, NULL, ?3)
            RETURNING id
            "#,
        )
        .bind(table_name)
        .bind(serde_json::to_string(fields)?)
        .bind(Utc::now())
        .fetch_one(&self.pool)
        .await?;
        Ok(id)
    }

    /// Records the remote id assigned to a pushed row.
    pub async fn link_remote_id(&self, local_row_id: i64, remote_id: &str) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE synced_records SET remote_id = ?1, updated_at = ?2 WHERE id = ?3",
        )
        .bind(remote_id)
        .bind(Utc::now())
        .bind(local_row_id)
        .execute(&self.pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::UniqueViolation { .. } => DbError::duplicate("remote_id", remote_id),
            other => other,
        })?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found("SyncedRecord", local_row_id.to_string()));
        }
        Ok(())
    }

    /// Rows to push for a table, at most `limit`.
    ///
    /// Rows read through a source query carry `local_row_id: None`; a row
    /// without a `remote_id` column value is created again on every push.
    pub async fn list_local_rows(&self, config: &TableConfig, limit: usize) -> DbResult<Vec<LocalRow>> {
        match config
            .local_source_query
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
        {
            Some(source) => self.rows_from_source(source, limit).await,
            None => self.rows_from_store(&config.name, limit).await,
        }
    }

    async fn rows_from_store(&self, table_name: &str, limit: usize) -> DbResult<Vec<LocalRow>> {
        let rows: Vec<(i64, Option<String>, String)> = sqlx::query_as(
            r#"
            SELECT id, remote_id, fields
            FROM synced_records
            WHERE table_name = ?1
            ORDER BY id
            LIMIT ?2
            "#,
        )
        .bind(table_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(id, remote_id, fields)| {
                Ok(LocalRow {
                    local_row_id: Some(id),
                    remote_id,
                    fields: parse_fields(&fields)?,
                })
            })
            .collect()
    }

    async fn rows_from_source(&self, source: &str, limit: usize) -> DbResult<Vec<LocalRow>> {
        let sql = format!(
            "SELECT * FROM ({}) LIMIT ?1",
            source.trim_end_matches(';')
        );

        let rows = sqlx::query(&sql)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(row_to_local).collect()
    }

    /// Stored records for a table, in insertion order.
    pub async fn list(&self, table_name: &str, limit: usize) -> DbResult<Vec<RemoteRecord>> {
        let rows: Vec<(Option<String>, String, Option<DateTime<Utc>>)> = sqlx::query_as(
            r#"
            SELECT remote_id, fields, created_time
            FROM synced_records
            WHERE table_name = ?1
            ORDER BY id
            LIMIT ?2
            "#,
        )
        .bind(table_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(remote_id, fields, created_time)| {
                Ok(RemoteRecord {
                    remote_id,
                    fields: parse_fields(&fields)?,
                    created_time,
                })
            })
            .collect()
    }

    pub async fn count(&self, table_name: &str) -> DbResult<i64> {
        let count = sqlx::query_scalar("SELECT COUNT(*) FROM synced_records WHERE table_name = ?1")
            .bind(table_name)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

fn parse_fields(raw: &str) -> DbResult<FieldMap> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        other => Err(DbError::InvalidData(format!(
            "record fields must be a JSON object, got {}",
            other
        ))),
    }
}

/// Decodes an arbitrary result row into a push row.
fn row_to_local(row: &SqliteRow) -> DbResult<LocalRow> {
    let mut fields = FieldMap::new();
    let mut remote_id = None;

    for (index, column) in row.columns().iter().enumerate() {
        let value = column_value(row, index)?;

        if column.name() == REMOTE_ID_COLUMN {
            remote_id = match value {
                Value::String(s) if !s.is_empty() => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            };
            continue;
        }

        fields.insert(column.name().to_string(), value);
    }

    Ok(LocalRow {
        local_row_id: None,
        remote_id,
        fields,
    })
}

fn column_value(row: &SqliteRow, index: usize) -> DbResult<Value> {
    let raw = row.try_get_raw(index)?;
    if raw.is_null() {
        return Ok(Value::Null);
    }

    let value = match raw.type_info().name() {
        "INTEGER" | "BOOLEAN" => Value::from(row.try_get_unchecked::<i64, _>(index)?),
        "REAL" | "NUMERIC" => Value::from(row.try_get_unchecked::<f64, _>(index)?),
        "BLOB" => Value::Null,
        _ => Value::from(row.try_get_unchecked::<String, _>(index)?),
    };
    Ok(value)
}

// =============================================================================
// Unit Tests
// =============================================================================
