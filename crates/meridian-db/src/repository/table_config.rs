//! # Table Config Repository
//!
//! CRUD for `table_configs`, plus the `last_sync_time` bookkeeping the
//! coordinator performs after each run.
//!
//! ## Create Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  POST /tables (validated input)                                        │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   SINGLE TRANSACTION                            │   │
//! │  │  1. INSERT INTO table_configs ... RETURNING id                 │   │
//! │  │  2. execute create_sql (if any)                                │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  COMMIT ← a bad CREATE TABLE leaves no config row behind              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use meridian_core::{TableConfig, TableConfigInput};

const SELECT_COLUMNS: &str = r#"
    SELECT id, name, remote_table_id, description, field_mapping,
           local_create_statement, local_source_query, sync_interval_minutes,
           sync_direction, last_sync_time, active, created_at, updated_at
    FROM table_configs
"#;

/// Repository for table configurations.
#[derive(Debug, Clone)]
pub struct TableConfigRepository {
    pool: SqlitePool,
}

impl TableConfigRepository {
    pub fn new(pool: SqlitePool) -> Self {
        TableConfigRepository { pool }
    }

    /// All configs, ordered by name.
    pub async fn list(&self) -> DbResult<Vec<TableConfig>> {
        let sql = format!("{} ORDER BY name", SELECT_COLUMNS);
        let configs = sqlx::query_as::<_, TableConfig>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(configs)
    }

    /// Active configs, ordered by name.
    pub async fn list_active(&self) -> DbResult<Vec<TableConfig>> {
        let sql = format!("{} WHERE active = 1 ORDER BY name", SELECT_COLUMNS);
        let configs = sqlx::query_as::<_, TableConfig>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(configs)
    }

    pub async fn get(&self, id: i64) -> DbResult<Option<TableConfig>> {
        let sql = format!("{} WHERE id = ?1", SELECT_COLUMNS);
        let config = sqlx::query_as::<_, TableConfig>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(config)
    }

    /// Inserts a config and runs its create statement in one transaction.
    ///
    /// The input must already be validated.
    pub async fn create(&self, input: &TableConfigInput) -> DbResult<TableConfig> {
        let now = Utc::now();
        let name = input.name.trim();

        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO table_configs (
                name, remote_table_id, description, field_mapping,
                local_create_statement, local_source_query, sync_interval_minutes,
                sync_direction, last_sync_time, active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, NULL, ?9, ?10, ?10)
            RETURNING id
            "#,
        )
        .bind(name)
        .bind(input.remote_table_id.trim())
        .bind(&input.description)
        .bind(&input.mapping)
        .bind(non_blank(&input.create_sql))
        .bind(non_blank(&input.source_sql))
        .bind(input.sync_interval)
        .bind(input.sync_direction.trim())
        .bind(input.active)
        .bind(now)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| name_conflict(e, name))?;

        if let Some(create_sql) = non_blank(&input.create_sql) {
            debug!(table = %name, "Executing create statement");
            sqlx::query(create_sql).execute(&mut *tx).await?;
        }

        tx.commit().await?;

        info!(id, table = %name, "Table config created");

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("TableConfig", id.to_string()))
    }

    /// Replaces every editable field of a config.
    ///
    /// The create statement is stored but not executed again. A rename moves
    /// the table's synced records to the new name in the same transaction.
    pub async fn update(&self, id: i64, input: &TableConfigInput) -> DbResult<TableConfig> {
        let name = input.name.trim();

        let mut tx = self.pool.begin().await?;

        let previous: String = sqlx::query_scalar("SELECT name FROM table_configs WHERE id = ?1")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| DbError::not_found("TableConfig", id.to_string()))?;

        sqlx::query(
            r#"
            UPDATE table_configs SET
                name = ?1, remote_table_id = ?2, description = ?3, field_mapping = ?4,
                local_create_statement = ?5, local_source_query = ?6,
                sync_interval_minutes = ?7, sync_direction = ?8, active = ?9,
                updated_at = ?10
            WHERE id = ?11
            "#,
        )
        .bind(name)
        .bind(input.remote_table_id.trim())
        .bind(&input.description)
        .bind(&input.mapping)
        .bind(non_blank(&input.create_sql))
        .bind(non_blank(&input.source_sql))
        .bind(input.sync_interval)
        .bind(input.sync_direction.trim())
        .bind(input.active)
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await
        .map_err(|e| name_conflict(e, name))?;

        if previous != name {
            let moved = sqlx::query("UPDATE synced_records SET table_name = ?1 WHERE table_name = ?2")
                .bind(name)
                .bind(&previous)
                .execute(&mut *tx)
                .await?
                .rows_affected();
            debug!(id, from = %previous, to = %name, moved, "Moved synced records to new table name");
        }

        tx.commit().await?;

        info!(id, table = %name, "Table config updated");

        self.get(id)
            .await?
            .ok_or_else(|| DbError::not_found("TableConfig", id.to_string()))
    }

    /// Deletes a config and the synced records stored for it.
    ///
    /// Returns the deleted config.
    pub async fn delete(&self, id: i64) -> DbResult<TableConfig> {
        let config = self
            .get(id)
            .await?
            .ok_or_else(|| DbError::not_found("TableConfig", id.to_string()))?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM synced_records WHERE table_name = ?1")
            .bind(&config.name)
            .execute(&mut *tx)
            .await?;

        sqlx::query("DELETE FROM table_configs WHERE id = ?1")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(id, table = %config.name, "Table config deleted");
        Ok(config)
    }

    /// Records the completion time of a run.
    pub async fn touch_last_sync(&self, id: i64, at: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE table_configs SET last_sync_time = ?1 WHERE id = ?2")
            .bind(at)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

fn name_conflict(err: sqlx::Error, name: &str) -> DbError {
    match DbError::from(err) {
        DbError::UniqueViolation { .. } => DbError::duplicate("table name", name),
        other => other,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
