//! # Sync History Repository
//!
//! Every `SyncResult` the engine produces is appended here, one row per run.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{DbError, DbResult};
use meridian_core::SyncResult;

/// Repository for persisted sync results.
#[derive(Debug, Clone)]
pub struct SyncHistoryRepository {
    pool: SqlitePool,
}

impl SyncHistoryRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SyncHistoryRepository { pool }
    }

    /// Appends a finished run.
    pub async fn record(&self, result: &SyncResult) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO sync_history (
                run_id, table_name, direction, records_fetched, records_synced,
                records_error, start_time, end_time, error_messages
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
        )
        .bind(result.run_id.to_string())
        .bind(&result.table_name)
        .bind(&result.direction)
        .bind(result.records_fetched)
        .bind(result.records_synced)
        .bind(result.records_error)
        .bind(result.start_time)
        .bind(result.end_time)
        .bind(serde_json::to_string(&result.error_messages)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Most recent runs first, optionally for one table only.
    pub async fn recent(&self, table_name: Option<&str>, limit: u32) -> DbResult<Vec<SyncResult>> {
        let rows: Vec<HistoryRow> = sqlx::query_as(
            r#"
            SELECT run_id, table_name, direction, records_fetched, records_synced,
                   records_error, start_time, end_time, error_messages
            FROM sync_history
            WHERE ?1 IS NULL OR table_name = ?1
            ORDER BY end_time DESC, rowid DESC
            LIMIT ?2
            "#,
        )
        .bind(table_name)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(HistoryRow::into_result).collect()
    }

    /// The latest run for a table, if any.
    pub async fn last_for_table(&self, table_name: &str) -> DbResult<Option<SyncResult>> {
        Ok(self.recent(Some(table_name), 1).await?.into_iter().next())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct HistoryRow {
    run_id: String,
    table_name: String,
    direction: String,
    records_fetched: i64,
    records_synced: i64,
    records_error: i64,
    start_time: DateTime<Utc>,
    end_time: DateTime<Utc>,
    error_messages: String,
}

impl HistoryRow {
    fn into_result(self) -> DbResult<SyncResult> {
        let run_id = Uuid::parse_str(&self.run_id)
            .map_err(|e| DbError::InvalidData(format!("run_id '{}': {}", self.run_id, e)))?;

        Ok(SyncResult {
            run_id,
            table_name: self.table_name,
            direction: self.direction,
            records_fetched: self.records_fetched,
            records_synced: self.records_synced,
            records_error: self.records_error,
            start_time: self.start_time,
            end_time: self.end_time,
            error_messages: serde_json::from_str(&self.error_messages)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};
    use chrono::Duration;
    use meridian_core::SyncTally;

    fn result(table: &str, minutes_ago: i64, errors: usize) -> SyncResult {
        let end = Utc::now() - Duration::minutes(minutes_ago);
        let mut tally = SyncTally::start_at(table, "pull", end - Duration::seconds(5));
        tally.fetched(3 + errors);
        tally.synced(3);
        if errors > 0 {
            tally.failed(errors, "batch failed");
        }
        tally.finish_at(end)
    }

    #[tokio::test]
    async fn test_record_and_read_back() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let original = result("orders", 0, 1);

        db.history().record(&original).await.unwrap();

        let stored = db.history().last_for_table("orders").await.unwrap().unwrap();
        assert_eq!(stored.run_id, original.run_id);
        assert_eq!(stored.records_error, 1);
        assert_eq!(stored.error_messages, vec!["batch failed".to_string()]);
    }

    #[tokio::test]
    async fn test_recent_is_newest_first_and_filtered() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.history().record(&result("orders", 30, 0)).await.unwrap();
        db.history().record(&result("orders", 10, 0)).await.unwrap();
        db.history().record(&result("customers", 5, 0)).await.unwrap();

        let all = db.history().recent(None, 10).await.unwrap();
        assert_eq!(all.len(), 3);
        assert_eq!(all[0].table_name, "customers");

        let orders = db.history().recent(Some("orders"), 10).await.unwrap();
        assert_eq!(orders.len(), 2);
        assert!(orders[0].end_time > orders[1].end_time);

        assert!(db.history().last_for_table("missing").await.unwrap().is_none());
    }
}
