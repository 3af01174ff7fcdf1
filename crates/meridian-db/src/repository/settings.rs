//! # Settings Repository
//!
//! Key/value settings stored in `app_settings`. The POS job times live here
//! so they survive restarts and can be edited over HTTP.

use chrono::Utc;
use sqlx::SqlitePool;

use crate::error::DbResult;
use meridian_core::PosSchedule;

const POS_INVENTORY_TIME: &str = "pos.inventory_time";
const POS_RECEIPTS_TIME: &str = "pos.receipts_time";

/// Repository for application settings.
#[derive(Debug, Clone)]
pub struct SettingsRepository {
    pool: SqlitePool,
}

impl SettingsRepository {
    pub fn new(pool: SqlitePool) -> Self {
        SettingsRepository { pool }
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM app_settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            r#"
            INSERT INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
            ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// The stored POS schedule, with defaults for missing keys.
    pub async fn pos_schedule(&self) -> DbResult<PosSchedule> {
        let defaults = PosSchedule::default();
        Ok(PosSchedule {
            inventory_time: self
                .get(POS_INVENTORY_TIME)
                .await?
                .unwrap_or(defaults.inventory_time),
            receipts_time: self
                .get(POS_RECEIPTS_TIME)
                .await?
                .unwrap_or(defaults.receipts_time),
        })
    }

    /// Stores both POS job times in one transaction. Input must be validated.
    pub async fn set_pos_schedule(&self, schedule: &PosSchedule) -> DbResult<()> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;

        for (key, value) in [
            (POS_INVENTORY_TIME, &schedule.inventory_time),
            (POS_RECEIPTS_TIME, &schedule.receipts_time),
        ] {
            sqlx::query(
                r#"
                INSERT INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at
                "#,
            )
            .bind(key)
            .bind(value.trim())
            .bind(now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Database, DbConfig};

    #[tokio::test]
    async fn test_pos_schedule_defaults_then_override() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        assert_eq!(db.settings().pos_schedule().await.unwrap(), PosSchedule::default());

        let custom = PosSchedule {
            inventory_time: "04:15".to_string(),
            receipts_time: "05:30".to_string(),
        };
        db.settings().set_pos_schedule(&custom).await.unwrap();
        assert_eq!(db.settings().pos_schedule().await.unwrap(), custom);
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.settings().set("k", "1").await.unwrap();
        db.settings().set("k", "2").await.unwrap();
        assert_eq!(db.settings().get("k").await.unwrap().as_deref(), Some("2"));
    }
}
