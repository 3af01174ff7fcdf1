//! # POS Repository
//!
//! Batched upserts for POS datasets and the truncate/reset step that
//! precedes a full reload.
//!
//! ## Natural Keys
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  inventory_levels   UNIQUE (variant_id, store_id)                      │
//! │  receipts           UNIQUE (receipt_number)                            │
//! │  receipt_line_items replaced wholesale for each upserted receipt      │
//! │                                                                         │
//! │  Inventory ingestion:                                                  │
//! │    clear_old_data(InventoryLevels)   ← separate step, own transaction  │
//! │    upsert_inventory_levels(page 1)   ← one transaction per page        │
//! │    upsert_inventory_levels(page 2)                                     │
//! │    ...                                                                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::{debug, info};

use super::UpsertStats;
use crate::error::DbResult;
use meridian_core::{InventoryLevel, Money, PosDataset, Receipt, ReceiptLineItem};

/// Repository for POS data.
#[derive(Debug, Clone)]
pub struct PosRepository {
    pool: SqlitePool,
}

impl PosRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PosRepository { pool }
    }

    /// Upserts one page of inventory levels in a single transaction.
    pub async fn upsert_inventory_levels(&self, levels: &[InventoryLevel]) -> DbResult<UpsertStats> {
        let mut stats = UpsertStats::default();
        let mut tx = self.pool.begin().await?;

        for level in levels {
            let updated = sqlx::query(
                r#"
                UPDATE inventory_levels SET in_stock = ?1, updated_at = ?2
                WHERE variant_id = ?3 AND store_id = ?4
                "#,
            )
            .bind(level.in_stock)
            .bind(level.updated_at)
            .bind(&level.variant_id)
            .bind(&level.store_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

            if updated > 0 {
                stats.updated += 1;
                continue;
            }

            sqlx::query(
                r#"
                INSERT INTO inventory_levels (variant_id, store_id, in_stock, updated_at)
                VALUES (?1, ?2, ?3, ?4)
                "#,
            )
            .bind(&level.variant_id)
            .bind(&level.store_id)
            .bind(level.in_stock)
            .bind(level.updated_at)
            .execute(&mut *tx)
            .await?;
            stats.inserted += 1;
        }

        tx.commit().await?;

        debug!(
            inserted = stats.inserted,
            updated = stats.updated,
            "Inventory batch committed"
        );
        Ok(stats)
    }

    /// Upserts one page of receipts (and their line items) in a single transaction.
    pub async fn upsert_receipts(&self, receipts: &[Receipt]) -> DbResult<UpsertStats> {
        let mut stats = UpsertStats::default();
        let mut tx = self.pool.begin().await?;

        for receipt in receipts {
            let exists: Option<i64> =
                sqlx::query_scalar("SELECT id FROM receipts WHERE receipt_number = ?1")
                    .bind(&receipt.receipt_number)
                    .fetch_optional(&mut *tx)
                    .await?;

            if exists.is_some() {
                sqlx::query(
                    r#"
                    UPDATE receipts SET
                        receipt_type = ?1, receipt_date = ?2, store_id = ?3,
                        total_money = ?4, total_tax = ?5, total_discount = ?6,
                        cancelled_at = ?7
                    WHERE receipt_number = ?8
                    "#,
                )
                .bind(&receipt.receipt_type)
                .bind(receipt.receipt_date)
                .bind(receipt.store_id.as_deref())
                .bind(receipt.total_money.cents())
                .bind(receipt.total_tax.cents())
                .bind(receipt.total_discount.cents())
                .bind(receipt.cancelled_at)
                .bind(&receipt.receipt_number)
                .execute(&mut *tx)
                .await?;

                sqlx::query("DELETE FROM receipt_line_items WHERE receipt_number = ?1")
                    .bind(&receipt.receipt_number)
                    .execute(&mut *tx)
                    .await?;

                stats.updated += 1;
            } else {
                sqlx::query(
                    r#"
                    INSERT INTO receipts (
                        receipt_number, receipt_type, receipt_date, store_id,
                        total_money, total_tax, total_discount, cancelled_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                    "#,
                )
                .bind(&receipt.receipt_number)
                .bind(&receipt.receipt_type)
                .bind(receipt.receipt_date)
                .bind(receipt.store_id.as_deref())
                .bind(receipt.total_money.cents())
                .bind(receipt.total_tax.cents())
                .bind(receipt.total_discount.cents())
                .bind(receipt.cancelled_at)
                .execute(&mut *tx)
                .await?;

                stats.inserted += 1;
            }

            for (line_no, item) in receipt.line_items.iter().enumerate() {
                sqlx::query(
                    r#"
                    INSERT INTO receipt_line_items (
                        receipt_number, line_no, item_id, variant_id, item_name,
                        sku, quantity, price, total_money
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                    "#,
                )
                .bind(&receipt.receipt_number)
                .bind(line_no as i64)
                .bind(item.item_id.as_deref())
                .bind(item.variant_id.as_deref())
                .bind(&item.item_name)
                .bind(item.sku.as_deref())
                .bind(item.quantity)
                .bind(item.price.cents())
                .bind(item.total_money.cents())
                .execute(&mut *tx)
                .await?;
            }
        }

        tx.commit().await?;

        debug!(
            inserted = stats.inserted,
            updated = stats.updated,
            "Receipt batch committed"
        );
        Ok(stats)
    }

    /// Truncates a dataset and resets its identity sequences.
    ///
    /// Returns the number of primary rows removed.
    pub async fn clear_old_data(&self, dataset: PosDataset) -> DbResult<u64> {
        let tables: &[&str] = match dataset {
            PosDataset::InventoryLevels => &["inventory_levels"],
            PosDataset::Receipts => &["receipt_line_items", "receipts"],
        };

        let mut tx = self.pool.begin().await?;
        let mut removed = 0;

        for table in tables {
            let deleted = sqlx::query(&format!("DELETE FROM {}", table))
                .execute(&mut *tx)
                .await?
                .rows_affected();

            if *table == dataset.table_name() {
                removed = deleted;
            }

            sqlx::query("DELETE FROM sqlite_sequence WHERE name = ?1")
                .bind(*table)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        info!(dataset = %dataset, removed, "Cleared dataset");
        Ok(removed)
    }

    /// Row count of a dataset's primary table.
    pub async fn count(&self, dataset: PosDataset) -> DbResult<i64> {
        let count = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", dataset.table_name()))
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Loads one receipt with its line items.
    pub async fn get_receipt(&self, receipt_number: &str) -> DbResult<Option<Receipt>> {
        let header: Option<ReceiptRow> = sqlx::query_as(
            r#"
            SELECT receipt_number, receipt_type, receipt_date, store_id,
                   total_money, total_tax, total_discount, cancelled_at
            FROM receipts WHERE receipt_number = ?1
            "#,
        )
        .bind(receipt_number)
        .fetch_optional(&self.pool)
        .await?;

        let Some(header) = header else {
            return Ok(None);
        };

        let items: Vec<LineItemRow> = sqlx::query_as(
            r#"
            SELECT item_id, variant_id, item_name, sku, quantity, price, total_money
            FROM receipt_line_items WHERE receipt_number = ?1
            ORDER BY line_no
            "#,
        )
        .bind(receipt_number)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(header.into_receipt(items)))
    }
}

// =============================================================================
// Row Types
// =============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ReceiptRow {
    receipt_number: String,
    receipt_type: String,
    receipt_date: DateTime<Utc>,
    store_id: Option<String>,
    total_money: i64,
    total_tax: i64,
    total_discount: i64,
    cancelled_at: Option<DateTime<Utc>>,
}

#[derive(Debug, sqlx::FromRow)]
struct LineItemRow {
    item_id: Option<String>,
    variant_id: Option<String>,
    item_name: String,
    sku: Option<String>,
    quantity: f64,
    price: i64,
    total_money: i64,
}

impl ReceiptRow {
    fn into_receipt(self, items: Vec<LineItemRow>) -> Receipt {
        Receipt {
            receipt_number: self.receipt_number,
            receipt_type: self.receipt_type,
            receipt_date: self.receipt_date,
            store_id: self.store_id,
            total_money: Money::from_cents(self.total_money),
            total_tax: Money::from_cents(self.total_tax),
            total_discount: Money::from_cents(self.total_discount),
            cancelled_at: self.cancelled_at,
            line_items: items
                .into_iter()
                .map(|item| ReceiptLineItem {
                    item_id: item.item_id,
                    variant_id: item.variant_id,
                    item_name: item.item_name,
                    sku: item.sku,
                    quantity: item.quantity,
                    price: Money::from_cents(item.price),
                    total_money: Money::from_cents(item.total_money),
                })
                .collect(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
