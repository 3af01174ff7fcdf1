//! # POS Ingestion Jobs
//!
//! The two POS datasets and how each is loaded:
//!
//! | Dataset            | Mode         | Before the loop                 |
//! |--------------------|--------------|---------------------------------|
//! | `inventory_levels` | full reload  | `clear_old_data` (own step)     |
//! | `receipts`         | accumulate   | nothing; upsert by receipt no.  |
//!
//! Both run through [`PaginatedIngestor`], hold the dataset's lock for the
//! whole run and append their result to the sync history.

use std::sync::Arc;

use tracing::{info, warn};

use crate::error::EngineResult;
use crate::ingest::PaginatedIngestor;
use crate::locks::{LockKey, TableLocks};
use crate::pos_client::{HttpPosClient, PageSource};
use meridian_core::{InventoryLevel, PosDataset, Receipt, SyncResult, SyncTally};
use meridian_db::Database;

/// Runs POS ingestion for either dataset.
#[derive(Clone)]
pub struct PosIngestion {
    db: Database,
    inventory: Arc<dyn PageSource<InventoryLevel>>,
    receipts: Arc<dyn PageSource<Receipt>>,
    ingestor: PaginatedIngestor,
    locks: TableLocks,
}

impl PosIngestion {
    pub fn new(
        db: Database,
        inventory: Arc<dyn PageSource<InventoryLevel>>,
        receipts: Arc<dyn PageSource<Receipt>>,
    ) -> Self {
        PosIngestion {
            db,
            inventory,
            receipts,
            ingestor: PaginatedIngestor::default(),
            locks: TableLocks::new(),
        }
    }

    /// Both datasets served by one HTTP client.
    pub fn from_client(db: Database, client: HttpPosClient) -> Self {
        let client = Arc::new(client);
        Self::new(db, client.clone(), client)
    }

    pub fn ingestor(mut self, ingestor: PaginatedIngestor) -> Self {
        self.ingestor = ingestor;
        self
    }

    /// Ingests one dataset. Fails only when the dataset is already running.
    pub async fn run(&self, dataset: PosDataset) -> EngineResult<SyncResult> {
        let _guard = self
            .locks
            .try_acquire(LockKey::Pos(dataset), dataset.table_name())?;
        info!(dataset = %dataset, "Starting POS ingestion");

        let mut tally = SyncTally::start(dataset.table_name(), "pull");
        let repo = self.db.pos();

        if dataset.is_full_reload() {
            match repo.clear_old_data(dataset).await {
                Ok(removed) => info!(dataset = %dataset, removed, "Cleared dataset before reload"),
                Err(e) => {
                    warn!(dataset = %dataset, error = %e, "Clearing dataset failed");
                    tally.note(format!("clear_old_data: {}", e));
                    let result = tally.finish();
                    self.record_history(&result).await;
                    return Ok(result);
                }
            }
        }

        let result = match dataset {
            PosDataset::InventoryLevels => {
                self.ingestor.run(tally, self.inventory.as_ref(), &repo).await
            }
            PosDataset::Receipts => self.ingestor.run(tally, self.receipts.as_ref(), &repo).await,
        };

        self.record_history(&result).await;
        Ok(result)
    }

    async fn record_history(&self, result: &SyncResult) {
        if let Err(e) = self.db.history().record(result).await {
            warn!(table = %result.table_name, error = %e, "Failed to record ingestion history");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SyncError;
    use async_trait::async_trait;
    use chrono::Utc;
    use meridian_core::{Money, Page};
    use meridian_db::DbConfig;

    struct StaticPages<T> {
        pages: Vec<Page<T>>,
    }

    #[async_trait]
    impl<T: Clone + Send + Sync> PageSource<T> for StaticPages<T> {
        async fn fetch_page(&self, cursor: Option<&str>, _limit: usize) -> EngineResult<Page<T>> {
            let index = match cursor {
                None => 0,
                Some(c) => c
                    .parse::<usize>()
                    .map_err(|_| SyncError::Pagination(format!("bad cursor {}", c)))?,
            };
            self.pages
                .get(index)
                .cloned()
                .ok_or_else(|| SyncError::Pagination("past last page".into()))
        }
    }

    fn level(variant: &str, stock: f64) -> InventoryLevel {
        InventoryLevel {
            variant_id: variant.into(),
            store_id: "store-1".into(),
            in_stock: stock,
            updated_at: None,
        }
    }

    fn receipt(number: &str) -> Receipt {
        Receipt {
            receipt_number: number.into(),
            receipt_type: "SALE".into(),
            receipt_date: Utc::now(),
            store_id: Some("store-1".into()),
            total_money: Money::from_cents(500),
            total_tax: Money::zero(),
            total_discount: Money::zero(),
            cancelled_at: None,
            line_items: Vec::new(),
        }
    }

    fn ingestion(
        db: &Database,
        levels: Vec<Page<InventoryLevel>>,
        receipts: Vec<Page<Receipt>>,
    ) -> PosIngestion {
        PosIngestion::new(
            db.clone(),
            Arc::new(StaticPages { pages: levels }),
            Arc::new(StaticPages { pages: receipts }),
        )
    }

    #[tokio::test]
    async fn test_inventory_is_full_reload() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.pos().upsert_inventory_levels(&[level("stale", 1.0)]).await.unwrap();

        let jobs = ingestion(
            &db,
            vec![
                Page::new(vec![level("v1", 3.0), level("v2", 0.0)], Some("1".into())),
                Page::new(vec![level("v3", 7.0)], None),
            ],
            Vec::new(),
        );

        let result = jobs.run(PosDataset::InventoryLevels).await.unwrap();

        assert_eq!(result.records_synced, 3);
        assert!(result.is_success());
        assert_eq!(db.pos().count(PosDataset::InventoryLevels).await.unwrap(), 3);

        let history = db.history().last_for_table("inventory_levels").await.unwrap();
        assert_eq!(history.unwrap().run_id, result.run_id);
    }

    #[tokio::test]
    async fn test_receipts_accumulate() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.pos().upsert_receipts(&[receipt("R-0")]).await.unwrap();

        let jobs = ingestion(
            &db,
            Vec::new(),
            vec![Page::new(vec![receipt("R-0"), receipt("R-1")], Some(String::new()))],
        );

        let result = jobs.run(PosDataset::Receipts).await.unwrap();

        assert_eq!(result.records_synced, 2);
        assert_eq!(db.pos().count(PosDataset::Receipts).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_concurrent_run_of_same_dataset_is_rejected() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let jobs = ingestion(&db, Vec::new(), Vec::new());

        let _held = jobs
            .locks
            .try_acquire(LockKey::Pos(PosDataset::Receipts), "receipts")
            .unwrap();

        assert!(matches!(
            jobs.run(PosDataset::Receipts).await,
            Err(SyncError::AlreadyRunning(_))
        ));
    }
}
