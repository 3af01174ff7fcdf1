//! # Paginated Batch Ingestor
//!
//! Drains a cursor-paginated [`PageSource`] into a [`BatchSink`], one page per
//! write batch.
//!
//! ## Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  cursor = None                                                          │
//! │  loop {                                                                 │
//! │      deadline passed?            ──► note, stop (partial result)       │
//! │      page = fetch(cursor, limit) ──► error/timeout: note, stop         │
//! │      sink.write_batch(page)      ──► error: page counted as errors,    │
//! │                                      stop (earlier pages stay)         │
//! │      cursor = page.cursor        ──► empty: done                        │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{EngineResult, SyncError};
use crate::pos_client::PageSource;
use meridian_core::{InventoryLevel, Receipt, SyncResult, SyncTally, DEFAULT_BATCH_SIZE};
use meridian_db::PosRepository;

// =============================================================================
// Batch Sink
// =============================================================================

/// Destination for one page of items, written as a single transaction.
#[async_trait]
pub trait BatchSink<T>: Send + Sync {
    /// Writes the batch and returns how many items were stored.
    async fn write_batch(&self, items: &[T]) -> EngineResult<usize>;
}

#[async_trait]
impl BatchSink<InventoryLevel> for PosRepository {
    async fn write_batch(&self, items: &[InventoryLevel]) -> EngineResult<usize> {
        Ok(self.upsert_inventory_levels(items).await?.total())
    }
}

#[async_trait]
impl BatchSink<Receipt> for PosRepository {
    async fn write_batch(&self, items: &[Receipt]) -> EngineResult<usize> {
        Ok(self.upsert_receipts(items).await?.total())
    }
}

// =============================================================================
// Ingestor
// =============================================================================

/// Cursor loop with per-page timeout and an optional overall deadline.
#[derive(Debug, Clone)]
pub struct PaginatedIngestor {
    page_size: usize,
    page_timeout: Duration,
    deadline: Option<Duration>,
}

impl Default for PaginatedIngestor {
    fn default() -> Self {
        PaginatedIngestor {
            page_size: DEFAULT_BATCH_SIZE,
            page_timeout: Duration::from_secs(60),
            deadline: None,
        }
    }
}

impl PaginatedIngestor {
    pub fn new(page_size: usize) -> Self {
        PaginatedIngestor {
            page_size: page_size.max(1),
            ..Default::default()
        }
    }

    pub fn page_timeout(mut self, timeout: Duration) -> Self {
        self.page_timeout = timeout;
        self
    }

    pub fn deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }

    /// Runs the loop to completion, deadline, or first failure.
    ///
    /// Never returns an error: failures end up as messages in the result, and
    /// every page written before the failure stays written.
    pub async fn run<T, S, K>(&self, mut tally: SyncTally, source: &S, sink: &K) -> SyncResult
    where
        T: Send + Sync,
        S: PageSource<T> + ?Sized,
        K: BatchSink<T> + ?Sized,
    {
        let started = Instant::now();
        let mut cursor: Option<String> = None;
        let mut pages = 0usize;

        loop {
            if let Some(deadline) = self.deadline {
                if started.elapsed() >= deadline {
                    let err = SyncError::DeadlineExceeded(deadline.as_secs());
                    warn!(pages, "{}", err);
                    tally.note(format!("{}; stopped after {} pages", err, pages));
                    break;
                }
            }

            let fetch = source.fetch_page(cursor.as_deref(), self.page_size);
            let page = match tokio::time::timeout(self.page_timeout, fetch).await {
                Ok(Ok(page)) => page,
                Ok(Err(e)) => {
                    warn!(page = pages + 1, error = %e, "Page fetch failed, aborting ingestion");
                    tally.note(format!("page {}: {}", pages + 1, e));
                    break;
                }
                Err(_) => {
                    let err = SyncError::Timeout(self.page_timeout.as_secs());
                    warn!(page = pages + 1, "Page fetch timed out, aborting ingestion");
                    tally.note(format!("page {}: {}", pages + 1, err));
                    break;
                }
            };

            pages += 1;
            tally.fetched(page.items.len());

            if !page.items.is_empty() {
                match sink.write_batch(&page.items).await {
                    Ok(written) => {
                        debug!(page = pages, written, "Batch committed");
                        tally.synced(written);
                    }
                    Err(e) => {
                        warn!(page = pages, error = %e, "Batch write failed, aborting ingestion");
                        tally.failed(page.items.len(), format!("page {}: {}", pages, e));
                        break;
                    }
                }
            }

            match page.next_cursor() {
                Some(next) if cursor.as_deref() == Some(next) => {
                    let err = SyncError::Pagination(format!("cursor '{}' did not advance", next));
                    tally.note(format!("page {}: {}", pages, err));
                    break;
                }
                Some(next) => cursor = Some(next.to_string()),
                None => break,
            }
        }

        let result = tally.finish();
        info!(
            table = %result.table_name,
            pages,
            fetched = result.records_fetched,
            synced = result.records_synced,
            errors = result.records_error,
            "Ingestion finished"
        );
        result
    }
}
