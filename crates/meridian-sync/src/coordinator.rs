//! # Sync Coordinator
//!
//! Runs one sync of one configured table and reports what happened.
//!
//! ## Run Anatomy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  sync_table(id)                                                         │
//! │    │                                                                    │
//! │    ├── load TableConfig            (missing → TableNotFound)            │
//! │    ├── claim table lock            (held → AlreadyRunning)              │
//! │    ├── parse direction + mapping   (bad → config error, no remote call) │
//! │    │                                                                    │
//! │    ├── PULL  list remote ─► to_local_fields ─► upsert in batches        │
//! │    │         failed batch: its records count as errors, pull ends       │
//! │    │                                                                    │
//! │    ├── PUSH  local rows ─► to_remote_fields ─► create | update          │
//! │    │         each failure: one error + message naming the record        │
//! │    │                                                                    │
//! │    ├── record SyncResult in sync_history                                │
//! │    └── advance last_sync_time                                           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! `both` runs pull then push; neither phase's failures reduce the other's
//! count. Nothing holds a database connection across a remote call.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::SyncSettings;
use crate::error::{EngineResult, SyncError};
use crate::locks::{LockKey, TableLocks};
use crate::remote::RemoteRecordClient;
use crate::retry::{RemoteOp, RetryPolicy};
use meridian_core::{
    FieldMapping, RemoteRecord, SyncResult, SyncTally, TableConfig, DEFAULT_BATCH_SIZE,
    MAX_PUSH_ROWS,
};
use meridian_db::Database;

/// How a phase ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PhaseOutcome {
    Completed,
    /// The source side could not be read at all.
    FetchFailed,
    DeadlineHit,
}

/// Per-table view served by the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct TableStatus {
    pub id: i64,
    pub name: String,
    pub sync_direction: String,
    pub active: bool,
    pub sync_interval: i64,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub running: bool,
    pub last_result: Option<SyncResult>,
}

/// Executes table syncs against the collaboration API.
#[derive(Clone)]
pub struct SyncCoordinator {
    db: Database,
    client: Arc<dyn RemoteRecordClient>,
    base_id: String,
    retry: RetryPolicy,
    run_deadline: Option<Duration>,
    advance_on_fetch_failure: bool,
    batch_size: usize,
    push_limit: usize,
    locks: TableLocks,
}

impl SyncCoordinator {
    pub fn new(db: Database, client: Arc<dyn RemoteRecordClient>, base_id: impl Into<String>) -> Self {
        SyncCoordinator {
            db,
            client,
            base_id: base_id.into(),
            retry: RetryPolicy::single_attempt(),
            run_deadline: None,
            advance_on_fetch_failure: true,
            batch_size: DEFAULT_BATCH_SIZE,
            push_limit: MAX_PUSH_ROWS,
            locks: TableLocks::new(),
        }
    }

    /// Applies retry, deadline and advance policy from `[sync]`.
    pub fn with_settings(mut self, settings: &SyncSettings) -> Self {
        self.retry = settings.retry_policy();
        self.run_deadline = settings.run_deadline();
        self.advance_on_fetch_failure = settings.advance_on_fetch_failure;
        self
    }

    /// Overall time limit for one run; `None` disables it.
    pub fn run_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.run_deadline = deadline;
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = size.max(1);
        self
    }

    pub fn locks(&self) -> &TableLocks {
        &self.locks
    }

    // =========================================================================
    // Triggers
    // =========================================================================

    /// Syncs one table by id.
    ///
    /// Configuration problems are returned as errors; everything that goes
    /// wrong after the first remote call is reported inside the result.
    pub async fn sync_table(&self, id: i64) -> EngineResult<SyncResult> {
        let config = self
            .db
            .table_configs()
            .get(id)
            .await?
            .ok_or(SyncError::TableNotFound(id))?;

        self.run(&config).await
    }

    /// Syncs every active table, one after another.
    ///
    /// A table that cannot run still gets a result describing why.
    pub async fn sync_all(&self) -> EngineResult<Vec<SyncResult>> {
        let configs = self.db.table_configs().list_active().await?;
        info!(tables = configs.len(), "Syncing all active tables");

        let mut results = Vec::with_capacity(configs.len());
        for config in &configs {
            let result = match self.run(config).await {
                Ok(result) => result,
                Err(e) => {
                    warn!(table = %config.name, error = %e, "Table sync could not start");
                    let failed = SyncResult::failed(&config.name, &config.sync_direction, e.to_string());
                    self.record_history(&failed).await;
                    failed
                }
            };
            results.push(result);
        }

        Ok(results)
    }

    /// Status for every configured table.
    pub async fn status(&self) -> EngineResult<Vec<TableStatus>> {
        let configs = self.db.table_configs().list().await?;
        let history = self.db.history();

        let mut statuses = Vec::with_capacity(configs.len());
        for config in configs {
            let last_result = history.last_for_table(&config.name).await?;
            statuses.push(TableStatus {
                id: config.id,
                running: self.locks.is_running(LockKey::Table(config.id)),
                name: config.name,
                sync_direction: config.sync_direction,
                active: config.active,
                sync_interval: config.sync_interval_minutes,
                last_sync_time: config.last_sync_time,
                last_result,
            });
        }
        Ok(statuses)
    }

    // =========================================================================
    // Run
    // =========================================================================

    async fn run(&self, config: &TableConfig) -> EngineResult<SyncResult> {
        let _guard = self
            .locks
            .try_acquire(LockKey::Table(config.id), &config.name)?;

        let direction = config.direction()?;
        let mapping = config.mapping()?;
        let deadline = self.run_deadline.map(|d| Instant::now() + d);

        info!(table = %config.name, direction = %direction, "Starting table sync");
        let mut tally = SyncTally::start(&config.name, direction.as_str());
        let mut outcomes = Vec::with_capacity(2);

        if direction.includes_pull() {
            outcomes.push(self.pull(config, &mapping, &mut tally, deadline).await);
        }

        if direction.includes_push() && !outcomes.contains(&PhaseOutcome::DeadlineHit) {
            outcomes.push(self.push(config, &mapping, &mut tally, deadline).await);
        }

        let result = tally.finish();
        self.record_history(&result).await;

        let total_fetch_failure = outcomes.iter().all(|o| *o == PhaseOutcome::FetchFailed);
        if total_fetch_failure && !self.advance_on_fetch_failure {
            warn!(table = %config.name, "Source unreadable; last_sync_time left unchanged");
        } else if let Err(e) = self
            .db
            .table_configs()
            .touch_last_sync(config.id, result.end_time)
            .await
        {
            warn!(table = %config.name, error = %e, "Failed to advance last_sync_time");
        }

        info!(
            table = %config.name,
            direction = %direction,
            fetched = result.records_fetched,
            synced = result.records_synced,
            errors = result.records_error,
            duration_ms = result.duration_ms(),
            "Table sync finished"
        );

        Ok(result)
    }

    async fn pull(
        &self,
        config: &TableConfig,
        mapping: &FieldMapping,
        tally: &mut SyncTally,
        deadline: Option<Instant>,
    ) -> PhaseOutcome {
        let records = match self
            .client
            .list_records(&self.base_id, &config.remote_table_id)
            .await
        {
            Ok(records) => records,
            Err(e) => {
                warn!(table = %config.name, error = %e, "Listing remote records failed");
                tally.note(format!("pull: failed to list remote records: {}", e));
                return PhaseOutcome::FetchFailed;
            }
        };
        tally.fetched(records.len());

        let local: Vec<RemoteRecord> = records
            .into_iter()
            .map(|record| RemoteRecord {
                fields: mapping.to_local_fields(&record.fields),
                ..record
            })
            .collect();

        let repo = self.db.records();
        for (index, batch) in local.chunks(self.batch_size).enumerate() {
            if self.deadline_passed(deadline, tally) {
                return PhaseOutcome::DeadlineHit;
            }

            match repo.upsert_batch(&config.name, batch).await {
                Ok(stats) => {
                    debug!(
                        table = %config.name,
                        batch = index + 1,
                        inserted = stats.inserted,
                        updated = stats.updated,
                        "Pull batch committed"
                    );
                    tally.synced(stats.total());
                }
                Err(e) => {
                    warn!(table = %config.name, batch = index + 1, error = %e, "Pull batch rolled back");
                    tally.failed(
                        batch.len(),
                        format!(
                            "pull: batch {} ({} records) rolled back: {}",
                            index + 1,
                            batch.len(),
                            e
                        ),
                    );
                    break;
                }
            }
        }

        PhaseOutcome::Completed
    }

    async fn push(
        &self,
        config: &TableConfig,
        mapping: &FieldMapping,
        tally: &mut SyncTally,
        deadline: Option<Instant>,
    ) -> PhaseOutcome {
        let repo = self.db.records();
        let rows = match repo.list_local_rows(config, self.push_limit).await {
            Ok(rows) => rows,
            Err(e) => {
                warn!(table = %config.name, error = %e, "Reading local rows failed");
                tally.note(format!("push: failed to read local rows: {}", e));
                return PhaseOutcome::FetchFailed;
            }
        };
        tally.fetched(rows.len());

        for (position, row) in rows.iter().enumerate() {
            if self.deadline_passed(deadline, tally) {
                return PhaseOutcome::DeadlineHit;
            }

            let op = RemoteOp::for_row(row.remote_id.as_deref(), mapping.to_remote_fields(&row.fields));
            let outcome = op
                .execute_with(&self.retry, self.client.as_ref(), &self.base_id, &config.remote_table_id)
                .await;

            match outcome {
                Ok(remote) => {
                    tally.synced(1);
                    // Source-query rows have no local id to link.
                    let created_id = remote.remote_id.as_deref().filter(|_| op.is_create());
                    if let (Some(local_id), Some(remote_id)) = (row.local_row_id, created_id) {
                        if let Err(e) = repo.link_remote_id(local_id, remote_id).await {
                            tally.note(format!(
                                "push: {} created as {} but not linked locally: {}",
                                row.label(position),
                                remote_id,
                                e
                            ));
                        }
                    }
                }
                Err(e) => {
                    debug!(table = %config.name, row = %row.label(position), error = %e, "Push failed");
                    tally.failed(1, format!("push: {}: {}", row.label(position), e));
                }
            }
        }

        PhaseOutcome::Completed
    }

    fn deadline_passed(&self, deadline: Option<Instant>, tally: &mut SyncTally) -> bool {
        match (deadline, self.run_deadline) {
            (Some(at), Some(limit)) if Instant::now() >= at => {
                let err = SyncError::DeadlineExceeded(limit.as_secs());
                warn!(run_id = %tally.run_id(), "{}", err);
                tally.note(err.to_string());
                true
            }
            _ => false,
        }
    }

    async fn record_history(&self, result: &SyncResult) {
        if let Err(e) = self.db.history().record(result).await {
            warn!(table = %result.table_name, error = %e, "Failed to record sync history");
        }
    }
}

impl std::fmt::Debug for SyncCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCoordinator")
            .field("base_id", &self.base_id)
            .field("retry", &self.retry)
            .field("run_deadline", &self.run_deadline)
            .field("batch_size", &self.batch_size)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{table_input, FakeRemote};
    use meridian_core::{FieldMap, TableConfigInput};
    use meridian_db::DbConfig;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    // =========================================================================
    // Helpers
    // =========================================================================

    async fn setup(direction: &str) -> (Database, TableConfig) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let config = db
            .table_configs()
            .create(&table_input("orders", direction, 0))
            .await
            .unwrap();
        (db, config)
    }

    fn coordinator(db: &Database, remote: FakeRemote) -> (SyncCoordinator, Arc<FakeRemote>) {
        let remote = Arc::new(remote);
        let client: Arc<dyn RemoteRecordClient> = remote.clone();
        (SyncCoordinator::new(db.clone(), client, "appTest"), remote)
    }

    async fn seed_local(db: &Database, ids: &[&str]) {
        let records: Vec<RemoteRecord> = ids
            .iter()
            .map(|id| {
                let mut fields = FieldMap::new();
                fields.insert("name".into(), json!(format!("Order {}", id)));
                fields.insert("total".into(), json!(5));
                fields.insert("internal".into(), json!(true));
                RemoteRecord::new(format!("rec{}", id), fields)
            })
            .collect();
        db.records().upsert_batch("orders", &records).await.unwrap();
    }

    // =========================================================================
    // Pull
    // =========================================================================

    #[tokio::test]
    async fn test_pull_into_empty_table() {
        let (db, config) = setup("pull").await;
        let (coordinator, _) = coordinator(&db, FakeRemote::with_records(&["A", "B", "C"]));

        let result = coordinator.sync_table(config.id).await.unwrap();

        assert_eq!(result.records_synced, 3);
        assert_eq!(result.records_error, 0);
        assert_eq!(result.records_fetched, 3);
        assert_eq!(db.records().count("orders").await.unwrap(), 3);

        let stored = db.records().list("orders", 10).await.unwrap();
        assert_eq!(stored[0].fields["name"], json!("Order A"));
        assert_eq!(stored[0].fields["Notes"], json!("unmapped"));
        assert!(stored[0].fields.get("Name").is_none());
    }

    #[tokio::test]
    async fn test_pull_is_idempotent() {
        let (db, config) = setup("pull").await;
        let (coordinator, _) = coordinator(&db, FakeRemote::with_records(&["A", "B", "C"]));

        coordinator.sync_table(config.id).await.unwrap();
        let first = db.records().list("orders", 10).await.unwrap();

        let second_run = coordinator.sync_table(config.id).await.unwrap();
        let second = db.records().list("orders", 10).await.unwrap();

        assert_eq!(second_run.records_error, 0);
        assert_eq!(first, second);
    }

    #[tokio::test]
    async fn test_failed_batch_counts_errors_and_keeps_earlier_batches() {
        let (db, config) = setup("pull").await;
        sqlx::query(
            r#"
            CREATE TRIGGER reject_d BEFORE INSERT ON synced_records
            WHEN NEW.remote_id = 'recD'
            BEGIN SELECT RAISE(ABORT, 'rejected'); END
            "#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        let (coordinator, _) = coordinator(&db, FakeRemote::with_records(&["A", "B", "C", "D", "E"]));
        let coordinator = coordinator.batch_size(2);

        let result = coordinator.sync_table(config.id).await.unwrap();

        // Batch 1 (A, B) commits; batch 2 (C, D) rolls back and ends the pull.
        assert_eq!(result.records_synced, 2);
        assert_eq!(result.records_error, 2);
        assert_eq!(result.error_messages.len(), 1);
        assert!(result.error_messages[0].contains("batch 2"));
        assert_eq!(db.records().count("orders").await.unwrap(), 2);
        assert!(result.records_synced + result.records_error <= result.records_fetched);
    }

    // =========================================================================
    // Push
    // =========================================================================

    #[tokio::test]
    async fn test_push_with_one_remote_failure() {
        let (db, config) = setup("push").await;
        seed_local(&db, &["A", "B", "C"]).await;

        let mut remote = FakeRemote::default();
        remote.failing_ids.insert("recB".into());
        let (coordinator, remote) = coordinator(&db, remote);

        let result = coordinator.sync_table(config.id).await.unwrap();

        assert_eq!(result.records_synced, 2);
        assert_eq!(result.records_error, 1);
        assert_eq!(result.error_messages.len(), 1);
        assert!(result.error_messages[0].contains("recB"));

        // Only mapped fields go out, under remote names.
        let updated = remote.updated.lock().unwrap();
        assert_eq!(updated[0].1.len(), 2);
        assert_eq!(updated[0].1["Name"], json!("Order A"));
        assert!(updated[0].1.get("internal").is_none());
    }

    #[tokio::test]
    async fn test_push_create_links_remote_id() {
        let (db, config) = setup("push").await;
        let mut fields = FieldMap::new();
        fields.insert("name".into(), json!("Fresh"));
        db.records().insert_local("orders", &fields).await.unwrap();

        let (coordinator, remote) = coordinator(&db, FakeRemote::default());

        let first = coordinator.sync_table(config.id).await.unwrap();
        assert_eq!(first.records_synced, 1);
        assert_eq!(remote.created.lock().unwrap().len(), 1);

        // Second push updates the now-linked record instead of creating again.
        coordinator.sync_table(config.id).await.unwrap();
        assert_eq!(remote.created.lock().unwrap().len(), 1);
        assert_eq!(remote.updated.lock().unwrap()[0].0, "recNew1");
    }

    #[tokio::test]
    async fn test_push_from_source_query() {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        let config = db
            .table_configs()
            .create(&TableConfigInput {
                create_sql: Some("CREATE TABLE staged (remote_id TEXT, name TEXT)".into()),
                source_sql: Some("SELECT remote_id, name FROM staged ORDER BY name".into()),
                ..table_input("staged", "push", 0)
            })
            .await
            .unwrap();
        sqlx::query("INSERT INTO staged VALUES ('recA', 'Alpha'), (NULL, 'Beta')")
            .execute(db.pool())
            .await
            .unwrap();
        let (coordinator, remote) = coordinator(&db, FakeRemote::default());

        let result = coordinator.sync_table(config.id).await.unwrap();

        assert_eq!(result.records_synced, 2);
        assert!(result.error_messages.is_empty());
        assert_eq!(remote.updated.lock().unwrap()[0].0, "recA");
        assert_eq!(remote.created.lock().unwrap()[0]["Name"], json!("Beta"));

        // Nothing is linked back into the store for source rows.
        assert_eq!(db.records().count("staged").await.unwrap(), 0);
    }

    // =========================================================================
    // Both, config errors, locks, last_sync_time
    // =========================================================================

    #[tokio::test]
    async fn test_both_sums_phases_independently() {
        let (db, config) = setup("both").await;
        let mut remote = FakeRemote::with_records(&["A", "B"]);
        remote.failing_ids.insert("recB".into());
        let (coordinator, _) = coordinator(&db, remote);

        let result = coordinator.sync_table(config.id).await.unwrap();

        // Pull stores A and B; push then updates A and fails on B.
        assert_eq!(result.records_fetched, 4);
        assert_eq!(result.records_synced, 3);
        assert_eq!(result.records_error, 1);
        assert_eq!(result.direction, "both");
    }

    #[tokio::test]
    async fn test_unknown_direction_fails_before_remote_call() {
        let (db, config) = setup("pull").await;
        sqlx::query("UPDATE table_configs SET sync_direction = 'sideways' WHERE id = ?1")
            .bind(config.id)
            .execute(db.pool())
            .await
            .unwrap();
        let (coordinator, remote) = coordinator(&db, FakeRemote::with_records(&["A"]));

        let err = coordinator.sync_table(config.id).await.unwrap_err();
        assert!(err.is_config_error());
        assert_eq!(remote.list_calls.load(Ordering::SeqCst), 0);

        let results = coordinator.sync_all().await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].direction, "sideways");
        assert!(results[0].error_messages[0].contains("sideways"));
        assert_eq!(remote.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_table() {
        let (db, _) = setup("pull").await;
        let (coordinator, _) = coordinator(&db, FakeRemote::default());

        assert!(matches!(
            coordinator.sync_table(999).await,
            Err(SyncError::TableNotFound(999))
        ));
    }

    #[tokio::test]
    async fn test_table_already_running_is_rejected() {
        let (db, config) = setup("pull").await;
        let (coordinator, _) = coordinator(&db, FakeRemote::with_records(&["A"]));

        let _held = coordinator
            .locks()
            .try_acquire(LockKey::Table(config.id), "orders")
            .unwrap();

        assert!(matches!(
            coordinator.sync_table(config.id).await,
            Err(SyncError::AlreadyRunning(_))
        ));
    }

    #[tokio::test]
    async fn test_sync_all_skips_inactive_and_records_history() {
        let (db, _) = setup("pull").await;
        db.table_configs()
            .create(&TableConfigInput {
                active: false,
                ..table_input("archive", "pull", 0)
            })
            .await
            .unwrap();
        let (coordinator, _) = coordinator(&db, FakeRemote::with_records(&["A"]));

        let results = coordinator.sync_all().await.unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].table_name, "orders");
        let history = db.history().recent(None, 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].run_id, results[0].run_id);
    }

    #[tokio::test]
    async fn test_last_sync_time_advance_policy() {
        let (db, config) = setup("pull").await;
        let remote = FakeRemote {
            fail_list: true,
            ..Default::default()
        };
        let remote = Arc::new(remote);
        let client: Arc<dyn RemoteRecordClient> = remote.clone();

        let strict = SyncCoordinator::new(db.clone(), client.clone(), "appTest").with_settings(
            &SyncSettings {
                advance_on_fetch_failure: false,
                ..Default::default()
            },
        );
        let result = strict.sync_table(config.id).await.unwrap();
        assert_eq!(result.records_fetched, 0);
        assert_eq!(result.error_messages.len(), 1);
        let stored = db.table_configs().get(config.id).await.unwrap().unwrap();
        assert!(stored.last_sync_time.is_none());

        let lenient = SyncCoordinator::new(db.clone(), client, "appTest");
        lenient.sync_table(config.id).await.unwrap();
        let stored = db.table_configs().get(config.id).await.unwrap().unwrap();
        assert!(stored.last_sync_time.is_some());
    }

    #[tokio::test]
    async fn test_status_reports_last_result() {
        let (db, config) = setup("pull").await;
        let (coordinator, _) = coordinator(&db, FakeRemote::with_records(&["A"]));
        coordinator.sync_table(config.id).await.unwrap();

        let status = coordinator.status().await.unwrap();

        assert_eq!(status.len(), 1);
        assert!(!status[0].running);
        assert_eq!(status[0].last_result.as_ref().unwrap().records_synced, 1);
        assert!(status[0].last_sync_time.is_some());
    }

    #[tokio::test]
    async fn test_rename_while_running_keeps_the_lock() {
        let (db, config) = setup("pull").await;
        let (coordinator, remote) = coordinator(&db, FakeRemote::with_records(&["A", "B", "C"]));
        coordinator.sync_table(config.id).await.unwrap();

        let held = coordinator
            .locks()
            .try_acquire(LockKey::Table(config.id), "orders")
            .unwrap();
        db.table_configs()
            .update(config.id, &table_input("orders_v2", "pull", 0))
            .await
            .unwrap();

        assert!(matches!(
            coordinator.sync_table(config.id).await,
            Err(SyncError::AlreadyRunning(name)) if name == "orders"
        ));
        assert_eq!(remote.list_calls.load(Ordering::SeqCst), 1);

        drop(held);
        let result = coordinator.sync_table(config.id).await.unwrap();

        // Records followed the rename, so the pull updates in place.
        assert_eq!(result.table_name, "orders_v2");
        assert_eq!(result.records_synced, 3);
        assert_eq!(db.records().count("orders").await.unwrap(), 0);
        assert_eq!(db.records().count("orders_v2").await.unwrap(), 3);
    }

    // =========================================================================
    // Deadline
    // =========================================================================

    #[tokio::test]
    async fn test_deadline_stops_pull_and_skips_push() {
        let (db, config) = setup("both").await;
        let remote = FakeRemote {
            list_delay: Some(Duration::from_millis(300)),
            ..FakeRemote::with_records(&["A", "B"])
        };
        let (coordinator, remote) = coordinator(&db, remote);
        let coordinator = coordinator.run_deadline(Some(Duration::from_millis(50)));

        let result = coordinator.sync_table(config.id).await.unwrap();

        assert_eq!(result.records_fetched, 2);
        assert_eq!(result.records_synced, 0);
        assert_eq!(result.records_error, 0);
        assert_eq!(result.error_messages.len(), 1);
        assert!(result.error_messages[0].contains("deadline"));
        assert_eq!(db.records().count("orders").await.unwrap(), 0);

        // Push never started.
        assert!(remote.created.lock().unwrap().is_empty());
        assert!(remote.updated.lock().unwrap().is_empty());

        // The partial result is still recorded and the table still advances.
        let history = db.history().recent(Some("orders"), 10).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].run_id, result.run_id);
        assert!(history[0].error_messages[0].contains("deadline"));
        let stored = db.table_configs().get(config.id).await.unwrap().unwrap();
        assert!(stored.last_sync_time.is_some());
    }
}
