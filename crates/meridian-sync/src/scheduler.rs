//! # Scheduler
//!
//! Recurring triggers for table syncs and the two daily POS jobs.
//!
//! ## Job Registry + Event Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Scheduler Task                                 │
//! │                                                                         │
//! │   JobRegistry (BTreeMap<JobKey, Job>)                                   │
//! │   ┌──────────────────┬───────────────────────────┬──────────────────┐   │
//! │   │ Table(3)         │ TableSync(orders)         │ every 15 min     │   │
//! │   │ PosInventory     │ PosIngest(inventory)      │ daily 02:00 UTC  │   │
//! │   │ PosReceipts      │ PosIngest(receipts)       │ daily 03:00 UTC  │   │
//! │   └──────────────────┴───────────────────────────┴──────────────────┘   │
//! │                                                                         │
//! │   loop {                                                                │
//! │       no batch in flight? spawn one running every due job in order      │
//! │       select! {                                                         │
//! │           batch finished ─► reschedule the jobs it ran                  │
//! │           sleep(until earliest next fire, at most 60s)                  │
//! │           command: Reload ─► rebuild registry from scratch              │
//! │                    Stop   ─► abort the batch, leave loop                │
//! │       }                                                                 │
//! │   }                                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Commands are answered while a batch runs, so a reload never waits for a
//! sync to finish.
//!
//! ## States
//! `Stopped → Started → Reloading → Started`, and `stop` from anywhere returns
//! to `Stopped`. Stopping an already stopped scheduler is a no-op.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, NaiveTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot, RwLock};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn};

use crate::coordinator::SyncCoordinator;
use crate::error::{EngineResult, SyncError};
use crate::pos_jobs::PosIngestion;
use meridian_core::{PosDataset, PosSchedule, TableConfig};
use meridian_db::Database;

/// Longest the loop sleeps without re-checking the clock.
const MAX_IDLE: StdDuration = StdDuration::from_secs(60);

// =============================================================================
// Jobs
// =============================================================================

/// Identity of a scheduled job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JobKey {
    Table(i64),
    PosInventory,
    PosReceipts,
}

impl JobKey {
    pub fn for_dataset(dataset: PosDataset) -> Self {
        match dataset {
            PosDataset::InventoryLevels => JobKey::PosInventory,
            PosDataset::Receipts => JobKey::PosReceipts,
        }
    }
}

/// What a job does when it fires.
#[derive(Debug, Clone, PartialEq)]
pub enum JobKind {
    /// Snapshot of the config at registration; the run re-reads it by id.
    TableSync(TableConfig),
    PosIngest(PosDataset),
}

/// When a job fires again after running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Recurrence {
    Every(Duration),
    DailyAt(NaiveTime),
}

impl Recurrence {
    pub fn next_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Recurrence::Every(interval) => now + *interval,
            Recurrence::DailyAt(at) => next_daily_fire(now, *at),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub kind: JobKind,
    pub recurrence: Recurrence,
    pub next_fire: DateTime<Utc>,
}

/// The next time `at` (UTC) occurs strictly after `now`.
pub fn next_daily_fire(now: DateTime<Utc>, at: NaiveTime) -> DateTime<Utc> {
    let today = now.date_naive().and_time(at).and_utc();
    if today > now {
        today
    } else {
        today + Duration::days(1)
    }
}

// =============================================================================
// Job Registry
// =============================================================================

/// Every scheduled job keyed by [`JobKey`].
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: BTreeMap<JobKey, Job>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `config` if it is active with a non-zero interval.
    ///
    /// An overdue table fires on the first loop iteration.
    pub fn register_table(&mut self, config: TableConfig, now: DateTime<Utc>) -> bool {
        if !config.is_scheduled() {
            return false;
        }
        let interval = Duration::minutes(config.sync_interval_minutes);
        let next_fire = config
            .last_sync_time
            .map(|last| last + interval)
            .filter(|at| *at > now)
            .unwrap_or(now);

        self.jobs.insert(
            JobKey::Table(config.id),
            Job {
                kind: JobKind::TableSync(config),
                recurrence: Recurrence::Every(interval),
                next_fire,
            },
        );
        true
    }

    pub fn register_pos(&mut self, dataset: PosDataset, at: NaiveTime, now: DateTime<Utc>) {
        self.jobs.insert(
            JobKey::for_dataset(dataset),
            Job {
                kind: JobKind::PosIngest(dataset),
                recurrence: Recurrence::DailyAt(at),
                next_fire: next_daily_fire(now, at),
            },
        );
    }

    pub fn get(&self, key: &JobKey) -> Option<&Job> {
        self.jobs.get(key)
    }

    pub fn len(&self) -> usize {
        self.jobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.jobs.is_empty()
    }

    /// Keys of jobs whose fire time has come, earliest first.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<JobKey> {
        let mut due: Vec<(DateTime<Utc>, JobKey)> = self
            .jobs
            .iter()
            .filter(|(_, job)| job.next_fire <= now)
            .map(|(key, job)| (job.next_fire, *key))
            .collect();
        due.sort();
        due.into_iter().map(|(_, key)| key).collect()
    }

    /// Moves a job's fire time past `now` according to its recurrence.
    pub fn reschedule(&mut self, key: &JobKey, now: DateTime<Utc>) {
        if let Some(job) = self.jobs.get_mut(key) {
            job.next_fire = job.recurrence.next_after(now);
        }
    }

    /// Earliest fire time across all jobs.
    pub fn next_wakeup(&self) -> Option<DateTime<Utc>> {
        self.jobs.values().map(|job| job.next_fire).min()
    }
}

// =============================================================================
// Scheduler State & Handle
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Started,
    Reloading,
}

enum Command {
    /// `None` when the caller does not wait for the job count.
    Reload(Option<oneshot::Sender<usize>>),
    Stop(oneshot::Sender<()>),
}

/// Handle for controlling a running scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    state: Arc<RwLock<SchedulerState>>,
}

impl SchedulerHandle {
    pub async fn state(&self) -> SchedulerState {
        *self.state.read().await
    }

    /// Rebuilds every job from the active tables and POS settings.
    ///
    /// Returns the number of registered jobs.
    pub async fn reload(&self) -> EngineResult<usize> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.commands
            .send(Command::Reload(Some(ack_tx)))
            .await
            .map_err(|_| SyncError::ShuttingDown)?;
        ack_rx
            .await
            .map_err(|_| SyncError::ChannelError("Reload acknowledgement dropped".into()))
    }

    /// Queues a reload without waiting for it.
    ///
    /// A full queue already holds a reload that will see the latest storage,
    /// so the request is dropped.
    pub fn request_reload(&self) -> EngineResult<()> {
        match self.commands.try_send(Command::Reload(None)) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                debug!("Scheduler queue full; pending reload covers this change");
                Ok(())
            }
            Err(TrySendError::Closed(_)) => Err(SyncError::ShuttingDown),
        }
    }

    /// Stops the loop, cancelling any job in progress. Safe to call repeatedly.
    pub async fn stop(&self) {
        let (ack_tx, ack_rx) = oneshot::channel();
        if self.commands.send(Command::Stop(ack_tx)).await.is_err() {
            debug!("Scheduler already stopped");
            return;
        }
        let _ = ack_rx.await;
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Owns the job registry and dispatches due jobs.
pub struct Scheduler {
    db: Database,
    dispatcher: Dispatcher,
    state: Arc<RwLock<SchedulerState>>,
}

/// Due jobs running in their own task.
struct Batch {
    keys: Vec<JobKey>,
    task: JoinHandle<()>,
}

/// Resolves once the in-flight batch ends; pending while there is none.
async fn batch_finished(batch: &mut Option<Batch>) -> Result<(), JoinError> {
    match batch {
        Some(batch) => (&mut batch.task).await,
        None => std::future::pending().await,
    }
}

impl Scheduler {
    /// `pos` is `None` when no POS credentials are configured; the daily POS
    /// jobs are then not registered.
    pub fn new(db: Database, coordinator: SyncCoordinator, pos: Option<PosIngestion>) -> Self {
        Scheduler {
            db,
            dispatcher: Dispatcher { coordinator, pos },
            state: Arc::new(RwLock::new(SchedulerState::Stopped)),
        }
    }

    /// Spawns the event loop and returns its handle.
    pub fn start(self) -> SchedulerHandle {
        let (tx, rx) = mpsc::channel(8);
        let handle = SchedulerHandle {
            commands: tx,
            state: Arc::clone(&self.state),
        };
        tokio::spawn(self.run(rx));
        handle
    }

    async fn run(self, mut commands: mpsc::Receiver<Command>) {
        let mut registry = self.load_registry().await;
        info!(jobs = registry.len(), "Scheduler started");
        let mut in_flight: Option<Batch> = None;

        loop {
            if in_flight.is_none() {
                in_flight = self.spawn_due(&registry);
            }

            // A running batch wakes the loop itself when it ends.
            let sleep_for = match in_flight {
                Some(_) => MAX_IDLE,
                None => registry
                    .next_wakeup()
                    .map(|at| (at - Utc::now()).to_std().unwrap_or(StdDuration::ZERO))
                    .unwrap_or(MAX_IDLE)
                    .min(MAX_IDLE),
            };

            tokio::select! {
                finished = batch_finished(&mut in_flight) => {
                    if let Err(e) = finished {
                        error!(error = %e, "Scheduled job task failed");
                    }
                    if let Some(batch) = in_flight.take() {
                        let now = Utc::now();
                        for key in &batch.keys {
                            registry.reschedule(key, now);
                        }
                    }
                }
                _ = tokio::time::sleep(sleep_for) => {}
                command = commands.recv() => match command {
                    Some(Command::Reload(ack)) => {
                        registry = self.load_registry().await;
                        info!(jobs = registry.len(), "Scheduler reloaded");
                        if let Some(ack) = ack {
                            let _ = ack.send(registry.len());
                        }
                    }
                    Some(Command::Stop(ack)) => {
                        abort(in_flight.take());
                        *self.state.write().await = SchedulerState::Stopped;
                        info!("Scheduler stopped");
                        let _ = ack.send(());
                        return;
                    }
                    None => break,
                },
            }
        }

        abort(in_flight.take());
        *self.state.write().await = SchedulerState::Stopped;
        info!("Scheduler stopped (all handles dropped)");
    }

    /// Starts a task running every due job in fire order, or `None` if
    /// nothing is due.
    fn spawn_due(&self, registry: &JobRegistry) -> Option<Batch> {
        let jobs: Vec<(JobKey, JobKind)> = registry
            .due(Utc::now())
            .into_iter()
            .filter_map(|key| registry.get(&key).map(|job| (key, job.kind.clone())))
            .collect();
        if jobs.is_empty() {
            return None;
        }

        let keys = jobs.iter().map(|(key, _)| *key).collect();
        let dispatcher = self.dispatcher.clone();
        let task = tokio::spawn(async move {
            for (_, kind) in &jobs {
                dispatcher.dispatch(kind).await;
            }
        });
        Some(Batch { keys, task })
    }

    /// Tears down every job and registers them again from storage.
    async fn load_registry(&self) -> JobRegistry {
        *self.state.write().await = SchedulerState::Reloading;
        let now = Utc::now();
        let mut registry = JobRegistry::new();

        match self.db.table_configs().list_active().await {
            Ok(tables) => {
                for config in tables {
                    let name = config.name.clone();
                    if registry.register_table(config, now) {
                        debug!(table = %name, "Registered table job");
                    }
                }
            }
            Err(e) => error!(error = %e, "Could not load table configs; no table jobs registered"),
        }

        if self.dispatcher.pos.is_some() {
            let schedule = self.db.settings().pos_schedule().await.unwrap_or_else(|e| {
                warn!(error = %e, "Could not load POS schedule; using defaults");
                PosSchedule::default()
            });

            for dataset in [PosDataset::InventoryLevels, PosDataset::Receipts] {
                match schedule.time_for(dataset) {
                    Ok(at) => registry.register_pos(dataset, at, now),
                    Err(e) => warn!(dataset = %dataset, error = %e, "Skipping POS job"),
                }
            }
        }

        *self.state.write().await = SchedulerState::Started;
        registry
    }
}

fn abort(batch: Option<Batch>) {
    if let Some(batch) = batch {
        batch.task.abort();
        debug!(jobs = batch.keys.len(), "Cancelled scheduled jobs in progress");
    }
}

/// Runs one job; cloned into each batch task.
#[derive(Clone)]
struct Dispatcher {
    coordinator: SyncCoordinator,
    pos: Option<PosIngestion>,
}

impl Dispatcher {
    async fn dispatch(&self, kind: &JobKind) {
        match kind {
            JobKind::TableSync(config) => match self.coordinator.sync_table(config.id).await {
                Ok(result) => info!(
                    table = %result.table_name,
                    synced = result.records_synced,
                    errors = result.records_error,
                    "Scheduled sync finished"
                ),
                Err(SyncError::AlreadyRunning(table)) => {
                    info!(table = %table, "Table already syncing; scheduled run skipped")
                }
                Err(e) => warn!(table = %config.name, error = %e, "Scheduled sync failed"),
            },
            JobKind::PosIngest(dataset) => {
                let Some(pos) = &self.pos else {
                    return;
                };
                match pos.run(*dataset).await {
                    Ok(result) => info!(
                        dataset = %dataset,
                        synced = result.records_synced,
                        errors = result.records_error,
                        "Scheduled POS ingestion finished"
                    ),
                    Err(SyncError::AlreadyRunning(_)) => {
                        info!(dataset = %dataset, "POS ingestion already running; skipped")
                    }
                    Err(e) => warn!(dataset = %dataset, error = %e, "Scheduled POS ingestion failed"),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::locks::LockKey;
    use crate::remote::RemoteRecordClient;
    use crate::testing::{table_input, FakeRemote};
    use chrono::TimeZone;
    use meridian_db::DbConfig;

    fn at(hour: u32, minute: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(hour, minute, 0).unwrap()
    }

    fn config(id: i64, interval: i64, last_sync: Option<DateTime<Utc>>) -> TableConfig {
        let now = Utc::now();
        TableConfig {
            id,
            name: format!("table_{}", id),
            remote_table_id: format!("tbl{}", id),
            description: String::new(),
            field_mapping: "{}".into(),
            local_create_statement: None,
            local_source_query: None,
            sync_interval_minutes: interval,
            sync_direction: "pull".into(),
            last_sync_time: last_sync,
            active: true,
            created_at: now,
            updated_at: now,
        }
    }

    // =========================================================================
    // Registry
    // =========================================================================

    #[test]
    fn test_next_daily_fire() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 1, 30, 0).unwrap();
        assert_eq!(
            next_daily_fire(now, at(2, 0)),
            Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).unwrap()
        );
        assert_eq!(
            next_daily_fire(now, at(1, 30)),
            Utc.with_ymd_and_hms(2024, 5, 2, 1, 30, 0).unwrap()
        );
        assert_eq!(
            next_daily_fire(now, at(0, 15)),
            Utc.with_ymd_and_hms(2024, 5, 2, 0, 15, 0).unwrap()
        );
    }

    #[test]
    fn test_register_table_skips_manual_and_inactive() {
        let now = Utc::now();
        let mut registry = JobRegistry::new();

        assert!(!registry.register_table(config(1, 0, None), now));
        let mut inactive = config(2, 15, None);
        inactive.active = false;
        assert!(!registry.register_table(inactive, now));
        assert!(registry.register_table(config(3, 15, None), now));

        assert_eq!(registry.len(), 1);
        assert!(registry.get(&JobKey::Table(3)).is_some());
    }

    #[test]
    fn test_first_fire_respects_last_sync() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let mut registry = JobRegistry::new();

        registry.register_table(config(1, 30, Some(now - Duration::minutes(10))), now);
        registry.register_table(config(2, 30, Some(now - Duration::hours(5))), now);
        registry.register_table(config(3, 30, None), now);

        assert_eq!(
            registry.get(&JobKey::Table(1)).unwrap().next_fire,
            now + Duration::minutes(20)
        );
        assert_eq!(registry.get(&JobKey::Table(2)).unwrap().next_fire, now);
        assert_eq!(registry.due(now), vec![JobKey::Table(2), JobKey::Table(3)]);
    }

    #[test]
    fn test_reschedule_and_next_wakeup() {
        let now = Utc.with_ymd_and_hms(2024, 5, 1, 1, 0, 0).unwrap();
        let mut registry = JobRegistry::new();
        registry.register_table(config(1, 15, None), now);
        registry.register_pos(PosDataset::InventoryLevels, at(2, 0), now);
        registry.register_pos(PosDataset::Receipts, at(3, 0), now);

        assert_eq!(registry.next_wakeup(), Some(now));
        assert_eq!(registry.due(now), vec![JobKey::Table(1)]);

        registry.reschedule(&JobKey::Table(1), now);
        assert!(registry.due(now).is_empty());
        assert_eq!(registry.next_wakeup(), Some(now + Duration::minutes(15)));

        let two_am = Utc.with_ymd_and_hms(2024, 5, 1, 2, 0, 0).unwrap();
        registry.reschedule(&JobKey::PosInventory, two_am);
        assert_eq!(
            registry.get(&JobKey::PosInventory).unwrap().next_fire,
            two_am + Duration::days(1)
        );
        assert!(matches!(
            registry.get(&JobKey::PosReceipts).unwrap().kind,
            JobKind::PosIngest(PosDataset::Receipts)
        ));
    }

    // =========================================================================
    // Event loop
    // =========================================================================

    async fn scheduler_with_table(interval: i64) -> (Database, Scheduler) {
        let (db, _, scheduler) =
            scheduler_with_remote(interval, FakeRemote::with_records(&["A", "B"])).await;
        (db, scheduler)
    }

    async fn scheduler_with_remote(
        interval: i64,
        remote: FakeRemote,
    ) -> (Database, SyncCoordinator, Scheduler) {
        let db = Database::new(DbConfig::in_memory()).await.unwrap();
        db.table_configs()
            .create(&table_input("orders", "pull", interval))
            .await
            .unwrap();
        let client: Arc<dyn RemoteRecordClient> = Arc::new(remote);
        let coordinator = SyncCoordinator::new(db.clone(), client, "appTest");
        let scheduler = Scheduler::new(db.clone(), coordinator.clone(), None);
        (db, coordinator, scheduler)
    }

    #[tokio::test]
    async fn test_overdue_table_fires_on_start() {
        let (db, scheduler) = scheduler_with_table(15).await;
        let handle = scheduler.start();

        let mut fired = false;
        for _ in 0..100 {
            if db.history().last_for_table("orders").await.unwrap().is_some() {
                fired = true;
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(20)).await;
        }
        assert!(fired, "scheduled sync never ran");
        assert_eq!(db.records().count("orders").await.unwrap(), 2);

        handle.stop().await;
    }

    #[tokio::test]
    async fn test_state_transitions_and_idempotent_stop() {
        let (_db, scheduler) = scheduler_with_table(0).await;
        let handle = scheduler.start();

        // Manual-only table: nothing registered, no POS jobs without a client.
        assert_eq!(handle.reload().await.unwrap(), 0);
        assert_eq!(handle.state().await, SchedulerState::Started);

        handle.stop().await;
        assert_eq!(handle.state().await, SchedulerState::Stopped);

        handle.stop().await;
        assert!(matches!(handle.reload().await, Err(SyncError::ShuttingDown)));
    }

    #[tokio::test]
    async fn test_commands_answered_while_job_runs() {
        let remote = FakeRemote {
            list_delay: Some(StdDuration::from_secs(5)),
            ..FakeRemote::with_records(&["A"])
        };
        let (db, coordinator, scheduler) = scheduler_with_remote(15, remote).await;
        let id = db.table_configs().list().await.unwrap()[0].id;
        let handle = scheduler.start();

        let mut started = false;
        for _ in 0..100 {
            if coordinator.locks().is_running(LockKey::Table(id)) {
                started = true;
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        assert!(started, "scheduled sync never started");

        let reloaded = tokio::time::timeout(StdDuration::from_secs(1), handle.reload()).await;
        assert_eq!(reloaded.expect("reload waited for the running sync").unwrap(), 1);
        handle.request_reload().unwrap();

        tokio::time::timeout(StdDuration::from_secs(1), handle.stop())
            .await
            .expect("stop waited for the running sync");
        assert_eq!(handle.state().await, SchedulerState::Stopped);

        // The cancelled run released its lock and recorded nothing.
        for _ in 0..100 {
            if !coordinator.locks().is_running(LockKey::Table(id)) {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(10)).await;
        }
        assert!(!coordinator.locks().is_running(LockKey::Table(id)));
        assert!(db.history().last_for_table("orders").await.unwrap().is_none());
        assert!(matches!(handle.request_reload(), Err(SyncError::ShuttingDown)));
    }
}
