//! Per-table advisory locks.
//!
//! A run holds a [`TableLockGuard`] for its whole duration; a second trigger
//! for the same table fails fast with [`SyncError::AlreadyRunning`] instead of
//! waiting.
//!
//! Table runs are keyed by config id, so renaming a table while it syncs
//! does not free its lock.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::{EngineResult, SyncError};
use meridian_core::PosDataset;

/// What a lock protects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LockKey {
    Table(i64),
    Pos(PosDataset),
}

/// Held keys mapped to the label shown in status and errors.
type Held = Arc<Mutex<HashMap<LockKey, String>>>;

/// Set of runs in progress.
#[derive(Debug, Clone, Default)]
pub struct TableLocks {
    running: Held,
}

impl TableLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `key`, or fails if another run holds it.
    ///
    /// `label` is the name reported while the lock is held.
    pub fn try_acquire(&self, key: LockKey, label: &str) -> EngineResult<TableLockGuard> {
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(holder) = running.get(&key) {
            return Err(SyncError::AlreadyRunning(holder.clone()));
        }
        running.insert(key, label.to_string());
        Ok(TableLockGuard {
            key,
            running: Arc::clone(&self.running),
        })
    }

    pub fn is_running(&self, key: LockKey) -> bool {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&key)
    }

    /// Labels of runs in progress, sorted.
    pub fn running(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

/// Releases the key when dropped.
#[derive(Debug)]
pub struct TableLockGuard {
    key: LockKey,
    running: Held,
}

impl Drop for TableLockGuard {
    fn drop(&mut self) {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_is_rejected_until_release() {
        let locks = TableLocks::new();

        let guard = locks.try_acquire(LockKey::Table(1), "orders").unwrap();
        assert!(locks.is_running(LockKey::Table(1)));
        assert!(matches!(
            locks.try_acquire(LockKey::Table(1), "orders"),
            Err(SyncError::AlreadyRunning(name)) if name == "orders"
        ));

        // Other keys are independent.
        let _other = locks.try_acquire(LockKey::Table(2), "customers").unwrap();
        let _pos = locks
            .try_acquire(LockKey::Pos(PosDataset::Receipts), "receipts")
            .unwrap();
        assert_eq!(locks.running(), vec!["customers", "orders", "receipts"]);

        drop(guard);
        assert!(!locks.is_running(LockKey::Table(1)));
        assert!(locks.try_acquire(LockKey::Table(1), "orders").is_ok());
    }

    #[test]
    fn test_key_is_id_not_label() {
        let locks = TableLocks::new();
        let _held = locks.try_acquire(LockKey::Table(7), "orders").unwrap();

        // Same id under a new name is still the same run.
        assert!(matches!(
            locks.try_acquire(LockKey::Table(7), "orders_v2"),
            Err(SyncError::AlreadyRunning(name)) if name == "orders"
        ));
        // Same name under another id is a different table.
        assert!(locks.try_acquire(LockKey::Table(8), "orders").is_ok());
    }
}
