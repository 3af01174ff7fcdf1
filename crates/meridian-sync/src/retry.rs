//! # Remote Operations and Retry
//!
//! Every remote mutation the coordinator performs is a [`RemoteOp`] executed
//! under a [`RetryPolicy`]. The default policy makes one attempt; raising
//! `sync.max_attempts` retries transient failures with exponential backoff.

use std::future::Future;
use std::time::Duration;

use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use tracing::{debug, warn};

use crate::error::EngineResult;
use crate::remote::RemoteRecordClient;
use meridian_core::{FieldMap, RemoteRecord};

// =============================================================================
// Retry Policy
// =============================================================================

/// How often and how patiently a failed operation is repeated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 1,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn single_attempt() -> Self {
        Self::default()
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.initial_backoff,
            initial_interval: self.initial_backoff,
            max_interval: self.max_backoff,
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Runs `op` until it succeeds, fails with a non-retryable error, or the
    /// attempts are used up. The last error is returned.
    pub async fn run<T, F, Fut>(&self, mut op: F) -> EngineResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EngineResult<T>>,
    {
        let mut backoff = self.backoff();
        let mut attempt = 1;

        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    let wait = backoff.next_backoff().unwrap_or(self.max_backoff);
                    warn!(attempt, ?wait, error = %e, "Remote operation failed, retrying");
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
                Err(e) => {
                    debug!(attempt, error = %e, "Remote operation failed");
                    return Err(e);
                }
            }
        }
    }
}

// =============================================================================
// Remote Operations
// =============================================================================

/// A single remote mutation produced by the push phase.
#[derive(Debug, Clone, PartialEq)]
pub enum RemoteOp {
    /// The row has no remote id yet.
    Create { fields: FieldMap },

    /// The row is already known remotely.
    Update { remote_id: String, fields: FieldMap },
}

impl RemoteOp {
    /// Chooses create or update from the row's remote id.
    pub fn for_row(remote_id: Option<&str>, fields: FieldMap) -> Self {
        match remote_id.filter(|id| !id.is_empty()) {
            Some(id) => RemoteOp::Update {
                remote_id: id.to_string(),
                fields,
            },
            None => RemoteOp::Create { fields },
        }
    }

    pub fn is_create(&self) -> bool {
        matches!(self, RemoteOp::Create { .. })
    }

    /// Performs the operation once.
    pub async fn execute(
        &self,
        client: &dyn RemoteRecordClient,
        base_id: &str,
        table: &str,
    ) -> EngineResult<RemoteRecord> {
        match self {
            RemoteOp::Create { fields } => client.create(base_id, table, fields).await,
            RemoteOp::Update { remote_id, fields } => {
                client.update(base_id, table, remote_id, fields).await
            }
        }
    }

    /// Performs the operation under `policy`.
    pub async fn execute_with(
        &self,
        policy: &RetryPolicy,
        client: &dyn RemoteRecordClient,
        base_id: &str,
        table: &str,
    ) -> EngineResult<RemoteRecord> {
        policy.run(|| self.execute(client, base_id, table)).await
    }
}
