//! Test doubles shared by the engine's unit tests.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;

use crate::error::{EngineResult, SyncError};
use crate::remote::RemoteRecordClient;
use meridian_core::{FieldMap, RemoteRecord, TableConfigInput};

/// In-memory collaboration API.
///
/// Listed records carry `Name`, `Total` and an unmapped `Notes` field.
/// Updates of ids in `failing_ids` answer with a remote 500. `list_delay`
/// makes listing slow.
#[derive(Default)]
pub(crate) struct FakeRemote {
    pub records: Vec<RemoteRecord>,
    pub fail_list: bool,
    pub list_delay: Option<Duration>,
    pub failing_ids: HashSet<String>,
    pub list_calls: AtomicUsize,
    pub created: Mutex<Vec<FieldMap>>,
    pub updated: Mutex<Vec<(String, FieldMap)>>,
}

impl FakeRemote {
    pub fn with_records(ids: &[&str]) -> Self {
        FakeRemote {
            records: ids
                .iter()
                .map(|id| {
                    let mut fields = FieldMap::new();
                    fields.insert("Name".into(), json!(format!("Order {}", id)));
                    fields.insert("Total".into(), json!(10));
                    fields.insert("Notes".into(), json!("unmapped"));
                    RemoteRecord::new(format!("rec{}", id), fields)
                })
                .collect(),
            ..Default::default()
        }
    }
}

#[async_trait]
impl RemoteRecordClient for FakeRemote {
    async fn list_records(&self, _base: &str, _table: &str) -> EngineResult<Vec<RemoteRecord>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.list_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_list {
            return Err(SyncError::Http("connection refused".into()));
        }
        Ok(self.records.clone())
    }

    async fn create(&self, _base: &str, _table: &str, fields: &FieldMap) -> EngineResult<RemoteRecord> {
        let mut created = self.created.lock().unwrap();
        created.push(fields.clone());
        Ok(RemoteRecord::new(format!("recNew{}", created.len()), fields.clone()))
    }

    async fn update(
        &self,
        _base: &str,
        _table: &str,
        remote_id: &str,
        fields: &FieldMap,
    ) -> EngineResult<RemoteRecord> {
        if self.failing_ids.contains(remote_id) {
            return Err(SyncError::Remote {
                status: 500,
                message: "internal error".into(),
            });
        }
        self.updated
            .lock()
            .unwrap()
            .push((remote_id.to_string(), fields.clone()));
        Ok(RemoteRecord::new(remote_id, fields.clone()))
    }

    async fn delete(&self, _base: &str, _table: &str, _remote_id: &str) -> EngineResult<()> {
        Ok(())
    }
}

/// A valid table config mapping `name`/`total` to `Name`/`Total`.
pub(crate) fn table_input(name: &str, direction: &str, interval: i64) -> TableConfigInput {
    TableConfigInput {
        name: name.into(),
        remote_table_id: format!("tbl_{}", name),
        description: String::new(),
        mapping: r#"{"name": "Name", "total": "Total"}"#.into(),
        create_sql: None,
        source_sql: None,
        sync_interval: interval,
        sync_direction: direction.into(),
        active: true,
    }
}
