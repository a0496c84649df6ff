//! EmbeddedGateway: in-process graph store
//!
//! Executes statements directly against a GraphStore, no network needed.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

use super::{GraphGateway, Row, StatementExecutor};
use crate::config::RecordFile;
use crate::error::{EkgError, EkgResult};
use crate::graph::{labels, GraphStore, Label, PropertyMap, PropertyValue};
use crate::query::Statement;

/// In-process gateway that wraps a GraphStore directly.
///
/// Every statement holds the write lock for its whole run, so statements
/// are applied one at a time.
pub struct EmbeddedGateway {
    store: Arc<RwLock<GraphStore>>,
}

impl EmbeddedGateway {
    /// Create a gateway over a fresh empty store
    pub fn new() -> Self {
        Self {
            store: Arc::new(RwLock::new(GraphStore::new())),
        }
    }

    /// Create a gateway wrapping an existing store
    pub fn with_store(store: Arc<RwLock<GraphStore>>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<RwLock<GraphStore>> {
        &self.store
    }

    /// Acquire a read lock on the store
    pub async fn store_read(&self) -> tokio::sync::RwLockReadGuard<'_, GraphStore> {
        self.store.read().await
    }

    /// Acquire a write lock on the store
    pub async fn store_write(&self) -> tokio::sync::RwLockWriteGuard<'_, GraphStore> {
        self.store.write().await
    }

    /// Load records as nodes carrying `labels`. Returns the number imported.
    pub async fn import_records(&self, labels: &[Label], records: Vec<PropertyMap>) -> usize {
        let mut store = self.store.write().await;
        let count = records.len();
        for properties in records {
            store.create_node_with_properties(labels.to_vec(), properties);
        }
        debug!("Imported {} records as {:?}", count, labels);
        count
    }

    /// Import a JSON array of flat record objects. Attributes listed in
    /// `datetime_attributes` are parsed into timestamps when possible.
    pub async fn import_file(&self, file: &RecordFile) -> EkgResult<usize> {
        let json = tokio::fs::read_to_string(&file.path).await?;
        let records = parse_records(&json, &file.datetime_attributes)
            .map_err(|msg| EkgError::config(format!("{}: {}", file.path.display(), msg)))?;
        Ok(self.import_records(&labels(&file.labels), records).await)
    }
}

fn parse_records(json: &str, datetime_attributes: &[String]) -> Result<Vec<PropertyMap>, String> {
    let value: serde_json::Value = serde_json::from_str(json).map_err(|e| e.to_string())?;
    let serde_json::Value::Array(items) = value else {
        return Err("expected a JSON array of records".to_string());
    };

    items
        .iter()
        .enumerate()
        .map(|(i, item)| {
            let object = item
                .as_object()
                .ok_or_else(|| format!("record {} is not an object", i))?;
            let record: PropertyMap = object
                .iter()
                .map(|(key, raw)| {
                    let value = match raw.as_str() {
                        Some(text) if datetime_attributes.contains(key) => {
                            PropertyValue::parse_timestamp(text).unwrap_or_else(|| PropertyValue::from(text))
                        }
                        _ => PropertyValue::from_json(raw),
                    };
                    (key.clone(), value)
                })
                .collect();
            Ok(record)
        })
        .collect()
}

impl Default for EmbeddedGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GraphGateway for EmbeddedGateway {
    async fn execute(&self, statement: &Statement) -> EkgResult<Vec<Row>> {
        let mut store = self.store.write().await;
        StatementExecutor::new(&mut store).execute(statement)
    }
}
