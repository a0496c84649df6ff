//! Shared fixtures for integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use std::sync::{Arc, Mutex};

use ekg_builder::graph::{labels, PropertyMap, PropertyValue};
use ekg_builder::{BuilderConfig, EkgBuilder, EkgResult, EmbeddedGateway, GraphGateway, Row, SemanticHeader, Statement};

/// Embedded gateway that keeps every statement it was asked to run
pub struct RecordingGateway {
    inner: EmbeddedGateway,
    statements: Mutex<Vec<Statement>>,
}

impl RecordingGateway {
    pub fn new() -> Self {
        Self {
            inner: EmbeddedGateway::new(),
            statements: Mutex::new(Vec::new()),
        }
    }

    pub fn embedded(&self) -> &EmbeddedGateway {
        &self.inner
    }

    pub fn statements(&self) -> Vec<Statement> {
        self.statements.lock().unwrap().clone()
    }

    pub fn kinds(&self) -> Vec<&'static str> {
        self.statements.lock().unwrap().iter().map(|s| s.kind()).collect()
    }

    pub fn clear(&self) {
        self.statements.lock().unwrap().clear();
    }
}

#[async_trait]
impl GraphGateway for RecordingGateway {
    async fn execute(&self, statement: &Statement) -> EkgResult<Vec<Row>> {
        self.statements.lock().unwrap().push(statement.clone());
        self.inner.execute(statement).await
    }
}

/// Process-mining style header: events, resources, activity classes
pub const EVENTS_HEADER: &str = r#"{
    "name": "events",
    "nodes": [
        {"name": "Event", "constructors": [{
            "identifiers": ["eventId"],
            "optional_attributes": ["timestamp", "activity"],
            "source": {"kind": "record", "record_labels": ["EventRecord"]}
        }]},
        {"name": "Resource", "infer_df": true, "merge_duplicate_df": true, "constructors": [{
            "identifiers": ["resourceId"],
            "source": {"kind": "record", "record_labels": ["EventRecord"]},
            "infer_corr_from_event_record": true
        }]},
        {"name": "Activity", "constructors": [{
            "identifiers": ["activity"],
            "source": {"kind": "record", "record_labels": ["EventRecord"]},
            "infer_observed": true
        }]}
    ]
}"#;

pub fn event_record(event_id: &str, resource: &str, activity: &str, timestamp: i64) -> PropertyMap {
    PropertyMap::from([
        ("eventId".to_string(), PropertyValue::from(event_id)),
        ("resourceId".to_string(), PropertyValue::from(resource)),
        ("activity".to_string(), PropertyValue::from(activity)),
        ("timestamp".to_string(), PropertyValue::DateTime(timestamp)),
    ])
}

/// Import `(resource, activity)` steps as one event record each, in time order
pub async fn import_trace(gateway: &EmbeddedGateway, steps: &[(&str, &str)]) {
    let records = steps
        .iter()
        .enumerate()
        .map(|(i, (resource, activity))| event_record(&format!("e{}", i), resource, activity, i as i64 * 1000))
        .collect();
    gateway.import_records(&labels(["Record", "EventRecord"]), records).await;
}

pub fn builder<G: GraphGateway>(header: &str, gateway: Arc<G>, config: BuilderConfig) -> EkgBuilder<G> {
    let header = SemanticHeader::from_json_str(header).unwrap();
    EkgBuilder::new(Arc::new(header), gateway, config)
}
