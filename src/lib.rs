//! Event Knowledge Graph Builder
//!
//! Builds an event knowledge graph inside a property graph store from a
//! declarative semantic header, then rolls event-level directly-follows
//! edges up into class-level edges.
//!
//! # Architecture
//!
//! - `model`: the semantic header (node and relation types, constructors)
//! - `query`: typed statements, one template per operation kind, Cypher rendering
//! - `gateway`: executes statements against an in-memory or remote store
//! - `builder`: the construction pipeline (nodes, relations, DF edges)
//! - `discovery`: class-level DF aggregation with frequency thresholds
//! - `graph`: the in-memory property graph behind the embedded gateway
//!
//! ## Example Usage
//!
//! ```rust
//! use ekg_builder::{BuilderConfig, EkgBuilder, EmbeddedGateway, SemanticHeader};
//! use ekg_builder::graph::{labels, PropertyMap, PropertyValue};
//! use std::sync::Arc;
//!
//! # #[tokio::main]
//! # async fn main() {
//! let header = SemanticHeader::from_json_str(r#"{
//!     "name": "orders",
//!     "nodes": [{"name": "Order", "constructors": [{
//!         "identifiers": ["orderId"],
//!         "source": {"kind": "record", "record_labels": ["OrderRecord"]}
//!     }]}]
//! }"#).unwrap();
//!
//! let gateway = Arc::new(EmbeddedGateway::new());
//! let records: Vec<PropertyMap> = ["O1", "O2", "O1"]
//!     .iter()
//!     .map(|id| PropertyMap::from([("orderId".to_string(), PropertyValue::from(*id))]))
//!     .collect();
//! gateway.import_records(&labels(["Record", "OrderRecord"]), records).await;
//!
//! let builder = EkgBuilder::new(Arc::new(header), Arc::clone(&gateway), BuilderConfig::default());
//! builder.build().await.unwrap();
//!
//! let summary = builder.statistics().await.unwrap();
//! assert_eq!(summary.labels.get("Order"), Some(&2));
//! # }
//! ```

#![allow(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod config;
pub mod discovery;
pub mod error;
pub mod gateway;
pub mod graph;
pub mod model;
pub mod query;

// Re-export main types for convenience
pub use builder::{decide_strategy, EkgBuilder, NodeStrategy, StoreSummary};
pub use config::{AggregationPolicy, BuilderConfig, DiscoveryConfig, EkgConfig, GatewayConfig, RecordFile};
pub use discovery::{ClassEdge, DfAggregator, DfThresholds};
pub use error::{EkgError, EkgResult};
pub use gateway::{EmbeddedGateway, GraphGateway, RemoteGateway, Row};
pub use model::{NodeConstructor, NodeType, RelationConstructor, RelationType, SemanticHeader};
pub use query::{AggregationRequest, Statement};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get version string
pub fn version() -> &'static str {
    VERSION
}
