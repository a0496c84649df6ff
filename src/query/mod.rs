//! Query template library
//!
//! - `statement`: typed statements the builder issues
//! - `templates`: one constructor function per operation kind
//! - `cypher`: rendering for Neo4j-compatible stores

pub mod cypher;
pub mod statement;
pub mod templates;

// Re-export main types
pub use cypher::{render, CypherQuery};
pub use statement::{
    DfAggregation, EventLink, HopPattern, NodeByRecord, NodeByRelation, RelationByRecord, RelationByRelations,
    Statement,
};
pub use templates::AggregationRequest;
