//! In-memory property graph
//!
//! Backs the embedded gateway:
//! - Nodes with multiple labels and properties
//! - Directed, typed edges with properties, parallel edges allowed
//! - Label and edge-type indices for fast lookups

pub mod edge;
pub mod node;
pub mod property;
pub mod store;
pub mod types;

// Re-export main types
pub use edge::Edge;
pub use node::Node;
pub use property::{PropertyMap, PropertyValue, UNKNOWN_VALUE};
pub use store::{GraphError, GraphResult, GraphStatistics, GraphStore};
pub use types::{labels, Direction, EdgeId, EdgeType, Label, NodeId};
