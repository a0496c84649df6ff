//! Semantic model: declarative node and relation types
//!
//! Loaded from a JSON semantic header and validated before the builder
//! issues any statement.

pub mod header;
pub mod node;
pub mod relation;

pub use header::{DfEntity, SemanticHeader};
pub use node::{dfc_label, df_label, NodeConstructor, NodeSource, NodeType, NEVER_MERGED_LABELS};
pub use relation::{Hop, RelationConstructor, RelationSource, RelationType};
