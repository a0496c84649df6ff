//! Relation types and their constructors

use super::node::{default_corr_type, df_label};
use crate::graph::{Direction, EdgeType, Label};
use serde::{Deserialize, Serialize};

/// One step of a relation chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hop {
    pub relation_type: String,

    #[serde(default)]
    pub direction: Direction,

    /// Node type the hop must land on, if constrained
    #[serde(default)]
    pub node_type: Option<String>,
}

impl Hop {
    pub fn edge_type(&self) -> EdgeType {
        EdgeType::from(&self.relation_type)
    }
}

/// Where the edges of a relation constructor come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RelationSource {
    /// Entities that share a record carrying all of `record_labels`
    Record { record_labels: Vec<String> },

    /// Entities joined by a chain of already-built relations, walked from
    /// the from-entity. The last hop must land on the to-entity.
    Relations { path: Vec<Hop> },
}

/// Declares how edges of one relation type are built between two node types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationConstructor {
    pub from_type: String,
    pub to_type: String,
    pub source: RelationSource,

    #[serde(default)]
    pub infer_corr_from_reified_parents: bool,

    #[serde(default = "default_corr_type")]
    pub corr_type: String,
}

impl RelationConstructor {
    pub fn from_label(&self) -> Label {
        Label::from(&self.from_type)
    }

    pub fn to_label(&self) -> Label {
        Label::from(&self.to_type)
    }

    pub fn is_from_record(&self) -> bool {
        matches!(self.source, RelationSource::Record { .. })
    }

    pub fn corr_edge_type(&self) -> EdgeType {
        EdgeType::from(&self.corr_type)
    }

    /// Human readable pattern for progress lines
    pub fn pattern(&self, relation_type: &str) -> String {
        format!("(:{})-[:{}]->(:{})", self.from_type, relation_type, self.to_type)
    }
}

/// A relation type of the semantic header
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationType {
    pub name: String,

    #[serde(default)]
    pub constructors: Vec<RelationConstructor>,

    /// The relation is also represented by nodes labelled with its name,
    /// which can then carry DF edges of their own
    #[serde(default)]
    pub model_as_node: bool,

    #[serde(default)]
    pub infer_df: bool,

    #[serde(default)]
    pub include_label_in_df: bool,

    #[serde(default)]
    pub merge_duplicate_df: bool,
}

impl RelationType {
    pub fn edge_type(&self) -> EdgeType {
        EdgeType::from(&self.name)
    }

    /// Label of the nodes representing this relation when modelled as node
    pub fn entity_label(&self) -> Label {
        Label::from(&self.name)
    }

    pub fn df_label(&self) -> EdgeType {
        df_label(&self.name, self.include_label_in_df)
    }
}
