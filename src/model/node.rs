//! Node types and their constructors

use crate::graph::{EdgeType, Label};
use serde::{Deserialize, Serialize};

/// Labels whose nodes are always created one per record and never merged
pub const NEVER_MERGED_LABELS: [&str; 2] = ["Event", "EntityAttribute"];

pub(crate) fn default_corr_type() -> String {
    "CORR".to_string()
}

pub(crate) fn default_event_label() -> String {
    "Event".to_string()
}

/// Where the nodes of a constructor come from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeSource {
    /// One node per record carrying all of `record_labels`
    Record { record_labels: Vec<String> },

    /// One node per edge of an already-built relation type. With `reify`
    /// the node is linked to both endpoints by `REIFIED` edges.
    Relation {
        relation_type: String,
        #[serde(default)]
        reify: bool,
    },
}

/// Declares how one kind of node is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeConstructor {
    /// Labels of the constructed nodes. The owning type's name is always
    /// among them after loading.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Ordered identifying attributes; the identity tuple of a node
    pub identifiers: Vec<String>,

    /// Attributes copied when present on the source but not identifying
    #[serde(default)]
    pub optional_attributes: Vec<String>,

    pub source: NodeSource,

    /// Link the node to the events of its record with `(node)-[:OBSERVED]->(event)`
    #[serde(default)]
    pub infer_observed: bool,

    /// Correlate the events of its record with `(event)-[:CORR]->(node)`
    #[serde(default)]
    pub infer_corr_from_event_record: bool,

    /// Relation-sourced nodes only: correlate the node with every event of
    /// both relation endpoints
    #[serde(default)]
    pub infer_corr_from_reified_parents: bool,

    #[serde(default = "default_corr_type")]
    pub corr_type: String,

    #[serde(default = "default_event_label")]
    pub event_label: String,
}

impl NodeConstructor {
    pub fn label_set(&self) -> Vec<Label> {
        self.labels.iter().map(Label::from).collect()
    }

    /// Event and EntityAttribute nodes keep one node per record
    pub fn is_never_merged(&self) -> bool {
        self.labels
            .iter()
            .any(|l| NEVER_MERGED_LABELS.contains(&l.as_str()))
    }

    pub fn is_from_record(&self) -> bool {
        matches!(self.source, NodeSource::Record { .. })
    }

    pub fn record_labels(&self) -> Option<Vec<Label>> {
        match &self.source {
            NodeSource::Record { record_labels } => Some(record_labels.iter().map(Label::from).collect()),
            NodeSource::Relation { .. } => None,
        }
    }

    pub fn corr_edge_type(&self) -> EdgeType {
        EdgeType::from(&self.corr_type)
    }

    /// Attributes copied onto constructed nodes: identifiers first
    pub fn copied_attributes(&self) -> Vec<String> {
        let mut attrs = self.identifiers.clone();
        for attr in &self.optional_attributes {
            if !attrs.contains(attr) {
                attrs.push(attr.clone());
            }
        }
        attrs
    }

    /// Human readable pattern for progress lines, e.g. `(:Book {bookId})`
    pub fn pattern(&self) -> String {
        format!("(:{} {{{}}})", self.labels.join(":"), self.identifiers.join(", "))
    }
}

/// A node type of the semantic header: a name, its constructors and the
/// directly-follows flags that apply to its entities.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeType {
    pub name: String,

    #[serde(default)]
    pub constructors: Vec<NodeConstructor>,

    /// Build event-level DF edges for entities of this type
    #[serde(default)]
    pub infer_df: bool,

    /// Use `DF_<TYPE>` instead of `DF` as the relationship type
    #[serde(default)]
    pub include_label_in_df: bool,

    #[serde(default)]
    pub merge_duplicate_df: bool,

    /// Drop DF edges parallel to a DF edge of an endpoint type
    #[serde(default)]
    pub delete_parallel_df: bool,
}

impl NodeType {
    /// Label carried by every entity node of this type
    pub fn entity_label(&self) -> Label {
        Label::from(&self.name)
    }

    pub fn df_label(&self) -> EdgeType {
        df_label(&self.name, self.include_label_in_df)
    }
}

/// `DF` or `DF_<TYPE>`
pub fn df_label(type_name: &str, include_label: bool) -> EdgeType {
    if include_label {
        EdgeType::new(format!("DF_{}", type_name.to_uppercase()))
    } else {
        EdgeType::new("DF")
    }
}

/// `DF_C` or `DF_C_<TYPE>`
pub fn dfc_label(type_name: &str, include_label: bool) -> EdgeType {
    if include_label {
        EdgeType::new(format!("DF_C_{}", type_name.to_uppercase()))
    } else {
        EdgeType::new("DF_C")
    }
}
