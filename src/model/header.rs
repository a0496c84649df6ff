//! The semantic header: every node and relation type of an event knowledge
//! graph, loaded once and read-only afterwards.

use super::node::{NodeConstructor, NodeSource, NodeType};
use super::relation::{RelationConstructor, RelationSource, RelationType};
use crate::error::{EkgError, EkgResult};
use crate::graph::{EdgeType, Label};
use crate::query::statement::REIFIED;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, warn};

/// A type whose entity nodes can carry directly-follows edges: either a node
/// type or a relation type modelled as node.
#[derive(Debug, Clone, PartialEq)]
pub struct DfEntity {
    pub name: String,
    pub label: Label,
    pub df_label: EdgeType,
    pub infer_df: bool,
    pub include_label_in_df: bool,
    pub merge_duplicate_df: bool,
    pub delete_parallel_df: bool,
}

impl From<&NodeType> for DfEntity {
    fn from(node: &NodeType) -> Self {
        DfEntity {
            name: node.name.clone(),
            label: node.entity_label(),
            df_label: node.df_label(),
            infer_df: node.infer_df,
            include_label_in_df: node.include_label_in_df,
            merge_duplicate_df: node.merge_duplicate_df,
            delete_parallel_df: node.delete_parallel_df,
        }
    }
}

impl From<&RelationType> for DfEntity {
    fn from(rel: &RelationType) -> Self {
        DfEntity {
            name: rel.name.clone(),
            label: rel.entity_label(),
            df_label: rel.df_label(),
            infer_df: rel.infer_df,
            include_label_in_df: rel.include_label_in_df,
            merge_duplicate_df: rel.merge_duplicate_df,
            delete_parallel_df: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticHeader {
    pub name: String,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub nodes: Vec<NodeType>,

    #[serde(default)]
    pub relations: Vec<RelationType>,
}

/// Empty filter selects everything
fn selected(types: &[String], name: &str) -> bool {
    types.is_empty() || types.iter().any(|t| t == name)
}

impl SemanticHeader {
    /// Parse, normalise and validate a JSON semantic header
    pub fn from_json_str(json: &str) -> EkgResult<Self> {
        let header: SemanticHeader = serde_json::from_str(json)?;
        header.prepare()
    }

    pub fn from_path(path: impl AsRef<Path>) -> EkgResult<Self> {
        let path = path.as_ref();
        debug!("Loading semantic header from {:?}", path);
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    /// Normalise and validate a header built in code
    pub fn prepare(mut self) -> EkgResult<Self> {
        self.normalize();
        self.validate()?;
        Ok(self)
    }

    /// Every constructor's labels include the name of its type
    fn normalize(&mut self) {
        for node in &mut self.nodes {
            for constructor in &mut node.constructors {
                if !constructor.labels.contains(&node.name) {
                    constructor.labels.insert(0, node.name.clone());
                }
            }
        }
    }

    /// Reject headers that reference unknown types or declare unusable constructors
    pub fn validate(&self) -> EkgResult<()> {
        let mut node_names = HashSet::new();
        for node in &self.nodes {
            if node.name.is_empty() {
                return Err(EkgError::config("node type with empty name"));
            }
            if !node_names.insert(node.name.as_str()) {
                return Err(EkgError::config(format!("duplicate node type '{}'", node.name)));
            }
        }

        let mut relation_names = HashSet::new();
        for rel in &self.relations {
            if rel.name.is_empty() {
                return Err(EkgError::config("relation type with empty name"));
            }
            if !relation_names.insert(rel.name.as_str()) {
                return Err(EkgError::config(format!("duplicate relation type '{}'", rel.name)));
            }
        }

        let is_entity = |name: &str| {
            node_names.contains(name)
                || self.relations.iter().any(|r| r.model_as_node && r.name == name)
        };

        for node in &self.nodes {
            for constructor in &node.constructors {
                self.validate_node_constructor(node, constructor, &relation_names)?;
            }
        }

        for rel in &self.relations {
            if rel.infer_df && !rel.model_as_node {
                warn!(
                    "Relation type '{}' sets infer_df but is not modelled as node; ignored",
                    rel.name
                );
            }
            for constructor in &rel.constructors {
                for endpoint in [&constructor.from_type, &constructor.to_type] {
                    if !is_entity(endpoint) {
                        return Err(EkgError::config(format!(
                            "relation '{}' references unknown type '{}'",
                            rel.name, endpoint
                        )));
                    }
                }
                match &constructor.source {
                    RelationSource::Record { record_labels } if record_labels.is_empty() => {
                        return Err(EkgError::config(format!(
                            "relation '{}' has a record constructor without record labels",
                            rel.name
                        )));
                    }
                    RelationSource::Record { .. } => {}
                    RelationSource::Relations { path } => {
                        if path.is_empty() {
                            return Err(EkgError::config(format!(
                                "relation '{}' has an empty relation path",
                                rel.name
                            )));
                        }
                        for hop in path {
                            // REIFIED is written by nodes built from relations
                            if hop.relation_type != REIFIED && !relation_names.contains(hop.relation_type.as_str()) {
                                return Err(EkgError::config(format!(
                                    "relation '{}' walks unknown relation type '{}'",
                                    rel.name, hop.relation_type
                                )));
                            }
                            if let Some(node_type) = &hop.node_type {
                                if !is_entity(node_type) {
                                    return Err(EkgError::config(format!(
                                        "relation '{}' hop lands on unknown type '{}'",
                                        rel.name, node_type
                                    )));
                                }
                            }
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn validate_node_constructor(
        &self,
        node: &NodeType,
        constructor: &NodeConstructor,
        relation_names: &HashSet<&str>,
    ) -> EkgResult<()> {
        if constructor.identifiers.is_empty() {
            return Err(EkgError::config(format!("node type '{}' has no identifiers", node.name)));
        }
        if constructor.identifiers.iter().any(|id| id.is_empty()) {
            return Err(EkgError::config(format!(
                "node type '{}' has an empty identifier name",
                node.name
            )));
        }
        if constructor.labels.iter().any(|l| l.is_empty()) {
            return Err(EkgError::config(format!("node type '{}' has an empty label", node.name)));
        }
        match &constructor.source {
            NodeSource::Record { record_labels } if record_labels.is_empty() => Err(EkgError::config(
                format!("node type '{}' has a record constructor without record labels", node.name),
            )),
            NodeSource::Relation { relation_type, .. } if !relation_names.contains(relation_type.as_str()) => {
                Err(EkgError::config(format!(
                    "node type '{}' is built from unknown relation type '{}'",
                    node.name, relation_type
                )))
            }
            _ => Ok(()),
        }
    }

    pub fn node_type(&self, name: &str) -> Option<&NodeType> {
        self.nodes.iter().find(|n| n.name == name)
    }

    pub fn relation_type(&self, name: &str) -> Option<&RelationType> {
        self.relations.iter().find(|r| r.name == name)
    }

    /// Node constructors sourced from records, for the selected node types
    pub fn node_constructors_from_records(&self, types: &[String]) -> Vec<(&NodeType, &NodeConstructor)> {
        self.node_constructors(types, true)
    }

    /// Node constructors sourced from relations, for the selected node types
    pub fn node_constructors_from_relations(&self, types: &[String]) -> Vec<(&NodeType, &NodeConstructor)> {
        self.node_constructors(types, false)
    }

    fn node_constructors(&self, types: &[String], from_record: bool) -> Vec<(&NodeType, &NodeConstructor)> {
        self.nodes
            .iter()
            .filter(|n| selected(types, &n.name))
            .flat_map(|n| n.constructors.iter().map(move |c| (n, c)))
            .filter(|(_, c)| c.is_from_record() == from_record)
            .collect()
    }

    pub fn relation_constructors_from_records(&self, types: &[String]) -> Vec<(&RelationType, &RelationConstructor)> {
        self.relation_constructors(types, true)
    }

    pub fn relation_constructors_from_relations(&self, types: &[String]) -> Vec<(&RelationType, &RelationConstructor)> {
        self.relation_constructors(types, false)
    }

    fn relation_constructors(&self, types: &[String], from_record: bool) -> Vec<(&RelationType, &RelationConstructor)> {
        self.relations
            .iter()
            .filter(|r| selected(types, &r.name))
            .flat_map(|r| r.constructors.iter().map(move |c| (r, c)))
            .filter(|(_, c)| c.is_from_record() == from_record)
            .collect()
    }

    /// Node types followed by relation types modelled as node. A relation
    /// type sharing its name with a node type is listed once.
    pub fn df_entities(&self) -> Vec<DfEntity> {
        let mut entities: Vec<DfEntity> = self.nodes.iter().map(DfEntity::from).collect();
        for rel in self.relations.iter().filter(|r| r.model_as_node) {
            if !entities.iter().any(|e| e.name == rel.name) {
                entities.push(DfEntity::from(rel));
            }
        }
        entities
    }

    /// Look up a node type or relation-as-node type by name
    pub fn df_entity(&self, name: &str) -> Option<DfEntity> {
        self.df_entities().into_iter().find(|e| e.name == name)
    }

    /// Names of every entity type, the default selection for DF inference
    pub fn entity_type_names(&self) -> Vec<String> {
        self.df_entities().into_iter().map(|e| e.name).collect()
    }
}
