//! Typed graph statements
//!
//! Every mutation or lookup the builder issues is one `Statement`. The
//! embedded gateway executes them directly; the remote gateway renders them
//! as parameterised Cypher.

use crate::config::AggregationPolicy;
use crate::graph::{Direction, EdgeType, Label};

/// Relationship type from a constructed node to each record it came from
pub const PREVALENCE: &str = "PREVALENCE";
/// Relationship type from a class node to the events it observed
pub const OBSERVED: &str = "OBSERVED";
/// Relationship type from a reified relation node to its endpoints
pub const REIFIED: &str = "REIFIED";
/// Transient marker on records handled by the running statement
pub const PROCESSED_MARKER: &str = "_processed";
/// Transient marker on nodes that survived a merge pass
pub const MERGED_MARKER: &str = "_merged";
/// Property naming the entity type of a DF edge
pub const ENTITY_TYPE_KEY: &str = "entityType";
/// Property naming the entity node of a DF edge
pub const ENTITY_ID_KEY: &str = "entityId";
/// Marker property of event-level DF edges
pub const DF_TYPE: &str = "DF";
/// Marker property of class-level DF edges
pub const DFC_TYPE: &str = "DF_C";

/// How nodes built from a record are tied to that record's events
#[derive(Debug, Clone, PartialEq)]
pub enum EventLink {
    None,
    /// `(event)-[:corr_type]->(node)`
    Corr { corr_type: EdgeType, event_label: Label },
    /// `(node)-[:OBSERVED]->(event)`
    Observed { event_label: Label },
}

/// Nodes built from records
#[derive(Debug, Clone, PartialEq)]
pub struct NodeByRecord {
    pub record_labels: Vec<Label>,
    pub labels: Vec<Label>,
    pub identifiers: Vec<String>,
    pub optional_attributes: Vec<String>,
    /// Upsert by identity instead of creating one node per record
    pub merge: bool,
    pub link: EventLink,
}

/// Nodes built from the edges of a relation type
#[derive(Debug, Clone, PartialEq)]
pub struct NodeByRelation {
    pub relation_type: EdgeType,
    pub labels: Vec<Label>,
    pub identifiers: Vec<String>,
    pub optional_attributes: Vec<String>,
    pub reify: bool,
    /// Correlate the node with every event of both endpoints
    pub corr_from_parents: Option<(EdgeType, Label)>,
}

/// Relations between entities sharing a record
#[derive(Debug, Clone, PartialEq)]
pub struct RelationByRecord {
    pub record_labels: Vec<Label>,
    pub from_label: Label,
    pub to_label: Label,
    pub relation_type: EdgeType,
}

/// One step of a relation chain
#[derive(Debug, Clone, PartialEq)]
pub struct HopPattern {
    pub edge_type: EdgeType,
    pub direction: Direction,
    pub label: Option<Label>,
}

/// Shortcut relations across a chain of existing relations
#[derive(Debug, Clone, PartialEq)]
pub struct RelationByRelations {
    pub from_label: Label,
    pub to_label: Label,
    pub path: Vec<HopPattern>,
    pub relation_type: EdgeType,
}

/// Class-level DF aggregation for one entity type
#[derive(Debug, Clone, PartialEq)]
pub struct DfAggregation {
    pub entity_type: String,
    pub entity_label: Label,
    pub df_label: EdgeType,
    pub dfc_label: EdgeType,
    pub event_label: Label,
    pub class_label: Label,
    pub corr_type: EdgeType,
    /// Required `classType` of both class nodes
    pub class_type: Option<String>,
    pub df_threshold: u64,
    pub relative_df_threshold: f64,
    pub exclude_self_loops: bool,
    pub policy: AggregationPolicy,
}

impl DfAggregation {
    /// Both thresholds zero: count every underlying edge
    pub fn is_threshold_free(&self) -> bool {
        self.df_threshold == 0 && self.relative_df_threshold == 0.0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Distinct usable identity tuples among records; row `{num_ids}`
    CountIdentities {
        record_labels: Vec<Label>,
        identifiers: Vec<String>,
    },

    /// Row `{created, matched}`
    CreateNodesByRecord(NodeByRecord),

    /// Remove the processed marker from records
    ResetProcessedRecords { record_labels: Vec<Label> },

    /// Collapse nodes sharing an identity into the oldest one; row `{merged}`
    MergeNodesWithSameId {
        labels: Vec<Label>,
        identifiers: Vec<String>,
    },

    /// Remove the merged marker from surviving nodes
    ResetMergedNodes { labels: Vec<Label> },

    /// Identity tuples held by more than one node; row `{duplicates}`
    CountDuplicateIdentities {
        labels: Vec<Label>,
        identifiers: Vec<String>,
    },

    /// Row `{created, matched}`
    CreateNodesByRelation(NodeByRelation),

    /// Row `{created}`
    CreateRelationsByRecord(RelationByRecord),

    /// Row `{created}`
    CreateRelationsByRelations(RelationByRelations),

    /// For every `(from)-[:relation_type]->(to)`, the reference endpoint is
    /// `from` when `use_from`, else `to`. When the reference endpoint is a
    /// reified node, events correlated with the other endpoint are
    /// correlated with it too. Row `{created}`
    InferCorrFromReifiedParents {
        relation_type: EdgeType,
        corr_type: EdgeType,
        event_label: Label,
        use_from: bool,
    },

    /// Chain the events of every entity node by timestamp. Row `{created}`
    CreateDirectlyFollows {
        entity_type: String,
        entity_label: Label,
        df_label: EdgeType,
        event_label: Label,
        corr_type: EdgeType,
        timestamp_attribute: String,
    },

    /// Replace parallel DF edges by one edge with a `count`; row `{merged}`
    MergeDuplicateDf {
        entity_type: String,
        df_label: EdgeType,
    },

    /// Delete DF edges of `entity_type` running parallel to a DF edge of
    /// one of `parents` (`(df label, entity type)`); row `{deleted}`
    DeleteParallelDf {
        entity_type: String,
        df_label: EdgeType,
        parents: Vec<(EdgeType, String)>,
    },

    /// One row `{from_id, to_id, count}` per kept class pair
    AggregateDf(DfAggregation),

    /// Rows `{kind, name, count}` per label and relationship type
    Statistics,
}

impl Statement {
    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Statement::CountIdentities { .. } => "count_identities",
            Statement::CreateNodesByRecord(n) if n.merge => "merge_nodes_by_record",
            Statement::CreateNodesByRecord(_) => "create_nodes_by_record",
            Statement::ResetProcessedRecords { .. } => "reset_processed_records",
            Statement::MergeNodesWithSameId { .. } => "merge_nodes_with_same_id",
            Statement::ResetMergedNodes { .. } => "reset_merged_nodes",
            Statement::CountDuplicateIdentities { .. } => "count_duplicate_identities",
            Statement::CreateNodesByRelation(_) => "create_nodes_by_relation",
            Statement::CreateRelationsByRecord(_) => "create_relations_by_record",
            Statement::CreateRelationsByRelations(_) => "create_relations_by_relations",
            Statement::InferCorrFromReifiedParents { .. } => "infer_corr_from_reified_parents",
            Statement::CreateDirectlyFollows { .. } => "create_directly_follows",
            Statement::MergeDuplicateDf { .. } => "merge_duplicate_df",
            Statement::DeleteParallelDf { .. } => "delete_parallel_df",
            Statement::AggregateDf(_) => "aggregate_df",
            Statement::Statistics => "statistics",
        }
    }

    /// True when executing the statement never changes the graph
    pub fn is_read_only(&self) -> bool {
        matches!(
            self,
            Statement::CountIdentities { .. }
                | Statement::CountDuplicateIdentities { .. }
                | Statement::Statistics
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::labels;

    #[test]
    fn test_kind_distinguishes_merge_path() {
        let mut stmt = NodeByRecord {
            record_labels: labels(["BookRecord"]),
            labels: labels(["Book"]),
            identifiers: vec!["bookId".into()],
            optional_attributes: vec![],
            merge: true,
            link: EventLink::None,
        };
        assert_eq!(Statement::CreateNodesByRecord(stmt.clone()).kind(), "merge_nodes_by_record");
        stmt.merge = false;
        assert_eq!(Statement::CreateNodesByRecord(stmt).kind(), "create_nodes_by_record");
    }

    #[test]
    fn test_read_only() {
        assert!(Statement::Statistics.is_read_only());
        assert!(!Statement::ResetMergedNodes { labels: labels(["Book"]) }.is_read_only());
    }
}
