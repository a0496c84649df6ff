//! Statement templates: one function per operation kind, each turning a
//! semantic header entry into a `Statement`.

use super::statement::*;
use crate::config::{AggregationPolicy, BuilderConfig};
use crate::graph::{EdgeType, Label};
use crate::model::{
    dfc_label, DfEntity, NodeConstructor, NodeSource, RelationConstructor, RelationSource, RelationType,
};

fn record_labels(constructor: &NodeConstructor) -> Vec<Label> {
    constructor.record_labels().unwrap_or_default()
}

pub fn count_identities(constructor: &NodeConstructor) -> Statement {
    Statement::CountIdentities {
        record_labels: record_labels(constructor),
        identifiers: constructor.identifiers.clone(),
    }
}

/// Materialise nodes from records, merged by identity when `merge` is set
pub fn create_nodes_by_record(constructor: &NodeConstructor, merge: bool) -> Statement {
    let event_label = Label::from(&constructor.event_label);
    let link = if constructor.infer_corr_from_event_record {
        EventLink::Corr {
            corr_type: constructor.corr_edge_type(),
            event_label,
        }
    } else if constructor.infer_observed {
        EventLink::Observed { event_label }
    } else {
        EventLink::None
    };

    Statement::CreateNodesByRecord(NodeByRecord {
        record_labels: record_labels(constructor),
        labels: constructor.label_set(),
        identifiers: constructor.identifiers.clone(),
        optional_attributes: constructor.optional_attributes.clone(),
        merge,
        link,
    })
}

pub fn reset_processed_records(record_labels: Vec<Label>) -> Statement {
    Statement::ResetProcessedRecords { record_labels }
}

pub fn merge_nodes_with_same_id(constructor: &NodeConstructor) -> Statement {
    Statement::MergeNodesWithSameId {
        labels: constructor.label_set(),
        identifiers: constructor.identifiers.clone(),
    }
}

pub fn reset_merged_nodes(constructor: &NodeConstructor) -> Statement {
    Statement::ResetMergedNodes {
        labels: constructor.label_set(),
    }
}

pub fn count_duplicate_identities(constructor: &NodeConstructor) -> Statement {
    Statement::CountDuplicateIdentities {
        labels: constructor.label_set(),
        identifiers: constructor.identifiers.clone(),
    }
}

/// `None` for constructors sourced from records
pub fn create_nodes_by_relation(constructor: &NodeConstructor) -> Option<Statement> {
    let NodeSource::Relation { relation_type, reify } = &constructor.source else {
        return None;
    };
    let corr_from_parents = constructor
        .infer_corr_from_reified_parents
        .then(|| (constructor.corr_edge_type(), Label::from(&constructor.event_label)));

    Some(Statement::CreateNodesByRelation(NodeByRelation {
        relation_type: EdgeType::from(relation_type),
        labels: constructor.label_set(),
        identifiers: constructor.identifiers.clone(),
        optional_attributes: constructor.optional_attributes.clone(),
        reify: *reify,
        corr_from_parents,
    }))
}

pub fn create_relations_by_record(relation: &RelationType, constructor: &RelationConstructor) -> Option<Statement> {
    let RelationSource::Record { record_labels } = &constructor.source else {
        return None;
    };
    Some(Statement::CreateRelationsByRecord(RelationByRecord {
        record_labels: record_labels.iter().map(Label::from).collect(),
        from_label: constructor.from_label(),
        to_label: constructor.to_label(),
        relation_type: relation.edge_type(),
    }))
}

pub fn create_relations_by_relations(relation: &RelationType, constructor: &RelationConstructor) -> Option<Statement> {
    let RelationSource::Relations { path } = &constructor.source else {
        return None;
    };
    let path = path
        .iter()
        .map(|hop| HopPattern {
            edge_type: hop.edge_type(),
            direction: hop.direction,
            label: hop.node_type.as_ref().map(Label::from),
        })
        .collect();
    Some(Statement::CreateRelationsByRelations(RelationByRelations {
        from_label: constructor.from_label(),
        to_label: constructor.to_label(),
        path,
        relation_type: relation.edge_type(),
    }))
}

pub fn infer_corr_from_reified_parents(
    relation: &RelationType,
    constructor: &RelationConstructor,
    event_label: &str,
    use_from: bool,
) -> Statement {
    Statement::InferCorrFromReifiedParents {
        relation_type: relation.edge_type(),
        corr_type: constructor.corr_edge_type(),
        event_label: Label::from(event_label),
        use_from,
    }
}

pub fn create_directly_follows(entity: &DfEntity, event_label: &str, config: &BuilderConfig) -> Statement {
    Statement::CreateDirectlyFollows {
        entity_type: entity.name.clone(),
        entity_label: entity.label.clone(),
        df_label: entity.df_label.clone(),
        event_label: Label::from(event_label),
        corr_type: EdgeType::new("CORR"),
        timestamp_attribute: config.timestamp_attribute.clone(),
    }
}

pub fn merge_duplicate_df(entity: &DfEntity) -> Statement {
    Statement::MergeDuplicateDf {
        entity_type: entity.name.clone(),
        df_label: entity.df_label.clone(),
    }
}

pub fn delete_parallel_df(entity: &DfEntity, parents: &[DfEntity]) -> Statement {
    Statement::DeleteParallelDf {
        entity_type: entity.name.clone(),
        df_label: entity.df_label.clone(),
        parents: parents
            .iter()
            .map(|p| (p.df_label.clone(), p.name.clone()))
            .collect(),
    }
}

/// Thresholds and options of one aggregation run
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationRequest {
    pub classifiers: Vec<String>,
    pub df_threshold: u64,
    pub relative_df_threshold: f64,
    pub exclude_self_loops: bool,
    /// Use `DF_C_<TYPE>` instead of `DF_C`
    pub include_label_in_dfc: bool,
}

impl Default for AggregationRequest {
    fn default() -> Self {
        Self {
            classifiers: Vec::new(),
            df_threshold: 0,
            relative_df_threshold: 0.0,
            exclude_self_loops: true,
            include_label_in_dfc: false,
        }
    }
}

pub fn aggregate_df(entity: &DfEntity, request: &AggregationRequest, config: &BuilderConfig) -> Statement {
    aggregate_df_with_policy(entity, request, config, config.aggregation_policy)
}

pub fn aggregate_df_with_policy(
    entity: &DfEntity,
    request: &AggregationRequest,
    config: &BuilderConfig,
    policy: AggregationPolicy,
) -> Statement {
    let class_type = (!request.classifiers.is_empty()).then(|| request.classifiers.join("_"));
    Statement::AggregateDf(DfAggregation {
        entity_type: entity.name.clone(),
        entity_label: entity.label.clone(),
        df_label: entity.df_label.clone(),
        dfc_label: dfc_label(&entity.name, request.include_label_in_dfc),
        event_label: Label::from(&config.event_label),
        class_label: Label::from(&config.class_label),
        corr_type: EdgeType::new("CORR"),
        class_type,
        df_threshold: request.df_threshold,
        relative_df_threshold: request.relative_df_threshold,
        exclude_self_loops: request.exclude_self_loops,
        policy,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{labels, Direction};
    use crate::model::SemanticHeader;

    fn header() -> SemanticHeader {
        SemanticHeader::from_json_str(
            r#"{"name": "library",
            "nodes": [
                {"name": "Book", "infer_df": true, "include_label_in_df": true, "constructors": [{
                    "identifiers": ["bookId"],
                    "optional_attributes": ["title"],
                    "source": {"kind": "record", "record_labels": ["EventRecord"]},
                    "infer_corr_from_event_record": true,
                    "infer_observed": true
                }]},
                {"name": "Activity", "constructors": [{
                    "identifiers": ["activity"],
                    "source": {"kind": "record", "record_labels": ["EventRecord"]},
                    "infer_observed": true
                }]},
                {"name": "Publisher"},
                {"name": "Authorship", "constructors": [{
                    "identifiers": ["bookId", "authorId"],
                    "source": {"kind": "relation", "relation_type": "WRITTEN_BY", "reify": true},
                    "infer_corr_from_reified_parents": true
                }]}
            ],
            "relations": [
                {"name": "WRITTEN_BY", "constructors": [{
                    "from_type": "Book", "to_type": "Publisher",
                    "source": {"kind": "record", "record_labels": ["BookRecord"]}
                }]},
                {"name": "PUBLISHED_BY", "constructors": [{
                    "from_type": "Book", "to_type": "Publisher",
                    "source": {"kind": "relations", "path": [
                        {"relation_type": "WRITTEN_BY", "direction": "outgoing", "node_type": "Publisher"}
                    ]}
                }]}
            ]}"#,
        )
        .unwrap()
    }

    #[test]
    fn test_corr_link_wins_over_observed() {
        let header = header();
        let book = &header.node_type("Book").unwrap().constructors[0];
        match create_nodes_by_record(book, true) {
            Statement::CreateNodesByRecord(n) => {
                assert!(n.merge);
                assert_eq!(n.record_labels, labels(["EventRecord"]));
                assert_eq!(
                    n.link,
                    EventLink::Corr { corr_type: EdgeType::new("CORR"), event_label: Label::new("Event") }
                );
            }
            other => panic!("unexpected statement {:?}", other),
        }

        let activity = &header.node_type("Activity").unwrap().constructors[0];
        match create_nodes_by_record(activity, false) {
            Statement::CreateNodesByRecord(n) => {
                assert_eq!(n.link, EventLink::Observed { event_label: Label::new("Event") })
            }
            other => panic!("unexpected statement {:?}", other),
        }
    }

    #[test]
    fn test_node_by_relation_template() {
        let header = header();
        let authorship = &header.node_type("Authorship").unwrap().constructors[0];
        let Some(Statement::CreateNodesByRelation(n)) = create_nodes_by_relation(authorship) else {
            panic!("expected a node-by-relation statement");
        };
        assert_eq!(n.relation_type, EdgeType::new("WRITTEN_BY"));
        assert!(n.reify);
        assert_eq!(n.corr_from_parents, Some((EdgeType::new("CORR"), Label::new("Event"))));

        let book = &header.node_type("Book").unwrap().constructors[0];
        assert!(create_nodes_by_relation(book).is_none());
    }

    #[test]
    fn test_relation_templates_match_source_kind() {
        let header = header();
        let written = header.relation_type("WRITTEN_BY").unwrap();
        let published = header.relation_type("PUBLISHED_BY").unwrap();

        assert!(create_relations_by_record(written, &written.constructors[0]).is_some());
        assert!(create_relations_by_relations(written, &written.constructors[0]).is_none());

        let Some(Statement::CreateRelationsByRelations(r)) =
            create_relations_by_relations(published, &published.constructors[0])
        else {
            panic!("expected a relation-chain statement");
        };
        assert_eq!(r.path[0].direction, Direction::Outgoing);
        assert_eq!(r.path[0].label, Some(Label::new("Publisher")));
        assert_eq!(r.relation_type, EdgeType::new("PUBLISHED_BY"));
    }

    #[test]
    fn test_aggregation_template() {
        let header = header();
        let book = header.df_entity("Book").unwrap();
        let request = AggregationRequest {
            classifiers: vec!["activity".into(), "lifecycle".into()],
            df_threshold: 2,
            relative_df_threshold: 1.5,
            include_label_in_dfc: true,
            ..Default::default()
        };
        let Statement::AggregateDf(agg) = aggregate_df(&book, &request, &BuilderConfig::default()) else {
            panic!("expected aggregation");
        };
        assert_eq!(agg.df_label, EdgeType::new("DF_BOOK"));
        assert_eq!(agg.dfc_label, EdgeType::new("DF_C_BOOK"));
        assert_eq!(agg.class_type.as_deref(), Some("activity_lifecycle"));
        assert_eq!(agg.class_label, Label::new("Activity"));
        assert!(agg.exclude_self_loops);
        assert!(!agg.is_threshold_free());
        assert_eq!(agg.policy, AggregationPolicy::CreateOnly);
    }
}
