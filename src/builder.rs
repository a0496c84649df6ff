//! Construction orchestrator
//!
//! Turns a semantic header into the ordered sequence of statements that
//! builds an event knowledge graph. Phases run strictly one after another:
//!
//! 1. nodes from records
//! 2. nodes from relations
//! 3. relations from records
//! 4. relations from relations
//! 5. event-level DF edges, then DF deduplication
//!
//! Every statement is an upsert or create-if-absent guarded by transient
//! markers, so a failed build can be re-run from the top.

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::BuilderConfig;
use crate::discovery::DfAggregator;
use crate::error::{EkgError, EkgResult};
use crate::gateway::{first_count, GraphGateway, Row};
use crate::model::{DfEntity, NodeConstructor, NodeSource, RelationConstructor, RelationType, SemanticHeader};
use crate::query::templates;
use crate::query::Statement;

/// How the nodes of one record constructor are materialised
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeStrategy {
    /// Upsert by identity tuple while creating
    MergeFirst,
    /// One node per record, then collapse nodes sharing an identity
    CreateThenMerge,
    /// One node per record, never merged (events, entity attributes)
    CreateOnly,
}

impl NodeStrategy {
    fn verb(self) -> &'static str {
        match self {
            NodeStrategy::MergeFirst => "merged",
            NodeStrategy::CreateThenMerge | NodeStrategy::CreateOnly => "created",
        }
    }
}

/// Pick the materialisation path from the number of distinct identity tuples.
///
/// Raw record count plays no part: 1500 records holding 800 distinct ids
/// are merged first under the default threshold of 1000.
pub fn decide_strategy(num_ids: u64, merge_first_threshold: usize, constructor: &NodeConstructor) -> NodeStrategy {
    if constructor.is_never_merged() {
        NodeStrategy::CreateOnly
    } else if num_ids < merge_first_threshold as u64 {
        NodeStrategy::MergeFirst
    } else {
        NodeStrategy::CreateThenMerge
    }
}

/// Per-label and per-relationship-type counts of the store
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSummary {
    pub labels: BTreeMap<String, u64>,
    pub relationships: BTreeMap<String, u64>,
}

impl StoreSummary {
    fn from_rows(rows: &[Row]) -> Self {
        let mut summary = StoreSummary::default();
        for row in rows {
            let (Some(kind), Some(name), Some(count)) = (
                row.get("kind").and_then(|v| v.as_string()),
                row.get("name").and_then(|v| v.as_string()),
                row.get("count").and_then(|v| v.as_integer()),
            ) else {
                continue;
            };
            let target = match kind {
                "label" => &mut summary.labels,
                _ => &mut summary.relationships,
            };
            target.insert(name.to_string(), count.max(0) as u64);
        }
        summary
    }
}

/// Owns the semantic header and the gateway for the lifetime of a build
pub struct EkgBuilder<G: GraphGateway> {
    header: Arc<SemanticHeader>,
    gateway: Arc<G>,
    config: BuilderConfig,
}

impl<G: GraphGateway> EkgBuilder<G> {
    pub fn new(header: Arc<SemanticHeader>, gateway: Arc<G>, config: BuilderConfig) -> Self {
        Self { header, gateway, config }
    }

    pub fn header(&self) -> &SemanticHeader {
        &self.header
    }

    pub fn gateway(&self) -> &Arc<G> {
        &self.gateway
    }

    pub fn config(&self) -> &BuilderConfig {
        &self.config
    }

    /// Aggregator sharing this builder's header, gateway and configuration
    pub fn aggregator(&self) -> DfAggregator<G> {
        DfAggregator::new(Arc::clone(&self.header), Arc::clone(&self.gateway), self.config.clone())
    }

    async fn run(&self, statement: Statement) -> EkgResult<Vec<Row>> {
        self.gateway.execute(&statement).await
    }

    /// Run every construction phase in order for every declared type
    pub async fn build(&self) -> EkgResult<()> {
        self.build_selected(&[]).await
    }

    /// Run every construction phase in order. An empty type filter selects
    /// every declared type; DF deduplication always covers all types.
    pub async fn build_selected(&self, types: &[String]) -> EkgResult<()> {
        self.create_nodes_by_records(types).await?;
        self.create_nodes_by_relations(types).await?;
        self.create_relations_using_records(types).await?;
        self.create_relations_using_relations(types).await?;
        self.create_df_edges(types, &self.config.event_label).await?;
        self.merge_duplicate_df().await?;
        self.delete_parallel_dfs_derived().await?;
        info!("Event knowledge graph '{}' built", self.header.name);
        Ok(())
    }

    /// Materialise the nodes of every record constructor of `types`
    pub async fn create_nodes_by_records(&self, types: &[String]) -> EkgResult<()> {
        for (node_type, constructor) in self.header.node_constructors_from_records(types) {
            let record_labels = constructor.record_labels().unwrap_or_default();
            let num_ids = first_count(&self.run(templates::count_identities(constructor)).await?, "num_ids");
            let strategy = decide_strategy(num_ids, self.config.merge_first_threshold, constructor);
            debug!(
                "Node type {} has {} distinct identities, using {:?}",
                node_type.name, num_ids, strategy
            );

            match strategy {
                NodeStrategy::MergeFirst => {
                    self.run(templates::create_nodes_by_record(constructor, true)).await?;
                }
                NodeStrategy::CreateOnly => {
                    self.run(templates::create_nodes_by_record(constructor, false)).await?;
                }
                NodeStrategy::CreateThenMerge => {
                    self.run(templates::create_nodes_by_record(constructor, false)).await?;
                    self.merge_nodes_with_same_id(constructor).await?;
                }
            }
            self.run(templates::reset_processed_records(record_labels.clone())).await?;

            let sources: Vec<&str> = record_labels.iter().map(|l| l.as_str()).collect();
            info!(
                "Node {} using (:{}) {}",
                constructor.pattern(),
                sources.join(":"),
                strategy.verb()
            );
        }
        Ok(())
    }

    async fn merge_nodes_with_same_id(&self, constructor: &NodeConstructor) -> EkgResult<()> {
        let merged = first_count(&self.run(templates::merge_nodes_with_same_id(constructor)).await?, "merged");
        self.run(templates::reset_merged_nodes(constructor)).await?;
        debug!("Collapsed {} duplicate nodes of {}", merged, constructor.pattern());

        if self.config.verify_merge_invariant {
            let rows = self.run(templates::count_duplicate_identities(constructor)).await?;
            let duplicates = first_count(&rows, "duplicates");
            if duplicates > 0 {
                return Err(EkgError::InvariantViolation(format!(
                    "{} identities of {} still have more than one node after merging",
                    duplicates,
                    constructor.pattern()
                )));
            }
        }
        Ok(())
    }

    /// Materialise the nodes of every relation-sourced constructor of `types`
    pub async fn create_nodes_by_relations(&self, types: &[String]) -> EkgResult<()> {
        for (_, constructor) in self.header.node_constructors_from_relations(types) {
            let Some(statement) = templates::create_nodes_by_relation(constructor) else {
                continue;
            };
            let rows = self.run(statement).await?;
            if let NodeSource::Relation { relation_type, .. } = &constructor.source {
                info!(
                    "Node {} using [:{}] merged ({} new)",
                    constructor.pattern(),
                    relation_type,
                    first_count(&rows, "created")
                );
            }
        }
        Ok(())
    }

    /// Build every record-sourced relation of `types`
    pub async fn create_relations_using_records(&self, types: &[String]) -> EkgResult<()> {
        for (relation, constructor) in self.header.relation_constructors_from_records(types) {
            let Some(statement) = templates::create_relations_by_record(relation, constructor) else {
                continue;
            };
            let record_labels = match &statement {
                Statement::CreateRelationsByRecord(r) => r.record_labels.clone(),
                _ => Vec::new(),
            };
            self.run(statement).await?;
            self.run(templates::reset_processed_records(record_labels)).await?;
            if constructor.infer_corr_from_reified_parents {
                self.infer_corr_from_reified_parents(relation, constructor).await?;
            }
            info!("Relation {} created", constructor.pattern(&relation.name));
        }
        Ok(())
    }

    /// Build every relation of `types` that shortcuts a chain of existing relations
    pub async fn create_relations_using_relations(&self, types: &[String]) -> EkgResult<()> {
        for (relation, constructor) in self.header.relation_constructors_from_relations(types) {
            let Some(statement) = templates::create_relations_by_relations(relation, constructor) else {
                continue;
            };
            self.run(statement).await?;
            if constructor.infer_corr_from_reified_parents {
                self.infer_corr_from_reified_parents(relation, constructor).await?;
            }
            info!("Relation {} created", constructor.pattern(&relation.name));
        }
        Ok(())
    }

    /// Correlation is inferred from both endpoints of the relation in turn
    async fn infer_corr_from_reified_parents(
        &self,
        relation: &RelationType,
        constructor: &RelationConstructor,
    ) -> EkgResult<()> {
        for use_from in [true, false] {
            let statement =
                templates::infer_corr_from_reified_parents(relation, constructor, &self.config.event_label, use_from);
            let created = first_count(&self.run(statement).await?, "created");
            debug!(
                "Inferred {} correlations for [:{}] (use_from={})",
                created, relation.name, use_from
            );
        }
        Ok(())
    }

    /// Entities selected by `types` (all when empty) that infer DF edges
    fn df_entities(&self, types: &[String]) -> Vec<DfEntity> {
        self.header
            .df_entities()
            .into_iter()
            .filter(|e| types.is_empty() || types.contains(&e.name))
            .filter(|e| e.infer_df)
            .collect()
    }

    /// Chain the events of every entity of `types` by timestamp
    pub async fn create_df_edges(&self, types: &[String], event_label: &str) -> EkgResult<()> {
        for entity in self.df_entities(types) {
            let statement = templates::create_directly_follows(&entity, event_label, &self.config);
            let created = first_count(&self.run(statement).await?, "created");
            info!("DF edges for ({}) created: {}", entity.name, created);
        }
        Ok(())
    }

    /// Collapse parallel DF edges of entities flagged `merge_duplicate_df`
    pub async fn merge_duplicate_df(&self) -> EkgResult<()> {
        for entity in self.df_entities(&[]).into_iter().filter(|e| e.merge_duplicate_df) {
            let merged = first_count(&self.run(templates::merge_duplicate_df(&entity)).await?, "merged");
            info!("Duplicate DF edges for ({}) merged: {}", entity.name, merged);
        }
        Ok(())
    }

    /// Drop DF edges of relation-derived node types that run parallel to a
    /// DF edge of one of the relation's endpoint types
    pub async fn delete_parallel_dfs_derived(&self) -> EkgResult<()> {
        for entity in self.df_entities(&[]).into_iter().filter(|e| e.delete_parallel_df) {
            let parents = self.parent_entities(&entity.name);
            if parents.is_empty() {
                continue;
            }
            let deleted = first_count(
                &self.run(templates::delete_parallel_df(&entity, &parents)).await?,
                "deleted",
            );
            info!("Parallel DF edges for ({}) deleted: {}", entity.name, deleted);
        }
        Ok(())
    }

    /// Endpoint entity types of the relations a node type is built from
    fn parent_entities(&self, node_type: &str) -> Vec<DfEntity> {
        let Some(node) = self.header.node_type(node_type) else {
            return Vec::new();
        };
        let mut parents: Vec<DfEntity> = Vec::new();
        for constructor in &node.constructors {
            let NodeSource::Relation { relation_type, .. } = &constructor.source else {
                continue;
            };
            let Some(relation) = self.header.relation_type(relation_type) else {
                continue;
            };
            for rc in &relation.constructors {
                for endpoint in [&rc.from_type, &rc.to_type] {
                    if parents.iter().any(|p| &p.name == endpoint) {
                        continue;
                    }
                    if let Some(entity) = self.header.df_entity(endpoint) {
                        parents.push(entity);
                    }
                }
            }
        }
        parents
    }

    pub async fn statistics(&self) -> EkgResult<StoreSummary> {
        let rows = self.run(Statement::Statistics).await?;
        Ok(StoreSummary::from_rows(&rows))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::row;
    use crate::graph::PropertyValue;

    fn constructor(labels: &[&str]) -> NodeConstructor {
        serde_json::from_value(serde_json::json!({
            "labels": labels,
            "identifiers": ["orderId"],
            "source": {"kind": "record", "record_labels": ["OrderRecord"]}
        }))
        .unwrap()
    }

    #[test]
    fn test_strategy_depends_on_distinct_ids() {
        let order = constructor(&["Order"]);
        assert_eq!(decide_strategy(800, 1000, &order), NodeStrategy::MergeFirst);
        assert_eq!(decide_strategy(999, 1000, &order), NodeStrategy::MergeFirst);
        assert_eq!(decide_strategy(1000, 1000, &order), NodeStrategy::CreateThenMerge);
        assert_eq!(decide_strategy(1500, 1000, &order), NodeStrategy::CreateThenMerge);
    }

    #[test]
    fn test_events_and_attributes_are_never_merged() {
        assert_eq!(decide_strategy(3, 1000, &constructor(&["Event"])), NodeStrategy::CreateOnly);
        assert_eq!(
            decide_strategy(5000, 1000, &constructor(&["Colour", "EntityAttribute"])),
            NodeStrategy::CreateOnly
        );
    }

    #[test]
    fn test_only_merge_first_reports_merged() {
        assert_eq!(NodeStrategy::MergeFirst.verb(), "merged");
        assert_eq!(NodeStrategy::CreateThenMerge.verb(), "created");
        assert_eq!(NodeStrategy::CreateOnly.verb(), "created");
    }

    #[test]
    fn test_summary_from_rows() {
        let rows = vec![
            row([("kind", PropertyValue::from("label")), ("name", "Event".into()), ("count", 4i64.into())]),
            row([("kind", PropertyValue::from("relationship")), ("name", "DF".into()), ("count", 3i64.into())]),
        ];
        let summary = StoreSummary::from_rows(&rows);
        assert_eq!(summary.labels.get("Event"), Some(&4));
        assert_eq!(summary.relationships.get("DF"), Some(&3));
    }
}
