//! Statement execution over the in-memory graph store
//!
//! Each statement runs to completion under the caller's write lock, so the
//! transient markers it sets are only observable between statements.

use indexmap::IndexMap;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

use super::{row, Row};
use crate::config::AggregationPolicy;
use crate::discovery::{count_class_pairs, select_class_edges, DfThresholds};
use crate::error::EkgResult;
use crate::graph::{Direction, EdgeId, EdgeType, GraphStore, Label, Node, NodeId, PropertyMap, PropertyValue};
use crate::query::statement::*;

/// Executes statements against a borrowed store
pub struct StatementExecutor<'a> {
    store: &'a mut GraphStore,
}

/// Identity tuple of a node or record
type Identity = Vec<PropertyValue>;

fn has_labels(store: &GraphStore, id: NodeId, labels: &[Label]) -> bool {
    store.get_node(id).is_some_and(|n| n.has_all_labels(labels))
}

/// Copy of the non-null optional attributes present on `sources`, first source wins
fn optional_values(attributes: &[String], sources: &[&Node]) -> Vec<(String, PropertyValue)> {
    attributes
        .iter()
        .filter_map(|attr| {
            sources
                .iter()
                .find_map(|n| n.get_property(attr).filter(|v| !v.is_null()))
                .map(|v| (attr.clone(), v.clone()))
        })
        .collect()
}

fn df_properties(entity_type: &str, entity_id: Option<PropertyValue>) -> PropertyMap {
    let mut props = PropertyMap::new();
    props.insert(ENTITY_TYPE_KEY.to_string(), PropertyValue::from(entity_type));
    if let Some(id) = entity_id {
        props.insert(ENTITY_ID_KEY.to_string(), id);
    }
    props
}

fn entity_type_of(store: &GraphStore, edge_id: EdgeId) -> Option<&str> {
    store
        .get_edge(edge_id)
        .and_then(|e| e.get_property(ENTITY_TYPE_KEY))
        .and_then(|v| v.as_string())
}

impl<'a> StatementExecutor<'a> {
    pub fn new(store: &'a mut GraphStore) -> Self {
        Self { store }
    }

    /// Execute one statement and return its rows
    pub fn execute(&mut self, statement: &Statement) -> EkgResult<Vec<Row>> {
        debug!("Executing {} statement", statement.kind());
        match statement {
            Statement::CountIdentities { record_labels, identifiers } => {
                let ids: HashSet<Identity> = self
                    .store
                    .nodes_with_labels(record_labels)
                    .into_iter()
                    .filter_map(|record| record.identity(identifiers))
                    .collect();
                Ok(vec![row([("num_ids", ids.len() as u64)])])
            }
            Statement::CreateNodesByRecord(n) => self.create_nodes_by_record(n),
            Statement::ResetProcessedRecords { record_labels } => {
                let reset = self.remove_marker(record_labels, PROCESSED_MARKER)?;
                Ok(vec![row([("reset", reset)])])
            }
            Statement::MergeNodesWithSameId { labels, identifiers } => self.merge_nodes_with_same_id(labels, identifiers),
            Statement::ResetMergedNodes { labels } => {
                let reset = self.remove_marker(labels, MERGED_MARKER)?;
                Ok(vec![row([("reset", reset)])])
            }
            Statement::CountDuplicateIdentities { labels, identifiers } => {
                let duplicates = self
                    .identity_groups(labels, identifiers)
                    .values()
                    .filter(|ids| ids.len() > 1)
                    .count();
                Ok(vec![row([("duplicates", duplicates as u64)])])
            }
            Statement::CreateNodesByRelation(n) => self.create_nodes_by_relation(n),
            Statement::CreateRelationsByRecord(r) => self.create_relations_by_record(r),
            Statement::CreateRelationsByRelations(r) => self.create_relations_by_relations(r),
            Statement::InferCorrFromReifiedParents { relation_type, corr_type, event_label, use_from } => {
                self.infer_corr_from_reified_parents(relation_type, corr_type, event_label, *use_from)
            }
            Statement::CreateDirectlyFollows {
                entity_type,
                entity_label,
                df_label,
                event_label,
                corr_type,
                timestamp_attribute,
            } => self.create_directly_follows(entity_type, entity_label, df_label, event_label, corr_type, timestamp_attribute),
            Statement::MergeDuplicateDf { entity_type, df_label } => self.merge_duplicate_df(entity_type, df_label),
            Statement::DeleteParallelDf { entity_type, df_label, parents } => {
                self.delete_parallel_df(entity_type, df_label, parents)
            }
            Statement::AggregateDf(agg) => self.aggregate_df(agg),
            Statement::Statistics => {
                let stats = self.store.statistics();
                let labels = stats
                    .label_counts
                    .into_iter()
                    .map(|(name, count)| row([("kind", PropertyValue::from("label")), ("name", name.into()), ("count", (count as u64).into())]));
                let types = stats
                    .edge_type_counts
                    .into_iter()
                    .map(|(name, count)| row([("kind", PropertyValue::from("relationship")), ("name", name.into()), ("count", (count as u64).into())]));
                Ok(labels.chain(types).collect())
            }
        }
    }

    /// Nodes with `labels` grouped by identity, ids ascending within a group
    fn identity_groups(&self, labels: &[Label], identifiers: &[String]) -> IndexMap<Identity, Vec<NodeId>> {
        let mut groups: IndexMap<Identity, Vec<NodeId>> = IndexMap::new();
        for node in self.store.nodes_with_labels(labels) {
            if let Some(identity) = node.identity(identifiers) {
                groups.entry(identity).or_default().push(node.id);
            }
        }
        groups
    }

    /// First existing node per identity, for upserts
    fn identity_index(&self, labels: &[Label], identifiers: &[String]) -> HashMap<Identity, NodeId> {
        self.identity_groups(labels, identifiers)
            .into_iter()
            .filter_map(|(identity, ids)| ids.first().map(|&id| (identity, id)))
            .collect()
    }

    fn remove_marker(&mut self, labels: &[Label], marker: &str) -> EkgResult<u64> {
        let mut reset = 0;
        for id in self.store.node_ids_with_labels(labels) {
            if self.store.remove_node_property(id, marker)?.is_some() {
                reset += 1;
            }
        }
        Ok(reset)
    }

    /// Nodes with PREVALENCE edges to `record` carrying `labels`
    fn prevalent_nodes(&self, record: NodeId, labels: &[Label]) -> Vec<NodeId> {
        let prevalence = EdgeType::new(PREVALENCE);
        let ids: BTreeSet<NodeId> = self
            .store
            .incoming_of_type(record, &prevalence)
            .map(|e| e.source)
            .filter(|&id| has_labels(self.store, id, labels))
            .collect();
        ids.into_iter().collect()
    }

    /// Find-or-create a node by identity. Returns the id and whether it is new.
    fn upsert_node(
        &mut self,
        index: &mut HashMap<Identity, NodeId>,
        labels: &[Label],
        identifiers: &[String],
        identity: Identity,
    ) -> (NodeId, bool) {
        if let Some(&id) = index.get(&identity) {
            return (id, false);
        }
        let id = self.create_identified_node(labels, identifiers, &identity);
        index.insert(identity, id);
        (id, true)
    }

    fn create_identified_node(&mut self, labels: &[Label], identifiers: &[String], identity: &[PropertyValue]) -> NodeId {
        let props: PropertyMap = identifiers
            .iter()
            .cloned()
            .zip(identity.iter().cloned())
            .collect();
        self.store.create_node_with_properties(labels.to_vec(), props)
    }

    fn set_missing(&mut self, node_id: NodeId, values: Vec<(String, PropertyValue)>) {
        if let Some(node) = self.store.get_node_mut(node_id) {
            for (attr, value) in values {
                if !node.has_property(&attr) {
                    node.set_property(attr, value);
                }
            }
        }
    }

    fn create_nodes_by_record(&mut self, n: &NodeByRecord) -> EkgResult<Vec<Row>> {
        let mut index = if n.merge {
            self.identity_index(&n.labels, &n.identifiers)
        } else {
            HashMap::new()
        };
        let mut created: HashSet<NodeId> = HashSet::new();
        let mut matched: HashSet<NodeId> = HashSet::new();

        for record_id in self.store.node_ids_with_labels(&n.record_labels) {
            let Some(record) = self.store.get_node(record_id) else {
                continue;
            };
            if record.flag(PROCESSED_MARKER) {
                continue;
            }
            let Some(identity) = record.identity(&n.identifiers) else {
                continue;
            };
            let optional = optional_values(&n.optional_attributes, &[record]);

            let node_id = if n.merge {
                let (id, is_new) = self.upsert_node(&mut index, &n.labels, &n.identifiers, identity);
                if is_new {
                    created.insert(id);
                } else if !created.contains(&id) {
                    matched.insert(id);
                }
                id
            } else {
                // Records that already produced a node of these labels are skipped
                if !self.prevalent_nodes(record_id, &n.labels).is_empty() {
                    continue;
                }
                let id = self.create_identified_node(&n.labels, &n.identifiers, &identity);
                created.insert(id);
                id
            };

            self.set_missing(node_id, optional);
            self.store.merge_edge(node_id, record_id, PREVALENCE, PropertyMap::new())?;
            self.store.set_node_property(record_id, PROCESSED_MARKER, true)?;
            self.link_events(node_id, record_id, &n.link)?;
        }

        Ok(vec![row([("created", created.len() as u64), ("matched", matched.len() as u64)])])
    }

    fn link_events(&mut self, node_id: NodeId, record_id: NodeId, link: &EventLink) -> EkgResult<()> {
        let event_label = match link {
            EventLink::None => return Ok(()),
            EventLink::Corr { event_label, .. } | EventLink::Observed { event_label } => event_label,
        };
        let events: Vec<NodeId> = self
            .prevalent_nodes(record_id, std::slice::from_ref(event_label))
            .into_iter()
            .filter(|&e| e != node_id)
            .collect();
        for event in events {
            match link {
                EventLink::Corr { corr_type, .. } => {
                    self.store.merge_edge(event, node_id, corr_type.clone(), PropertyMap::new())?;
                }
                EventLink::Observed { .. } => {
                    self.store.merge_edge(node_id, event, OBSERVED, PropertyMap::new())?;
                }
                EventLink::None => {}
            }
        }
        Ok(())
    }

    fn merge_nodes_with_same_id(&mut self, labels: &[Label], identifiers: &[String]) -> EkgResult<Vec<Row>> {
        let mut merged = 0u64;
        for (_, ids) in self.identity_groups(labels, identifiers) {
            let Some((&survivor, duplicates)) = ids.split_first() else {
                continue;
            };
            if duplicates.is_empty() {
                continue;
            }
            self.store.set_node_property(survivor, MERGED_MARKER, true)?;
            for &duplicate in duplicates {
                self.store.merge_nodes(survivor, duplicate)?;
                merged += 1;
            }
        }
        Ok(vec![row([("merged", merged)])])
    }

    fn create_nodes_by_relation(&mut self, n: &NodeByRelation) -> EkgResult<Vec<Row>> {
        let endpoints: Vec<(NodeId, NodeId)> = self
            .store
            .get_edges_by_type(&n.relation_type)
            .into_iter()
            .map(|e| (e.source, e.target))
            .collect();
        let mut index = self.identity_index(&n.labels, &n.identifiers);
        let mut created: HashSet<NodeId> = HashSet::new();
        let mut matched: HashSet<NodeId> = HashSet::new();
        let reified = EdgeType::new(REIFIED);

        for (from, to) in endpoints {
            let (Some(from_node), Some(to_node)) = (self.store.get_node(from), self.store.get_node(to)) else {
                continue;
            };
            // Each identifier is read from the from-endpoint, then the to-endpoint
            let identity: Option<Identity> = n
                .identifiers
                .iter()
                .map(|attr| {
                    [from_node, to_node]
                        .iter()
                        .find_map(|node| node.get_property(attr).filter(|v| v.is_usable_identifier()))
                        .cloned()
                })
                .collect();
            let Some(identity) = identity else {
                continue;
            };
            let optional = optional_values(&n.optional_attributes, &[from_node, to_node]);

            let (node_id, is_new) = self.upsert_node(&mut index, &n.labels, &n.identifiers, identity);
            if is_new {
                created.insert(node_id);
            } else if !created.contains(&node_id) {
                matched.insert(node_id);
            }
            self.set_missing(node_id, optional);

            if n.reify {
                self.store.merge_edge(node_id, from, reified.clone(), PropertyMap::new())?;
                self.store.merge_edge(node_id, to, reified.clone(), PropertyMap::new())?;
            }
            if let Some((corr_type, event_label)) = &n.corr_from_parents {
                let mut events = BTreeSet::new();
                for parent in [from, to] {
                    events.extend(
                        self.store
                            .incoming_of_type(parent, corr_type)
                            .map(|e| e.source)
                            .filter(|&e| has_labels(self.store, e, std::slice::from_ref(event_label))),
                    );
                }
                for event in events {
                    self.store.merge_edge(event, node_id, corr_type.clone(), PropertyMap::new())?;
                }
            }
        }

        Ok(vec![row([("created", created.len() as u64), ("matched", matched.len() as u64)])])
    }

    fn create_relations_by_record(&mut self, r: &RelationByRecord) -> EkgResult<Vec<Row>> {
        let mut created = 0u64;
        for record_id in self.store.node_ids_with_labels(&r.record_labels) {
            if self.store.get_node(record_id).map_or(true, |rec| rec.flag(PROCESSED_MARKER)) {
                continue;
            }
            let froms = self.prevalent_nodes(record_id, std::slice::from_ref(&r.from_label));
            let tos = self.prevalent_nodes(record_id, std::slice::from_ref(&r.to_label));
            for &from in &froms {
                for &to in tos.iter().filter(|&&t| t != from) {
                    let (_, is_new) = self
                        .store
                        .merge_edge(from, to, r.relation_type.clone(), PropertyMap::new())?;
                    if is_new {
                        created += 1;
                    }
                }
            }
            self.store.set_node_property(record_id, PROCESSED_MARKER, true)?;
        }
        Ok(vec![row([("created", created)])])
    }

    fn create_relations_by_relations(&mut self, r: &RelationByRelations) -> EkgResult<Vec<Row>> {
        let mut pairs: Vec<(NodeId, NodeId)> = Vec::new();
        for from in self.store.node_ids_with_labels(std::slice::from_ref(&r.from_label)) {
            let mut frontier: BTreeSet<NodeId> = BTreeSet::from([from]);
            for hop in &r.path {
                let mut next = BTreeSet::new();
                for &node in &frontier {
                    let reached: Vec<NodeId> = match hop.direction {
                        Direction::Outgoing => self.store.outgoing_of_type(node, &hop.edge_type).map(|e| e.target).collect(),
                        Direction::Incoming => self.store.incoming_of_type(node, &hop.edge_type).map(|e| e.source).collect(),
                    };
                    next.extend(reached.into_iter().filter(|&id| match &hop.label {
                        Some(label) => has_labels(self.store, id, std::slice::from_ref(label)),
                        None => true,
                    }));
                }
                frontier = next;
            }
            pairs.extend(
                frontier
                    .into_iter()
                    .filter(|&to| to != from && has_labels(self.store, to, std::slice::from_ref(&r.to_label)))
                    .map(|to| (from, to)),
            );
        }

        let mut created = 0u64;
        for (from, to) in pairs {
            let (_, is_new) = self
                .store
                .merge_edge(from, to, r.relation_type.clone(), PropertyMap::new())?;
            if is_new {
                created += 1;
            }
        }
        Ok(vec![row([("created", created)])])
    }

    fn infer_corr_from_reified_parents(
        &mut self,
        relation_type: &EdgeType,
        corr_type: &EdgeType,
        event_label: &Label,
        use_from: bool,
    ) -> EkgResult<Vec<Row>> {
        let reified = EdgeType::new(REIFIED);
        let mut links: BTreeSet<(NodeId, NodeId)> = BTreeSet::new();
        for edge in self.store.get_edges_by_type(relation_type) {
            let (reference, other) = if use_from {
                (edge.source, edge.target)
            } else {
                (edge.target, edge.source)
            };
            if self.store.outgoing_of_type(reference, &reified).next().is_none() {
                continue;
            }
            links.extend(
                self.store
                    .incoming_of_type(other, corr_type)
                    .map(|e| e.source)
                    .filter(|&e| has_labels(self.store, e, std::slice::from_ref(event_label)))
                    .map(|e| (e, reference)),
            );
        }

        let mut created = 0u64;
        for (event, reference) in links {
            let (_, is_new) = self
                .store
                .merge_edge(event, reference, corr_type.clone(), PropertyMap::new())?;
            if is_new {
                created += 1;
            }
        }
        Ok(vec![row([("created", created)])])
    }

    fn create_directly_follows(
        &mut self,
        entity_type: &str,
        entity_label: &Label,
        df_label: &EdgeType,
        event_label: &Label,
        corr_type: &EdgeType,
        timestamp_attribute: &str,
    ) -> EkgResult<Vec<Row>> {
        let null = PropertyValue::Null;
        let mut steps: Vec<(NodeId, NodeId, NodeId)> = Vec::new();
        for entity in self.store.node_ids_with_labels(std::slice::from_ref(entity_label)) {
            let ids: BTreeSet<NodeId> = self
                .store
                .incoming_of_type(entity, corr_type)
                .map(|e| e.source)
                .collect();
            let mut events: Vec<&Node> = ids
                .into_iter()
                .filter_map(|id| self.store.get_node(id))
                .filter(|n| n.has_label(event_label))
                .collect();
            events.sort_by(|a, b| {
                let ta = a.get_property(timestamp_attribute).unwrap_or(&null);
                let tb = b.get_property(timestamp_attribute).unwrap_or(&null);
                ta.sort_cmp(tb).then(a.id.cmp(&b.id))
            });
            steps.extend(events.windows(2).map(|w| (w[0].id, w[1].id, entity)));
        }

        let mut created = 0u64;
        for (first, second, entity) in steps {
            let props = df_properties(entity_type, Some(PropertyValue::from(entity.as_u64())));
            let (edge_id, is_new) = self.store.merge_edge(first, second, df_label.clone(), props)?;
            if let Some(edge) = self.store.get_edge_mut(edge_id) {
                edge.set_property("type", DF_TYPE);
            }
            if is_new {
                created += 1;
            }
        }
        Ok(vec![row([("created", created)])])
    }

    fn merge_duplicate_df(&mut self, entity_type: &str, df_label: &EdgeType) -> EkgResult<Vec<Row>> {
        let mut groups: IndexMap<(NodeId, NodeId), Vec<EdgeId>> = IndexMap::new();
        for edge in self.store.get_edges_by_type(df_label) {
            if edge.get_property(ENTITY_TYPE_KEY).and_then(|v| v.as_string()) == Some(entity_type) {
                groups.entry((edge.source, edge.target)).or_default().push(edge.id);
            }
        }

        let mut merged = 0u64;
        for ((first, second), edges) in groups {
            if edges.len() < 2 {
                continue;
            }
            let entity_id = self
                .store
                .get_edge(edges[0])
                .and_then(|e| e.get_property(ENTITY_ID_KEY))
                .cloned();
            for &edge_id in &edges {
                self.store.delete_edge(edge_id)?;
            }
            let mut props = df_properties(entity_type, entity_id);
            props.insert("count".to_string(), PropertyValue::from(edges.len() as u64));
            props.insert("type".to_string(), PropertyValue::from(DF_TYPE));
            self.store.create_edge_with_properties(first, second, df_label.clone(), props)?;
            merged += 1;
        }
        Ok(vec![row([("merged", merged)])])
    }

    fn delete_parallel_df(
        &mut self,
        entity_type: &str,
        df_label: &EdgeType,
        parents: &[(EdgeType, String)],
    ) -> EkgResult<Vec<Row>> {
        let store = &*self.store;
        let parallel: Vec<_> = store
            .get_edges_by_type(df_label)
            .into_iter()
            .filter(|e| entity_type_of(store, e.id) == Some(entity_type))
            .filter(|e| {
                parents.iter().any(|(parent_label, parent_type)| {
                    store.outgoing_of_type(e.source, parent_label).any(|p| {
                        p.id != e.id && p.target == e.target && entity_type_of(store, p.id) == Some(parent_type.as_str())
                    })
                })
            })
            .map(|e| e.id)
            .collect();

        for &edge_id in &parallel {
            self.store.delete_edge(edge_id)?;
        }
        Ok(vec![row([("deleted", parallel.len() as u64)])])
    }

    /// Classes observing `event` that carry the class label and class type
    fn classes_of(&self, event: NodeId, agg: &DfAggregation) -> BTreeSet<NodeId> {
        let observed = EdgeType::new(OBSERVED);
        let class_type = agg.class_type.as_ref().map(|t| PropertyValue::from(t.as_str()));
        self.store
            .incoming_of_type(event, &observed)
            .filter_map(|e| self.store.get_node(e.source))
            .filter(|c| c.has_label(&agg.class_label))
            .filter(|c| match &class_type {
                Some(expected) => c.get_property("classType") == Some(expected),
                None => true,
            })
            .map(|c| c.id)
            .collect()
    }

    fn correlated_entities(&self, event: NodeId, agg: &DfAggregation) -> BTreeSet<NodeId> {
        self.store
            .outgoing_of_type(event, &agg.corr_type)
            .map(|e| e.target)
            .filter(|&id| has_labels(self.store, id, std::slice::from_ref(&agg.entity_label)))
            .collect()
    }

    fn aggregate_df(&mut self, agg: &DfAggregation) -> EkgResult<Vec<Row>> {
        let event_labels = std::slice::from_ref(&agg.event_label);
        let mut observations: Vec<(NodeId, NodeId)> = Vec::new();
        for df in self.store.get_edges_by_type(&agg.df_label) {
            if entity_type_of(self.store, df.id) != Some(agg.entity_type.as_str()) {
                continue;
            }
            if !has_labels(self.store, df.source, event_labels) || !has_labels(self.store, df.target, event_labels) {
                continue;
            }
            if !agg.is_threshold_free() {
                let shared = self
                    .correlated_entities(df.source, agg)
                    .intersection(&self.correlated_entities(df.target, agg))
                    .next()
                    .is_some();
                if !shared {
                    continue;
                }
            }
            let to_classes = self.classes_of(df.target, agg);
            for c1 in self.classes_of(df.source, agg) {
                observations.extend(to_classes.iter().map(|&c2| (c1, c2)));
            }
        }

        let counts = count_class_pairs(observations);
        let thresholds = DfThresholds {
            df_threshold: agg.df_threshold,
            relative_df_threshold: agg.relative_df_threshold,
            exclude_self_loops: agg.exclude_self_loops,
        };

        let mut rows = Vec::new();
        for edge in select_class_edges(&counts, &thresholds) {
            let key = df_properties(&agg.entity_type, None);
            match self.store.find_edge(edge.from, edge.to, &agg.dfc_label, &key) {
                Some(existing) => {
                    if agg.policy == AggregationPolicy::Overwrite {
                        if let Some(e) = self.store.get_edge_mut(existing) {
                            e.set_property("count", edge.count);
                            e.set_property("type", DFC_TYPE);
                        }
                    }
                }
                None => {
                    let mut props = key;
                    props.insert("count".to_string(), PropertyValue::from(edge.count));
                    props.insert("type".to_string(), PropertyValue::from(DFC_TYPE));
                    self.store
                        .create_edge_with_properties(edge.from, edge.to, agg.dfc_label.clone(), props)?;
                }
            }
            rows.push(row([
                ("from_id", edge.from.as_u64()),
                ("to_id", edge.to.as_u64()),
                ("count", edge.count),
            ]));
        }
        Ok(rows)
    }
}
