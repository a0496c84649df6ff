//! In-memory graph storage
//!
//! Arena-backed: node and edge ids index directly into vectors and are never
//! reused, so a lower id always means an earlier creation. Label and edge-type
//! indices use ordered sets to give deterministic iteration.

use super::edge::Edge;
use super::node::Node;
use super::property::{PropertyMap, PropertyValue};
use super::types::{EdgeId, EdgeType, Label, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use thiserror::Error;

/// Errors that can occur during graph operations
#[derive(Error, Debug, PartialEq)]
pub enum GraphError {
    #[error("Node {0} not found")]
    NodeNotFound(NodeId),

    #[error("Edge {0} not found")]
    EdgeNotFound(EdgeId),

    #[error("Invalid edge: source node {0} does not exist")]
    InvalidEdgeSource(NodeId),

    #[error("Invalid edge: target node {0} does not exist")]
    InvalidEdgeTarget(NodeId),
}

pub type GraphResult<T> = Result<T, GraphError>;

/// Label and relationship-type counts of a store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub node_count: usize,
    pub edge_count: usize,
    pub label_counts: BTreeMap<String, usize>,
    pub edge_type_counts: BTreeMap<String, usize>,
}

/// In-memory graph storage
///
/// - nodes / edges: arenas indexed by id
/// - outgoing / incoming: adjacency lists per node
/// - label_index: Label -> node ids
/// - edge_type_index: EdgeType -> edge ids
#[derive(Debug)]
pub struct GraphStore {
    nodes: Vec<Option<Node>>,
    edges: Vec<Option<Edge>>,
    outgoing: Vec<Vec<EdgeId>>,
    incoming: Vec<Vec<EdgeId>>,
    label_index: HashMap<Label, BTreeSet<NodeId>>,
    edge_type_index: HashMap<EdgeType, BTreeSet<EdgeId>>,
    node_count: usize,
    edge_count: usize,
}

impl GraphStore {
    /// Create a new empty graph store
    pub fn new() -> Self {
        GraphStore {
            // Slot 0 is never used so ids start at 1
            nodes: vec![None],
            edges: vec![None],
            outgoing: vec![Vec::new()],
            incoming: vec![Vec::new()],
            label_index: HashMap::new(),
            edge_type_index: HashMap::new(),
            node_count: 0,
            edge_count: 0,
        }
    }

    /// Create a node with a single label
    pub fn create_node(&mut self, label: impl Into<Label>) -> NodeId {
        self.create_node_with_properties(vec![label.into()], PropertyMap::new())
    }

    /// Create a node with multiple labels and properties
    pub fn create_node_with_properties(&mut self, labels: Vec<Label>, properties: PropertyMap) -> NodeId {
        let node_id = NodeId::new(self.nodes.len() as u64);
        for label in &labels {
            self.label_index.entry(label.clone()).or_default().insert(node_id);
        }
        self.nodes.push(Some(Node::new(node_id, labels, properties)));
        self.outgoing.push(Vec::new());
        self.incoming.push(Vec::new());
        self.node_count += 1;
        node_id
    }

    pub fn get_node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id.index()).and_then(|slot| slot.as_ref())
    }

    /// Mutable access for property updates. Labels must go through
    /// [`GraphStore::add_label_to_node`] so the label index stays in sync.
    pub fn get_node_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id.index()).and_then(|slot| slot.as_mut())
    }

    pub fn has_node(&self, id: NodeId) -> bool {
        self.get_node(id).is_some()
    }

    pub fn set_node_property(
        &mut self,
        node_id: NodeId,
        key: impl Into<String>,
        value: impl Into<PropertyValue>,
    ) -> GraphResult<Option<PropertyValue>> {
        let node = self.get_node_mut(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        Ok(node.set_property(key, value))
    }

    pub fn remove_node_property(&mut self, node_id: NodeId, key: &str) -> GraphResult<Option<PropertyValue>> {
        let node = self.get_node_mut(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        Ok(node.remove_property(key))
    }

    /// Add a label to an existing node and update the label index
    pub fn add_label_to_node(&mut self, node_id: NodeId, label: impl Into<Label>) -> GraphResult<()> {
        let label = label.into();
        let node = self.get_node_mut(node_id).ok_or(GraphError::NodeNotFound(node_id))?;
        node.add_label(label.clone());
        self.label_index.entry(label).or_default().insert(node_id);
        Ok(())
    }

    /// Delete a node and all its connected edges
    pub fn delete_node(&mut self, id: NodeId) -> GraphResult<Node> {
        let node = self
            .nodes
            .get_mut(id.index())
            .and_then(|slot| slot.take())
            .ok_or(GraphError::NodeNotFound(id))?;
        self.node_count -= 1;

        for label in &node.labels {
            if let Some(set) = self.label_index.get_mut(label) {
                set.remove(&id);
            }
        }

        let outgoing = std::mem::take(&mut self.outgoing[id.index()]);
        let incoming = std::mem::take(&mut self.incoming[id.index()]);
        for edge_id in outgoing.into_iter().chain(incoming) {
            // Self-loops appear in both lists
            if self.has_edge(edge_id) {
                self.delete_edge(edge_id)?;
            }
        }

        Ok(node)
    }

    /// Create an edge between two nodes
    pub fn create_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        edge_type: impl Into<EdgeType>,
    ) -> GraphResult<EdgeId> {
        self.create_edge_with_properties(source, target, edge_type, PropertyMap::new())
    }

    /// Create an edge with properties
    pub fn create_edge_with_properties(
        &mut self,
        source: NodeId,
        target: NodeId,
        edge_type: impl Into<EdgeType>,
        properties: PropertyMap,
    ) -> GraphResult<EdgeId> {
        if !self.has_node(source) {
            return Err(GraphError::InvalidEdgeSource(source));
        }
        if !self.has_node(target) {
            return Err(GraphError::InvalidEdgeTarget(target));
        }

        let edge_id = EdgeId::new(self.edges.len() as u64);
        let edge_type = edge_type.into();

        self.outgoing[source.index()].push(edge_id);
        self.incoming[target.index()].push(edge_id);
        self.edge_type_index.entry(edge_type.clone()).or_default().insert(edge_id);

        self.edges.push(Some(Edge::new(edge_id, source, target, edge_type, properties)));
        self.edge_count += 1;
        Ok(edge_id)
    }

    /// Return the first edge of `edge_type` from `source` to `target` whose
    /// properties include `properties`, creating one if none exists.
    /// The boolean is true when a new edge was created.
    pub fn merge_edge(
        &mut self,
        source: NodeId,
        target: NodeId,
        edge_type: impl Into<EdgeType>,
        properties: PropertyMap,
    ) -> GraphResult<(EdgeId, bool)> {
        let edge_type = edge_type.into();
        if let Some(existing) = self.find_edge(source, target, &edge_type, &properties) {
            return Ok((existing, false));
        }
        let id = self.create_edge_with_properties(source, target, edge_type, properties)?;
        Ok((id, true))
    }

    /// Find an edge of `edge_type` from `source` to `target` carrying all of `properties`
    pub fn find_edge(
        &self,
        source: NodeId,
        target: NodeId,
        edge_type: &EdgeType,
        properties: &PropertyMap,
    ) -> Option<EdgeId> {
        self.outgoing
            .get(source.index())?
            .iter()
            .filter_map(|&id| self.get_edge(id))
            .find(|e| e.target == target && &e.edge_type == edge_type && e.matches_properties(properties))
            .map(|e| e.id)
    }

    pub fn get_edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(id.index()).and_then(|slot| slot.as_ref())
    }

    pub fn get_edge_mut(&mut self, id: EdgeId) -> Option<&mut Edge> {
        self.edges.get_mut(id.index()).and_then(|slot| slot.as_mut())
    }

    pub fn has_edge(&self, id: EdgeId) -> bool {
        self.get_edge(id).is_some()
    }

    /// Delete an edge
    pub fn delete_edge(&mut self, id: EdgeId) -> GraphResult<Edge> {
        let edge = self
            .edges
            .get_mut(id.index())
            .and_then(|slot| slot.take())
            .ok_or(GraphError::EdgeNotFound(id))?;
        self.edge_count -= 1;

        if let Some(set) = self.edge_type_index.get_mut(&edge.edge_type) {
            set.remove(&id);
        }
        if let Some(adj) = self.outgoing.get_mut(edge.source.index()) {
            adj.retain(|&eid| eid != id);
        }
        if let Some(adj) = self.incoming.get_mut(edge.target.index()) {
            adj.retain(|&eid| eid != id);
        }

        Ok(edge)
    }

    /// Get all outgoing edges from a node
    pub fn get_outgoing_edges(&self, node_id: NodeId) -> Vec<&Edge> {
        self.outgoing
            .get(node_id.index())
            .map(|ids| ids.iter().filter_map(|&id| self.get_edge(id)).collect())
            .unwrap_or_default()
    }

    /// Get all incoming edges to a node
    pub fn get_incoming_edges(&self, node_id: NodeId) -> Vec<&Edge> {
        self.incoming
            .get(node_id.index())
            .map(|ids| ids.iter().filter_map(|&id| self.get_edge(id)).collect())
            .unwrap_or_default()
    }

    /// Outgoing edges of one type
    pub fn outgoing_of_type<'a>(&'a self, node_id: NodeId, edge_type: &'a EdgeType) -> impl Iterator<Item = &'a Edge> + 'a {
        self.outgoing
            .get(node_id.index())
            .into_iter()
            .flatten()
            .filter_map(move |&id| self.get_edge(id))
            .filter(move |e| &e.edge_type == edge_type)
    }

    /// Incoming edges of one type
    pub fn incoming_of_type<'a>(&'a self, node_id: NodeId, edge_type: &'a EdgeType) -> impl Iterator<Item = &'a Edge> + 'a {
        self.incoming
            .get(node_id.index())
            .into_iter()
            .flatten()
            .filter_map(move |&id| self.get_edge(id))
            .filter(move |e| &e.edge_type == edge_type)
    }

    /// Get all nodes with a specific label, ordered by id
    pub fn get_nodes_by_label(&self, label: &Label) -> Vec<&Node> {
        self.label_index
            .get(label)
            .map(|ids| ids.iter().filter_map(|&id| self.get_node(id)).collect())
            .unwrap_or_default()
    }

    /// Ids of nodes carrying every label in `labels`, ordered by id.
    /// An empty label list matches every node.
    pub fn node_ids_with_labels(&self, labels: &[Label]) -> Vec<NodeId> {
        let Some((first, rest)) = labels.split_first() else {
            return self.all_nodes().map(|n| n.id).collect();
        };
        let Some(candidates) = self.label_index.get(first) else {
            return Vec::new();
        };
        candidates
            .iter()
            .copied()
            .filter(|id| {
                rest.iter()
                    .all(|l| self.label_index.get(l).is_some_and(|set| set.contains(id)))
            })
            .collect()
    }

    /// Nodes carrying every label in `labels`, ordered by id
    pub fn nodes_with_labels(&self, labels: &[Label]) -> Vec<&Node> {
        self.node_ids_with_labels(labels)
            .into_iter()
            .filter_map(|id| self.get_node(id))
            .collect()
    }

    /// Get all edges of a specific type, ordered by id
    pub fn get_edges_by_type(&self, edge_type: &EdgeType) -> Vec<&Edge> {
        self.edge_type_index
            .get(edge_type)
            .map(|ids| ids.iter().filter_map(|&id| self.get_edge(id)).collect())
            .unwrap_or_default()
    }

    /// Move every edge of `duplicate` onto `survivor`, copy properties the
    /// survivor lacks, union the labels and delete `duplicate`.
    ///
    /// A redirected edge that would repeat an existing edge of the survivor
    /// (same endpoints, type and properties) is dropped instead.
    pub fn merge_nodes(&mut self, survivor: NodeId, duplicate: NodeId) -> GraphResult<()> {
        if survivor == duplicate {
            return Ok(());
        }
        let dup = self.get_node(duplicate).ok_or(GraphError::NodeNotFound(duplicate))?.clone();
        if !self.has_node(survivor) {
            return Err(GraphError::NodeNotFound(survivor));
        }

        for label in dup.labels.iter() {
            self.add_label_to_node(survivor, label.clone())?;
        }
        if let Some(node) = self.get_node_mut(survivor) {
            for (key, value) in &dup.properties {
                if !node.has_property(key) {
                    node.set_property(key.clone(), value.clone());
                }
            }
        }

        let mut moved: Vec<Edge> = Vec::new();
        let adjacent: BTreeSet<EdgeId> = self.outgoing[duplicate.index()]
            .iter()
            .chain(self.incoming[duplicate.index()].iter())
            .copied()
            .collect();
        for edge_id in adjacent {
            moved.push(self.delete_edge(edge_id)?);
        }

        for edge in moved {
            let remap = |n: NodeId| if n == duplicate { survivor } else { n };
            let (source, target) = (remap(edge.source), remap(edge.target));
            if self
                .find_edge(source, target, &edge.edge_type, &edge.properties)
                .and_then(|id| self.get_edge(id))
                .is_some_and(|e| e.properties.len() == edge.properties.len())
            {
                continue;
            }
            self.create_edge_with_properties(source, target, edge.edge_type, edge.properties)?;
        }

        self.delete_node(duplicate)?;
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.node_count
    }

    pub fn edge_count(&self) -> usize {
        self.edge_count
    }

    /// All nodes, ordered by id
    pub fn all_nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter().flatten()
    }

    pub fn statistics(&self) -> GraphStatistics {
        let label_counts = self
            .label_index
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(label, ids)| (label.to_string(), ids.len()))
            .collect();
        let edge_type_counts = self
            .edge_type_index
            .iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(edge_type, ids)| (edge_type.to_string(), ids.len()))
            .collect();
        GraphStatistics {
            node_count: self.node_count,
            edge_count: self.edge_count,
            label_counts,
            edge_type_counts,
        }
    }
}

impl Default for GraphStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::labels;

    #[test]
    fn test_create_and_get_node() {
        let mut store = GraphStore::new();
        let node_id = store.create_node("Event");

        assert_eq!(store.node_count(), 1);
        let node = store.get_node(node_id).unwrap();
        assert_eq!(node.id, node_id);
        assert!(node.has_label(&Label::new("Event")));
    }

    #[test]
    fn test_ids_are_monotonic() {
        let mut store = GraphStore::new();
        let a = store.create_node("Book");
        let b = store.create_node("Book");
        store.delete_node(a).unwrap();
        let c = store.create_node("Book");
        assert!(a < b && b < c);
        assert!(!store.has_node(a));
    }

    #[test]
    fn test_create_node_with_properties() {
        let mut store = GraphStore::new();
        let mut props = PropertyMap::new();
        props.insert("bookId".to_string(), "B1".into());
        props.insert("pages".to_string(), 300i64.into());

        let node_id = store.create_node_with_properties(labels(["Book", "Entity"]), props);

        let node = store.get_node(node_id).unwrap();
        assert_eq!(node.labels.len(), 2);
        assert_eq!(node.get_property("bookId").unwrap().as_string(), Some("B1"));
        assert_eq!(node.get_property("pages").unwrap().as_integer(), Some(300));
    }

    #[test]
    fn test_edge_validation() {
        let mut store = GraphStore::new();
        let node = store.create_node("Event");
        let invalid = NodeId::new(999);

        assert_eq!(
            store.create_edge(invalid, node, "CORR"),
            Err(GraphError::InvalidEdgeSource(invalid))
        );
        assert_eq!(
            store.create_edge(node, invalid, "CORR"),
            Err(GraphError::InvalidEdgeTarget(invalid))
        );
    }

    #[test]
    fn test_adjacency_lists() {
        let mut store = GraphStore::new();
        let e1 = store.create_node("Event");
        let e2 = store.create_node("Event");
        let book = store.create_node("Book");

        store.create_edge(e1, book, "CORR").unwrap();
        store.create_edge(e2, book, "CORR").unwrap();
        store.create_edge(e1, e2, "DF_Book").unwrap();

        assert_eq!(store.get_outgoing_edges(e1).len(), 2);
        assert_eq!(store.get_incoming_edges(book).len(), 2);

        let corr = EdgeType::new("CORR");
        assert_eq!(store.outgoing_of_type(e1, &corr).count(), 1);
        assert_eq!(store.incoming_of_type(book, &corr).count(), 2);
    }

    #[test]
    fn test_nodes_with_labels() {
        let mut store = GraphStore::new();
        let a = store.create_node_with_properties(labels(["Record", "BookRecord"]), PropertyMap::new());
        store.create_node_with_properties(labels(["Record"]), PropertyMap::new());
        let c = store.create_node_with_properties(labels(["BookRecord", "Record"]), PropertyMap::new());

        assert_eq!(store.node_ids_with_labels(&labels(["Record", "BookRecord"])), vec![a, c]);
        assert_eq!(store.nodes_with_labels(&labels(["Record"])).len(), 3);
        assert!(store.node_ids_with_labels(&labels(["Missing"])).is_empty());
        assert_eq!(store.node_ids_with_labels(&[]).len(), 3);
    }

    #[test]
    fn test_label_added_after_creation_is_indexed() {
        let mut store = GraphStore::new();
        let id = store.create_node("Record");
        store.add_label_to_node(id, "EventRecord").unwrap();
        assert_eq!(store.node_ids_with_labels(&labels(["EventRecord"])), vec![id]);
        assert_eq!(
            store.add_label_to_node(NodeId::new(50), "X"),
            Err(GraphError::NodeNotFound(NodeId::new(50)))
        );
    }

    #[test]
    fn test_delete_node_removes_edges() {
        let mut store = GraphStore::new();
        let a = store.create_node("Event");
        let b = store.create_node("Event");
        store.create_edge(a, b, "DF").unwrap();
        store.create_edge(a, a, "LOOP").unwrap();

        store.delete_node(a).unwrap();
        assert_eq!(store.node_count(), 1);
        assert_eq!(store.edge_count(), 0);
        assert!(store.get_incoming_edges(b).is_empty());
        assert!(store.get_edges_by_type(&EdgeType::new("DF")).is_empty());
    }

    #[test]
    fn test_merge_edge_matches_on_properties() {
        let mut store = GraphStore::new();
        let a = store.create_node("Event");
        let b = store.create_node("Event");

        let mut p1 = PropertyMap::new();
        p1.insert("entityId".to_string(), 1i64.into());
        let mut p2 = PropertyMap::new();
        p2.insert("entityId".to_string(), 2i64.into());

        let (first, created) = store.merge_edge(a, b, "DF", p1.clone()).unwrap();
        assert!(created);
        let (again, created) = store.merge_edge(a, b, "DF", p1).unwrap();
        assert!(!created);
        assert_eq!(first, again);

        let (_, created) = store.merge_edge(a, b, "DF", p2).unwrap();
        assert!(created);
        assert_eq!(store.edge_count(), 2);
    }

    #[test]
    fn test_merge_nodes() {
        let mut store = GraphStore::new();
        let mut props = PropertyMap::new();
        props.insert("bookId".to_string(), "B1".into());
        let survivor = store.create_node_with_properties(labels(["Book"]), props.clone());
        props.insert("title".to_string(), "Dune".into());
        let duplicate = store.create_node_with_properties(labels(["Book"]), props);

        let r1 = store.create_node("Record");
        let r2 = store.create_node("Record");
        let event = store.create_node("Event");
        store.create_edge(survivor, r1, "PREVALENCE").unwrap();
        store.create_edge(duplicate, r2, "PREVALENCE").unwrap();
        store.create_edge(event, survivor, "CORR").unwrap();
        store.create_edge(event, duplicate, "CORR").unwrap();

        store.merge_nodes(survivor, duplicate).unwrap();

        assert!(!store.has_node(duplicate));
        let node = store.get_node(survivor).unwrap();
        assert_eq!(node.get_property("title").unwrap().as_string(), Some("Dune"));
        assert_eq!(store.get_outgoing_edges(survivor).len(), 2);
        // Both CORR edges collapse into one
        assert_eq!(store.get_incoming_edges(survivor).len(), 1);
        assert_eq!(store.node_ids_with_labels(&labels(["Book"])), vec![survivor]);
    }

    #[test]
    fn test_statistics() {
        let mut store = GraphStore::new();
        let a = store.create_node_with_properties(labels(["Event"]), PropertyMap::new());
        let b = store.create_node_with_properties(labels(["Event"]), PropertyMap::new());
        let book = store.create_node("Book");
        store.create_edge(a, book, "CORR").unwrap();
        store.create_edge(b, book, "CORR").unwrap();

        let stats = store.statistics();
        assert_eq!(stats.node_count, 3);
        assert_eq!(stats.edge_count, 2);
        assert_eq!(stats.label_counts["Event"], 2);
        assert_eq!(stats.edge_type_counts["CORR"], 2);
    }
}
