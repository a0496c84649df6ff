//! Node implementation for the property graph

use super::property::{PropertyMap, PropertyValue};
use super::types::{Label, NodeId};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A node in the property graph.
///
/// Records, events, entities and activity classes are all nodes; they differ
/// only by labels and by the edges that connect them.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    /// Unique identifier for this node
    pub id: NodeId,

    /// Set of labels for this node
    pub labels: HashSet<Label>,

    /// Properties associated with this node
    pub properties: PropertyMap,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

impl Node {
    /// Create a new node with labels and properties
    pub fn new(id: NodeId, labels: impl IntoIterator<Item = Label>, properties: PropertyMap) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        Node {
            id,
            labels: labels.into_iter().collect(),
            properties,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn add_label(&mut self, label: impl Into<Label>) {
        if self.labels.insert(label.into()) {
            self.touch();
        }
    }

    pub fn has_label(&self, label: &Label) -> bool {
        self.labels.contains(label)
    }

    /// True when the node carries every label in `labels`
    pub fn has_all_labels(&self, labels: &[Label]) -> bool {
        labels.iter().all(|l| self.labels.contains(l))
    }

    pub fn set_property(&mut self, key: impl Into<String>, value: impl Into<PropertyValue>) -> Option<PropertyValue> {
        let old = self.properties.insert(key.into(), value.into());
        self.touch();
        old
    }

    pub fn get_property(&self, key: &str) -> Option<&PropertyValue> {
        self.properties.get(key)
    }

    pub fn remove_property(&mut self, key: &str) -> Option<PropertyValue> {
        let removed = self.properties.remove(key);
        if removed.is_some() {
            self.touch();
        }
        removed
    }

    pub fn has_property(&self, key: &str) -> bool {
        self.properties.contains_key(key)
    }

    /// Boolean flag lookup; absent or non-boolean counts as unset
    pub fn flag(&self, key: &str) -> bool {
        self.get_property(key).and_then(|v| v.as_boolean()).unwrap_or(false)
    }

    /// Values of `attributes`, in order, when every one is usable as an
    /// identifier. Returns `None` if any is missing, null or "Unknown".
    pub fn identity(&self, attributes: &[String]) -> Option<Vec<PropertyValue>> {
        attributes
            .iter()
            .map(|attr| {
                self.properties
                    .get(attr)
                    .filter(|v| v.is_usable_identifier())
                    .cloned()
            })
            .collect()
    }

    fn touch(&mut self) {
        self.updated_at = chrono::Utc::now().timestamp_millis();
    }
}

impl PartialEq for Node {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for Node {}

impl std::hash::Hash for Node {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::types::labels;

    #[test]
    fn test_node_labels() {
        let mut node = Node::new(NodeId::new(1), labels(["Record", "EventRecord"]), PropertyMap::new());
        assert!(node.has_label(&Label::new("Record")));
        assert!(node.has_all_labels(&labels(["Record", "EventRecord"])));
        assert!(!node.has_all_labels(&labels(["Record", "Event"])));

        node.add_label("Event");
        assert!(node.has_all_labels(&labels(["Record", "Event"])));
    }

    #[test]
    fn test_node_properties() {
        let mut node = Node::new(NodeId::new(2), labels(["Book"]), PropertyMap::new());
        node.set_property("bookId", "B1");
        node.set_property("_processed", true);

        assert_eq!(node.get_property("bookId").unwrap().as_string(), Some("B1"));
        assert!(node.flag("_processed"));
        assert!(!node.flag("_merged"));

        assert!(node.remove_property("_processed").is_some());
        assert!(!node.has_property("_processed"));
    }

    #[test]
    fn test_identity() {
        let mut node = Node::new(NodeId::new(3), labels(["BookRecord"]), PropertyMap::new());
        node.set_property("bookId", "B1");
        node.set_property("copy", 2i64);

        let ids = vec!["bookId".to_string(), "copy".to_string()];
        assert_eq!(
            node.identity(&ids),
            Some(vec![PropertyValue::from("B1"), PropertyValue::from(2i64)])
        );

        node.set_property("copy", "Unknown");
        assert_eq!(node.identity(&ids), None);

        let missing = vec!["authorId".to_string()];
        assert_eq!(node.identity(&missing), None);
    }

    #[test]
    fn test_node_timestamps() {
        let node = Node::new(NodeId::new(4), labels(["Event"]), PropertyMap::new());
        assert!(node.created_at > 0);
        assert_eq!(node.created_at, node.updated_at);
    }

    #[test]
    fn test_node_equality_by_id() {
        let a = Node::new(NodeId::new(7), labels(["Book"]), PropertyMap::new());
        let b = Node::new(NodeId::new(7), labels(["Author"]), PropertyMap::new());
        let c = Node::new(NodeId::new(8), labels(["Book"]), PropertyMap::new());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
