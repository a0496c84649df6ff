//! Identifier and name types for the in-memory graph

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier for a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct NodeId(pub u64);

impl NodeId {
    pub fn new(id: u64) -> Self {
        NodeId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

impl From<u64> for NodeId {
    fn from(id: u64) -> Self {
        NodeId(id)
    }
}

/// Unique identifier for an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub struct EdgeId(pub u64);

impl EdgeId {
    pub fn new(id: u64) -> Self {
        EdgeId(id)
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }

    pub(crate) fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for EdgeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EdgeId({})", self.0)
    }
}

impl From<u64> for EdgeId {
    fn from(id: u64) -> Self {
        EdgeId(id)
    }
}

/// Generates a transparent string newtype used for labels and edge types.
macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(name: impl Into<String>) -> Self {
                $name(name.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                $name(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                $name(s.to_string())
            }
        }

        impl From<&String> for $name {
            fn from(s: &String) -> Self {
                $name(s.clone())
            }
        }
    };
}

name_type!(
    /// Node label (e.g. "Event", "Book", "EventRecord")
    Label
);

name_type!(
    /// Relationship type (e.g. "CORR", "PREVALENCE", "DF")
    EdgeType
);

/// Edge traversal direction relative to the node a hop starts from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    #[default]
    Outgoing,
    Incoming,
}

impl Direction {
    pub fn reversed(self) -> Self {
        match self {
            Direction::Outgoing => Direction::Incoming,
            Direction::Incoming => Direction::Outgoing,
        }
    }
}

/// Collect anything string-like into a label list
pub fn labels<I, S>(names: I) -> Vec<Label>
where
    I: IntoIterator<Item = S>,
    S: Into<Label>,
{
    names.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_and_edge_ids() {
        let id = NodeId::new(42);
        assert_eq!(id.as_u64(), 42);
        assert_eq!(format!("{}", id), "NodeId(42)");

        let edge: EdgeId = 7.into();
        assert_eq!(format!("{}", edge), "EdgeId(7)");
        assert!(NodeId::new(1) < NodeId::new(2));
    }

    #[test]
    fn test_label_and_edge_type() {
        let label = Label::new("Event");
        assert_eq!(label.as_str(), "Event");
        assert_eq!(format!("{}", label), "Event");

        let edge_type: EdgeType = "CORR".into();
        assert_eq!(edge_type.as_str(), "CORR");
    }

    #[test]
    fn test_label_serializes_as_plain_string() {
        let json = serde_json::to_string(&Label::new("Book")).unwrap();
        assert_eq!(json, "\"Book\"");
        let back: EdgeType = serde_json::from_str("\"DF\"").unwrap();
        assert_eq!(back, EdgeType::new("DF"));
    }

    #[test]
    fn test_direction() {
        assert_eq!(Direction::default(), Direction::Outgoing);
        assert_eq!(Direction::Outgoing.reversed(), Direction::Incoming);
        let d: Direction = serde_json::from_str("\"incoming\"").unwrap();
        assert_eq!(d, Direction::Incoming);
    }

    #[test]
    fn test_labels_helper() {
        let ls = labels(["Record", "EventRecord"]);
        assert_eq!(ls, vec![Label::new("Record"), Label::new("EventRecord")]);
    }
}
