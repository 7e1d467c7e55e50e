//! Relationship (edge) in the name/usage graph.

use serde::{Deserialize, Serialize};
use super::NodeId;

/// Opaque relationship identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RelId(pub u64);

impl std::fmt::Display for RelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Traversal direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Outgoing,
    Incoming,
    Both,
}

/// The three edge types of a normalized checklist.
///
/// | Type | From | To | Multiplicity |
/// |------|------|----|--------------|
/// | `PARENT_OF` | taxon | taxon | forest, acyclic |
/// | `SYNONYM_OF` | synonym | taxon | one or more per synonym (pro parte) |
/// | `HAS_BASIONYM` | name | name | at most one per name |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelType {
    #[serde(rename = "PARENT_OF")]
    ParentOf,
    #[serde(rename = "SYNONYM_OF")]
    SynonymOf,
    #[serde(rename = "HAS_BASIONYM")]
    HasBasionym,
}

impl RelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RelType::ParentOf => "PARENT_OF",
            RelType::SynonymOf => "SYNONYM_OF",
            RelType::HasBasionym => "HAS_BASIONYM",
        }
    }
}

impl std::fmt::Display for RelType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relationship {
    pub id: RelId,
    pub src: NodeId,
    pub dst: NodeId,
    pub rel_type: RelType,
}

impl Relationship {
    pub fn new(id: RelId, src: NodeId, dst: NodeId, rel_type: RelType) -> Self {
        Self { id, src, dst, rel_type }
    }

    /// The "other" end of the relationship from the given node.
    pub fn other_node(&self, from: NodeId) -> Option<NodeId> {
        if from == self.src { Some(self.dst) }
        else if from == self.dst { Some(self.src) }
        else { None }
    }

    pub fn matches(&self, node: NodeId, dir: Direction) -> bool {
        match dir {
            Direction::Outgoing => self.src == node,
            Direction::Incoming => self.dst == node,
            Direction::Both => self.src == node || self.dst == node,
        }
    }
}
