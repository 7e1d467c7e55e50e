//! Path: a sequence of alternating nodes and relationships.

use serde::{Deserialize, Serialize};
use super::{NodeId, RelType, Relationship};

/// A path in the graph: node -[rel]- node -[rel]- node ...
///
/// Walker paths start at a root taxon; each later step is reached either by a
/// `PARENT_OF` edge (a child taxon) or a `SYNONYM_OF` edge (a synonym).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Path {
    /// Nodes along the path. Always has one more element than `relationships`.
    pub nodes: Vec<NodeId>,
    /// Relationships connecting consecutive nodes.
    pub relationships: Vec<Relationship>,
}

impl Path {
    pub fn single(node: NodeId) -> Self {
        Self { nodes: vec![node], relationships: Vec::new() }
    }

    pub fn len(&self) -> usize {
        self.relationships.len()
    }

    pub fn is_empty(&self) -> bool {
        self.relationships.is_empty()
    }

    pub fn start(&self) -> NodeId {
        self.nodes[0]
    }

    pub fn end(&self) -> NodeId {
        self.nodes[self.nodes.len() - 1]
    }

    pub fn contains(&self, node: NodeId) -> bool {
        self.nodes.contains(&node)
    }

    /// Extend path with a relationship and its target node.
    pub fn append(&mut self, rel: Relationship, node: NodeId) {
        self.relationships.push(rel);
        self.nodes.push(node);
    }

    /// The edge type through which node `idx` was reached; `None` for the start node.
    pub fn via(&self, idx: usize) -> Option<RelType> {
        idx.checked_sub(1).map(|i| self.relationships[i].rel_type)
    }

    /// Number of leading positions shared with `other`.
    ///
    /// Two positions are equal when both the node and the edge type that led to
    /// it match, so a pro parte synonym reached from two taxa is two positions.
    pub fn common_prefix_len(&self, other: &Path) -> usize {
        let max = self.nodes.len().min(other.nodes.len());
        (0..max)
            .take_while(|&i| self.nodes[i] == other.nodes[i] && self.via(i) == other.via(i))
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RelId;

    fn rel(id: u64, src: u64, dst: u64, t: RelType) -> Relationship {
        Relationship::new(RelId(id), NodeId(src), NodeId(dst), t)
    }

    #[test]
    fn test_common_prefix() {
        let mut a = Path::single(NodeId(1));
        a.append(rel(1, 1, 2, RelType::ParentOf), NodeId(2));
        a.append(rel(2, 2, 3, RelType::ParentOf), NodeId(3));

        let mut b = Path::single(NodeId(1));
        b.append(rel(1, 1, 2, RelType::ParentOf), NodeId(2));
        b.append(rel(3, 2, 4, RelType::ParentOf), NodeId(4));

        assert_eq!(a.common_prefix_len(&b), 2);
        assert_eq!(a.common_prefix_len(&a.clone()), 3);
        assert_eq!(a.end(), NodeId(3));
        assert_eq!(a.via(0), None);
        assert_eq!(a.via(2), Some(RelType::ParentOf));
    }

    #[test]
    fn test_same_node_via_other_edge_is_not_shared() {
        let mut a = Path::single(NodeId(1));
        a.append(rel(1, 1, 2, RelType::ParentOf), NodeId(2));
        let mut b = Path::single(NodeId(1));
        b.append(rel(2, 2, 1, RelType::SynonymOf), NodeId(2));
        assert_eq!(a.common_prefix_len(&b), 1);
    }
}
