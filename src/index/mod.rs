//! Source-ID indexes.
//!
//! Every node created from a source row carries the row's identifier. The
//! store keeps one index per namespace (usages, names, references) mapping
//! that identifier to the node. Identifiers must be unique within a namespace.

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::model::NodeId;

/// Which identifier namespace an index covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    Usage,
    Name,
    Reference,
}

/// Returned when an identifier is already taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateId {
    pub id: String,
    pub existing: NodeId,
}

/// Unique source-ID → node lookup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IdIndex {
    map: HashMap<String, NodeId>,
}

impl IdIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `id`. The first registration wins; later ones are rejected.
    pub fn insert(&mut self, id: &str, node: NodeId) -> Result<(), DuplicateId> {
        match self.map.get(id) {
            Some(existing) => Err(DuplicateId { id: id.to_string(), existing: *existing }),
            None => {
                self.map.insert(id.to_string(), node);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: &str) -> Option<NodeId> {
        self.map.get(id).copied()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.map.contains_key(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<NodeId> {
        self.map.remove(id)
    }

    /// Move every entry out, leaving the index empty.
    pub fn drain(&mut self) -> impl Iterator<Item = (String, NodeId)> + '_ {
        self.map.drain()
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_registration_wins() {
        let mut idx = IdIndex::new();
        idx.insert("t1", NodeId(1)).unwrap();
        let dup = idx.insert("t1", NodeId(2)).unwrap_err();
        assert_eq!(dup.existing, NodeId(1));
        assert_eq!(idx.get("t1"), Some(NodeId(1)));
        assert_eq!(idx.len(), 1);
    }
}
