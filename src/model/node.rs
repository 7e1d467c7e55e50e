//! Node identity in the name/usage graph.

use serde::{Deserialize, Serialize};

/// Opaque node identifier assigned by the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeId(pub u64);

impl NodeId {
    /// Placeholder carried by records that have not been persisted yet.
    pub const UNSET: NodeId = NodeId(0);

    pub fn is_set(&self) -> bool {
        self.0 != 0
    }
}

impl Default for NodeId {
    fn default() -> Self {
        NodeId::UNSET
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// What a node holds. Names and usages share one id space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Name,
    Usage,
}
