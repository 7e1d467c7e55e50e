//! Parent cycle detection.
//!
//! Follows `PARENT_OF` chains upward from every usage. Each node is visited
//! once across all chains, so the scan is linear in the number of usages and
//! terminates on any graph.

use hashbrown::{HashMap, HashSet};
use tracing::warn;

use crate::model::{Direction, NodeId, RelType, Relationship};
use crate::storage::{GraphStore, NodeFilter};
use crate::tx::CancelFlag;
use crate::Result;

/// A closed parent chain and the edge chosen to break it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParentCycle {
    /// Cycle members, each followed by its parent.
    pub nodes: Vec<NodeId>,
    /// The lexicographically last edge by (parent id, child id).
    pub broken: Relationship,
}

impl ParentCycle {
    /// The usage that loses its parent when the cycle is broken.
    pub fn child(&self) -> NodeId {
        self.broken.dst
    }
}

/// Source id of a usage, falling back to the node id.
async fn sort_id<S: GraphStore>(store: &S, tx: &S::Tx, node: NodeId) -> Result<String> {
    Ok(store
        .usage(tx, node)
        .await?
        .and_then(|u| u.usage.id)
        .unwrap_or_else(|| node.to_string()))
}

/// Find every parent cycle. Nothing is modified.
pub async fn detect_cycles<S: GraphStore>(store: &S, tx: &S::Tx, cancel: &CancelFlag) -> Result<Vec<ParentCycle>> {
    let mut done: HashSet<NodeId> = HashSet::new();
    let mut cycles = Vec::new();

    for start in store.node_ids(tx, NodeFilter::Usages).await? {
        if done.contains(&start) {
            continue;
        }
        cancel.check()?;

        // chain[i] = (node, edge from its parent)
        let mut chain: Vec<(NodeId, Option<Relationship>)> = Vec::new();
        let mut position: HashMap<NodeId, usize> = HashMap::new();
        let mut cur = start;
        loop {
            if done.contains(&cur) {
                break;
            }
            if let Some(&at) = position.get(&cur) {
                cycles.push(close_cycle(store, tx, &chain[at..]).await?);
                break;
            }
            position.insert(cur, chain.len());
            let rel = store
                .get_relationships(tx, cur, Direction::Incoming, Some(RelType::ParentOf))
                .await?
                .into_iter()
                .next();
            let next = rel.as_ref().map(|r| r.src);
            chain.push((cur, rel));
            match next {
                Some(parent) => cur = parent,
                None => break,
            }
        }
        done.extend(chain.iter().map(|(n, _)| *n));
    }
    Ok(cycles)
}

async fn close_cycle<S: GraphStore>(
    store: &S,
    tx: &S::Tx,
    members: &[(NodeId, Option<Relationship>)],
) -> Result<ParentCycle> {
    let mut broken: Option<((String, String), Relationship)> = None;
    for rel in members.iter().filter_map(|(_, r)| r.as_ref()) {
        let key = (sort_id(store, tx, rel.src).await?, sort_id(store, tx, rel.dst).await?);
        if broken.as_ref().is_none_or(|(best, _)| key > *best) {
            broken = Some((key, rel.clone()));
        }
    }
    let nodes: Vec<NodeId> = members.iter().map(|(n, _)| *n).collect();
    match broken {
        Some(((parent, child), rel)) => {
            warn!(%parent, %child, size = nodes.len(), "parent cycle");
            Ok(ParentCycle { nodes, broken: rel })
        }
        None => Err(crate::Error::StorageError(format!("cycle without edges at {:?}", nodes))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Name, Rank, Usage};
    use crate::storage::{MemoryStore, NeoUsage};
    use crate::tx::TxMode;

    async fn taxa(db: &MemoryStore, ids: &[&str]) -> Vec<NodeId> {
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let mut nodes = Vec::new();
        for id in ids {
            let u = NeoUsage::new(Usage::taxon(*id, Name::new(format!("Taxon {id}"), Rank::Genus)));
            nodes.push(db.create_name_and_usage(&mut tx, u).await.unwrap());
        }
        db.commit_tx(tx).await.unwrap();
        nodes
    }

    #[tokio::test]
    async fn test_three_cycle_breaks_exactly_one_edge() {
        let db = MemoryStore::new();
        let n = taxa(&db, &["A", "B", "C"]).await;
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        db.assign_parent(&mut tx, n[0], n[1]).await.unwrap();
        db.assign_parent(&mut tx, n[1], n[2]).await.unwrap();
        db.assign_parent(&mut tx, n[2], n[0]).await.unwrap();

        let cycles = detect_cycles(&db, &tx, &CancelFlag::new()).await.unwrap();
        assert_eq!(cycles.len(), 1);
        let cycle = &cycles[0];
        assert_eq!(cycle.nodes.len(), 3);
        // (C, A) is the last of (A, B), (B, C), (C, A)
        assert_eq!((cycle.broken.src, cycle.broken.dst), (n[2], n[0]));

        assert!(db.delete_relationship(&mut tx, cycle.broken.id).await.unwrap());
        assert!(detect_cycles(&db, &tx, &CancelFlag::new()).await.unwrap().is_empty());
        db.commit_tx(tx).await.unwrap();
    }

    #[tokio::test]
    async fn test_self_loop_and_acyclic_tail() {
        let db = MemoryStore::new();
        let n = taxa(&db, &["A", "B", "C"]).await;
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        db.assign_parent(&mut tx, n[0], n[0]).await.unwrap();
        db.assign_parent(&mut tx, n[1], n[2]).await.unwrap();
        let cycles = detect_cycles(&db, &tx, &CancelFlag::new()).await.unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!(cycles[0].nodes, vec![n[0]]);
        assert_eq!(cycles[0].child(), n[0]);
    }

    #[tokio::test]
    async fn test_chain_into_cycle_reports_cycle_once() {
        let db = MemoryStore::new();
        let n = taxa(&db, &["A", "B", "C", "D"]).await;
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        db.assign_parent(&mut tx, n[0], n[1]).await.unwrap();
        db.assign_parent(&mut tx, n[1], n[0]).await.unwrap();
        db.assign_parent(&mut tx, n[1], n[3]).await.unwrap();
        db.assign_parent(&mut tx, n[3], n[2]).await.unwrap();
        let cycles = detect_cycles(&db, &tx, &CancelFlag::new()).await.unwrap();
        assert_eq!(cycles.len(), 1);
        assert_eq!((cycles[0].broken.src, cycles[0].broken.dst), (n[1], n[0]));
    }
}
