//! # Graph Store Trait
//!
//! This is THE contract between the normalizer and any storage engine.
//! Every operation the import pipeline needs on the name/usage graph is
//! defined here.
//!
//! ## Implementations
//!
//! | Store | Module | Description |
//! |-------|--------|-------------|
//! | `MemoryStore` | `memory` | Arena maps with integer ids, optional on-disk snapshot |
//!
//! ## Consistency model
//!
//! - One `ReadWrite` transaction at a time; `ReadOnly` transactions may overlap it.
//! - Node ids are assigned at creation. Source-ID index entries are staged
//!   until [`GraphStore::sync`]; `usage_by_id` / `name_by_id` only see synced ids.
//! - [`process`] scans nodes and commits every `batch_size` visits.

pub mod memory;

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::index::IndexType;
use crate::model::*;
use crate::tx::{CancelFlag, Transaction, TxMode};
use crate::{Error, Result};

pub use memory::MemoryStore;

// ============================================================================
// Store Configuration
// ============================================================================

/// Where a store keeps its data.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// In-memory only
    #[default]
    Memory,

    /// In-memory with a JSON snapshot written to `data_dir` on sync and shutdown
    Persistent { data_dir: PathBuf },
}

// ============================================================================
// Graph records
// ============================================================================

/// Raw identifiers a row referenced, resolved once every row is inserted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeferredRefs {
    pub parent_id: Option<String>,
    /// Accepted usage ids of a synonym; more than one for pro parte synonyms.
    pub accepted_ids: Vec<String>,
    pub basionym_id: Option<String>,
}

impl DeferredRefs {
    pub fn is_empty(&self) -> bool {
        self.parent_id.is_none() && self.accepted_ids.is_empty() && self.basionym_id.is_none()
    }
}

/// A usage node together with its name node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeoUsage {
    pub node: NodeId,
    pub name_node: NodeId,
    pub usage: Usage,
    pub refs: DeferredRefs,
    pub classification: Classification,
}

impl NeoUsage {
    pub fn new(usage: Usage) -> Self {
        Self { usage, ..Default::default() }
    }

    pub fn with_refs(mut self, refs: DeferredRefs) -> Self {
        self.refs = refs;
        self
    }

    pub fn with_classification(mut self, classification: Classification) -> Self {
        self.classification = classification;
        self
    }

    pub fn name(&self) -> &Name {
        &self.usage.name
    }

    pub fn is_synonym(&self) -> bool {
        self.usage.is_synonym()
    }

    pub fn verbatim_key(&self) -> Option<VerbatimKey> {
        self.usage.verbatim_key.or(self.usage.name.verbatim_key)
    }
}

/// A name node.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NeoName {
    pub node: NodeId,
    pub name: Name,
}

/// Node selection for scans.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeFilter {
    /// Every usage node.
    Usages,
    /// Usages with an accepted or provisional status.
    Taxa,
    /// Usages with a synonym status.
    Synonyms,
    /// Taxa without an incoming `PARENT_OF`.
    Roots,
    /// Every name node.
    Names,
    /// Names no usage points to.
    BareNames,
}

/// What a `sync()` flushed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStats {
    pub indexed_ids: u64,
    pub snapshot_written: bool,
}

// ============================================================================
// GraphStore Trait
// ============================================================================

/// The universal storage contract.
///
/// Reads take `&Self::Tx`, writes `&mut Self::Tx` so stores can keep an undo
/// log in the transaction.
#[async_trait]
pub trait GraphStore: Send + Sync + 'static {
    /// The transaction type for this store.
    type Tx: Transaction;

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Flush staged writes and make every id lookup consistent.
    async fn sync(&self) -> Result<SyncStats>;

    /// Shut the store down, flushing any pending writes. Further calls fail.
    async fn shutdown(&self) -> Result<()>;

    // ========================================================================
    // Transactions
    // ========================================================================

    /// Begin a new transaction. Fails if a write transaction is requested
    /// while another one is still open.
    async fn begin_tx(&self, mode: TxMode) -> Result<Self::Tx>;

    /// Commit a transaction.
    async fn commit_tx(&self, tx: Self::Tx) -> Result<()>;

    /// Roll back a transaction, reverting its writes.
    async fn rollback_tx(&self, tx: Self::Tx) -> Result<()>;

    // ========================================================================
    // Node CRUD
    // ========================================================================

    /// Persist a name node without any usage (a bare name).
    async fn create_name(&self, tx: &mut Self::Tx, name: Name) -> Result<NodeId>;

    /// Persist a usage on an existing name node. Returns the usage node id.
    async fn create_usage(&self, tx: &mut Self::Tx, name_node: NodeId, usage: NeoUsage) -> Result<NodeId>;

    /// Persist the usage's name, then the usage linked to it.
    /// The name inherits the usage id when it has none of its own.
    async fn create_name_and_usage(&self, tx: &mut Self::Tx, mut usage: NeoUsage) -> Result<NodeId> {
        if usage.usage.name.id.is_none() {
            usage.usage.name.id = usage.usage.id.clone();
        }
        let name_node = self.create_name(tx, usage.usage.name.clone()).await?;
        self.create_usage(tx, name_node, usage).await
    }

    /// Get a usage (with its current name) by node id.
    async fn usage(&self, tx: &Self::Tx, node: NodeId) -> Result<Option<NeoUsage>>;

    /// Get a name by node id.
    async fn name(&self, tx: &Self::Tx, node: NodeId) -> Result<Option<NeoName>>;

    /// Overwrite a usage and its name.
    async fn update_usage(&self, tx: &mut Self::Tx, usage: &NeoUsage) -> Result<()>;

    /// Overwrite a name.
    async fn update_name(&self, tx: &mut Self::Tx, name: &NeoName) -> Result<()>;

    /// Usage node of a name, if the name is used.
    async fn usages_of_name(&self, tx: &Self::Tx, name_node: NodeId) -> Result<Vec<NodeId>>;

    // ========================================================================
    // ID index
    // ========================================================================

    /// Synced usage lookup by source id.
    async fn usage_by_id(&self, tx: &Self::Tx, id: &str) -> Result<Option<NodeId>>;

    /// Synced name lookup by source id.
    async fn name_by_id(&self, tx: &Self::Tx, id: &str) -> Result<Option<NodeId>>;

    /// Whether an id is taken, including ids staged since the last sync.
    async fn id_exists(&self, tx: &Self::Tx, index: IndexType, id: &str) -> Result<bool>;

    // ========================================================================
    // Relationships
    // ========================================================================

    /// Create a typed relationship between two nodes.
    async fn create_relationship(
        &self,
        tx: &mut Self::Tx,
        src: NodeId,
        dst: NodeId,
        rel_type: RelType,
    ) -> Result<RelId>;

    /// Delete a relationship. Returns true if it existed.
    async fn delete_relationship(&self, tx: &mut Self::Tx, id: RelId) -> Result<bool>;

    /// Relationships of a node, optionally filtered by direction and type.
    async fn get_relationships(
        &self,
        tx: &Self::Tx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<RelType>,
    ) -> Result<Vec<Relationship>>;

    /// `parent -[PARENT_OF]-> child`
    async fn assign_parent(&self, tx: &mut Self::Tx, parent: NodeId, child: NodeId) -> Result<RelId> {
        self.create_relationship(tx, parent, child, RelType::ParentOf).await
    }

    /// `synonym -[SYNONYM_OF]-> accepted`
    async fn create_synonym_rel(&self, tx: &mut Self::Tx, synonym: NodeId, accepted: NodeId) -> Result<RelId> {
        self.create_relationship(tx, synonym, accepted, RelType::SynonymOf).await
    }

    /// Parent taxon of a usage, if any.
    async fn parent_of(&self, tx: &Self::Tx, child: NodeId) -> Result<Option<NodeId>> {
        let rels = self.get_relationships(tx, child, Direction::Incoming, Some(RelType::ParentOf)).await?;
        Ok(rels.first().map(|r| r.src))
    }

    /// Accepted targets of a synonym.
    async fn accepted_of(&self, tx: &Self::Tx, synonym: NodeId) -> Result<Vec<NodeId>> {
        let rels = self.get_relationships(tx, synonym, Direction::Outgoing, Some(RelType::SynonymOf)).await?;
        Ok(rels.into_iter().map(|r| r.dst).collect())
    }

    /// Basionym name node of a name node, if any.
    async fn basionym_of(&self, tx: &Self::Tx, name_node: NodeId) -> Result<Option<NodeId>> {
        let rels = self.get_relationships(tx, name_node, Direction::Outgoing, Some(RelType::HasBasionym)).await?;
        Ok(rels.first().map(|r| r.dst))
    }

    // ========================================================================
    // References and verbatim records
    // ========================================================================

    /// Store a reference. Returns false without storing if its id is taken.
    async fn create_reference(&self, tx: &mut Self::Tx, reference: Reference) -> Result<bool>;

    async fn reference_by_id(&self, tx: &Self::Tx, id: &str) -> Result<Option<Reference>>;

    async fn references(&self, tx: &Self::Tx) -> Result<Vec<Reference>>;

    /// Store a verbatim record and return its key.
    async fn create_verbatim(&self, tx: &mut Self::Tx, record: VerbatimRecord) -> Result<VerbatimKey>;

    async fn verbatim(&self, tx: &Self::Tx, key: VerbatimKey) -> Result<Option<VerbatimRecord>>;

    /// Attach an issue to a stored verbatim record.
    async fn add_issue(&self, tx: &mut Self::Tx, key: VerbatimKey, issue: Issue) -> Result<()>;

    /// Number of verbatim records carrying each issue.
    async fn issue_counts(&self, tx: &Self::Tx) -> Result<BTreeMap<Issue, u64>>;

    // ========================================================================
    // Scan and counts
    // ========================================================================

    /// Node ids matching a filter, in creation order.
    async fn node_ids(&self, tx: &Self::Tx, filter: NodeFilter) -> Result<Vec<NodeId>>;

    async fn node_count(&self, tx: &Self::Tx, filter: NodeFilter) -> Result<u64> {
        Ok(self.node_ids(tx, filter).await?.len() as u64)
    }

    async fn relationship_count(&self, tx: &Self::Tx, rel_type: Option<RelType>) -> Result<u64>;
}

// ============================================================================
// Batched scans
// ============================================================================

/// Per-node callback of [`process`].
#[async_trait]
pub trait NodeVisitor<S: GraphStore>: Send {
    async fn visit(&mut self, store: &S, tx: &mut S::Tx, node: NodeId) -> Result<()>;
}

/// Visit every node matching `filter` inside write transactions committed
/// every `batch_size` nodes.
///
/// The cancel flag is polled before each node. The first visitor error rolls
/// back the open batch and aborts the scan with [`Error::BatchAborted`];
/// earlier batches stay committed, so callers must re-run from scratch.
pub async fn process<S, V>(
    store: &S,
    filter: NodeFilter,
    batch_size: usize,
    cancel: &CancelFlag,
    visitor: &mut V,
) -> Result<u64>
where
    S: GraphStore,
    V: NodeVisitor<S>,
{
    let batch_size = batch_size.max(1) as u64;
    let ids = {
        let tx = store.begin_tx(TxMode::ReadOnly).await?;
        let ids = store.node_ids(&tx, filter).await?;
        store.commit_tx(tx).await?;
        ids
    };

    let mut tx = store.begin_tx(TxMode::ReadWrite).await?;
    let mut processed = 0u64;
    for node in ids {
        if let Err(e) = cancel.check() {
            store.rollback_tx(tx).await?;
            return Err(e);
        }
        if let Err(e) = visitor.visit(store, &mut tx, node).await {
            store.rollback_tx(tx).await?;
            return Err(Error::BatchAborted { processed, source: Box::new(e) });
        }
        processed += 1;
        if processed % batch_size == 0 {
            store.commit_tx(tx).await?;
            debug!(processed, ?filter, "committed batch");
            tx = store.begin_tx(TxMode::ReadWrite).await?;
        }
    }
    store.commit_tx(tx).await?;
    Ok(processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use memory::MemoryTx;

    /// Appends a suffix to every usage name; fails on one chosen node.
    struct Suffixer {
        fail_on: Option<NodeId>,
    }

    #[async_trait]
    impl NodeVisitor<MemoryStore> for Suffixer {
        async fn visit(&mut self, store: &MemoryStore, tx: &mut MemoryTx, node: NodeId) -> Result<()> {
            if self.fail_on == Some(node) {
                return Err(Error::Handler(format!("boom at {node}")));
            }
            let mut usage = store
                .usage(tx, node)
                .await?
                .ok_or_else(|| Error::NotFound(format!("{node}")))?;
            usage.usage.name.scientific_name.push_str(" x");
            store.update_usage(tx, &usage).await
        }
    }

    async fn store_with(n: usize) -> (MemoryStore, Vec<NodeId>) {
        let db = MemoryStore::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let mut ids = Vec::new();
        for i in 0..n {
            let usage = NeoUsage::new(Usage::taxon(format!("t{i}"), Name::new(format!("Abies{i}"), Rank::Genus)));
            ids.push(db.create_name_and_usage(&mut tx, usage).await.unwrap());
        }
        db.commit_tx(tx).await.unwrap();
        (db, ids)
    }

    #[tokio::test]
    async fn test_process_visits_every_node() {
        let (db, ids) = store_with(5).await;
        let processed = process(&db, NodeFilter::Usages, 2, &CancelFlag::new(), &mut Suffixer { fail_on: None })
            .await
            .unwrap();
        assert_eq!(processed, 5);

        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        for id in ids {
            let u = db.usage(&tx, id).await.unwrap().unwrap();
            assert!(u.usage.name.scientific_name.ends_with(" x"));
        }
    }

    #[tokio::test]
    async fn test_process_aborts_and_rolls_back_open_batch() {
        let (db, ids) = store_with(5).await;
        let mut visitor = Suffixer { fail_on: Some(ids[3]) };
        let err = process(&db, NodeFilter::Usages, 2, &CancelFlag::new(), &mut visitor)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::BatchAborted { processed: 3, .. }));

        // first batch committed, the half-done second batch reverted
        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        let names: Vec<String> = {
            let mut out = Vec::new();
            for id in &ids {
                out.push(db.usage(&tx, *id).await.unwrap().unwrap().usage.name.scientific_name);
            }
            out
        };
        assert_eq!(names, vec!["Abies0 x", "Abies1 x", "Abies2", "Abies3", "Abies4"]);
        // the writer slot was released
        db.commit_tx(tx).await.unwrap();
        assert!(db.begin_tx(TxMode::ReadWrite).await.is_ok());
    }

    #[tokio::test]
    async fn test_process_honours_cancel() {
        let (db, _) = store_with(3).await;
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = process(&db, NodeFilter::Usages, 10, &cancel, &mut Suffixer { fail_on: None })
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Interrupted));
    }
}
