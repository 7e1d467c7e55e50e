//! In-memory graph store.
//!
//! This is the reference implementation of `GraphStore`.
//! It uses arena maps keyed by integer ids, protected by RwLock.
//!
//! ## Behaviour
//!
//! - **Single writer**: one `ReadWrite` transaction at a time; a second
//!   `begin_tx(ReadWrite)` fails until the first is committed or rolled back.
//! - **Undo log**: writes are applied immediately and recorded in the
//!   transaction. `rollback_tx()` (or dropping an open write transaction)
//!   replays the log backwards.
//! - **Staged ids**: source ids of new names and usages are staged and only
//!   become visible to `usage_by_id` / `name_by_id` after `sync()`.
//! - **Snapshot**: with [`StoreConfig::Persistent`] every `sync()` and
//!   `shutdown()` writes `graph.json` into the data directory;
//!   [`MemoryStore::load`] reopens it read-only.

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path as FsPath, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::{DeferredRefs, GraphStore, NeoName, NeoUsage, NodeFilter, StoreConfig, SyncStats};
use crate::index::{DuplicateId, IdIndex, IndexType};
use crate::model::*;
use crate::tx::{Transaction, TxId, TxMode};
use crate::{Error, Result};

const SNAPSHOT_FILE: &str = "graph.json";

// ============================================================================
// MemoryStore
// ============================================================================

/// In-memory name/usage graph.
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

/// A usage as stored: the name lives in its own node and is joined on read.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct UsageRecord {
    name_node: NodeId,
    usage: Usage,
    refs: DeferredRefs,
    classification: Classification,
}

#[derive(Debug, Default)]
struct Indexes {
    usages: IdIndex,
    names: IdIndex,
    staged_usages: IdIndex,
    staged_names: IdIndex,
}

impl Indexes {
    fn pick(&mut self, index: IndexType) -> (&mut IdIndex, &mut IdIndex) {
        match index {
            IndexType::Name => (&mut self.names, &mut self.staged_names),
            _ => (&mut self.usages, &mut self.staged_usages),
        }
    }

    fn exists(&self, index: IndexType, id: &str) -> bool {
        match index {
            IndexType::Name => self.names.contains(id) || self.staged_names.contains(id),
            _ => self.usages.contains(id) || self.staged_usages.contains(id),
        }
    }

    fn stage(&mut self, index: IndexType, id: &str, node: NodeId) -> std::result::Result<(), DuplicateId> {
        let (synced, staged) = self.pick(index);
        if let Some(existing) = synced.get(id) {
            return Err(DuplicateId { id: id.to_string(), existing });
        }
        staged.insert(id, node)
    }

    fn unstage(&mut self, index: IndexType, id: &str) {
        let (synced, staged) = self.pick(index);
        staged.remove(id);
        synced.remove(id);
    }

    /// Move staged entries into the synced indexes.
    fn flush(&mut self) -> u64 {
        let mut moved = 0;
        for (id, node) in self.staged_usages.drain() {
            // stage() already rejected duplicates
            let _ = self.usages.insert(&id, node);
            moved += 1;
        }
        for (id, node) in self.staged_names.drain() {
            let _ = self.names.insert(&id, node);
            moved += 1;
        }
        moved
    }
}

struct MemoryInner {
    names: RwLock<HashMap<NodeId, Name>>,
    usages: RwLock<HashMap<NodeId, UsageRecord>>,
    /// name node → usage nodes
    name_usages: RwLock<HashMap<NodeId, Vec<NodeId>>>,
    relationships: RwLock<HashMap<RelId, Relationship>>,
    /// node_id → list of relationship IDs
    adjacency: RwLock<HashMap<NodeId, Vec<RelId>>>,
    indexes: RwLock<Indexes>,
    references: RwLock<Vec<Reference>>,
    reference_index: RwLock<HashMap<String, usize>>,
    verbatim: RwLock<Vec<VerbatimRecord>>,
    next_node_id: AtomicU64,
    next_rel_id: AtomicU64,
    next_tx_id: AtomicU64,
    writer: Mutex<Option<TxId>>,
    data_dir: Option<PathBuf>,
    read_only: bool,
    closed: AtomicBool,
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore")
            .field("names", &self.inner.names.read().len())
            .field("usages", &self.inner.usages.read().len())
            .field("relationships", &self.inner.relationships.read().len())
            .field("data_dir", &self.inner.data_dir)
            .field("read_only", &self.inner.read_only)
            .field("closed", &self.inner.closed.load(Ordering::Relaxed))
            .finish()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_inner(MemoryInner::empty(None, false))
    }

    /// Open a store for the given configuration. A persistent store starts
    /// empty and overwrites any snapshot in its directory on the next sync.
    pub fn open(config: &StoreConfig) -> Result<Self> {
        match config {
            StoreConfig::Memory => Ok(Self::new()),
            StoreConfig::Persistent { data_dir } => {
                fs::create_dir_all(data_dir)?;
                debug!(dir = %data_dir.display(), "opened persistent memory store");
                Ok(Self::with_inner(MemoryInner::empty(Some(data_dir.clone()), false)))
            }
        }
    }

    /// Reopen the snapshot in `data_dir` read-only.
    pub fn load(data_dir: impl AsRef<FsPath>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let file = File::open(data_dir.join(SNAPSHOT_FILE))?;
        let snapshot: Snapshot = serde_json::from_reader(BufReader::new(file))?;
        let inner = MemoryInner::empty(Some(data_dir.to_path_buf()), true);
        inner.restore(snapshot)?;
        info!(dir = %data_dir.display(), "loaded graph snapshot");
        Ok(Self::with_inner(inner))
    }

    fn with_inner(inner: MemoryInner) -> Self {
        Self { inner: Arc::new(inner) }
    }

    /// Directory of the on-disk snapshot, if persistent.
    pub fn data_dir(&self) -> Option<&FsPath> {
        self.inner.data_dir.as_deref()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryInner {
    fn empty(data_dir: Option<PathBuf>, read_only: bool) -> Self {
        Self {
            names: RwLock::new(HashMap::new()),
            usages: RwLock::new(HashMap::new()),
            name_usages: RwLock::new(HashMap::new()),
            relationships: RwLock::new(HashMap::new()),
            adjacency: RwLock::new(HashMap::new()),
            indexes: RwLock::new(Indexes::default()),
            references: RwLock::new(Vec::new()),
            reference_index: RwLock::new(HashMap::new()),
            verbatim: RwLock::new(Vec::new()),
            next_node_id: AtomicU64::new(1),
            next_rel_id: AtomicU64::new(1),
            next_tx_id: AtomicU64::new(1),
            writer: Mutex::new(None),
            data_dir,
            read_only,
            closed: AtomicBool::new(false),
        }
    }

    fn node_exists(&self, id: NodeId) -> bool {
        self.names.read().contains_key(&id) || self.usages.read().contains_key(&id)
    }

    fn insert_rel(&self, rel: Relationship) {
        let (id, src, dst) = (rel.id, rel.src, rel.dst);
        self.relationships.write().insert(id, rel);
        let mut adj = self.adjacency.write();
        adj.entry(src).or_default().push(id);
        if src != dst {
            adj.entry(dst).or_default().push(id);
        }
    }

    fn remove_rel(&self, id: RelId) -> Option<Relationship> {
        let removed = self.relationships.write().remove(&id);
        if let Some(rel) = &removed {
            let mut adj = self.adjacency.write();
            if let Some(rels) = adj.get_mut(&rel.src) {
                rels.retain(|rid| *rid != id);
            }
            if rel.src != rel.dst {
                if let Some(rels) = adj.get_mut(&rel.dst) {
                    rels.retain(|rid| *rid != id);
                }
            }
        }
        removed
    }

    /// Drop a node and every relationship touching it.
    fn remove_node_rels(&self, node: NodeId) {
        let rel_ids = self.adjacency.write().remove(&node).unwrap_or_default();
        for rid in rel_ids {
            self.remove_rel(rid);
        }
    }

    /// Replay an undo log backwards.
    fn revert(&self, log: Vec<Undo>) {
        for op in log.into_iter().rev() {
            match op {
                Undo::CreateName(node) => {
                    if let Some(name) = self.names.write().remove(&node) {
                        if let Some(id) = &name.id {
                            self.indexes.write().unstage(IndexType::Name, id);
                        }
                    }
                    self.name_usages.write().remove(&node);
                    self.remove_node_rels(node);
                }
                Undo::CreateUsage(node) => {
                    if let Some(rec) = self.usages.write().remove(&node) {
                        if let Some(id) = &rec.usage.id {
                            self.indexes.write().unstage(IndexType::Usage, id);
                        }
                        if let Some(list) = self.name_usages.write().get_mut(&rec.name_node) {
                            list.retain(|u| *u != node);
                        }
                    }
                    self.remove_node_rels(node);
                }
                Undo::UpdateName(node, name) => {
                    self.names.write().insert(node, name);
                }
                Undo::UpdateUsage(node, rec, name) => {
                    self.names.write().insert(rec.name_node, name);
                    self.usages.write().insert(node, *rec);
                }
                Undo::CreateRel(id) => {
                    self.remove_rel(id);
                }
                Undo::DeleteRel(rel) => self.insert_rel(rel),
                Undo::CreateReference => {
                    if let Some(r) = self.references.write().pop() {
                        if let Some(id) = &r.id {
                            self.reference_index.write().remove(id);
                        }
                    }
                }
                Undo::CreateVerbatim => {
                    self.verbatim.write().pop();
                }
                Undo::AddIssue(key, issue) => {
                    if let Some(rec) = self.verbatim.write().get_mut(key.0 as usize - 1) {
                        rec.issues.remove(&issue);
                    }
                }
            }
        }
    }

    fn release_writer(&self, id: TxId) {
        let mut writer = self.writer.lock();
        if *writer == Some(id) {
            *writer = None;
        }
    }

    fn usage_view(&self, node: NodeId, rec: &UsageRecord) -> NeoUsage {
        let mut usage = rec.usage.clone();
        if let Some(name) = self.names.read().get(&rec.name_node) {
            usage.name = name.clone();
        }
        NeoUsage {
            node,
            name_node: rec.name_node,
            usage,
            refs: rec.refs.clone(),
            classification: rec.classification.clone(),
        }
    }

    fn has_incoming(&self, node: NodeId, rel_type: RelType) -> bool {
        let adj = self.adjacency.read();
        let rels = self.relationships.read();
        adj.get(&node)
            .map(|ids| {
                ids.iter()
                    .filter_map(|rid| rels.get(rid))
                    .any(|r| r.dst == node && r.rel_type == rel_type)
            })
            .unwrap_or(false)
    }

    // ========================================================================
    // Snapshot
    // ========================================================================

    fn write_snapshot(&self) -> Result<bool> {
        let Some(dir) = &self.data_dir else {
            return Ok(false);
        };
        if self.read_only {
            return Ok(false);
        }
        fs::create_dir_all(dir)?;

        let names = self.names.read();
        let usages = self.usages.read();
        let rels = self.relationships.read();
        let references = self.references.read();
        let verbatim = self.verbatim.read();

        let mut name_list: Vec<_> = names.iter().collect();
        name_list.sort_by_key(|(id, _)| **id);
        let mut usage_list: Vec<_> = usages.iter().collect();
        usage_list.sort_by_key(|(id, _)| **id);
        let mut rel_list: Vec<_> = rels.values().collect();
        rel_list.sort_by_key(|r| r.id);

        let snapshot = SnapshotRef {
            names: name_list,
            usages: usage_list,
            relationships: rel_list,
            references: &references,
            verbatim: &verbatim,
            next_node_id: self.next_node_id.load(Ordering::SeqCst),
            next_rel_id: self.next_rel_id.load(Ordering::SeqCst),
        };

        let tmp = dir.join(format!("{SNAPSHOT_FILE}.tmp"));
        {
            let writer = BufWriter::new(File::create(&tmp)?);
            serde_json::to_writer(writer, &snapshot)?;
        }
        fs::rename(&tmp, dir.join(SNAPSHOT_FILE))?;
        debug!(dir = %dir.display(), names = names.len(), usages = usages.len(), "wrote graph snapshot");
        Ok(true)
    }

    fn restore(&self, snapshot: Snapshot) -> Result<()> {
        let mut indexes = self.indexes.write();
        {
            let mut names = self.names.write();
            for (node, name) in snapshot.names {
                if let Some(id) = &name.id {
                    indexes.names.insert(id, node).map_err(|d| {
                        Error::StorageError(format!("snapshot has duplicate name id {}", d.id))
                    })?;
                }
                names.insert(node, name);
            }
        }
        {
            let mut usages = self.usages.write();
            let mut name_usages = self.name_usages.write();
            for (node, rec) in snapshot.usages {
                if let Some(id) = &rec.usage.id {
                    indexes.usages.insert(id, node).map_err(|d| {
                        Error::StorageError(format!("snapshot has duplicate usage id {}", d.id))
                    })?;
                }
                name_usages.entry(rec.name_node).or_default().push(node);
                usages.insert(node, rec);
            }
        }
        for rel in snapshot.relationships {
            self.insert_rel(rel);
        }
        {
            let mut index = self.reference_index.write();
            for (i, r) in snapshot.references.iter().enumerate() {
                if let Some(id) = &r.id {
                    index.insert(id.clone(), i);
                }
            }
        }
        *self.references.write() = snapshot.references;
        *self.verbatim.write() = snapshot.verbatim;
        self.next_node_id.store(snapshot.next_node_id, Ordering::SeqCst);
        self.next_rel_id.store(snapshot.next_rel_id, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Serialize)]
struct SnapshotRef<'a> {
    names: Vec<(&'a NodeId, &'a Name)>,
    usages: Vec<(&'a NodeId, &'a UsageRecord)>,
    relationships: Vec<&'a Relationship>,
    references: &'a [Reference],
    verbatim: &'a [VerbatimRecord],
    next_node_id: u64,
    next_rel_id: u64,
}

#[derive(Deserialize)]
struct Snapshot {
    names: Vec<(NodeId, Name)>,
    usages: Vec<(NodeId, UsageRecord)>,
    relationships: Vec<Relationship>,
    references: Vec<Reference>,
    verbatim: Vec<VerbatimRecord>,
    next_node_id: u64,
    next_rel_id: u64,
}

// ============================================================================
// MemoryTx
// ============================================================================

enum Undo {
    CreateName(NodeId),
    CreateUsage(NodeId),
    UpdateName(NodeId, Name),
    UpdateUsage(NodeId, Box<UsageRecord>, Name),
    CreateRel(RelId),
    DeleteRel(Relationship),
    CreateReference,
    CreateVerbatim,
    AddIssue(VerbatimKey, Issue),
}

/// In-memory transaction. A write transaction dropped without commit is
/// rolled back.
pub struct MemoryTx {
    id: TxId,
    mode: TxMode,
    undo: Vec<Undo>,
    inner: Arc<MemoryInner>,
    finished: bool,
}

impl MemoryTx {
    fn writable(&mut self) -> Result<&mut Vec<Undo>> {
        if self.mode != TxMode::ReadWrite {
            return Err(Error::TxError(format!("write in read-only transaction {}", self.id)));
        }
        Ok(&mut self.undo)
    }

    fn finish(mut self) -> Vec<Undo> {
        self.finished = true;
        if self.mode == TxMode::ReadWrite {
            self.inner.release_writer(self.id);
        }
        std::mem::take(&mut self.undo)
    }
}

impl Transaction for MemoryTx {
    fn mode(&self) -> TxMode { self.mode }
    fn id(&self) -> TxId { self.id }
}

impl Drop for MemoryTx {
    fn drop(&mut self) {
        if self.finished || self.mode != TxMode::ReadWrite {
            return;
        }
        warn!(tx = %self.id, ops = self.undo.len(), "write transaction dropped without commit, rolling back");
        self.inner.revert(std::mem::take(&mut self.undo));
        self.inner.release_writer(self.id);
    }
}

// ============================================================================
// GraphStore impl
// ============================================================================

#[async_trait]
impl GraphStore for MemoryStore {
    type Tx = MemoryTx;

    async fn sync(&self) -> Result<SyncStats> {
        let indexed_ids = self.inner.indexes.write().flush();
        let snapshot_written = self.inner.write_snapshot()?;
        debug!(indexed_ids, snapshot_written, "store synced");
        Ok(SyncStats { indexed_ids, snapshot_written })
    }

    async fn shutdown(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        self.inner.indexes.write().flush();
        self.inner.write_snapshot()?;
        debug!("store shut down");
        Ok(())
    }

    async fn begin_tx(&self, mode: TxMode) -> Result<MemoryTx> {
        let id = TxId(self.inner.next_tx_id.fetch_add(1, Ordering::Relaxed));
        if mode == TxMode::ReadWrite {
            if self.inner.read_only {
                return Err(Error::StorageError("store is opened read-only".into()));
            }
            if self.inner.closed.load(Ordering::SeqCst) {
                return Err(Error::StorageError("store is shut down".into()));
            }
            let mut writer = self.inner.writer.lock();
            if let Some(open) = *writer {
                return Err(Error::TxError(format!("write transaction {open} is still open")));
            }
            *writer = Some(id);
        }
        Ok(MemoryTx { id, mode, undo: Vec::new(), inner: Arc::clone(&self.inner), finished: false })
    }

    async fn commit_tx(&self, tx: MemoryTx) -> Result<()> {
        let ops = tx.finish().len();
        if ops > 0 {
            debug!(ops, "committed");
        }
        Ok(())
    }

    async fn rollback_tx(&self, tx: MemoryTx) -> Result<()> {
        let log = tx.finish();
        debug!(ops = log.len(), "rolling back");
        self.inner.revert(log);
        Ok(())
    }

    // ========================================================================
    // Node CRUD
    // ========================================================================

    async fn create_name(&self, tx: &mut MemoryTx, name: Name) -> Result<NodeId> {
        let undo = tx.writable()?;
        let node = NodeId(self.inner.next_node_id.fetch_add(1, Ordering::Relaxed));
        if let Some(id) = &name.id {
            self.inner.indexes.write().stage(IndexType::Name, id, node).map_err(|d| {
                Error::ConstraintViolation(format!("name id {} already used by node {}", d.id, d.existing))
            })?;
        }
        self.inner.names.write().insert(node, name);
        undo.push(Undo::CreateName(node));
        Ok(node)
    }

    async fn create_usage(&self, tx: &mut MemoryTx, name_node: NodeId, usage: NeoUsage) -> Result<NodeId> {
        let undo = tx.writable()?;
        if !self.inner.names.read().contains_key(&name_node) {
            return Err(Error::NotFound(format!("Name node {name_node}")));
        }
        let node = NodeId(self.inner.next_node_id.fetch_add(1, Ordering::Relaxed));
        if let Some(id) = &usage.usage.id {
            self.inner.indexes.write().stage(IndexType::Usage, id, node).map_err(|d| {
                Error::ConstraintViolation(format!("usage id {} already used by node {}", d.id, d.existing))
            })?;
        }
        let mut record = UsageRecord {
            name_node,
            usage: usage.usage,
            refs: usage.refs,
            classification: usage.classification,
        };
        record.usage.name = Name::default();

        self.inner.usages.write().insert(node, record);
        self.inner.name_usages.write().entry(name_node).or_default().push(node);
        undo.push(Undo::CreateUsage(node));
        Ok(node)
    }

    async fn usage(&self, _tx: &MemoryTx, node: NodeId) -> Result<Option<NeoUsage>> {
        let usages = self.inner.usages.read();
        Ok(usages.get(&node).map(|rec| self.inner.usage_view(node, rec)))
    }

    async fn name(&self, _tx: &MemoryTx, node: NodeId) -> Result<Option<NeoName>> {
        Ok(self.inner.names.read().get(&node).map(|name| NeoName { node, name: name.clone() }))
    }

    async fn update_usage(&self, tx: &mut MemoryTx, usage: &NeoUsage) -> Result<()> {
        let undo = tx.writable()?;
        let mut usages = self.inner.usages.write();
        let rec = usages
            .get_mut(&usage.node)
            .ok_or_else(|| Error::NotFound(format!("Usage node {}", usage.node)))?;
        if rec.usage.id != usage.usage.id {
            return Err(Error::ConstraintViolation(format!("usage {} id cannot change", usage.node)));
        }
        let mut names = self.inner.names.write();
        let old_name = names
            .insert(rec.name_node, usage.usage.name.clone())
            .unwrap_or_default();

        let mut next = UsageRecord {
            name_node: rec.name_node,
            usage: usage.usage.clone(),
            refs: usage.refs.clone(),
            classification: usage.classification.clone(),
        };
        next.usage.name = Name::default();
        let old = std::mem::replace(rec, next);
        undo.push(Undo::UpdateUsage(usage.node, Box::new(old), old_name));
        Ok(())
    }

    async fn update_name(&self, tx: &mut MemoryTx, name: &NeoName) -> Result<()> {
        let undo = tx.writable()?;
        let mut names = self.inner.names.write();
        let slot = names
            .get_mut(&name.node)
            .ok_or_else(|| Error::NotFound(format!("Name node {}", name.node)))?;
        if slot.id != name.name.id {
            return Err(Error::ConstraintViolation(format!("name {} id cannot change", name.node)));
        }
        let old = std::mem::replace(slot, name.name.clone());
        undo.push(Undo::UpdateName(name.node, old));
        Ok(())
    }

    async fn usages_of_name(&self, _tx: &MemoryTx, name_node: NodeId) -> Result<Vec<NodeId>> {
        Ok(self.inner.name_usages.read().get(&name_node).cloned().unwrap_or_default())
    }

    // ========================================================================
    // ID index
    // ========================================================================

    async fn usage_by_id(&self, _tx: &MemoryTx, id: &str) -> Result<Option<NodeId>> {
        Ok(self.inner.indexes.read().usages.get(id))
    }

    async fn name_by_id(&self, _tx: &MemoryTx, id: &str) -> Result<Option<NodeId>> {
        Ok(self.inner.indexes.read().names.get(id))
    }

    async fn id_exists(&self, _tx: &MemoryTx, index: IndexType, id: &str) -> Result<bool> {
        Ok(match index {
            IndexType::Reference => self.inner.reference_index.read().contains_key(id),
            other => self.inner.indexes.read().exists(other, id),
        })
    }

    // ========================================================================
    // Relationships
    // ========================================================================

    async fn create_relationship(
        &self,
        tx: &mut MemoryTx,
        src: NodeId,
        dst: NodeId,
        rel_type: RelType,
    ) -> Result<RelId> {
        let undo = tx.writable()?;
        // Verify both nodes exist
        if !self.inner.node_exists(src) {
            return Err(Error::NotFound(format!("Source node {src}")));
        }
        if !self.inner.node_exists(dst) {
            return Err(Error::NotFound(format!("Target node {dst}")));
        }
        let id = RelId(self.inner.next_rel_id.fetch_add(1, Ordering::Relaxed));
        self.inner.insert_rel(Relationship::new(id, src, dst, rel_type));
        undo.push(Undo::CreateRel(id));
        Ok(id)
    }

    async fn delete_relationship(&self, tx: &mut MemoryTx, id: RelId) -> Result<bool> {
        let undo = tx.writable()?;
        match self.inner.remove_rel(id) {
            Some(rel) => {
                undo.push(Undo::DeleteRel(rel));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_relationships(
        &self,
        _tx: &MemoryTx,
        node: NodeId,
        dir: Direction,
        rel_type: Option<RelType>,
    ) -> Result<Vec<Relationship>> {
        let adj = self.inner.adjacency.read();
        let rels = self.inner.relationships.read();

        let Some(rel_ids) = adj.get(&node) else {
            return Ok(Vec::new());
        };
        let mut result: Vec<Relationship> = rel_ids
            .iter()
            .filter_map(|rid| rels.get(rid))
            .filter(|rel| rel.matches(node, dir))
            .filter(|rel| rel_type.is_none_or(|t| rel.rel_type == t))
            .cloned()
            .collect();
        result.sort_by_key(|r| r.id);
        Ok(result)
    }

    // ========================================================================
    // References and verbatim records
    // ========================================================================

    async fn create_reference(&self, tx: &mut MemoryTx, reference: Reference) -> Result<bool> {
        let undo = tx.writable()?;
        let mut references = self.inner.references.write();
        if let Some(id) = &reference.id {
            let mut index = self.inner.reference_index.write();
            if index.contains_key(id) {
                return Ok(false);
            }
            index.insert(id.clone(), references.len());
        }
        references.push(reference);
        undo.push(Undo::CreateReference);
        Ok(true)
    }

    async fn reference_by_id(&self, _tx: &MemoryTx, id: &str) -> Result<Option<Reference>> {
        let references = self.inner.references.read();
        let pos = self.inner.reference_index.read().get(id).copied();
        Ok(pos.and_then(|i| references.get(i).cloned()))
    }

    async fn references(&self, _tx: &MemoryTx) -> Result<Vec<Reference>> {
        Ok(self.inner.references.read().clone())
    }

    async fn create_verbatim(&self, tx: &mut MemoryTx, mut record: VerbatimRecord) -> Result<VerbatimKey> {
        let undo = tx.writable()?;
        let mut verbatim = self.inner.verbatim.write();
        let key = VerbatimKey(verbatim.len() as u64 + 1);
        record.key = Some(key);
        verbatim.push(record);
        undo.push(Undo::CreateVerbatim);
        Ok(key)
    }

    async fn verbatim(&self, _tx: &MemoryTx, key: VerbatimKey) -> Result<Option<VerbatimRecord>> {
        let idx = (key.0 as usize).checked_sub(1);
        Ok(idx.and_then(|i| self.inner.verbatim.read().get(i).cloned()))
    }

    async fn add_issue(&self, tx: &mut MemoryTx, key: VerbatimKey, issue: Issue) -> Result<()> {
        let undo = tx.writable()?;
        let mut verbatim = self.inner.verbatim.write();
        let rec = (key.0 as usize)
            .checked_sub(1)
            .and_then(|i| verbatim.get_mut(i))
            .ok_or_else(|| Error::NotFound(format!("Verbatim record {key}")))?;
        if rec.issues.insert(issue) {
            undo.push(Undo::AddIssue(key, issue));
        }
        Ok(())
    }

    async fn issue_counts(&self, _tx: &MemoryTx) -> Result<BTreeMap<Issue, u64>> {
        let mut counts = BTreeMap::new();
        for rec in self.inner.verbatim.read().iter() {
            for issue in &rec.issues {
                *counts.entry(*issue).or_insert(0) += 1;
            }
        }
        Ok(counts)
    }

    // ========================================================================
    // Scan and counts
    // ========================================================================

    async fn node_ids(&self, _tx: &MemoryTx, filter: NodeFilter) -> Result<Vec<NodeId>> {
        let mut ids: Vec<NodeId> = match filter {
            NodeFilter::Names => self.inner.names.read().keys().copied().collect(),
            NodeFilter::BareNames => {
                let name_usages = self.inner.name_usages.read();
                self.inner
                    .names
                    .read()
                    .keys()
                    .filter(|n| name_usages.get(*n).is_none_or(|u| u.is_empty()))
                    .copied()
                    .collect()
            }
            NodeFilter::Usages => self.inner.usages.read().keys().copied().collect(),
            NodeFilter::Taxa | NodeFilter::Synonyms | NodeFilter::Roots => {
                let usages = self.inner.usages.read();
                usages
                    .iter()
                    .filter(|(node, rec)| match filter {
                        NodeFilter::Synonyms => rec.usage.is_synonym(),
                        NodeFilter::Roots => {
                            rec.usage.is_taxon() && !self.inner.has_incoming(**node, RelType::ParentOf)
                        }
                        _ => rec.usage.is_taxon(),
                    })
                    .map(|(node, _)| *node)
                    .collect()
            }
        };
        ids.sort_unstable();
        Ok(ids)
    }

    async fn relationship_count(&self, _tx: &MemoryTx, rel_type: Option<RelType>) -> Result<u64> {
        let rels = self.inner.relationships.read();
        Ok(match rel_type {
            None => rels.len() as u64,
            Some(t) => rels.values().filter(|r| r.rel_type == t).count() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn taxon(id: &str, sci: &str, rank: Rank) -> NeoUsage {
        NeoUsage::new(Usage::taxon(id, Name::new(sci, rank)))
    }

    #[tokio::test]
    async fn test_debug_shows_sizes() {
        let db = MemoryStore::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        db.create_name_and_usage(&mut tx, taxon("1", "Abies", Rank::Genus)).await.unwrap();
        db.commit_tx(tx).await.unwrap();
        let out = format!("{db:?}");
        assert!(out.starts_with("MemoryStore"));
        assert!(out.contains("usages: 1"));
        assert!(out.contains("closed: false"));
    }

    #[tokio::test]
    async fn test_insert_sync_lookup_roundtrip() {
        let db = MemoryStore::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();

        let mut usage = taxon("t1", "Abies alba", Rank::Species);
        usage.usage.name.authorship = Some("Mill.".into());
        usage.refs.parent_id = Some("t0".into());
        let node = db.create_name_and_usage(&mut tx, usage.clone()).await.unwrap();
        db.commit_tx(tx).await.unwrap();

        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        assert_eq!(db.usage_by_id(&tx, "t1").await.unwrap(), None);
        db.sync().await.unwrap();
        assert_eq!(db.usage_by_id(&tx, "t1").await.unwrap(), Some(node));

        let stored = db.usage(&tx, node).await.unwrap().unwrap();
        let mut expected = usage;
        expected.usage.name.id = Some("t1".into());
        assert_eq!(stored.usage, expected.usage);
        assert_eq!(stored.refs, expected.refs);
        assert_eq!(db.name_by_id(&tx, "t1").await.unwrap(), Some(stored.name_node));
    }

    #[tokio::test]
    async fn test_duplicate_usage_id_rejected() {
        let db = MemoryStore::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        db.create_name_and_usage(&mut tx, taxon("t1", "Abies", Rank::Genus)).await.unwrap();
        assert!(db.id_exists(&tx, IndexType::Usage, "t1").await.unwrap());

        let mut dup = taxon("t1", "Picea", Rank::Genus);
        dup.usage.name.id = Some("n2".into());
        let result = db.create_name_and_usage(&mut tx, dup).await;
        assert!(matches!(result, Err(Error::ConstraintViolation(_))));
    }

    #[tokio::test]
    async fn test_single_writer() {
        let db = MemoryStore::new();
        let tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        assert!(db.begin_tx(TxMode::ReadWrite).await.is_err());
        // readers may overlap
        let ro = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        db.commit_tx(ro).await.unwrap();
        db.commit_tx(tx).await.unwrap();
        assert!(db.begin_tx(TxMode::ReadWrite).await.is_ok());
    }

    #[tokio::test]
    async fn test_read_only_tx_cannot_write() {
        let db = MemoryStore::new();
        let mut tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        let result = db.create_name(&mut tx, Name::new("Abies", Rank::Genus)).await;
        assert!(matches!(result, Err(Error::TxError(_))));
    }

    #[tokio::test]
    async fn test_rollback_reverts_writes() {
        let db = MemoryStore::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let a = db.create_name_and_usage(&mut tx, taxon("a", "Abies", Rank::Genus)).await.unwrap();
        db.commit_tx(tx).await.unwrap();

        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let b = db.create_name_and_usage(&mut tx, taxon("b", "Abies alba", Rank::Species)).await.unwrap();
        db.assign_parent(&mut tx, a, b).await.unwrap();
        let mut ua = db.usage(&tx, a).await.unwrap().unwrap();
        ua.usage.name.scientific_name = "Picea".into();
        db.update_usage(&mut tx, &ua).await.unwrap();
        db.rollback_tx(tx).await.unwrap();

        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        assert!(db.usage(&tx, b).await.unwrap().is_none());
        assert_eq!(db.relationship_count(&tx, None).await.unwrap(), 0);
        assert!(!db.id_exists(&tx, IndexType::Usage, "b").await.unwrap());
        let ua = db.usage(&tx, a).await.unwrap().unwrap();
        assert_eq!(ua.usage.name.scientific_name, "Abies");
    }

    #[tokio::test]
    async fn test_dropped_write_tx_rolls_back_and_releases() {
        let db = MemoryStore::new();
        {
            let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
            db.create_name(&mut tx, Name::new("Abies", Rank::Genus)).await.unwrap();
        }
        let tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        assert_eq!(db.node_count(&tx, NodeFilter::Names).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_relationships_by_direction_and_type() {
        let db = MemoryStore::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let g = db.create_name_and_usage(&mut tx, taxon("g", "Abies", Rank::Genus)).await.unwrap();
        let s = db.create_name_and_usage(&mut tx, taxon("s", "Abies alba", Rank::Species)).await.unwrap();
        let syn = db
            .create_name_and_usage(&mut tx, NeoUsage::new(Usage::synonym("x", Name::new("Pinus picea", Rank::Species))))
            .await
            .unwrap();
        db.assign_parent(&mut tx, g, s).await.unwrap();
        db.create_synonym_rel(&mut tx, syn, s).await.unwrap();

        assert_eq!(db.parent_of(&tx, s).await.unwrap(), Some(g));
        assert_eq!(db.accepted_of(&tx, syn).await.unwrap(), vec![s]);
        let incoming = db.get_relationships(&tx, s, Direction::Incoming, None).await.unwrap();
        assert_eq!(incoming.len(), 2);
        let outgoing = db.get_relationships(&tx, s, Direction::Outgoing, None).await.unwrap();
        assert!(outgoing.is_empty());

        assert_eq!(db.node_ids(&tx, NodeFilter::Roots).await.unwrap(), vec![g]);
        assert_eq!(db.node_ids(&tx, NodeFilter::Synonyms).await.unwrap(), vec![syn]);
        assert_eq!(db.node_count(&tx, NodeFilter::Taxa).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_issue_counts() {
        let db = MemoryStore::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let k1 = db.create_verbatim(&mut tx, VerbatimRecord::default()).await.unwrap();
        let k2 = db.create_verbatim(&mut tx, VerbatimRecord::default()).await.unwrap();
        db.add_issue(&mut tx, k1, Issue::ParentIdInvalid).await.unwrap();
        db.add_issue(&mut tx, k1, Issue::ParentIdInvalid).await.unwrap();
        db.add_issue(&mut tx, k2, Issue::ParentIdInvalid).await.unwrap();
        db.add_issue(&mut tx, k2, Issue::ChainedSynonym).await.unwrap();

        let counts = db.issue_counts(&tx).await.unwrap();
        assert_eq!(counts.get(&Issue::ParentIdInvalid), Some(&2));
        assert_eq!(counts.get(&Issue::ChainedSynonym), Some(&1));
        assert!(db.add_issue(&mut tx, VerbatimKey(99), Issue::IdMissing).await.is_err());
    }

    #[tokio::test]
    async fn test_snapshot_load_is_read_only() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::Persistent { data_dir: dir.path().to_path_buf() };
        let db = MemoryStore::open(&config).unwrap();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let g = db.create_name_and_usage(&mut tx, taxon("g", "Abies", Rank::Genus)).await.unwrap();
        let s = db.create_name_and_usage(&mut tx, taxon("s", "Abies alba", Rank::Species)).await.unwrap();
        db.assign_parent(&mut tx, g, s).await.unwrap();
        let mut r = Reference::new(Some("r1".into()));
        r.citation = Some("Mill. 1768".into());
        db.create_reference(&mut tx, r).await.unwrap();
        db.commit_tx(tx).await.unwrap();
        db.shutdown().await.unwrap();
        assert!(db.begin_tx(TxMode::ReadWrite).await.is_err());

        let loaded = MemoryStore::load(dir.path()).unwrap();
        let tx = loaded.begin_tx(TxMode::ReadOnly).await.unwrap();
        assert_eq!(loaded.usage_by_id(&tx, "s").await.unwrap(), Some(s));
        assert_eq!(loaded.parent_of(&tx, s).await.unwrap(), Some(g));
        assert!(loaded.reference_by_id(&tx, "r1").await.unwrap().is_some());
        assert!(loaded.begin_tx(TxMode::ReadWrite).await.is_err());
    }
}
