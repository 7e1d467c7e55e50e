//! # Tree Walker
//!
//! Depth-first walk of the usage graph in taxonomic order, driving
//! start/end handlers.
//!
//! ```text
//!   paths emitted           handler calls
//!   [P]                     start P
//!   [P, A]                  start A
//!   [P, A, *s]              start *s
//!   [P, B]                  end *s, end A, start B
//!   (done)                  end B, end P
//! ```
//!
//! Each emitted path is compared with the previous one: nodes past the common
//! prefix of the old path are closed innermost first, nodes past it on the new
//! path are opened outermost first. Handlers can therefore keep a nesting
//! stack without the walker holding the tree in memory.
//!
//! ## Traversals
//!
//! | Traversal | Synonyms | Child order |
//! |-----------|----------|-------------|
//! | `Sorted` | yes | [`TaxonomicOrder`] |
//! | `Unsorted` | yes | [`InsertionOrder`] |
//! | `AcceptedOnly` | no | [`TaxonomicOrder`] |
//!
//! Under an accepted node synonyms come first, then child taxa. A pro parte
//! synonym is emitted once per `SYNONYM_OF` edge. A node already on the
//! current path is never expanded again, so parent cycles cannot loop.

pub mod cycles;
pub mod handlers;

use std::cmp::Ordering;
use std::ops::Range;
use std::sync::Arc;

use tracing::debug;

use crate::model::{Direction, NodeId, Path, Rank, RelType, Relationship};
use crate::storage::{GraphStore, NeoUsage, NodeFilter};
use crate::tx::CancelFlag;
use crate::{Error, Result};

pub use cycles::{ParentCycle, detect_cycles};
pub use handlers::CountingHandler;

// ============================================================================
// Handlers and walk nodes
// ============================================================================

/// A usage as seen by handlers.
#[derive(Debug, Clone, PartialEq)]
pub struct WalkNode {
    pub node: NodeId,
    pub usage: NeoUsage,
    /// Position on the path; roots are at depth 0.
    pub depth: usize,
    /// Edge type that led here; `None` for the walk root.
    pub via: Option<RelType>,
    /// A synonym whose name is the basionym of the accepted name it hangs under.
    pub is_basionym: bool,
}

impl WalkNode {
    pub fn is_synonym(&self) -> bool {
        self.via == Some(RelType::SynonymOf) || self.usage.is_synonym()
    }
}

/// Receives every node of a walk twice: once opened, once closed.
///
/// Errors abort the walk. Output already written is the caller's to clean up.
pub trait StartEndHandler: Send {
    fn start(&mut self, node: &WalkNode) -> Result<()>;
    fn end(&mut self, node: &WalkNode) -> Result<()>;
}

// ============================================================================
// Child ordering
// ============================================================================

/// A candidate next step below an accepted node.
#[derive(Debug, Clone)]
pub struct WalkChild {
    pub node: NodeId,
    /// The edge from the parent; `None` for walk roots.
    pub rel: Option<Relationship>,
    pub usage: NeoUsage,
    pub is_basionym: bool,
    /// Rank and name of a sibling synonym whose basionym this synonym is.
    /// Set only by sorted traversals.
    pub anchor: Option<(Rank, String)>,
}

impl WalkChild {
    pub fn via(&self) -> Option<RelType> {
        self.rel.as_ref().map(|r| r.rel_type)
    }

    fn into_walk_node(self, depth: usize) -> WalkNode {
        WalkNode {
            node: self.node,
            via: self.via(),
            usage: self.usage,
            depth,
            is_basionym: self.is_basionym,
        }
    }
}

/// Pluggable sibling order.
pub trait ChildOrdering: Send + Sync {
    fn compare(&self, a: &WalkChild, b: &WalkChild) -> Ordering;
}

/// Synonyms before taxa, each by (rank, scientific name). A synonym anchored
/// to a recombination sorts directly after it.
#[derive(Debug, Clone, Copy, Default)]
pub struct TaxonomicOrder;

impl TaxonomicOrder {
    fn key(c: &WalkChild) -> (bool, Rank, &str, bool, Rank, &str) {
        let name = c.usage.name();
        let own = (name.rank, name.scientific_name.as_str());
        let is_taxon = c.via() != Some(RelType::SynonymOf);
        match &c.anchor {
            Some((rank, anchor)) if !is_taxon => (false, *rank, anchor.as_str(), true, own.0, own.1),
            _ => (is_taxon, own.0, own.1, false, own.0, own.1),
        }
    }
}

impl ChildOrdering for TaxonomicOrder {
    fn compare(&self, a: &WalkChild, b: &WalkChild) -> Ordering {
        Self::key(a).cmp(&Self::key(b)).then(a.node.cmp(&b.node))
    }
}

/// Synonyms before taxa, each in edge creation order.
#[derive(Debug, Clone, Copy, Default)]
pub struct InsertionOrder;

impl ChildOrdering for InsertionOrder {
    fn compare(&self, a: &WalkChild, b: &WalkChild) -> Ordering {
        let is_taxon = |c: &WalkChild| c.via() != Some(RelType::SynonymOf);
        is_taxon(a)
            .cmp(&is_taxon(b))
            .then_with(|| a.rel.as_ref().map(|r| r.id).cmp(&b.rel.as_ref().map(|r| r.id)))
            .then(a.node.cmp(&b.node))
    }
}

/// How the walk expands nodes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Traversal {
    #[default]
    Sorted,
    Unsorted,
    AcceptedOnly,
}

impl Traversal {
    pub fn includes_synonyms(&self) -> bool {
        !matches!(self, Traversal::AcceptedOnly)
    }

    pub fn ordering(&self) -> Arc<dyn ChildOrdering> {
        match self {
            Traversal::Unsorted => Arc::new(InsertionOrder),
            Traversal::Sorted | Traversal::AcceptedOnly => Arc::new(TaxonomicOrder),
        }
    }
}

// ============================================================================
// Start/end state machine
// ============================================================================

/// Handler calls needed to move from the previous path to the next one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    /// Number of nodes to close at the tail of the previous path, innermost first.
    pub close: usize,
    /// Positions of the next path to open, outermost first.
    pub open: Range<usize>,
}

/// Remembers the last emitted path.
#[derive(Debug, Default)]
pub struct PathTracker {
    current: Option<Path>,
}

impl PathTracker {
    pub fn advance(&mut self, next: &Path) -> Transition {
        let shared = self.current.as_ref().map_or(0, |cur| cur.common_prefix_len(next));
        let close = self.current.as_ref().map_or(0, |cur| cur.nodes.len() - shared);
        self.current = Some(next.clone());
        Transition { close, open: shared..next.nodes.len() }
    }

    /// Number of nodes still open.
    pub fn finish(&mut self) -> usize {
        self.current.take().map_or(0, |p| p.nodes.len())
    }
}

// ============================================================================
// TreeWalker
// ============================================================================

/// Counts of one walk.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WalkStats {
    pub paths: u64,
    pub starts: u64,
    pub ends: u64,
}

/// Configured depth-first walk over a store.
#[derive(Clone)]
pub struct TreeWalker {
    traversal: Traversal,
    ordering: Arc<dyn ChildOrdering>,
    root: Option<NodeId>,
    lowest_rank: Option<Rank>,
    cancel: CancelFlag,
}

impl std::fmt::Debug for TreeWalker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeWalker")
            .field("traversal", &self.traversal)
            .field("root", &self.root)
            .field("lowest_rank", &self.lowest_rank)
            .finish_non_exhaustive()
    }
}

impl TreeWalker {
    pub fn new(traversal: Traversal) -> Self {
        Self {
            traversal,
            ordering: traversal.ordering(),
            root: None,
            lowest_rank: None,
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_ordering(mut self, ordering: Arc<dyn ChildOrdering>) -> Self {
        self.ordering = ordering;
        self
    }

    /// Walk below one usage instead of every root taxon.
    pub fn root(mut self, node: NodeId) -> Self {
        self.root = Some(node);
        self
    }

    /// Skip taxa ranked below `rank`.
    pub fn lowest_rank(mut self, rank: Rank) -> Self {
        self.lowest_rank = Some(rank);
        self
    }

    pub fn cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Run the walk, calling every handler in order for each start and end.
    pub async fn walk<S: GraphStore>(
        &self,
        store: &S,
        tx: &S::Tx,
        handlers: &mut [&mut dyn StartEndHandler],
    ) -> Result<WalkStats> {
        let mut stats = WalkStats::default();
        let mut tracker = PathTracker::default();
        let mut open: Vec<WalkNode> = Vec::new();
        let mut stack: Vec<(Path, WalkNode)> = Vec::new();

        for root in self.roots(store, tx).await?.into_iter().rev() {
            let path = Path::single(root.node);
            stack.push((path, root.into_walk_node(0)));
        }

        while let Some((path, node)) = stack.pop() {
            self.cancel.check()?;
            stats.paths += 1;

            let step = tracker.advance(&path);
            for _ in 0..step.close {
                if let Some(done) = open.pop() {
                    for h in handlers.iter_mut() {
                        h.end(&done)?;
                    }
                    stats.ends += 1;
                }
            }
            for idx in step.open {
                let opened = if idx + 1 == path.nodes.len() {
                    node.clone()
                } else {
                    self.load_node(store, tx, &path, idx).await?
                };
                for h in handlers.iter_mut() {
                    h.start(&opened)?;
                }
                stats.starts += 1;
                open.push(opened);
            }

            let depth = path.nodes.len();
            for child in self.children(store, tx, &path, &node).await?.into_iter().rev() {
                let Some(rel) = child.rel.clone() else { continue };
                let mut next = path.clone();
                next.append(rel, child.node);
                stack.push((next, child.into_walk_node(depth)));
            }
        }

        tracker.finish();
        while let Some(done) = open.pop() {
            for h in handlers.iter_mut() {
                h.end(&done)?;
            }
            stats.ends += 1;
        }
        debug!(paths = stats.paths, traversal = ?self.traversal, "walk finished");
        Ok(stats)
    }

    async fn roots<S: GraphStore>(&self, store: &S, tx: &S::Tx) -> Result<Vec<WalkChild>> {
        let ids = match self.root {
            Some(root) => vec![root],
            None => store.node_ids(tx, NodeFilter::Roots).await?,
        };
        let mut roots = Vec::with_capacity(ids.len());
        for node in ids {
            let usage = store
                .usage(tx, node)
                .await?
                .ok_or_else(|| Error::NotFound(format!("Usage node {node}")))?;
            roots.push(WalkChild { node, rel: None, usage, is_basionym: false, anchor: None });
        }
        roots.sort_by(|a, b| self.ordering.compare(a, b));
        Ok(roots)
    }

    /// Next steps below the end of `path`. Synonyms are leaves.
    async fn children<S: GraphStore>(
        &self,
        store: &S,
        tx: &S::Tx,
        path: &Path,
        parent: &WalkNode,
    ) -> Result<Vec<WalkChild>> {
        let mut out = Vec::new();
        if parent.is_synonym() {
            return Ok(out);
        }

        if self.traversal.includes_synonyms() {
            let basionym = store.basionym_of(tx, parent.usage.name_node).await?;
            let rels = store
                .get_relationships(tx, parent.node, Direction::Incoming, Some(RelType::SynonymOf))
                .await?;
            for rel in rels {
                let node = rel.src;
                if path.contains(node) {
                    continue;
                }
                let Some(usage) = store.usage(tx, node).await? else { continue };
                let is_basionym = basionym == Some(usage.name_node);
                out.push(WalkChild { node, rel: Some(rel), usage, is_basionym, anchor: None });
            }
            if self.traversal == Traversal::Sorted {
                anchor_basionyms(store, tx, &mut out).await?;
            }
        }

        let rels = store
            .get_relationships(tx, parent.node, Direction::Outgoing, Some(RelType::ParentOf))
            .await?;
        for rel in rels {
            let node = rel.dst;
            if path.contains(node) {
                continue;
            }
            let Some(usage) = store.usage(tx, node).await? else { continue };
            if self.lowest_rank.is_some_and(|lowest| lowest.higher_than(usage.name().rank)) {
                continue;
            }
            out.push(WalkChild { node, rel: Some(rel), usage, is_basionym: false, anchor: None });
        }

        out.sort_by(|a, b| self.ordering.compare(a, b));
        Ok(out)
    }

    /// Rebuild the walk node at `idx` of `path` from the store.
    async fn load_node<S: GraphStore>(&self, store: &S, tx: &S::Tx, path: &Path, idx: usize) -> Result<WalkNode> {
        let node = path.nodes[idx];
        let usage = store
            .usage(tx, node)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Usage node {node}")))?;
        let via = path.via(idx);
        let mut is_basionym = false;
        if let (Some(RelType::SynonymOf), Some(prev)) = (via, idx.checked_sub(1)) {
            if let Some(accepted) = store.usage(tx, path.nodes[prev]).await? {
                is_basionym = store.basionym_of(tx, accepted.name_node).await? == Some(usage.name_node);
            }
        }
        Ok(WalkNode { node, usage, depth: idx, via, is_basionym })
    }
}

/// Anchor every synonym that is the basionym of a sibling synonym to that
/// recombination, the highest sorting one if there are several.
async fn anchor_basionyms<S: GraphStore>(store: &S, tx: &S::Tx, synonyms: &mut [WalkChild]) -> Result<()> {
    let mut anchors: Vec<(usize, (Rank, String))> = Vec::new();
    for recomb in synonyms.iter() {
        let Some(basionym) = store.basionym_of(tx, recomb.usage.name_node).await? else { continue };
        let target = synonyms
            .iter()
            .position(|s| s.usage.name_node == basionym && s.node != recomb.node);
        if let Some(i) = target {
            let name = recomb.usage.name();
            anchors.push((i, (name.rank, name.scientific_name.clone())));
        }
    }
    for (i, anchor) in anchors {
        let slot = &mut synonyms[i].anchor;
        if slot.as_ref().is_none_or(|cur| *cur < anchor) {
            *slot = Some(anchor);
        }
    }
    Ok(())
}

/// Walk every root (or `root`) with a fresh [`TreeWalker`].
pub async fn walk_tree<S: GraphStore>(
    store: &S,
    tx: &S::Tx,
    traversal: Traversal,
    root: Option<NodeId>,
    lowest_rank: Option<Rank>,
    cancel: &CancelFlag,
    handlers: &mut [&mut dyn StartEndHandler],
) -> Result<WalkStats> {
    let mut walker = TreeWalker::new(traversal).cancel_flag(cancel.clone());
    if let Some(root) = root {
        walker = walker.root(root);
    }
    if let Some(rank) = lowest_rank {
        walker = walker.lowest_rank(rank);
    }
    walker.walk(store, tx, handlers).await
}
