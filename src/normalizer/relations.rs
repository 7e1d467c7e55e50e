//! Graph post-processing.
//!
//! Runs once every phase is inserted and synced, so every source id resolves
//! through the id indexes. Steps run in a fixed order; each one commits in
//! batches and polls the cancel flag.
//!
//! | Step | Effect | Issue on failure |
//! |------|--------|------------------|
//! | resolve ids | `PARENT_OF`, `SYNONYM_OF`, `HAS_BASIONYM` from row ids | `*_ID_INVALID` |
//! | denormalize | implicit higher taxa from flat classifications | |
//! | repair synonyms | chained synonyms and synonym parents re-pointed | `CHAINED_SYNONYM`, `SYNONYM_PARENT` |
//! | basionyms | recombinations linked to their original combination | `AMBIGUOUS_BASIONYM` |
//! | cycles | one parent edge removed per cycle | `PARENT_CYCLE` |
//! | unresolved | synonyms left without an accepted usage | `ACCEPTED_NAME_MISSING` |

use async_trait::async_trait;
use hashbrown::{HashMap, HashSet};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::inserter::{Pending, ReferenceRole};
use crate::basionym::BasionymGrouper;
use crate::model::*;
use crate::storage::{process, GraphStore, NeoName, NeoUsage, NodeFilter, NodeVisitor};
use crate::traversal::detect_cycles;
use crate::tx::{CancelFlag, TxMode};
use crate::{Error, Result};

/// What post-processing changed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostProcessStats {
    pub parents_resolved: u64,
    pub synonyms_resolved: u64,
    pub basionyms_linked: u64,
    pub references_linked: u64,
    pub unresolved_ids: u64,
    pub implicit_taxa: u64,
    pub chained_synonyms: u64,
    pub synonym_parents: u64,
    pub basionym_groups: u64,
    pub ambiguous_basionym_groups: u64,
    pub cycles_broken: u64,
    pub unresolved_synonyms: u64,
}

/// Run every post-processing step in order.
pub async fn post_process<S: GraphStore>(
    store: &S,
    pending: Pending,
    batch_size: usize,
    cancel: &CancelFlag,
) -> Result<PostProcessStats> {
    let mut stats = PostProcessStats::default();

    resolve_ids(store, batch_size, cancel, &mut stats).await?;
    resolve_pending(store, pending, batch_size, cancel, &mut stats).await?;
    info!(
        parents = stats.parents_resolved,
        synonyms = stats.synonyms_resolved,
        unresolved = stats.unresolved_ids,
        "resolved ids"
    );

    denormalize_classification(store, batch_size, cancel, &mut stats).await?;
    repair_synonyms(store, batch_size, cancel, &mut stats).await?;
    group_basionyms(store, batch_size, cancel, &mut stats).await?;
    break_cycles(store, cancel, &mut stats).await?;
    flag_unresolved_synonyms(store, batch_size, cancel, &mut stats).await?;

    info!(
        implicit = stats.implicit_taxa,
        basionyms = stats.basionyms_linked,
        cycles = stats.cycles_broken,
        unresolved_synonyms = stats.unresolved_synonyms,
        "post-processing done"
    );
    Ok(stats)
}

// ============================================================================
// Helpers
// ============================================================================

/// Attach an issue to a verbatim record. Records without one (implicit
/// usages) are only logged.
async fn flag<S: GraphStore>(store: &S, tx: &mut S::Tx, key: Option<VerbatimKey>, issue: Issue) -> Result<()> {
    match key {
        Some(key) => store.add_issue(tx, key, issue).await,
        None => {
            debug!(%issue, "issue on a record without verbatim source");
            Ok(())
        }
    }
}

/// Name node for a source id: a name id first, else the name of a usage.
async fn resolve_name<S: GraphStore>(store: &S, tx: &S::Tx, id: &str) -> Result<Option<NodeId>> {
    if let Some(node) = store.name_by_id(tx, id).await? {
        return Ok(Some(node));
    }
    Ok(match store.usage_by_id(tx, id).await? {
        Some(u) => store.usage(tx, u).await?.map(|u| u.name_node),
        None => None,
    })
}

/// Add `name → basionym` unless the name already has one. Records the
/// homotypic group on the name.
async fn link_basionym<S: GraphStore>(
    store: &S,
    tx: &mut S::Tx,
    name_node: NodeId,
    basionym_node: NodeId,
) -> Result<bool> {
    if name_node == basionym_node || store.basionym_of(tx, name_node).await?.is_some() {
        return Ok(false);
    }
    let (Some(mut name), Some(basionym)) = (store.name(tx, name_node).await?, store.name(tx, basionym_node).await?)
    else {
        return Err(Error::NotFound(format!("name node {name_node} or {basionym_node}")));
    };
    store.create_relationship(tx, name_node, basionym_node, RelType::HasBasionym).await?;
    let NeoName { name: b, .. } = basionym;
    name.name.homotypic_name_id = b.homotypic_name_id.or(b.id);
    store.update_name(tx, &name).await?;
    Ok(true)
}

/// A write transaction committed every `size` ticks.
struct Batch<'a, S: GraphStore> {
    store: &'a S,
    tx: Option<S::Tx>,
    size: usize,
    done: usize,
    cancel: &'a CancelFlag,
}

impl<'a, S: GraphStore> Batch<'a, S> {
    async fn begin(store: &'a S, size: usize, cancel: &'a CancelFlag) -> Result<Self> {
        let tx = store.begin_tx(TxMode::ReadWrite).await?;
        Ok(Self { store, tx: Some(tx), size: size.max(1), done: 0, cancel })
    }

    fn tx(&mut self) -> Result<&mut S::Tx> {
        self.tx.as_mut().ok_or_else(|| Error::TxError("batch transaction closed".into()))
    }

    /// Poll the cancel flag before the next unit of work.
    async fn check(&mut self) -> Result<()> {
        if let Err(e) = self.cancel.check() {
            if let Some(tx) = self.tx.take() {
                self.store.rollback_tx(tx).await?;
            }
            return Err(e);
        }
        Ok(())
    }

    async fn tick(&mut self) -> Result<()> {
        self.done += 1;
        if self.done % self.size == 0 {
            if let Some(tx) = self.tx.take() {
                self.store.commit_tx(tx).await?;
            }
            self.tx = Some(self.store.begin_tx(TxMode::ReadWrite).await?);
        }
        Ok(())
    }

    async fn finish(mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            self.store.commit_tx(tx).await?;
        }
        Ok(())
    }
}

// ============================================================================
// Resolve ids
// ============================================================================

#[derive(Debug, Default)]
struct IdResolver {
    parents: u64,
    synonyms: u64,
    basionyms: u64,
    unresolved: u64,
}

impl IdResolver {
    async fn unresolved<S: GraphStore>(
        &mut self,
        store: &S,
        tx: &mut S::Tx,
        key: Option<VerbatimKey>,
        issue: Issue,
        id: &str,
    ) -> Result<()> {
        debug!(id, %issue, "unresolved id");
        self.unresolved += 1;
        flag(store, tx, key, issue).await
    }
}

#[async_trait]
impl<S: GraphStore> NodeVisitor<S> for IdResolver {
    async fn visit(&mut self, store: &S, tx: &mut S::Tx, node: NodeId) -> Result<()> {
        let Some(u) = store.usage(tx, node).await? else {
            return Ok(());
        };
        let key = u.verbatim_key();
        let own_id = u.usage.id.as_deref();

        if u.is_synonym() {
            for accepted in u.refs.accepted_ids.iter().filter(|a| Some(a.as_str()) != own_id) {
                match store.usage_by_id(tx, accepted).await? {
                    Some(target) if target != node => {
                        store.create_synonym_rel(tx, node, target).await?;
                        self.synonyms += 1;
                    }
                    _ => self.unresolved(store, tx, key, Issue::AcceptedIdInvalid, accepted).await?,
                }
            }
        } else if let Some(parent) = u.refs.parent_id.as_deref().filter(|p| Some(*p) != own_id) {
            match store.usage_by_id(tx, parent).await? {
                Some(p) if p != node => {
                    store.assign_parent(tx, p, node).await?;
                    self.parents += 1;
                }
                _ => self.unresolved(store, tx, key, Issue::ParentIdInvalid, parent).await?,
            }
        }

        if let Some(basionym) = u.refs.basionym_id.as_deref() {
            match resolve_name(store, tx, basionym).await? {
                Some(b) if b != u.name_node => {
                    if link_basionym(store, tx, u.name_node, b).await? {
                        self.basionyms += 1;
                    }
                }
                _ => self.unresolved(store, tx, key, Issue::BasionymIdInvalid, basionym).await?,
            }
        }

        if let Some(according_to) = u.usage.according_to_id.as_deref() {
            if store.reference_by_id(tx, according_to).await?.is_none() {
                self.unresolved(store, tx, key, Issue::ReferenceIdInvalid, according_to).await?;
            }
        }
        Ok(())
    }
}

/// Flags names citing an unknown publication.
#[derive(Debug, Default)]
struct PublishedInChecker {
    unresolved: u64,
}

#[async_trait]
impl<S: GraphStore> NodeVisitor<S> for PublishedInChecker {
    async fn visit(&mut self, store: &S, tx: &mut S::Tx, node: NodeId) -> Result<()> {
        let Some(n) = store.name(tx, node).await? else {
            return Ok(());
        };
        if let Some(id) = n.name.published_in_id.as_deref() {
            if store.reference_by_id(tx, id).await?.is_none() {
                self.unresolved += 1;
                flag(store, tx, n.name.verbatim_key, Issue::ReferenceIdInvalid).await?;
            }
        }
        Ok(())
    }
}

async fn resolve_ids<S: GraphStore>(
    store: &S,
    batch_size: usize,
    cancel: &CancelFlag,
    stats: &mut PostProcessStats,
) -> Result<()> {
    let mut usages = IdResolver::default();
    process(store, NodeFilter::Usages, batch_size, cancel, &mut usages).await?;
    let mut names = PublishedInChecker::default();
    process(store, NodeFilter::Names, batch_size, cancel, &mut names).await?;

    stats.parents_resolved += usages.parents;
    stats.synonyms_resolved += usages.synonyms;
    stats.basionyms_linked += usages.basionyms;
    stats.unresolved_ids += usages.unresolved + names.unresolved;
    Ok(())
}

/// Basionym relations and reference links from extension rows.
async fn resolve_pending<S: GraphStore>(
    store: &S,
    pending: Pending,
    batch_size: usize,
    cancel: &CancelFlag,
    stats: &mut PostProcessStats,
) -> Result<()> {
    if pending.is_empty() {
        return Ok(());
    }
    let mut batch = Batch::begin(store, batch_size, cancel).await?;

    for (link, key) in pending.basionyms {
        batch.check().await?;
        let tx = batch.tx()?;
        let name = resolve_name(store, tx, &link.name_id).await?;
        let basionym = resolve_name(store, tx, &link.basionym_id).await?;
        match (name, basionym) {
            (Some(n), Some(b)) if n != b => {
                if link_basionym(store, tx, n, b).await? {
                    stats.basionyms_linked += 1;
                }
            }
            _ => {
                stats.unresolved_ids += 1;
                flag(store, tx, key, Issue::NameRelationInvalid).await?;
            }
        }
        batch.tick().await?;
    }

    for (link, key) in pending.references {
        batch.check().await?;
        let tx = batch.tx()?;
        let usage = match store.usage_by_id(tx, &link.usage_id).await? {
            Some(node) => store.usage(tx, node).await?,
            None => None,
        };
        let known = store.reference_by_id(tx, &link.reference_id).await?.is_some();
        match usage {
            Some(mut u) if known => {
                let changed = match link.role {
                    ReferenceRole::Nomenclatural if u.usage.name.published_in_id.is_none() => {
                        u.usage.name.published_in_id = Some(link.reference_id);
                        true
                    }
                    ReferenceRole::Taxonomic if u.usage.according_to_id.is_none() => {
                        u.usage.according_to_id = Some(link.reference_id);
                        true
                    }
                    _ => false,
                };
                if changed {
                    store.update_usage(tx, &u).await?;
                    stats.references_linked += 1;
                }
            }
            usage => {
                stats.unresolved_ids += 1;
                let key = key.or_else(|| usage.and_then(|u| u.verbatim_key()));
                flag(store, tx, key, Issue::ReferenceIdInvalid).await?;
            }
        }
        batch.tick().await?;
    }
    batch.finish().await
}

// ============================================================================
// Denormalized classification
// ============================================================================

/// Higher taxa implied by one usage, top down.
fn implied_parents(u: &NeoUsage) -> Vec<(Rank, String, Origin)> {
    let rank = u.name().rank;
    let mut out: Vec<(Rank, String, Origin)> = u
        .classification
        .entries_above(rank)
        .into_iter()
        .map(|(r, n)| (r, n.to_string(), Origin::DenormedClassification))
        .collect();
    if rank.is_species_or_below() && !out.iter().any(|(r, _, _)| *r == Rank::Genus) {
        if let Some(genus) = u.name().genus.as_deref() {
            out.push((Rank::Genus, genus.to_string(), Origin::Implicit));
        }
    }
    out.retain(|(r, n, _)| !(*r == rank && *n == u.name().scientific_name));
    out
}

async fn denormalize_classification<S: GraphStore>(
    store: &S,
    batch_size: usize,
    cancel: &CancelFlag,
    stats: &mut PostProcessStats,
) -> Result<()> {
    // existing taxa by (rank, name), and the roots that imply parents
    let (mut existing, candidates) = {
        let tx = store.begin_tx(TxMode::ReadOnly).await?;
        let mut existing: HashMap<(Rank, String), Vec<NodeId>> = HashMap::new();
        for node in store.node_ids(&tx, NodeFilter::Taxa).await? {
            cancel.check()?;
            if let Some(u) = store.usage(&tx, node).await? {
                existing.entry((u.name().rank, u.name().scientific_name.clone())).or_default().push(node);
            }
        }
        let mut candidates = Vec::new();
        for node in store.node_ids(&tx, NodeFilter::Roots).await? {
            if let Some(u) = store.usage(&tx, node).await? {
                let parents = implied_parents(&u);
                if u.refs.parent_id.is_none() && !parents.is_empty() {
                    candidates.push((node, parents));
                }
            }
        }
        store.commit_tx(tx).await?;
        (existing, candidates)
    };
    if candidates.is_empty() {
        return Ok(());
    }
    debug!(candidates = candidates.len(), "denormalizing classification");

    let mut created: HashMap<(Option<NodeId>, Rank, String), NodeId> = HashMap::new();
    let mut batch = Batch::begin(store, batch_size, cancel).await?;
    for (node, parents) in candidates {
        batch.check().await?;
        let tx = batch.tx()?;
        let mut parent: Option<NodeId> = None;
        for (rank, name, origin) in parents {
            let cache_key = (parent, rank, name.clone());
            if let Some(n) = created.get(&cache_key) {
                parent = Some(*n);
                continue;
            }
            let reuse = match existing.get(&(rank, name.clone())).map(Vec::as_slice) {
                Some([single]) if *single != node => Some(*single),
                _ => None,
            };
            let next = match reuse {
                Some(n) => {
                    if let Some(p) = parent.filter(|p| *p != n) {
                        if store.parent_of(tx, n).await?.is_none() {
                            store.assign_parent(tx, p, n).await?;
                        }
                    }
                    n
                }
                None => {
                    let mut taxon = Name::new(name.clone(), rank);
                    if !rank.is_species_or_below() {
                        taxon.uninomial = Some(name.clone());
                    }
                    let mut usage = Usage::new(None, taxon, TaxonomicStatus::Accepted);
                    usage.origin = origin;
                    let n = store.create_name_and_usage(tx, NeoUsage::new(usage)).await?;
                    if let Some(p) = parent {
                        store.assign_parent(tx, p, n).await?;
                    }
                    existing.entry((rank, name.clone())).or_default().push(n);
                    stats.implicit_taxa += 1;
                    n
                }
            };
            created.insert(cache_key, next);
            parent = Some(next);
        }
        if let Some(p) = parent.filter(|p| *p != node) {
            store.assign_parent(tx, p, node).await?;
        }
        batch.tick().await?;
    }
    batch.finish().await
}

// ============================================================================
// Synonym repair
// ============================================================================

/// Follow synonym links until an accepted usage. `None` on a synonym loop or
/// a dead end.
async fn final_accepted<S: GraphStore>(store: &S, tx: &S::Tx, start: NodeId) -> Result<Option<NodeId>> {
    let mut seen: HashSet<NodeId> = HashSet::new();
    let mut current = start;
    loop {
        if !seen.insert(current) {
            return Ok(None);
        }
        match store.usage(tx, current).await? {
            Some(u) if !u.is_synonym() => return Ok(Some(current)),
            Some(_) => match store.accepted_of(tx, current).await?.first() {
                Some(next) => current = *next,
                None => return Ok(None),
            },
            None => return Ok(None),
        }
    }
}

#[derive(Debug, Default)]
struct SynonymRepair {
    chained: u64,
    parents: u64,
}

#[async_trait]
impl<S: GraphStore> NodeVisitor<S> for SynonymRepair {
    async fn visit(&mut self, store: &S, tx: &mut S::Tx, node: NodeId) -> Result<()> {
        let Some(u) = store.usage(tx, node).await? else {
            return Ok(());
        };
        let key = u.verbatim_key();

        // synonym of a synonym
        let edges = store.get_relationships(tx, node, Direction::Outgoing, Some(RelType::SynonymOf)).await?;
        for rel in edges {
            let target_is_synonym = store.usage(tx, rel.dst).await?.is_some_and(|t| t.is_synonym());
            if !target_is_synonym {
                continue;
            }
            let target = final_accepted(store, tx, rel.dst).await?;
            store.delete_relationship(tx, rel.id).await?;
            if let Some(t) = target.filter(|t| *t != node) {
                if !store.accepted_of(tx, node).await?.contains(&t) {
                    store.create_synonym_rel(tx, node, t).await?;
                }
            }
            flag(store, tx, key, Issue::ChainedSynonym).await?;
            self.chained += 1;
        }

        // synonym used as a parent
        let accepted = store.accepted_of(tx, node).await?.first().copied();
        let children = store.get_relationships(tx, node, Direction::Outgoing, Some(RelType::ParentOf)).await?;
        for rel in children {
            store.delete_relationship(tx, rel.id).await?;
            if let Some(a) = accepted.filter(|a| *a != rel.dst) {
                store.assign_parent(tx, a, rel.dst).await?;
            }
            let child_key = store.usage(tx, rel.dst).await?.and_then(|c| c.verbatim_key());
            flag(store, tx, child_key, Issue::SynonymParent).await?;
            self.parents += 1;
        }
        Ok(())
    }
}

async fn repair_synonyms<S: GraphStore>(
    store: &S,
    batch_size: usize,
    cancel: &CancelFlag,
    stats: &mut PostProcessStats,
) -> Result<()> {
    let mut repair = SynonymRepair::default();
    process(store, NodeFilter::Synonyms, batch_size, cancel, &mut repair).await?;
    if repair.chained + repair.parents > 0 {
        warn!(chained = repair.chained, parents = repair.parents, "repaired synonyms");
    }
    stats.chained_synonyms += repair.chained;
    stats.synonym_parents += repair.parents;
    Ok(())
}

// ============================================================================
// Basionym grouping
// ============================================================================

async fn group_basionyms<S: GraphStore>(
    store: &S,
    batch_size: usize,
    cancel: &CancelFlag,
    stats: &mut PostProcessStats,
) -> Result<()> {
    let names: Vec<(NodeId, Name)> = {
        let tx = store.begin_tx(TxMode::ReadOnly).await?;
        let mut names = Vec::new();
        for node in store.node_ids(&tx, NodeFilter::Names).await? {
            cancel.check()?;
            if let Some(n) = store.name(&tx, node).await? {
                names.push((node, n.name));
            }
        }
        store.commit_tx(tx).await?;
        names
    };
    let keys: HashMap<NodeId, Option<VerbatimKey>> = names.iter().map(|(n, name)| (*n, name.verbatim_key)).collect();
    let grouping = BasionymGrouper::new().group(names.iter().map(|(n, name)| (*n, name)));

    let mut batch = Batch::begin(store, batch_size, cancel).await?;
    for group in &grouping.groups {
        let Some(basionym) = group.basionym else {
            continue;
        };
        stats.basionym_groups += 1;
        for recombination in group.recombinations.iter().filter(|r| **r != basionym) {
            batch.check().await?;
            if link_basionym(store, batch.tx()?, *recombination, basionym).await? {
                stats.basionyms_linked += 1;
            }
            batch.tick().await?;
        }
    }
    for group in &grouping.ambiguous {
        stats.ambiguous_basionym_groups += 1;
        debug!(epithet = %group.epithet, recombinations = group.recombinations.len(), "ambiguous basionym");
        for recombination in &group.recombinations {
            batch.check().await?;
            let key = keys.get(recombination).copied().flatten();
            flag(store, batch.tx()?, key, Issue::AmbiguousBasionym).await?;
            batch.tick().await?;
        }
    }
    batch.finish().await
}

// ============================================================================
// Cycles and unresolved synonyms
// ============================================================================

async fn break_cycles<S: GraphStore>(store: &S, cancel: &CancelFlag, stats: &mut PostProcessStats) -> Result<()> {
    let mut tx = store.begin_tx(TxMode::ReadWrite).await?;
    let cycles = match detect_cycles(store, &tx, cancel).await {
        Ok(c) => c,
        Err(e) => {
            store.rollback_tx(tx).await?;
            return Err(e);
        }
    };
    for cycle in &cycles {
        store.delete_relationship(&mut tx, cycle.broken.id).await?;
        let key = store.usage(&tx, cycle.child()).await?.and_then(|u| u.verbatim_key());
        flag(store, &mut tx, key, Issue::ParentCycle).await?;
        stats.cycles_broken += 1;
    }
    store.commit_tx(tx).await
}

#[derive(Debug, Default)]
struct UnresolvedSynonyms {
    count: u64,
}

#[async_trait]
impl<S: GraphStore> NodeVisitor<S> for UnresolvedSynonyms {
    async fn visit(&mut self, store: &S, tx: &mut S::Tx, node: NodeId) -> Result<()> {
        if !store.accepted_of(tx, node).await?.is_empty() {
            return Ok(());
        }
        let key = store.usage(tx, node).await?.and_then(|u| u.verbatim_key());
        self.count += 1;
        flag(store, tx, key, Issue::AcceptedNameMissing).await
    }
}

async fn flag_unresolved_synonyms<S: GraphStore>(
    store: &S,
    batch_size: usize,
    cancel: &CancelFlag,
    stats: &mut PostProcessStats,
) -> Result<()> {
    let mut unresolved = UnresolvedSynonyms::default();
    process(store, NodeFilter::Synonyms, batch_size, cancel, &mut unresolved).await?;
    stats.unresolved_synonyms = unresolved.count;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::inserter::{BasionymLink, ReferenceLink};
    use crate::storage::{DeferredRefs, MemoryStore};
    use crate::term::RowType;
    use pretty_assertions::assert_eq;

    /// Insert usages with one verbatim record each, then sync.
    async fn load(usages: Vec<NeoUsage>) -> (MemoryStore, Vec<NodeId>) {
        let db = MemoryStore::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let mut nodes = Vec::new();
        for (i, mut u) in usages.into_iter().enumerate() {
            let key = db
                .create_verbatim(&mut tx, VerbatimRecord::new("taxa.tsv", i as u64 + 2, RowType::Other("Taxon".into())))
                .await
                .unwrap();
            u.usage.verbatim_key = Some(key);
            u.usage.name.verbatim_key = Some(key);
            if u.usage.name.id.is_none() {
                u.usage.name.id = u.usage.id.clone();
            }
            nodes.push(db.create_name_and_usage(&mut tx, u).await.unwrap());
        }
        db.commit_tx(tx).await.unwrap();
        db.sync().await.unwrap();
        (db, nodes)
    }

    fn taxon(id: &str, name: &str, rank: Rank, parent: Option<&str>) -> NeoUsage {
        NeoUsage::new(Usage::taxon(id, Name::new(name, rank)))
            .with_refs(DeferredRefs { parent_id: parent.map(str::to_string), ..Default::default() })
    }

    fn synonym(id: &str, name: &str, accepted: &[&str]) -> NeoUsage {
        NeoUsage::new(Usage::synonym(id, Name::new(name, Rank::Species))).with_refs(DeferredRefs {
            accepted_ids: accepted.iter().map(|a| a.to_string()).collect(),
            ..Default::default()
        })
    }

    async fn issues_of(db: &MemoryStore, node: NodeId) -> Vec<Issue> {
        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        let key = db.usage(&tx, node).await.unwrap().unwrap().verbatim_key().unwrap();
        db.verbatim(&tx, key).await.unwrap().unwrap().issues.into_iter().collect()
    }

    async fn run(db: &MemoryStore, pending: Pending) -> PostProcessStats {
        post_process(db, pending, 2, &CancelFlag::new()).await.unwrap()
    }

    #[tokio::test]
    async fn test_ids_become_edges() {
        let (db, n) = load(vec![
            taxon("1", "Plantae", Rank::Kingdom, None),
            taxon("2", "Pinaceae", Rank::Family, Some("1")),
            synonym("3", "Pinus picea", &["2", "3"]),
            taxon("4", "Abies", Rank::Genus, Some("99")),
        ])
        .await;
        let stats = run(&db, Pending::default()).await;
        assert_eq!(stats.parents_resolved, 1);
        assert_eq!(stats.synonyms_resolved, 1);
        assert_eq!(stats.unresolved_ids, 1);

        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        assert_eq!(db.parent_of(&tx, n[1]).await.unwrap(), Some(n[0]));
        assert_eq!(db.accepted_of(&tx, n[2]).await.unwrap(), vec![n[1]]);
        assert_eq!(db.parent_of(&tx, n[3]).await.unwrap(), None);
        drop(tx);
        assert_eq!(issues_of(&db, n[3]).await, vec![Issue::ParentIdInvalid]);
    }

    #[tokio::test]
    async fn test_classification_builds_implicit_parents() {
        let mut species = taxon("1", "Abies alba", Rank::Species, None);
        species.usage.name.genus = Some("Abies".into());
        species.classification.set(Rank::Kingdom, Some("Plantae".into()));
        species.classification.set(Rank::Family, Some("Pinaceae".into()));
        let mut other = taxon("2", "Picea abies", Rank::Species, None);
        other.usage.name.genus = Some("Picea".into());
        other.classification.set(Rank::Kingdom, Some("Plantae".into()));
        other.classification.set(Rank::Family, Some("Pinaceae".into()));
        let (db, n) = load(vec![species, other, taxon("3", "Plantae", Rank::Kingdom, None)]).await;

        let stats = run(&db, Pending::default()).await;
        // Pinaceae once, two genera; Plantae reused
        assert_eq!(stats.implicit_taxa, 3);

        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        let genus = db.parent_of(&tx, n[0]).await.unwrap().unwrap();
        let g = db.usage(&tx, genus).await.unwrap().unwrap();
        assert_eq!((g.name().scientific_name.as_str(), g.usage.origin), ("Abies", Origin::Implicit));
        let family = db.parent_of(&tx, genus).await.unwrap().unwrap();
        let f = db.usage(&tx, family).await.unwrap().unwrap();
        assert_eq!(f.usage.origin, Origin::DenormedClassification);
        assert_eq!(db.parent_of(&tx, family).await.unwrap(), Some(n[2]));
        let other_genus = db.parent_of(&tx, n[1]).await.unwrap().unwrap();
        assert_eq!(db.parent_of(&tx, other_genus).await.unwrap(), Some(family));
    }

    #[tokio::test]
    async fn test_chained_synonym_and_synonym_parent() {
        let (db, n) = load(vec![
            taxon("1", "Abies alba", Rank::Species, None),
            synonym("2", "Pinus picea", &["1"]),
            synonym("3", "Abies pectinata", &["2"]),
            taxon("4", "Pinus picea var. x", Rank::Variety, Some("2")),
        ])
        .await;
        let stats = run(&db, Pending::default()).await;
        assert_eq!(stats.chained_synonyms, 1);
        assert_eq!(stats.synonym_parents, 1);

        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        assert_eq!(db.accepted_of(&tx, n[2]).await.unwrap(), vec![n[0]]);
        assert_eq!(db.parent_of(&tx, n[3]).await.unwrap(), Some(n[0]));
        drop(tx);
        assert_eq!(issues_of(&db, n[2]).await, vec![Issue::ChainedSynonym]);
        assert!(issues_of(&db, n[3]).await.contains(&Issue::SynonymParent));
    }

    #[tokio::test]
    async fn test_pending_links() {
        let (db, n) = load(vec![taxon("1", "Abies alba", Rank::Species, None), taxon("2", "Pinus alba", Rank::Species, None)])
            .await;
        {
            let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
            let mut r = Reference::new(Some("r1".into()));
            r.citation = Some("Miller 1768".into());
            db.create_reference(&mut tx, r).await.unwrap();
            db.commit_tx(tx).await.unwrap();
        }
        let key = {
            let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
            db.usage(&tx, n[1]).await.unwrap().unwrap().verbatim_key()
        };
        let pending = Pending {
            basionyms: vec![
                (BasionymLink { name_id: "1".into(), basionym_id: "2".into() }, None),
                (BasionymLink { name_id: "1".into(), basionym_id: "nope".into() }, key),
            ],
            references: vec![(
                ReferenceLink { usage_id: "1".into(), reference_id: "r1".into(), role: ReferenceRole::Nomenclatural },
                None,
            )],
        };
        let stats = run(&db, pending).await;
        assert_eq!(stats.basionyms_linked, 1);
        assert_eq!(stats.references_linked, 1);

        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        let u = db.usage(&tx, n[0]).await.unwrap().unwrap();
        assert_eq!(u.name().published_in_id.as_deref(), Some("r1"));
        assert_eq!(u.name().homotypic_name_id.as_deref(), Some("2"));
        drop(tx);
        assert_eq!(issues_of(&db, n[1]).await, vec![Issue::NameRelationInvalid]);
    }

    #[tokio::test]
    async fn test_cycle_is_broken_and_synonym_flagged() {
        let (db, n) = load(vec![
            taxon("a", "Abies", Rank::Genus, Some("b")),
            taxon("b", "Pinaceae", Rank::Family, Some("a")),
            synonym("c", "Pinus picea", &["zz"]),
        ])
        .await;
        let stats = run(&db, Pending::default()).await;
        assert_eq!(stats.cycles_broken, 1);
        assert_eq!(stats.unresolved_synonyms, 1);

        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        let parents = (db.parent_of(&tx, n[0]).await.unwrap(), db.parent_of(&tx, n[1]).await.unwrap());
        assert!(parents.0.is_none() ^ parents.1.is_none());
        drop(tx);
        assert_eq!(issues_of(&db, n[2]).await, vec![Issue::AcceptedIdInvalid, Issue::AcceptedNameMissing]);
    }

    #[tokio::test]
    async fn test_cancelled_post_processing() {
        let (db, _) = load(vec![taxon("1", "Abies", Rank::Genus, None)]).await;
        let cancel = CancelFlag::new();
        cancel.cancel();
        let err = post_process(&db, Pending::default(), 10, &cancel).await.unwrap_err();
        assert!(matches!(err, Error::Interrupted));
    }
}
