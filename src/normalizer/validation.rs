//! Final consistency check of a normalized graph.
//!
//! Walks the accepted tree from every root and compares what the walk
//! reached with the store's own counts. A taxon the walk never reaches sits
//! on a dangling parent chain; a synonym without `SYNONYM_OF` was never
//! resolved.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::model::Rank;
use crate::storage::{GraphStore, NodeFilter};
use crate::traversal::{CountingHandler, Traversal, TreeWalker};
use crate::tx::{CancelFlag, TxMode};
use crate::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationSummary {
    pub taxa: u64,
    pub synonyms: u64,
    pub names: u64,
    pub bare_names: u64,
    pub references: u64,
    pub reached_taxa: u64,
    pub reached_synonyms: u64,
    /// Pro parte synonyms count once per accepted target.
    pub synonym_visits: u64,
    pub unreachable_taxa: u64,
    pub unresolved_synonyms: u64,
    pub max_depth: usize,
    pub ranks: BTreeMap<Rank, u64>,
    /// Every taxon reachable and every synonym resolved.
    pub valid: bool,
}

pub async fn validate<S: GraphStore>(store: &S, cancel: &CancelFlag) -> Result<ValidationSummary> {
    let tx = store.begin_tx(TxMode::ReadOnly).await?;
    let mut counter = CountingHandler::new();
    let walked = TreeWalker::new(Traversal::Sorted)
        .cancel_flag(cancel.clone())
        .walk(store, &tx, &mut [&mut counter])
        .await;
    let walk = match walked {
        Ok(w) => w,
        Err(e) => {
            store.rollback_tx(tx).await?;
            return Err(e);
        }
    };

    let taxa = store.node_count(&tx, NodeFilter::Taxa).await?;
    let synonyms = store.node_count(&tx, NodeFilter::Synonyms).await?;
    let mut unresolved_synonyms = 0;
    for node in store.node_ids(&tx, NodeFilter::Synonyms).await? {
        if store.accepted_of(&tx, node).await?.is_empty() {
            unresolved_synonyms += 1;
        }
    }
    let summary = ValidationSummary {
        taxa,
        synonyms,
        names: store.node_count(&tx, NodeFilter::Names).await?,
        bare_names: store.node_count(&tx, NodeFilter::BareNames).await?,
        references: store.references(&tx).await?.len() as u64,
        reached_taxa: counter.taxa(),
        reached_synonyms: counter.synonyms(),
        synonym_visits: counter.synonym_visits,
        unreachable_taxa: taxa.saturating_sub(counter.taxa()),
        unresolved_synonyms,
        max_depth: counter.max_depth,
        ranks: counter.ranks.clone(),
        valid: taxa == counter.taxa() && unresolved_synonyms == 0 && counter.open() == 0,
    };
    store.commit_tx(tx).await?;

    if summary.valid {
        info!(taxa, synonyms, paths = walk.paths, depth = summary.max_depth, "graph valid");
    } else {
        warn!(
            unreachable = summary.unreachable_taxa,
            unresolved_synonyms = summary.unresolved_synonyms,
            "graph incomplete"
        );
    }
    Ok(summary)
}
