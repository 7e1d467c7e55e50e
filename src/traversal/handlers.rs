//! Reusable walk handlers.

use std::collections::BTreeMap;

use hashbrown::HashSet;

use super::{StartEndHandler, WalkNode};
use crate::model::{NodeId, Rank};
use crate::{Error, Result};

/// Counts what a walk reaches and checks that starts and ends nest.
#[derive(Debug, Default)]
pub struct CountingHandler {
    taxa: HashSet<NodeId>,
    synonyms: HashSet<NodeId>,
    /// Synonym visits, counting pro parte synonyms once per accepted target.
    pub synonym_visits: u64,
    pub ranks: BTreeMap<Rank, u64>,
    pub max_depth: usize,
    open: Vec<NodeId>,
}

impl CountingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distinct accepted usages reached.
    pub fn taxa(&self) -> u64 {
        self.taxa.len() as u64
    }

    /// Distinct synonyms reached.
    pub fn synonyms(&self) -> u64 {
        self.synonyms.len() as u64
    }

    pub fn reached(&self, node: NodeId) -> bool {
        self.taxa.contains(&node) || self.synonyms.contains(&node)
    }

    /// Nodes started but not ended yet.
    pub fn open(&self) -> usize {
        self.open.len()
    }
}

impl StartEndHandler for CountingHandler {
    fn start(&mut self, node: &WalkNode) -> Result<()> {
        if node.is_synonym() {
            self.synonyms.insert(node.node);
            self.synonym_visits += 1;
        } else if self.taxa.insert(node.node) {
            *self.ranks.entry(node.usage.name().rank).or_insert(0) += 1;
        }
        self.max_depth = self.max_depth.max(node.depth);
        self.open.push(node.node);
        Ok(())
    }

    fn end(&mut self, node: &WalkNode) -> Result<()> {
        match self.open.pop() {
            Some(top) if top == node.node => Ok(()),
            top => Err(Error::Handler(format!("end({}) does not match open node {:?}", node.node, top))),
        }
    }
}
