//! # Basionym Grouper
//!
//! Groups recombinations that cite the same basionym authorship and matches
//! each group to at most one original combination.
//!
//! ```text
//! Picea abies (L.) H.Karst.   ─┐
//! Abies abies (L.) Druce      ─┼─ group (abies, L.) ──► Pinus abies L.
//! ```
//!
//! Names are bucketed by terminal epithet stem first, so `alba` and `albus`
//! land in the same bucket. Inside a bucket:
//!
//! | Name carries | Role |
//! |--------------|------|
//! | basionym authorship | recombination |
//! | combination authorship only | candidate original |
//! | no authorship | ignored |
//!
//! A group's original is the single candidate whose combination authorship
//! strictly equals the group's basionym authorship (authors and year). With no
//! strict match the comparison is retried once on authors alone. More than one
//! match makes the group ambiguous and it is dropped.

use std::collections::BTreeMap;

use tracing::{debug, warn};

use crate::model::{Authorship, Name};

/// Latin gender endings and what replaces them, longest first. A masculine
/// `-er` only loses its `e` so `niger` lines up with `nigra` and `nigrum`.
const GENDER_ENDINGS: &[(&str, &str)] = &[("um", ""), ("us", ""), ("is", ""), ("er", "r"), ("a", ""), ("e", "")];

/// Epithet with a common gender ending removed: `alba`, `albus`, `album` → `alb`.
pub fn epithet_stem(epithet: &str) -> String {
    let lower = epithet.trim().to_lowercase();
    for (ending, replacement) in GENDER_ENDINGS {
        if let Some(stem) = lower.strip_suffix(ending) {
            let stem = format!("{stem}{replacement}");
            if stem.chars().count() >= 3 {
                return stem;
            }
        }
    }
    lower
}

/// Recombinations sharing one basionym authorship.
#[derive(Debug, Clone, PartialEq)]
pub struct BasionymGroup<K> {
    /// Terminal epithet of the first recombination seen.
    pub epithet: String,
    pub authorship: Authorship,
    pub recombinations: Vec<K>,
    pub basionym: Option<K>,
}

impl<K> BasionymGroup<K> {
    fn new(epithet: &str, authorship: Authorship) -> Self {
        Self {
            epithet: epithet.to_string(),
            authorship,
            recombinations: Vec::new(),
            basionym: None,
        }
    }

    pub fn has_basionym(&self) -> bool {
        self.basionym.is_some()
    }
}

/// Result of a grouping run.
#[derive(Debug, Clone, PartialEq)]
pub struct Grouping<K> {
    /// Groups with zero or one matched original.
    pub groups: Vec<BasionymGroup<K>>,
    /// Groups dropped because several originals matched.
    pub ambiguous: Vec<BasionymGroup<K>>,
}

impl<K> Default for Grouping<K> {
    fn default() -> Self {
        Self { groups: Vec::new(), ambiguous: Vec::new() }
    }
}

/// Stateless grouper. `K` identifies a name to the caller (a node id, an index).
#[derive(Debug, Clone, Copy, Default)]
pub struct BasionymGrouper;

impl BasionymGrouper {
    pub fn new() -> Self {
        Self
    }

    /// Group every name that has a terminal epithet.
    pub fn group<'a, K, I>(&self, names: I) -> Grouping<K>
    where
        K: Clone,
        I: IntoIterator<Item = (K, &'a Name)>,
    {
        let mut buckets: BTreeMap<String, Vec<(K, &'a Name)>> = BTreeMap::new();
        for (key, name) in names {
            if !name.name_type.is_parsable() {
                continue;
            }
            if let Some(epithet) = name.terminal_epithet() {
                buckets.entry(epithet_stem(epithet)).or_default().push((key, name));
            }
        }

        let mut out = Grouping::default();
        for (stem, names) in buckets {
            let Grouping { groups, ambiguous } = self.group_epithet(&names);
            if !groups.is_empty() {
                debug!(stem = %stem, groups = groups.len(), "grouped epithet");
            }
            out.groups.extend(groups);
            out.ambiguous.extend(ambiguous);
        }
        out
    }

    /// Group names that already share an epithet stem.
    pub fn group_epithet<K: Clone>(&self, names: &[(K, &Name)]) -> Grouping<K> {
        let mut groups: Vec<BasionymGroup<K>> = Vec::new();
        let mut originals: Vec<(K, &Name)> = Vec::new();

        for (key, name) in names {
            if name.basionym_authorship.has_authors() {
                let found = groups
                    .iter()
                    .position(|g| g.authorship.strict_equal(&name.basionym_authorship));
                let idx = match found {
                    Some(i) => i,
                    None => {
                        let epithet = name.terminal_epithet().unwrap_or_default();
                        groups.push(BasionymGroup::new(epithet, name.basionym_authorship.clone()));
                        groups.len() - 1
                    }
                };
                groups[idx].recombinations.push(key.clone());
            } else if name.combination_authorship.has_authors() {
                originals.push((key.clone(), *name));
            }
        }

        let mut out = Grouping::default();
        for mut group in groups {
            let mut matches: Vec<&(K, &Name)> = originals
                .iter()
                .filter(|(_, n)| n.combination_authorship.strict_equal(&group.authorship))
                .collect();
            if matches.is_empty() {
                matches = originals
                    .iter()
                    .filter(|(_, n)| n.combination_authorship.authors_equal(&group.authorship))
                    .collect();
            }
            match matches.as_slice() {
                [] => out.groups.push(group),
                [(key, _)] => {
                    group.basionym = Some(key.clone());
                    out.groups.push(group);
                }
                many => {
                    let candidates: Vec<String> = many.iter().map(|(_, n)| n.label()).collect();
                    warn!(
                        epithet = %group.epithet,
                        authorship = %group.authorship,
                        ?candidates,
                        "ambiguous basionym, dropping group"
                    );
                    out.ambiguous.push(group);
                }
            }
        }
        out
    }
}
