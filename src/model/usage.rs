//! Name usages: taxa and synonyms.

use serde::{Deserialize, Serialize};

use super::{Name, Rank, VerbatimKey};

/// Taxonomic status of a usage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaxonomicStatus {
    #[default]
    Accepted,
    ProvisionallyAccepted,
    Synonym,
    AmbiguousSynonym,
    Misapplied,
}

impl TaxonomicStatus {
    pub fn is_synonym(&self) -> bool {
        matches!(
            self,
            TaxonomicStatus::Synonym | TaxonomicStatus::AmbiguousSynonym | TaxonomicStatus::Misapplied
        )
    }

    /// Interpret a status token from any supported vocabulary.
    pub fn parse(token: &str) -> Option<TaxonomicStatus> {
        let t = token.trim().to_ascii_lowercase().replace(['_', '-'], " ");
        let status = match t.as_str() {
            "accepted" | "accepted name" | "valid" | "current" => TaxonomicStatus::Accepted,
            "provisionally accepted" | "provisionally accepted name" | "provisional" | "doubtful" => {
                TaxonomicStatus::ProvisionallyAccepted
            }
            "synonym" | "heterotypic synonym" | "homotypic synonym" | "objective synonym"
            | "subjective synonym" | "invalid" | "junior synonym" => TaxonomicStatus::Synonym,
            "ambiguous synonym" | "pro parte synonym" | "proparte synonym" => TaxonomicStatus::AmbiguousSynonym,
            "misapplied" | "misapplied name" => TaxonomicStatus::Misapplied,
            _ => return None,
        };
        Some(status)
    }
}

/// Where a usage came from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Read from a source row.
    #[default]
    Source,
    /// Created to hold together names that referenced a missing higher taxon.
    Implicit,
    /// Created from flat classification columns (kingdom, family, ...).
    DenormedClassification,
}

/// A taxonomic opinion anchored on exactly one name.
///
/// A usage with a synonym status is a synonym; everything else is a taxon.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub id: Option<String>,
    pub name: Name,
    pub status: TaxonomicStatus,
    pub origin: Origin,
    pub according_to_id: Option<String>,
    pub extinct: Option<bool>,
    pub remarks: Option<String>,
    pub verbatim_key: Option<VerbatimKey>,
}

impl Usage {
    pub fn new(id: Option<String>, name: Name, status: TaxonomicStatus) -> Self {
        Self { id, name, status, ..Default::default() }
    }

    pub fn taxon(id: impl Into<String>, name: Name) -> Self {
        Self::new(Some(id.into()), name, TaxonomicStatus::Accepted)
    }

    pub fn synonym(id: impl Into<String>, name: Name) -> Self {
        Self::new(Some(id.into()), name, TaxonomicStatus::Synonym)
    }

    pub fn is_synonym(&self) -> bool {
        self.status.is_synonym()
    }

    pub fn is_taxon(&self) -> bool {
        !self.status.is_synonym()
    }

    pub fn is_provisional(&self) -> bool {
        self.status == TaxonomicStatus::ProvisionallyAccepted
    }
}

/// Flat higher classification given on a row, used to build implicit parents.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Classification {
    pub kingdom: Option<String>,
    pub phylum: Option<String>,
    pub class: Option<String>,
    pub order: Option<String>,
    pub superfamily: Option<String>,
    pub family: Option<String>,
    pub subfamily: Option<String>,
    pub tribe: Option<String>,
    pub genus: Option<String>,
}

impl Classification {
    pub fn get(&self, rank: Rank) -> Option<&str> {
        let value = match rank {
            Rank::Kingdom => &self.kingdom,
            Rank::Phylum => &self.phylum,
            Rank::Class => &self.class,
            Rank::Order => &self.order,
            Rank::Superfamily => &self.superfamily,
            Rank::Family => &self.family,
            Rank::Subfamily => &self.subfamily,
            Rank::Tribe => &self.tribe,
            Rank::Genus => &self.genus,
            _ => return None,
        };
        value.as_deref().filter(|v| !v.trim().is_empty())
    }

    pub fn set(&mut self, rank: Rank, value: Option<String>) {
        let slot = match rank {
            Rank::Kingdom => &mut self.kingdom,
            Rank::Phylum => &mut self.phylum,
            Rank::Class => &mut self.class,
            Rank::Order => &mut self.order,
            Rank::Superfamily => &mut self.superfamily,
            Rank::Family => &mut self.family,
            Rank::Subfamily => &mut self.subfamily,
            Rank::Tribe => &mut self.tribe,
            Rank::Genus => &mut self.genus,
            _ => return,
        };
        *slot = value.filter(|v| !v.trim().is_empty());
    }

    pub fn is_empty(&self) -> bool {
        Rank::CLASSIFICATION.iter().all(|r| self.get(*r).is_none())
    }

    /// Populated `(rank, name)` pairs strictly above `below`, top down.
    pub fn entries_above(&self, below: Rank) -> Vec<(Rank, &str)> {
        Rank::CLASSIFICATION
            .iter()
            .filter(|r| below == Rank::Unranked || **r < below)
            .filter_map(|r| self.get(*r).map(|n| (*r, n)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_parse() {
        assert_eq!(TaxonomicStatus::parse("accepted name"), Some(TaxonomicStatus::Accepted));
        assert_eq!(TaxonomicStatus::parse("heterotypic_synonym"), Some(TaxonomicStatus::Synonym));
        assert_eq!(TaxonomicStatus::parse("pro-parte synonym"), Some(TaxonomicStatus::AmbiguousSynonym));
        assert_eq!(TaxonomicStatus::parse("whatever"), None);
        assert!(TaxonomicStatus::Misapplied.is_synonym());
    }

    #[test]
    fn test_classification_entries_above() {
        let mut cl = Classification::default();
        cl.set(Rank::Kingdom, Some("Plantae".into()));
        cl.set(Rank::Family, Some("Asteraceae".into()));
        cl.set(Rank::Genus, Some("Artemisia".into()));
        cl.set(Rank::Order, Some("  ".into()));

        assert_eq!(
            cl.entries_above(Rank::Species),
            vec![(Rank::Kingdom, "Plantae"), (Rank::Family, "Asteraceae"), (Rank::Genus, "Artemisia")]
        );
        assert_eq!(cl.entries_above(Rank::Genus), vec![(Rank::Kingdom, "Plantae"), (Rank::Family, "Asteraceae")]);
        assert!(!cl.is_empty());
    }
}
