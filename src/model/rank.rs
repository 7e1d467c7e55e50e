//! Taxonomic ranks, ordered from the highest (domain) to the lowest.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Ordered taxonomic rank. `Ord` follows the hierarchy: `Kingdom < Family < Species`.
/// [`Rank::Unranked`] sorts after every real rank.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rank {
    Domain,
    Superkingdom,
    Kingdom,
    Subkingdom,
    Superphylum,
    Phylum,
    Subphylum,
    Superclass,
    Class,
    Subclass,
    Superorder,
    Order,
    Suborder,
    Superfamily,
    Family,
    Subfamily,
    Tribe,
    Subtribe,
    Genus,
    Subgenus,
    Section,
    Series,
    SpeciesAggregate,
    Species,
    Subspecies,
    Variety,
    Subvariety,
    Form,
    Subform,
    Cultivar,
    Strain,
    #[default]
    Unranked,
}

impl Rank {
    /// Ranks of a flat (denormalized) classification, top down.
    pub const CLASSIFICATION: [Rank; 9] = [
        Rank::Kingdom,
        Rank::Phylum,
        Rank::Class,
        Rank::Order,
        Rank::Superfamily,
        Rank::Family,
        Rank::Subfamily,
        Rank::Tribe,
        Rank::Genus,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Rank::Domain => "domain",
            Rank::Superkingdom => "superkingdom",
            Rank::Kingdom => "kingdom",
            Rank::Subkingdom => "subkingdom",
            Rank::Superphylum => "superphylum",
            Rank::Phylum => "phylum",
            Rank::Subphylum => "subphylum",
            Rank::Superclass => "superclass",
            Rank::Class => "class",
            Rank::Subclass => "subclass",
            Rank::Superorder => "superorder",
            Rank::Order => "order",
            Rank::Suborder => "suborder",
            Rank::Superfamily => "superfamily",
            Rank::Family => "family",
            Rank::Subfamily => "subfamily",
            Rank::Tribe => "tribe",
            Rank::Subtribe => "subtribe",
            Rank::Genus => "genus",
            Rank::Subgenus => "subgenus",
            Rank::Section => "section",
            Rank::Series => "series",
            Rank::SpeciesAggregate => "species aggregate",
            Rank::Species => "species",
            Rank::Subspecies => "subspecies",
            Rank::Variety => "variety",
            Rank::Subvariety => "subvariety",
            Rank::Form => "form",
            Rank::Subform => "subform",
            Rank::Cultivar => "cultivar",
            Rank::Strain => "strain",
            Rank::Unranked => "unranked",
        }
    }

    /// Marker used inside infraspecific names, e.g. `subsp.`.
    pub fn marker(&self) -> Option<&'static str> {
        match self {
            Rank::Subgenus => Some("subgen."),
            Rank::Section => Some("sect."),
            Rank::Series => Some("ser."),
            Rank::SpeciesAggregate => Some("agg."),
            Rank::Species => Some("sp."),
            Rank::Subspecies => Some("subsp."),
            Rank::Variety => Some("var."),
            Rank::Subvariety => Some("subvar."),
            Rank::Form => Some("f."),
            Rank::Subform => Some("subf."),
            Rank::Cultivar => Some("cv."),
            Rank::Strain => Some("strain"),
            _ => None,
        }
    }

    /// Parse a rank token: full names, abbreviations and markers.
    /// Case, surrounding whitespace and a trailing period are ignored.
    pub fn parse(token: &str) -> Option<Rank> {
        let t = token.trim().trim_end_matches('.').to_ascii_lowercase();
        let rank = match t.as_str() {
            "domain" | "dom" => Rank::Domain,
            "superkingdom" | "superregnum" => Rank::Superkingdom,
            "kingdom" | "regnum" | "king" => Rank::Kingdom,
            "subkingdom" | "subregnum" => Rank::Subkingdom,
            "superphylum" | "superdivision" => Rank::Superphylum,
            "phylum" | "division" | "divisio" | "phyl" => Rank::Phylum,
            "subphylum" | "subdivision" => Rank::Subphylum,
            "superclass" => Rank::Superclass,
            "class" | "classis" | "cl" => Rank::Class,
            "subclass" | "subclassis" => Rank::Subclass,
            "superorder" | "superordo" => Rank::Superorder,
            "order" | "ordo" | "ord" => Rank::Order,
            "suborder" | "subordo" => Rank::Suborder,
            "superfamily" | "superfamilia" => Rank::Superfamily,
            "family" | "familia" | "fam" => Rank::Family,
            "subfamily" | "subfamilia" | "subfam" => Rank::Subfamily,
            "tribe" | "tribus" | "trib" => Rank::Tribe,
            "subtribe" | "subtribus" | "subtrib" => Rank::Subtribe,
            "genus" | "gen" => Rank::Genus,
            "subgenus" | "subgen" => Rank::Subgenus,
            "section" | "sectio" | "sect" => Rank::Section,
            "series" | "ser" => Rank::Series,
            "species aggregate" | "aggregate" | "agg" => Rank::SpeciesAggregate,
            "species" | "sp" | "spec" => Rank::Species,
            "subspecies" | "subsp" | "ssp" => Rank::Subspecies,
            "variety" | "varietas" | "var" => Rank::Variety,
            "subvariety" | "subvar" => Rank::Subvariety,
            "form" | "forma" | "f" | "fo" => Rank::Form,
            "subform" | "subforma" | "subf" => Rank::Subform,
            "cultivar" | "cv" => Rank::Cultivar,
            "strain" => Rank::Strain,
            "unranked" | "no rank" | "norank" | "other" | "unknown" => Rank::Unranked,
            _ => return None,
        };
        Some(rank)
    }

    pub fn is_species_or_below(&self) -> bool {
        *self >= Rank::Species && *self != Rank::Unranked
    }

    pub fn is_infraspecific(&self) -> bool {
        *self > Rank::Species && *self != Rank::Unranked
    }

    pub fn is_infrageneric(&self) -> bool {
        matches!(self, Rank::Subgenus | Rank::Section | Rank::Series)
    }

    pub fn is_supraspecific(&self) -> bool {
        *self < Rank::SpeciesAggregate
    }

    /// True if `self` is strictly above `other` in the hierarchy.
    /// Unranked is never higher or lower than anything.
    pub fn higher_than(&self, other: Rank) -> bool {
        *self != Rank::Unranked && other != Rank::Unranked && *self < other
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ordering() {
        assert!(Rank::Kingdom < Rank::Family);
        assert!(Rank::Family < Rank::Genus);
        assert!(Rank::Species < Rank::Subspecies);
        assert!(Rank::Strain < Rank::Unranked);
    }

    #[test]
    fn test_parse_markers() {
        assert_eq!(Rank::parse("subsp."), Some(Rank::Subspecies));
        assert_eq!(Rank::parse("VAR"), Some(Rank::Variety));
        assert_eq!(Rank::parse(" Family "), Some(Rank::Family));
        assert_eq!(Rank::parse("f."), Some(Rank::Form));
        assert_eq!(Rank::parse("banana"), None);
    }

    #[test]
    fn test_predicates() {
        assert!(Rank::Variety.is_infraspecific());
        assert!(!Rank::Species.is_infraspecific());
        assert!(Rank::Species.is_species_or_below());
        assert!(!Rank::Unranked.is_species_or_below());
        assert!(Rank::Genus.higher_than(Rank::Species));
        assert!(!Rank::Unranked.higher_than(Rank::Species));
    }
}
