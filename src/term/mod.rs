//! # Vocabularies
//!
//! Source files are keyed by terms from a handful of vocabularies. Every
//! supported vocabulary is a closed enum registered at compile time; anything
//! else is kept verbatim as [`Term::Unknown`].
//!
//! | Vocabulary | Namespace | Prefix |
//! |------------|-----------|--------|
//! | Darwin Core | `http://rs.tdwg.org/dwc/terms/` | `dwc:` |
//! | Dublin Core | `http://purl.org/dc/terms/` | `dc:` / `dcterms:` |
//! | ACEF | `http://rs.col.plus/terms/acef/` | `acef:` |
//! | ColDP | `http://rs.col.plus/terms/col/` | `col:` |

use std::fmt;

use serde::{Deserialize, Serialize};

/// Generates a closed term enum with its simple names.
///
/// Lookup by simple name ignores case, underscores, dashes and spaces so that
/// `taxon_id`, `TaxonID` and `taxonID` all resolve to the same term.
macro_rules! vocabulary {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $( $variant:ident => $simple:literal ),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        $vis enum $name {
            $( $variant ),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[ $( $name::$variant ),+ ];

            pub fn simple_name(&self) -> &'static str {
                match self {
                    $( $name::$variant => $simple ),+
                }
            }

            pub fn from_simple_name(name: &str) -> Option<Self> {
                let wanted = $crate::term::normalize_term_name(name);
                Self::ALL
                    .iter()
                    .copied()
                    .find(|t| $crate::term::normalize_term_name(t.simple_name()) == wanted)
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.write_str(self.simple_name())
            }
        }
    };
}

pub mod acef;
pub mod coldp;
pub mod dc;
pub mod dwc;

pub use acef::{AcefRowType, AcefTerm};
pub use coldp::{ColdpRowType, ColdpTerm};
pub use dc::DcTerm;
pub use dwc::{DwcRowType, DwcTerm};

pub(crate) fn normalize_term_name(name: &str) -> String {
    name.chars()
        .filter(|c| !matches!(c, '_' | '-' | ' ' | '.'))
        .flat_map(char::to_lowercase)
        .collect()
}

// ============================================================================
// Vocabulary
// ============================================================================

/// The vocabularies a term can come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Vocabulary {
    Dwc,
    Dc,
    Acef,
    Coldp,
}

impl Vocabulary {
    pub fn namespaces(&self) -> &'static [&'static str] {
        match self {
            Vocabulary::Dwc => &["http://rs.tdwg.org/dwc/terms/"],
            Vocabulary::Dc => &["http://purl.org/dc/terms/", "http://purl.org/dc/elements/1.1/"],
            Vocabulary::Acef => &["http://rs.col.plus/terms/acef/"],
            Vocabulary::Coldp => &["http://rs.col.plus/terms/col/", "http://rs.col.plus/terms/coldp/"],
        }
    }

    pub fn prefixes(&self) -> &'static [&'static str] {
        match self {
            Vocabulary::Dwc => &["dwc"],
            Vocabulary::Dc => &["dc", "dcterms"],
            Vocabulary::Acef => &["acef"],
            Vocabulary::Coldp => &["col", "coldp"],
        }
    }

    fn from_prefix(prefix: &str) -> Option<Self> {
        let prefix = prefix.to_ascii_lowercase();
        [Vocabulary::Dwc, Vocabulary::Dc, Vocabulary::Acef, Vocabulary::Coldp]
            .into_iter()
            .find(|v| v.prefixes().contains(&prefix.as_str()))
    }

    fn from_namespace(uri: &str) -> Option<Self> {
        [Vocabulary::Dwc, Vocabulary::Dc, Vocabulary::Acef, Vocabulary::Coldp]
            .into_iter()
            .find(|v| v.namespaces().iter().any(|ns| uri.starts_with(ns)))
    }

    /// Look up a simple name inside this vocabulary only.
    pub fn term(&self, simple_name: &str) -> Option<Term> {
        match self {
            Vocabulary::Dwc => DwcTerm::from_simple_name(simple_name).map(Term::Dwc),
            Vocabulary::Dc => DcTerm::from_simple_name(simple_name).map(Term::Dc),
            Vocabulary::Acef => AcefTerm::from_simple_name(simple_name).map(Term::Acef),
            Vocabulary::Coldp => ColdpTerm::from_simple_name(simple_name).map(Term::Coldp),
        }
    }
}

// ============================================================================
// Term
// ============================================================================

/// A column key of a source record.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Term {
    Dwc(DwcTerm),
    Dc(DcTerm),
    Acef(AcefTerm),
    Coldp(ColdpTerm),
    /// A column no supported vocabulary knows; kept for provenance.
    Unknown(String),
}

impl Term {
    /// Resolve a header cell or `meta.xml` term URI.
    ///
    /// Explicit namespaces (`http://...`) and prefixes (`dwc:`) win. Bare names
    /// are looked up in `default` first, then in the remaining vocabularies.
    pub fn from_header(header: &str, default: Vocabulary) -> Term {
        let raw = header.trim().trim_start_matches('\u{feff}');
        if raw.is_empty() {
            return Term::Unknown(String::new());
        }

        if raw.contains("://") {
            if let Some(vocab) = Vocabulary::from_namespace(raw) {
                let simple = raw.rsplit(['/', '#']).next().unwrap_or(raw);
                if let Some(term) = vocab.term(simple) {
                    return term;
                }
            }
            return Term::Unknown(raw.to_string());
        }

        if let Some((prefix, simple)) = raw.split_once(':') {
            if let Some(vocab) = Vocabulary::from_prefix(prefix) {
                return vocab.term(simple).unwrap_or_else(|| Term::Unknown(raw.to_string()));
            }
        }

        let order = [default, Vocabulary::Dwc, Vocabulary::Coldp, Vocabulary::Dc, Vocabulary::Acef];
        order
            .iter()
            .find_map(|v| v.term(raw))
            .unwrap_or_else(|| Term::Unknown(raw.to_string()))
    }

    pub fn vocabulary(&self) -> Option<Vocabulary> {
        match self {
            Term::Dwc(_) => Some(Vocabulary::Dwc),
            Term::Dc(_) => Some(Vocabulary::Dc),
            Term::Acef(_) => Some(Vocabulary::Acef),
            Term::Coldp(_) => Some(Vocabulary::Coldp),
            Term::Unknown(_) => None,
        }
    }

    pub fn simple_name(&self) -> &str {
        match self {
            Term::Dwc(t) => t.simple_name(),
            Term::Dc(t) => t.simple_name(),
            Term::Acef(t) => t.simple_name(),
            Term::Coldp(t) => t.simple_name(),
            Term::Unknown(s) => s,
        }
    }
}

impl fmt::Display for Term {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.vocabulary() {
            Some(v) => write!(f, "{}:{}", v.prefixes()[0], self.simple_name()),
            None => f.write_str(self.simple_name()),
        }
    }
}

impl From<DwcTerm> for Term {
    fn from(t: DwcTerm) -> Self { Term::Dwc(t) }
}
impl From<DcTerm> for Term {
    fn from(t: DcTerm) -> Self { Term::Dc(t) }
}
impl From<AcefTerm> for Term {
    fn from(t: AcefTerm) -> Self { Term::Acef(t) }
}
impl From<ColdpTerm> for Term {
    fn from(t: ColdpTerm) -> Self { Term::Coldp(t) }
}

// ============================================================================
// Row types
// ============================================================================

/// The kind of entity a source file holds.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RowType {
    Dwc(DwcRowType),
    Acef(AcefRowType),
    Coldp(ColdpRowType),
    /// An extension nobody interprets; rows are kept as verbatim records only.
    Other(String),
}

impl RowType {
    /// Resolve a `meta.xml` rowType URI or a file stem in the given vocabulary.
    pub fn resolve(name: &str, vocab: Vocabulary) -> RowType {
        let simple = name.rsplit(['/', '#']).next().unwrap_or(name);
        let found = match vocab {
            Vocabulary::Dwc | Vocabulary::Dc => DwcRowType::from_simple_name(simple).map(RowType::Dwc),
            Vocabulary::Acef => AcefRowType::from_simple_name(simple).map(RowType::Acef),
            Vocabulary::Coldp => ColdpRowType::from_simple_name(simple).map(RowType::Coldp),
        };
        match found {
            Some(rt) => rt,
            // plural sheet names such as `References.txt`
            None => match simple.strip_suffix('s').filter(|s| !s.is_empty()).map(|s| RowType::resolve(s, vocab)) {
                Some(RowType::Other(_)) | None => RowType::Other(simple.to_string()),
                Some(rt) => rt,
            },
        }
    }

    pub fn simple_name(&self) -> &str {
        match self {
            RowType::Dwc(r) => r.simple_name(),
            RowType::Acef(r) => r.simple_name(),
            RowType::Coldp(r) => r.simple_name(),
            RowType::Other(s) => s,
        }
    }
}

impl fmt::Display for RowType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.simple_name())
    }
}
