//! Scientific names and their authorships.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::{Rank, VerbatimKey};

// ============================================================================
// Authorship
// ============================================================================

/// Author team plus year of one (combination or basionym) authorship.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Authorship {
    pub authors: Vec<String>,
    /// Authors preceding `ex`, who proposed but did not validly publish.
    pub ex_authors: Vec<String>,
    pub year: Option<String>,
}

impl Authorship {
    pub fn new(authors: impl IntoIterator<Item = impl Into<String>>, year: Option<&str>) -> Self {
        Self {
            authors: authors.into_iter().map(Into::into).collect(),
            ex_authors: Vec::new(),
            year: year.map(str::to_string),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty() && self.ex_authors.is_empty() && self.year.is_none()
    }

    pub fn has_authors(&self) -> bool {
        !self.authors.is_empty()
    }

    /// Order-sensitive comparison of the author lists, ignoring the year.
    pub fn authors_equal(&self, other: &Authorship) -> bool {
        self.authors.len() == other.authors.len()
            && self
                .authors
                .iter()
                .zip(&other.authors)
                .all(|(a, b)| normalize_author(a) == normalize_author(b))
    }

    /// Authors and year must both match.
    pub fn strict_equal(&self, other: &Authorship) -> bool {
        self.authors_equal(other) && self.year == other.year
    }
}

/// Case, period and whitespace insensitive form of one author token.
pub fn normalize_author(author: &str) -> String {
    author
        .split(|c: char| c.is_whitespace() || c == '.')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn join_team(authors: &[String]) -> String {
    match authors.len() {
        0 => String::new(),
        1 => authors[0].clone(),
        n => format!("{} & {}", authors[..n - 1].join(", "), authors[n - 1]),
    }
}

impl fmt::Display for Authorship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.ex_authors.is_empty() {
            write!(f, "{} ex ", join_team(&self.ex_authors))?;
        }
        f.write_str(&join_team(&self.authors))?;
        if let Some(year) = &self.year {
            if self.authors.is_empty() {
                f.write_str(year)?;
            } else {
                write!(f, ", {year}")?;
            }
        }
        Ok(())
    }
}

// ============================================================================
// Codes and types
// ============================================================================

/// Nomenclatural code governing a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NomCode {
    Botanical,
    Zoological,
    Bacterial,
    Virus,
    Cultivars,
}

impl NomCode {
    pub fn parse(token: &str) -> Option<NomCode> {
        let t = token.trim().to_ascii_lowercase();
        let code = match t.as_str() {
            "botanical" | "icn" | "icbn" | "icnafp" | "bot" => NomCode::Botanical,
            "zoological" | "iczn" | "zoo" => NomCode::Zoological,
            "bacterial" | "icnp" | "icnb" | "bac" => NomCode::Bacterial,
            "virus" | "ictv" | "icvcn" | "vir" => NomCode::Virus,
            "cultivars" | "icncp" | "cultivar" => NomCode::Cultivars,
            _ => return None,
        };
        Some(code)
    }
}

/// Broad kind of name string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NameType {
    #[default]
    Scientific,
    Virus,
    HybridFormula,
    Informal,
    Placeholder,
    NoName,
    Otu,
}

impl NameType {
    /// Whether the name is a structured Linnean name worth grouping and comparing.
    pub fn is_parsable(&self) -> bool {
        matches!(self, NameType::Scientific | NameType::Informal)
    }
}

// ============================================================================
// Name
// ============================================================================

/// A scientific name as interpreted from one source row.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Name {
    /// Source-scoped identifier, unique within one import.
    pub id: Option<String>,
    /// Canonical name without authorship.
    pub scientific_name: String,
    /// Formatted full authorship, e.g. `(L.) Mill.`.
    pub authorship: Option<String>,
    pub rank: Rank,
    pub code: Option<NomCode>,
    pub uninomial: Option<String>,
    pub genus: Option<String>,
    pub infrageneric_epithet: Option<String>,
    pub specific_epithet: Option<String>,
    pub infraspecific_epithet: Option<String>,
    pub combination_authorship: Authorship,
    pub basionym_authorship: Authorship,
    pub name_type: NameType,
    /// Id of the basionym, set once basionyms are resolved.
    pub homotypic_name_id: Option<String>,
    pub published_in_id: Option<String>,
    pub published_in_page: Option<String>,
    pub published_in_year: Option<i32>,
    pub nom_status: Option<String>,
    pub remarks: Option<String>,
    pub verbatim_key: Option<VerbatimKey>,
}

impl Name {
    pub fn new(scientific_name: impl Into<String>, rank: Rank) -> Self {
        Self {
            scientific_name: scientific_name.into(),
            rank,
            ..Default::default()
        }
    }

    /// The lowest epithet: infraspecific, else specific. `None` for uninomials.
    pub fn terminal_epithet(&self) -> Option<&str> {
        self.infraspecific_epithet
            .as_deref()
            .or(self.specific_epithet.as_deref())
    }

    pub fn is_binomial(&self) -> bool {
        self.genus.is_some() && self.specific_epithet.is_some()
    }

    pub fn has_authorship(&self) -> bool {
        !self.combination_authorship.is_empty() || !self.basionym_authorship.is_empty()
    }

    /// Rebuild the formatted authorship from the parsed parts.
    pub fn rebuild_authorship(&mut self) {
        let mut out = String::new();
        if !self.basionym_authorship.is_empty() {
            out.push_str(&format!("({})", self.basionym_authorship));
        }
        if !self.combination_authorship.is_empty() {
            if !out.is_empty() {
                out.push(' ');
            }
            out.push_str(&self.combination_authorship.to_string());
        }
        self.authorship = (!out.is_empty()).then_some(out);
    }

    /// Scientific name followed by its authorship, if any.
    pub fn label(&self) -> String {
        match &self.authorship {
            Some(a) if !a.is_empty() => format!("{} {}", self.scientific_name, a),
            _ => self.scientific_name.clone(),
        }
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.label())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_author_normalization() {
        let a = Authorship::new(["L."], Some("1753"));
        let b = Authorship::new(["l"], Some("1753"));
        let c = Authorship::new(["L."], Some("1754"));
        assert!(a.strict_equal(&b));
        assert!(!a.strict_equal(&c));
        assert!(a.authors_equal(&c));
    }

    #[test]
    fn test_author_order_matters() {
        let a = Authorship::new(["Smith", "Jones"], None);
        let b = Authorship::new(["Jones", "Smith"], None);
        assert!(!a.authors_equal(&b));
    }

    #[test]
    fn test_format_authorship() {
        let mut n = Name::new("Picea abies", Rank::Species);
        n.basionym_authorship = Authorship::new(["L."], None);
        n.combination_authorship = Authorship::new(["H.Karst."], None);
        n.rebuild_authorship();
        assert_eq!(n.label(), "Picea abies (L.) H.Karst.");

        let team = Authorship::new(["Smith", "Jones", "Brown"], Some("1850"));
        assert_eq!(team.to_string(), "Smith, Jones & Brown, 1850");
    }

    #[test]
    fn test_terminal_epithet() {
        let mut n = Name::new("Abies alba alpina", Rank::Subspecies);
        n.specific_epithet = Some("alba".into());
        assert_eq!(n.terminal_epithet(), Some("alba"));
        n.infraspecific_epithet = Some("alpina".into());
        assert_eq!(n.terminal_epithet(), Some("alpina"));
    }
}
