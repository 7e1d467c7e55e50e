//! # Name Parser
//!
//! Scientific names arrive as free text. [`NameParser`] is the capability the
//! inserters use to turn them into structured [`Name`]s; any full-blown
//! parser can be plugged in behind it. [`SimpleNameParser`] is the built-in
//! implementation.
//!
//! ## What `SimpleNameParser` understands
//!
//! | Input | Result |
//! |-------|--------|
//! | `Abies` | uninomial |
//! | `Abies (Pseudabies) alba Mill.` | genus, infrageneric, specific epithet, authorship |
//! | `Abies alba subsp. apennina Bartolucci` | infraspecific with rank marker |
//! | `Puma concolor (Linnaeus, 1771)` | basionym authorship with year |
//! | `(DC.) Wight & Arn. ex Baker` | ex authors |
//! | `Salix alba × Salix fragilis` | hybrid formula, unparsed |
//! | `Tobacco mosaic virus` | virus, unparsed |
//! | `incertae sedis`, `Abies sp.` | placeholder, unparsed |

use std::sync::LazyLock;

use regex::Regex;

use crate::model::{Authorship, Issue, Name, NameType, NomCode, Outcome, Rank};

/// Combination and basionym authorship of one name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedAuthorship {
    pub combination: Authorship,
    pub basionym: Authorship,
}

impl ParsedAuthorship {
    pub fn is_empty(&self) -> bool {
        self.combination.is_empty() && self.basionym.is_empty()
    }
}

/// Parses scientific names and authorships. Never fails; problems are issues.
pub trait NameParser: Send + Sync {
    /// Parse a name string that may carry its authorship. `rank` overrides the
    /// rank inferred from the name.
    fn parse(&self, name: &str, rank: Option<Rank>, code: Option<NomCode>) -> Outcome<Name>;

    /// Parse a standalone authorship such as `(L.) Mill.`.
    fn parse_authorship(&self, authorship: &str) -> Outcome<ParsedAuthorship>;

    /// Parse a name whose authorship is given separately. The separate
    /// authorship wins; a different one embedded in the name raises
    /// `INCONSISTENT_AUTHORSHIP`.
    fn parse_with_authorship(
        &self,
        name: &str,
        authorship: Option<&str>,
        rank: Option<Rank>,
        code: Option<NomCode>,
    ) -> Outcome<Name> {
        let mut out = self.parse(name, rank, code);
        let Some(raw) = authorship.map(str::trim).filter(|a| !a.is_empty()) else {
            return out;
        };
        if !out.value.name_type.is_parsable() {
            out.value.authorship = Some(raw.to_string());
            return out;
        }

        let parsed = self.parse_authorship(raw);
        let clean = parsed.is_clean();
        let embedded = out.value.has_authorship();
        let differs = !(out.value.combination_authorship.strict_equal(&parsed.value.combination)
            && out.value.basionym_authorship.strict_equal(&parsed.value.basionym));
        if embedded && differs {
            out.add_issue(Issue::InconsistentAuthorship);
        }
        let auth = parsed.drain_into(&mut out.issues);
        out.value.combination_authorship = auth.combination;
        out.value.basionym_authorship = auth.basionym;
        if clean {
            out.value.rebuild_authorship();
        } else {
            out.value.authorship = Some(raw.to_string());
        }
        out
    }
}

// ============================================================================
// Regex Patterns
// ============================================================================

static VIRUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:\w*virus(?:es)?|\w*phages?|viroids?|satellites?)\b").expect("valid regex"));
static HYBRID_FORMULA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\S\s+[×xX]\s+[A-Z]?[a-z]").expect("valid regex"));
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:incertae\s+sedis|unknown|unassigned|not\s+assigned|undetermined|\?+)$|\s(?:spp?|indet)\.?$")
        .expect("valid regex")
});
static UNINOMIAL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^×?\p{Lu}[\p{Ll}ëïö-]+$").expect("valid regex"));
static SUBGENUS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\((\p{Lu}[\p{Ll}-]+)\)$").expect("valid regex"));
static EPITHET: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^×?[\p{Ll}ëïö][\p{Ll}ëïö-]+$").expect("valid regex"));
static AUTHORSHIP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\((?P<bas>[^()]*)\))?\s*(?P<comb>[^()]*?)\s*$").expect("valid regex")
});
static YEAR_TAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?P<team>.*?)[,\s]*\b(?P<year>1[5-9]\d\d|20\d\d)[a-z]?\s*$").expect("valid regex")
});
static EX_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?P<ex>.+?)\s+ex\.?\s+(?P<main>.+)$").expect("valid regex"));
static TEAM_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s*(?:,|&|\bet\s|\band\s)\s*").expect("valid regex"));
static AUTHOR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:(?:van|von|de|del|della|di|du|da|der|den|la|le|ter|zu|d')\s*)*\p{Lu}[\p{L}\p{M}.'\- ]*$")
        .expect("valid regex")
});

/// Author particles that can start an authorship but never an epithet.
const PARTICLES: [&str; 13] = ["van", "von", "de", "del", "della", "di", "du", "da", "der", "den", "la", "le", "ter"];

// ============================================================================
// SimpleNameParser
// ============================================================================

/// Regex based parser for Linnean names.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleNameParser;

impl SimpleNameParser {
    pub fn new() -> Self {
        Self
    }

    fn parse_team(raw: &str) -> Option<Authorship> {
        let raw = raw.trim().trim_end_matches(',');
        if raw.is_empty() {
            return Some(Authorship::default());
        }
        let (team, year) = match YEAR_TAIL.captures(raw) {
            Some(c) => (c["team"].trim().to_string(), Some(c["year"].to_string())),
            None => (raw.to_string(), None),
        };
        let (ex, main) = match EX_SPLIT.captures(&team) {
            Some(c) => (Some(c["ex"].to_string()), c["main"].to_string()),
            None => (None, team.clone()),
        };
        Some(Authorship {
            authors: Self::split_authors(&main)?,
            ex_authors: match ex {
                Some(ex) => Self::split_authors(&ex)?,
                None => Vec::new(),
            },
            year,
        })
    }

    fn split_authors(team: &str) -> Option<Vec<String>> {
        let mut authors = Vec::new();
        for author in TEAM_SPLIT.split(team).map(str::trim).filter(|a| !a.is_empty()) {
            if author != "al." && !AUTHOR.is_match(author) {
                return None;
            }
            authors.push(author.to_string());
        }
        Some(authors)
    }

    fn is_epithet(token: &str) -> bool {
        EPITHET.is_match(token) && !PARTICLES.contains(&token)
    }

    /// Infraspecific marker, e.g. `subsp.`, `var`, `f.`.
    fn infraspecific_marker(token: &str) -> Option<Rank> {
        Rank::parse(token).filter(|r| r.is_infraspecific())
    }

    fn infrageneric_marker(token: &str) -> Option<Rank> {
        Rank::parse(token).filter(|r| r.is_infrageneric())
    }
}

impl NameParser for SimpleNameParser {
    fn parse(&self, raw: &str, rank: Option<Rank>, code: Option<NomCode>) -> Outcome<Name> {
        let text = raw.split_whitespace().collect::<Vec<_>>().join(" ");
        let mut name = Name::new(text.clone(), rank.unwrap_or_default());
        name.code = code;

        if text.is_empty() {
            name.name_type = NameType::NoName;
            return Outcome::with_issue(name, Issue::UnparsableName);
        }
        if PLACEHOLDER.is_match(&text) {
            name.name_type = NameType::Placeholder;
            return Outcome::clean(name);
        }
        if code == Some(NomCode::Virus) || VIRUS.is_match(&text) {
            name.name_type = NameType::Virus;
            return Outcome::clean(name);
        }
        if HYBRID_FORMULA.is_match(&text) {
            name.name_type = NameType::HybridFormula;
            return Outcome::clean(name);
        }

        let tokens: Vec<&str> = text.split(' ').collect();
        if !UNINOMIAL.is_match(tokens[0]) {
            name.name_type = NameType::Informal;
            return Outcome::with_issue(name, Issue::UnparsableName);
        }

        let mut out = Outcome::clean(());
        let mut idx = 1;
        let mut inferred = Rank::Unranked;
        let mut marker: Option<Rank> = None;
        let mut canonical = vec![tokens[0].to_string()];

        // infrageneric: `Abies (Pseudabies) alba` or `Abies sect. Grandis`
        if let Some(sub) = tokens.get(1).and_then(|t| SUBGENUS.captures(t)) {
            let next_is_epithet = tokens.get(2).is_some_and(|t| Self::is_epithet(t));
            let alone = tokens.len() == 2 && rank.is_some_and(|r| r.is_infrageneric());
            if next_is_epithet || alone {
                name.infrageneric_epithet = Some(sub[1].to_string());
                canonical.push(format!("({})", &sub[1]));
                inferred = Rank::Subgenus;
                idx = 2;
            }
        } else if let (Some(m), Some(epi)) = (
            tokens.get(1).and_then(|t| Self::infrageneric_marker(t)),
            tokens.get(2).filter(|t| UNINOMIAL.is_match(t)),
        ) {
            name.infrageneric_epithet = Some(epi.to_string());
            canonical.push(m.marker().unwrap_or_default().to_string());
            canonical.push(epi.to_string());
            inferred = m;
            idx = 3;
        }

        if let Some(epi) = tokens.get(idx).filter(|t| Self::is_epithet(t)) {
            name.specific_epithet = Some(epi.to_string());
            canonical.push(epi.to_string());
            inferred = Rank::Species;
            idx += 1;

            let m = tokens.get(idx).and_then(|t| Self::infraspecific_marker(t));
            let after = if m.is_some() { idx + 1 } else { idx };
            if let Some(infra) = tokens.get(after).filter(|t| Self::is_epithet(t)) {
                if let Some(m) = m {
                    canonical.push(m.marker().unwrap_or_default().to_string());
                    marker = Some(m);
                }
                name.infraspecific_epithet = Some(infra.to_string());
                canonical.push(infra.to_string());
                inferred = marker.unwrap_or(Rank::Subspecies);
                idx = after + 1;
            }
        }

        if name.specific_epithet.is_some() {
            name.genus = Some(tokens[0].to_string());
        } else if name.infrageneric_epithet.is_some() {
            name.genus = Some(tokens[0].to_string());
        } else {
            name.uninomial = Some(tokens[0].to_string());
        }
        name.scientific_name = canonical.join(" ");
        if rank.is_none() {
            name.rank = inferred;
        }

        let rest = tokens[idx.min(tokens.len())..].join(" ");
        if !rest.is_empty() {
            let parsed = self.parse_authorship(&rest);
            if parsed.is_clean() {
                name.combination_authorship = parsed.value.combination;
                name.basionym_authorship = parsed.value.basionym;
                name.rebuild_authorship();
            } else {
                name.authorship = Some(rest);
                out.add_issue(Issue::PartiallyParsableName);
                parsed.drain_into(&mut out.issues);
            }
        }
        out.map(|_| name)
    }

    fn parse_authorship(&self, raw: &str) -> Outcome<ParsedAuthorship> {
        let Some(caps) = AUTHORSHIP.captures(raw) else {
            return Outcome::with_issue(ParsedAuthorship::default(), Issue::UnparsableAuthorship);
        };
        let basionym = caps.name("bas").map(|m| m.as_str()).unwrap_or_default();
        let combination = caps.name("comb").map(|m| m.as_str()).unwrap_or_default();
        match (Self::parse_team(basionym), Self::parse_team(combination)) {
            (Some(basionym), Some(combination)) => Outcome::clean(ParsedAuthorship { combination, basionym }),
            _ => Outcome::with_issue(ParsedAuthorship::default(), Issue::UnparsableAuthorship),
        }
    }
}
