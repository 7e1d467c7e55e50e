//! # Reference Factory
//!
//! Builds [`Reference`]s from the citation fields of every supported source
//! schema. Nothing here fails: unparsable citations keep their raw text and
//! carry `UNPARSABLE_REFERENCE`, a missing CSL type is defaulted to
//! `article` and flagged with `UNPARSABLE_REFERENCE_TYPE`.
//!
//! | Constructor | Source fields |
//! |-------------|---------------|
//! | `from_citation` | free-text citation |
//! | `from_acef` | ACEF `Author`, `Year`, `Title`, `Details` |
//! | `from_dwc` | DwC `namePublishedIn`, `namePublishedInYear` |
//! | `from_dc` | DC `bibliographicCitation`, `title`, `creator`, `date`, `source` |
//! | `from_coldp` | ColDP Reference row |
//! | `from_bibtex` | BibTeX entry |

pub mod bibtex;

use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::debug;

use crate::model::{CslData, CslDate, CslName, CslType, Issue, Reference, VerbatimRecord};
use crate::term::ColdpTerm;

pub use bibtex::BibEntry;

// ============================================================================
// Citation parsing capability
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unparsable citation: {0}")]
pub struct CitationError(pub String);

/// Turns a free-text citation into structured CSL fields.
pub trait CitationParser: Send + Sync {
    fn parse(&self, citation: &str) -> std::result::Result<CslData, CitationError>;
}

static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b([12]\d{3})\b").expect("valid regex"));
static VOLUME_PAGES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(\d+)\s*(?:\([^)]*\))?\s*:\s*(\d+(?:\s*[-–]+\s*\d+)?)").expect("valid regex")
});
static DOI: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b10\.\d{4,9}/[^\s,;]+").expect("valid regex"));
static URL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"https?://[^\s,;]+").expect("valid regex"));

/// First plausible four digit year in free text.
///
/// ```
/// use clb_normalizer::reference::parse_year;
/// assert_eq!(parse_year("published in 1850 by Smith"), Some(1850));
/// assert_eq!(parse_year("circa 1850s"), None);
/// ```
pub fn parse_year(text: &str) -> Option<i32> {
    YEAR.captures(text).and_then(|c| c[1].parse().ok())
}

/// Guess the CSL type and fill volume/page from a container string.
fn classify(container: &str, csl: &mut CslData) {
    if let Some(c) = VOLUME_PAGES.captures(container) {
        csl.volume.get_or_insert_with(|| c[1].to_string());
        csl.page.get_or_insert_with(|| c[2].to_string());
        csl.csl_type.get_or_insert(CslType::ArticleJournal);
        return;
    }
    let lower = container.to_lowercase();
    let ty = if lower.starts_with("in:") || lower.starts_with("in ") {
        CslType::Chapter
    } else if lower.contains("thesis") || lower.contains("dissertation") {
        CslType::Thesis
    } else if lower.contains("press") || lower.contains("verlag") || lower.contains("publish") {
        CslType::Book
    } else {
        return;
    };
    csl.csl_type.get_or_insert(ty);
}

/// Split an author string on `;`, `&` and ` and `.
fn parse_authors(raw: &str) -> Vec<CslName> {
    raw.split([';', '&'])
        .flat_map(|s| s.split(" and "))
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(CslName::parse)
        .collect()
}

/// Heuristic parser for `Authors Year. Title. Container` citations.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicCitationParser;

impl CitationParser for HeuristicCitationParser {
    fn parse(&self, citation: &str) -> std::result::Result<CslData, CitationError> {
        let text = citation.trim();
        let m = YEAR
            .find(text)
            .ok_or_else(|| CitationError(format!("no publication year in {text:?}")))?;
        let year: i32 = m
            .as_str()
            .parse()
            .map_err(|_| CitationError(format!("bad year {:?}", m.as_str())))?;

        let authors = text[..m.start()].trim().trim_end_matches(['(', ',', ' ']);
        let rest = text[m.end()..].trim_start_matches([')', '.', ':', ',', ' ']);

        let mut csl = CslData {
            author: parse_authors(authors),
            issued: Some(CslDate::year(year)),
            ..Default::default()
        };
        let (title, container) = match rest.split_once(". ") {
            Some((t, c)) => (t.trim(), Some(c.trim().trim_end_matches('.'))),
            None => (rest.trim().trim_end_matches('.'), None),
        };
        if title.is_empty() && csl.author.is_empty() {
            return Err(CitationError(format!("nothing but a year in {text:?}")));
        }
        csl.title = Some(title.to_string()).filter(|t| !t.is_empty());
        if let Some(container) = container.filter(|c| !c.is_empty()) {
            classify(container, &mut csl);
            csl.container_title = Some(container.to_string());
        }
        csl.doi = DOI.find(text).map(|m| m.as_str().trim_end_matches('.').to_string());
        csl.url = URL.find(text).map(|m| m.as_str().to_string());
        Ok(csl)
    }
}

// ============================================================================
// ReferenceFactory
// ============================================================================

/// Join citation fragments: `". "` between fragments, or a single space when
/// the previous fragment already ends with a period.
pub fn join_fragments<'a>(fragments: impl IntoIterator<Item = Option<&'a str>>) -> Option<String> {
    let mut out = String::new();
    for frag in fragments.into_iter().flatten().map(str::trim).filter(|f| !f.is_empty()) {
        if !out.is_empty() {
            out.push_str(if out.ends_with('.') { " " } else { ". " });
        }
        out.push_str(frag);
    }
    (!out.is_empty()).then_some(out)
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Builds references with an injected [`CitationParser`].
#[derive(Clone)]
pub struct ReferenceFactory {
    parser: Arc<dyn CitationParser>,
}

impl Default for ReferenceFactory {
    fn default() -> Self {
        Self::new(Arc::new(HeuristicCitationParser))
    }
}

impl std::fmt::Debug for ReferenceFactory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReferenceFactory").finish_non_exhaustive()
    }
}

impl ReferenceFactory {
    pub fn new(parser: Arc<dyn CitationParser>) -> Self {
        Self { parser }
    }

    /// Fill type and year defaults shared by all constructors.
    fn finish(id: Option<&str>, citation: Option<String>, csl: Option<CslData>, year_text: Option<&str>) -> Reference {
        let mut r = Reference::new(id.map(str::to_string));
        r.citation = citation;
        r.year = csl
            .as_ref()
            .and_then(|c| c.issued.as_ref())
            .and_then(CslDate::first_year)
            .or_else(|| year_text.and_then(parse_year));
        if let Some(mut csl) = csl {
            if csl.csl_type.is_none() {
                r.issues.insert(Issue::UnparsableReferenceType);
                csl.csl_type = Some(CslType::Article);
            }
            r.csl = Some(csl);
        }
        r
    }

    /// Reference from a free-text citation.
    pub fn from_citation(&self, id: Option<&str>, citation: &str) -> Reference {
        let citation = citation.trim();
        if citation.is_empty() {
            return Reference::new(id.map(str::to_string));
        }
        match self.parser.parse(citation) {
            Ok(csl) => Self::finish(id, Some(citation.to_string()), Some(csl), None),
            Err(e) => {
                debug!(id, error = %e, "keeping raw citation");
                let mut r = Self::finish(id, Some(citation.to_string()), None, Some(citation));
                r.issues.insert(Issue::UnparsableReference);
                r
            }
        }
    }

    /// Structured reference from citation fragments; the citation string is
    /// synthesized from them.
    fn from_fragments(
        id: Option<&str>,
        authors: Option<&str>,
        year: Option<&str>,
        title: Option<&str>,
        container: Option<&str>,
    ) -> Reference {
        let (authors, year, title, container) =
            (non_blank(authors), non_blank(year), non_blank(title), non_blank(container));
        let citation = join_fragments([authors, year, title, container]);
        if citation.is_none() {
            return Reference::new(id.map(str::to_string));
        }
        let mut csl = CslData {
            author: authors.map(parse_authors).unwrap_or_default(),
            title: title.map(str::to_string),
            container_title: container.map(str::to_string),
            issued: year.and_then(parse_year).map(CslDate::year),
            ..Default::default()
        };
        if let Some(c) = container {
            classify(c, &mut csl);
        }
        Self::finish(id, citation, Some(csl), year)
    }

    /// ACEF `References` row.
    pub fn from_acef(
        &self,
        id: Option<&str>,
        authors: Option<&str>,
        year: Option<&str>,
        title: Option<&str>,
        details: Option<&str>,
    ) -> Reference {
        Self::from_fragments(id, authors, year, title, details)
    }

    /// DwC `namePublishedIn` plus an optional separate year.
    pub fn from_dwc(&self, id: Option<&str>, published_in: Option<&str>, published_in_year: Option<&str>) -> Reference {
        match non_blank(published_in) {
            Some(citation) => {
                let mut r = self.from_citation(id, citation);
                if let Some(y) = published_in_year.and_then(parse_year) {
                    r.year.get_or_insert(y);
                }
                r
            }
            None => Self::finish(id, None, None, published_in_year),
        }
    }

    /// Dublin Core reference fields, as in DwC-A reference extensions.
    pub fn from_dc(
        &self,
        id: Option<&str>,
        bibliographic_citation: Option<&str>,
        title: Option<&str>,
        creator: Option<&str>,
        date: Option<&str>,
        source: Option<&str>,
    ) -> Reference {
        match non_blank(bibliographic_citation) {
            Some(citation) => {
                let mut r = self.from_citation(id, citation);
                if let Some(csl) = r.csl.as_mut() {
                    if csl.title.is_none() {
                        csl.title = non_blank(title).map(str::to_string);
                    }
                    if csl.author.is_empty() {
                        csl.author = non_blank(creator).map(parse_authors).unwrap_or_default();
                    }
                }
                if r.year.is_none() {
                    r.year = date.and_then(parse_year);
                }
                r
            }
            None => Self::from_fragments(id, creator, date, title, source),
        }
    }

    /// ColDP `Reference` row.
    pub fn from_coldp(&self, rec: &VerbatimRecord) -> Reference {
        let id = rec.get(ColdpTerm::ID);
        let mut r = match rec.get(ColdpTerm::Citation) {
            Some(citation) => self.from_citation(id, citation),
            None => {
                let container = join_fragments([rec.get(ColdpTerm::Source), rec.get(ColdpTerm::Details)]);
                Self::from_fragments(
                    id,
                    rec.get(ColdpTerm::Author),
                    rec.get(ColdpTerm::Year),
                    rec.get(ColdpTerm::Title),
                    container.as_deref(),
                )
            }
        };
        if let Some(y) = rec.get(ColdpTerm::Year).and_then(parse_year) {
            r.year.get_or_insert(y);
        }
        if let Some(csl) = r.csl.as_mut() {
            if let Some(doi) = rec.get(ColdpTerm::Doi) {
                csl.doi = Some(doi.to_string());
            }
            if let Some(link) = rec.get(ColdpTerm::Link) {
                csl.url = Some(link.to_string());
            }
        }
        r.verbatim_key = rec.key;
        r
    }

    /// BibTeX entry; the entry key becomes the reference id.
    pub fn from_bibtex(&self, entry: &BibEntry) -> Reference {
        let authors: Vec<CslName> = entry
            .get("author")
            .map(|a| a.split(" and ").map(str::trim).filter(|s| !s.is_empty()).map(CslName::parse).collect())
            .unwrap_or_default();
        let container = entry.get("journal").or(entry.get("booktitle"));
        let year = entry.get("year");
        let author_text = entry.get("author").map(|a| a.replace(" and ", "; "));
        let citation = join_fragments([author_text.as_deref(), year, entry.get("title"), container]);

        let csl = CslData {
            csl_type: CslType::parse(&entry.entry_type),
            author: authors,
            title: entry.get("title").map(str::to_string),
            container_title: container.map(str::to_string),
            issued: year.and_then(parse_year).map(CslDate::year),
            volume: entry.get("volume").map(str::to_string),
            page: entry.get("pages").map(|p| p.replace("--", "-")),
            publisher: entry.get("publisher").map(str::to_string),
            doi: entry.get("doi").map(str::to_string),
            url: entry.get("url").map(str::to_string),
        };
        let key = Some(entry.key.as_str()).filter(|k| !k.is_empty());
        Self::finish(key, citation, Some(csl), year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::{ColdpRowType, RowType};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_acef_fragments() {
        let r = ReferenceFactory::default().from_acef(
            Some("r1"),
            Some("Ross, J.H."),
            Some("1979"),
            Some("A conspectus of African Acacia"),
            Some("Mem. Bot. Surv. S. Afr. 44: 1-150"),
        );
        assert_eq!(
            r.citation.as_deref(),
            Some("Ross, J.H. 1979. A conspectus of African Acacia. Mem. Bot. Surv. S. Afr. 44: 1-150")
        );
        assert_eq!(r.year, Some(1979));
        let csl = r.csl.unwrap();
        assert_eq!(csl.container_title.as_deref(), Some("Mem. Bot. Surv. S. Afr. 44: 1-150"));
        assert_eq!(csl.author, vec![CslName::parse("Ross, J.H.")]);
        assert_eq!(csl.volume.as_deref(), Some("44"));
        assert_eq!(csl.csl_type, Some(CslType::ArticleJournal));
        assert!(r.issues.is_empty());
    }

    #[test]
    fn test_year_parsing() {
        assert_eq!(parse_year("circa 1850s"), None);
        assert_eq!(parse_year("published in 1850 by Smith"), Some(1850));
        assert_eq!(parse_year("(1753)"), Some(1753));
        assert_eq!(parse_year("no year"), None);

        let r = ReferenceFactory::default().from_dwc(None, None, Some("circa 1850s"));
        assert_eq!(r.year, None);
    }

    #[test]
    fn test_unparsable_citation_keeps_raw_text() {
        let r = ReferenceFactory::default().from_citation(Some("x"), "see the attached notes");
        assert_eq!(r.citation.as_deref(), Some("see the attached notes"));
        assert!(r.has_issue(Issue::UnparsableReference));
        assert!(r.csl.is_none());
        assert_eq!(r.year, None);
    }

    #[test]
    fn test_missing_type_defaults_to_article() {
        let r = ReferenceFactory::default().from_citation(None, "Miller, P. 1768. The Gardeners Dictionary");
        assert!(r.has_issue(Issue::UnparsableReferenceType));
        let csl = r.csl.unwrap();
        assert_eq!(csl.csl_type, Some(CslType::Article));
        assert_eq!(csl.title.as_deref(), Some("The Gardeners Dictionary"));
        assert_eq!(r.year, Some(1768));
    }

    struct Failing;
    impl CitationParser for Failing {
        fn parse(&self, _: &str) -> std::result::Result<CslData, CitationError> {
            Err(CitationError("offline".into()))
        }
    }

    #[test]
    fn test_injected_parser() {
        let factory = ReferenceFactory::new(Arc::new(Failing));
        let r = factory.from_citation(None, "Linnaeus 1753. Species Plantarum");
        assert!(r.has_issue(Issue::UnparsableReference));
        assert_eq!(r.year, Some(1753));
    }

    #[test]
    fn test_coldp_row() {
        let mut rec = VerbatimRecord::new("Reference.tsv", 2, RowType::Coldp(ColdpRowType::Reference));
        rec.put(ColdpTerm::ID, "ref1");
        rec.put(ColdpTerm::Author, "Miller, P.");
        rec.put(ColdpTerm::Year, "1768");
        rec.put(ColdpTerm::Title, "The Gardeners Dictionary");
        rec.put(ColdpTerm::Source, "London Press");
        rec.put(ColdpTerm::Doi, "10.5962/bhl.title.541");
        let r = ReferenceFactory::default().from_coldp(&rec);
        assert_eq!(r.id.as_deref(), Some("ref1"));
        assert_eq!(r.year, Some(1768));
        let csl = r.csl.unwrap();
        assert_eq!(csl.csl_type, Some(CslType::Book));
        assert_eq!(csl.doi.as_deref(), Some("10.5962/bhl.title.541"));
    }

    #[test]
    fn test_bibtex_entry() {
        let entries = bibtex::parse("@article{ross79, author={Ross, J.H.}, title={Acacia}, journal={Bothalia}, year={1979}, pages={1--150}}");
        let r = ReferenceFactory::default().from_bibtex(&entries[0]);
        assert_eq!(r.id.as_deref(), Some("ross79"));
        assert_eq!(r.citation.as_deref(), Some("Ross, J.H. 1979. Acacia. Bothalia"));
        assert_eq!(r.year, Some(1979));
        let csl = r.csl.unwrap();
        assert_eq!(csl.csl_type, Some(CslType::Article));
        assert_eq!(csl.page.as_deref(), Some("1-150"));
        assert!(r.issues.is_empty());
    }
}
