//! Bibliographic references with CSL-JSON structured fields.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{Issue, VerbatimKey};

/// CSL item types the importer distinguishes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CslType {
    #[default]
    Article,
    ArticleJournal,
    Book,
    Chapter,
    Dataset,
    Manuscript,
    Report,
    Thesis,
    Webpage,
}

impl CslType {
    /// Map BibTeX entry types and free-text type tokens.
    pub fn parse(token: &str) -> Option<CslType> {
        let t = token.trim().to_ascii_lowercase();
        let ty = match t.as_str() {
            "article" => CslType::Article,
            "article-journal" | "journal" | "journal article" => CslType::ArticleJournal,
            "book" | "booklet" | "proceedings" => CslType::Book,
            "chapter" | "inbook" | "incollection" | "inproceedings" | "conference" => CslType::Chapter,
            "dataset" => CslType::Dataset,
            "manuscript" | "unpublished" | "misc" => CslType::Manuscript,
            "report" | "techreport" => CslType::Report,
            "thesis" | "phdthesis" | "mastersthesis" => CslType::Thesis,
            "webpage" | "online" | "url" => CslType::Webpage,
            _ => return None,
        };
        Some(ty)
    }
}

/// A CSL person name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CslName {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub family: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub given: Option<String>,
    /// Unstructured name kept as is.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub literal: Option<String>,
}

impl CslName {
    /// Split `Family, Given` when there is exactly one comma, otherwise keep it literal.
    pub fn parse(raw: &str) -> CslName {
        let raw = raw.trim();
        match raw.split_once(',') {
            Some((family, given)) if !given.contains(',') && !family.trim().is_empty() => CslName {
                family: Some(family.trim().to_string()),
                given: Some(given.trim().to_string()).filter(|g| !g.is_empty()),
                literal: None,
            },
            _ => CslName { family: None, given: None, literal: Some(raw.to_string()) },
        }
    }
}

/// CSL date as `[[year, month, day]]` parts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CslDate {
    #[serde(rename = "date-parts", default)]
    pub date_parts: Vec<Vec<i32>>,
}

impl CslDate {
    pub fn year(year: i32) -> Self {
        Self { date_parts: vec![vec![year]] }
    }

    pub fn first_year(&self) -> Option<i32> {
        self.date_parts.first().and_then(|p| p.first()).copied()
    }
}

/// The subset of CSL-JSON the importer fills.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct CslData {
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub csl_type: Option<CslType>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub author: Vec<CslName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub container_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub issued: Option<CslDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub volume: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub page: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    #[serde(rename = "DOI", skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(rename = "URL", skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

/// A bibliographic reference: the citation string plus structured fields when parseable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Reference {
    pub id: Option<String>,
    pub citation: Option<String>,
    pub csl: Option<CslData>,
    pub year: Option<i32>,
    pub verbatim_key: Option<VerbatimKey>,
    pub issues: BTreeSet<Issue>,
}

impl Reference {
    pub fn new(id: Option<String>) -> Self {
        Self { id, ..Default::default() }
    }

    pub fn has_issue(&self, issue: Issue) -> bool {
        self.issues.contains(&issue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_csl_name_parse() {
        assert_eq!(
            CslName::parse("Ross, J.H."),
            CslName { family: Some("Ross".into()), given: Some("J.H.".into()), literal: None }
        );
        assert_eq!(CslName::parse("Gene Ontology Consortium").literal.as_deref(), Some("Gene Ontology Consortium"));
    }

    #[test]
    fn test_csl_json_shape() {
        let csl = CslData {
            csl_type: Some(CslType::ArticleJournal),
            container_title: Some("Mem. Bot. Surv. S. Afr.".into()),
            issued: Some(CslDate::year(1979)),
            ..Default::default()
        };
        let json = serde_json::to_value(&csl).unwrap();
        assert_eq!(json["type"], "article-journal");
        assert_eq!(json["container-title"], "Mem. Bot. Surv. S. Afr.");
        assert_eq!(json["issued"]["date-parts"][0][0], 1979);
    }
}
