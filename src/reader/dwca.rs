//! Darwin Core Archive descriptors (`meta.xml`).
//!
//! A descriptor declares, per data file, its row type, dialect, header line
//! count and an explicit column index → term mapping, plus constant default
//! values for terms missing from the file.

use std::path::Path;

use serde::Deserialize;

use super::Dialect;
use crate::term::{DwcTerm, RowType, Term, Vocabulary};
use crate::{Error, Result};

pub const META_FILE: &str = "meta.xml";

#[derive(Debug, Clone, Deserialize)]
pub struct ArchiveDescriptor {
    /// Metadata document, usually `eml.xml`.
    #[serde(rename = "@metadata")]
    pub metadata: Option<String>,
    pub core: Option<FileDescriptor>,
    #[serde(rename = "extension", default)]
    pub extensions: Vec<FileDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FileDescriptor {
    #[serde(rename = "@rowType")]
    pub row_type: String,
    #[serde(rename = "@fieldsTerminatedBy")]
    pub fields_terminated_by: Option<String>,
    #[serde(rename = "@fieldsEnclosedBy")]
    pub fields_enclosed_by: Option<String>,
    #[serde(rename = "@ignoreHeaderLines")]
    pub ignore_header_lines: Option<usize>,
    #[serde(rename = "@encoding")]
    pub encoding: Option<String>,
    pub files: Files,
    pub id: Option<IdField>,
    pub coreid: Option<IdField>,
    #[serde(rename = "field", default)]
    pub fields: Vec<FieldDescriptor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Files {
    #[serde(rename = "location", default)]
    pub locations: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdField {
    #[serde(rename = "@index")]
    pub index: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FieldDescriptor {
    #[serde(rename = "@index")]
    pub index: Option<usize>,
    #[serde(rename = "@term")]
    pub term: String,
    #[serde(rename = "@default")]
    pub default: Option<String>,
}

impl ArchiveDescriptor {
    pub fn parse(xml: &str) -> Result<Self> {
        Ok(quick_xml::de::from_str(xml)?)
    }

    pub fn read(dir: &Path) -> Result<Self> {
        let xml = std::fs::read_to_string(dir.join(META_FILE))?;
        Self::parse(&xml)
    }

    /// Core first, then extensions.
    pub fn files(&self) -> impl Iterator<Item = &FileDescriptor> {
        self.core.iter().chain(self.extensions.iter())
    }
}

impl FileDescriptor {
    pub fn row_type(&self) -> RowType {
        RowType::resolve(&self.row_type, Vocabulary::Dwc)
    }

    pub fn location(&self) -> Result<&str> {
        self.files
            .locations
            .first()
            .map(String::as_str)
            .ok_or_else(|| Error::CorruptArchive(format!("no file location for {}", self.row_type)))
    }

    /// Dialect as declared; DwC-A defaults are comma and double quote.
    pub fn dialect(&self) -> Dialect {
        let delimiter = self
            .fields_terminated_by
            .as_deref()
            .map(unescape)
            .and_then(|d| d.bytes().next())
            .unwrap_or(b',');
        let quote = match self.fields_enclosed_by.as_deref().map(unescape) {
            None => Some(b'"'),
            Some(q) => q.bytes().next(),
        };
        Dialect::new(delimiter, quote)
    }

    pub fn header_lines(&self) -> usize {
        self.ignore_header_lines.unwrap_or(0)
    }

    /// Column index → term. The id column maps to `dwc:taxonID` unless a
    /// field claims it.
    pub fn columns(&self) -> Vec<Option<Term>> {
        let mut columns: Vec<Option<Term>> = Vec::new();
        let mut put = |idx: usize, term: Term| {
            if columns.len() <= idx {
                columns.resize(idx + 1, None);
            }
            columns[idx] = Some(term);
        };
        if let Some(id) = self.id.as_ref().or(self.coreid.as_ref()) {
            put(id.index, Term::Dwc(DwcTerm::TaxonID));
        }
        for field in &self.fields {
            if let Some(idx) = field.index {
                put(idx, Term::from_header(&field.term, Vocabulary::Dwc));
            }
        }
        columns
    }

    /// Constant values for terms, applied when the row has no value.
    pub fn defaults(&self) -> Vec<(Term, String)> {
        self.fields
            .iter()
            .filter_map(|f| {
                f.default
                    .as_ref()
                    .map(|d| (Term::from_header(&f.term, Vocabulary::Dwc), d.clone()))
            })
            .collect()
    }
}

/// Descriptors write control characters as backslash escapes.
pub fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('t') => out.push('\t'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::DwcRowType;
    use pretty_assertions::assert_eq;

    const META: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<archive xmlns="http://rs.tdwg.org/dwc/text/" metadata="eml.xml">
  <core encoding="UTF-8" fieldsTerminatedBy="\t" linesTerminatedBy="\n" fieldsEnclosedBy="" ignoreHeaderLines="1" rowType="http://rs.tdwg.org/dwc/terms/Taxon">
    <files><location>taxon.txt</location></files>
    <id index="0"/>
    <field index="1" term="http://rs.tdwg.org/dwc/terms/parentNameUsageID"/>
    <field index="2" term="http://rs.tdwg.org/dwc/terms/scientificName"/>
    <field term="http://rs.tdwg.org/dwc/terms/nomenclaturalCode" default="ICZN"/>
  </core>
  <extension rowType="http://rs.gbif.org/terms/1.0/Distribution" fieldsTerminatedBy=",">
    <files><location>distribution.csv</location></files>
    <coreid index="0"/>
    <field index="1" term="http://rs.tdwg.org/dwc/terms/locality"/>
  </extension>
</archive>"#;

    #[test]
    fn test_parse_descriptor() {
        let meta = ArchiveDescriptor::parse(META).unwrap();
        assert_eq!(meta.metadata.as_deref(), Some("eml.xml"));
        let core = meta.core.as_ref().unwrap();
        assert_eq!(core.row_type(), RowType::Dwc(DwcRowType::Taxon));
        assert_eq!(core.location().unwrap(), "taxon.txt");
        assert_eq!(core.dialect(), Dialect::new(b'\t', None));
        assert_eq!(core.header_lines(), 1);
        assert_eq!(
            core.columns(),
            vec![
                Some(Term::Dwc(DwcTerm::TaxonID)),
                Some(Term::Dwc(DwcTerm::ParentNameUsageID)),
                Some(Term::Dwc(DwcTerm::ScientificName)),
            ]
        );
        assert_eq!(core.defaults(), vec![(Term::Dwc(DwcTerm::NomenclaturalCode), "ICZN".to_string())]);

        let ext = &meta.extensions[0];
        assert_eq!(ext.row_type(), RowType::Dwc(DwcRowType::Distribution));
        assert_eq!(ext.dialect(), Dialect::new(b',', Some(b'"')));
        assert_eq!(meta.files().count(), 2);
    }

    #[test]
    fn test_unescape() {
        assert_eq!(unescape("\\t"), "\t");
        assert_eq!(unescape(","), ",");
        assert_eq!(unescape("\\\\"), "\\");
    }
}
