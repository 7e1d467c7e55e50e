//! Dataset metadata.
//!
//! | Format | Source |
//! |--------|--------|
//! | DwC-A | `eml.xml`, or whatever `meta.xml` names as metadata |
//! | ColDP | `metadata.yaml` / `metadata.yml` |
//! | ACEF | the `SourceDatabase` sheet |

use std::path::Path;
use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::DataFormat;
use crate::reader::{ArchiveDescriptor, TermReader};
use crate::term::{AcefRowType, AcefTerm, RowType};
use crate::Result;

static CC_LICENSE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)creativecommons\.org/(?:licenses/([a-z-]+)/(\d\.\d)|publicdomain/zero)|\b(CC0|CC[ -]BY(?:[ -](?:NC|SA|ND))*)\b")
        .expect("valid regex")
});

/// Descriptive metadata of a dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub title: Option<String>,
    pub description: Option<String>,
    pub creators: Vec<String>,
    pub license: Option<String>,
    pub issued: Option<NaiveDate>,
    pub version: Option<String>,
    pub homepage: Option<String>,
    pub contact: Option<String>,
}

impl DatasetMetadata {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// `2019-05-01`, `2019-05` or a bare year.
pub fn parse_issued(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .or_else(|| NaiveDate::parse_from_str(&format!("{raw}-01"), "%Y-%m-%d").ok())
        .or_else(|| raw.get(..4)?.parse::<i32>().ok().and_then(|y| NaiveDate::from_ymd_opt(y, 1, 1)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

/// Read the metadata a dataset declares. `None` when it declares nothing.
pub fn read_metadata(dir: &Path, format: DataFormat, reader: &TermReader) -> Result<Option<DatasetMetadata>> {
    let meta = match format {
        DataFormat::DwcA => {
            let file = ArchiveDescriptor::read(dir)
                .ok()
                .and_then(|d| d.metadata)
                .unwrap_or_else(|| "eml.xml".to_string());
            let path = dir.join(file);
            if path.is_file() { Some(read_eml(&std::fs::read_to_string(path)?)?) } else { None }
        }
        DataFormat::Coldp => match ["metadata.yaml", "metadata.yml"].iter().map(|f| dir.join(f)).find(|p| p.is_file()) {
            Some(path) => Some(read_yaml(&std::fs::read_to_string(path)?)?),
            None => None,
        },
        DataFormat::Acef => read_acef(reader)?,
        DataFormat::TextTree => None,
    };
    Ok(meta.filter(|m| !m.is_empty()))
}

// ============================================================================
// EML
// ============================================================================

#[derive(Debug, Deserialize)]
struct Eml {
    dataset: EmlDataset,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmlDataset {
    title: Vec<EmlText>,
    creator: Vec<EmlParty>,
    #[serde(rename = "abstract")]
    summary: Option<EmlParas>,
    #[serde(rename = "pubDate")]
    pub_date: Option<EmlText>,
    contact: Vec<EmlParty>,
    distribution: Option<EmlDistribution>,
}

#[derive(Debug, Default, Deserialize)]
struct EmlText {
    #[serde(rename = "$text", default)]
    value: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmlParas {
    para: Vec<EmlText>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmlParty {
    #[serde(rename = "individualName")]
    individual_name: Option<EmlPerson>,
    #[serde(rename = "organizationName")]
    organization_name: Option<EmlText>,
    #[serde(rename = "electronicMailAddress")]
    email: Option<EmlText>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmlPerson {
    #[serde(rename = "givenName")]
    given_name: Option<EmlText>,
    #[serde(rename = "surName")]
    sur_name: Option<EmlText>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmlDistribution {
    online: Option<EmlOnline>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct EmlOnline {
    url: Option<EmlText>,
}

fn text(t: Option<EmlText>) -> Option<String> {
    non_empty(t.and_then(|t| t.value))
}

impl EmlParty {
    fn label(self) -> Option<String> {
        let person = self.individual_name.map(|p| {
            [text(p.given_name), text(p.sur_name)].into_iter().flatten().collect::<Vec<_>>().join(" ")
        });
        non_empty(person).or_else(|| text(self.organization_name))
    }
}

/// Parse an EML document. The license is recognised from any Creative
/// Commons mention in the text.
pub fn read_eml(xml: &str) -> Result<DatasetMetadata> {
    let eml: Eml = quick_xml::de::from_str(xml)?;
    let ds = eml.dataset;
    let description = ds.summary.map(|a| {
        a.para.into_iter().filter_map(|p| text(Some(p))).collect::<Vec<_>>().join("\n\n")
    });
    let contact = ds.contact.into_iter().find_map(|mut c| {
        let email = text(c.email.take());
        c.label().or(email)
    });
    Ok(DatasetMetadata {
        title: ds.title.into_iter().find_map(|t| text(Some(t))),
        description: non_empty(description),
        creators: ds.creator.into_iter().filter_map(EmlParty::label).collect(),
        license: detect_license(xml),
        issued: text(ds.pub_date).as_deref().and_then(parse_issued),
        version: None,
        homepage: ds.distribution.and_then(|d| d.online).and_then(|o| text(o.url)),
        contact,
    })
}

fn detect_license(text: &str) -> Option<String> {
    let caps = CC_LICENSE.captures(text)?;
    if let (Some(kind), Some(version)) = (caps.get(1), caps.get(2)) {
        return Some(format!("CC-{} {}", kind.as_str().to_ascii_uppercase(), version.as_str()));
    }
    match caps.get(3) {
        Some(name) => Some(name.as_str().to_ascii_uppercase().replace(' ', "-")),
        None => Some("CC0".to_string()),
    }
}

// ============================================================================
// ColDP YAML
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ColdpMetadata {
    title: Option<String>,
    #[serde(alias = "abstract")]
    description: Option<String>,
    #[serde(alias = "authors", alias = "editor")]
    creator: Vec<Agent>,
    license: Option<serde_yaml::Value>,
    #[serde(alias = "released")]
    issued: Option<serde_yaml::Value>,
    version: Option<serde_yaml::Value>,
    #[serde(alias = "website")]
    url: Option<String>,
    contact: Option<Agent>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Agent {
    Literal(String),
    Person {
        given: Option<String>,
        family: Option<String>,
        organisation: Option<String>,
        email: Option<String>,
    },
}

impl Agent {
    fn label(self) -> Option<String> {
        match self {
            Agent::Literal(s) => non_empty(Some(s)),
            Agent::Person { given, family, organisation, email } => {
                let name = [given, family].into_iter().flatten().collect::<Vec<_>>().join(" ");
                non_empty(Some(name)).or(non_empty(organisation)).or(non_empty(email))
            }
        }
    }
}

/// Scalars as text; YAML reads `1.0` as a float and `2020` as an integer.
fn scalar(value: Option<serde_yaml::Value>) -> Option<String> {
    match value? {
        serde_yaml::Value::String(s) => non_empty(Some(s)),
        serde_yaml::Value::Number(n) => Some(n.to_string()),
        serde_yaml::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

/// Parse a ColDP `metadata.yaml`.
pub fn read_yaml(yaml: &str) -> Result<DatasetMetadata> {
    let md: ColdpMetadata = serde_yaml::from_str(yaml)?;
    Ok(DatasetMetadata {
        title: non_empty(md.title),
        description: non_empty(md.description),
        creators: md.creator.into_iter().filter_map(Agent::label).collect(),
        license: scalar(md.license),
        issued: scalar(md.issued).as_deref().and_then(parse_issued),
        version: scalar(md.version),
        homepage: non_empty(md.url),
        contact: md.contact.and_then(Agent::label),
    })
}

// ============================================================================
// ACEF SourceDatabase
// ============================================================================

fn read_acef(reader: &TermReader) -> Result<Option<DatasetMetadata>> {
    let Some(row) = reader.read_first_row(&RowType::Acef(AcefRowType::SourceDatabase))? else {
        return Ok(None);
    };
    let get = |t: AcefTerm| row.get(t).map(str::to_string);
    let creators = get(AcefTerm::AuthorsEditors)
        .map(|a| a.split(';').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    Ok(Some(DatasetMetadata {
        title: get(AcefTerm::DatabaseFullName).or_else(|| get(AcefTerm::DatabaseShortName)),
        description: get(AcefTerm::Abstract),
        creators,
        license: None,
        issued: get(AcefTerm::ReleaseDate).as_deref().and_then(parse_issued),
        version: get(AcefTerm::DatabaseVersion),
        homepage: get(AcefTerm::HomeURL),
        contact: get(AcefTerm::ContactPerson).or_else(|| get(AcefTerm::Organisation)),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::Vocabulary;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_eml() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<eml:eml xmlns:eml="eml://ecoinformatics.org/eml-2.1.1" packageId="x">
  <dataset>
    <title>Conifer Database</title>
    <creator>
      <individualName><givenName>Aljos</givenName><surName>Farjon</surName></individualName>
    </creator>
    <creator><organizationName>Kew</organizationName></creator>
    <pubDate>2019-05-01</pubDate>
    <abstract><para>All conifers.</para><para>Worldwide.</para></abstract>
    <intellectualRights>
      <para>Licensed under <ulink url="http://creativecommons.org/licenses/by/4.0/legalcode"><citetitle>CC-BY</citetitle></ulink></para>
    </intellectualRights>
    <contact><electronicMailAddress>info@kew.org</electronicMailAddress></contact>
  </dataset>
</eml:eml>"#;
        let md = read_eml(xml).unwrap();
        assert_eq!(md.title.as_deref(), Some("Conifer Database"));
        assert_eq!(md.creators, vec!["Aljos Farjon".to_string(), "Kew".to_string()]);
        assert_eq!(md.issued, NaiveDate::from_ymd_opt(2019, 5, 1));
        assert_eq!(md.description.as_deref(), Some("All conifers.\n\nWorldwide."));
        assert_eq!(md.license.as_deref(), Some("CC-BY 4.0"));
        assert_eq!(md.contact.as_deref(), Some("info@kew.org"));
    }

    #[test]
    fn test_yaml() {
        let yaml = "title: Firs of the world\nversion: 2.1\nissued: 2021-03\nlicense: CC0\ncreator:\n  - given: Ada\n    family: Abies\n  - Kew Gardens\ncontact:\n  email: firs@example.org\n";
        let md = read_yaml(yaml).unwrap();
        assert_eq!(md.title.as_deref(), Some("Firs of the world"));
        assert_eq!(md.version.as_deref(), Some("2.1"));
        assert_eq!(md.issued, NaiveDate::from_ymd_opt(2021, 3, 1));
        assert_eq!(md.license.as_deref(), Some("CC0"));
        assert_eq!(md.creators, vec!["Ada Abies".to_string(), "Kew Gardens".to_string()]);
        assert_eq!(md.contact.as_deref(), Some("firs@example.org"));
    }

    #[test]
    fn test_acef_source_database() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(
            tmp.path().join("SourceDatabase.txt"),
            "DatabaseFullName\tDatabaseVersion\tReleaseDate\tAuthorsEditors\n\
             World Acacia Database\t2.1\t2018\tRoss J.; Maslin B.\n",
        )
        .unwrap();
        let reader = TermReader::open(tmp.path(), Vocabulary::Acef).unwrap();
        let md = read_metadata(tmp.path(), DataFormat::Acef, &reader).unwrap().unwrap();
        assert_eq!(md.title.as_deref(), Some("World Acacia Database"));
        assert_eq!(md.version.as_deref(), Some("2.1"));
        assert_eq!(md.issued, NaiveDate::from_ymd_opt(2018, 1, 1));
        assert_eq!(md.creators, vec!["Ross J.".to_string(), "Maslin B.".to_string()]);
    }

    #[test]
    fn test_parse_issued() {
        assert_eq!(parse_issued("2020"), NaiveDate::from_ymd_opt(2020, 1, 1));
        assert_eq!(parse_issued("sometime"), None);
    }
}
