//! Archive shape detection.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::reader::{archive, dwca, Dialect, DATA_EXTENSIONS};
use crate::term::{Term, Vocabulary};
use crate::{Error, Result};

/// File extension of indented text trees.
pub const TEXT_TREE_EXTENSION: &str = "txtree";

/// ACEF sheets that only ACEF ships, lowercased.
const ACEF_FILES: &[&str] = &["acceptedspecies", "acceptedinfraspecifictaxa", "namereferenceslinks", "sourcedatabase"];

/// ColDP entity names, lowercased.
const COLDP_FILES: &[&str] = &["nameusage", "name", "taxon", "synonym", "namerelation", "reference"];

/// The source formats an import can come in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFormat {
    DwcA,
    Acef,
    Coldp,
    TextTree,
}

impl DataFormat {
    /// The vocabulary bare header names are looked up in.
    pub fn vocabulary(&self) -> Vocabulary {
        match self {
            DataFormat::DwcA | DataFormat::TextTree => Vocabulary::Dwc,
            DataFormat::Acef => Vocabulary::Acef,
            DataFormat::Coldp => Vocabulary::Coldp,
        }
    }

    /// Sniff the shape of an unpacked dataset directory.
    pub fn detect(dir: &Path) -> Result<DataFormat> {
        if dir.join(dwca::META_FILE).is_file() {
            return Ok(DataFormat::DwcA);
        }
        let files = listing(dir)?;
        let stems: Vec<String> = files
            .iter()
            .filter(|p| has_extension(p, &DATA_EXTENSIONS))
            .filter_map(|p| p.file_stem().map(|s| s.to_string_lossy().to_lowercase()))
            .collect();

        if stems.iter().any(|s| ACEF_FILES.contains(&s.as_str())) {
            return Ok(DataFormat::Acef);
        }
        if let Some(taxon) = files.iter().find(|p| stem_is(p, "taxon")) {
            if stems.len() == 1 && header_is_dwc(taxon)? {
                return Ok(DataFormat::DwcA);
            }
        }
        if stems.iter().any(|s| COLDP_FILES.contains(&s.as_str())) {
            return Ok(DataFormat::Coldp);
        }
        if text_tree_file(dir)?.is_some() {
            return Ok(DataFormat::TextTree);
        }
        Err(Error::UnsupportedFormat(format!("no known checklist layout in {}", dir.display())))
    }
}

impl std::fmt::Display for DataFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            DataFormat::DwcA => "DwC-A",
            DataFormat::Acef => "ACEF",
            DataFormat::Coldp => "ColDP",
            DataFormat::TextTree => "text tree",
        })
    }
}

/// Turn the import source into a directory: zips are extracted below
/// `scratch`, any other single file is copied alone into `scratch` so its
/// siblings never take part in detection.
pub fn unpack(source: &Path, scratch: &Path) -> Result<PathBuf> {
    if source.is_dir() {
        return Ok(source.to_path_buf());
    }
    if !source.is_file() {
        return Err(Error::NotFound(format!("import source {}", source.display())));
    }
    if archive::is_zip(source) {
        return archive::extract_zip(source, scratch);
    }
    let file_name = source
        .file_name()
        .ok_or_else(|| Error::UnsupportedFormat(format!("{} is neither a directory nor a zip", source.display())))?;
    fs::create_dir_all(scratch)?;
    fs::copy(source, scratch.join(file_name))?;
    Ok(scratch.to_path_buf())
}

/// The text tree file of a directory: a `*.txtree` file, or the only data
/// file when no delimiter splits it into columns.
pub fn text_tree_file(dir: &Path) -> Result<Option<PathBuf>> {
    let files = listing(dir)?;
    if let Some(tree) = files.iter().find(|p| has_extension(p, &[TEXT_TREE_EXTENSION])) {
        return Ok(Some(tree.clone()));
    }
    let data: Vec<&PathBuf> = files.iter().filter(|p| has_extension(p, &["txt"])).collect();
    if let [only] = data.as_slice() {
        let sample = sample_lines(only, 20)?;
        if Dialect::CSV.score(&sample).is_none() && Dialect::TSV.score(&sample).is_none() {
            return Ok(Some((*only).clone()));
        }
    }
    Ok(None)
}

/// BibTeX files shipped alongside the data.
pub fn bibtex_files(dir: &Path) -> Result<Vec<PathBuf>> {
    Ok(listing(dir)?.into_iter().filter(|p| has_extension(p, &["bib"])).collect())
}

fn listing(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| p.is_file())
        .collect();
    files.sort();
    Ok(files)
}

fn has_extension(path: &Path, extensions: &[&str]) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|e| extensions.contains(&e.as_str()))
}

fn stem_is(path: &Path, stem: &str) -> bool {
    has_extension(path, &DATA_EXTENSIONS)
        && path.file_stem().is_some_and(|s| s.to_string_lossy().eq_ignore_ascii_case(stem))
}

fn sample_lines(path: &Path, n: usize) -> Result<Vec<String>> {
    let raw = fs::read(path)?;
    Ok(String::from_utf8_lossy(&raw)
        .lines()
        .filter(|l| !l.trim().is_empty())
        .take(n)
        .map(str::to_string)
        .collect())
}

/// Whether the header row names Darwin Core terms only a DwC file would use.
fn header_is_dwc(path: &Path) -> Result<bool> {
    let dialect = Dialect::sniff_file(path, 10)?;
    let mut reader = dialect.reader_builder().from_path(path)?;
    let mut header = csv::StringRecord::new();
    if !reader.read_record(&mut header)? {
        return Ok(false);
    }
    Ok(header.iter().any(|h| {
        let raw = h.trim();
        raw.contains("rs.tdwg.org")
            || matches!(
                Term::from_header(raw, Vocabulary::Coldp),
                Term::Dwc(crate::term::DwcTerm::TaxonID)
                    | Term::Dwc(crate::term::DwcTerm::ParentNameUsageID)
                    | Term::Dwc(crate::term::DwcTerm::AcceptedNameUsageID)
                    | Term::Dwc(crate::term::DwcTerm::TaxonRank)
            )
    }))
}
