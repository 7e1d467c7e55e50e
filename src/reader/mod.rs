//! # Term Record Reader
//!
//! Reads a directory of delimited files into lazy, term-keyed
//! [`VerbatimRecord`] streams, one per row type.
//!
//! ## Column mapping
//!
//! | Source | Dialect | Columns |
//! |--------|---------|---------|
//! | `meta.xml` present | declared per file | declared index → term |
//! | otherwise | sniffed from the first lines | header row via [`Term::from_header`] |
//!
//! Malformed rows (wrong column count, invalid UTF-8, broken quoting) are
//! skipped and counted; they never abort a file.

pub mod archive;
pub mod dialect;
pub mod dwca;

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::model::VerbatimRecord;
use crate::term::{RowType, Term, Vocabulary};
use crate::{Error, Result};

pub use dialect::Dialect;
pub use dwca::{ArchiveDescriptor, FileDescriptor};

/// File extensions treated as delimited data.
pub const DATA_EXTENSIONS: [&str; 4] = ["csv", "tsv", "txt", "tab"];

pub const DEFAULT_SAMPLE_LINES: usize = 50;

// ============================================================================
// DataFile
// ============================================================================

/// One data file and how to read it.
#[derive(Debug, Clone)]
pub struct DataFile {
    pub path: PathBuf,
    pub row_type: RowType,
    pub dialect: Dialect,
    pub header_lines: usize,
    /// Column index → term; `None` for unmapped columns.
    pub columns: Vec<Option<Term>>,
    /// Exact column count rows must have, when known from a header.
    pub width: Option<usize>,
    pub defaults: Vec<(Term, String)>,
}

impl DataFile {
    /// Map a headed file by reading its first row.
    fn from_header(path: PathBuf, row_type: RowType, dialect: Dialect, vocab: Vocabulary) -> Result<Self> {
        let mut reader = dialect.reader_builder().from_reader(File::open(&path)?);
        let mut header = csv::StringRecord::new();
        let columns: Vec<Option<Term>> = if reader.read_record(&mut header)? {
            header
                .iter()
                .map(|h| {
                    let h = h.trim();
                    (!h.is_empty()).then(|| Term::from_header(h, vocab))
                })
                .collect()
        } else {
            Vec::new()
        };
        Ok(Self {
            path,
            row_type,
            dialect,
            header_lines: 1,
            width: Some(columns.len()),
            columns,
            defaults: Vec::new(),
        })
    }

    fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn has_term(&self, term: &Term) -> bool {
        self.columns.iter().flatten().any(|t| t == term) || self.defaults.iter().any(|(t, _)| t == term)
    }
}

// ============================================================================
// TermReader
// ============================================================================

/// Term-keyed access to the data files of one dataset directory.
#[derive(Debug)]
pub struct TermReader {
    dir: PathBuf,
    vocabulary: Vocabulary,
    files: Vec<DataFile>,
    skipped: Arc<AtomicU64>,
    /// First read error that made a stream give up on its file.
    failure: Arc<Mutex<Option<String>>>,
}

impl TermReader {
    /// Open a directory, sniffing each data file with the default sample size.
    pub fn open(dir: impl AsRef<Path>, vocabulary: Vocabulary) -> Result<Self> {
        Self::open_with(dir, vocabulary, DEFAULT_SAMPLE_LINES)
    }

    /// Open a directory. A `meta.xml` descriptor takes precedence over
    /// discovery by file name.
    pub fn open_with(dir: impl AsRef<Path>, vocabulary: Vocabulary, sample_lines: usize) -> Result<Self> {
        let dir = dir.as_ref().to_path_buf();
        let files = if dir.join(dwca::META_FILE).is_file() {
            Self::describe_dwca(&dir)?
        } else {
            Self::discover(&dir, vocabulary, sample_lines)?
        };
        for f in &files {
            debug!(file = %f.path.display(), row_type = %f.row_type, columns = f.columns.len(), "mapped data file");
        }
        Ok(Self {
            dir,
            vocabulary,
            files,
            skipped: Arc::new(AtomicU64::new(0)),
            failure: Arc::new(Mutex::new(None)),
        })
    }

    fn describe_dwca(dir: &Path) -> Result<Vec<DataFile>> {
        let meta = ArchiveDescriptor::read(dir)?;
        let mut files = Vec::new();
        for desc in meta.files() {
            let path = dir.join(desc.location()?);
            if !path.is_file() {
                warn!(file = %path.display(), "data file declared in meta.xml is missing");
                continue;
            }
            files.push(DataFile {
                path,
                row_type: desc.row_type(),
                dialect: desc.dialect(),
                header_lines: desc.header_lines(),
                columns: desc.columns(),
                width: None,
                defaults: desc.defaults(),
            });
        }
        Ok(files)
    }

    fn discover(dir: &Path, vocabulary: Vocabulary, sample_lines: usize) -> Result<Vec<DataFile>> {
        let mut paths: Vec<PathBuf> = fs::read_dir(dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file() && is_data_file(p))
            .collect();
        paths.sort();

        let mut files: Vec<DataFile> = Vec::new();
        for path in paths {
            let Some(stem) = path.file_stem().map(|s| s.to_string_lossy().into_owned()) else {
                continue;
            };
            let row_type = RowType::resolve(&stem, vocabulary);
            if files.iter().any(|f| f.row_type == row_type) {
                warn!(file = %path.display(), %row_type, "ignoring second file for the same row type");
                continue;
            }
            let dialect = Dialect::sniff_file(&path, sample_lines)?;
            files.push(DataFile::from_header(path, row_type, dialect, vocabulary)?);
        }
        Ok(files)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn vocabulary(&self) -> Vocabulary {
        self.vocabulary
    }

    pub fn files(&self) -> &[DataFile] {
        &self.files
    }

    pub fn row_types(&self) -> impl Iterator<Item = &RowType> {
        self.files.iter().map(|f| &f.row_type)
    }

    pub fn data_file(&self, row_type: &RowType) -> Option<&DataFile> {
        self.files.iter().find(|f| &f.row_type == row_type)
    }

    pub fn has(&self, row_type: &RowType) -> bool {
        self.data_file(row_type).is_some()
    }

    /// Rows skipped as malformed by every stream of this reader so far.
    pub fn skipped_rows(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Fails if any stream hit an I/O error. Malformed rows are not failures.
    pub fn check_failure(&self) -> Result<()> {
        match self.failure.lock().take() {
            Some(msg) => Err(Error::Io(std::io::Error::other(msg))),
            None => Ok(()),
        }
    }

    /// Stream the records of a row type. Each call reopens the file; a row
    /// type without a file yields nothing.
    pub fn stream(&self, row_type: &RowType) -> Result<RecordIter> {
        let shared = Shared { skipped: Arc::clone(&self.skipped), failure: Arc::clone(&self.failure) };
        match self.data_file(row_type) {
            Some(file) => RecordIter::open(file, shared),
            None => Ok(RecordIter::empty(row_type.clone(), shared)),
        }
    }

    /// Peek at the first record of a row type.
    pub fn read_first_row(&self, row_type: &RowType) -> Result<Option<VerbatimRecord>> {
        Ok(self.stream(row_type)?.next())
    }
}

fn is_data_file(path: &Path) -> bool {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .is_some_and(|e| DATA_EXTENSIONS.contains(&e.as_str()))
}

// ============================================================================
// RecordIter
// ============================================================================

/// Counters a stream shares with its reader.
#[derive(Debug, Clone)]
struct Shared {
    skipped: Arc<AtomicU64>,
    failure: Arc<Mutex<Option<String>>>,
}

/// Lazy record stream over one data file.
pub struct RecordIter {
    reader: Option<csv::Reader<File>>,
    file: String,
    row_type: RowType,
    columns: Vec<Option<Term>>,
    width: Option<usize>,
    defaults: Vec<(Term, String)>,
    record: csv::ByteRecord,
    shared: Shared,
}

impl RecordIter {
    fn open(file: &DataFile, shared: Shared) -> Result<Self> {
        let mut reader = file.dialect.reader_builder().from_reader(File::open(&file.path)?);
        let mut record = csv::ByteRecord::new();
        for _ in 0..file.header_lines {
            if !reader.read_byte_record(&mut record)? {
                break;
            }
        }
        Ok(Self {
            reader: Some(reader),
            file: file.file_name(),
            row_type: file.row_type.clone(),
            columns: file.columns.clone(),
            width: file.width,
            defaults: file.defaults.clone(),
            record,
            shared,
        })
    }

    fn empty(row_type: RowType, shared: Shared) -> Self {
        Self {
            reader: None,
            file: String::new(),
            row_type,
            columns: Vec::new(),
            width: None,
            defaults: Vec::new(),
            record: csv::ByteRecord::new(),
            shared,
        }
    }

    fn skip_row(&self, line: u64, reason: &str) {
        self.shared.skipped.fetch_add(1, Ordering::Relaxed);
        warn!(file = %self.file, line, reason, "skipping malformed row");
    }

    fn interpret(&self, line: u64) -> Option<VerbatimRecord> {
        let fits = match self.width {
            Some(w) => self.record.len() == w,
            None => self.record.len() >= self.columns.len(),
        };
        if !fits {
            self.skip_row(line, "wrong column count");
            return None;
        }

        let mut rec = VerbatimRecord::new(self.file.clone(), line, self.row_type.clone());
        for (idx, term) in self.columns.iter().enumerate() {
            let Some(term) = term else { continue };
            let raw = self.record.get(idx).unwrap_or_default();
            let Ok(value) = std::str::from_utf8(raw) else {
                self.skip_row(line, "invalid UTF-8");
                return None;
            };
            rec.put(term.clone(), value);
        }
        for (term, value) in &self.defaults {
            if !rec.has(term.clone()) {
                rec.put(term.clone(), value.clone());
            }
        }
        Some(rec)
    }
}

impl Iterator for RecordIter {
    type Item = VerbatimRecord;

    fn next(&mut self) -> Option<VerbatimRecord> {
        loop {
            let reader = self.reader.as_mut()?;
            match reader.read_byte_record(&mut self.record) {
                Ok(false) => {
                    self.reader = None;
                    return None;
                }
                Ok(true) => {
                    let line = self.record.position().map(|p| p.line()).unwrap_or_default();
                    if let Some(rec) = self.interpret(line) {
                        return Some(rec);
                    }
                }
                Err(e) => {
                    if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                        warn!(file = %self.file, error = %e, "read error, abandoning file");
                        self.shared.failure.lock().get_or_insert_with(|| format!("{}: {e}", self.file));
                        self.reader = None;
                        return None;
                    }
                    let line = e.position().map(|p| p.line()).unwrap_or_default();
                    self.skip_row(line, "unreadable row");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::term::{AcefRowType, AcefTerm, ColdpRowType, ColdpTerm, DwcRowType, DwcTerm};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_discover_and_stream_coldp() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("NameUsage.tsv"),
            "ID\tparentID\tscientificName\trank\n1\t\tAbies\tgenus\n2\t1\tAbies alba\tspecies\n3\tbroken\n",
        )
        .unwrap();
        fs::write(tmp.path().join("metadata.yaml"), "title: Firs\n").unwrap();

        let reader = TermReader::open(tmp.path(), Vocabulary::Coldp).unwrap();
        let rt = RowType::Coldp(ColdpRowType::NameUsage);
        assert_eq!(reader.row_types().collect::<Vec<_>>(), vec![&rt]);

        let records: Vec<_> = reader.stream(&rt).unwrap().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].get(ColdpTerm::ScientificName), Some("Abies alba"));
        assert_eq!(records[1].get(ColdpTerm::ParentID), Some("1"));
        assert_eq!(records[1].line, 3);
        assert_eq!(reader.skipped_rows(), 1);

        // restartable
        assert_eq!(reader.stream(&rt).unwrap().count(), 2);
        assert_eq!(
            reader.read_first_row(&rt).unwrap().unwrap().get(ColdpTerm::ID),
            Some("1")
        );
    }

    #[test]
    fn test_missing_row_type_streams_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let reader = TermReader::open(tmp.path(), Vocabulary::Acef).unwrap();
        let rt = RowType::Acef(AcefRowType::Synonyms);
        assert!(!reader.has(&rt));
        assert_eq!(reader.stream(&rt).unwrap().count(), 0);
        assert!(reader.read_first_row(&rt).unwrap().is_none());
    }

    #[test]
    fn test_acef_semicolon_file() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("AcceptedSpecies.txt"),
            "AcceptedTaxonID;Genus;SpeciesEpithet;AuthorString\nA1;Abies;alba;\"Mill.; 1768\"\n",
        )
        .unwrap();
        let reader = TermReader::open(tmp.path(), Vocabulary::Acef).unwrap();
        let rec = reader
            .read_first_row(&RowType::Acef(AcefRowType::AcceptedSpecies))
            .unwrap()
            .unwrap();
        assert_eq!(rec.get(AcefTerm::AuthorString), Some("Mill.; 1768"));
    }

    #[test]
    fn test_dwca_descriptor_mapping_and_defaults() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(
            tmp.path().join("meta.xml"),
            r#"<archive><core rowType="http://rs.tdwg.org/dwc/terms/Taxon" fieldsTerminatedBy="\t" fieldsEnclosedBy="" ignoreHeaderLines="1">
<files><location>taxa.txt</location></files><id index="0"/>
<field index="1" term="http://rs.tdwg.org/dwc/terms/scientificName"/>
<field term="http://rs.tdwg.org/dwc/terms/taxonRank" default="species"/>
</core></archive>"#,
        )
        .unwrap();
        fs::write(tmp.path().join("taxa.txt"), "id\tname\textra\n1\tAbies alba\tx\n2\t\"Picea\n").unwrap();

        let reader = TermReader::open(tmp.path(), Vocabulary::Dwc).unwrap();
        let rt = RowType::Dwc(DwcRowType::Taxon);
        let records: Vec<_> = reader.stream(&rt).unwrap().collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].get(DwcTerm::TaxonID), Some("1"));
        assert_eq!(records[0].get(DwcTerm::TaxonRank), Some("species"));
        assert_eq!(records[1].get(DwcTerm::ScientificName), Some("\"Picea"));
    }
}
