//! # Inserters
//!
//! An inserter turns the rows of one source format into [`Interpreted`]
//! items. It never touches the store; [`GraphWriter`] writes the items in
//! batched transactions.
//!
//! | Format | Inserter | Phases (store synced after each) |
//! |--------|----------|----------------------------------|
//! | DwC-A | [`DwcaInserter`] | core taxa → extensions |
//! | ACEF | [`AcefInserter`] | references → species, infraspecies, synonyms → links, other sheets |
//! | ColDP | [`ColdpInserter`] | references, names → usages → name relations, other entities |
//! | text tree | [`TextTreeInserter`] | the whole tree |
//! | BibTeX | [`BibtexInserter`] | references, before any of the above |
//!
//! Row problems become issues on the row's [`VerbatimRecord`]; the row is
//! still written, as a verbatim record only when nothing usable is left.

pub mod acef;
pub mod bibtex;
pub mod coldp;
pub mod dwca;
pub mod texttree;

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::metadata::DatasetMetadata;
use super::DataFormat;
use crate::index::IndexType;
use crate::model::*;
use crate::parser::NameParser;
use crate::reader::TermReader;
use crate::reference::{parse_year, ReferenceFactory};
use crate::storage::{DeferredRefs, GraphStore, NeoUsage};
use crate::term::{RowType, Term};
use crate::tx::{CancelFlag, TxMode};
use crate::{Error, Result};

pub use acef::AcefInserter;
pub use bibtex::BibtexInserter;
pub use coldp::ColdpInserter;
pub use dwca::DwcaInserter;
pub use texttree::TextTreeInserter;

// ============================================================================
// Interpreted items
// ============================================================================

/// A name pointing at its basionym by source id. Either id may be a name
/// id or a usage id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BasionymLink {
    pub name_id: String,
    pub basionym_id: String,
}

/// What a usage cites a reference for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReferenceRole {
    /// Original publication of the name.
    Nomenclatural,
    /// Source of the taxonomic opinion.
    Taxonomic,
    Other,
}

/// A usage citing a reference by source ids.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReferenceLink {
    pub usage_id: String,
    pub reference_id: String,
    pub role: ReferenceRole,
}

/// One interpreted source row, or something derived from one.
#[derive(Debug, Clone)]
pub enum Interpreted {
    /// A usage with its own name.
    Usage { verbatim: VerbatimRecord, usage: NeoUsage },
    /// A name row. Usages attach to it later by name id.
    Name { verbatim: VerbatimRecord, name: Name, basionym_id: Option<String> },
    /// A usage of a name stored by an earlier phase.
    UsageOfName { verbatim: VerbatimRecord, name_id: String, usage: NeoUsage },
    /// A reference. Derived references, like a DwC `namePublishedIn`, have
    /// no row of their own and are dropped silently if their id is taken.
    Reference { verbatim: Option<VerbatimRecord>, reference: Reference },
    Basionym { verbatim: VerbatimRecord, link: BasionymLink },
    ReferenceLink { verbatim: Option<VerbatimRecord>, link: ReferenceLink },
    /// A row kept for provenance only.
    Verbatim(VerbatimRecord),
}

/// Lazily interpreted rows of one phase.
pub type Phase<'a> = Box<dyn Iterator<Item = Interpreted> + Send + 'a>;

/// Per-format row interpretation.
pub trait Inserter: Send + Sync {
    fn format(&self) -> Option<DataFormat>;

    /// Rows grouped in insertion order. Items of a later phase may refer to
    /// ids of an earlier one.
    fn phases(&self) -> Result<Vec<Phase<'_>>>;

    fn metadata(&self) -> Result<Option<DatasetMetadata>> {
        Ok(None)
    }

    /// Rows dropped as malformed while reading.
    fn skipped_rows(&self) -> u64 {
        0
    }

    /// Fails if reading stopped on an I/O error.
    fn check_failure(&self) -> Result<()> {
        Ok(())
    }
}

/// The interpreters every inserter shares.
#[derive(Clone)]
pub struct Interpreters {
    pub names: Arc<dyn NameParser>,
    pub references: ReferenceFactory,
}

impl std::fmt::Debug for Interpreters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Interpreters").field("references", &self.references).finish_non_exhaustive()
    }
}

impl Default for Interpreters {
    fn default() -> Self {
        Self {
            names: Arc::new(crate::parser::SimpleNameParser),
            references: ReferenceFactory::default(),
        }
    }
}

/// The inserter for a detected format.
pub fn open_inserter(
    format: DataFormat,
    dir: &Path,
    interpreters: Interpreters,
    sample_lines: usize,
) -> Result<Box<dyn Inserter>> {
    Ok(match format {
        DataFormat::DwcA => Box::new(DwcaInserter::open(dir, interpreters, sample_lines)?),
        DataFormat::Acef => Box::new(AcefInserter::open(dir, interpreters, sample_lines)?),
        DataFormat::Coldp => Box::new(ColdpInserter::open(dir, interpreters, sample_lines)?),
        DataFormat::TextTree => {
            let file = super::format::text_tree_file(dir)?
                .ok_or_else(|| Error::UnsupportedFormat(format!("no text tree in {}", dir.display())))?;
            Box::new(TextTreeInserter::new(file, interpreters))
        }
    })
}

// ============================================================================
// Row helpers
// ============================================================================

/// Records of several row types, one after the other.
pub(crate) fn rows<'a>(
    reader: &'a TermReader,
    row_types: &[RowType],
) -> Result<Box<dyn Iterator<Item = VerbatimRecord> + Send + 'a>> {
    let mut out: Box<dyn Iterator<Item = VerbatimRecord> + Send + 'a> = Box::new(std::iter::empty());
    for rt in row_types {
        out = Box::new(out.chain(reader.stream(rt)?));
    }
    Ok(out)
}

/// Row types present in the reader but not listed in `known`.
pub(crate) fn other_row_types(reader: &TermReader, known: &[RowType]) -> Vec<RowType> {
    reader.row_types().filter(|rt| !known.contains(rt)).cloned().collect()
}

pub(crate) fn owned(v: &VerbatimRecord, term: impl Into<Term>) -> Option<String> {
    v.get(term).map(str::to_string)
}

/// Identifier lists such as pro parte accepted ids, separated by `|`.
pub(crate) fn split_ids(raw: Option<&str>) -> Vec<String> {
    raw.map(|r| r.split('|').map(str::trim).filter(|s| !s.is_empty()).map(str::to_string).collect())
        .unwrap_or_default()
}

pub(crate) fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "extinct" => Some(true),
        "0" | "false" | "f" | "no" | "n" | "extant" => Some(false),
        _ => None,
    }
}

pub(crate) fn status(
    v: &mut VerbatimRecord,
    term: impl Into<Term>,
    default: TaxonomicStatus,
) -> TaxonomicStatus {
    let parsed = v.get(term).map(|raw| TaxonomicStatus::parse(raw).ok_or(()));
    match parsed {
        None => default,
        Some(Ok(s)) => s,
        Some(Err(())) => {
            v.add_issue(Issue::TaxonomicStatusInvalid);
            default
        }
    }
}

pub(crate) fn year(v: &mut VerbatimRecord, term: impl Into<Term>) -> Option<i32> {
    let parsed = v.get(term).map(|raw| parse_year(raw).ok_or(()));
    match parsed {
        None => None,
        Some(Ok(y)) => Some(y),
        Some(Err(())) => {
            v.add_issue(Issue::UnparsableYear);
            None
        }
    }
}

pub(crate) fn flag(v: &VerbatimRecord, term: impl Into<Term>) -> Option<bool> {
    v.get(term).and_then(parse_bool)
}

/// Flat classification columns, top down.
pub(crate) fn classification(v: &VerbatimRecord, columns: &[(Rank, Term)]) -> Classification {
    let mut c = Classification::default();
    for (rank, term) in columns {
        c.set(*rank, owned(v, term.clone()));
    }
    c
}

/// Name columns of a row.
#[derive(Debug, Clone, Copy, Default)]
pub struct NameFields<'a> {
    pub scientific_name: Option<&'a str>,
    pub authorship: Option<&'a str>,
    pub rank: Option<&'a str>,
    pub code: Option<&'a str>,
    pub uninomial: Option<&'a str>,
    pub genus: Option<&'a str>,
    pub infrageneric_epithet: Option<&'a str>,
    pub specific_epithet: Option<&'a str>,
    pub infraspecific_epithet: Option<&'a str>,
}

impl NameFields<'_> {
    /// Compose a name from its atoms when no full name is given.
    fn assemble(&self, rank: Option<Rank>) -> Option<String> {
        if let Some(u) = self.uninomial {
            return Some(u.to_string());
        }
        let genus = self.genus?;
        let mut parts = vec![genus.to_string()];
        if let Some(sub) = self.infrageneric_epithet {
            parts.push(format!("({sub})"));
        }
        if let Some(sp) = self.specific_epithet {
            parts.push(sp.to_string());
            if let Some(infra) = self.infraspecific_epithet {
                if let Some(marker) = rank.filter(Rank::is_infraspecific).and_then(|r| r.marker()) {
                    parts.push(marker.to_string());
                }
                parts.push(infra.to_string());
            }
        }
        Some(parts.join(" "))
    }
}

/// Interpret name columns. `None` with `SCIENTIFIC_NAME_MISSING` when the
/// row carries neither a name nor atoms to build one.
pub fn interpret_name(parser: &dyn NameParser, f: &NameFields<'_>) -> Outcome<Option<Name>> {
    let mut issues: Vec<Issue> = Vec::new();
    let rank = f.rank.and_then(|raw| {
        let r = Rank::parse(raw);
        if r.is_none() {
            issues.push(Issue::RankInvalid);
        }
        r
    });
    let code = f.code.and_then(|raw| {
        let c = NomCode::parse(raw);
        if c.is_none() {
            issues.push(Issue::NomCodeInvalid);
        }
        c
    });

    let text = match f.scientific_name.map(str::to_string).or_else(|| f.assemble(rank)) {
        Some(text) => text,
        None => {
            let mut out = Outcome::with_issue(None, Issue::ScientificNameMissing);
            for i in issues {
                out.add_issue(i);
            }
            return out;
        }
    };

    let mut out = parser.parse_with_authorship(&text, f.authorship, rank, code);
    for i in issues {
        out.add_issue(i);
    }
    let name = &mut out.value;
    if name.name_type.is_parsable() {
        name.specific_epithet = name.specific_epithet.take().or(f.specific_epithet.map(str::to_string));
        if name.specific_epithet.is_some() {
            name.genus = name.genus.take().or(f.genus.map(str::to_string));
            name.infraspecific_epithet =
                name.infraspecific_epithet.take().or(f.infraspecific_epithet.map(str::to_string));
        }
    }
    out.map(Some)
}

// ============================================================================
// Writing
// ============================================================================

/// Counts of what the insert phase wrote.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsertStats {
    /// Source rows seen, excluding derived items.
    pub records: u64,
    pub usages: u64,
    pub names: u64,
    pub references: u64,
    /// Rows kept only as verbatim records.
    pub verbatim_only: u64,
    pub duplicate_ids: u64,
}

/// Links that can only be resolved once every phase is written.
#[derive(Debug, Clone, Default)]
pub struct Pending {
    pub basionyms: Vec<(BasionymLink, Option<VerbatimKey>)>,
    pub references: Vec<(ReferenceLink, Option<VerbatimKey>)>,
}

impl Pending {
    pub fn len(&self) -> usize {
        self.basionyms.len() + self.references.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Writes interpreted items in write transactions committed every
/// `batch_size` items.
pub struct GraphWriter<'a, S: GraphStore> {
    store: &'a S,
    tx: Option<S::Tx>,
    batch_size: usize,
    in_batch: usize,
    cancel: CancelFlag,
    pub stats: InsertStats,
    pub pending: Pending,
}

impl<'a, S: GraphStore> GraphWriter<'a, S> {
    pub fn new(store: &'a S, batch_size: usize, cancel: CancelFlag) -> Self {
        Self {
            store,
            tx: None,
            batch_size: batch_size.max(1),
            in_batch: 0,
            cancel,
            stats: InsertStats::default(),
            pending: Pending::default(),
        }
    }

    /// Write one item. An error leaves the open batch uncommitted.
    pub async fn write(&mut self, item: Interpreted) -> Result<()> {
        self.cancel.check()?;
        let mut tx = match self.tx.take() {
            Some(tx) => tx,
            None => self.store.begin_tx(TxMode::ReadWrite).await?,
        };
        if let Err(e) = write_item(self.store, &mut tx, item, &mut self.stats, &mut self.pending).await {
            self.store.rollback_tx(tx).await?;
            return Err(e);
        }
        self.in_batch += 1;
        if self.in_batch >= self.batch_size {
            self.store.commit_tx(tx).await?;
            debug!(records = self.stats.records, "committed insert batch");
            self.in_batch = 0;
        } else {
            self.tx = Some(tx);
        }
        Ok(())
    }

    /// Commit the open batch.
    pub async fn flush(&mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            self.store.commit_tx(tx).await?;
        }
        self.in_batch = 0;
        Ok(())
    }

    pub fn into_parts(self) -> (InsertStats, Pending) {
        (self.stats, self.pending)
    }
}

/// Keep the row only as a verbatim record.
async fn verbatim_only<S: GraphStore>(
    store: &S,
    tx: &mut S::Tx,
    verbatim: VerbatimRecord,
    stats: &mut InsertStats,
) -> Result<VerbatimKey> {
    stats.verbatim_only += 1;
    store.create_verbatim(tx, verbatim).await
}

/// False, with `ID_NOT_UNIQUE` on the row, when the id is taken.
async fn claim_id<S: GraphStore>(
    store: &S,
    tx: &S::Tx,
    index: IndexType,
    id: Option<&str>,
    verbatim: &mut VerbatimRecord,
    stats: &mut InsertStats,
) -> Result<bool> {
    match id {
        Some(id) if store.id_exists(tx, index, id).await? => {
            debug!(id, ?index, at = %verbatim.location(), "duplicate id");
            verbatim.add_issue(Issue::IdNotUnique);
            stats.duplicate_ids += 1;
            Ok(false)
        }
        _ => Ok(true),
    }
}

async fn write_item<S: GraphStore>(
    store: &S,
    tx: &mut S::Tx,
    item: Interpreted,
    stats: &mut InsertStats,
    pending: &mut Pending,
) -> Result<()> {
    match item {
        Interpreted::Usage { mut verbatim, mut usage } => {
            stats.records += 1;
            if !claim_id(store, tx, IndexType::Usage, usage.usage.id.as_deref(), &mut verbatim, stats).await? {
                verbatim_only(store, tx, verbatim, stats).await?;
                return Ok(());
            }
            let key = store.create_verbatim(tx, verbatim).await?;
            let name = &mut usage.usage.name;
            if name.id.is_none() {
                name.id = usage.usage.id.clone();
            }
            if let Some(id) = name.id.as_deref() {
                if store.id_exists(tx, IndexType::Name, id).await? {
                    name.id = None;
                }
            }
            name.verbatim_key = Some(key);
            usage.usage.verbatim_key = Some(key);
            let name_node = store.create_name(tx, usage.usage.name.clone()).await?;
            store.create_usage(tx, name_node, usage).await?;
            stats.names += 1;
            stats.usages += 1;
        }
        Interpreted::Name { mut verbatim, mut name, basionym_id } => {
            stats.records += 1;
            if !claim_id(store, tx, IndexType::Name, name.id.as_deref(), &mut verbatim, stats).await? {
                verbatim_only(store, tx, verbatim, stats).await?;
                return Ok(());
            }
            let key = store.create_verbatim(tx, verbatim).await?;
            name.verbatim_key = Some(key);
            if let (Some(name_id), Some(basionym_id)) = (name.id.clone(), basionym_id) {
                pending.basionyms.push((BasionymLink { name_id, basionym_id }, Some(key)));
            }
            store.create_name(tx, name).await?;
            stats.names += 1;
        }
        Interpreted::UsageOfName { mut verbatim, name_id, mut usage } => {
            stats.records += 1;
            let Some(name_node) = store.name_by_id(tx, &name_id).await? else {
                verbatim.add_issue(Issue::NameIdInvalid);
                verbatim_only(store, tx, verbatim, stats).await?;
                return Ok(());
            };
            if !claim_id(store, tx, IndexType::Usage, usage.usage.id.as_deref(), &mut verbatim, stats).await? {
                verbatim_only(store, tx, verbatim, stats).await?;
                return Ok(());
            }
            let key = store.create_verbatim(tx, verbatim).await?;
            if let Some(stored) = store.name(tx, name_node).await? {
                usage.usage.name = stored.name;
            }
            usage.usage.verbatim_key = Some(key);
            store.create_usage(tx, name_node, usage).await?;
            stats.usages += 1;
        }
        Interpreted::Reference { verbatim, mut reference } => {
            let taken = match reference.id.as_deref() {
                Some(id) => store.id_exists(tx, IndexType::Reference, id).await?,
                None => false,
            };
            match verbatim {
                Some(mut verbatim) => {
                    stats.records += 1;
                    verbatim.add_issues(reference.issues.iter().copied());
                    if taken {
                        verbatim.add_issue(Issue::IdNotUnique);
                        stats.duplicate_ids += 1;
                        verbatim_only(store, tx, verbatim, stats).await?;
                        return Ok(());
                    }
                    reference.verbatim_key = Some(store.create_verbatim(tx, verbatim).await?);
                }
                None if taken => return Ok(()),
                None => {}
            }
            if store.create_reference(tx, reference).await? {
                stats.references += 1;
            }
        }
        Interpreted::Basionym { verbatim, link } => {
            stats.records += 1;
            let key = store.create_verbatim(tx, verbatim).await?;
            pending.basionyms.push((link, Some(key)));
        }
        Interpreted::ReferenceLink { verbatim, link } => {
            let key = match verbatim {
                Some(v) => {
                    stats.records += 1;
                    Some(store.create_verbatim(tx, v).await?)
                }
                None => None,
            };
            pending.references.push((link, key));
        }
        Interpreted::Verbatim(verbatim) => {
            stats.records += 1;
            verbatim_only(store, tx, verbatim, stats).await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::SimpleNameParser;
    use crate::storage::MemoryStore;
    use crate::term::{ColdpRowType, ColdpTerm};
    use pretty_assertions::assert_eq;

    fn row(line: u64) -> VerbatimRecord {
        VerbatimRecord::new("NameUsage.tsv", line, RowType::Coldp(ColdpRowType::NameUsage))
    }

    #[test]
    fn test_interpret_name_from_atoms() {
        let fields = NameFields {
            genus: Some("Abies"),
            specific_epithet: Some("alba"),
            infraspecific_epithet: Some("nebrodensis"),
            rank: Some("var."),
            authorship: Some("Mattei"),
            ..Default::default()
        };
        let out = interpret_name(&SimpleNameParser, &fields);
        assert!(out.is_clean(), "{:?}", out.issues);
        let name = out.value.unwrap();
        assert_eq!(name.scientific_name, "Abies alba var. nebrodensis");
        assert_eq!(name.rank, Rank::Variety);
        assert_eq!(name.infraspecific_epithet.as_deref(), Some("nebrodensis"));
        assert_eq!(name.authorship.as_deref(), Some("Mattei"));
    }

    #[test]
    fn test_interpret_name_issues() {
        let out = interpret_name(&SimpleNameParser, &NameFields { rank: Some("species"), ..Default::default() });
        assert_eq!(out.value, None);
        assert!(out.has_issue(Issue::ScientificNameMissing));

        let fields = NameFields { scientific_name: Some("Abies alba"), rank: Some("spezies"), code: Some("martian"), ..Default::default() };
        let out = interpret_name(&SimpleNameParser, &fields);
        assert!(out.has_issue(Issue::RankInvalid));
        assert!(out.has_issue(Issue::NomCodeInvalid));
        assert_eq!(out.value.unwrap().rank, Rank::Species);
    }

    #[test]
    fn test_status_and_year_helpers() {
        let mut v = row(2);
        v.put(ColdpTerm::Status, "maybe");
        v.put(ColdpTerm::PublishedInYear, "circa 1850s");
        assert_eq!(status(&mut v, ColdpTerm::Status, TaxonomicStatus::Accepted), TaxonomicStatus::Accepted);
        assert_eq!(year(&mut v, ColdpTerm::PublishedInYear), None);
        assert!(v.has_issue(Issue::TaxonomicStatusInvalid));
        assert!(v.has_issue(Issue::UnparsableYear));
        assert_eq!(split_ids(Some("a| b ||c")), vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn test_writer_rejects_duplicate_usage_ids() {
        let db = MemoryStore::new();
        let mut w = GraphWriter::new(&db, 1, CancelFlag::new());
        for line in [2, 3] {
            let usage = NeoUsage::new(Usage::taxon("1", Name::new("Abies", Rank::Genus)));
            w.write(Interpreted::Usage { verbatim: row(line), usage }).await.unwrap();
        }
        w.flush().await.unwrap();
        let (stats, _) = w.into_parts();
        assert_eq!(stats.usages, 1);
        assert_eq!(stats.duplicate_ids, 1);
        assert_eq!(stats.verbatim_only, 1);

        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        let counts = db.issue_counts(&tx).await.unwrap();
        assert_eq!(counts.get(&Issue::IdNotUnique), Some(&1));
    }

    #[tokio::test]
    async fn test_usage_of_unknown_name_is_kept_verbatim() {
        let db = MemoryStore::new();
        let mut w = GraphWriter::new(&db, 10, CancelFlag::new());
        let usage = NeoUsage::new(Usage::taxon("t1", Name::default()));
        w.write(Interpreted::UsageOfName { verbatim: row(2), name_id: "n1".into(), usage }).await.unwrap();
        w.flush().await.unwrap();
        assert_eq!(w.stats.usages, 0);

        let tx = db.begin_tx(TxMode::ReadOnly).await.unwrap();
        assert_eq!(db.issue_counts(&tx).await.unwrap().get(&Issue::NameIdInvalid), Some(&1));
    }

    #[tokio::test]
    async fn test_writer_stops_when_cancelled() {
        let db = MemoryStore::new();
        let cancel = CancelFlag::new();
        let mut w = GraphWriter::new(&db, 10, cancel.clone());
        cancel.cancel();
        let err = w.write(Interpreted::Verbatim(row(2))).await.unwrap_err();
        assert!(matches!(err, Error::Interrupted));
    }
}
