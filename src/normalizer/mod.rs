//! Import orchestration.
//!
//! A [`Normalizer`] owns one store for one import attempt and drives it
//! through a fixed sequence of states:
//!
//! ```text
//! Parsing → Inserting → PostProcessing → Validating → Done
//!    └──────────┴──────────────┴──────────────┴──────→ Failed
//! ```
//!
//! | State | Work |
//! |-------|------|
//! | `Parsing` | unpack, detect the format, read metadata |
//! | `Inserting` | write every inserter phase, sync the id indexes after each |
//! | `PostProcessing` | [`relations::post_process`] |
//! | `Validating` | [`validation::validate`], collect the report |
//!
//! Row problems end up as issues in the report. Only I/O failures, corrupt
//! archives, storage errors and cancellation fail a run, and the failure
//! names the state it happened in.

pub mod format;
pub mod inserter;
pub mod metadata;
pub mod relations;
pub mod validation;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, info_span, warn, Instrument};

pub use format::DataFormat;
pub use inserter::{GraphWriter, InsertStats, Inserter, Interpreted, Interpreters};
pub use metadata::DatasetMetadata;
pub use relations::PostProcessStats;
pub use validation::ValidationSummary;

use crate::model::{Issue, RelType};
use crate::parser::NameParser;
use crate::reference::ReferenceFactory;
use crate::storage::GraphStore;
use crate::tx::{CancelFlag, TxMode};
use crate::{Error, Result};

// ============================================================================
// Context and configuration
// ============================================================================

/// Identity of one import attempt, carried into every log line of the run.
#[derive(Debug, Clone)]
pub struct ImportContext {
    pub dataset_key: i32,
    pub attempt: i32,
    /// Shared with whoever may cancel the run.
    pub cancel: CancelFlag,
}

impl ImportContext {
    pub fn new(dataset_key: i32, attempt: i32) -> Self {
        Self { dataset_key, attempt, cancel: CancelFlag::new() }
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Tuning knobs of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Items per write transaction, for inserts and graph scans.
    pub batch_size: usize,
    /// Lines sampled when sniffing a file's dialect.
    pub sample_lines: usize,
    /// Where zip archives are extracted. The system temp dir when unset.
    pub scratch_dir: Option<PathBuf>,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self { batch_size: 10_000, sample_lines: 50, scratch_dir: None }
    }
}

impl NormalizerConfig {
    /// Load from a JSON file. Missing keys take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }
}

// ============================================================================
// State and report
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum NormalizerState {
    #[default]
    Parsing,
    Inserting,
    PostProcessing,
    Validating,
    Done,
    Failed,
}

impl std::fmt::Display for NormalizerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            NormalizerState::Parsing => "parsing",
            NormalizerState::Inserting => "inserting",
            NormalizerState::PostProcessing => "post-processing",
            NormalizerState::Validating => "validating",
            NormalizerState::Done => "done",
            NormalizerState::Failed => "failed",
        })
    }
}

/// Edge totals of the final graph.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationshipCounts {
    pub parent_of: u64,
    pub synonym_of: u64,
    pub has_basionym: u64,
}

/// Everything a finished run learned about the dataset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationReport {
    pub dataset_key: i32,
    pub attempt: i32,
    pub format: DataFormat,
    pub metadata: Option<DatasetMetadata>,
    pub started: DateTime<Utc>,
    pub finished: DateTime<Utc>,
    pub insert: InsertStats,
    pub post_process: PostProcessStats,
    /// Malformed rows the reader dropped.
    pub skipped_rows: u64,
    pub issues: BTreeMap<Issue, u64>,
    pub relationships: RelationshipCounts,
    pub validation: ValidationSummary,
}

impl NormalizationReport {
    pub fn issue_count(&self, issue: Issue) -> u64 {
        self.issues.get(&issue).copied().unwrap_or(0)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// A run that stopped before `Done`.
#[derive(Debug, thiserror::Error)]
#[error("dataset {dataset_key} attempt {attempt} failed while {state}: {source}")]
pub struct NormalizationFailed {
    pub dataset_key: i32,
    pub attempt: i32,
    /// The state the run was in when it failed.
    pub state: NormalizerState,
    #[source]
    pub source: Error,
}

impl NormalizationFailed {
    pub fn is_interrupted(&self) -> bool {
        matches!(self.source, Error::Interrupted)
            || matches!(&self.source, Error::BatchAborted { source, .. } if matches!(**source, Error::Interrupted))
    }
}

// ============================================================================
// Normalizer
// ============================================================================

pub struct Normalizer<S: GraphStore> {
    store: S,
    source: PathBuf,
    ctx: ImportContext,
    config: NormalizerConfig,
    interpreters: Interpreters,
    state: NormalizerState,
}

impl<S: GraphStore> std::fmt::Debug for Normalizer<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Normalizer")
            .field("source", &self.source)
            .field("ctx", &self.ctx)
            .field("config", &self.config)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl<S: GraphStore> Normalizer<S> {
    /// `source` is a dataset directory, a zip archive or a text tree file.
    pub fn new(store: S, source: impl Into<PathBuf>, ctx: ImportContext, config: NormalizerConfig) -> Self {
        Self {
            store,
            source: source.into(),
            ctx,
            config,
            interpreters: Interpreters::default(),
            state: NormalizerState::Parsing,
        }
    }

    pub fn with_name_parser(mut self, parser: Arc<dyn NameParser>) -> Self {
        self.interpreters.names = parser;
        self
    }

    pub fn with_reference_factory(mut self, references: ReferenceFactory) -> Self {
        self.interpreters.references = references;
        self
    }

    pub fn state(&self) -> NormalizerState {
        self.state
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.ctx.cancel.clone()
    }

    fn scratch_dir(&self) -> PathBuf {
        self.config
            .scratch_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
            .join(format!("clb-{}-{}", self.ctx.dataset_key, self.ctx.attempt))
    }

    /// Run the import to completion. The store is shut down on every path
    /// and handed back with the report on success.
    pub async fn run(mut self) -> std::result::Result<(S, NormalizationReport), NormalizationFailed> {
        let span = info_span!("normalize", dataset = self.ctx.dataset_key, attempt = self.ctx.attempt);
        async move {
            let scratch = self.scratch_dir();
            let outcome = self.execute(&scratch).await;
            let closed = self.store.shutdown().await;
            if scratch.exists() {
                if let Err(e) = fs::remove_dir_all(&scratch) {
                    warn!(error = %e, dir = %scratch.display(), "could not remove scratch dir");
                }
            }

            match outcome.and_then(|report| closed.map(|()| report)) {
                Ok(report) => {
                    self.state = NormalizerState::Done;
                    info!(
                        format = %report.format,
                        usages = report.insert.usages,
                        issues = report.issues.values().sum::<u64>(),
                        valid = report.validation.valid,
                        "normalization done"
                    );
                    Ok((self.store, report))
                }
                Err(source) => {
                    let state = self.state;
                    self.state = NormalizerState::Failed;
                    error!(%state, error = %source, "normalization failed");
                    Err(NormalizationFailed {
                        dataset_key: self.ctx.dataset_key,
                        attempt: self.ctx.attempt,
                        state,
                        source,
                    })
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn execute(&mut self, scratch: &Path) -> Result<NormalizationReport> {
        let started = Utc::now();
        let cancel = self.ctx.cancel.clone();
        let batch_size = self.config.batch_size;

        self.state = NormalizerState::Parsing;
        cancel.check()?;
        let dir = format::unpack(&self.source, scratch)?;
        let format = DataFormat::detect(&dir)?;
        info!(%format, dir = %dir.display(), "detected format");
        let main = inserter::open_inserter(format, &dir, self.interpreters.clone(), self.config.sample_lines)?;
        let metadata = main.metadata().unwrap_or_else(|e| {
            warn!(error = %e, "unreadable dataset metadata");
            None
        });
        let mut inserters: Vec<Box<dyn Inserter>> = Vec::new();
        let bib = format::bibtex_files(&dir)?;
        if !bib.is_empty() {
            inserters.push(Box::new(inserter::BibtexInserter::new(bib, self.interpreters.references.clone())));
        }
        inserters.push(main);

        self.state = NormalizerState::Inserting;
        let mut writer = GraphWriter::new(&self.store, batch_size, cancel.clone());
        for ins in &inserters {
            for (n, phase) in ins.phases()?.into_iter().enumerate() {
                for item in phase {
                    writer.write(item).await?;
                }
                writer.flush().await?;
                ins.check_failure()?;
                let synced = self.store.sync().await?;
                info!(
                    format = ?ins.format(),
                    phase = n + 1,
                    records = writer.stats.records,
                    indexed = synced.indexed_ids,
                    "phase inserted"
                );
            }
        }
        let skipped_rows = inserters.iter().map(|i| i.skipped_rows()).sum();
        let (insert, pending) = writer.into_parts();

        self.state = NormalizerState::PostProcessing;
        let post_process = relations::post_process(&self.store, pending, batch_size, &cancel).await?;
        self.store.sync().await?;

        self.state = NormalizerState::Validating;
        let validation = validation::validate(&self.store, &cancel).await?;
        let tx = self.store.begin_tx(TxMode::ReadOnly).await?;
        let issues = self.store.issue_counts(&tx).await?;
        let relationships = RelationshipCounts {
            parent_of: self.store.relationship_count(&tx, Some(RelType::ParentOf)).await?,
            synonym_of: self.store.relationship_count(&tx, Some(RelType::SynonymOf)).await?,
            has_basionym: self.store.relationship_count(&tx, Some(RelType::HasBasionym)).await?,
        };
        self.store.commit_tx(tx).await?;

        Ok(NormalizationReport {
            dataset_key: self.ctx.dataset_key,
            attempt: self.ctx.attempt,
            format,
            metadata,
            started,
            finished: Utc::now(),
            insert,
            post_process,
            skipped_rows,
            issues,
            relationships,
            validation,
        })
    }
}
