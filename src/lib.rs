//! # clb-normalizer: Checklist Import Normalization
//!
//! Turns a raw biodiversity checklist archive (Darwin Core Archive, ACEF,
//! ColDP, text tree, BibTeX) into a validated name/usage graph plus an issue
//! report, ready for relational persistence.
//!
//! ## Design Principles
//!
//! 1. **Trait-first**: `GraphStore` is the contract between the pipeline and storage
//! 2. **Clean DTOs**: `Name`, `Usage`, `Reference`, `VerbatimRecord` cross all boundaries
//! 3. **Issues, not exceptions**: interpreters return `Outcome<T>`; only I/O,
//!    corrupt archives and cancellation fail a run
//! 4. **Bounded memory**: records stream from disk, batch scans commit every N nodes
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use clb_normalizer::{ImportContext, MemoryStore, Normalizer, NormalizerConfig};
//!
//! # async fn example() -> Result<(), clb_normalizer::NormalizationFailed> {
//! let store = MemoryStore::new();
//! let ctx = ImportContext::new(1010, 1);
//! let normalizer = Normalizer::new(store, "/data/dataset-1010", ctx, NormalizerConfig::default());
//! let (store, report) = normalizer.run().await?;
//!
//! for (issue, count) in &report.issues {
//!     println!("{issue}: {count}");
//! }
//! # let _ = store;
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! | Stage | Module | Output |
//! |-------|--------|--------|
//! | Read | `reader` | term-keyed records |
//! | Interpret | `normalizer::inserter`, `parser`, `reference` | names, usages, references, issues |
//! | Store | `storage` | name/usage graph |
//! | Post-process | `normalizer::relations`, `basionym`, `traversal` | resolved, acyclic graph |
//! | Validate | `normalizer::validation` | `NormalizationReport` |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod term;
pub mod reader;
pub mod parser;
pub mod reference;
pub mod basionym;
pub mod storage;
pub mod tx;
pub mod index;
pub mod traversal;
pub mod normalizer;
pub mod export;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{
    Authorship, Classification, Direction, Issue, Name, NameType, NodeId, NomCode, Origin,
    Outcome, Path, Rank, Reference, RelId, RelType, Relationship, TaxonomicStatus, Usage,
    VerbatimKey, VerbatimRecord,
};

// ============================================================================
// Re-exports: Storage and transactions
// ============================================================================

pub use storage::{GraphStore, MemoryStore, NeoName, NeoUsage, NodeFilter, StoreConfig};
pub use tx::{CancelFlag, Transaction, TxId, TxMode};

// ============================================================================
// Re-exports: Pipeline
// ============================================================================

pub use basionym::{BasionymGroup, BasionymGrouper};
pub use normalizer::{
    DataFormat, ImportContext, NormalizationFailed, NormalizationReport, Normalizer,
    NormalizerConfig, NormalizerState,
};
pub use parser::{NameParser, SimpleNameParser};
pub use reference::{CitationParser, HeuristicCitationParser, ReferenceFactory};
pub use traversal::{StartEndHandler, Traversal, TreeWalker};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XML error: {0}")]
    Xml(#[from] quick_xml::DeError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Zip archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Storage error: {0}")]
    StorageError(String),

    #[error("Transaction error: {0}")]
    TxError(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Unsupported archive format: {0}")]
    UnsupportedFormat(String),

    #[error("Corrupt archive: {0}")]
    CorruptArchive(String),

    #[error("Interrupted")]
    Interrupted,

    #[error("Batch scan aborted after {processed} nodes: {source}")]
    BatchAborted {
        processed: u64,
        #[source]
        source: Box<Error>,
    },

    #[error("Handler error: {0}")]
    Handler(String),
}

pub type Result<T> = std::result::Result<T, Error>;
