//! # Name/Usage Graph Model
//!
//! Plain data that crosses every boundary: readers ↔ inserters ↔ store ↔
//! walker ↔ report. No I/O, no state, no async.

pub mod issue;
pub mod name;
pub mod node;
pub mod path;
pub mod rank;
pub mod reference;
pub mod relationship;
pub mod usage;
pub mod verbatim;

pub use issue::{Issue, Outcome};
pub use name::{Authorship, Name, NameType, NomCode};
pub use node::{NodeId, NodeKind};
pub use path::Path;
pub use rank::Rank;
pub use reference::{CslData, CslDate, CslName, CslType, Reference};
pub use relationship::{Direction, RelId, RelType, Relationship};
pub use usage::{Classification, Origin, TaxonomicStatus, Usage};
pub use verbatim::{VerbatimKey, VerbatimRecord};
