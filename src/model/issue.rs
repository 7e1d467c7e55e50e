//! Interpretation issues and the outcome type that carries them.
//!
//! Interpreters never fail on bad data. They return an [`Outcome`]: the best
//! effort value plus every [`Issue`] raised while producing it.

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// A nomenclatural or structural problem attached to a verbatim record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Issue {
    // Row-level interpretation
    IdNotUnique,
    IdMissing,
    ScientificNameMissing,
    RankInvalid,
    NomCodeInvalid,
    TaxonomicStatusInvalid,
    UnparsableName,
    PartiallyParsableName,
    UnparsableAuthorship,
    InconsistentAuthorship,
    UnparsableYear,
    UnparsableReference,
    UnparsableReferenceType,
    ReferenceIdInvalid,
    NameIdInvalid,
    NameRelationInvalid,

    // Structural references
    ParentIdInvalid,
    AcceptedIdInvalid,
    BasionymIdInvalid,
    AcceptedNameMissing,
    ChainedSynonym,
    SynonymParent,
    AmbiguousBasionym,

    // Graph integrity
    ParentCycle,
}

impl Issue {
    pub const ALL: &'static [Issue] = &[
        Issue::IdNotUnique,
        Issue::IdMissing,
        Issue::ScientificNameMissing,
        Issue::RankInvalid,
        Issue::NomCodeInvalid,
        Issue::TaxonomicStatusInvalid,
        Issue::UnparsableName,
        Issue::PartiallyParsableName,
        Issue::UnparsableAuthorship,
        Issue::InconsistentAuthorship,
        Issue::UnparsableYear,
        Issue::UnparsableReference,
        Issue::UnparsableReferenceType,
        Issue::ReferenceIdInvalid,
        Issue::NameIdInvalid,
        Issue::NameRelationInvalid,
        Issue::ParentIdInvalid,
        Issue::AcceptedIdInvalid,
        Issue::BasionymIdInvalid,
        Issue::AcceptedNameMissing,
        Issue::ChainedSynonym,
        Issue::SynonymParent,
        Issue::AmbiguousBasionym,
        Issue::ParentCycle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Issue::IdNotUnique => "ID_NOT_UNIQUE",
            Issue::IdMissing => "ID_MISSING",
            Issue::ScientificNameMissing => "SCIENTIFIC_NAME_MISSING",
            Issue::RankInvalid => "RANK_INVALID",
            Issue::NomCodeInvalid => "NOM_CODE_INVALID",
            Issue::TaxonomicStatusInvalid => "TAXONOMIC_STATUS_INVALID",
            Issue::UnparsableName => "UNPARSABLE_NAME",
            Issue::PartiallyParsableName => "PARTIALLY_PARSABLE_NAME",
            Issue::UnparsableAuthorship => "UNPARSABLE_AUTHORSHIP",
            Issue::InconsistentAuthorship => "INCONSISTENT_AUTHORSHIP",
            Issue::UnparsableYear => "UNPARSABLE_YEAR",
            Issue::UnparsableReference => "UNPARSABLE_REFERENCE",
            Issue::UnparsableReferenceType => "UNPARSABLE_REFERENCE_TYPE",
            Issue::ReferenceIdInvalid => "REFERENCE_ID_INVALID",
            Issue::NameIdInvalid => "NAME_ID_INVALID",
            Issue::NameRelationInvalid => "NAME_RELATION_INVALID",
            Issue::ParentIdInvalid => "PARENT_ID_INVALID",
            Issue::AcceptedIdInvalid => "ACCEPTED_ID_INVALID",
            Issue::BasionymIdInvalid => "BASIONYM_ID_INVALID",
            Issue::AcceptedNameMissing => "ACCEPTED_NAME_MISSING",
            Issue::ChainedSynonym => "CHAINED_SYNONYM",
            Issue::SynonymParent => "SYNONYM_PARENT",
            Issue::AmbiguousBasionym => "AMBIGUOUS_BASIONYM",
            Issue::ParentCycle => "PARENT_CYCLE",
        }
    }
}

impl fmt::Display for Issue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// Outcome
// ============================================================================

/// A value produced by interpretation together with the issues it raised.
///
/// An outcome without issues is clean; one with issues was recovered with
/// best-effort defaults. There is no failure variant on purpose: the caller
/// attaches the issues to the verbatim record and carries on.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome<T> {
    pub value: T,
    pub issues: SmallVec<[Issue; 2]>,
}

impl<T> Outcome<T> {
    pub fn clean(value: T) -> Self {
        Self { value, issues: SmallVec::new() }
    }

    pub fn with_issue(value: T, issue: Issue) -> Self {
        let mut issues = SmallVec::new();
        issues.push(issue);
        Self { value, issues }
    }

    pub fn is_clean(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn add_issue(&mut self, issue: Issue) {
        if !self.issues.contains(&issue) {
            self.issues.push(issue);
        }
    }

    pub fn has_issue(&self, issue: Issue) -> bool {
        self.issues.contains(&issue)
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome { value: f(self.value), issues: self.issues }
    }

    /// Move this outcome's issues into `sink` and return the value.
    pub fn drain_into(self, sink: &mut impl Extend<Issue>) -> T {
        sink.extend(self.issues);
        self.value
    }
}
