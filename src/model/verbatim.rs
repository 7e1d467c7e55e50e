//! Verbatim source records kept for provenance and issue attribution.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::Issue;
use crate::term::{RowType, Term};

/// Store-assigned key of a verbatim record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VerbatimKey(pub u64);

impl std::fmt::Display for VerbatimKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "v{}", self.0)
    }
}

/// One raw source row: term → value pairs in column order, plus the issues
/// raised while interpreting it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerbatimRecord {
    pub key: Option<VerbatimKey>,
    pub file: String,
    pub line: u64,
    pub row_type: Option<RowType>,
    pub terms: Vec<(Term, String)>,
    pub issues: BTreeSet<Issue>,
}

impl VerbatimRecord {
    pub fn new(file: impl Into<String>, line: u64, row_type: RowType) -> Self {
        Self {
            file: file.into(),
            line,
            row_type: Some(row_type),
            ..Default::default()
        }
    }

    /// Raw value, including blanks.
    pub fn get_raw(&self, term: &Term) -> Option<&str> {
        self.terms.iter().find(|(t, _)| t == term).map(|(_, v)| v.as_str())
    }

    /// Trimmed, non-empty value.
    pub fn get(&self, term: impl Into<Term>) -> Option<&str> {
        let term = term.into();
        self.get_raw(&term).map(str::trim).filter(|v| !v.is_empty())
    }

    /// First non-empty value of several alternative terms.
    pub fn get_first(&self, terms: &[Term]) -> Option<&str> {
        terms.iter().find_map(|t| self.get_raw(t).map(str::trim).filter(|v| !v.is_empty()))
    }

    pub fn has(&self, term: impl Into<Term>) -> bool {
        self.get(term).is_some()
    }

    /// Insert or replace a value.
    pub fn put(&mut self, term: impl Into<Term>, value: impl Into<String>) {
        let term = term.into();
        let value = value.into();
        match self.terms.iter_mut().find(|(t, _)| *t == term) {
            Some(slot) => slot.1 = value,
            None => self.terms.push((term, value)),
        }
    }

    pub fn add_issue(&mut self, issue: Issue) {
        self.issues.insert(issue);
    }

    pub fn add_issues(&mut self, issues: impl IntoIterator<Item = Issue>) {
        self.issues.extend(issues);
    }

    pub fn has_issue(&self, issue: Issue) -> bool {
        self.issues.contains(&issue)
    }

    pub fn len(&self) -> usize {
        self.terms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.terms.is_empty()
    }

    /// `file:line` for log messages.
    pub fn location(&self) -> String {
        format!("{}:{}", self.file, self.line)
    }
}
