//! Delimiter and quote sniffing for delimited text files.
//!
//! Every candidate dialect parses the same sample; the winner is the one whose
//! modal column count (at least two) covers the largest share of lines. Ties
//! go to candidate order.
//!
//! | Order | Delimiter | Quotes tried |
//! |-------|-----------|--------------|
//! | 1 | `,` | `"` then `'` |
//! | 2 | `\t` | `"` then `'` |
//! | 3 | `;` | `"` then `'` |
//! | 4 | `\|` | `"` then `'` |

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use hashbrown::HashMap;
use serde::{Deserialize, Serialize};

use crate::Result;

pub const DELIMITERS: [u8; 4] = [b',', b'\t', b';', b'|'];
pub const QUOTES: [u8; 2] = [b'"', b'\''];

/// How fields of a delimited file are separated and quoted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Dialect {
    pub delimiter: u8,
    /// `None` disables quoting.
    pub quote: Option<u8>,
}

impl Default for Dialect {
    fn default() -> Self {
        Self::CSV
    }
}

/// How well a dialect fits a sample.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DialectScore {
    pub columns: usize,
    /// Share of sampled lines with exactly `columns` fields.
    pub consistency: f64,
}

impl Dialect {
    pub const CSV: Dialect = Dialect { delimiter: b',', quote: Some(b'"') };
    pub const TSV: Dialect = Dialect { delimiter: b'\t', quote: None };

    pub fn new(delimiter: u8, quote: Option<u8>) -> Self {
        Self { delimiter, quote }
    }

    /// A header-less, flexible csv reader builder for this dialect.
    pub fn reader_builder(&self) -> csv::ReaderBuilder {
        let mut builder = csv::ReaderBuilder::new();
        builder
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .quoting(self.quote.is_some());
        if let Some(q) = self.quote {
            builder.quote(q);
        }
        builder
    }

    /// Score this dialect against sample lines. `None` when it does not split
    /// the sample into at least two columns.
    pub fn score(&self, sample: &[String]) -> Option<DialectScore> {
        let text = sample
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join("\n");
        if text.is_empty() {
            return None;
        }

        let mut reader = self.reader_builder().from_reader(text.as_bytes());
        let mut widths: HashMap<usize, usize> = HashMap::new();
        let mut total = 0usize;
        for record in reader.byte_records() {
            let Ok(record) = record else { continue };
            *widths.entry(record.len()).or_default() += 1;
            total += 1;
        }

        let (columns, count) = widths
            .into_iter()
            .max_by(|a, b| a.1.cmp(&b.1).then(a.0.cmp(&b.0)))?;
        (columns >= 2).then(|| DialectScore { columns, consistency: count as f64 / total as f64 })
    }

    /// Pick the best candidate for the sample, falling back to CSV.
    pub fn sniff(sample: &[String]) -> Dialect {
        let mut best: Option<(Dialect, DialectScore)> = None;
        for delimiter in DELIMITERS {
            for quote in QUOTES {
                let candidate = Dialect::new(delimiter, Some(quote));
                let Some(score) = candidate.score(sample) else { continue };
                let better = best.as_ref().is_none_or(|(_, b)| score.consistency > b.consistency);
                if better {
                    best = Some((candidate, score));
                }
            }
        }
        best.map(|(d, _)| d).unwrap_or_default()
    }

    /// Sniff the first `lines` lines of a file. Undecodable bytes are replaced,
    /// not rejected.
    pub fn sniff_file(path: &Path, lines: usize) -> Result<Dialect> {
        let mut reader = BufReader::new(File::open(path)?);
        let mut sample = Vec::with_capacity(lines);
        let mut buf = Vec::new();
        while sample.len() < lines {
            buf.clear();
            if reader.read_until(b'\n', &mut buf)? == 0 {
                break;
            }
            let line = String::from_utf8_lossy(&buf);
            sample.push(line.trim_end_matches(['\r', '\n']).to_string());
        }
        Ok(Dialect::sniff(&sample))
    }
}
