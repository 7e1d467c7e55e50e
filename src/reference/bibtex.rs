//! Minimal BibTeX reader.
//!
//! Understands `@type{key, field = {value}, field = "value", field = 123}`
//! entries with nested braces. `@comment`, `@preamble` and `@string` blocks
//! are skipped; string macros are not expanded.

/// One BibTeX entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BibEntry {
    /// Lowercased entry type, e.g. `article`.
    pub entry_type: String,
    pub key: String,
    /// Lowercased field names in file order.
    pub fields: Vec<(String, String)>,
    /// 1-based line the entry starts on.
    pub line: u64,
}

impl BibEntry {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(k, _)| k == field)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }
}

/// Parse every entry of a BibTeX document. Malformed entries are skipped.
pub fn parse(text: &str) -> Vec<BibEntry> {
    let chars: Vec<char> = text.chars().collect();
    let mut entries = Vec::new();
    let mut pos = 0;
    while let Some(at) = chars[pos..].iter().position(|c| *c == '@').map(|p| p + pos) {
        let line = chars[..at].iter().filter(|c| **c == '\n').count() as u64 + 1;
        match parse_entry(&chars, at + 1) {
            Some((mut entry, end)) => {
                entry.line = line;
                if !matches!(entry.entry_type.as_str(), "comment" | "preamble" | "string") {
                    entries.push(entry);
                }
                pos = end;
            }
            None => pos = at + 1,
        }
    }
    entries
}

fn skip_ws(chars: &[char], mut pos: usize) -> usize {
    while pos < chars.len() && chars[pos].is_whitespace() {
        pos += 1;
    }
    pos
}

/// Parse from just after `@`. Returns the entry and the position after it.
fn parse_entry(chars: &[char], mut pos: usize) -> Option<(BibEntry, usize)> {
    let start = pos;
    while pos < chars.len() && chars[pos].is_alphanumeric() {
        pos += 1;
    }
    let entry_type: String = chars[start..pos].iter().collect::<String>().to_lowercase();
    pos = skip_ws(chars, pos);
    let close = match chars.get(pos)? {
        '{' => '}',
        '(' => ')',
        _ => return None,
    };
    pos += 1;

    if matches!(entry_type.as_str(), "comment" | "preamble" | "string") {
        let (_, end) = read_braced(chars, pos - 1)?;
        return Some((BibEntry { entry_type, ..Default::default() }, end));
    }

    let key_start = pos;
    while pos < chars.len() && chars[pos] != ',' && chars[pos] != close {
        pos += 1;
    }
    let key = chars[key_start..pos].iter().collect::<String>().trim().to_string();
    let mut entry = BibEntry { entry_type, key, ..Default::default() };

    loop {
        pos = skip_ws(chars, pos);
        match chars.get(pos)? {
            c if *c == close => return Some((entry, pos + 1)),
            ',' => {
                pos += 1;
                continue;
            }
            _ => {}
        }
        let name_start = pos;
        while pos < chars.len() && (chars[pos].is_alphanumeric() || matches!(chars[pos], '_' | '-' | ':')) {
            pos += 1;
        }
        if pos == name_start {
            return None;
        }
        let name = chars[name_start..pos].iter().collect::<String>().to_lowercase();
        pos = skip_ws(chars, pos);
        if chars.get(pos)? != &'=' {
            return None;
        }
        pos = skip_ws(chars, pos + 1);
        let (value, end) = match chars.get(pos)? {
            '{' => read_braced(chars, pos)?,
            '"' => read_quoted(chars, pos)?,
            _ => {
                let s = pos;
                while pos < chars.len() && chars[pos] != ',' && chars[pos] != close {
                    pos += 1;
                }
                (chars[s..pos].iter().collect::<String>(), pos)
            }
        };
        entry.fields.push((name, clean(&value)));
        pos = end;
    }
}

/// Read a `{...}` or `(...)` group starting at `pos`, returning its inner text.
fn read_braced(chars: &[char], pos: usize) -> Option<(String, usize)> {
    let close = if *chars.get(pos)? == '(' { ')' } else { '}' };
    let mut depth = 0usize;
    for (i, c) in chars.iter().enumerate().skip(pos + 1) {
        match *c {
            '{' => depth += 1,
            '}' if depth > 0 => depth -= 1,
            c if c == close && depth == 0 => return Some((chars[pos + 1..i].iter().collect(), i + 1)),
            _ => {}
        }
    }
    None
}

fn read_quoted(chars: &[char], pos: usize) -> Option<(String, usize)> {
    let mut depth = 0usize;
    for (i, c) in chars.iter().enumerate().skip(pos + 1) {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            '"' if depth == 0 => return Some((chars[pos + 1..i].iter().collect(), i + 1)),
            _ => {}
        }
    }
    None
}

/// Drop grouping braces and collapse whitespace.
fn clean(value: &str) -> String {
    value
        .replace(['{', '}'], "")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
