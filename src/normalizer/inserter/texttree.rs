//! Indented text trees.
//!
//! ```text
//! Plantae [kingdom]
//!   Pinaceae [family]
//!     Abies alba Mill. [species]
//!       $Pinus picea L. [species]
//!       *Abies pectinata DC. [species]
//! ```
//!
//! Two spaces per level. `*` marks a synonym of the enclosing taxon, `$` a
//! synonym that is also its basionym. The line number is the usage id.

use std::path::PathBuf;
use std::sync::LazyLock;

use hashbrown::HashMap;
use regex::Regex;

use super::*;

static RANK_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s*\[([^\]]*)\]\s*$").expect("valid regex"));

const ROW_TYPE: &str = "TextTree";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Marker {
    Accepted,
    Synonym,
    Basionym,
}

/// One non-blank line.
#[derive(Debug)]
struct TreeLine<'a> {
    line: u64,
    depth: usize,
    marker: Marker,
    name: &'a str,
    rank: Option<&'a str>,
}

fn parse_line(line: u64, raw: &str) -> Option<TreeLine<'_>> {
    let body = raw.trim_start_matches([' ', '\t']);
    if body.trim().is_empty() {
        return None;
    }
    let indent: usize = raw[..raw.len() - body.len()].chars().map(|c| if c == '\t' { 2 } else { 1 }).sum();
    let (marker, body) = match body.chars().next() {
        Some('*') => (Marker::Synonym, &body[1..]),
        Some('$') => (Marker::Basionym, &body[1..]),
        _ => (Marker::Accepted, body),
    };
    let (name, rank) = match RANK_SUFFIX.captures(body) {
        Some(c) => (
            c.get(1).map_or("", |m| m.as_str()),
            c.get(2).map(|m| m.as_str().trim()).filter(|r| !r.is_empty()),
        ),
        None => (body.trim(), None),
    };
    Some(TreeLine { line, depth: indent / 2, marker, name: name.trim(), rank })
}

/// Synonyms only attach to a taxon of the same rank; unranked matches any.
fn ranks_match(a: Rank, b: Rank) -> bool {
    a == b || a == Rank::Unranked || b == Rank::Unranked
}

#[derive(Debug)]
pub struct TextTreeInserter {
    file: PathBuf,
    interpreters: Interpreters,
}

impl TextTreeInserter {
    pub fn new(file: PathBuf, interpreters: Interpreters) -> Self {
        Self { file, interpreters }
    }

    fn file_name(&self) -> String {
        self.file.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default()
    }

    /// Interpret the whole tree. Links can point backwards only, so the
    /// tree is built in memory before anything is handed out.
    fn interpret(&self, text: &str) -> Vec<Interpreted> {
        let file = self.file_name();
        let mut items: Vec<Interpreted> = Vec::new();
        // accepted usages by id → position in `items`
        let mut positions: HashMap<String, usize> = HashMap::new();
        // open accepted ancestors: depth, id, rank
        let mut stack: Vec<(usize, String, Rank)> = Vec::new();

        for (idx, raw) in text.lines().enumerate() {
            let Some(tl) = parse_line(idx as u64 + 1, raw) else {
                continue;
            };
            let mut v = VerbatimRecord::new(file.clone(), tl.line, RowType::Other(ROW_TYPE.into()));
            v.put(Term::Unknown("text".into()), raw.trim());

            let out = interpret_name(
                self.interpreters.names.as_ref(),
                &NameFields { scientific_name: Some(tl.name).filter(|n| !n.is_empty()), rank: tl.rank, ..Default::default() },
            );
            let Some(name) = out.drain_into(&mut v.issues) else {
                items.push(Interpreted::Verbatim(v));
                continue;
            };

            while stack.last().is_some_and(|(d, _, _)| *d >= tl.depth) {
                stack.pop();
            }
            let id = tl.line.to_string();
            let rank = name.rank;
            let usage = match tl.marker {
                Marker::Accepted => {
                    let parent_id = stack.last().map(|(_, id, _)| id.clone());
                    stack.push((tl.depth, id.clone(), rank));
                    positions.insert(id.clone(), items.len());
                    NeoUsage::new(Usage::taxon(id, name)).with_refs(DeferredRefs { parent_id, ..Default::default() })
                }
                Marker::Synonym | Marker::Basionym => {
                    let accepted = stack
                        .last()
                        .filter(|(d, _, r)| d + 1 == tl.depth && ranks_match(*r, rank))
                        .map(|(_, id, _)| id.clone());
                    if tl.marker == Marker::Basionym {
                        if let Some(Interpreted::Usage { usage, .. }) =
                            accepted.as_ref().and_then(|a| positions.get(a)).and_then(|p| items.get_mut(*p))
                        {
                            usage.refs.basionym_id = Some(id.clone());
                        }
                    }
                    let accepted_ids = accepted.into_iter().collect();
                    NeoUsage::new(Usage::synonym(id, name)).with_refs(DeferredRefs { accepted_ids, ..Default::default() })
                }
            };
            items.push(Interpreted::Usage { verbatim: v, usage });
        }
        items
    }
}

impl Inserter for TextTreeInserter {
    fn format(&self) -> Option<DataFormat> {
        Some(DataFormat::TextTree)
    }

    fn phases(&self) -> Result<Vec<Phase<'_>>> {
        let text = std::fs::read_to_string(&self.file)?;
        let tree: Phase<'_> = Box::new(self.interpret(&text).into_iter());
        Ok(vec![tree])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn interpret(text: &str) -> Vec<(VerbatimRecord, NeoUsage)> {
        let ins = TextTreeInserter::new(PathBuf::from("tree.txtree"), Interpreters::default());
        ins.interpret(text)
            .into_iter()
            .map(|i| match i {
                Interpreted::Usage { verbatim, usage } => (verbatim, usage),
                other => panic!("unexpected {other:?}"),
            })
            .collect()
    }

    #[test]
    fn test_parse_line() {
        let tl = parse_line(3, "    *Artemisia rupestre [species]").unwrap();
        assert_eq!((tl.depth, tl.marker, tl.name, tl.rank), (2, Marker::Synonym, "Artemisia rupestre", Some("species")));
        let tl = parse_line(1, "Plantae").unwrap();
        assert_eq!((tl.depth, tl.marker, tl.rank), (0, Marker::Accepted, None));
        assert!(parse_line(2, "   ").is_none());
    }

    #[test]
    fn test_parents_follow_indentation() {
        let u = interpret("Plantae [kingdom]\n  Asteraceae [family]\n    *Artemisia rupestre [species]\n  Pinaceae [family]\n");
        assert_eq!(u.len(), 4);
        assert_eq!(u[0].1.refs.parent_id, None);
        assert_eq!(u[1].1.refs.parent_id.as_deref(), Some("1"));
        assert_eq!(u[1].1.name().rank, Rank::Family);
        // a species synonym cannot belong to a family
        assert!(u[2].1.is_synonym());
        assert!(u[2].1.refs.accepted_ids.is_empty());
        assert_eq!(u[3].1.usage.id.as_deref(), Some("4"));
        assert_eq!(u[3].1.refs.parent_id.as_deref(), Some("1"));
    }

    #[test]
    fn test_synonyms_and_basionyms() {
        let u = interpret(
            "Abies alba Mill. [species]\n\n  $Pinus picea L. [species]\n  *Abies pectinata DC. [species]\nAbies [foo]\n",
        );
        assert_eq!(u[0].1.refs.basionym_id.as_deref(), Some("3"));
        assert_eq!(u[1].1.refs.accepted_ids, vec!["1".to_string()]);
        assert_eq!(u[2].1.usage.id.as_deref(), Some("4"));
        assert_eq!(u[2].1.refs.accepted_ids, vec!["1".to_string()]);
        assert!(u[3].0.has_issue(Issue::RankInvalid));
        assert_eq!(u[3].1.refs.parent_id, None);
    }
}
