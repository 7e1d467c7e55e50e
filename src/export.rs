//! Text tree export. Prints a normalized graph as an indented text tree.
//!
//! The output is the same format the text tree inserter reads, so a
//! normalized dataset can be re-imported:
//!
//! ```text
//! Plantae [kingdom]
//!   Asteraceae [family]
//!     Artemisia L. [genus]
//!       *Absinthium Mill. [genus]
//! ```
//!
//! Two spaces per level, `*` marks a synonym, `$` the synonym that is the
//! basionym of its accepted name. Unranked names carry no rank suffix.

use std::io::Write;

use crate::model::Rank;
use crate::storage::GraphStore;
use crate::traversal::{StartEndHandler, Traversal, TreeWalker, WalkNode};
use crate::tx::{CancelFlag, TxMode};
use crate::Result;

/// Indentation per depth level.
pub const INDENT: &str = "  ";

/// Writes one line per started node.
#[derive(Debug)]
pub struct TextTreePrinter<W: Write + Send> {
    writer: W,
    lines: u64,
}

impl<W: Write + Send> TextTreePrinter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer, lines: 0 }
    }

    pub fn lines(&self) -> u64 {
        self.lines
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

/// One text tree line without indentation.
pub fn format_line(node: &WalkNode) -> String {
    let name = node.usage.name();
    let mut line = String::new();
    if node.is_basionym {
        line.push('$');
    } else if node.is_synonym() {
        line.push('*');
    }
    line.push_str(&name.label());
    if name.rank != Rank::Unranked {
        line.push_str(&format!(" [{}]", name.rank));
    }
    line
}

impl<W: Write + Send> StartEndHandler for TextTreePrinter<W> {
    fn start(&mut self, node: &WalkNode) -> Result<()> {
        writeln!(self.writer, "{}{}", INDENT.repeat(node.depth), format_line(node))?;
        self.lines += 1;
        Ok(())
    }

    fn end(&mut self, _node: &WalkNode) -> Result<()> {
        Ok(())
    }
}

/// Print the whole sorted tree to `writer`. Returns the number of lines written.
pub async fn export_text_tree<S: GraphStore, W: Write + Send>(
    store: &S,
    writer: W,
    cancel: &CancelFlag,
) -> Result<u64> {
    let tx = store.begin_tx(TxMode::ReadOnly).await?;
    let mut printer = TextTreePrinter::new(writer);
    let walked = TreeWalker::new(Traversal::Sorted)
        .cancel_flag(cancel.clone())
        .walk(store, &tx, &mut [&mut printer])
        .await;
    store.commit_tx(tx).await?;
    walked?;
    printer.writer.flush()?;
    Ok(printer.lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Authorship, Name, RelType, Usage};
    use crate::storage::{MemoryStore, NeoUsage};
    use pretty_assertions::assert_eq;

    #[tokio::test]
    async fn test_export_marks_synonyms_and_basionyms() {
        let db = MemoryStore::new();
        let mut tx = db.begin_tx(TxMode::ReadWrite).await.unwrap();
        let plantae = db
            .create_name_and_usage(&mut tx, NeoUsage::new(Usage::taxon("1", Name::new("Plantae", Rank::Kingdom))))
            .await
            .unwrap();
        let mut picea = Name::new("Picea abies", Rank::Species);
        picea.basionym_authorship = Authorship::new(["L."], None);
        picea.combination_authorship = Authorship::new(["H.Karst."], None);
        picea.rebuild_authorship();
        let acc = db.create_name_and_usage(&mut tx, NeoUsage::new(Usage::taxon("2", picea))).await.unwrap();
        let mut pinus = Name::new("Pinus abies", Rank::Species);
        pinus.authorship = Some("L.".into());
        let bas = db.create_name_and_usage(&mut tx, NeoUsage::new(Usage::synonym("3", pinus))).await.unwrap();
        let syn = db
            .create_name_and_usage(&mut tx, NeoUsage::new(Usage::synonym("4", Name::new("Abies excelsa", Rank::Unranked))))
            .await
            .unwrap();
        db.assign_parent(&mut tx, plantae, acc).await.unwrap();
        db.create_synonym_rel(&mut tx, bas, acc).await.unwrap();
        db.create_synonym_rel(&mut tx, syn, acc).await.unwrap();
        let acc_name = db.usage(&tx, acc).await.unwrap().unwrap().name_node;
        let bas_name = db.usage(&tx, bas).await.unwrap().unwrap().name_node;
        db.create_relationship(&mut tx, acc_name, bas_name, RelType::HasBasionym).await.unwrap();
        db.commit_tx(tx).await.unwrap();

        let mut out = Vec::new();
        let lines = export_text_tree(&db, &mut out, &CancelFlag::new()).await.unwrap();
        assert_eq!(lines, 4);
        assert_eq!(
            String::from_utf8(out).unwrap(),
            "Plantae [kingdom]\n  Picea abies (L.) H.Karst. [species]\n    $Pinus abies L. [species]\n    *Abies excelsa\n"
        );
    }
}
