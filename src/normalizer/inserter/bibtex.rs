//! BibTeX files shipped next to the data.

use std::path::PathBuf;

use super::*;
use crate::reference::bibtex;

const ROW_TYPE: &str = "BibTeX";

/// Reads references from `.bib` files. Runs before the format's own
/// inserter so rows can cite entry keys.
#[derive(Debug)]
pub struct BibtexInserter {
    files: Vec<PathBuf>,
    references: ReferenceFactory,
}

impl BibtexInserter {
    pub fn new(files: Vec<PathBuf>, references: ReferenceFactory) -> Self {
        Self { files, references }
    }

    fn interpret(&self, file: &str, entry: &bibtex::BibEntry) -> Interpreted {
        let mut v = VerbatimRecord::new(file, entry.line, RowType::Other(ROW_TYPE.into()));
        v.put(Term::Unknown("type".into()), entry.entry_type.as_str());
        v.put(Term::Unknown("key".into()), entry.key.as_str());
        for (field, value) in &entry.fields {
            v.put(Term::Unknown(field.clone()), value.as_str());
        }
        if entry.key.trim().is_empty() {
            v.add_issue(Issue::IdMissing);
        }
        let reference = self.references.from_bibtex(entry);
        Interpreted::Reference { verbatim: Some(v), reference }
    }
}

impl Inserter for BibtexInserter {
    fn format(&self) -> Option<DataFormat> {
        None
    }

    fn phases(&self) -> Result<Vec<Phase<'_>>> {
        let mut items = Vec::new();
        for path in &self.files {
            let text = std::fs::read_to_string(path)?;
            let file = path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default();
            let entries = bibtex::parse(&text);
            debug!(file = %file, entries = entries.len(), "read bibtex");
            items.extend(entries.iter().map(|e| self.interpret(&file, e)));
        }
        let references: Phase<'_> = Box::new(items.into_iter());
        Ok(vec![references])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_entries_become_references() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("refs.bib");
        std::fs::write(
            &path,
            "@article{ross79,\n  author = {Ross, J.H.},\n  title = {A conspectus of African Acacia},\n  journal = {Mem. Bot. Surv. S. Afr.},\n  year = 1979\n}\n",
        )
        .unwrap();

        let ins = BibtexInserter::new(vec![path], ReferenceFactory::default());
        let items: Vec<Interpreted> = ins.phases().unwrap().into_iter().flatten().collect();
        assert_eq!(items.len(), 1);
        match &items[0] {
            Interpreted::Reference { verbatim: Some(v), reference } => {
                assert_eq!(reference.id.as_deref(), Some("ross79"));
                assert_eq!(reference.year, Some(1979));
                assert_eq!(v.get(Term::Unknown("journal".into())), Some("Mem. Bot. Surv. S. Afr."));
                assert_eq!(v.line, 1);
                assert!(v.issues.is_empty());
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_missing_file_fails() {
        let ins = BibtexInserter::new(vec![PathBuf::from("/nonexistent/refs.bib")], ReferenceFactory::default());
        assert!(matches!(ins.phases(), Err(Error::Io(_))));
    }
}
