//! Darwin Core Archive rows.

use std::path::{Path, PathBuf};

use super::*;
use crate::normalizer::metadata::read_metadata;
use crate::term::{DcTerm, DwcRowType, DwcTerm, Vocabulary};

const CLASSIFICATION: [(Rank, DwcTerm); 9] = [
    (Rank::Kingdom, DwcTerm::Kingdom),
    (Rank::Phylum, DwcTerm::Phylum),
    (Rank::Class, DwcTerm::Class),
    (Rank::Order, DwcTerm::Order),
    (Rank::Superfamily, DwcTerm::Superfamily),
    (Rank::Family, DwcTerm::Family),
    (Rank::Subfamily, DwcTerm::Subfamily),
    (Rank::Tribe, DwcTerm::Tribe),
    (Rank::Genus, DwcTerm::Genus),
];

#[derive(Debug)]
pub struct DwcaInserter {
    dir: PathBuf,
    reader: TermReader,
    interpreters: Interpreters,
}

impl DwcaInserter {
    pub fn open(dir: &Path, interpreters: Interpreters, sample_lines: usize) -> Result<Self> {
        Ok(Self {
            dir: dir.to_path_buf(),
            reader: TermReader::open_with(dir, Vocabulary::Dwc, sample_lines)?,
            interpreters,
        })
    }

    fn interpret_taxon(&self, mut v: VerbatimRecord) -> Vec<Interpreted> {
        let id = owned(&v, DwcTerm::TaxonID);
        if id.is_none() {
            v.add_issue(Issue::IdMissing);
        }
        let out = interpret_name(
            self.interpreters.names.as_ref(),
            &NameFields {
                scientific_name: v.get(DwcTerm::ScientificName),
                authorship: v.get(DwcTerm::ScientificNameAuthorship),
                rank: v.get_first(&[DwcTerm::TaxonRank.into(), DwcTerm::VerbatimTaxonRank.into()]),
                code: v.get(DwcTerm::NomenclaturalCode),
                genus: v.get(DwcTerm::GenericName),
                specific_epithet: v.get(DwcTerm::SpecificEpithet),
                infraspecific_epithet: v.get(DwcTerm::InfraspecificEpithet),
                ..Default::default()
            },
        );
        let Some(mut name) = out.drain_into(&mut v.issues) else {
            return vec![Interpreted::Verbatim(v)];
        };

        // a row pointing at another accepted usage is a synonym, whatever its status says
        let accepted_ids: Vec<String> = split_ids(v.get(DwcTerm::AcceptedNameUsageID))
            .into_iter()
            .filter(|a| Some(a) != id.as_ref())
            .collect();
        let mut status = status(&mut v, DwcTerm::TaxonomicStatus, TaxonomicStatus::Accepted);
        if !accepted_ids.is_empty() && !status.is_synonym() {
            status = TaxonomicStatus::Synonym;
        }
        let parent_id = owned(&v, DwcTerm::ParentNameUsageID).filter(|p| Some(p) != id.as_ref());
        let refs = if status.is_synonym() {
            let accepted_ids = if accepted_ids.is_empty() { parent_id.into_iter().collect() } else { accepted_ids };
            DeferredRefs { accepted_ids, ..Default::default() }
        } else {
            DeferredRefs { parent_id, ..Default::default() }
        };
        let refs = DeferredRefs {
            basionym_id: owned(&v, DwcTerm::OriginalNameUsageID).filter(|b| Some(b) != id.as_ref()),
            ..refs
        };

        let mut items = Vec::new();
        name.nom_status = owned(&v, DwcTerm::NomenclaturalStatus);
        name.published_in_year = year(&mut v, DwcTerm::NamePublishedInYear);
        let published_in = v.get(DwcTerm::NamePublishedIn);
        name.published_in_id = owned(&v, DwcTerm::NamePublishedInID).or(published_in.map(str::to_string));
        if let Some(citation) = published_in {
            let reference = self.interpreters.references.from_dwc(
                name.published_in_id.as_deref(),
                Some(citation),
                v.get(DwcTerm::NamePublishedInYear),
            );
            items.push(Interpreted::Reference { verbatim: None, reference });
        }

        let mut usage = Usage::new(id, name, status);
        usage.according_to_id = owned(&v, DwcTerm::NameAccordingToID);
        usage.remarks = owned(&v, DwcTerm::TaxonRemarks);
        let columns = CLASSIFICATION.map(|(r, t)| (r, Term::from(t)));
        let usage = NeoUsage::new(usage)
            .with_refs(refs)
            .with_classification(classification(&v, &columns));
        items.push(Interpreted::Usage { verbatim: v, usage });
        items
    }

    /// GBIF reference extension. The row's core id is the citing taxon.
    fn interpret_reference(&self, v: VerbatimRecord) -> Vec<Interpreted> {
        let id = owned(&v, DcTerm::Identifier).unwrap_or_else(|| format!("{}:{}", v.file, v.line));
        let reference = self.interpreters.references.from_dc(
            Some(&id),
            v.get(DcTerm::BibliographicCitation),
            v.get(DcTerm::Title),
            v.get(DcTerm::Creator),
            v.get(DcTerm::Date),
            v.get(DcTerm::Source),
        );
        let role = match v.get(DcTerm::Type).map(str::to_ascii_lowercase).as_deref() {
            Some("original" | "nomenclatural" | "nomenclature") => ReferenceRole::Nomenclatural,
            Some("taxonomic" | "taxon") => ReferenceRole::Taxonomic,
            _ => ReferenceRole::Other,
        };
        let link = owned(&v, DwcTerm::TaxonID).map(|usage_id| ReferenceLink { usage_id, reference_id: id, role });
        let mut items = vec![Interpreted::Reference { verbatim: Some(v), reference }];
        items.extend(link.map(|link| Interpreted::ReferenceLink { verbatim: None, link }));
        items
    }
}

impl Inserter for DwcaInserter {
    fn format(&self) -> Option<DataFormat> {
        Some(DataFormat::DwcA)
    }

    fn phases(&self) -> Result<Vec<Phase<'_>>> {
        let taxon = RowType::Dwc(DwcRowType::Taxon);
        let reference = RowType::Dwc(DwcRowType::Reference);
        let others = other_row_types(&self.reader, &[taxon.clone(), reference.clone()]);
        let core: Phase<'_> = Box::new(rows(&self.reader, &[taxon])?.flat_map(move |v| self.interpret_taxon(v)));
        let extensions: Phase<'_> = Box::new(
            rows(&self.reader, &[reference])?
                .flat_map(move |v| self.interpret_reference(v))
                .chain(rows(&self.reader, &others)?.map(Interpreted::Verbatim)),
        );
        Ok(vec![core, extensions])
    }

    fn metadata(&self) -> Result<Option<DatasetMetadata>> {
        read_metadata(&self.dir, DataFormat::DwcA, &self.reader)
    }

    fn skipped_rows(&self) -> u64 {
        self.reader.skipped_rows()
    }

    fn check_failure(&self) -> Result<()> {
        self.reader.check_failure()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn inserter(taxa: &str) -> (tempfile::TempDir, DwcaInserter) {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("taxon.tsv"), taxa).unwrap();
        let ins = DwcaInserter::open(tmp.path(), Interpreters::default(), 50).unwrap();
        (tmp, ins)
    }

    fn usages(items: Vec<Interpreted>) -> Vec<(VerbatimRecord, NeoUsage)> {
        items
            .into_iter()
            .filter_map(|i| match i {
                Interpreted::Usage { verbatim, usage } => Some((verbatim, usage)),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn test_taxon_rows() {
        let (_tmp, ins) = inserter(
            "taxonID\tparentNameUsageID\tacceptedNameUsageID\tscientificName\ttaxonRank\ttaxonomicStatus\tfamily\tnamePublishedIn\n\
             1\t\t\tAbies Mill.\tgenus\taccepted\tPinaceae\t\n\
             2\t1\t\tAbies alba Mill.\tspecies\taccepted\tPinaceae\tGard. Dict. ed. 8. 1768\n\
             3\t\t2\tPinus picea L.\tspecies\t\t\t\n\
             4\t\t\t\tspecies\taccepted\t\t\n",
        );
        let mut phases = ins.phases().unwrap();
        let items: Vec<Interpreted> = phases.remove(0).collect();
        assert!(matches!(&items[1], Interpreted::Reference { verbatim: None, reference } if reference.year == Some(1768)));
        assert!(matches!(&items[4], Interpreted::Verbatim(v) if v.has_issue(Issue::ScientificNameMissing)));

        let u = usages(items);
        assert_eq!(u.len(), 3);
        assert_eq!(u[0].1.classification.family.as_deref(), Some("Pinaceae"));
        assert_eq!(u[1].1.refs.parent_id.as_deref(), Some("1"));
        assert_eq!(u[1].1.name().published_in_id.as_deref(), Some("Gard. Dict. ed. 8. 1768"));
        assert!(u[2].1.is_synonym());
        assert_eq!(u[2].1.refs.accepted_ids, vec!["2".to_string()]);
        assert_eq!(u[2].1.refs.parent_id, None);
    }

    #[test]
    fn test_reference_extension_links_to_core() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("meta.xml"), r#"<archive metadata="eml.xml">
  <core rowType="http://rs.tdwg.org/dwc/terms/Taxon" fieldsTerminatedBy="\t" ignoreHeaderLines="1">
    <files><location>taxa.txt</location></files>
    <id index="0"/>
    <field index="1" term="http://rs.tdwg.org/dwc/terms/scientificName"/>
  </core>
  <extension rowType="http://rs.gbif.org/terms/1.0/Reference" fieldsTerminatedBy="\t" ignoreHeaderLines="1">
    <files><location>references.txt</location></files>
    <coreid index="0"/>
    <field index="1" term="http://purl.org/dc/terms/bibliographicCitation"/>
    <field index="2" term="http://purl.org/dc/terms/type"/>
  </extension>
</archive>"#).unwrap();
        std::fs::write(tmp.path().join("taxa.txt"), "id\tname\n1\tAbies alba\n").unwrap();
        std::fs::write(tmp.path().join("references.txt"), "id\tcitation\ttype\n1\tMiller, P. 1768. Gard. Dict.\toriginal\n").unwrap();

        let ins = DwcaInserter::open(tmp.path(), Interpreters::default(), 50).unwrap();
        let phases = ins.phases().unwrap();
        let items: Vec<Interpreted> = phases.into_iter().flatten().collect();
        assert_eq!(items.len(), 3);
        match &items[2] {
            Interpreted::ReferenceLink { link, .. } => {
                assert_eq!(link.usage_id, "1");
                assert_eq!(link.reference_id, "references.txt:2");
                assert_eq!(link.role, ReferenceRole::Nomenclatural);
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
