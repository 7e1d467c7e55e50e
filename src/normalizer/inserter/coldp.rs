//! ColDP entities.

use std::path::{Path, PathBuf};

use super::*;
use crate::normalizer::metadata::read_metadata;
use crate::term::{ColdpRowType, ColdpTerm, DwcTerm, Vocabulary};

/// Genus is a name atom in ColDP, never a classification column.
const CLASSIFICATION: [(Rank, ColdpTerm); 8] = [
    (Rank::Kingdom, ColdpTerm::Kingdom),
    (Rank::Phylum, ColdpTerm::Phylum),
    (Rank::Class, ColdpTerm::Class),
    (Rank::Order, ColdpTerm::Order),
    (Rank::Superfamily, ColdpTerm::Superfamily),
    (Rank::Family, ColdpTerm::Family),
    (Rank::Subfamily, ColdpTerm::Subfamily),
    (Rank::Tribe, ColdpTerm::Tribe),
];

#[derive(Debug)]
pub struct ColdpInserter {
    dir: PathBuf,
    reader: TermReader,
    interpreters: Interpreters,
}

impl ColdpInserter {
    pub fn open(dir: &Path, interpreters: Interpreters, sample_lines: usize) -> Result<Self> {
        Ok(Self {
            dir: dir.to_path_buf(),
            reader: TermReader::open_with(dir, Vocabulary::Coldp, sample_lines)?,
            interpreters,
        })
    }

    /// Name columns shared by `Name` and `NameUsage` rows.
    fn name(&self, v: &mut VerbatimRecord) -> Option<Name> {
        let out = interpret_name(
            self.interpreters.names.as_ref(),
            &NameFields {
                scientific_name: v.get(ColdpTerm::ScientificName),
                authorship: v.get(ColdpTerm::Authorship),
                rank: v.get(ColdpTerm::Rank),
                code: v.get(ColdpTerm::Code),
                uninomial: v.get(ColdpTerm::Uninomial),
                genus: v.get(ColdpTerm::Genus),
                infrageneric_epithet: v.get(ColdpTerm::InfragenericEpithet),
                specific_epithet: v.get(ColdpTerm::SpecificEpithet),
                infraspecific_epithet: v.get(ColdpTerm::InfraspecificEpithet),
            },
        );
        let mut name = out.drain_into(&mut v.issues)?;
        name.published_in_id = owned(v, ColdpTerm::ReferenceID);
        name.published_in_page = owned(v, ColdpTerm::PublishedInPage);
        name.published_in_year = year(v, ColdpTerm::PublishedInYear);
        Some(name)
    }

    /// Usage columns shared by `NameUsage`, `Taxon` and `Synonym` rows.
    fn usage(&self, v: &mut VerbatimRecord, name: Name, synonym_row: bool) -> NeoUsage {
        let id = owned(v, ColdpTerm::ID);
        let default = if synonym_row { TaxonomicStatus::Synonym } else { TaxonomicStatus::Accepted };
        let mut status = status(v, ColdpTerm::Status, default);
        if synonym_row && !status.is_synonym() {
            v.add_issue(Issue::TaxonomicStatusInvalid);
            status = TaxonomicStatus::Synonym;
        }
        if flag(v, ColdpTerm::Provisional) == Some(true) && !status.is_synonym() {
            status = TaxonomicStatus::ProvisionallyAccepted;
        }

        let parent = owned(v, ColdpTerm::ParentID).filter(|p| Some(p) != id.as_ref());
        let refs = if status.is_synonym() {
            let accepted = parent.or_else(|| owned(v, DwcTerm::TaxonID));
            DeferredRefs { accepted_ids: accepted.into_iter().collect(), ..Default::default() }
        } else {
            DeferredRefs { parent_id: parent, ..Default::default() }
        };
        let refs = DeferredRefs { basionym_id: owned(v, ColdpTerm::BasionymID), ..refs };

        let is_synonym = status.is_synonym();
        let mut usage = Usage::new(id, name, status);
        usage.according_to_id = owned(v, ColdpTerm::AccordingToID);
        usage.extinct = flag(v, ColdpTerm::Extinct);
        usage.remarks = owned(v, ColdpTerm::Remarks);

        let neo = NeoUsage::new(usage).with_refs(refs);
        if is_synonym {
            return neo;
        }
        let columns = CLASSIFICATION.map(|(r, t)| (r, Term::from(t)));
        neo.with_classification(classification(v, &columns))
    }

    fn interpret_name_row(&self, mut v: VerbatimRecord) -> Interpreted {
        let Some(mut name) = self.name(&mut v) else {
            return Interpreted::Verbatim(v);
        };
        name.id = owned(&v, ColdpTerm::ID);
        if name.id.is_none() {
            v.add_issue(Issue::IdMissing);
        }
        name.nom_status = owned(&v, ColdpTerm::Status);
        name.remarks = owned(&v, ColdpTerm::Remarks);
        let basionym_id = owned(&v, ColdpTerm::BasionymID).filter(|b| Some(b) != name.id.as_ref());
        Interpreted::Name { verbatim: v, name, basionym_id }
    }

    fn interpret_usage(&self, mut v: VerbatimRecord) -> Interpreted {
        match v.row_type.clone() {
            Some(RowType::Coldp(ColdpRowType::NameUsage)) => {
                if !v.has(ColdpTerm::ID) {
                    v.add_issue(Issue::IdMissing);
                }
                let Some(name) = self.name(&mut v) else {
                    return Interpreted::Verbatim(v);
                };
                let usage = self.usage(&mut v, name, false);
                Interpreted::Usage { verbatim: v, usage }
            }
            Some(RowType::Coldp(rt)) => {
                let Some(name_id) = owned(&v, ColdpTerm::NameID) else {
                    v.add_issue(Issue::NameIdInvalid);
                    return Interpreted::Verbatim(v);
                };
                let synonym_row = rt == ColdpRowType::Synonym;
                if !synonym_row && !v.has(ColdpTerm::ID) {
                    v.add_issue(Issue::IdMissing);
                }
                let usage = self.usage(&mut v, Name::default(), synonym_row);
                Interpreted::UsageOfName { verbatim: v, name_id, usage }
            }
            _ => Interpreted::Verbatim(v),
        }
    }

    fn interpret_relation(&self, mut v: VerbatimRecord) -> Interpreted {
        let is_basionym = v
            .get(ColdpTerm::Type)
            .is_some_and(|t| matches!(t.to_ascii_lowercase().as_str(), "basionym" | "has basionym"));
        if !is_basionym {
            return Interpreted::Verbatim(v);
        }
        match (owned(&v, ColdpTerm::NameID), owned(&v, ColdpTerm::RelatedNameID)) {
            (Some(name_id), Some(basionym_id)) => {
                Interpreted::Basionym { verbatim: v, link: BasionymLink { name_id, basionym_id } }
            }
            _ => {
                v.add_issue(Issue::NameRelationInvalid);
                Interpreted::Verbatim(v)
            }
        }
    }
}

impl Inserter for ColdpInserter {
    fn format(&self) -> Option<DataFormat> {
        Some(DataFormat::Coldp)
    }

    fn phases(&self) -> Result<Vec<Phase<'_>>> {
        let reference = RowType::Coldp(ColdpRowType::Reference);
        let name = RowType::Coldp(ColdpRowType::Name);
        let usages = [
            RowType::Coldp(ColdpRowType::NameUsage),
            RowType::Coldp(ColdpRowType::Taxon),
            RowType::Coldp(ColdpRowType::Synonym),
        ];
        let relation = RowType::Coldp(ColdpRowType::NameRelation);
        let mut known = vec![reference.clone(), name.clone(), relation.clone()];
        known.extend(usages.iter().cloned());
        let others = other_row_types(&self.reader, &known);

        let names: Phase<'_> = Box::new(
            rows(&self.reader, &[reference])?
                .map(move |v| {
                    let reference = self.interpreters.references.from_coldp(&v);
                    Interpreted::Reference { verbatim: Some(v), reference }
                })
                .chain(rows(&self.reader, &[name])?.map(move |v| self.interpret_name_row(v))),
        );
        let usages: Phase<'_> = Box::new(rows(&self.reader, &usages)?.map(move |v| self.interpret_usage(v)));
        let rest: Phase<'_> = Box::new(
            rows(&self.reader, &[relation])?
                .map(move |v| self.interpret_relation(v))
                .chain(rows(&self.reader, &others)?.map(Interpreted::Verbatim)),
        );
        Ok(vec![names, usages, rest])
    }

    fn metadata(&self) -> Result<Option<DatasetMetadata>> {
        read_metadata(&self.dir, DataFormat::Coldp, &self.reader)
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

    fn coldp(files: &[(&str, &str)]) -> (tempfile::TempDir, ColdpInserter) {
        let tmp = tempfile::tempdir().unwrap();
        for (name, body) in files {
            std::fs::write(tmp.path().join(name), body).unwrap();
        }
        let ins = ColdpInserter::open(tmp.path(), Interpreters::default(), 50).unwrap();
        (tmp, ins)
    }

    #[test]
    fn test_name_usage_rows() {
        let (_tmp, ins) = coldp(&[(
            "NameUsage.tsv",
            "ID\tparentID\tbasionymID\tstatus\tscientificName\tauthorship\trank\tfamily\tprovisional\n\
             1\t\t\taccepted\tAbies\tMill.\tgenus\tPinaceae\t\n\
             2\t1\t\tprovisionally accepted\tAbies alba\tMill.\tspecies\tPinaceae\t\n\
             3\t2\t4\tsynonym\tPinus picea\tL.\tspecies\t\t\n\
             4\t1\t\taccepted\tAbies nova\t\tspecies\t\ttrue\n",
        )]);
        let items: Vec<Interpreted> = ins.phases().unwrap().remove(1).collect();
        let usages: Vec<NeoUsage> = items
            .into_iter()
            .map(|i| match i {
                Interpreted::Usage { usage, .. } => usage,
                other => panic!("unexpected {other:?}"),
            })
            .collect();

        assert_eq!(usages[0].classification.family.as_deref(), Some("Pinaceae"));
        assert_eq!(usages[1].usage.status, TaxonomicStatus::ProvisionallyAccepted);
        assert_eq!(usages[1].refs.parent_id.as_deref(), Some("1"));
        assert!(usages[2].is_synonym());
        assert_eq!(usages[2].refs.accepted_ids, vec!["2".to_string()]);
        assert_eq!(usages[2].refs.basionym_id.as_deref(), Some("4"));
        assert!(usages[2].classification.is_empty());
        assert!(usages[3].usage.is_provisional());
    }

    #[test]
    fn test_names_taxa_synonyms_and_relations() {
        let (_tmp, ins) = coldp(&[
            (
                "Name.tsv",
                "ID\tscientificName\tauthorship\trank\treferenceID\tstatus\n\
                 n1\tAbies alba\tMill.\tspecies\tr1\tconserved\n\
                 n2\tPinus picea\tL.\tspecies\t\t\n",
            ),
            ("Reference.tsv", "ID\tcitation\nr1\tMiller, P. 1768. The gardeners dictionary.\n"),
            ("Taxon.tsv", "ID\tparentID\tnameID\tkingdom\nt1\t\tn1\tPlantae\nt2\t\tmissing\t\n"),
            ("Synonym.tsv", "ID\ttaxonID\tnameID\tstatus\ns1\tt1\tn2\tsynonym\n"),
            ("NameRelation.tsv", "nameID\trelatedNameID\ttype\nn1\tn2\tbasionym\nn1\tn2\tspelling correction\nn1\t\tbasionym\n"),
        ]);
        let phases: Vec<Vec<Interpreted>> = ins.phases().unwrap().into_iter().map(Iterator::collect).collect();

        assert!(matches!(&phases[0][0], Interpreted::Reference { reference, .. } if reference.year == Some(1768)));
        match &phases[0][1] {
            Interpreted::Name { name, .. } => {
                assert_eq!(name.id.as_deref(), Some("n1"));
                assert_eq!(name.published_in_id.as_deref(), Some("r1"));
                assert_eq!(name.nom_status.as_deref(), Some("conserved"));
            }
            other => panic!("unexpected {other:?}"),
        }

        match &phases[1][0] {
            Interpreted::UsageOfName { name_id, usage, .. } => {
                assert_eq!(name_id, "n1");
                assert_eq!(usage.classification.kingdom.as_deref(), Some("Plantae"));
            }
            other => panic!("unexpected {other:?}"),
        }
        match &phases[1][2] {
            Interpreted::UsageOfName { name_id, usage, .. } => {
                assert_eq!(name_id, "n2");
                assert!(usage.is_synonym());
                assert_eq!(usage.refs.accepted_ids, vec!["t1".to_string()]);
            }
            other => panic!("unexpected {other:?}"),
        }

        assert!(matches!(
            &phases[2][0],
            Interpreted::Basionym { link, .. } if link.name_id == "n1" && link.basionym_id == "n2"
        ));
        assert!(matches!(&phases[2][1], Interpreted::Verbatim(v) if v.issues.is_empty()));
        assert!(matches!(&phases[2][2], Interpreted::Verbatim(v) if v.has_issue(Issue::NameRelationInvalid)));
    }
}
