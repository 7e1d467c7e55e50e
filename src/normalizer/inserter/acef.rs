//! ACEF sheets.
//!
//! Infraspecific taxa only carry their own epithet; genus and species come
//! from the parent species row, so species are read once up front.

use std::path::{Path, PathBuf};

use hashbrown::HashMap;

use super::*;
use crate::normalizer::metadata::read_metadata;
use crate::term::{normalize_term_name, AcefRowType, AcefTerm, Vocabulary};

const CLASSIFICATION: [(Rank, AcefTerm); 7] = [
    (Rank::Kingdom, AcefTerm::Kingdom),
    (Rank::Phylum, AcefTerm::Phylum),
    (Rank::Class, AcefTerm::Class),
    (Rank::Order, AcefTerm::Order),
    (Rank::Superfamily, AcefTerm::Superfamily),
    (Rank::Family, AcefTerm::Family),
    (Rank::Genus, AcefTerm::Genus),
];

/// Genus and epithet of an accepted species, by species id.
type Binomials = HashMap<String, (Option<String>, Option<String>)>;

#[derive(Debug)]
pub struct AcefInserter {
    dir: PathBuf,
    reader: TermReader,
    interpreters: Interpreters,
}

impl AcefInserter {
    pub fn open(dir: &Path, interpreters: Interpreters, sample_lines: usize) -> Result<Self> {
        Ok(Self {
            dir: dir.to_path_buf(),
            reader: TermReader::open_with(dir, Vocabulary::Acef, sample_lines)?,
            interpreters,
        })
    }

    fn binomials(&self) -> Result<Binomials> {
        let mut map = Binomials::new();
        for v in self.reader.stream(&RowType::Acef(AcefRowType::AcceptedSpecies))? {
            if let Some(id) = owned(&v, AcefTerm::AcceptedTaxonID) {
                map.insert(id, (owned(&v, AcefTerm::Genus), owned(&v, AcefTerm::SpeciesEpithet)));
            }
        }
        Ok(map)
    }

    fn interpret_reference(&self, v: VerbatimRecord) -> Interpreted {
        let reference = self.interpreters.references.from_acef(
            v.get(AcefTerm::ReferenceID),
            v.get_first(&[AcefTerm::Authors.into(), AcefTerm::Author.into()]),
            v.get(AcefTerm::Year),
            v.get(AcefTerm::Title),
            v.get(AcefTerm::Details),
        );
        Interpreted::Reference { verbatim: Some(v), reference }
    }

    fn interpret_usage(&self, mut v: VerbatimRecord, binomials: &Binomials) -> Interpreted {
        let row_type = v.row_type.clone();
        let is_synonym = row_type == Some(RowType::Acef(AcefRowType::Synonyms));
        let is_infraspecific = row_type == Some(RowType::Acef(AcefRowType::AcceptedInfraSpecificTaxa));

        let id_term = if is_synonym { AcefTerm::ID } else { AcefTerm::AcceptedTaxonID };
        let id = owned(&v, id_term);
        if id.is_none() {
            v.add_issue(Issue::IdMissing);
        }

        let parent_species = is_infraspecific.then(|| owned(&v, AcefTerm::ParentSpeciesID)).flatten();
        let (genus, species) = match parent_species.as_ref().and_then(|p| binomials.get(p)) {
            Some((g, s)) => (g.clone(), s.clone()),
            None => (owned(&v, AcefTerm::Genus), owned(&v, AcefTerm::SpeciesEpithet)),
        };
        let infra = v.get_first(&[AcefTerm::InfraSpeciesEpithet.into(), AcefTerm::InfraSpecies.into()]);
        let marker = v.get_first(&[AcefTerm::InfraSpeciesMarker.into(), AcefTerm::InfraSpecificMarker.into()]);
        let authorship = if infra.is_some() {
            v.get_first(&[AcefTerm::InfraSpeciesAuthorString.into(), AcefTerm::InfraSpecificAuthorString.into()])
        } else {
            v.get(AcefTerm::AuthorString)
        };
        let rank = match (infra, marker) {
            (Some(_), Some(m)) => Some(m),
            (Some(_), None) => None,
            (None, _) => Some("species"),
        };
        let out = interpret_name(
            self.interpreters.names.as_ref(),
            &NameFields {
                authorship,
                rank,
                genus: genus.as_deref(),
                infrageneric_epithet: v.get(AcefTerm::SubGenusName),
                specific_epithet: species.as_deref(),
                infraspecific_epithet: infra,
                ..Default::default()
            },
        );
        let Some(mut name) = out.drain_into(&mut v.issues) else {
            return Interpreted::Verbatim(v);
        };
        name.nom_status = owned(&v, AcefTerm::GSDNameStatus);

        let default = if is_synonym { TaxonomicStatus::Synonym } else { TaxonomicStatus::Accepted };
        let mut status = status(&mut v, AcefTerm::Sp2000NameStatus, default);
        if status.is_synonym() != is_synonym {
            v.add_issue(Issue::TaxonomicStatusInvalid);
            status = default;
        }

        let refs = if is_synonym {
            DeferredRefs { accepted_ids: owned(&v, AcefTerm::AcceptedTaxonID).into_iter().collect(), ..Default::default() }
        } else {
            DeferredRefs { parent_id: parent_species, ..Default::default() }
        };
        let mut usage = Usage::new(id, name, status);
        usage.extinct = flag(&v, AcefTerm::IsExtinct);
        usage.remarks = owned(&v, AcefTerm::AdditionalData);

        let mut neo = NeoUsage::new(usage).with_refs(refs);
        if !is_synonym && !is_infraspecific {
            let columns = CLASSIFICATION.map(|(r, t)| (r, Term::from(t)));
            neo = neo.with_classification(classification(&v, &columns));
        }
        Interpreted::Usage { verbatim: v, usage: neo }
    }

    fn interpret_link(&self, mut v: VerbatimRecord) -> Interpreted {
        let role = match v.get(AcefTerm::ReferenceType).map(normalize_term_name).as_deref() {
            Some("nomref") => ReferenceRole::Nomenclatural,
            Some("taxaccref") => ReferenceRole::Taxonomic,
            _ => ReferenceRole::Other,
        };
        match (owned(&v, AcefTerm::ID), owned(&v, AcefTerm::ReferenceID)) {
            (Some(usage_id), Some(reference_id)) => {
                let link = ReferenceLink { usage_id, reference_id, role };
                Interpreted::ReferenceLink { verbatim: Some(v), link }
            }
            _ => {
                v.add_issue(Issue::ReferenceIdInvalid);
                Interpreted::Verbatim(v)
            }
        }
    }
}

impl Inserter for AcefInserter {
    fn format(&self) -> Option<DataFormat> {
        Some(DataFormat::Acef)
    }

    fn phases(&self) -> Result<Vec<Phase<'_>>> {
        let references = RowType::Acef(AcefRowType::Reference);
        let usages = [
            RowType::Acef(AcefRowType::AcceptedSpecies),
            RowType::Acef(AcefRowType::AcceptedInfraSpecificTaxa),
            RowType::Acef(AcefRowType::Synonyms),
        ];
        let links = RowType::Acef(AcefRowType::NameReferencesLinks);
        let mut known = vec![references.clone(), links.clone(), RowType::Acef(AcefRowType::SourceDatabase)];
        known.extend(usages.iter().cloned());
        let others = other_row_types(&self.reader, &known);

        let binomials = self.binomials()?;
        let references: Phase<'_> = Box::new(rows(&self.reader, &[references])?.map(move |v| self.interpret_reference(v)));
        let usages: Phase<'_> = Box::new(rows(&self.reader, &usages)?.map(move |v| self.interpret_usage(v, &binomials)));
        let rest: Phase<'_> = Box::new(
            rows(&self.reader, &[links])?
                .map(move |v| self.interpret_link(v))
                .chain(rows(&self.reader, &others)?.map(Interpreted::Verbatim)),
        );
        Ok(vec![references, usages, rest])
    }

    fn metadata(&self) -> Result<Option<DatasetMetadata>> {
        read_metadata(&self.dir, DataFormat::Acef, &self.reader)
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

    fn acef(files: &[(&str, &str)]) -> (tempfile::TempDir, AcefInserter) {
        let tmp = tempfile::tempdir().unwrap();
        for (name, body) in files {
            std::fs::write(tmp.path().join(name), body).unwrap();
        }
        let ins = AcefInserter::open(tmp.path(), Interpreters::default(), 50).unwrap();
        (tmp, ins)
    }

    #[test]
    fn test_species_infraspecies_and_synonyms() {
        let (_tmp, ins) = acef(&[
            (
                "AcceptedSpecies.txt",
                "AcceptedTaxonID,Kingdom,Family,Genus,SpeciesEpithet,AuthorString,Sp2000NameStatus,IsExtinct\n\
                 s1,Plantae,Fabaceae,Acacia,karroo,Hayne,Accepted name,false\n",
            ),
            (
                "AcceptedInfraSpecificTaxa.txt",
                "AcceptedTaxonID,ParentSpeciesID,InfraSpeciesEpithet,InfraSpeciesAuthorString,InfraSpeciesMarker\n\
                 i1,s1,transvaalensis,Burtt Davy,var.\n",
            ),
            (
                "Synonyms.txt",
                "ID,AcceptedTaxonID,Genus,SpeciesEpithet,AuthorString,Sp2000NameStatus\n\
                 y1,s1,Mimosa,eburnea,L.f.,Accepted name\n",
            ),
        ]);
        let mut phases = ins.phases().unwrap();
        let items: Vec<Interpreted> = phases.remove(1).collect();
        assert_eq!(items.len(), 3);

        let usage = |i: usize| match &items[i] {
            Interpreted::Usage { verbatim, usage } => (verbatim.clone(), usage.clone()),
            other => panic!("unexpected {other:?}"),
        };
        let (_, species) = usage(0);
        assert_eq!(species.name().scientific_name, "Acacia karroo");
        assert_eq!(species.classification.family.as_deref(), Some("Fabaceae"));
        assert_eq!(species.classification.genus.as_deref(), Some("Acacia"));
        assert_eq!(species.usage.extinct, Some(false));

        let (_, infra) = usage(1);
        assert_eq!(infra.name().scientific_name, "Acacia karroo var. transvaalensis");
        assert_eq!(infra.name().rank, Rank::Variety);
        assert_eq!(infra.refs.parent_id.as_deref(), Some("s1"));

        let (v, syn) = usage(2);
        assert!(syn.is_synonym());
        assert_eq!(syn.refs.accepted_ids, vec!["s1".to_string()]);
        assert!(v.has_issue(Issue::TaxonomicStatusInvalid));
    }

    #[test]
    fn test_references_and_links() {
        let (_tmp, ins) = acef(&[
            (
                "References.txt",
                "ReferenceID\tAuthors\tYear\tTitle\tDetails\n\
                 r1\tRoss, J.H.\t1979\tA conspectus of African Acacia\tMem. Bot. Surv. S. Afr. 44: 1-150\n",
            ),
            ("NameReferencesLinks.txt", "ID\tReferenceType\tReferenceID\ns1\tNomRef\tr1\ns2\tTaxAccRef\t\n"),
            ("CommonNames.txt", "AcceptedTaxonID\tCommonName\ns1\tSweet thorn\n"),
        ]);
        let phases = ins.phases().unwrap();
        let items: Vec<Interpreted> = phases.into_iter().flatten().collect();
        assert_eq!(items.len(), 4);

        match &items[0] {
            Interpreted::Reference { reference, .. } => {
                assert_eq!(reference.id.as_deref(), Some("r1"));
                assert_eq!(reference.year, Some(1979));
                assert_eq!(
                    reference.citation.as_deref(),
                    Some("Ross, J.H. 1979. A conspectus of African Acacia. Mem. Bot. Surv. S. Afr. 44: 1-150")
                );
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(matches!(
            &items[1],
            Interpreted::ReferenceLink { link, .. } if link.role == ReferenceRole::Nomenclatural && link.usage_id == "s1"
        ));
        assert!(matches!(&items[2], Interpreted::Verbatim(v) if v.has_issue(Issue::ReferenceIdInvalid)));
        assert!(matches!(&items[3], Interpreted::Verbatim(v) if v.row_type == Some(RowType::Acef(AcefRowType::CommonNames))));
    }
}
