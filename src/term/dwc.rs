//! Darwin Core terms and GBIF extension row types.

vocabulary! {
    /// Darwin Core terms used by checklist archives.
    pub enum DwcTerm {
        TaxonID => "taxonID",
        ScientificNameID => "scientificNameID",
        AcceptedNameUsageID => "acceptedNameUsageID",
        ParentNameUsageID => "parentNameUsageID",
        OriginalNameUsageID => "originalNameUsageID",
        NameAccordingToID => "nameAccordingToID",
        NamePublishedInID => "namePublishedInID",
        DatasetID => "datasetID",
        ScientificName => "scientificName",
        AcceptedNameUsage => "acceptedNameUsage",
        ParentNameUsage => "parentNameUsage",
        OriginalNameUsage => "originalNameUsage",
        NameAccordingTo => "nameAccordingTo",
        NamePublishedIn => "namePublishedIn",
        NamePublishedInYear => "namePublishedInYear",
        HigherClassification => "higherClassification",
        Kingdom => "kingdom",
        Phylum => "phylum",
        Class => "class",
        Order => "order",
        Superfamily => "superfamily",
        Family => "family",
        Subfamily => "subfamily",
        Tribe => "tribe",
        Genus => "genus",
        Subgenus => "subgenus",
        GenericName => "genericName",
        SpecificEpithet => "specificEpithet",
        InfraspecificEpithet => "infraspecificEpithet",
        TaxonRank => "taxonRank",
        VerbatimTaxonRank => "verbatimTaxonRank",
        ScientificNameAuthorship => "scientificNameAuthorship",
        VernacularName => "vernacularName",
        NomenclaturalCode => "nomenclaturalCode",
        TaxonomicStatus => "taxonomicStatus",
        NomenclaturalStatus => "nomenclaturalStatus",
        TaxonRemarks => "taxonRemarks",
        Locality => "locality",
        CountryCode => "countryCode",
        OccurrenceStatus => "occurrenceStatus",
        EstablishmentMeans => "establishmentMeans",
    }
}

vocabulary! {
    /// Core and extension row types of a Darwin Core archive.
    pub enum DwcRowType {
        Taxon => "Taxon",
        VernacularName => "VernacularName",
        Distribution => "Distribution",
        Reference => "Reference",
        Description => "Description",
        TypesAndSpecimen => "TypesAndSpecimen",
        Multimedia => "Multimedia",
    }
}
