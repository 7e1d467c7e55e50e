//! Annual Checklist Exchange Format columns and sheets.

vocabulary! {
    /// ACEF column names. Sheets share column names where they overlap.
    pub enum AcefTerm {
        AcceptedTaxonID => "AcceptedTaxonID",
        ParentSpeciesID => "ParentSpeciesID",
        ID => "ID",
        Kingdom => "Kingdom",
        Phylum => "Phylum",
        Class => "Class",
        Order => "Order",
        Superfamily => "Superfamily",
        Family => "Family",
        Genus => "Genus",
        SubGenusName => "SubGenusName",
        SpeciesEpithet => "SpeciesEpithet",
        AuthorString => "AuthorString",
        InfraSpeciesEpithet => "InfraSpeciesEpithet",
        InfraSpeciesMarker => "InfraSpeciesMarker",
        InfraSpeciesAuthorString => "InfraSpeciesAuthorString",
        InfraSpecies => "InfraSpecies",
        InfraSpecificMarker => "InfraSpecificMarker",
        InfraSpecificAuthorString => "InfraSpecificAuthorString",
        GSDNameStatus => "GSDNameStatus",
        Sp2000NameStatus => "Sp2000NameStatus",
        IsExtinct => "IsExtinct",
        HasPreHolocene => "HasPreHolocene",
        HasModern => "HasModern",
        LifeZone => "LifeZone",
        AdditionalData => "AdditionalData",
        LTSSpecialist => "LTSSpecialist",
        LTSDate => "LTSDate",
        SpeciesURL => "SpeciesURL",
        GSDTaxonGUI => "GSDTaxonGUI",
        GSDNameGUI => "GSDNameGUI",
        ReferenceType => "ReferenceType",
        ReferenceID => "ReferenceID",
        Author => "Author",
        Authors => "Authors",
        Year => "Year",
        Title => "Title",
        Details => "Details",
        DatabaseFullName => "DatabaseFullName",
        DatabaseShortName => "DatabaseShortName",
        DatabaseVersion => "DatabaseVersion",
        ReleaseDate => "ReleaseDate",
        AuthorsEditors => "AuthorsEditors",
        TaxonomicCoverage => "TaxonomicCoverage",
        Abstract => "Abstract",
        Organisation => "Organisation",
        HomeURL => "HomeURL",
        ContactPerson => "ContactPerson",
        CommonName => "CommonName",
        Language => "Language",
        Country => "Country",
        DistributionElement => "DistributionElement",
    }
}

vocabulary! {
    /// One ACEF sheet per entity.
    pub enum AcefRowType {
        AcceptedSpecies => "AcceptedSpecies",
        AcceptedInfraSpecificTaxa => "AcceptedInfraSpecificTaxa",
        Synonyms => "Synonyms",
        CommonNames => "CommonNames",
        Distribution => "Distribution",
        NameReferencesLinks => "NameReferencesLinks",
        Reference => "Reference",
        SourceDatabase => "SourceDatabase",
    }
}
