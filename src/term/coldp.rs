//! Catalogue of Life Data Package terms and entities.

vocabulary! {
    pub enum ColdpTerm {
        ID => "ID",
        ParentID => "parentID",
        BasionymID => "basionymID",
        NameID => "nameID",
        RelatedNameID => "relatedNameID",
        ReferenceID => "referenceID",
        AccordingToID => "accordingToID",
        Status => "status",
        ScientificName => "scientificName",
        Authorship => "authorship",
        Rank => "rank",
        Uninomial => "uninomial",
        Genus => "genus",
        InfragenericEpithet => "infragenericEpithet",
        SpecificEpithet => "specificEpithet",
        InfraspecificEpithet => "infraspecificEpithet",
        Code => "code",
        PublishedInPage => "publishedInPage",
        PublishedInYear => "publishedInYear",
        Provisional => "provisional",
        Extinct => "extinct",
        Kingdom => "kingdom",
        Phylum => "phylum",
        Class => "class",
        Order => "order",
        Superfamily => "superfamily",
        Family => "family",
        Subfamily => "subfamily",
        Tribe => "tribe",
        Subgenus => "subgenus",
        Type => "type",
        Citation => "citation",
        Author => "author",
        Year => "year",
        Title => "title",
        Source => "source",
        Details => "details",
        Doi => "doi",
        Link => "link",
        Remarks => "remarks",
    }
}

vocabulary! {
    pub enum ColdpRowType {
        Name => "Name",
        NameUsage => "NameUsage",
        Taxon => "Taxon",
        Synonym => "Synonym",
        Reference => "Reference",
        NameRelation => "NameRelation",
        VernacularName => "VernacularName",
        Distribution => "Distribution",
        TypeMaterial => "TypeMaterial",
        Media => "Media",
    }
}
