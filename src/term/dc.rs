//! Dublin Core terms, used by DwC-A reference extensions and metadata.

vocabulary! {
    pub enum DcTerm {
        Identifier => "identifier",
        BibliographicCitation => "bibliographicCitation",
        Title => "title",
        Creator => "creator",
        Date => "date",
        Source => "source",
        Type => "type",
        References => "references",
        Language => "language",
        License => "license",
        Rights => "rights",
        Description => "description",
    }
}
