pub mod entities;
pub mod extractor;
pub mod linker;
pub mod llm_client;
pub mod pipeline;
pub mod resolver;
pub mod serializer;
pub mod tei;
pub mod triple;

pub use entities::{
    Acknowledgement, AcknowledgementId, Citation, CitationId, Corpus, Document, DocumentId,
    EntitySpan, Organization, OrganizationId, Person, PersonId, SpanLabel, Venue, VenueId,
};
pub use extractor::{ExtractedAuthor, ExtractedDocument, ExtractedReference, TeiExtractor};
pub use linker::{LinkSummary, TitleIndex};
pub use llm_client::VllmClient;
pub use pipeline::{BuildResult, CorpusBuilder};
pub use resolver::ResolutionSummary;
pub use serializer::{slugify, GraphSerializer};
pub use triple::{RdfTerm, RdfTriple};
