use chrono::NaiveDate;
use serde::Serialize;
use tracing::debug;

use crate::core::extractor::{ExtractedAuthor, ExtractedDocument, ExtractedReference};
use crate::core::linker::TitleIndex;

macro_rules! entity_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        pub struct $name(usize);

        impl $name {
            pub fn index(self) -> usize {
                self.0
            }
        }
    };
}

entity_id!(DocumentId);
entity_id!(PersonId);
entity_id!(OrganizationId);
entity_id!(VenueId);
entity_id!(CitationId);
entity_id!(AcknowledgementId);

#[derive(Debug, Clone, Serialize)]
pub struct Document {
    /// Case-folded; the identity key across the corpus.
    pub title: String,
    pub abstract_text: String,
    pub keywords: Vec<String>,
    pub cluster_id: Option<u32>,
    pub topic_label: Option<String>,
    pub is_primary: bool,
    pub authors: Vec<PersonId>,
    pub references: Vec<CitationId>,
    pub cited_by: Vec<CitationId>,
    pub acknowledgement: Option<AcknowledgementId>,
    pub venue: Option<VenueId>,
    pub source: Option<String>,
}

impl Document {
    fn new(title: &str, is_primary: bool) -> Self {
        Self {
            title: title.to_lowercase(),
            abstract_text: String::new(),
            keywords: Vec::new(),
            cluster_id: None,
            topic_label: None,
            is_primary,
            authors: Vec::new(),
            references: Vec::new(),
            cited_by: Vec::new(),
            acknowledgement: None,
            venue: None,
            source: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Person {
    pub forename: Option<String>,
    pub surname: Option<String>,
    pub email: Option<String>,
    pub affiliation: Option<OrganizationId>,
    pub works: Vec<DocumentId>,
    pub acknowledged_in: Vec<AcknowledgementId>,
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
}

impl Person {
    /// Name parts keep alphabetic characters only, so "J." and "J" match.
    pub fn new(forename: Option<&str>, surname: Option<&str>) -> Self {
        Self {
            forename: forename.and_then(name_part),
            surname: surname.and_then(name_part),
            ..Default::default()
        }
    }

    pub fn same_identity(&self, other: &Person) -> bool {
        self.forename == other.forename && self.surname == other.surname
    }

    pub fn display_name(&self) -> String {
        [self.forename.as_deref(), self.surname.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Organization {
    pub name: String,
    pub country: Option<String>,
    pub website: Option<String>,
    pub established: Option<NaiveDate>,
    pub acknowledged_in: Vec<AcknowledgementId>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Venue {
    pub name: String,
    pub country: Option<String>,
    pub description: Option<String>,
    pub established: Option<NaiveDate>,
    pub publishes: Vec<DocumentId>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Citation {
    pub source: DocumentId,
    pub cites: DocumentId,
    pub date: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Acknowledgement {
    pub source: DocumentId,
    pub text: String,
    pub recognized_organizations: Vec<OrganizationId>,
    pub recognized_people: Vec<PersonId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SpanLabel {
    Organization,
    Person,
}

/// A labeled byte range of an acknowledgement text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntitySpan {
    pub label: SpanLabel,
    pub start: usize,
    pub end: usize,
}

/// Entity arena for one corpus.
///
/// Entities refer to each other through typed indices, so the cyclic
/// document/person/citation graph never forms ownership cycles. Merged-away
/// duplicates stay in the arena but are no longer referenced.
#[derive(Debug, Default)]
pub struct Corpus {
    pub(crate) documents: Vec<Document>,
    pub(crate) persons: Vec<Person>,
    pub(crate) organizations: Vec<Organization>,
    pub(crate) venues: Vec<Venue>,
    pub(crate) citations: Vec<Citation>,
    pub(crate) acknowledgements: Vec<Acknowledgement>,
    pub(crate) primaries: Vec<DocumentId>,
    pub(crate) index: TitleIndex,
    pub(crate) canonical_persons: Vec<PersonId>,
    pub(crate) canonical_organizations: Vec<OrganizationId>,
    pub(crate) canonical_venues: Vec<VenueId>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one extracted document as a primary record, materializing a
    /// placeholder document for every reference it carries.
    pub fn ingest(&mut self, extracted: ExtractedDocument, source: Option<String>) -> DocumentId {
        let doc_id = DocumentId(self.documents.len());
        let mut document = Document::new(&extracted.title, true);
        document.abstract_text = extracted.abstract_text;
        document.keywords = extracted.keywords;
        document.source = source;
        self.documents.push(document);

        for author in &extracted.authors {
            let person = self.add_author_mention(author, doc_id);
            self.documents[doc_id.0].authors.push(person);
        }

        for reference in &extracted.references {
            let citation = self.add_citation(doc_id, reference);
            self.documents[doc_id.0].references.push(citation);
        }

        let ack_id = AcknowledgementId(self.acknowledgements.len());
        self.acknowledgements.push(Acknowledgement {
            source: doc_id,
            text: extracted.acknowledgement,
            recognized_organizations: Vec::new(),
            recognized_people: Vec::new(),
        });
        self.documents[doc_id.0].acknowledgement = Some(ack_id);

        if let Some(name) = extracted.venue {
            let venue = self.add_venue(name, doc_id);
            self.documents[doc_id.0].venue = Some(venue);
        }

        self.primaries.push(doc_id);
        debug!(
            "Ingested primary document '{}' with {} references",
            self.documents[doc_id.0].title,
            extracted.references.len()
        );
        doc_id
    }

    fn add_author_mention(&mut self, author: &ExtractedAuthor, doc_id: DocumentId) -> PersonId {
        let mut person = Person::new(author.forename.as_deref(), author.surname.as_deref());
        person.email = author.email.clone();
        person.works.push(doc_id);
        person.affiliation = author.affiliation_name.as_ref().map(|name| {
            self.add_organization(Organization {
                name: name.clone(),
                country: author.affiliation_country.clone(),
                ..Default::default()
            })
        });
        self.add_person(person)
    }

    fn add_citation(&mut self, source: DocumentId, reference: &ExtractedReference) -> CitationId {
        let citation_id = CitationId(self.citations.len());
        let placeholder_id = DocumentId(self.documents.len());

        let mut placeholder = Document::new(&reference.title, false);
        placeholder.cited_by.push(citation_id);
        self.documents.push(placeholder);

        for author in &reference.authors {
            let person = self.add_author_mention(author, placeholder_id);
            self.documents[placeholder_id.0].authors.push(person);
        }

        if let Some(name) = &reference.venue {
            let venue = self.add_venue(name.clone(), placeholder_id);
            self.documents[placeholder_id.0].venue = Some(venue);
        }

        self.citations.push(Citation {
            source,
            cites: placeholder_id,
            date: reference.date.clone(),
        });
        citation_id
    }

    fn add_person(&mut self, person: Person) -> PersonId {
        self.persons.push(person);
        PersonId(self.persons.len() - 1)
    }

    fn add_organization(&mut self, organization: Organization) -> OrganizationId {
        self.organizations.push(organization);
        OrganizationId(self.organizations.len() - 1)
    }

    fn add_venue(&mut self, name: String, publishes: DocumentId) -> VenueId {
        self.venues.push(Venue {
            name,
            publishes: vec![publishes],
            ..Default::default()
        });
        VenueId(self.venues.len() - 1)
    }

    /// Turn recognized spans of an acknowledgement into organization and
    /// person records that point back at it. Spans outside the text or not on
    /// character boundaries are skipped.
    pub fn add_recognized_entities(&mut self, ack_id: AcknowledgementId, spans: &[EntitySpan]) {
        let text = self.acknowledgements[ack_id.0].text.clone();

        for span in spans {
            let Some(mention) = text.get(span.start..span.end).map(str::trim) else {
                debug!("Skipping span {}..{} outside acknowledgement text", span.start, span.end);
                continue;
            };
            if mention.is_empty() {
                continue;
            }

            match span.label {
                SpanLabel::Organization => {
                    let org = self.add_organization(Organization {
                        name: mention.to_string(),
                        acknowledged_in: vec![ack_id],
                        ..Default::default()
                    });
                    self.acknowledgements[ack_id.0].recognized_organizations.push(org);
                }
                SpanLabel::Person => {
                    let (forename, surname) = split_person_mention(mention);
                    let mut person = Person::new(forename, Some(surname));
                    person.acknowledged_in.push(ack_id);
                    let person = self.add_person(person);
                    self.acknowledgements[ack_id.0].recognized_people.push(person);
                }
            }
        }
    }

    pub fn document(&self, id: DocumentId) -> &Document {
        &self.documents[id.0]
    }

    pub fn document_mut(&mut self, id: DocumentId) -> &mut Document {
        &mut self.documents[id.0]
    }

    pub fn person(&self, id: PersonId) -> &Person {
        &self.persons[id.0]
    }

    pub fn person_mut(&mut self, id: PersonId) -> &mut Person {
        &mut self.persons[id.0]
    }

    pub fn organization(&self, id: OrganizationId) -> &Organization {
        &self.organizations[id.0]
    }

    pub fn organization_mut(&mut self, id: OrganizationId) -> &mut Organization {
        &mut self.organizations[id.0]
    }

    pub fn venue(&self, id: VenueId) -> &Venue {
        &self.venues[id.0]
    }

    pub fn venue_mut(&mut self, id: VenueId) -> &mut Venue {
        &mut self.venues[id.0]
    }

    pub fn citation(&self, id: CitationId) -> &Citation {
        &self.citations[id.0]
    }

    pub fn acknowledgement(&self, id: AcknowledgementId) -> &Acknowledgement {
        &self.acknowledgements[id.0]
    }

    /// Documents reachable through the title index, in index order.
    pub fn indexed_documents(&self) -> Vec<DocumentId> {
        self.index.ids().collect()
    }

    pub fn find_document(&self, title: &str) -> Option<DocumentId> {
        self.index.get(&title.to_lowercase())
    }

    pub fn placeholder_documents(&self) -> Vec<DocumentId> {
        self.index
            .ids()
            .filter(|id| !self.documents[id.0].is_primary)
            .collect()
    }

    pub fn canonical_persons(&self) -> &[PersonId] {
        &self.canonical_persons
    }

    pub fn canonical_organizations(&self) -> &[OrganizationId] {
        &self.canonical_organizations
    }

    pub fn canonical_venues(&self) -> &[VenueId] {
        &self.canonical_venues
    }
}

/// First whitespace-delimited token is the forename, the remainder the
/// surname. A single token is a surname.
fn split_person_mention(mention: &str) -> (Option<&str>, &str) {
    match mention.split_once(char::is_whitespace) {
        Some((forename, rest)) if !rest.trim().is_empty() => (Some(forename), rest.trim()),
        _ => (None, mention),
    }
}

fn name_part(raw: &str) -> Option<String> {
    let cleaned: String = raw.chars().filter(|c| c.is_alphabetic()).collect();
    if cleaned.is_empty() {
        None
    } else {
        Some(cleaned)
    }
}

pub(crate) fn push_unique<T: PartialEq>(target: &mut Vec<T>, value: T) {
    if !target.contains(&value) {
        target.push(value);
    }
}
