use std::collections::HashSet;
use tracing::{debug, info};

use crate::config::RdfSchema;
use crate::core::entities::{
    AcknowledgementId, CitationId, Corpus, DocumentId, OrganizationId, PersonId, VenueId,
};
use crate::core::triple::{RdfTerm, RdfTriple, RDF_TYPE, XSD_BOOLEAN, XSD_DATE, XSD_INTEGER};

pub const NO_JOURNAL: &str = "no_journal";
pub const NO_AFFILIATION: &str = "no_affiliation";
const UNKNOWN: &str = "unknown";

/// Node identifier: lower-case with everything other than ASCII
/// alphanumerics dropped, so whitespace, underscores and punctuation vanish.
pub fn slugify(text: &str) -> String {
    let slug: String = text
        .to_lowercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();

    if slug.is_empty() {
        UNKNOWN.to_string()
    } else {
        slug
    }
}

#[derive(Debug, Clone, Copy)]
enum Entity {
    Document(DocumentId),
    Person(PersonId),
    Organization(OrganizationId),
    Venue(VenueId),
    Citation(CitationId),
    Acknowledgement(AcknowledgementId),
}

/// Pending work. An entity's related entities are expanded before the link
/// triple pointing at them is written.
enum Step {
    Expand(Entity),
    Link {
        subject: String,
        predicate: &'static str,
        target: String,
    },
}

/// Walks a linked and resolved corpus and emits its triples.
///
/// Each entity is emitted at most once: the slug is marked visited before its
/// triples are written, so cycles such as citation/cited_by terminate. The
/// walk keeps its pending steps on the heap, so long citation chains cannot
/// exhaust the call stack.
pub struct GraphSerializer<'a> {
    corpus: &'a Corpus,
    schema: &'a RdfSchema,
    visited: HashSet<String>,
    triples: Vec<RdfTriple>,
}

impl<'a> GraphSerializer<'a> {
    pub fn new(corpus: &'a Corpus, schema: &'a RdfSchema) -> Self {
        Self {
            corpus,
            schema,
            visited: HashSet::new(),
            triples: Vec::new(),
        }
    }

    pub fn serialize(mut self) -> Vec<RdfTriple> {
        let corpus = self.corpus;
        let mut pending: Vec<Step> = Vec::new();

        for doc_id in corpus.indexed_documents() {
            pending.push(Step::Expand(Entity::Document(doc_id)));
            while let Some(step) = pending.pop() {
                match step {
                    Step::Expand(entity) => {
                        let steps = self.expand(entity);
                        pending.extend(steps.into_iter().rev());
                    }
                    Step::Link {
                        subject,
                        predicate,
                        target,
                    } => self.emit_link(&subject, predicate, &target),
                }
            }
        }

        info!(
            "Serialized {} triples for {} nodes",
            self.triples.len(),
            self.visited.len()
        );
        self.triples
    }

    pub fn document_slug(&self, id: DocumentId) -> String {
        slugify(&self.corpus.document(id).title)
    }

    pub fn person_slug(&self, id: PersonId) -> String {
        let person = self.corpus.person(id);
        let part = |value: Option<&str>| value.map(slugify).unwrap_or_else(|| UNKNOWN.to_string());
        format!(
            "{}{}",
            part(person.forename.as_deref()),
            part(person.surname.as_deref())
        )
    }

    fn organization_slug(&self, id: OrganizationId) -> String {
        slugify(&self.corpus.organization(id).name)
    }

    fn venue_slug(&self, id: VenueId) -> String {
        slugify(&self.corpus.venue(id).name)
    }

    fn citation_slug(&self, id: CitationId) -> String {
        let citation = self.corpus.citation(id);
        format!(
            "{}{}",
            self.document_slug(citation.source),
            self.document_slug(citation.cites)
        )
    }

    fn acknowledgement_slug(&self, id: AcknowledgementId) -> String {
        let source = self.corpus.acknowledgement(id).source;
        format!("{}acknowledgement", self.document_slug(source))
    }

    fn slug(&self, entity: Entity) -> String {
        match entity {
            Entity::Document(id) => self.document_slug(id),
            Entity::Person(id) => self.person_slug(id),
            Entity::Organization(id) => self.organization_slug(id),
            Entity::Venue(id) => self.venue_slug(id),
            Entity::Citation(id) => self.citation_slug(id),
            Entity::Acknowledgement(id) => self.acknowledgement_slug(id),
        }
    }

    /// Marks the slug visited; false when it was emitted already.
    fn enter(&mut self, slug: &str) -> bool {
        if self.visited.contains(slug) {
            return false;
        }
        self.visited.insert(slug.to_string());
        true
    }

    fn node(&self, slug: &str) -> String {
        format!("{}{}", self.schema.instance_namespace, slug)
    }

    fn predicate(&self, name: &str) -> String {
        format!("{}{}", self.schema.schema_namespace, name)
    }

    fn emit(&mut self, slug: &str, predicate: &str, object: RdfTerm) {
        let triple = RdfTriple::new(self.node(slug), self.predicate(predicate), object);
        self.triples.push(triple);
    }

    fn emit_type(&mut self, slug: &str, class: &str) {
        let class = RdfTerm::iri(self.predicate(class));
        self.triples
            .push(RdfTriple::new(self.node(slug), RDF_TYPE.to_string(), class));
    }

    fn emit_link(&mut self, slug: &str, predicate: &str, target: &str) {
        let target = RdfTerm::iri(self.node(target));
        self.emit(slug, predicate, target);
    }

    fn emit_optional(&mut self, slug: &str, predicate: &str, value: Option<RdfTerm>) {
        if let Some(value) = value {
            self.emit(slug, predicate, value);
        }
    }

    /// Queue `entity` for expansion followed by the link from `subject` to it.
    fn relate(&self, steps: &mut Vec<Step>, subject: &str, predicate: &'static str, entity: Entity) {
        let target = self.slug(entity);
        steps.push(Step::Expand(entity));
        steps.push(Step::Link {
            subject: subject.to_string(),
            predicate,
            target,
        });
    }

    fn link_sentinel(steps: &mut Vec<Step>, subject: &str, predicate: &'static str, sentinel: &str) {
        steps.push(Step::Link {
            subject: subject.to_string(),
            predicate,
            target: sentinel.to_string(),
        });
    }

    /// Emit the entity's own triples and return the steps for its relations,
    /// in emission order. Nothing is returned for an entity already visited.
    fn expand(&mut self, entity: Entity) -> Vec<Step> {
        let slug = self.slug(entity);
        if !self.enter(&slug) {
            return Vec::new();
        }

        match entity {
            Entity::Document(id) => self.expand_document(id, &slug),
            Entity::Person(id) => self.expand_person(id, &slug),
            Entity::Organization(id) => self.expand_organization(id, &slug),
            Entity::Venue(id) => self.expand_venue(id, &slug),
            Entity::Citation(id) => self.expand_citation(id, &slug),
            Entity::Acknowledgement(id) => self.expand_acknowledgement(id, &slug),
        }
    }

    fn expand_document(&mut self, id: DocumentId, slug: &str) -> Vec<Step> {
        debug!("Serializing paper '{}'", slug);

        let corpus = self.corpus;
        let document = corpus.document(id);
        self.emit_type(slug, "paper");
        self.emit(slug, "title", RdfTerm::literal(document.title.as_str()));
        self.emit(slug, "abstract", RdfTerm::literal(document.abstract_text.as_str()));
        self.emit(slug, "keywords", json_list(&document.keywords));
        self.emit_optional(
            slug,
            "cluster",
            document.cluster_id.map(|c| RdfTerm::typed(c.to_string(), XSD_INTEGER)),
        );
        self.emit_optional(slug, "topic", document.topic_label.as_deref().map(RdfTerm::literal));
        self.emit(
            slug,
            "is_primary",
            RdfTerm::typed(document.is_primary.to_string(), XSD_BOOLEAN),
        );

        let mut steps = Vec::new();
        for &author in &document.authors {
            self.relate(&mut steps, slug, "author", Entity::Person(author));
        }
        for &citation in &document.references {
            self.relate(&mut steps, slug, "citation", Entity::Citation(citation));
        }
        for &citation in &document.cited_by {
            self.relate(&mut steps, slug, "cited_by", Entity::Citation(citation));
        }
        if let Some(ack) = document.acknowledgement {
            self.relate(&mut steps, slug, "acknowledgement", Entity::Acknowledgement(ack));
        }
        match document.venue {
            Some(venue) => self.relate(&mut steps, slug, "journal", Entity::Venue(venue)),
            None => Self::link_sentinel(&mut steps, slug, "journal", NO_JOURNAL),
        }
        steps
    }

    fn expand_person(&mut self, id: PersonId, slug: &str) -> Vec<Step> {
        let corpus = self.corpus;
        let person = corpus.person(id);
        self.emit_type(slug, "author");
        self.emit_optional(slug, "forename", person.forename.as_deref().map(RdfTerm::literal));
        self.emit_optional(slug, "surname", person.surname.as_deref().map(RdfTerm::literal));
        self.emit_optional(slug, "email", person.email.as_deref().map(RdfTerm::literal));
        self.emit_optional(
            slug,
            "works_count",
            person.works_count.map(|n| RdfTerm::typed(n.to_string(), XSD_INTEGER)),
        );
        self.emit_optional(
            slug,
            "cited_by_count",
            person.cited_by_count.map(|n| RdfTerm::typed(n.to_string(), XSD_INTEGER)),
        );

        let mut steps = Vec::new();
        match person.affiliation {
            Some(org) => self.relate(&mut steps, slug, "affiliation", Entity::Organization(org)),
            None => Self::link_sentinel(&mut steps, slug, "affiliation", NO_AFFILIATION),
        }
        for &work in &person.works {
            self.relate(&mut steps, slug, "writes", Entity::Document(work));
        }
        for &ack in &person.acknowledged_in {
            self.relate(&mut steps, slug, "acknowledged_by", Entity::Acknowledgement(ack));
        }
        steps
    }

    fn expand_organization(&mut self, id: OrganizationId, slug: &str) -> Vec<Step> {
        let corpus = self.corpus;
        let organization = corpus.organization(id);
        self.emit_type(slug, "affiliation");
        self.emit(slug, "name", RdfTerm::literal(organization.name.as_str()));
        self.emit_optional(slug, "country", organization.country.as_deref().map(RdfTerm::literal));
        self.emit_optional(slug, "website", organization.website.as_deref().map(RdfTerm::literal));
        self.emit_optional(
            slug,
            "established",
            organization.established.map(|d| RdfTerm::typed(d.to_string(), XSD_DATE)),
        );

        let mut steps = Vec::new();
        for &ack in &organization.acknowledged_in {
            self.relate(&mut steps, slug, "acknowledged_by", Entity::Acknowledgement(ack));
        }
        steps
    }

    fn expand_venue(&mut self, id: VenueId, slug: &str) -> Vec<Step> {
        let corpus = self.corpus;
        let venue = corpus.venue(id);
        self.emit_type(slug, "journal");
        self.emit(slug, "name", RdfTerm::literal(venue.name.as_str()));
        self.emit_optional(slug, "country", venue.country.as_deref().map(RdfTerm::literal));
        self.emit_optional(slug, "description", venue.description.as_deref().map(RdfTerm::literal));
        self.emit_optional(
            slug,
            "established",
            venue.established.map(|d| RdfTerm::typed(d.to_string(), XSD_DATE)),
        );

        let mut steps = Vec::new();
        for &doc in &venue.publishes {
            self.relate(&mut steps, slug, "publishes", Entity::Document(doc));
        }
        steps
    }

    fn expand_citation(&mut self, id: CitationId, slug: &str) -> Vec<Step> {
        let corpus = self.corpus;
        let citation = corpus.citation(id);
        self.emit_type(slug, "citation");
        self.emit_optional(slug, "date", citation.date.as_deref().map(RdfTerm::literal));

        let mut steps = Vec::new();
        self.relate(&mut steps, slug, "source", Entity::Document(citation.source));
        self.relate(&mut steps, slug, "cites", Entity::Document(citation.cites));
        steps
    }

    fn expand_acknowledgement(&mut self, id: AcknowledgementId, slug: &str) -> Vec<Step> {
        let corpus = self.corpus;
        let acknowledgement = corpus.acknowledgement(id);
        self.emit_type(slug, "acknowledgement");
        self.emit(slug, "text", RdfTerm::literal(acknowledgement.text.as_str()));

        let mut steps = Vec::new();
        self.relate(&mut steps, slug, "source", Entity::Document(acknowledgement.source));
        for &person in &acknowledgement.recognized_people {
            self.relate(&mut steps, slug, "acknowledges_people", Entity::Person(person));
        }
        for &org in &acknowledgement.recognized_organizations {
            self.relate(&mut steps, slug, "acknowledges_org", Entity::Organization(org));
        }
        steps
    }
}

fn json_list(values: &[String]) -> RdfTerm {
    RdfTerm::literal(serde_json::Value::from(values.to_vec()).to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::extractor::{ExtractedAuthor, ExtractedDocument, ExtractedReference};

    fn paper(title: &str, cites: &[&str]) -> ExtractedDocument {
        ExtractedDocument {
            title: title.to_string(),
            keywords: vec!["graphs".to_string(), "rust".to_string()],
            authors: vec![ExtractedAuthor {
                forename: Some("J.".to_string()),
                surname: Some("Smith".to_string()),
                ..Default::default()
            }],
            references: cites
                .iter()
                .map(|t| ExtractedReference {
                    title: t.to_string(),
                    ..Default::default()
                })
                .collect(),
            ..Default::default()
        }
    }

    fn build(papers: Vec<ExtractedDocument>) -> Corpus {
        let mut corpus = Corpus::new();
        for p in papers {
            corpus.ingest(p, None);
        }
        corpus.link_citations();
        corpus.resolve_identities();
        corpus
    }

    fn types_of<'t>(triples: &'t [RdfTriple], class: &str) -> Vec<&'t str> {
        let class = format!("http://schema.org/{}", class);
        triples
            .iter()
            .filter(|t| t.predicate == RDF_TYPE && t.object.value() == class)
            .map(|t| t.subject.as_str())
            .collect()
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Deep  Learning: A Survey"), "deeplearningasurvey");
        assert_eq!(slugify("snake_case goes"), "snakecasegoes");
        assert_eq!(slugify("Ünïcode?!"), "ncode");
        assert_eq!(slugify("?!"), "unknown");
        assert_eq!(slugify(""), "unknown");
    }

    #[test]
    fn test_mutual_citations_terminate_with_one_type_triple_each() {
        let corpus = build(vec![paper("Alpha", &["Beta"]), paper("Beta", &["Alpha"])]);
        let schema = RdfSchema::default();
        let triples = GraphSerializer::new(&corpus, &schema).serialize();

        let papers = types_of(&triples, "paper");
        assert_eq!(papers, vec!["http://instances.com/alpha", "http://instances.com/beta"]);
        assert_eq!(types_of(&triples, "author"), vec!["http://instances.com/jsmith"]);
        assert_eq!(types_of(&triples, "citation").len(), 2);
        assert_eq!(types_of(&triples, "acknowledgement").len(), 2);

        let subjects: HashSet<&str> = triples
            .iter()
            .filter(|t| t.predicate == RDF_TYPE)
            .map(|t| t.subject.as_str())
            .collect();
        assert_eq!(subjects.len(), types_of(&triples, "paper").len() + 5);
    }

    #[test]
    fn test_long_citation_chain_serializes_without_deep_recursion() {
        const LENGTH: usize = 50_000;
        let mut corpus = Corpus::new();
        for i in 0..LENGTH {
            let references = if i + 1 < LENGTH {
                vec![ExtractedReference {
                    title: format!("Paper {}", i + 1),
                    ..Default::default()
                }]
            } else {
                Vec::new()
            };
            corpus.ingest(
                ExtractedDocument {
                    title: format!("Paper {}", i),
                    references,
                    ..Default::default()
                },
                None,
            );
        }
        corpus.link_citations();
        corpus.resolve_identities();

        let schema = RdfSchema::default();
        let triples = GraphSerializer::new(&corpus, &schema).serialize();

        assert_eq!(types_of(&triples, "paper").len(), LENGTH);
        assert_eq!(types_of(&triples, "citation").len(), LENGTH - 1);
        let last_cited = format!("http://instances.com/paper{}", LENGTH - 1);
        assert!(triples.iter().any(|t| t.subject == last_cited
            && t.predicate == "http://schema.org/cited_by"
            && t.object.value() == format!("http://instances.com/paper{}paper{}", LENGTH - 2, LENGTH - 1)));
    }

    #[test]
    fn test_related_entities_precede_the_link_to_them() {
        let corpus = build(vec![paper("Alpha", &["Gamma"])]);
        let schema = RdfSchema::default();
        let triples = GraphSerializer::new(&corpus, &schema).serialize();

        let position = |subject: &str, predicate: &str| {
            triples
                .iter()
                .position(|t| {
                    t.subject == format!("http://instances.com/{}", subject)
                        && t.predicate.ends_with(predicate)
                })
                .unwrap()
        };

        assert_eq!(position("alpha", "#type"), 0);
        assert!(position("jsmith", "#type") < position("alpha", "/author"));
        assert!(position("alphagamma", "#type") < position("gamma", "#type"));
        assert!(position("gamma", "#type") < position("alphagamma", "/cites"));
        assert!(position("alphagamma", "/cites") < position("alpha", "/citation"));
        assert!(position("alpha", "/citation") < position("alpha", "/journal"));
    }

    #[test]
    fn test_sentinels_get_links_but_no_nodes() {
        let corpus = build(vec![paper("Alpha", &[])]);
        let schema = RdfSchema::default();
        let triples = GraphSerializer::new(&corpus, &schema).serialize();

        let journal = triples
            .iter()
            .find(|t| t.predicate == "http://schema.org/journal")
            .unwrap();
        assert_eq!(journal.object.value(), "http://instances.com/no_journal");
        let affiliation = triples
            .iter()
            .find(|t| t.predicate == "http://schema.org/affiliation")
            .unwrap();
        assert_eq!(affiliation.object.value(), "http://instances.com/no_affiliation");

        assert!(types_of(&triples, "journal").is_empty());
        assert!(types_of(&triples, "affiliation").is_empty());
        assert!(!triples.iter().any(|t| t.subject.ends_with("/no_journal")));
    }

    #[test]
    fn test_literals_carry_datatypes_and_lists_are_json() {
        let mut corpus = build(vec![paper("Alpha", &["Gamma"])]);
        let alpha = corpus.find_document("alpha").unwrap();
        corpus.document_mut(alpha).cluster_id = Some(0);
        let schema = RdfSchema::default();
        let triples = GraphSerializer::new(&corpus, &schema).serialize();

        let object = |subject: &str, predicate: &str| {
            triples
                .iter()
                .find(|t| {
                    t.subject == format!("http://instances.com/{}", subject)
                        && t.predicate == format!("http://schema.org/{}", predicate)
                })
                .map(|t| t.object.clone())
        };

        assert_eq!(object("alpha", "keywords"), Some(RdfTerm::literal(r#"["graphs","rust"]"#)));
        assert_eq!(object("alpha", "cluster"), Some(RdfTerm::typed("0", XSD_INTEGER)));
        assert_eq!(object("alpha", "is_primary"), Some(RdfTerm::typed("true", XSD_BOOLEAN)));
        assert_eq!(object("gamma", "is_primary"), Some(RdfTerm::typed("false", XSD_BOOLEAN)));
        assert_eq!(object("gamma", "topic"), None);
        assert_eq!(object("jsmith", "email"), None);
        assert_eq!(
            object("alphagamma", "cites"),
            Some(RdfTerm::iri("http://instances.com/gamma"))
        );
    }

    #[test]
    fn test_person_slug_marks_missing_parts() {
        let mut corpus = Corpus::new();
        corpus.ingest(
            ExtractedDocument {
                title: "Alpha".to_string(),
                authors: vec![ExtractedAuthor {
                    surname: Some("Plato".to_string()),
                    ..Default::default()
                }],
                ..Default::default()
            },
            None,
        );
        corpus.link_citations();
        corpus.resolve_identities();

        let schema = RdfSchema::default();
        let serializer = GraphSerializer::new(&corpus, &schema);
        let person = corpus.canonical_persons()[0];
        assert_eq!(serializer.person_slug(person), "unknownplato");
    }
}
