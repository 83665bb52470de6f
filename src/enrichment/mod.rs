//! Optional collaborators that add topics, acknowledged entities and
//! knowledge-base facts to a corpus. Every failure here is logged and
//! leaves the affected fields unset.

pub mod annotator;
pub mod knowledge_base;

pub use annotator::{SemanticAnnotator, TopicAssignment, VllmAnnotator};
pub use knowledge_base::{
    KnowledgeBase, KnowledgeBaseClient, OrganizationFacts, PersonFacts, VenueFacts,
};

use indicatif::ProgressBar;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::entities::{Corpus, DocumentId, OrganizationId, PersonId, VenueId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EnrichmentSummary {
    pub persons: usize,
    pub organizations: usize,
    pub venues: usize,
    pub failures: usize,
}

impl Corpus {
    /// Primaries reachable through the index that carry an abstract.
    fn annotatable_primaries(&self) -> Vec<DocumentId> {
        self.indexed_documents()
            .into_iter()
            .filter(|&id| {
                let document = self.document(id);
                document.is_primary && !document.abstract_text.is_empty()
            })
            .collect()
    }

    /// Ask the annotator for topics of every primary abstract and store the
    /// cluster id and label. Returns the number of documents labeled.
    pub async fn apply_topics(&mut self, annotator: &dyn SemanticAnnotator) -> usize {
        let documents = self.annotatable_primaries();
        let abstracts: Vec<&str> = documents
            .iter()
            .map(|&id| self.document(id).abstract_text.as_str())
            .collect();

        let assignments = match annotator.assign_topics(&abstracts).await {
            Ok(assignments) => assignments,
            Err(e) => {
                warn!("Topic assignment failed, leaving topics unset: {:#}", e);
                return 0;
            }
        };

        if assignments.len() != documents.len() {
            warn!(
                "Annotator returned {} topics for {} abstracts",
                assignments.len(),
                documents.len()
            );
        }

        let mut labeled = 0;
        for (&doc_id, assignment) in documents.iter().zip(assignments) {
            let document = self.document_mut(doc_id);
            document.cluster_id = Some(assignment.cluster_id);
            document.topic_label = Some(assignment.topic_label);
            labeled += 1;
        }

        info!("Assigned topics to {} documents", labeled);
        labeled
    }

    /// Recognize people and organizations in every primary acknowledgement.
    /// Must run before identity resolution so the new mentions get merged.
    pub async fn recognize_acknowledgement_entities(
        &mut self,
        annotator: &dyn SemanticAnnotator,
    ) -> usize {
        let acknowledgements: Vec<_> = self
            .indexed_documents()
            .into_iter()
            .filter(|&id| self.document(id).is_primary)
            .filter_map(|id| self.document(id).acknowledgement)
            .collect();

        let mut recognized = 0;
        for ack_id in acknowledgements {
            let text = self.acknowledgement(ack_id).text.clone();
            if text.is_empty() {
                continue;
            }

            match annotator.recognize_entities(&text).await {
                Ok(spans) => {
                    recognized += spans.len();
                    self.add_recognized_entities(ack_id, &spans);
                }
                Err(e) => warn!("Entity recognition failed for an acknowledgement: {:#}", e),
            }
        }

        info!("Recognized {} entities in acknowledgements", recognized);
        recognized
    }

    pub fn enrich_person(&mut self, id: PersonId, facts: PersonFacts) {
        let person = self.person_mut(id);
        if facts.works_count.is_some() {
            person.works_count = facts.works_count;
        }
        if facts.cited_by_count.is_some() {
            person.cited_by_count = facts.cited_by_count;
        }
    }

    pub fn enrich_organization(&mut self, id: OrganizationId, facts: OrganizationFacts) {
        let organization = self.organization_mut(id);
        if facts.website.is_some() {
            organization.website = facts.website;
        }
        if facts.established.is_some() {
            organization.established = facts.established;
        }
    }

    pub fn enrich_venue(&mut self, id: VenueId, facts: VenueFacts) {
        let venue = self.venue_mut(id);
        if facts.country.is_some() {
            venue.country = facts.country;
        }
        if facts.description.is_some() {
            venue.description = facts.description;
        }
        if facts.established.is_some() {
            venue.established = facts.established;
        }
    }

    /// Look up every canonical person, organization and venue. Persons need
    /// both name parts; entities with empty names are skipped.
    pub async fn enrich(
        &mut self,
        knowledge_base: &dyn KnowledgeBase,
        progress: Option<&ProgressBar>,
    ) -> EnrichmentSummary {
        let persons = self.canonical_persons().to_vec();
        let organizations = self.canonical_organizations().to_vec();
        let venues = self.canonical_venues().to_vec();

        if let Some(pb) = progress {
            pb.set_length((persons.len() + organizations.len() + venues.len()) as u64);
        }

        let mut summary = EnrichmentSummary::default();

        for id in persons {
            tick(progress, "authors");
            let person = self.person(id);
            let (Some(forename), Some(surname)) = (person.forename.clone(), person.surname.clone())
            else {
                continue;
            };
            match knowledge_base.person_facts(&forename, &surname).await {
                Ok(Some(facts)) => {
                    self.enrich_person(id, facts);
                    summary.persons += 1;
                }
                Ok(None) => debug!("No knowledge base entry for {} {}", forename, surname),
                Err(e) => {
                    warn!("Lookup failed for {} {}: {:#}", forename, surname, e);
                    summary.failures += 1;
                }
            }
        }

        for id in organizations {
            tick(progress, "affiliations");
            let name = self.organization(id).name.clone();
            if name.trim().is_empty() {
                continue;
            }
            match knowledge_base.organization_facts(&name).await {
                Ok(Some(facts)) => {
                    self.enrich_organization(id, facts);
                    summary.organizations += 1;
                }
                Ok(None) => debug!("No knowledge base entry for '{}'", name),
                Err(e) => {
                    warn!("Lookup failed for '{}': {:#}", name, e);
                    summary.failures += 1;
                }
            }
        }

        for id in venues {
            tick(progress, "journals");
            let name = self.venue(id).name.clone();
            if name.trim().is_empty() {
                continue;
            }
            match knowledge_base.venue_facts(&name).await {
                Ok(Some(facts)) => {
                    self.enrich_venue(id, facts);
                    summary.venues += 1;
                }
                Ok(None) => debug!("No knowledge base entry for '{}'", name),
                Err(e) => {
                    warn!("Lookup failed for '{}': {:#}", name, e);
                    summary.failures += 1;
                }
            }
        }

        if let Some(pb) = progress {
            pb.finish_with_message("enrichment done");
        }

        info!(
            "Enriched {} persons, {} organizations, {} venues ({} lookups failed)",
            summary.persons, summary.organizations, summary.venues, summary.failures
        );
        summary
    }
}

fn tick(progress: Option<&ProgressBar>, stage: &'static str) {
    if let Some(pb) = progress {
        pb.set_message(stage);
        pb.inc(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::entities::{EntitySpan, SpanLabel};
    use crate::core::extractor::{ExtractedAuthor, ExtractedDocument};
    use anyhow::Result;
    use async_trait::async_trait;
    use chrono::NaiveDate;

    struct FixedAnnotator;

    #[async_trait]
    impl SemanticAnnotator for FixedAnnotator {
        async fn assign_topics(&self, abstracts: &[&str]) -> Result<Vec<TopicAssignment>> {
            Ok(annotator::cluster_by_label(
                abstracts
                    .iter()
                    .map(|a| if a.contains("graph") { "graphs" } else { "other" }.to_string())
                    .collect(),
            ))
        }

        async fn recognize_entities(&self, text: &str) -> Result<Vec<EntitySpan>> {
            Ok(text
                .find("Research Council")
                .map(|start| EntitySpan {
                    label: SpanLabel::Organization,
                    start,
                    end: start + "Research Council".len(),
                })
                .into_iter()
                .collect())
        }
    }

    struct FailingAnnotator;

    #[async_trait]
    impl SemanticAnnotator for FailingAnnotator {
        async fn assign_topics(&self, _: &[&str]) -> Result<Vec<TopicAssignment>> {
            anyhow::bail!("model offline")
        }

        async fn recognize_entities(&self, _: &str) -> Result<Vec<EntitySpan>> {
            anyhow::bail!("model offline")
        }
    }

    struct StubKnowledgeBase;

    #[async_trait]
    impl KnowledgeBase for StubKnowledgeBase {
        async fn person_facts(&self, forename: &str, _: &str) -> Result<Option<PersonFacts>> {
            match forename {
                "Ada" => Ok(Some(PersonFacts {
                    works_count: Some(3),
                    cited_by_count: None,
                })),
                "Broken" => anyhow::bail!("timeout"),
                _ => Ok(None),
            }
        }

        async fn organization_facts(&self, _: &str) -> Result<Option<OrganizationFacts>> {
            Ok(Some(OrganizationFacts {
                website: Some("https://example.org".to_string()),
                established: NaiveDate::from_ymd_opt(1900, 1, 1),
            }))
        }

        async fn venue_facts(&self, _: &str) -> Result<Option<VenueFacts>> {
            Ok(None)
        }
    }

    fn corpus() -> Corpus {
        let mut corpus = Corpus::new();
        for (title, abstract_text, forename) in [
            ("Alpha", "A graph study.", "Ada"),
            ("Beta", "Something else.", "Broken"),
            ("Gamma", "", "Carl"),
        ] {
            corpus.ingest(
                ExtractedDocument {
                    title: title.to_string(),
                    abstract_text: abstract_text.to_string(),
                    authors: vec![ExtractedAuthor {
                        forename: Some(forename.to_string()),
                        surname: Some("Tester".to_string()),
                        affiliation_name: Some("Lab".to_string()),
                        ..Default::default()
                    }],
                    acknowledgement: "Supported by the Research Council.".to_string(),
                    venue: Some("Journal".to_string()),
                    ..Default::default()
                },
                None,
            );
        }
        corpus.link_citations();
        corpus
    }

    #[tokio::test]
    async fn test_topics_only_for_primaries_with_abstracts() {
        let mut corpus = corpus();
        assert_eq!(corpus.apply_topics(&FixedAnnotator).await, 2);

        let alpha = corpus.document(corpus.find_document("alpha").unwrap());
        assert_eq!(alpha.cluster_id, Some(0));
        assert_eq!(alpha.topic_label.as_deref(), Some("graphs"));
        let beta = corpus.document(corpus.find_document("beta").unwrap());
        assert_eq!(beta.cluster_id, Some(1));
        let gamma = corpus.document(corpus.find_document("gamma").unwrap());
        assert_eq!(gamma.cluster_id, None);
    }

    #[tokio::test]
    async fn test_annotator_failure_leaves_fields_unset() {
        let mut corpus = corpus();
        assert_eq!(corpus.apply_topics(&FailingAnnotator).await, 0);
        assert_eq!(corpus.recognize_acknowledgement_entities(&FailingAnnotator).await, 0);

        let alpha = corpus.document(corpus.find_document("alpha").unwrap());
        assert_eq!(alpha.topic_label, None);
        let ack = alpha.acknowledgement.unwrap();
        assert!(corpus.acknowledgement(ack).recognized_organizations.is_empty());
    }

    #[tokio::test]
    async fn test_recognized_organizations_merge_on_resolution() {
        let mut corpus = corpus();
        assert_eq!(corpus.recognize_acknowledgement_entities(&FixedAnnotator).await, 3);
        corpus.resolve_identities();

        // One shared lab plus one shared council.
        assert_eq!(corpus.canonical_organizations().len(), 2);
        let council = corpus.canonical_organizations()[1];
        assert_eq!(corpus.organization(council).name, "Research Council");
        assert_eq!(corpus.organization(council).acknowledged_in.len(), 3);
    }

    #[tokio::test]
    async fn test_enrich_applies_facts_and_survives_failures() {
        let mut corpus = corpus();
        corpus.resolve_identities();
        let summary = corpus.enrich(&StubKnowledgeBase, None).await;

        assert_eq!(summary.persons, 1);
        assert_eq!(summary.failures, 1);
        assert_eq!(summary.organizations, 1);
        assert_eq!(summary.venues, 0);

        let ada = corpus.canonical_persons()[0];
        assert_eq!(corpus.person(ada).works_count, Some(3));
        assert_eq!(corpus.person(ada).cited_by_count, None);

        let lab = corpus.canonical_organizations()[0];
        assert_eq!(corpus.organization(lab).website.as_deref(), Some("https://example.org"));
        let venue = corpus.canonical_venues()[0];
        assert_eq!(corpus.venue(venue).country, None);
    }
}
