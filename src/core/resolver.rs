use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info};

use crate::core::entities::{push_unique, Corpus, DocumentId, OrganizationId, PersonId, VenueId};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ResolutionSummary {
    pub persons: usize,
    pub organizations: usize,
    pub venues: usize,
    pub merged_mentions: usize,
}

impl Corpus {
    /// Merge duplicate persons, organizations and venues over the indexed
    /// documents and repoint every reference at the canonical instance.
    ///
    /// Runs after [`Corpus::link_citations`] so placeholders take part.
    pub fn resolve_identities(&mut self) -> ResolutionSummary {
        let documents = self.indexed_documents();

        let merged_persons = self.resolve_persons(&documents);
        let merged_organizations = self.resolve_organizations(&documents);
        let merged_venues = self.resolve_venues(&documents);

        let summary = ResolutionSummary {
            persons: self.canonical_persons.len(),
            organizations: self.canonical_organizations.len(),
            venues: self.canonical_venues.len(),
            merged_mentions: merged_persons + merged_organizations + merged_venues,
        };

        info!(
            "Resolved identities: {} persons, {} organizations, {} venues ({} mentions merged)",
            summary.persons, summary.organizations, summary.venues, summary.merged_mentions
        );
        summary
    }

    fn resolve_persons(&mut self, documents: &[DocumentId]) -> usize {
        let mut canonical: Vec<PersonId> = Vec::new();
        let mut merged = 0;

        for &doc_id in documents {
            let authors = self.documents[doc_id.index()].authors.clone();
            for (slot, mention) in authors.into_iter().enumerate() {
                let resolved = self.canonical_person(&mut canonical, mention);
                if resolved != mention {
                    self.documents[doc_id.index()].authors[slot] = resolved;
                    push_unique(&mut self.persons[resolved.index()].works, doc_id);
                    self.absorb_person(resolved, mention);
                    merged += 1;
                }
            }

            let Some(ack_id) = self.documents[doc_id.index()].acknowledgement else {
                continue;
            };
            let people = self.acknowledgements[ack_id.index()].recognized_people.clone();
            for (slot, mention) in people.into_iter().enumerate() {
                let resolved = self.canonical_person(&mut canonical, mention);
                if resolved != mention {
                    self.acknowledgements[ack_id.index()].recognized_people[slot] = resolved;
                    self.absorb_person(resolved, mention);
                    merged += 1;
                }
            }
        }

        self.canonical_persons = canonical;
        merged
    }

    /// Equality scan keeps first-seen order, which decides the canonical.
    fn canonical_person(&self, canonical: &mut Vec<PersonId>, mention: PersonId) -> PersonId {
        let person = &self.persons[mention.index()];
        if let Some(&existing) = canonical
            .iter()
            .find(|&&id| self.persons[id.index()].same_identity(person))
        {
            return existing;
        }
        canonical.push(mention);
        mention
    }

    fn absorb_person(&mut self, canonical: PersonId, mention: PersonId) {
        let acknowledged = std::mem::take(&mut self.persons[mention.index()].acknowledged_in);
        for ack_id in acknowledged {
            push_unique(&mut self.persons[canonical.index()].acknowledged_in, ack_id);
        }
        debug!("Merged person mention into '{}'", self.persons[canonical.index()].display_name());
    }

    fn resolve_organizations(&mut self, documents: &[DocumentId]) -> usize {
        let mut by_name: HashMap<String, OrganizationId> = HashMap::new();
        let mut order: Vec<OrganizationId> = Vec::new();
        let mut merged = 0;

        for &doc_id in documents {
            let authors = self.documents[doc_id.index()].authors.clone();
            for person_id in authors {
                let Some(org_id) = self.persons[person_id.index()].affiliation else {
                    continue;
                };
                let resolved = self.canonical_organization(&mut by_name, &mut order, org_id);
                if resolved != org_id {
                    self.persons[person_id.index()].affiliation = Some(resolved);
                    self.absorb_organization(resolved, org_id);
                    merged += 1;
                }
            }

            let Some(ack_id) = self.documents[doc_id.index()].acknowledgement else {
                continue;
            };
            let organizations = self.acknowledgements[ack_id.index()].recognized_organizations.clone();
            for (slot, org_id) in organizations.into_iter().enumerate() {
                let resolved = self.canonical_organization(&mut by_name, &mut order, org_id);
                if resolved != org_id {
                    self.acknowledgements[ack_id.index()].recognized_organizations[slot] = resolved;
                    self.absorb_organization(resolved, org_id);
                    merged += 1;
                }
            }
        }

        self.canonical_organizations = order;
        merged
    }

    fn canonical_organization(
        &self,
        by_name: &mut HashMap<String, OrganizationId>,
        order: &mut Vec<OrganizationId>,
        org_id: OrganizationId,
    ) -> OrganizationId {
        let name = &self.organizations[org_id.index()].name;
        if let Some(&existing) = by_name.get(name) {
            return existing;
        }
        by_name.insert(name.clone(), org_id);
        order.push(org_id);
        org_id
    }

    fn absorb_organization(&mut self, canonical: OrganizationId, duplicate: OrganizationId) {
        let acknowledged = std::mem::take(&mut self.organizations[duplicate.index()].acknowledged_in);
        for ack_id in acknowledged {
            push_unique(&mut self.organizations[canonical.index()].acknowledged_in, ack_id);
        }
    }

    fn resolve_venues(&mut self, documents: &[DocumentId]) -> usize {
        let mut canonical: Vec<VenueId> = Vec::new();
        let mut merged = 0;

        for &doc_id in documents {
            let Some(venue_id) = self.documents[doc_id.index()].venue else {
                continue;
            };

            let name = &self.venues[venue_id.index()].name;
            let existing = canonical
                .iter()
                .copied()
                .find(|&id| &self.venues[id.index()].name == name);

            match existing {
                Some(resolved) if resolved != venue_id => {
                    self.documents[doc_id.index()].venue = Some(resolved);
                    push_unique(&mut self.venues[resolved.index()].publishes, doc_id);
                    merged += 1;
                }
                Some(_) => {}
                None => canonical.push(venue_id),
            }
        }

        self.canonical_venues = canonical;
        merged
    }
}
