use serde::Serialize;
use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::core::entities::{push_unique, Corpus, DocumentId};

/// Title-keyed document index that remembers insertion order.
#[derive(Debug, Default, Clone)]
pub struct TitleIndex {
    order: Vec<String>,
    by_title: HashMap<String, DocumentId>,
}

impl TitleIndex {
    pub fn get(&self, title: &str) -> Option<DocumentId> {
        self.by_title.get(title).copied()
    }

    /// Insert or replace; a replaced entry keeps its original position.
    pub fn insert(&mut self, title: String, id: DocumentId) -> Option<DocumentId> {
        let previous = self.by_title.insert(title.clone(), id);
        if previous.is_none() {
            self.order.push(title);
        }
        previous
    }

    pub fn ids(&self) -> impl Iterator<Item = DocumentId> + '_ {
        self.order.iter().filter_map(|title| self.by_title.get(title).copied())
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LinkSummary {
    pub primaries: usize,
    pub placeholders: usize,
    pub resolved_citations: usize,
    pub dangling_citations: usize,
}

impl Corpus {
    /// Point every citation at the one shared document for its title.
    ///
    /// The index is fully seeded with primaries before any reference is
    /// walked; otherwise a placeholder registered early would shadow the
    /// primary that arrives later.
    pub fn link_citations(&mut self) -> LinkSummary {
        let mut index = TitleIndex::default();
        for &doc_id in &self.primaries {
            let title = self.documents[doc_id.index()].title.clone();
            if let Some(previous) = index.insert(title.clone(), doc_id) {
                if previous != doc_id {
                    warn!("Duplicate primary document '{}', keeping the later one", title);
                }
            }
        }

        let surviving: Vec<DocumentId> = self
            .primaries
            .iter()
            .copied()
            .filter(|&id| index.get(&self.documents[id.index()].title) == Some(id))
            .collect();

        let mut summary = LinkSummary {
            primaries: index.len(),
            ..Default::default()
        };

        for doc_id in surviving {
            let references = self.documents[doc_id.index()].references.clone();
            for citation_id in references {
                let target = self.citations[citation_id.index()].cites;
                let title = self.documents[target.index()].title.clone();

                match index.get(&title) {
                    Some(indexed) => {
                        if indexed != target {
                            self.citations[citation_id.index()].cites = indexed;
                            push_unique(&mut self.documents[indexed.index()].cited_by, citation_id);
                        }
                        if self.documents[indexed.index()].is_primary {
                            summary.resolved_citations += 1;
                        } else {
                            summary.dangling_citations += 1;
                        }
                    }
                    None => {
                        debug!("Registering placeholder for '{}'", title);
                        index.insert(title, target);
                        summary.placeholders += 1;
                        summary.dangling_citations += 1;
                    }
                }
            }
        }

        info!(
            "Linked citations: {} primaries, {} placeholders, {} resolved, {} dangling",
            summary.primaries, summary.placeholders, summary.resolved_citations, summary.dangling_citations
        );

        self.index = index;
        summary
    }
}
