use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{debug, info};

use crate::config::{OutputFormat, RdfSchema};
use crate::core::serializer::slugify;
use crate::core::triple::{RdfTerm, RdfTriple, RDF_TYPE};
use crate::utils::serialization::RdfSerializer;

pub const IN_MEMORY: &str = ":memory:";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGraphConfig {
    pub storage_path: String,
}

impl Default for KnowledgeGraphConfig {
    fn default() -> Self {
        Self {
            storage_path: "knowledge_graph.json".to_string(),
        }
    }
}

/// Triple store persisted as a JSON array of triples.
pub struct KnowledgeGraph {
    triples: Vec<RdfTriple>,
    seen: HashSet<RdfTriple>,
    config: KnowledgeGraphConfig,
    schema: RdfSchema,
}

impl KnowledgeGraph {
    pub fn new(config: KnowledgeGraphConfig, schema: RdfSchema) -> Result<Self> {
        let triples: Vec<RdfTriple> = if config.storage_path != IN_MEMORY
            && Path::new(&config.storage_path).exists()
        {
            let content = fs::read_to_string(&config.storage_path)
                .with_context(|| format!("Failed to read knowledge graph file: {}", config.storage_path))?;

            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse knowledge graph JSON: {}", config.storage_path))?
        } else {
            Vec::new()
        };

        info!("Knowledge graph initialized with {} triples from: {}", triples.len(), config.storage_path);

        let seen = triples.iter().cloned().collect();
        Ok(Self {
            triples,
            seen,
            config,
            schema,
        })
    }

    pub fn in_memory(schema: RdfSchema) -> Self {
        Self {
            triples: Vec::new(),
            seen: HashSet::new(),
            config: KnowledgeGraphConfig {
                storage_path: IN_MEMORY.to_string(),
            },
            schema,
        }
    }

    pub fn triples(&self) -> &[RdfTriple] {
        &self.triples
    }

    fn save_to_disk(&self) -> Result<()> {
        if self.config.storage_path != IN_MEMORY {
            let json = serde_json::to_string_pretty(&self.triples)?;
            fs::write(&self.config.storage_path, json)
                .with_context(|| format!("Failed to save knowledge graph to: {}", self.config.storage_path))?;
        }
        Ok(())
    }

    /// Append triples not already stored, keeping their order, then persist.
    pub fn add_triples(&mut self, triples: &[RdfTriple]) -> Result<usize> {
        let mut added_count = 0;

        for triple in triples {
            if self.seen.insert(triple.clone()) {
                self.triples.push(triple.clone());
                added_count += 1;
                debug!("Added triple: {}", triple.to_ntriple());
            }
        }

        self.save_to_disk()?;

        info!("Added {} triples to knowledge graph", added_count);
        Ok(added_count)
    }

    fn type_iri(&self, entity_type: &str) -> String {
        if entity_type.starts_with("http") {
            entity_type.to_string()
        } else {
            format!("{}{}", self.schema.schema_namespace, entity_type)
        }
    }

    fn entity_iri(&self, entity: &str) -> String {
        if entity.starts_with("http") {
            entity.to_string()
        } else {
            format!("{}{}", self.schema.instance_namespace, entity)
        }
    }

    /// Subjects typed as `entity_type` (a local name like `paper` or a full IRI).
    pub fn get_entities_by_type(&self, entity_type: &str) -> Vec<String> {
        let type_iri = self.type_iri(entity_type);

        self.triples
            .iter()
            .filter(|t| t.predicate == RDF_TYPE && t.object.value() == type_iri)
            .map(|t| t.subject.clone())
            .collect()
    }

    /// Predicate to values for one node, in insertion order per predicate.
    pub fn get_entity_properties(&self, entity: &str) -> HashMap<String, Vec<String>> {
        let entity_iri = self.entity_iri(entity);
        let mut properties: HashMap<String, Vec<String>> = HashMap::new();

        for triple in self.triples.iter().filter(|t| t.subject == entity_iri) {
            properties
                .entry(triple.predicate.clone())
                .or_default()
                .push(triple.object.value().to_string());
        }

        properties
    }

    /// Nodes linked to `entity` in either direction, up to `max_depth` hops.
    pub fn find_related_entities(&self, entity: &str, max_depth: usize) -> Vec<String> {
        let start = self.entity_iri(entity);
        let mut related = Vec::new();
        let mut visited: HashSet<String> = HashSet::new();
        let mut to_visit = vec![(start, 0)];

        while let Some((current, depth)) = to_visit.pop() {
            if depth >= max_depth || !visited.insert(current.clone()) {
                continue;
            }

            for triple in &self.triples {
                if triple.predicate == RDF_TYPE {
                    continue;
                }
                let neighbour = match &triple.object {
                    RdfTerm::Iri { value } if triple.subject == current => value,
                    RdfTerm::Iri { value } if *value == current => &triple.subject,
                    _ => continue,
                };
                if !visited.contains(neighbour) && !related.contains(neighbour) {
                    related.push(neighbour.clone());
                    to_visit.push((neighbour.clone(), depth + 1));
                }
            }
        }

        related
    }

    /// The paper node for a title, found through its slug.
    pub fn find_paper_by_title(&self, title: &str) -> Option<String> {
        let iri = self.entity_iri(&slugify(title));
        let paper = self.type_iri("paper");

        self.triples
            .iter()
            .any(|t| t.subject == iri && t.predicate == RDF_TYPE && t.object.value() == paper)
            .then_some(iri)
    }

    pub fn get_statistics(&self) -> KnowledgeGraphStats {
        let mut unique_subjects = HashSet::new();
        let mut unique_predicates = HashSet::new();
        let mut unique_objects = HashSet::new();
        let mut entity_types: HashMap<String, usize> = HashMap::new();

        for triple in &self.triples {
            unique_subjects.insert(&triple.subject);
            unique_predicates.insert(&triple.predicate);
            unique_objects.insert(&triple.object);

            if triple.predicate == RDF_TYPE {
                let class = triple.object.value();
                let local = class
                    .strip_prefix(self.schema.schema_namespace.as_str())
                    .unwrap_or(class);
                *entity_types.entry(local.to_string()).or_default() += 1;
            }
        }

        KnowledgeGraphStats {
            total_triples: self.triples.len(),
            unique_subjects: unique_subjects.len(),
            unique_predicates: unique_predicates.len(),
            unique_objects: unique_objects.len(),
            entity_types,
        }
    }

    pub fn export_to_file(&self, file_path: &Path, format: OutputFormat) -> Result<()> {
        let content = RdfSerializer::new(&self.schema).serialize(&self.triples, format)?;
        fs::write(file_path, content)
            .with_context(|| format!("Failed to create export file: {}", file_path.display()))?;

        info!("Knowledge graph exported to: {} (format: {:?})", file_path.display(), format);
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeGraphStats {
    pub total_triples: usize,
    pub unique_subjects: usize,
    pub unique_predicates: usize,
    pub unique_objects: usize,
    pub entity_types: HashMap<String, usize>,
}

impl std::fmt::Display for KnowledgeGraphStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f,
            "Knowledge Graph Statistics:\n\
             Total Triples: {}\n\
             Unique Subjects: {}\n\
             Unique Predicates: {}\n\
             Unique Objects: {}",
            self.total_triples,
            self.unique_subjects,
            self.unique_predicates,
            self.unique_objects
        )?;

        let mut types: Vec<_> = self.entity_types.iter().collect();
        types.sort();
        for (class, count) in types {
            write!(f, "\n  {}: {}", class, count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn link(subject: &str, predicate: &str, object: &str) -> RdfTriple {
        RdfTriple::new(
            format!("http://instances.com/{}", subject),
            format!("http://schema.org/{}", predicate),
            RdfTerm::iri(format!("http://instances.com/{}", object)),
        )
    }

    fn typed(subject: &str, class: &str) -> RdfTriple {
        RdfTriple::new(
            format!("http://instances.com/{}", subject),
            RDF_TYPE.to_string(),
            RdfTerm::iri(format!("http://schema.org/{}", class)),
        )
    }

    fn sample() -> Vec<RdfTriple> {
        vec![
            typed("alpha", "paper"),
            typed("beta", "paper"),
            typed("jsmith", "author"),
            link("alpha", "author", "jsmith"),
            link("jsmith", "writes", "alpha"),
            link("alphabeta", "cites", "beta"),
            link("alpha", "citation", "alphabeta"),
            RdfTriple::new(
                "http://instances.com/alpha".to_string(),
                "http://schema.org/title".to_string(),
                RdfTerm::literal("alpha"),
            ),
        ]
    }

    #[test]
    fn test_add_triples_deduplicates() {
        let mut kg = KnowledgeGraph::in_memory(RdfSchema::default());
        assert_eq!(kg.add_triples(&sample()).unwrap(), 8);
        assert_eq!(kg.add_triples(&sample()).unwrap(), 0);
        assert_eq!(kg.triples().len(), 8);
    }

    #[test]
    fn test_queries() {
        let mut kg = KnowledgeGraph::in_memory(RdfSchema::default());
        kg.add_triples(&sample()).unwrap();

        assert_eq!(
            kg.get_entities_by_type("paper"),
            vec!["http://instances.com/alpha", "http://instances.com/beta"]
        );

        let properties = kg.get_entity_properties("alpha");
        assert_eq!(properties["http://schema.org/title"], vec!["alpha"]);

        let related = kg.find_related_entities("alpha", 1);
        assert!(related.contains(&"http://instances.com/jsmith".to_string()));
        assert!(!related.contains(&"http://instances.com/beta".to_string()));
        let related = kg.find_related_entities("alpha", 2);
        assert!(related.contains(&"http://instances.com/beta".to_string()));

        assert_eq!(
            kg.find_paper_by_title("Alpha"),
            Some("http://instances.com/alpha".to_string())
        );
        assert_eq!(kg.find_paper_by_title("J Smith"), None);
    }

    #[test]
    fn test_statistics_count_types() {
        let mut kg = KnowledgeGraph::in_memory(RdfSchema::default());
        kg.add_triples(&sample()).unwrap();
        let stats = kg.get_statistics();
        assert_eq!(stats.total_triples, 8);
        assert_eq!(stats.entity_types["paper"], 2);
        assert!(stats.to_string().contains("author: 1"));
    }

    #[test]
    fn test_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("kg.json");
        let config = KnowledgeGraphConfig {
            storage_path: path.display().to_string(),
        };

        let mut kg = KnowledgeGraph::new(config.clone(), RdfSchema::default()).unwrap();
        kg.add_triples(&sample()).unwrap();

        let mut reloaded = KnowledgeGraph::new(config, RdfSchema::default()).unwrap();
        assert_eq!(reloaded.triples(), sample().as_slice());
        assert_eq!(reloaded.add_triples(&sample()).unwrap(), 0);
    }

    #[test]
    fn test_export_writes_requested_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.nt");
        let mut kg = KnowledgeGraph::in_memory(RdfSchema::default());
        kg.add_triples(&sample()).unwrap();

        kg.export_to_file(&path, OutputFormat::NTriples).unwrap();
        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content.lines().count(), 8);
    }
}
