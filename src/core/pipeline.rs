use anyhow::Result;
use chrono::{DateTime, Utc};
use indicatif::ProgressBar;
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Configuration;
use crate::core::entities::Corpus;
use crate::core::extractor::TeiExtractor;
use crate::core::linker::LinkSummary;
use crate::core::resolver::ResolutionSummary;
use crate::core::serializer::GraphSerializer;
use crate::core::triple::RdfTriple;
use crate::enrichment::{EnrichmentSummary, KnowledgeBase, SemanticAnnotator};
use crate::handlers::{TeiHandler, TeiSource};

#[derive(Debug, Clone, Serialize)]
pub struct BuildResult {
    pub id: String,
    pub triples: Vec<RdfTriple>,
    pub sources: Vec<String>,
    pub build_timestamp: DateTime<Utc>,
    pub processing_time_seconds: f64,
    pub link_summary: LinkSummary,
    pub resolution_summary: ResolutionSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment_summary: Option<EnrichmentSummary>,
    pub metadata: HashMap<String, String>,
    pub errors: Vec<String>,
    pub config_name: String,
}

impl BuildResult {
    fn new(config_name: String) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            triples: Vec::new(),
            sources: Vec::new(),
            build_timestamp: Utc::now(),
            processing_time_seconds: 0.0,
            link_summary: LinkSummary::default(),
            resolution_summary: ResolutionSummary::default(),
            enrichment_summary: None,
            metadata: HashMap::new(),
            errors: Vec::new(),
            config_name,
        }
    }
}

/// Runs read, extract, link, annotate, resolve, enrich and serialize over a
/// whole corpus, one phase after the other.
pub struct CorpusBuilder {
    config: Configuration,
    handler: TeiHandler,
    extractor: TeiExtractor,
    annotator: Option<Box<dyn SemanticAnnotator>>,
    knowledge_base: Option<Box<dyn KnowledgeBase>>,
    progress: Option<ProgressBar>,
}

impl CorpusBuilder {
    pub fn new(config: Configuration) -> Self {
        Self {
            config,
            handler: TeiHandler::new(),
            extractor: TeiExtractor::new(),
            annotator: None,
            knowledge_base: None,
            progress: None,
        }
    }

    pub fn with_annotator(mut self, annotator: Box<dyn SemanticAnnotator>) -> Self {
        self.annotator = Some(annotator);
        self
    }

    pub fn with_knowledge_base(mut self, knowledge_base: Box<dyn KnowledgeBase>) -> Self {
        self.knowledge_base = Some(knowledge_base);
        self
    }

    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Build from files and directories of TEI markup. Unreadable files are
    /// reported in the result and skipped.
    pub async fn build(&self, inputs: &[PathBuf]) -> Result<BuildResult> {
        let start_time = Instant::now();
        let files = self.handler.discover(inputs)?;
        info!("Building knowledge graph from {} TEI files", files.len());

        let mut sources = Vec::with_capacity(files.len());
        let mut errors = Vec::new();
        for read in self.handler.read_all(&files).await {
            match read {
                Ok(source) => sources.push(source),
                Err(e) => {
                    warn!("{:#}", e);
                    errors.push(format!("{:#}", e));
                }
            }
        }

        let mut result = self.build_from_sources(sources).await;
        errors.append(&mut result.errors);
        result.errors = errors;
        result.processing_time_seconds = start_time.elapsed().as_secs_f64();
        Ok(result)
    }

    pub async fn build_from_sources(&self, sources: Vec<TeiSource>) -> BuildResult {
        let start_time = Instant::now();
        let mut result = BuildResult::new(self.config.name.clone());

        let mut corpus = Corpus::new();
        for source in sources {
            let extracted = self.extractor.extract(&source.markup);
            if extracted.title.is_empty() {
                let message = format!("No title found in {}", source.source);
                warn!("{}", message);
                result.errors.push(message);
            }
            corpus.ingest(extracted, Some(source.source.clone()));
            result.sources.push(source.source);
        }

        result.link_summary = corpus.link_citations();

        if let Some(annotator) = &self.annotator {
            let labeled = corpus.apply_topics(annotator.as_ref()).await;
            let recognized = corpus.recognize_acknowledgement_entities(annotator.as_ref()).await;
            result.metadata.insert("topics_assigned".to_string(), labeled.to_string());
            result.metadata.insert("entities_recognized".to_string(), recognized.to_string());
        }

        result.resolution_summary = corpus.resolve_identities();

        if let Some(knowledge_base) = &self.knowledge_base {
            let summary = corpus.enrich(knowledge_base.as_ref(), self.progress.as_ref()).await;
            result.enrichment_summary = Some(summary);
        }

        result.triples = GraphSerializer::new(&corpus, &self.config.rdf_schema).serialize();

        result.metadata.insert("documents".to_string(), corpus.indexed_documents().len().to_string());
        result.metadata.insert("primaries".to_string(), result.link_summary.primaries.to_string());
        result.metadata.insert("placeholders".to_string(), result.link_summary.placeholders.to_string());
        result.metadata.insert("triple_count".to_string(), result.triples.len().to_string());
        result.processing_time_seconds = start_time.elapsed().as_secs_f64();

        info!(
            "Built {} triples from {} documents in {:.2}s",
            result.triples.len(),
            result.sources.len(),
            result.processing_time_seconds
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tei(title: &str, cites: &[&str]) -> TeiSource {
        let references: String = cites
            .iter()
            .map(|t| format!("<biblStruct><analytic><title>{}</title></analytic></biblStruct>", t))
            .collect();
        TeiSource {
            source: format!("{}.xml", title),
            markup: format!(
                "<TEI><teiHeader><fileDesc><titleStmt><title>{}</title></titleStmt></fileDesc></teiHeader>\
                 <text><back><div><listBibl>{}</listBibl></div></back></text></TEI>",
                title, references
            ),
            metadata: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn test_build_from_sources_links_and_serializes() {
        let builder = CorpusBuilder::new(Configuration::default());
        let result = builder
            .build_from_sources(vec![tei("Alpha", &["Beta", "Gamma"]), tei("Beta", &["Alpha"])])
            .await;

        assert!(result.errors.is_empty());
        assert_eq!(result.sources, vec!["Alpha.xml", "Beta.xml"]);
        assert_eq!(result.link_summary.primaries, 2);
        assert_eq!(result.link_summary.placeholders, 1);
        assert_eq!(result.metadata.get("documents").map(String::as_str), Some("3"));
        assert!(result
            .triples
            .iter()
            .any(|t| t.subject == "http://instances.com/gamma"));
    }

    #[tokio::test]
    async fn test_untitled_documents_are_reported() {
        let builder = CorpusBuilder::new(Configuration::default());
        let result = builder
            .build_from_sources(vec![TeiSource {
                source: "broken.xml".to_string(),
                markup: "<not-tei".to_string(),
                metadata: HashMap::new(),
            }])
            .await;
        assert_eq!(result.errors, vec!["No title found in broken.xml"]);
    }
}
