use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use anyhow::{Result, Context};
use url::Url;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Configuration {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub rdf_schema: RdfSchema,
    #[serde(default)]
    pub conversion: ConversionSettings,
    #[serde(default)]
    pub enrichment: EnrichmentSettings,
    #[serde(default)]
    pub annotator: AnnotatorSettings,
    #[serde(default = "default_output_format")]
    pub output_format: OutputFormat,
}

/// Namespaces for predicates/types (`schema_namespace`) and nodes (`instance_namespace`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RdfSchema {
    #[serde(default = "default_schema_namespace")]
    pub schema_namespace: String,
    #[serde(default = "default_instance_namespace")]
    pub instance_namespace: String,
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_instance_prefix")]
    pub instance_prefix: String,
}

impl Default for RdfSchema {
    fn default() -> Self {
        Self {
            schema_namespace: default_schema_namespace(),
            instance_namespace: default_instance_namespace(),
            prefix: default_prefix(),
            instance_prefix: default_instance_prefix(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum OutputFormat {
    Turtle,
    JsonLd,
    NTriples,
    RdfXml,
    Json,
}

impl std::str::FromStr for OutputFormat {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "turtle" | "ttl" => Ok(OutputFormat::Turtle),
            "json-ld" | "jsonld" => Ok(OutputFormat::JsonLd),
            "n-triples" | "ntriples" | "nt" => Ok(OutputFormat::NTriples),
            "rdf-xml" | "rdfxml" | "xml" => Ok(OutputFormat::RdfXml),
            "json" => Ok(OutputFormat::Json),
            other => anyhow::bail!(
                "Unsupported output format: {}. Supported: turtle, json-ld, n-triples, rdf-xml, json",
                other
            ),
        }
    }
}

/// GROBID conversion service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversionSettings {
    #[serde(default = "default_grobid_url")]
    pub base_url: String,
    #[serde(default = "default_true")]
    pub consolidate_header: bool,
    #[serde(default = "default_true")]
    pub consolidate_citations: bool,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            base_url: default_grobid_url(),
            consolidate_header: true,
            consolidate_citations: true,
            timeout: default_timeout(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentSettings {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default = "default_openalex_url")]
    pub openalex_url: String,
    #[serde(default = "default_wikidata_url")]
    pub wikidata_url: String,
    #[serde(default = "default_lookup_timeout")]
    pub timeout: u64,
    /// Contact address sent to OpenAlex for its polite pool.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mailto: Option<String>,
}

impl Default for EnrichmentSettings {
    fn default() -> Self {
        Self {
            enabled: false,
            openalex_url: default_openalex_url(),
            wikidata_url: default_wikidata_url(),
            timeout: default_lookup_timeout(),
            mailto: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnnotatorSettings {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_settings: Option<LlmSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    pub base_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    pub model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_timeout")]
    pub timeout: u64,
}

fn default_version() -> String { "1.0".to_string() }
fn default_schema_namespace() -> String { "http://schema.org/".to_string() }
fn default_instance_namespace() -> String { "http://instances.com/".to_string() }
fn default_prefix() -> String { "schema".to_string() }
fn default_instance_prefix() -> String { "inst".to_string() }
fn default_output_format() -> OutputFormat { OutputFormat::Turtle }
fn default_grobid_url() -> String { "http://localhost:8070".to_string() }
fn default_openalex_url() -> String { "https://api.openalex.org".to_string() }
fn default_wikidata_url() -> String { "https://query.wikidata.org/sparql".to_string() }
fn default_temperature() -> f32 { 0.1 }
fn default_max_tokens() -> u32 { 2048 }
fn default_timeout() -> u64 { 120 }
fn default_lookup_timeout() -> u64 { 30 }
fn default_true() -> bool { true }

impl Default for Configuration {
    fn default() -> Self {
        Self {
            name: "Scholarly Knowledge Graph".to_string(),
            description: String::new(),
            version: default_version(),
            rdf_schema: RdfSchema::default(),
            conversion: ConversionSettings::default(),
            enrichment: EnrichmentSettings::default(),
            annotator: AnnotatorSettings::default(),
            output_format: default_output_format(),
        }
    }
}

impl Configuration {
    /// Load configuration from a YAML or JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config = if path.extension().and_then(|s| s.to_str()) == Some("json") {
            serde_json::from_str(&content)
                .with_context(|| format!("Failed to parse JSON config: {}", path.display()))?
        } else {
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config: {}", path.display()))?
        };

        Ok(config)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        validate_namespace("schema_namespace", &self.rdf_schema.schema_namespace)?;
        validate_namespace("instance_namespace", &self.rdf_schema.instance_namespace)?;

        if self.rdf_schema.prefix.is_empty() {
            anyhow::bail!("No prefix defined for the schema namespace");
        }

        if self.conversion.base_url.trim().is_empty() {
            anyhow::bail!("No conversion service URL defined");
        }

        if self.enrichment.enabled {
            Url::parse(&self.enrichment.openalex_url)
                .with_context(|| format!("Invalid OpenAlex URL: {}", self.enrichment.openalex_url))?;
            Url::parse(&self.enrichment.wikidata_url)
                .with_context(|| format!("Invalid Wikidata URL: {}", self.enrichment.wikidata_url))?;
        }

        if let Some(llm) = &self.annotator.llm_settings {
            if llm.model.is_empty() {
                anyhow::bail!("Annotator model name is empty");
            }
        }

        Ok(())
    }

    /// Create an example configuration
    pub fn example() -> Self {
        Configuration {
            name: "Example Scholarly Graph Config".to_string(),
            description: "Build a citation knowledge graph from GROBID TEI output".to_string(),
            version: "1.0".to_string(),
            rdf_schema: RdfSchema::default(),
            conversion: ConversionSettings::default(),
            enrichment: EnrichmentSettings {
                enabled: true,
                mailto: Some("you@example.org".to_string()),
                ..Default::default()
            },
            annotator: AnnotatorSettings {
                llm_settings: Some(LlmSettings {
                    base_url: "http://localhost:8000".to_string(),
                    api_key: None,
                    model: "Qwen/Qwen2.5-32B-Instruct".to_string(),
                    temperature: default_temperature(),
                    max_tokens: default_max_tokens(),
                    timeout: default_timeout(),
                }),
            },
            output_format: OutputFormat::Turtle,
        }
    }
}

fn validate_namespace(field: &str, namespace: &str) -> Result<()> {
    if namespace.is_empty() {
        anyhow::bail!("No {} defined for RDF schema", field);
    }
    let url = Url::parse(namespace)
        .with_context(|| format!("{} is not an absolute IRI: {}", field, namespace))?;
    if url.cannot_be_a_base() {
        anyhow::bail!("{} cannot be used as a base IRI: {}", field, namespace);
    }
    Ok(())
}
