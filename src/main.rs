use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use tracing::{error, warn};

use scholarly_graph::{
    config::{Configuration, OutputFormat},
    core::CorpusBuilder,
    enrichment::{KnowledgeBaseClient, VllmAnnotator},
    handlers::{ConversionError, ConversionOptions, GrobidClient},
    knowledge_graph::{KnowledgeGraph, KnowledgeGraphConfig},
    utils::{validate_rdf_triples, RdfSerializer},
};

#[derive(Parser)]
#[command(
    name = "scholarly_graph",
    about = "Build a deduplicated RDF knowledge graph of scholarly papers from GROBID TEI documents",
    long_about = None,
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Build the knowledge graph from TEI files and store it
    Build {
        /// Configuration file path (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// TEI files or directories containing them
        #[arg(short, long, required = true)]
        input: Vec<PathBuf>,

        /// Knowledge graph storage path
        #[arg(long, default_value = "knowledge_graph.json")]
        kg_path: String,

        /// Also export triples to file
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Output format for export (overrides config)
        #[arg(short, long, value_enum)]
        format: Option<OutputFormatArg>,

        /// Assign topics and recognize acknowledged entities with the configured annotator
        #[arg(long)]
        annotate: bool,

        /// Look up authors, affiliations and journals in external knowledge bases
        #[arg(long)]
        enrich: bool,

        /// Validate the produced triples
        #[arg(long)]
        validate: bool,
    },

    /// Convert a directory of PDFs into TEI files through GROBID
    Convert {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory with PDF files
        #[arg(short, long)]
        input: PathBuf,

        /// Directory for the TEI output
        #[arg(short, long)]
        output: PathBuf,

        /// GROBID server URL (overrides config)
        #[arg(long)]
        server_url: Option<String>,
    },

    /// Check the GROBID server and, if configured, the annotator server
    CheckServer {
        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// GROBID server URL (overrides config)
        #[arg(long)]
        server_url: Option<String>,
    },

    /// Show knowledge graph statistics
    Stats {
        /// Knowledge graph storage path
        #[arg(long, default_value = "knowledge_graph.json")]
        kg_path: String,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Export knowledge graph to file
    Export {
        /// Knowledge graph storage path
        #[arg(long, default_value = "knowledge_graph.json")]
        kg_path: String,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Output format
        #[arg(short, long, value_enum, default_value = "turtle")]
        format: OutputFormatArg,
    },

    /// Look up entities in the knowledge graph
    Query {
        /// Knowledge graph storage path
        #[arg(long, default_value = "knowledge_graph.json")]
        kg_path: String,

        /// Configuration file path
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// List entities of a type (paper, author, affiliation, journal, citation, acknowledgement)
        #[arg(long = "type")]
        entity_type: Option<String>,

        /// Show the properties of an entity (slug or IRI)
        #[arg(long)]
        entity: Option<String>,

        /// Find a paper by title
        #[arg(long)]
        title: Option<String>,

        /// List entities related to an entity (slug or IRI)
        #[arg(long)]
        related: Option<String>,

        /// Maximum hops for --related
        #[arg(long, default_value_t = 2)]
        depth: usize,

        /// Output format
        #[arg(short, long, value_enum, default_value = "table")]
        format: QueryOutputFormat,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file path
        #[arg(short, long)]
        config: PathBuf,
    },

    /// Generate example configuration file
    GenerateConfig {
        /// Output path for configuration file
        #[arg(short, long)]
        output: PathBuf,

        /// Configuration format (yaml or json)
        #[arg(short, long, default_value = "yaml")]
        format: ConfigFormat,
    },
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum OutputFormatArg {
    Turtle,
    JsonLd,
    NTriples,
    RdfXml,
    Json,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(format: OutputFormatArg) -> Self {
        match format {
            OutputFormatArg::Turtle => Self::Turtle,
            OutputFormatArg::JsonLd => Self::JsonLd,
            OutputFormatArg::NTriples => Self::NTriples,
            OutputFormatArg::RdfXml => Self::RdfXml,
            OutputFormatArg::Json => Self::Json,
        }
    }
}

#[derive(clap::ValueEnum, Clone)]
enum ConfigFormat {
    Yaml,
    Json,
}

#[derive(clap::ValueEnum, Clone, Copy)]
enum QueryOutputFormat {
    Table,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.debug {
        tracing::Level::DEBUG
    } else if cli.verbose {
        tracing::Level::INFO
    } else {
        tracing::Level::WARN
    };

    tracing_subscriber::fmt()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Build {
            config,
            input,
            kg_path,
            output,
            format,
            annotate,
            enrich,
            validate,
        } => build_command(config, input, kg_path, output, format, annotate, enrich, validate).await,
        Commands::Convert {
            config,
            input,
            output,
            server_url,
        } => convert_command(config, input, output, server_url).await,
        Commands::CheckServer { config, server_url } => check_server_command(config, server_url).await,
        Commands::Stats { kg_path, config } => stats_command(kg_path, config),
        Commands::Export {
            kg_path,
            config,
            output,
            format,
        } => export_command(kg_path, config, output, format),
        Commands::Query {
            kg_path,
            config,
            entity_type,
            entity,
            title,
            related,
            depth,
            format,
        } => query_command(kg_path, config, entity_type, entity, title, related, depth, format),
        Commands::Validate { config } => validate_command(config),
        Commands::GenerateConfig { output, format } => generate_config_command(output, format).await,
    }
}

fn load_config(path: Option<&PathBuf>) -> Result<Configuration> {
    let config = match path {
        Some(path) => Configuration::from_file(path)?,
        None => Configuration::default(),
    };
    config.validate()?;
    Ok(config)
}

fn open_graph(kg_path: String, config: &Configuration) -> Result<KnowledgeGraph> {
    KnowledgeGraph::new(
        KnowledgeGraphConfig { storage_path: kg_path },
        config.rdf_schema.clone(),
    )
}

#[allow(clippy::too_many_arguments)]
async fn build_command(
    config_path: Option<PathBuf>,
    input: Vec<PathBuf>,
    kg_path: String,
    output: Option<PathBuf>,
    format: Option<OutputFormatArg>,
    annotate: bool,
    enrich: bool,
    validate: bool,
) -> Result<()> {
    println!("{}", "Building scholarly knowledge graph...".bright_blue().bold());

    let config = load_config(config_path.as_ref())?;
    println!(" Configuration: {}", config.name.bright_green());
    println!(" Inputs: {}", input.len());

    let mut builder = CorpusBuilder::new(config.clone());

    if annotate {
        match &config.annotator.llm_settings {
            Some(settings) => {
                let annotator = VllmAnnotator::from_settings(settings)?;
                if !annotator.client().check_health().await {
                    warn!(" Annotator server is not responding at {}", settings.base_url);
                }
                println!(" Annotator model: {}", settings.model.bright_cyan());
                builder = builder.with_annotator(Box::new(annotator));
            }
            None => warn!(" --annotate given but no annotator.llm_settings in configuration"),
        }
    }

    if enrich || config.enrichment.enabled {
        let client = KnowledgeBaseClient::new(&config.enrichment)?;
        let progress = ProgressBar::new(0);
        progress.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        builder = builder.with_knowledge_base(Box::new(client)).with_progress(progress);
    }

    let result = builder.build(&input).await?;

    for err in &result.errors {
        warn!(" {}", err);
    }

    if validate {
        let issues = validate_rdf_triples(&result.triples);
        if issues.is_empty() {
            println!(" All {} triples are valid", result.triples.len());
        } else {
            warn!(" Validation issues: {}", issues.join(", "));
        }
    }

    let mut knowledge_graph = open_graph(kg_path.clone(), &config)?;
    let stored = knowledge_graph.add_triples(&result.triples)?;
    println!(
        " Stored {} triples in knowledge graph: {}",
        stored.to_string().bright_cyan(),
        kg_path.bright_green()
    );

    if let Some(output_path) = &output {
        let output_format = format.map(OutputFormat::from).unwrap_or(config.output_format);
        let serialized = RdfSerializer::new(&config.rdf_schema).serialize(&result.triples, output_format)?;
        tokio::fs::write(output_path, serialized).await?;
        println!(" Export written to: {}", output_path.display().to_string().bright_green());
    }

    println!("\n{}", " Build Summary".bright_green().bold());
    println!(" Documents read: {}", result.sources.len());
    println!(
        " Papers: {} primary, {} cited only",
        result.link_summary.primaries, result.link_summary.placeholders
    );
    println!(
        " Citations: {} resolved, {} dangling",
        result.link_summary.resolved_citations, result.link_summary.dangling_citations
    );
    println!(
        " Authors: {}  Affiliations: {}  Journals: {}",
        result.resolution_summary.persons,
        result.resolution_summary.organizations,
        result.resolution_summary.venues
    );
    if let Some(summary) = &result.enrichment_summary {
        println!(
            " Enriched: {} authors, {} affiliations, {} journals ({} failed lookups)",
            summary.persons, summary.organizations, summary.venues, summary.failures
        );
    }
    println!(" Triples: {}", result.triples.len().to_string().bright_cyan());
    println!(" Processing time: {:.2}s", result.processing_time_seconds);

    if result.errors.is_empty() {
        println!(" {} completed successfully!", "Build".bright_green());
    } else {
        println!(" {} completed with {} errors", "Build".bright_yellow(), result.errors.len());
    }

    Ok(())
}

async fn convert_command(
    config_path: Option<PathBuf>,
    input: PathBuf,
    output: PathBuf,
    server_url: Option<String>,
) -> Result<()> {
    println!("{}", "Converting PDFs with GROBID...".bright_blue().bold());

    let mut config = load_config(config_path.as_ref())?;
    if let Some(url) = server_url {
        config.conversion.base_url = url;
    }

    let client = GrobidClient::new(&config.conversion)?;
    let options = ConversionOptions::from(&config.conversion);

    let report = match client.convert_directory(&input, &output, &options).await {
        Ok(report) => report,
        Err(e @ ConversionError::Unavailable(_)) => {
            error!(" {}. Start GROBID first.", e);
            return Err(e.into());
        }
        Err(e) => return Err(e.into()),
    };

    for (path, reason) in &report.failed {
        println!(" {} {}: {}", "Failed".bright_red(), path.display(), reason);
    }
    println!(
        " Converted {} documents into {}",
        report.converted.len().to_string().bright_cyan(),
        output.display().to_string().bright_green()
    );

    Ok(())
}

async fn check_server_command(config_path: Option<PathBuf>, server_url: Option<String>) -> Result<()> {
    println!("{}", " Checking servers...".bright_blue().bold());

    let mut config = load_config(config_path.as_ref())?;
    if let Some(url) = server_url {
        config.conversion.base_url = url;
    }

    let grobid = GrobidClient::new(&config.conversion)?;
    if grobid.check_health().await {
        println!(" GROBID is alive at {}", grobid.base_url().bright_green());
    } else {
        println!(" GROBID is not responding at {}", grobid.base_url().bright_red());
    }

    let Some(settings) = &config.annotator.llm_settings else {
        return Ok(());
    };

    let annotator = VllmAnnotator::from_settings(settings)?;
    if !annotator.client().check_health().await {
        println!(" Annotator is not responding at {}", settings.base_url.bright_red());
        return Ok(());
    }

    println!(" Annotator is healthy at {}", settings.base_url.bright_green());
    match annotator.client().list_models().await {
        Ok(models) => {
            println!(" Available models:");
            for model in models {
                println!("  - {}", model.bright_cyan());
            }
        }
        Err(e) => warn!(" Could not list models: {}", e),
    }

    Ok(())
}

fn stats_command(kg_path: String, config_path: Option<PathBuf>) -> Result<()> {
    println!("{}", " Knowledge Graph Statistics".bright_blue().bold());

    let config = load_config(config_path.as_ref())?;
    let knowledge_graph = open_graph(kg_path, &config)?;
    println!("{}", knowledge_graph.get_statistics());

    Ok(())
}

fn export_command(
    kg_path: String,
    config_path: Option<PathBuf>,
    output: PathBuf,
    format: OutputFormatArg,
) -> Result<()> {
    println!("{}", " Exporting knowledge graph...".bright_blue().bold());

    let config = load_config(config_path.as_ref())?;
    let knowledge_graph = open_graph(kg_path, &config)?;
    knowledge_graph.export_to_file(&output, format.into())?;

    println!(" Export completed: {}", output.display().to_string().bright_green());
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn query_command(
    kg_path: String,
    config_path: Option<PathBuf>,
    entity_type: Option<String>,
    entity: Option<String>,
    title: Option<String>,
    related: Option<String>,
    depth: usize,
    format: QueryOutputFormat,
) -> Result<()> {
    let config = load_config(config_path.as_ref())?;
    let knowledge_graph = open_graph(kg_path, &config)?;

    if let Some(entity_type) = entity_type {
        let entities = knowledge_graph.get_entities_by_type(&entity_type);
        print_list(&format!("Entities of type {}", entity_type), &entities, format)?;
    } else if let Some(entity) = entity {
        let properties = knowledge_graph.get_entity_properties(&entity);
        match format {
            QueryOutputFormat::Json => println!("{}", serde_json::to_string_pretty(&properties)?),
            QueryOutputFormat::Table => {
                println!("{}", format!(" Properties of {}", entity).bright_yellow().bold());
                let mut predicates: Vec<_> = properties.into_iter().collect();
                predicates.sort();
                for (predicate, values) in predicates {
                    println!(" {} | {}", predicate.bright_cyan(), values.join(", "));
                }
            }
        }
    } else if let Some(title) = title {
        match knowledge_graph.find_paper_by_title(&title) {
            Some(iri) => print_list("Paper", &[iri], format)?,
            None => println!(" No paper titled '{}'", title.bright_red()),
        }
    } else if let Some(related) = related {
        let entities = knowledge_graph.find_related_entities(&related, depth);
        print_list(&format!("Related to {} (depth {})", related, depth), &entities, format)?;
    } else {
        anyhow::bail!("One of --type, --entity, --title or --related must be provided");
    }

    Ok(())
}

fn print_list(heading: &str, values: &[String], format: QueryOutputFormat) -> Result<()> {
    match format {
        QueryOutputFormat::Json => println!("{}", serde_json::to_string_pretty(values)?),
        QueryOutputFormat::Table => {
            println!("{}", format!(" {} ({})", heading, values.len()).bright_yellow().bold());
            for value in values {
                println!("  {}", value);
            }
        }
    }
    Ok(())
}

fn validate_command(config_path: PathBuf) -> Result<()> {
    println!("{}", " Validating configuration...".bright_blue().bold());

    let config = Configuration::from_file(&config_path).inspect_err(|e| {
        error!(" Failed to load configuration: {}", e);
    })?;

    config.validate().inspect_err(|e| {
        error!(" Configuration validation failed: {}", e);
    })?;

    println!(" Configuration is valid!");
    println!(" Name: {}", config.name.bright_green());
    println!(" Version: {}", config.version);
    println!(" Schema namespace: {}", config.rdf_schema.schema_namespace);
    println!(" Instance namespace: {}", config.rdf_schema.instance_namespace);
    println!(" GROBID: {}", config.conversion.base_url);
    if let Some(settings) = &config.annotator.llm_settings {
        println!(" Annotator model: {}", settings.model);
    }
    Ok(())
}

async fn generate_config_command(output_path: PathBuf, format: ConfigFormat) -> Result<()> {
    println!("{}", " Generating example configuration...".bright_blue().bold());

    let config = Configuration::example();

    let content = match format {
        ConfigFormat::Yaml => serde_yaml::to_string(&config)?,
        ConfigFormat::Json => serde_json::to_string_pretty(&config)?,
    };

    tokio::fs::write(&output_path, content).await?;

    println!(" Example configuration generated at: {}", output_path.display().to_string().bright_green());
    println!(" Edit the file to customize for your use case");

    Ok(())
}
