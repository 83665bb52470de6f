pub mod config;
pub mod core;
pub mod enrichment;
pub mod handlers;
pub mod knowledge_graph;
pub mod utils;

pub use config::Configuration;
pub use core::{BuildResult, Corpus, CorpusBuilder, RdfTriple};
pub use handlers::{GrobidClient, TeiHandler};
pub use knowledge_graph::KnowledgeGraph;
