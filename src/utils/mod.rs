pub mod serialization;

pub use serialization::{validate_rdf_triples, RdfSerializer};
