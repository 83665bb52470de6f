use rio_api::model::{Literal, NamedNode, Subject, Term, Triple};
use serde::{Deserialize, Serialize};

pub const XSD_BOOLEAN: &str = "http://www.w3.org/2001/XMLSchema#boolean";
pub const XSD_INTEGER: &str = "http://www.w3.org/2001/XMLSchema#integer";
pub const XSD_DATE: &str = "http://www.w3.org/2001/XMLSchema#date";
pub const RDF_TYPE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#type";

/// Object position of a triple: either another node or a literal value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum RdfTerm {
    Iri {
        value: String,
    },
    Literal {
        value: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        datatype: Option<String>,
    },
}

impl RdfTerm {
    pub fn iri(value: impl Into<String>) -> Self {
        RdfTerm::Iri { value: value.into() }
    }

    pub fn literal(value: impl Into<String>) -> Self {
        RdfTerm::Literal {
            value: value.into(),
            datatype: None,
        }
    }

    pub fn typed(value: impl Into<String>, datatype: &str) -> Self {
        RdfTerm::Literal {
            value: value.into(),
            datatype: Some(datatype.to_string()),
        }
    }

    pub fn value(&self) -> &str {
        match self {
            RdfTerm::Iri { value } | RdfTerm::Literal { value, .. } => value,
        }
    }

    pub fn is_iri(&self) -> bool {
        matches!(self, RdfTerm::Iri { .. })
    }

    pub fn as_rio(&self) -> Term<'_> {
        match self {
            RdfTerm::Iri { value } => NamedNode { iri: value }.into(),
            RdfTerm::Literal { value, datatype: None } => Literal::Simple { value }.into(),
            RdfTerm::Literal {
                value,
                datatype: Some(datatype),
            } => Literal::Typed {
                value,
                datatype: NamedNode { iri: datatype },
            }
            .into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RdfTriple {
    pub subject: String,
    pub predicate: String,
    pub object: RdfTerm,
}

impl RdfTriple {
    pub fn new(subject: String, predicate: String, object: RdfTerm) -> Self {
        Self {
            subject,
            predicate,
            object,
        }
    }

    pub fn as_rio(&self) -> Triple<'_> {
        Triple {
            subject: Subject::NamedNode(NamedNode { iri: &self.subject }),
            predicate: NamedNode { iri: &self.predicate },
            object: self.object.as_rio(),
        }
    }

    pub fn to_ntriple(&self) -> String {
        format!("{} .", self.as_rio())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_ntriple_escapes_literals() {
        let triple = RdfTriple::new(
            "http://instances.com/alpha".to_string(),
            "http://schema.org/title".to_string(),
            RdfTerm::literal("say \"hi\""),
        );
        assert_eq!(
            triple.to_ntriple(),
            r#"<http://instances.com/alpha> <http://schema.org/title> "say \"hi\"" ."#
        );
    }

    #[test]
    fn test_typed_literal_and_iri_objects() {
        let typed = RdfTriple::new(
            "http://instances.com/alpha".to_string(),
            "http://schema.org/is_primary".to_string(),
            RdfTerm::typed("true", XSD_BOOLEAN),
        );
        assert!(typed.to_ntriple().ends_with(&format!("\"true\"^^<{}> .", XSD_BOOLEAN)));

        let link = RdfTerm::iri("http://instances.com/beta");
        assert!(link.is_iri());
        assert_eq!(link.value(), "http://instances.com/beta");
    }

    #[test]
    fn test_serde_shape_is_tagged() {
        let term = RdfTerm::typed("3", XSD_INTEGER);
        let json = serde_json::to_value(&term).unwrap();
        assert_eq!(json["kind"], "literal");
        assert_eq!(json["datatype"], XSD_INTEGER);
        let back: RdfTerm = serde_json::from_value(json).unwrap();
        assert_eq!(back, term);
    }
}
