use anyhow::{Result, Context};
use rio_api::formatter::TriplesFormatter;
use rio_turtle::{NTriplesFormatter, TurtleFormatter};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

use crate::config::{OutputFormat, RdfSchema};
use crate::core::triple::{RdfTerm, RdfTriple, RDF_TYPE};

const RDF_NAMESPACE: &str = "http://www.w3.org/1999/02/22-rdf-syntax-ns#";

pub struct RdfSerializer<'a> {
    schema: &'a RdfSchema,
}

impl<'a> RdfSerializer<'a> {
    pub fn new(schema: &'a RdfSchema) -> Self {
        Self { schema }
    }

    pub fn serialize(&self, triples: &[RdfTriple], format: OutputFormat) -> Result<String> {
        match format {
            OutputFormat::Turtle => self.serialize_turtle(triples),
            OutputFormat::JsonLd => self.serialize_json_ld(triples),
            OutputFormat::NTriples => self.serialize_ntriples(triples),
            OutputFormat::RdfXml => self.serialize_rdf_xml(triples),
            OutputFormat::Json => self.serialize_json(triples),
        }
    }

    fn serialize_turtle(&self, triples: &[RdfTriple]) -> Result<String> {
        let mut output = format!(
            "@prefix rdf: <{}> .\n@prefix {}: <{}> .\n@prefix {}: <{}> .\n\n",
            RDF_NAMESPACE,
            self.schema.prefix,
            self.schema.schema_namespace,
            self.schema.instance_prefix,
            self.schema.instance_namespace,
        );

        let mut formatter = TurtleFormatter::new(Vec::new());
        for triple in triples {
            formatter.format(&triple.as_rio())?;
        }
        let body = formatter.finish().context("Failed to write Turtle")?;
        output.push_str(&String::from_utf8(body).context("Turtle output is not UTF-8")?);
        output.push('\n');

        Ok(output)
    }

    fn serialize_ntriples(&self, triples: &[RdfTriple]) -> Result<String> {
        let mut formatter = NTriplesFormatter::new(Vec::new());
        for triple in triples {
            formatter.format(&triple.as_rio())?;
        }
        let body = formatter.finish().context("Failed to write N-Triples")?;
        String::from_utf8(body).context("N-Triples output is not UTF-8")
    }

    fn serialize_json_ld(&self, triples: &[RdfTriple]) -> Result<String> {
        let mut context = Map::new();
        context.insert(self.schema.prefix.clone(), json!(self.schema.schema_namespace));
        context.insert(self.schema.instance_prefix.clone(), json!(self.schema.instance_namespace));

        let mut graph: Vec<Map<String, Value>> = Vec::new();
        let mut positions: HashMap<&str, usize> = HashMap::new();

        for triple in triples {
            let position = *positions.entry(triple.subject.as_str()).or_insert_with(|| {
                let mut node = Map::new();
                node.insert("@id".to_string(), json!(triple.subject));
                graph.push(node);
                graph.len() - 1
            });

            let (key, value) = if triple.predicate == RDF_TYPE {
                ("@type".to_string(), json!(self.compact(triple.object.value())))
            } else {
                let value = match &triple.object {
                    RdfTerm::Iri { value } => json!({ "@id": value }),
                    RdfTerm::Literal { value, datatype: None } => json!(value),
                    RdfTerm::Literal { value, datatype: Some(datatype) } => {
                        json!({ "@value": value, "@type": datatype })
                    }
                };
                (self.compact(&triple.predicate), value)
            };

            push_value(&mut graph[position], key, value);
        }

        let json_ld = json!({
            "@context": context,
            "@graph": graph,
        });

        serde_json::to_string_pretty(&json_ld)
            .context("Failed to serialize JSON-LD")
    }

    fn serialize_rdf_xml(&self, triples: &[RdfTriple]) -> Result<String> {
        let mut output = String::new();

        output.push_str("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");
        output.push_str(&format!(
            "<rdf:RDF xmlns:rdf=\"{}\" xmlns:{}=\"{}\">\n",
            RDF_NAMESPACE,
            self.schema.prefix,
            html_escape::encode_double_quoted_attribute(&self.schema.schema_namespace)
        ));

        for (subject, subject_triples) in group_by_subject(triples) {
            output.push_str(&format!(
                "  <rdf:Description rdf:about=\"{}\">\n",
                html_escape::encode_double_quoted_attribute(subject)
            ));

            for triple in subject_triples {
                let element = if triple.predicate == RDF_TYPE {
                    "rdf:type".to_string()
                } else {
                    self.compact(&triple.predicate)
                };

                match &triple.object {
                    RdfTerm::Iri { value } => output.push_str(&format!(
                        "    <{} rdf:resource=\"{}\"/>\n",
                        element,
                        html_escape::encode_double_quoted_attribute(value)
                    )),
                    RdfTerm::Literal { value, datatype } => {
                        let datatype = datatype
                            .as_deref()
                            .map(|d| format!(" rdf:datatype=\"{}\"", html_escape::encode_double_quoted_attribute(d)))
                            .unwrap_or_default();
                        output.push_str(&format!(
                            "    <{}{}>{}</{}>\n",
                            element,
                            datatype,
                            html_escape::encode_text(value),
                            element
                        ));
                    }
                }
            }

            output.push_str("  </rdf:Description>\n");
        }

        output.push_str("</rdf:RDF>\n");
        Ok(output)
    }

    fn serialize_json(&self, triples: &[RdfTriple]) -> Result<String> {
        serde_json::to_string_pretty(triples)
            .context("Failed to serialize to JSON")
    }

    fn compact(&self, iri: &str) -> String {
        match iri.strip_prefix(self.schema.schema_namespace.as_str()) {
            Some(local) => format!("{}:{}", self.schema.prefix, local),
            None => iri.to_string(),
        }
    }
}

/// Subjects in first-seen order with their triples.
fn group_by_subject(triples: &[RdfTriple]) -> Vec<(&str, Vec<&RdfTriple>)> {
    let mut groups: Vec<(&str, Vec<&RdfTriple>)> = Vec::new();
    let mut positions: HashMap<&str, usize> = HashMap::new();
    for triple in triples {
        let position = *positions.entry(triple.subject.as_str()).or_insert_with(|| {
            groups.push((triple.subject.as_str(), Vec::new()));
            groups.len() - 1
        });
        groups[position].1.push(triple);
    }
    groups
}

/// A repeated key turns into an array of values.
fn push_value(node: &mut Map<String, Value>, key: String, value: Value) {
    match node.get_mut(&key) {
        Some(Value::Array(values)) => values.push(value),
        Some(existing) => {
            let first = existing.take();
            *existing = Value::Array(vec![first, value]);
        }
        None => {
            node.insert(key, value);
        }
    }
}

fn is_http_iri(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

pub fn validate_rdf_triples(triples: &[RdfTriple]) -> Vec<String> {
    let mut issues = Vec::new();

    for (i, triple) in triples.iter().enumerate() {
        if triple.subject.is_empty() {
            issues.push(format!("Triple {}: Empty subject", i));
        } else if !is_http_iri(&triple.subject) {
            issues.push(format!("Triple {}: Invalid subject URI: {}", i, triple.subject));
        }

        if triple.predicate.is_empty() {
            issues.push(format!("Triple {}: Empty predicate", i));
        } else if !is_http_iri(&triple.predicate) {
            issues.push(format!("Triple {}: Invalid predicate URI: {}", i, triple.predicate));
        }

        if let RdfTerm::Iri { value } = &triple.object {
            if value.is_empty() {
                issues.push(format!("Triple {}: Empty object", i));
            } else if !is_http_iri(value) {
                issues.push(format!("Triple {}: Invalid object URI: {}", i, value));
            }
        }
    }

    issues
}
