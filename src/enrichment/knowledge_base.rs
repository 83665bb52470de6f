use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

use crate::config::EnrichmentSettings;

const USER_AGENT: &str = concat!("scholarly_graph/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PersonFacts {
    pub works_count: Option<u64>,
    pub cited_by_count: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationFacts {
    pub website: Option<String>,
    pub established: Option<NaiveDate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VenueFacts {
    pub country: Option<String>,
    pub description: Option<String>,
    pub established: Option<NaiveDate>,
}

/// External lookup of facts about canonical entities. `Ok(None)` means the
/// name is unknown to the source.
#[async_trait]
pub trait KnowledgeBase: Send + Sync {
    async fn person_facts(&self, forename: &str, surname: &str) -> Result<Option<PersonFacts>>;
    async fn organization_facts(&self, name: &str) -> Result<Option<OrganizationFacts>>;
    async fn venue_facts(&self, name: &str) -> Result<Option<VenueFacts>>;
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthors {
    #[serde(default)]
    results: Vec<OpenAlexAuthor>,
}

#[derive(Debug, Deserialize)]
struct OpenAlexAuthor {
    works_count: Option<u64>,
    cited_by_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct SparqlResponse {
    results: SparqlResults,
}

#[derive(Debug, Deserialize)]
struct SparqlResults {
    #[serde(default)]
    bindings: Vec<HashMap<String, SparqlValue>>,
}

#[derive(Debug, Deserialize)]
struct SparqlValue {
    value: String,
}

/// OpenAlex for author counts, the Wikidata SPARQL endpoint for
/// organizations and venues.
pub struct KnowledgeBaseClient {
    client: reqwest::Client,
    openalex_url: String,
    wikidata_url: String,
    mailto: Option<String>,
}

impl KnowledgeBaseClient {
    pub fn new(settings: &EnrichmentSettings) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout))
            .user_agent(USER_AGENT)
            .build()
            .context("Failed to build knowledge base HTTP client")?;

        Ok(Self {
            client,
            openalex_url: settings.openalex_url.trim_end_matches('/').to_string(),
            wikidata_url: settings.wikidata_url.clone(),
            mailto: settings.mailto.clone(),
        })
    }

    async fn sparql_first_row(&self, query: &str) -> Result<Option<HashMap<String, SparqlValue>>> {
        debug!("Wikidata query: {}", query);
        let response = self
            .client
            .get(&self.wikidata_url)
            .query(&[("query", query), ("format", "json")])
            .header(reqwest::header::ACCEPT, "application/sparql-results+json")
            .send()
            .await
            .context("Failed to reach Wikidata")?;

        if !response.status().is_success() {
            anyhow::bail!("Wikidata returned error: {}", response.status());
        }

        let body: SparqlResponse = response
            .json()
            .await
            .context("Failed to parse Wikidata response")?;
        Ok(body.results.bindings.into_iter().next())
    }
}

#[async_trait]
impl KnowledgeBase for KnowledgeBaseClient {
    async fn person_facts(&self, forename: &str, surname: &str) -> Result<Option<PersonFacts>> {
        let name = format!("{} {}", forename, surname);
        let url = format!("{}/authors", self.openalex_url);

        let mut query = vec![("search", name.as_str()), ("per-page", "1")];
        if let Some(mailto) = &self.mailto {
            query.push(("mailto", mailto.as_str()));
        }

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .context("Failed to reach OpenAlex")?;

        if !response.status().is_success() {
            anyhow::bail!("OpenAlex returned error: {}", response.status());
        }

        let authors: OpenAlexAuthors = response
            .json()
            .await
            .context("Failed to parse OpenAlex response")?;

        Ok(authors.results.into_iter().next().map(|author| PersonFacts {
            works_count: author.works_count,
            cited_by_count: author.cited_by_count,
        }))
    }

    async fn organization_facts(&self, name: &str) -> Result<Option<OrganizationFacts>> {
        let query = format!(
            r#"SELECT ?item ?website ?established WHERE {{ ?item rdfs:label "{}"@en . OPTIONAL {{ ?item wdt:P856 ?website }} OPTIONAL {{ ?item wdt:P571 ?established }} }} LIMIT 1"#,
            sparql_label(name)
        );

        Ok(self.sparql_first_row(&query).await?.map(|row| OrganizationFacts {
            website: row.get("website").map(|v| v.value.clone()),
            established: row.get("established").and_then(|v| parse_wikidata_date(&v.value)),
        }))
    }

    async fn venue_facts(&self, name: &str) -> Result<Option<VenueFacts>> {
        let query = format!(
            r#"SELECT ?item ?description ?country_of_origin ?established WHERE {{ ?item rdfs:label "{}"@en . OPTIONAL {{ ?item wdt:P17 ?country . ?country rdfs:label ?country_of_origin FILTER(lang(?country_of_origin) = "en") }} OPTIONAL {{ ?item schema:description ?description FILTER(lang(?description) = "en") }} OPTIONAL {{ ?item wdt:P571 ?established }} }} LIMIT 1"#,
            sparql_label(name)
        );

        Ok(self.sparql_first_row(&query).await?.map(|row| VenueFacts {
            country: row.get("country_of_origin").map(|v| v.value.clone()),
            description: row.get("description").map(|v| v.value.clone()),
            established: row.get("established").and_then(|v| parse_wikidata_date(&v.value)),
        }))
    }
}

/// Keeps letters, digits and spaces so the name is safe inside a string literal.
fn sparql_label(name: &str) -> String {
    name.chars()
        .filter(|c| c.is_alphanumeric() || c.is_whitespace())
        .collect::<String>()
        .trim()
        .to_string()
}

/// Wikidata times look like `1861-01-01T00:00:00Z`.
fn parse_wikidata_date(value: &str) -> Option<NaiveDate> {
    let date = value.get(..10)?;
    NaiveDate::parse_from_str(date, "%Y-%m-%d").ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn settings(server: &mockito::Server) -> EnrichmentSettings {
        EnrichmentSettings {
            enabled: true,
            openalex_url: server.url(),
            wikidata_url: format!("{}/sparql", server.url()),
            timeout: 5,
            mailto: Some("me@example.org".to_string()),
        }
    }

    #[test]
    fn test_sparql_label_strips_quotes() {
        assert_eq!(sparql_label(r#"Nature "Physics"\"#), "Nature Physics");
    }

    #[test]
    fn test_parse_wikidata_date() {
        assert_eq!(
            parse_wikidata_date("1861-04-10T00:00:00Z"),
            NaiveDate::from_ymd_opt(1861, 4, 10)
        );
        assert_eq!(parse_wikidata_date("1861"), None);
    }

    #[tokio::test]
    async fn test_person_facts_from_openalex() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/authors")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("search".into(), "Ada Lovelace".into()),
                Matcher::UrlEncoded("mailto".into(), "me@example.org".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"results": [{"display_name": "Ada Lovelace", "works_count": 12, "cited_by_count": 340}]}"#)
            .create_async()
            .await;

        let client = KnowledgeBaseClient::new(&settings(&server)).unwrap();
        let facts = client.person_facts("Ada", "Lovelace").await.unwrap();
        assert_eq!(
            facts,
            Some(PersonFacts {
                works_count: Some(12),
                cited_by_count: Some(340),
            })
        );
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_unknown_person_yields_none() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/authors")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(r#"{"results": []}"#)
            .create_async()
            .await;

        let client = KnowledgeBaseClient::new(&settings(&server)).unwrap();
        assert_eq!(client.person_facts("No", "Body").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_venue_facts_from_wikidata() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sparql")
            .match_query(Matcher::UrlEncoded("format".into(), "json".into()))
            .with_status(200)
            .with_body(
                r#"{"head": {"vars": []}, "results": {"bindings": [{
                    "item": {"type": "uri", "value": "http://www.wikidata.org/entity/Q180445"},
                    "description": {"type": "literal", "value": "scientific journal"},
                    "country_of_origin": {"type": "literal", "value": "United Kingdom"},
                    "established": {"type": "literal", "value": "1869-11-04T00:00:00Z"}
                }]}}"#,
            )
            .create_async()
            .await;

        let client = KnowledgeBaseClient::new(&settings(&server)).unwrap();
        let facts = client.venue_facts("Nature").await.unwrap().unwrap();
        assert_eq!(facts.country.as_deref(), Some("United Kingdom"));
        assert_eq!(facts.description.as_deref(), Some("scientific journal"));
        assert_eq!(facts.established, NaiveDate::from_ymd_opt(1869, 11, 4));
    }

    #[tokio::test]
    async fn test_organization_lookup_error_is_reported() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/sparql")
            .match_query(Matcher::Any)
            .with_status(503)
            .create_async()
            .await;

        let client = KnowledgeBaseClient::new(&settings(&server)).unwrap();
        assert!(client.organization_facts("MIT").await.is_err());
    }
}
