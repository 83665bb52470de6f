use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::config::LlmSettings;
use crate::core::entities::{EntitySpan, SpanLabel};
use crate::core::llm_client::{PromptBuilder, VllmClient};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicAssignment {
    pub cluster_id: u32,
    pub topic_label: String,
}

/// Source of topic labels for abstracts and entity spans for
/// acknowledgement texts.
#[async_trait]
pub trait SemanticAnnotator: Send + Sync {
    /// One assignment per abstract, in input order.
    async fn assign_topics(&self, abstracts: &[&str]) -> Result<Vec<TopicAssignment>>;

    /// Byte-offset spans into `text`.
    async fn recognize_entities(&self, text: &str) -> Result<Vec<EntitySpan>>;
}

#[derive(Debug, Default, Deserialize)]
struct EntityMentions {
    #[serde(default)]
    organizations: Vec<String>,
    #[serde(default)]
    people: Vec<String>,
}

/// Annotator backed by an OpenAI-compatible chat model.
pub struct VllmAnnotator {
    client: VllmClient,
}

impl VllmAnnotator {
    pub fn new(client: VllmClient) -> Self {
        Self { client }
    }

    pub fn from_settings(settings: &LlmSettings) -> Result<Self> {
        Ok(Self::new(VllmClient::new(settings)?))
    }

    pub fn client(&self) -> &VllmClient {
        &self.client
    }
}

#[async_trait]
impl SemanticAnnotator for VllmAnnotator {
    async fn assign_topics(&self, abstracts: &[&str]) -> Result<Vec<TopicAssignment>> {
        if abstracts.is_empty() {
            return Ok(Vec::new());
        }

        let prompt = PromptBuilder::build_topic_prompt(abstracts);
        let value = self
            .client
            .generate_structured(&prompt, Some(PromptBuilder::get_system_prompt()))
            .await?;
        let labels: Vec<String> =
            serde_json::from_value(value).context("Topic reply is not a list of labels")?;

        if labels.len() != abstracts.len() {
            anyhow::bail!(
                "Expected {} topic labels, got {}",
                abstracts.len(),
                labels.len()
            );
        }

        Ok(cluster_by_label(labels))
    }

    async fn recognize_entities(&self, text: &str) -> Result<Vec<EntitySpan>> {
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }

        let prompt = PromptBuilder::build_entity_prompt(text);
        let value = self
            .client
            .generate_structured(&prompt, Some(PromptBuilder::get_system_prompt()))
            .await?;
        let mentions: EntityMentions =
            serde_json::from_value(value).context("Entity reply has an unexpected shape")?;

        Ok(locate_mentions(text, &mentions))
    }
}

/// Clusters are numbered by the first appearance of each distinct label.
pub fn cluster_by_label(labels: Vec<String>) -> Vec<TopicAssignment> {
    let mut clusters: HashMap<String, u32> = HashMap::new();
    labels
        .into_iter()
        .map(|label| {
            let label = label.trim().to_string();
            let next = clusters.len() as u32;
            let cluster_id = *clusters.entry(label.clone()).or_insert(next);
            TopicAssignment {
                cluster_id,
                topic_label: label,
            }
        })
        .collect()
}

/// Turn reported names into spans at their first unclaimed occurrence.
/// Names the text does not contain are dropped.
fn locate_mentions(text: &str, mentions: &EntityMentions) -> Vec<EntitySpan> {
    let labeled = mentions
        .organizations
        .iter()
        .map(|name| (SpanLabel::Organization, name))
        .chain(mentions.people.iter().map(|name| (SpanLabel::Person, name)));

    let mut spans: Vec<EntitySpan> = Vec::new();
    for (label, name) in labeled {
        let name = name.trim();
        if name.is_empty() {
            continue;
        }

        let free = text.match_indices(name).map(|(start, _)| start).find(|&start| {
            let end = start + name.len();
            !spans.iter().any(|s| start < s.end && s.start < end)
        });

        match free {
            Some(start) => spans.push(EntitySpan {
                label,
                start,
                end: start + name.len(),
            }),
            None => debug!("Mention '{}' not found in acknowledgement", name),
        }
    }

    spans.sort_by_key(|span| span.start);
    spans
}
