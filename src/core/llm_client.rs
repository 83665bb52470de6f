use anyhow::{Result, Context};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

use crate::config::LlmSettings;

/// Longest abstract or acknowledgement excerpt placed in a prompt, in bytes.
const MAX_EXCERPT: usize = 1500;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionChoice {
    pub message: ChatMessage,
    #[serde(default)]
    pub finish_reason: Option<String>,
    #[serde(default)]
    pub index: u32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub model: String,
    pub choices: Vec<ChatCompletionChoice>,
    #[serde(default)]
    pub usage: Usage,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelsResponse {
    pub data: Vec<ModelEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelEntry {
    pub id: String,
}

#[derive(Debug)]
pub struct LlmResponse {
    pub content: String,
    pub usage: Usage,
    pub model: String,
    pub response_time: Duration,
}

/// Client for an OpenAI-compatible chat completion server such as vLLM.
pub struct VllmClient {
    client: reqwest::Client,
    base_url: String,
    pub model: String,
    temperature: f32,
    max_tokens: u32,
}

impl VllmClient {
    pub fn new(settings: &LlmSettings) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        if let Some(key) = &settings.api_key {
            headers.insert(
                reqwest::header::AUTHORIZATION,
                reqwest::header::HeaderValue::from_str(&format!("Bearer {}", key))
                    .context("API key is not a valid header value")?,
            );
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout))
            .default_headers(headers)
            .build()
            .context("Failed to build LLM HTTP client")?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }

    pub async fn check_health(&self) -> bool {
        let url = format!("{}/health", self.base_url);
        match self.client.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    pub async fn list_models(&self) -> Result<Vec<String>> {
        let url = format!("{}/v1/models", self.base_url);
        let response = self.client
            .get(&url)
            .send()
            .await
            .context("Failed to fetch models")?;

        if !response.status().is_success() {
            anyhow::bail!("API returned error: {}", response.status());
        }

        let models: ModelsResponse = response.json().await
            .context("Failed to parse models response")?;
        Ok(models.data.into_iter().map(|m| m.id).collect())
    }

    pub async fn generate(&self, prompt: &str, system_prompt: Option<&str>) -> Result<LlmResponse> {
        let start_time = Instant::now();

        let messages = system_prompt
            .map(|system| ChatMessage {
                role: "system".to_string(),
                content: system.to_string(),
            })
            .into_iter()
            .chain(std::iter::once(ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }))
            .collect();

        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: Some(0.9),
            stop: None,
        };

        debug!("Sending chat completion request ({} bytes of prompt)", prompt.len());

        let url = format!("{}/v1/chat/completions", self.base_url);
        let response = self.client
            .post(&url)
            .json(&request)
            .send()
            .await
            .context("Failed to send request to LLM server")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM API error {}: {}", status, error_text);
        }

        let completion: ChatCompletionResponse = response.json().await
            .context("Failed to parse completion response")?;

        let choice = completion.choices
            .into_iter()
            .next()
            .ok_or_else(|| anyhow::anyhow!("No choices in response"))?;

        Ok(LlmResponse {
            content: choice.message.content,
            usage: completion.usage,
            model: completion.model,
            response_time: start_time.elapsed(),
        })
    }

    /// Like [`generate`](Self::generate) but parses the reply as JSON,
    /// tolerating a markdown code fence around it.
    pub async fn generate_structured(
        &self,
        prompt: &str,
        system_prompt: Option<&str>,
    ) -> Result<serde_json::Value> {
        let json_prompt = format!(
            "{}\n\nRespond with valid JSON only. Do not include markdown formatting or explanations.",
            prompt
        );

        let response = self.generate(&json_prompt, system_prompt).await?;
        let json_content = strip_code_fence(&response.content);

        serde_json::from_str(json_content)
            .with_context(|| format!("Failed to parse JSON response: {}", json_content))
    }
}

fn strip_code_fence(content: &str) -> &str {
    let content = content.trim();
    let Some(inner) = content.strip_prefix("```").and_then(|c| c.strip_suffix("```")) else {
        return content;
    };
    inner.strip_prefix("json").unwrap_or(inner).trim()
}

fn excerpt(text: &str) -> &str {
    if text.len() <= MAX_EXCERPT {
        return text;
    }
    let mut end = MAX_EXCERPT;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

pub struct PromptBuilder;

impl PromptBuilder {
    /// Ask for one short topic label per numbered abstract.
    pub fn build_topic_prompt(abstracts: &[&str]) -> String {
        let mut prompt = String::from("## Abstracts\n");
        for (i, text) in abstracts.iter().enumerate() {
            prompt.push_str(&format!("[{}] {}\n\n", i, excerpt(text)));
        }

        prompt.push_str(&format!(
            r#"## Instructions
Group these {} abstracts by research topic. Give every abstract a short topic
label of two to four words; abstracts on the same topic must get the exact same
label.

Return a JSON array with one string per abstract, in the order given.
Example: ["graph neural networks", "citation analysis", "graph neural networks"]
"#,
            abstracts.len()
        ));
        prompt
    }

    pub fn build_entity_prompt(acknowledgement: &str) -> String {
        format!(
            r#"## Acknowledgement
{}

## Instructions
List every organization (funders, institutions, companies) and every person
named in the acknowledgement above. Copy each name exactly as it is written.

Return a JSON object of the form:
{{"organizations": ["..."], "people": ["..."]}}
"#,
            excerpt(acknowledgement)
        )
    }

    pub fn get_system_prompt() -> &'static str {
        "You annotate scholarly papers. You only report what the given text states and always answer with the JSON shape you are asked for."
    }
}
