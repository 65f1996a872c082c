//! OpenAI Responses API backend.

use anyhow::{Context, Result, anyhow, bail};
use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::io::completion::{CompletionClient, CompletionRequest};
use crate::io::config::EndpointConfig;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com";

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    http: Client,
    url: String,
    model: String,
    api_key: String,
}

impl OpenAiClient {
    pub fn new(endpoint: &EndpointConfig, api_key: String) -> Result<Self> {
        let http = Client::builder()
            .timeout(endpoint.timeout())
            .build()
            .context("build HTTP client")?;
        let base = endpoint
            .base_url
            .as_deref()
            .unwrap_or(DEFAULT_BASE_URL)
            .trim_end_matches('/');
        Ok(Self {
            http,
            url: format!("{base}/v1/responses"),
            model: endpoint.model.clone(),
            api_key,
        })
    }
}

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    instructions: Option<&'a str>,
    max_output_tokens: u32,
}

#[derive(Deserialize)]
struct ResponsesResponse {
    #[serde(default)]
    output: Vec<OutputItem>,
}

#[derive(Deserialize)]
struct OutputItem {
    #[serde(default)]
    content: Vec<OutputContent>,
}

#[derive(Deserialize)]
struct OutputContent {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: Option<String>,
}

/// Concatenate every `output_text` part across output items.
fn output_text(response: ResponsesResponse) -> String {
    response
        .output
        .into_iter()
        .flat_map(|item| item.content)
        .filter(|part| part.kind == "output_text")
        .filter_map(|part| part.text)
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

impl CompletionClient for OpenAiClient {
    #[instrument(skip_all, fields(model = %self.model, max_tokens = request.max_tokens))]
    fn complete(&self, request: &CompletionRequest) -> Result<String> {
        let body = ResponsesRequest {
            model: &self.model,
            input: &request.prompt,
            instructions: request.system.as_deref(),
            max_output_tokens: request.max_tokens,
        };

        debug!(url = %self.url, prompt_bytes = request.prompt.len(), "sending responses request");
        let response = self
            .http
            .post(&self.url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .context("send OpenAI request")?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            warn!(%status, "OpenAI request failed");
            bail!("OpenAI API error ({status}): {text}");
        }

        let parsed: ResponsesResponse = response.json().context("decode OpenAI response")?;
        let text = output_text(parsed);
        if text.is_empty() {
            return Err(anyhow!("OpenAI response contained no output text"));
        }
        Ok(text)
    }
}
