//! Anthropic messages API integration.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{join_url, post_json};
use super::{require_credential, Completion, GenerationProvider, GenerationRequest, ProviderError, ProviderKind};
use crate::core::ProviderConfig;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const API_VERSION: &str = "2023-06-01";

/// Anthropic provider.
pub struct ClaudeProvider {
    client: Client,
}

impl ClaudeProvider {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }
}

impl Default for ClaudeProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationProvider for ClaudeProvider {
    async fn send(
        &self,
        request: &GenerationRequest,
        config: &ProviderConfig,
    ) -> Result<Completion, ProviderError> {
        let api_key = require_credential(config)?;
        let base = config.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);

        let body = ClaudeRequest {
            model: &config.model,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
            system: &request.system_prompt,
            messages: vec![Message { role: "user", content: &request.prompt }],
        };

        let builder = self
            .client
            .post(join_url(base, "v1/messages"))
            .header("x-api-key", api_key)
            .header("anthropic-version", API_VERSION);

        let response: ClaudeResponse =
            post_json(builder, &body, Duration::from_secs(config.timeout_secs)).await?;

        let content: String = response
            .content
            .iter()
            .filter(|block| block.kind == "text")
            .filter_map(|block| block.text.as_deref())
            .collect::<Vec<_>>()
            .join("");

        if content.is_empty() {
            return Err(ProviderError::MalformedResponse("no text content in response".to_string()));
        }

        let tokens_used = response.usage.map(|u| u.input_tokens + u.output_tokens);
        Ok(Completion { content, tokens_used })
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Anthropic
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct ClaudeRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "str::is_empty")]
    system: &'a str,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ClaudeResponse {
    content: Vec<ContentBlock>,
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Usage {
    input_tokens: u64,
    output_tokens: u64,
}
