//! Ollama local LLM integration.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{join_url, post_json};
use super::{Completion, GenerationProvider, GenerationRequest, ProviderError, ProviderKind};
use crate::core::ProviderConfig;

/// Ollama API provider for local models.
pub struct OllamaProvider {
    client: Client,
}

impl OllamaProvider {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    /// Base URL: config, then `OLLAMA_HOST`, then localhost:11434.
    fn base_url(config: &ProviderConfig) -> String {
        config
            .base_url
            .clone()
            .or_else(|| std::env::var("OLLAMA_HOST").ok())
            .unwrap_or_else(|| "http://localhost:11434".to_string())
    }
}

impl Default for OllamaProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationProvider for OllamaProvider {
    async fn send(
        &self,
        request: &GenerationRequest,
        config: &ProviderConfig,
    ) -> Result<Completion, ProviderError> {
        let body = OllamaRequest {
            model: &config.model,
            prompt: &request.prompt,
            system: (!request.system_prompt.is_empty()).then_some(request.system_prompt.as_str()),
            stream: false,
            options: OllamaOptions { temperature: config.temperature, num_predict: config.max_tokens },
        };

        let builder = self.client.post(join_url(&Self::base_url(config), "api/generate"));
        let response: OllamaResponse =
            post_json(builder, &body, Duration::from_secs(config.timeout_secs)).await?;

        let tokens_used = match (response.prompt_eval_count, response.eval_count) {
            (None, None) => None,
            (prompt, eval) => Some(prompt.unwrap_or(0) + eval.unwrap_or(0)),
        };

        Ok(Completion { content: response.response, tokens_used })
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::LocalOllama
    }
}

// Request/Response types

#[derive(Debug, Serialize)]
struct OllamaRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    stream: bool,
    options: OllamaOptions,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
    prompt_eval_count: Option<u64>,
    eval_count: Option<u64>,
}
