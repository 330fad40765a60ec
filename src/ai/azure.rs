//! Azure OpenAI integration.
//!
//! The configured model is the deployment name. The endpoint comes from
//! `base_url` or `AZURE_OPENAI_ENDPOINT`.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::http::post_json;
use super::openai::{ChatRequest, ChatResponse};
use super::{require_credential, Completion, GenerationProvider, GenerationRequest, ProviderError, ProviderKind};
use crate::core::ProviderConfig;

const DEFAULT_API_VERSION: &str = "2024-02-01";
const ENDPOINT_ENV: &str = "AZURE_OPENAI_ENDPOINT";

/// Azure OpenAI provider.
pub struct AzureOpenAIProvider {
    client: Client,
}

impl AzureOpenAIProvider {
    pub fn new() -> Self {
        Self { client: Client::new() }
    }

    fn endpoint(config: &ProviderConfig) -> Result<String, ProviderError> {
        config
            .base_url
            .clone()
            .or_else(|| std::env::var(ENDPOINT_ENV).ok())
            .filter(|e| !e.is_empty())
            .ok_or_else(|| {
                ProviderError::NotConfigured(
                    ProviderKind::AzureOpenAi,
                    format!("set base_url or {ENDPOINT_ENV}"),
                )
            })
    }

    fn deployment_url(endpoint: &str, deployment: &str, api_version: &str) -> String {
        format!(
            "{}/openai/deployments/{}/chat/completions?api-version={}",
            endpoint.trim_end_matches('/'),
            deployment,
            api_version
        )
    }
}

impl Default for AzureOpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationProvider for AzureOpenAIProvider {
    async fn send(
        &self,
        request: &GenerationRequest,
        config: &ProviderConfig,
    ) -> Result<Completion, ProviderError> {
        let api_key = require_credential(config)?;
        let endpoint = Self::endpoint(config)?;
        let api_version = config.api_version.as_deref().unwrap_or(DEFAULT_API_VERSION);

        let body = ChatRequest::new(request, config).without_model();
        let builder = self
            .client
            .post(Self::deployment_url(&endpoint, &config.model, api_version))
            .header("api-key", api_key);

        let response: ChatResponse =
            post_json(builder, &body, Duration::from_secs(config.timeout_secs)).await?;
        response.into_completion()
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::AzureOpenAi
    }
}
