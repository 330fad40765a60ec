//! OpenAI-compatible chat completions.
//!
//! Serves both OpenAI and Groq, which exposes the same API under its own
//! base URL.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::http::{join_url, post_json};
use super::{require_credential, Completion, GenerationProvider, GenerationRequest, ProviderError, ProviderKind};
use crate::core::ProviderConfig;

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

/// OpenAI-compatible provider.
pub struct OpenAIProvider {
    client: Client,
    kind: ProviderKind,
    default_base_url: &'static str,
}

impl OpenAIProvider {
    /// Provider for api.openai.com.
    pub fn new() -> Self {
        Self { client: Client::new(), kind: ProviderKind::OpenAi, default_base_url: OPENAI_BASE_URL }
    }

    /// Provider for Groq's OpenAI-compatible endpoint.
    pub fn groq() -> Self {
        Self { client: Client::new(), kind: ProviderKind::Groq, default_base_url: GROQ_BASE_URL }
    }
}

impl Default for OpenAIProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl GenerationProvider for OpenAIProvider {
    async fn send(
        &self,
        request: &GenerationRequest,
        config: &ProviderConfig,
    ) -> Result<Completion, ProviderError> {
        let api_key = require_credential(config)?;
        let base = config.base_url.as_deref().unwrap_or(self.default_base_url);

        let body = ChatRequest::new(request, config);
        let builder = self
            .client
            .post(join_url(base, "chat/completions"))
            .header("Authorization", format!("Bearer {api_key}"));

        let response: ChatResponse =
            post_json(builder, &body, Duration::from_secs(config.timeout_secs)).await?;
        response.into_completion()
    }

    fn kind(&self) -> ProviderKind {
        self.kind
    }
}

// Request/Response types, shared with the Azure deployment API

#[derive(Debug, Serialize)]
pub(crate) struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: u32,
    temperature: f32,
}

impl<'a> ChatRequest<'a> {
    pub(crate) fn new(request: &'a GenerationRequest, config: &'a ProviderConfig) -> Self {
        let mut messages = Vec::with_capacity(2);
        if !request.system_prompt.is_empty() {
            messages.push(ChatMessage { role: "system", content: &request.system_prompt });
        }
        messages.push(ChatMessage { role: "user", content: &request.prompt });

        Self {
            model: Some(&config.model),
            messages,
            max_tokens: config.max_tokens,
            temperature: config.temperature,
        }
    }

    /// Drop the model field; Azure routes by deployment instead.
    pub(crate) fn without_model(mut self) -> Self {
        self.model = None;
        self
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ChatResponse {
    choices: Vec<Choice>,
    usage: Option<ChatUsage>,
}

impl ChatResponse {
    pub(crate) fn into_completion(self) -> Result<Completion, ProviderError> {
        let content = self
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| ProviderError::MalformedResponse("no choices in response".to_string()))?;

        Ok(Completion { content, tokens_used: self.usage.map(|u| u.total_tokens) })
    }
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    const REPLY: &str =
        r##"{"choices":[{"message":{"role":"assistant","content":"# Tasks"}}],"usage":{"total_tokens":42}}"##;

    fn config(kind: ProviderKind, base: &str) -> ProviderConfig {
        let mut config = ProviderConfig::new(kind, "gpt-4-turbo");
        config.api_key = Some("sk-test".to_string());
        config.base_url = Some(base.to_string());
        config
    }

    #[tokio::test]
    async fn test_send_uses_bearer_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .with_status(200)
            .with_body(REPLY)
            .create_async()
            .await;

        let completion = OpenAIProvider::new()
            .send(&GenerationRequest::new("sys", "go"), &config(ProviderKind::OpenAi, &server.url()))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(completion.content, "# Tasks");
        assert_eq!(completion.tokens_used, Some(42));
    }

    #[tokio::test]
    async fn test_groq_reports_its_kind() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server.mock("POST", "/chat/completions").with_status(200).with_body(REPLY).create_async().await;

        let provider = OpenAIProvider::groq();
        assert_eq!(provider.kind(), ProviderKind::Groq);
        let completion = provider
            .send(&GenerationRequest::new("", "go"), &config(ProviderKind::Groq, &server.url()))
            .await
            .unwrap();
        assert_eq!(completion.content, "# Tasks");
    }

    #[tokio::test]
    async fn test_missing_credential() {
        let mut config = ProviderConfig::new(ProviderKind::OpenAi, "gpt-4");
        config.api_key_env = Some("PLANRUN_TEST_NEVER_SET".to_string());
        let err = OpenAIProvider::new().send(&GenerationRequest::new("", "go"), &config).await.unwrap_err();
        assert!(matches!(err, ProviderError::MissingCredential { ref env, .. } if env == "PLANRUN_TEST_NEVER_SET"));
    }

    #[test]
    fn test_system_message_omitted_when_empty() {
        let config = ProviderConfig::new(ProviderKind::OpenAi, "gpt-4");
        let request = GenerationRequest::new("", "hello");
        let body = serde_json::to_value(ChatRequest::new(&request, &config)).unwrap();
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["model"], "gpt-4");
    }
}
