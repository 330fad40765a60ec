//! Provider adapters for text generation.
//!
//! Every backend implements [`GenerationProvider`]. Callers go through
//! [`LlmAdapter`], which enforces the budget, retries failed calls and
//! records usage.
//!
//! ## Backends
//!
//! - OpenAI and Groq (chat completions)
//! - Anthropic (messages)
//! - Azure OpenAI deployments
//! - Local Ollama
//! - Google Gemini
//! - Offline drafts (no network)

mod azure;
mod claude;
mod client;
mod gemini;
mod http;
mod offline;
mod ollama;
mod openai;
mod pricing;
mod usage;

pub use azure::AzureOpenAIProvider;
pub use claude::ClaudeProvider;
pub use client::{AdapterError, LlmAdapter};
pub use gemini::GeminiProvider;
pub use offline::OfflineProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAIProvider;
pub use pricing::{estimate_tokens, rate_per_1k_tokens};
pub use usage::{BudgetExceeded, ProviderUsage, UsageSummary, UsageTracker};

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::{ProviderConfig, RetryHint};

/// Supported backend kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAi,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "azure_openai")]
    AzureOpenAi,
    #[serde(rename = "local_ollama")]
    LocalOllama,
    #[serde(rename = "groq")]
    Groq,
    #[serde(rename = "google")]
    Google,
    #[serde(rename = "offline")]
    Offline,
}

impl ProviderKind {
    pub const ALL: [Self; 7] = [
        Self::OpenAi,
        Self::Anthropic,
        Self::AzureOpenAi,
        Self::LocalOllama,
        Self::Groq,
        Self::Google,
        Self::Offline,
    ];

    /// Configuration tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Anthropic => "anthropic",
            Self::AzureOpenAi => "azure_openai",
            Self::LocalOllama => "local_ollama",
            Self::Groq => "groq",
            Self::Google => "google",
            Self::Offline => "offline",
        }
    }

    /// Conventional environment variable for the credential.
    pub fn default_credential_env(self) -> Option<&'static str> {
        match self {
            Self::OpenAi => Some("OPENAI_API_KEY"),
            Self::Anthropic => Some("ANTHROPIC_API_KEY"),
            Self::AzureOpenAi => Some("AZURE_OPENAI_API_KEY"),
            Self::Groq => Some("GROQ_API_KEY"),
            Self::Google => Some("GOOGLE_API_KEY"),
            Self::LocalOllama | Self::Offline => None,
        }
    }

    /// Whether the backend needs a credential at all.
    pub fn requires_credential(self) -> bool {
        self.default_credential_env().is_some()
    }

    /// Whether calls leave the machine.
    pub fn is_remote(self) -> bool {
        !matches!(self, Self::LocalOllama | Self::Offline)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase().replace('-', "_");
        let kind = match normalized.as_str() {
            "openai" => Self::OpenAi,
            "anthropic" | "claude" => Self::Anthropic,
            "azure_openai" | "azure" => Self::AzureOpenAi,
            "local_ollama" | "ollama" => Self::LocalOllama,
            "groq" => Self::Groq,
            "google" | "gemini" => Self::Google,
            "offline" => Self::Offline,
            _ => return Err(format!("unknown provider kind: {s}")),
        };
        Ok(kind)
    }
}

/// Errors raised by a single provider call.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ProviderError {
    #[error("{provider}: no credential configured (set {env})")]
    MissingCredential { provider: ProviderKind, env: String },

    #[error("{0} is not configured: {1}")]
    NotConfigured(ProviderKind, String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited: {message}")]
    RateLimited { message: String, retry_after: Option<Duration> },

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("network error: {0}")]
    Network(String),

    #[error("malformed response: {0}")]
    MalformedResponse(String),
}

impl RetryHint for ProviderError {
    fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    fn is_retryable(&self) -> bool {
        !matches!(self, Self::MissingCredential { .. } | Self::NotConfigured(..) | Self::Auth(_))
    }
}

/// Text submitted to a provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    /// Style preamble, sent separately where the backend supports it
    pub system_prompt: String,

    /// Assembled prompt
    pub prompt: String,
}

impl GenerationRequest {
    pub fn new(system_prompt: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self { system_prompt: system_prompt.into(), prompt: prompt.into() }
    }
}

/// Raw provider output before accounting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub content: String,

    /// Token count reported by the backend, when it reports one
    pub tokens_used: Option<u64>,
}

/// Normalized response with usage and validation results.
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResponse {
    pub content: String,
    pub provider: ProviderKind,
    pub model: String,
    pub tokens_used: u64,
    pub cost_usd: f64,

    /// True when `tokens_used` comes from the word-count heuristic
    pub usage_estimated: bool,

    pub attempts: u32,

    #[serde(with = "duration_millis")]
    pub elapsed: Duration,

    pub validated: bool,
    pub validation_errors: Vec<String>,
}

mod duration_millis {
    use std::time::Duration;

    pub fn serialize<S: serde::Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }
}

/// A text-generation backend.
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Send one request. No retries, no accounting.
    async fn send(
        &self,
        request: &GenerationRequest,
        config: &ProviderConfig,
    ) -> Result<Completion, ProviderError>;

    /// Backend kind.
    fn kind(&self) -> ProviderKind;
}

/// Construct the provider implementation for a kind.
pub fn provider_for(kind: ProviderKind) -> Arc<dyn GenerationProvider> {
    match kind {
        ProviderKind::OpenAi => Arc::new(OpenAIProvider::new()),
        ProviderKind::Groq => Arc::new(OpenAIProvider::groq()),
        ProviderKind::Anthropic => Arc::new(ClaudeProvider::new()),
        ProviderKind::AzureOpenAi => Arc::new(AzureOpenAIProvider::new()),
        ProviderKind::LocalOllama => Arc::new(OllamaProvider::new()),
        ProviderKind::Google => Arc::new(GeminiProvider::new()),
        ProviderKind::Offline => Arc::new(OfflineProvider),
    }
}

/// Resolve the credential for a config or fail with the variable to set.
pub(crate) fn require_credential(config: &ProviderConfig) -> Result<String, ProviderError> {
    config.credential().ok_or_else(|| ProviderError::MissingCredential {
        provider: config.kind,
        env: config.credential_env().unwrap_or("api_key").to_string(),
    })
}
