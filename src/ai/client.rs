//! Budgeted, retrying front end for a provider.

use std::sync::Arc;
use std::time::Instant;

use super::pricing::{cost_for, estimate_tokens, rate_per_1k_tokens};
use super::usage::{BudgetExceeded, UsageTracker};
use super::{provider_for, GenerationProvider, GenerationRequest, GenerationResponse, ProviderError};
use crate::core::{retry_async, ProviderConfig, RetryConfig};

/// Failure of one adapter call.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    #[error(transparent)]
    Budget(#[from] BudgetExceeded),

    #[error("{provider} failed after {attempts} attempt(s): {source}")]
    Provider {
        provider: String,
        attempts: u32,
        #[source]
        source: ProviderError,
    },
}

/// A named provider backend with its resolved configuration.
pub struct LlmAdapter {
    name: String,
    provider: Arc<dyn GenerationProvider>,
    config: ProviderConfig,
    retry: RetryConfig,
}

impl LlmAdapter {
    /// Adapter for the built-in implementation of `config.kind`.
    pub fn new(name: impl Into<String>, config: ProviderConfig) -> Self {
        let provider = provider_for(config.kind);
        Self::with_provider(name, provider, config)
    }

    /// Adapter over a custom provider implementation.
    pub fn with_provider(
        name: impl Into<String>,
        provider: Arc<dyn GenerationProvider>,
        config: ProviderConfig,
    ) -> Self {
        let retry = RetryConfig::provider(config.max_retries);
        Self { name: name.into(), provider, config, retry }
    }

    /// Replace the backoff schedule (attempt count still follows `max_retries`).
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = RetryConfig { max_attempts: self.config.max_retries, ..retry };
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ProviderConfig {
        &self.config
    }

    /// Check the budget, send with retries, then record usage.
    ///
    /// Nothing is sent when `tracker` has already reached
    /// `cost_limit_usd`. Usage is recorded only for successful calls.
    pub async fn generate(
        &self,
        request: &GenerationRequest,
        tracker: &mut UsageTracker,
    ) -> Result<GenerationResponse, AdapterError> {
        tracker.check_budget(self.config.cost_limit_usd)?;

        let start = Instant::now();
        let provider = &self.provider;
        let config = &self.config;
        let name = self.name.as_str();

        let outcome = retry_async(&self.retry, move |attempt| {
            tracing::debug!(provider = name, model = %config.model, attempt, "Sending generation request");
            provider.send(request, config)
        })
        .await;

        let attempts = outcome.attempts;
        let completion = outcome.into_result().map_err(|source| AdapterError::Provider {
            provider: self.name.clone(),
            attempts,
            source,
        })?;

        let usage_estimated = completion.tokens_used.is_none();
        let tokens_used = completion.tokens_used.unwrap_or_else(|| estimate_tokens(&completion.content));
        let rate = self
            .config
            .rate_per_1k_tokens
            .unwrap_or_else(|| rate_per_1k_tokens(self.config.kind, &self.config.model));
        let cost_usd = cost_for(tokens_used, rate);

        tracker.record(&self.name, tokens_used, cost_usd);

        tracing::info!(
            provider = %self.name,
            model = %self.config.model,
            tokens = tokens_used,
            cost_usd,
            attempts,
            "Generation succeeded"
        );

        Ok(GenerationResponse {
            content: completion.content,
            provider: self.config.kind,
            model: self.config.model.clone(),
            tokens_used,
            cost_usd,
            usage_estimated,
            attempts,
            elapsed: start.elapsed(),
            validated: true,
            validation_errors: Vec::new(),
        })
    }
}
