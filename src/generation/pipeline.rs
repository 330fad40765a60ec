//! Content generation pipeline.
//!
//! Resolves the provider for a content type, assembles the prompt, calls
//! the adapter, validates and post-processes the response, and writes the
//! artifact atomically into the feature directory.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::ai::{
    provider_for, GenerationProvider, GenerationRequest, GenerationResponse, LlmAdapter, ProviderKind, UsageSummary,
    UsageTracker,
};
use crate::core::{write_atomic, Config, ConfigError, ProviderConfig, RetryConfig};
use crate::error::WorkflowError;

use super::postprocess::post_process;
use super::prompt::build_prompt;
use super::request::{ContentGenerationRequest, ContentType};
use super::validate::validate_content;

/// Previous outputs at or below this many bytes are not loaded.
const PREVIOUS_OUTPUT_MIN_BYTES: usize = 50;

/// Operator overrides that win over every content type setting.
#[derive(Debug, Clone, Default)]
pub struct GenerationOverrides {
    /// Provider name from `[providers]`
    pub provider: Option<String>,
    pub model: Option<String>,
    pub cost_limit_usd: Option<f64>,
}

/// Provider settings resolved for one content type.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedProvider {
    pub name: String,
    pub config: ProviderConfig,
    pub system_prompt: String,
    pub validation: Vec<String>,
}

/// A written artifact and the response it came from.
#[derive(Debug, Clone)]
pub struct GeneratedArtifact {
    /// Absolute path of the written file
    pub path: PathBuf,
    /// Path relative to the feature directory
    pub relative_path: String,
    /// Final text as written
    pub content: String,
    pub response: GenerationResponse,
}

/// Content generation pipeline. One instance per run; owns the usage tracker.
pub struct ContentPipeline {
    config: Config,
    overrides: GenerationOverrides,
    backend: Option<Arc<dyn GenerationProvider>>,
    /// Built-in providers, created on first use and reused for the run
    providers: BTreeMap<ProviderKind, Arc<dyn GenerationProvider>>,
    retry: Option<RetryConfig>,
    tracker: UsageTracker,
}

impl ContentPipeline {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            overrides: GenerationOverrides::default(),
            backend: None,
            providers: BTreeMap::new(),
            retry: None,
            tracker: UsageTracker::new(),
        }
    }

    pub fn with_overrides(mut self, overrides: GenerationOverrides) -> Self {
        self.overrides = overrides;
        self
    }

    /// Send every call to `backend` instead of the built-in provider for the
    /// configured kind.
    pub fn with_backend(mut self, backend: Arc<dyn GenerationProvider>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Replace the provider backoff schedule.
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Resolve provider, model and prompt settings for a content type.
    ///
    /// Precedence: operator overrides, then `[content.<type>]`, then the
    /// provider defaults.
    pub fn resolve(&self, content_type: ContentType) -> Result<ResolvedProvider, ConfigError> {
        let content = self.config.content.get(content_type.as_str()).cloned().unwrap_or_default();

        let name = self
            .overrides
            .provider
            .clone()
            .or(content.provider)
            .unwrap_or_else(|| self.config.default_provider.clone());

        let mut config = self
            .config
            .providers
            .get(&name)
            .cloned()
            .ok_or_else(|| ConfigError::Invalid(format!("provider '{name}' is not defined under [providers]")))?;

        if let Some(model) = self.overrides.model.clone().or(content.model) {
            config.model = model;
        }
        if let Some(temperature) = content.temperature {
            config.temperature = temperature;
        }
        if let Some(max_tokens) = content.max_tokens {
            config.max_tokens = max_tokens;
        }
        if let Some(limit) = self.overrides.cost_limit_usd {
            config.cost_limit_usd = limit;
        }

        Ok(ResolvedProvider {
            name,
            config,
            system_prompt: content.system_prompt.unwrap_or_else(|| self.config.prompt.default_system_prompt.clone()),
            validation: content.validation.unwrap_or_else(|| self.config.prompt.default_validation.clone()),
        })
    }

    /// Provider implementation for a kind: the injected backend, or the
    /// cached built-in one.
    fn provider(&mut self, kind: ProviderKind) -> Arc<dyn GenerationProvider> {
        match &self.backend {
            Some(backend) => Arc::clone(backend),
            None => Arc::clone(self.providers.entry(kind).or_insert_with(|| provider_for(kind))),
        }
    }

    fn adapter(&mut self, resolved: &ResolvedProvider) -> LlmAdapter {
        let provider = self.provider(resolved.config.kind);
        let adapter = LlmAdapter::with_provider(&resolved.name, provider, resolved.config.clone());
        match &self.retry {
            Some(retry) => adapter.with_retry(retry.clone()),
            None => adapter,
        }
    }

    /// Assemble the prompt for a request without sending it.
    pub fn render_prompt(&self, request: &ContentGenerationRequest) -> String {
        let document = read_document(&request.document_path);
        let previous =
            load_previous_outputs(&request.context.feature_dir, &request.context.previous_outputs, &request.output_file);
        build_prompt(request, document.as_deref(), &previous, &self.config.prompt)
    }

    /// Generate, validate and write one artifact.
    pub async fn generate(&mut self, request: &ContentGenerationRequest) -> Result<GeneratedArtifact, WorkflowError> {
        let relative_path = checked_output_path(&request.output_file)?;
        let resolved = self.resolve(request.content_type)?;

        tracing::info!(
            step = %request.context.step,
            content_type = %request.content_type,
            provider = %resolved.name,
            model = %resolved.config.model,
            "Generating content"
        );

        let prompt = self.render_prompt(request);
        let adapter = self.adapter(&resolved);
        let mut response = adapter
            .generate(&GenerationRequest::new(resolved.system_prompt.clone(), prompt), &mut self.tracker)
            .await?;

        response.validation_errors = validate_content(&response.content, &resolved.validation);
        response.validated = response.validation_errors.is_empty();
        if !response.validated {
            tracing::warn!(
                step = %request.context.step,
                errors = ?response.validation_errors,
                "Generated content failed validation"
            );
        }

        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let content = post_process(&response.content, request, &timestamp);

        let path = request.context.feature_dir.join(&relative_path);
        write_atomic(&path, content.as_bytes())
            .map_err(|source| WorkflowError::Artifact { path: path.clone(), source })?;

        tracing::info!(path = %path.display(), chars = content.len(), "Wrote artifact");

        Ok(GeneratedArtifact { path, relative_path: request.output_file.clone(), content, response })
    }

    /// Usage so far, against the default provider's effective cost limit.
    pub fn usage(&self) -> UsageSummary {
        let limit = self.overrides.cost_limit_usd.or_else(|| {
            let name = self.overrides.provider.as_ref().unwrap_or(&self.config.default_provider);
            self.config.providers.get(name).map(|p| p.cost_limit_usd)
        });
        self.tracker.summary(limit)
    }

    pub fn tracker(&self) -> &UsageTracker {
        &self.tracker
    }

    pub fn tracker_mut(&mut self) -> &mut UsageTracker {
        &mut self.tracker
    }
}

fn read_document(path: &Path) -> Option<String> {
    match std::fs::read_to_string(path) {
        Ok(body) => Some(body),
        Err(e) => {
            tracing::warn!(document = %path.display(), error = %e, "Workflow document unavailable, using its name only");
            None
        }
    }
}

/// Read the artifacts of completed steps, keyed by file stem.
///
/// `previous` maps step numbers to paths relative to `feature_dir`.
/// Missing or near-empty files and `exclude` are skipped.
pub fn load_previous_outputs(
    feature_dir: &Path,
    previous: &BTreeMap<String, String>,
    exclude: &str,
) -> BTreeMap<String, String> {
    let mut outputs = BTreeMap::new();
    for (step, relative_path) in previous {
        if relative_path == exclude {
            continue;
        }
        let path = feature_dir.join(relative_path);
        match std::fs::read_to_string(&path) {
            Ok(content) if content.len() > PREVIOUS_OUTPUT_MIN_BYTES => {
                let stem = path.file_stem().map_or_else(|| step.clone(), |s| s.to_string_lossy().into_owned());
                outputs.insert(stem, content);
            }
            Ok(_) => {}
            Err(e) => tracing::debug!(step = %step, path = %path.display(), error = %e, "Previous output unavailable"),
        }
    }
    outputs
}

/// Output paths must stay inside the feature directory.
fn checked_output_path(output_file: &str) -> Result<PathBuf, WorkflowError> {
    let path = PathBuf::from(output_file);
    let escapes = path.components().any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
    if output_file.trim().is_empty() || escapes {
        return Err(WorkflowError::Request(format!(
            "output file '{output_file}' must be a relative path inside the feature directory"
        )));
    }
    Ok(path)
}
