//! Configuration management for Planrun.
//!
//! A single document describes the workflow catalog, the gate policy per
//! automation mode, the provider backends and the per-content-type
//! generation settings. TOML is the default format; files ending in
//! `.json` are read as JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::ai::ProviderKind;

/// Errors raised while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Provider used when a content type has no specialization
    pub default_provider: String,

    /// Workflow step catalog
    pub workflow: WorkflowConfig,

    /// Risk scoring weights
    pub risk: RiskConfig,

    /// Gate tables keyed by automation mode (guided, autonomous, learning)
    pub automation_modes: BTreeMap<String, ModeConfig>,

    /// Inputs for conditional gate rules
    pub gates: GateSettings,

    /// Provider backends keyed by logical name
    pub providers: BTreeMap<String, ProviderConfig>,

    /// Per content type overrides keyed by content type tag
    pub content: BTreeMap<String, ContentConfig>,

    /// Prompt assembly settings
    pub prompt: PromptConfig,
}

/// Declarative step catalog.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Directory holding the workflow documents
    pub documents_dir: PathBuf,

    /// Directory (relative to the target root) receiving feature directories
    pub features_dir: PathBuf,

    /// Prefix for generated step numbers ("" gives 01, "s" gives s01)
    pub step_prefix: String,

    /// Ordered workflow document names
    pub numbered_sequence: Vec<String>,

    /// Phase name -> step numbers
    pub phase_mapping: BTreeMap<String, Vec<String>>,

    /// Step number -> prerequisite step numbers
    pub dependency_chain: BTreeMap<String, Vec<String>>,

    /// Step number -> gate name
    pub gate_names: BTreeMap<String, String>,

    /// Step numbers whose artifacts carry compliance impact
    pub compliance_steps: Vec<String>,

    /// Per document overrides of content type and output file
    pub documents: BTreeMap<String, DocumentConfig>,
}

/// Overrides for a single workflow document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentConfig {
    /// Content type tag (prd, srs, design_decisions, ...)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_type: Option<String>,

    /// Output file, relative to the feature directory
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_file: Option<String>,
}

/// Risk score weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskConfig {
    pub base_score: f64,
    pub compliance_weight: f64,
    pub multi_team_weight: f64,
    pub architecture_weight: f64,
}

/// Gate table for one automation mode.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ModeConfig {
    /// Gate name -> behavior token
    pub gates: BTreeMap<String, String>,
}

/// Settings consulted by conditional gate behaviors.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateSettings {
    /// Technologies the team already operates; anything else is "new"
    pub known_technologies: Vec<String>,
}

/// Connection and budget settings for one provider backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Backend kind
    pub kind: ProviderKind,

    /// Model identifier (deployment name for Azure)
    pub model: String,

    /// Literal credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the credential
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,

    /// Endpoint override
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// API version (Azure only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Total attempts per call, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Accumulated cost at which further calls are refused
    #[serde(default = "default_cost_limit")]
    pub cost_limit_usd: f64,

    /// Flat rate override, USD per 1k tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rate_per_1k_tokens: Option<f64>,
}

fn default_max_tokens() -> u32 {
    4000
}
fn default_temperature() -> f32 {
    0.7
}
fn default_timeout_secs() -> u64 {
    60
}
fn default_max_retries() -> u32 {
    3
}
fn default_cost_limit() -> f64 {
    10.0
}

impl ProviderConfig {
    /// Create a config with default limits.
    pub fn new(kind: ProviderKind, model: impl Into<String>) -> Self {
        Self {
            kind,
            model: model.into(),
            api_key: None,
            api_key_env: None,
            base_url: None,
            api_version: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            cost_limit_usd: default_cost_limit(),
            rate_per_1k_tokens: None,
        }
    }

    /// Resolve the credential: literal key first, then the configured or
    /// conventional environment variable for the kind.
    pub fn credential(&self) -> Option<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.is_empty()) {
            return Some(key.clone());
        }
        let env = self.credential_env()?;
        std::env::var(env).ok().filter(|k| !k.is_empty())
    }

    /// Environment variable name consulted for the credential.
    pub fn credential_env(&self) -> Option<&str> {
        self.api_key_env.as_deref().or_else(|| self.kind.default_credential_env())
    }
}

/// Per content type generation settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Provider name from `[providers]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,

    /// Validation criteria; replaces `prompt.default_validation` when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub validation: Option<Vec<String>>,
}

/// How design-decision prompts treat alternatives to the selected stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TechStackPolicy {
    /// Document the recorded selection; never propose alternatives
    #[default]
    DocumentSelection,
    /// Document the selection and the alternatives weighed, no-code included
    OfferAlternatives,
}

/// Prompt assembly settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptConfig {
    /// Bullet list appended to every prompt
    pub common_instructions: Vec<String>,

    /// Criteria applied when a content type declares none
    pub default_validation: Vec<String>,

    /// System prompt used when a content type declares none
    pub default_system_prompt: String,

    pub tech_stack_policy: TechStackPolicy,
}

impl Config {
    /// Load configuration from the standard locations.
    ///
    /// An explicit path must exist. Otherwise `./planrun.toml`, then the
    /// global config file, then built-in defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::load_from_file(path);
        }

        let local_config = PathBuf::from("planrun.toml");
        if local_config.exists() {
            return Self::load_from_file(&local_config);
        }

        if let Some(global_config) = Self::global_config_path() {
            if global_config.exists() {
                return Self::load_from_file(&global_config);
            }
        }

        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        let config = Self::parse(&content, path)?;
        config.validate()?;
        tracing::debug!(path = %path.display(), "Loaded configuration");
        Ok(config)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let is_json = path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let parsed = if is_json {
            serde_json::from_str(content).map_err(|e| e.to_string())
        } else {
            toml::from_str(content).map_err(|e| e.to_string())
        };
        parsed.map_err(|message| ConfigError::Parse { path: path.to_path_buf(), message })
    }

    /// Get the global config file path.
    pub fn global_config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("planrun").join("config.toml"))
    }

    /// Check cross references that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.providers.contains_key(&self.default_provider) {
            return Err(ConfigError::Invalid(format!(
                "default provider '{}' is not defined under [providers]",
                self.default_provider
            )));
        }

        for (content_type, content) in &self.content {
            if let Some(provider) = &content.provider {
                if !self.providers.contains_key(provider) {
                    return Err(ConfigError::Invalid(format!(
                        "content type '{content_type}' references unknown provider '{provider}'"
                    )));
                }
            }
        }

        for (name, provider) in &self.providers {
            if provider.max_retries == 0 {
                return Err(ConfigError::Invalid(format!(
                    "provider '{name}' must allow at least one attempt (max_retries >= 1)"
                )));
            }
            if provider.cost_limit_usd < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "provider '{name}' has a negative cost limit"
                )));
            }
        }

        if self.workflow.numbered_sequence.is_empty() {
            return Err(ConfigError::Invalid("workflow.numbered_sequence is empty".to_string()));
        }

        Ok(())
    }

    /// Gate table for an automation mode.
    pub fn mode_gates(&self, mode: &str) -> Option<&BTreeMap<String, String>> {
        self.automation_modes.get(mode).map(|m| &m.gates)
    }

    /// Documents directory with `~` expanded.
    pub fn documents_dir(&self) -> PathBuf {
        expand_path(&self.workflow.documents_dir)
    }

    /// Serialize back to TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}

/// Expand a leading `~` and environment variables in a configured path.
pub fn expand_path(path: &Path) -> PathBuf {
    let raw = path.to_string_lossy();
    match shellexpand::full(&raw) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => path.to_path_buf(),
    }
}

/// The standard nine-step catalog: (document, gate, content type, output file).
const STANDARD_STEPS: [(&str, &str, &str, &str); 9] = [
    ("01-mvp-entrypoint.md", "feature_directory_creation", "mvp_entrypoint", "project-initialization.md"),
    ("02-gen-prd.md", "prd_generation", "prd", "prd.md"),
    ("03-gen-srs.md", "srs_generation", "srs", "srs.md"),
    ("04-gen-design-decisions-lite.md", "design_decisions", "design_decisions", "design-decisions.md"),
    ("05-gen-design.md", "design_analysis", "design_analysis", "design-analysis.md"),
    ("06-gen-tasks-and-testing.md", "task_creation", "tasks", "tasks.md"),
    ("07-process-tasks.md", "task_implementation", "task_processing", "implementation-guide.md"),
    ("08-gen-completion-summary.md", "completion_summary", "completion_summary", "completion-summary.md"),
    ("09-gen-project-history.md", "project_history", "project_history", "project-history.md"),
];

impl Default for WorkflowConfig {
    fn default() -> Self {
        let numbered_sequence = STANDARD_STEPS.iter().map(|(doc, ..)| (*doc).to_string()).collect();

        let gate_names = STANDARD_STEPS
            .iter()
            .enumerate()
            .map(|(i, (_, gate, ..))| (format!("{:02}", i + 1), (*gate).to_string()))
            .collect();

        let documents = STANDARD_STEPS
            .iter()
            .map(|(doc, _, content_type, output)| {
                (
                    (*doc).to_string(),
                    DocumentConfig {
                        content_type: Some((*content_type).to_string()),
                        output_file: Some((*output).to_string()),
                    },
                )
            })
            .collect();

        let phase_mapping = [
            ("foundation", &["01"][..]),
            ("requirements", &["02", "03"][..]),
            ("design", &["04", "05"][..]),
            ("implementation", &["06", "07"][..]),
            ("completion", &["08", "09"][..]),
        ]
        .into_iter()
        .map(|(phase, steps)| (phase.to_string(), steps.iter().map(|s| (*s).to_string()).collect()))
        .collect();

        let dependency_chain = [
            ("02", &["01"][..]),
            ("03", &["02"][..]),
            ("04", &["02", "03"][..]),
            ("05", &["03", "04"][..]),
            ("06", &["05"][..]),
            ("07", &["06"][..]),
            ("08", &["07"][..]),
            ("09", &["08"][..]),
        ]
        .into_iter()
        .map(|(step, deps)| (step.to_string(), deps.iter().map(|s| (*s).to_string()).collect()))
        .collect();

        Self {
            documents_dir: PathBuf::from("workflow"),
            features_dir: PathBuf::from("features"),
            step_prefix: String::new(),
            numbered_sequence,
            phase_mapping,
            dependency_chain,
            gate_names,
            compliance_steps: Vec::new(),
            documents,
        }
    }
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            base_score: 0.3,
            compliance_weight: 0.2,
            multi_team_weight: 0.1,
            architecture_weight: 0.2,
        }
    }
}

impl Default for GateSettings {
    fn default() -> Self {
        Self {
            known_technologies: ["Node.js", "Express", "Python", "Flask", "SQLite", "PostgreSQL", "React"]
                .iter()
                .map(|t| (*t).to_string())
                .collect(),
        }
    }
}

fn gate_table(entries: &[(&str, &str)]) -> ModeConfig {
    ModeConfig {
        gates: entries.iter().map(|(gate, behavior)| ((*gate).to_string(), (*behavior).to_string())).collect(),
    }
}

fn default_automation_modes() -> BTreeMap<String, ModeConfig> {
    let guided = gate_table(&[
        ("feature_directory_creation", "required"),
        ("prd_generation", "required"),
        ("srs_generation", "required"),
        ("design_decisions", "required"),
        ("design_analysis", "required"),
        ("task_creation", "required"),
        ("task_implementation", "required_for_destructive"),
        ("completion_summary", "optional"),
        ("project_history", "optional"),
    ]);
    let autonomous = gate_table(&[
        ("feature_directory_creation", "skip"),
        ("prd_generation", "skip"),
        ("srs_generation", "skip"),
        ("design_decisions", "required_for_new_tech"),
        ("design_analysis", "skip"),
        ("task_creation", "skip"),
        ("task_implementation", "required_for_destructive"),
        ("completion_summary", "skip"),
        ("project_history", "skip"),
    ]);
    let learning = gate_table(&[
        ("feature_directory_creation", "optional"),
        ("prd_generation", "learn_from_history"),
        ("srs_generation", "learn_from_history"),
        ("design_decisions", "learn_from_history"),
        ("design_analysis", "learn_from_history"),
        ("task_creation", "learn_from_history"),
        ("task_implementation", "required_for_destructive"),
        ("completion_summary", "optional"),
        ("project_history", "skip"),
    ]);

    [("guided", guided), ("autonomous", autonomous), ("learning", learning)]
        .into_iter()
        .map(|(mode, table)| (mode.to_string(), table))
        .collect()
}

fn default_providers() -> BTreeMap<String, ProviderConfig> {
    let mut providers = BTreeMap::new();
    providers.insert("openai".to_string(), ProviderConfig::new(ProviderKind::OpenAi, "gpt-4-turbo"));
    providers.insert(
        "anthropic".to_string(),
        ProviderConfig::new(ProviderKind::Anthropic, "claude-3-5-sonnet-20241022"),
    );
    providers.insert("azure_openai".to_string(), ProviderConfig::new(ProviderKind::AzureOpenAi, "gpt-4"));
    providers
        .insert("local_ollama".to_string(), ProviderConfig::new(ProviderKind::LocalOllama, "llama3.1"));
    providers.insert("groq".to_string(), ProviderConfig::new(ProviderKind::Groq, "mixtral-8x7b-32768"));
    providers.insert("google".to_string(), ProviderConfig::new(ProviderKind::Google, "gemini-1.5-flash"));
    providers.insert("offline".to_string(), ProviderConfig::new(ProviderKind::Offline, "template"));
    providers
}

fn content(system_prompt: &str, validation: &[&str]) -> ContentConfig {
    ContentConfig {
        system_prompt: Some(system_prompt.to_string()),
        validation: Some(validation.iter().map(|c| (*c).to_string()).collect()),
        ..ContentConfig::default()
    }
}

fn default_content() -> BTreeMap<String, ContentConfig> {
    let mut map = BTreeMap::new();
    map.insert(
        "mvp_entrypoint".to_string(),
        content(
            "You are a product strategist initializing an MVP project from real stakeholder answers.",
            &["not_empty", "contains_markdown", "min_length:300"],
        ),
    );
    map.insert(
        "prd".to_string(),
        content(
            "You are a senior product manager writing a concise, testable product requirements document.",
            &["not_empty", "contains_markdown", "min_length:500", "contains:requirement"],
        ),
    );
    map.insert(
        "srs".to_string(),
        content(
            "You are a systems analyst writing a software requirements specification with verifiable requirements.",
            &["not_empty", "contains_markdown", "min_length:500"],
        ),
    );
    map.insert(
        "design_decisions".to_string(),
        ContentConfig {
            temperature: Some(0.4),
            ..content(
                "You are a pragmatic software architect documenting technology decisions and their rationale.",
                &["not_empty", "contains_markdown", "min_length:400"],
            )
        },
    );
    map.insert(
        "design_analysis".to_string(),
        content(
            "You are a software architect producing a design analysis that an engineer can implement directly.",
            &["not_empty", "contains_markdown", "min_length:500"],
        ),
    );
    map.insert(
        "tasks".to_string(),
        content(
            "You are a tech lead breaking a design into ordered, testable implementation tasks.",
            &["not_empty", "contains_markdown", "contains:- [ ]"],
        ),
    );
    map.insert(
        "task_processing".to_string(),
        content(
            "You are a senior engineer writing an implementation guide for the planned tasks.",
            &["not_empty", "contains_markdown"],
        ),
    );
    map.insert(
        "completion_summary".to_string(),
        content(
            "You are a delivery lead summarizing what was built, verified and deferred.",
            &["not_empty", "contains_markdown"],
        ),
    );
    map.insert(
        "project_history".to_string(),
        content(
            "You are a project historian recording decisions and lessons learned.",
            &["not_empty", "contains_markdown"],
        ),
    );
    map.insert(
        "enterprise".to_string(),
        content(
            "You are an enterprise architect planning the transition of an MVP to a governed, scalable system.",
            &["not_empty", "contains_markdown", "min_length:500"],
        ),
    );
    map
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            common_instructions: [
                "Write in clear, professional markdown",
                "Use the real project data; never leave placeholder text",
                "Keep every section specific to this feature",
                "Prefer short paragraphs, tables and checklists over prose",
            ]
            .iter()
            .map(|s| (*s).to_string())
            .collect(),
            default_validation: vec!["not_empty".to_string(), "contains_markdown".to_string()],
            default_system_prompt: "You are a helpful AI assistant.".to_string(),
            tech_stack_policy: TechStackPolicy::default(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_provider: "anthropic".to_string(),
            workflow: WorkflowConfig::default(),
            risk: RiskConfig::default(),
            automation_modes: default_automation_modes(),
            gates: GateSettings::default(),
            providers: default_providers(),
            content: default_content(),
            prompt: PromptConfig::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.workflow.numbered_sequence.len(), 9);
        assert_eq!(config.default_provider, "anthropic");
    }

    #[test]
    fn test_default_modes_cover_all_gates() {
        let config = Config::default();
        for mode in ["guided", "autonomous", "learning"] {
            let gates = config.mode_gates(mode).unwrap();
            for gate in config.workflow.gate_names.values() {
                assert!(gates.contains_key(gate), "{mode} is missing {gate}");
            }
        }
    }

    #[test]
    fn test_parse_toml_overrides() {
        let toml = r#"
default_provider = "fast"

[providers.fast]
kind = "groq"
model = "mixtral-8x7b-32768"
cost_limit_usd = 2.5

[workflow]
numbered_sequence = ["a.md", "b.md"]
"#;
        let config = Config::parse(toml, Path::new("planrun.toml")).unwrap();
        assert!(config.validate().is_ok());
        let fast = &config.providers["fast"];
        assert_eq!(fast.kind, ProviderKind::Groq);
        assert_eq!(fast.max_retries, 3);
        assert!((fast.cost_limit_usd - 2.5).abs() < f64::EPSILON);
        assert_eq!(config.workflow.numbered_sequence, vec!["a.md", "b.md"]);
    }

    #[test]
    fn test_parse_json_by_extension() {
        let json = r#"{"default_provider": "offline", "providers": {"offline": {"kind": "offline", "model": "template"}}}"#;
        let config = Config::parse(json, Path::new("llm-config.json")).unwrap();
        assert_eq!(config.default_provider, "offline");
    }

    #[test]
    fn test_unknown_default_provider_rejected() {
        let config = Config { default_provider: "missing".to_string(), ..Config::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_content_with_unknown_provider_rejected() {
        let mut config = Config::default();
        config.content.insert(
            "prd".to_string(),
            ContentConfig { provider: Some("nope".to_string()), ..ContentConfig::default() },
        );
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_error_names_file() {
        let err = Config::parse("default_provider = [", Path::new("broken.toml")).unwrap_err();
        assert!(err.to_string().contains("broken.toml"));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let err = Config::load(Some(Path::new("/nonexistent/planrun.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn test_literal_credential_wins() {
        let mut provider = ProviderConfig::new(ProviderKind::OpenAi, "gpt-4");
        provider.api_key = Some("sk-literal".to_string());
        provider.api_key_env = Some("PLANRUN_TEST_UNSET_VAR".to_string());
        assert_eq!(provider.credential().as_deref(), Some("sk-literal"));
    }

    #[test]
    fn test_config_round_trips_through_toml() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        let parsed = Config::parse(&text, Path::new("planrun.toml")).unwrap();
        assert_eq!(parsed.workflow.numbered_sequence, config.workflow.numbered_sequence);
        assert_eq!(parsed.providers, config.providers);
    }
}
