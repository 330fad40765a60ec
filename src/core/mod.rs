//! Core infrastructure for Planrun.
//!
//! Configuration, retry/backoff for provider calls and atomic file writes.

mod config;
mod persist;
mod retry;

pub use config::{
    expand_path, Config, ConfigError, ContentConfig, DocumentConfig, GateSettings, ModeConfig,
    PromptConfig, ProviderConfig, RiskConfig, TechStackPolicy, WorkflowConfig,
};
pub use persist::write_atomic;
pub use retry::{retry_async, RetryConfig, RetryHint, RetryResult};
