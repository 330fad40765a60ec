//! Per-model rates, USD per 1k tokens.
//!
//! Costs are approximations: rates are flat across prompt and completion
//! tokens, and providers that report no usage are billed on a word-count
//! estimate.

use super::ProviderKind;

const OPENAI_RATES: &[(&str, f64)] = &[
    ("gpt-4", 0.03),
    ("gpt-4-turbo", 0.01),
    ("gpt-3.5-turbo", 0.002),
    ("gpt-3.5-turbo-16k", 0.004),
];

const ANTHROPIC_RATES: &[(&str, f64)] = &[
    ("claude-3-opus-20240229", 0.015),
    ("claude-3-sonnet-20240229", 0.003),
    ("claude-3-haiku-20240307", 0.000_25),
    ("claude-3-5-sonnet-20241022", 0.003),
];

const GROQ_RATES: &[(&str, f64)] = &[
    ("llama2-70b-4096", 0.0007),
    ("mixtral-8x7b-32768", 0.0006),
    ("gemma-7b-it", 0.0001),
];

const GOOGLE_RATES: &[(&str, f64)] = &[
    ("gemini-pro", 0.0005),
    ("gemini-pro-vision", 0.0025),
    ("gemini-1.5-pro", 0.0035),
    ("gemini-1.5-flash", 0.000_075),
];

/// Rate for a model, with a conservative per-kind default for unknown models.
pub fn rate_per_1k_tokens(kind: ProviderKind, model: &str) -> f64 {
    let (table, default) = match kind {
        ProviderKind::OpenAi | ProviderKind::AzureOpenAi => (OPENAI_RATES, 0.01),
        ProviderKind::Anthropic => (ANTHROPIC_RATES, 0.003),
        ProviderKind::Groq => (GROQ_RATES, 0.0005),
        ProviderKind::Google => (GOOGLE_RATES, 0.0005),
        ProviderKind::LocalOllama | ProviderKind::Offline => return 0.0,
    };

    table.iter().find(|(name, _)| *name == model).map_or(default, |(_, rate)| *rate)
}

/// Estimate tokens from a response body (words x 1.3).
pub fn estimate_tokens(content: &str) -> u64 {
    let words = content.split_whitespace().count() as f64;
    (words * 1.3) as u64
}

/// Cost of `tokens` at `rate` per 1k, never negative.
pub(crate) fn cost_for(tokens: u64, rate: f64) -> f64 {
    (tokens as f64 / 1000.0 * rate).max(0.0)
}
