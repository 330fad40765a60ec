//! Response validation.
//!
//! Failures are reported to the caller and never discard content.

use std::str::FromStr;

/// A single check applied to generated content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationCriterion {
    /// Content has non-whitespace text
    NotEmpty,
    /// Content uses at least one markdown marker (`#`, `*`, `` ` ``, `-`)
    ContainsMarkdown,
    /// Content has at least this many characters
    MinLength(usize),
    /// Content contains this text, case-insensitively
    Contains(String),
    /// Content has a markdown heading line
    HasHeading,
}

impl FromStr for ValidationCriterion {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let criterion = match s.split_once(':') {
            Some(("min_length", n)) => Self::MinLength(
                n.trim().parse().map_err(|_| format!("invalid min_length value: {n}"))?,
            ),
            Some(("contains", text)) if !text.is_empty() => Self::Contains(text.to_string()),
            None if s == "not_empty" => Self::NotEmpty,
            None if s == "contains_markdown" => Self::ContainsMarkdown,
            None if s == "has_heading" => Self::HasHeading,
            _ => return Err(format!("unknown validation criterion: {s}")),
        };
        Ok(criterion)
    }
}

impl ValidationCriterion {
    /// Failure message, or `None` when the content passes.
    pub fn check(&self, content: &str) -> Option<String> {
        let passed = match self {
            Self::NotEmpty => !content.trim().is_empty(),
            Self::ContainsMarkdown => ['#', '*', '`', '-'].iter().any(|m| content.contains(*m)),
            Self::MinLength(n) => content.chars().count() >= *n,
            Self::Contains(text) => content.to_lowercase().contains(&text.to_lowercase()),
            Self::HasHeading => content.lines().any(|l| l.trim_start().starts_with('#')),
        };
        if passed {
            return None;
        }
        Some(match self {
            Self::NotEmpty => "content is empty".to_string(),
            Self::ContainsMarkdown => "content has no markdown formatting".to_string(),
            Self::MinLength(n) => {
                format!("content is {} characters, below the minimum of {n}", content.chars().count())
            }
            Self::Contains(text) => format!("content does not mention '{text}'"),
            Self::HasHeading => "content has no heading".to_string(),
        })
    }
}

/// Check `content` against every criterion and collect failures.
///
/// Unparseable criteria are logged and skipped.
pub fn validate_content(content: &str, criteria: &[String]) -> Vec<String> {
    criteria
        .iter()
        .filter_map(|raw| match raw.parse::<ValidationCriterion>() {
            Ok(criterion) => Some(criterion),
            Err(e) => {
                tracing::warn!(criterion = %raw, "Ignoring validation criterion: {e}");
                None
            }
        })
        .filter_map(|criterion| criterion.check(content))
        .collect()
}
