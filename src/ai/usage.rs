//! Run-wide token and cost accounting.

use std::collections::BTreeMap;

use serde::Serialize;

/// Raised when accumulated cost has reached the configured ceiling.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("cost limit reached: spent ${spent_usd:.4} of ${limit_usd:.4}")]
pub struct BudgetExceeded {
    pub spent_usd: f64,
    pub limit_usd: f64,
}

/// Usage attributed to one provider.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ProviderUsage {
    pub calls: u64,
    pub tokens: u64,
    pub cost_usd: f64,
}

/// Snapshot of a tracker.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UsageSummary {
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub calls: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cost_limit_usd: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remaining_budget_usd: Option<f64>,
    pub by_provider: BTreeMap<String, ProviderUsage>,
}

/// Running totals shared by every generation call in a run.
///
/// The tracker is owned by the pipeline and passed by `&mut` into each
/// call, so check, call and record happen in that order with no sharing.
#[derive(Debug, Clone, Default)]
pub struct UsageTracker {
    total_tokens: u64,
    total_cost_usd: f64,
    calls: u64,
    by_provider: BTreeMap<String, ProviderUsage>,
}

impl UsageTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse further calls once spent cost meets or exceeds `limit_usd`.
    pub fn check_budget(&self, limit_usd: f64) -> Result<(), BudgetExceeded> {
        if self.total_cost_usd >= limit_usd {
            return Err(BudgetExceeded { spent_usd: self.total_cost_usd, limit_usd });
        }
        Ok(())
    }

    /// Record a successful call. Negative costs are clamped to zero.
    pub fn record(&mut self, provider: &str, tokens: u64, cost_usd: f64) {
        let cost = if cost_usd.is_finite() { cost_usd.max(0.0) } else { 0.0 };

        self.total_tokens += tokens;
        self.total_cost_usd += cost;
        self.calls += 1;

        let entry = self.by_provider.entry(provider.to_string()).or_default();
        entry.calls += 1;
        entry.tokens += tokens;
        entry.cost_usd += cost;

        tracing::debug!(provider, tokens, cost_usd = cost, total_cost_usd = self.total_cost_usd, "Recorded usage");
    }

    pub fn total_tokens(&self) -> u64 {
        self.total_tokens
    }

    pub fn total_cost_usd(&self) -> f64 {
        self.total_cost_usd
    }

    pub fn calls(&self) -> u64 {
        self.calls
    }

    /// Snapshot, with the remaining budget when a limit is given.
    pub fn summary(&self, cost_limit_usd: Option<f64>) -> UsageSummary {
        UsageSummary {
            total_tokens: self.total_tokens,
            total_cost_usd: self.total_cost_usd,
            calls: self.calls,
            cost_limit_usd,
            remaining_budget_usd: cost_limit_usd.map(|limit| (limit - self.total_cost_usd).max(0.0)),
            by_provider: self.by_provider.clone(),
        }
    }
}

impl std::fmt::Display for UsageSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} calls, {} tokens, ${:.4}", self.calls, self.total_tokens, self.total_cost_usd)?;
        if let (Some(limit), Some(remaining)) = (self.cost_limit_usd, self.remaining_budget_usd) {
            write!(f, " of ${limit:.2} (${remaining:.4} remaining)")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_budget_at_limit_is_rejected() {
        let mut tracker = UsageTracker::new();
        tracker.record("openai", 1000, 0.5);
        assert!(tracker.check_budget(0.6).is_ok());
        tracker.record("openai", 1000, 0.1);
        let err = tracker.check_budget(0.6).unwrap_err();
        assert!((err.limit_usd - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_zero_limit_rejects_first_call() {
        assert!(UsageTracker::new().check_budget(0.0).is_err());
    }

    #[test]
    fn test_negative_cost_never_reported() {
        let mut tracker = UsageTracker::new();
        tracker.record("weird", 10, -3.0);
        tracker.record("weird", 10, f64::NAN);
        assert_eq!(tracker.total_cost_usd(), 0.0);
        assert_eq!(tracker.total_tokens(), 20);
        assert_eq!(tracker.calls(), 2);
    }

    #[test]
    fn test_summary_breakdown() {
        let mut tracker = UsageTracker::new();
        tracker.record("anthropic", 100, 0.25);
        tracker.record("groq", 50, 0.25);
        tracker.record("anthropic", 100, 0.5);

        let summary = tracker.summary(Some(2.0));
        assert_eq!(summary.calls, 3);
        assert_eq!(summary.by_provider["anthropic"].calls, 2);
        assert_eq!(summary.by_provider["groq"].tokens, 50);
        assert!((summary.remaining_budget_usd.unwrap() - 1.0).abs() < 1e-9);
        assert!(summary.to_string().contains("3 calls"));
    }
}
