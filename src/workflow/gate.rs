//! Gate policy resolution.
//!
//! Each automation mode maps gate names to behavior tokens. Conditional
//! behaviors are evaluated against the execution context. Compliance always
//! wins over automation: a compliance-impacting step under an active
//! framework is never skipped.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::catalog::WorkflowStep;
use super::context::ExecutionContext;
use crate::core::Config;

/// Which gate table to consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationMode {
    #[default]
    Guided,
    Autonomous,
    Learning,
}

impl AutomationMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Guided => "guided",
            Self::Autonomous => "autonomous",
            Self::Learning => "learning",
        }
    }

    /// Whether the run asks for confirmation before starting.
    pub fn confirms_run(self) -> bool {
        !matches!(self, Self::Autonomous)
    }
}

impl fmt::Display for AutomationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AutomationMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guided" => Ok(Self::Guided),
            "autonomous" => Ok(Self::Autonomous),
            "learning" => Ok(Self::Learning),
            other => Err(format!("unknown automation mode '{other}' (expected guided, autonomous or learning)")),
        }
    }
}

/// Resolved gate outcome for one step in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GateDecision {
    Required,
    Optional,
    Skip,
    LearnFromHistory,
    ApprovalBoardRequired,
}

impl GateDecision {
    /// Whether the step blocks for operator input.
    pub fn blocks(self) -> bool {
        matches!(self, Self::Required | Self::ApprovalBoardRequired | Self::LearnFromHistory)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Optional => "optional",
            Self::Skip => "skip",
            Self::LearnFromHistory => "learn_from_history",
            Self::ApprovalBoardRequired => "approval_board_required",
        }
    }
}

impl fmt::Display for GateDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Raw behavior token from a gate table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateBehavior {
    Required,
    Optional,
    Skip,
    LearnFromHistory,
    RequiredForNewTech,
    RequiredForDestructive,
    RequiredForNewArchitecture,
    RequiredForComplianceChanges,
    RequiredForProductionChanges,
    RequiredWithApprovalBoard,
    /// Unrecognized token; resolves to required
    Unknown(String),
}

impl GateBehavior {
    /// Parse a token in snake_case or camelCase. Never fails.
    pub fn parse(token: &str) -> Self {
        match normalize_token(token).as_str() {
            "required" => Self::Required,
            "optional" => Self::Optional,
            "skip" => Self::Skip,
            "learn_from_history" => Self::LearnFromHistory,
            "required_for_new_tech" => Self::RequiredForNewTech,
            "required_for_destructive" => Self::RequiredForDestructive,
            "required_for_new_architecture" => Self::RequiredForNewArchitecture,
            "required_for_compliance_changes" => Self::RequiredForComplianceChanges,
            "required_for_production_changes" => Self::RequiredForProductionChanges,
            "required_with_approval_board" => Self::RequiredWithApprovalBoard,
            _ => Self::Unknown(token.to_string()),
        }
    }
}

fn normalize_token(token: &str) -> String {
    let mut out = String::with_capacity(token.len() + 4);
    for c in token.trim().chars() {
        if c.is_ascii_uppercase() {
            if !out.is_empty() && !out.ends_with('_') {
                out.push('_');
            }
            out.push(c.to_ascii_lowercase());
        } else if c == '-' || c == ' ' {
            out.push('_');
        } else {
            out.push(c);
        }
    }
    out
}

/// Source of history-based gate recommendations.
///
/// `learn_from_history` gates consult this model. Without a recommendation
/// they resolve to required.
pub trait HistoryModel: Send + Sync {
    fn recommend(&self, step: &WorkflowStep, context: &ExecutionContext) -> Option<GateDecision>;
}

/// History model with no data.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoHistory;

impl HistoryModel for NoHistory {
    fn recommend(&self, _step: &WorkflowStep, _context: &ExecutionContext) -> Option<GateDecision> {
        None
    }
}

/// Gate policy for all modes.
pub struct GatePolicy {
    tables: BTreeMap<String, BTreeMap<String, GateBehavior>>,
    known_technologies: Vec<String>,
    history: Box<dyn HistoryModel>,
}

impl fmt::Debug for GatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatePolicy")
            .field("tables", &self.tables)
            .field("known_technologies", &self.known_technologies)
            .finish_non_exhaustive()
    }
}

impl GatePolicy {
    pub fn from_config(config: &Config) -> Self {
        let tables = config
            .automation_modes
            .iter()
            .map(|(mode, table)| {
                let gates = table.gates.iter().map(|(gate, token)| (gate.clone(), GateBehavior::parse(token))).collect();
                (mode.to_ascii_lowercase(), gates)
            })
            .collect();

        Self {
            tables,
            known_technologies: config.gates.known_technologies.iter().map(|t| t.to_lowercase()).collect(),
            history: Box::new(NoHistory),
        }
    }

    /// Plug in a history model for `learn_from_history` gates.
    pub fn with_history(mut self, history: Box<dyn HistoryModel>) -> Self {
        self.history = history;
        self
    }

    /// Behavior configured for a step's gate in a mode.
    pub fn behavior(&self, mode: AutomationMode, gate_name: &str) -> GateBehavior {
        self.tables
            .get(mode.as_str())
            .and_then(|table| table.get(gate_name))
            .cloned()
            .unwrap_or_else(|| GateBehavior::Unknown(gate_name.to_string()))
    }

    /// Resolve the gate decision for a step.
    pub fn resolve(&self, step: &WorkflowStep, context: &ExecutionContext) -> GateDecision {
        let behavior = self.behavior(context.mode, &step.gate_name);
        let compliance_active = context.compliance.is_some();

        let decision = match &behavior {
            GateBehavior::Required | GateBehavior::RequiredForDestructive | GateBehavior::RequiredForProductionChanges => {
                GateDecision::Required
            }
            GateBehavior::Optional => GateDecision::Optional,
            GateBehavior::Skip => GateDecision::Skip,
            GateBehavior::LearnFromHistory => self.history.recommend(step, context).unwrap_or(GateDecision::Required),
            GateBehavior::RequiredForNewTech => {
                if self.has_new_technology(context) {
                    GateDecision::Required
                } else {
                    GateDecision::Optional
                }
            }
            GateBehavior::RequiredForNewArchitecture => {
                if context.architecture_impact {
                    GateDecision::Required
                } else {
                    GateDecision::Optional
                }
            }
            GateBehavior::RequiredForComplianceChanges => {
                if compliance_active && step.compliance_impact {
                    GateDecision::Required
                } else {
                    GateDecision::Optional
                }
            }
            GateBehavior::RequiredWithApprovalBoard => GateDecision::ApprovalBoardRequired,
            GateBehavior::Unknown(token) => {
                tracing::warn!(gate = %step.gate_name, token = %token, "Unknown gate behavior, requiring approval");
                GateDecision::Required
            }
        };

        let decision = if compliance_active
            && step.compliance_impact
            && matches!(decision, GateDecision::Skip | GateDecision::Optional)
        {
            GateDecision::Required
        } else {
            decision
        };

        tracing::debug!(step = %step.number, gate = %step.gate_name, ?behavior, %decision, "Resolved gate");
        decision
    }

    fn has_new_technology(&self, context: &ExecutionContext) -> bool {
        context
            .technologies()
            .iter()
            .any(|tech| !self.known_technologies.contains(&tech.to_lowercase()))
    }
}
