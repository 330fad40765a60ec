//! Execution plan: the gate decision for every step, in catalog order.

use std::fmt::Write as _;
use std::path::PathBuf;

use serde::Serialize;

use super::catalog::{StepCatalog, WorkflowStep};
use super::context::{ComplianceFramework, ExecutionContext};
use super::gate::{AutomationMode, GateDecision, GatePolicy};

/// A step with its resolved gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PlannedStep {
    #[serde(flatten)]
    pub step: WorkflowStep,
    pub decision: GateDecision,
}

/// Ordered plan for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionPlan {
    pub feature_name: String,
    pub feature_slug: String,
    pub mode: AutomationMode,
    pub feature_dir: PathBuf,
    pub risk_score: f64,
    pub compliance: Option<ComplianceFramework>,
    pub steps: Vec<PlannedStep>,
}

impl ExecutionPlan {
    /// Resolve every gate. Pure: same inputs, same plan.
    pub fn build(catalog: &StepCatalog, policy: &GatePolicy, context: &ExecutionContext) -> Self {
        let steps = catalog
            .steps()
            .iter()
            .map(|step| PlannedStep { step: step.clone(), decision: policy.resolve(step, context) })
            .collect();

        Self {
            feature_name: context.feature_name.clone(),
            feature_slug: context.feature_slug.clone(),
            mode: context.mode,
            feature_dir: context.feature_dir.clone(),
            risk_score: context.risk_score,
            compliance: context.compliance,
            steps,
        }
    }

    /// (step number, decision) pairs in execution order.
    pub fn decisions(&self) -> Vec<(&str, GateDecision)> {
        self.steps.iter().map(|p| (p.step.number.as_str(), p.decision)).collect()
    }

    /// Number of steps that will block for operator input.
    pub fn blocking_count(&self) -> usize {
        self.steps.iter().filter(|p| p.decision.blocks()).count()
    }

    /// Human-readable plan with phase headers and a legend.
    pub fn render(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "Execution plan: {} ({} mode, risk {:.2})", self.feature_name, self.mode, self.risk_score);
        let _ = writeln!(out, "Feature directory: {}", self.feature_dir.display());
        if let Some(framework) = self.compliance {
            let _ = writeln!(out, "Compliance: {framework}");
        }

        let mut current_phase: Option<&str> = None;
        for planned in &self.steps {
            if current_phase != Some(planned.step.phase.as_str()) {
                current_phase = Some(&planned.step.phase);
                let _ = writeln!(out, "\n{}", planned.step.phase.to_uppercase());
            }
            let marker = if planned.step.compliance_impact { "*" } else { " " };
            let _ = writeln!(
                out,
                "  {marker}{:<4} {:<8} {} -> {}",
                planned.step.number,
                decision_tag(planned.decision),
                planned.step.document_name,
                planned.step.output_file
            );
        }

        let _ = writeln!(
            out,
            "\n{} step(s), {} waiting for approval",
            self.steps.len(),
            self.blocking_count()
        );
        out.push_str(
            "Legend: [GATE] approval required, [BOARD] approval board sign-off, [learn] history review, \
             [auto] optional (auto-approved), [skip] gate bypassed, * compliance impact\n",
        );
        out
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

fn decision_tag(decision: GateDecision) -> &'static str {
    match decision {
        GateDecision::Required => "[GATE]",
        GateDecision::ApprovalBoardRequired => "[BOARD]",
        GateDecision::LearnFromHistory => "[learn]",
        GateDecision::Optional => "[auto]",
        GateDecision::Skip => "[skip]",
    }
}
