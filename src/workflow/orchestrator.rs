//! Workflow orchestrator.
//!
//! Builds the plan, confirms it, then drives each step in catalog order:
//! gate, generate, persist. Any failure halts the run; artifacts already
//! written stay on disk.

use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;

use super::approval::Approver;
use super::catalog::StepCatalog;
use super::context::ExecutionContext;
use super::gate::{GateDecision, GatePolicy, HistoryModel};
use super::manifest::{log_line, DocumentStatus, FeatureMetadata, ManifestStore, StepUpdate, STATUS_COMPLETED};
use super::plan::{ExecutionPlan, PlannedStep};
use crate::ai::UsageSummary;
use crate::core::{Config, ConfigError};
use crate::error::WorkflowError;
use crate::generation::{
    ContentGenerationRequest, ContentPipeline, DocumentInstructions, InstructionExtractor, MarkdownExtractor,
};

/// Where a run ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    PlanBuilt,
    DryRunComplete,
    Confirmed,
    Running,
    Succeeded,
    Failed,
    UserCancelled,
}

impl RunState {
    /// Process exit code for a final state.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Succeeded | Self::DryRunComplete => 0,
            Self::UserCancelled => 130,
            Self::PlanBuilt | Self::Confirmed | Self::Running | Self::Failed => 1,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PlanBuilt => "plan built",
            Self::DryRunComplete => "dry run complete",
            Self::Confirmed => "confirmed",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::UserCancelled => "cancelled",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Show the plan and stop
    pub dry_run: bool,
    /// Skip steps the manifest already records as completed
    pub resume: bool,
}

/// One executed step.
#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub number: String,
    pub decision: GateDecision,
    pub path: PathBuf,
    pub provider: String,
    pub model: String,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub validated: bool,
    pub validation_errors: Vec<String>,
}

/// Result of a run.
#[derive(Debug)]
pub struct RunReport {
    pub state: RunState,
    pub plan: ExecutionPlan,
    pub executed: Vec<StepOutcome>,
    /// Steps skipped because an earlier run completed them
    pub resumed: Vec<String>,
    pub failure: Option<WorkflowError>,
    pub usage: UsageSummary,
}

impl RunReport {
    pub fn succeeded(&self) -> bool {
        self.state == RunState::Succeeded
    }

    pub fn exit_code(&self) -> i32 {
        self.state.exit_code()
    }
}

/// Drives one feature run.
pub struct Orchestrator {
    config: Config,
    catalog: StepCatalog,
    policy: GatePolicy,
    pipeline: ContentPipeline,
    approver: Arc<dyn Approver>,
    extractor: Box<dyn InstructionExtractor>,
}

impl Orchestrator {
    pub fn new(config: Config, approver: Arc<dyn Approver>) -> Result<Self, ConfigError> {
        let catalog = StepCatalog::from_config(&config.workflow)?;
        let policy = GatePolicy::from_config(&config);
        let pipeline = ContentPipeline::new(config.clone());
        Ok(Self { config, catalog, policy, pipeline, approver, extractor: Box::new(MarkdownExtractor) })
    }

    /// Replace the generation pipeline (overrides, backend, retry schedule).
    pub fn with_pipeline(mut self, pipeline: ContentPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn with_extractor(mut self, extractor: Box<dyn InstructionExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    pub fn with_history(mut self, history: Box<dyn HistoryModel>) -> Self {
        self.policy = self.policy.with_history(history);
        self
    }

    pub fn catalog(&self) -> &StepCatalog {
        &self.catalog
    }

    pub fn pipeline(&self) -> &ContentPipeline {
        &self.pipeline
    }

    /// Assess risk and resolve every gate.
    pub fn plan(&self, context: &mut ExecutionContext) -> ExecutionPlan {
        context.assess_risk(&self.config.risk);
        ExecutionPlan::build(&self.catalog, &self.policy, context)
    }

    /// Workflow document path for a step.
    pub fn document_path(&self, root: &Path, document_name: &str) -> PathBuf {
        root.join(self.config.documents_dir()).join(document_name)
    }

    /// Read a workflow document and extract its instructions. Missing
    /// documents give empty instructions.
    pub fn instructions(&self, root: &Path, document_name: &str) -> DocumentInstructions {
        std::fs::read_to_string(self.document_path(root, document_name))
            .map(|body| self.extractor.extract(&body))
            .unwrap_or_default()
    }

    pub async fn run(&mut self, context: &mut ExecutionContext, options: RunOptions) -> RunReport {
        self.run_until(context, options, std::future::pending()).await
    }

    /// Run until done or until `cancel` resolves.
    ///
    /// Cancellation is observed while waiting for the operator and while a
    /// provider call is in flight. The manifest is only written after a step
    /// completes, so a cancelled step leaves no record.
    pub async fn run_until<F>(&mut self, context: &mut ExecutionContext, options: RunOptions, cancel: F) -> RunReport
    where
        F: Future<Output = ()>,
    {
        let plan = self.plan(context);
        tracing::info!(
            feature = %plan.feature_slug,
            mode = %plan.mode,
            steps = plan.steps.len(),
            blocking = plan.blocking_count(),
            risk = plan.risk_score,
            "Execution plan built"
        );

        let mut report = RunReport {
            state: RunState::PlanBuilt,
            plan,
            executed: Vec::new(),
            resumed: Vec::new(),
            failure: None,
            usage: self.pipeline.usage(),
        };

        if options.dry_run {
            report.state = RunState::DryRunComplete;
            return report;
        }

        tokio::pin!(cancel);

        let store = ManifestStore::new(&context.feature_dir);
        let completed = if options.resume {
            match store.load() {
                Ok(Some(manifest)) => {
                    let completed = manifest.completed_steps();
                    for number in &completed {
                        if let Some(status) = manifest.document_status.get(number) {
                            context.record_output(number, &status.output_file);
                        }
                    }
                    completed
                }
                Ok(None) => BTreeSet::new(),
                Err(e) => {
                    report.state = RunState::Failed;
                    report.failure = Some(e.into());
                    return report;
                }
            }
        } else {
            BTreeSet::new()
        };

        if context.mode.confirms_run() {
            let answer = tokio::select! {
                answer = self.approver.confirm_run(&report.plan) => answer,
                () = &mut cancel => {
                    report.state = RunState::UserCancelled;
                    report.failure = Some(WorkflowError::Cancelled);
                    return report;
                }
            };
            if !answer.unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Could not read confirmation, treating as declined");
                false
            }) {
                report.state = RunState::UserCancelled;
                return report;
            }
        }
        report.state = RunState::Confirmed;

        let metadata = FeatureMetadata {
            name: context.feature_name.clone(),
            slug: context.feature_slug.clone(),
            mode: context.mode,
            compliance: context.compliance,
            risk_score: context.risk_score,
            created_at: chrono::Utc::now(),
            run_id: uuid::Uuid::new_v4().to_string(),
        };

        report.state = RunState::Running;
        let plan = report.plan.clone();
        for (index, planned) in plan.steps.iter().enumerate() {
            let number = &planned.step.number;
            if completed.contains(number) {
                tracing::info!(step = %number, "Already completed, skipping");
                report.resumed.push(number.clone());
                continue;
            }

            let phase_completed = !plan.steps[index + 1..].iter().any(|p| p.step.phase == planned.step.phase);
            let phases_remaining = remaining_phases(&plan.steps[index + 1..]);

            match self
                .execute_step(context, planned, &store, &metadata, phase_completed, phases_remaining, &mut cancel)
                .await
            {
                Ok(outcome) => report.executed.push(outcome),
                Err(error) => {
                    tracing::warn!(step = %number, error = %error, "Run halted");
                    report.state =
                        if error.is_cancellation() { RunState::UserCancelled } else { RunState::Failed };
                    report.failure = Some(error);
                    report.usage = self.pipeline.usage();
                    return report;
                }
            }
        }

        report.state = RunState::Succeeded;
        report.usage = self.pipeline.usage();
        tracing::info!(steps = report.executed.len(), usage = %report.usage, "Run succeeded");
        report
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_step<F>(
        &mut self,
        context: &mut ExecutionContext,
        planned: &PlannedStep,
        store: &ManifestStore,
        metadata: &FeatureMetadata,
        phase_completed: bool,
        phases_remaining: Vec<String>,
        cancel: &mut std::pin::Pin<&mut F>,
    ) -> Result<StepOutcome, WorkflowError>
    where
        F: Future<Output = ()>,
    {
        let step = &planned.step;
        let instructions = self.instructions(&context.root, &step.document_name);
        let mut log = Vec::new();

        match planned.decision {
            decision if decision.blocks() => {
                let answer = tokio::select! {
                    answer = self.approver.approve_gate(planned, &instructions) => answer,
                    () = cancel.as_mut() => return Err(WorkflowError::Cancelled),
                };
                let approved = answer.unwrap_or_else(|e| {
                    tracing::warn!(step = %step.number, error = %e, "Could not read gate answer, treating as rejected");
                    false
                });
                if !approved {
                    return Err(WorkflowError::GateRejected { step: step.number.clone(), gate: step.gate_name.clone() });
                }
                log.push(log_line(&format!("step {} gate {} ({decision}) approved", step.number, step.gate_name)));
            }
            GateDecision::Optional => {
                tracing::info!(step = %step.number, gate = %step.gate_name, "Optional gate auto-approved");
                log.push(log_line(&format!("step {} gate {} optional, auto-approved", step.number, step.gate_name)));
            }
            _ => {
                tracing::debug!(step = %step.number, gate = %step.gate_name, "Gate skipped");
            }
        }

        let mut request = ContentGenerationRequest::new(
            self.document_path(&context.root, &step.document_name),
            context.generation_context(step),
            step.output_file.clone(),
            step.content_type,
        );
        request.directives = instructions.directives;
        request.template_sections = instructions.template_sections;

        let artifact = tokio::select! {
            artifact = self.pipeline.generate(&request) => artifact?,
            () = cancel.as_mut() => return Err(WorkflowError::Cancelled),
        };
        let response = &artifact.response;

        log.push(log_line(&format!(
            "step {} generated {} via {}/{} ({} tokens, ${:.4})",
            step.number, artifact.relative_path, response.provider, response.model, response.tokens_used, response.cost_usd
        )));
        for error in &response.validation_errors {
            log.push(log_line(&format!("step {} validation: {error}", step.number)));
        }

        let update = StepUpdate {
            number: step.number.clone(),
            status: DocumentStatus {
                status: STATUS_COMPLETED.to_string(),
                document: step.document_name.clone(),
                phase: step.phase.clone(),
                output_file: artifact.relative_path.clone(),
                completed_at: Some(chrono::Utc::now()),
                provider: response.provider.to_string(),
                model: response.model.clone(),
                tokens_used: response.tokens_used,
                cost_usd: response.cost_usd,
                validated: response.validated,
                validation_errors: response.validation_errors.clone(),
            },
            log,
            generated_files: vec![artifact.relative_path.clone()],
            phase_completed,
            phases_remaining,
        };
        store.record_step(metadata, &update)?;
        context.record_output(&step.number, &artifact.relative_path);

        println!("  [{}] {} -> {}", step.number, step.document_name, artifact.path.display());

        Ok(StepOutcome {
            number: step.number.clone(),
            decision: planned.decision,
            path: artifact.path,
            provider: response.provider.to_string(),
            model: response.model.clone(),
            tokens_used: response.tokens_used,
            cost_usd: response.cost_usd,
            validated: response.validated,
            validation_errors: response.validation_errors.clone(),
        })
    }
}

fn remaining_phases(steps: &[PlannedStep]) -> Vec<String> {
    let mut phases: Vec<String> = Vec::new();
    for planned in steps {
        if !phases.contains(&planned.step.phase) {
            phases.push(planned.step.phase.clone());
        }
    }
    phases
}
