//! Workflow orchestration engine.
//!
//! A fixed catalog of steps, each gated by the automation mode's policy and
//! producing one document through the content pipeline.
//!
//! ## Components
//!
//! - `StepCatalog` - Ordered, validated steps from `[workflow]`
//! - `GatePolicy` - Resolves a `GateDecision` per step
//! - `ExecutionPlan` - Decisions for every step, in order
//! - `ManifestStore` - Resumable per-feature state
//! - `Orchestrator` - Runs the plan

mod approval;
mod catalog;
mod context;
mod gate;
mod manifest;
mod orchestrator;
mod plan;

pub use approval::{Approver, AssumeYesApprover, AutoApprover, StdinApprover};
pub use catalog::{StepCatalog, WorkflowStep, UNASSIGNED_PHASE};
pub use context::{find_feature_dir, slugify, ComplianceFramework, ExecutionContext};
pub use gate::{AutomationMode, GateBehavior, GateDecision, GatePolicy, HistoryModel, NoHistory};
pub use manifest::{
    log_line, DocumentStatus, FeatureMetadata, Manifest, ManifestError, ManifestStore, StepUpdate, WorkflowStatus,
    MANIFEST_FILE, STATUS_COMPLETED,
};
pub use orchestrator::{Orchestrator, RunOptions, RunReport, RunState, StepOutcome};
pub use plan::{ExecutionPlan, PlannedStep};
