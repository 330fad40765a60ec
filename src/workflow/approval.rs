//! Operator approvals for run confirmation and blocking gates.

use std::io::{self, BufRead, Write};

use async_trait::async_trait;

use super::gate::GateDecision;
use super::plan::{ExecutionPlan, PlannedStep};
use crate::generation::DocumentInstructions;

/// Source of operator answers.
#[async_trait]
pub trait Approver: Send + Sync {
    /// Confirm the plan before any step runs.
    async fn confirm_run(&self, plan: &ExecutionPlan) -> io::Result<bool>;

    /// Approve one blocking step. `instructions` are whatever could be
    /// extracted from its workflow document.
    async fn approve_gate(&self, step: &PlannedStep, instructions: &DocumentInstructions) -> io::Result<bool>;
}

/// Interactive approver reading answers from stdin.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdinApprover;

#[async_trait]
impl Approver for StdinApprover {
    async fn confirm_run(&self, plan: &ExecutionPlan) -> io::Result<bool> {
        let question = format!("Run {} step(s) for '{}'? [y/N] ", plan.steps.len(), plan.feature_name);
        ask(question).await
    }

    async fn approve_gate(&self, step: &PlannedStep, instructions: &DocumentInstructions) -> io::Result<bool> {
        println!();
        println!("Gate '{}' at step {} ({})", step.step.gate_name, step.step.number, step.step.document_name);
        if let Some(objective) = &instructions.objective {
            println!("  Objective: {objective}");
        }
        if !instructions.expected_outputs.is_empty() {
            println!("  Outputs: {}", instructions.expected_outputs.join(", "));
        }
        println!("  Writes: {}", step.step.output_file);

        ask(gate_question(step.decision).to_string()).await
    }
}

/// Approves everything without asking.
#[derive(Debug, Clone, Copy, Default)]
pub struct AutoApprover;

#[async_trait]
impl Approver for AutoApprover {
    async fn confirm_run(&self, _plan: &ExecutionPlan) -> io::Result<bool> {
        Ok(true)
    }

    async fn approve_gate(&self, step: &PlannedStep, _instructions: &DocumentInstructions) -> io::Result<bool> {
        tracing::info!(step = %step.step.number, gate = %step.step.gate_name, "Gate auto-approved");
        Ok(true)
    }
}

/// Assumes yes for the run confirmation and ordinary gates (`--yes`).
///
/// Approval-board gates, and compliance-impacting steps while a compliance
/// framework is active, are always passed to `operator`.
#[derive(Debug, Clone, Default)]
pub struct AssumeYesApprover<A> {
    operator: A,
    compliance_active: bool,
}

impl<A: Approver> AssumeYesApprover<A> {
    pub fn new(operator: A, compliance_active: bool) -> Self {
        Self { operator, compliance_active }
    }

    /// Whether `step` must be answered by the operator.
    pub fn needs_operator(&self, step: &PlannedStep) -> bool {
        step.decision == GateDecision::ApprovalBoardRequired || (self.compliance_active && step.step.compliance_impact)
    }
}

#[async_trait]
impl<A: Approver> Approver for AssumeYesApprover<A> {
    async fn confirm_run(&self, _plan: &ExecutionPlan) -> io::Result<bool> {
        Ok(true)
    }

    async fn approve_gate(&self, step: &PlannedStep, instructions: &DocumentInstructions) -> io::Result<bool> {
        if self.needs_operator(step) {
            tracing::info!(step = %step.step.number, gate = %step.step.gate_name, "Gate needs an operator answer despite --yes");
            return self.operator.approve_gate(step, instructions).await;
        }
        tracing::info!(step = %step.step.number, gate = %step.step.gate_name, "Gate approved by --yes");
        Ok(true)
    }
}

fn gate_question(decision: GateDecision) -> &'static str {
    match decision {
        GateDecision::ApprovalBoardRequired => "Has the approval board approved this step? (y/N) ",
        GateDecision::LearnFromHistory => "No history to learn from yet. Approve this step? (y/N) ",
        _ => "Approve this step? (y/N) ",
    }
}

/// Prompt on stdout and read one line on a blocking thread.
async fn ask(question: String) -> io::Result<bool> {
    tokio::task::spawn_blocking(move || {
        let stdin = io::stdin();
        let mut stdout = io::stdout();
        read_answer(&question, &mut stdin.lock(), &mut stdout)
    })
    .await
    .map_err(io::Error::other)?
}

/// `y` or `yes` approves; anything else, including EOF, rejects.
fn read_answer(question: &str, input: &mut impl BufRead, output: &mut impl Write) -> io::Result<bool> {
    write!(output, "{question}")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    Ok(is_affirmative(&line))
}

fn is_affirmative(answer: &str) -> bool {
    let answer = answer.trim();
    answer.eq_ignore_ascii_case("y") || answer.eq_ignore_ascii_case("yes")
}
