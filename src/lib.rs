//! # Planrun
//!
//! Gated, resumable generation of project-planning documents.
//!
//! A run walks a fixed catalog of workflow steps (PRD, SRS, design
//! decisions, tasks and so on). Each step is gated by the automation mode's
//! approval policy and produces one markdown artifact through an
//! interchangeable LLM provider.
//!
//! ## Features
//!
//! - **Gate Policy**: guided, autonomous and learning modes with conditional gates
//! - **Compliance**: compliance-impacting steps are never skipped under GDPR, SOC2, PCI, HIPAA or ISO27001
//! - **Providers**: OpenAI, Anthropic, Azure OpenAI, Ollama, Groq, Gemini, or offline drafts
//! - **Budgets**: per-run cost ceiling checked before every call
//! - **Resumable**: per-feature JSON manifest, atomically rewritten after each step
//!
//! ## Quick Start
//!
//! ```bash
//! # Show the plan
//! planrun plan --feature "Invoice Export"
//!
//! # Run it without network access
//! planrun run --feature "Invoice Export" --offline --yes
//! ```

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
// Allow common patterns that are intentional in this codebase
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::similar_names)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::derivable_impls)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::struct_excessive_bools)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::missing_fields_in_debug)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::future_not_send)]

pub mod ai;
pub mod core;
pub mod error;
pub mod generation;
pub mod workflow;

// Re-export commonly used types
pub use core::Config;
pub use error::WorkflowError;
pub use workflow::{AutomationMode, ExecutionContext, Orchestrator, RunOptions, RunReport, RunState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Application name
pub const APP_NAME: &str = "planrun";
