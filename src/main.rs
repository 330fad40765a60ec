//! Planrun - gated generation of project-planning documents.
//!
//! Builds an execution plan for a feature, asks for approval where the
//! automation mode requires it, and writes each step's document into the
//! feature directory.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use planrun::ai::ProviderKind;
use planrun::core::{expand_path, Config, ProviderConfig};
use planrun::generation::{ContentPipeline, GenerationOverrides, ProjectData};
use planrun::workflow::{
    find_feature_dir, slugify, Approver, AssumeYesApprover, AutoApprover, ComplianceFramework, ExecutionContext, ManifestStore,
    Orchestrator, RunOptions, RunReport, RunState, StdinApprover,
};
use planrun::AutomationMode;

/// Gated, resumable generation of project-planning documents
#[derive(Parser)]
#[command(name = "planrun")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Subcommand to run
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, or JSON with a .json extension)
    #[arg(short, long, global = true, env = "PLANRUN_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the execution plan for a feature
    Plan {
        #[command(flatten)]
        feature: FeatureArgs,

        /// Output format (text, json)
        #[arg(short = 'o', long, default_value = "text")]
        format: String,
    },

    /// Run the workflow for a feature
    Run {
        #[command(flatten)]
        feature: FeatureArgs,

        /// Skip the run confirmation and approve ordinary gates. Approval-board
        /// and compliance gates still ask.
        #[arg(short = 'y', long)]
        yes: bool,

        /// Skip steps the feature manifest already records as completed
        #[arg(long)]
        resume: bool,

        /// Show the plan without executing anything
        #[arg(long)]
        dry_run: bool,

        /// JSON object with project data (questionnaire answers)
        #[arg(long)]
        project_data: Option<PathBuf>,

        /// Provider name from [providers], used for every content type
        #[arg(long)]
        provider: Option<String>,

        /// Model override for every content type
        #[arg(long)]
        model: Option<String>,

        /// Cost ceiling in USD for this run
        #[arg(long)]
        cost_limit: Option<f64>,

        /// Draft documents locally without calling any provider
        #[arg(long, conflicts_with = "provider")]
        offline: bool,
    },

    /// List the workflow steps
    Steps {
        /// Show instructions extracted from each workflow document
        #[arg(short, long)]
        describe: bool,

        /// Project root
        #[arg(long, default_value = ".")]
        root: PathBuf,
    },

    /// Show the manifest of a feature
    Status {
        /// Feature name
        #[arg(short, long)]
        feature: String,

        /// Project root
        #[arg(long, default_value = ".")]
        root: PathBuf,

        /// Feature directory (defaults to the latest one for the feature)
        #[arg(long)]
        feature_dir: Option<PathBuf>,
    },

    /// Show configuration
    Config {
        /// Show config file path only
        #[arg(long)]
        path: bool,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

/// Feature identity and run context shared by `plan` and `run`.
#[derive(Args)]
struct FeatureArgs {
    /// Feature name
    #[arg(short, long)]
    feature: String,

    /// Automation mode (guided, autonomous, learning)
    #[arg(short, long, default_value = "guided")]
    mode: AutomationMode,

    /// Project root
    #[arg(long, default_value = ".")]
    root: PathBuf,

    /// Feature directory (defaults to <features_dir>/<date>-<slug>)
    #[arg(long)]
    feature_dir: Option<PathBuf>,

    /// Active compliance framework (GDPR, SOC2, PCI, HIPAA, ISO27001)
    #[arg(long)]
    compliance: Option<ComplianceFramework>,

    /// The feature needs coordination across teams
    #[arg(long)]
    multi_team: bool,

    /// The feature changes the system architecture
    #[arg(long)]
    architecture_impact: bool,

    /// Technology in the stack (repeatable)
    #[arg(long = "tech")]
    technologies: Vec<String>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Provider credentials may live in .env
    let _ = dotenvy::dotenv();

    // Setup logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| if cli.verbose { EnvFilter::new("debug") } else { EnvFilter::new("warn") });

    tracing_subscriber::registry().with(fmt::layer().with_target(false)).with(filter).init();

    match cli.command {
        Commands::Plan { feature, format } => {
            let config = Config::load(cli.config.as_deref())?;
            cmd_plan(config, &feature, &format)?;
        }
        Commands::Run { feature, yes, resume, dry_run, project_data, provider, model, cost_limit, offline } => {
            let config = Config::load(cli.config.as_deref())?;
            let overrides = GenerationOverrides {
                provider: if offline { Some(ProviderKind::Offline.to_string()) } else { provider },
                model,
                cost_limit_usd: cost_limit,
            };
            let options = RunOptions { dry_run, resume };
            let code = cmd_run(config, &feature, overrides, options, yes, project_data.as_deref())?;
            std::process::exit(code);
        }
        Commands::Steps { describe, root } => {
            let config = Config::load(cli.config.as_deref())?;
            cmd_steps(config, describe, &root)?;
        }
        Commands::Status { feature, root, feature_dir } => {
            let config = Config::load(cli.config.as_deref())?;
            cmd_status(&config, &feature, &root, feature_dir)?;
        }
        Commands::Config { path } => {
            cmd_config(cli.config.as_deref(), path)?;
        }
        Commands::Completions { shell } => {
            cmd_completions(shell);
        }
    }

    Ok(())
}

fn features_root(config: &Config, root: &Path) -> PathBuf {
    root.join(expand_path(&config.workflow.features_dir))
}

fn build_context(config: &Config, args: &FeatureArgs, resume: bool) -> ExecutionContext {
    let mut context = ExecutionContext::new(&args.feature, args.mode, &args.root, &config.workflow.features_dir)
        .with_compliance(args.compliance)
        .with_multi_team(args.multi_team)
        .with_architecture_impact(args.architecture_impact)
        .with_technologies(args.technologies.clone());

    if let Some(dir) = &args.feature_dir {
        context = context.with_feature_dir(dir.clone());
    } else if resume {
        if let Some(existing) = find_feature_dir(&features_root(config, &args.root), &context.feature_slug) {
            context = context.with_feature_dir(existing);
        }
    }
    context
}

fn load_project_data(path: &Path) -> Result<ProjectData> {
    let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    match serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))? {
        serde_json::Value::Object(map) => Ok(map),
        _ => bail!("{} must contain a JSON object", path.display()),
    }
}

/// Show the execution plan.
fn cmd_plan(config: Config, args: &FeatureArgs, format: &str) -> Result<()> {
    let orchestrator = Orchestrator::new(config.clone(), Arc::new(AutoApprover))?;
    let mut context = build_context(&config, args, false);
    let plan = orchestrator.plan(&mut context);

    match format {
        "json" => println!("{}", plan.to_json()?),
        _ => print!("{}", plan.render()),
    }

    Ok(())
}

/// Run the workflow and return the process exit code.
fn cmd_run(
    mut config: Config,
    args: &FeatureArgs,
    overrides: GenerationOverrides,
    options: RunOptions,
    yes: bool,
    project_data: Option<&Path>,
) -> Result<i32> {
    let offline = ProviderKind::Offline.to_string();
    if overrides.provider.as_deref() == Some(offline.as_str()) {
        config.providers.entry(offline).or_insert_with(|| ProviderConfig::new(ProviderKind::Offline, "template"));
    }

    let mut context = build_context(&config, args, options.resume);
    if let Some(path) = project_data {
        context = context.with_project_data(load_project_data(path)?);
    }

    let approver: Arc<dyn Approver> = if yes {
        Arc::new(AssumeYesApprover::new(StdinApprover, context.compliance.is_some()))
    } else {
        Arc::new(StdinApprover)
    };
    let pipeline = ContentPipeline::new(config.clone()).with_overrides(overrides);
    let mut orchestrator = Orchestrator::new(config, approver)?.with_pipeline(pipeline);

    if options.dry_run {
        let plan = orchestrator.plan(&mut context);
        print!("{}", plan.render());
        println!("\nDry run: nothing was executed.");
        return Ok(RunState::DryRunComplete.exit_code());
    }

    // Create tokio runtime for async operations
    let rt = tokio::runtime::Runtime::new()?;

    let report = rt.block_on(async {
        let interrupted = async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        };
        if !yes && context.mode.confirms_run() {
            let mut preview = context.clone();
            print!("{}", orchestrator.plan(&mut preview).render());
            println!();
        }
        orchestrator.run_until(&mut context, options, interrupted).await
    });
    // A prompt abandoned by Ctrl-C is still blocked in read_line
    rt.shutdown_background();

    print_report(&report);
    Ok(report.exit_code())
}

fn print_report(report: &RunReport) {
    println!();
    if !report.resumed.is_empty() {
        println!("Resumed: skipped completed step(s) {}", report.resumed.join(", "));
    }
    for outcome in &report.executed {
        if !outcome.validated {
            println!("Warning: step {} failed validation: {}", outcome.number, outcome.validation_errors.join("; "));
        }
    }

    match (&report.state, &report.failure) {
        (RunState::Succeeded, _) => {
            println!("Workflow complete: {} document(s) in {}", report.executed.len(), report.plan.feature_dir.display());
        }
        (RunState::UserCancelled, _) => println!("Cancelled after {} step(s).", report.executed.len()),
        (_, Some(error)) => println!("Workflow failed after {} step(s): {error}", report.executed.len()),
        (state, None) => println!("Workflow ended: {state}"),
    }
    println!("Usage: {}", report.usage);
}

/// List the workflow steps.
fn cmd_steps(config: Config, describe: bool, root: &Path) -> Result<()> {
    let orchestrator = Orchestrator::new(config, Arc::new(AutoApprover))?;

    for step in orchestrator.catalog().steps() {
        let deps = if step.dependencies.is_empty() { "-".to_string() } else { step.dependencies.join(",") };
        let compliance = if step.compliance_impact { " [compliance]" } else { "" };
        println!(
            "{:<4} {:<14} {:<34} -> {:<28} gate={} deps={deps}{compliance}",
            step.number, step.phase, step.document_name, step.output_file, step.gate_name
        );

        if describe {
            let instructions = orchestrator.instructions(root, &step.document_name);
            if instructions.is_empty() {
                println!("       (no instructions found in {})", step.document_name);
                continue;
            }
            if let Some(objective) = &instructions.objective {
                println!("       objective: {objective}");
            }
            for (label, items) in [
                ("inputs", &instructions.required_inputs),
                ("outputs", &instructions.expected_outputs),
                ("directives", &instructions.directives),
                ("validation", &instructions.validation_criteria),
            ] {
                if !items.is_empty() {
                    println!("       {label}: {}", items.join("; "));
                }
            }
            for section in &instructions.template_sections {
                println!("       template: {}", section.title);
            }
        }
    }

    Ok(())
}

/// Show a feature's manifest.
fn cmd_status(config: &Config, feature: &str, root: &Path, feature_dir: Option<PathBuf>) -> Result<()> {
    let slug = slugify(feature);
    let Some(dir) = feature_dir.or_else(|| find_feature_dir(&features_root(config, root), &slug)) else {
        println!("No feature directory found for '{feature}'.");
        return Ok(());
    };

    let store = ManifestStore::new(&dir);
    let Some(manifest) = store.load()? else {
        println!("No manifest in {}.", dir.display());
        return Ok(());
    };

    println!("Feature: {} ({})", manifest.feature_metadata.name, dir.display());
    println!("Mode: {}", manifest.feature_metadata.mode);
    if let Some(framework) = manifest.feature_metadata.compliance {
        println!("Compliance: {framework}");
    }
    let status = &manifest.workflow_status;
    println!("Current phase: {}", status.current_phase.as_deref().unwrap_or("-"));
    println!("Phases completed: {}", status.phases_completed.join(", "));
    println!("Phases remaining: {}", status.phases_remaining.join(", "));
    if let Some(updated) = status.last_updated {
        println!("Last updated: {}", updated.to_rfc3339());
    }
    println!();
    for (number, document) in &manifest.document_status {
        let validity = if document.validated { "" } else { " (validation warnings)" };
        println!("  {number:<4} {:<10} {}{validity}", document.status, document.output_file);
    }
    println!("\n{} generated file(s), {} log entries", manifest.generated_files.len(), manifest.execution_log.len());

    Ok(())
}

/// Show configuration.
fn cmd_config(explicit: Option<&Path>, path_only: bool) -> Result<()> {
    if path_only {
        let local = PathBuf::from("planrun.toml");
        let source = match explicit {
            Some(path) => Some(path.to_path_buf()),
            None if local.exists() => Some(local),
            None => Config::global_config_path().filter(|p| p.exists()),
        };
        match source {
            Some(path) => println!("{}", path.display()),
            None => println!("(built-in defaults)"),
        }
        return Ok(());
    }

    let config = Config::load(explicit)?;
    println!("{}", config.to_toml()?);

    Ok(())
}

/// Generate shell completions.
fn cmd_completions(shell: Shell) {
    let mut cmd = Cli::command();
    generate(shell, &mut cmd, "planrun", &mut io::stdout());
}
