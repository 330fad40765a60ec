//! CLI Integration Tests
//!
//! Tests the command-line interface end-to-end. Every run uses the offline
//! provider, so no network access is needed.

use assert_cmd::Command;
use assert_fs::prelude::*;
use predicates::prelude::*;

const STANDARD_CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/config/planrun.toml");
const ENTERPRISE_CONFIG: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/config/enterprise.toml");

/// Get the binary to test.
fn planrun() -> Command {
    let mut cmd = Command::cargo_bin("planrun").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("PLANRUN_CONFIG");
    cmd
}

/// Binary bound to a temp project root with the standard config.
fn planrun_in(temp: &assert_fs::TempDir) -> Command {
    let mut cmd = planrun();
    cmd.current_dir(temp.path()).args(["--config", STANDARD_CONFIG]);
    cmd
}

fn offline_run(temp: &assert_fs::TempDir, feature_dir: &std::path::Path) -> Command {
    let mut cmd = planrun_in(temp);
    cmd.args(["run", "--feature", "Invoice Export", "--offline", "--yes", "--root"])
        .arg(temp.path())
        .arg("--feature-dir")
        .arg(feature_dir);
    cmd
}

// ============================================================================
// Help & Version Tests
// ============================================================================

#[test]
fn test_help_flag() {
    planrun()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Gated, resumable generation"));
}

#[test]
fn test_version_flag() {
    planrun()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_invalid_subcommand() {
    planrun().arg("frobnicate").assert().failure();
}

#[test]
fn test_unknown_mode_rejected() {
    planrun()
        .args(["plan", "--feature", "X", "--mode", "yolo"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown automation mode"));
}

// ============================================================================
// Plan Command Tests
// ============================================================================

#[test]
fn test_plan_text() {
    let temp = assert_fs::TempDir::new().unwrap();

    planrun_in(&temp)
        .args(["plan", "--feature", "Invoice Export"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Execution plan: Invoice Export (guided mode"))
        .stdout(predicate::str::contains("FOUNDATION"))
        .stdout(predicate::str::contains("[GATE]"))
        .stdout(predicate::str::contains("Legend:"));

    temp.close().unwrap();
}

#[test]
fn test_plan_json() {
    let temp = assert_fs::TempDir::new().unwrap();

    let output = planrun_in(&temp)
        .args(["plan", "--feature", "Invoice Export", "--mode", "autonomous", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let steps = plan["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 9);
    assert_eq!(steps[0]["decision"], "skip");
    assert_eq!(steps[6]["gate_name"], "task_implementation");
    assert_eq!(steps[6]["decision"], "required");
    assert_eq!(plan["feature_slug"], "invoice-export");

    temp.close().unwrap();
}

#[test]
fn test_plan_short_format_flag() {
    let temp = assert_fs::TempDir::new().unwrap();

    let output = planrun_in(&temp).args(["plan", "-f", "Invoice Export", "-o", "json"]).output().unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["feature_slug"], "invoice-export");

    temp.close().unwrap();
}

#[test]
fn test_plan_new_tech_requires_design_gate() {
    let temp = assert_fs::TempDir::new().unwrap();

    let output = planrun_in(&temp)
        .args(["plan", "--feature", "X", "--mode", "autonomous", "--format", "json", "--tech", "Elixir"])
        .output()
        .unwrap();
    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(plan["steps"][3]["decision"], "required");

    temp.close().unwrap();
}

#[test]
fn test_enterprise_plan_with_compliance() {
    let temp = assert_fs::TempDir::new().unwrap();

    let output = planrun()
        .current_dir(temp.path())
        .args(["--config", ENTERPRISE_CONFIG, "plan", "--feature", "Scale Out", "--mode", "autonomous"])
        .args(["--compliance", "hipaa", "--format", "json"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let plan: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let steps = plan["steps"].as_array().unwrap();
    assert_eq!(steps.len(), 8);
    assert_eq!(steps[0]["number"], "s01");
    assert_eq!(steps[0]["decision"], "approval_board_required");
    // s04 is configured to skip, but it carries compliance impact
    assert_eq!(steps[3]["decision"], "required");
    assert_eq!(steps[4]["decision"], "skip");
    assert_eq!(plan["compliance"], "HIPAA");
    assert!((plan["risk_score"].as_f64().unwrap() - 0.6).abs() < 1e-9);

    temp.close().unwrap();
}

// ============================================================================
// Run Command Tests
// ============================================================================

#[test]
fn test_dry_run_writes_nothing() {
    let temp = assert_fs::TempDir::new().unwrap();
    let feature_dir = temp.child("out");

    planrun_in(&temp)
        .args(["run", "--feature", "Invoice Export", "--dry-run", "--feature-dir"])
        .arg(feature_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Dry run: nothing was executed."));

    feature_dir.assert(predicate::path::missing());
    temp.close().unwrap();
}

#[test]
fn test_offline_run_writes_every_document() {
    let temp = assert_fs::TempDir::new().unwrap();
    let feature_dir = temp.child("features").child("invoice-export");

    offline_run(&temp, feature_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Workflow complete: 9 document(s)"))
        .stdout(predicate::str::contains("Usage: 9 calls"));

    feature_dir.child("prd.md").assert(predicate::str::starts_with("# Invoice Export - PRD"));
    feature_dir
        .child("design-decisions.md")
        .assert(predicate::str::contains("Step: 04 | Phase: design"));
    feature_dir.child("project-history.md").assert(predicate::path::exists());

    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(feature_dir.child("feature-manifest.json").path()).unwrap())
            .unwrap();
    assert_eq!(manifest["generated_files"].as_array().unwrap().len(), 9);
    assert_eq!(manifest["workflow_status"]["phases_completed"].as_array().unwrap().len(), 5);
    assert_eq!(manifest["document_status"]["07"]["status"], "completed");

    temp.close().unwrap();
}

#[test]
fn test_resume_skips_completed_steps() {
    let temp = assert_fs::TempDir::new().unwrap();
    let feature_dir = temp.child("out");

    offline_run(&temp, feature_dir.path()).assert().success();
    offline_run(&temp, feature_dir.path())
        .arg("--resume")
        .assert()
        .success()
        .stdout(predicate::str::contains("Resumed: skipped completed step(s) 01, 02"))
        .stdout(predicate::str::contains("Workflow complete: 0 document(s)"));

    let manifest: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(feature_dir.child("feature-manifest.json").path()).unwrap())
            .unwrap();
    assert_eq!(manifest["generated_files"].as_array().unwrap().len(), 9);

    temp.close().unwrap();
}

#[test]
fn test_declined_confirmation_exits_130() {
    let temp = assert_fs::TempDir::new().unwrap();
    let feature_dir = temp.child("out");

    planrun_in(&temp)
        .args(["run", "--feature", "Invoice Export", "--offline", "--feature-dir"])
        .arg(feature_dir.path())
        .write_stdin("")
        .assert()
        .code(130)
        .stdout(predicate::str::contains("Cancelled after 0 step(s)."));

    feature_dir.child("project-initialization.md").assert(predicate::path::missing());
    temp.close().unwrap();
}

#[test]
fn test_rejected_gate_fails_run() {
    let temp = assert_fs::TempDir::new().unwrap();
    let feature_dir = temp.child("out");

    planrun_in(&temp)
        .args(["run", "--feature", "Invoice Export", "--offline", "--feature-dir"])
        .arg(feature_dir.path())
        .write_stdin("y\ny\nn\n")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("gate 'prd_generation' rejected at step 02"));

    feature_dir.child("project-initialization.md").assert(predicate::path::exists());
    feature_dir.child("prd.md").assert(predicate::path::missing());
    temp.close().unwrap();
}

#[test]
fn test_assume_yes_still_asks_approval_board() {
    let temp = assert_fs::TempDir::new().unwrap();
    let feature_dir = temp.child("out");

    planrun()
        .current_dir(temp.path())
        .args(["--config", ENTERPRISE_CONFIG, "run", "--feature", "Scale Out", "--compliance", "hipaa"])
        .args(["--offline", "--yes", "--root"])
        .arg(temp.path())
        .arg("--feature-dir")
        .arg(feature_dir.path())
        .write_stdin("")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Has the approval board approved this step?"))
        .stdout(predicate::str::contains("gate 'mvp_to_scaling_transition' rejected at step s01"));

    temp.close().unwrap();
}

#[cfg(unix)]
#[test]
fn test_interrupt_at_confirmation_exits_130() {
    use std::io::Read;
    use std::process::{Command as Process, Stdio};
    use std::sync::mpsc;
    use std::time::{Duration, Instant};

    let temp = assert_fs::TempDir::new().unwrap();
    let mut child = Process::new(env!("CARGO_BIN_EXE_planrun"))
        .current_dir(temp.path())
        .env_remove("RUST_LOG")
        .env_remove("PLANRUN_CONFIG")
        .args(["--config", STANDARD_CONFIG, "run", "--feature", "Interrupted", "--offline", "--feature-dir"])
        .arg(temp.child("out").path())
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()
        .unwrap();
    // Held open so the prompt never sees EOF
    let _stdin = child.stdin.take().unwrap();

    let mut stdout = child.stdout.take().unwrap();
    let (tx, rx) = mpsc::channel();
    std::thread::spawn(move || {
        let mut buf = [0u8; 1024];
        while let Ok(n) = stdout.read(&mut buf) {
            if n == 0 || tx.send(buf[..n].to_vec()).is_err() {
                break;
            }
        }
    });

    let mut seen = String::new();
    while !seen.contains("[y/N]") {
        let chunk = rx.recv_timeout(Duration::from_secs(10)).expect("confirmation prompt");
        seen.push_str(&String::from_utf8_lossy(&chunk));
    }
    std::thread::sleep(Duration::from_millis(300));

    let status = Process::new("kill").args(["-INT", &child.id().to_string()]).status().unwrap();
    assert!(status.success());

    let deadline = Instant::now() + Duration::from_secs(10);
    let code = loop {
        if let Some(exit) = child.try_wait().unwrap() {
            break exit.code();
        }
        if Instant::now() > deadline {
            child.kill().unwrap();
            panic!("process still running after SIGINT");
        }
        std::thread::sleep(Duration::from_millis(50));
    };
    assert_eq!(code, Some(130));

    while let Ok(chunk) = rx.recv_timeout(Duration::from_secs(2)) {
        seen.push_str(&String::from_utf8_lossy(&chunk));
    }
    assert!(seen.contains("Cancelled after 0 step(s)."));

    temp.close().unwrap();
}

#[test]
fn test_project_data_must_be_object() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("data.json").write_str("[1, 2, 3]").unwrap();

    planrun_in(&temp)
        .args(["run", "--feature", "X", "--offline", "--yes", "--project-data"])
        .arg(temp.child("data.json").path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("must contain a JSON object"));

    temp.close().unwrap();
}

// ============================================================================
// Steps, Status & Config Tests
// ============================================================================

#[test]
fn test_steps_listing() {
    let temp = assert_fs::TempDir::new().unwrap();

    planrun_in(&temp)
        .arg("steps")
        .assert()
        .success()
        .stdout(predicate::str::contains("04-gen-design-decisions-lite.md"))
        .stdout(predicate::str::contains("gate=design_decisions"))
        .stdout(predicate::str::contains("deps=02,03"));

    temp.close().unwrap();
}

#[test]
fn test_steps_describe_reads_documents() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("workflow/02-gen-prd.md")
        .write_str("# PRD\n\n## Purpose\nCapture the product requirements.\n\n## Outputs\nGenerate `prd.md`.\n")
        .unwrap();

    planrun_in(&temp)
        .args(["steps", "--describe", "--root"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("objective: Capture the product requirements."))
        .stdout(predicate::str::contains("(no instructions found in 03-gen-srs.md)"));

    temp.close().unwrap();
}

#[test]
fn test_status_after_run() {
    let temp = assert_fs::TempDir::new().unwrap();
    let feature_dir = temp.child("out");
    offline_run(&temp, feature_dir.path()).assert().success();

    planrun_in(&temp)
        .args(["status", "--feature", "Invoice Export", "--feature-dir"])
        .arg(feature_dir.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("Feature: Invoice Export"))
        .stdout(predicate::str::contains("Phases completed: foundation, requirements"))
        .stdout(predicate::str::contains("9 generated file(s)"));

    temp.close().unwrap();
}

#[test]
fn test_status_without_feature_dir() {
    let temp = assert_fs::TempDir::new().unwrap();

    planrun_in(&temp)
        .args(["status", "--feature", "Nothing Here", "--root"])
        .arg(temp.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("No feature directory found"));

    temp.close().unwrap();
}

#[test]
fn test_config_path_flag() {
    planrun()
        .args(["--config", STANDARD_CONFIG, "config", "--path"])
        .assert()
        .success()
        .stdout(predicate::str::contains("planrun.toml"));
}

#[test]
fn test_config_display() {
    planrun()
        .args(["--config", ENTERPRISE_CONFIG, "config"])
        .assert()
        .success()
        .stdout(predicate::str::contains("step_prefix = \"s\""));
}

#[test]
fn test_invalid_config_fails() {
    let temp = assert_fs::TempDir::new().unwrap();
    temp.child("bad.toml").write_str("default_provider = \"nowhere\"\n").unwrap();

    planrun()
        .current_dir(temp.path())
        .args(["--config", "bad.toml", "plan", "--feature", "X"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("nowhere"));

    temp.close().unwrap();
}

#[test]
fn test_completions() {
    planrun()
        .args(["completions", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("planrun"));
}
