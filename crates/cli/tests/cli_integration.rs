//! CLI integration tests for all subcommands.
//!
//! Uses `assert_cmd` to spawn the `formwork` binary and verify exit codes,
//! stdout content, and stderr content. All tests set `current_dir` to the
//! workspace root so that relative paths to fixtures resolve.

use assert_cmd::cargo::cargo_bin_cmd;
use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Locate the workspace root by walking up from CARGO_MANIFEST_DIR.
fn workspace_root() -> PathBuf {
    let manifest_dir = Path::new(env!("CARGO_MANIFEST_DIR"));
    // crates/cli -> workspace root is two levels up
    manifest_dir
        .parent()
        .and_then(|p| p.parent())
        .expect("workspace root")
        .to_path_buf()
}

/// Helper: create a Command for the `formwork` binary, rooted at workspace.
fn formwork() -> Command {
    let mut cmd = cargo_bin_cmd!("formwork");
    cmd.current_dir(workspace_root());
    cmd.env_remove("RUST_LOG");
    cmd
}

fn stdout_json(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).unwrap_or_else(|e| {
        panic!(
            "stdout is not JSON ({}): {}",
            e,
            String::from_utf8_lossy(&output.stdout)
        )
    })
}

/// Settings file pointing at the fixture message catalog.
fn settings_with_messages(dir: &TempDir, extra: &str) -> PathBuf {
    let messages = workspace_root().join("fixtures/messages.en.json");
    let path = dir.path().join("formwork.toml");
    fs::write(
        &path,
        format!("messages = {:?}\n{}", messages.display().to_string(), extra),
    )
    .unwrap();
    path
}

// ──────────────────────────────────────────────
// 1. Help and version
// ──────────────────────────────────────────────

#[test]
fn help_exits_0_with_description() {
    formwork()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Data-driven form engine driver"));
}

#[test]
fn version_exits_0() {
    formwork()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("formwork"));
}

#[test]
fn run_help_lists_answers_flag() {
    formwork()
        .args(["run", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--answers"));
}

// ──────────────────────────────────────────────
// 2. Check
// ──────────────────────────────────────────────

#[test]
fn check_clean_config_exits_0() {
    formwork()
        .args(["check", "fixtures/loan-application.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "loan-application: 7 field(s) in 1 step(s)",
        ))
        .stdout(predicate::str::contains("no problems found"));
}

#[test]
fn check_multi_step_config_counts_steps() {
    formwork()
        .args(["check", "--strict", "fixtures/onboarding.json"])
        .assert()
        .success()
        .stdout(predicate::str::contains("in 4 step(s)"));
}

#[test]
fn check_legacy_config_reports_diagnostics_as_json() {
    let output = formwork()
        .args(["--output", "json", "check", "fixtures/legacy-config.json"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["id"], "legacy");
    let kinds: Vec<&str> = report["diagnostics"]
        .as_array()
        .unwrap()
        .iter()
        .map(|d| d["kind"].as_str().unwrap())
        .collect();
    for expected in [
        "parse",
        "unsupported_component",
        "unknown_validation",
        "unknown_condition_tag",
        "unknown_option_source",
    ] {
        assert!(kinds.contains(&expected), "missing {} in {:?}", expected, kinds);
    }
}

#[test]
fn check_strict_fails_on_diagnostics() {
    formwork()
        .args(["check", "--strict", "fixtures/legacy-config.json"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("hologram"));
}

#[test]
fn check_missing_file_exits_1() {
    formwork()
        .args(["check", "fixtures/does-not-exist.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read config file"));
}

#[test]
fn check_non_document_exits_1_with_json_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("bad.json");
    fs::write(&path, "42").unwrap();
    formwork()
        .args(["--output", "json", "check"])
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("\"error\""));
}

// ──────────────────────────────────────────────
// 3. Inspect
// ──────────────────────────────────────────────

#[test]
fn inspect_shows_visible_fields_and_fetched_options() {
    formwork()
        .args([
            "inspect",
            "fixtures/loan-application.json",
            "--values",
            "fixtures/loan-application.values.json",
        ])
        .assert()
        .success()
        .stdout(predicate::str::contains("5 visible field(s)"))
        .stdout(predicate::str::contains("options: Hanoi, Ho Chi Minh City"))
        .stdout(predicate::str::contains("hidden: loanAmount, loanPurpose"));
}

#[test]
fn inspect_json_lists_views() {
    let output = formwork()
        .args([
            "--output",
            "json",
            "inspect",
            "fixtures/onboarding.json",
            "--step",
            "employment",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["step"], "employment");
    let visible: Vec<&str> = report["visible"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v["fieldName"].as_str().unwrap())
        .collect();
    assert_eq!(visible, vec!["employmentStatus"]);
    assert_eq!(report["hidden"], serde_json::json!(["employer", "industry"]));
}

#[test]
fn inspect_unknown_step_exits_1() {
    formwork()
        .args(["inspect", "fixtures/onboarding.json", "--step", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown step 'nope'"));
}

// ──────────────────────────────────────────────
// 4. Submit
// ──────────────────────────────────────────────

#[test]
fn submit_strips_hidden_values() {
    let output = formwork()
        .args([
            "submit",
            "fixtures/loan-application.json",
            "--values",
            "fixtures/loan-application.values.json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let cleaned = stdout_json(&output);
    assert_eq!(cleaned["fullName"], "Ada Lovelace");
    assert_eq!(cleaned["city"], "HAN");
    assert!(cleaned.get("loanAmount").is_none());
}

#[test]
fn submit_invalid_values_exits_1_with_resolved_messages() {
    let dir = TempDir::new().unwrap();
    let settings = settings_with_messages(&dir, "");
    formwork()
        .arg("--settings")
        .arg(&settings)
        .args([
            "submit",
            "fixtures/loan-application.json",
            "--values",
            "fixtures/loan-application.invalid-values.json",
        ])
        .assert()
        .failure()
        .stdout(predicate::str::contains("3 invalid field(s)"))
        .stdout(predicate::str::contains(
            "fullName: Full name must be at least 2 characters",
        ))
        .stdout(predicate::str::contains("loanAmount: Loan amount is required"));
}

#[test]
fn submit_invalid_values_json_report() {
    let output = formwork()
        .args([
            "--output",
            "json",
            "submit",
            "fixtures/loan-application.json",
            "--values",
            "fixtures/loan-application.invalid-values.json",
        ])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let report = stdout_json(&output);
    assert_eq!(report["valid"], false);
    assert_eq!(report["errors"]["email"], serde_json::json!(["errors.email"]));
}

#[test]
fn bad_settings_file_exits_1() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("formwork.toml");
    fs::write(&path, "colour = \"blue\"\n").unwrap();
    formwork()
        .arg("--settings")
        .arg(&path)
        .args(["check", "fixtures/loan-application.json"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid settings"));
}

// ──────────────────────────────────────────────
// 5. Run
// ──────────────────────────────────────────────

#[test]
fn run_completes_onboarding() {
    let output = formwork()
        .args([
            "--output",
            "json",
            "run",
            "fixtures/onboarding.json",
            "--answers",
            "fixtures/onboarding.answers.json",
        ])
        .output()
        .unwrap();
    assert!(output.status.success());
    let summary = stdout_json(&output);
    assert_eq!(summary["complete"], true);
    assert_eq!(summary["transitions"].as_array().unwrap().len(), 4);
    assert_eq!(summary["data"]["employment"]["industry"], "tech");
    assert_eq!(summary["data"]["preferences"], serde_json::json!({}));
}

#[test]
fn run_persists_and_resumes() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store");

    formwork()
        .args([
            "run",
            "fixtures/onboarding.json",
            "--answers",
            "fixtures/onboarding.answers.json",
            "--max-steps",
            "2",
        ])
        .arg("--store-dir")
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("personal: advanced to employment"))
        .stdout(predicate::str::contains("stopped at step preferences"));

    let saved: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(store.join("onboarding-v1.json")).unwrap())
            .unwrap();
    assert_eq!(saved["currentStep"], 2);
    assert_eq!(saved["completedSteps"], serde_json::json!([0, 1]));

    formwork()
        .args([
            "run",
            "fixtures/onboarding.json",
            "--answers",
            "fixtures/onboarding.answers.json",
        ])
        .arg("--store-dir")
        .arg(&store)
        .assert()
        .success()
        .stdout(predicate::str::contains("resumed saved progress"))
        .stdout(predicate::str::contains("preferences: advanced to review"))
        .stdout(predicate::str::contains("review: completed"))
        .stdout(predicate::str::contains("personal:").not());
}

#[test]
fn run_rejected_step_exits_1() {
    let dir = TempDir::new().unwrap();
    let answers = dir.path().join("answers.json");
    fs::write(&answers, r#"{ "personal": { "firstName": "Ada", "age": 12 } }"#).unwrap();
    let settings = settings_with_messages(&dir, "");
    formwork()
        .arg("--settings")
        .arg(&settings)
        .args(["run", "fixtures/onboarding.json", "--answers"])
        .arg(&answers)
        .assert()
        .failure()
        .stdout(predicate::str::contains("personal: rejected"))
        .stdout(predicate::str::contains("age: Age must be at least 18"));
}

#[test]
fn run_settings_override_persist_key() {
    let dir = TempDir::new().unwrap();
    let store = dir.path().join("store");
    let settings = settings_with_messages(
        &dir,
        &format!(
            "store_dir = {:?}\npersist_key = \"custom-key\"\n",
            store.display().to_string()
        ),
    );
    formwork()
        .arg("--settings")
        .arg(&settings)
        .args([
            "run",
            "fixtures/onboarding.json",
            "--answers",
            "fixtures/onboarding.answers.json",
            "--max-steps",
            "1",
        ])
        .assert()
        .success();
    assert!(store.join("custom-key.json").exists());
    assert!(!store.join("onboarding-v1.json").exists());
}
