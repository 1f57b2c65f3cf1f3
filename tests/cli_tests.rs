//! CLI command tests

mod common;

use common::{ptk, write_project, RESISTANCE_LOAD_PROJECT};
use predicates::prelude::*;
use tempfile::TempDir;

// ============================================================================
// CLI Basic Tests
// ============================================================================

#[test]
fn test_help_displays() {
    ptk()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Reliability analysis"));
}

#[test]
fn test_version_displays() {
    ptk()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("ptk"));
}

#[test]
fn test_unknown_command_fails() {
    ptk()
        .arg("unknown-command")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

// ============================================================================
// Run Command Tests
// ============================================================================

#[test]
fn test_run_prints_report() {
    let tmp = TempDir::new().unwrap();
    let path = write_project(&tmp, "rl.yaml", RESISTANCE_LOAD_PROJECT);

    ptk()
        .arg("run")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Resistance and load"))
        .stdout(predicate::str::contains("Reliability index:  2.68"))
        .stdout(predicate::str::contains("Design point"));
}

#[test]
fn test_run_json_output() {
    let tmp = TempDir::new().unwrap();
    let path = write_project(&tmp, "rl.yaml", RESISTANCE_LOAD_PROJECT);

    let output = ptk()
        .args(["run", "--format", "json"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let beta = value["beta"].as_f64().unwrap();
    assert!((beta - 6.0 / 5f64.sqrt()).abs() < 0.01);
    assert_eq!(value["identifier"], "FORM");
}

#[test]
fn test_run_yaml_output_with_method_override() {
    let tmp = TempDir::new().unwrap();
    let path = write_project(&tmp, "rl.yaml", RESISTANCE_LOAD_PROJECT);

    ptk()
        .args(["run", "--format", "yaml", "--method", "crude-monte-carlo", "--seed", "3"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("identifier: Crude Monte Carlo"));
}

#[test]
fn test_run_history_table() {
    let tmp = TempDir::new().unwrap();
    let path = write_project(&tmp, "rl.yaml", RESISTANCE_LOAD_PROJECT);

    ptk()
        .args(["run", "--history"])
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("Convergence history"));
}

#[test]
fn test_run_invalid_project_fails() {
    let tmp = TempDir::new().unwrap();
    let content = RESISTANCE_LOAD_PROJECT.replace("load: s", "load: q");
    let path = write_project(&tmp, "bad.yaml", &content);

    ptk()
        .arg("run")
        .arg(&path)
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown stochast 'q'"));
}

#[test]
fn test_run_missing_file_fails() {
    ptk()
        .args(["run", "does-not-exist.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read file"));
}

// ============================================================================
// Validate Command Tests
// ============================================================================

#[test]
fn test_validate_valid_project() {
    let tmp = TempDir::new().unwrap();
    let path = write_project(&tmp, "rl.yaml", RESISTANCE_LOAD_PROJECT);

    ptk()
        .arg("validate")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains("All files passed validation"));
}

#[test]
fn test_validate_reports_all_problems() {
    let tmp = TempDir::new().unwrap();
    let content = RESISTANCE_LOAD_PROJECT
        .replace("load: s", "load: q")
        .replace("type: form", "type: form\n  maximum_iterations: 0");
    let path = write_project(&tmp, "bad.yaml", &content);

    ptk()
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("2 error(s)"))
        .stdout(predicate::str::contains("maximum_iterations"));
}

#[test]
fn test_validate_syntax_error() {
    let tmp = TempDir::new().unwrap();
    let path = write_project(&tmp, "broken.yaml", "stochasts: [\n  - name: a\n");

    ptk()
        .arg("validate")
        .arg(&path)
        .assert()
        .failure()
        .stdout(predicate::str::contains("could not be loaded"));
}

// ============================================================================
// Example Command Tests
// ============================================================================

#[test]
fn test_example_prints_project() {
    ptk()
        .arg("example")
        .assert()
        .success()
        .stdout(predicate::str::contains("limit_state:"))
        .stdout(predicate::str::contains("type: form"));
}

#[test]
fn test_example_output_validates() {
    let tmp = TempDir::new().unwrap();
    let output = ptk()
        .args(["example", "--method", "directional-sampling"])
        .output()
        .unwrap();
    assert!(output.status.success());

    let path = tmp.path().join("example.yaml");
    std::fs::write(&path, &output.stdout).unwrap();
    ptk().arg("validate").arg(&path).assert().success();
}
