//! Shared test helpers for integration tests
//!
//! This module provides common utilities used across all test files.

#![allow(dead_code)]

use assert_cmd::cargo;
use assert_cmd::Command;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

use ptk::core::{ModelRunner, UConverter, ZEvaluator, ZModel};
use ptk::entities::{RunSettings, Stochast};

/// Helper to get a ptk command
pub fn ptk() -> Command {
    Command::new(cargo::cargo_bin!("ptk"))
}

/// Helper to write a project file into a temp directory
pub fn write_project(tmp: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = tmp.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Resistance - load project with a normal resistance and load
///
/// beta = (10 - 4) / sqrt(2^2 + 1^2)
pub const RESISTANCE_LOAD_PROJECT: &str = r#"
name: Resistance and load
stochasts:
  - name: r
    distribution: normal
    location: 10.0
    scale: 2.0
  - name: s
    distribution: normal
    location: 4.0
    scale: 1.0
limit_state:
  type: resistance_load
  resistance: r
  load: s
method:
  type: form
"#;

pub fn resistance_load_beta() -> f64 {
    6.0 / 5f64.sqrt()
}

/// Standard normal stochasts named u1, u2, ...
pub fn standard_normals(count: usize) -> Vec<Stochast> {
    (1..=count)
        .map(|i| Stochast::normal(format!("u{}", i), 0.0, 1.0))
        .collect()
}

/// Initialized runner over uncorrelated stochasts
pub fn runner(
    stochasts: Vec<Stochast>,
    evaluator: Arc<dyn ZEvaluator>,
    settings: RunSettings,
) -> ModelRunner {
    let converter = UConverter::uncorrelated(stochasts);
    let mut runner = ModelRunner::new(ZModel::new(evaluator), converter, settings).unwrap();
    runner.initialize_for_run().unwrap();
    runner
}

/// Runner for Z = beta - u over one standard normal stochast
pub fn linear_runner(beta: f64) -> ModelRunner {
    runner(
        standard_normals(1),
        Arc::new(move |x: &[f64]| beta - x[0]),
        RunSettings::default(),
    )
}
