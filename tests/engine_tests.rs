//! Reliability engine tests - methods end to end through the library API

mod common;

use common::{linear_runner, resistance_load_beta, runner, standard_normals, RESISTANCE_LOAD_PROJECT};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use ptk::core::{
    CorrelationMatrix, MessageType, ModelRunner, ProgressSink, StopHandle, UConverter, ZEvaluator,
    ZModel,
};
use ptk::entities::{
    CrudeMonteCarloSettings, DirectionReliabilitySettings, DirectionalSamplingSettings,
    FormSettings, ModelVaryingType, ProjectFile, ReliabilityReport, RunSettings, UBounds,
};
use ptk::reliability::{CrudeMonteCarlo, DirectionalSampling, Form, ReliabilityMethod, Solve};
use ptk::yaml::parse_yaml;

/// Requests an exit once a number of reports arrived
struct ExitAfter {
    reports: AtomicUsize,
    limit: usize,
}

impl ProgressSink for ExitAfter {
    fn report(&self, _report: &ReliabilityReport) {
        self.reports.fetch_add(1, Ordering::Relaxed);
    }

    fn should_exit(&self) -> bool {
        self.reports.load(Ordering::Relaxed) >= self.limit
    }
}

/// Slow model that records how many calls overlap
#[derive(Default)]
struct OverlapCounter {
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl ZEvaluator for OverlapCounter {
    fn evaluate(&self, x: &[f64]) -> f64 {
        let active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(active, Ordering::SeqCst);
        thread::sleep(Duration::from_millis(1));
        self.active.fetch_sub(1, Ordering::SeqCst);
        3.0 - (x[0] + x[1]) / 2f64.sqrt()
    }
}

fn two_dimensional_linear(settings: RunSettings) -> ModelRunner {
    // beta = 3 along the diagonal
    runner(
        standard_normals(2),
        Arc::new(|x: &[f64]| 3.0 - (x[0] + x[1]) / 2f64.sqrt()),
        settings,
    )
}

// ============================================================================
// FORM
// ============================================================================

#[test]
fn test_form_linear_converges_quickly() {
    let runner = linear_runner(2.5);
    let form = Form::new(FormSettings {
        relaxation_factor: 1.0,
        ..Default::default()
    });
    let design_point = form.solve(&runner).unwrap();

    assert!(design_point.is_converged());
    assert!((design_point.beta() - 2.5).abs() < 0.01);
    assert!(design_point.convergence_report.total_samples <= 2);
    assert!(!design_point.reliability_results.is_empty());
}

#[test]
fn test_form_correlated_sum() {
    // Z = 6 - a - b with corr(a, b) = 0.5: var(a + b) = 3
    let mut correlation = CorrelationMatrix::new(2);
    correlation.set_correlation(0, 1, 0.5).unwrap();
    let converter = UConverter::new(standard_normals(2), correlation).unwrap();
    let model = ZModel::new(Arc::new(|x: &[f64]| 6.0 - x[0] - x[1]));
    let mut runner = ModelRunner::new(model, converter, RunSettings::default()).unwrap();
    runner.initialize_for_run().unwrap();

    let design_point = Form::default().solve(&runner).unwrap();
    assert!(design_point.is_converged());
    assert!((design_point.beta() - 6.0 / 3f64.sqrt()).abs() < 0.02);

    let total: f64 = design_point
        .point
        .alphas
        .iter()
        .map(|a| a.influence_factor)
        .sum();
    assert!((total - 1.0).abs() < 1e-9);
}

#[test]
fn test_form_stopped_before_start() {
    let evaluations = Arc::new(AtomicUsize::new(0));
    let counter = evaluations.clone();
    let stop = StopHandle::new();
    stop.stop();

    let runner = runner(
        standard_normals(1),
        Arc::new(move |x: &[f64]| {
            counter.fetch_add(1, Ordering::Relaxed);
            3.0 - x[0]
        }),
        RunSettings::default(),
    )
    .with_progress(stop);

    let design_point = Form::default().solve(&runner).unwrap();
    assert!(!design_point.is_converged());
    assert_eq!(design_point.convergence_report.total_samples, 0);
    assert_eq!(evaluations.load(Ordering::Relaxed), 0);
}

// ============================================================================
// Directional sampling
// ============================================================================

#[test]
fn test_directional_sampling_linear() {
    let runner = two_dimensional_linear(RunSettings::default());
    let design_point = DirectionalSampling::default().solve(&runner).unwrap();

    assert!(design_point.is_converged());
    assert!(
        (design_point.beta() - 3.0).abs() < 0.15,
        "beta = {}",
        design_point.beta()
    );
    // Failing directions gather around the diagonal
    let alphas = &design_point.point.alphas;
    assert!(alphas[0].alpha < 0.0 && alphas[1].alpha < 0.0);
}

#[test]
fn test_directional_sampling_parallel_matches_sequential() {
    let settings = DirectionalSamplingSettings {
        minimum_directions: 200,
        maximum_directions: 400,
        ..Default::default()
    };

    let sequential = two_dimensional_linear(RunSettings {
        max_chunk_size: 50,
        ..Default::default()
    });
    let parallel = two_dimensional_linear(RunSettings {
        max_chunk_size: 50,
        max_parallel_processes: 4,
        ..Default::default()
    });

    let method = DirectionalSampling::new(settings);
    let a = method.solve(&sequential).unwrap();
    let b = method.solve(&parallel).unwrap();
    assert_eq!(a.beta(), b.beta());
    assert_eq!(
        a.convergence_report.total_samples,
        b.convergence_report.total_samples
    );
}

#[test]
fn test_directional_sampling_searches_directions_concurrently() {
    let counter = Arc::new(OverlapCounter::default());
    let runner = runner(
        standard_normals(2),
        counter.clone(),
        RunSettings {
            max_parallel_processes: 4,
            ..Default::default()
        },
    );
    let method = DirectionalSampling::new(DirectionalSamplingSettings {
        minimum_directions: 40,
        maximum_directions: 40,
        direction: DirectionReliabilitySettings {
            model_varying_type: ModelVaryingType::Varying,
            ..Default::default()
        },
        ..Default::default()
    });
    let design_point = method.solve(&runner).unwrap();

    assert!(design_point.beta().is_finite());
    assert_eq!(design_point.convergence_report.total_samples, 40);
    assert!(counter.peak.load(Ordering::SeqCst) > 1);
}

#[test]
fn test_directional_sampling_all_nan_model() {
    let runner = runner(
        standard_normals(2),
        Arc::new(|_: &[f64]| f64::NAN),
        RunSettings {
            max_chunk_size: 10,
            ..Default::default()
        },
    );
    let method = DirectionalSampling::new(DirectionalSamplingSettings {
        minimum_directions: 10,
        maximum_directions: 20,
        ..Default::default()
    });
    let design_point = method.solve(&runner).unwrap();

    assert!(design_point.beta().is_nan());
    assert!(!design_point.is_converged());
    assert!(design_point
        .messages
        .iter()
        .any(|m| m.kind == MessageType::Warning && m.text.contains("skipped")));
}

// ============================================================================
// Crude Monte Carlo
// ============================================================================

#[test]
fn test_crude_monte_carlo_linear() {
    let runner = linear_runner(2.0);
    let design_point = CrudeMonteCarlo::default().solve(&runner).unwrap();

    assert!(design_point.is_converged());
    assert!(
        (design_point.beta() - 2.0).abs() < 0.1,
        "beta = {}",
        design_point.beta()
    );
    let report = &design_point.convergence_report;
    assert!(report.total_samples >= 1000);
    assert!(report.failed_samples > 0);
    assert!(report.variance_factor.is_none());
}

#[test]
fn test_crude_monte_carlo_bounded_region() {
    let runner = linear_runner(2.0);
    let method = CrudeMonteCarlo::new(CrudeMonteCarloSettings {
        u_bounds: vec![Some(UBounds {
            u_min: 0.0,
            u_max: 8.0,
        })],
        ..Default::default()
    });
    let design_point = method.solve(&runner).unwrap();

    assert!(design_point.is_converged());
    assert!((design_point.beta() - 2.0).abs() < 0.1);
    let mass = design_point.convergence_report.variance_factor.unwrap();
    assert!((mass - 0.5).abs() < 1e-9);
}

#[test]
fn test_crude_monte_carlo_exit_request() {
    let sink = Arc::new(ExitAfter {
        reports: AtomicUsize::new(0),
        limit: 2,
    });
    let runner = runner(
        standard_normals(1),
        Arc::new(|x: &[f64]| 2.0 - x[0]),
        RunSettings {
            max_chunk_size: 100,
            ..Default::default()
        },
    )
    .with_progress(sink);

    let design_point = CrudeMonteCarlo::default().solve(&runner).unwrap();
    assert!(!design_point.is_converged());
    assert_eq!(design_point.convergence_report.total_samples, 200);
    assert_eq!(design_point.reliability_results.len(), 2);
}

#[test]
fn test_crude_monte_carlo_saves_evaluations() {
    let runner = runner(
        standard_normals(1),
        Arc::new(|x: &[f64]| 2.0 - x[0]),
        RunSettings {
            save_evaluations: true,
            ..Default::default()
        },
    );
    let method = CrudeMonteCarlo::new(CrudeMonteCarloSettings {
        minimum_samples: 100,
        maximum_samples: 100,
        ..Default::default()
    });
    let design_point = method.solve(&runner).unwrap();
    assert_eq!(design_point.evaluations.len(), 100);
}

// ============================================================================
// Project files
// ============================================================================

#[test]
fn test_project_methods_agree() {
    let mut project: ProjectFile = parse_yaml(RESISTANCE_LOAD_PROJECT, "project.yaml").unwrap();
    let expected = resistance_load_beta();

    let form = project.run().unwrap();
    assert!((form.beta() - expected).abs() < 0.01);

    project.method = ReliabilityMethod::DirectionalSampling(Default::default());
    project.method.set_seed(11);
    let ds = project.run().unwrap();
    assert!((ds.beta() - expected).abs() < 0.15, "beta = {}", ds.beta());
}

#[test]
fn test_project_variable_stochast() {
    // b ~ N(1 + 0.4 a, 1), so Z = 10 - a - b = 2 - 1.4 ua - ub
    let yaml = r#"
stochasts:
  - name: a
    location: 5.0
    scale: 1.0
  - name: b
    variable_source: a
    value_set:
      values:
        - x: 0.0
          location: 1.0
          scale: 1.0
        - x: 10.0
          location: 5.0
          scale: 1.0
limit_state:
  type: linear
  constant: 10.0
  coefficients:
    a: -1.0
    b: -1.0
"#;
    let project: ProjectFile = parse_yaml(yaml, "variable.yaml").unwrap();
    assert!(project.validate().is_valid());

    let design_point = project.run().unwrap();
    let expected = 2.0 / (1.4f64 * 1.4 + 1.0).sqrt();
    assert!(design_point.is_converged());
    assert!(
        (design_point.beta() - expected).abs() < 0.02,
        "beta = {}",
        design_point.beta()
    );
}

#[test]
fn test_project_variable_stochast_descending_table() {
    let yaml = r#"
stochasts:
  - name: a
    location: 5.0
    scale: 1.0
  - name: b
    variable_source: a
    value_set:
      values:
        - x: 10.0
          location: 5.0
          scale: 1.0
        - x: 0.0
          location: 1.0
          scale: 1.0
limit_state:
  type: linear
  constant: 10.0
  coefficients:
    a: -1.0
    b: -1.0
"#;
    let project: ProjectFile = parse_yaml(yaml, "descending.yaml").unwrap();
    assert!(project.validate().is_valid());

    let design_point = project.run().unwrap();
    let expected = 2.0 / (1.4f64 * 1.4 + 1.0).sqrt();
    assert!(
        (design_point.beta() - expected).abs() < 0.02,
        "beta = {}",
        design_point.beta()
    );
}
