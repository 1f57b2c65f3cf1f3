//! Project file - a complete reliability run described in YAML
//!
//! A project names its stochasts, the correlations between them, one of
//! the built-in limit-state forms, the reliability method and the run
//! settings. Stochasts are referenced by name everywhere.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::core::correlation::{CorrelationMatrix, CorrelationValue};
use crate::core::error::{ReliabilityError, Result};
use crate::core::model_runner::{ModelRunner, ProgressSink, ZEvaluator, ZModel};
use crate::core::uconverter::UConverter;
use crate::core::validation::ValidationReport;
use crate::entities::design_point::DesignPoint;
use crate::entities::settings::RunSettings;
use crate::entities::stochast::Stochast;
use crate::reliability::{ReliabilityMethod, Solve};

/// Built-in limit-state forms, coefficients keyed by stochast name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LimitState {
    /// Z = c + sum(a_i * x_i)
    Linear {
        #[serde(default)]
        constant: f64,
        coefficients: BTreeMap<String, f64>,
    },

    /// Z = c + sum(a_i * x_i) + sum(b_i * x_i^2)
    Quadratic {
        #[serde(default)]
        constant: f64,
        #[serde(default)]
        linear: BTreeMap<String, f64>,
        #[serde(default)]
        quadratic: BTreeMap<String, f64>,
    },

    /// Z = R - S
    ResistanceLoad { resistance: String, load: String },
}

impl fmt::Display for LimitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitState::Linear {
                constant,
                coefficients,
            } => {
                write!(f, "Z = {}", constant)?;
                for (name, a) in coefficients {
                    write!(f, " + {}·{}", a, name)?;
                }
                Ok(())
            }
            LimitState::Quadratic {
                constant,
                linear,
                quadratic,
            } => {
                write!(f, "Z = {}", constant)?;
                for (name, a) in linear {
                    write!(f, " + {}·{}", a, name)?;
                }
                for (name, b) in quadratic {
                    write!(f, " + {}·{}²", b, name)?;
                }
                Ok(())
            }
            LimitState::ResistanceLoad { resistance, load } => {
                write!(f, "Z = {} - {}", resistance, load)
            }
        }
    }
}

impl LimitState {
    /// Stochast names the limit state refers to
    pub fn referenced_names(&self) -> Vec<&str> {
        match self {
            LimitState::Linear { coefficients, .. } => {
                coefficients.keys().map(String::as_str).collect()
            }
            LimitState::Quadratic {
                linear, quadratic, ..
            } => linear
                .keys()
                .chain(quadratic.keys())
                .map(String::as_str)
                .collect(),
            LimitState::ResistanceLoad { resistance, load } => {
                vec![resistance.as_str(), load.as_str()]
            }
        }
    }

    /// Resolves names against the stochast order of the model
    pub fn compile(&self, stochasts: &[Stochast]) -> Result<LimitStateFunction> {
        let index: HashMap<&str, usize> = stochasts
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();
        let count = stochasts.len();

        let lookup = |name: &str| {
            index.get(name).copied().ok_or_else(|| {
                ReliabilityError::InvalidSettings(format!(
                    "limit state refers to unknown stochast '{}'",
                    name
                ))
            })
        };
        let dense = |terms: &BTreeMap<String, f64>| -> Result<Vec<f64>> {
            let mut values = vec![0.0; count];
            for (name, value) in terms {
                values[lookup(name.as_str())?] += value;
            }
            Ok(values)
        };

        match self {
            LimitState::Linear {
                constant,
                coefficients,
            } => Ok(LimitStateFunction {
                constant: *constant,
                linear: dense(coefficients)?,
                quadratic: vec![0.0; count],
            }),
            LimitState::Quadratic {
                constant,
                linear,
                quadratic,
            } => Ok(LimitStateFunction {
                constant: *constant,
                linear: dense(linear)?,
                quadratic: dense(quadratic)?,
            }),
            LimitState::ResistanceLoad { resistance, load } => {
                let mut linear = vec![0.0; count];
                linear[lookup(resistance.as_str())?] += 1.0;
                linear[lookup(load.as_str())?] -= 1.0;
                Ok(LimitStateFunction {
                    constant: 0.0,
                    linear,
                    quadratic: vec![0.0; count],
                })
            }
        }
    }
}

/// Limit state with coefficients in stochast order
#[derive(Debug, Clone, PartialEq)]
pub struct LimitStateFunction {
    pub constant: f64,
    pub linear: Vec<f64>,
    pub quadratic: Vec<f64>,
}

impl ZEvaluator for LimitStateFunction {
    fn evaluate(&self, x: &[f64]) -> f64 {
        if x.len() != self.linear.len() {
            return f64::NAN;
        }
        x.iter()
            .zip(self.linear.iter().zip(&self.quadratic))
            .fold(self.constant, |z, (x, (a, b))| z + a * x + b * x * x)
    }
}

/// Complete description of a reliability run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectFile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    pub stochasts: Vec<Stochast>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub correlations: Vec<CorrelationValue>,

    pub limit_state: LimitState,

    /// Cheap surrogate of the limit state, used where a method allows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxy: Option<LimitState>,

    #[serde(default)]
    pub method: ReliabilityMethod,

    #[serde(default)]
    pub run_settings: RunSettings,
}

impl ProjectFile {
    /// Display name, falling back to the method
    pub fn title(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("{} run", self.method))
    }

    /// Stochasts with their initialization values applied
    pub fn initialized_stochasts(&self) -> Vec<Stochast> {
        self.stochasts
            .iter()
            .cloned()
            .map(|mut stochast| {
                stochast.initialize();
                stochast
            })
            .collect()
    }

    /// Correlation matrix in stochast order
    pub fn correlation_matrix(&self) -> Result<CorrelationMatrix> {
        let index: HashMap<&str, usize> = self
            .stochasts
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        let mut matrix = CorrelationMatrix::new(self.stochasts.len());
        for entry in &self.correlations {
            let resolve = |name: &str| {
                index.get(name).copied().ok_or_else(|| {
                    ReliabilityError::InvalidSettings(format!(
                        "correlation refers to unknown stochast '{}'",
                        name
                    ))
                })
            };
            let first = resolve(entry.first.as_str())?;
            let second = resolve(entry.second.as_str())?;
            matrix.set_correlation(first, second, entry.value)?;
        }
        Ok(matrix)
    }

    /// Collects every problem of the project
    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        if self.stochasts.is_empty() {
            report.add_error("project", "at least one stochast is required");
        }

        let mut seen = HashSet::new();
        for stochast in &self.stochasts {
            if !seen.insert(stochast.name.as_str()) {
                report.add_error(
                    format!("stochast '{}'", stochast.name),
                    "name is used more than once",
                );
            }
        }

        let initialized = self.initialized_stochasts();
        for stochast in &initialized {
            stochast.validate(&mut report);
            if let Some(source) = &stochast.variable_source {
                if !seen.contains(source.as_str()) {
                    report.add_error(
                        format!("stochast '{}'", stochast.name),
                        format!("variable_source '{}' is not a stochast", source),
                    );
                }
            }
        }
        if !initialized.is_empty() && !initialized.iter().any(Stochast::is_varying) {
            report.add_error("project", "no stochast is varying");
        }

        let limit_states = std::iter::once(("limit state", &self.limit_state))
            .chain(self.proxy.as_ref().map(|proxy| ("proxy", proxy)));
        for (subject, limit_state) in limit_states {
            for name in limit_state.referenced_names() {
                if !seen.contains(name) {
                    report.add_error(subject, format!("refers to unknown stochast '{}'", name));
                }
            }
        }

        for entry in &self.correlations {
            for name in [&entry.first, &entry.second] {
                if !seen.contains(name.as_str()) {
                    report.add_error(
                        "correlation",
                        format!("refers to unknown stochast '{}'", name),
                    );
                }
            }
        }
        match self.correlation_matrix() {
            Ok(matrix) => matrix.validate(&mut report),
            Err(ReliabilityError::InvalidSettings(_)) => {}
            Err(e) => report.add_error("correlation", e.to_string()),
        }

        self.method.validate(&mut report);
        self.run_settings.validate(&mut report);
        report
    }

    /// Initialized runner for the project's model
    pub fn build_runner(&self) -> Result<ModelRunner> {
        let stochasts = self.initialized_stochasts();
        let function = self.limit_state.compile(&stochasts)?;
        let proxy = self
            .proxy
            .as_ref()
            .map(|proxy| proxy.compile(&stochasts))
            .transpose()?;
        let correlation = self.correlation_matrix()?;
        let converter = UConverter::new(stochasts, correlation)?;

        let mut model = ZModel::new(Arc::new(function));
        if let Some(proxy) = proxy {
            model = model.with_proxy(Arc::new(proxy));
        }
        let mut runner = ModelRunner::new(model, converter, self.run_settings.clone())?;
        runner.initialize_for_run()?;
        debug!(
            stochasts = self.stochasts.len(),
            correlations = self.correlations.len(),
            "Project runner built"
        );
        Ok(runner)
    }

    /// Runs the configured method
    pub fn run(&self) -> Result<DesignPoint> {
        self.run_with_progress(None)
    }

    pub fn run_with_progress(&self, progress: Option<Arc<dyn ProgressSink>>) -> Result<DesignPoint> {
        let mut runner = self.build_runner()?;
        if let Some(progress) = progress {
            runner = runner.with_progress(progress);
        }
        self.method.solve(&runner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::settings::FormSettings;

    fn project(limit_state: LimitState) -> ProjectFile {
        ProjectFile {
            name: None,
            description: None,
            stochasts: vec![
                Stochast::normal("r", 10.0, 2.0),
                Stochast::normal("s", 4.0, 1.0),
            ],
            correlations: Vec::new(),
            limit_state,
            proxy: None,
            method: ReliabilityMethod::Form(FormSettings::default()),
            run_settings: RunSettings::default(),
        }
    }

    fn resistance_load() -> LimitState {
        LimitState::ResistanceLoad {
            resistance: "r".to_string(),
            load: "s".to_string(),
        }
    }

    #[test]
    fn test_compile_quadratic() {
        let limit_state = LimitState::Quadratic {
            constant: 1.0,
            linear: BTreeMap::from([("s".to_string(), 2.0)]),
            quadratic: BTreeMap::from([("r".to_string(), -0.5)]),
        };
        let stochasts = project(resistance_load()).stochasts;
        let function = limit_state.compile(&stochasts).unwrap();
        // 1 + 2*3 - 0.5*4
        assert_eq!(function.evaluate(&[2.0, 3.0]), 5.0);
        assert!(function.evaluate(&[2.0]).is_nan());
    }

    #[test]
    fn test_compile_unknown_name() {
        let limit_state = LimitState::Linear {
            constant: 0.0,
            coefficients: BTreeMap::from([("q".to_string(), 1.0)]),
        };
        let err = limit_state
            .compile(&project(resistance_load()).stochasts)
            .unwrap_err();
        assert!(matches!(err, ReliabilityError::InvalidSettings(_)));
    }

    #[test]
    fn test_display_resistance_load() {
        assert_eq!(resistance_load().to_string(), "Z = r - s");
    }

    #[test]
    fn test_validate_collects_all_problems() {
        let mut project = project(LimitState::ResistanceLoad {
            resistance: "r".to_string(),
            load: "missing".to_string(),
        });
        project.stochasts.push(Stochast::normal("r", 1.0, 1.0));
        project.correlations.push(CorrelationValue {
            first: "r".to_string(),
            second: "other".to_string(),
            value: 0.3,
        });
        project.run_settings.max_chunk_size = 0;

        let report = project.validate();
        assert_eq!(report.error_count(), 4, "{:?}", report.messages);
    }

    #[test]
    fn test_correlation_matrix_by_name() {
        let mut project = project(resistance_load());
        project.correlations.push(CorrelationValue {
            first: "s".to_string(),
            second: "r".to_string(),
            value: 0.5,
        });
        let matrix = project.correlation_matrix().unwrap();
        assert_eq!(matrix.get_correlation(0, 1).unwrap(), 0.5);
    }

    #[test]
    fn test_run_resistance_load() {
        let design_point = project(resistance_load()).run().unwrap();
        assert!(design_point.is_converged());
        assert!((design_point.beta() - 6.0 / 5f64.sqrt()).abs() < 0.01);
    }

    #[test]
    fn test_parse_yaml_project() {
        let yaml = r#"
name: bar
stochasts:
  - name: r
    distribution: normal
    location: 10.0
    scale: 2.0
  - name: s
    values: [4.0, 1.0]
limit_state:
  type: resistance_load
  resistance: r
  load: s
method:
  type: directional_sampling
  minimum_directions: 50
"#;
        let project: ProjectFile = serde_yml::from_str(yaml).unwrap();
        assert_eq!(project.title(), "bar");
        assert_eq!(project.method.to_string(), "directional_sampling");
        assert!(project.validate().is_valid());
        let s = &project.initialized_stochasts()[1];
        assert!((s.mean() - 4.0).abs() < 1e-12);
    }

    #[test]
    fn test_proxy_feeds_sampling_but_not_form() {
        let mut project = project(resistance_load());
        project.proxy = Some(LimitState::Linear {
            constant: 100.0,
            coefficients: BTreeMap::new(),
        });
        assert!(project.build_runner().unwrap().model().has_proxy());

        let form = project.run().unwrap();
        assert!((form.beta() - 6.0 / 5f64.sqrt()).abs() < 0.01);

        project.method = ReliabilityMethod::CrudeMonteCarlo(Default::default());
        let cmc = project.run().unwrap();
        assert_eq!(cmc.convergence_report.failed_samples, 0);
    }

    #[test]
    fn test_validate_proxy_names() {
        let mut project = project(resistance_load());
        project.proxy = Some(LimitState::Linear {
            constant: 1.0,
            coefficients: BTreeMap::from([("unknown".to_string(), 1.0)]),
        });
        let report = project.validate();
        assert_eq!(report.error_count(), 1);
        assert!(project.build_runner().is_err());
    }
}
