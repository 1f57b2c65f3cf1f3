//! Design point entity - result of a reliability calculation
//!
//! A design point is a stochast point (beta plus one alpha per stochast)
//! with identification, convergence information and optional histories.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::standard_normal;
use crate::core::validation::MessageType;

/// Contribution of one stochast at a point
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StochastPointAlpha {
    /// Name of the stochast
    pub stochast: String,

    /// Position of the stochast in the model
    pub index: usize,

    /// Influence coefficient in uncorrelated u-space
    pub alpha: f64,

    /// Influence coefficient after applying correlation
    pub alpha_correlated: f64,

    pub u: f64,
    pub x: f64,

    /// alpha², the share of the variance explained by this stochast
    pub influence_factor: f64,
}

/// Reliability index with per stochast contributions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StochastPoint {
    pub beta: f64,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alphas: Vec<StochastPointAlpha>,
}

impl StochastPoint {
    /// Failure probability belonging to beta
    pub fn probability_of_failure(&self) -> f64 {
        standard_normal::get_q_from_u(self.beta)
    }

    pub fn alpha(&self, stochast: &str) -> Option<&StochastPointAlpha> {
        self.alphas.iter().find(|a| a.stochast == stochast)
    }

    /// u-values of all stochasts, in model order
    pub fn u_values(&self) -> Vec<f64> {
        self.alphas.iter().map(|a| a.u).collect()
    }
}

/// Convergence state of a reliability method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    /// Method specific convergence measure (smaller is better)
    pub convergence: f64,

    #[serde(default)]
    pub failed_samples: usize,

    /// Fraction of samples (directions) that failed
    #[serde(default)]
    pub fail_fraction: f64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub relaxation_factor: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variance_factor: Option<f64>,

    #[serde(default)]
    pub max_weight: f64,

    #[serde(default)]
    pub fail_weight: f64,

    pub is_converged: bool,

    /// Samples or iterations used
    #[serde(default)]
    pub total_samples: usize,
}

impl Default for ConvergenceReport {
    fn default() -> Self {
        Self {
            convergence: f64::NAN,
            failed_samples: 0,
            fail_fraction: 0.0,
            relaxation_factor: None,
            variance_factor: None,
            max_weight: 0.0,
            fail_weight: 0.0,
            is_converged: false,
            total_samples: 0,
        }
    }
}

/// Recorded model evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Evaluation {
    pub z: f64,
    pub iteration: i32,
    pub weight: f64,
    pub tag: i32,
    /// Physical input values the model was called with
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub input_values: Vec<f64>,
}

/// Diagnostic message collected during a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub text: String,
}

impl Message {
    pub fn new(kind: MessageType, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.kind, self.text)
    }
}

/// Intermediate result of a method, one per reported step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityResult {
    pub index: usize,
    pub beta: f64,
    pub convergence: f64,
    pub is_converged: bool,
}

/// Progress report sent to a progress sink
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReliabilityReport {
    pub step: usize,
    pub max_steps: usize,
    pub reliability: f64,
    pub convergence: f64,
}

/// Result of a reliability method
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DesignPoint {
    pub identifier: String,

    #[serde(flatten)]
    pub point: StochastPoint,

    #[serde(default)]
    pub scenario_index: i32,

    #[serde(default)]
    pub convergence_report: ConvergenceReport,

    /// Inputs that produced this point (failed attempts, combined points)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contributing_design_points: Vec<DesignPoint>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reliability_results: Vec<ReliabilityResult>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub evaluations: Vec<Evaluation>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub messages: Vec<Message>,
}

impl DesignPoint {
    pub fn new(identifier: impl Into<String>, point: StochastPoint) -> Self {
        Self {
            identifier: identifier.into(),
            point,
            ..Default::default()
        }
    }

    pub fn beta(&self) -> f64 {
        self.point.beta
    }

    pub fn is_converged(&self) -> bool {
        self.convergence_report.is_converged
    }

    pub fn probability_of_failure(&self) -> f64 {
        self.point.probability_of_failure()
    }

    /// Number of design points in this tree, including this one
    pub fn tree_size(&self) -> usize {
        1 + self
            .contributing_design_points
            .iter()
            .map(DesignPoint::tree_size)
            .sum::<usize>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alpha(name: &str, index: usize, alpha: f64) -> StochastPointAlpha {
        StochastPointAlpha {
            stochast: name.to_string(),
            index,
            alpha,
            alpha_correlated: alpha,
            u: -alpha * 2.0,
            x: 0.0,
            influence_factor: alpha * alpha,
        }
    }

    #[test]
    fn test_probability_of_failure() {
        let point = StochastPoint {
            beta: 0.0,
            alphas: Vec::new(),
        };
        assert_eq!(point.probability_of_failure(), 0.5);
    }

    #[test]
    fn test_alpha_lookup() {
        let point = StochastPoint {
            beta: 2.0,
            alphas: vec![alpha("a", 0, 0.6), alpha("b", 1, -0.8)],
        };
        assert_eq!(point.alpha("b").map(|a| a.index), Some(1));
        assert!(point.alpha("c").is_none());
        assert_eq!(point.u_values(), vec![-1.2, 1.6]);
    }

    #[test]
    fn test_tree_size() {
        let mut root = DesignPoint::new("root", StochastPoint::default());
        let mut child = DesignPoint::new("child", StochastPoint::default());
        child
            .contributing_design_points
            .push(DesignPoint::new("grandchild", StochastPoint::default()));
        root.contributing_design_points.push(child);
        assert_eq!(root.tree_size(), 3);
    }

    #[test]
    fn test_serializes_flat_beta() {
        let point = DesignPoint::new(
            "form",
            StochastPoint {
                beta: 3.0,
                alphas: vec![alpha("a", 0, 1.0)],
            },
        );
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["beta"], 3.0);
        assert_eq!(json["identifier"], "form");
        assert!(json.get("evaluations").is_none());
    }
}
