//! Reliability methods
//!
//! Every method turns a prepared [`ModelRunner`] into a [`DesignPoint`]
//! with a convergence report. Non-convergence is reported on the design
//! point, never as an error.

pub mod crude_monte_carlo;
pub mod design_point_builder;
pub mod direction_calculation;
pub mod direction_sections;
pub mod directional_sampling;
pub mod form;

pub use crude_monte_carlo::CrudeMonteCarlo;
pub use design_point_builder::DesignPointBuilder;
pub use direction_calculation::DirectionCalculation;
pub use direction_sections::{
    get_beta_from_sections, DirectionSection, DirectionSectionsCalculation, ZType,
};
pub use directional_sampling::DirectionalSampling;
pub use form::Form;

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::error::Result;
use crate::core::model_runner::ModelRunner;
use crate::core::validation::ValidationReport;
use crate::entities::design_point::DesignPoint;
use crate::entities::settings::{
    CrudeMonteCarloSettings, DirectionalSamplingSettings, FormSettings,
};

/// A reliability method run against an initialized model runner
pub trait Solve {
    fn solve(&self, runner: &ModelRunner) -> Result<DesignPoint>;
}

/// Method selection with its settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ReliabilityMethod {
    Form(FormSettings),
    DirectionalSampling(DirectionalSamplingSettings),
    CrudeMonteCarlo(CrudeMonteCarloSettings),
}

impl Default for ReliabilityMethod {
    fn default() -> Self {
        ReliabilityMethod::Form(FormSettings::default())
    }
}

impl fmt::Display for ReliabilityMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReliabilityMethod::Form(_) => write!(f, "form"),
            ReliabilityMethod::DirectionalSampling(_) => write!(f, "directional_sampling"),
            ReliabilityMethod::CrudeMonteCarlo(_) => write!(f, "crude_monte_carlo"),
        }
    }
}

impl ReliabilityMethod {
    pub fn validate(&self, report: &mut ValidationReport) {
        match self {
            ReliabilityMethod::Form(settings) => settings.validate(report),
            ReliabilityMethod::DirectionalSampling(settings) => settings.validate(report),
            ReliabilityMethod::CrudeMonteCarlo(settings) => settings.validate(report),
        }
    }

    /// Replaces the seed of the sampling methods
    pub fn set_seed(&mut self, seed: u64) {
        match self {
            ReliabilityMethod::Form(_) => {}
            ReliabilityMethod::DirectionalSampling(settings) => {
                settings.random.seed = seed;
                settings.random.is_repeatable = true;
            }
            ReliabilityMethod::CrudeMonteCarlo(settings) => {
                settings.random.seed = seed;
                settings.random.is_repeatable = true;
            }
        }
    }
}

impl Solve for ReliabilityMethod {
    fn solve(&self, runner: &ModelRunner) -> Result<DesignPoint> {
        match self {
            ReliabilityMethod::Form(settings) => Form::new(settings.clone()).solve(runner),
            ReliabilityMethod::DirectionalSampling(settings) => {
                DirectionalSampling::new(settings.clone()).solve(runner)
            }
            ReliabilityMethod::CrudeMonteCarlo(settings) => {
                CrudeMonteCarlo::new(settings.clone()).solve(runner)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_from_yaml() {
        let yaml = "type: crude_monte_carlo\nminimum_samples: 10\nrandom:\n  seed: 4\n";
        let method: ReliabilityMethod = serde_yml::from_str(yaml).unwrap();
        match &method {
            ReliabilityMethod::CrudeMonteCarlo(settings) => {
                assert_eq!(settings.minimum_samples, 10);
                assert_eq!(settings.maximum_samples, 100_000);
                assert_eq!(settings.random.seed, 4);
            }
            other => panic!("unexpected method {}", other),
        }
        assert_eq!(method.to_string(), "crude_monte_carlo");
    }

    #[test]
    fn test_set_seed() {
        let mut method = ReliabilityMethod::DirectionalSampling(Default::default());
        method.set_seed(99);
        if let ReliabilityMethod::DirectionalSampling(settings) = method {
            assert_eq!(settings.random.seed, 99);
        }
    }
}
