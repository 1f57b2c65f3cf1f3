//! CLI command implementations

pub mod example;
pub mod run;
pub mod validate;

use clap::ValueEnum;

use crate::entities::settings::{
    CrudeMonteCarloSettings, DirectionalSamplingSettings, FormSettings,
};
use crate::reliability::ReliabilityMethod;

/// Reliability method selectable on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum MethodArg {
    Form,
    DirectionalSampling,
    CrudeMonteCarlo,
}

impl MethodArg {
    /// Method with default settings
    pub fn default_method(self) -> ReliabilityMethod {
        match self {
            MethodArg::Form => ReliabilityMethod::Form(FormSettings::default()),
            MethodArg::DirectionalSampling => {
                ReliabilityMethod::DirectionalSampling(DirectionalSamplingSettings::default())
            }
            MethodArg::CrudeMonteCarlo => {
                ReliabilityMethod::CrudeMonteCarlo(CrudeMonteCarloSettings::default())
            }
        }
    }

    /// Keeps the configured settings when the method is already selected
    pub fn apply(self, method: &mut ReliabilityMethod) {
        let same = matches!(
            (self, &*method),
            (MethodArg::Form, ReliabilityMethod::Form(_))
                | (MethodArg::DirectionalSampling, ReliabilityMethod::DirectionalSampling(_))
                | (MethodArg::CrudeMonteCarlo, ReliabilityMethod::CrudeMonteCarlo(_))
        );
        if !same {
            *method = self.default_method();
        }
    }
}
