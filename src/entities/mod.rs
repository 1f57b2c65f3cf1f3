//! Entity type definitions

pub mod design_point;
pub mod distributions;
pub mod project;
pub mod sample;
pub mod settings;
pub mod stochast;

pub use design_point::{
    ConvergenceReport, DesignPoint, Evaluation, Message, ReliabilityReport, ReliabilityResult,
    StochastPoint, StochastPointAlpha,
};
pub use distributions::{Distribution, DistributionType, StochastProperties};
pub use project::{LimitState, LimitStateFunction, ProjectFile};
pub use sample::Sample;
pub use settings::{
    CrudeMonteCarloSettings, DesignPointMethod, DirectionReliabilitySettings,
    DirectionalSamplingSettings, FormSettings, GradientSettings, GradientType, ModelVaryingType,
    RunSettings, StartMethod, UBounds,
};
pub use stochast::{Stochast, VariableStochastValue, VariableStochastValuesSet};
