//! Run and method settings
//!
//! Every settings struct deserializes with defaults for missing fields and
//! validates into a collect-all [`ValidationReport`].

use serde::{Deserialize, Serialize};

use crate::core::random::RandomSettings;
use crate::core::validation::{MessageType, ValidationReport};

/// Settings of the model runner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    /// Worker threads used for batched evaluation
    pub max_parallel_processes: usize,

    /// Maximum samples per evaluation batch
    pub max_chunk_size: usize,

    pub save_evaluations: bool,
    pub save_convergence: bool,
    pub save_messages: bool,
    pub max_messages: usize,

    /// Messages below this severity are dropped
    pub lowest_message_type: MessageType,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            max_parallel_processes: 1,
            max_chunk_size: 1000,
            save_evaluations: false,
            save_convergence: true,
            save_messages: true,
            max_messages: 1000,
            lowest_message_type: MessageType::Warning,
        }
    }
}

impl RunSettings {
    /// Effective batch size: never below one
    pub fn chunk_size(&self) -> usize {
        self.max_chunk_size.max(1)
    }

    pub fn validate(&self, report: &mut ValidationReport) {
        if self.max_parallel_processes == 0 {
            report.add_error("run settings", "max_parallel_processes must be at least 1");
        }
        if self.max_chunk_size == 0 {
            report.add_error("run settings", "max_chunk_size must be at least 1");
        }
    }
}

/// How a model behaves along a ray from the origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ModelVaryingType {
    /// At most one crossing of Z = 0 per ray
    #[default]
    Monotone,
    /// Several crossings possible
    Varying,
}

/// Settings of the search for Z = 0 along a direction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionReliabilitySettings {
    /// Section length in u-space
    pub dsdu: f64,
    pub maximum_length_u: f64,
    pub epsilon_u_step_size: f64,
    pub epsilon_z_step_size: f64,
    pub maximum_iterations: usize,
    /// Report the u with smallest |Z| instead of an integrated beta
    pub find_minimal_value: bool,
    pub model_varying_type: ModelVaryingType,
}

impl Default for DirectionReliabilitySettings {
    fn default() -> Self {
        Self {
            dsdu: 1.0,
            maximum_length_u: 20.0,
            epsilon_u_step_size: 0.01,
            epsilon_z_step_size: 0.01,
            maximum_iterations: 50,
            find_minimal_value: false,
            model_varying_type: ModelVaryingType::Monotone,
        }
    }
}

impl DirectionReliabilitySettings {
    /// Number of sections between the origin and the maximum length
    pub fn section_count(&self) -> usize {
        (self.maximum_length_u / self.dsdu).ceil().max(1.0) as usize
    }

    pub fn validate(&self, report: &mut ValidationReport) {
        let subject = "direction settings";
        report.check_positive(subject, "dsdu", self.dsdu);
        report.check_positive(subject, "maximum_length_u", self.maximum_length_u);
        report.check_positive(subject, "epsilon_u_step_size", self.epsilon_u_step_size);
        report.check_positive(subject, "epsilon_z_step_size", self.epsilon_z_step_size);
        if self.maximum_iterations == 0 {
            report.add_error(subject, "maximum_iterations must be at least 1");
        }
        if self.dsdu > self.maximum_length_u {
            report.add_warning(subject, "dsdu is larger than maximum_length_u");
        }
    }
}

/// How representative points are combined into one design point
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum DesignPointMethod {
    /// Failing sample closest to the origin
    #[default]
    NearestToMean,
    /// Weighted mean of the failing samples
    CenterOfGravity,
    /// Weighted mean in spherical coordinates
    CenterOfAngles,
}

/// Finite difference scheme of the FORM gradient
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GradientType {
    #[default]
    OneDirection,
    TwoDirections,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientSettings {
    pub gradient_type: GradientType,
    /// Step in u-space
    pub step_size: f64,
}

impl Default for GradientSettings {
    fn default() -> Self {
        Self {
            gradient_type: GradientType::OneDirection,
            step_size: 0.3,
        }
    }
}

/// Where the FORM iteration starts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StartMethod {
    /// The origin
    #[default]
    Zero,
    /// All u-values one
    One,
    /// `start_vector`
    GivenVector,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormSettings {
    pub maximum_iterations: usize,
    pub epsilon_beta: f64,
    pub relaxation_factor: f64,
    /// Attempts; every retry halves the relaxation factor
    pub relaxation_loops: usize,
    pub gradient: GradientSettings,
    pub start_method: StartMethod,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub start_vector: Vec<f64>,
}

impl Default for FormSettings {
    fn default() -> Self {
        Self {
            maximum_iterations: 50,
            epsilon_beta: 0.01,
            relaxation_factor: 0.75,
            relaxation_loops: 1,
            gradient: GradientSettings::default(),
            start_method: StartMethod::Zero,
            start_vector: Vec::new(),
        }
    }
}

impl FormSettings {
    pub fn validate(&self, report: &mut ValidationReport) {
        let subject = "form settings";
        if self.maximum_iterations == 0 {
            report.add_error(subject, "maximum_iterations must be at least 1");
        }
        report.check_positive(subject, "epsilon_beta", self.epsilon_beta);
        report.check_range(subject, "relaxation_factor", self.relaxation_factor, 1e-6, 1.0);
        report.check_positive(subject, "gradient.step_size", self.gradient.step_size);
        if self.start_method == StartMethod::GivenVector && self.start_vector.is_empty() {
            report.add_error(subject, "start_method given_vector needs a start_vector");
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectionalSamplingSettings {
    pub minimum_directions: usize,
    pub maximum_directions: usize,
    pub variation_coefficient: f64,
    pub design_point_method: DesignPointMethod,
    pub random: RandomSettings,
    pub direction: DirectionReliabilitySettings,
}

impl Default for DirectionalSamplingSettings {
    fn default() -> Self {
        Self {
            minimum_directions: 100,
            maximum_directions: 10_000,
            variation_coefficient: 0.1,
            design_point_method: DesignPointMethod::CenterOfGravity,
            random: RandomSettings::default(),
            direction: DirectionReliabilitySettings::default(),
        }
    }
}

impl DirectionalSamplingSettings {
    pub fn validate(&self, report: &mut ValidationReport) {
        let subject = "directional sampling settings";
        if self.maximum_directions == 0 {
            report.add_error(subject, "maximum_directions must be at least 1");
        }
        if self.minimum_directions > self.maximum_directions {
            report.add_error(subject, "minimum_directions exceeds maximum_directions");
        }
        report.check_positive(subject, "variation_coefficient", self.variation_coefficient);
        self.direction.validate(report);
    }
}

/// Optional u-space bounds for one varying stochast
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct UBounds {
    pub u_min: f64,
    pub u_max: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CrudeMonteCarloSettings {
    pub minimum_samples: usize,
    pub maximum_samples: usize,
    pub variation_coefficient: f64,
    pub design_point_method: DesignPointMethod,
    pub random: RandomSettings,
    /// Per varying stochast sampling bounds; missing entries are unbounded
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub u_bounds: Vec<Option<UBounds>>,
}

impl Default for CrudeMonteCarloSettings {
    fn default() -> Self {
        Self {
            minimum_samples: 1000,
            maximum_samples: 100_000,
            variation_coefficient: 0.05,
            design_point_method: DesignPointMethod::NearestToMean,
            random: RandomSettings::default(),
            u_bounds: Vec::new(),
        }
    }
}

impl CrudeMonteCarloSettings {
    pub fn validate(&self, report: &mut ValidationReport) {
        let subject = "crude monte carlo settings";
        if self.maximum_samples == 0 {
            report.add_error(subject, "maximum_samples must be at least 1");
        }
        if self.minimum_samples > self.maximum_samples {
            report.add_error(subject, "minimum_samples exceeds maximum_samples");
        }
        report.check_positive(subject, "variation_coefficient", self.variation_coefficient);
        for (index, bounds) in self.u_bounds.iter().enumerate() {
            if let Some(bounds) = bounds {
                if !(bounds.u_min < bounds.u_max) {
                    report.add_error(
                        subject,
                        format!("u_bounds[{}]: u_min must be smaller than u_max", index),
                    );
                }
            }
        }
    }
}
