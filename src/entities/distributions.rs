//! Distribution families and the truncation/inversion decorators
//!
//! A distribution maps a standard normal u-value onto a physical x-value
//! and back. Families are stateless; their parameters live in
//! [`StochastProperties`] so that variable stochasts can swap them per
//! realization.
//!
//! | Family | Properties used |
//! |---|---|
//! | Deterministic | location |
//! | Normal | location (mean), scale (deviation) |
//! | LogNormal | location, scale (of ln(x - shift)), shift |
//! | Uniform | minimum, maximum |
//! | Triangular | minimum, shift (mode), maximum |
//! | Exponential | scale, shift |
//! | Gumbel | shift (location), scale |
//! | Weibull | scale, shape, shift |

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::core::root_finder::BisectionRootFinder;
use crate::core::special;
use crate::core::standard_normal::{self, BETA_MAX};
use crate::core::validation::ValidationReport;

/// Euler–Mascheroni constant
const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Distribution family tag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[derive(Default)]
pub enum DistributionType {
    Deterministic,
    #[default]
    Normal,
    LogNormal,
    Uniform,
    Triangular,
    Exponential,
    Gumbel,
    Weibull,
}

impl fmt::Display for DistributionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DistributionType::Deterministic => "deterministic",
            DistributionType::Normal => "normal",
            DistributionType::LogNormal => "log_normal",
            DistributionType::Uniform => "uniform",
            DistributionType::Triangular => "triangular",
            DistributionType::Exponential => "exponential",
            DistributionType::Gumbel => "gumbel",
            DistributionType::Weibull => "weibull",
        };
        write!(f, "{}", name)
    }
}

/// Parameters of a stochast; meaning depends on the family
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StochastProperties {
    pub location: f64,
    pub scale: f64,
    pub minimum: f64,
    pub maximum: f64,
    pub shift: f64,
    pub shift_b: f64,
    pub shape: f64,
    pub shape_b: f64,
    pub observations: u32,
}

impl Default for StochastProperties {
    fn default() -> Self {
        Self {
            location: 0.0,
            scale: 1.0,
            minimum: f64::NEG_INFINITY,
            maximum: f64::INFINITY,
            shift: 0.0,
            shift_b: 0.0,
            shape: 1.0,
            shape_b: 1.0,
            observations: 0,
        }
    }
}

impl StochastProperties {
    /// Linear interpolation between two property sets, `fraction` in [0, 1]
    pub fn interpolate(&self, other: &Self, fraction: f64) -> Self {
        let lerp = |a: f64, b: f64| {
            if a == b {
                a
            } else {
                a + fraction * (b - a)
            }
        };
        Self {
            location: lerp(self.location, other.location),
            scale: lerp(self.scale, other.scale),
            minimum: lerp(self.minimum, other.minimum),
            maximum: lerp(self.maximum, other.maximum),
            shift: lerp(self.shift, other.shift),
            shift_b: lerp(self.shift_b, other.shift_b),
            shape: lerp(self.shape, other.shape),
            shape_b: lerp(self.shape_b, other.shape_b),
            observations: if fraction < 0.5 {
                self.observations
            } else {
                other.observations
            },
        }
    }
}

/// u ↔ x transform of one distribution family
pub trait Distribution: fmt::Debug + Send + Sync {
    /// Sets properties from family specific values, by default (mean, deviation)
    fn initialize(&self, properties: &mut StochastProperties, values: &[f64]) {
        if let [mean, deviation, ..] = values {
            self.set_mean_and_deviation(properties, *mean, *deviation);
        } else if let [mean] = values {
            self.set_mean_and_deviation(properties, *mean, 0.0);
        }
    }

    fn get_x_from_u(&self, properties: &StochastProperties, u: f64) -> f64;

    fn get_u_from_x(&self, properties: &StochastProperties, x: f64) -> f64;

    fn is_varying(&self, properties: &StochastProperties) -> bool;

    fn get_mean(&self, properties: &StochastProperties) -> f64;

    fn get_deviation(&self, properties: &StochastProperties) -> f64;

    fn set_mean_and_deviation(&self, properties: &mut StochastProperties, mean: f64, deviation: f64);

    fn can_truncate(&self) -> bool {
        false
    }

    fn can_invert(&self) -> bool {
        false
    }

    fn is_shift_used(&self) -> bool {
        false
    }

    fn validate(&self, _properties: &StochastProperties, _subject: &str, _report: &mut ValidationReport) {}
}

/// Distribution implementation for a family tag
pub fn create_distribution(kind: DistributionType) -> Box<dyn Distribution> {
    match kind {
        DistributionType::Deterministic => Box::new(Deterministic),
        DistributionType::Normal => Box::new(Normal),
        DistributionType::LogNormal => Box::new(LogNormal),
        DistributionType::Uniform => Box::new(Uniform),
        DistributionType::Triangular => Box::new(Triangular),
        DistributionType::Exponential => Box::new(Exponential),
        DistributionType::Gumbel => Box::new(Gumbel),
        DistributionType::Weibull => Box::new(Weibull),
    }
}

/// Mean and deviation of x(u) by integration over the standard normal density
pub fn numeric_moments<F: Fn(f64) -> f64>(x_from_u: F) -> (f64, f64) {
    const U_RANGE: f64 = 8.0;
    const STEPS: usize = 1600;

    let du = 2.0 * U_RANGE / STEPS as f64;
    let mut sum = 0.0;
    let mut sum_squares = 0.0;
    let mut total_weight = 0.0;

    for i in 0..=STEPS {
        let u = -U_RANGE + i as f64 * du;
        let weight = if i == 0 || i == STEPS { 0.5 } else { 1.0 } * standard_normal::pdf(u);
        let x = x_from_u(u);
        if x.is_finite() {
            sum += weight * x;
            sum_squares += weight * x * x;
            total_weight += weight;
        }
    }

    if total_weight <= 0.0 {
        return (f64::NAN, f64::NAN);
    }
    let mean = sum / total_weight;
    let variance = (sum_squares / total_weight - mean * mean).max(0.0);
    (mean, variance.sqrt())
}

fn check_scale(properties: &StochastProperties, subject: &str, report: &mut ValidationReport) {
    if properties.scale.is_nan() || properties.scale < 0.0 {
        report.add_error(subject, format!("scale = {} must not be negative", properties.scale));
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Deterministic;

impl Distribution for Deterministic {
    fn get_x_from_u(&self, properties: &StochastProperties, _u: f64) -> f64 {
        properties.location
    }

    fn get_u_from_x(&self, _properties: &StochastProperties, _x: f64) -> f64 {
        0.0
    }

    fn is_varying(&self, _properties: &StochastProperties) -> bool {
        false
    }

    fn get_mean(&self, properties: &StochastProperties) -> f64 {
        properties.location
    }

    fn get_deviation(&self, _properties: &StochastProperties) -> f64 {
        0.0
    }

    fn set_mean_and_deviation(&self, properties: &mut StochastProperties, mean: f64, _deviation: f64) {
        properties.location = mean;
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Normal;

impl Distribution for Normal {
    fn get_x_from_u(&self, properties: &StochastProperties, u: f64) -> f64 {
        properties.location + properties.scale * u
    }

    fn get_u_from_x(&self, properties: &StochastProperties, x: f64) -> f64 {
        if properties.scale == 0.0 {
            0.0
        } else {
            (x - properties.location) / properties.scale
        }
    }

    fn is_varying(&self, properties: &StochastProperties) -> bool {
        properties.scale > 0.0
    }

    fn get_mean(&self, properties: &StochastProperties) -> f64 {
        properties.location
    }

    fn get_deviation(&self, properties: &StochastProperties) -> f64 {
        properties.scale
    }

    fn set_mean_and_deviation(&self, properties: &mut StochastProperties, mean: f64, deviation: f64) {
        properties.location = mean;
        properties.scale = deviation;
    }

    fn can_truncate(&self) -> bool {
        true
    }

    fn can_invert(&self) -> bool {
        true
    }

    fn validate(&self, properties: &StochastProperties, subject: &str, report: &mut ValidationReport) {
        check_scale(properties, subject, report);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LogNormal;

impl Distribution for LogNormal {
    fn get_x_from_u(&self, properties: &StochastProperties, u: f64) -> f64 {
        properties.shift + (properties.location + properties.scale * u).exp()
    }

    fn get_u_from_x(&self, properties: &StochastProperties, x: f64) -> f64 {
        if x <= properties.shift {
            return -BETA_MAX;
        }
        if properties.scale == 0.0 {
            return 0.0;
        }
        ((x - properties.shift).ln() - properties.location) / properties.scale
    }

    fn is_varying(&self, properties: &StochastProperties) -> bool {
        properties.scale > 0.0
    }

    fn get_mean(&self, properties: &StochastProperties) -> f64 {
        properties.shift + (properties.location + 0.5 * properties.scale * properties.scale).exp()
    }

    fn get_deviation(&self, properties: &StochastProperties) -> f64 {
        let s2 = properties.scale * properties.scale;
        ((s2.exp() - 1.0) * (2.0 * properties.location + s2).exp()).sqrt()
    }

    fn set_mean_and_deviation(&self, properties: &mut StochastProperties, mean: f64, deviation: f64) {
        let offset = mean - properties.shift;
        if offset <= 0.0 {
            return;
        }
        let s2 = (1.0 + (deviation / offset).powi(2)).ln();
        properties.scale = s2.sqrt();
        properties.location = offset.ln() - 0.5 * s2;
    }

    fn can_truncate(&self) -> bool {
        true
    }

    fn can_invert(&self) -> bool {
        true
    }

    fn is_shift_used(&self) -> bool {
        true
    }

    fn validate(&self, properties: &StochastProperties, subject: &str, report: &mut ValidationReport) {
        check_scale(properties, subject, report);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Uniform;

impl Distribution for Uniform {
    fn initialize(&self, properties: &mut StochastProperties, values: &[f64]) {
        if let [minimum, maximum, ..] = values {
            properties.minimum = *minimum;
            properties.maximum = *maximum;
        }
    }

    fn get_x_from_u(&self, properties: &StochastProperties, u: f64) -> f64 {
        let width = properties.maximum - properties.minimum;
        if u > 0.0 {
            properties.maximum - width * standard_normal::get_q_from_u(u)
        } else {
            properties.minimum + width * standard_normal::get_p_from_u(u)
        }
    }

    fn get_u_from_x(&self, properties: &StochastProperties, x: f64) -> f64 {
        if x <= properties.minimum {
            return -BETA_MAX;
        }
        if x >= properties.maximum {
            return BETA_MAX;
        }
        let width = properties.maximum - properties.minimum;
        standard_normal::get_u_from_p((x - properties.minimum) / width)
    }

    fn is_varying(&self, properties: &StochastProperties) -> bool {
        properties.maximum > properties.minimum
    }

    fn get_mean(&self, properties: &StochastProperties) -> f64 {
        0.5 * (properties.minimum + properties.maximum)
    }

    fn get_deviation(&self, properties: &StochastProperties) -> f64 {
        (properties.maximum - properties.minimum) / 12.0_f64.sqrt()
    }

    fn set_mean_and_deviation(&self, properties: &mut StochastProperties, mean: f64, deviation: f64) {
        let half_width = 3.0_f64.sqrt() * deviation;
        properties.minimum = mean - half_width;
        properties.maximum = mean + half_width;
    }

    fn can_invert(&self) -> bool {
        true
    }

    fn validate(&self, properties: &StochastProperties, subject: &str, report: &mut ValidationReport) {
        if !properties.minimum.is_finite() || !properties.maximum.is_finite() {
            report.add_error(subject, "uniform distribution needs finite minimum and maximum");
        } else if properties.minimum > properties.maximum {
            report.add_error(subject, "minimum is larger than maximum");
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Triangular;

impl Triangular {
    fn cdf(properties: &StochastProperties, x: f64) -> (f64, f64) {
        let (a, c, b) = (properties.minimum, properties.shift, properties.maximum);
        if x <= a {
            (0.0, 1.0)
        } else if x >= b {
            (1.0, 0.0)
        } else if x <= c {
            let p = (x - a).powi(2) / ((b - a) * (c - a));
            (p, 1.0 - p)
        } else {
            let q = (b - x).powi(2) / ((b - a) * (b - c));
            (1.0 - q, q)
        }
    }
}

impl Distribution for Triangular {
    fn initialize(&self, properties: &mut StochastProperties, values: &[f64]) {
        if let [minimum, mode, maximum, ..] = values {
            properties.minimum = *minimum;
            properties.shift = *mode;
            properties.maximum = *maximum;
        }
    }

    fn get_x_from_u(&self, properties: &StochastProperties, u: f64) -> f64 {
        let (a, c, b) = (properties.minimum, properties.shift, properties.maximum);
        let width = b - a;
        if width <= 0.0 {
            return a;
        }
        let p = standard_normal::get_p_from_u(u);
        if p <= (c - a) / width {
            a + (p * width * (c - a)).sqrt()
        } else {
            let q = standard_normal::get_q_from_u(u);
            b - (q * width * (b - c)).sqrt()
        }
    }

    fn get_u_from_x(&self, properties: &StochastProperties, x: f64) -> f64 {
        if x <= properties.minimum {
            return -BETA_MAX;
        }
        if x >= properties.maximum {
            return BETA_MAX;
        }
        let (p, q) = Self::cdf(properties, x);
        if p < 0.5 {
            standard_normal::get_u_from_p(p)
        } else {
            standard_normal::get_u_from_q(q)
        }
    }

    fn is_varying(&self, properties: &StochastProperties) -> bool {
        properties.maximum > properties.minimum
    }

    fn get_mean(&self, properties: &StochastProperties) -> f64 {
        (properties.minimum + properties.shift + properties.maximum) / 3.0
    }

    fn get_deviation(&self, properties: &StochastProperties) -> f64 {
        let (a, c, b) = (properties.minimum, properties.shift, properties.maximum);
        ((a * a + b * b + c * c - a * b - a * c - b * c) / 18.0).sqrt()
    }

    fn set_mean_and_deviation(&self, properties: &mut StochastProperties, mean: f64, deviation: f64) {
        let half_width = 6.0_f64.sqrt() * deviation;
        properties.minimum = mean - half_width;
        properties.shift = mean;
        properties.maximum = mean + half_width;
    }

    fn can_invert(&self) -> bool {
        true
    }

    fn validate(&self, properties: &StochastProperties, subject: &str, report: &mut ValidationReport) {
        if !(properties.minimum <= properties.shift && properties.shift <= properties.maximum) {
            report.add_error(subject, "triangular distribution needs minimum <= mode (shift) <= maximum");
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Exponential;

impl Distribution for Exponential {
    fn get_x_from_u(&self, properties: &StochastProperties, u: f64) -> f64 {
        let q = standard_normal::get_q_from_u(u);
        if u < 0.0 {
            // -ln(q) with q close to one
            let p = standard_normal::get_p_from_u(u);
            properties.shift - properties.scale * (-p).ln_1p()
        } else {
            properties.shift - properties.scale * q.ln()
        }
    }

    fn get_u_from_x(&self, properties: &StochastProperties, x: f64) -> f64 {
        if x <= properties.shift {
            return -BETA_MAX;
        }
        if properties.scale == 0.0 {
            return 0.0;
        }
        let t = (x - properties.shift) / properties.scale;
        let q = (-t).exp();
        if q > 0.5 {
            standard_normal::get_u_from_p(-(-t).exp_m1())
        } else {
            standard_normal::get_u_from_q(q)
        }
    }

    fn is_varying(&self, properties: &StochastProperties) -> bool {
        properties.scale > 0.0
    }

    fn get_mean(&self, properties: &StochastProperties) -> f64 {
        properties.shift + properties.scale
    }

    fn get_deviation(&self, properties: &StochastProperties) -> f64 {
        properties.scale
    }

    fn set_mean_and_deviation(&self, properties: &mut StochastProperties, mean: f64, deviation: f64) {
        properties.scale = deviation;
        properties.shift = mean - deviation;
    }

    fn can_truncate(&self) -> bool {
        true
    }

    fn can_invert(&self) -> bool {
        true
    }

    fn is_shift_used(&self) -> bool {
        true
    }

    fn validate(&self, properties: &StochastProperties, subject: &str, report: &mut ValidationReport) {
        check_scale(properties, subject, report);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Gumbel;

impl Distribution for Gumbel {
    fn get_x_from_u(&self, properties: &StochastProperties, u: f64) -> f64 {
        // -ln(p), evaluated through q in the upper tail
        let minus_ln_p = if u > 0.0 {
            -(-standard_normal::get_q_from_u(u)).ln_1p()
        } else {
            -standard_normal::get_p_from_u(u).ln()
        };
        properties.shift - properties.scale * minus_ln_p.ln()
    }

    fn get_u_from_x(&self, properties: &StochastProperties, x: f64) -> f64 {
        if properties.scale == 0.0 {
            return 0.0;
        }
        let t = (-(x - properties.shift) / properties.scale).exp();
        let p = (-t).exp();
        if p > 0.5 {
            standard_normal::get_u_from_q(-(-t).exp_m1())
        } else {
            standard_normal::get_u_from_p(p)
        }
    }

    fn is_varying(&self, properties: &StochastProperties) -> bool {
        properties.scale > 0.0
    }

    fn get_mean(&self, properties: &StochastProperties) -> f64 {
        properties.shift + EULER_GAMMA * properties.scale
    }

    fn get_deviation(&self, properties: &StochastProperties) -> f64 {
        std::f64::consts::PI * properties.scale / 6.0_f64.sqrt()
    }

    fn set_mean_and_deviation(&self, properties: &mut StochastProperties, mean: f64, deviation: f64) {
        properties.scale = deviation * 6.0_f64.sqrt() / std::f64::consts::PI;
        properties.shift = mean - EULER_GAMMA * properties.scale;
    }

    fn can_truncate(&self) -> bool {
        true
    }

    fn can_invert(&self) -> bool {
        true
    }

    fn is_shift_used(&self) -> bool {
        true
    }

    fn validate(&self, properties: &StochastProperties, subject: &str, report: &mut ValidationReport) {
        check_scale(properties, subject, report);
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Weibull;

impl Weibull {
    /// Coefficient of variation as a function of the shape
    fn variation(shape: f64) -> f64 {
        let g1 = special::gamma(1.0 + 1.0 / shape);
        let g2 = special::gamma(1.0 + 2.0 / shape);
        (g2 - g1 * g1).max(0.0).sqrt() / g1
    }
}

impl Distribution for Weibull {
    fn get_x_from_u(&self, properties: &StochastProperties, u: f64) -> f64 {
        let minus_ln_q = if u < 0.0 {
            -(-standard_normal::get_p_from_u(u)).ln_1p()
        } else {
            -standard_normal::get_q_from_u(u).ln()
        };
        properties.shift + properties.scale * minus_ln_q.powf(1.0 / properties.shape)
    }

    fn get_u_from_x(&self, properties: &StochastProperties, x: f64) -> f64 {
        if x <= properties.shift {
            return -BETA_MAX;
        }
        if properties.scale == 0.0 {
            return 0.0;
        }
        let t = ((x - properties.shift) / properties.scale).powf(properties.shape);
        let q = (-t).exp();
        if q > 0.5 {
            standard_normal::get_u_from_p(-(-t).exp_m1())
        } else {
            standard_normal::get_u_from_q(q)
        }
    }

    fn is_varying(&self, properties: &StochastProperties) -> bool {
        properties.scale > 0.0
    }

    fn get_mean(&self, properties: &StochastProperties) -> f64 {
        properties.shift + properties.scale * special::gamma(1.0 + 1.0 / properties.shape)
    }

    fn get_deviation(&self, properties: &StochastProperties) -> f64 {
        let g1 = special::gamma(1.0 + 1.0 / properties.shape);
        let g2 = special::gamma(1.0 + 2.0 / properties.shape);
        properties.scale * (g2 - g1 * g1).max(0.0).sqrt()
    }

    /// Fits the shape on the coefficient of variation, then the scale on the mean
    fn set_mean_and_deviation(&self, properties: &mut StochastProperties, mean: f64, deviation: f64) {
        let offset = mean - properties.shift;
        if offset <= 0.0 || deviation <= 0.0 {
            return;
        }

        let finder = BisectionRootFinder::new(1e-10);
        // Search in ln(shape) so the bracket can widen freely
        let ln_shape = finder.calculate_value_from_range(0.0, 1.0, deviation / offset, &mut |t| {
            Self::variation(t.exp())
        });
        if ln_shape.is_finite() {
            properties.shape = ln_shape.exp();
        }
        properties.scale = offset / special::gamma(1.0 + 1.0 / properties.shape);
    }

    fn can_truncate(&self) -> bool {
        true
    }

    fn can_invert(&self) -> bool {
        true
    }

    fn is_shift_used(&self) -> bool {
        true
    }

    fn validate(&self, properties: &StochastProperties, subject: &str, report: &mut ValidationReport) {
        check_scale(properties, subject, report);
        report.check_positive(subject, "shape", properties.shape);
    }
}

/// Reflects an inner distribution around its shift (or zero)
#[derive(Debug)]
pub struct Inverted {
    inner: Box<dyn Distribution>,
}

impl Inverted {
    pub fn new(inner: Box<dyn Distribution>) -> Self {
        Self { inner }
    }

    fn center(&self, properties: &StochastProperties) -> f64 {
        if self.inner.is_shift_used() {
            properties.shift
        } else {
            0.0
        }
    }
}

impl Distribution for Inverted {
    fn get_x_from_u(&self, properties: &StochastProperties, u: f64) -> f64 {
        2.0 * self.center(properties) - self.inner.get_x_from_u(properties, -u)
    }

    fn get_u_from_x(&self, properties: &StochastProperties, x: f64) -> f64 {
        -self
            .inner
            .get_u_from_x(properties, 2.0 * self.center(properties) - x)
    }

    fn is_varying(&self, properties: &StochastProperties) -> bool {
        self.inner.is_varying(properties)
    }

    fn get_mean(&self, properties: &StochastProperties) -> f64 {
        2.0 * self.center(properties) - self.inner.get_mean(properties)
    }

    fn get_deviation(&self, properties: &StochastProperties) -> f64 {
        self.inner.get_deviation(properties)
    }

    fn set_mean_and_deviation(&self, properties: &mut StochastProperties, mean: f64, deviation: f64) {
        let center = self.center(properties);
        self.inner
            .set_mean_and_deviation(properties, 2.0 * center - mean, deviation);
    }

    fn can_truncate(&self) -> bool {
        self.inner.can_truncate()
    }

    fn can_invert(&self) -> bool {
        true
    }

    fn is_shift_used(&self) -> bool {
        self.inner.is_shift_used()
    }

    fn validate(&self, properties: &StochastProperties, subject: &str, report: &mut ValidationReport) {
        self.inner.validate(properties, subject, report);
    }
}

/// Restricts an inner distribution to [minimum, maximum]
#[derive(Debug)]
pub struct Truncated {
    inner: Box<dyn Distribution>,
}

impl Truncated {
    pub fn new(inner: Box<dyn Distribution>) -> Self {
        Self { inner }
    }

    /// Inner non-exceedance below the minimum and exceedance above the maximum
    fn tails(&self, properties: &StochastProperties) -> (f64, f64) {
        let p_low = if properties.minimum.is_finite() {
            standard_normal::get_p_from_u(self.inner.get_u_from_x(properties, properties.minimum))
        } else {
            0.0
        };
        let q_high = if properties.maximum.is_finite() {
            standard_normal::get_q_from_u(self.inner.get_u_from_x(properties, properties.maximum))
        } else {
            0.0
        };
        (p_low, q_high)
    }
}

impl Distribution for Truncated {
    fn get_x_from_u(&self, properties: &StochastProperties, u: f64) -> f64 {
        let (p_low, q_high) = self.tails(properties);
        let mass = 1.0 - p_low - q_high;
        if mass <= 0.0 {
            return properties.minimum.max(properties.maximum.min(self.inner.get_x_from_u(properties, 0.0)));
        }

        let u_inner = if u < 0.0 {
            standard_normal::get_u_from_p(p_low + standard_normal::get_p_from_u(u) * mass)
        } else {
            standard_normal::get_u_from_q(q_high + standard_normal::get_q_from_u(u) * mass)
        };

        let x = self.inner.get_x_from_u(properties, u_inner);
        x.max(properties.minimum).min(properties.maximum)
    }

    fn get_u_from_x(&self, properties: &StochastProperties, x: f64) -> f64 {
        if x <= properties.minimum {
            return -BETA_MAX;
        }
        if x >= properties.maximum {
            return BETA_MAX;
        }
        let (p_low, q_high) = self.tails(properties);
        let factor = 1.0 / (1.0 - p_low - q_high);
        if !factor.is_finite() || factor <= 0.0 {
            return 0.0;
        }

        let u_inner = self.inner.get_u_from_x(properties, x);
        if u_inner < 0.0 {
            let p = (standard_normal::get_p_from_u(u_inner) - p_low) * factor;
            standard_normal::get_u_from_p(p)
        } else {
            let q = (standard_normal::get_q_from_u(u_inner) - q_high) * factor;
            standard_normal::get_u_from_q(q)
        }
    }

    fn is_varying(&self, properties: &StochastProperties) -> bool {
        self.inner.is_varying(properties) && properties.maximum > properties.minimum
    }

    fn get_mean(&self, properties: &StochastProperties) -> f64 {
        numeric_moments(|u| self.get_x_from_u(properties, u)).0
    }

    fn get_deviation(&self, properties: &StochastProperties) -> f64 {
        numeric_moments(|u| self.get_x_from_u(properties, u)).1
    }

    /// Applied to the untruncated distribution
    fn set_mean_and_deviation(&self, properties: &mut StochastProperties, mean: f64, deviation: f64) {
        self.inner.set_mean_and_deviation(properties, mean, deviation);
    }

    fn can_truncate(&self) -> bool {
        true
    }

    fn can_invert(&self) -> bool {
        self.inner.can_invert()
    }

    fn is_shift_used(&self) -> bool {
        self.inner.is_shift_used()
    }

    fn validate(&self, properties: &StochastProperties, subject: &str, report: &mut ValidationReport) {
        self.inner.validate(properties, subject, report);
        if properties.minimum > properties.maximum {
            report.add_error(subject, "truncation minimum is larger than maximum");
        }
    }
}
