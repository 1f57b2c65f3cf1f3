//! Crude Monte Carlo
//!
//! Independent standard normal samples, optionally restricted to u-space
//! bounds per varying stochast. The probability outside the bounds is
//! assumed safe and corrected for with a constant mass factor.

use tracing::{debug, info, warn};

use crate::core::error::{ReliabilityError, Result};
use crate::core::model_runner::ModelRunner;
use crate::core::random::RandomSampleGenerator;
use crate::core::standard_normal;
use crate::core::validation::MessageType;
use crate::entities::design_point::{ConvergenceReport, DesignPoint, ReliabilityResult};
use crate::entities::sample::Sample;
use crate::entities::settings::{CrudeMonteCarloSettings, UBounds};
use crate::reliability::design_point_builder::DesignPointBuilder;
use crate::reliability::Solve;

#[derive(Debug, Clone, Default)]
pub struct CrudeMonteCarlo {
    pub settings: CrudeMonteCarloSettings,
}

/// Sampling range of one varying stochast as non-exceedance probabilities
#[derive(Debug, Clone, Copy)]
struct ProbabilityRange {
    p_low: f64,
    p_high: f64,
}

impl ProbabilityRange {
    fn full() -> Self {
        Self {
            p_low: 0.0,
            p_high: 1.0,
        }
    }

    fn from_bounds(bounds: &UBounds) -> Self {
        Self {
            p_low: standard_normal::get_p_from_u(bounds.u_min),
            p_high: standard_normal::get_p_from_u(bounds.u_max),
        }
    }

    fn mass(&self) -> f64 {
        (self.p_high - self.p_low).max(0.0)
    }

    fn draw(&self, generator: &mut RandomSampleGenerator) -> f64 {
        let p = self.p_low + generator.next_uniform() * self.mass();
        standard_normal::get_u_from_p(p)
    }
}

/// Coefficient of variation of a fraction estimated from `n` samples,
/// taken for the smaller of p and 1 - p
pub fn fraction_variation_coefficient(fraction: f64, n: usize) -> f64 {
    let p = fraction.min(1.0 - fraction);
    if n == 0 || !(p > 0.0) {
        return f64::INFINITY;
    }
    ((1.0 - p) / (n as f64 * p)).sqrt()
}

impl CrudeMonteCarlo {
    pub fn new(settings: CrudeMonteCarloSettings) -> Self {
        Self { settings }
    }

    fn ranges(&self, count: usize) -> Result<Vec<ProbabilityRange>> {
        let bounds = &self.settings.u_bounds;
        if bounds.is_empty() {
            return Ok(vec![ProbabilityRange::full(); count]);
        }
        if bounds.len() != count {
            return Err(ReliabilityError::DimensionMismatch {
                expected: count,
                actual: bounds.len(),
            });
        }
        Ok(bounds
            .iter()
            .map(|b| b.as_ref().map_or_else(ProbabilityRange::full, ProbabilityRange::from_bounds))
            .collect())
    }
}

impl Solve for CrudeMonteCarlo {
    fn solve(&self, runner: &ModelRunner) -> Result<DesignPoint> {
        let settings = &self.settings;
        let count = runner.vary_count();
        info!(
            varying = count,
            max_samples = settings.maximum_samples,
            "Starting crude Monte Carlo"
        );

        let ranges = self.ranges(count)?;
        let mass_factor: f64 = ranges.iter().map(ProbabilityRange::mass).product();
        if !(mass_factor > 0.0) {
            return Err(ReliabilityError::InvalidSettings(
                "u_bounds leave no probability mass to sample".to_string(),
            ));
        }

        let mut generator = RandomSampleGenerator::new(settings.random.clone());
        let mut builder = DesignPointBuilder::new(settings.design_point_method, count);
        let chunk = runner.settings().chunk_size();

        let mut drawn = 0;
        let mut evaluated = 0;
        let mut failures = 0;
        let mut skipped = 0;
        let mut convergence = f64::INFINITY;
        let mut converged = false;

        while drawn < settings.maximum_samples && !converged {
            if runner.should_exit() {
                debug!(drawn, "Crude Monte Carlo ended early on exit request");
                break;
            }

            let batch = chunk.min(settings.maximum_samples - drawn);
            let mut samples: Vec<Sample> = (0..batch)
                .map(|i| {
                    let values = ranges.iter().map(|r| r.draw(&mut generator)).collect();
                    Sample::new(values).with_iteration((drawn + i) as i32).memoized()
                })
                .collect();
            runner.get_z_values(&mut samples)?;

            for sample in &samples {
                if sample.z.is_nan() {
                    skipped += 1;
                    continue;
                }
                evaluated += 1;
                if sample.z < 0.0 {
                    failures += 1;
                    builder.add_sample(sample);
                }
            }
            drawn += batch;

            let fraction = if evaluated > 0 {
                failures as f64 / evaluated as f64
            } else {
                f64::NAN
            };
            convergence = fraction_variation_coefficient(fraction, evaluated);
            converged = evaluated >= settings.minimum_samples
                && convergence < settings.variation_coefficient;

            runner.report_result(
                ReliabilityResult {
                    index: drawn,
                    beta: standard_normal::get_u_from_q(mass_factor * fraction),
                    convergence,
                    is_converged: converged,
                },
                settings.maximum_samples,
            );
            debug!(drawn, failures, convergence, "Crude Monte Carlo batch");
        }

        let fraction = if evaluated > 0 {
            failures as f64 / evaluated as f64
        } else {
            f64::NAN
        };
        let pf = mass_factor * fraction;
        let beta = if pf.is_nan() {
            f64::NAN
        } else {
            standard_normal::get_u_from_q(pf)
        };

        if skipped > 0 {
            runner.add_message(
                MessageType::Warning,
                format!("{} samples could not be evaluated and were skipped", skipped),
            );
        }

        let u = builder
            .get_sample()
            .map_or_else(|| vec![0.0; count], |sample| sample.values);
        let point = runner.get_stochast_point(&u, beta)?;
        let mut design_point = DesignPoint::new("Crude Monte Carlo", point);
        design_point.scenario_index = builder.dominant_scenario();
        design_point.convergence_report = ConvergenceReport {
            convergence,
            failed_samples: failures,
            fail_fraction: if fraction.is_nan() { 0.0 } else { fraction },
            variance_factor: (mass_factor < 1.0).then_some(mass_factor),
            max_weight: 1.0,
            fail_weight: failures as f64,
            is_converged: converged,
            total_samples: drawn,
            ..Default::default()
        };

        if !converged {
            warn!(beta, convergence, "Crude Monte Carlo did not converge");
            runner.add_message(MessageType::Warning, "Crude Monte Carlo did not converge");
        }
        runner.attach_histories(&mut design_point);
        info!(beta, samples = drawn, converged, "Crude Monte Carlo finished");
        Ok(design_point)
    }
}
