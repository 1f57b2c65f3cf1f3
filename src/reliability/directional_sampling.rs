//! Directional sampling
//!
//! Random directions are drawn in u-space. Along each direction the
//! reliability index is found by the direction search; the chi-square tail
//! beyond that index is the failure probability estimate of the direction.
//! The directions of one chunk are searched in parallel and merged in draw
//! order, so the result does not depend on the number of threads.

use tracing::{debug, info, warn};

use crate::core::error::Result;
use crate::core::model_runner::ModelRunner;
use crate::core::random::RandomSampleGenerator;
use crate::core::special;
use crate::core::standard_normal;
use crate::core::validation::MessageType;
use crate::entities::design_point::{ConvergenceReport, DesignPoint, ReliabilityResult};
use crate::entities::sample::Sample;
use crate::entities::settings::{DirectionalSamplingSettings, ModelVaryingType};
use crate::reliability::design_point_builder::DesignPointBuilder;
use crate::reliability::direction_calculation::DirectionCalculation;
use crate::reliability::direction_sections::DirectionSectionsCalculation;
use crate::reliability::Solve;

#[derive(Debug, Clone, Default)]
pub struct DirectionalSampling {
    pub settings: DirectionalSamplingSettings,
}

/// Result of the search along one direction
struct DirectionOutcome {
    index: i32,
    beta: f64,
    u: Vec<f64>,
}

/// Running sums of the direction weights
#[derive(Debug, Clone, Copy, Default)]
struct WeightSums {
    count: usize,
    sum: f64,
    sum_squares: f64,
}

impl WeightSums {
    fn add(&mut self, weight: f64) {
        self.count += 1;
        self.sum += weight;
        self.sum_squares += weight * weight;
    }

    fn probability(&self) -> f64 {
        if self.count == 0 {
            f64::NAN
        } else {
            self.sum / self.count as f64
        }
    }

    /// Coefficient of variation of the estimate, taken for the smaller of
    /// pf and 1 - pf
    fn variation_coefficient(&self) -> f64 {
        let n = self.count as f64;
        if self.count < 2 {
            return f64::INFINITY;
        }
        let pf = self.probability();
        let variance =
            (self.sum_squares - 2.0 * pf * self.sum + n * pf * pf).max(0.0) / (n * (n - 1.0));
        let p = pf.min(1.0 - pf);
        if p > 0.0 {
            variance.sqrt() / p
        } else {
            f64::INFINITY
        }
    }
}

impl DirectionalSampling {
    pub fn new(settings: DirectionalSamplingSettings) -> Self {
        Self { settings }
    }

    /// Z at the end of each direction in one batch, for monotone models
    fn precompute_ends(
        &self,
        runner: &ModelRunner,
        directions: &[Vec<f64>],
        first_index: usize,
    ) -> Result<Vec<Option<f64>>> {
        if self.settings.direction.model_varying_type != ModelVaryingType::Monotone {
            return Ok(vec![None; directions.len()]);
        }
        let length = self.settings.direction.maximum_length_u;
        let mut samples: Vec<Sample> = directions
            .iter()
            .enumerate()
            .map(|(i, d)| {
                Sample::new(d.iter().map(|v| v * length).collect())
                    .with_iteration((first_index + i) as i32)
            })
            .collect();
        let z = runner.get_z_values(&mut samples)?;
        Ok(z.into_iter().map(Some).collect())
    }
}

impl Solve for DirectionalSampling {
    fn solve(&self, runner: &ModelRunner) -> Result<DesignPoint> {
        let settings = &self.settings;
        let count = runner.vary_count();
        info!(
            varying = count,
            max_directions = settings.maximum_directions,
            "Starting directional sampling"
        );

        let mut origin = Sample::origin(count);
        let z_origin = runner.get_z_value(&mut origin)?;
        let z0_fac = if z_origin < 0.0 { -1.0 } else { 1.0 };

        let mut generator = RandomSampleGenerator::new(settings.random.clone());
        let mut builder = DesignPointBuilder::new(settings.design_point_method, count);
        let sections = DirectionSectionsCalculation::new(&settings.direction);

        let mut sums = WeightSums::default();
        let mut drawn = 0;
        let mut failed = 0;
        let mut skipped = 0;
        let mut max_weight: f64 = 0.0;
        let mut convergence = f64::INFINITY;
        let mut converged = false;
        let chunk = runner.settings().chunk_size();

        while drawn < settings.maximum_directions && !converged {
            if runner.should_exit() {
                debug!(drawn, "Directional sampling ended early on exit request");
                break;
            }

            let batch = chunk.min(settings.maximum_directions - drawn);
            let directions: Vec<Vec<f64>> =
                (0..batch).map(|_| generator.next_direction(count)).collect();
            let ends = self.precompute_ends(runner, &directions, drawn)?;

            let work: Vec<(Vec<f64>, Option<f64>)> = directions.into_iter().zip(ends).collect();
            let search = |i: usize,
                          (direction, end): &(Vec<f64>, Option<f64>)|
             -> Result<DirectionOutcome> {
                let index = (drawn + i) as i32;
                let mut calculation = DirectionCalculation::new(runner, direction, z0_fac)
                    .with_iteration(index)
                    .with_known_value(0.0, z_origin);
                if let Some(z_end) = *end {
                    calculation =
                        calculation.with_known_value(settings.direction.maximum_length_u, z_end);
                }
                let beta = sections.get_beta(&mut calculation)?;
                runner.remove_task(index);
                Ok(DirectionOutcome {
                    index,
                    beta,
                    u: calculation.u_vector(beta),
                })
            };
            let outcomes = runner.run_parallel(&work, search);

            for outcome in outcomes {
                let DirectionOutcome { index, beta, u } = outcome?;
                if beta.is_nan() {
                    skipped += 1;
                    continue;
                }

                let weight = special::chi_square_tail(count, beta);
                sums.add(weight);
                max_weight = max_weight.max(weight);

                if weight > 0.0 && beta < standard_normal::BETA_MAX {
                    failed += 1;
                    let mut sample = Sample::new(u).with_weight(weight);
                    sample.iteration_index = index;
                    builder.add_sample(&sample);
                }
            }
            drawn += batch;

            convergence = sums.variation_coefficient();
            converged =
                sums.count >= settings.minimum_directions && convergence < settings.variation_coefficient;

            let pf = sums.probability();
            runner.report_result(
                ReliabilityResult {
                    index: drawn,
                    beta: z0_fac * standard_normal::get_u_from_q(pf),
                    convergence,
                    is_converged: converged,
                },
                settings.maximum_directions,
            );
            debug!(drawn, pf, convergence, "Directional sampling batch");
        }

        let pf = sums.probability();
        let beta = if pf.is_nan() {
            f64::NAN
        } else {
            z0_fac * standard_normal::get_u_from_q(pf)
        };

        if skipped > 0 {
            runner.add_message(
                MessageType::Warning,
                format!("{} directions could not be evaluated and were skipped", skipped),
            );
        }

        let u = builder
            .get_sample()
            .map_or_else(|| vec![0.0; count], |sample| sample.values);
        let point = runner.get_stochast_point(&u, beta)?;
        let mut design_point = DesignPoint::new("Directional sampling", point);
        design_point.scenario_index = builder.dominant_scenario();
        design_point.convergence_report = ConvergenceReport {
            convergence,
            failed_samples: failed,
            fail_fraction: if sums.count > 0 {
                failed as f64 / sums.count as f64
            } else {
                0.0
            },
            max_weight,
            fail_weight: sums.sum,
            is_converged: converged,
            total_samples: drawn,
            ..Default::default()
        };

        if !converged {
            warn!(beta, convergence, "Directional sampling did not converge");
            runner.add_message(MessageType::Warning, "Directional sampling did not converge");
        }
        runner.attach_histories(&mut design_point);
        info!(beta, directions = drawn, converged, "Directional sampling finished");
        Ok(design_point)
    }
}
