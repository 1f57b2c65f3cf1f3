//! First order reliability method
//!
//! Iterative search for the point on the limit state closest to the
//! origin, linearizing Z with finite difference gradients. When the
//! iteration does not converge the search is repeated with half the
//! relaxation; earlier attempts are kept as contributing design points.

use tracing::{debug, info, warn};

use crate::core::error::{ReliabilityError, Result};
use crate::core::model_runner::ModelRunner;
use crate::core::standard_normal::BETA_MAX;
use crate::core::validation::MessageType;
use crate::entities::design_point::{ConvergenceReport, DesignPoint, ReliabilityResult};
use crate::entities::sample::Sample;
use crate::entities::settings::{FormSettings, GradientType, StartMethod};
use crate::reliability::Solve;

#[derive(Debug, Clone, Default)]
pub struct Form {
    pub settings: FormSettings,
}

/// Z and its gradient at one point
#[derive(Debug, Clone)]
struct Linearization {
    z: f64,
    gradient: Vec<f64>,
}

/// Outcome of one relaxation attempt
struct Attempt {
    design_point: DesignPoint,
    converged: bool,
    aborted: bool,
}

impl Form {
    pub fn new(settings: FormSettings) -> Self {
        Self { settings }
    }

    fn start_vector(&self, count: usize) -> Result<Vec<f64>> {
        match self.settings.start_method {
            StartMethod::Zero => Ok(vec![0.0; count]),
            StartMethod::One => Ok(vec![1.0; count]),
            StartMethod::GivenVector => {
                if self.settings.start_vector.len() != count {
                    return Err(ReliabilityError::DimensionMismatch {
                        expected: count,
                        actual: self.settings.start_vector.len(),
                    });
                }
                Ok(self.settings.start_vector.clone())
            }
        }
    }

    /// Finite difference gradient; all points of one gradient form a batch
    ///
    /// Only the center point carries the iteration index and is memoized.
    /// A center with `reuse` set may take the remembered authoritative value.
    fn linearize(
        &self,
        runner: &ModelRunner,
        u: &[f64],
        iteration: i32,
        reuse: bool,
    ) -> Result<Linearization> {
        let step = self.settings.gradient.step_size;
        let count = u.len();
        let shifted = |index: usize, delta: f64| {
            let mut values = u.to_vec();
            values[index] += delta;
            let mut sample = Sample::new(values);
            sample.allow_proxy = false;
            sample
        };

        let mut center = Sample::new(u.to_vec()).with_iteration(iteration).memoized();
        center.allow_proxy = reuse;
        let mut samples = vec![center];
        match self.settings.gradient.gradient_type {
            GradientType::OneDirection => {
                samples.extend((0..count).map(|i| shifted(i, step)));
            }
            GradientType::TwoDirections => {
                samples.extend((0..count).map(|i| shifted(i, step)));
                samples.extend((0..count).map(|i| shifted(i, -step)));
            }
        }

        let z = runner.get_z_values(&mut samples)?;
        let gradient = match self.settings.gradient.gradient_type {
            GradientType::OneDirection => (0..count).map(|i| (z[i + 1] - z[0]) / step).collect(),
            GradientType::TwoDirections => (0..count)
                .map(|i| (z[i + 1] - z[count + i + 1]) / (2.0 * step))
                .collect(),
        };
        Ok(Linearization { z: z[0], gradient })
    }

    fn run_attempt(
        &self,
        runner: &ModelRunner,
        relaxation_factor: f64,
        attempt: usize,
    ) -> Result<Attempt> {
        let count = runner.vary_count();
        let mut u = self.start_vector(count)?;
        let mut beta = f64::NAN;
        let mut design_u = u.clone();
        let mut convergence = f64::NAN;
        let mut converged = false;
        let mut aborted = false;
        let mut iterations = 0;

        for iteration in 0..self.settings.maximum_iterations {
            if runner.should_exit() {
                debug!(iteration, "FORM ended early on exit request");
                break;
            }
            iterations = iteration + 1;

            // Every attempt starts at the same point, so it shares index 0
            let index = if iteration == 0 {
                0
            } else {
                (attempt * self.settings.maximum_iterations + iteration) as i32
            };
            let reuse = iteration == 0 && attempt > 0;
            let Linearization { z, mut gradient } = self.linearize(runner, &u, index, reuse)?;

            if z.is_nan() || gradient.iter().all(|g| g.is_nan()) {
                runner.add_message(
                    MessageType::Error,
                    format!("Model could not be evaluated at iteration {}, no gradient", iteration),
                );
                aborted = true;
                break;
            }
            for g in gradient.iter_mut().filter(|g| g.is_nan()) {
                *g = 0.0;
            }

            let gradient_norm = gradient.iter().map(|g| g * g).sum::<f64>().sqrt();
            let z0 = z - u.iter().zip(&gradient).map(|(a, b)| a * b).sum::<f64>();

            beta = if gradient_norm > 0.0 {
                z0 / gradient_norm
            } else if z0 < 0.0 {
                -BETA_MAX
            } else {
                BETA_MAX
            };

            if beta.abs() >= BETA_MAX {
                runner.add_message(
                    MessageType::Warning,
                    format!("Reliability index reached its maximum at iteration {}", iteration),
                );
                beta = beta.clamp(-BETA_MAX, BETA_MAX);
                design_u = u.clone();
                break;
            }

            let alpha: Vec<f64> = gradient.iter().map(|g| g / gradient_norm).collect();
            design_u = alpha.iter().map(|a| -a * beta).collect();

            let u_squared: f64 = u.iter().map(|v| v * v).sum();
            let beta_measure = if u_squared > 0.0 {
                (beta * beta - u_squared).abs() / u_squared
            } else if beta == 0.0 {
                0.0
            } else {
                f64::INFINITY
            };
            let z_measure = z.abs() / gradient_norm;
            convergence = beta_measure.max(z_measure);

            debug!(iteration, beta, convergence, "FORM iteration");
            runner.report_result(
                ReliabilityResult {
                    index: iteration,
                    beta,
                    convergence,
                    is_converged: convergence < self.settings.epsilon_beta,
                },
                self.settings.maximum_iterations,
            );

            if convergence < self.settings.epsilon_beta {
                converged = true;
                break;
            }

            u = u
                .iter()
                .zip(&design_u)
                .map(|(old, new)| relaxation_factor * new + (1.0 - relaxation_factor) * old)
                .collect();
        }

        let point = runner.get_stochast_point(&design_u, beta)?;
        let mut design_point = DesignPoint::new(format!("FORM attempt {}", attempt + 1), point);
        design_point.convergence_report = ConvergenceReport {
            convergence,
            relaxation_factor: Some(relaxation_factor),
            is_converged: converged,
            total_samples: iterations,
            ..Default::default()
        };

        Ok(Attempt {
            design_point,
            converged,
            aborted,
        })
    }
}

impl Solve for Form {
    fn solve(&self, runner: &ModelRunner) -> Result<DesignPoint> {
        info!(
            varying = runner.vary_count(),
            relaxation = self.settings.relaxation_factor,
            "Starting FORM"
        );

        let attempts = self.settings.relaxation_loops.max(1);
        let mut relaxation_factor = self.settings.relaxation_factor;
        let mut failed = Vec::new();

        for attempt in 0..attempts {
            let result = self.run_attempt(runner, relaxation_factor, attempt)?;
            let last = attempt + 1 == attempts;

            if result.converged || result.aborted || last || runner.should_exit() {
                let mut design_point = result.design_point;
                design_point.identifier = "FORM".to_string();
                design_point.contributing_design_points = failed;
                if !design_point.is_converged() {
                    warn!(beta = design_point.beta(), "FORM did not converge");
                    runner.add_message(MessageType::Warning, "FORM did not converge");
                }
                runner.attach_histories(&mut design_point);
                info!(
                    beta = design_point.beta(),
                    converged = design_point.is_converged(),
                    "FORM finished"
                );
                return Ok(design_point);
            }

            debug!(attempt, relaxation_factor, "FORM attempt not converged, halving relaxation");
            failed.push(result.design_point);
            relaxation_factor /= 2.0;
        }

        Err(ReliabilityError::UnsupportedOperation(
            "FORM needs at least one attempt".to_string(),
        ))
    }
}
