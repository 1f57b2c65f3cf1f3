//! Limit-state values along a ray from the origin

use crate::core::error::Result;
use crate::core::model_runner::ModelRunner;
use crate::entities::sample::Sample;

/// Two distances closer than this are the same point on the ray
const SAME_POINT: f64 = 1e-12;

/// Evaluates and caches Z along one direction
///
/// Returned values are multiplied by the run's sign factor, so a positive
/// value is always on the same side as the origin.
pub struct DirectionCalculation<'a> {
    runner: &'a ModelRunner,
    direction: Vec<f64>,
    z0_fac: f64,
    iteration_index: i32,
    points: Vec<(f64, f64)>,
}

impl<'a> DirectionCalculation<'a> {
    /// `direction` is normalized here
    pub fn new(runner: &'a ModelRunner, direction: &[f64], z0_fac: f64) -> Self {
        let norm = direction.iter().map(|v| v * v).sum::<f64>().sqrt();
        let direction = if norm > 0.0 {
            direction.iter().map(|v| v / norm).collect()
        } else {
            direction.to_vec()
        };
        Self {
            runner,
            direction,
            z0_fac,
            iteration_index: -1,
            points: Vec::new(),
        }
    }

    pub fn with_iteration(mut self, iteration_index: i32) -> Self {
        self.iteration_index = iteration_index;
        self
    }

    /// Registers an already computed model value (not sign corrected)
    pub fn with_known_value(mut self, u: f64, z: f64) -> Self {
        self.store(u, z * self.z0_fac);
        self
    }

    pub fn direction(&self) -> &[f64] {
        &self.direction
    }

    pub fn z0_fac(&self) -> f64 {
        self.z0_fac
    }

    /// u-vector at distance `u` from the origin
    pub fn u_vector(&self, u: f64) -> Vec<f64> {
        self.direction.iter().map(|d| d * u).collect()
    }

    /// Cached value at distance `u`, if evaluated before
    pub fn known(&self, u: f64) -> Option<f64> {
        self.points
            .iter()
            .find(|(p, _)| (p - u).abs() < SAME_POINT)
            .map(|&(_, z)| z)
    }

    /// Sign corrected Z at distance `u`
    ///
    /// Points on the ray share the direction's iteration index and are
    /// never memoized.
    pub fn get_z(&mut self, u: f64) -> Result<f64> {
        if let Some(z) = self.known(u) {
            return Ok(z);
        }
        let mut sample = Sample::new(self.u_vector(u)).with_iteration(self.iteration_index);
        let z = self.runner.get_z_value(&mut sample)? * self.z0_fac;
        self.store(u, z);
        Ok(z)
    }

    fn store(&mut self, u: f64, z: f64) {
        match self.points.iter_mut().find(|(p, _)| (*p - u).abs() < SAME_POINT) {
            Some(point) => point.1 = z,
            None => self.points.push((u, z)),
        }
    }

    /// Distance with the smallest |Z| seen so far, NaN when none is defined
    pub fn minimal_value_u(&self) -> f64 {
        self.points
            .iter()
            .filter(|(_, z)| !z.is_nan())
            .min_by(|a, b| a.1.abs().total_cmp(&b.1.abs()))
            .map_or(f64::NAN, |&(u, _)| u)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::model_runner::ZModel;
    use crate::core::uconverter::UConverter;
    use crate::entities::settings::RunSettings;
    use crate::entities::stochast::Stochast;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_values_cached_and_sign_corrected() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let evaluator = Arc::new(move |x: &[f64]| {
            counter.fetch_add(1, Ordering::Relaxed);
            x[0] - 2.0
        });
        let converter = UConverter::uncorrelated(vec![
            Stochast::normal("a", 0.0, 1.0),
            Stochast::normal("b", 0.0, 1.0),
        ]);
        let mut runner =
            ModelRunner::new(ZModel::new(evaluator), converter, RunSettings::default()).unwrap();
        runner.initialize_for_run().unwrap();

        let mut calculation = DirectionCalculation::new(&runner, &[2.0, 0.0], -1.0);
        assert_eq!(calculation.direction(), &[1.0, 0.0]);
        assert_eq!(calculation.get_z(3.0).unwrap(), -1.0);
        assert_eq!(calculation.get_z(3.0).unwrap(), -1.0);
        assert_eq!(calls.load(Ordering::Relaxed), 1);

        let calculation = calculation.with_known_value(0.0, -2.0);
        assert_eq!(calculation.known(0.0), Some(2.0));
        assert_eq!(calculation.minimal_value_u(), 3.0);
    }

    #[test]
    fn test_ray_points_ignore_memoized_iteration() {
        let evaluator = Arc::new(|x: &[f64]| 3.0 - x[0]);
        let converter = UConverter::uncorrelated(vec![Stochast::normal("a", 0.0, 1.0)]);
        let model = ZModel::new(evaluator.clone()).with_proxy(evaluator);
        let mut runner = ModelRunner::new(model, converter, RunSettings::default()).unwrap();
        runner.initialize_for_run().unwrap();

        let mut exact = Sample::new(vec![1.0]).with_iteration(7).memoized();
        exact.allow_proxy = false;
        assert_eq!(runner.get_z_value(&mut exact).unwrap(), 2.0);
        assert_eq!(runner.model().memo_len(), 1);

        let mut calculation = DirectionCalculation::new(&runner, &[1.0], 1.0).with_iteration(7);
        assert_eq!(calculation.get_z(2.0).unwrap(), 1.0);
        assert_eq!(calculation.get_z(5.0).unwrap(), -2.0);
    }
}
