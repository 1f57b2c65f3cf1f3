//! Aggregation of failing samples into one representative point

use std::collections::HashMap;

use crate::entities::sample::Sample;
use crate::entities::settings::DesignPointMethod;

/// Collects weighted samples and combines them by the selected method
#[derive(Debug, Clone)]
pub struct DesignPointBuilder {
    method: DesignPointMethod,
    count: usize,
    samples_added: usize,

    nearest: Option<(Vec<f64>, f64)>,

    weighted_sum: Vec<f64>,
    total_weight: f64,

    radius_sum: f64,
    sin_sums: Vec<f64>,
    cos_sums: Vec<f64>,

    scenario_weights: HashMap<i32, f64>,
}

impl DesignPointBuilder {
    pub fn new(method: DesignPointMethod, count: usize) -> Self {
        let angles = count.saturating_sub(1);
        Self {
            method,
            count,
            samples_added: 0,
            nearest: None,
            weighted_sum: vec![0.0; count],
            total_weight: 0.0,
            radius_sum: 0.0,
            sin_sums: vec![0.0; angles],
            cos_sums: vec![0.0; angles],
            scenario_weights: HashMap::new(),
        }
    }

    pub fn method(&self) -> DesignPointMethod {
        self.method
    }

    pub fn is_empty(&self) -> bool {
        self.samples_added == 0
    }

    /// Adds a sample with its weight; samples of another size are ignored
    pub fn add_sample(&mut self, sample: &Sample) {
        if sample.values.len() != self.count || !(sample.weight >= 0.0) {
            return;
        }
        let weight = sample.weight;
        self.samples_added += 1;
        *self.scenario_weights.entry(sample.scenario_index).or_insert(0.0) += weight;

        match self.method {
            DesignPointMethod::NearestToMean => {
                let norm = sample.norm();
                let closer = self.nearest.as_ref().map_or(true, |(_, best)| norm < *best);
                if closer {
                    self.nearest = Some((sample.values.clone(), norm));
                }
            }
            DesignPointMethod::CenterOfGravity => {
                for (sum, value) in self.weighted_sum.iter_mut().zip(&sample.values) {
                    *sum += weight * value;
                }
                self.total_weight += weight;
            }
            DesignPointMethod::CenterOfAngles => {
                let (radius, angles) = to_spherical(&sample.values);
                self.radius_sum += weight * radius;
                for (k, angle) in angles.iter().enumerate() {
                    self.sin_sums[k] += weight * angle.sin();
                    self.cos_sums[k] += weight * angle.cos();
                }
                // One dimensional case: keep the signed mean as well
                for (sum, value) in self.weighted_sum.iter_mut().zip(&sample.values) {
                    *sum += weight * value;
                }
                self.total_weight += weight;
            }
        }
    }

    /// Scenario with the largest accumulated weight, -1 when empty
    pub fn dominant_scenario(&self) -> i32 {
        self.scenario_weights
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1).then(b.0.cmp(a.0)))
            .map_or(-1, |(&scenario, _)| scenario)
    }

    /// Combined point, `None` when no sample was added
    pub fn get_sample(&self) -> Option<Sample> {
        if self.is_empty() {
            return None;
        }

        let values = match self.method {
            DesignPointMethod::NearestToMean => self.nearest.as_ref()?.0.clone(),
            DesignPointMethod::CenterOfGravity => self.mean_values(),
            DesignPointMethod::CenterOfAngles => {
                if self.count < 2 || !(self.total_weight > 0.0) {
                    self.mean_values()
                } else {
                    let radius = self.radius_sum / self.total_weight;
                    let angles: Vec<f64> = self
                        .sin_sums
                        .iter()
                        .zip(&self.cos_sums)
                        .map(|(s, c)| s.atan2(*c))
                        .collect();
                    from_spherical(radius, &angles)
                }
            }
        };

        let mut sample = Sample::new(values);
        sample.scenario_index = self.dominant_scenario();
        Some(sample)
    }

    fn mean_values(&self) -> Vec<f64> {
        if self.total_weight > 0.0 {
            self.weighted_sum
                .iter()
                .map(|v| v / self.total_weight)
                .collect()
        } else {
            vec![0.0; self.count]
        }
    }
}

/// Radius and the n - 1 hyperspherical angles of a vector
fn to_spherical(values: &[f64]) -> (f64, Vec<f64>) {
    let n = values.len();
    let radius = values.iter().map(|v| v * v).sum::<f64>().sqrt();
    if n < 2 {
        return (radius, Vec::new());
    }

    let mut angles = Vec::with_capacity(n - 1);
    for k in 0..n - 2 {
        let tail = values[k + 1..].iter().map(|v| v * v).sum::<f64>().sqrt();
        angles.push(tail.atan2(values[k]));
    }
    angles.push(values[n - 1].atan2(values[n - 2]));
    (radius, angles)
}

fn from_spherical(radius: f64, angles: &[f64]) -> Vec<f64> {
    let n = angles.len() + 1;
    let mut values = Vec::with_capacity(n);
    let mut sin_product = radius;
    for angle in angles {
        values.push(sin_product * angle.cos());
        sin_product *= angle.sin();
    }
    values.push(sin_product);
    values
}
