//! Sample - one point in u-space handed to the model

use serde::{Deserialize, Serialize};

/// A point in u-space plus bookkeeping for one model evaluation
///
/// `values` only holds the varying stochasts; the converter expands it to
/// the full dimension before the model is called.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub values: Vec<f64>,
    pub iteration_index: i32,
    pub scenario_index: i32,
    pub weight: f64,
    /// May be evaluated with the proxy model
    pub allow_proxy: bool,
    /// Previously memoized results for this iteration are stale
    pub is_restart_required: bool,
    /// The point stands for its whole iteration; its authoritative result
    /// is remembered under the iteration index
    #[serde(default)]
    pub memoize: bool,
    /// Model result, NaN until evaluated
    pub z: f64,
    pub tag: i32,
}

impl Sample {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            iteration_index: -1,
            scenario_index: -1,
            weight: 1.0,
            allow_proxy: true,
            is_restart_required: false,
            memoize: false,
            z: f64::NAN,
            tag: 0,
        }
    }

    /// Sample at the origin of a `count` dimensional u-space
    pub fn origin(count: usize) -> Self {
        Self::new(vec![0.0; count])
    }

    pub fn with_iteration(mut self, iteration_index: i32) -> Self {
        self.iteration_index = iteration_index;
        self
    }

    /// Marks the sample as the memoized point of its iteration
    pub fn memoized(mut self) -> Self {
        self.memoize = true;
        self
    }

    pub fn with_weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn size(&self) -> usize {
        self.values.len()
    }

    /// Euclidean length, the beta of the point
    pub fn norm(&self) -> f64 {
        self.values.iter().map(|v| v * v).sum::<f64>().sqrt()
    }
}
