//! Conversion between u-space samples and physical model input
//!
//! Samples only carry the varying stochasts. The converter expands them to
//! the full stochast list, applies correlation and resolves variable
//! stochasts after their sources.

use std::collections::HashMap;

use tracing::debug;

use crate::core::correlation::CorrelationMatrix;
use crate::core::error::{ReliabilityError, Result};
use crate::entities::design_point::{StochastPoint, StochastPointAlpha};
use crate::entities::distributions::Distribution;
use crate::entities::sample::Sample;
use crate::entities::stochast::Stochast;

/// Expands and correlates u-vectors and converts them to x-values
#[derive(Debug)]
pub struct UConverter {
    stochasts: Vec<Stochast>,
    distributions: Vec<Box<dyn Distribution>>,
    correlation: CorrelationMatrix,

    /// Full index of every varying stochast, in sample order
    varying_indices: Vec<usize>,
    /// Correlation restricted to the varying stochasts
    varying_correlation: CorrelationMatrix,
    /// Index of the source stochast of each variable stochast
    sources: Vec<Option<usize>>,
    /// Stochast indices with sources before dependants
    evaluation_order: Vec<usize>,
    initialized: bool,
}

impl UConverter {
    pub fn new(stochasts: Vec<Stochast>, correlation: CorrelationMatrix) -> Result<Self> {
        if correlation.dimension() != stochasts.len() {
            return Err(ReliabilityError::DimensionMismatch {
                expected: stochasts.len(),
                actual: correlation.dimension(),
            });
        }
        let distributions = stochasts.iter().map(Stochast::create_distribution).collect();
        let count = stochasts.len();
        Ok(Self {
            stochasts,
            distributions,
            correlation,
            varying_indices: Vec::new(),
            varying_correlation: CorrelationMatrix::new(0),
            sources: vec![None; count],
            evaluation_order: (0..count).collect(),
            initialized: false,
        })
    }

    /// Uncorrelated converter over the given stochasts
    pub fn uncorrelated(stochasts: Vec<Stochast>) -> Self {
        let count = stochasts.len();
        let distributions = stochasts.iter().map(Stochast::create_distribution).collect();
        Self {
            stochasts,
            distributions,
            correlation: CorrelationMatrix::new(count),
            varying_indices: Vec::new(),
            varying_correlation: CorrelationMatrix::new(0),
            sources: vec![None; count],
            evaluation_order: (0..count).collect(),
            initialized: false,
        }
    }

    /// Partitions varying and fixed stochasts and orders variable sources
    pub fn initialize_for_run(&mut self) -> Result<()> {
        for set in self.stochasts.iter_mut().filter_map(|s| s.value_set.as_mut()) {
            set.sort();
        }

        self.varying_indices = self
            .stochasts
            .iter()
            .enumerate()
            .filter(|(_, s)| s.is_varying())
            .map(|(i, _)| i)
            .collect();

        if self.varying_indices.is_empty() {
            return Err(ReliabilityError::NoVaryingStochasts);
        }

        self.varying_correlation = self.correlation.filtered(&self.varying_indices)?;
        if self.varying_correlation.is_correlated() {
            // Factorize now so a broken matrix fails before the first evaluation
            self.varying_correlation.cholesky_factor()?;
        }

        self.resolve_sources()?;
        self.initialized = true;

        debug!(
            stochasts = self.stochasts.len(),
            varying = self.varying_indices.len(),
            correlated = self.varying_correlation.is_correlated(),
            "Converter initialized"
        );
        Ok(())
    }

    fn resolve_sources(&mut self) -> Result<()> {
        let positions: HashMap<&str, usize> = self
            .stochasts
            .iter()
            .enumerate()
            .map(|(i, s)| (s.name.as_str(), i))
            .collect();

        let mut sources = vec![None; self.stochasts.len()];
        for (i, stochast) in self.stochasts.iter().enumerate() {
            if !stochast.is_variable() {
                continue;
            }
            let Some(name) = stochast.variable_source.as_deref() else {
                continue;
            };
            let source = positions.get(name).copied().ok_or_else(|| {
                ReliabilityError::InvalidSettings(format!(
                    "stochast '{}' refers to unknown source '{}'",
                    stochast.name, name
                ))
            })?;
            if source == i {
                return Err(ReliabilityError::InvalidSettings(format!(
                    "stochast '{}' cannot be its own source",
                    stochast.name
                )));
            }
            sources[i] = Some(source);
        }

        // Depth first ordering: 0 = unvisited, 1 = in progress, 2 = done
        let mut state = vec![0u8; sources.len()];
        let mut order = Vec::with_capacity(sources.len());
        for start in 0..sources.len() {
            let mut chain = Vec::new();
            let mut current = Some(start);
            while let Some(index) = current {
                match state[index] {
                    2 => break,
                    1 => {
                        return Err(ReliabilityError::InvalidSettings(format!(
                            "circular variable stochast dependency at '{}'",
                            self.stochasts[index].name
                        )))
                    }
                    _ => {
                        state[index] = 1;
                        chain.push(index);
                        current = sources[index];
                    }
                }
            }
            for index in chain.into_iter().rev() {
                state[index] = 2;
                order.push(index);
            }
        }

        self.sources = sources;
        self.evaluation_order = order;
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized
    }

    pub fn stochasts(&self) -> &[Stochast] {
        &self.stochasts
    }

    pub fn stochast_count(&self) -> usize {
        self.stochasts.len()
    }

    /// Length of a sample: the number of varying stochasts
    pub fn varying_count(&self) -> usize {
        self.varying_indices.len()
    }

    pub fn varying_indices(&self) -> &[usize] {
        &self.varying_indices
    }

    pub fn is_correlated(&self) -> bool {
        self.varying_correlation.is_correlated()
    }

    /// Full dimension u-vector: correlated varying values, zero elsewhere
    pub fn get_expanded_u_values(&self, u_values: &[f64]) -> Result<Vec<f64>> {
        if u_values.len() != self.varying_indices.len() {
            return Err(ReliabilityError::DimensionMismatch {
                expected: self.varying_indices.len(),
                actual: u_values.len(),
            });
        }
        let correlated = self.varying_correlation.cholesky(u_values)?;
        let mut expanded = vec![0.0; self.stochasts.len()];
        for (&index, u) in self.varying_indices.iter().zip(correlated) {
            expanded[index] = u;
        }
        Ok(expanded)
    }

    /// Physical model input for a sample
    pub fn get_x_values(&self, sample: &Sample) -> Result<Vec<f64>> {
        self.get_x_values_from_u(&sample.values)
    }

    pub fn get_x_values_from_u(&self, u_values: &[f64]) -> Result<Vec<f64>> {
        let expanded = self.get_expanded_u_values(u_values)?;
        Ok(self.x_from_expanded(&expanded))
    }

    fn x_from_expanded(&self, expanded: &[f64]) -> Vec<f64> {
        let mut x = vec![f64::NAN; self.stochasts.len()];
        for &index in &self.evaluation_order {
            let distribution = &self.distributions[index];
            let stochast = &self.stochasts[index];
            x[index] = match self.sources[index] {
                Some(source) => {
                    let properties = stochast.properties_for_source(Some(x[source]));
                    distribution.get_x_from_u(&properties, expanded[index])
                }
                None => distribution.get_x_from_u(&stochast.properties, expanded[index]),
            };
        }
        x
    }

    /// Stochast point at distance |beta| in the direction of `u_values`
    ///
    /// Alphas follow `u = -beta * alpha`, so a negative beta (origin on
    /// the failing side) flips the alphas, not the point.
    pub fn get_stochast_point(&self, u_values: &[f64], beta: f64) -> Result<StochastPoint> {
        if u_values.len() != self.varying_indices.len() {
            return Err(ReliabilityError::DimensionMismatch {
                expected: self.varying_indices.len(),
                actual: u_values.len(),
            });
        }

        let norm = u_values.iter().map(|u| u * u).sum::<f64>().sqrt();
        let sign = if beta < 0.0 { -1.0 } else { 1.0 };
        let alphas: Vec<f64> = if norm > 0.0 {
            u_values.iter().map(|u| -sign * u / norm).collect()
        } else {
            vec![0.0; u_values.len()]
        };

        let scaled: Vec<f64> = if beta.is_finite() && norm > 0.0 {
            u_values.iter().map(|u| beta.abs() * u / norm).collect()
        } else {
            u_values.to_vec()
        };

        let correlated_varying = self.varying_correlation.cholesky(&scaled)?;
        let correlated_norm = correlated_varying
            .iter()
            .map(|u| u * u)
            .sum::<f64>()
            .sqrt();

        let expanded = self.get_expanded_u_values(&scaled)?;
        let x = self.x_from_expanded(&expanded);

        let mut full_alpha = vec![0.0; self.stochasts.len()];
        let mut full_alpha_correlated = vec![0.0; self.stochasts.len()];
        for (k, &index) in self.varying_indices.iter().enumerate() {
            full_alpha[index] = alphas[k];
            full_alpha_correlated[index] = if correlated_norm > 0.0 {
                -sign * correlated_varying[k] / correlated_norm
            } else {
                0.0
            };
        }

        let alphas = self
            .stochasts
            .iter()
            .enumerate()
            .map(|(index, stochast)| StochastPointAlpha {
                stochast: stochast.name.clone(),
                index,
                alpha: full_alpha[index],
                alpha_correlated: full_alpha_correlated[index],
                u: expanded[index],
                x: x[index],
                influence_factor: full_alpha[index] * full_alpha[index],
            })
            .collect();

        Ok(StochastPoint { beta, alphas })
    }

    /// Varying u-vector of a stochast point, in sample order
    pub fn get_varying_u_values(&self, point: &StochastPoint) -> Vec<f64> {
        self.varying_indices
            .iter()
            .map(|&index| {
                point
                    .alphas
                    .iter()
                    .find(|a| a.index == index)
                    .map(|a| -point.beta * a.alpha)
                    .unwrap_or(0.0)
            })
            .collect()
    }
}
