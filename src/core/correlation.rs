//! Correlation matrix with a cached Cholesky factor
//!
//! Multiplying independent standard normal values by the lower triangular
//! factor gives correlated standard normal values.

use nalgebra::{Cholesky, DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;
use tracing::warn;

use crate::core::error::{ReliabilityError, Result};
use crate::core::validation::ValidationReport;

/// Diagonal jitter tried, in order, when the matrix is not positive definite
const JITTERS: [f64; 4] = [1e-10, 1e-8, 1e-6, 1e-4];

/// Single correlation entry as stored in project files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationValue {
    pub first: String,
    pub second: String,
    pub value: f64,
}

/// Symmetric correlation matrix over the stochasts of a model
#[derive(Debug, Clone)]
pub struct CorrelationMatrix {
    matrix: DMatrix<f64>,
    has_correlations: bool,
    cholesky: OnceLock<std::result::Result<DMatrix<f64>, ReliabilityError>>,
}

impl CorrelationMatrix {
    /// Identity matrix of the given dimension
    pub fn new(dimension: usize) -> Self {
        Self {
            matrix: DMatrix::identity(dimension, dimension),
            has_correlations: false,
            cholesky: OnceLock::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.matrix.nrows()
    }

    /// True when at least one off-diagonal value is non-zero
    pub fn is_correlated(&self) -> bool {
        self.has_correlations
    }

    pub fn get_correlation(&self, i: usize, j: usize) -> Result<f64> {
        self.check_index(i)?;
        self.check_index(j)?;
        Ok(self.matrix[(i, j)])
    }

    /// Sets (i, j) and (j, i) and invalidates the cached factor
    pub fn set_correlation(&mut self, i: usize, j: usize, value: f64) -> Result<()> {
        self.check_index(i)?;
        self.check_index(j)?;
        if i == j {
            return Err(ReliabilityError::InvalidCombination(format!(
                "cannot correlate stochast {} with itself",
                i
            )));
        }

        self.matrix[(i, j)] = value;
        self.matrix[(j, i)] = value;
        self.has_correlations = self.off_diagonal_non_zero();
        self.cholesky = OnceLock::new();
        Ok(())
    }

    fn off_diagonal_non_zero(&self) -> bool {
        let n = self.dimension();
        (0..n).any(|i| (0..n).any(|j| i != j && self.matrix[(i, j)] != 0.0))
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.dimension() {
            Err(ReliabilityError::IndexOutOfRange {
                index,
                size: self.dimension(),
            })
        } else {
            Ok(())
        }
    }

    /// Matrix restricted to the given indices, in that order
    pub fn filtered(&self, indices: &[usize]) -> Result<Self> {
        for &index in indices {
            self.check_index(index)?;
        }
        let n = indices.len();
        let matrix = DMatrix::from_fn(n, n, |r, c| self.matrix[(indices[r], indices[c])]);
        let mut filtered = Self {
            matrix,
            has_correlations: false,
            cholesky: OnceLock::new(),
        };
        filtered.has_correlations = filtered.off_diagonal_non_zero();
        Ok(filtered)
    }

    /// Lower triangular Cholesky factor, computed on first use
    pub fn cholesky_factor(&self) -> Result<&DMatrix<f64>> {
        self.cholesky
            .get_or_init(|| Self::factorize(&self.matrix))
            .as_ref()
            .map_err(Clone::clone)
    }

    fn factorize(matrix: &DMatrix<f64>) -> std::result::Result<DMatrix<f64>, ReliabilityError> {
        if let Some(cholesky) = Cholesky::new(matrix.clone()) {
            return Ok(cholesky.l());
        }

        let n = matrix.nrows();
        for jitter in JITTERS {
            let mut jittered = matrix.clone();
            for i in 0..n {
                jittered[(i, i)] += jitter;
            }
            if let Some(cholesky) = Cholesky::new(jittered) {
                warn!(jitter, "Correlation matrix not positive definite, diagonal jitter applied");
                // Rescale rows so the implied correlation keeps a unit diagonal
                let mut l = cholesky.l();
                let scale = (1.0 + jitter).sqrt();
                l /= scale;
                return Ok(l);
            }
        }

        Err(ReliabilityError::NotPositiveDefinite)
    }

    /// Correlated u-values from independent ones
    pub fn cholesky(&self, u_values: &[f64]) -> Result<Vec<f64>> {
        if u_values.len() != self.dimension() {
            return Err(ReliabilityError::DimensionMismatch {
                expected: self.dimension(),
                actual: u_values.len(),
            });
        }
        if !self.has_correlations {
            return Ok(u_values.to_vec());
        }

        let l = self.cholesky_factor()?;
        let correlated = l * DVector::from_column_slice(u_values);
        Ok(correlated.iter().copied().collect())
    }

    /// Collects out of range values and an indefinite matrix
    pub fn validate(&self, report: &mut ValidationReport) {
        let n = self.dimension();
        for i in 0..n {
            for j in (i + 1)..n {
                let value = self.matrix[(i, j)];
                if !(-1.0..=1.0).contains(&value) {
                    report.add_error(
                        "correlation",
                        format!("value {} between {} and {} is outside [-1, 1]", value, i, j),
                    );
                }
            }
        }
        if self.has_correlations && Cholesky::new(self.matrix.clone()).is_none() {
            report.add_warning(
                "correlation",
                "matrix is not positive definite and will be repaired",
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_correlation_is_symmetric() {
        let mut matrix = CorrelationMatrix::new(3);
        matrix.set_correlation(0, 2, 0.4).unwrap();
        assert_eq!(matrix.get_correlation(2, 0).unwrap(), 0.4);
        assert_eq!(matrix.get_correlation(0, 2).unwrap(), 0.4);
        assert!(matrix.is_correlated());
    }

    #[test]
    fn test_out_of_range_fails() {
        let mut matrix = CorrelationMatrix::new(2);
        let err = matrix.set_correlation(0, 5, 0.1).unwrap_err();
        assert_eq!(err, ReliabilityError::IndexOutOfRange { index: 5, size: 2 });
    }

    #[test]
    fn test_uncorrelated_is_pass_through() {
        let matrix = CorrelationMatrix::new(2);
        assert_eq!(matrix.cholesky(&[1.5, -0.5]).unwrap(), vec![1.5, -0.5]);
    }

    #[test]
    fn test_cholesky_two_variables() {
        let mut matrix = CorrelationMatrix::new(2);
        matrix.set_correlation(0, 1, 0.6).unwrap();
        let correlated = matrix.cholesky(&[1.0, 1.0]).unwrap();
        assert!((correlated[0] - 1.0).abs() < 1e-12);
        assert!((correlated[1] - (0.6 + 0.8)).abs() < 1e-12);
    }

    #[test]
    fn test_mutation_invalidates_factor() {
        let mut matrix = CorrelationMatrix::new(2);
        matrix.set_correlation(0, 1, 0.6).unwrap();
        let first = matrix.cholesky(&[0.0, 1.0]).unwrap();
        matrix.set_correlation(0, 1, 0.0).unwrap();
        let second = matrix.cholesky(&[0.0, 1.0]).unwrap();
        assert!((first[1] - 0.8).abs() < 1e-12);
        assert_eq!(second, vec![0.0, 1.0]);
    }

    #[test]
    fn test_dimension_mismatch() {
        let matrix = CorrelationMatrix::new(3);
        assert!(matches!(
            matrix.cholesky(&[1.0]),
            Err(ReliabilityError::DimensionMismatch {
                expected: 3,
                actual: 1
            })
        ));
    }

    #[test]
    fn test_filtered_keeps_selected_correlations() {
        let mut matrix = CorrelationMatrix::new(3);
        matrix.set_correlation(0, 2, 0.5).unwrap();
        let filtered = matrix.filtered(&[0, 2]).unwrap();
        assert_eq!(filtered.dimension(), 2);
        assert_eq!(filtered.get_correlation(0, 1).unwrap(), 0.5);

        let without = matrix.filtered(&[0, 1]).unwrap();
        assert!(!without.is_correlated());
    }

    #[test]
    fn test_validate_reports_out_of_range_values() {
        let mut matrix = CorrelationMatrix::new(2);
        matrix.set_correlation(0, 1, 1.5).unwrap();
        let mut report = ValidationReport::default();
        matrix.validate(&mut report);
        assert!(!report.is_valid());
    }
}
