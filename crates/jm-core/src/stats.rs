//! Per-class statistics: the mean vector and covariance matrix of the base
//! layers over the cells of one category.

use nalgebra::{DMatrix, DVector};

use crate::error::{Error, Result};

/// Mean of each base layer, in base-layer order.
pub type FeatureVector = DVector<f64>;

/// B×B covariance of the base layers, rows and columns in base-layer order.
pub type CovarianceMatrix = DMatrix<f64>;

/// Mean vector and covariance matrix for one class.
///
/// Construction checks the shape invariants (B ≥ 1, covariance is B×B) and
/// rejects non-finite entries, so the distance computation can assume both.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassStatistics {
    pub category: i64,
    pub means: FeatureVector,
    pub covariance: CovarianceMatrix,
}

impl ClassStatistics {
    pub fn new(category: i64, means: FeatureVector, covariance: CovarianceMatrix) -> Result<Self> {
        let bands = means.len();
        if bands == 0 {
            return Err(Error::NoBaseLayers);
        }
        if covariance.nrows() != bands {
            return Err(Error::DimensionMismatch {
                what: "covariance rows",
                expected: bands,
                found: covariance.nrows(),
            });
        }
        if covariance.ncols() != bands {
            return Err(Error::DimensionMismatch {
                what: "covariance columns",
                expected: bands,
                found: covariance.ncols(),
            });
        }
        if means.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFiniteStatistic { what: "mean vector" });
        }
        if covariance.iter().any(|v| !v.is_finite()) {
            return Err(Error::NonFiniteStatistic { what: "covariance matrix" });
        }
        Ok(Self { category, means, covariance })
    }

    /// Convenience constructor from a mean slice and a row-major covariance.
    pub fn from_rows(category: i64, means: &[f64], covariance_rows: &[&[f64]]) -> Result<Self> {
        let bands = means.len();
        let mut cov = CovarianceMatrix::zeros(covariance_rows.len(), bands);
        for (r, row) in covariance_rows.iter().enumerate() {
            if row.len() != bands {
                return Err(Error::DimensionMismatch {
                    what: "covariance row length",
                    expected: bands,
                    found: row.len(),
                });
            }
            for (c, &v) in row.iter().enumerate() {
                cov[(r, c)] = v;
            }
        }
        Self::new(category, FeatureVector::from_column_slice(means), cov)
    }

    /// Number of base layers (B).
    pub fn bands(&self) -> usize {
        self.means.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn from_rows_builds_square_matrix() {
        let s = ClassStatistics::from_rows(3, &[1.0, 2.0], &[&[4.0, 1.0], &[1.0, 9.0]]).unwrap();
        assert_eq!(s.bands(), 2);
        assert_eq!(s.covariance[(0, 1)], 1.0);
        assert_eq!(s.covariance[(1, 1)], 9.0);
    }

    #[test]
    fn rejects_non_square_covariance() {
        let err = ClassStatistics::from_rows(1, &[1.0, 2.0], &[&[4.0, 1.0]]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { what: "covariance rows", expected: 2, found: 1 }));
    }

    #[test]
    fn rejects_ragged_rows() {
        let err = ClassStatistics::from_rows(1, &[1.0, 2.0], &[&[4.0], &[1.0, 9.0]]).unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { what: "covariance row length", .. }));
    }

    #[test]
    fn rejects_empty_mean_vector() {
        let err = ClassStatistics::from_rows(1, &[], &[]).unwrap_err();
        assert!(matches!(err, Error::NoBaseLayers));
    }

    #[test]
    fn rejects_nan_mean() {
        let err = ClassStatistics::from_rows(1, &[f64::NAN], &[&[1.0]]).unwrap_err();
        assert!(matches!(err, Error::NonFiniteStatistic { what: "mean vector" }));
    }
}
