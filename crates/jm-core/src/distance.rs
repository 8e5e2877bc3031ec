//! Jeffries-Matusita distance between two Gaussian class signatures.
//!
//! With `dm = μA − μB` and `S = (ΣA + ΣB) / 2`:
//!
//! ```text
//! MH   = sqrt(dmᵀ · S⁻¹ · dm)
//! LD   = ln( det S / sqrt(det ΣA · det ΣB) )
//! B    = MH / 8 + LD / 2
//! JM   = sqrt( 2 · (1 − e^(−B)) )
//! ```
//!
//! JM lies in [0, √2] and saturates as the classes separate. Note that the
//! Mahalanobis term enters B through its square root, not the squared form
//! found in some textbooks; results are comparable with the GRASS tooling
//! this distance has always been reported by.
use nalgebra::Cholesky;
use serde::Serialize;

use crate::error::{CovarianceRole, Error, Result};
use crate::stats::{ClassStatistics, CovarianceMatrix, FeatureVector};

/// A Cholesky pivot whose square is at or below this fraction of the matching
/// diagonal entry marks the matrix as singular.
pub const SINGULARITY_TOLERANCE: f64 = 1e-12;

/// Every intermediate term of the distance, for reporting.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Separability {
    /// `sqrt(dmᵀ S⁻¹ dm)`.
    pub mahalanobis: f64,
    /// Log-determinant ratio term.
    pub log_determinant: f64,
    /// Bhattacharyya distance B.
    pub bhattacharyya: f64,
    /// Jeffries-Matusita distance in [0, √2].
    pub jeffries_matusita: f64,
}

/// Jeffries-Matusita distance from raw mean vectors and covariance matrices.
pub fn distance(
    means_a: &FeatureVector,
    cov_a: &CovarianceMatrix,
    means_b: &FeatureVector,
    cov_b: &CovarianceMatrix,
) -> Result<f64> {
    Ok(terms(means_a, cov_a, means_b, cov_b)?.jeffries_matusita)
}

/// All distance terms between two collected classes.
pub fn separability(a: &ClassStatistics, b: &ClassStatistics) -> Result<Separability> {
    terms(&a.means, &a.covariance, &b.means, &b.covariance)
}

fn terms(
    means_a: &FeatureVector,
    cov_a: &CovarianceMatrix,
    means_b: &FeatureVector,
    cov_b: &CovarianceMatrix,
) -> Result<Separability> {
    let bands = means_a.len();
    if bands == 0 {
        return Err(Error::NoBaseLayers);
    }
    check_shape("second class mean length", bands, means_b.len())?;
    check_shape("first class covariance rows", bands, cov_a.nrows())?;
    check_shape("first class covariance columns", bands, cov_a.ncols())?;
    check_shape("second class covariance rows", bands, cov_b.nrows())?;
    check_shape("second class covariance columns", bands, cov_b.ncols())?;

    if means_a.iter().chain(means_b.iter()).any(|v| !v.is_finite()) {
        return Err(Error::NonFiniteStatistic { what: "mean vector" });
    }
    if cov_a.iter().chain(cov_b.iter()).any(|v| !v.is_finite()) {
        return Err(Error::NonFiniteStatistic { what: "covariance matrix" });
    }

    let dm = means_a - means_b;
    let pooled = (cov_a + cov_b) * 0.5;

    let (pooled_l, log_det_pooled) = cholesky_factor(pooled, CovarianceRole::Pooled)?;

    // dmᵀ S⁻¹ dm = |z|² with L·z = dm, so the quadratic form is never negative.
    let z = pooled_l
        .solve_lower_triangular(&dm)
        .ok_or(Error::SingularCovariance {
            role: CovarianceRole::Pooled,
            log_determinant: log_det_pooled,
        })?;
    let mahalanobis = z.dot(&z).max(0.0).sqrt();

    let (_, log_det_a) = cholesky_factor(cov_a.clone(), CovarianceRole::ClassA)?;
    let (_, log_det_b) = cholesky_factor(cov_b.clone(), CovarianceRole::ClassB)?;
    let log_determinant = log_det_pooled - 0.5 * (log_det_a + log_det_b);

    let bhattacharyya = mahalanobis / 8.0 + log_determinant / 2.0;
    let jeffries_matusita = (2.0 * (1.0 - (-bhattacharyya).exp()).max(0.0)).sqrt();

    if !jeffries_matusita.is_finite() {
        return Err(Error::SingularCovariance {
            role: CovarianceRole::Pooled,
            log_determinant: log_det_pooled,
        });
    }

    Ok(Separability {
        mahalanobis,
        log_determinant,
        bhattacharyya,
        jeffries_matusita,
    })
}

fn check_shape(what: &'static str, expected: usize, found: usize) -> Result<()> {
    if expected == found {
        Ok(())
    } else {
        Err(Error::DimensionMismatch { what, expected, found })
    }
}

/// Cholesky factor `L` of a covariance matrix and `ln det = 2·Σ ln L_ii`.
///
/// The determinant never leaves log space, so band count and scale cannot
/// overflow it. A failed factorisation, or a pivot with
/// `L_ii² ≤ SINGULARITY_TOLERANCE · a_ii`, is singular.
fn cholesky_factor(matrix: CovarianceMatrix, role: CovarianceRole) -> Result<(CovarianceMatrix, f64)> {
    let diagonal = matrix.diagonal();
    let l = Cholesky::new(matrix)
        .ok_or(Error::SingularCovariance {
            role,
            log_determinant: f64::NEG_INFINITY,
        })?
        .unpack();

    let mut log_determinant = 0.0;
    for (&pivot, &a) in l.diagonal().iter().zip(diagonal.iter()) {
        if !(pivot.is_finite() && a > 0.0 && pivot * pivot > SINGULARITY_TOLERANCE * a) {
            return Err(Error::SingularCovariance {
                role,
                log_determinant: f64::NEG_INFINITY,
            });
        }
        log_determinant += 2.0 * pivot.ln();
    }
    Ok((l, log_determinant))
}
