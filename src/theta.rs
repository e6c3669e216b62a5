//! Latent trait generation.
//!
//! Draws an N x F trait matrix from a multivariate normal population, or
//! validates a caller-supplied one.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::error::{SimError, SimResult};

const PSD_TOL: f64 = 1e-8;

/// Lower-triangular factor `L` with `L L' = cov`, allowing zero pivots so
/// that singular positive semi-definite matrices factor too.
///
/// Returns `None` when `cov` is not symmetric or has a negative pivot.
pub fn cholesky_psd(cov: ArrayView2<f64>) -> Option<Array2<f64>> {
    let n = cov.nrows();
    if cov.ncols() != n {
        return None;
    }
    let scale = (0..n).map(|i| cov[[i, i]].abs()).fold(1.0, f64::max);
    let tol = PSD_TOL * scale;

    for i in 0..n {
        for j in 0..i {
            if (cov[[i, j]] - cov[[j, i]]).abs() > tol {
                return None;
            }
        }
    }

    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut pivot = cov[[j, j]];
        for k in 0..j {
            pivot -= l[[j, k]] * l[[j, k]];
        }
        if pivot < -tol || !pivot.is_finite() {
            return None;
        }
        if pivot <= tol {
            // zero pivot: the rest of the column must vanish as well
            for i in (j + 1)..n {
                let mut s = cov[[i, j]];
                for k in 0..j {
                    s -= l[[i, k]] * l[[j, k]];
                }
                if s.abs() > tol.sqrt() {
                    return None;
                }
            }
            continue;
        }
        let diag = pivot.sqrt();
        l[[j, j]] = diag;
        for i in (j + 1)..n {
            let mut s = cov[[i, j]];
            for k in 0..j {
                s -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = s / diag;
        }
    }
    Some(l)
}

/// Factor used when the PSD check is switched off; negative pivots are
/// clamped to zero.
fn cholesky_clamped(cov: ArrayView2<f64>) -> Array2<f64> {
    let n = cov.nrows();
    let mut l = Array2::<f64>::zeros((n, n));
    for j in 0..n {
        let mut pivot = cov[[j, j]];
        for k in 0..j {
            pivot -= l[[j, k]] * l[[j, k]];
        }
        if pivot <= 0.0 {
            continue;
        }
        let diag = pivot.sqrt();
        l[[j, j]] = diag;
        for i in (j + 1)..n {
            let mut s = 0.5 * (cov[[i, j]] + cov[[j, i]]);
            for k in 0..j {
                s -= l[[i, k]] * l[[j, k]];
            }
            l[[i, j]] = s / diag;
        }
    }
    l
}

/// Draw `n` rows from `N(mean, cov)`.
///
/// With `check` set, a covariance matrix that is not symmetric positive
/// semi-definite is an error instead of being silently repaired.
pub fn draw_mvn<R: Rng>(
    n: usize,
    mean: ArrayView1<f64>,
    cov: ArrayView2<f64>,
    check: bool,
    rng: &mut R,
) -> SimResult<Array2<f64>> {
    let nfact = mean.len();
    if cov.nrows() != nfact || cov.ncols() != nfact {
        return Err(SimError::MeanCovMismatch {
            mean: nfact,
            cov: cov.nrows(),
        });
    }

    let chol = match cholesky_psd(cov) {
        Some(l) => l,
        None if check => return Err(SimError::NotPositiveSemiDefinite),
        None => cholesky_clamped(cov),
    };

    let mut theta = Array2::<f64>::zeros((n, nfact));
    let mut z = vec![0.0; nfact];
    for mut row in theta.outer_iter_mut() {
        for zi in z.iter_mut() {
            *zi = rng.sample(StandardNormal);
        }
        for i in 0..nfact {
            let mut v = mean[i];
            for k in 0..=i {
                v += chol[[i, k]] * z[k];
            }
            row[i] = v;
        }
    }
    Ok(theta)
}

/// Reject trait matrices holding NaN or infinite entries.
pub fn ensure_finite(theta: ArrayView2<f64>) -> SimResult<()> {
    match theta.indexed_iter().find(|(_, v)| !v.is_finite()) {
        Some(((row, col), _)) => Err(SimError::NonFiniteTheta { row, col }),
        None => Ok(()),
    }
}

/// Population used when the trait matrix has to be drawn.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    pub mean: Array1<f64>,
    pub cov: Array2<f64>,
}

impl Population {
    /// Standard normal population with identity covariance.
    pub fn standard(nfact: usize) -> Self {
        Self {
            mean: Array1::zeros(nfact),
            cov: Array2::eye(nfact),
        }
    }
}

/// Resolve the trait matrix for one simulation run.
///
/// A supplied matrix must have `nfact` columns; otherwise `n` rows are drawn
/// from `population`. Either way every entry must be finite.
pub fn latent_traits<R: Rng>(
    supplied: Option<&Array2<f64>>,
    n: Option<usize>,
    nfact: usize,
    population: &Population,
    check: bool,
    rng: &mut R,
) -> SimResult<Array2<f64>> {
    match supplied {
        Some(theta) => {
            if theta.ncols() != nfact {
                return Err(SimError::ThetaDimension {
                    expected: nfact,
                    actual: theta.ncols(),
                });
            }
            ensure_finite(theta.view())?;
            Ok(theta.clone())
        }
        None => {
            let n = n.ok_or(SimError::MissingSampleSize)?;
            if population.mean.len() != nfact {
                return Err(SimError::ThetaDimension {
                    expected: nfact,
                    actual: population.mean.len(),
                });
            }
            let theta = draw_mvn(n, population.mean.view(), population.cov.view(), check, rng)?;
            ensure_finite(theta.view())?;
            Ok(theta)
        }
    }
}
