//! Least-squares solvers for the additive model.
//!
//! Two primitives:
//!
//! ```text
//! ordinary:  minimize ‖y − Xβ‖²
//! ridge:     minimize ‖y − Xβ‖² + Σ λ_j β_j²
//! ```
//!
//! The ridge system `(XᵀX + Λ) β = Xᵀy` is the MAP estimate under independent
//! Gaussian priors and is solved by Cholesky. When the normal matrix is not
//! positive definite (all-zero columns with λ = 0, e.g. weekly Fourier terms
//! on a series sampled on a single weekday) we fall back to SVD with
//! progressively looser tolerances.

use nalgebra::{DMatrix, DVector, Dyn, SVD};

/// Solve an ordinary least squares problem using SVD.
///
/// Returns `None` if the system is too ill-conditioned to solve robustly.
pub fn solve_least_squares(x: &DMatrix<f64>, y: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = x.clone().svd(true, true);
    svd_solve(&svd, y)
}

/// Solve the ridge problem with a per-column penalty vector.
///
/// # Panics
/// Panics if `penalties.len()` differs from the number of columns of `x`.
pub fn solve_ridge(
    x: &DMatrix<f64>,
    y: &DVector<f64>,
    penalties: &DVector<f64>,
) -> Option<DVector<f64>> {
    assert_eq!(x.ncols(), penalties.len(), "one penalty per column");

    let xt = x.transpose();
    let mut normal = &xt * x;
    for (j, lambda) in penalties.iter().enumerate() {
        normal[(j, j)] += *lambda;
    }
    let rhs = &xt * y;

    if let Some(chol) = normal.clone().cholesky() {
        let beta = chol.solve(&rhs);
        if beta.iter().all(|v| v.is_finite()) {
            return Some(beta);
        }
    }

    let svd = normal.svd(true, true);
    svd_solve(&svd, &rhs)
}

fn svd_solve(svd: &SVD<f64, Dyn, Dyn>, y: &DVector<f64>) -> Option<DVector<f64>> {
    for &tol in &[1e-10, 1e-8, 1e-6] {
        if let Ok(beta) = svd.solve(y, tol) {
            if beta.iter().all(|v| v.is_finite()) {
                return Some(beta);
            }
        }
    }
    None
}
