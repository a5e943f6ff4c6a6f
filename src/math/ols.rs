//! Linear least squares solver.
//!
//! Every damped Levenberg–Marquardt step solves a small, tall system
//!
//! ```text
//! minimize ‖A δ − b‖²
//! ```
//!
//! where `A` stacks the Jacobian on top of the damping rows. The parameter
//! dimension is tiny (2–8 columns), so an SVD is cheap and robust even when
//! the Jacobian is close to rank deficient (e.g. a parameter that barely
//! influences the model). Nalgebra's `QR::solve` is intended for square
//! systems and panics on tall matrices.

use nalgebra::{DMatrix, DVector};

/// `argmin ‖A δ − b‖²` through the SVD of `A`.
///
/// Singular values below the tolerance are dropped; the tolerance is
/// loosened twice before giving up with `None`.
pub fn solve_least_squares(a: &DMatrix<f64>, b: &DVector<f64>) -> Option<DVector<f64>> {
    let svd = a.clone().svd(true, true);
    [1e-10, 1e-8, 1e-6].into_iter().find_map(|tol| {
        svd.solve(b, tol)
            .ok()
            .filter(|delta| delta.iter().all(|v| v.is_finite()))
    })
}

/// Invert a small symmetric positive semi-definite matrix (e.g. `JᵀJ`).
///
/// Falls back to the SVD pseudo-inverse when the Cholesky factorization fails.
pub fn invert_normal_matrix(m: &DMatrix<f64>) -> Option<DMatrix<f64>> {
    if let Some(chol) = m.clone().cholesky() {
        let inv = chol.inverse();
        if inv.iter().all(|v| v.is_finite()) {
            return Some(inv);
        }
    }
    m.clone()
        .pseudo_inverse(1e-12)
        .ok()
        .filter(|inv| inv.iter().all(|v| v.is_finite()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn damped_tall_system_is_solved() {
        // two unknowns, three data rows and two damping rows
        let a = DMatrix::from_row_slice(5, 2, &[1.0, 0.0, 1.0, 1.0, 1.0, 2.0, 0.1, 0.0, 0.0, 0.1]);
        let b = DVector::from_row_slice(&[2.0, 5.0, 8.0, 0.0, 0.0]);
        let delta = solve_least_squares(&a, &b).unwrap();
        // damping pulls the exact solution (2, 3) slightly towards zero
        assert!(delta[0] > 1.9 && delta[0] < 2.0);
        assert!(delta[1] > 2.9 && delta[1] < 3.0);
        let residual = &a * &delta - &b;
        assert!(residual.norm() < 0.5);
    }

    #[test]
    fn normal_matrix_inverse() {
        let m = DMatrix::from_row_slice(2, 2, &[4.0, 1.0, 1.0, 3.0]);
        let inv = invert_normal_matrix(&m).unwrap();
        let id = &m * &inv;
        assert!((id[(0, 0)] - 1.0).abs() < 1e-12);
        assert!(id[(0, 1)].abs() < 1e-12);
    }
}
