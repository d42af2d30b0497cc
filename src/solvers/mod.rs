//! Numerical drivers for reaction kinetics and equilibria.
//!
//! The integrators operate on dense 0-based state vectors; the chemistry
//! layer maps species indices onto them. Right-hand sides are closures so a
//! single integrator instance serves every pipe segment and tank.

pub mod newton;
pub mod rkf45;
pub mod ros2;

pub use newton::Newton;
pub use rkf45::Rkf45;
pub use ros2::Ros2;

use crate::msx_error::{MsxError, Result};

/// Smallest step the adaptive integrators will attempt.
pub const MIN_STEP: f64 = 1.0e-8;
/// Consecutive rejections tolerated before the step is declared failed.
pub const MAX_REJECTS: u32 = 10;

/// Scaled max-norm of a local error estimate: `max |e| / (atol + rtol*|y|)`.
/// A value at or below 1 means the step passes the tolerance test.
pub(crate) fn error_norm(err: &[f64], y: &[f64], atol: &[f64], rtol: &[f64]) -> f64 {
    let mut norm: f64 = 0.0;
    for i in 0..err.len() {
        let scale = atol[i] + rtol[i] * y[i].abs();
        norm = norm.max(err[i].abs() / scale);
    }
    norm
}

/// In-place LU factorization with partial pivoting.
///
/// `a` is a row-major n-by-n matrix; `pivot` receives the row permutation.
/// Returns `IntegrationFailure` on a singular matrix.
pub(crate) fn lu_factor(a: &mut [f64], n: usize, pivot: &mut [usize]) -> Result<()> {
    for col in 0..n {
        let mut max_val = a[col * n + col].abs();
        let mut max_row = col;
        for row in col + 1..n {
            let v = a[row * n + col].abs();
            if v > max_val {
                max_val = v;
                max_row = row;
            }
        }
        if max_val == 0.0 {
            return Err(MsxError::IntegrationFailure);
        }
        pivot[col] = max_row;
        if max_row != col {
            for k in 0..n {
                a.swap(col * n + k, max_row * n + k);
            }
        }
        let inv = 1.0 / a[col * n + col];
        for row in col + 1..n {
            let factor = a[row * n + col] * inv;
            a[row * n + col] = factor;
            for k in col + 1..n {
                a[row * n + k] -= factor * a[col * n + k];
            }
        }
    }
    Ok(())
}

/// Solves `LUx = b` for a matrix factored by [`lu_factor`]; `b` becomes `x`.
pub(crate) fn lu_solve(a: &[f64], n: usize, pivot: &[usize], b: &mut [f64]) {
    for col in 0..n {
        b.swap(col, pivot[col]);
        for row in col + 1..n {
            b[row] -= a[row * n + col] * b[col];
        }
    }
    for col in (0..n).rev() {
        b[col] /= a[col * n + col];
        for row in 0..col {
            b[row] -= a[row * n + col] * b[col];
        }
    }
}

/// Forward-difference Jacobian of `rhs` at `(t, y)`, written row-major into
/// `jac`. `f0` must already hold `rhs(t, y)`.
pub(crate) fn jacobian(
    t: f64,
    y: &mut [f64],
    f0: &[f64],
    jac: &mut [f64],
    ftmp: &mut [f64],
    rhs: &mut dyn FnMut(f64, &[f64], &mut [f64]) -> Result<()>,
) -> Result<()> {
    let n = y.len();
    let sqrt_eps = f64::EPSILON.sqrt();
    for j in 0..n {
        let saved = y[j];
        let delta = sqrt_eps * saved.abs().max(1.0);
        y[j] = saved + delta;
        rhs(t, y, ftmp)?;
        y[j] = saved;
        for i in 0..n {
            jac[i * n + j] = (ftmp[i] - f0[i]) / delta;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lu_solves_a_small_system() {
        // | 2 1 | x = | 5 |
        // | 1 3 |     | 10 |
        let mut a = vec![2.0, 1.0, 1.0, 3.0];
        let mut pivot = vec![0usize; 2];
        lu_factor(&mut a, 2, &mut pivot).unwrap();
        let mut b = vec![5.0, 10.0];
        lu_solve(&a, 2, &pivot, &mut b);
        assert!((b[0] - 1.0).abs() < 1e-12);
        assert!((b[1] - 3.0).abs() < 1e-12);
    }

    #[test]
    fn lu_rejects_singular_matrices() {
        let mut a = vec![1.0, 2.0, 2.0, 4.0];
        let mut pivot = vec![0usize; 2];
        assert_eq!(
            lu_factor(&mut a, 2, &mut pivot),
            Err(MsxError::IntegrationFailure)
        );
    }

    #[test]
    fn jacobian_matches_analytic_derivative() {
        // f0 = -2*y0, f1 = y0*y1
        let mut rhs = |_t: f64, y: &[f64], f: &mut [f64]| -> Result<()> {
            f[0] = -2.0 * y[0];
            f[1] = y[0] * y[1];
            Ok(())
        };
        let mut y = vec![1.5, 2.0];
        let mut f0 = vec![0.0; 2];
        rhs(0.0, &y, &mut f0).unwrap();
        let mut jac = vec![0.0; 4];
        let mut ftmp = vec![0.0; 2];
        jacobian(0.0, &mut y, &f0, &mut jac, &mut ftmp, &mut rhs).unwrap();
        assert!((jac[0] - -2.0).abs() < 1e-6);
        assert!((jac[1]).abs() < 1e-6);
        assert!((jac[2] - 2.0).abs() < 1e-6);
        assert!((jac[3] - 1.5).abs() < 1e-6);
    }
}
