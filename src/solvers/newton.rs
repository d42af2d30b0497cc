//! Damped Newton solver for algebraic equilibrium systems.

use crate::msx_error::{MsxError, Result};
use crate::solvers::{jacobian, lu_factor, lu_solve};

const MAX_ITER: u32 = 20;
const MAX_HALVINGS: u32 = 10;

/// Newton iteration with step damping on residual growth.
#[derive(Debug)]
pub struct Newton {
    jac: Vec<f64>,
    pivot: Vec<usize>,
    f0: Vec<f64>,
    ftmp: Vec<f64>,
    dy: Vec<f64>,
    ytrial: Vec<f64>,
}

fn norm2(v: &[f64]) -> f64 {
    v.iter().map(|x| x * x).sum::<f64>().sqrt()
}

impl Newton {
    pub fn new(n: usize) -> Newton {
        Newton {
            jac: vec![0.0; n * n],
            pivot: vec![0; n],
            f0: vec![0.0; n],
            ftmp: vec![0.0; n],
            dy: vec![0.0; n],
            ytrial: vec![0.0; n],
        }
    }

    /// Drives `f(y)` to zero in place. `t` is passed through to the residual
    /// so equilibria may involve simulation time.
    pub fn solve(
        &mut self,
        y: &mut [f64],
        t: f64,
        atol: f64,
        rtol: f64,
        residual: &mut dyn FnMut(f64, &[f64], &mut [f64]) -> Result<()>,
    ) -> Result<()> {
        let n = y.len();
        debug_assert_eq!(n, self.dy.len());
        if n == 0 {
            return Ok(());
        }
        residual(t, y, &mut self.f0)?;
        let mut fnorm = norm2(&self.f0);

        for _ in 0..MAX_ITER {
            if fnorm < rtol * norm2(y) + atol {
                return Ok(());
            }

            jacobian(t, y, &self.f0, &mut self.jac, &mut self.ftmp, residual)?;
            self.dy[..n].copy_from_slice(&self.f0[..n]);
            lu_factor(&mut self.jac, n, &mut self.pivot)
                .map_err(|_| MsxError::EquilibriumFailure)?;
            lu_solve(&self.jac, n, &self.pivot, &mut self.dy);

            // damp: halve the step while the residual grows
            let mut alpha = 1.0;
            let mut accepted = false;
            for _ in 0..MAX_HALVINGS {
                for i in 0..n {
                    self.ytrial[i] = y[i] - alpha * self.dy[i];
                }
                residual(t, &self.ytrial, &mut self.ftmp)?;
                let trial_norm = norm2(&self.ftmp);
                if trial_norm < fnorm {
                    y.copy_from_slice(&self.ytrial[..n]);
                    self.f0[..n].copy_from_slice(&self.ftmp[..n]);
                    fnorm = trial_norm;
                    accepted = true;
                    break;
                }
                alpha *= 0.5;
            }
            if !accepted {
                return Err(MsxError::EquilibriumFailure);
            }
        }

        if fnorm < rtol * norm2(y) + atol {
            Ok(())
        } else {
            Err(MsxError::EquilibriumFailure)
        }
    }
}
