//! Two-stage Rosenbrock integrator for stiff kinetics.

use crate::msx_error::{MsxError, Result};
use crate::solvers::{error_norm, jacobian, lu_factor, lu_solve, MAX_REJECTS, MIN_STEP};

/// Semi-implicit two-stage Rosenbrock scheme.
///
/// The Jacobian is rebuilt by forward differences at every attempted step and
/// the stage systems are solved through one shared LU factorization.
#[derive(Debug)]
pub struct Ros2 {
    jac: Vec<f64>,
    w: Vec<f64>,
    pivot: Vec<usize>,
    f0: Vec<f64>,
    ftmp: Vec<f64>,
    k1: Vec<f64>,
    k2: Vec<f64>,
    ytmp: Vec<f64>,
    err: Vec<f64>,
    h: f64,
}

/// Stage coefficient `1 + 1/sqrt(2)`, the L-stable choice.
const GAMMA: f64 = 1.0 + std::f64::consts::FRAC_1_SQRT_2;

impl Ros2 {
    pub fn new(n: usize) -> Ros2 {
        Ros2 {
            jac: vec![0.0; n * n],
            w: vec![0.0; n * n],
            pivot: vec![0; n],
            f0: vec![0.0; n],
            ftmp: vec![0.0; n],
            k1: vec![0.0; n],
            k2: vec![0.0; n],
            ytmp: vec![0.0; n],
            err: vec![0.0; n],
            h: 0.0,
        }
    }

    /// Advances `y` from `t0` over an interval of length `span`.
    pub fn integrate(
        &mut self,
        y: &mut [f64],
        t0: f64,
        span: f64,
        atol: &[f64],
        rtol: &[f64],
        rhs: &mut dyn FnMut(f64, &[f64], &mut [f64]) -> Result<()>,
    ) -> Result<()> {
        let n = y.len();
        debug_assert_eq!(n, self.k1.len());
        if n == 0 || span <= 0.0 {
            return Ok(());
        }
        let mut t = t0;
        let t_end = t0 + span;
        if self.h <= 0.0 {
            self.h = span;
        }
        let mut rejects = 0u32;
        while t < t_end {
            let h = self.h.min(t_end - t);

            rhs(t, y, &mut self.f0)?;
            jacobian(t, y, &self.f0, &mut self.jac, &mut self.ftmp, rhs)?;

            // W = I - gamma*h*J, factored once for both stages
            for i in 0..n {
                for j in 0..n {
                    let identity = if i == j { 1.0 } else { 0.0 };
                    self.w[i * n + j] = identity - GAMMA * h * self.jac[i * n + j];
                }
            }
            lu_factor(&mut self.w, n, &mut self.pivot)?;

            // stage 1: (I - gamma*h*J) k1 = f(y)
            self.k1[..n].copy_from_slice(&self.f0[..n]);
            lu_solve(&self.w, n, &self.pivot, &mut self.k1);

            // stage 2: (I - gamma*h*J) k2 = f(y + h*k1) - 2*k1
            for i in 0..n {
                self.ytmp[i] = y[i] + h * self.k1[i];
            }
            rhs(t + h, &self.ytmp, &mut self.k2)?;
            for i in 0..n {
                self.k2[i] -= 2.0 * self.k1[i];
            }
            lu_solve(&self.w, n, &self.pivot, &mut self.k2);

            // second-order solution and its deviation from the stage-1 line
            for i in 0..n {
                self.err[i] = 0.5 * h * (self.k1[i] + self.k2[i]);
            }
            let norm = error_norm(&self.err[..n], y, atol, rtol);
            if norm <= 1.0 {
                for i in 0..n {
                    y[i] += h * (1.5 * self.k1[i] + 0.5 * self.k2[i]);
                }
                t += h;
                rejects = 0;
                let grow = if norm > 0.0 {
                    (0.84 * (1.0 / norm).powf(0.25)).min(5.0)
                } else {
                    5.0
                };
                self.h = (h * grow).clamp(MIN_STEP, span);
            } else {
                rejects += 1;
                if rejects > MAX_REJECTS {
                    return Err(MsxError::IntegrationFailure);
                }
                self.h = h * 0.84 * (1.0 / norm).powf(0.25);
                if self.h < MIN_STEP {
                    return Err(MsxError::IntegrationFailure);
                }
            }
        }
        Ok(())
    }
}
