//! Adaptive Runge-Kutta-Fehlberg 4/5 integrator.

use crate::msx_error::{MsxError, Result};
use crate::solvers::{error_norm, MAX_REJECTS, MIN_STEP};

/// Embedded 4th/5th-order pair with step-size control.
///
/// Workspaces are sized once for the number of equations and reused across
/// every segment and tank the chemistry layer integrates.
#[derive(Debug)]
pub struct Rkf45 {
    k1: Vec<f64>,
    k2: Vec<f64>,
    k3: Vec<f64>,
    k4: Vec<f64>,
    k5: Vec<f64>,
    k6: Vec<f64>,
    ytmp: Vec<f64>,
    y4: Vec<f64>,
    err: Vec<f64>,
    /// Step size carried over between calls, so a converged step length is
    /// remembered from one segment to the next.
    h: f64,
}

impl Rkf45 {
    pub fn new(n: usize) -> Rkf45 {
        Rkf45 {
            k1: vec![0.0; n],
            k2: vec![0.0; n],
            k3: vec![0.0; n],
            k4: vec![0.0; n],
            k5: vec![0.0; n],
            k6: vec![0.0; n],
            ytmp: vec![0.0; n],
            y4: vec![0.0; n],
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

            rhs(t, y, &mut self.k1)?;
            for i in 0..n {
                self.ytmp[i] = y[i] + h * 0.25 * self.k1[i];
            }
            rhs(t + 0.25 * h, &self.ytmp, &mut self.k2)?;
            for i in 0..n {
                self.ytmp[i] = y[i] + h * (3.0 / 32.0 * self.k1[i] + 9.0 / 32.0 * self.k2[i]);
            }
            rhs(t + 3.0 / 8.0 * h, &self.ytmp, &mut self.k3)?;
            for i in 0..n {
                self.ytmp[i] = y[i]
                    + h * (1932.0 / 2197.0 * self.k1[i] - 7200.0 / 2197.0 * self.k2[i]
                        + 7296.0 / 2197.0 * self.k3[i]);
            }
            rhs(t + 12.0 / 13.0 * h, &self.ytmp, &mut self.k4)?;
            for i in 0..n {
                self.ytmp[i] = y[i]
                    + h * (439.0 / 216.0 * self.k1[i] - 8.0 * self.k2[i]
                        + 3680.0 / 513.0 * self.k3[i]
                        - 845.0 / 4104.0 * self.k4[i]);
            }
            rhs(t + h, &self.ytmp, &mut self.k5)?;
            for i in 0..n {
                self.ytmp[i] = y[i]
                    + h * (-8.0 / 27.0 * self.k1[i] + 2.0 * self.k2[i]
                        - 3544.0 / 2565.0 * self.k3[i]
                        + 1859.0 / 4104.0 * self.k4[i]
                        - 11.0 / 40.0 * self.k5[i]);
            }
            rhs(t + 0.5 * h, &self.ytmp, &mut self.k6)?;

            for i in 0..n {
                self.y4[i] = y[i]
                    + h * (25.0 / 216.0 * self.k1[i]
                        + 1408.0 / 2565.0 * self.k3[i]
                        + 2197.0 / 4104.0 * self.k4[i]
                        - 0.2 * self.k5[i]);
                let y5 = y[i]
                    + h * (16.0 / 135.0 * self.k1[i]
                        + 6656.0 / 12825.0 * self.k3[i]
                        + 28561.0 / 56430.0 * self.k4[i]
                        - 9.0 / 50.0 * self.k5[i]
                        + 2.0 / 55.0 * self.k6[i]);
                self.err[i] = y5 - self.y4[i];
            }

            let norm = error_norm(&self.err[..n], y, atol, rtol);
            if norm <= 1.0 {
                t += h;
                y.copy_from_slice(&self.y4[..n]);
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
