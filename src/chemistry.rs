//! Reaction kernels.
//!
//! Species are partitioned at quality-open time into rate, equilibrium and
//! formula sets, separately for pipe and tank contexts. One kernel call
//! advances the chemistry of a single reacting volume (a pipe segment or a
//! tank compartment) over a sub-step.

use crate::mathexpr::{MathExpr, VariableContext};
use crate::msx_error::{MsxError, Result};
use crate::project::{Project, VISCOSITY};
use crate::solvers::{Newton, Rkf45, Ros2};
use crate::types::{CouplingKind, ExprClass, ExprKind, SolverKind};

/// Hydraulic variables exposed to reaction expressions for the volume under
/// evaluation. Tanks carry zeros for the pipe-only entries.
#[derive(Debug, Clone, Copy, Default)]
pub struct HydVars {
    pub q: f64,
    pub len: f64,
    pub diam: f64,
    pub re: f64,
    pub us: f64,
    pub ff: f64,
    pub av: f64,
    pub time: f64,
}

impl HydVars {
    /// Derives the pipe hydraulic variables in internal units. `area_ucf`
    /// rescales the wall area density into the declared area units.
    pub fn for_link(
        q: f64,
        len: f64,
        diam: f64,
        roughness: f64,
        area_ucf: f64,
        time: f64,
    ) -> HydVars {
        let area = std::f64::consts::PI * diam * diam / 4.0;
        let u = if area > 0.0 { q.abs() / area } else { 0.0 };
        let re = if diam > 0.0 { u * diam / VISCOSITY } else { 0.0 };
        let ff = if re < 1.0 {
            0.0
        } else if re < 2000.0 {
            64.0 / re
        } else {
            // Swamee-Jain explicit approximation
            let arg = roughness / (3.7 * diam) + 5.74 / re.powf(0.9);
            0.25 / arg.log10().powi(2)
        };
        let us = u * (ff / 8.0).sqrt();
        let av = if diam > 0.0 { 4.0 / diam * area_ucf } else { 0.0 };
        HydVars {
            q,
            len,
            diam,
            re,
            us,
            ff,
            av,
            time,
        }
    }

    pub fn for_tank(time: f64) -> HydVars {
        HydVars {
            time,
            ..HydVars::default()
        }
    }
}

/// Resolves variable codes against the block layout the project's resolver
/// produced: species, terms, parameters, constants, then hydraulic names.
pub(crate) struct EvalContext<'a> {
    pub conc: &'a [f64],
    pub terms: &'a [f64],
    pub params: &'a [f64],
    pub consts: &'a [f64],
    pub hyd: &'a HydVars,
}

impl VariableContext for EvalContext<'_> {
    fn value(&self, code: i32) -> f64 {
        let mut code = code as usize;
        let ns = self.conc.len() - 1;
        if code <= ns {
            return self.conc[code];
        }
        code -= ns;
        let nt = self.terms.len() - 1;
        if code <= nt {
            return self.terms[code];
        }
        code -= nt;
        let np = self.params.len() - 1;
        if code <= np {
            return self.params[code];
        }
        code -= np;
        let nc = self.consts.len() - 1;
        if code <= nc {
            return self.consts[code];
        }
        match code - nc {
            1 => self.hyd.q,
            2 => self.hyd.len,
            3 => self.hyd.diam,
            4 => self.hyd.re,
            5 => self.hyd.us,
            6 => self.hyd.ff,
            7 => self.hyd.av,
            _ => self.hyd.time,
        }
    }
}

/// A compiled reaction for one context, with the species index it drives.
#[derive(Debug, Clone)]
struct BoundReaction {
    species: usize,
    expr: MathExpr,
}

/// The partitioned reactions plus the numerical machinery for one context
/// (pipes or tanks).
#[derive(Debug)]
struct ReactionSet {
    rate: Vec<BoundReaction>,
    equil: Vec<BoundReaction>,
    formula: Vec<BoundReaction>,
    rkf45: Rkf45,
    ros2: Ros2,
    newton: Newton,
    y: Vec<f64>,
    atol: Vec<f64>,
    rtol: Vec<f64>,
    yeq: Vec<f64>,
    feul: Vec<f64>,
}

impl ReactionSet {
    fn build(project: &Project, class: ExprClass) -> ReactionSet {
        let mut rate = Vec::new();
        let mut equil = Vec::new();
        let mut formula = Vec::new();
        for (m, species) in project.species.iter().enumerate().skip(1) {
            let rx = match class {
                ExprClass::Pipe => species.pipe_rx.as_ref(),
                ExprClass::Tank => species.tank_reaction(),
            };
            let Some(rx) = rx else { continue };
            let Some(expr) = rx.expr.clone() else { continue };
            let bound = BoundReaction { species: m, expr };
            match rx.kind {
                ExprKind::Rate => rate.push(bound),
                ExprKind::Equil => equil.push(bound),
                ExprKind::Formula => formula.push(bound),
            }
        }
        let n = rate.len();
        let atol = rate.iter().map(|b| project.species[b.species].atol).collect();
        let rtol = rate.iter().map(|b| project.species[b.species].rtol).collect();
        let neq = equil.len();
        ReactionSet {
            rkf45: Rkf45::new(n),
            ros2: Ros2::new(n),
            newton: Newton::new(neq),
            y: vec![0.0; n],
            atol,
            rtol,
            yeq: vec![0.0; neq],
            feul: vec![0.0; n],
            rate,
            equil,
            formula,
        }
    }

    fn is_empty(&self) -> bool {
        self.rate.is_empty() && self.equil.is_empty() && self.formula.is_empty()
    }
}

/// Per-project reaction engine.
#[derive(Debug)]
pub struct Chemistry {
    pipe: ReactionSet,
    tank: ReactionSet,
    term_buf: Vec<f64>,
    const_buf: Vec<f64>,
    cwork: Vec<f64>,
    solver: SolverKind,
    coupling: CouplingKind,
    /// Seconds per rate unit; integration spans are divided by this.
    rate_sec: f64,
    atol_default: f64,
    rtol_default: f64,
}

/// Evaluates every term into `terms`, in declaration order.
fn eval_terms(
    project: &Project,
    terms: &mut [f64],
    conc: &[f64],
    params: &[f64],
    consts: &[f64],
    hyd: &HydVars,
) -> Result<()> {
    for i in 1..project.terms.len() {
        let value = {
            let ctx = EvalContext {
                conc,
                terms,
                params,
                consts,
                hyd,
            };
            match project.terms[i].expr.as_ref() {
                Some(expr) => expr.eval(&ctx)?,
                None => 0.0,
            }
        };
        terms[i] = value;
    }
    Ok(())
}

impl Chemistry {
    pub fn open(project: &Project) -> Chemistry {
        Chemistry {
            pipe: ReactionSet::build(project, ExprClass::Pipe),
            tank: ReactionSet::build(project, ExprClass::Tank),
            term_buf: vec![0.0; project.terms.len()],
            const_buf: project.consts.iter().map(|c| c.value).collect(),
            cwork: vec![0.0; project.species.len()],
            solver: project.options.solver,
            coupling: project.options.coupling,
            rate_sec: project.units.rate_sec,
            atol_default: project.options.atol,
            rtol_default: project.options.rtol,
        }
    }

    /// Re-reads constant values from the project; run at quality-init so
    /// edits made after the solver opened take effect.
    pub fn reload_constants(&mut self, project: &Project) {
        self.const_buf = project.consts.iter().map(|c| c.value).collect();
    }

    /// Whether any species reacts in the given context.
    pub fn reacts(&self, class: ExprClass) -> bool {
        match class {
            ExprClass::Pipe => !self.pipe.is_empty(),
            ExprClass::Tank => !self.tank.is_empty(),
        }
    }

    /// Advances the chemistry of one reacting volume over `dt` seconds.
    ///
    /// `conc` is the volume's 1-based concentration vector, mutated in place;
    /// `params` the parameter overrides in effect; `reacted` accumulates the
    /// per-species mass change `(c_after - c_before) * volume`.
    pub fn react(
        &mut self,
        project: &Project,
        class: ExprClass,
        conc: &mut [f64],
        params: &[f64],
        hyd: &HydVars,
        dt: f64,
        volume: f64,
        reacted: &mut [f64],
    ) -> Result<()> {
        // destructure so the rhs closure and the solvers borrow disjoint parts
        let Chemistry {
            pipe,
            tank,
            term_buf,
            const_buf,
            cwork,
            solver,
            coupling,
            rate_sec,
            atol_default,
            rtol_default,
        } = self;
        let set = match class {
            ExprClass::Pipe => pipe,
            ExprClass::Tank => tank,
        };
        if set.is_empty() || dt <= 0.0 {
            return Ok(());
        }

        cwork.copy_from_slice(conc);
        let span = dt / *rate_sec;

        let ReactionSet {
            rate,
            equil,
            formula,
            rkf45,
            ros2,
            newton,
            y,
            atol,
            rtol,
            yeq,
            feul,
        } = set;
        let (solver, coupling) = (*solver, *coupling);
        let (atol_eq, rtol_eq) = (*atol_default, *rtol_default);

        if !rate.is_empty() {
            for (i, bound) in rate.iter().enumerate() {
                y[i] = conc[bound.species];
            }
            let mut rhs = |_t: f64, yv: &[f64], f: &mut [f64]| -> Result<()> {
                for (i, bound) in rate.iter().enumerate() {
                    conc[bound.species] = yv[i];
                }
                if coupling == CouplingKind::Full && !equil.is_empty() {
                    solve_equilibria(
                        project, equil, newton, yeq, conc, params, const_buf, term_buf, hyd,
                        atol_eq, rtol_eq,
                    )?;
                }
                eval_terms(project, term_buf, conc, params, const_buf, hyd)?;
                let ctx = EvalContext {
                    conc,
                    terms: term_buf,
                    params,
                    consts: const_buf,
                    hyd,
                };
                for (i, bound) in rate.iter().enumerate() {
                    f[i] = bound.expr.eval(&ctx)?;
                }
                Ok(())
            };
            match solver {
                SolverKind::Euler => {
                    rhs(0.0, y, feul)?;
                    for i in 0..y.len() {
                        y[i] += span * feul[i];
                    }
                }
                SolverKind::Rk5 => rkf45.integrate(y, 0.0, span, atol, rtol, &mut rhs)?,
                SolverKind::Ros2 => ros2.integrate(y, 0.0, span, atol, rtol, &mut rhs)?,
            }
            for (i, bound) in rate.iter().enumerate() {
                if y[i] < -atol[i] {
                    return Err(MsxError::IntegrationFailure);
                }
                conc[bound.species] = y[i].max(0.0);
            }
        }

        if !equil.is_empty() {
            solve_equilibria(
                project, equil, newton, yeq, conc, params, const_buf, term_buf, hyd, atol_eq,
                rtol_eq,
            )?;
        }

        if !formula.is_empty() {
            eval_terms(project, term_buf, conc, params, const_buf, hyd)?;
            for bound in formula.iter() {
                let value = {
                    let ctx = EvalContext {
                        conc,
                        terms: term_buf,
                        params,
                        consts: const_buf,
                        hyd,
                    };
                    bound.expr.eval(&ctx)?
                };
                conc[bound.species] = value;
            }
        }

        for m in 1..conc.len() {
            reacted[m] += (conc[m] - cwork[m]) * volume;
        }
        Ok(())
    }
}

/// Newton-solves the equilibrium sub-system in place within `conc`.
#[allow(clippy::too_many_arguments)]
fn solve_equilibria(
    project: &Project,
    equil: &[BoundReaction],
    newton: &mut Newton,
    yeq: &mut [f64],
    conc: &mut [f64],
    params: &[f64],
    consts: &[f64],
    terms: &mut [f64],
    hyd: &HydVars,
    atol: f64,
    rtol: f64,
) -> Result<()> {
    for (i, bound) in equil.iter().enumerate() {
        yeq[i] = conc[bound.species];
    }
    let mut residual = |_t: f64, yv: &[f64], f: &mut [f64]| -> Result<()> {
        for (i, bound) in equil.iter().enumerate() {
            conc[bound.species] = yv[i];
        }
        eval_terms(project, terms, conc, params, consts, hyd)?;
        let ctx = EvalContext {
            conc,
            terms,
            params,
            consts,
            hyd,
        };
        for (i, bound) in equil.iter().enumerate() {
            f[i] = bound.expr.eval(&ctx)?;
        }
        Ok(())
    };
    newton
        .solve(yeq, hyd.time, atol, rtol, &mut residual)
        .map_err(|_| MsxError::EquilibriumFailure)?;
    for (i, bound) in equil.iter().enumerate() {
        conc[bound.species] = yeq[i].max(0.0);
    }
    Ok(())
}
