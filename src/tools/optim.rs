//! Thin adapters between the fit objectives and the `argmin` solvers.
//!
//! Box constraints are handled the same way for every solver: L-BFGS sees a
//! clamped problem with a projected gradient, Nelder-Mead sees an infinite
//! cost outside the box and Brent is bracketed by the bounds themselves.

use argmin::core::{
    CostFunction,
    Executor,
    Gradient,
    State,
    TerminationReason,
    TerminationStatus,
};
use argmin::solver::brent::BrentOpt;
use argmin::solver::linesearch::MoreThuenteLineSearch;
use argmin::solver::neldermead::NelderMead;
use argmin::solver::quasinewton::LBFGS;
use serde::{
    Deserialize,
    Serialize,
};

use crate::error::FailureReason;
use crate::with_field_fn;

/// Stopping rules shared by the solvers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OptimizerSettings {
    pub max_iters: u64,
    /// Gradient tolerance for L-BFGS, relative cost tolerance for all
    /// solvers.
    pub tolerance: f64,
    /// History length of L-BFGS.
    pub memory:    usize,
}

impl OptimizerSettings {
    with_field_fn!(max_iters, u64);

    with_field_fn!(tolerance, f64);

    with_field_fn!(memory, usize);

    fn cost_tolerance(
        &self,
        initial_cost: f64,
    ) -> f64 {
        let scale = if initial_cost.is_finite() {
            1.0 + initial_cost.abs()
        }
        else {
            1.0
        };
        (self.tolerance * scale).max(1e-14)
    }
}

impl Default for OptimizerSettings {
    fn default() -> Self {
        Self {
            max_iters: 500,
            tolerance: 1e-8,
            memory:    7,
        }
    }
}

/// Function to be minimised over a box.
pub trait Objective: Send + Sync {
    fn cost(
        &self,
        params: &[f64],
    ) -> f64;

    /// Central differences unless overridden.
    fn gradient(
        &self,
        params: &[f64],
    ) -> Vec<f64> {
        (0..params.len())
            .map(|i| {
                let eps = 1e-7 * params[i].abs().max(1.0);
                let mut plus = params.to_vec();
                plus[i] += eps;
                let mut minus = params.to_vec();
                minus[i] -= eps;
                (self.cost(&plus) - self.cost(&minus)) / (2.0 * eps)
            })
            .collect()
    }
}

/// Best point found by a solver.
#[derive(Debug, Clone, PartialEq)]
pub struct Minimum {
    pub params:     Vec<f64>,
    pub cost:       f64,
    pub iterations: u64,
    pub converged:  bool,
    pub status:     String,
}

impl Minimum {
    /// Converts a non-converged or non-finite result into a failure.
    pub fn into_converged(self) -> Result<Self, FailureReason> {
        if !self.cost.is_finite() || self.params.iter().any(|p| !p.is_finite()) {
            return Err(FailureReason::NonFinite);
        }
        if !self.converged {
            return Err(FailureReason::DidNotConverge {
                status: self.status,
            });
        }
        Ok(self)
    }
}

/// Runs `fallback` when `primary` errors or stops without converging.
pub(crate) fn with_fallback<F>(
    primary: Result<Minimum, FailureReason>,
    fallback: F,
) -> Result<Minimum, FailureReason>
where
    F: FnOnce(FailureReason) -> Result<Minimum, FailureReason>, {
    primary
        .and_then(Minimum::into_converged)
        .or_else(fallback)
}

pub(crate) fn clamp_params(
    params: &[f64],
    bounds: &[(f64, f64)],
) -> Vec<f64> {
    params
        .iter()
        .zip(bounds.iter())
        .map(|(&v, &(lo, hi))| v.clamp(lo, hi))
        .collect()
}

fn in_bounds(
    params: &[f64],
    bounds: &[(f64, f64)],
) -> bool {
    params
        .iter()
        .zip(bounds.iter())
        .all(|(&v, &(lo, hi))| (lo..=hi).contains(&v))
}

fn is_converged(status: &TerminationStatus) -> bool {
    matches!(
        status,
        TerminationStatus::Terminated(TerminationReason::SolverConverged)
            | TerminationStatus::Terminated(TerminationReason::TargetCostReached)
    )
}

fn solver_error(err: argmin::core::Error) -> FailureReason { FailureReason::Solver(err.to_string()) }

struct Clamped<'a> {
    objective: &'a dyn Objective,
    bounds:    &'a [(f64, f64)],
}

impl CostFunction for Clamped<'_> {
    type Output = f64;
    type Param = Vec<f64>;

    fn cost(
        &self,
        params: &Self::Param,
    ) -> Result<Self::Output, argmin::core::Error> {
        Ok(self
            .objective
            .cost(&clamp_params(params, self.bounds)))
    }
}

impl Gradient for Clamped<'_> {
    type Gradient = Vec<f64>;
    type Param = Vec<f64>;

    fn gradient(
        &self,
        params: &Self::Param,
    ) -> Result<Self::Gradient, argmin::core::Error> {
        const EPS: f64 = 1e-12;
        let clamped = clamp_params(params, self.bounds);
        let mut grad = self.objective.gradient(&clamped);
        // Components pushing further outside an active bound are dropped.
        for (g, (&x, &(lo, hi))) in grad
            .iter_mut()
            .zip(clamped.iter().zip(self.bounds.iter()))
        {
            if (x <= lo + EPS && *g > 0.0) || (x >= hi - EPS && *g < 0.0) {
                *g = 0.0;
            }
        }
        Ok(grad)
    }
}

/// Projected L-BFGS over a box.
pub fn minimize_lbfgsb(
    objective: &dyn Objective,
    init: &[f64],
    bounds: &[(f64, f64)],
    settings: &OptimizerSettings,
) -> Result<Minimum, FailureReason> {
    if init.len() != bounds.len() {
        return Err(FailureReason::Solver(format!(
            "parameter and bounds length mismatch: {} != {}",
            init.len(),
            bounds.len()
        )));
    }
    let init = clamp_params(init, bounds);
    let initial_cost = objective.cost(&init);

    let solver = LBFGS::new(MoreThuenteLineSearch::new(), settings.memory)
        .with_tolerance_grad(settings.tolerance)
        .map_err(solver_error)?
        .with_tolerance_cost(settings.cost_tolerance(initial_cost))
        .map_err(solver_error)?;

    let problem = Clamped { objective, bounds };
    let res = Executor::new(problem, solver)
        .configure(|state| {
            state
                .param(init)
                .max_iters(settings.max_iters)
        })
        .run()
        .map_err(solver_error)?;

    let state = res.state();
    let best = state
        .get_best_param()
        .ok_or_else(|| FailureReason::Solver("no best parameters found".into()))?;
    let termination = state.get_termination_status();
    Ok(Minimum {
        params:     clamp_params(best, bounds),
        cost:       state.get_best_cost(),
        iterations: state.get_iter(),
        converged:  is_converged(termination),
        status:     termination.to_string(),
    })
}

struct Boxed<'a> {
    objective: &'a dyn Objective,
    bounds:    &'a [(f64, f64)],
}

impl CostFunction for Boxed<'_> {
    type Output = f64;
    type Param = Vec<f64>;

    fn cost(
        &self,
        params: &Self::Param,
    ) -> Result<Self::Output, argmin::core::Error> {
        if !in_bounds(params, self.bounds) {
            return Ok(f64::INFINITY);
        }
        let cost = self.objective.cost(params);
        Ok(if cost.is_nan() { f64::INFINITY } else { cost })
    }
}

/// Non-degenerate starting simplex around `base`. Each vertex moves one
/// coordinate by its step, towards the inside of the box.
fn initial_simplex(
    base: &[f64],
    steps: &[f64],
    bounds: &[(f64, f64)],
) -> Vec<Vec<f64>> {
    let mut simplex = Vec::with_capacity(base.len() + 1);
    simplex.push(base.to_vec());
    for (i, (&step, &(lo, hi))) in steps.iter().zip(bounds.iter()).enumerate() {
        let mut vertex = base.to_vec();
        vertex[i] = if base[i] + step <= hi {
            base[i] + step
        }
        else {
            (base[i] - step).max(lo)
        };
        simplex.push(vertex);
    }
    simplex
}

/// Derivative-free simplex search over a box.
pub fn minimize_nelder_mead(
    objective: &dyn Objective,
    init: &[f64],
    steps: &[f64],
    bounds: &[(f64, f64)],
    settings: &OptimizerSettings,
) -> Result<Minimum, FailureReason> {
    if init.len() != bounds.len() || init.len() != steps.len() {
        return Err(FailureReason::Solver(format!(
            "parameter, step and bounds lengths differ: {}, {}, {}",
            init.len(),
            steps.len(),
            bounds.len()
        )));
    }
    let init = clamp_params(init, bounds);
    let initial_cost = objective.cost(&init);

    let solver = NelderMead::new(initial_simplex(&init, steps, bounds))
        .with_sd_tolerance(settings.cost_tolerance(initial_cost))
        .map_err(solver_error)?;

    let problem = Boxed { objective, bounds };
    let res = Executor::new(problem, solver)
        .configure(|state| state.max_iters(settings.max_iters))
        .run()
        .map_err(solver_error)?;

    let state = res.state();
    let best = state
        .get_best_param()
        .ok_or_else(|| FailureReason::Solver("no best parameters found".into()))?;
    let termination = state.get_termination_status();
    Ok(Minimum {
        params:     best.clone(),
        cost:       state.get_best_cost(),
        iterations: state.get_iter(),
        converged:  is_converged(termination),
        status:     termination.to_string(),
    })
}

struct Scalar<F> {
    f: F,
}

impl<F: Fn(f64) -> f64> CostFunction for Scalar<F> {
    type Output = f64;
    type Param = f64;

    fn cost(
        &self,
        param: &Self::Param,
    ) -> Result<Self::Output, argmin::core::Error> {
        let cost = (self.f)(*param);
        Ok(if cost.is_nan() { f64::INFINITY } else { cost })
    }
}

/// Bounded one-dimensional Brent search on `[lo, hi]`.
pub fn minimize_scalar<F>(
    f: F,
    lo: f64,
    hi: f64,
    max_iters: u64,
) -> Result<(f64, f64), FailureReason>
where
    F: Fn(f64) -> f64, {
    if !(lo < hi) {
        return Err(FailureReason::Solver(format!(
            "empty search interval [{lo}, {hi}]"
        )));
    }
    let res = Executor::new(Scalar { f }, BrentOpt::new(lo, hi))
        .configure(|state| state.max_iters(max_iters))
        .run()
        .map_err(solver_error)?;
    let state = res.state();
    let best = state
        .get_best_param()
        .copied()
        .ok_or_else(|| FailureReason::Solver("no best parameter found".into()))?;
    Ok((best, state.get_best_cost()))
}
