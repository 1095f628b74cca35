//! Derivative-free and gradient minimisers over dense parameter vectors.
//!
//! Every minimiser works on an [`Objective`]. Failed evaluations (non-finite observables,
//! integration failures) are treated as `+inf`, so a step that produces one is never
//! accepted. Only the starting point must evaluate cleanly.

pub mod gradient;
pub mod grid;
pub mod multipliers;
pub mod simplex;

use super::error::EngineError;
use nalgebra::DVector;
use tracing::trace;

/// A scalar function to be minimised.
pub trait Objective: Sync {
    fn dimension(&self) -> usize;

    fn value(&self, x: &DVector<f64>) -> Result<f64, EngineError>;

    /// Analytic or numerical gradient, when the function is smooth enough to have one.
    fn gradient(&self, _x: &DVector<f64>) -> Option<Result<DVector<f64>, EngineError>> {
        None
    }

    fn is_smooth(&self) -> bool {
        false
    }
}

/// Stopping rules shared by the local minimisers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Termination {
    pub func_tol: f64,
    pub max_iterations: usize,
    pub max_evaluations: usize,
}

impl Default for Termination {
    fn default() -> Self {
        Self {
            func_tol: 1e-4,
            max_iterations: 5000,
            max_evaluations: 50000,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MinimiserOutcome {
    pub x: DVector<f64>,
    pub value: f64,
    pub iterations: usize,
    pub evaluations: usize,
    pub converged: bool,
    pub warnings: Vec<String>,
}

/// Evaluates `objective`, mapping failures and NaN to `+inf`.
pub(crate) fn penalised<O: Objective + ?Sized>(objective: &O, x: &DVector<f64>) -> f64 {
    match objective.value(x) {
        Ok(value) if !value.is_nan() => value,
        Ok(_) => f64::INFINITY,
        Err(err) => {
            trace!(error = %err, "rejecting trial point");
            f64::INFINITY
        }
    }
}

/// Evaluates the starting point, which must be finite.
pub(crate) fn starting_value<O: Objective + ?Sized>(
    objective: &O,
    x: &DVector<f64>,
) -> Result<f64, EngineError> {
    let value = objective.value(x)?;
    if value.is_finite() {
        Ok(value)
    } else {
        Err(EngineError::Optimisation(format!(
            "objective is not finite at the starting point ({value})"
        )))
    }
}

/// Central-difference gradient with a step relative to each coordinate.
pub fn central_difference<O: Objective + ?Sized>(
    objective: &O,
    x: &DVector<f64>,
) -> Result<DVector<f64>, EngineError> {
    const RELATIVE_STEP: f64 = 1e-6;
    let mut probe = x.clone();
    let mut gradient = DVector::zeros(x.len());
    for i in 0..x.len() {
        let h = RELATIVE_STEP * x[i].abs().max(1.0);
        probe[i] = x[i] + h;
        let upper = objective.value(&probe)?;
        probe[i] = x[i] - h;
        let lower = objective.value(&probe)?;
        probe[i] = x[i];
        gradient[i] = (upper - lower) / (2.0 * h);
    }
    Ok(gradient)
}
