//! Quasi-Newton (BFGS) and steepest-descent minimisation with a backtracking line search.

use super::{MinimiserOutcome, Objective, Termination, central_difference, penalised, starting_value};
use crate::engine::config::GradientMethod;
use crate::engine::error::EngineError;
use nalgebra::{DMatrix, DVector};
use tracing::debug;

/// Sufficient-decrease constant of the Armijo condition.
const ARMIJO: f64 = 1e-4;
/// Safeguards keeping an interpolated step inside `[SIGMA1, SIGMA2]` of the previous one.
const SIGMA1: f64 = 0.1;
const SIGMA2: f64 = 0.9;
const MAX_LINE_SEARCH: usize = 40;
const MIN_STEP: f64 = 1e-16;
const GRADIENT_TOL: f64 = 1e-8;
/// Curvature below which the BFGS update is skipped and the inverse Hessian reset.
const CURVATURE_TOL: f64 = 1e-12;

/// Armijo backtracking along `direction` with safeguarded quadratic interpolation.
///
/// Returns the accepted step, the new point and its value, and the number of trial evaluations.
fn line_search<O: Objective + ?Sized>(
    objective: &O,
    x: &DVector<f64>,
    f0: f64,
    direction: &DVector<f64>,
    slope: f64,
    initial_step: f64,
) -> (Option<(f64, DVector<f64>, f64)>, usize) {
    let mut step = initial_step;
    let mut trials = 0;
    while trials < MAX_LINE_SEARCH && step > MIN_STEP {
        trials += 1;
        let candidate = x + direction * step;
        let value = penalised(objective, &candidate);
        if value <= f0 + ARMIJO * step * slope {
            return (Some((step, candidate, value)), trials);
        }
        let denominator = 2.0 * (value - f0 - step * slope);
        let interpolated = if value.is_finite() && denominator > 0.0 {
            -slope * step * step / denominator
        } else {
            step * 0.5
        };
        step = interpolated.clamp(SIGMA1 * step, SIGMA2 * step);
    }
    (None, trials)
}

fn gradient_at<O: Objective + ?Sized>(
    objective: &O,
    x: &DVector<f64>,
) -> Result<(DVector<f64>, usize), EngineError> {
    match objective.gradient(x) {
        Some(gradient) => Ok((gradient?, 1)),
        None => Ok((central_difference(objective, x)?, 2 * x.len())),
    }
}

fn bfgs_update(h: &mut DMatrix<f64>, s: &DVector<f64>, y: &DVector<f64>) {
    let curvature = y.dot(s);
    let n = s.len();
    if curvature <= CURVATURE_TOL {
        *h = DMatrix::identity(n, n);
        return;
    }
    let rho = 1.0 / curvature;
    let identity = DMatrix::<f64>::identity(n, n);
    let left = &identity - s * y.transpose() * rho;
    let right = &identity - y * s.transpose() * rho;
    *h = &left * &*h * &right + s * s.transpose() * rho;
}

pub fn minimise<O: Objective + ?Sized>(
    objective: &O,
    x0: &DVector<f64>,
    method: GradientMethod,
    termination: &Termination,
) -> Result<MinimiserOutcome, EngineError> {
    let n = x0.len();
    let mut x = x0.clone();
    let mut value = starting_value(objective, &x)?;
    let (mut gradient, cost) = gradient_at(objective, &x)?;
    let mut evaluations = 1 + cost;
    let mut inverse_hessian = DMatrix::identity(n, n);
    let mut last_step: Option<f64> = None;
    let mut iterations = 0;
    let mut converged = n == 0;
    let mut warnings = Vec::new();

    while !converged && iterations < termination.max_iterations {
        if evaluations >= termination.max_evaluations {
            break;
        }
        if gradient.amax() <= GRADIENT_TOL {
            converged = true;
            break;
        }
        iterations += 1;

        let mut direction = match method {
            GradientMethod::Bfgs => -(&inverse_hessian * &gradient),
            GradientMethod::SteepestDescent => -gradient.clone(),
        };
        let mut slope = gradient.dot(&direction);
        if slope >= 0.0 {
            inverse_hessian = DMatrix::identity(n, n);
            direction = -gradient.clone();
            slope = gradient.dot(&direction);
        }

        let initial_step = match (method, last_step) {
            (GradientMethod::Bfgs, Some(_)) => 1.0,
            (GradientMethod::SteepestDescent, Some(previous)) => (2.0 * previous).min(1.0),
            (_, None) => (1.0 / gradient.norm()).min(1.0),
        };
        let (accepted, trials) = line_search(objective, &x, value, &direction, slope, initial_step);
        evaluations += trials;
        let Some((step, next, next_value)) = accepted else {
            warnings.push(format!(
                "line search failed to reduce the target after {iterations} iterations"
            ));
            break;
        };
        last_step = Some(step);

        let (next_gradient, cost) = match gradient_at(objective, &next) {
            Ok(result) => result,
            Err(err) => {
                warnings.push(format!("gradient evaluation failed: {err}"));
                x = next;
                value = next_value;
                break;
            }
        };
        evaluations += cost;

        if method == GradientMethod::Bfgs {
            bfgs_update(&mut inverse_hessian, &(&next - &x), &(&next_gradient - &gradient));
        }
        let change = (value - next_value).abs();
        x = next;
        value = next_value;
        gradient = next_gradient;
        if change <= termination.func_tol {
            converged = true;
        }
    }

    if !converged && warnings.is_empty() {
        warnings.push(format!(
            "{method:?} stopped after {iterations} iterations and {evaluations} evaluations without converging"
        ));
    }
    debug!(value, iterations, evaluations, ?method, "gradient minimiser finished");
    Ok(MinimiserOutcome {
        x,
        value,
        iterations,
        evaluations,
        converged,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::minimise::tests::Rosenbrock;

    struct Quadratic;

    impl Objective for Quadratic {
        fn dimension(&self) -> usize {
            3
        }

        fn value(&self, x: &DVector<f64>) -> Result<f64, EngineError> {
            Ok((x[0] - 1.0).powi(2) + 10.0 * (x[1] + 2.0).powi(2) + 0.5 * x[2].powi(2))
        }

        fn is_smooth(&self) -> bool {
            true
        }
    }

    fn tight() -> Termination {
        Termination {
            func_tol: 1e-20,
            ..Termination::default()
        }
    }

    #[test]
    fn bfgs_solves_rosenbrock() {
        let outcome = minimise(
            &Rosenbrock,
            &DVector::from_vec(vec![-1.2, 1.0]),
            GradientMethod::Bfgs,
            &tight(),
        )
        .unwrap();
        assert!(outcome.value < 1e-10);
        assert!((outcome.x[0] - 1.0).abs() < 1e-4);
    }

    #[test]
    fn numerical_gradients_are_used_when_none_is_provided() {
        let outcome = minimise(
            &Quadratic,
            &DVector::from_vec(vec![4.0, 3.0, -2.0]),
            GradientMethod::Bfgs,
            &tight(),
        )
        .unwrap();
        assert!(outcome.converged);
        assert!((outcome.x[0] - 1.0).abs() < 1e-5);
        assert!((outcome.x[1] + 2.0).abs() < 1e-5);
        assert!(outcome.x[2].abs() < 1e-5);
    }

    #[test]
    fn steepest_descent_reduces_the_value() {
        let x0 = DVector::from_vec(vec![4.0, 3.0, -2.0]);
        let start = Quadratic.value(&x0).unwrap();
        let termination = Termination {
            func_tol: 1e-10,
            max_iterations: 500,
            ..Termination::default()
        };
        let outcome = minimise(&Quadratic, &x0, GradientMethod::SteepestDescent, &termination).unwrap();
        assert!(outcome.value < start * 1e-6);
    }

    #[test]
    fn bfgs_update_satisfies_the_secant_condition() {
        let mut h = DMatrix::identity(2, 2);
        let s = DVector::from_vec(vec![0.5, -0.2]);
        let y = DVector::from_vec(vec![1.5, 0.1]);
        bfgs_update(&mut h, &s, &y);
        assert!((&h * &y - &s).norm() < 1e-12);
    }
}
