//! Method of multipliers (augmented Lagrangian) for linear inequality constraints.
//!
//! Each outer iteration minimises
//! `L(x) = f(x) + sum_i psi(c_i(x), lambda_i; mu)` with `c = A x - b` and
//!
//! ```text
//! psi(t, s; mu) = -s t + t^2 / (2 mu)   if t - mu s <= 0
//!               = -mu s^2 / 2           otherwise
//! ```
//!
//! then updates `lambda_i <- max(lambda_i - c_i / mu, 0)` and `mu <- mu * mu_factor`.

use super::{MinimiserOutcome, Objective};
use crate::engine::config::MultiplierConfig;
use crate::engine::constraints::LinearConstraints;
use crate::engine::error::EngineError;
use nalgebra::DVector;
use tracing::debug;

struct Augmented<'a, O> {
    objective: &'a O,
    constraints: &'a LinearConstraints,
    lambda: DVector<f64>,
    mu: f64,
}

impl<O: Objective> Augmented<'_, O> {
    fn penalty(&self, residuals: &DVector<f64>) -> f64 {
        residuals
            .iter()
            .zip(self.lambda.iter())
            .map(|(&t, &s)| {
                if t - self.mu * s <= 0.0 {
                    -s * t + t * t / (2.0 * self.mu)
                } else {
                    -self.mu * s * s / 2.0
                }
            })
            .sum()
    }
}

impl<O: Objective> Objective for Augmented<'_, O> {
    fn dimension(&self) -> usize {
        self.objective.dimension()
    }

    fn value(&self, x: &DVector<f64>) -> Result<f64, EngineError> {
        let f = self.objective.value(x)?;
        Ok(f + self.penalty(&self.constraints.residuals(x)))
    }

    fn gradient(&self, x: &DVector<f64>) -> Option<Result<DVector<f64>, EngineError>> {
        let gradient = self.objective.gradient(x)?;
        Some(gradient.map(|g| {
            let weights = DVector::from_iterator(
                self.lambda.len(),
                self.constraints
                    .residuals(x)
                    .iter()
                    .zip(self.lambda.iter())
                    .map(|(&t, &s)| if t - self.mu * s <= 0.0 { -s + t / self.mu } else { 0.0 }),
            );
            g + self.constraints.matrix().tr_mul(&weights)
        }))
    }

    fn is_smooth(&self) -> bool {
        self.objective.is_smooth()
    }
}

/// Runs `inner` on a sequence of augmented Lagrangians until the Lagrangian settles.
///
/// The loop also stops once a feasible iterate with no active multiplier is reproduced to
/// within `inner_tol`, since later outer iterations then minimise `f` itself again.
pub fn minimise<O, F>(
    objective: &O,
    constraints: &LinearConstraints,
    x0: &DVector<f64>,
    config: &MultiplierConfig,
    inner_tol: f64,
    mut inner: F,
) -> Result<MinimiserOutcome, EngineError>
where
    O: Objective,
    F: FnMut(&dyn Objective, &DVector<f64>) -> Result<MinimiserOutcome, EngineError>,
{
    if constraints.is_empty() {
        return inner(objective, x0);
    }

    let mut lambda = DVector::zeros(constraints.len());
    let mut mu = config.initial_mu;
    let mut x = x0.clone();
    let mut previous = f64::INFINITY;
    let mut iterations = 0;
    let mut evaluations = 0;
    let mut warnings = Vec::new();
    let mut converged = false;

    for outer in 0..config.max_iterations {
        let augmented = Augmented {
            objective,
            constraints,
            lambda: lambda.clone(),
            mu,
        };
        let outcome = inner(&augmented, &x)?;
        iterations += outcome.iterations;
        evaluations += outcome.evaluations;
        warnings.extend(outcome.warnings);
        x = outcome.x;

        let lagrangian = outcome.value;
        let residuals = constraints.residuals(&x);
        for (s, c) in lambda.iter_mut().zip(residuals.iter()) {
            *s = (*s - c / mu).max(0.0);
        }
        mu *= config.mu_factor;

        let change = (lagrangian - previous).abs();
        let settled = constraints.is_satisfied(&x) && lambda.iter().all(|s| *s == 0.0) && change <= inner_tol;
        debug!(outer, lagrangian, mu, "multiplier iteration");
        if change <= config.func_tol || settled {
            converged = true;
            break;
        }
        if mu < config.min_mu {
            converged = true;
            break;
        }
        previous = lagrangian;
    }

    if !converged {
        warnings.push(format!(
            "method of multipliers stopped after {} outer iterations",
            config.max_iterations
        ));
    }
    let value = objective.value(&x)?;
    Ok(MinimiserOutcome {
        x,
        value,
        iterations,
        evaluations,
        converged,
        warnings,
    })
}
