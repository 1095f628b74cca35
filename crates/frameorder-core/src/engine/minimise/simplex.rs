//! Nelder-Mead downhill simplex.

use super::{MinimiserOutcome, Objective, Termination, penalised, starting_value};
use crate::engine::error::EngineError;
use nalgebra::DVector;
use tracing::debug;

const REFLECTION: f64 = 1.0;
const EXPANSION: f64 = 2.0;
const CONTRACTION: f64 = 0.5;
const SHRINK: f64 = 0.5;

/// Edge length of the starting simplex, in scaled coordinates.
const INITIAL_STEP: f64 = 0.1;

struct Vertex {
    x: DVector<f64>,
    value: f64,
}

/// Minimises `objective` from `x0`, stopping when the spread of vertex values drops to
/// `termination.func_tol` or a budget is exhausted.
pub fn minimise<O: Objective + ?Sized>(
    objective: &O,
    x0: &DVector<f64>,
    termination: &Termination,
) -> Result<MinimiserOutcome, EngineError> {
    let n = x0.len();
    let start = starting_value(objective, x0)?;
    let mut evaluations = 1;
    if n == 0 {
        return Ok(MinimiserOutcome {
            x: x0.clone(),
            value: start,
            iterations: 0,
            evaluations,
            converged: true,
            warnings: Vec::new(),
        });
    }

    let mut simplex = Vec::with_capacity(n + 1);
    simplex.push(Vertex {
        x: x0.clone(),
        value: start,
    });
    for i in 0..n {
        let mut x = x0.clone();
        x[i] += INITIAL_STEP;
        let value = penalised(objective, &x);
        evaluations += 1;
        simplex.push(Vertex { x, value });
    }

    let mut iterations = 0;
    let mut converged = false;
    while iterations < termination.max_iterations && evaluations < termination.max_evaluations {
        simplex.sort_by(|a, b| a.value.total_cmp(&b.value));
        let best = simplex[0].value;
        let worst = simplex[n].value;
        if (worst - best).abs() <= termination.func_tol {
            converged = true;
            break;
        }
        iterations += 1;

        let centroid = simplex[..n]
            .iter()
            .fold(DVector::zeros(n), |acc, v| acc + &v.x)
            / n as f64;
        let worst_x = simplex[n].x.clone();
        let toward = |coefficient: f64| &centroid + (&centroid - &worst_x) * coefficient;

        let reflected = toward(REFLECTION);
        let reflected_value = penalised(objective, &reflected);
        evaluations += 1;

        if reflected_value < best {
            let expanded = toward(EXPANSION);
            let expanded_value = penalised(objective, &expanded);
            evaluations += 1;
            simplex[n] = if expanded_value < reflected_value {
                Vertex { x: expanded, value: expanded_value }
            } else {
                Vertex { x: reflected, value: reflected_value }
            };
            continue;
        }
        if reflected_value < simplex[n - 1].value {
            simplex[n] = Vertex { x: reflected, value: reflected_value };
            continue;
        }

        let (contracted, contracted_value) = if reflected_value < worst {
            let outside = toward(REFLECTION * CONTRACTION);
            let value = penalised(objective, &outside);
            (outside, value)
        } else {
            let inside = toward(-CONTRACTION);
            let value = penalised(objective, &inside);
            (inside, value)
        };
        evaluations += 1;
        if contracted_value < reflected_value.min(worst) {
            simplex[n] = Vertex { x: contracted, value: contracted_value };
            continue;
        }

        let anchor = simplex[0].x.clone();
        for vertex in simplex.iter_mut().skip(1) {
            vertex.x = &anchor + (&vertex.x - &anchor) * SHRINK;
            vertex.value = penalised(objective, &vertex.x);
            evaluations += 1;
        }
    }

    simplex.sort_by(|a, b| a.value.total_cmp(&b.value));
    let mut warnings = Vec::new();
    if !converged {
        warnings.push(format!(
            "simplex stopped after {iterations} iterations and {evaluations} evaluations without converging"
        ));
    }
    let best = simplex.swap_remove(0);
    debug!(value = best.value, iterations, evaluations, "simplex finished");
    Ok(MinimiserOutcome {
        x: best.x,
        value: best.value,
        iterations,
        evaluations,
        converged,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::minimise::tests::{Rosenbrock, WalledBowl};

    #[test]
    fn finds_the_rosenbrock_valley_floor() {
        let termination = Termination {
            func_tol: 1e-14,
            ..Termination::default()
        };
        let outcome = minimise(&Rosenbrock, &DVector::from_vec(vec![-1.2, 1.0]), &termination).unwrap();
        assert!(outcome.converged);
        assert!((outcome.x[0] - 1.0).abs() < 1e-3);
        assert!((outcome.x[1] - 1.0).abs() < 2e-3);
    }

    #[test]
    fn never_accepts_a_failed_evaluation() {
        let bowl = WalledBowl {
            centre: vec![2.0, -1.0],
            wall: 1.0,
        };
        let termination = Termination {
            func_tol: 1e-12,
            ..Termination::default()
        };
        let outcome = minimise(&bowl, &DVector::from_vec(vec![0.0, 0.0]), &termination).unwrap();
        assert!(outcome.value.is_finite());
        assert!(outcome.x[0] <= 1.0);
        // The constrained minimum is 1 at (1, -1); the start is at 5.
        assert!(outcome.value < 1.5);
    }

    #[test]
    fn reports_exhausted_budgets() {
        let termination = Termination {
            func_tol: 0.0,
            max_iterations: 3,
            max_evaluations: 1000,
        };
        let outcome = minimise(&Rosenbrock, &DVector::from_vec(vec![-1.2, 1.0]), &termination).unwrap();
        assert!(!outcome.converged);
        assert_eq!(outcome.iterations, 3);
        assert_eq!(outcome.warnings.len(), 1);
    }

    #[test]
    fn a_bad_starting_point_is_an_error() {
        let bowl = WalledBowl {
            centre: vec![0.0],
            wall: 1.0,
        };
        assert!(minimise(&bowl, &DVector::from_vec(vec![3.0]), &Termination::default()).is_err());
    }
}
