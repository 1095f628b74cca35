//! Exhaustive lattice search.

use super::{Objective, penalised};
use crate::engine::constraints::LinearConstraints;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use nalgebra::DVector;
use tracing::info;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

#[derive(Debug, Clone, PartialEq)]
pub struct GridOutcome {
    pub x: DVector<f64>,
    pub value: f64,
    pub evaluated: usize,
    /// Lattice points skipped because they violate the constraints.
    pub rejected: usize,
}

/// The point with flat index `index`; the last axis varies fastest.
fn lattice_point(axes: &[Vec<f64>], mut index: usize) -> DVector<f64> {
    let mut x = DVector::zeros(axes.len());
    for (i, axis) in axes.iter().enumerate().rev() {
        x[i] = axis[index % axis.len()];
        index /= axis.len();
    }
    x
}

/// Evaluates `objective` at every point of the lattice spanned by `axes` that satisfies
/// `constraints`, returning the lowest. Ties go to the earliest lattice index.
pub fn search<O: Objective + ?Sized>(
    objective: &O,
    axes: &[Vec<f64>],
    constraints: Option<&LinearConstraints>,
    reporter: &ProgressReporter,
) -> Result<GridOutcome, EngineError> {
    if axes.len() != objective.dimension() {
        return Err(EngineError::Validation(format!(
            "grid has {} axes for {} parameters",
            axes.len(),
            objective.dimension()
        )));
    }
    if let Some(empty) = axes.iter().position(Vec::is_empty) {
        return Err(EngineError::Validation(format!("grid axis {empty} has no points")));
    }
    let total = axes
        .iter()
        .try_fold(1usize, |acc, axis| acc.checked_mul(axis.len()))
        .ok_or_else(|| EngineError::Validation("grid is too large to enumerate".to_string()))?;

    reporter.report(Progress::TaskStart {
        total_steps: total as u64,
    });

    #[cfg(not(feature = "parallel"))]
    let iterator = 0..total;

    #[cfg(feature = "parallel")]
    let iterator = (0..total).into_par_iter();

    let scored: Vec<(usize, Option<f64>)> = iterator
        .map(|index| {
            let x = lattice_point(axes, index);
            let feasible = constraints.is_none_or(|c| c.is_satisfied(&x));
            let value = feasible.then(|| penalised(objective, &x));
            reporter.report(Progress::TaskIncrement);
            (index, value)
        })
        .collect();

    reporter.report(Progress::TaskFinish);

    let rejected = scored.iter().filter(|(_, value)| value.is_none()).count();
    let best = scored
        .iter()
        .filter_map(|(index, value)| value.filter(|v| v.is_finite()).map(|v| (*index, v)))
        .min_by(|a, b| a.1.total_cmp(&b.1).then(a.0.cmp(&b.0)));

    let Some((index, value)) = best else {
        return Err(EngineError::Optimisation(format!(
            "no feasible grid point out of {total} gave a finite target"
        )));
    };
    info!(points = total, rejected, best = value, "Grid search complete.");
    Ok(GridOutcome {
        x: lattice_point(axes, index),
        value,
        evaluated: total - rejected,
        rejected,
    })
}
