use super::error::EngineError;
use super::params::{Param, ParamLayout};
use super::state::FrameOrderModel;
use crate::core::catalogue::AmplitudeParam;
use nalgebra::{DMatrix, DVector};
use std::f64::consts::PI;

/// Slack allowed when testing `A x >= b`, absorbing rounding in scaled coordinates.
const FEASIBILITY_SLACK: f64 = 1e-12;

/// Linear inequality constraints `A x >= b` over a parameter vector.
#[derive(Debug, Clone, PartialEq)]
pub struct LinearConstraints {
    a: DMatrix<f64>,
    b: DVector<f64>,
    labels: Vec<String>,
}

impl LinearConstraints {
    pub fn new(a: DMatrix<f64>, b: DVector<f64>) -> Result<Self, EngineError> {
        if a.nrows() != b.len() {
            return Err(EngineError::Validation(format!(
                "constraint matrix has {} rows but the bound vector has {} entries",
                a.nrows(),
                b.len()
            )));
        }
        let labels = (0..a.nrows()).map(|i| format!("row {i}")).collect();
        Ok(Self { a, b, labels })
    }

    pub fn empty(dimension: usize) -> Self {
        Self {
            a: DMatrix::zeros(0, dimension),
            b: DVector::zeros(0),
            labels: Vec::new(),
        }
    }

    /// Catalogue constraints for the free parameters of `model`: amplitudes in `[0, pi]`,
    /// `theta_x <= theta_y` for the pseudo-ellipse and the eigenframe `beta` in `[0, pi]`.
    pub fn for_model(model: &FrameOrderModel, layout: &ParamLayout) -> Self {
        let n = layout.len();
        let mut rows: Vec<(Vec<(usize, f64)>, f64, String)> = Vec::new();
        let free = |param: Param| {
            layout
                .index_of(param)
                .filter(|_| !model.unconstrained.contains(&param))
        };

        for &param in layout.params() {
            let bounded = matches!(param, Param::Amplitude(_) | Param::EigenBeta);
            let Some(i) = free(param).filter(|_| bounded) else {
                continue;
            };
            let name = param.name();
            rows.push((vec![(i, 1.0)], 0.0, format!("{name} >= 0")));
            rows.push((vec![(i, -1.0)], -PI, format!("{name} <= pi")));
        }

        if let (Some(x), Some(y)) = (
            free(Param::Amplitude(AmplitudeParam::ConeThetaX)),
            free(Param::Amplitude(AmplitudeParam::ConeThetaY)),
        ) {
            rows.push((
                vec![(y, 1.0), (x, -1.0)],
                0.0,
                "cone_theta_y - cone_theta_x >= 0".to_string(),
            ));
        }

        let mut a = DMatrix::zeros(rows.len(), n);
        let mut b = DVector::zeros(rows.len());
        let mut labels = Vec::with_capacity(rows.len());
        for (r, (entries, bound, label)) in rows.into_iter().enumerate() {
            for (c, value) in entries {
                a[(r, c)] = value;
            }
            b[r] = bound;
            labels.push(label);
        }
        Self { a, b, labels }
    }

    /// Appends the rows of `other`, which must act on vectors of the same dimension.
    pub fn extend(&mut self, other: &LinearConstraints) -> Result<(), EngineError> {
        if other.dimension() != self.dimension() {
            return Err(EngineError::Validation(format!(
                "constraints act on {} parameters, expected {}",
                other.dimension(),
                self.dimension()
            )));
        }
        let rows = self.len() + other.len();
        let mut a = DMatrix::zeros(rows, self.dimension());
        a.rows_mut(0, self.len()).copy_from(&self.a);
        a.rows_mut(self.len(), other.len()).copy_from(&other.a);
        let b = DVector::from_iterator(rows, self.b.iter().chain(other.b.iter()).copied());
        self.a = a;
        self.b = b;
        self.labels.extend(other.labels.iter().cloned());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.b.len()
    }

    pub fn is_empty(&self) -> bool {
        self.b.is_empty()
    }

    pub fn dimension(&self) -> usize {
        self.a.ncols()
    }

    pub fn matrix(&self) -> &DMatrix<f64> {
        &self.a
    }

    /// `c(x) = A x - b`; feasible points have every entry non-negative.
    pub fn residuals(&self, x: &DVector<f64>) -> DVector<f64> {
        &self.a * x - &self.b
    }

    pub fn violations(&self, x: &DVector<f64>) -> Vec<usize> {
        self.residuals(x)
            .iter()
            .enumerate()
            .filter(|(_, c)| **c < -FEASIBILITY_SLACK)
            .map(|(i, _)| i)
            .collect()
    }

    pub fn is_satisfied(&self, x: &DVector<f64>) -> bool {
        self.violations(x).is_empty()
    }

    /// Fails with [`EngineError::Constraint`] naming every violated row.
    pub fn check(&self, x: &DVector<f64>) -> Result<(), EngineError> {
        let violated = self.violations(x);
        if violated.is_empty() {
            return Ok(());
        }
        let names: Vec<&str> = violated.iter().map(|&i| self.labels[i].as_str()).collect();
        Err(EngineError::Constraint(names.join(", ")))
    }

    /// The same constraints expressed in scaled coordinates `x = s * y`.
    pub fn scaled(&self, scaling: &DVector<f64>) -> Self {
        let mut a = self.a.clone();
        for (mut column, s) in a.column_iter_mut().zip(scaling.iter()) {
            column *= *s;
        }
        Self {
            a,
            b: self.b.clone(),
            labels: self.labels.clone(),
        }
    }
}
