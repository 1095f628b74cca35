use super::params::Param;
use crate::core::catalogue::{Amplitudes, ModelError, ModelKind, Motion};
use crate::core::geometry::{EulerZyz, GeometryError, euler_to_matrix};
use crate::core::models::tensor::AlignmentTensor;
use nalgebra::{DVector, Matrix3, Vector3};
use std::collections::HashSet;

/// Rigid-body placement of the moving domain: a rotation about the pivot followed by a translation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AveragePosition {
    pub translation: Vector3<f64>,
    pub euler: EulerZyz,
}

impl AveragePosition {
    pub fn rotation(&self) -> Result<Matrix3<f64>, GeometryError> {
        euler_to_matrix(self.euler)
    }

    /// Moves a moving-domain point to the average position: `R (x - p) + p + t`.
    pub fn apply(&self, rotation: &Matrix3<f64>, pivot: &Vector3<f64>, x: &Vector3<f64>) -> Vector3<f64> {
        rotation * (x - pivot) + pivot + self.translation
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pivot {
    pub point: Vector3<f64>,
    pub fixed: bool,
}

/// One frame-order model instance and its current parameter values.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameOrderModel {
    pub kind: ModelKind,
    pub average_position: AveragePosition,
    pub eigenframe: EulerZyz,
    pub pivot: Pivot,
    /// Offset of the second pivot from the first, fixed by the caller. Only the double rotor reads it.
    pub second_pivot_offset: Vector3<f64>,
    pub amplitudes: Amplitudes,
    /// Full alignment tensors, one per alignment in bundle order.
    pub tensors: Vec<AlignmentTensor>,
    pub tensors_floated: bool,
    pub reference_domain: String,
    /// Parameters held at their current value and left out of the parameter vector.
    pub pinned: HashSet<Param>,
    /// Parameters exempt from the default linear constraints.
    pub unconstrained: HashSet<Param>,
    pub chi2: Option<f64>,
    /// Optimised parameter vectors of the Monte-Carlo replicas.
    pub simulations: Vec<DVector<f64>>,
}

impl FrameOrderModel {
    pub fn new(kind: ModelKind, pivot: Vector3<f64>) -> Self {
        Self {
            kind,
            average_position: AveragePosition::default(),
            eigenframe: EulerZyz::default(),
            pivot: Pivot {
                point: pivot,
                fixed: true,
            },
            second_pivot_offset: Vector3::zeros(),
            amplitudes: Amplitudes::defaults_for(kind),
            tensors: Vec::new(),
            tensors_floated: false,
            reference_domain: String::from("reference"),
            pinned: HashSet::new(),
            unconstrained: HashSet::new(),
            chi2: None,
            simulations: Vec::new(),
        }
    }

    pub fn with_average_position(mut self, translation: Vector3<f64>, euler: EulerZyz) -> Self {
        self.average_position = AveragePosition { translation, euler };
        self
    }

    pub fn with_eigenframe(mut self, euler: EulerZyz) -> Self {
        self.eigenframe = euler;
        self
    }

    pub fn with_amplitudes(mut self, amplitudes: Amplitudes) -> Self {
        self.amplitudes = amplitudes;
        self
    }

    pub fn with_free_pivot(mut self) -> Self {
        self.pivot.fixed = false;
        self
    }

    pub fn with_second_pivot_offset(mut self, offset: Vector3<f64>) -> Self {
        self.second_pivot_offset = offset;
        self
    }

    pub fn with_floated_tensors(mut self) -> Self {
        self.tensors_floated = true;
        self
    }

    pub fn with_pinned(mut self, params: impl IntoIterator<Item = Param>) -> Self {
        self.pinned.extend(params);
        self
    }

    pub fn with_reference_domain(mut self, domain: &str) -> Self {
        self.reference_domain = domain.to_string();
        self
    }

    /// The effective motion for the current amplitudes, with out-of-range amplitudes
    /// clamped onto their bounds.
    pub fn motion(&self) -> Result<Motion, ModelError> {
        self.kind.motion(&self.amplitudes.clamped(self.kind))
    }

    /// The motion for the current amplitudes, rejecting out-of-range values.
    pub fn checked_motion(&self) -> Result<Motion, ModelError> {
        self.kind.motion(&self.amplitudes)
    }

    pub fn eigenframe_matrix(&self) -> Result<Matrix3<f64>, GeometryError> {
        euler_to_matrix(self.eigenframe)
    }

    pub fn second_pivot(&self) -> Vector3<f64> {
        self.pivot.point + self.second_pivot_offset
    }

    /// Number of free parameters, used for model comparison.
    pub fn parameter_count(&self) -> usize {
        super::params::ParamLayout::for_model(self).len()
    }
}

/// Summary of one optimisation stage.
#[derive(Debug, Clone, PartialEq)]
pub struct StageRecord {
    pub name: String,
    pub sobol_points: Option<usize>,
    pub func_tol: f64,
    pub chi2: f64,
    pub accepted_points: Option<usize>,
    pub iterations: usize,
    pub evaluations: usize,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Diagnostics {
    pub stages: Vec<StageRecord>,
    pub warnings: Vec<String>,
}

impl Diagnostics {
    pub fn chi2_history(&self) -> Vec<f64> {
        self.stages.iter().map(|stage| stage.chi2).collect()
    }

    pub(crate) fn warn(&mut self, message: String) {
        tracing::warn!("{message}");
        self.warnings.push(message);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OptimisationResult {
    pub params: DVector<f64>,
    pub chi2: f64,
    pub diagnostics: Diagnostics,
}
