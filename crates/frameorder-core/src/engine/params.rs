//! Flat parameter vectors.
//!
//! Optimisers see a model as a dense vector. [`ParamLayout`] fixes the order of its entries:
//! average-position translation and Euler angles, eigenframe Euler angles, the pivot when it
//! is free, the model's amplitudes in catalogue order and finally five tensor elements per
//! alignment when tensors are floated. Pinned parameters are skipped.

use super::state::FrameOrderModel;
use crate::core::catalogue::{AmplitudeParam, ModelKind};
use crate::core::models::tensor::TensorElement;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::f64::consts::{PI, TAU};

const TRANSLATION_HALF_WIDTH: f64 = 10.0;
const PIVOT_HALF_WIDTH: f64 = 10.0;
const TENSOR_HALF_WIDTH: f64 = 1e-3;

const PIVOT_SCALE: f64 = 10.0;
const TENSOR_SCALE: f64 = 1e-4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Param {
    AvePosX,
    AvePosY,
    AvePosZ,
    AvePosAlpha,
    AvePosBeta,
    AvePosGamma,
    EigenAlpha,
    EigenBeta,
    EigenGamma,
    PivotX,
    PivotY,
    PivotZ,
    Amplitude(AmplitudeParam),
    Tensor {
        alignment: usize,
        element: TensorElement,
    },
}

impl Param {
    pub const AVERAGE_POSITION: [Param; 6] = [
        Param::AvePosX,
        Param::AvePosY,
        Param::AvePosZ,
        Param::AvePosAlpha,
        Param::AvePosBeta,
        Param::AvePosGamma,
    ];
    pub const EIGENFRAME: [Param; 3] = [Param::EigenAlpha, Param::EigenBeta, Param::EigenGamma];
    pub const PIVOT: [Param; 3] = [Param::PivotX, Param::PivotY, Param::PivotZ];

    pub fn name(&self) -> String {
        match self {
            Param::AvePosX => "ave_pos_x".to_string(),
            Param::AvePosY => "ave_pos_y".to_string(),
            Param::AvePosZ => "ave_pos_z".to_string(),
            Param::AvePosAlpha => "ave_pos_alpha".to_string(),
            Param::AvePosBeta => "ave_pos_beta".to_string(),
            Param::AvePosGamma => "ave_pos_gamma".to_string(),
            Param::EigenAlpha => "eigen_alpha".to_string(),
            Param::EigenBeta => "eigen_beta".to_string(),
            Param::EigenGamma => "eigen_gamma".to_string(),
            Param::PivotX => "pivot_x".to_string(),
            Param::PivotY => "pivot_y".to_string(),
            Param::PivotZ => "pivot_z".to_string(),
            Param::Amplitude(amplitude) => amplitude.name().to_string(),
            Param::Tensor { alignment, element } => format!("{}[{alignment}]", element.name()),
        }
    }

    /// Characteristic magnitude used to bring all parameters to a similar scale.
    pub fn scale(&self) -> f64 {
        match self {
            Param::PivotX | Param::PivotY | Param::PivotZ => PIVOT_SCALE,
            Param::Tensor { .. } => TENSOR_SCALE,
            _ => 1.0,
        }
    }

    /// Default grid-search bounds around the model's current state.
    pub fn default_bounds(&self, model: &FrameOrderModel) -> (f64, f64) {
        let pivot = model.pivot.point;
        match self {
            Param::AvePosX | Param::AvePosY | Param::AvePosZ => {
                (-TRANSLATION_HALF_WIDTH, TRANSLATION_HALF_WIDTH)
            }
            Param::AvePosAlpha | Param::AvePosGamma | Param::EigenAlpha | Param::EigenGamma => {
                (0.0, TAU)
            }
            Param::AvePosBeta | Param::EigenBeta => (0.0, PI),
            Param::PivotX => (pivot.x - PIVOT_HALF_WIDTH, pivot.x + PIVOT_HALF_WIDTH),
            Param::PivotY => (pivot.y - PIVOT_HALF_WIDTH, pivot.y + PIVOT_HALF_WIDTH),
            Param::PivotZ => (pivot.z - PIVOT_HALF_WIDTH, pivot.z + PIVOT_HALF_WIDTH),
            Param::Amplitude(amplitude) => amplitude.bounds(),
            Param::Tensor { .. } => (-TENSOR_HALF_WIDTH, TENSOR_HALF_WIDTH),
        }
    }

    pub fn get(&self, model: &FrameOrderModel) -> f64 {
        let ave = &model.average_position;
        match *self {
            Param::AvePosX => ave.translation.x,
            Param::AvePosY => ave.translation.y,
            Param::AvePosZ => ave.translation.z,
            Param::AvePosAlpha => ave.euler.alpha,
            Param::AvePosBeta => ave.euler.beta,
            Param::AvePosGamma => ave.euler.gamma,
            Param::EigenAlpha => model.eigenframe.alpha,
            Param::EigenBeta => model.eigenframe.beta,
            Param::EigenGamma => model.eigenframe.gamma,
            Param::PivotX => model.pivot.point.x,
            Param::PivotY => model.pivot.point.y,
            Param::PivotZ => model.pivot.point.z,
            Param::Amplitude(amplitude) => model.amplitudes.get(amplitude),
            Param::Tensor { alignment, element } => model
                .tensors
                .get(alignment)
                .map_or(f64::NAN, |tensor| tensor.get(element)),
        }
    }

    pub fn set(&self, model: &mut FrameOrderModel, value: f64) {
        let ave = &mut model.average_position;
        match *self {
            Param::AvePosX => ave.translation.x = value,
            Param::AvePosY => ave.translation.y = value,
            Param::AvePosZ => ave.translation.z = value,
            Param::AvePosAlpha => ave.euler.alpha = value,
            Param::AvePosBeta => ave.euler.beta = value,
            Param::AvePosGamma => ave.euler.gamma = value,
            Param::EigenAlpha => model.eigenframe.alpha = value,
            Param::EigenBeta => model.eigenframe.beta = value,
            Param::EigenGamma => model.eigenframe.gamma = value,
            Param::PivotX => model.pivot.point.x = value,
            Param::PivotY => model.pivot.point.y = value,
            Param::PivotZ => model.pivot.point.z = value,
            Param::Amplitude(amplitude) => model.amplitudes.set(amplitude, value),
            Param::Tensor { alignment, element } => {
                if let Some(tensor) = model.tensors.get_mut(alignment) {
                    tensor.set(element, value);
                }
            }
        }
    }
}

/// The ordered list of free parameters of one model instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamLayout {
    params: Vec<Param>,
}

impl ParamLayout {
    /// Builds the layout for `kind` before pinning.
    pub fn new(kind: ModelKind, pivot_free: bool, floated_alignments: usize) -> Self {
        let mut params = Param::AVERAGE_POSITION.to_vec();
        if !kind.is_rigid() {
            params.extend(Param::EIGENFRAME);
            if pivot_free {
                params.extend(Param::PIVOT);
            }
        }
        params.extend(kind.amplitude_params().iter().map(|a| Param::Amplitude(*a)));
        for alignment in 0..floated_alignments {
            params.extend(
                TensorElement::ALL
                    .iter()
                    .map(|&element| Param::Tensor { alignment, element }),
            );
        }
        Self { params }
    }

    pub fn for_model(model: &FrameOrderModel) -> Self {
        let floated = if model.tensors_floated {
            model.tensors.len()
        } else {
            0
        };
        Self::new(model.kind, !model.pivot.fixed, floated).without(&model.pinned)
    }

    /// Drops the pinned parameters, keeping the order of the rest.
    pub fn without(mut self, pinned: &HashSet<Param>) -> Self {
        self.params.retain(|p| !pinned.contains(p));
        self
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn index_of(&self, param: Param) -> Option<usize> {
        self.params.iter().position(|p| *p == param)
    }

    pub fn names(&self) -> Vec<String> {
        self.params.iter().map(Param::name).collect()
    }

    pub fn scaling(&self) -> DVector<f64> {
        DVector::from_iterator(self.len(), self.params.iter().map(Param::scale))
    }

    pub fn pack(&self, model: &FrameOrderModel) -> DVector<f64> {
        DVector::from_iterator(self.len(), self.params.iter().map(|p| p.get(model)))
    }

    pub fn unpack(&self, values: &DVector<f64>, model: &mut FrameOrderModel) {
        for (param, value) in self.params.iter().zip(values.iter()) {
            param.set(model, *value);
        }
    }
}
