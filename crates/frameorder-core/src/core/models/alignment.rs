use super::tensor::AlignmentTensor;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// The domain to which an alignment tensor (and its paramagnetic centre) is rigidly attached.
///
/// With [`TensorFrame::Reference`] the observed spins belong to the moving domain and are
/// carried by the motion. With [`TensorFrame::Moving`] the tensor rides on the moving
/// domain while the observed spins sit on the reference domain, which then sees the
/// inverse motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum TensorFrame {
    #[default]
    Reference,
    Moving,
}

/// A tensor as observed from the moving domain, with the errors of its five elements.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReducedTensor {
    pub tensor: AlignmentTensor,
    pub errors: [f64; 5],
}

/// One alignment experiment.
#[derive(Debug, Clone, PartialEq)]
pub struct Alignment {
    /// Unique experiment name, e.g. `"dy"` or `"tb"`.
    pub name: String,
    /// Proton Larmor frequency of the spectrometer in Hz.
    pub proton_frequency: f64,
    /// Sample temperature in Kelvin.
    pub temperature: f64,
    /// Position of the paramagnetic centre in Angstrom, in the frame of the tensor's domain.
    pub paramagnetic_centre: Option<Vector3<f64>>,
    /// The full (unreduced) alignment tensor.
    pub tensor: AlignmentTensor,
    /// The reduced tensor measured on the other domain, if available.
    pub reduced: Option<ReducedTensor>,
    /// Which domain the tensor is attached to.
    pub frame: TensorFrame,
}

impl Alignment {
    pub fn new(name: &str, proton_frequency: f64, temperature: f64, tensor: AlignmentTensor) -> Self {
        Self {
            name: name.to_string(),
            proton_frequency,
            temperature,
            paramagnetic_centre: None,
            tensor,
            reduced: None,
            frame: TensorFrame::Reference,
        }
    }

    pub fn with_paramagnetic_centre(mut self, position: Vector3<f64>) -> Self {
        self.paramagnetic_centre = Some(position);
        self
    }

    pub fn with_reduced_tensor(mut self, reduced: ReducedTensor) -> Self {
        self.reduced = Some(reduced);
        self
    }

    pub fn with_frame(mut self, frame: TensorFrame) -> Self {
        self.frame = frame;
        self
    }
}
