use nalgebra::Matrix3;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TensorElement {
    Axx,
    Ayy,
    Axy,
    Axz,
    Ayz,
}

impl TensorElement {
    pub const ALL: [TensorElement; 5] = [
        TensorElement::Axx,
        TensorElement::Ayy,
        TensorElement::Axy,
        TensorElement::Axz,
        TensorElement::Ayz,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            TensorElement::Axx => "Axx",
            TensorElement::Ayy => "Ayy",
            TensorElement::Axy => "Axy",
            TensorElement::Axz => "Axz",
            TensorElement::Ayz => "Ayz",
        }
    }
}

/// Symmetric traceless alignment tensor stored through its five independent elements.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct AlignmentTensor {
    pub axx: f64,
    pub ayy: f64,
    pub axy: f64,
    pub axz: f64,
    pub ayz: f64,
}

impl AlignmentTensor {
    pub fn new(axx: f64, ayy: f64, axy: f64, axz: f64, ayz: f64) -> Self {
        Self {
            axx,
            ayy,
            axy,
            axz,
            ayz,
        }
    }

    pub fn from_array(values: [f64; 5]) -> Self {
        Self::new(values[0], values[1], values[2], values[3], values[4])
    }

    pub fn to_array(&self) -> [f64; 5] {
        [self.axx, self.ayy, self.axy, self.axz, self.ayz]
    }

    pub fn get(&self, element: TensorElement) -> f64 {
        match element {
            TensorElement::Axx => self.axx,
            TensorElement::Ayy => self.ayy,
            TensorElement::Axy => self.axy,
            TensorElement::Axz => self.axz,
            TensorElement::Ayz => self.ayz,
        }
    }

    pub fn set(&mut self, element: TensorElement, value: f64) {
        match element {
            TensorElement::Axx => self.axx = value,
            TensorElement::Ayy => self.ayy = value,
            TensorElement::Axy => self.axy = value,
            TensorElement::Axz => self.axz = value,
            TensorElement::Ayz => self.ayz = value,
        }
    }

    pub fn azz(&self) -> f64 {
        -self.axx - self.ayy
    }

    pub fn to_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.axx, self.axy, self.axz, //
            self.axy, self.ayy, self.ayz, //
            self.axz, self.ayz, self.azz(),
        )
    }

    /// Projects an arbitrary 3x3 matrix onto the symmetric traceless subspace.
    pub fn from_matrix(m: &Matrix3<f64>) -> Self {
        let sym = (m + m.transpose()) * 0.5;
        let shift = sym.trace() / 3.0;
        Self::new(
            sym[(0, 0)] - shift,
            sym[(1, 1)] - shift,
            sym[(0, 1)],
            sym[(0, 2)],
            sym[(1, 2)],
        )
    }

    /// Tensor expressed in a frame rotated by `r`: `R A R^T`.
    pub fn rotated(&self, r: &Matrix3<f64>) -> Self {
        Self::from_matrix(&(r * self.to_matrix() * r.transpose()))
    }
}
