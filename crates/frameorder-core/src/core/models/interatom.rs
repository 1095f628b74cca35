use super::ids::{AlignId, SpinId};
use super::observation::RdcObservation;
use nalgebra::Vector3;
use std::collections::HashMap;

/// An interatomic vector between two spins, the carrier of residual dipolar couplings.
#[derive(Debug, Clone, PartialEq)]
pub struct Interatom {
    /// First spin of the pair (the heteronucleus by convention).
    pub spin1: SpinId,
    /// Second spin of the pair.
    pub spin2: SpinId,
    /// Unit vector from `spin1` to `spin2`, in the frame of the owning domain.
    pub vector: Vector3<f64>,
    /// Internuclear distance in Angstrom.
    pub distance: f64,
    /// Measured RDCs (Hz) per alignment.
    pub rdc: HashMap<AlignId, RdcObservation>,
    /// Deselected vectors are ignored during setup.
    pub selected: bool,
}

impl Interatom {
    /// Creates a vector between two spins; `direction` need not be normalised.
    pub fn new(spin1: SpinId, spin2: SpinId, direction: Vector3<f64>, distance: f64) -> Self {
        let norm = direction.norm();
        let vector = if norm > 0.0 { direction / norm } else { direction };
        Self {
            spin1,
            spin2,
            vector,
            distance,
            rdc: HashMap::new(),
            selected: true,
        }
    }

    pub fn with_rdc(mut self, alignment: AlignId, observation: RdcObservation) -> Self {
        self.rdc.insert(alignment, observation);
        self
    }

    pub fn rdc_for(&self, alignment: AlignId) -> Option<&RdcObservation> {
        self.rdc
            .get(&alignment)
            .filter(|obs| obs.observation.is_present())
    }
}
