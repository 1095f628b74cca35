use super::ids::AlignId;
use super::observation::Observation;
use nalgebra::Vector3;
use std::collections::HashMap;
use std::fmt;

/// Stable identifier of an observation site: molecule, residue number and spin name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SpinLabel {
    /// Name of the molecule (domain) the spin belongs to.
    pub molecule: String,
    /// Residue sequence number.
    pub residue: isize,
    /// Spin or atom name, e.g. `"N"` or `"H"`.
    pub name: String,
}

impl SpinLabel {
    pub fn new(molecule: &str, residue: isize, name: &str) -> Self {
        Self {
            molecule: molecule.to_string(),
            residue,
            name: name.to_string(),
        }
    }
}

impl fmt::Display for SpinLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}@{}", self.molecule, self.residue, self.name)
    }
}

/// An observation site carrying pseudocontact shifts.
///
/// Positions are expressed in Angstrom in the coordinate frame of the domain the spin
/// belongs to. PCS values are keyed by alignment; an alignment absent from the map is
/// treated exactly like a cell flagged as missing.
#[derive(Debug, Clone, PartialEq)]
pub struct Spin {
    /// The identifier of the site.
    pub label: SpinLabel,
    /// Chemical element symbol, if known.
    pub element: Option<String>,
    /// Isotope name such as `"15N"`, required for spins taking part in RDCs.
    pub isotope: Option<String>,
    /// Cartesian position in Angstrom, required for spins carrying PCS data.
    pub position: Option<Vector3<f64>>,
    /// Measured PCS values (ppm) and errors per alignment.
    pub pcs: HashMap<AlignId, Observation>,
    /// Deselected spins are ignored during setup.
    pub selected: bool,
}

impl Spin {
    pub fn new(label: SpinLabel) -> Self {
        Self {
            label,
            element: None,
            isotope: None,
            position: None,
            pcs: HashMap::new(),
            selected: true,
        }
    }

    pub fn with_element(mut self, element: &str) -> Self {
        self.element = Some(element.to_string());
        self
    }

    pub fn with_isotope(mut self, isotope: &str) -> Self {
        self.isotope = Some(isotope.to_string());
        self
    }

    pub fn with_position(mut self, position: Vector3<f64>) -> Self {
        self.position = Some(position);
        self
    }

    pub fn with_pcs(mut self, alignment: AlignId, observation: Observation) -> Self {
        self.pcs.insert(alignment, observation);
        self
    }

    /// Returns the PCS cell for `alignment` if it exists and is not flagged as missing.
    pub fn pcs_for(&self, alignment: AlignId) -> Option<&Observation> {
        self.pcs.get(&alignment).filter(|obs| obs.is_present())
    }
}
