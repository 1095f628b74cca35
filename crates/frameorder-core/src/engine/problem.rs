//! Flattening of a [`DataBundle`] into the dense arrays the integration loop reads.
//!
//! Validation happens here, once, before any integration: every selected observation must
//! have the geometry and physical constants it needs.

use super::error::EngineError;
use crate::core::geometry::GeometryError;
use crate::core::models::alignment::{ReducedTensor, TensorFrame};
use crate::core::models::bundle::DataBundle;
use crate::core::models::ids::{AlignId, InteratomId, SpinId};
use crate::core::models::tensor::AlignmentTensor;
use crate::core::physics::{gyromagnetic_ratio, pcs_constant, rdc_constant};
use nalgebra::Vector3;
use std::collections::HashMap;
use tracing::debug;

/// Pivots further than this from the centroid of the observed spins (Angstrom) are rejected.
const MAX_PIVOT_DISTANCE: f64 = 500.0;

#[derive(Debug, Clone)]
pub(crate) struct PreparedAlignment {
    pub id: AlignId,
    pub name: String,
    pub frame: TensorFrame,
    pub pcs_constant: f64,
    pub paramagnetic_centre: Option<Vector3<f64>>,
    pub reduced: Option<ReducedTensor>,
}

#[derive(Debug, Clone)]
pub(crate) struct PcsSite {
    pub spin: SpinId,
    pub label: String,
    pub position: Vector3<f64>,
}

#[derive(Debug, Clone)]
pub(crate) struct RdcSite {
    pub interatom: InteratomId,
    pub label: String,
    pub unit: Vector3<f64>,
    pub constant: f64,
}

/// One present observation: (alignment index, site index, value, error).
#[derive(Debug, Clone, Copy)]
pub(crate) struct ObservationRow {
    pub alignment: usize,
    pub site: usize,
    pub value: f64,
    pub error: f64,
    pub absolute: bool,
}

/// Measured values in row order; Monte-Carlo replicas swap in perturbed copies.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservedValues {
    pub pcs: Vec<f64>,
    pub rdc: Vec<f64>,
    pub reduced: Vec<Option<[f64; 5]>>,
}

/// The validated, index-addressed form of a data bundle.
#[derive(Debug, Clone)]
pub struct Problem {
    pub(crate) alignments: Vec<PreparedAlignment>,
    pub(crate) pcs_sites: Vec<PcsSite>,
    pub(crate) rdc_sites: Vec<RdcSite>,
    pub(crate) pcs_rows: Vec<ObservationRow>,
    pub(crate) rdc_rows: Vec<ObservationRow>,
    initial_tensors: Vec<AlignmentTensor>,
}

impl Problem {
    pub fn new(bundle: &DataBundle) -> Result<Self, EngineError> {
        if bundle.alignment_count() == 0 {
            return Err(EngineError::Validation(
                "at least one alignment is required".to_string(),
            ));
        }

        let mut index_of: HashMap<AlignId, usize> = HashMap::new();
        let mut alignments = Vec::with_capacity(bundle.alignment_count());
        let mut initial_tensors = Vec::with_capacity(bundle.alignment_count());
        for (i, (id, alignment)) in bundle.alignments().enumerate() {
            if !(alignment.proton_frequency > 0.0 && alignment.proton_frequency.is_finite()) {
                return Err(EngineError::Validation(format!(
                    "alignment '{}' has a non-physical field strength {}",
                    alignment.name, alignment.proton_frequency
                )));
            }
            if !(alignment.temperature > 0.0 && alignment.temperature.is_finite()) {
                return Err(EngineError::Validation(format!(
                    "alignment '{}' has a non-physical temperature {}",
                    alignment.name, alignment.temperature
                )));
            }
            if let Some(reduced) = &alignment.reduced {
                if reduced.errors.iter().any(|e| !(*e > 0.0 && e.is_finite())) {
                    return Err(EngineError::Validation(format!(
                        "reduced tensor of alignment '{}' needs positive errors",
                        alignment.name
                    )));
                }
            }
            index_of.insert(id, i);
            initial_tensors.push(alignment.tensor);
            alignments.push(PreparedAlignment {
                id,
                name: alignment.name.clone(),
                frame: alignment.frame,
                pcs_constant: pcs_constant(alignment.temperature, alignment.proton_frequency),
                paramagnetic_centre: alignment.paramagnetic_centre,
                reduced: alignment.reduced,
            });
        }

        let mut pcs_sites = Vec::new();
        let mut pcs_rows = Vec::new();
        for (spin_id, spin) in bundle.spins().filter(|(_, s)| s.selected) {
            let mut rows: Vec<ObservationRow> = Vec::new();
            for (align_id, observation) in spin.pcs.iter().filter(|(_, o)| o.is_present()) {
                let alignment = *index_of.get(align_id).ok_or_else(|| {
                    EngineError::Validation(format!(
                        "spin {} has PCS data for an unknown alignment",
                        spin.label
                    ))
                })?;
                check_error(observation.error, || format!("PCS of spin {}", spin.label))?;
                if alignments[alignment].paramagnetic_centre.is_none() {
                    return Err(EngineError::Validation(format!(
                        "alignment '{}' has PCS data but no paramagnetic centre",
                        alignments[alignment].name
                    )));
                }
                rows.push(ObservationRow {
                    alignment,
                    site: pcs_sites.len(),
                    value: observation.value,
                    error: observation.error,
                    absolute: false,
                });
            }
            if rows.is_empty() {
                continue;
            }
            let position = spin.position.ok_or_else(|| {
                EngineError::Validation(format!("spin {} has PCS data but no position", spin.label))
            })?;
            rows.sort_by_key(|row| row.alignment);
            pcs_rows.extend(rows);
            pcs_sites.push(PcsSite {
                spin: spin_id,
                label: spin.label.to_string(),
                position,
            });
        }

        let mut rdc_sites = Vec::new();
        let mut rdc_rows = Vec::new();
        for (interatom_id, interatom) in bundle.interatoms().filter(|(_, i)| i.selected) {
            let (Some(spin1), Some(spin2)) = (bundle.spin(interatom.spin1), bundle.spin(interatom.spin2))
            else {
                return Err(EngineError::Internal(
                    "interatomic vector refers to a missing spin".to_string(),
                ));
            };
            let label = format!("{}-{}", spin1.label, spin2.label);
            let mut rows: Vec<ObservationRow> = Vec::new();
            for (align_id, rdc) in interatom.rdc.iter().filter(|(_, r)| r.observation.is_present()) {
                let alignment = *index_of.get(align_id).ok_or_else(|| {
                    EngineError::Validation(format!("{label} has RDC data for an unknown alignment"))
                })?;
                check_error(rdc.observation.error, || format!("RDC of {label}"))?;
                rows.push(ObservationRow {
                    alignment,
                    site: rdc_sites.len(),
                    value: rdc.observation.value,
                    error: rdc.observation.error,
                    absolute: rdc.absolute,
                });
            }
            if rows.is_empty() {
                continue;
            }
            if interatom.vector.norm() == 0.0 {
                return Err(GeometryError::ZeroAxis.into());
            }
            if !(interatom.distance > 0.0 && interatom.distance.is_finite()) {
                return Err(EngineError::Validation(format!(
                    "{label} has a non-physical distance {}",
                    interatom.distance
                )));
            }
            let gamma = |isotope: &Option<String>, who: &crate::core::models::spin::SpinLabel| {
                isotope
                    .as_deref()
                    .and_then(gyromagnetic_ratio)
                    .ok_or_else(|| EngineError::Validation(format!("spin {who} has no known isotope")))
            };
            let constant = rdc_constant(
                gamma(&spin1.isotope, &spin1.label)?,
                gamma(&spin2.isotope, &spin2.label)?,
                interatom.distance,
            );
            rows.sort_by_key(|row| row.alignment);
            rdc_rows.extend(rows);
            rdc_sites.push(RdcSite {
                interatom: interatom_id,
                label,
                unit: interatom.vector,
                constant,
            });
        }

        let has_reduced = alignments.iter().any(|a| a.reduced.is_some());
        if pcs_rows.is_empty() && rdc_rows.is_empty() && !has_reduced {
            return Err(EngineError::Validation(
                "the data bundle holds no observations".to_string(),
            ));
        }

        debug!(
            alignments = alignments.len(),
            pcs = pcs_rows.len(),
            rdc = rdc_rows.len(),
            "Flattened data bundle."
        );
        Ok(Self {
            alignments,
            pcs_sites,
            rdc_sites,
            pcs_rows,
            rdc_rows,
            initial_tensors,
        })
    }

    pub fn alignment_count(&self) -> usize {
        self.alignments.len()
    }

    pub fn pcs_count(&self) -> usize {
        self.pcs_rows.len()
    }

    pub fn rdc_count(&self) -> usize {
        self.rdc_rows.len()
    }

    /// Number of scalar observations entering chi-squared.
    pub fn observation_count(&self) -> usize {
        let reduced = self.alignments.iter().filter(|a| a.reduced.is_some()).count();
        self.pcs_count() + self.rdc_count() + 5 * reduced
    }

    pub fn has_pcs(&self) -> bool {
        !self.pcs_rows.is_empty()
    }

    pub fn initial_tensors(&self) -> &[AlignmentTensor] {
        &self.initial_tensors
    }

    pub fn alignment_id(&self, index: usize) -> Option<AlignId> {
        self.alignments.get(index).map(|a| a.id)
    }

    pub fn observed(&self) -> ObservedValues {
        ObservedValues {
            pcs: self.pcs_rows.iter().map(|r| r.value).collect(),
            rdc: self.rdc_rows.iter().map(|r| r.value).collect(),
            reduced: self
                .alignments
                .iter()
                .map(|a| a.reduced.map(|r| r.tensor.to_array()))
                .collect(),
        }
    }

    /// Rejects pivots far outside the structure.
    pub fn check_pivot(&self, pivot: &Vector3<f64>) -> Result<(), EngineError> {
        if pivot.iter().any(|x| !x.is_finite()) {
            return Err(EngineError::Validation("pivot is not finite".to_string()));
        }
        if self.pcs_sites.is_empty() {
            return Ok(());
        }
        let centroid = self
            .pcs_sites
            .iter()
            .fold(Vector3::zeros(), |acc, s| acc + s.position)
            / self.pcs_sites.len() as f64;
        let distance = (pivot - centroid).norm();
        if distance > MAX_PIVOT_DISTANCE {
            return Err(EngineError::Constraint(format!(
                "pivot lies {distance:.1} A from the centroid of the observed spins"
            )));
        }
        Ok(())
    }

    /// Copy keeping the PCS rows of every `stride`-th site, for cheap early refinement.
    pub(crate) fn pcs_subset(&self, stride: usize) -> Self {
        let stride = stride.max(1);
        let mut subset = self.clone();
        subset.pcs_rows.retain(|row| row.site % stride == 0);
        subset
    }
}

fn check_error(error: f64, what: impl FnOnce() -> String) -> Result<(), EngineError> {
    if error > 0.0 && error.is_finite() {
        Ok(())
    } else {
        Err(EngineError::Validation(format!(
            "{} has a non-positive error {error}",
            what()
        )))
    }
}
