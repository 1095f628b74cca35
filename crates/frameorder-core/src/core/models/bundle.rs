use super::alignment::Alignment;
use super::ids::{AlignId, InteratomId, SpinId};
use super::interatom::Interatom;
use super::spin::Spin;
use slotmap::SlotMap;

/// All observations of one caller session, stored in flat arenas.
///
/// Records refer to each other only through their keys. Insertion order is recorded
/// separately so that alignments, spins and vectors have a stable index once the bundle
/// is flattened by the engine.
#[derive(Debug, Clone, Default)]
pub struct DataBundle {
    spins: SlotMap<SpinId, Spin>,
    interatoms: SlotMap<InteratomId, Interatom>,
    alignments: SlotMap<AlignId, Alignment>,
    spin_order: Vec<SpinId>,
    interatom_order: Vec<InteratomId>,
    alignment_order: Vec<AlignId>,
}

impl DataBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_alignment(&mut self, alignment: Alignment) -> AlignId {
        let id = self.alignments.insert(alignment);
        self.alignment_order.push(id);
        id
    }

    pub fn add_spin(&mut self, spin: Spin) -> SpinId {
        let id = self.spins.insert(spin);
        self.spin_order.push(id);
        id
    }

    /// Adds an interatomic vector.
    ///
    /// # Return
    ///
    /// Returns `None` if either spin of the pair is not part of this bundle.
    pub fn add_interatom(&mut self, interatom: Interatom) -> Option<InteratomId> {
        if !self.spins.contains_key(interatom.spin1) || !self.spins.contains_key(interatom.spin2) {
            return None;
        }
        let id = self.interatoms.insert(interatom);
        self.interatom_order.push(id);
        Some(id)
    }

    pub fn spin(&self, id: SpinId) -> Option<&Spin> {
        self.spins.get(id)
    }

    pub fn spin_mut(&mut self, id: SpinId) -> Option<&mut Spin> {
        self.spins.get_mut(id)
    }

    pub fn interatom(&self, id: InteratomId) -> Option<&Interatom> {
        self.interatoms.get(id)
    }

    pub fn interatom_mut(&mut self, id: InteratomId) -> Option<&mut Interatom> {
        self.interatoms.get_mut(id)
    }

    pub fn alignment(&self, id: AlignId) -> Option<&Alignment> {
        self.alignments.get(id)
    }

    pub fn alignment_mut(&mut self, id: AlignId) -> Option<&mut Alignment> {
        self.alignments.get_mut(id)
    }

    /// Spins in insertion order.
    pub fn spins(&self) -> impl Iterator<Item = (SpinId, &Spin)> {
        self.spin_order.iter().map(|&id| (id, &self.spins[id]))
    }

    /// Interatomic vectors in insertion order.
    pub fn interatoms(&self) -> impl Iterator<Item = (InteratomId, &Interatom)> {
        self.interatom_order
            .iter()
            .map(|&id| (id, &self.interatoms[id]))
    }

    /// Alignments in insertion order.
    pub fn alignments(&self) -> impl Iterator<Item = (AlignId, &Alignment)> {
        self.alignment_order
            .iter()
            .map(|&id| (id, &self.alignments[id]))
    }

    pub fn alignment_ids(&self) -> &[AlignId] {
        &self.alignment_order
    }

    pub fn spin_count(&self) -> usize {
        self.spin_order.len()
    }

    pub fn interatom_count(&self) -> usize {
        self.interatom_order.len()
    }

    pub fn alignment_count(&self) -> usize {
        self.alignment_order.len()
    }
}
