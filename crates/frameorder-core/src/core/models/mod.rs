//! # Observation Data Models
//!
//! Stateless containers for everything the caller measures: observation sites (spins),
//! interatomic vectors carrying RDCs, and alignment experiments with their tensors.
//!
//! ## Overview
//!
//! The three kinds of record live in flat arenas inside a [`bundle::DataBundle`] and refer to
//! each other only through the stable keys declared in [`ids`]. Nothing here knows about
//! motional models or optimisation; the engine flattens a bundle into dense arrays once,
//! at setup time.
//!
//! ## Architecture
//!
//! - **Identifiers** ([`ids`]) - Slot-map keys for spins, interatomic vectors and alignments
//! - **Alignment tensors** ([`tensor`]) - The five-parameter symmetric traceless tensor
//! - **Spins** ([`spin`]) - Observation sites with positions and per-alignment PCS
//! - **Interatomic vectors** ([`interatom`]) - Spin pairs with unit vectors and per-alignment RDC
//! - **Alignments** ([`alignment`]) - Experiments: field, temperature, paramagnetic centre, tensors
//! - **Bundles** ([`bundle`]) - The arena holding one caller session's observations

pub mod alignment;
pub mod bundle;
pub mod ids;
pub mod interatom;
pub mod observation;
pub mod spin;
pub mod tensor;
