//! # Core Module
//!
//! Stateless building blocks of the frame-order analysis.
//!
//! ## Architecture
//!
//! - **Geometry** ([`geometry`]) - Rotation constructors and decompositions, Kronecker
//!   products of rotations, uniform SO(3) sampling and point-to-axis projection
//! - **Model Catalogue** ([`catalogue`]) - The closed set of motional models, their
//!   amplitudes, sampling domains and analytic frame-order matrices
//! - **Integration** ([`integration`]) - Sobol' sequences, adaptive Gauss-Kronrod quadrature
//!   and the PCS/RDC kernels evaluated at each sample
//! - **Data Models** ([`models`]) - Spins, interatomic vectors, alignments and the data bundle
//!   that owns them
//! - **Physics** ([`physics`]) - Physical constants and the PCS/RDC prefactors
//!
//! Nothing in this layer holds optimisation state. Every function is deterministic given
//! its inputs, apart from the explicitly seeded random samplers.

pub mod catalogue;
pub mod geometry;
pub mod integration;
pub mod models;
pub mod physics;
