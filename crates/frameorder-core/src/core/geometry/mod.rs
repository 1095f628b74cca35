//! # Geometry Kernel
//!
//! Pure rotation and frame-order matrix utilities shared by every layer of the library.
//!
//! ## Overview
//!
//! All functions in this module are free of global state. They build rotations from the
//! three parameterisations used throughout frame-order analysis (axis-angle, Euler ZYZ and
//! tilt-torsion), draw uniformly distributed random rotations, form the Kronecker products
//! needed by the second-degree frame-order matrix, and solve small line-geometry problems
//! such as projecting a pivot onto a rotor axis.
//!
//! ## Conventions
//!
//! - Matrices follow the column-vector convention (`v' = R v`).
//! - Euler angles are ZYZ: `R = Rz(alpha) Ry(beta) Rz(gamma)`.
//! - Tilt-torsion angles: `R = Rz(phi) Ry(theta) Rz(sigma - phi)`.
//! - Second-degree matrices are indexed `M[3i + k, 3j + l] = <R_ij R_kl>`, the Kronecker layout.
//!
//! ## Failure Modes
//!
//! Degenerate input (a zero-length axis or non-finite numbers) is reported through
//! [`GeometryError`]; no function in this module returns an invalid rotation.

use thiserror::Error;

pub mod kronecker;
pub mod lines;
pub mod random;
pub mod rotation;

pub use kronecker::{Matrix9, kron_prod, reduce_tensor, rotate_daeg};
pub use lines::closest_point_on_axis;
pub use random::{random_rotation, random_unit_vector};
pub use rotation::{
    EulerZyz, TiltTorsion, axis_angle_to_matrix, euler_to_matrix, frame_shift, matrix_to_euler,
    matrix_to_tilt_torsion, tilt_torsion_to_matrix, wrap_angle,
};

#[derive(Debug, Error, Clone, PartialEq)]
pub enum GeometryError {
    #[error("Rotation axis has zero length")]
    ZeroAxis,
    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),
}
