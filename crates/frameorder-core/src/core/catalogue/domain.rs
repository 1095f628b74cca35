//! Sampling domains of the motional models.
//!
//! Quasi-random points in the unit hypercube are mapped onto tilt-torsion or rotor angles
//! and then accepted or rejected against the model's amplitudes. Accepted points are
//! returned as rotations in the motional eigenframe.

use super::Motion;
use crate::core::geometry::rotation::{rotation_x, rotation_y, rotation_z};
use crate::core::geometry::{TiltTorsion, frame_shift, tilt_torsion_to_matrix};
use nalgebra::Matrix3;
use std::f64::consts::{PI, TAU};

/// Cone edge of the pseudo-ellipse at azimuth `phi`.
///
/// Returns zero when either half-angle vanishes, since the ellipse then has no interior.
pub fn pseudo_ellipse_theta_max(phi: f64, theta_x: f64, theta_y: f64) -> f64 {
    if theta_x == 0.0 || theta_y == 0.0 {
        return 0.0;
    }
    let x = phi.cos() / theta_x;
    let y = phi.sin() / theta_y;
    1.0 / (x * x + y * y).sqrt()
}

/// A single accepted sample of the motion.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleRotation {
    Single(Matrix3<f64>),
    /// Two stacked rotors: `first` about the eigenframe y axis, `second` about the x axis.
    /// The combined rotation is `second * first`.
    Double {
        first: Matrix3<f64>,
        second: Matrix3<f64>,
    },
}

impl SampleRotation {
    /// Number of quasi-random coordinates one sample consumes.
    pub fn dimensions(motion: &Motion) -> usize {
        match motion {
            Motion::Rigid => 0,
            Motion::Rotor { .. } => 1,
            Motion::IsoCone { sigma_max, .. } | Motion::PseudoEllipse { sigma_max, .. } => {
                if sigma_max.is_some() { 3 } else { 2 }
            }
            Motion::DoubleRotor { .. } => 2,
        }
    }

    /// Maps a point of the unit hypercube onto the motion, returning `None` if it falls
    /// outside the model's domain.
    pub fn from_unit(motion: &Motion, u: &[f64]) -> Option<Self> {
        let azimuth = |x: f64| TAU * x - PI;
        match *motion {
            Motion::Rigid => Some(SampleRotation::Single(Matrix3::identity())),
            Motion::Rotor { sigma_max } => {
                let sigma = azimuth(u[0]);
                (sigma.abs() <= sigma_max).then(|| SampleRotation::Single(rotation_z(sigma)))
            }
            Motion::IsoCone {
                theta_max,
                sigma_max,
            } => {
                let angles = tilt_torsion_from_unit(u, sigma_max.is_some());
                let inside = angles.theta <= theta_max
                    && sigma_max.is_none_or(|s| angles.sigma.abs() <= s);
                inside.then(|| SampleRotation::Single(tilt_torsion_to_matrix(angles)))
            }
            Motion::PseudoEllipse {
                theta_x,
                theta_y,
                sigma_max,
            } => {
                let angles = tilt_torsion_from_unit(u, sigma_max.is_some());
                let edge = pseudo_ellipse_theta_max(angles.phi, theta_x, theta_y);
                let inside =
                    angles.theta <= edge && sigma_max.is_none_or(|s| angles.sigma.abs() <= s);
                inside.then(|| SampleRotation::Single(tilt_torsion_to_matrix(angles)))
            }
            Motion::DoubleRotor {
                sigma_max,
                sigma_max_2,
            } => {
                let pinned = |x: f64, limit: f64| if limit == 0.0 { 0.0 } else { azimuth(x) };
                let sigma_1 = pinned(u[0], sigma_max);
                let sigma_2 = pinned(u[1], sigma_max_2);
                (sigma_1.abs() <= sigma_max && sigma_2.abs() <= sigma_max_2).then(|| {
                    SampleRotation::Double {
                        first: rotation_y(sigma_1),
                        second: rotation_x(sigma_2),
                    }
                })
            }
        }
    }

    /// The full motional rotation `R`.
    pub fn rotation(&self) -> Matrix3<f64> {
        match self {
            SampleRotation::Single(r) => *r,
            SampleRotation::Double { first, second } => second * first,
        }
    }

    /// Re-expresses the sample in the reference frame via `E R E^T`.
    pub fn in_frame(&self, eigenframe: &Matrix3<f64>) -> Self {
        match self {
            SampleRotation::Single(r) => SampleRotation::Single(frame_shift(eigenframe, r)),
            SampleRotation::Double { first, second } => SampleRotation::Double {
                first: frame_shift(eigenframe, first),
                second: frame_shift(eigenframe, second),
            },
        }
    }
}

fn tilt_torsion_from_unit(u: &[f64], with_torsion: bool) -> TiltTorsion {
    TiltTorsion {
        phi: TAU * u[0] - PI,
        theta: (2.0 * u[1] - 1.0).clamp(-1.0, 1.0).acos(),
        sigma: if with_torsion { TAU * u[2] - PI } else { 0.0 },
    }
}
