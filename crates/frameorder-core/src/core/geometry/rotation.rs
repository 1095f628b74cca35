use super::GeometryError;
use nalgebra::{Matrix3, Rotation3, Unit, Vector3};
use std::f64::consts::{PI, TAU};

const AXIS_EPSILON: f64 = 1e-14;
const GIMBAL_EPSILON: f64 = 1e-12;

/// Euler angles in the ZYZ convention.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EulerZyz {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
}

impl EulerZyz {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self { alpha, beta, gamma }
    }

    pub fn from_array(angles: [f64; 3]) -> Self {
        Self::new(angles[0], angles[1], angles[2])
    }

    pub fn to_array(self) -> [f64; 3] {
        [self.alpha, self.beta, self.gamma]
    }

    /// Re-expresses the angles in their standard ranges (`alpha, gamma` in [0, 2pi), `beta` in [0, pi]).
    pub fn wrapped(self) -> Result<Self, GeometryError> {
        matrix_to_euler(&euler_to_matrix(self)?)
    }
}

/// Tilt-torsion angles: `phi` is the azimuth of the tilt axis, `theta` the tilt and `sigma` the torsion.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TiltTorsion {
    pub phi: f64,
    pub theta: f64,
    pub sigma: f64,
}

pub fn rotation_z(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, -s, 0.0, s, c, 0.0, 0.0, 0.0, 1.0)
}

pub fn rotation_y(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(c, 0.0, s, 0.0, 1.0, 0.0, -s, 0.0, c)
}

pub fn rotation_x(angle: f64) -> Matrix3<f64> {
    let (s, c) = angle.sin_cos();
    Matrix3::new(1.0, 0.0, 0.0, 0.0, c, -s, 0.0, s, c)
}

pub fn axis_angle_to_matrix(axis: &Vector3<f64>, angle: f64) -> Result<Matrix3<f64>, GeometryError> {
    if !angle.is_finite() || axis.iter().any(|x| !x.is_finite()) {
        return Err(GeometryError::NonFinite("axis-angle rotation"));
    }
    let norm = axis.norm();
    if norm < AXIS_EPSILON {
        return Err(GeometryError::ZeroAxis);
    }
    let unit = Unit::new_unchecked(axis / norm);
    Ok(Rotation3::from_axis_angle(&unit, angle).into_inner())
}

pub fn euler_to_matrix(angles: EulerZyz) -> Result<Matrix3<f64>, GeometryError> {
    if !(angles.alpha.is_finite() && angles.beta.is_finite() && angles.gamma.is_finite()) {
        return Err(GeometryError::NonFinite("Euler angles"));
    }
    Ok(rotation_z(angles.alpha) * rotation_y(angles.beta) * rotation_z(angles.gamma))
}

pub fn matrix_to_euler(r: &Matrix3<f64>) -> Result<EulerZyz, GeometryError> {
    ensure_finite(r, "rotation matrix")?;
    let beta = r[(2, 2)].clamp(-1.0, 1.0).acos();

    let (alpha, gamma) = if beta.sin() > GIMBAL_EPSILON {
        (r[(1, 2)].atan2(r[(0, 2)]), r[(2, 1)].atan2(-r[(2, 0)]))
    } else if r[(2, 2)] > 0.0 {
        (0.0, r[(1, 0)].atan2(r[(0, 0)]))
    } else {
        (0.0, r[(0, 1)].atan2(-r[(0, 0)]))
    };

    Ok(EulerZyz {
        alpha: wrap_angle(alpha, 0.0, TAU),
        beta,
        gamma: wrap_angle(gamma, 0.0, TAU),
    })
}

pub fn tilt_torsion_to_matrix(angles: TiltTorsion) -> Matrix3<f64> {
    rotation_z(angles.phi) * rotation_y(angles.theta) * rotation_z(angles.sigma - angles.phi)
}

/// Decomposes a rotation into tilt-torsion angles with `theta` in [0, pi] and `phi`, `sigma` in [-pi, pi].
///
/// When the tilt vanishes (or is a half turn) the azimuth is undefined and is reported as zero.
pub fn matrix_to_tilt_torsion(r: &Matrix3<f64>) -> Result<TiltTorsion, GeometryError> {
    ensure_finite(r, "rotation matrix")?;
    let theta = r[(2, 2)].clamp(-1.0, 1.0).acos();

    let (phi, sigma) = if theta.sin() > GIMBAL_EPSILON {
        let phi = r[(1, 2)].atan2(r[(0, 2)]);
        let gamma = r[(2, 1)].atan2(-r[(2, 0)]);
        (phi, gamma + phi)
    } else if r[(2, 2)] > 0.0 {
        (0.0, r[(1, 0)].atan2(r[(0, 0)]))
    } else {
        (0.0, r[(0, 1)].atan2(-r[(0, 0)]))
    };

    Ok(TiltTorsion {
        phi: wrap_angle(phi, -PI, PI),
        theta,
        sigma: wrap_angle(sigma, -PI, PI),
    })
}

/// Wraps `angle` into the full-turn window `[lower, upper)`, where `upper - lower` is 2pi.
pub fn wrap_angle(angle: f64, lower: f64, upper: f64) -> f64 {
    debug_assert!((upper - lower - TAU).abs() < 1e-9);
    lower + (angle - lower).rem_euclid(TAU)
}

/// Moves a rotation defined in an eigenframe back into the reference frame: `E R' E^T`.
pub fn frame_shift(eigenframe: &Matrix3<f64>, rotation: &Matrix3<f64>) -> Matrix3<f64> {
    eigenframe * rotation * eigenframe.transpose()
}

fn ensure_finite(r: &Matrix3<f64>, what: &'static str) -> Result<(), GeometryError> {
    if r.iter().all(|x| x.is_finite()) {
        Ok(())
    } else {
        Err(GeometryError::NonFinite(what))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOLERANCE: f64 = 1e-12;

    fn matrices_approx_equal(a: &Matrix3<f64>, b: &Matrix3<f64>) -> bool {
        (a - b).abs().max() < TOLERANCE
    }

    #[test]
    fn axis_angle_about_z_matches_elementary_rotation() {
        let r = axis_angle_to_matrix(&Vector3::new(0.0, 0.0, 2.0), 0.7).unwrap();
        assert!(matrices_approx_equal(&r, &rotation_z(0.7)));
    }

    #[test]
    fn axis_angle_rejects_zero_axis() {
        let result = axis_angle_to_matrix(&Vector3::zeros(), 0.3);
        assert_eq!(result, Err(GeometryError::ZeroAxis));
    }

    #[test]
    fn axis_angle_rejects_non_finite_angle() {
        let result = axis_angle_to_matrix(&Vector3::x(), f64::NAN);
        assert!(matches!(result, Err(GeometryError::NonFinite(_))));
    }

    #[test]
    fn euler_round_trip_recovers_angles_in_standard_ranges() {
        let angles = EulerZyz::new(1.2, 0.8, 4.0);
        let r = euler_to_matrix(angles).unwrap();
        let back = matrix_to_euler(&r).unwrap();
        assert!((back.alpha - 1.2).abs() < TOLERANCE);
        assert!((back.beta - 0.8).abs() < TOLERANCE);
        assert!((back.gamma - 4.0).abs() < TOLERANCE);
    }

    #[test]
    fn euler_wrapping_preserves_the_rotation() {
        let angles = EulerZyz::new(-1.0, -0.5, 9.0);
        let wrapped = angles.wrapped().unwrap();
        assert!(wrapped.beta >= 0.0 && wrapped.beta <= PI);
        assert!(wrapped.alpha >= 0.0 && wrapped.alpha < TAU);
        assert!(wrapped.gamma >= 0.0 && wrapped.gamma < TAU);
        assert!(matrices_approx_equal(
            &euler_to_matrix(angles).unwrap(),
            &euler_to_matrix(wrapped).unwrap()
        ));
    }

    #[test]
    fn euler_decomposition_handles_zero_beta() {
        let r = euler_to_matrix(EulerZyz::new(0.4, 0.0, 0.5)).unwrap();
        let back = matrix_to_euler(&r).unwrap();
        assert!(matrices_approx_equal(&euler_to_matrix(back).unwrap(), &r));
    }

    #[test]
    fn tilt_torsion_round_trip_is_identity() {
        let angles = TiltTorsion {
            phi: -2.1,
            theta: 0.9,
            sigma: 1.3,
        };
        let back = matrix_to_tilt_torsion(&tilt_torsion_to_matrix(angles)).unwrap();
        assert!((back.phi - angles.phi).abs() < TOLERANCE);
        assert!((back.theta - angles.theta).abs() < TOLERANCE);
        assert!((back.sigma - angles.sigma).abs() < TOLERANCE);
    }

    #[test]
    fn tilt_torsion_round_trip_wraps_torsion() {
        let angles = TiltTorsion {
            phi: 0.5,
            theta: 0.3,
            sigma: 3.0 + PI,
        };
        let back = matrix_to_tilt_torsion(&tilt_torsion_to_matrix(angles)).unwrap();
        assert!((back.sigma - (3.0 - PI)).abs() < 1e-10);
    }

    #[test]
    fn tilt_torsion_without_tilt_is_pure_torsion() {
        let r = tilt_torsion_to_matrix(TiltTorsion {
            phi: 0.0,
            theta: 0.0,
            sigma: 0.6,
        });
        assert!(matrices_approx_equal(&r, &rotation_z(0.6)));
        let back = matrix_to_tilt_torsion(&r).unwrap();
        assert_eq!(back.phi, 0.0);
        assert!((back.sigma - 0.6).abs() < TOLERANCE);
    }

    #[test]
    fn tilt_torsion_decomposition_handles_half_turn_tilt() {
        let r = rotation_y(PI) * rotation_z(0.4);
        let back = matrix_to_tilt_torsion(&r).unwrap();
        assert!((back.theta - PI).abs() < 1e-7);
        assert!(matrices_approx_equal(&tilt_torsion_to_matrix(back), &r));
    }

    #[test]
    fn wrap_angle_maps_into_window() {
        assert!((wrap_angle(TAU + 0.25, -PI, PI) - 0.25).abs() < TOLERANCE);
        assert!((wrap_angle(-0.5, 0.0, TAU) - (TAU - 0.5)).abs() < TOLERANCE);
        assert!((wrap_angle(0.25, -PI, PI) - 0.25).abs() < TOLERANCE);
    }

    #[test]
    fn frame_shift_with_identity_eigenframe_is_noop() {
        let r = rotation_x(0.3);
        assert!(matrices_approx_equal(&frame_shift(&Matrix3::identity(), &r), &r));
    }
}
