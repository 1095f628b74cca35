//! Ensembles of moving-domain orientations consistent with a fitted model.
//!
//! Each motional mode owns a state rotation about its own pivot. A pose is the list of
//! mode rotations, applied in order. The double rotor has two modes (about eigenframe
//! y through the pivot, then about eigenframe x through the second pivot); every other
//! model has one.

use super::config::{DistributionConfig, DistributionMethod};
use super::error::EngineError;
use super::state::FrameOrderModel;
use crate::core::catalogue::{Motion, pseudo_ellipse_theta_max};
use crate::core::geometry::{
    TiltTorsion, axis_angle_to_matrix, matrix_to_tilt_torsion, random_rotation, random_unit_vector,
    tilt_torsion_to_matrix,
};
use nalgebra::{Matrix3, Vector3};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModeRotation {
    pub rotation: Matrix3<f64>,
    pub pivot: Vector3<f64>,
}

/// One member of an ensemble.
#[derive(Debug, Clone, PartialEq)]
pub struct DomainPose {
    pub modes: Vec<ModeRotation>,
}

impl DomainPose {
    /// Moves a moving-domain position (already at the average position) into this pose.
    pub fn apply(&self, x: &Vector3<f64>) -> Vector3<f64> {
        self.modes
            .iter()
            .fold(*x, |x, mode| mode.rotation * (x - mode.pivot) + mode.pivot)
    }

    /// Net rotation of the pose, ignoring the pivot translations.
    pub fn rotation(&self) -> Matrix3<f64> {
        self.modes
            .iter()
            .fold(Matrix3::identity(), |acc, mode| mode.rotation * acc)
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ensemble {
    pub poses: Vec<DomainPose>,
    pub warnings: Vec<String>,
}

impl Ensemble {
    pub fn len(&self) -> usize {
        self.poses.len()
    }

    pub fn is_empty(&self) -> bool {
        self.poses.is_empty()
    }

    /// Coordinates of `positions` in every pose of the ensemble.
    pub fn apply(&self, positions: &[Vector3<f64>]) -> Vec<Vec<Vector3<f64>>> {
        self.poses
            .iter()
            .map(|pose| positions.iter().map(|x| pose.apply(x)).collect())
            .collect()
    }
}

/// Rotates `positions` about `pivot` by each rotation, one structure per rotation.
pub fn apply_to_positions(
    rotations: &[Matrix3<f64>],
    pivot: &Vector3<f64>,
    positions: &[Vector3<f64>],
) -> Vec<Vec<Vector3<f64>>> {
    rotations
        .iter()
        .map(|r| positions.iter().map(|x| r * (x - pivot) + pivot).collect())
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum TiltLimit {
    None,
    Cone(f64),
    Ellipse { theta_x: f64, theta_y: f64 },
}

/// The domain of one motional mode, expressed in a frame whose z axis is the mode axis.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Mode {
    frame: Matrix3<f64>,
    pivot: Vector3<f64>,
    tilt: TiltLimit,
    sigma_max: Option<f64>,
}

impl Mode {
    fn axis(&self) -> Vector3<f64> {
        self.frame.column(2).into_owned()
    }

    fn angles(&self, state: &Matrix3<f64>) -> Result<TiltTorsion, EngineError> {
        Ok(matrix_to_tilt_torsion(&(self.frame.transpose() * state * self.frame))?)
    }

    fn theta_max(&self, phi: f64) -> Option<f64> {
        match self.tilt {
            TiltLimit::None => None,
            TiltLimit::Cone(theta) => Some(theta),
            TiltLimit::Ellipse { theta_x, theta_y } => Some(pseudo_ellipse_theta_max(phi, theta_x, theta_y)),
        }
    }

    /// `state` pulled back onto the edge of the domain where it lies outside.
    fn clamp(&self, state: &Matrix3<f64>) -> Result<Matrix3<f64>, EngineError> {
        let TiltTorsion { mut phi, mut theta, mut sigma } = self.angles(state)?;
        match self.theta_max(phi) {
            Some(limit) => theta = theta.min(limit),
            None => {
                theta = 0.0;
                phi = 0.0;
            }
        }
        sigma = match self.sigma_max {
            Some(limit) => sigma.clamp(-limit, limit),
            None => 0.0,
        };
        let local = tilt_torsion_to_matrix(TiltTorsion { phi, theta, sigma });
        Ok(self.frame * local * self.frame.transpose())
    }

    /// Whether `state` lies inside the domain, together with its projection onto the modelled
    /// degrees of freedom.
    fn contains(&self, state: &Matrix3<f64>) -> Result<(bool, Matrix3<f64>), EngineError> {
        let TiltTorsion { mut phi, mut theta, mut sigma } = self.angles(state)?;
        let mut inside = true;
        match self.theta_max(phi) {
            Some(limit) => inside &= theta <= limit,
            None => {
                theta = 0.0;
                phi = 0.0;
            }
        }
        match self.sigma_max {
            Some(limit) => inside &= sigma.abs() <= limit,
            None => sigma = 0.0,
        }
        let local = tilt_torsion_to_matrix(TiltTorsion { phi, theta, sigma });
        Ok((inside, self.frame * local * self.frame.transpose()))
    }
}

fn modes(model: &FrameOrderModel) -> Result<Vec<Mode>, EngineError> {
    let motion = model.motion()?;
    let eigen = model.eigenframe_matrix()?;
    let pivot = model.pivot.point;
    let single = |tilt, sigma_max| {
        vec![Mode {
            frame: eigen,
            pivot,
            tilt,
            sigma_max,
        }]
    };
    let modes = match motion {
        Motion::Rigid => {
            return Err(EngineError::Validation(
                "a rigid model has no motion to distribute".to_string(),
            ));
        }
        Motion::Rotor { sigma_max } => single(TiltLimit::None, Some(sigma_max)),
        Motion::IsoCone { theta_max, sigma_max } => single(TiltLimit::Cone(theta_max), sigma_max),
        Motion::PseudoEllipse {
            theta_x,
            theta_y,
            sigma_max,
        } => single(TiltLimit::Ellipse { theta_x, theta_y }, sigma_max),
        Motion::DoubleRotor {
            sigma_max,
            sigma_max_2,
        } => {
            let x = eigen.column(0).into_owned();
            let y = eigen.column(1).into_owned();
            let z = eigen.column(2).into_owned();
            vec![
                Mode {
                    frame: Matrix3::from_columns(&[z, x, y]),
                    pivot,
                    tilt: TiltLimit::None,
                    sigma_max: Some(sigma_max),
                },
                Mode {
                    frame: Matrix3::from_columns(&[y, z, x]),
                    pivot: model.second_pivot(),
                    tilt: TiltLimit::None,
                    sigma_max: Some(sigma_max_2),
                },
            ]
        }
    };
    Ok(modes)
}

fn pose(modes: &[Mode], states: &[Matrix3<f64>]) -> DomainPose {
    DomainPose {
        modes: modes
            .iter()
            .zip(states)
            .map(|(mode, rotation)| ModeRotation {
                rotation: *rotation,
                pivot: mode.pivot,
            })
            .collect(),
    }
}

/// Pseudo-Brownian walk: every step turns each mode by `step_angle` about a random axis and
/// clamps it back into the domain. A pose is recorded every `snapshot` steps, starting from
/// the unrotated state, until `total` poses exist.
fn brownian(
    modes: &[Mode],
    step_angle: f64,
    snapshot: usize,
    total: usize,
    rng: &mut StdRng,
) -> Result<Ensemble, EngineError> {
    if snapshot == 0 {
        return Err(EngineError::Validation(
            "the snapshot interval must be at least one step".to_string(),
        ));
    }
    let mut ensemble = Ensemble::default();
    if total == 0 {
        return Ok(ensemble);
    }
    let mut states = vec![Matrix3::identity(); modes.len()];
    ensemble.poses.push(pose(modes, &states));

    let mut step = 0;
    while ensemble.poses.len() < total {
        for (mode, state) in modes.iter().zip(states.iter_mut()) {
            let kick = axis_angle_to_matrix(&random_unit_vector(rng), step_angle)?;
            *state = mode.clamp(&(kick * *state))?;
        }
        step += 1;
        if step == snapshot {
            ensemble.poses.push(pose(modes, &states));
            step = 0;
        }
    }
    Ok(ensemble)
}

/// Rejection sampling of uniform rotations, giving up after `max_rotations` draws.
fn uniform(
    modes: &[Mode],
    total: usize,
    max_rotations: usize,
    rng: &mut StdRng,
) -> Result<Ensemble, EngineError> {
    let mut ensemble = Ensemble::default();
    if total == 0 {
        return Ok(ensemble);
    }
    ensemble
        .poses
        .push(pose(modes, &vec![Matrix3::identity(); modes.len()]));

    let mut draws = 0;
    let mut states = Vec::with_capacity(modes.len());
    while ensemble.poses.len() < total {
        if draws >= max_rotations {
            let message = format!(
                "Maximum number of rotations reached; the distribution only contains {} states.",
                ensemble.poses.len()
            );
            warn!("{message}");
            ensemble.warnings.push(message);
            break;
        }
        draws += 1;

        states.clear();
        let mut inside = true;
        for mode in modes {
            let (accepted, projected) = mode.contains(&random_rotation(rng))?;
            inside &= accepted;
            states.push(projected);
        }
        if inside {
            ensemble.poses.push(pose(modes, &states));
        }
    }
    Ok(ensemble)
}

/// Sweep angles from `-amplitude` to `amplitude`.
fn sweep_angles(amplitude: f64, increment: f64, total: Option<usize>, reverse: bool, mirror: bool) -> Vec<f64> {
    let linspace = |n: usize| -> Vec<f64> {
        match n {
            0 => Vec::new(),
            1 => vec![-amplitude],
            _ => (0..n)
                .map(|i| -amplitude + 2.0 * amplitude * i as f64 / (n - 1) as f64)
                .collect(),
        }
    };
    let mut angles = if amplitude == 0.0 || total == Some(1) {
        vec![0.0]
    } else if let Some(total) = total {
        linspace(if mirror { total / 2 + 1 } else { total })
    } else {
        let steps = if increment > 0.0 { (amplitude / increment) as usize } else { 0 };
        match linspace(steps) {
            angles if angles.is_empty() => vec![-amplitude, 0.0, amplitude],
            angles => angles,
        }
    };
    if reverse {
        angles.reverse();
    }
    if mirror {
        let back: Vec<f64> = angles.iter().rev().skip(1).copied().collect();
        angles.extend(back);
    }
    angles
}

/// Amplitude of each linear mode: the tilt half-angles about the two perpendicular axes
/// and the torsion about the mode axis.
fn linear_modes(mode: &Mode) -> Vec<(Vector3<f64>, f64)> {
    let (x, y) = (mode.frame.column(0).into_owned(), mode.frame.column(1).into_owned());
    let mut out = Vec::new();
    match mode.tilt {
        TiltLimit::None => {}
        TiltLimit::Cone(theta) => {
            out.push((x, theta));
            out.push((y, theta));
        }
        // Tilting towards x turns about y.
        TiltLimit::Ellipse { theta_x, theta_y } => {
            out.push((y, theta_x));
            out.push((x, theta_y));
        }
    }
    if let Some(sigma) = mode.sigma_max {
        out.push((mode.axis(), sigma));
    }
    out
}

fn mode_sweep(
    modes: &[Mode],
    increment: f64,
    total: Option<usize>,
    reverse: bool,
    mirror: bool,
) -> Result<Ensemble, EngineError> {
    let mut ensemble = Ensemble::default();
    for mode in modes {
        for (axis, amplitude) in linear_modes(mode) {
            for angle in sweep_angles(amplitude, increment, total, reverse, mirror) {
                ensemble.poses.push(DomainPose {
                    modes: vec![ModeRotation {
                        rotation: axis_angle_to_matrix(&axis, angle)?,
                        pivot: mode.pivot,
                    }],
                });
            }
        }
    }
    Ok(ensemble)
}

/// Generates an ensemble for `model` with the method of `config`.
pub fn distribute(model: &FrameOrderModel, config: &DistributionConfig) -> Result<Ensemble, EngineError> {
    let modes = modes(model)?;
    let mut rng = StdRng::seed_from_u64(config.seed);
    let ensemble = match config.method {
        DistributionMethod::Brownian {
            step_angle,
            snapshot,
            total,
        } => brownian(&modes, step_angle, snapshot, total, &mut rng)?,
        DistributionMethod::Uniform { total, max_rotations } => uniform(&modes, total, max_rotations, &mut rng)?,
        DistributionMethod::Modes {
            increment,
            total,
            reverse,
            mirror,
        } => mode_sweep(&modes, increment, total, reverse, mirror)?,
    };
    info!(
        model = model.kind.name(),
        poses = ensemble.len(),
        "Distribution generated."
    );
    Ok(ensemble)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalogue::{Amplitudes, ModelKind};
    use crate::core::geometry::EulerZyz;
    use std::f64::consts::PI;

    const TOLERANCE: f64 = 1e-9;

    fn cone(theta: f64, sigma: f64) -> FrameOrderModel {
        FrameOrderModel::new(ModelKind::IsoCone, Vector3::new(1.0, 2.0, 3.0))
            .with_eigenframe(EulerZyz::new(0.3, 0.8, -0.2))
            .with_amplitudes(Amplitudes {
                cone_theta: theta,
                cone_sigma_max: sigma,
                ..Amplitudes::default()
            })
    }

    fn brownian_config(snapshot: usize, total: usize) -> DistributionConfig {
        DistributionConfig {
            method: DistributionMethod::Brownian {
                step_angle: 2f64.to_radians(),
                snapshot,
                total,
            },
            seed: 11,
        }
    }

    fn within(model: &FrameOrderModel, pose: &DomainPose) -> bool {
        let modes = modes(model).unwrap();
        pose.modes.iter().zip(&modes).all(|(m, mode)| {
            let angles = mode.angles(&m.rotation).unwrap();
            let theta_ok = mode.theta_max(angles.phi).is_none_or(|t| angles.theta <= t + TOLERANCE);
            let sigma_ok = mode.sigma_max.is_none_or(|s| angles.sigma.abs() <= s + TOLERANCE);
            theta_ok && sigma_ok
        })
    }

    #[test]
    fn brownian_walk_records_the_requested_number_of_snapshots() {
        let model = cone(0.4, 0.3);
        let ensemble = distribute(&model, &brownian_config(10, 100)).unwrap();
        assert_eq!(ensemble.len(), 100);
        assert_eq!(ensemble.poses[0].rotation(), Matrix3::identity());
        assert!(ensemble.poses.iter().all(|pose| within(&model, pose)));
    }

    #[test]
    fn brownian_walk_is_reproducible_for_a_seed() {
        let model = cone(0.4, 0.3);
        let a = distribute(&model, &brownian_config(3, 20)).unwrap();
        let b = distribute(&model, &brownian_config(3, 20)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn uniform_sampling_stays_inside_the_domain() {
        let model = cone(0.9, 1.2);
        let config = DistributionConfig {
            method: DistributionMethod::Uniform {
                total: 30,
                max_rotations: 1_000_000,
            },
            seed: 5,
        };
        let ensemble = distribute(&model, &config).unwrap();
        assert_eq!(ensemble.len(), 30);
        assert!(ensemble.warnings.is_empty());
        assert!(ensemble.poses.iter().all(|pose| within(&model, pose)));
    }

    #[test]
    fn uniform_sampling_gives_up_with_a_warning() {
        let model = cone(0.01, 0.01);
        let config = DistributionConfig {
            method: DistributionMethod::Uniform {
                total: 50,
                max_rotations: 100,
            },
            seed: 5,
        };
        let ensemble = distribute(&model, &config).unwrap();
        assert!(ensemble.len() < 50);
        assert_eq!(ensemble.warnings.len(), 1);
    }

    #[test]
    fn double_rotor_poses_turn_about_both_pivots() {
        let model = FrameOrderModel::new(ModelKind::DoubleRotor, Vector3::zeros())
            .with_second_pivot_offset(Vector3::new(0.0, 0.0, 5.0))
            .with_amplitudes(Amplitudes {
                cone_sigma_max: 0.5,
                cone_sigma_max_2: 0.2,
                ..Amplitudes::default()
            });
        let ensemble = distribute(&model, &brownian_config(2, 10)).unwrap();
        for pose in &ensemble.poses {
            assert_eq!(pose.modes.len(), 2);
            assert_eq!(pose.modes[1].pivot, Vector3::new(0.0, 0.0, 5.0));
            // First mode about y, second about x.
            assert!((pose.modes[0].rotation * Vector3::y() - Vector3::y()).norm() < TOLERANCE);
            assert!((pose.modes[1].rotation * Vector3::x() - Vector3::x()).norm() < TOLERANCE);
        }
        assert!(ensemble.poses.iter().all(|pose| within(&model, pose)));
    }

    #[test]
    fn sweep_angles_follow_reverse_and_mirror() {
        assert_eq!(sweep_angles(1.0, 0.1, Some(3), false, false), vec![-1.0, 0.0, 1.0]);
        assert_eq!(sweep_angles(1.0, 0.1, Some(3), true, false), vec![1.0, 0.0, -1.0]);
        assert_eq!(
            sweep_angles(1.0, 0.1, Some(5), false, true),
            vec![-1.0, 0.0, 1.0, 0.0, -1.0]
        );
        assert_eq!(sweep_angles(0.0, 0.1, None, false, false), vec![0.0]);
        assert_eq!(sweep_angles(0.05, 0.1, None, false, false), vec![-0.05, 0.0, 0.05]);
    }

    #[test]
    fn mode_sweep_covers_every_linear_mode() {
        let model = cone(0.4, 0.3);
        let config = DistributionConfig {
            method: DistributionMethod::Modes {
                increment: 0.1,
                total: Some(5),
                reverse: false,
                mirror: false,
            },
            seed: 0,
        };
        let ensemble = distribute(&model, &config).unwrap();
        // Two tilt modes and one torsion mode.
        assert_eq!(ensemble.len(), 15);
    }

    #[test]
    fn positions_are_rotated_about_the_pivot() {
        let pivot = Vector3::new(1.0, 0.0, 0.0);
        let quarter = axis_angle_to_matrix(&Vector3::z(), PI / 2.0).unwrap();
        let moved = apply_to_positions(&[Matrix3::identity(), quarter], &pivot, &[Vector3::new(2.0, 0.0, 0.0)]);
        assert!((moved[0][0] - Vector3::new(2.0, 0.0, 0.0)).norm() < TOLERANCE);
        assert!((moved[1][0] - Vector3::new(1.0, 1.0, 0.0)).norm() < TOLERANCE);
    }

    #[test]
    fn rigid_models_cannot_be_distributed() {
        let model = FrameOrderModel::new(ModelKind::Rigid, Vector3::zeros());
        assert!(distribute(&model, &DistributionConfig::default()).is_err());
    }
}
