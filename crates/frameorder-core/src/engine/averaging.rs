//! Motional averaging of the observables.
//!
//! RDCs and reduced tensors are obtained from the analytic second-degree frame-order
//! matrix. PCSs depend on the full spin position and are averaged numerically, either over
//! Sobol' points with rejection or with nested adaptive quadrature over the model domain.

use super::config::{IntegrationMethod, IntegrationSettings};
use super::error::EngineError;
use super::problem::Problem;
use super::state::FrameOrderModel;
use crate::core::catalogue::{Motion, SampleRotation, frame_order_matrices, pseudo_ellipse_theta_max};
use crate::core::geometry::rotation::{rotation_x, rotation_y, rotation_z};
use crate::core::geometry::{Matrix9, TiltTorsion, reduce_tensor, tilt_torsion_to_matrix};
use crate::core::integration::kernels;
use crate::core::integration::quadrature::{QuadratureTolerance, integrate};
use crate::core::integration::sobol::SobolSequence;
use crate::core::models::alignment::TensorFrame;
use crate::core::models::tensor::AlignmentTensor;
use nalgebra::{DVector, Matrix3, Vector3};
use std::f64::consts::PI;
use tracing::{trace, warn};

/// Averaged observables in the row order of the [`Problem`].
#[derive(Debug, Clone, PartialEq)]
pub struct BackCalculation {
    pub pcs: Vec<f64>,
    pub rdc: Vec<f64>,
    /// Model-reduced tensor per alignment, for alignments carrying a measured one.
    pub reduced: Vec<Option<AlignmentTensor>>,
    /// Sobol' points accepted for the PCS average, if one was taken.
    pub accepted_points: Option<usize>,
}

/// Vector from the paramagnetic centre to a spin, split around the motion:
/// `r = transport(arm) + offset`.
#[derive(Debug, Clone, Copy)]
struct PcsArm {
    arm: Vector3<f64>,
    offset: Vector3<f64>,
    /// Inter-pivot vector added between the two rotor modes.
    link: Vector3<f64>,
    /// Spins see `R` instead of `R^T` when the tensor rides on the moving domain.
    inverse: bool,
    tensor: Matrix3<f64>,
    constant: f64,
}

impl PcsArm {
    #[inline]
    fn rigid(&self) -> Vector3<f64> {
        self.arm + self.offset
    }

    #[inline]
    fn transported(&self, sample: &SampleRotation) -> Vector3<f64> {
        let moved = match (sample, self.inverse) {
            (SampleRotation::Single(r), false) => r.tr_mul(&self.arm),
            (SampleRotation::Single(r), true) => r * self.arm,
            (SampleRotation::Double { first, second }, false) => {
                first.tr_mul(&(second.tr_mul(&self.arm) + self.link))
            }
            (SampleRotation::Double { first, second }, true) => {
                second * (first * self.arm + self.link)
            }
        };
        moved + self.offset
    }
}

pub(crate) fn back_calculate(
    problem: &Problem,
    model: &FrameOrderModel,
    settings: &IntegrationSettings,
) -> Result<BackCalculation, EngineError> {
    if model.tensors.len() != problem.alignment_count() {
        return Err(EngineError::Internal(format!(
            "model holds {} tensors for {} alignments",
            model.tensors.len(),
            problem.alignment_count()
        )));
    }

    let motion = model.motion()?;
    let eigenframe = if motion.is_rigid() {
        Matrix3::identity()
    } else {
        model.eigenframe_matrix()?
    };
    let ave_rotation = model.average_position.rotation()?;
    let pivot = model.pivot.point;

    // Full tensors and paramagnetic centres at the average position.
    let lab_tensors: Vec<Matrix3<f64>> = problem
        .alignments
        .iter()
        .zip(&model.tensors)
        .map(|(alignment, tensor)| match alignment.frame {
            TensorFrame::Reference => tensor.to_matrix(),
            TensorFrame::Moving => ave_rotation * tensor.to_matrix() * ave_rotation.transpose(),
        })
        .collect();

    let needs_daeg = !problem.rdc_rows.is_empty() || problem.alignments.iter().any(|a| a.reduced.is_some());
    let daeg = if !needs_daeg || motion.is_rigid() {
        Matrix9::identity()
    } else {
        frame_order_matrices(&motion, &eigenframe, &settings.quadrature)?.1
    };
    let daeg_inverse = daeg.transpose();

    let reduced_lab: Vec<Matrix3<f64>> = problem
        .alignments
        .iter()
        .zip(&lab_tensors)
        .map(|(alignment, tensor)| match alignment.frame {
            TensorFrame::Reference => reduce_tensor(&daeg, tensor),
            TensorFrame::Moving => reduce_tensor(&daeg_inverse, tensor),
        })
        .collect();

    let rdc = problem
        .rdc_rows
        .iter()
        .map(|row| {
            let site = &problem.rdc_sites[row.site];
            let unit = match problem.alignments[row.alignment].frame {
                TensorFrame::Reference => ave_rotation * site.unit,
                TensorFrame::Moving => site.unit,
            };
            let value = kernels::rdc(&reduced_lab[row.alignment], &unit, site.constant, row.absolute);
            if value.is_finite() {
                Ok(value)
            } else {
                Err(EngineError::NonFinite {
                    observable: "RDC",
                    site: site.label.clone(),
                })
            }
        })
        .collect::<Result<Vec<_>, EngineError>>()?;

    let reduced = problem
        .alignments
        .iter()
        .zip(&reduced_lab)
        .map(|(alignment, tensor)| {
            alignment.reduced.map(|_| match alignment.frame {
                TensorFrame::Reference => {
                    AlignmentTensor::from_matrix(&(ave_rotation.transpose() * tensor * ave_rotation))
                }
                TensorFrame::Moving => AlignmentTensor::from_matrix(tensor),
            })
        })
        .collect();

    let (pcs, accepted_points) = if problem.pcs_rows.is_empty() {
        (Vec::new(), None)
    } else {
        let arms = pcs_arms(problem, model, &motion, &ave_rotation, &lab_tensors, &pivot);
        average_pcs(problem, &arms, &motion, &eigenframe, settings)?
    };

    Ok(BackCalculation {
        pcs,
        rdc,
        reduced,
        accepted_points,
    })
}

fn pcs_arms(
    problem: &Problem,
    model: &FrameOrderModel,
    motion: &Motion,
    ave_rotation: &Matrix3<f64>,
    lab_tensors: &[Matrix3<f64>],
    pivot: &Vector3<f64>,
) -> Vec<PcsArm> {
    let two_pivots = matches!(motion, Motion::DoubleRotor { .. });
    let second = model.second_pivot();
    problem
        .pcs_rows
        .iter()
        .map(|row| {
            let alignment = &problem.alignments[row.alignment];
            let site = &problem.pcs_sites[row.site];
            // Presence of the centre was checked when the problem was built.
            let centre = alignment.paramagnetic_centre.unwrap_or_else(Vector3::zeros);
            let (position, centre, inverse) = match alignment.frame {
                TensorFrame::Reference => (
                    model.average_position.apply(ave_rotation, pivot, &site.position),
                    centre,
                    false,
                ),
                TensorFrame::Moving => (
                    site.position,
                    model.average_position.apply(ave_rotation, pivot, &centre),
                    true,
                ),
            };
            let (anchor, tail) = match (two_pivots, inverse) {
                (false, _) => (*pivot, *pivot),
                (true, false) => (second, *pivot),
                (true, true) => (*pivot, second),
            };
            PcsArm {
                arm: position - anchor,
                offset: tail - centre,
                link: anchor - tail,
                inverse,
                tensor: lab_tensors[row.alignment],
                constant: alignment.pcs_constant,
            }
        })
        .collect()
}

fn pcs_value(problem: &Problem, index: usize, arm: &PcsArm, r: &Vector3<f64>) -> Result<f64, EngineError> {
    kernels::pcs(&arm.tensor, r, arm.constant).ok_or_else(|| EngineError::NonFinite {
        observable: "PCS",
        site: problem.pcs_sites[problem.pcs_rows[index].site].label.clone(),
    })
}

fn rigid_pcs(problem: &Problem, arms: &[PcsArm]) -> Result<Vec<f64>, EngineError> {
    arms.iter()
        .enumerate()
        .map(|(i, arm)| pcs_value(problem, i, arm, &arm.rigid()))
        .collect()
}

fn average_pcs(
    problem: &Problem,
    arms: &[PcsArm],
    motion: &Motion,
    eigenframe: &Matrix3<f64>,
    settings: &IntegrationSettings,
) -> Result<(Vec<f64>, Option<usize>), EngineError> {
    if motion.is_rigid() {
        return Ok((rigid_pcs(problem, arms)?, None));
    }
    match settings.method {
        IntegrationMethod::Sobol => {
            let (values, accepted) = sobol_pcs(problem, arms, motion, eigenframe, settings)?;
            Ok((values, Some(accepted)))
        }
        IntegrationMethod::Quadrature => Ok((
            quadrature_pcs(problem, arms, motion, eigenframe, &settings.quadrature)?,
            None,
        )),
    }
}

fn sobol_pcs(
    problem: &Problem,
    arms: &[PcsArm],
    motion: &Motion,
    eigenframe: &Matrix3<f64>,
    settings: &IntegrationSettings,
) -> Result<(Vec<f64>, usize), EngineError> {
    let dimensions = SampleRotation::dimensions(motion);
    let mut sequence = match settings.shift_seed {
        Some(seed) => SobolSequence::with_shift(dimensions, seed)?,
        None => SobolSequence::new(dimensions)?,
    };
    let budget = settings.max_points.saturating_mul(settings.oversample.max(1));
    let mut point = vec![0.0; dimensions];
    let mut sums = vec![0.0; arms.len()];
    let mut accepted = 0usize;

    for _ in 0..budget {
        if accepted >= settings.max_points {
            break;
        }
        sequence.next_into(&mut point);
        let Some(sample) = SampleRotation::from_unit(motion, &point) else {
            continue;
        };
        let sample = sample.in_frame(eigenframe);
        for (i, (sum, arm)) in sums.iter_mut().zip(arms).enumerate() {
            *sum += pcs_value(problem, i, arm, &arm.transported(&sample))?;
        }
        accepted += 1;
    }

    if accepted == 0 {
        warn!(?motion, "No Sobol' point fell inside the motional domain; using the rigid limit.");
        return Ok((rigid_limit(problem, arms, motion)?, 0));
    }
    trace!(accepted, requested = settings.max_points, "Sobol' PCS average complete.");
    let n = accepted as f64;
    Ok((sums.into_iter().map(|s| s / n).collect(), accepted))
}

/// Observables at the identity rotation, honouring the two-pivot geometry.
fn rigid_limit(problem: &Problem, arms: &[PcsArm], motion: &Motion) -> Result<Vec<f64>, EngineError> {
    let identity = match motion {
        Motion::DoubleRotor { .. } => SampleRotation::Double {
            first: Matrix3::identity(),
            second: Matrix3::identity(),
        },
        _ => return rigid_pcs(problem, arms),
    };
    arms.iter()
        .enumerate()
        .map(|(i, arm)| pcs_value(problem, i, arm, &arm.transported(&identity)))
        .collect()
}

/// Integral over `[-limit, limit]`, or the integrand at zero when the range is empty.
fn over_symmetric<F>(limit: Option<f64>, tolerance: &QuadratureTolerance, mut f: F) -> Result<DVector<f64>, EngineError>
where
    F: FnMut(f64) -> Result<DVector<f64>, EngineError>,
{
    match limit {
        Some(s) if s > 0.0 => integrate(f, -s, s, tolerance),
        _ => f(0.0),
    }
}

fn quadrature_pcs(
    problem: &Problem,
    arms: &[PcsArm],
    motion: &Motion,
    eigenframe: &Matrix3<f64>,
    tolerance: &QuadratureTolerance,
) -> Result<Vec<f64>, EngineError> {
    let n = arms.len();
    // Integrand: PCS values followed by the unit weight, so the last entry is the normaliser.
    let evaluate = |sample: SampleRotation| -> Result<DVector<f64>, EngineError> {
        let sample = sample.in_frame(eigenframe);
        let mut values = DVector::from_element(n + 1, 1.0);
        for (i, arm) in arms.iter().enumerate() {
            values[i] = pcs_value(problem, i, arm, &arm.transported(&sample))?;
        }
        Ok(values)
    };

    let totals = match *motion {
        Motion::Rigid => evaluate(SampleRotation::Single(Matrix3::identity()))?,
        Motion::Rotor { sigma_max } => over_symmetric(Some(sigma_max), tolerance, |sigma| {
            evaluate(SampleRotation::Single(rotation_z(sigma)))
        })?,
        Motion::IsoCone {
            theta_max,
            sigma_max,
        } => cone_integral(|_| theta_max, sigma_max, tolerance, &evaluate)?,
        Motion::PseudoEllipse {
            theta_x,
            theta_y,
            sigma_max,
        } => cone_integral(
            |phi| pseudo_ellipse_theta_max(phi, theta_x, theta_y),
            sigma_max,
            tolerance,
            &evaluate,
        )?,
        Motion::DoubleRotor {
            sigma_max,
            sigma_max_2,
        } => over_symmetric(Some(sigma_max), tolerance, |sigma_1| {
            over_symmetric(Some(sigma_max_2), tolerance, |sigma_2| {
                evaluate(SampleRotation::Double {
                    first: rotation_y(sigma_1),
                    second: rotation_x(sigma_2),
                })
            })
        })?,
    };

    let norm = totals[n];
    if !(norm > 0.0) {
        return Err(EngineError::Internal(
            "quadrature normaliser vanished".to_string(),
        ));
    }
    Ok(totals.iter().take(n).map(|v| v / norm).collect())
}

/// Integral over the tilt-torsion domain with tilt bounded by `edge(phi)` and weight `sin(theta)`.
fn cone_integral<E, F>(
    edge: E,
    sigma_max: Option<f64>,
    tolerance: &QuadratureTolerance,
    evaluate: &F,
) -> Result<DVector<f64>, EngineError>
where
    E: Fn(f64) -> f64,
    F: Fn(SampleRotation) -> Result<DVector<f64>, EngineError>,
{
    integrate(
        |phi| -> Result<DVector<f64>, EngineError> {
            let theta_max = edge(phi);
            integrate(
                |theta| -> Result<DVector<f64>, EngineError> {
                    let at = |sigma: f64| {
                        evaluate(SampleRotation::Single(tilt_torsion_to_matrix(TiltTorsion {
                            phi,
                            theta,
                            sigma,
                        })))
                    };
                    Ok(over_symmetric(sigma_max, tolerance, at)? * theta.sin())
                },
                0.0,
                theta_max,
                tolerance,
            )
        },
        -PI,
        PI,
        tolerance,
    )
}
