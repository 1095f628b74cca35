use super::Motion;
use super::domain::pseudo_ellipse_theta_max;
use crate::core::geometry::{Matrix9, kron_prod, rotate_daeg};
use crate::core::integration::IntegrationError;
use crate::core::integration::quadrature::{QuadratureTolerance, integrate};
use nalgebra::{DVector, Matrix3};
use std::f64::consts::FRAC_PI_2;

/// `sin(x) / x`, the unnormalised sinc.
fn sinc(x: f64) -> f64 {
    if x == 0.0 { 1.0 } else { x.sin() / x }
}

/// Torsion averages `<cos sigma>` and `<cos 2 sigma>` for a uniform torsion in `[-s, s]`.
fn torsion_factors(sigma_max: Option<f64>) -> (f64, f64) {
    match sigma_max {
        Some(s) => (sinc(s), sinc(2.0 * s)),
        None => (1.0, 1.0),
    }
}

/// First-degree frame-order matrix `<R>` in the motional eigenframe.
pub fn first_degree(motion: &Motion, tolerance: &QuadratureTolerance) -> Result<Matrix3<f64>, IntegrationError> {
    let m = match *motion {
        Motion::Rigid => Matrix3::identity(),
        Motion::Rotor { sigma_max } => {
            let s1 = sinc(sigma_max);
            Matrix3::from_diagonal(&nalgebra::Vector3::new(s1, s1, 1.0))
        }
        Motion::IsoCone {
            theta_max,
            sigma_max,
        } => {
            let (s1, _) = torsion_factors(sigma_max);
            let c = theta_max.cos();
            let xy = s1 * (c + 3.0) / 4.0;
            Matrix3::from_diagonal(&nalgebra::Vector3::new(xy, xy, (1.0 + c) / 2.0))
        }
        Motion::PseudoEllipse {
            theta_x,
            theta_y,
            sigma_max,
        } => {
            let (s1, _) = torsion_factors(sigma_max);
            let sums = integrate(
                |phi| {
                    let c2 = phi.cos().powi(2);
                    let c = pseudo_ellipse_theta_max(phi, theta_x, theta_y).cos();
                    let omc = 1.0 - c;
                    Ok::<_, IntegrationError>(DVector::from_vec(vec![
                        omc,
                        s1 * omc * (2.0 - c2 * omc) / 2.0,
                        s1 * (c - 1.0) * (c2 * c - c2 - c - 1.0) / 2.0,
                        omc * (1.0 + c) / 2.0,
                    ]))
                },
                0.0,
                FRAC_PI_2,
                tolerance,
            )?;
            let norm = sums[0];
            Matrix3::from_diagonal(&nalgebra::Vector3::new(
                sums[1] / norm,
                sums[2] / norm,
                sums[3] / norm,
            ))
        }
        Motion::DoubleRotor {
            sigma_max,
            sigma_max_2,
        } => {
            let s1 = sinc(sigma_max);
            let s2 = sinc(sigma_max_2);
            Matrix3::from_diagonal(&nalgebra::Vector3::new(s1, s2, s1 * s2))
        }
    };
    Ok(m)
}

/// Second-degree frame-order matrix `<R (x) R>` in the motional eigenframe.
pub fn second_degree(motion: &Motion, tolerance: &QuadratureTolerance) -> Result<Matrix9, IntegrationError> {
    let daeg = match *motion {
        Motion::Rigid => Matrix9::identity(),
        Motion::Rotor { sigma_max } => iso_cone_daeg(1.0, sinc(sigma_max), sinc(2.0 * sigma_max)),
        Motion::IsoCone {
            theta_max,
            sigma_max,
        } => {
            let (s1, s2) = torsion_factors(sigma_max);
            iso_cone_daeg(theta_max.cos(), s1, s2)
        }
        Motion::PseudoEllipse {
            theta_x,
            theta_y,
            sigma_max,
        } => pseudo_ellipse_daeg(theta_x, theta_y, sigma_max, tolerance)?,
        Motion::DoubleRotor {
            sigma_max,
            sigma_max_2,
        } => double_rotor_daeg(sigma_max, sigma_max_2),
    };
    Ok(daeg)
}

/// Both matrices rotated from the eigenframe `E` into the reference frame.
pub fn frame_order_matrices(
    motion: &Motion,
    eigenframe: &Matrix3<f64>,
    tolerance: &QuadratureTolerance,
) -> Result<(Matrix3<f64>, Matrix9), IntegrationError> {
    let first = first_degree(motion, tolerance)?;
    let second = second_degree(motion, tolerance)?;
    let r_kron = kron_prod(eigenframe, eigenframe);
    Ok((
        eigenframe * first * eigenframe.transpose(),
        rotate_daeg(&second, &r_kron),
    ))
}

fn set_pairs(m: &mut Matrix9, value: f64, pairs: &[(usize, usize)]) {
    for &(i, j) in pairs {
        m[(i, j)] = value;
    }
}

/// Isotropic cone of half-angle `acos(c)` with torsion factors `s1 = <cos s>`, `s2 = <cos 2s>`.
/// A rotor is the `c = 1` limit.
fn iso_cone_daeg(c: f64, s1: f64, s2: f64) -> Matrix9 {
    let c_sq = c * c;
    let fact_sinc = s2 * (c_sq + 4.0 * c + 7.0) / 24.0;
    let fact_cos = (c_sq + c + 4.0) / 12.0;
    let fact_half = (c + 1.0) / 4.0;

    let mut m = Matrix9::zeros();
    set_pairs(&mut m, fact_sinc + fact_cos, &[(0, 0), (4, 4)]);
    set_pairs(&mut m, fact_cos - fact_sinc, &[(0, 4), (4, 0)]);
    set_pairs(&mut m, fact_sinc + fact_half, &[(1, 1), (3, 3)]);
    set_pairs(&mut m, fact_sinc - fact_half, &[(1, 3), (3, 1)]);
    set_pairs(&mut m, -(c_sq + c - 2.0) / 6.0, &[(0, 8), (8, 0), (4, 8), (8, 4)]);
    set_pairs(&mut m, s1 * (2.0 * c_sq + 5.0 * c + 5.0) / 12.0, &[(2, 2), (5, 5), (6, 6), (7, 7)]);
    set_pairs(&mut m, s1 * (c_sq + c - 2.0) / 6.0, &[(2, 6), (6, 2), (5, 7), (7, 5)]);
    m[(8, 8)] = (c_sq + c + 1.0) / 3.0;
    m
}

fn double_rotor_daeg(sigma_max: f64, sigma_max_2: f64) -> Matrix9 {
    let s1 = sinc(sigma_max);
    let s2 = sinc(sigma_max_2);
    let t1 = sinc(2.0 * sigma_max);
    let t2 = sinc(2.0 * sigma_max_2);

    let mut m = Matrix9::zeros();
    m[(0, 0)] = 0.5 * (t1 + 1.0);
    set_pairs(&mut m, s1 * s2, &[(1, 1), (3, 3)]);
    set_pairs(&mut m, 0.5 * s2 * (t1 + 1.0), &[(2, 2), (6, 6)]);
    m[(4, 4)] = 0.5 * (t2 + 1.0);
    set_pairs(&mut m, 0.5 * s1 * (t2 + 1.0), &[(5, 5), (7, 7)]);
    m[(8, 8)] = 0.25 * (t1 + 1.0) * (t2 + 1.0);

    m[(4, 0)] = 0.25 * (t1 - 1.0) * (t2 - 1.0);
    m[(0, 8)] = -0.5 * (t1 - 1.0);
    m[(8, 0)] = -0.25 * (t1 - 1.0) * (t2 + 1.0);
    m[(4, 8)] = -0.25 * (t1 + 1.0) * (t2 - 1.0);
    m[(8, 4)] = -0.5 * (t2 - 1.0);
    set_pairs(&mut m, 0.5 * s2 * (t1 - 1.0), &[(2, 6), (6, 2)]);
    set_pairs(&mut m, 0.5 * s1 * (t2 - 1.0), &[(5, 7), (7, 5)]);
    m
}

/// The pseudo-ellipse average is exact in the tilt and torsion; the remaining azimuthal
/// integral is taken numerically over a quarter turn, where every integrand is symmetric.
fn pseudo_ellipse_daeg(
    theta_x: f64,
    theta_y: f64,
    sigma_max: Option<f64>,
    tolerance: &QuadratureTolerance,
) -> Result<Matrix9, IntegrationError> {
    let (s1, s2) = torsion_factors(sigma_max);
    let sums = integrate(
        |phi| {
            let c2 = phi.cos().powi(2);
            let c = pseudo_ellipse_theta_max(phi, theta_x, theta_y).cos();
            Ok::<_, IntegrationError>(DVector::from_vec(pseudo_ellipse_integrands(c, c2, s1, s2).to_vec()))
        },
        0.0,
        FRAC_PI_2,
        tolerance,
    )?;

    let norm = sums[0];
    let e = |i: usize| sums[i] / norm;
    let mut m = Matrix9::zeros();
    m[(0, 0)] = e(1);
    m[(0, 4)] = e(2);
    m[(0, 8)] = e(3);
    set_pairs(&mut m, e(4), &[(1, 1), (3, 3)]);
    set_pairs(&mut m, e(5), &[(1, 3), (3, 1)]);
    set_pairs(&mut m, e(6), &[(2, 2), (6, 6)]);
    set_pairs(&mut m, e(7), &[(2, 6), (6, 2)]);
    m[(4, 0)] = e(8);
    m[(4, 4)] = e(9);
    m[(4, 8)] = e(10);
    set_pairs(&mut m, e(11), &[(5, 5), (7, 7)]);
    set_pairs(&mut m, e(12), &[(5, 7), (7, 5)]);
    m[(8, 0)] = e(13);
    m[(8, 4)] = e(14);
    m[(8, 8)] = e(15);
    Ok(m)
}

/// Azimuthal integrands: the normaliser `1 - cos(theta_max)` followed by the distinct
/// non-zero elements, already integrated over tilt (weight `sin theta`) and torsion.
fn pseudo_ellipse_integrands(c: f64, c2: f64, s1: f64, s2: f64) -> [f64; 16] {
    let cm1 = c - 1.0;
    let c_sq = c * c;
    let c2_sq = c2 * c2;
    let cm1_sq_cp2 = cm1 * cm1 * (c + 2.0);

    let poly_x = 2.0 * c2_sq * c_sq - 4.0 * c2_sq * c + 2.0 * c2_sq - c2 * c_sq + 5.0 * c2 * c - 4.0 * c2 + 3.0;
    let base_x = cm1 * (c2 * c_sq + c2 * c - 2.0 * c2 + 3.0) / 6.0;
    let poly_y = 2.0 * c2_sq * c_sq - 4.0 * c2_sq * c + 2.0 * c2_sq - 3.0 * c2 * c_sq + 3.0 * c2 * c + c_sq + c + 1.0;
    let base_y = cm1 * (c2 * c_sq + c2 * c - 2.0 * c2 - c_sq - c - 1.0) / 6.0;
    let poly_xy = 4.0 * c2_sq * c_sq - 8.0 * c2_sq * c + 4.0 * c2_sq - 4.0 * c2 * c_sq + 8.0 * c2 * c - 4.0 * c2
        - 3.0 * c
        - 3.0;
    let half_xy = cm1 * (c + 1.0) / 4.0;

    [
        -cm1,
        -s2 * cm1 * poly_x / 6.0 - base_x,
        s2 * cm1 * poly_x / 6.0 - base_x,
        c2 * cm1_sq_cp2 / 3.0,
        s2 * cm1 * poly_xy / 12.0 - half_xy,
        s2 * cm1 * poly_xy / 12.0 + half_xy,
        -s1 * cm1 * (2.0 * c2 * c_sq - c2 * c - c2 + 3.0 * c + 3.0) / 6.0,
        -c2 * s1 * cm1_sq_cp2 / 3.0,
        s2 * cm1 * poly_y / 6.0 + base_y,
        -s2 * cm1 * poly_y / 6.0 + base_y,
        -(c2 - 1.0) * cm1_sq_cp2 / 3.0,
        s1 * cm1 * (2.0 * c2 * c_sq - c2 * c - c2 - 2.0 * c_sq - 2.0 * c - 2.0) / 6.0,
        s1 * (c2 - 1.0) * cm1_sq_cp2 / 3.0,
        s2 * (2.0 * c2 - 1.0) * cm1_sq_cp2 / 6.0 + cm1_sq_cp2 / 6.0,
        -s2 * (2.0 * c2 - 1.0) * cm1_sq_cp2 / 6.0 + cm1_sq_cp2 / 6.0,
        -cm1 * (c_sq + c + 1.0) / 3.0,
    ]
}
