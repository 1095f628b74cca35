use super::IntegrationError;
use nalgebra::DVector;
use serde::{Deserialize, Serialize};

const XGK: [f64; 8] = [
    0.991455371120812639206854697526329,
    0.949107912342758524526189684047851,
    0.864864423359769072789712788640926,
    0.741531185599394439863864773280788,
    0.586087235467691130294144845693013,
    0.405845151377397166906606412076961,
    0.207784955007898467600689403773245,
    0.000000000000000000000000000000000,
];

const WGK: [f64; 8] = [
    0.022935322010529224963732008058970,
    0.063092092629978553290700663189204,
    0.104790010322250183839876322541518,
    0.140653259715525918745189590510238,
    0.169004726639267902826583426598550,
    0.190350578064785409913256402421014,
    0.204432940075298892414161999234649,
    0.209482141084727828012999174891714,
];

const WG: [f64; 4] = [
    0.129484966168869693270611432679082,
    0.279705391489276667901467771423780,
    0.381830050505118944950369775488975,
    0.417959183673469387755102040816327,
];

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuadratureTolerance {
    pub absolute: f64,
    pub relative: f64,
    pub max_subdivisions: usize,
}

impl Default for QuadratureTolerance {
    fn default() -> Self {
        Self {
            absolute: 1.49e-8,
            relative: 1.49e-8,
            max_subdivisions: 50,
        }
    }
}

struct Segment {
    a: f64,
    b: f64,
    result: DVector<f64>,
    error: f64,
}

fn gauss_kronrod<F, E>(f: &mut F, a: f64, b: f64) -> Result<Segment, E>
where
    F: FnMut(f64) -> Result<DVector<f64>, E>,
{
    let center = 0.5 * (a + b);
    let half = 0.5 * (b - a);

    let f_center = f(center)?;
    let mut kronrod = &f_center * WGK[7];
    let mut gauss = &f_center * WG[3];

    for j in 0..3 {
        let node = 2 * j + 1;
        let dx = half * XGK[node];
        let pair = f(center - dx)? + f(center + dx)?;
        gauss += &pair * WG[j];
        kronrod += &pair * WGK[node];
    }
    for j in 0..4 {
        let node = 2 * j;
        let dx = half * XGK[node];
        let pair = f(center - dx)? + f(center + dx)?;
        kronrod += &pair * WGK[node];
    }

    let error = ((&kronrod - &gauss) * half).amax();
    Ok(Segment {
        a,
        b,
        result: kronrod * half,
        error,
    })
}

/// Adaptive Gauss-Kronrod (7/15) integration of a vector-valued function over `[a, b]`.
///
/// The interval with the largest error estimate is bisected until the summed estimate
/// drops below `max(absolute, relative * |I|)` in the max-norm. Errors raised by the
/// integrand propagate unchanged, which lets nested integrals share one error type.
pub fn integrate<F, E>(mut f: F, a: f64, b: f64, tolerance: &QuadratureTolerance) -> Result<DVector<f64>, E>
where
    F: FnMut(f64) -> Result<DVector<f64>, E>,
    E: From<IntegrationError>,
{
    if !(a.is_finite() && b.is_finite()) {
        return Err(IntegrationError::NonFinite.into());
    }
    if a == b {
        return Ok(f(a)? * 0.0);
    }

    let mut segments = vec![gauss_kronrod(&mut f, a, b)?];
    loop {
        let total = segments
            .iter()
            .skip(1)
            .fold(segments[0].result.clone(), |acc, s| acc + &s.result);
        let error: f64 = segments.iter().map(|s| s.error).sum();

        if !error.is_finite() || total.iter().any(|x| !x.is_finite()) {
            return Err(IntegrationError::NonFinite.into());
        }
        let target = tolerance.absolute.max(tolerance.relative * total.amax());
        if error <= target {
            return Ok(total);
        }
        if segments.len() >= tolerance.max_subdivisions {
            return Err(IntegrationError::NotConverged {
                subdivisions: segments.len(),
                error_estimate: error,
            }
            .into());
        }

        let worst = segments
            .iter()
            .enumerate()
            .max_by(|(_, x), (_, y)| x.error.total_cmp(&y.error))
            .map(|(i, _)| i)
            .unwrap_or(0);
        let segment = segments.swap_remove(worst);
        let mid = 0.5 * (segment.a + segment.b);
        segments.push(gauss_kronrod(&mut f, segment.a, mid)?);
        segments.push(gauss_kronrod(&mut f, mid, segment.b)?);
    }
}

pub fn integrate_scalar<F>(mut f: F, a: f64, b: f64, tolerance: &QuadratureTolerance) -> Result<f64, IntegrationError>
where
    F: FnMut(f64) -> f64,
{
    let result = integrate(
        |x| Ok::<_, IntegrationError>(DVector::from_element(1, f(x))),
        a,
        b,
        tolerance,
    )?;
    Ok(result[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::PI;

    const TOLERANCE: f64 = 1e-10;

    #[test]
    fn integrates_polynomials_exactly() {
        let tol = QuadratureTolerance::default();
        let value = integrate_scalar(|x| 3.0 * x * x - 2.0 * x + 1.0, -1.0, 2.0, &tol).unwrap();
        assert!((value - 9.0).abs() < TOLERANCE);
    }

    #[test]
    fn integrates_oscillatory_function() {
        let tol = QuadratureTolerance::default();
        let value = integrate_scalar(|x| x.sin(), 0.0, PI, &tol).unwrap();
        assert!((value - 2.0).abs() < TOLERANCE);
    }

    #[test]
    fn vector_integrand_integrates_componentwise() {
        let tol = QuadratureTolerance::default();
        let value = integrate(
            |x: f64| Ok::<_, IntegrationError>(DVector::from_vec(vec![x.cos(), x.exp()])),
            0.0,
            1.0,
            &tol,
        )
        .unwrap();
        assert!((value[0] - 1f64.sin()).abs() < TOLERANCE);
        assert!((value[1] - (1f64.exp() - 1.0)).abs() < TOLERANCE);
    }

    #[test]
    fn nested_integration_computes_sphere_cap_area() {
        let tol = QuadratureTolerance::default();
        let area = integrate(
            |_phi: f64| {
                integrate(
                    |theta: f64| Ok::<_, IntegrationError>(DVector::from_element(1, theta.sin())),
                    0.0,
                    0.5,
                    &tol,
                )
            },
            -PI,
            PI,
            &tol,
        )
        .unwrap();
        assert!((area[0] - 2.0 * PI * (1.0 - 0.5f64.cos())).abs() < 1e-9);
    }

    #[test]
    fn empty_interval_yields_zero() {
        let tol = QuadratureTolerance::default();
        assert_eq!(integrate_scalar(|x| x + 1.0, 1.0, 1.0, &tol).unwrap(), 0.0);
    }

    #[test]
    fn subdivision_cap_reports_non_convergence() {
        let tol = QuadratureTolerance {
            absolute: 1e-14,
            relative: 0.0,
            max_subdivisions: 2,
        };
        let result = integrate_scalar(|x| (50.0 * x).sin().abs(), 0.0, 3.0, &tol);
        assert!(matches!(result, Err(IntegrationError::NotConverged { .. })));
    }
}
