use nalgebra::{Matrix3, Vector3};

/// PCS for a lanthanide-to-spin vector `r` (Angstrom): `c (r^T A r) / |r|^5`.
///
/// Returns `None` when the spin coincides with the paramagnetic centre or the result is
/// not finite.
#[inline]
pub fn pcs(tensor: &Matrix3<f64>, r: &Vector3<f64>, constant: f64) -> Option<f64> {
    let norm_sq = r.norm_squared();
    if norm_sq == 0.0 {
        return None;
    }
    let norm5 = norm_sq * norm_sq * norm_sq.sqrt();
    let value = constant * r.dot(&(tensor * r)) / norm5;
    value.is_finite().then_some(value)
}

/// RDC for a unit interatomic vector: `c u^T A u`.
#[inline]
pub fn rdc(tensor: &Matrix3<f64>, unit: &Vector3<f64>, constant: f64, absolute: bool) -> f64 {
    let value = constant * unit.dot(&(tensor * unit));
    if absolute { value.abs() } else { value }
}
