use super::GeometryError;
use nalgebra::Vector3;

/// Returns the foot of the perpendicular from `query` onto the line through `point` along `direction`.
pub fn closest_point_on_axis(
    point: &Vector3<f64>,
    direction: &Vector3<f64>,
    query: &Vector3<f64>,
) -> Result<Vector3<f64>, GeometryError> {
    if [point, direction, query]
        .iter()
        .any(|v| v.iter().any(|x| !x.is_finite()))
    {
        return Err(GeometryError::NonFinite("line projection"));
    }
    let norm = direction.norm();
    if norm < 1e-14 {
        return Err(GeometryError::ZeroAxis);
    }
    let unit = direction / norm;
    Ok(point + unit * (query - point).dot(&unit))
}
