//! Post-optimisation pivot normalisation.
//!
//! A rotor only fixes its pivot up to a slide along the rotation axis, so a free pivot
//! wanders along that line during optimisation. The report below moves it back onto a
//! caller-chosen foot point and records how far it was off.

use super::error::EngineError;
use super::state::FrameOrderModel;
use crate::core::catalogue::ModelKind;
use crate::core::geometry::closest_point_on_axis;
use nalgebra::Vector3;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PivotProjection {
    pub original: Vector3<f64>,
    pub projected: Vector3<f64>,
    /// `original - projected`.
    pub displacement: Vector3<f64>,
    pub distance: f64,
    /// Unit direction of the rotation axis in the reference frame.
    pub axis: Vector3<f64>,
}

/// The principal rotation axis of `model`: eigenframe z, or eigenframe y for the first
/// mode of the double rotor.
pub fn rotation_axis(model: &FrameOrderModel) -> Result<Vector3<f64>, EngineError> {
    if model.kind.is_rigid() {
        return Err(EngineError::Validation(
            "the rigid model has no rotation axis".to_string(),
        ));
    }
    let eigenframe = model.eigenframe_matrix()?;
    let column = if model.kind == ModelKind::DoubleRotor { 1 } else { 2 };
    Ok(eigenframe.column(column).into_owned())
}

/// Projects `pivot` onto the line through `axis_point` along `axis`.
pub fn project_pivot(
    pivot: &Vector3<f64>,
    axis_point: &Vector3<f64>,
    axis: &Vector3<f64>,
) -> Result<PivotProjection, EngineError> {
    let projected = closest_point_on_axis(axis_point, axis, pivot)?;
    let displacement = pivot - projected;
    Ok(PivotProjection {
        original: *pivot,
        projected,
        displacement,
        distance: displacement.norm(),
        axis: axis.normalize(),
    })
}

/// Projects the pivot of `model` onto its rotation axis taken through `axis_point`.
pub fn project_model_pivot(
    model: &FrameOrderModel,
    axis_point: &Vector3<f64>,
) -> Result<PivotProjection, EngineError> {
    let axis = rotation_axis(model)?;
    let projection = project_pivot(&model.pivot.point, axis_point, &axis)?;
    info!(
        distance = projection.distance,
        model = model.kind.name(),
        "Pivot projected onto the rotation axis."
    );
    Ok(projection)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geometry::{EulerZyz, GeometryError};
    use std::f64::consts::FRAC_PI_2;

    const TOLERANCE: f64 = 1e-12;

    #[test]
    fn projection_matches_the_perpendicular_foot() {
        let p0 = Vector3::new(3.0, -1.0, 4.0);
        let q = Vector3::new(1.0, 1.0, 1.0);
        let axis = Vector3::new(1.0, 2.0, 2.0);
        let report = project_pivot(&p0, &q, &axis).unwrap();
        let unit = axis / 3.0;
        let expected = q + unit * (p0 - q).dot(&unit);
        assert!((report.projected - expected).norm() < TOLERANCE);
        assert!((report.displacement.dot(&unit)).abs() < TOLERANCE);
        assert!((report.distance - report.displacement.norm()).abs() < TOLERANCE);
    }

    #[test]
    fn rotor_axis_is_eigenframe_z() {
        let model = FrameOrderModel::new(ModelKind::Rotor, Vector3::zeros())
            .with_eigenframe(EulerZyz::new(0.0, FRAC_PI_2, 0.0));
        let axis = rotation_axis(&model).unwrap();
        assert!((axis - Vector3::new(1.0, 0.0, 0.0)).norm() < TOLERANCE);
    }

    #[test]
    fn double_rotor_axis_is_eigenframe_y() {
        let model = FrameOrderModel::new(ModelKind::DoubleRotor, Vector3::zeros())
            .with_eigenframe(EulerZyz::new(FRAC_PI_2, 0.0, 0.0));
        let axis = rotation_axis(&model).unwrap();
        assert!((axis - Vector3::new(-1.0, 0.0, 0.0)).norm() < TOLERANCE);
    }

    #[test]
    fn model_pivot_off_axis_is_reported() {
        let model = FrameOrderModel::new(ModelKind::Rotor, Vector3::new(2.0, 0.0, 7.0));
        let report = project_model_pivot(&model, &Vector3::zeros()).unwrap();
        assert!((report.projected - Vector3::new(0.0, 0.0, 7.0)).norm() < TOLERANCE);
        assert!((report.distance - 2.0).abs() < TOLERANCE);
    }

    #[test]
    fn rigid_model_and_zero_axis_are_rejected() {
        let rigid = FrameOrderModel::new(ModelKind::Rigid, Vector3::zeros());
        assert!(rotation_axis(&rigid).is_err());
        let err = project_pivot(&Vector3::zeros(), &Vector3::zeros(), &Vector3::zeros()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Geometry {
                source: GeometryError::ZeroAxis
            }
        ));
    }
}
