//! The chi-squared target function.

use super::averaging::{BackCalculation, back_calculate};
use super::config::IntegrationSettings;
use super::error::EngineError;
use super::minimise::{Objective, central_difference};
use super::params::ParamLayout;
use super::problem::{ObservedValues, Problem};
use super::state::FrameOrderModel;
use nalgebra::DVector;
use std::sync::atomic::{AtomicUsize, Ordering};

const NO_POINTS: usize = usize::MAX;

/// `sum ((measured - calculated) / error)^2` over PCS, RDC and reduced-tensor elements.
pub(crate) fn chi_squared(problem: &Problem, observed: &ObservedValues, back: &BackCalculation) -> f64 {
    let pcs: f64 = problem
        .pcs_rows
        .iter()
        .zip(&observed.pcs)
        .zip(&back.pcs)
        .map(|((row, measured), calculated)| ((measured - calculated) / row.error).powi(2))
        .sum();
    let rdc: f64 = problem
        .rdc_rows
        .iter()
        .zip(&observed.rdc)
        .zip(&back.rdc)
        .map(|((row, measured), calculated)| ((measured - calculated) / row.error).powi(2))
        .sum();
    let reduced: f64 = problem
        .alignments
        .iter()
        .zip(&observed.reduced)
        .zip(&back.reduced)
        .filter_map(|((alignment, measured), calculated)| {
            let errors = alignment.reduced.as_ref()?.errors;
            let measured = (*measured)?;
            let calculated = calculated.as_ref()?.to_array();
            Some(
                (0..5)
                    .map(|k| ((measured[k] - calculated[k]) / errors[k]).powi(2))
                    .sum::<f64>(),
            )
        })
        .sum();
    pcs + rdc + reduced
}

/// Chi-squared as a function of the scaled parameter vector `y`, with parameters `x = s * y`.
pub struct Target<'a> {
    problem: &'a Problem,
    observed: &'a ObservedValues,
    template: FrameOrderModel,
    layout: ParamLayout,
    scaling: DVector<f64>,
    settings: IntegrationSettings,
    evaluations: AtomicUsize,
    accepted_points: AtomicUsize,
}

impl<'a> Target<'a> {
    pub fn new(
        problem: &'a Problem,
        observed: &'a ObservedValues,
        model: &FrameOrderModel,
        settings: IntegrationSettings,
    ) -> Self {
        let layout = ParamLayout::for_model(model);
        let scaling = layout.scaling();
        let mut template = model.clone();
        template.simulations.clear();
        Self {
            problem,
            observed,
            template,
            layout,
            scaling,
            settings,
            evaluations: AtomicUsize::new(0),
            accepted_points: AtomicUsize::new(NO_POINTS),
        }
    }

    pub fn layout(&self) -> &ParamLayout {
        &self.layout
    }

    pub fn scaling(&self) -> &DVector<f64> {
        &self.scaling
    }

    pub fn settings(&self) -> &IntegrationSettings {
        &self.settings
    }

    pub fn to_scaled(&self, x: &DVector<f64>) -> DVector<f64> {
        x.component_div(&self.scaling)
    }

    pub fn from_scaled(&self, y: &DVector<f64>) -> DVector<f64> {
        y.component_mul(&self.scaling)
    }

    /// The template model with the unscaled parameters `x` written in.
    pub fn model_at(&self, x: &DVector<f64>) -> FrameOrderModel {
        let mut model = self.template.clone();
        self.layout.unpack(x, &mut model);
        model
    }

    /// Chi-squared at the unscaled parameters `x`.
    pub fn chi2(&self, x: &DVector<f64>) -> Result<f64, EngineError> {
        let model = self.model_at(x);
        let back = back_calculate(self.problem, &model, &self.settings)?;
        self.evaluations.fetch_add(1, Ordering::Relaxed);
        if let Some(points) = back.accepted_points {
            self.accepted_points.store(points, Ordering::Relaxed);
        }
        Ok(chi_squared(self.problem, self.observed, &back))
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::Relaxed)
    }

    /// Sobol' points accepted in the most recent PCS average.
    pub fn accepted_points(&self) -> Option<usize> {
        match self.accepted_points.load(Ordering::Relaxed) {
            NO_POINTS => None,
            points => Some(points),
        }
    }
}

impl Objective for Target<'_> {
    fn dimension(&self) -> usize {
        self.layout.len()
    }

    fn value(&self, y: &DVector<f64>) -> Result<f64, EngineError> {
        self.chi2(&self.from_scaled(y))
    }

    fn gradient(&self, y: &DVector<f64>) -> Option<Result<DVector<f64>, EngineError>> {
        self.is_smooth().then(|| central_difference(self, y))
    }

    /// Sobol' PCS averages are piecewise constant in the parameters; everything else is smooth.
    fn is_smooth(&self) -> bool {
        self.template.kind.is_rigid() || !self.problem.has_pcs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalogue::ModelKind;
    use crate::core::geometry::EulerZyz;
    use crate::engine::problem::tests::alignment;
    use crate::core::models::bundle::DataBundle;
    use crate::core::models::observation::Observation;
    use crate::core::models::spin::{Spin, SpinLabel};
    use nalgebra::Vector3;

    const TOLERANCE: f64 = 1e-9;

    fn bundle() -> DataBundle {
        let mut bundle = DataBundle::new();
        let align = bundle.add_alignment(alignment());
        for (i, pos) in [Vector3::new(9.0, 1.0, 2.0), Vector3::new(-3.0, 7.5, -6.0)]
            .into_iter()
            .enumerate()
        {
            bundle.add_spin(
                Spin::new(SpinLabel::new("C", i as isize + 1, "N"))
                    .with_position(pos)
                    .with_pcs(align, Observation::new(0.0, 0.1)),
            );
        }
        bundle
    }

    fn rigid(problem: &Problem) -> FrameOrderModel {
        let mut model = FrameOrderModel::new(ModelKind::Rigid, Vector3::zeros())
            .with_average_position(Vector3::new(0.5, 0.0, -0.5), EulerZyz::new(0.2, 0.3, 0.4));
        model.tensors = problem.initial_tensors().to_vec();
        model
    }

    #[test]
    fn chi_squared_vanishes_for_back_calculated_data() {
        let problem = Problem::new(&bundle()).unwrap();
        let model = rigid(&problem);
        let settings = IntegrationSettings::default();
        let back = back_calculate(&problem, &model, &settings).unwrap();
        let observed = ObservedValues {
            pcs: back.pcs.clone(),
            ..problem.observed()
        };
        assert!(chi_squared(&problem, &observed, &back) < TOLERANCE);

        let target = Target::new(&problem, &observed, &model, settings);
        let y = target.to_scaled(&target.layout().pack(&model));
        assert!(target.value(&y).unwrap() < TOLERANCE);
        assert_eq!(target.evaluations(), 1);
    }

    #[test]
    fn chi_squared_weights_residuals_by_their_errors() {
        let problem = Problem::new(&bundle()).unwrap();
        let model = rigid(&problem);
        let back = back_calculate(&problem, &model, &IntegrationSettings::default()).unwrap();
        let observed = ObservedValues {
            pcs: back.pcs.iter().map(|v| v + 0.2).collect(),
            ..problem.observed()
        };
        // Two PCS rows, each 0.2 off with error 0.1.
        assert!((chi_squared(&problem, &observed, &back) - 8.0).abs() < TOLERANCE);
    }

    #[test]
    fn scaling_round_trips_parameters() {
        let problem = Problem::new(&bundle()).unwrap();
        let observed = problem.observed();
        let mut model = FrameOrderModel::new(ModelKind::IsoCone, Vector3::zeros()).with_free_pivot();
        model.tensors = problem.initial_tensors().to_vec();
        let target = Target::new(&problem, &observed, &model, IntegrationSettings::default());
        let x = target.layout().pack(&model);
        assert!((target.from_scaled(&target.to_scaled(&x)) - &x).norm() < TOLERANCE);
        assert!(!target.is_smooth());
        assert!(target.gradient(&target.to_scaled(&x)).is_none());
    }
}
