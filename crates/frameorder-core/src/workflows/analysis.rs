use crate::core::models::bundle::DataBundle;
use crate::core::models::ids::{AlignId, InteratomId, SpinId};
use crate::core::models::tensor::AlignmentTensor;
use crate::engine::averaging::back_calculate;
use crate::engine::config::{
    ConstraintHandling, DistributionConfig, GridRange, GridSearchConfig, IntegrationSettings,
    LocalOptimisationConfig, MonteCarloConfig, OptimiseOptions, SimulationData, StageConfig,
};
use crate::engine::constraints::LinearConstraints;
use crate::engine::distribution::{self, Ensemble};
use crate::engine::error::EngineError;
use crate::engine::minimise::{MinimiserOutcome, Objective, Termination, gradient, grid, multipliers, simplex};
use crate::engine::monte_carlo::{self, MonteCarloSummary};
use crate::engine::params::ParamLayout;
use crate::engine::pivot::{self, PivotProjection};
use crate::engine::problem::{ObservedValues, Problem};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::state::{Diagnostics, FrameOrderModel, OptimisationResult, StageRecord};
use crate::engine::target::{Target, chi_squared};
use nalgebra::{DVector, Vector3};
use std::collections::HashMap;
use tracing::{debug, info, instrument};

/// Averaged observables for every (alignment, site) cell; cells without a measurement are `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct BackCalculatedValues {
    pub pcs: HashMap<(AlignId, SpinId), Option<f64>>,
    pub rdc: HashMap<(AlignId, InteratomId), Option<f64>>,
    /// Model-reduced tensors of the alignments that carry a measured reduced tensor.
    pub reduced: HashMap<AlignId, AlignmentTensor>,
    pub chi2: f64,
}

/// A validated frame-order analysis of one data bundle.
#[derive(Debug, Clone)]
pub struct FrameOrderAnalysis {
    problem: Problem,
    observed: ObservedValues,
    model: FrameOrderModel,
    constraints: LinearConstraints,
    integration: IntegrationSettings,
}

impl FrameOrderAnalysis {
    /// Validates `bundle` and the initial `model` before any integration takes place.
    ///
    /// Tensors missing from `model` are taken from the bundle's alignments. `constraints`, if
    /// given, act on the packed parameter vector and are added to the catalogue defaults.
    #[instrument(skip_all, name = "frame_order_setup")]
    pub fn setup(
        bundle: &DataBundle,
        mut model: FrameOrderModel,
        constraints: Option<LinearConstraints>,
    ) -> Result<Self, EngineError> {
        let problem = Problem::new(bundle)?;

        if model.tensors.is_empty() {
            model.tensors = problem.initial_tensors().to_vec();
        } else if model.tensors.len() != problem.alignment_count() {
            return Err(EngineError::Validation(format!(
                "model holds {} tensors but the bundle has {} alignments",
                model.tensors.len(),
                problem.alignment_count()
            )));
        }

        model.checked_motion()?;
        model.eigenframe_matrix()?;
        model.average_position.rotation()?;
        problem.check_pivot(&model.pivot.point)?;
        if model.kind.uses_second_pivot() {
            problem.check_pivot(&model.second_pivot())?;
        }

        let layout = ParamLayout::for_model(&model);
        let mut all_constraints = LinearConstraints::for_model(&model, &layout);
        if let Some(extra) = constraints {
            all_constraints.extend(&extra)?;
        }
        all_constraints.check(&layout.pack(&model))?;

        info!(
            model = model.kind.name(),
            alignments = problem.alignment_count(),
            pcs = problem.pcs_count(),
            rdc = problem.rdc_count(),
            params = layout.len(),
            "Frame-order analysis set up."
        );
        let observed = problem.observed();
        Ok(Self {
            problem,
            observed,
            model,
            constraints: all_constraints,
            integration: IntegrationSettings::default(),
        })
    }

    /// Integration settings used by [`evaluate`](Self::evaluate) and
    /// [`back_calculate`](Self::back_calculate).
    pub fn with_integration(mut self, settings: IntegrationSettings) -> Self {
        self.integration = settings;
        self
    }

    pub fn model(&self) -> &FrameOrderModel {
        &self.model
    }

    pub fn problem(&self) -> &Problem {
        &self.problem
    }

    pub fn constraints(&self) -> &LinearConstraints {
        &self.constraints
    }

    pub fn layout(&self) -> ParamLayout {
        ParamLayout::for_model(&self.model)
    }

    pub fn param_names(&self) -> Vec<String> {
        self.layout().names()
    }

    /// The current parameter vector.
    pub fn params(&self) -> DVector<f64> {
        self.layout().pack(&self.model)
    }

    fn model_at(&self, params: &DVector<f64>) -> Result<FrameOrderModel, EngineError> {
        let layout = self.layout();
        if params.len() != layout.len() {
            return Err(EngineError::Validation(format!(
                "expected {} parameters, got {}",
                layout.len(),
                params.len()
            )));
        }
        let mut model = self.model.clone();
        layout.unpack(params, &mut model);
        Ok(model)
    }

    /// Chi-squared at `params`. Deterministic for fixed integration settings.
    pub fn evaluate(&self, params: &DVector<f64>) -> Result<f64, EngineError> {
        let model = self.model_at(params)?;
        let back = back_calculate(&self.problem, &model, &self.integration)?;
        Ok(chi_squared(&self.problem, &self.observed, &back))
    }

    /// Averaged observables at `params`, or at the current model when `None`.
    pub fn back_calculate(&self, params: Option<&DVector<f64>>) -> Result<BackCalculatedValues, EngineError> {
        let model = match params {
            Some(params) => self.model_at(params)?,
            None => self.model.clone(),
        };
        let back = back_calculate(&self.problem, &model, &self.integration)?;
        let chi2 = chi_squared(&self.problem, &self.observed, &back);
        let problem = &self.problem;

        let mut pcs = HashMap::new();
        let mut rdc = HashMap::new();
        for alignment in &problem.alignments {
            pcs.extend(problem.pcs_sites.iter().map(|site| ((alignment.id, site.spin), None)));
            rdc.extend(problem.rdc_sites.iter().map(|site| ((alignment.id, site.interatom), None)));
        }
        for (row, value) in problem.pcs_rows.iter().zip(&back.pcs) {
            let key = (problem.alignments[row.alignment].id, problem.pcs_sites[row.site].spin);
            pcs.insert(key, Some(*value));
        }
        for (row, value) in problem.rdc_rows.iter().zip(&back.rdc) {
            let key = (problem.alignments[row.alignment].id, problem.rdc_sites[row.site].interatom);
            rdc.insert(key, Some(*value));
        }
        let reduced = problem
            .alignments
            .iter()
            .zip(back.reduced)
            .filter_map(|(alignment, tensor)| tensor.map(|t| (alignment.id, t)))
            .collect();

        Ok(BackCalculatedValues { pcs, rdc, reduced, chi2 })
    }

    /// Runs the grid search and the staged local optimisation of `options` on the current model.
    #[instrument(skip_all, name = "frame_order_optimise")]
    pub fn optimise(
        &mut self,
        options: &OptimiseOptions,
        reporter: &ProgressReporter,
    ) -> Result<OptimisationResult, EngineError> {
        let diagnostics = optimise_model(
            &self.problem,
            &self.observed,
            &self.constraints,
            &mut self.model,
            options,
            reporter,
        )?;
        let chi2 = diagnostics
            .stages
            .last()
            .map(|stage| stage.chi2)
            .map_or_else(|| self.evaluate(&self.params()), Ok)?;
        self.model.chi2 = Some(chi2);
        info!(chi2, model = self.model.kind.name(), "Optimisation complete.");
        Ok(OptimisationResult {
            params: self.params(),
            chi2,
            diagnostics,
        })
    }

    /// Optimises against the PCS of every `stride`-th spin only, keeping all other data.
    pub(crate) fn optimise_subset(
        &mut self,
        stride: usize,
        options: &OptimiseOptions,
        reporter: &ProgressReporter,
    ) -> Result<Diagnostics, EngineError> {
        let subset = self.problem.pcs_subset(stride);
        let observed = subset.observed();
        debug!(stride, pcs = subset.pcs_count(), "Refining on a PCS subset.");
        optimise_model(&subset, &observed, &self.constraints, &mut self.model, options, reporter)
    }

    /// Monte-Carlo error propagation around the current model.
    #[instrument(skip_all, name = "frame_order_monte_carlo")]
    pub fn propagate_errors(
        &mut self,
        config: &MonteCarloConfig,
        reporter: &ProgressReporter,
    ) -> Result<MonteCarloSummary, EngineError> {
        let centre = self.params();
        let base = match config.data {
            SimulationData::Measured => self.observed.clone(),
            SimulationData::BackCalculated => {
                let back = back_calculate(&self.problem, &self.model, &config.optimise.integration)?;
                ObservedValues {
                    pcs: back.pcs,
                    rdc: back.rdc,
                    reduced: back
                        .reduced
                        .iter()
                        .map(|tensor| tensor.map(|t| t.to_array()))
                        .collect(),
                }
            }
        };
        let options = OptimiseOptions {
            grid: None,
            ..config.optimise.clone()
        };
        info!(replicas = config.replicas, seed = config.seed, "Starting Monte-Carlo simulations.");

        let problem = &self.problem;
        let constraints = &self.constraints;
        let model = &self.model;
        let results = reporter.phase("Monte-Carlo Simulations", || {
            monte_carlo::dispatch(config.replicas, reporter, |replica| {
                let mut rng = monte_carlo::replica_rng(config.seed, replica);
                let noisy = monte_carlo::perturb(problem, &base, &mut rng)?;
                let mut replica_options = options.clone();
                replica_options.integration.shift_seed = Some(monte_carlo::replica_shift(config.seed, replica));
                let mut replica_model = model.clone();
                optimise_model(
                    problem,
                    &noisy,
                    constraints,
                    &mut replica_model,
                    &replica_options,
                    &ProgressReporter::new(),
                )?;
                Ok(ParamLayout::for_model(&replica_model).pack(&replica_model))
            })
        });

        let summary = monte_carlo::summarise(self.param_names(), &centre, results);
        self.model.simulations = summary.replicas.clone();
        info!(
            succeeded = summary.replicas.len(),
            failed = summary.failed,
            "Monte-Carlo simulations complete."
        );
        Ok(summary)
    }

    /// Ensemble of moving-domain poses for `params`, or for the current model when `None`.
    pub fn distribute(
        &self,
        params: Option<&DVector<f64>>,
        config: &DistributionConfig,
    ) -> Result<Ensemble, EngineError> {
        let model = match params {
            Some(params) => self.model_at(params)?,
            None => self.model.clone(),
        };
        distribution::distribute(&model, config)
    }

    /// Projects the current pivot onto the rotation axis passing through `axis_point`.
    pub fn project_pivot(&self, axis_point: &Vector3<f64>) -> Result<PivotProjection, EngineError> {
        pivot::project_model_pivot(&self.model, axis_point)
    }

    /// Moves the pivot to its projection and fixes it there. The default constraints are
    /// rebuilt for the shorter parameter vector; caller-supplied rows are dropped.
    pub fn fix_pivot_at(&mut self, projection: &PivotProjection) -> Result<(), EngineError> {
        self.problem.check_pivot(&projection.projected)?;
        let mut model = self.model.clone();
        model.pivot.point = projection.projected;
        model.pivot.fixed = true;
        let layout = ParamLayout::for_model(&model);
        self.constraints = LinearConstraints::for_model(&model, &layout);
        self.model = model;
        Ok(())
    }
}

/// Grid search and staged refinement of `model` against `observed`.
pub(crate) fn optimise_model(
    problem: &Problem,
    observed: &ObservedValues,
    constraints: &LinearConstraints,
    model: &mut FrameOrderModel,
    options: &OptimiseOptions,
    reporter: &ProgressReporter,
) -> Result<Diagnostics, EngineError> {
    let mut diagnostics = Diagnostics::default();
    if ParamLayout::for_model(model).is_empty() {
        debug!("No free parameters; nothing to optimise.");
        return Ok(diagnostics);
    }

    if let Some(grid) = &options.grid {
        reporter.phase("Grid Search", || {
            grid_stage(problem, observed, constraints, model, grid, &options.integration, reporter, &mut diagnostics)
        })?;
    }

    if let Some(local) = &options.local {
        reporter.phase("Local Optimisation", || -> Result<(), EngineError> {
            reporter.report(Progress::TaskStart {
                total_steps: local.stages.len() as u64,
            });
            for (index, stage) in local.stages.iter().enumerate() {
                local_stage(
                    problem,
                    observed,
                    constraints,
                    model,
                    index,
                    stage,
                    local,
                    &options.integration,
                    reporter,
                    &mut diagnostics,
                )?;
                reporter.report(Progress::TaskIncrement);
            }
            reporter.report(Progress::TaskFinish);
            Ok(())
        })?;
    }
    Ok(diagnostics)
}

fn grid_axes(layout: &ParamLayout, current: &DVector<f64>, ranges: &[GridRange]) -> Result<Vec<Vec<f64>>, EngineError> {
    if let Some(range) = ranges.iter().find(|r| layout.index_of(r.param).is_none()) {
        return Err(EngineError::Validation(format!(
            "grid range for '{}', which is not a free parameter of the model",
            range.param.name()
        )));
    }
    Ok(layout
        .params()
        .iter()
        .enumerate()
        .map(|(i, param)| {
            let points = ranges
                .iter()
                .find(|r| r.param == *param)
                .map_or_else(|| vec![current[i]], GridRange::points);
            points.into_iter().map(|v| v / param.scale()).collect()
        })
        .collect())
}

#[allow(clippy::too_many_arguments)]
fn grid_stage(
    problem: &Problem,
    observed: &ObservedValues,
    constraints: &LinearConstraints,
    model: &mut FrameOrderModel,
    config: &GridSearchConfig,
    integration: &IntegrationSettings,
    reporter: &ProgressReporter,
    diagnostics: &mut Diagnostics,
) -> Result<(), EngineError> {
    let settings = integration.with_points(config.sobol_points);
    let target = Target::new(problem, observed, model, settings);
    let layout = target.layout().clone();
    let axes = grid_axes(&layout, &layout.pack(model), &config.ranges)?;
    let scaled = constraints.scaled(target.scaling());

    let outcome = grid::search(&target, &axes, Some(&scaled), reporter)?;
    layout.unpack(&target.from_scaled(&outcome.x), model);

    info!(
        chi2 = outcome.value,
        points = outcome.evaluated,
        rejected = outcome.rejected,
        "Grid search stage complete."
    );
    reporter.report(Progress::StageFinished {
        stage: "grid search".to_string(),
        chi2: outcome.value,
    });
    diagnostics.stages.push(StageRecord {
        name: "grid search".to_string(),
        sobol_points: Some(config.sobol_points),
        func_tol: 0.0,
        chi2: outcome.value,
        accepted_points: target.accepted_points(),
        iterations: 0,
        evaluations: target.evaluations(),
    });
    Ok(())
}

/// Simplex, followed by the gradient method when the target is smooth.
fn direct_then_gradient(
    objective: &dyn Objective,
    y: &DVector<f64>,
    local: &LocalOptimisationConfig,
    termination: &Termination,
) -> Result<MinimiserOutcome, EngineError> {
    let mut outcome = simplex::minimise(objective, y, termination)?;
    match local.gradient {
        Some(method) if objective.is_smooth() => {
            let refined = gradient::minimise(objective, &outcome.x, method, termination)?;
            outcome.iterations += refined.iterations;
            outcome.evaluations += refined.evaluations;
            outcome.warnings.extend(refined.warnings);
            if refined.value <= outcome.value {
                outcome.x = refined.x;
                outcome.value = refined.value;
                outcome.converged = refined.converged;
            }
        }
        Some(_) => debug!("Target is not smooth; skipping the gradient stage."),
        None => {}
    }
    Ok(outcome)
}

#[allow(clippy::too_many_arguments)]
fn local_stage(
    problem: &Problem,
    observed: &ObservedValues,
    constraints: &LinearConstraints,
    model: &mut FrameOrderModel,
    index: usize,
    stage: &StageConfig,
    local: &LocalOptimisationConfig,
    integration: &IntegrationSettings,
    reporter: &ProgressReporter,
    diagnostics: &mut Diagnostics,
) -> Result<(), EngineError> {
    let settings = integration.with_points(stage.sobol_points);
    let target = Target::new(problem, observed, model, settings);
    let layout = target.layout().clone();
    let y0 = target.to_scaled(&layout.pack(model));
    let start = target.value(&y0)?;
    let termination = Termination {
        func_tol: stage.func_tol,
        max_iterations: local.max_iterations,
        max_evaluations: local.max_evaluations,
    };
    let run = |objective: &dyn Objective, y: &DVector<f64>| direct_then_gradient(objective, y, local, &termination);

    let outcome = match local.constraints {
        ConstraintHandling::Multipliers if !constraints.is_empty() => multipliers::minimise(
            &target,
            &constraints.scaled(target.scaling()),
            &y0,
            &local.multipliers,
            stage.func_tol,
            run,
        )?,
        _ => run(&target, &y0)?,
    };

    layout.unpack(&target.from_scaled(&outcome.x), model);
    model.eigenframe = model.eigenframe.wrapped()?;
    model.average_position.euler = model.average_position.euler.wrapped()?;

    for warning in outcome.warnings {
        diagnostics.warn(format!("stage {index}: {warning}"));
    }
    if outcome.value > start {
        diagnostics.warn(format!(
            "stage {index}: target did not decrease ({start} -> {})",
            outcome.value
        ));
    }
    info!(
        stage = index,
        points = stage.sobol_points,
        chi2 = outcome.value,
        iterations = outcome.iterations,
        "Optimisation stage complete."
    );
    reporter.report(Progress::StageFinished {
        stage: format!("stage {index}"),
        chi2: outcome.value,
    });
    diagnostics.stages.push(StageRecord {
        name: format!("stage {index}"),
        sobol_points: Some(stage.sobol_points),
        func_tol: stage.func_tol,
        chi2: outcome.value,
        accepted_points: target.accepted_points(),
        iterations: outcome.iterations,
        evaluations: target.evaluations(),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::catalogue::{Amplitudes, ModelKind};
    use crate::core::geometry::EulerZyz;
    use crate::core::models::observation::Observation;
    use crate::core::models::spin::{Spin, SpinLabel};
    use crate::core::integration::quadrature::QuadratureTolerance;
    use crate::engine::config::{DistributionMethod, IntegrationMethod, StageConfig};
    use crate::engine::error::ErrorKind;
    use crate::engine::params::Param;
    use crate::engine::problem::tests::alignment;

    const TOLERANCE: f64 = 1e-9;

    fn positions() -> Vec<Vector3<f64>> {
        (0..10)
            .map(|i| {
                let t = i as f64;
                Vector3::new(8.0 + t.sin() * 4.0, -6.0 + 1.3 * t, 4.0 * (0.7 * t).cos())
            })
            .collect()
    }

    fn bundle(values: &[f64]) -> DataBundle {
        let mut bundle = DataBundle::new();
        let align = bundle.add_alignment(alignment());
        for (i, pos) in positions().into_iter().enumerate() {
            let observation = values
                .get(i)
                .map_or_else(Observation::missing, |v| Observation::new(*v, 0.1));
            bundle.add_spin(
                Spin::new(SpinLabel::new("C", i as isize + 1, "N"))
                    .with_position(pos)
                    .with_pcs(align, observation),
            );
        }
        bundle
    }

    fn rigid() -> FrameOrderModel {
        FrameOrderModel::new(ModelKind::Rigid, Vector3::new(2.0, 0.0, 0.0))
            .with_average_position(Vector3::new(0.4, -0.2, 0.3), EulerZyz::new(0.3, 0.5, -0.2))
    }

    /// Bundle whose PCS are exactly those of `model`.
    fn synthetic(model: &FrameOrderModel) -> DataBundle {
        let placeholder = bundle(&[0.0; 10]);
        let analysis = FrameOrderAnalysis::setup(&placeholder, model.clone(), None).unwrap();
        let back = back_calculate(analysis.problem(), analysis.model(), &IntegrationSettings::default()).unwrap();
        bundle(&back.pcs)
    }

    #[test]
    fn setup_takes_tensors_from_the_bundle() {
        let analysis = FrameOrderAnalysis::setup(&bundle(&[0.1; 10]), rigid(), None).unwrap();
        assert_eq!(analysis.model().tensors, vec![alignment().tensor]);
        assert_eq!(analysis.param_names().len(), 6);
    }

    #[test]
    fn setup_rejects_out_of_range_amplitudes() {
        let model = FrameOrderModel::new(ModelKind::IsoConeTorsionless, Vector3::zeros()).with_amplitudes(Amplitudes {
            cone_theta: 4.0,
            ..Amplitudes::default()
        });
        let err = FrameOrderAnalysis::setup(&bundle(&[0.1; 10]), model, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }

    #[test]
    fn setup_rejects_a_distant_pivot() {
        let model = FrameOrderModel::new(ModelKind::Rotor, Vector3::new(1.0e4, 0.0, 0.0));
        let err = FrameOrderAnalysis::setup(&bundle(&[0.1; 10]), model, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ConstraintViolation);
    }

    #[test]
    fn evaluate_rejects_wrong_parameter_count() {
        let analysis = FrameOrderAnalysis::setup(&bundle(&[0.1; 10]), rigid(), None).unwrap();
        let err = analysis.evaluate(&DVector::zeros(3)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn evaluate_is_repeatable_and_leaves_the_model_untouched() {
        let analysis = FrameOrderAnalysis::setup(&bundle(&[0.1; 10]), rigid(), None).unwrap();
        let before = analysis.params();
        let first = analysis.evaluate(&before).unwrap();
        let second = analysis.evaluate(&before).unwrap();
        assert_eq!(first.to_bits(), second.to_bits());
        assert_eq!(analysis.params(), before);
    }

    #[test]
    fn failed_replicas_are_reported_to_the_caller() {
        let rotor = FrameOrderModel::new(ModelKind::Rotor, Vector3::new(2.0, 0.0, 0.0))
            .with_average_position(Vector3::new(0.4, -0.2, 0.3), EulerZyz::new(0.3, 0.5, -0.2))
            .with_amplitudes(Amplitudes {
                cone_sigma_max: 0.5,
                ..Amplitudes::default()
            });
        let mut analysis = FrameOrderAnalysis::setup(&bundle(&[0.1; 10]), rotor, None).unwrap();
        // A single Gauss-Kronrod panel with zero tolerance can never converge.
        let integration = IntegrationSettings {
            method: IntegrationMethod::Quadrature,
            quadrature: QuadratureTolerance {
                absolute: 0.0,
                relative: 0.0,
                max_subdivisions: 1,
            },
            ..IntegrationSettings::default()
        };
        let config = MonteCarloConfig {
            replicas: 2,
            seed: 5,
            data: SimulationData::Measured,
            optimise: OptimiseOptions {
                integration,
                ..OptimiseOptions::default()
            },
        };

        let summary = analysis.propagate_errors(&config, &ProgressReporter::new()).unwrap();
        assert_eq!(summary.failed, 2);
        assert!(summary.replicas.is_empty());
        assert_eq!(summary.warnings.len(), 2);
        assert!(summary.warnings[0].starts_with("Monte-Carlo replica 0 failed"));
        assert!(summary.warnings[1].starts_with("Monte-Carlo replica 1 failed"));
        assert_eq!(summary.std, DVector::zeros(summary.names.len()));
    }

    #[test]
    fn back_calculation_marks_missing_cells() {
        let mut data = bundle(&[0.1; 10]);
        let mut second = alignment();
        second.name = "tb".to_string();
        let tb = data.add_alignment(second);
        let first = data.spins().next().map(|(id, _)| id).unwrap();
        data.spin_mut(first).unwrap().pcs.insert(tb, Observation::new(0.2, 0.1));

        let analysis = FrameOrderAnalysis::setup(&data, rigid(), None).unwrap();
        let back = analysis.back_calculate(None).unwrap();
        assert_eq!(back.pcs.len(), 20);
        assert_eq!(back.pcs.values().filter(|v| v.is_some()).count(), 11);
        assert!(back.pcs[&(tb, first)].is_some());
        assert!(back.rdc.is_empty());
        assert!((back.chi2 - analysis.evaluate(&analysis.params()).unwrap()).abs() < TOLERANCE);
    }

    #[test]
    fn optimise_recovers_the_average_position() {
        let truth = rigid();
        let data = synthetic(&truth);
        let start = FrameOrderModel::new(ModelKind::Rigid, truth.pivot.point)
            .with_average_position(Vector3::new(0.2, 0.0, 0.1), EulerZyz::new(0.25, 0.45, -0.1));
        let mut analysis = FrameOrderAnalysis::setup(&data, start, None).unwrap();
        let initial = analysis.evaluate(&analysis.params()).unwrap();

        let options = OptimiseOptions {
            local: Some(LocalOptimisationConfig {
                stages: vec![StageConfig::new(100, 1e-12)],
                constraints: ConstraintHandling::None,
                ..LocalOptimisationConfig::default()
            }),
            ..OptimiseOptions::default()
        };
        let result = analysis.optimise(&options, &ProgressReporter::new()).unwrap();
        assert!(result.chi2 < initial);
        assert!(result.chi2 < 1e-6);
        assert_eq!(result.diagnostics.stages.len(), 1);
        assert_eq!(analysis.model().chi2, Some(result.chi2));
    }

    #[test]
    fn stages_are_reported_with_their_chi2() {
        let events = std::sync::Mutex::new(Vec::new());
        let reporter = ProgressReporter::with_callback(Box::new(|event| {
            if let Progress::StageFinished { stage, chi2 } = event {
                events.lock().unwrap().push((stage, chi2));
            }
        }));
        let mut analysis = FrameOrderAnalysis::setup(&bundle(&[0.1; 10]), rigid(), None).unwrap();
        let options = OptimiseOptions {
            grid: Some(GridSearchConfig {
                ranges: vec![GridRange {
                    param: Param::AvePosX,
                    lower: -1.0,
                    upper: 1.0,
                    increment: 1.0,
                }],
                sobol_points: 10,
            }),
            local: Some(LocalOptimisationConfig {
                stages: vec![StageConfig::new(10, 1e-2)],
                max_iterations: 20,
                constraints: ConstraintHandling::None,
                ..LocalOptimisationConfig::default()
            }),
            ..OptimiseOptions::default()
        };
        let result = analysis.optimise(&options, &reporter).unwrap();
        drop(reporter);

        let events = events.into_inner().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].0, "grid search");
        assert_eq!(events[1].1, result.chi2);
        assert_eq!(result.diagnostics.chi2_history().len(), 2);
    }

    #[test]
    fn grid_rejects_ranges_for_pinned_parameters() {
        let model = rigid().with_pinned([Param::AvePosX]);
        let mut analysis = FrameOrderAnalysis::setup(&bundle(&[0.1; 10]), model, None).unwrap();
        let options = OptimiseOptions {
            grid: Some(GridSearchConfig {
                ranges: vec![GridRange {
                    param: Param::AvePosX,
                    lower: -1.0,
                    upper: 1.0,
                    increment: 1.0,
                }],
                sobol_points: 10,
            }),
            local: None,
            ..OptimiseOptions::default()
        };
        let err = analysis.optimise(&options, &ProgressReporter::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn rigid_models_cannot_be_distributed() {
        let analysis = FrameOrderAnalysis::setup(&bundle(&[0.1; 10]), rigid(), None).unwrap();
        let config = DistributionConfig {
            method: DistributionMethod::Uniform {
                total: 5,
                max_rotations: 100,
            },
            seed: 1,
        };
        assert!(analysis.distribute(None, &config).is_err());
    }

    #[test]
    fn pivot_projection_can_be_fixed() {
        let model = FrameOrderModel::new(ModelKind::Rotor, Vector3::new(1.0, 2.0, 3.0)).with_free_pivot();
        let mut analysis = FrameOrderAnalysis::setup(&bundle(&[0.1; 10]), model, None).unwrap();
        let free = analysis.param_names().len();
        let projection = analysis.project_pivot(&Vector3::zeros()).unwrap();
        assert!((projection.projected - Vector3::new(0.0, 0.0, 3.0)).norm() < TOLERANCE);

        analysis.fix_pivot_at(&projection).unwrap();
        assert_eq!(analysis.param_names().len(), free - 3);
        assert_eq!(analysis.model().pivot.point, projection.projected);
    }
}
