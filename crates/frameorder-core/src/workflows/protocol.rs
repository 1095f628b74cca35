use super::analysis::FrameOrderAnalysis;
use crate::core::catalogue::{AmplitudeParam, Amplitudes, ModelKind};
use crate::core::models::bundle::DataBundle;
use crate::engine::config::{GridSearchConfig, LocalOptimisationConfig, OptimiseOptions, ProtocolConfig};
use crate::engine::error::EngineError;
use crate::engine::params::{Param, ParamLayout};
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::state::{Diagnostics, FrameOrderModel};
use tracing::{info, instrument};

/// One fitted model of the nested sequence.
#[derive(Debug, Clone)]
pub struct ProtocolEntry {
    pub model: FrameOrderModel,
    pub chi2: f64,
    /// Number of free parameters.
    pub k: usize,
    /// Akaike information criterion, `chi2 + 2k`.
    pub aic: f64,
    pub diagnostics: Diagnostics,
}

#[derive(Debug, Clone, Default)]
pub struct ProtocolOutcome {
    pub entries: Vec<ProtocolEntry>,
}

impl ProtocolOutcome {
    /// The entry with the lowest AIC; ties keep the simpler, earlier model.
    pub fn best(&self) -> Option<&ProtocolEntry> {
        self.entries
            .iter()
            .fold(None, |best: Option<&ProtocolEntry>, entry| match best {
                Some(current) if current.aic <= entry.aic => Some(current),
                _ => Some(entry),
            })
    }

    pub fn entry(&self, kind: ModelKind) -> Option<&ProtocolEntry> {
        self.entries.iter().find(|e| e.model.kind == kind)
    }
}

fn latest<'a>(entries: &'a [ProtocolEntry], pred: impl Fn(&FrameOrderModel) -> bool) -> Option<&'a FrameOrderModel> {
    entries.iter().rev().map(|e| &e.model).find(|m| pred(m))
}

/// Initial state of `kind`, inherited from the models fitted before it.
fn seed(kind: ModelKind, template: &FrameOrderModel, entries: &[ProtocolEntry]) -> FrameOrderModel {
    let mut model = template.clone();
    model.kind = kind;
    model.amplitudes = Amplitudes::defaults_for(kind);
    model.chi2 = None;
    model.simulations.clear();

    if let Some(rigid) = latest(entries, |m| m.kind.is_rigid()) {
        model.average_position = rigid.average_position;
    }
    if let Some(previous) = entries.last() {
        model.pivot.point = previous.model.pivot.point;
        if model.tensors_floated {
            model.tensors = previous.model.tensors.clone();
        }
    }
    if let Some(axis) = latest(entries, |m| !m.kind.is_rigid()) {
        model.eigenframe = axis.eigenframe;
    }

    for &param in kind.amplitude_params() {
        let inherited = latest(entries, |m| m.kind.amplitude_params().contains(&param))
            .map(|m| m.amplitudes.get(param))
            .or_else(|| match param {
                AmplitudeParam::ConeThetaX | AmplitudeParam::ConeThetaY => {
                    latest(entries, |m| m.kind.amplitude_params().contains(&AmplitudeParam::ConeTheta))
                        .map(|m| m.amplitudes.cone_theta)
                }
                _ => None,
            });
        if let Some(value) = inherited {
            model.amplitudes.set(param, value);
        }
    }
    model
}

/// Parameters scanned by the grid search of `kind`: the ones earlier models could not seed.
fn grid_params(kind: ModelKind, entries: &[ProtocolEntry]) -> Vec<Param> {
    let has = |pred: fn(ModelKind) -> bool| entries.iter().any(|e| pred(e.model.kind));
    let mut params = Vec::new();
    if kind.is_rigid() {
        params.extend([Param::AvePosAlpha, Param::AvePosBeta, Param::AvePosGamma]);
        return params;
    }
    if !has(|k| !k.is_rigid()) {
        params.extend([Param::EigenAlpha, Param::EigenBeta]);
    }
    if matches!(
        kind,
        ModelKind::PseudoEllipse | ModelKind::PseudoEllipseTorsionless | ModelKind::PseudoEllipseFreeRotor
    ) {
        params.push(Param::EigenGamma);
    }
    for &amplitude in kind.amplitude_params() {
        let seeded = entries
            .iter()
            .any(|e| e.model.kind.amplitude_params().contains(&amplitude));
        if !seeded {
            params.push(Param::Amplitude(amplitude));
        }
    }
    params
}

fn options(config: &ProtocolConfig, grid: Option<GridSearchConfig>, points: &[usize]) -> OptimiseOptions {
    OptimiseOptions {
        grid,
        local: Some(LocalOptimisationConfig {
            stages: config.ladder(points),
            max_iterations: config.max_iterations,
            gradient: config.gradient,
            ..LocalOptimisationConfig::default()
        }),
        ..OptimiseOptions::default()
    }
}

/// Fits the nested model sequence of `config` to `bundle` and ranks the models by AIC.
///
/// `template` supplies everything the sequence does not fit itself: the pivot and whether it
/// floats, the second-pivot offset, tensors, pinned parameters and the reference domain.
#[instrument(skip_all, name = "frame_order_protocol")]
pub fn run(
    bundle: &DataBundle,
    template: &FrameOrderModel,
    config: &ProtocolConfig,
    reporter: &ProgressReporter,
) -> Result<ProtocolOutcome, EngineError> {
    let mut kinds = config.models.clone();
    if config.include_double_rotor && !kinds.contains(&ModelKind::DoubleRotor) {
        kinds.push(ModelKind::DoubleRotor);
    }
    if kinds.is_empty() {
        return Err(EngineError::Validation("the protocol has no models to fit".to_string()));
    }

    let mut outcome = ProtocolOutcome::default();
    reporter.report(Progress::TaskStart {
        total_steps: kinds.len() as u64,
    });
    for kind in kinds {
        // === Phase 1: Inherit the starting point ===
        let model = seed(kind, template, &outcome.entries);
        let mut analysis = FrameOrderAnalysis::setup(bundle, model, None)?;

        // === Phase 2: Grid search and refinement on the PCS subset ===
        let free: Vec<Param> = grid_params(kind, &outcome.entries)
            .into_iter()
            .filter(|p| analysis.layout().index_of(*p).is_some())
            .collect();
        let grid = (!free.is_empty()).then(|| GridSearchConfig {
            sobol_points: config.grid_points,
            ..GridSearchConfig::over_defaults(analysis.model(), &free, config.grid_steps)
        });
        let mut diagnostics = Diagnostics::default();
        let grid = if analysis.problem().has_pcs() && !config.subset_points.is_empty() {
            let subset = options(config, grid, &config.subset_points);
            let record = analysis.optimise_subset(config.subset_stride, &subset, reporter)?;
            diagnostics.stages.extend(record.stages);
            diagnostics.warnings.extend(record.warnings);
            None
        } else {
            grid
        };

        // === Phase 3: Refinement on the full data ===
        let full = options(config, grid, &config.full_points);
        let result = analysis.optimise(&full, reporter)?;
        diagnostics.stages.extend(result.diagnostics.stages);
        diagnostics.warnings.extend(result.diagnostics.warnings);

        let k = ParamLayout::for_model(analysis.model()).len();
        let aic = result.chi2 + 2.0 * k as f64;
        info!(model = kind.name(), chi2 = result.chi2, k, aic, "Model fitted.");
        reporter.report(Progress::ModelFitted {
            model: kind.name(),
            chi2: result.chi2,
            aic,
        });
        outcome.entries.push(ProtocolEntry {
            model: analysis.model().clone(),
            chi2: result.chi2,
            k,
            aic,
            diagnostics,
        });
        reporter.report(Progress::TaskIncrement);
    }
    reporter.report(Progress::TaskFinish);

    if let Some(best) = outcome.best() {
        info!(model = best.model.kind.name(), aic = best.aic, "Best model by AIC.");
    }
    Ok(outcome)
}
