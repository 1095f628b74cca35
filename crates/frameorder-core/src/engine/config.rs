use super::params::Param;
use super::state::FrameOrderModel;
use crate::core::catalogue::ModelKind;
use crate::core::integration::quadrature::QuadratureTolerance;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid setting '{field}': {reason}")]
    Invalid { field: &'static str, reason: String },

    #[error("Failed to read '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse '{path}': {source}")]
    Toml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Toml {
        path: path.to_path_buf(),
        source,
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntegrationMethod {
    #[default]
    Sobol,
    Quadrature,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationSettings {
    pub method: IntegrationMethod,
    /// Accepted Sobol' points per evaluation.
    pub max_points: usize,
    /// Raw points drawn per accepted point before giving up.
    pub oversample: usize,
    pub quadrature: QuadratureTolerance,
    /// Digital shift of the Sobol' sequence; `None` uses the unshifted sequence.
    pub shift_seed: Option<u64>,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self {
            method: IntegrationMethod::Sobol,
            max_points: 200,
            oversample: 100,
            quadrature: QuadratureTolerance::default(),
            shift_seed: None,
        }
    }
}

impl IntegrationSettings {
    pub fn with_points(&self, max_points: usize) -> Self {
        Self {
            max_points,
            ..self.clone()
        }
    }
}

/// Lattice of one grid-search axis: `lower, lower + increment, ...` up to `upper`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridRange {
    pub param: Param,
    pub lower: f64,
    pub upper: f64,
    pub increment: f64,
}

impl GridRange {
    /// Lattice points from `lower` to `upper` inclusive; a non-positive increment gives `[lower]`.
    pub fn points(&self) -> Vec<f64> {
        if self.increment <= 0.0 || self.upper <= self.lower {
            return vec![self.lower];
        }
        let count = ((self.upper - self.lower) / self.increment + 1e-9).floor() as usize + 1;
        (0..count)
            .map(|i| self.lower + i as f64 * self.increment)
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridSearchConfig {
    /// Axes to scan. Parameters without a range stay at their current value.
    pub ranges: Vec<GridRange>,
    pub sobol_points: usize,
}

impl Default for GridSearchConfig {
    fn default() -> Self {
        Self {
            ranges: Vec::new(),
            sobol_points: 50,
        }
    }
}

impl GridSearchConfig {
    /// Scans `params` over their default bounds with `steps` lattice points each.
    ///
    /// Periodic angles skip the upper end so that `0` and `2pi` are not both visited.
    pub fn over_defaults(model: &FrameOrderModel, params: &[Param], steps: usize) -> Self {
        let ranges = params
            .iter()
            .map(|&param| {
                let (lower, upper) = param.default_bounds(model);
                let periodic = matches!(
                    param,
                    Param::AvePosAlpha | Param::AvePosGamma | Param::EigenAlpha | Param::EigenGamma
                );
                let intervals = if periodic { steps } else { steps.saturating_sub(1) }.max(1);
                let increment = (upper - lower) / intervals as f64;
                let upper = if periodic { upper - increment } else { upper };
                GridRange {
                    param,
                    lower,
                    upper,
                    increment,
                }
            })
            .collect();
        Self {
            ranges,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StageConfig {
    pub sobol_points: usize,
    pub func_tol: f64,
}

impl StageConfig {
    pub fn new(sobol_points: usize, func_tol: f64) -> Self {
        Self {
            sobol_points,
            func_tol,
        }
    }

    /// The standard refinement ladder.
    pub fn default_ladder() -> Vec<StageConfig> {
        vec![
            StageConfig::new(200, 1e-2),
            StageConfig::new(1000, 1e-3),
            StageConfig::new(10000, 1e-4),
            StageConfig::new(50000, 1e-4),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradientMethod {
    Bfgs,
    SteepestDescent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintHandling {
    /// Constraints are only checked on the starting point.
    None,
    #[default]
    Multipliers,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MultiplierConfig {
    pub initial_mu: f64,
    pub mu_factor: f64,
    pub min_mu: f64,
    pub func_tol: f64,
    pub max_iterations: usize,
}

impl Default for MultiplierConfig {
    fn default() -> Self {
        Self {
            initial_mu: 1.0,
            mu_factor: 0.1,
            min_mu: 1e-99,
            func_tol: 1e-25,
            max_iterations: 1000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalOptimisationConfig {
    pub stages: Vec<StageConfig>,
    /// Iteration cap of each minimiser run.
    pub max_iterations: usize,
    /// Function-evaluation budget of each minimiser run.
    pub max_evaluations: usize,
    pub gradient: Option<GradientMethod>,
    pub constraints: ConstraintHandling,
    pub multipliers: MultiplierConfig,
}

impl Default for LocalOptimisationConfig {
    fn default() -> Self {
        Self {
            stages: StageConfig::default_ladder(),
            max_iterations: 5000,
            max_evaluations: 50000,
            gradient: Some(GradientMethod::Bfgs),
            constraints: ConstraintHandling::Multipliers,
            multipliers: MultiplierConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimiseOptions {
    pub grid: Option<GridSearchConfig>,
    pub local: Option<LocalOptimisationConfig>,
    pub integration: IntegrationSettings,
}

impl Default for OptimiseOptions {
    fn default() -> Self {
        Self {
            grid: None,
            local: Some(LocalOptimisationConfig::default()),
            integration: IntegrationSettings::default(),
        }
    }
}

impl OptimiseOptions {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_toml(path)
    }
}

#[derive(Default)]
pub struct OptimiseOptionsBuilder {
    grid: Option<GridSearchConfig>,
    stages: Option<Vec<StageConfig>>,
    max_iterations: Option<usize>,
    max_evaluations: Option<usize>,
    gradient: Option<Option<GradientMethod>>,
    constraints: Option<ConstraintHandling>,
    integration: Option<IntegrationSettings>,
}

impl OptimiseOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grid(mut self, grid: GridSearchConfig) -> Self {
        self.grid = Some(grid);
        self
    }
    pub fn stages(mut self, stages: Vec<StageConfig>) -> Self {
        self.stages = Some(stages);
        self
    }
    pub fn max_iterations(mut self, iterations: usize) -> Self {
        self.max_iterations = Some(iterations);
        self
    }
    pub fn max_evaluations(mut self, evaluations: usize) -> Self {
        self.max_evaluations = Some(evaluations);
        self
    }
    pub fn gradient(mut self, method: Option<GradientMethod>) -> Self {
        self.gradient = Some(method);
        self
    }
    pub fn constraints(mut self, handling: ConstraintHandling) -> Self {
        self.constraints = Some(handling);
        self
    }
    pub fn integration(mut self, settings: IntegrationSettings) -> Self {
        self.integration = Some(settings);
        self
    }

    /// Builds the options. Local optimisation is enabled when stages are given; at least
    /// one of grid search and local optimisation is required.
    pub fn build(self) -> Result<OptimiseOptions, ConfigError> {
        let defaults = LocalOptimisationConfig::default();
        let local = match self.stages {
            Some(stages) if stages.is_empty() => {
                return Err(ConfigError::Invalid {
                    field: "stages",
                    reason: "at least one stage is required".to_string(),
                });
            }
            Some(stages) => Some(LocalOptimisationConfig {
                stages,
                max_iterations: self.max_iterations.unwrap_or(defaults.max_iterations),
                max_evaluations: self.max_evaluations.unwrap_or(defaults.max_evaluations),
                gradient: self.gradient.unwrap_or(defaults.gradient),
                constraints: self.constraints.unwrap_or(defaults.constraints),
                multipliers: defaults.multipliers,
            }),
            None => None,
        };
        if self.grid.is_none() && local.is_none() {
            return Err(ConfigError::MissingParameter("stages"));
        }
        Ok(OptimiseOptions {
            grid: self.grid,
            local,
            integration: self.integration.unwrap_or_default(),
        })
    }
}

/// Source of the noise-free values that Monte-Carlo replicas perturb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationData {
    #[default]
    BackCalculated,
    Measured,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonteCarloConfig {
    pub replicas: usize,
    pub seed: u64,
    pub data: SimulationData,
    pub optimise: OptimiseOptions,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            replicas: 500,
            seed: 0,
            data: SimulationData::BackCalculated,
            optimise: OptimiseOptions::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "method")]
pub enum DistributionMethod {
    Brownian {
        /// Rotation applied at each step, in radians.
        step_angle: f64,
        /// Steps between two recorded snapshots.
        snapshot: usize,
        /// Number of poses in the ensemble.
        total: usize,
    },
    Uniform {
        total: usize,
        max_rotations: usize,
    },
    /// Linear sweep of each motional mode from `-amplitude` to `amplitude`.
    Modes {
        /// Angle between successive poses, used when `total` is unset.
        increment: f64,
        total: Option<usize>,
        reverse: bool,
        /// Sweep out and back again.
        mirror: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub method: DistributionMethod,
    pub seed: u64,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            method: DistributionMethod::Brownian {
                step_angle: 2f64.to_radians(),
                snapshot: 10,
                total: 1000,
            },
            seed: 0,
        }
    }
}

/// Settings of the nested-model protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    pub models: Vec<ModelKind>,
    pub include_double_rotor: bool,
    /// Sobol' points used during grid searches.
    pub grid_points: usize,
    /// Lattice points per newly introduced parameter.
    pub grid_steps: usize,
    /// Sobol' ladder of the refinement on the PCS subset.
    pub subset_points: Vec<usize>,
    /// Keep every n-th PCS spin during the subset refinement.
    pub subset_stride: usize,
    /// Sobol' ladder of the refinement on the full data.
    pub full_points: Vec<usize>,
    /// Function tolerance of each rung; the last value is repeated for longer ladders.
    pub func_tol: Vec<f64>,
    pub max_iterations: usize,
    pub gradient: Option<GradientMethod>,
}

impl Default for ProtocolConfig {
    fn default() -> Self {
        Self {
            models: vec![
                ModelKind::Rigid,
                ModelKind::Rotor,
                ModelKind::FreeRotor,
                ModelKind::IsoConeTorsionless,
                ModelKind::IsoConeFreeRotor,
                ModelKind::IsoCone,
                ModelKind::PseudoEllipseTorsionless,
                ModelKind::PseudoEllipseFreeRotor,
                ModelKind::PseudoEllipse,
            ],
            include_double_rotor: false,
            grid_points: 50,
            grid_steps: 11,
            subset_points: vec![20, 100],
            subset_stride: 10,
            full_points: vec![100, 1000, 200000],
            func_tol: vec![1e-2, 1e-3, 1e-4],
            max_iterations: 5000,
            gradient: Some(GradientMethod::Bfgs),
        }
    }
}

impl ProtocolConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        load_toml(path)
    }

    pub(crate) fn ladder(&self, points: &[usize]) -> Vec<StageConfig> {
        let last_tol = self.func_tol.last().copied().unwrap_or(1e-4);
        points
            .iter()
            .enumerate()
            .map(|(i, &n)| StageConfig::new(n, self.func_tol.get(i).copied().unwrap_or(last_tol)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn default_ladder_tightens_tolerance_as_points_grow() {
        let ladder = StageConfig::default_ladder();
        assert_eq!(
            ladder.iter().map(|s| s.sobol_points).collect::<Vec<_>>(),
            vec![200, 1000, 10000, 50000]
        );
        assert!(ladder.windows(2).all(|w| w[1].func_tol <= w[0].func_tol));
    }

    #[test]
    fn builder_requires_some_optimisation_step() {
        let err = OptimiseOptionsBuilder::new().build().unwrap_err();
        assert!(matches!(err, ConfigError::MissingParameter("stages")));
    }

    #[test]
    fn builder_rejects_an_empty_ladder() {
        let err = OptimiseOptionsBuilder::new().stages(vec![]).build().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "stages", .. }));
    }

    #[test]
    fn builder_fills_unset_local_settings_with_defaults() {
        let options = OptimiseOptionsBuilder::new()
            .stages(vec![StageConfig::new(100, 1e-3)])
            .gradient(None)
            .build()
            .unwrap();
        let local = options.local.unwrap();
        assert_eq!(local.gradient, None);
        assert_eq!(local.max_iterations, LocalOptimisationConfig::default().max_iterations);
        assert!(options.grid.is_none());
    }

    #[test]
    fn optimise_options_load_from_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("optimise.toml");
        fs::write(
            &path,
            r#"
[integration]
method = "quadrature"

[local]
max_iterations = 250
gradient = "steepest_descent"
stages = [
    { sobol_points = 100, func_tol = 1e-2 },
    { sobol_points = 500, func_tol = 1e-3 },
]
"#,
        )
        .unwrap();

        let options = OptimiseOptions::load(&path).unwrap();
        assert_eq!(options.integration.method, IntegrationMethod::Quadrature);
        assert_eq!(options.integration.max_points, 200);
        let local = options.local.unwrap();
        assert_eq!(local.max_iterations, 250);
        assert_eq!(local.gradient, Some(GradientMethod::SteepestDescent));
        assert_eq!(local.stages.len(), 2);
        assert_eq!(local.constraints, ConstraintHandling::Multipliers);
    }

    #[test]
    fn missing_file_reports_its_path() {
        let err = OptimiseOptions::load(Path::new("/nonexistent/options.toml")).unwrap_err();
        match err {
            ConfigError::Io { path, .. } => assert!(path.ends_with("options.toml")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn malformed_protocol_file_is_a_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("protocol.toml");
        fs::write(&path, "models = [\"cone of doom\"]").unwrap();
        assert!(matches!(
            ProtocolConfig::load(&path),
            Err(ConfigError::Toml { .. })
        ));
    }

    #[test]
    fn protocol_ladder_repeats_the_last_tolerance() {
        let config = ProtocolConfig {
            func_tol: vec![1e-2, 1e-3],
            ..Default::default()
        };
        let ladder = config.ladder(&[10, 20, 30]);
        assert_eq!(ladder[2].func_tol, 1e-3);
        assert_eq!(ladder[2].sobol_points, 30);
    }

    #[test]
    fn default_grid_skips_the_periodic_endpoint() {
        let model = FrameOrderModel::new(ModelKind::Rotor, nalgebra::Vector3::zeros());
        let grid = GridSearchConfig::over_defaults(
            &model,
            &[Param::EigenAlpha, Param::Amplitude(crate::core::catalogue::AmplitudeParam::ConeSigmaMax)],
            4,
        );
        let alpha = grid.ranges[0];
        assert!((alpha.increment - std::f64::consts::TAU / 4.0).abs() < 1e-12);
        assert!(alpha.upper < std::f64::consts::TAU);
        let sigma = grid.ranges[1];
        assert!((sigma.increment - std::f64::consts::PI / 3.0).abs() < 1e-12);
    }
}
