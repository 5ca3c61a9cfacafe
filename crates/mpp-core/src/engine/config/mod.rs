pub mod file;

use super::annealing::AnnealingSchedule;
use super::kernels::compound::SplitConfig;
use super::kernels::moves::MoveConfig;
use super::kernels::prior::MarkPrior;
use super::kernels::proposer::KernelWeights;
use super::kernels::KernelKind;
use super::termination::{PlateauConfig, TerminationConfig};
use crate::core::energy::terms::{TermParameterError, TermSpec};
use crate::core::models::mark::MarkKind;
use serde::{Deserialize, Serialize};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Invalid kernel weights: {0}")]
    InvalidKernelWeights(String),

    #[error("Kernel '{kernel}' cannot operate on {mark_kind} marks")]
    IncompatibleKernel {
        kernel: KernelKind,
        mark_kind: MarkKind,
    },

    #[error("Invalid annealing schedule: {0}")]
    InvalidSchedule(String),

    #[error("Invalid value for '{parameter}': {reason}")]
    InvalidParameter {
        parameter: &'static str,
        reason: String,
    },

    #[error("The energy scheme must contain at least one term")]
    EmptyScheme,

    #[error(transparent)]
    Term(#[from] TermParameterError),

    #[error("Unknown mark kind '{0}'")]
    UnknownMarkKind(String),

    #[error("Failed to parse configuration: {0}")]
    Parse(String),

    #[error("Failed to read configuration: {0}")]
    Io(String),
}

/// How the random generator of a run is seeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeedMode {
    Fixed(u64),
    /// Derive the seed from the system clock. The resolved seed is logged and reported.
    Clock,
}

impl SeedMode {
    pub fn resolve(&self) -> u64 {
        match self {
            SeedMode::Fixed(seed) => *seed,
            SeedMode::Clock => SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_nanos() as u64)
                .unwrap_or_default(),
        }
    }
}

/// One weighted entry of the energy term list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermEntry {
    #[serde(default = "default_weight")]
    pub weight: f64,
    #[serde(flatten)]
    pub term: TermSpec,
}

fn default_weight() -> f64 {
    1.0
}

impl TermEntry {
    pub fn new(term: TermSpec, weight: f64) -> Self {
        Self { weight, term }
    }
}

/// Everything the optimizer needs besides the image and the energy scheme.
#[derive(Debug, Clone, PartialEq)]
pub struct OptimizationConfig {
    pub kernels: KernelWeights,
    pub prior: MarkPrior,
    pub moves: MoveConfig,
    pub split: SplitConfig,
    pub annealing: AnnealingSchedule,
    pub termination: TerminationConfig,
    pub seed: SeedMode,
    /// Largest bounding-box gap at which two marks still interact.
    pub interaction_threshold: f64,
    /// Cell edge of the interaction grid. Derived from the prior when unset.
    pub grid_cell_size: Option<f64>,
    /// Run a full consistency check every this many iterations.
    pub consistency_check_interval: Option<u64>,
    pub consistency_tolerance: f64,
    pub max_error_rate: f64,
    pub min_iterations_for_error_rate: u64,
    /// Draw birth positions from the intensity-derived probability map when one is supplied.
    pub guided_birth: bool,
}

impl OptimizationConfig {
    pub fn effective_cell_size(&self) -> f64 {
        self.grid_cell_size
            .unwrap_or_else(|| 2.0 * self.prior.max_reach() + self.interaction_threshold)
    }
}

pub const DEFAULT_INTERACTION_THRESHOLD: f64 = 1.0;
pub const DEFAULT_CONSISTENCY_TOLERANCE: f64 = 1e-9;
pub const DEFAULT_MAX_ERROR_RATE: f64 = 0.5;
pub const DEFAULT_MIN_ITERATIONS_FOR_ERROR_RATE: u64 = 100;

#[derive(Default)]
pub struct OptimizationConfigBuilder {
    kernels: Option<KernelWeights>,
    prior: Option<MarkPrior>,
    moves: Option<MoveConfig>,
    split: Option<SplitConfig>,
    annealing: Option<AnnealingSchedule>,
    max_iterations: Option<u64>,
    deadline: Option<Duration>,
    plateau: Option<PlateauConfig>,
    seed: Option<SeedMode>,
    interaction_threshold: Option<f64>,
    grid_cell_size: Option<f64>,
    consistency_check_interval: Option<u64>,
    consistency_tolerance: Option<f64>,
    max_error_rate: Option<f64>,
    min_iterations_for_error_rate: Option<u64>,
    guided_birth: bool,
}

impl OptimizationConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn kernels(mut self, weights: KernelWeights) -> Self {
        self.kernels = Some(weights);
        self
    }
    pub fn prior(mut self, prior: MarkPrior) -> Self {
        self.prior = Some(prior);
        self
    }
    pub fn moves(mut self, moves: MoveConfig) -> Self {
        self.moves = Some(moves);
        self
    }
    pub fn split(mut self, split: SplitConfig) -> Self {
        self.split = Some(split);
        self
    }
    pub fn annealing(mut self, schedule: AnnealingSchedule) -> Self {
        self.annealing = Some(schedule);
        self
    }
    pub fn max_iterations(mut self, iterations: u64) -> Self {
        self.max_iterations = Some(iterations);
        self
    }
    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
    pub fn plateau(mut self, window: u64, min_improvement: f64) -> Self {
        self.plateau = Some(PlateauConfig {
            window,
            min_improvement,
        });
        self
    }
    pub fn seed(mut self, seed: SeedMode) -> Self {
        self.seed = Some(seed);
        self
    }
    pub fn interaction_threshold(mut self, threshold: f64) -> Self {
        self.interaction_threshold = Some(threshold);
        self
    }
    pub fn grid_cell_size(mut self, cell_size: f64) -> Self {
        self.grid_cell_size = Some(cell_size);
        self
    }
    pub fn consistency_check_interval(mut self, interval: u64) -> Self {
        self.consistency_check_interval = Some(interval);
        self
    }
    pub fn consistency_tolerance(mut self, tolerance: f64) -> Self {
        self.consistency_tolerance = Some(tolerance);
        self
    }
    pub fn max_error_rate(mut self, rate: f64) -> Self {
        self.max_error_rate = Some(rate);
        self
    }
    pub fn min_iterations_for_error_rate(mut self, iterations: u64) -> Self {
        self.min_iterations_for_error_rate = Some(iterations);
        self
    }
    pub fn guided_birth(mut self, guided: bool) -> Self {
        self.guided_birth = guided;
        self
    }

    pub fn build(self) -> Result<OptimizationConfig, ConfigError> {
        let config = OptimizationConfig {
            kernels: self
                .kernels
                .ok_or(ConfigError::MissingParameter("kernels"))?,
            prior: self.prior.ok_or(ConfigError::MissingParameter("prior"))?,
            moves: self.moves.unwrap_or_default(),
            split: self.split.unwrap_or_default(),
            annealing: self.annealing.unwrap_or_default(),
            termination: TerminationConfig {
                max_iterations: self
                    .max_iterations
                    .ok_or(ConfigError::MissingParameter("max_iterations"))?,
                deadline: self.deadline,
                plateau: self.plateau,
            },
            seed: self.seed.unwrap_or(SeedMode::Clock),
            interaction_threshold: self
                .interaction_threshold
                .unwrap_or(DEFAULT_INTERACTION_THRESHOLD),
            grid_cell_size: self.grid_cell_size,
            consistency_check_interval: self.consistency_check_interval,
            consistency_tolerance: self
                .consistency_tolerance
                .unwrap_or(DEFAULT_CONSISTENCY_TOLERANCE),
            max_error_rate: self.max_error_rate.unwrap_or(DEFAULT_MAX_ERROR_RATE),
            min_iterations_for_error_rate: self
                .min_iterations_for_error_rate
                .unwrap_or(DEFAULT_MIN_ITERATIONS_FOR_ERROR_RATE),
            guided_birth: self.guided_birth,
        };
        validate(&config)?;
        Ok(config)
    }
}

fn validate(config: &OptimizationConfig) -> Result<(), ConfigError> {
    let weights = &config.kernels;
    weights.validate()?;
    config.prior.validate()?;
    for kernel in weights.enabled() {
        if !kernel.is_compatible_with(config.prior.kind) {
            return Err(ConfigError::IncompatibleKernel {
                kernel,
                mark_kind: config.prior.kind,
            });
        }
    }
    if weights.get(KernelKind::Move) > 0.0 {
        config.moves.validate()?;
    }
    if weights.get(KernelKind::Split) > 0.0 || weights.get(KernelKind::Merge) > 0.0 {
        config.split.validate()?;
    }
    config.annealing.validate()?;
    config.termination.validate()?;

    if !(config.interaction_threshold.is_finite() && config.interaction_threshold >= 0.0) {
        return Err(ConfigError::InvalidParameter {
            parameter: "interaction_threshold",
            reason: format!(
                "must be finite and non-negative, got {}",
                config.interaction_threshold
            ),
        });
    }
    if let Some(cell) = config.grid_cell_size {
        if !(cell.is_finite() && cell > 0.0) {
            return Err(ConfigError::InvalidParameter {
                parameter: "grid_cell_size",
                reason: format!("must be finite and positive, got {}", cell),
            });
        }
    }
    if config.consistency_check_interval == Some(0) {
        return Err(ConfigError::InvalidParameter {
            parameter: "consistency_check_interval",
            reason: "must be positive".to_string(),
        });
    }
    if !(config.consistency_tolerance.is_finite() && config.consistency_tolerance > 0.0) {
        return Err(ConfigError::InvalidParameter {
            parameter: "consistency_tolerance",
            reason: format!(
                "must be finite and positive, got {}",
                config.consistency_tolerance
            ),
        });
    }
    if !(0.0..=1.0).contains(&config.max_error_rate) {
        return Err(ConfigError::InvalidParameter {
            parameter: "max_error_rate",
            reason: format!("must lie in [0, 1], got {}", config.max_error_rate),
        });
    }

    if weights.birth > 0.0 && weights.death == 0.0 && !config.annealing.is_greedy() {
        warn!(
            "Birth is enabled without death in a non-greedy run; the chain can only grow and does not sample the target distribution."
        );
    }
    Ok(())
}
