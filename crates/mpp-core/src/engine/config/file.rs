use super::{ConfigError, OptimizationConfig, OptimizationConfigBuilder, SeedMode, TermEntry};
use crate::engine::annealing::AnnealingSchedule;
use crate::engine::kernels::compound::SplitConfig;
use crate::engine::kernels::moves::MoveConfig;
use crate::engine::kernels::prior::MarkPrior;
use crate::engine::kernels::proposer::KernelWeights;
use crate::core::models::mark::MarkKind;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// A run configuration as read from TOML: the optimizer settings plus the term list.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub optimization: OptimizationConfig,
    pub terms: Vec<TermEntry>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct FileConfig {
    seed: Option<FileSeed>,
    interaction_threshold: Option<f64>,
    grid_cell_size: Option<f64>,
    consistency_check_interval: Option<u64>,
    consistency_tolerance: Option<f64>,
    max_error_rate: Option<f64>,
    min_iterations_for_error_rate: Option<u64>,
    #[serde(default)]
    guided_birth: bool,
    kernels: FileKernels,
    prior: FilePrior,
    moves: Option<FileMoves>,
    split: Option<FileSplit>,
    annealing: Option<AnnealingSchedule>,
    termination: FileTermination,
    #[serde(default)]
    terms: Vec<TermEntry>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum FileSeed {
    Fixed(u64),
    Named(String),
}

impl TryFrom<FileSeed> for SeedMode {
    type Error = ConfigError;

    fn try_from(seed: FileSeed) -> Result<Self, Self::Error> {
        match seed {
            FileSeed::Fixed(seed) => Ok(SeedMode::Fixed(seed)),
            FileSeed::Named(name) if name == "clock" => Ok(SeedMode::Clock),
            FileSeed::Named(name) => Err(ConfigError::InvalidParameter {
                parameter: "seed",
                reason: format!("expected an integer or \"clock\", got \"{}\"", name),
            }),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields)]
struct FileKernels {
    #[serde(default)]
    birth: f64,
    #[serde(default)]
    death: f64,
    #[serde(default, rename = "move")]
    moves: f64,
    #[serde(default)]
    exchange: f64,
    #[serde(default)]
    split: f64,
    #[serde(default)]
    merge: f64,
}

impl From<FileKernels> for KernelWeights {
    fn from(k: FileKernels) -> Self {
        Self {
            birth: k.birth,
            death: k.death,
            moves: k.moves,
            exchange: k.exchange,
            split: k.split,
            merge: k.merge,
        }
    }
}

/// A size bound given either as one value for every axis or per axis.
#[derive(Deserialize, Debug, Clone)]
#[serde(untagged)]
enum FileSize {
    Uniform(f64),
    PerAxis(Vec<f64>),
}

impl FileSize {
    fn resolve(self, kind: MarkKind, parameter: &'static str) -> Result<[f64; 3], ConfigError> {
        match self {
            FileSize::Uniform(value) => Ok([value; 3]),
            FileSize::PerAxis(values) => {
                let count = kind.size_parameter_count();
                if values.len() != count {
                    return Err(ConfigError::InvalidParameter {
                        parameter,
                        reason: format!(
                            "{} marks take {} size values, got {}",
                            kind,
                            count,
                            values.len()
                        ),
                    });
                }
                let mut dims = [values[0]; 3];
                dims[..count].copy_from_slice(&values);
                Ok(dims)
            }
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct FilePrior {
    kind: String,
    min_size: FileSize,
    max_size: FileSize,
}

impl TryFrom<FilePrior> for MarkPrior {
    type Error = ConfigError;

    fn try_from(p: FilePrior) -> Result<Self, Self::Error> {
        let kind = MarkKind::from_name(&p.kind).ok_or(ConfigError::UnknownMarkKind(p.kind))?;
        Ok(MarkPrior {
            kind,
            min_size: p.min_size.resolve(kind, "prior.min-size")?,
            max_size: p.max_size.resolve(kind, "prior.max-size")?,
        })
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct FileMoves {
    max_translation: Option<f64>,
    max_resize: Option<f64>,
    max_rotation: Option<f64>,
}

impl From<FileMoves> for MoveConfig {
    fn from(m: FileMoves) -> Self {
        let defaults = MoveConfig::default();
        Self {
            max_translation: m.max_translation.unwrap_or(defaults.max_translation),
            max_resize: m.max_resize.unwrap_or(defaults.max_resize),
            max_rotation: m.max_rotation.unwrap_or(defaults.max_rotation),
        }
    }
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct FileSplit {
    scale: Option<f64>,
    max_offset: Option<f64>,
}

impl From<FileSplit> for SplitConfig {
    fn from(s: FileSplit) -> Self {
        let defaults = SplitConfig::default();
        Self {
            scale: s.scale.unwrap_or(defaults.scale),
            max_offset: s.max_offset.unwrap_or(defaults.max_offset),
        }
    }
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct FileTermination {
    max_iterations: u64,
    deadline_seconds: Option<f64>,
    plateau: Option<FilePlateau>,
}

#[derive(Deserialize, Debug, Clone)]
#[serde(deny_unknown_fields, rename_all = "kebab-case")]
struct FilePlateau {
    window: u64,
    min_improvement: f64,
}

impl FileConfig {
    fn into_config_file(self) -> Result<ConfigFile, ConfigError> {
        let mut builder = OptimizationConfigBuilder::new()
            .kernels(self.kernels.into())
            .prior(self.prior.try_into()?)
            .max_iterations(self.termination.max_iterations)
            .guided_birth(self.guided_birth);

        if let Some(seed) = self.seed {
            builder = builder.seed(seed.try_into()?);
        }
        if let Some(threshold) = self.interaction_threshold {
            builder = builder.interaction_threshold(threshold);
        }
        if let Some(cell) = self.grid_cell_size {
            builder = builder.grid_cell_size(cell);
        }
        if let Some(interval) = self.consistency_check_interval {
            builder = builder.consistency_check_interval(interval);
        }
        if let Some(tolerance) = self.consistency_tolerance {
            builder = builder.consistency_tolerance(tolerance);
        }
        if let Some(rate) = self.max_error_rate {
            builder = builder.max_error_rate(rate);
        }
        if let Some(iterations) = self.min_iterations_for_error_rate {
            builder = builder.min_iterations_for_error_rate(iterations);
        }
        if let Some(moves) = self.moves {
            builder = builder.moves(moves.into());
        }
        if let Some(split) = self.split {
            builder = builder.split(split.into());
        }
        if let Some(schedule) = self.annealing {
            builder = builder.annealing(schedule);
        }
        if let Some(seconds) = self.termination.deadline_seconds {
            let deadline =
                Duration::try_from_secs_f64(seconds).map_err(|e| ConfigError::InvalidParameter {
                    parameter: "termination.deadline-seconds",
                    reason: e.to_string(),
                })?;
            builder = builder.deadline(deadline);
        }
        if let Some(plateau) = self.termination.plateau {
            builder = builder.plateau(plateau.window, plateau.min_improvement);
        }

        Ok(ConfigFile {
            optimization: builder.build()?,
            terms: self.terms,
        })
    }
}

pub fn load_from_str(contents: &str) -> Result<ConfigFile, ConfigError> {
    let file: FileConfig =
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))?;
    file.into_config_file()
}

pub fn load_from_path(path: &Path) -> Result<ConfigFile, ConfigError> {
    debug!(path = %path.display(), "Loading run configuration");
    let contents = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {}", path.display(), e)))?;
    load_from_str(&contents)
}
