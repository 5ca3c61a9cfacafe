use super::potentials;
use super::scoring::ScoringError;
use super::term::{EnergyTerm, MarkRef, TermContext, TermScope};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq)]
#[error("Invalid parameter '{parameter}' for term '{term}': {reason}")]
pub struct TermParameterError {
    pub term: &'static str,
    pub parameter: &'static str,
    pub reason: String,
}

impl TermParameterError {
    fn new(term: &'static str, parameter: &'static str, reason: impl Into<String>) -> Self {
        Self {
            term,
            parameter,
            reason: reason.into(),
        }
    }
}

fn require_positive(term: &'static str, parameter: &'static str, value: f64) -> Result<f64, TermParameterError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(TermParameterError::new(
            term,
            parameter,
            format!("must be finite and positive, got {}", value),
        ))
    }
}

/// Constant cost of one per mark.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkCount;

impl MarkCount {
    pub const NAME: &'static str = "mark-count";
}

impl EnergyTerm for MarkCount {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn scope(&self) -> TermScope {
        TermScope::Unary
    }

    fn score_mark(&self, _mark: MarkRef<'_>, _ctx: &TermContext<'_>) -> Result<f64, ScoringError> {
        Ok(1.0)
    }
}

/// Data term: `(threshold - mean) / scale` over the voxels inside the mark.
///
/// Marks brighter than the threshold lower the energy. A mark that covers no voxel
/// cannot be scored.
#[derive(Debug, Clone, Copy)]
pub struct IntensityContrast {
    threshold: f64,
    scale: f64,
}

impl IntensityContrast {
    pub const NAME: &'static str = "intensity-contrast";

    pub fn new(threshold: f64, scale: f64) -> Result<Self, TermParameterError> {
        if !threshold.is_finite() {
            return Err(TermParameterError::new(Self::NAME, "threshold", "must be finite"));
        }
        let scale = require_positive(Self::NAME, "scale", scale)?;
        Ok(Self { threshold, scale })
    }
}

impl EnergyTerm for IntensityContrast {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn scope(&self) -> TermScope {
        TermScope::Unary
    }

    fn score_mark(&self, mark: MarkRef<'_>, ctx: &TermContext<'_>) -> Result<f64, ScoringError> {
        let mean = ctx
            .voxel_stats(mark)
            .mean()
            .ok_or(ScoringError::OutsideStack(mark.id))?;
        Ok(potentials::contrast(mean, self.threshold, self.scale))
    }
}

/// Quadratic penalty on mark volumes outside `[min_volume, max_volume]`.
#[derive(Debug, Clone, Copy)]
pub struct SizePrior {
    min_volume: f64,
    max_volume: f64,
}

impl SizePrior {
    pub const NAME: &'static str = "size-prior";

    pub fn new(min_volume: f64, max_volume: f64) -> Result<Self, TermParameterError> {
        if !(min_volume.is_finite() && min_volume >= 0.0) {
            return Err(TermParameterError::new(
                Self::NAME,
                "min-volume",
                "must be finite and non-negative",
            ));
        }
        if !(max_volume.is_finite() && max_volume >= min_volume) {
            return Err(TermParameterError::new(
                Self::NAME,
                "max-volume",
                format!("must be finite and at least min-volume ({})", min_volume),
            ));
        }
        Ok(Self {
            min_volume,
            max_volume,
        })
    }
}

impl EnergyTerm for SizePrior {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn scope(&self) -> TermScope {
        TermScope::Unary
    }

    fn score_mark(&self, mark: MarkRef<'_>, _ctx: &TermContext<'_>) -> Result<f64, ScoringError> {
        Ok(potentials::quadratic_outside(
            mark.mark.volume(),
            self.min_volume,
            self.max_volume,
        ))
    }
}

/// Number of voxels shared by two marks.
#[derive(Debug, Clone, Copy, Default)]
pub struct OverlapPenalty;

impl OverlapPenalty {
    pub const NAME: &'static str = "overlap";
}

impl EnergyTerm for OverlapPenalty {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn scope(&self) -> TermScope {
        TermScope::Pairwise
    }

    fn score_pair(
        &self,
        first: MarkRef<'_>,
        second: MarkRef<'_>,
        ctx: &TermContext<'_>,
    ) -> Result<f64, ScoringError> {
        for mark in [first, second] {
            if mark.mark.volume() <= 0.0 {
                return Err(ScoringError::DegenerateMark(mark.id));
            }
        }
        Ok(ctx.shared_voxels(first, second) as f64)
    }
}

/// Penalty decreasing linearly with center distance, zero beyond `radius`.
#[derive(Debug, Clone, Copy)]
pub struct ProximityRepulsion {
    radius: f64,
    strength: f64,
}

impl ProximityRepulsion {
    pub const NAME: &'static str = "proximity";

    pub fn new(radius: f64, strength: f64) -> Result<Self, TermParameterError> {
        let radius = require_positive(Self::NAME, "radius", radius)?;
        if !strength.is_finite() {
            return Err(TermParameterError::new(Self::NAME, "strength", "must be finite"));
        }
        Ok(Self { radius, strength })
    }
}

impl EnergyTerm for ProximityRepulsion {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn scope(&self) -> TermScope {
        TermScope::Pairwise
    }

    fn score_pair(
        &self,
        first: MarkRef<'_>,
        second: MarkRef<'_>,
        _ctx: &TermContext<'_>,
    ) -> Result<f64, ScoringError> {
        let distance = (first.mark.center - second.mark.center).norm();
        Ok(potentials::linear_ramp(distance, self.radius, self.strength))
    }
}

fn default_scale() -> f64 {
    1.0
}

fn default_strength() -> f64 {
    1.0
}

/// Declarative description of a built-in term, as written in run configuration files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    rename_all = "kebab-case",
    rename_all_fields = "kebab-case"
)]
pub enum TermSpec {
    MarkCount,
    IntensityContrast {
        threshold: f64,
        #[serde(default = "default_scale")]
        scale: f64,
    },
    SizePrior {
        min_volume: f64,
        max_volume: f64,
    },
    #[serde(alias = "overlap")]
    OverlapPenalty,
    #[serde(alias = "proximity")]
    ProximityRepulsion {
        radius: f64,
        #[serde(default = "default_strength")]
        strength: f64,
    },
}

impl TermSpec {
    pub fn build(&self) -> Result<Box<dyn EnergyTerm>, TermParameterError> {
        Ok(match *self {
            TermSpec::MarkCount => Box::new(MarkCount),
            TermSpec::IntensityContrast { threshold, scale } => {
                Box::new(IntensityContrast::new(threshold, scale)?)
            }
            TermSpec::SizePrior {
                min_volume,
                max_volume,
            } => Box::new(SizePrior::new(min_volume, max_volume)?),
            TermSpec::OverlapPenalty => Box::new(OverlapPenalty),
            TermSpec::ProximityRepulsion { radius, strength } => {
                Box::new(ProximityRepulsion::new(radius, strength)?)
            }
        })
    }
}
