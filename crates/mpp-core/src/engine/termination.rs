use super::config::ConfigError;
use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};

/// Stop when the best energy has not improved by more than `min_improvement` for `window` iterations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlateauConfig {
    pub window: u64,
    pub min_improvement: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerminationConfig {
    pub max_iterations: u64,
    pub deadline: Option<Duration>,
    pub plateau: Option<PlateauConfig>,
}

impl TerminationConfig {
    pub fn iterations(max_iterations: u64) -> Self {
        Self {
            max_iterations,
            deadline: None,
            plateau: None,
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(plateau) = &self.plateau {
            if plateau.window == 0 {
                return Err(ConfigError::InvalidParameter {
                    parameter: "termination.plateau.window",
                    reason: "must be positive".to_string(),
                });
            }
            if !(plateau.min_improvement.is_finite() && plateau.min_improvement >= 0.0) {
                return Err(ConfigError::InvalidParameter {
                    parameter: "termination.plateau.min-improvement",
                    reason: format!(
                        "must be finite and non-negative, got {}",
                        plateau.min_improvement
                    ),
                });
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum StopReason {
    IterationCap,
    Deadline,
    EnergyPlateau,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::IterationCap => f.write_str("iteration cap reached"),
            StopReason::Deadline => f.write_str("deadline passed"),
            StopReason::EnergyPlateau => f.write_str("energy plateau"),
        }
    }
}

/// Mutable stopping state, polled once per iteration by the chain.
#[derive(Debug, Clone)]
pub struct TerminationCondition {
    config: TerminationConfig,
    started: Instant,
    reference_energy: f64,
    last_improvement: u64,
}

impl TerminationCondition {
    pub fn new(config: TerminationConfig) -> Self {
        Self {
            config,
            started: Instant::now(),
            reference_energy: f64::INFINITY,
            last_improvement: 0,
        }
    }

    pub fn config(&self) -> &TerminationConfig {
        &self.config
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Checks the stopping criteria after `iterations` completed iterations.
    pub fn poll(&mut self, iterations: u64, best_energy: f64) -> Option<StopReason> {
        if iterations >= self.config.max_iterations {
            return Some(StopReason::IterationCap);
        }
        if let Some(deadline) = self.config.deadline {
            if self.started.elapsed() >= deadline {
                return Some(StopReason::Deadline);
            }
        }
        if let Some(plateau) = self.config.plateau {
            if best_energy < self.reference_energy - plateau.min_improvement
                || !self.reference_energy.is_finite()
            {
                self.reference_energy = best_energy;
                self.last_improvement = iterations;
            } else if iterations - self.last_improvement >= plateau.window {
                return Some(StopReason::EnergyPlateau);
            }
        }
        None
    }
}
