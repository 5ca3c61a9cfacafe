use super::kernels::KernelKind;
use super::termination::StopReason;
use crate::core::energy::breakdown::EnergyBreakdown;
use crate::core::models::configuration::MarksConfiguration;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum FailureReason {
    IndexCorruption { detail: String },
    EnergyDrift { tracked: f64, recomputed: f64 },
    RecomputationFailed { detail: String },
    ErrorRateExceeded { errors: u64, iterations: u64 },
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::IndexCorruption { detail } => {
                write!(f, "interaction index corrupted: {}", detail)
            }
            FailureReason::EnergyDrift {
                tracked,
                recomputed,
            } => write!(
                f,
                "tracked energy {} drifted from recomputed energy {}",
                tracked, recomputed
            ),
            FailureReason::RecomputationFailed { detail } => {
                write!(f, "energy recomputation failed: {}", detail)
            }
            FailureReason::ErrorRateExceeded { errors, iterations } => write!(
                f,
                "{} of {} iterations failed with errors",
                errors, iterations
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ChainState {
    Running,
    TerminatedNormally(StopReason),
    TerminatedEarly(FailureReason),
}

impl ChainState {
    pub fn is_running(&self) -> bool {
        matches!(self, ChainState::Running)
    }
}

/// What the chain leaves behind when it stops early.
///
/// The configuration is the last consistent one; the energy is recomputed from scratch
/// and is `None` when that recomputation itself failed.
#[derive(Debug, Clone)]
pub struct FailureReport {
    pub reason: FailureReason,
    pub iteration: u64,
    pub configuration: MarksConfiguration,
    pub energy: Option<EnergyBreakdown>,
}

/// A configuration together with its energy. Orders so that lower energy is greater.
///
/// After an early termination the energy is recomputed; it is infinite when that
/// recomputation failed.
#[derive(Debug, Clone)]
pub struct Solution {
    pub energy: f64,
    pub iteration: u64,
    pub configuration: MarksConfiguration,
}

impl PartialEq for Solution {
    fn eq(&self, other: &Self) -> bool {
        self.energy == other.energy
    }
}
impl Eq for Solution {}

impl PartialOrd for Solution {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Solution {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .energy
            .partial_cmp(&self.energy)
            .unwrap_or(std::cmp::Ordering::Equal)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KernelStatistics {
    pub proposed: u64,
    pub accepted: u64,
    pub rejected: u64,
    pub empty: u64,
    pub errors: u64,
}

impl KernelStatistics {
    pub fn acceptance_rate(&self) -> f64 {
        if self.proposed == 0 {
            0.0
        } else {
            self.accepted as f64 / self.proposed as f64
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunStatistics {
    pub iterations: u64,
    pub accepted: u64,
    pub null_iterations: u64,
    pub errors: u64,
    pub consistency_checks: u64,
    pub per_kernel: BTreeMap<KernelKind, KernelStatistics>,
    #[serde(skip)]
    pub elapsed: Duration,
}

impl RunStatistics {
    pub fn kernel(&self, kind: KernelKind) -> KernelStatistics {
        self.per_kernel.get(&kind).copied().unwrap_or_default()
    }

    pub(crate) fn kernel_mut(&mut self, kind: KernelKind) -> &mut KernelStatistics {
        self.per_kernel.entry(kind).or_default()
    }

    pub fn error_rate(&self) -> f64 {
        if self.iterations == 0 {
            0.0
        } else {
            self.errors as f64 / self.iterations as f64
        }
    }
}

/// Everything a finished run returns.
///
/// `energy` always belongs to `configuration`. After an early termination it is the
/// recomputed energy, and `None` when that recomputation failed.
#[derive(Debug, Clone)]
pub struct OptimizationOutcome {
    pub status: ChainState,
    pub configuration: MarksConfiguration,
    pub energy: Option<EnergyBreakdown>,
    pub best: Solution,
    pub statistics: RunStatistics,
    pub failure: Option<FailureReport>,
    pub seed: u64,
}

impl OptimizationOutcome {
    pub fn total_energy(&self) -> Option<f64> {
        self.energy.as_ref().map(EnergyBreakdown::total)
    }

    pub fn terminated_normally(&self) -> bool {
        matches!(self.status, ChainState::TerminatedNormally(_))
    }
}
