use super::birth_death::{propose_birth, propose_death};
use super::compound::{SplitConfig, propose_exchange, propose_merge, propose_split};
use super::moves::{MoveConfig, propose_move};
use super::prior::BirthDistribution;
use super::proposal::Proposal;
use super::{KernelError, KernelKind};
use crate::core::models::configuration::MarksConfiguration;
use crate::engine::config::ConfigError;
use crate::engine::index::UpdatableMarksIndex;
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use tracing::trace;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Selection probabilities of the kernels. A weight of zero disables a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct KernelWeights {
    pub birth: f64,
    pub death: f64,
    pub moves: f64,
    pub exchange: f64,
    pub split: f64,
    pub merge: f64,
}

impl KernelWeights {
    pub fn birth_death_move(birth: f64, death: f64, moves: f64) -> Self {
        Self {
            birth,
            death,
            moves,
            ..Self::default()
        }
    }

    pub fn get(&self, kind: KernelKind) -> f64 {
        match kind {
            KernelKind::Birth => self.birth,
            KernelKind::Death => self.death,
            KernelKind::Move => self.moves,
            KernelKind::Exchange => self.exchange,
            KernelKind::Split => self.split,
            KernelKind::Merge => self.merge,
        }
    }

    pub fn enabled(&self) -> impl Iterator<Item = KernelKind> + '_ {
        KernelKind::ALL
            .into_iter()
            .filter(|kind| self.get(*kind) > 0.0)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut sum = 0.0;
        for kind in KernelKind::ALL {
            let weight = self.get(kind);
            if !(weight.is_finite() && weight >= 0.0) {
                return Err(ConfigError::InvalidKernelWeights(format!(
                    "weight of {} must be finite and non-negative, got {}",
                    kind, weight
                )));
            }
            sum += weight;
        }
        if self.enabled().next().is_none() {
            return Err(ConfigError::InvalidKernelWeights(
                "at least one kernel must have a positive weight".to_string(),
            ));
        }
        if (sum - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            return Err(ConfigError::InvalidKernelWeights(format!(
                "weights must sum to 1, got {}",
                sum
            )));
        }
        Ok(())
    }
}

/// Chooses a kernel by weight and delegates the proposal to it.
#[derive(Debug, Clone)]
pub struct KernelProposer<'a> {
    weights: KernelWeights,
    kinds: Vec<KernelKind>,
    selector: WeightedIndex<f64>,
    birth: BirthDistribution<'a>,
    moves: MoveConfig,
    split: SplitConfig,
}

impl<'a> KernelProposer<'a> {
    pub fn new(
        weights: KernelWeights,
        birth: BirthDistribution<'a>,
        moves: MoveConfig,
        split: SplitConfig,
    ) -> Result<Self, ConfigError> {
        weights.validate()?;
        birth.prior().validate()?;
        let kinds: Vec<KernelKind> = weights.enabled().collect();
        for kernel in &kinds {
            if !kernel.is_compatible_with(birth.prior().kind) {
                return Err(ConfigError::IncompatibleKernel {
                    kernel: *kernel,
                    mark_kind: birth.prior().kind,
                });
            }
        }
        if weights.get(KernelKind::Move) > 0.0 {
            moves.validate()?;
        }
        if weights.get(KernelKind::Split) > 0.0 || weights.get(KernelKind::Merge) > 0.0 {
            split.validate()?;
        }
        let selector = WeightedIndex::new(kinds.iter().map(|kind| weights.get(*kind)))
            .map_err(|e| ConfigError::InvalidKernelWeights(e.to_string()))?;
        Ok(Self {
            weights,
            kinds,
            selector,
            birth,
            moves,
            split,
        })
    }

    pub fn weights(&self) -> &KernelWeights {
        &self.weights
    }

    pub fn birth(&self) -> &BirthDistribution<'a> {
        &self.birth
    }

    /// Rejects configurations holding marks that an enabled kernel cannot handle.
    pub fn check_configuration(&self, configuration: &MarksConfiguration) -> Result<(), ConfigError> {
        for mark_kind in configuration.kinds() {
            if let Some(kernel) = self.kinds.iter().find(|k| !k.is_compatible_with(mark_kind)) {
                return Err(ConfigError::IncompatibleKernel {
                    kernel: *kernel,
                    mark_kind,
                });
            }
        }
        Ok(())
    }

    pub fn select(&self, rng: &mut impl Rng) -> KernelKind {
        self.kinds[self.selector.sample(rng)]
    }

    /// Draws a proposal from a kernel chosen by weight.
    ///
    /// # Return
    ///
    /// The selected kernel together with its proposal, or `None` when the kernel has
    /// nothing to propose on this configuration.
    pub fn propose(
        &self,
        configuration: &MarksConfiguration,
        index: &UpdatableMarksIndex,
        rng: &mut impl Rng,
    ) -> (KernelKind, Result<Option<Proposal>, KernelError>) {
        let kernel = self.select(rng);
        let proposal = match kernel {
            KernelKind::Birth => propose_birth(configuration, &self.birth, &self.weights, rng),
            KernelKind::Death => propose_death(configuration, &self.birth, &self.weights, rng),
            KernelKind::Move => {
                propose_move(configuration, &self.birth, &self.moves, &self.weights, rng)
            }
            KernelKind::Exchange => {
                propose_exchange(configuration, &self.birth, &self.weights, rng)
            }
            KernelKind::Split => propose_split(
                configuration,
                index,
                &self.birth,
                &self.split,
                &self.weights,
                rng,
            ),
            KernelKind::Merge => propose_merge(
                configuration,
                index,
                &self.birth,
                &self.split,
                &self.weights,
                rng,
            ),
        };
        let result = match proposal {
            Some(proposal) => proposal.validate(configuration).map(|_| Some(proposal)),
            None => {
                trace!(kernel = %kernel, "Kernel had nothing to propose.");
                Ok(None)
            }
        };
        (kernel, result)
    }
}
