use super::cache::EnergyCache;
use super::config::OptimizationConfig;
use super::context::OptimizationContext;
use super::error::EngineError;
use super::feedback::{FeedbackReceiver, IterationEvent, IterationOutcome};
use super::index::{IndexError, UpdatableMarksIndex};
use super::kernels::prior::{BirthDistribution, PositionSampler};
use super::kernels::proposal::Proposal;
use super::kernels::proposer::KernelProposer;
use super::kernels::KernelKind;
use super::scheme::{EnergyLedger, ProposalEvaluation};
use super::state::{
    ChainState, FailureReason, FailureReport, OptimizationOutcome, RunStatistics, Solution,
};
use super::termination::TerminationCondition;
use crate::core::energy::breakdown::EnergyBreakdown;
use crate::core::models::configuration::MarksConfiguration;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Display;
use tracing::{debug, info, instrument, trace, warn};

/// Metropolis-Hastings acceptance probability `min(1, exp(-Δ/T) · backward/forward)`.
///
/// At `T <= 0` the test is greedy: a proposal is accepted iff it does not raise the energy.
pub fn acceptance_probability(delta: f64, temperature: f64, log_density_ratio: f64) -> f64 {
    if temperature <= 0.0 {
        return if delta <= 0.0 { 1.0 } else { 0.0 };
    }
    let log_p = -delta / temperature + log_density_ratio;
    if log_p >= 0.0 { 1.0 } else { log_p.exp() }
}

/// A reversible-jump Markov chain over mark configurations.
///
/// Owns the current configuration together with the interaction index, the energy
/// cache and the tracked energy, and keeps the four consistent across accepted
/// proposals. Rejected proposals never touch any of them.
pub struct OptimizationScheme<'a> {
    ctx: OptimizationContext<'a>,
    config: OptimizationConfig,
    proposer: KernelProposer<'a>,
    configuration: MarksConfiguration,
    index: UpdatableMarksIndex,
    cache: EnergyCache,
    ledger: EnergyLedger,
    termination: TerminationCondition,
    rng: StdRng,
    seed: u64,
    state: ChainState,
    iteration: u64,
    statistics: RunStatistics,
    best: Solution,
    failure: Option<FailureReport>,
}

impl<'a> OptimizationScheme<'a> {
    /// Prepares a chain starting from `initial`.
    ///
    /// Builds the kernel proposer, indexes the initial configuration and evaluates its
    /// energy once from scratch. The RNG is seeded from `config.seed`, which is resolved
    /// here so the seed of a clock-seeded run can be read back with [`seed`](Self::seed).
    ///
    /// # Arguments
    ///
    /// * `ctx` - The energy scheme, background stack and optional probability map.
    /// * `config` - A validated run configuration.
    /// * `initial` - The configuration the chain starts from. May be empty.
    ///
    /// # Return
    ///
    /// The ready chain, or an error if the configuration holds marks an enabled kernel
    /// cannot handle, guided birth was requested without a probability map, or the
    /// initial energy cannot be evaluated.
    pub fn new(
        ctx: OptimizationContext<'a>,
        config: &OptimizationConfig,
        initial: MarksConfiguration,
    ) -> Result<Self, EngineError> {
        let position = match (config.guided_birth, ctx.probability_map) {
            (true, Some(map)) => PositionSampler::guided(ctx.stack, map),
            (true, None) => {
                return Err(EngineError::Initialization(
                    "guided birth requires a probability map".to_string(),
                ));
            }
            (false, _) => PositionSampler::uniform(ctx.stack),
        };
        let birth = BirthDistribution::new(config.prior.clone(), position);
        let proposer = KernelProposer::new(config.kernels, birth, config.moves, config.split)?;
        proposer.check_configuration(&initial)?;

        let index = UpdatableMarksIndex::from_configuration(
            &initial,
            config.interaction_threshold,
            config.effective_cell_size(),
        )?;
        let cache = EnergyCache::new();
        let breakdown = ctx.scheme.evaluate(&initial, &index, &cache, ctx.stack)?;
        let ledger = EnergyLedger::new(breakdown);

        let seed = config.seed.resolve();
        info!(
            run = %ctx.metadata.name,
            seed,
            marks = initial.len(),
            pairs = index.pair_count(),
            energy = ledger.total(),
            "Chain initialized."
        );

        let best = Solution {
            energy: ledger.total(),
            iteration: 0,
            configuration: initial.clone(),
        };
        Ok(Self {
            ctx,
            config: config.clone(),
            proposer,
            configuration: initial,
            index,
            cache,
            ledger,
            termination: TerminationCondition::new(config.termination),
            rng: StdRng::seed_from_u64(seed),
            seed,
            state: ChainState::Running,
            iteration: 0,
            statistics: RunStatistics::default(),
            best,
            failure: None,
        })
    }

    pub fn configuration(&self) -> &MarksConfiguration {
        &self.configuration
    }

    pub fn energy(&self) -> &EnergyBreakdown {
        self.ledger.breakdown()
    }

    pub fn total_energy(&self) -> f64 {
        self.ledger.total()
    }

    pub fn cache(&self) -> &EnergyCache {
        &self.cache
    }

    pub fn index(&self) -> &UpdatableMarksIndex {
        &self.index
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn iteration(&self) -> u64 {
        self.iteration
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn statistics(&self) -> &RunStatistics {
        &self.statistics
    }

    /// Runs the chain until a stopping criterion is met or it fails.
    ///
    /// The termination condition is polled before every iteration, so a cap of `n`
    /// iterations runs exactly `n` steps.
    ///
    /// # Arguments
    ///
    /// * `feedback` - Receives the start, every iteration and the end of the run.
    ///
    /// # Return
    ///
    /// The final configuration with its energy, the best configuration visited, run
    /// statistics and, after an early termination, the failure report.
    #[instrument(skip_all, name = "optimization_chain")]
    pub fn run(mut self, feedback: &mut dyn FeedbackReceiver) -> OptimizationOutcome {
        info!(
            max_iterations = self.config.termination.max_iterations,
            kernels = ?self.proposer.weights().enabled().collect::<Vec<_>>(),
            "Starting optimization."
        );
        feedback.on_start(&self.configuration, self.ledger.total());

        while self.state.is_running() {
            if let Some(reason) = self.termination.poll(self.iteration, self.best.energy) {
                self.state = ChainState::TerminatedNormally(reason);
                break;
            }
            self.step(feedback);
        }

        self.statistics.elapsed = self.termination.elapsed();
        feedback.on_finish(&self.state, &self.statistics);
        info!(
            state = ?self.state,
            iterations = self.statistics.iterations,
            accepted = self.statistics.accepted,
            marks = self.configuration.len(),
            energy = self.ledger.total(),
            best_energy = self.best.energy,
            "Optimization finished."
        );
        self.into_outcome()
    }

    /// Performs one iteration: propose, evaluate, accept or reject, notify.
    ///
    /// An iteration whose kernel has nothing to propose still counts towards the
    /// budget. After the feedback call the error rate is checked and, every
    /// `consistency_check_interval` iterations, the tracked state is verified against
    /// a recomputation. Does nothing once the chain has terminated.
    pub fn step(&mut self, feedback: &mut dyn FeedbackReceiver) {
        if !self.state.is_running() {
            return;
        }
        let temperature = self.config.annealing.temperature(self.iteration);
        self.iteration += 1;
        self.statistics.iterations += 1;

        let (kernel, proposal) =
            self.proposer
                .propose(&self.configuration, &self.index, &mut self.rng);
        let (outcome, delta) = match proposal {
            Ok(Some(proposal)) => self.consider(proposal, temperature),
            Ok(None) => {
                self.statistics.null_iterations += 1;
                self.statistics.kernel_mut(kernel).empty += 1;
                (IterationOutcome::NoProposal, None)
            }
            Err(e) => {
                self.record_error(kernel, &e);
                (IterationOutcome::Error, None)
            }
        };

        let event = IterationEvent {
            iteration: self.iteration,
            kernel: Some(kernel),
            outcome,
            delta,
            total: self.ledger.total(),
            temperature,
            mark_count: self.configuration.len(),
        };
        feedback.on_iteration(&event, &self.configuration);

        if !self.state.is_running() {
            return;
        }
        if self.statistics.iterations >= self.config.min_iterations_for_error_rate
            && self.statistics.error_rate() > self.config.max_error_rate
        {
            self.fail(FailureReason::ErrorRateExceeded {
                errors: self.statistics.errors,
                iterations: self.statistics.iterations,
            });
            return;
        }
        if let Some(interval) = self.config.consistency_check_interval {
            if self.iteration % interval == 0 {
                if let Some(reason) = self.check_consistency() {
                    self.fail(reason);
                }
            }
        }
    }

    /// Evaluates `proposal` and applies it without the acceptance test.
    ///
    /// # Arguments
    ///
    /// * `proposal` - A change drawn against the current configuration. New marks must
    ///   carry the configuration's upcoming ids.
    ///
    /// # Return
    ///
    /// The energy change. On error the chain is left untouched; an index that
    /// disagrees with the configuration additionally terminates it.
    pub fn apply_proposal(&mut self, proposal: &Proposal) -> Result<f64, EngineError> {
        proposal.validate(&self.configuration)?;
        let evaluation = self.ctx.scheme.evaluate_delta(
            &self.configuration,
            proposal,
            &self.index,
            &self.cache,
            self.ctx.stack,
        )?;
        let delta = evaluation.total();
        if let Err(e) = self.commit(proposal, evaluation) {
            self.fail(FailureReason::IndexCorruption {
                detail: e.to_string(),
            });
            return Err(e);
        }
        self.track_best();
        Ok(delta)
    }

    /// Recomputes the energy of the current configuration with a fresh index and cache.
    pub fn recompute_energy(&self) -> Result<EnergyBreakdown, EngineError> {
        self.evaluate_from_scratch(&self.configuration)
    }

    fn consider(&mut self, proposal: Proposal, temperature: f64) -> (IterationOutcome, Option<f64>) {
        let kernel = proposal.kernel;
        self.statistics.kernel_mut(kernel).proposed += 1;

        let evaluation = match self.ctx.scheme.evaluate_delta(
            &self.configuration,
            &proposal,
            &self.index,
            &self.cache,
            self.ctx.stack,
        ) {
            Ok(evaluation) => evaluation,
            Err(e) => {
                self.record_error(kernel, &e);
                return (IterationOutcome::Error, None);
            }
        };
        let delta = evaluation.total();
        let probability =
            acceptance_probability(delta, temperature, proposal.log_density_ratio());
        let accepted = probability >= 1.0
            || (probability > 0.0 && self.rng.r#gen::<f64>() < probability);
        trace!(
            iteration = self.iteration,
            kernel = %kernel,
            delta,
            probability,
            accepted,
            "Proposal evaluated."
        );

        if !accepted {
            self.statistics.kernel_mut(kernel).rejected += 1;
            return (IterationOutcome::Rejected, Some(delta));
        }
        if let Err(e) = self.commit(&proposal, evaluation) {
            self.fail(FailureReason::IndexCorruption {
                detail: e.to_string(),
            });
            return (IterationOutcome::Error, Some(delta));
        }
        self.statistics.accepted += 1;
        self.statistics.kernel_mut(kernel).accepted += 1;
        self.track_best();
        (IterationOutcome::Accepted, Some(delta))
    }

    /// Applies an evaluated proposal to the configuration, index, cache and ledger.
    ///
    /// All checks run before the first mutation, so an error leaves the chain as it was.
    /// `proposal` has already been validated against the configuration.
    fn commit(
        &mut self,
        proposal: &Proposal,
        evaluation: ProposalEvaluation,
    ) -> Result<(), EngineError> {
        if let Some(&id) = proposal.removed.iter().find(|id| !self.index.contains(**id)) {
            return Err(IndexError::UnknownId(id).into());
        }
        if let Some(id) = proposal.new_ids().find(|id| self.index.contains(*id)) {
            return Err(IndexError::DuplicateId(id).into());
        }

        for &id in &proposal.removed {
            self.cache.invalidate_mark(id);
        }
        // The checks above rule out every index error below.
        for &id in &proposal.removed {
            if !proposal.is_replacement(id) {
                self.configuration.remove(id);
                self.index.on_mark_removed(id)?;
            }
        }
        for (id, mark) in &proposal.added {
            if proposal.removed.contains(id) {
                self.configuration.replace(*id, *mark);
                self.index.on_mark_replaced(*id, mark)?;
            } else {
                let assigned = self.configuration.insert(*mark);
                self.index.on_mark_added(assigned, mark)?;
            }
        }
        for (key, value) in evaluation.fresh {
            self.cache.install(key, value);
        }
        self.ledger.apply(&evaluation.delta);
        Ok(())
    }

    fn track_best(&mut self) {
        if self.ledger.total() < self.best.energy {
            self.best = Solution {
                energy: self.ledger.total(),
                iteration: self.iteration,
                configuration: self.configuration.clone(),
            };
        }
    }

    fn record_error(&mut self, kernel: KernelKind, error: &impl Display) {
        self.statistics.errors += 1;
        self.statistics.kernel_mut(kernel).errors += 1;
        debug!(
            iteration = self.iteration,
            kernel = %kernel,
            error = %error,
            "Iteration rejected after error."
        );
    }

    /// Verifies the index and compares the tracked energy with a full recomputation.
    ///
    /// On success the tracked energy is resynchronized with the recomputed one.
    fn check_consistency(&mut self) -> Option<FailureReason> {
        self.statistics.consistency_checks += 1;
        if let Err(e) = self.index.verify(&self.configuration) {
            return Some(FailureReason::IndexCorruption {
                detail: e.to_string(),
            });
        }
        let scratch = EnergyCache::new();
        let full = match self.ctx.scheme.evaluate(
            &self.configuration,
            &self.index,
            &scratch,
            self.ctx.stack,
        ) {
            Ok(full) => full,
            Err(e) => {
                return Some(FailureReason::RecomputationFailed {
                    detail: e.to_string(),
                });
            }
        };
        let tracked = self.ledger.total();
        let recomputed = full.total();
        if (recomputed - tracked).abs() > self.config.consistency_tolerance * recomputed.abs().max(1.0) {
            return Some(FailureReason::EnergyDrift {
                tracked,
                recomputed,
            });
        }
        debug!(
            iteration = self.iteration,
            energy = recomputed,
            "Consistency check passed."
        );
        self.ledger = EnergyLedger::new(full);
        None
    }

    /// Ends the chain early.
    ///
    /// The tracked energy is no longer trusted: the current and best configurations are
    /// re-evaluated from scratch and the ledger is reset to the recomputed value.
    fn fail(&mut self, reason: FailureReason) {
        warn!(
            iteration = self.iteration,
            reason = %reason,
            "Optimization terminated early."
        );
        let energy = match self.recompute_energy() {
            Ok(energy) => {
                self.ledger = EnergyLedger::new(energy.clone());
                Some(energy)
            }
            Err(e) => {
                warn!(error = %e, "Could not recompute the energy of the final configuration.");
                None
            }
        };
        self.rescore_best(energy.as_ref());
        self.failure = Some(FailureReport {
            reason: reason.clone(),
            iteration: self.iteration,
            configuration: self.configuration.clone(),
            energy,
        });
        self.state = ChainState::TerminatedEarly(reason);
    }

    fn rescore_best(&mut self, current: Option<&EnergyBreakdown>) {
        match self.evaluate_from_scratch(&self.best.configuration) {
            Ok(energy) => self.best.energy = energy.total(),
            Err(e) => {
                warn!(error = %e, "Could not recompute the energy of the best configuration.");
                self.best.energy = f64::INFINITY;
            }
        }
        if let Some(current) = current {
            if current.total() < self.best.energy {
                self.best = Solution {
                    energy: current.total(),
                    iteration: self.iteration,
                    configuration: self.configuration.clone(),
                };
            }
        }
    }

    fn evaluate_from_scratch(
        &self,
        configuration: &MarksConfiguration,
    ) -> Result<EnergyBreakdown, EngineError> {
        let index = UpdatableMarksIndex::from_configuration(
            configuration,
            self.config.interaction_threshold,
            self.config.effective_cell_size(),
        )?;
        let scratch = EnergyCache::new();
        Ok(self
            .ctx
            .scheme
            .evaluate(configuration, &index, &scratch, self.ctx.stack)?)
    }

    fn into_outcome(self) -> OptimizationOutcome {
        let energy = match &self.failure {
            Some(report) => report.energy.clone(),
            None => Some(self.ledger.breakdown().clone()),
        };
        OptimizationOutcome {
            status: self.state,
            energy,
            configuration: self.configuration,
            best: self.best,
            statistics: self.statistics,
            failure: self.failure,
            seed: self.seed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::energy::terms::MarkCount;
    use crate::core::image::stack::BackgroundStack;
    use crate::core::models::ids::MarkId;
    use crate::core::models::mark::Mark;
    use crate::engine::config::{OptimizationConfigBuilder, SeedMode};
    use crate::engine::context::RunMetadata;
    use crate::engine::feedback::NullFeedback;
    use crate::engine::kernels::prior::MarkPrior;
    use crate::engine::kernels::proposer::KernelWeights;
    use crate::engine::scheme::{EnergyScheme, WeightedTerm};
    use nalgebra::Point3;

    fn config() -> OptimizationConfig {
        OptimizationConfigBuilder::new()
            .kernels(KernelWeights::birth_death_move(0.4, 0.4, 0.2))
            .prior(MarkPrior::sphere(1.0, 2.0))
            .max_iterations(20)
            .seed(SeedMode::Fixed(7))
            .consistency_check_interval(1)
            .build()
            .unwrap()
    }

    fn two_marks() -> MarksConfiguration {
        MarksConfiguration::from_marks([
            Mark::sphere(Point3::new(5.0, 5.0, 0.5), 1.5),
            Mark::sphere(Point3::new(14.0, 14.0, 0.5), 1.5),
        ])
    }

    #[test]
    fn index_missing_a_mark_ends_the_chain_with_a_consistent_outcome() {
        let stack = BackgroundStack::uniform(20, 20, 1, 1.0).unwrap();
        let scheme = EnergyScheme::new(vec![WeightedTerm::new(MarkCount, 1.0)]).unwrap();
        let metadata = RunMetadata::new("index-missing-mark");
        let ctx = OptimizationContext::new(&scheme, &stack, &metadata);
        let mut chain = OptimizationScheme::new(ctx, &config(), two_marks()).unwrap();
        chain.index.on_mark_removed(MarkId::new(1)).unwrap();

        chain.step(&mut NullFeedback);
        assert!(matches!(
            chain.state(),
            ChainState::TerminatedEarly(FailureReason::IndexCorruption { .. })
        ));

        let outcome = chain.run(&mut NullFeedback);
        let marks = outcome.configuration.len() as f64;
        assert_eq!(outcome.statistics.iterations, 1);
        assert_eq!(outcome.total_energy(), Some(marks));
        let failure = outcome.failure.unwrap();
        assert_eq!(failure.configuration, outcome.configuration);
        assert_eq!(failure.energy.map(|e| e.total()), Some(marks));
    }

    #[test]
    fn commit_against_a_stale_index_leaves_the_chain_untouched() {
        let stack = BackgroundStack::uniform(20, 20, 1, 1.0).unwrap();
        let scheme = EnergyScheme::new(vec![WeightedTerm::new(MarkCount, 1.0)]).unwrap();
        let metadata = RunMetadata::new("stale-index");
        let ctx = OptimizationContext::new(&scheme, &stack, &metadata);
        let mut chain = OptimizationScheme::new(ctx, &config(), two_marks()).unwrap();
        chain.index.on_mark_removed(MarkId::new(1)).unwrap();

        let death = Proposal {
            kernel: KernelKind::Death,
            removed: vec![MarkId::new(1)],
            added: vec![],
            forward_density: 0.5,
            backward_density: 0.5,
        };
        let result = chain.apply_proposal(&death);

        assert!(matches!(
            result,
            Err(EngineError::Index {
                source: IndexError::UnknownId(_)
            })
        ));
        assert!(matches!(
            chain.state(),
            ChainState::TerminatedEarly(FailureReason::IndexCorruption { .. })
        ));
        assert_eq!(chain.configuration(), &two_marks());
        assert_eq!(chain.total_energy(), 2.0);
    }

    #[test]
    fn greedy_acceptance_ignores_densities() {
        assert_eq!(acceptance_probability(-1.0, 0.0, f64::NEG_INFINITY), 1.0);
        assert_eq!(acceptance_probability(0.0, 0.0, -5.0), 1.0);
        assert_eq!(acceptance_probability(1e-12, 0.0, 5.0), 0.0);
    }

    #[test]
    fn acceptance_follows_metropolis_hastings_ratio() {
        let p = acceptance_probability(1.0, 2.0, 0.0);
        assert!((p - (-0.5f64).exp()).abs() < 1e-15);
        let p = acceptance_probability(1.0, 1.0, 2.0f64.ln());
        assert!((p - 2.0 * (-1.0f64).exp()).abs() < 1e-12);
        assert_eq!(acceptance_probability(-3.0, 1.0, 0.0), 1.0);
    }

    #[test]
    fn irreversible_proposals_are_never_accepted_at_positive_temperature() {
        assert_eq!(acceptance_probability(-10.0, 1.0, f64::NEG_INFINITY), 0.0);
    }
}
