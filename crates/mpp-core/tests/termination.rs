mod common;

use common::*;
use mppseg::core::energy::scoring::ScoringError;
use mppseg::core::energy::term::{EnergyTerm, MarkRef, TermContext, TermScope};
use mppseg::core::energy::terms::MarkCount;
use mppseg::core::models::configuration::MarksConfiguration;
use mppseg::engine::annealing::AnnealingSchedule;
use mppseg::engine::feedback::NullFeedback;
use mppseg::engine::kernels::KernelKind;
use mppseg::engine::kernels::proposer::KernelWeights;
use mppseg::engine::scheme::{EnergyScheme, WeightedTerm};
use mppseg::engine::state::{ChainState, FailureReason};
use mppseg::engine::termination::StopReason;
use mppseg::workflows::segment;
use std::time::Duration;

/// Scores proposed marks differently from the same marks once they are published, so
/// the tracked energy drifts away from any recomputation.
#[derive(Debug)]
struct PublicationSensitive;

impl EnergyTerm for PublicationSensitive {
    fn name(&self) -> &str {
        "publication-sensitive"
    }

    fn scope(&self) -> TermScope {
        TermScope::Unary
    }

    fn score_mark(&self, mark: MarkRef<'_>, _: &TermContext<'_>) -> Result<f64, ScoringError> {
        Ok(if mark.is_published() { -1.0 } else { -2.0 })
    }
}

/// Scores proposed marks but fails on every published one.
#[derive(Debug)]
struct FailsOncePublished;

impl EnergyTerm for FailsOncePublished {
    fn name(&self) -> &str {
        "fails-once-published"
    }

    fn scope(&self) -> TermScope {
        TermScope::Unary
    }

    fn score_mark(&self, mark: MarkRef<'_>, _: &TermContext<'_>) -> Result<f64, ScoringError> {
        if mark.is_published() {
            Err(ScoringError::OutsideStack(mark.id))
        } else {
            Ok(-1.0)
        }
    }
}

fn greedy_births(iterations: u64) -> mppseg::engine::config::OptimizationConfigBuilder {
    builder(iterations, 17)
        .kernels(KernelWeights::birth_death_move(1.0, 0.0, 0.0))
        .annealing(AnnealingSchedule::Greedy)
}

#[test]
fn energy_drift_reports_the_recomputed_energy_of_the_returned_configuration() {
    let stack = two_blob_stack();
    let scheme = EnergyScheme::new(vec![WeightedTerm::new(PublicationSensitive, 1.0)]).unwrap();
    let config = greedy_births(50)
        .consistency_check_interval(1)
        .build()
        .unwrap();

    let outcome = segment::run(
        &stack,
        &scheme,
        &config,
        MarksConfiguration::new(),
        &mut NullFeedback,
    )
    .unwrap();

    assert_eq!(
        outcome.status,
        ChainState::TerminatedEarly(FailureReason::EnergyDrift {
            tracked: -2.0,
            recomputed: -1.0
        })
    );
    assert_eq!(outcome.configuration.len(), 1);
    assert_eq!(outcome.total_energy(), Some(-1.0));

    let failure = outcome.failure.as_ref().unwrap();
    assert_eq!(failure.iteration, 1);
    assert_eq!(failure.configuration, outcome.configuration);
    assert_eq!(failure.energy.as_ref().map(|e| e.total()), Some(-1.0));
    assert_eq!(outcome.best.energy, -1.0);
    assert_eq!(outcome.best.configuration, outcome.configuration);
}

#[test]
fn failed_recomputation_reports_no_energy() {
    let stack = two_blob_stack();
    let scheme = EnergyScheme::new(vec![WeightedTerm::new(FailsOncePublished, 1.0)]).unwrap();
    let config = greedy_births(50)
        .consistency_check_interval(1)
        .build()
        .unwrap();

    let outcome = segment::run(
        &stack,
        &scheme,
        &config,
        MarksConfiguration::new(),
        &mut NullFeedback,
    )
    .unwrap();

    assert!(matches!(
        outcome.status,
        ChainState::TerminatedEarly(FailureReason::RecomputationFailed { .. })
    ));
    assert_eq!(outcome.configuration.len(), 1);
    assert_eq!(outcome.total_energy(), None);
    let failure = outcome.failure.as_ref().unwrap();
    assert!(failure.energy.is_none());
    assert_eq!(failure.configuration, outcome.configuration);
    assert_eq!(outcome.best.configuration, outcome.configuration);
    assert_eq!(outcome.best.energy, f64::INFINITY);
}

#[test]
fn zero_deadline_stops_before_the_first_iteration() {
    let stack = two_blob_stack();
    let scheme = contrast_and_overlap();
    let config = builder(1_000, 2).deadline(Duration::ZERO).build().unwrap();

    let outcome = segment::run(
        &stack,
        &scheme,
        &config,
        MarksConfiguration::new(),
        &mut NullFeedback,
    )
    .unwrap();

    assert_eq!(
        outcome.status,
        ChainState::TerminatedNormally(StopReason::Deadline)
    );
    assert_eq!(outcome.statistics.iterations, 0);
    assert_eq!(outcome.total_energy(), Some(0.0));
}

#[test]
fn flat_energy_ends_the_run_on_a_plateau() {
    let stack = two_blob_stack();
    let scheme = EnergyScheme::new(vec![WeightedTerm::new(MarkCount, 1.0)]).unwrap();
    let config = greedy_births(1_000).plateau(10, 0.0).build().unwrap();

    let outcome = segment::run(
        &stack,
        &scheme,
        &config,
        MarksConfiguration::new(),
        &mut NullFeedback,
    )
    .unwrap();

    assert_eq!(
        outcome.status,
        ChainState::TerminatedNormally(StopReason::EnergyPlateau)
    );
    assert_eq!(outcome.statistics.iterations, 10);
    assert!(outcome.configuration.is_empty());
}

#[test]
fn empty_proposals_count_towards_the_iteration_budget() {
    let stack = two_blob_stack();
    let scheme = EnergyScheme::new(vec![WeightedTerm::new(MarkCount, 1.0)]).unwrap();
    let config = builder(30, 6)
        .kernels(KernelWeights::birth_death_move(0.0, 1.0, 0.0))
        .build()
        .unwrap();

    let outcome = segment::run(
        &stack,
        &scheme,
        &config,
        MarksConfiguration::new(),
        &mut NullFeedback,
    )
    .unwrap();

    assert_eq!(
        outcome.status,
        ChainState::TerminatedNormally(StopReason::IterationCap)
    );
    assert_eq!(outcome.statistics.iterations, 30);
    assert_eq!(outcome.statistics.null_iterations, 30);
    let deaths = outcome.statistics.kernel(KernelKind::Death);
    assert_eq!(deaths.empty, 30);
    assert_eq!(deaths.proposed, 0);
}
