mod common;

use common::*;
use mppseg::core::energy::terms::{IntensityContrast, MarkCount, OverlapPenalty};
use mppseg::core::models::configuration::MarksConfiguration;
use mppseg::core::models::ids::MarkId;
use mppseg::engine::annealing::AnnealingSchedule;
use mppseg::engine::cache::{CacheKey, EnergyCache};
use mppseg::engine::context::{OptimizationContext, RunMetadata};
use mppseg::engine::feedback::{IterationOutcome, NullFeedback, TraceRecorder};
use mppseg::engine::index::UpdatableMarksIndex;
use mppseg::engine::kernels::prior::MarkPrior;
use mppseg::engine::kernels::proposal::Proposal;
use mppseg::engine::kernels::proposer::KernelWeights;
use mppseg::engine::kernels::KernelKind;
use mppseg::engine::optimizer::OptimizationScheme;
use mppseg::engine::scheme::{EnergyScheme, WeightedTerm};
use mppseg::engine::state::{ChainState, FailureReason};
use mppseg::engine::termination::StopReason;
use mppseg::workflows::segment;

#[test]
fn total_energy_is_the_sum_of_single_term_energies() {
    let stack = two_blob_stack();
    let configuration = MarksConfiguration::from_marks([
        disc(10.0, 10.0, 3.0),
        disc(13.0, 11.0, 2.5),
        disc(28.0, 26.0, 4.0),
    ]);
    let index = UpdatableMarksIndex::from_configuration(&configuration, 1.0, 12.0).unwrap();

    let combined = contrast_and_overlap()
        .evaluate(&configuration, &index, &EnergyCache::new(), &stack)
        .unwrap();
    let contrast_only = EnergyScheme::new(vec![WeightedTerm::new(
        IntensityContrast::new(100.0, 100.0).unwrap(),
        1.0,
    )])
    .unwrap()
    .evaluate(&configuration, &index, &EnergyCache::new(), &stack)
    .unwrap();
    let overlap_only = EnergyScheme::new(vec![WeightedTerm::new(OverlapPenalty, 0.1)])
        .unwrap()
        .evaluate(&configuration, &index, &EnergyCache::new(), &stack)
        .unwrap();

    assert_close(
        combined.total(),
        contrast_only.total() + overlap_only.total(),
        1e-12,
    );
    assert_close(combined.get(0), contrast_only.total(), 1e-12);
    assert_close(combined.get(1), overlap_only.total(), 1e-12);
    assert!(overlap_only.total() > 0.0);
}

#[test]
fn tracked_energy_matches_full_recomputation_at_every_iteration() {
    let stack = two_blob_stack();
    let scheme = contrast_and_overlap();
    let config = builder(300, 11)
        .consistency_check_interval(1)
        .consistency_tolerance(1e-9)
        .build()
        .unwrap();
    let initial = MarksConfiguration::from_marks([disc(12.0, 12.0, 3.0), disc(25.0, 25.0, 3.0)]);

    let outcome = segment::run(&stack, &scheme, &config, initial, &mut NullFeedback).unwrap();

    assert_eq!(
        outcome.status,
        ChainState::TerminatedNormally(StopReason::IterationCap)
    );
    assert!(outcome.failure.is_none());
    assert_eq!(outcome.statistics.consistency_checks, 300);
    assert!(outcome.statistics.accepted > 0);

    let index =
        UpdatableMarksIndex::from_configuration(&outcome.configuration, 1.0, 11.0).unwrap();
    let fresh = scheme
        .evaluate(&outcome.configuration, &index, &EnergyCache::new(), &stack)
        .unwrap();
    assert_close(outcome.total_energy().unwrap(), fresh.total(), 1e-9);
}

#[test]
fn accepting_a_move_only_touches_cache_entries_of_the_moved_mark() {
    let stack = two_blob_stack();
    let scheme = contrast_and_overlap();
    let config = builder(10, 3).build().unwrap();
    let metadata = RunMetadata::new("cache-locality");
    let ctx = OptimizationContext::new(&scheme, &stack, &metadata);
    let initial = MarksConfiguration::from_marks([
        disc(10.0, 10.0, 3.0),
        disc(14.0, 10.0, 3.0),
        disc(28.0, 26.0, 3.0),
    ]);
    let mut chain = OptimizationScheme::new(ctx, &config, initial).unwrap();
    let moved = MarkId::new(0);
    let neighbor = MarkId::new(1);
    assert!(chain.index().interacts(moved, neighbor));

    let before = chain.cache().snapshot();
    let proposal = Proposal {
        kernel: KernelKind::Move,
        removed: vec![moved],
        added: vec![(moved, disc(9.5, 10.5, 3.0))],
        forward_density: 1.0,
        backward_density: 1.0,
    };
    chain.apply_proposal(&proposal).unwrap();
    let after = chain.cache().snapshot();

    let untouched_before: Vec<_> = before.iter().filter(|(k, _)| !k.mentions(moved)).collect();
    let untouched_after: Vec<_> = after.iter().filter(|(k, _)| !k.mentions(moved)).collect();
    assert_eq!(untouched_before.len(), untouched_after.len());
    for ((key_a, value_a), (key_b, value_b)) in untouched_before.iter().zip(&untouched_after) {
        assert_eq!(key_a, key_b);
        assert_eq!(value_a.to_bits(), value_b.to_bits());
    }
    let overlap_key = CacheKey::pair(moved, neighbor, 1);
    let shared = stack.count_within_both(&disc(9.5, 10.5, 3.0), &disc(14.0, 10.0, 3.0));
    assert!(before.contains_key(&overlap_key));
    assert_eq!(after.get(&overlap_key), Some(&(shared as f64)));
}

#[test]
fn moving_a_mark_onto_its_neighbor_scores_the_new_pair() {
    let stack = two_blob_stack();
    let scheme = contrast_and_overlap();
    let config = builder(10, 5).build().unwrap();
    let metadata = RunMetadata::new("move-onto-neighbor");
    let ctx = OptimizationContext::new(&scheme, &stack, &metadata);
    let initial = MarksConfiguration::from_marks([disc(8.0, 8.0, 3.0), disc(28.0, 26.0, 3.0)]);
    let mut chain = OptimizationScheme::new(ctx, &config, initial).unwrap();
    let (a, b) = (MarkId::new(0), MarkId::new(1));
    let pair_key = CacheKey::pair(a, b, 1);

    assert!(!chain.index().interacts(a, b));
    assert!(chain.cache().get(&pair_key).is_none());
    let energy_before = chain.total_energy();

    let proposal = Proposal {
        kernel: KernelKind::Move,
        removed: vec![a],
        added: vec![(a, disc(27.0, 26.0, 3.0))],
        forward_density: 1.0,
        backward_density: 1.0,
    };
    let delta = chain.apply_proposal(&proposal).unwrap();

    assert!(chain.index().interacts(a, b));
    let overlap = chain.cache().get(&pair_key).unwrap();
    assert!(overlap > 0.0);
    assert_close(chain.total_energy(), energy_before + delta, 1e-12);
    assert_close(
        chain.total_energy(),
        chain.recompute_energy().unwrap().total(),
        1e-9,
    );
}

#[test]
fn greedy_run_never_increases_the_energy() {
    let stack = two_blob_stack();
    let scheme = contrast_and_overlap();
    let config = builder(400, 23)
        .annealing(AnnealingSchedule::Greedy)
        .build()
        .unwrap();
    let mut recorder = TraceRecorder::new();
    let outcome = segment::run(
        &stack,
        &scheme,
        &config,
        MarksConfiguration::new(),
        &mut recorder,
    )
    .unwrap();

    let mut previous = 0.0;
    for record in recorder.records() {
        assert!(record.energy <= previous + 1e-12);
        if record.outcome == IterationOutcome::Accepted {
            assert!(record.delta.unwrap() <= 0.0);
        }
        previous = record.energy;
    }
    let total = outcome.total_energy().unwrap();
    assert!(total <= 0.0);
    assert_eq!(outcome.best.energy, total);
}

#[test]
fn fixed_seed_reproduces_the_run() {
    let stack = two_blob_stack();
    let scheme = contrast_and_overlap();
    let config = builder(250, 99).build().unwrap();

    let run = || {
        let mut recorder = TraceRecorder::new();
        let outcome = segment::run(
            &stack,
            &scheme,
            &config,
            MarksConfiguration::new(),
            &mut recorder,
        )
        .unwrap();
        (outcome, recorder)
    };
    let (first, first_trace) = run();
    let (second, second_trace) = run();

    assert_eq!(first.seed, 99);
    assert_eq!(first.configuration, second.configuration);
    assert_eq!(
        first.total_energy().map(f64::to_bits),
        second.total_energy().map(f64::to_bits)
    );
    assert_eq!(first_trace.records(), second_trace.records());
}

#[test]
fn run_stops_exactly_at_the_iteration_cap() {
    let stack = two_blob_stack();
    let scheme = contrast_and_overlap();
    let config = builder(25, 1).build().unwrap();
    let mut recorder = TraceRecorder::new();
    let outcome = segment::run(
        &stack,
        &scheme,
        &config,
        MarksConfiguration::new(),
        &mut recorder,
    )
    .unwrap();

    assert_eq!(
        outcome.status,
        ChainState::TerminatedNormally(StopReason::IterationCap)
    );
    assert_eq!(outcome.statistics.iterations, 25);
    assert_eq!(recorder.records().len(), 25);
    assert_eq!(recorder.records().last().map(|r| r.iteration), Some(25));
}

#[test]
fn birth_only_greedy_run_keeps_an_empty_configuration_empty() {
    let stack = two_blob_stack();
    let scheme = EnergyScheme::new(vec![WeightedTerm::new(MarkCount, 1.0)]).unwrap();
    let config = builder(50, 8)
        .kernels(KernelWeights::birth_death_move(1.0, 0.0, 0.0))
        .annealing(AnnealingSchedule::Greedy)
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

    assert!(outcome.configuration.is_empty());
    assert_eq!(outcome.total_energy(), Some(0.0));
    let births = outcome.statistics.kernel(KernelKind::Birth);
    assert_eq!(births.proposed, 50);
    assert_eq!(births.rejected, 50);
    assert_eq!(births.accepted, 0);
}

#[test]
fn persistent_scoring_errors_end_the_run_early() {
    let stack = two_blob_stack();
    let scheme = EnergyScheme::new(vec![WeightedTerm::new(
        IntensityContrast::new(100.0, 100.0).unwrap(),
        1.0,
    )])
    .unwrap();
    let config = builder(1000, 4)
        .kernels(KernelWeights::birth_death_move(1.0, 0.0, 0.0))
        .prior(MarkPrior::sphere(0.05, 0.1))
        .annealing(AnnealingSchedule::Greedy)
        .max_error_rate(0.5)
        .min_iterations_for_error_rate(20)
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
        ChainState::TerminatedEarly(FailureReason::ErrorRateExceeded { .. })
    ));
    let failure = outcome.failure.unwrap();
    assert_eq!(failure.iteration, outcome.statistics.iterations);
    assert!(failure.energy.is_some());
    assert!(outcome.statistics.iterations < 1000);
}

#[test]
fn guided_births_run_to_completion() {
    let stack = two_blob_stack();
    let scheme = contrast_and_overlap();
    let config = builder(200, 31).guided_birth(true).build().unwrap();
    let outcome = segment::run(
        &stack,
        &scheme,
        &config,
        MarksConfiguration::new(),
        &mut NullFeedback,
    )
    .unwrap();
    assert!(outcome.terminated_normally());
    assert!(outcome.best.energy <= 0.0);
}

#[test]
fn batch_runs_use_consecutive_seeds() {
    let stack = two_blob_stack();
    let scheme = contrast_and_overlap();
    let config = builder(40, 1000).build().unwrap();
    let outcomes: Vec<_> =
        segment::run_batch(&stack, &scheme, &config, &MarksConfiguration::new(), 3)
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
    let seeds: Vec<u64> = outcomes.iter().map(|o| o.seed).collect();
    assert_eq!(seeds, vec![1000, 1001, 1002]);
    let best = segment::best_of(&outcomes).unwrap();
    assert!(outcomes.iter().all(|o| best.best.energy <= o.best.energy));
}
