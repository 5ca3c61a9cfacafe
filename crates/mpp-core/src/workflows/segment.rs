use crate::core::image::probability::ProbabilityMap;
use crate::core::image::stack::BackgroundStack;
use crate::core::models::configuration::MarksConfiguration;
use crate::core::models::mark::Mark;
use crate::engine::config::file::ConfigFile;
use crate::engine::config::{ConfigError, OptimizationConfig, SeedMode, TermEntry};
use crate::engine::context::{OptimizationContext, RunMetadata};
use crate::engine::error::EngineError;
use crate::engine::feedback::{FeedbackReceiver, NullFeedback};
use crate::engine::kernels::prior::MarkPrior;
use crate::engine::optimizer::OptimizationScheme;
use crate::engine::scheme::{EnergyScheme, WeightedTerm};
use crate::engine::state::OptimizationOutcome;
use nalgebra::Point3;
use tracing::{info, instrument};

#[cfg(feature = "parallel")]
use rayon::prelude::*;

/// Builds the energy scheme described by a term list.
pub fn build_scheme(entries: &[TermEntry]) -> Result<EnergyScheme, ConfigError> {
    let terms = entries
        .iter()
        .map(|entry| Ok(WeightedTerm::boxed(entry.term.build()?, entry.weight)))
        .collect::<Result<Vec<_>, ConfigError>>()?;
    EnergyScheme::new(terms)
}

/// An initial configuration with one mark of the prior's midpoint shape at each point.
pub fn seed_from_points(points: &[Point3<f64>], prior: &MarkPrior) -> MarksConfiguration {
    let shape = prior.midpoint_shape();
    MarksConfiguration::from_marks(points.iter().map(|point| Mark::new(*point, shape)))
}

/// Runs one segmentation to completion.
///
/// When `config.guided_birth` is set, a probability map is derived from the stack
/// intensities and births are drawn from it.
///
/// # Arguments
///
/// * `stack` - The background to segment.
/// * `scheme` - The energy function.
/// * `config` - A validated run configuration.
/// * `initial` - The starting configuration, e.g. from [`seed_from_points`].
/// * `feedback` - Observer of every iteration.
///
/// # Return
///
/// The run outcome. An early termination is reported inside the outcome; `Err` is
/// returned only when the chain cannot be set up.
#[instrument(skip_all, name = "segmentation_workflow")]
pub fn run(
    stack: &BackgroundStack,
    scheme: &EnergyScheme,
    config: &OptimizationConfig,
    initial: MarksConfiguration,
    feedback: &mut dyn FeedbackReceiver,
) -> Result<OptimizationOutcome, EngineError> {
    run_named(RunMetadata::default(), stack, scheme, config, initial, feedback)
}

/// Runs a segmentation described by a loaded configuration file.
pub fn run_configured(
    stack: &BackgroundStack,
    file: &ConfigFile,
    initial: MarksConfiguration,
    feedback: &mut dyn FeedbackReceiver,
) -> Result<OptimizationOutcome, EngineError> {
    let scheme = build_scheme(&file.terms)?;
    run(stack, &scheme, &file.optimization, initial, feedback)
}

fn run_named(
    metadata: RunMetadata,
    stack: &BackgroundStack,
    scheme: &EnergyScheme,
    config: &OptimizationConfig,
    initial: MarksConfiguration,
    feedback: &mut dyn FeedbackReceiver,
) -> Result<OptimizationOutcome, EngineError> {
    info!(
        run = %metadata.name,
        width = stack.width(),
        height = stack.height(),
        depth = stack.depth(),
        terms = ?scheme.names(),
        initial_marks = initial.len(),
        "Starting segmentation."
    );

    let probability_map = if config.guided_birth {
        Some(ProbabilityMap::from_intensities(stack)?)
    } else {
        None
    };
    let mut ctx = OptimizationContext::new(scheme, stack, &metadata);
    if let Some(map) = &probability_map {
        ctx = ctx.with_probability_map(map);
    }

    let chain = OptimizationScheme::new(ctx, config, initial)?;
    let outcome = chain.run(feedback);
    info!(
        run = %metadata.name,
        seed = outcome.seed,
        marks = outcome.configuration.len(),
        energy = outcome.total_energy(),
        best_energy = outcome.best.energy,
        "Segmentation finished."
    );
    Ok(outcome)
}

/// Runs `runs` independent chains from the same initial configuration.
///
/// Run `i` is seeded with `base + i`, where `base` is the configured seed. Results are
/// returned in run order.
#[instrument(skip_all, name = "segmentation_batch")]
pub fn run_batch(
    stack: &BackgroundStack,
    scheme: &EnergyScheme,
    config: &OptimizationConfig,
    initial: &MarksConfiguration,
    runs: usize,
) -> Vec<Result<OptimizationOutcome, EngineError>> {
    let base = config.seed.resolve();
    info!(runs, base_seed = base, "Starting batch of independent runs.");

    let single = |index: usize| {
        let mut run_config = config.clone();
        run_config.seed = SeedMode::Fixed(base.wrapping_add(index as u64));
        let metadata = RunMetadata::new(format!("run-{}", index));
        run_named(
            metadata,
            stack,
            scheme,
            &run_config,
            initial.clone(),
            &mut NullFeedback,
        )
    };

    #[cfg(feature = "parallel")]
    let outcomes = (0..runs).into_par_iter().map(single).collect();
    #[cfg(not(feature = "parallel"))]
    let outcomes = (0..runs).map(single).collect();
    outcomes
}

/// The outcome with the lowest best-visited energy.
pub fn best_of(outcomes: &[OptimizationOutcome]) -> Option<&OptimizationOutcome> {
    outcomes.iter().min_by(|a, b| {
        a.best
            .energy
            .partial_cmp(&b.best.energy)
            .unwrap_or(std::cmp::Ordering::Equal)
    })
}
