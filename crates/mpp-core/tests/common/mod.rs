#![allow(dead_code)]

use mppseg::core::energy::terms::{IntensityContrast, OverlapPenalty};
use mppseg::core::image::stack::{BackgroundStack, Resolution};
use mppseg::core::models::mark::Mark;
use mppseg::engine::annealing::AnnealingSchedule;
use mppseg::engine::config::{OptimizationConfigBuilder, SeedMode};
use mppseg::engine::kernels::prior::MarkPrior;
use mppseg::engine::kernels::proposer::KernelWeights;
use mppseg::engine::scheme::{EnergyScheme, WeightedTerm};
use nalgebra::Point3;

pub const BRIGHT: f32 = 200.0;
pub const DARK: f32 = 10.0;

/// A 40x40 planar image with two bright discs of radius 4 on a dark background.
pub fn two_blob_stack() -> BackgroundStack {
    let blobs = [(10.0, 10.0), (28.0, 26.0)];
    BackgroundStack::from_fn(40, 40, 1, Resolution::default(), |x, y, _| {
        let (px, py) = (x as f64 + 0.5, y as f64 + 0.5);
        let inside = blobs
            .iter()
            .any(|(cx, cy)| (px - cx).powi(2) + (py - cy).powi(2) <= 16.0);
        if inside { BRIGHT } else { DARK }
    })
    .unwrap()
}

pub fn contrast_and_overlap() -> EnergyScheme {
    EnergyScheme::new(vec![
        WeightedTerm::new(IntensityContrast::new(100.0, 100.0).unwrap(), 1.0),
        WeightedTerm::new(OverlapPenalty, 0.1),
    ])
    .unwrap()
}

pub fn all_kernels() -> KernelWeights {
    KernelWeights {
        birth: 0.2,
        death: 0.2,
        moves: 0.3,
        exchange: 0.1,
        split: 0.1,
        merge: 0.1,
    }
}

pub fn builder(iterations: u64, seed: u64) -> OptimizationConfigBuilder {
    OptimizationConfigBuilder::new()
        .kernels(all_kernels())
        .prior(MarkPrior::sphere(2.0, 5.0))
        .annealing(AnnealingSchedule::Geometric {
            initial: 1.0,
            ratio: 0.99,
            minimum: 0.0,
        })
        .max_iterations(iterations)
        .seed(SeedMode::Fixed(seed))
        .interaction_threshold(1.0)
}

pub fn disc(x: f64, y: f64, radius: f64) -> Mark {
    Mark::sphere(Point3::new(x, y, 0.5), radius)
}

pub fn assert_close(a: f64, b: f64, relative: f64) {
    assert!(
        (a - b).abs() <= relative * a.abs().max(b.abs()).max(1.0),
        "{} and {} differ by more than {} relative",
        a,
        b,
        relative
    );
}
