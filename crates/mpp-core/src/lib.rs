//! # mppseg
//!
//! A marked point process optimizer for image segmentation. Objects in a background
//! image stack are explained by a configuration of geometric marks (spheres,
//! ellipsoids, rotatable boxes) found by simulated annealing over birth, death, move
//! and compound proposals.
//!
//! ## Architectural Philosophy
//!
//! The library follows a three-layer architecture:
//!
//! - **[`core`]: The Foundation.** Stateless data models (`Mark`, `MarksConfiguration`),
//!   the read-only `BackgroundStack` and the pluggable `EnergyTerm` scoring functions.
//!
//! - **[`engine`]: The Logic Core.** The stateful layer driving the optimization: the
//!   `EnergyCache` with targeted invalidation, the incrementally updated interaction
//!   index, incremental energy evaluation, proposal kernels, annealing schedules,
//!   termination and feedback, and the Markov chain itself.
//!
//! - **[`workflows`]: The Public API.** Entry points that assemble the engine from a
//!   configuration and run complete segmentations, single or batched, and export
//!   their traces.

pub mod core;
pub mod engine;
pub mod workflows;
