//! # Workflows Module
//!
//! High-level entry points that assemble the engine from a run configuration and
//! execute complete segmentations.
//!
//! ## Overview
//!
//! A workflow takes the background stack, the energy scheme and an initial
//! configuration, builds the [`crate::engine::optimizer::OptimizationScheme`], runs it
//! to completion and hands back the outcome. Batches of independent runs, seeded
//! consecutively from one base seed, run in parallel with the `parallel` feature.
//!
//! ## Architecture
//!
//! - **Segmentation** ([`segment`]) - Single and batched runs, scheme construction and seeding
//! - **Export** ([`export`]) - CSV output of energy traces, marks and configuration snapshots

pub mod export;
pub mod segment;
