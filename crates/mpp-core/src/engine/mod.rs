//! # Engine Module
//!
//! The stateful layer of mppseg: everything needed to run a reversible-jump Markov
//! chain over mark configurations and keep it cheap to evaluate.
//!
//! ## Overview
//!
//! Each iteration draws a [`kernels::proposal::Proposal`] from a weighted kernel, scores
//! only the affected terms through [`scheme::EnergyScheme::evaluate_delta`], and applies
//! the Metropolis-Hastings test at the temperature given by the annealing schedule.
//! Accepted proposals update the configuration, the [`index::UpdatableMarksIndex`] and
//! the [`cache::EnergyCache`] together; rejected ones leave all three untouched.
//!
//! ## Architecture
//!
//! - **Configuration** ([`config`]) - Typed run settings, a validating builder and TOML loading
//! - **Energy bookkeeping** ([`scheme`], [`cache`]) - Weighted terms, full and incremental evaluation, cached term values
//! - **Interactions** ([`index`]) - Incrementally maintained interacting pairs on a uniform grid
//! - **Proposals** ([`kernels`]) - Birth, death, move, exchange, split and merge with explicit densities
//! - **Chain** ([`optimizer`]) - The iteration loop, acceptance test, consistency checks and failure handling
//! - **Schedules and stopping** ([`annealing`], [`termination`])
//! - **Observation** ([`feedback`], [`state`]) - Per-iteration events, traces, statistics and outcomes
//! - **Error Handling** ([`error`]) - Engine-level error type wrapping every layer's errors
//!
//! ## Key Capabilities
//!
//! - **Incremental evaluation** touching only the marks and pairs a proposal affects
//! - **Targeted cache invalidation** keyed by the marks each value depends on
//! - **Reproducible runs** from a fixed seed
//! - **Parallel full evaluation** with the `parallel` feature

pub mod annealing;
pub mod cache;
pub mod config;
pub mod context;
pub mod error;
pub mod feedback;
pub mod index;
pub mod kernels;
pub mod optimizer;
pub mod scheme;
pub mod state;
pub mod termination;
