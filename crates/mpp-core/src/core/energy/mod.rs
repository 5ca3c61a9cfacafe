//! # Energy Module
//!
//! Scoring functions for mark configurations. The energy of a configuration is a
//! weighted sum of terms; each term is either unary (one value per mark) or pairwise
//! (one value per interacting pair of marks).
//!
//! ## Key Components
//!
//! - [`term`] - The [`term::EnergyTerm`] trait and the read-only context terms score against
//! - [`scoring`] - [`scoring::Scorer`], which enforces geometry and finiteness checks around terms
//! - [`terms`] - Built-in terms and their declarative [`terms::TermSpec`] form
//! - [`breakdown`] - Per-term energy accounting
//!
//! ## Usage
//!
//! ```ignore
//! use mppseg::core::energy::scoring::Scorer;
//! use mppseg::core::energy::term::{MarkRef, TermContext};
//!
//! let scorer = Scorer::new(TermContext::uncached(&stack));
//! let value = scorer.score_mark(&term, MarkRef::published(id, &mark))?;
//! ```

pub mod breakdown;
pub(crate) mod potentials;
pub mod scoring;
pub mod term;
pub mod terms;
