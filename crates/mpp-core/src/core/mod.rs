//! # Core Module
//!
//! Stateless building blocks of the segmentation optimizer: the geometric marks and
//! the configurations they form, the background image stack they are fitted against,
//! and the energy terms that score them.
//!
//! - **Marks and configurations** ([`models`]) - Mark kinds, geometry, ids and [`models::configuration::MarksConfiguration`]
//! - **Image data** ([`image`]) - Read-only voxel stacks and birth probability maps
//! - **Energy** ([`energy`]) - The pluggable term trait, built-in terms and energy breakdowns
//!
//! Nothing in this module mutates shared state; caching, indexing and the Markov
//! chain itself live in [`crate::engine`].

pub mod energy;
pub mod image;
pub mod models;
