//! # Core Models Module
//!
//! Fundamental data structures describing the state the optimizer searches over.
//!
//! ## Key Components
//!
//! - [`mark`] - A single parametrized geometric primitive (sphere, ellipsoid, rotatable box)
//! - [`configuration`] - The ordered, mutable set of marks with stable ids
//! - [`geometry`] - Bounding boxes and the small amount of rotation math marks need
//! - [`ids`] - Stable mark identifiers
//!
//! ## Usage
//!
//! ```ignore
//! use mppseg::core::models::{configuration::MarksConfiguration, mark::Mark};
//!
//! let mut configuration = MarksConfiguration::new();
//! let id = configuration.insert(Mark::sphere(Point3::new(4.0, 4.0, 0.5), 2.0));
//! let moved = configuration.get(id).unwrap().with_center(Point3::new(5.0, 4.0, 0.5));
//! configuration.replace(id, moved);
//! ```

pub mod configuration;
pub mod geometry;
pub mod ids;
pub mod mark;
