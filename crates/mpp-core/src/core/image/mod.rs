//! Read-only image inputs: the background voxel stack marks are scored against and
//! the optional probability map that guides birth proposals.

pub mod probability;
pub mod stack;
