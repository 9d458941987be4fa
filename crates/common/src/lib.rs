//! Shared math for the lumen render core.
//!
//! Vector, quaternion and matrix types come from `glam`; this crate only adds
//! the conventions the render core agrees on (world axes, transform
//! composition order) and a few geometry builders.

pub mod geometry;
mod transform;

pub use transform::{AXIS_FRONT, AXIS_RIGHT, AXIS_UP, LocalTransform, multi_mul};
