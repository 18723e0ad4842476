//! Core foundation layer.
//!
//! This is the bottom layer of the stack with no internal dependencies.
//! All other layers depend on core.
//!
//! # Contents
//!
//! - [`types`]: Core data types (points, poses)
//! - [`math`]: Mathematical primitives (angle normalization, log-odds)

pub mod math;
pub mod types;
