//! Core algorithms layer.
//!
//! # Contents
//!
//! - [`mapping`]: Evidence rays, inverse sensor model, hypothesis grid
//! - [`localization`]: Pose tree, particle paths, path filter, survey search

pub mod localization;
pub mod mapping;
