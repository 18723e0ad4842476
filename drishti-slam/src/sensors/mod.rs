//! Sensor processing layer.
//!
//! # Contents
//!
//! - [`stereo`]: Camera mounts, correspondence engine boundary, ray
//!   conversion and horizon scan matching

pub mod stereo;
