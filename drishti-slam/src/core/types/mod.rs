//! Core data types.
//!
//! - [`Point3D`]: 3D point in millimetres
//! - [`Pose3D`]: position plus pan/tilt/roll orientation

mod pose;

pub use pose::{Point3D, Pose3D};
