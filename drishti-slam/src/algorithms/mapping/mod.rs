//! Mapping module.
//!
//! Turns stereo range measurements into occupancy evidence.
//!
//! # Components
//!
//! - [`EvidenceRay`]: a range measurement with a probability profile
//! - [`InverseSensorModel`]: disparity/distance probability table
//! - [`HypothesisGrid`]: storage contract used by the particle filter
//! - [`MultiHypothesisGrid`]: per-cell hypothesis lists with path visibility
//!
//! # Example
//!
//! ```ignore
//! use drishti_slam::algorithms::mapping::{
//!     EvidenceRay, GridConfig, InverseSensorModel, MultiHypothesisGrid, StereoGeometryConfig,
//! };
//!
//! let model = InverseSensorModel::from_stereo_geometry(&StereoGeometryConfig::default());
//! let mut grid = MultiHypothesisGrid::new(GridConfig::default());
//!
//! let score = grid.insert(&ray, pose_id, &mut tree, &model, left, right);
//! ```

mod evidence_ray;
pub mod grid;
mod sensor_model;

pub use evidence_ray::{EvidenceRay, GaussianLookup, NO_EVIDENCE, PAN_STEPS, pan_index};
pub use grid::{GridConfig, HypothesisGrid, MultiHypothesisGrid};
pub use sensor_model::{
    DISPARITY_STEPS_PER_PIXEL, InverseSensorModel, MIN_VALID_DISPARITY_STEP, StereoGeometryConfig,
};
