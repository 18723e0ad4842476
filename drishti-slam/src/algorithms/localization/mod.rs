//! Localization module.
//!
//! Multi-hypothesis trajectory tracking and survey-based relocalization.
//!
//! # Components
//!
//! - [`PoseTree`]: arena of [`ParticlePose`]s addressed by [`PoseId`]
//! - [`ParticlePath`]: one candidate trajectory with fork/prune semantics
//! - [`MotionModel`]: odometry motion model with configurable noise
//! - [`PathFilter`]: particle filter over trajectories
//! - [`SurveyLocalizer`]: two-stage position then heading search
//!
//! # Example
//!
//! ```ignore
//! use drishti_slam::algorithms::localization::{PathFilter, PathFilterConfig};
//!
//! let mut filter = PathFilter::new(PathFilterConfig::default(), start_pose);
//!
//! filter.predict(&odom_delta);
//! let scores = filter.observe(&mut grid, &rays, &geometry, &models);
//! filter.resample(&mut grid);
//!
//! let pose = filter.estimate();
//! ```

mod motion_model;
mod particle_path;
mod particle_pose;
mod path_filter;
mod survey;

pub use motion_model::{MotionModel, MotionModelConfig};
pub use particle_path::ParticlePath;
pub use particle_pose::{
    Ancestry, GridCellHypothesis, HypothesisId, MAX_PATH_HISTORY, ParticlePose, PoseId, PoseTree,
};
pub use path_filter::{PathFilter, PathFilterConfig};
pub use survey::{SurveyConfig, SurveyLocalizer, SurveyResult};
