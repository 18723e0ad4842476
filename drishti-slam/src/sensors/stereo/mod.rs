//! Stereo camera glue.
//!
//! Camera mounts, the correspondence engine boundary, conversion of
//! matched features into evidence rays and horizon scan matching.

mod camera;
mod correspondence;
mod ray_model;
mod scan_match;

pub use camera::{CameraPosition, RobotGeometry, StereoCamera};
pub use correspondence::{CorrespondenceEngine, StereoCalibration, StereoFeature};
pub use ray_model::StereoRayModel;
pub use scan_match::{PanTracker, ScanMatcher};
