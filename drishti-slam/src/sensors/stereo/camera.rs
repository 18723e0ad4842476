//! Stereo camera mounts and their world positions.

use serde::{Deserialize, Serialize};

use crate::core::types::{Point3D, Pose3D};

/// One stereo pair mounted on the robot.
///
/// Mount position and orientation are relative to the robot centre.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoCamera {
    /// Mount position (mm).
    pub position: Point3D,
    /// Mount orientation (rad). Pan 0 looks forward, π looks backward.
    pub pan: f32,
    pub tilt: f32,
    pub roll: f32,
    /// Distance between the left and right cameras (mm).
    pub baseline_mm: f32,
    /// Horizontal field of view (rad).
    pub field_of_view: f32,
    pub image_width: u32,
    pub image_height: u32,
}

impl Default for StereoCamera {
    fn default() -> Self {
        Self {
            position: Point3D::new(0.0, 0.0, 300.0),
            pan: 0.0,
            tilt: 0.0,
            roll: 0.0,
            baseline_mm: 100.0,
            field_of_view: 76.0_f32.to_radians(),
            image_width: 640,
            image_height: 480,
        }
    }
}

impl StereoCamera {
    /// Forward-facing camera.
    pub fn forward() -> Self {
        Self::default()
    }

    /// Rear-facing camera.
    pub fn rear() -> Self {
        Self {
            pan: std::f32::consts::PI,
            ..Default::default()
        }
    }

    /// Focal length in pixels implied by the field of view.
    pub fn focal_length_pixels(&self) -> f32 {
        self.image_width as f32 * 0.5 / (self.field_of_view * 0.5).tan()
    }

    /// Whether the camera looks exactly forward.
    #[inline]
    pub fn is_forward(&self) -> bool {
        self.pan == 0.0
    }

    /// Whether the camera looks exactly backward.
    #[inline]
    pub fn is_rear(&self) -> bool {
        self.pan == std::f32::consts::PI
    }
}

/// World placement of one stereo pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CameraPosition {
    /// Midpoint between the cameras, oriented along the optical axis.
    pub centre: Pose3D,
    pub left: Point3D,
    pub right: Point3D,
}

/// Camera layout of the robot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotGeometry {
    pub cameras: Vec<StereoCamera>,
}

impl Default for RobotGeometry {
    fn default() -> Self {
        Self {
            cameras: vec![StereoCamera::forward()],
        }
    }
}

impl RobotGeometry {
    pub fn new(cameras: Vec<StereoCamera>) -> Self {
        Self { cameras }
    }

    /// World placement of camera `index` when the robot is at `pose`.
    pub fn camera_position(&self, index: usize, pose: &Pose3D) -> Option<CameraPosition> {
        let camera = self.cameras.get(index)?;
        let p = pose.transform_point(&camera.position);
        let centre = Pose3D::new(
            p.x,
            p.y,
            p.z,
            pose.pan + camera.pan,
            pose.tilt + camera.tilt,
            pose.roll + camera.roll,
        );

        let half = camera.baseline_mm * 0.5;
        let offset = |dx: f32| {
            Point3D::new(dx, 0.0, 0.0)
                .rotate(centre.pan, centre.tilt, centre.roll)
                .translate(centre.x, centre.y, centre.z)
        };

        Some(CameraPosition {
            centre,
            left: offset(-half),
            right: offset(half),
        })
    }

    /// World placement of every camera when the robot is at `pose`.
    pub fn camera_positions(&self, pose: &Pose3D) -> Vec<CameraPosition> {
        (0..self.cameras.len())
            .filter_map(|i| self.camera_position(i, pose))
            .collect()
    }
}
