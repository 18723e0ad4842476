//! Conversion of stereo features into evidence rays.
//!
//! Rays are camera-centred: the camera sits at the origin looking along
//! `+y`, image columns increase toward `+x` and rows toward `-z`. A
//! feature's range interval comes from the inverse sensor model; the ray
//! runs through the feature's pixel over that interval of depth.

use super::camera::StereoCamera;
use super::correspondence::StereoFeature;
use crate::algorithms::mapping::{EvidenceRay, InverseSensorModel};
use crate::core::types::{Point3D, Pose3D};

/// Builds camera-centred rays from features.
#[derive(Debug, Clone)]
pub struct StereoRayModel {
    focal_length_pixels: f32,
    centre_x: f32,
    centre_y: f32,
    /// Angular footprint of a ray, in pixels.
    ray_width_pixels: f32,
    /// Disparity standard deviation (pixels), stored as ray uncertainty.
    disparity_sigma: f32,
}

impl StereoRayModel {
    pub fn new(camera: &StereoCamera, ray_width_pixels: f32, disparity_sigma: f32) -> Self {
        Self {
            focal_length_pixels: camera.focal_length_pixels(),
            centre_x: camera.image_width as f32 * 0.5,
            centre_y: camera.image_height as f32 * 0.5,
            ray_width_pixels,
            disparity_sigma,
        }
    }

    /// Ray for one feature, or `None` when the disparity carries no
    /// usable range.
    pub fn ray(&self, feature: &StereoFeature, model: &InverseSensorModel) -> Option<EvidenceRay> {
        let (start_depth, length_depth, fattest) = model.ray_extent(feature.disparity)?;
        let end_depth = start_depth + length_depth;

        // Point at unit depth through the pixel
        let f = self.focal_length_pixels;
        let dir = Point3D::new(
            (feature.x - self.centre_x) / f,
            1.0,
            (self.centre_y - feature.y) / f,
        );
        let at = |depth: f32| Point3D::new(dir.x * depth, dir.y * depth, dir.z * depth);

        let ray = EvidenceRay::new(
            Pose3D::identity(),
            at(start_depth),
            at(end_depth),
            fattest,
            self.ray_width_pixels * end_depth / f,
            feature.disparity,
        )
        .with_uncertainty(self.disparity_sigma)
        .with_colour(feature.colour);
        Some(ray)
    }

    /// Rays for every usable feature.
    pub fn rays(&self, features: &[StereoFeature], model: &InverseSensorModel) -> Vec<EvidenceRay> {
        features.iter().filter_map(|f| self.ray(f, model)).collect()
    }
}
