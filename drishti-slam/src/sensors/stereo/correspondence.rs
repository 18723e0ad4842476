//! Boundary to the external stereo correspondence engine.
//!
//! The matching algorithm itself lives outside this crate. It is driven
//! through [`CorrespondenceEngine`] and produces [`StereoFeature`]s:
//! rectified image positions with their disparity.

use image::GrayImage;

use super::camera::StereoCamera;

/// A matched feature in the rectified left image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoFeature {
    /// Column in pixels.
    pub x: f32,
    /// Row in pixels.
    pub y: f32,
    /// Horizontal disparity in pixels.
    pub disparity: f32,
    pub colour: [u8; 3],
}

impl StereoFeature {
    pub fn new(x: f32, y: f32, disparity: f32) -> Self {
        Self {
            x,
            y,
            disparity,
            colour: [0; 3],
        }
    }
}

/// Rectification parameters handed to the engine.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StereoCalibration {
    pub focal_length_pixels: f32,
    pub baseline_mm: f32,
    pub image_width: u32,
    pub image_height: u32,
    /// Horizontal offset of the right image after rectification (pixels).
    pub offset_x: f32,
    /// Vertical offset of the right image after rectification (pixels).
    pub offset_y: f32,
}

impl StereoCalibration {
    /// Ideal calibration for a camera: no rectification offsets.
    pub fn from_camera(camera: &StereoCamera) -> Self {
        Self {
            focal_length_pixels: camera.focal_length_pixels(),
            baseline_mm: camera.baseline_mm,
            image_width: camera.image_width,
            image_height: camera.image_height,
            offset_x: 0.0,
            offset_y: 0.0,
        }
    }
}

/// A stereo matcher producing features from raw image pairs.
pub trait CorrespondenceEngine: Send {
    fn set_calibration(&mut self, calibration: &StereoCalibration);

    /// Number of features the engine should try to find.
    fn set_required_features(&mut self, count: usize);

    /// Rectify and match an image pair. Returns the average matching score.
    fn load_raw_images(&mut self, left: &GrayImage, right: &GrayImage) -> f32;

    /// Rectified image from the last `load_raw_images` call.
    fn rectified_image(&self, is_left: bool) -> Option<&GrayImage>;

    /// Features from the last `load_raw_images` call.
    fn features(&self) -> &[StereoFeature];
}
