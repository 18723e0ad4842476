//! Background stereo correspondence for one camera.
//!
//! Configures the engine for the camera, matches an image pair and turns
//! the features into camera-centred rays. Cameras mounted exactly forward
//! or backward also run horizon scan matching on the rectified left image
//! and feed the resulting pan change into a [`PanTracker`].

use image::GrayImage;

use super::jobs::Job;
use crate::algorithms::mapping::{EvidenceRay, InverseSensorModel};
use crate::sensors::stereo::{
    CorrespondenceEngine, PanTracker, ScanMatcher, StereoCalibration, StereoCamera,
    StereoRayModel,
};

/// Stereo matching for one camera and one frame.
pub struct StereoJob<E> {
    pub engine: E,
    pub camera: StereoCamera,
    pub model: InverseSensorModel,
    pub ray_model: StereoRayModel,
    pub left: GrayImage,
    pub right: GrayImage,
    pub required_features: usize,
    /// Present when scan matching is enabled for this camera.
    pub scan: Option<(ScanMatcher, PanTracker)>,
    /// Pan angle used to seed the tracker.
    pub current_pan: f32,
}

/// What a [`StereoJob`] hands back.
pub struct StereoOutput<E> {
    pub engine: E,
    pub model: InverseSensorModel,
    pub rays: Vec<EvidenceRay>,
    /// Average matching score reported by the engine.
    pub matching_score: f32,
    pub scan: Option<(ScanMatcher, PanTracker)>,
    /// Updated pan estimate when scan matching produced a match.
    pub pan_estimate: Option<f32>,
}

impl<E: CorrespondenceEngine> StereoJob<E> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        engine: E,
        camera: StereoCamera,
        model: InverseSensorModel,
        ray_model: StereoRayModel,
        left: GrayImage,
        right: GrayImage,
        required_features: usize,
        current_pan: f32,
    ) -> Self {
        Self {
            engine,
            camera,
            model,
            ray_model,
            left,
            right,
            required_features,
            scan: None,
            current_pan,
        }
    }

    /// Enable scan matching. Ignored for cameras that are neither exactly
    /// forward nor exactly backward.
    pub fn with_scan_matching(mut self, matcher: ScanMatcher, tracker: PanTracker) -> Self {
        if self.camera.is_forward() || self.camera.is_rear() {
            self.scan = Some((matcher, tracker));
        }
        self
    }
}

impl<E: CorrespondenceEngine + 'static> Job for StereoJob<E> {
    type Output = StereoOutput<E>;

    fn name(&self) -> &'static str {
        "stereo"
    }

    fn execute(mut self) -> StereoOutput<E> {
        self.engine
            .set_calibration(&StereoCalibration::from_camera(&self.camera));
        self.engine.set_required_features(self.required_features);
        let matching_score = self.engine.load_raw_images(&self.left, &self.right);
        let rays = self.ray_model.rays(self.engine.features(), &self.model);

        let mut pan_estimate = None;
        if let Some((matcher, tracker)) = self.scan.as_mut() {
            let image = self.engine.rectified_image(true).unwrap_or(&self.left);
            if let Some(change) = matcher.pan_change(image, self.camera.field_of_view) {
                pan_estimate =
                    Some(tracker.update(self.current_pan, change, self.camera.is_rear()));
            }
        }

        log::debug!(
            "Stereo: {} features, {} rays, score {:.3}",
            self.engine.features().len(),
            rays.len(),
            matching_score
        );

        StereoOutput {
            engine: self.engine,
            model: self.model,
            rays,
            matching_score,
            scan: self.scan,
            pan_estimate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::mapping::StereoGeometryConfig;
    use crate::sensors::stereo::{StereoCalibration, StereoFeature};
    use crate::threads::jobs::spawn_job;
    use image::Luma;

    /// Engine returning a fixed set of features.
    #[derive(Default)]
    struct FixedEngine {
        calibration: Option<StereoCalibration>,
        required: usize,
        features: Vec<StereoFeature>,
        rectified: Option<GrayImage>,
    }

    impl CorrespondenceEngine for FixedEngine {
        fn set_calibration(&mut self, calibration: &StereoCalibration) {
            self.calibration = Some(*calibration);
        }

        fn set_required_features(&mut self, count: usize) {
            self.required = count;
        }

        fn load_raw_images(&mut self, left: &GrayImage, _right: &GrayImage) -> f32 {
            self.rectified = Some(left.clone());
            self.features = vec![
                StereoFeature::new(320.0, 240.0, 20.0),
                StereoFeature::new(100.0, 240.0, 12.0),
                StereoFeature::new(500.0, 240.0, 0.1),
            ];
            0.75
        }

        fn rectified_image(&self, _is_left: bool) -> Option<&GrayImage> {
            self.rectified.as_ref()
        }

        fn features(&self) -> &[StereoFeature] {
            &self.features
        }
    }

    fn frame(offset: i32) -> GrayImage {
        GrayImage::from_fn(640, 480, |x, _| {
            let u = x as i32 - offset;
            Luma([((u * 29) ^ (u * 13 + 7)).rem_euclid(241) as u8])
        })
    }

    fn job(camera: StereoCamera, image: GrayImage) -> StereoJob<FixedEngine> {
        let model = InverseSensorModel::from_stereo_geometry(&StereoGeometryConfig {
            focal_length_pixels: camera.focal_length_pixels(),
            ..Default::default()
        });
        let ray_model = StereoRayModel::new(&camera, 2.0, 0.5);
        StereoJob::new(
            FixedEngine::default(),
            camera,
            model,
            ray_model,
            image.clone(),
            image,
            50,
            0.3,
        )
    }

    #[test]
    fn test_features_become_rays() {
        let output = spawn_job(job(StereoCamera::forward(), frame(0)))
            .unwrap()
            .wait()
            .unwrap();

        assert_eq!(output.rays.len(), 2);
        assert_eq!(output.matching_score, 0.75);
        assert_eq!(output.engine.required, 50);
        assert!(output.engine.calibration.is_some());
        assert!(output.pan_estimate.is_none());
    }

    #[test]
    fn test_scan_matching_seeds_from_current_pan() {
        let first = job(StereoCamera::forward(), frame(0))
            .with_scan_matching(ScanMatcher::default(), PanTracker::new())
            .execute();
        assert!(first.pan_estimate.is_none());

        let mut second = job(StereoCamera::forward(), frame(0));
        second.scan = first.scan;
        let second = second.execute();
        let estimate = second.pan_estimate.unwrap();
        assert!((estimate - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_oblique_camera_skips_scan_matching() {
        let camera = StereoCamera {
            pan: 0.5,
            ..Default::default()
        };
        let job = job(camera, frame(0))
            .with_scan_matching(ScanMatcher::default(), PanTracker::new());
        assert!(job.scan.is_none());
    }
}
