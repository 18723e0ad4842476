//! Unified configuration loading.
//!
//! All settings come from one TOML file; every section and field has a
//! default, so an empty file (or none at all) is valid.
//!
//! ## Example TOML
//!
//! ```toml
//! [survey]
//! diameter_mm = 400.0
//! trial_poses = 200
//! random_seed = 1234
//! pruning_threshold = 0.25
//!
//! [route]
//! min_distance_mm = 100.0
//! points_per_grid = 5
//!
//! [scheduler]
//! threads = 0              # 0 = available parallelism
//!
//! [grid]
//! dimension_cells = 256
//! cell_size_mm = 40.0
//!
//! [filter]
//! num_paths = 100
//! max_path_length = 50
//!
//! [sensor.stereo]
//! disparity_sigma_pixels = 0.5
//!
//! [[sensor.cameras]]
//! pan = 0.0
//! baseline_mm = 100.0
//! ```

use std::path::Path;
use std::sync::Arc;

use image::GrayImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algorithms::localization::{PathFilterConfig, SurveyConfig, SurveyLocalizer};
use crate::algorithms::mapping::{GridConfig, InverseSensorModel, StereoGeometryConfig};
use crate::engine::RouteConfig;
use crate::sensors::stereo::{
    CorrespondenceEngine, PanTracker, RobotGeometry, ScanMatcher, StereoCamera, StereoRayModel,
};
use crate::threads::{ParallelScheduler, StereoJob};

/// Default config file location.
pub const DEFAULT_CONFIG_PATH: &str = "configs/drishti.toml";

/// Config load error.
#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] basic_toml::Error),
}

/// Worker pool settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSection {
    /// Worker threads. 0 uses the available parallelism.
    pub threads: usize,
}

/// Stereo sensor settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSection {
    /// Disparity noise and range binning for the inverse sensor model.
    /// Focal length and baseline are taken from each camera.
    pub stereo: StereoGeometryConfig,

    /// Mounted stereo pairs, in camera index order.
    pub cameras: Vec<StereoCamera>,

    /// Angular footprint of an evidence ray (pixels).
    pub ray_width_pixels: f32,

    /// Features requested from the correspondence engine per frame.
    pub required_features: usize,

    /// Run horizon scan matching on forward and rear cameras.
    pub scan_matching: bool,

    /// Scan matching search range (pixels).
    pub scan_max_shift: usize,

    /// Rows in the scan matching horizon band.
    pub scan_band_rows: u32,
}

impl Default for SensorSection {
    fn default() -> Self {
        Self {
            stereo: StereoGeometryConfig::default(),
            cameras: vec![StereoCamera::forward()],
            ray_width_pixels: 2.0,
            required_features: 200,
            scan_matching: true,
            scan_max_shift: 40,
            scan_band_rows: 20,
        }
    }
}

/// Full configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DrishtiConfig {
    #[serde(default)]
    pub survey: SurveyConfig,

    #[serde(default)]
    pub route: RouteConfig,

    #[serde(default)]
    pub scheduler: SchedulerSection,

    #[serde(default)]
    pub grid: GridConfig,

    #[serde(default)]
    pub filter: PathFilterConfig,

    #[serde(default)]
    pub sensor: SensorSection,
}

impl DrishtiConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigLoadError> {
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml(&contents)?;
        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Load from [`DEFAULT_CONFIG_PATH`], or defaults if it doesn't exist.
    pub fn load_default() -> Result<Self, ConfigLoadError> {
        let path = Path::new(DEFAULT_CONFIG_PATH);
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml: &str) -> Result<Self, ConfigLoadError> {
        Ok(basic_toml::from_str(toml)?)
    }

    /// Worker pool sized from the scheduler section.
    pub fn scheduler(&self) -> ParallelScheduler {
        match self.scheduler.threads {
            0 => ParallelScheduler::new(),
            n => ParallelScheduler::with_threads(n),
        }
    }

    pub fn survey_localizer(&self) -> SurveyLocalizer {
        SurveyLocalizer::new(self.survey.clone(), self.scheduler())
    }

    pub fn robot_geometry(&self) -> RobotGeometry {
        RobotGeometry::new(self.sensor.cameras.clone())
    }

    /// Stereo geometry for one camera.
    pub fn stereo_geometry(&self, camera: &StereoCamera) -> StereoGeometryConfig {
        StereoGeometryConfig {
            focal_length_pixels: camera.focal_length_pixels(),
            baseline_mm: camera.baseline_mm,
            ..self.sensor.stereo
        }
    }

    /// One inverse sensor model per camera.
    pub fn sensor_models(&self) -> Arc<Vec<InverseSensorModel>> {
        let models = self
            .sensor
            .cameras
            .iter()
            .map(|camera| InverseSensorModel::from_stereo_geometry(&self.stereo_geometry(camera)))
            .collect();
        Arc::new(models)
    }

    /// Ray model for one camera.
    pub fn ray_model(&self, camera: &StereoCamera) -> StereoRayModel {
        StereoRayModel::new(
            camera,
            self.sensor.ray_width_pixels,
            self.sensor.stereo.disparity_sigma_pixels,
        )
    }

    /// Scan matcher for a camera, when enabled and the camera qualifies.
    pub fn scan_matcher(&self, camera: &StereoCamera) -> Option<ScanMatcher> {
        let eligible = camera.is_forward() || camera.is_rear();
        (self.sensor.scan_matching && eligible)
            .then(|| ScanMatcher::new(self.sensor.scan_max_shift, self.sensor.scan_band_rows))
    }

    /// Stereo job matching one frame from camera `camera_index`.
    ///
    /// Returns `None` when no camera has that index.
    pub fn stereo_job<E: CorrespondenceEngine>(
        &self,
        camera_index: usize,
        engine: E,
        left: GrayImage,
        right: GrayImage,
        current_pan: f32,
    ) -> Option<StereoJob<E>> {
        let camera = self.sensor.cameras.get(camera_index)?;
        let model = InverseSensorModel::from_stereo_geometry(&self.stereo_geometry(camera));
        let job = StereoJob::new(
            engine,
            camera.clone(),
            model,
            self.ray_model(camera),
            left,
            right,
            self.sensor.required_features,
            current_pan,
        );
        Some(match self.scan_matcher(camera) {
            Some(matcher) => job.with_scan_matching(matcher, PanTracker::new()),
            None => job,
        })
    }
}
