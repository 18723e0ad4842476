//! Hypothesis grid configuration.

use serde::{Deserialize, Serialize};

/// Configuration for [`MultiHypothesisGrid`](super::MultiHypothesisGrid).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    /// Cells along each side of the square grid.
    ///
    /// Cell indices are stored as `i16`, so this is capped at 32767.
    pub dimension_cells: usize,

    /// Cell size in millimetres.
    pub cell_size_mm: f32,

    /// World X coordinate of the grid centre (mm).
    pub centre_x: f32,

    /// World Y coordinate of the grid centre (mm).
    pub centre_y: f32,

    /// Occupancy probability given to cells between the camera and the
    /// start of a ray.
    ///
    /// Below 0.5 marks them as likely free. 0.5 disables vacancy updates.
    pub vacancy_probability: f32,

    /// Clamp for the summed log-odds of a cell.
    pub log_odds_max: f32,

    /// Fraction of a ray's length by which its occupancy peak is pushed
    /// away from the camera.
    ///
    /// Zero keeps the linear profile. Any other value switches to the
    /// Gaussian profile centred on the shifted peak.
    pub forward_bias: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            dimension_cells: 256,
            cell_size_mm: 40.0, // ~10m square
            centre_x: 0.0,
            centre_y: 0.0,
            vacancy_probability: 0.45,
            log_odds_max: 20.0,
            forward_bias: 0.0,
        }
    }
}

impl GridConfig {
    /// Grid covering `dimension_mm` square around `(centre_x, centre_y)`.
    pub fn covering(dimension_mm: f32, cell_size_mm: f32, centre_x: f32, centre_y: f32) -> Self {
        Self {
            dimension_cells: (dimension_mm / cell_size_mm).ceil().max(1.0) as usize,
            cell_size_mm,
            centre_x,
            centre_y,
            ..Default::default()
        }
    }

    /// Side length of the grid in mm.
    pub fn dimension_mm(&self) -> f32 {
        self.dimension_cells as f32 * self.cell_size_mm
    }
}
