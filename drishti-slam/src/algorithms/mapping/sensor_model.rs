//! Inverse stereo sensor model.
//!
//! For each quantised disparity the table holds the probability that the
//! observed surface lies in each distance bin along the ray. Rows are
//! built once and only read afterwards, so the model is shared between
//! threads behind an `Arc`.
//!
//! Disparity is quantised at [`DISPARITY_STEPS_PER_PIXEL`] steps per pixel.
//! Steps below [`MIN_VALID_DISPARITY_STEP`] (sub-half-pixel disparity) carry
//! no usable range information and always read as zero.

use serde::{Deserialize, Serialize};

/// Disparity quantisation.
pub const DISPARITY_STEPS_PER_PIXEL: usize = 4;

/// First disparity step with a meaningful curve.
pub const MIN_VALID_DISPARITY_STEP: usize = 2;

/// Samples per curve when integrating disparity noise.
const NOISE_SAMPLES: usize = 1024;

/// Disparity noise is integrated out to this many standard deviations.
const NOISE_EXTENT_SIGMA: f32 = 3.0;

/// Bins below this fraction of a curve's peak are excluded from ray extents.
const EXTENT_THRESHOLD: f32 = 0.01;

/// Stereo rig parameters used to derive the model analytically.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct StereoGeometryConfig {
    /// Focal length in pixels.
    pub focal_length_pixels: f32,
    /// Distance between the two camera centres (mm).
    pub baseline_mm: f32,
    /// Standard deviation of disparity measurements (pixels).
    pub disparity_sigma_pixels: f32,
    /// Largest disparity the table covers (pixels).
    pub max_disparity_pixels: f32,
    /// Width of one distance bin (mm).
    pub distance_step_mm: f32,
    /// Ranges beyond this are not represented (mm).
    pub max_range_mm: f32,
}

impl Default for StereoGeometryConfig {
    fn default() -> Self {
        Self {
            focal_length_pixels: 400.0,
            baseline_mm: 100.0,
            disparity_sigma_pixels: 0.5,
            max_disparity_pixels: 64.0,
            distance_step_mm: 20.0,
            max_range_mm: 10_000.0,
        }
    }
}

impl StereoGeometryConfig {
    /// Range in mm for a disparity in pixels (`f·B/d`).
    #[inline]
    pub fn range_for_disparity(&self, disparity: f32) -> f32 {
        if disparity <= 0.0 {
            f32::INFINITY
        } else {
            self.focal_length_pixels * self.baseline_mm / disparity
        }
    }
}

/// Lookup table mapping (disparity, distance) to occupancy probability.
#[derive(Debug, Clone)]
pub struct InverseSensorModel {
    /// `table[disparity_step][distance_step]`
    table: Vec<Vec<f32>>,
    /// Number of meaningful distance steps per disparity row.
    length: Vec<usize>,
    /// Highest value in each row.
    peak: Vec<f32>,
    distance_step_mm: f32,
}

impl InverseSensorModel {
    /// Derive the model from stereo geometry.
    ///
    /// Gaussian disparity noise is propagated through `range = f·B/d` and
    /// binned by distance step. Each row sums to one over its bins.
    pub fn from_stereo_geometry(config: &StereoGeometryConfig) -> Self {
        let steps = (config.max_disparity_pixels * DISPARITY_STEPS_PER_PIXEL as f32).ceil() as usize + 1;
        let bins = (config.max_range_mm / config.distance_step_mm).ceil().max(1.0) as usize;
        let sigma = config.disparity_sigma_pixels.max(1e-3);

        let mut curves = vec![Vec::new(); steps];
        for (step, curve) in curves.iter_mut().enumerate().skip(MIN_VALID_DISPARITY_STEP) {
            let disparity = step as f32 / DISPARITY_STEPS_PER_PIXEL as f32;
            let mut row = vec![0.0f32; bins];
            let extent = NOISE_EXTENT_SIGMA * sigma;

            for i in 0..NOISE_SAMPLES {
                let t = i as f32 / (NOISE_SAMPLES - 1) as f32;
                let d = disparity - extent + 2.0 * extent * t;
                if d <= 0.0 {
                    continue;
                }
                let z = (d - disparity) / sigma;
                let weight = (-0.5 * z * z).exp();
                let bin = (config.range_for_disparity(d) / config.distance_step_mm) as usize;
                if bin < bins {
                    row[bin] += weight;
                }
            }

            let total: f32 = row.iter().sum();
            if total > 0.0 {
                row.iter_mut().for_each(|v| *v /= total);
            }
            *curve = row;
        }

        let model = Self::from_curves(config.distance_step_mm, curves);
        log::debug!(
            "Inverse sensor model: {} disparity steps, {} distance bins of {}mm",
            model.disparity_steps(),
            bins,
            config.distance_step_mm
        );
        model
    }

    /// Group externally calibrated curves into a model.
    ///
    /// `curves[step]` is the distance profile for disparity step `step`.
    /// Rows below [`MIN_VALID_DISPARITY_STEP`] are discarded and trailing
    /// zero bins are not counted in a row's length.
    pub fn from_curves(distance_step_mm: f32, mut curves: Vec<Vec<f32>>) -> Self {
        for curve in curves.iter_mut().take(MIN_VALID_DISPARITY_STEP) {
            curve.clear();
        }

        let length = curves
            .iter()
            .map(|row| row.iter().rposition(|&v| v > 0.0).map_or(0, |i| i + 1))
            .collect();
        let peak = curves
            .iter()
            .map(|row| row.iter().copied().fold(0.0f32, f32::max))
            .collect();

        Self {
            table: curves,
            length,
            peak,
            distance_step_mm,
        }
    }

    /// Number of disparity rows.
    #[inline]
    pub fn disparity_steps(&self) -> usize {
        self.table.len()
    }

    /// Width of a distance bin in mm.
    #[inline]
    pub fn distance_step_mm(&self) -> f32 {
        self.distance_step_mm
    }

    /// Quantise a disparity in pixels to a row index.
    #[inline]
    pub fn disparity_index(disparity: f32) -> usize {
        (disparity.max(0.0) * DISPARITY_STEPS_PER_PIXEL as f32).round() as usize
    }

    /// Meaningful distance steps for a row (0 for invalid rows).
    #[inline]
    pub fn length(&self, disparity_index: usize) -> usize {
        if disparity_index < MIN_VALID_DISPARITY_STEP {
            return 0;
        }
        self.length.get(disparity_index).copied().unwrap_or(0)
    }

    /// Table value by indices. Zero outside the row's length or the table.
    #[inline]
    pub fn lookup(&self, disparity_index: usize, distance_index: usize) -> f32 {
        if distance_index >= self.length(disparity_index) {
            return 0.0;
        }
        self.table[disparity_index][distance_index]
    }

    /// Table value for a distance in mm.
    #[inline]
    pub fn coeff(&self, disparity_index: usize, distance_mm: f32) -> f32 {
        if distance_mm < 0.0 {
            return 0.0;
        }
        self.lookup(disparity_index, (distance_mm / self.distance_step_mm) as usize)
    }

    /// Table value scaled so the row's peak reads as one.
    pub fn normalized_coeff(&self, disparity_index: usize, distance_mm: f32) -> f32 {
        let peak = self.peak.get(disparity_index).copied().unwrap_or(0.0);
        if peak <= 0.0 {
            return 0.0;
        }
        (self.coeff(disparity_index, distance_mm) / peak).clamp(0.0, 1.0)
    }

    /// Extent of the plausible range for a disparity in pixels.
    ///
    /// Returns `(start_dist, length, fattest_point)` in mm, with the fattest
    /// point as a fraction of the length, or `None` when the row has no
    /// usable curve.
    pub fn ray_extent(&self, disparity: f32) -> Option<(f32, f32, f32)> {
        let idx = Self::disparity_index(disparity);
        let len = self.length(idx);
        if len == 0 {
            return None;
        }
        let row = &self.table[idx][..len];
        let peak = self.peak[idx];
        let threshold = peak * EXTENT_THRESHOLD;

        let first = row.iter().position(|&v| v >= threshold)?;
        let last = row.iter().rposition(|&v| v >= threshold)?;
        let peak_bin = row
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(b.1))
            .map(|(i, _)| i)?;

        let start = first as f32 * self.distance_step_mm;
        let end = (last + 1) as f32 * self.distance_step_mm;
        let length = end - start;
        let peak_centre = (peak_bin as f32 + 0.5) * self.distance_step_mm;
        let fattest = ((peak_centre - start) / length).clamp(0.01, 0.99);

        Some((start, length, fattest))
    }
}
