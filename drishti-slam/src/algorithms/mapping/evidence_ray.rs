//! Evidence rays: probabilistic occupancy measurements from stereo ranges.
//!
//! A ray runs from `vertices[0]` (nearest plausible range) to `vertices[1]`
//! (furthest plausible range) as seen from `observed_from`. Occupancy
//! probability along the ray follows a tent profile that peaks at
//! `fattest_point`, the fraction of the ray length where the range
//! estimate is most likely.
//!
//! ```text
//!   p
//! 1 |        /\
//!   |       /  \
//!   |      /    \
//! 0 +-----/------\------> distance from observed_from
//!     start_dist  start_dist + length
//! ```
//!
//! Rays are usually created camera-centred and then re-projected into
//! candidate robot poses with [`EvidenceRay::trial_pose`], which never
//! mutates the source ray.

use serde::{Deserialize, Serialize};

use crate::core::math::{pan_bearing, wrap_full_turn};
use crate::core::types::{Point3D, Pose3D};

/// Number of pan buckets over a full turn.
pub const PAN_STEPS: usize = 25;

/// Returned by probability queries outside the ray's support.
pub const NO_EVIDENCE: f32 = -1.0;

/// Peak positions are kept this far away from the ray ends when biased.
const MIN_PEAK_FRACTION: f32 = 0.05;
const MAX_PEAK_FRACTION: f32 = 0.95;

/// Bucket index of a pan angle.
#[inline]
pub fn pan_index(pan: f32) -> usize {
    let idx = (wrap_full_turn(pan) * PAN_STEPS as f32 / std::f32::consts::TAU) as usize;
    idx.min(PAN_STEPS - 1)
}

/// Precomputed half-Gaussian used for biased ray profiles.
///
/// `value(z)` returns `exp(-z²/2)` for `|z| <= max_sigma` and the tail
/// value beyond it.
#[derive(Debug, Clone)]
pub struct GaussianLookup {
    table: Vec<f32>,
    max_sigma: f32,
}

impl GaussianLookup {
    /// Build a lookup with `levels` entries covering `[0, max_sigma]`.
    pub fn new(levels: usize, max_sigma: f32) -> Self {
        let levels = levels.max(2);
        let table = (0..levels)
            .map(|i| {
                let z = i as f32 / (levels - 1) as f32 * max_sigma;
                (-0.5 * z * z).exp()
            })
            .collect();
        Self { table, max_sigma }
    }

    /// Extent of the table in standard deviations.
    #[inline]
    pub fn max_sigma(&self) -> f32 {
        self.max_sigma
    }

    /// Gaussian value at `z` standard deviations from the mean.
    #[inline]
    pub fn value(&self, z: f32) -> f32 {
        let last = self.table.len() - 1;
        let idx = (z.abs() / self.max_sigma * last as f32).round() as usize;
        self.table[idx.min(last)]
    }
}

impl Default for GaussianLookup {
    fn default() -> Self {
        Self::new(100, 3.0)
    }
}

/// A directed range measurement with an occupancy probability profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceRay {
    /// Start and end of the ray.
    pub vertices: [Point3D; 2],
    /// Pose the ray was cast from (camera centre).
    pub observed_from: Pose3D,
    /// Fraction of the length at which probability peaks, in (0, 1).
    pub fattest_point: f32,
    /// Ray width in millimetres.
    pub width: f32,
    /// Ray length in millimetres.
    pub length: f32,
    /// Range uncertainty (standard deviation in disparity pixels).
    pub uncertainty: f32,
    /// Disparity in pixels that produced this ray.
    pub disparity: f32,
    /// Bearing from `observed_from` to the ray end.
    pub pan_angle: f32,
    /// Bucket of `pan_angle` over [`PAN_STEPS`].
    pub pan_index: usize,
    /// Ground-plane distance from `observed_from` to the ray start.
    pub start_dist: f32,
    /// Mean colour of the matched feature.
    pub colour: [u8; 3],
}

impl EvidenceRay {
    /// Create a ray from explicit vertices.
    pub fn new(
        observed_from: Pose3D,
        start: Point3D,
        end: Point3D,
        fattest_point: f32,
        width: f32,
        disparity: f32,
    ) -> Self {
        let mut ray = Self {
            vertices: [start, end],
            observed_from,
            fattest_point,
            width,
            length: 0.0,
            uncertainty: 0.0,
            disparity,
            pan_angle: 0.0,
            pan_index: 0,
            start_dist: 0.0,
            colour: [0; 3],
        };
        ray.update_polar();
        ray
    }

    /// Create a ground-plane ray from its polar description.
    ///
    /// The ray starts `start_dist` from `(origin_x, origin_y)` along
    /// bearing `pan_angle` and extends for `length`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_polar(
        origin_x: f32,
        origin_y: f32,
        pan_angle: f32,
        start_dist: f32,
        length: f32,
        fattest_point: f32,
        width: f32,
        disparity: f32,
    ) -> Self {
        let start = Point3D::new(0.0, start_dist, 0.0)
            .rotate(pan_angle, 0.0, 0.0)
            .translate(origin_x, origin_y, 0.0);
        let end = Point3D::new(0.0, start_dist + length, 0.0)
            .rotate(pan_angle, 0.0, 0.0)
            .translate(origin_x, origin_y, 0.0);

        Self {
            vertices: [start, end],
            observed_from: Pose3D::planar(origin_x, origin_y, pan_angle),
            fattest_point,
            width,
            length,
            uncertainty: 0.0,
            disparity,
            pan_angle,
            pan_index: pan_index(pan_angle),
            start_dist,
            colour: [0; 3],
        }
    }

    /// Set the uncertainty (builder style).
    pub fn with_uncertainty(mut self, uncertainty: f32) -> Self {
        self.uncertainty = uncertainty;
        self
    }

    /// Set the colour (builder style).
    pub fn with_colour(mut self, colour: [u8; 3]) -> Self {
        self.colour = colour;
        self
    }

    /// Recompute length, bearing and start distance from the vertices.
    fn update_polar(&mut self) {
        let [start, end] = self.vertices;
        self.length = start.distance(&end);
        self.pan_angle = pan_bearing(end.x - self.observed_from.x, end.y - self.observed_from.y);
        self.pan_index = pan_index(self.pan_angle);
        self.start_dist = self.observed_from.position().planar_distance(&start);
    }

    /// Ground-plane distance from `observed_from` to the far end.
    #[inline]
    pub fn end_dist(&self) -> f32 {
        self.start_dist + self.length
    }

    /// Ground-plane position of the probability peak.
    pub fn peak_position(&self) -> Point3D {
        let [start, end] = self.vertices;
        let f = self.fattest_point;
        Point3D::new(
            start.x + (end.x - start.x) * f,
            start.y + (end.y - start.y) * f,
            start.z + (end.z - start.z) * f,
        )
    }

    /// Return a copy rotated by `pose`'s orientation and translated by its
    /// position, including the vantage point.
    pub fn transformed(&self, pose: &Pose3D) -> EvidenceRay {
        let mut ray = self.clone();
        ray.vertices = [
            pose.transform_point(&self.vertices[0]),
            pose.transform_point(&self.vertices[1]),
        ];
        ray.observed_from = self
            .observed_from
            .rotate(pose.pan, pose.tilt, pose.roll)
            .translate(pose.x, pose.y, pose.z);
        ray.update_polar();
        ray
    }

    /// Re-project this ray as if observed from `(tx, ty)` with its bearing
    /// advanced by `extra_pan`.
    ///
    /// The result lies in the ground plane. `start_dist`, `length`,
    /// `fattest_point`, `width`, `disparity` and `colour` carry over
    /// unchanged; the source ray is not modified.
    pub fn trial_pose(&self, extra_pan: f32, tx: f32, ty: f32) -> EvidenceRay {
        let pan = self.pan_angle + extra_pan;
        let mut ray = Self::from_polar(
            tx,
            ty,
            pan,
            self.start_dist,
            self.length,
            self.fattest_point,
            self.width,
            self.disparity,
        );
        ray.uncertainty = self.uncertainty;
        ray.colour = self.colour;
        ray
    }

    /// Fraction along the ray of the ground-plane point `(x, y)`.
    ///
    /// `None` when the point's distance from `observed_from` lies outside
    /// `[start_dist, start_dist + length)`.
    #[inline]
    fn fraction_along(&self, x: f32, y: f32) -> Option<f32> {
        if self.length <= 0.0 {
            return None;
        }
        let dx = x - self.observed_from.x;
        let dy = y - self.observed_from.y;
        let dist = (dx * dx + dy * dy).sqrt();
        if dist < self.start_dist || dist >= self.end_dist() {
            return None;
        }
        Some((dist - self.start_dist) / self.length)
    }

    /// Occupancy probability at ground-plane point `(x, y)`.
    ///
    /// Returns [`NO_EVIDENCE`] (`-1`) outside the ray's support, otherwise
    /// the tent profile value in `[0, 1]`.
    pub fn probability(&self, x: f32, y: f32) -> f32 {
        match self.fraction_along(x, y) {
            Some(fraction) => tent(fraction, self.fattest_point),
            None => NO_EVIDENCE,
        }
    }

    /// Occupancy probability with the peak shifted by `forward_bias`.
    ///
    /// The profile is Gaussian on each side of the shifted peak, scaled so
    /// that the ray ends sit `lookup.max_sigma()` deviations away. Ray
    /// geometry is unchanged.
    pub fn probability_biased(
        &self,
        x: f32,
        y: f32,
        forward_bias: f32,
        lookup: &GaussianLookup,
    ) -> f32 {
        let Some(fraction) = self.fraction_along(x, y) else {
            return NO_EVIDENCE;
        };
        let peak = (self.fattest_point + forward_bias).clamp(MIN_PEAK_FRACTION, MAX_PEAK_FRACTION);
        let half_width = if fraction < peak { peak } else { 1.0 - peak };
        let z = (fraction - peak) / half_width * lookup.max_sigma();
        lookup.value(z)
    }
}

/// Piecewise-linear profile rising from 0 at the start to 1 at `peak` and
/// back to 0 at the end.
#[inline]
fn tent(fraction: f32, peak: f32) -> f32 {
    let peak = peak.clamp(f32::EPSILON, 1.0 - f32::EPSILON);
    let p = if fraction < peak {
        fraction / peak
    } else {
        (1.0 - fraction) / (1.0 - peak)
    };
    p.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

    fn forward_ray() -> EvidenceRay {
        // Camera at origin looking along +y, ray from 200mm to 300mm
        EvidenceRay::from_polar(0.0, 0.0, 0.0, 200.0, 100.0, 0.5, 10.0, 8.0)
    }

    #[test]
    fn test_length_matches_vertices() {
        let ray = forward_ray();
        assert_relative_eq!(ray.vertices[0].distance(&ray.vertices[1]), ray.length, epsilon = 1e-3);

        let moved = ray.transformed(&Pose3D::new(50.0, -20.0, 10.0, 0.7, 0.1, -0.2));
        assert_relative_eq!(
            moved.vertices[0].distance(&moved.vertices[1]),
            moved.length,
            epsilon = 1e-3
        );
        assert_relative_eq!(moved.length, 100.0, epsilon = 1e-2);
    }

    #[test]
    fn test_probability_profile_boundaries() {
        let ray = forward_ray();

        let at_start = ray.probability(0.0, 200.0);
        let near_end = ray.probability(0.0, 299.99);
        let at_peak = ray.probability(0.0, 250.0);

        assert_relative_eq!(at_start, 0.0, epsilon = 1e-4);
        assert!(near_end >= 0.0 && near_end < 1e-3);
        assert_relative_eq!(at_peak, 1.0, epsilon = 1e-4);
    }

    #[test]
    fn test_probability_outside_support_is_sentinel() {
        let ray = forward_ray();
        assert_eq!(ray.probability(0.0, 100.0), NO_EVIDENCE);
        assert_eq!(ray.probability(0.0, 300.0), NO_EVIDENCE);
        assert_eq!(ray.probability(0.0, 450.0), NO_EVIDENCE);
    }

    #[test]
    fn test_probability_is_radial() {
        // Support is measured by distance, so a point off to the side at the
        // same range still falls inside the profile
        let ray = forward_ray();
        let p = ray.probability(250.0 * FRAC_PI_4.sin(), 250.0 * FRAC_PI_4.cos());
        assert_relative_eq!(p, 1.0, epsilon = 1e-3);
    }

    #[test]
    fn test_trial_pose_round_trip() {
        let ray = EvidenceRay::from_polar(120.0, -40.0, 0.6, 350.0, 80.0, 0.3, 5.0, 12.0);
        let trial = ray.trial_pose(0.0, ray.observed_from.x, ray.observed_from.y);

        assert_relative_eq!(trial.start_dist, ray.start_dist, epsilon = 1e-3);
        assert_relative_eq!(trial.length, ray.length, epsilon = 1e-3);
        assert_relative_eq!(trial.pan_angle, ray.pan_angle, epsilon = 1e-5);
        assert_relative_eq!(trial.vertices[0].x, ray.vertices[0].x, epsilon = 1e-2);
        assert_relative_eq!(trial.vertices[1].y, ray.vertices[1].y, epsilon = 1e-2);
    }

    #[test]
    fn test_trial_pose_does_not_mutate_source() {
        let ray = forward_ray();
        let before = ray.clone();
        let trial = ray.trial_pose(FRAC_PI_2, 1000.0, 500.0);

        assert_eq!(ray, before);
        // Turned to face +x from (1000, 500)
        assert_relative_eq!(trial.vertices[0].x, 1200.0, epsilon = 1e-2);
        assert_relative_eq!(trial.vertices[0].y, 500.0, epsilon = 1e-2);
        assert_eq!(trial.pan_index, pan_index(FRAC_PI_2));
    }

    #[test]
    fn test_pan_index_buckets() {
        assert_eq!(pan_index(0.0), 0);
        assert_eq!(pan_index(-1e-4), PAN_STEPS - 1);
        assert_eq!(pan_index(std::f32::consts::PI), PAN_STEPS / 2);
        assert!(pan_index(100.0) < PAN_STEPS);
    }

    #[test]
    fn test_biased_probability_shifts_peak() {
        let ray = forward_ray();
        let lookup = GaussianLookup::default();

        let unbiased_peak = ray.probability_biased(0.0, 250.0, 0.0, &lookup);
        assert_relative_eq!(unbiased_peak, 1.0, epsilon = 1e-3);

        // Bias forward by 0.2: peak moves to 0.7 of the length (270mm)
        let biased_at_old_peak = ray.probability_biased(0.0, 250.0, 0.2, &lookup);
        let biased_at_new_peak = ray.probability_biased(0.0, 270.0, 0.2, &lookup);
        assert!(biased_at_new_peak > biased_at_old_peak);
        assert_relative_eq!(biased_at_new_peak, 1.0, epsilon = 1e-3);

        // Geometry is unchanged
        assert_eq!(ray.probability_biased(0.0, 310.0, 0.2, &lookup), NO_EVIDENCE);
    }

    #[test]
    fn test_gaussian_lookup_tails() {
        let lookup = GaussianLookup::new(50, 3.0);
        assert_relative_eq!(lookup.value(0.0), 1.0);
        assert!(lookup.value(3.0) < 0.02);
        assert_eq!(lookup.value(10.0), lookup.value(3.0));
        assert_eq!(lookup.value(-1.0), lookup.value(1.0));
    }
}
