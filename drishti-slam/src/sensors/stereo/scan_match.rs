//! Horizon scan matching for incremental pan estimation.
//!
//! A band of rows around the image centre is collapsed into a per-column
//! intensity profile. Consecutive profiles are aligned by the horizontal
//! shift with the lowest mean squared difference; the shift converts to a
//! pan change through the field of view.

use image::GrayImage;

use crate::core::math::normalize_angle;

/// Minimum fraction of the profile that must overlap for a shift to count.
const MIN_OVERLAP: f32 = 0.5;

/// Matches consecutive frames from one camera.
#[derive(Debug, Clone)]
pub struct ScanMatcher {
    max_shift: usize,
    band_rows: u32,
    previous: Option<Vec<f32>>,
}

impl Default for ScanMatcher {
    fn default() -> Self {
        Self::new(40, 20)
    }
}

impl ScanMatcher {
    /// `max_shift` bounds the search (pixels); `band_rows` is the height of
    /// the horizon band.
    pub fn new(max_shift: usize, band_rows: u32) -> Self {
        Self {
            max_shift,
            band_rows: band_rows.max(1),
            previous: None,
        }
    }

    /// Forget the previous frame.
    pub fn reset(&mut self) {
        self.previous = None;
    }

    /// Pan change (rad) since the previous frame.
    ///
    /// Returns `None` for the first frame or when no shift has enough
    /// overlap. The new frame always becomes the reference.
    pub fn pan_change(&mut self, image: &GrayImage, field_of_view: f32) -> Option<f32> {
        let current = self.profile(image);
        let shift = self
            .previous
            .as_deref()
            .and_then(|previous| best_shift(previous, &current, self.max_shift));
        self.previous = Some(current);

        let width = image.width();
        if width == 0 {
            return None;
        }
        // Content moving left means the camera turned right
        shift.map(|s| -(s as f32) * field_of_view / width as f32)
    }

    /// Zero-mean column intensity over the horizon band.
    fn profile(&self, image: &GrayImage) -> Vec<f32> {
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Vec::new();
        }
        let top = (height / 2).saturating_sub(self.band_rows / 2);
        let bottom = (top + self.band_rows).min(height);
        let rows = (bottom - top) as f32;

        let mut profile: Vec<f32> = (0..width)
            .map(|x| {
                let sum: u32 = (top..bottom).map(|y| image.get_pixel(x, y).0[0] as u32).sum();
                sum as f32 / rows
            })
            .collect();

        let mean = profile.iter().sum::<f32>() / profile.len() as f32;
        profile.iter_mut().for_each(|v| *v -= mean);
        profile
    }
}

/// Shift `s` minimising the error of `current[x] ≈ previous[x - s]`.
/// Ties go to the smaller magnitude.
fn best_shift(previous: &[f32], current: &[f32], max_shift: usize) -> Option<i32> {
    let n = previous.len().min(current.len());
    if n == 0 {
        return None;
    }
    let min_overlap = ((n as f32 * MIN_OVERLAP).ceil() as usize).max(1);
    let max_shift = max_shift.min(n - min_overlap) as i32;

    let mut best: Option<(i32, f32)> = None;
    for magnitude in 0..=max_shift {
        for s in [magnitude, -magnitude] {
            if magnitude == 0 && s < 0 {
                continue;
            }
            let error = shift_error(previous, current, n, s);
            if best.is_none_or(|(_, e)| error < e) {
                best = Some((s, error));
            }
        }
    }
    best.map(|(s, _)| s)
}

fn shift_error(previous: &[f32], current: &[f32], n: usize, shift: i32) -> f32 {
    let (from, to) = if shift >= 0 {
        (shift as usize, n)
    } else {
        (0, n - shift.unsigned_abs() as usize)
    };
    let sum: f32 = (from..to)
        .map(|x| {
            let d = current[x] - previous[(x as i32 - shift) as usize];
            d * d
        })
        .sum();
    sum / (to - from) as f32
}

/// Running pan estimate fed by scan matching.
#[derive(Debug, Clone, Copy, Default)]
pub struct PanTracker {
    estimate: Option<f32>,
}

impl PanTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current estimate, if any match has been applied.
    pub fn estimate(&self) -> Option<f32> {
        self.estimate
    }

    /// Apply a measured pan change.
    ///
    /// The first update seeds from `current_pan`. Changes seen by a
    /// rear-facing camera are subtracted.
    pub fn update(&mut self, current_pan: f32, change: f32, rear: bool) -> f32 {
        let base = self.estimate.unwrap_or(current_pan);
        let change = if rear { -change } else { change };
        let estimate = normalize_angle(base + change);
        self.estimate = Some(estimate);
        estimate
    }

    pub fn reset(&mut self) {
        self.estimate = None;
    }
}
