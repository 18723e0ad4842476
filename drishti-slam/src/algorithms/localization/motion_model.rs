//! Odometry motion model for path prediction.
//!
//! Standard sample-based odometry model (Thrun et al.). Motion between two
//! odometry readings is decomposed into:
//! 1. A rotation to face the direction of travel
//! 2. A translation
//! 3. A rotation to the final heading
//!
//! Each component is perturbed with zero-mean Gaussian noise whose
//! variance grows with the size of the motion.
//!
//! Units are millimetres and radians. Deltas are given in the robot frame
//! (`+y` forward, `+x` right) and pan turns from `+y` toward `+x`.

use rand::Rng;
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use crate::core::math::{normalize_angle, pan_bearing};
use crate::core::types::Pose3D;

/// Noise parameters.
///
/// Each alpha scales a variance:
/// - `alpha1`: rotation from rotation (rad²/rad)
/// - `alpha2`: rotation from translation (rad²/mm)
/// - `alpha3`: translation from translation (mm²/mm)
/// - `alpha4`: translation from rotation (mm²/rad)
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct MotionModelConfig {
    pub alpha1: f32,
    pub alpha2: f32,
    pub alpha3: f32,
    pub alpha4: f32,
}

impl Default for MotionModelConfig {
    fn default() -> Self {
        Self {
            alpha1: 0.05,
            alpha2: 1e-5,
            alpha3: 1.0,
            alpha4: 100.0,
        }
    }
}

impl MotionModelConfig {
    /// Noise-free prediction.
    pub fn noiseless() -> Self {
        Self {
            alpha1: 0.0,
            alpha2: 0.0,
            alpha3: 0.0,
            alpha4: 0.0,
        }
    }

    /// Wider spread for slippery floors or poor encoders.
    pub fn high_noise() -> Self {
        Self {
            alpha1: 0.2,
            alpha2: 5e-5,
            alpha3: 5.0,
            alpha4: 400.0,
        }
    }
}

/// Odometry motion model.
#[derive(Debug, Clone)]
pub struct MotionModel {
    config: MotionModelConfig,
}

impl MotionModel {
    pub fn new(config: MotionModelConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MotionModelConfig {
        &self.config
    }

    /// Sample a successor of `pose` given a robot-frame odometry delta.
    ///
    /// Only `x`, `y` and `pan` of the delta are used; the result is planar.
    pub fn sample<R: Rng + ?Sized>(&self, pose: &Pose3D, delta: &Pose3D, rng: &mut R) -> Pose3D {
        let trans = (delta.x * delta.x + delta.y * delta.y).sqrt();
        if trans < 1e-3 && delta.pan.abs() < 1e-6 {
            return Pose3D::planar(pose.x, pose.y, pose.pan);
        }

        let rot1 = if trans > 1e-3 {
            normalize_angle(pan_bearing(delta.x, delta.y))
        } else {
            0.0
        };
        let rot2 = normalize_angle(delta.pan - rot1);

        let c = &self.config;
        let sigma_rot1 = (c.alpha1 * rot1.abs() + c.alpha2 * trans).sqrt();
        let sigma_trans = (c.alpha3 * trans + c.alpha4 * (rot1.abs() + rot2.abs())).sqrt();
        let sigma_rot2 = (c.alpha1 * rot2.abs() + c.alpha2 * trans).sqrt();

        let noisy_rot1 = rot1 + sample_gaussian(rng, sigma_rot1);
        let noisy_trans = trans + sample_gaussian(rng, sigma_trans);
        let noisy_rot2 = rot2 + sample_gaussian(rng, sigma_rot2);

        let heading = pose.pan + noisy_rot1;
        let (sin_h, cos_h) = heading.sin_cos();
        Pose3D::planar(
            pose.x + noisy_trans * sin_h,
            pose.y + noisy_trans * cos_h,
            normalize_angle(heading + noisy_rot2),
        )
    }
}

#[inline]
fn sample_gaussian<R: Rng + ?Sized>(rng: &mut R, sigma: f32) -> f32 {
    if sigma < 1e-10 {
        return 0.0;
    }
    let z: f32 = rng.sample(StandardNormal);
    z * sigma
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_no_motion() {
        let model = MotionModel::new(MotionModelConfig::default());
        let pose = Pose3D::planar(10.0, 20.0, 0.5);
        let mut rng = StdRng::seed_from_u64(42);

        let next = model.sample(&pose, &Pose3D::identity(), &mut rng);
        assert_relative_eq!(next.x, pose.x);
        assert_relative_eq!(next.y, pose.y);
        assert_relative_eq!(next.pan, pose.pan);
    }

    #[test]
    fn test_noiseless_forward_follows_heading() {
        let model = MotionModel::new(MotionModelConfig::noiseless());
        let pose = Pose3D::planar(0.0, 0.0, FRAC_PI_2);
        let mut rng = StdRng::seed_from_u64(1);

        // 100mm forward while facing +x
        let next = model.sample(&pose, &Pose3D::planar(0.0, 100.0, 0.0), &mut rng);
        assert_relative_eq!(next.x, 100.0, epsilon = 1e-3);
        assert_relative_eq!(next.y, 0.0, epsilon = 1e-3);
        assert_relative_eq!(next.pan, FRAC_PI_2, epsilon = 1e-5);
    }

    #[test]
    fn test_forward_mean() {
        let model = MotionModel::new(MotionModelConfig::default());
        let pose = Pose3D::identity();
        let delta = Pose3D::planar(0.0, 500.0, 0.0);
        let mut rng = StdRng::seed_from_u64(42);

        let n = 1000;
        let (mut sum_x, mut sum_y) = (0.0, 0.0);
        for _ in 0..n {
            let p = model.sample(&pose, &delta, &mut rng);
            sum_x += p.x;
            sum_y += p.y;
        }

        let (mean_x, mean_y) = (sum_x / n as f32, sum_y / n as f32);
        assert!(mean_x.abs() < 20.0, "Mean X: {}", mean_x);
        assert!((mean_y - 500.0).abs() < 20.0, "Mean Y: {}", mean_y);
    }

    #[test]
    fn test_spread_increases_with_noise() {
        let low = MotionModel::new(MotionModelConfig::default());
        let high = MotionModel::new(MotionModelConfig::high_noise());
        let delta = Pose3D::planar(0.0, 300.0, 0.3);

        let spread = |model: &MotionModel| {
            let mut rng = StdRng::seed_from_u64(7);
            let expected = MotionModel::new(MotionModelConfig::noiseless()).sample(
                &Pose3D::identity(),
                &delta,
                &mut rng,
            );
            (0..500)
                .map(|_| {
                    let p = model.sample(&Pose3D::identity(), &delta, &mut rng);
                    (p.x - expected.x).powi(2) + (p.y - expected.y).powi(2)
                })
                .sum::<f32>()
        };

        assert!(spread(&high) > spread(&low));
    }
}
