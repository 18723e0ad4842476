//! Mathematical primitives for pose and ray arithmetic.
//!
//! Functions for angle normalization and angular arithmetic.

use std::f32::consts::{PI, TAU};

/// Normalize angle to [-π, π].
///
/// # Example
/// ```
/// use drishti_slam::core::math::normalize_angle;
/// use std::f32::consts::PI;
///
/// assert!((normalize_angle(3.0 * PI) - PI).abs() < 1e-6);
/// assert!((normalize_angle(-3.0 * PI) - (-PI)).abs() < 1e-6);
/// ```
#[inline]
pub fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % TAU;
    if a > PI {
        a -= TAU;
    } else if a < -PI {
        a += TAU;
    }
    a
}

/// Wrap angle to [0, 2π).
///
/// Used where an angle indexes a bucket over a full turn.
#[inline]
pub fn wrap_full_turn(angle: f32) -> f32 {
    let a = angle.rem_euclid(TAU);
    // rem_euclid can round up to exactly TAU for tiny negative inputs
    if a >= TAU { 0.0 } else { a }
}

/// Bearing of `(dx, dy)` measured from `+y` toward `+x`.
///
/// This is the pan convention used by poses and rays: pan 0 looks along
/// `+y`, positive pan turns toward `+x`.
#[inline]
pub fn pan_bearing(dx: f32, dy: f32) -> f32 {
    dx.atan2(dy)
}

/// Convert log-odds to probability.
#[inline]
pub fn log_odds_to_probability(log_odds: f32) -> f32 {
    1.0 / (1.0 + (-log_odds).exp())
}

/// Convert probability to log-odds.
///
/// The input is clamped away from 0 and 1 to keep the result finite.
#[inline]
pub fn probability_to_log_odds(probability: f32) -> f32 {
    let p = probability.clamp(1e-4, 1.0 - 1e-4);
    (p / (1.0 - p)).ln()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    #[test]
    fn test_normalize_angle_zero() {
        assert_relative_eq!(normalize_angle(0.0), 0.0);
    }

    #[test]
    fn test_normalize_angle_wrap_positive() {
        assert_relative_eq!(normalize_angle(2.0 * PI), 0.0, epsilon = 1e-6);
        assert_relative_eq!(normalize_angle(3.0 * PI), PI, epsilon = 1e-6);
    }

    #[test]
    fn test_wrap_full_turn() {
        assert_relative_eq!(wrap_full_turn(-FRAC_PI_2), 1.5 * PI, epsilon = 1e-6);
        assert_relative_eq!(wrap_full_turn(TAU + 0.25), 0.25, epsilon = 1e-5);
        assert!(wrap_full_turn(-1e-9) < TAU);
    }

    #[test]
    fn test_pan_bearing_convention() {
        assert_relative_eq!(pan_bearing(0.0, 1.0), 0.0);
        assert_relative_eq!(pan_bearing(1.0, 0.0), FRAC_PI_2);
        assert_relative_eq!(pan_bearing(-1.0, 0.0), -FRAC_PI_2);
    }

    #[test]
    fn test_log_odds_round_trip() {
        for p in [0.1f32, 0.5, 0.75, 0.9] {
            let lo = probability_to_log_odds(p);
            assert_relative_eq!(log_odds_to_probability(lo), p, epsilon = 1e-5);
        }
        assert_relative_eq!(probability_to_log_odds(0.5), 0.0);
    }
}
