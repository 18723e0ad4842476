//! Taught routes.
//!
//! A [`Route`] is the sequence of [`Waypoint`]s recorded while teaching.
//! Each waypoint may carry an [`Observation`]: the camera-centred rays
//! seen from it, used to rebuild the map while following.

use serde::{Deserialize, Serialize};

use crate::algorithms::mapping::EvidenceRay;
use crate::core::types::Pose3D;

/// Teach and follow parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    /// Odometry distance between recorded waypoints (mm).
    pub min_distance_mm: f32,

    /// Waypoints per map buffer while following.
    pub points_per_grid: usize,
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            min_distance_mm: 100.0,
            points_per_grid: 5,
        }
    }
}

/// A recorded robot pose on the ground plane.
///
/// Position in mm, heading in radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Waypoint {
    pub x: f32,
    pub y: f32,
    pub pan: f32,
}

impl Waypoint {
    #[inline]
    pub fn new(x: f32, y: f32, pan: f32) -> Self {
        Self { x, y, pan }
    }

    #[inline]
    pub fn distance_to(&self, other: &Waypoint) -> f32 {
        let dx = other.x - self.x;
        let dy = other.y - self.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Ground-plane pose at this waypoint.
    #[inline]
    pub fn pose(&self) -> Pose3D {
        Pose3D::planar(self.x, self.y, self.pan)
    }
}

impl From<&Pose3D> for Waypoint {
    fn from(pose: &Pose3D) -> Self {
        Self::new(pose.x, pose.y, pose.pan)
    }
}

/// What the robot saw from one waypoint.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    pub pose: Pose3D,
    /// Camera-centred rays, indexed by camera.
    pub rays: Vec<Vec<EvidenceRay>>,
}

impl Observation {
    pub fn new(pose: Pose3D, rays: Vec<Vec<EvidenceRay>>) -> Self {
        Self { pose, rays }
    }

    /// An observation with no rays.
    pub fn empty(pose: Pose3D) -> Self {
        Self {
            pose,
            rays: Vec::new(),
        }
    }

    pub fn ray_count(&self) -> usize {
        self.rays.iter().map(Vec::len).sum()
    }
}

/// Ordered waypoints of a taught route.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Route {
    pub waypoints: Vec<Waypoint>,
}

impl Route {
    pub fn new(waypoints: Vec<Waypoint>) -> Self {
        Self { waypoints }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.waypoints.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.waypoints.len()
    }

    pub fn push(&mut self, waypoint: Waypoint) {
        self.waypoints.push(waypoint);
    }

    /// Total length along the waypoints (mm).
    pub fn length(&self) -> f32 {
        span(&self.waypoints)
    }

    /// Observations with no rays for every waypoint.
    pub fn empty_observations(&self) -> Vec<Observation> {
        self.waypoints
            .iter()
            .map(|w| Observation::empty(w.pose()))
            .collect()
    }
}

/// Length of a polyline through `waypoints`.
pub fn span(waypoints: &[Waypoint]) -> f32 {
    waypoints.windows(2).map(|w| w[0].distance_to(&w[1])).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_route_length() {
        let route = Route::new(vec![
            Waypoint::new(0.0, 0.0, 0.0),
            Waypoint::new(300.0, 0.0, 0.0),
            Waypoint::new(300.0, 400.0, 0.0),
        ]);
        assert_eq!(route.len(), 3);
        assert_relative_eq!(route.length(), 700.0);
        assert_relative_eq!(span(&route.waypoints[..1]), 0.0);
    }

    #[test]
    fn test_empty_observations_follow_waypoints() {
        let route = Route::new(vec![Waypoint::new(10.0, 20.0, 0.5)]);
        let observations = route.empty_observations();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].pose, Pose3D::planar(10.0, 20.0, 0.5));
        assert_eq!(observations[0].ray_count(), 0);
    }
}
