//! Teach mode: record a route while the robot is driven.

use super::route::{Observation, Route, Waypoint};
use crate::algorithms::mapping::EvidenceRay;
use crate::core::types::Pose3D;

/// Records waypoints spaced by odometry distance.
///
/// The first pose is always recorded. After that a pose is recorded once
/// the distance driven since the previous recording exceeds
/// `min_distance_mm`.
#[derive(Debug, Clone)]
pub struct RouteRecorder {
    min_distance_mm: f32,
    route: Route,
    observations: Vec<Observation>,
    last_pose: Option<Pose3D>,
    /// Odometry distance since the last recorded waypoint.
    travelled: f32,
}

impl RouteRecorder {
    pub fn new(min_distance_mm: f32) -> Self {
        Self {
            min_distance_mm: min_distance_mm.max(0.0),
            route: Route::default(),
            observations: Vec::new(),
            last_pose: None,
            travelled: 0.0,
        }
    }

    /// Feed an odometry pose with the rays seen from it.
    ///
    /// Returns `true` when the pose was recorded.
    pub fn update(&mut self, pose: Pose3D, rays: Vec<Vec<EvidenceRay>>) -> bool {
        if let Some(last) = self.last_pose {
            self.travelled += last.planar_distance(&pose);
        }
        self.last_pose = Some(pose);

        if !self.route.is_empty() && self.travelled <= self.min_distance_mm {
            return false;
        }

        self.route.push(Waypoint::from(&pose));
        self.observations.push(Observation::new(pose, rays));
        self.travelled = 0.0;
        log::debug!(
            "Recorded waypoint {} at ({:.0}, {:.0})",
            self.route.len(),
            pose.x,
            pose.y
        );
        true
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    /// Stop teaching and hand over what was recorded.
    pub fn finish(self) -> (Route, Vec<Observation>) {
        log::info!(
            "Teaching finished: {} waypoints over {:.0}mm",
            self.route.len(),
            self.route.length()
        );
        (self.route, self.observations)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_three_point_route() {
        let mut recorder = RouteRecorder::new(50.0);
        for x in [0.0, 100.0, 200.0] {
            assert!(recorder.update(Pose3D::planar(x, 0.0, 0.0), Vec::new()));
        }
        let (route, observations) = recorder.finish();
        assert_eq!(route.len(), 3);
        assert_eq!(observations.len(), 3);
    }

    #[test]
    fn test_short_moves_accumulate() {
        let mut recorder = RouteRecorder::new(50.0);
        assert!(recorder.update(Pose3D::planar(0.0, 0.0, 0.0), Vec::new()));
        assert!(!recorder.update(Pose3D::planar(0.0, 20.0, 0.0), Vec::new()));
        assert!(!recorder.update(Pose3D::planar(0.0, 40.0, 0.0), Vec::new()));
        // Exactly at the threshold is not enough
        assert!(!recorder.update(Pose3D::planar(0.0, 50.0, 0.0), Vec::new()));
        assert!(recorder.update(Pose3D::planar(0.0, 60.0, 0.0), Vec::new()));
        assert_eq!(recorder.route().len(), 2);
    }

    #[test]
    fn test_turning_in_place_records_nothing() {
        let mut recorder = RouteRecorder::new(50.0);
        recorder.update(Pose3D::planar(0.0, 0.0, 0.0), Vec::new());
        for i in 1..10 {
            assert!(!recorder.update(Pose3D::planar(0.0, 0.0, i as f32 * 0.3), Vec::new()));
        }
        assert_eq!(recorder.route().len(), 1);
    }
}
