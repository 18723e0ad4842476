//! Teach and Follow Tests
//!
//! Records a short route, persists it, reloads it and replays it through
//! the follow driver:
//! - Recorder keeps waypoints spaced by the minimum distance
//! - Route XML and observation log survive a save/load cycle
//! - Follower builds and swaps map buffers as the robot moves
//! - Survey localization searches the active buffer around a nominal pose
//!
//! Run with: `cargo test --test teach_follow`

use std::sync::Arc;

use approx::assert_relative_eq;
use drishti_slam::io::{load_observations, load_route, save_observations, save_route};
use drishti_slam::{
    EvidenceRay, FollowEvent, GridConfig, InverseSensorModel, Pose3D, RobotGeometry, RouteConfig,
    ParallelScheduler, RouteFollower, RouteRecorder, StereoGeometryConfig, SurveyConfig,
    SurveyLocalizer,
};

// ============================================================================
// Fixtures
// ============================================================================

fn model() -> InverseSensorModel {
    InverseSensorModel::from_stereo_geometry(&StereoGeometryConfig::default())
}

/// Camera-centred rays fanned across the field of view.
fn fan(model: &InverseSensorModel) -> Vec<Vec<EvidenceRay>> {
    let rays = [(20.0, -0.3f32), (14.0, -0.1), (25.0, 0.1), (18.0, 0.3)]
        .iter()
        .map(|&(disparity, bearing)| {
            let (start, length, fattest) = model.ray_extent(disparity).unwrap();
            EvidenceRay::from_polar(0.0, 0.0, bearing, start, length, fattest, 60.0, disparity)
        })
        .collect();
    vec![rays]
}

fn teach(model: &InverseSensorModel, min_distance_mm: f32) -> RouteRecorder {
    let mut recorder = RouteRecorder::new(min_distance_mm);
    for x in [0.0, 100.0, 200.0] {
        let pose = Pose3D::planar(x, 0.0, 0.0);
        recorder.update(pose, fan(model));
    }
    recorder
}

fn follower(points_per_grid: usize, recorder: RouteRecorder) -> RouteFollower {
    let config = RouteConfig {
        points_per_grid,
        ..Default::default()
    };
    let (_, observations) = recorder.finish();
    RouteFollower::new(
        &config,
        GridConfig::covering(8000.0, 40.0, 0.0, 0.0),
        Arc::new(RobotGeometry::default()),
        Arc::new(vec![model()]),
        observations,
    )
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_recorder_spacing() {
    let model = model();
    let recorder = teach(&model, 50.0);
    assert_eq!(recorder.route().len(), 3);
    assert_relative_eq!(recorder.route().length(), 200.0, epsilon = 1e-3);

    // 100mm steps never exceed a 150mm threshold between recordings
    let sparse = teach(&model, 150.0);
    assert_eq!(sparse.route().len(), 2);
}

#[test]
fn test_route_and_rays_persist() {
    let model = model();
    let (route, observations) = teach(&model, 50.0).finish();

    let dir = tempfile::tempdir().unwrap();
    let route_path = dir.path().join("route.xml");
    let rays_path = dir.path().join("rays.bin");
    save_route(&route_path, &route).unwrap();
    save_observations(&rays_path, &observations).unwrap();

    let loaded_route = load_route(&route_path).unwrap().unwrap();
    assert_eq!(loaded_route.len(), 3);
    for (a, b) in route.waypoints.iter().zip(&loaded_route.waypoints) {
        assert_relative_eq!(a.x, b.x, epsilon = 1e-3);
        assert_relative_eq!(a.y, b.y, epsilon = 1e-3);
        assert_relative_eq!(a.pan, b.pan, epsilon = 1e-4);
    }

    let loaded = load_observations(&rays_path).unwrap().unwrap();
    assert_eq!(loaded.len(), observations.len());
    for (a, b) in observations.iter().zip(&loaded) {
        assert_eq!(a.ray_count(), b.ray_count());
        assert_relative_eq!(a.pose.x, b.pose.x);
    }
}

#[test]
fn test_follower_builds_then_swaps() {
    let model = model();
    let mut follower = follower(2, teach(&model, 50.0));

    let events: Vec<FollowEvent> = [0.0, 100.0, 200.0]
        .iter()
        .map(|&x| follower.update(&Pose3D::planar(x, 0.0, 0.0)))
        .collect();

    assert_eq!(
        events,
        vec![FollowEvent::Idle, FollowEvent::Built, FollowEvent::Swapped]
    );
    assert_eq!(follower.swaps(), 1);
    assert!(follower.current().is_some());
    assert!(follower.is_exhausted());
}

#[test]
fn test_follower_localizes_on_active_buffer() {
    let model = model();
    let mut active = follower(2, teach(&model, 50.0));
    for x in [0.0, 100.0, 200.0] {
        active.update(&Pose3D::planar(x, 0.0, 0.0));
    }

    let mut survey = SurveyLocalizer::new(
        SurveyConfig {
            diameter_mm: 300.0,
            trial_poses: 400,
            random_seed: 11,
            ..Default::default()
        },
        ParallelScheduler::with_threads(2),
    );

    let nominal = Pose3D::planar(100.0, 80.0, 0.0);
    let result = active
        .localize(&mut survey, &fan(&model), &nominal)
        .unwrap()
        .expect("rays overlap the active buffer");

    assert!(result.pose.planar_distance(&nominal) <= 150.0 + 1e-3);
    assert!(result.pan_offset.abs() <= survey.config().max_pan + 1e-6);
    assert!(result.position_score.is_finite());

    // Without a swapped-in buffer there is nothing to localize against
    let idle = follower(2, teach(&model, 50.0));
    let missing = idle.localize(&mut survey, &fan(&model), &nominal).unwrap();
    assert!(missing.is_none());
}

#[test]
fn test_restart_replays_route() {
    let model = model();
    let mut follower = follower(2, teach(&model, 50.0));
    for x in [0.0, 100.0, 200.0] {
        follower.update(&Pose3D::planar(x, 0.0, 0.0));
    }

    follower.restart();
    assert_eq!(follower.loaded(), 0);
    assert!(follower.current().is_none());
    assert_eq!(
        follower.update(&Pose3D::planar(0.0, 0.0, 0.0)),
        FollowEvent::Idle
    );
}
