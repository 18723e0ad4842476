//! Parallel Scheduler Tests
//!
//! Exercises the worker pool from outside the crate:
//! - Every index of a large range runs exactly once, for any pool size
//! - The pool survives many consecutive loops and a resize
//! - Survey results don't depend on the number of workers
//!
//! Run with: `cargo test --test scheduler`

use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};

use drishti_slam::{
    EvidenceRay, GridConfig, HypothesisGrid, InverseSensorModel, MultiHypothesisGrid,
    ParallelScheduler, ParticlePath, ParticlePose, Point3D, Pose3D, PoseTree,
    StereoGeometryConfig, SurveyConfig, SurveyLocalizer,
};

fn assert_exhaustive(scheduler: &mut ParallelScheduler, start: usize, stop: usize) {
    let hits: Vec<AtomicU8> = (start..stop).map(|_| AtomicU8::new(0)).collect();
    scheduler
        .for_each(start, stop, &|i| {
            hits[i - start].fetch_add(1, Ordering::Relaxed);
        })
        .unwrap();

    let missed = hits.iter().filter(|h| h.load(Ordering::Relaxed) == 0).count();
    let repeated = hits.iter().filter(|h| h.load(Ordering::Relaxed) > 1).count();
    assert_eq!((missed, repeated), (0, 0), "range {}..{}", start, stop);
}

#[test]
fn test_large_range_single_worker() {
    let mut scheduler = ParallelScheduler::with_threads(1);
    assert_exhaustive(&mut scheduler, 0, 100_000);
}

#[test]
fn test_large_range_many_workers() {
    for threads in [2, 3, 8, 16] {
        let mut scheduler = ParallelScheduler::with_threads(threads);
        assert_exhaustive(&mut scheduler, 0, 100_000);
        assert_exhaustive(&mut scheduler, 17, 40_017);
    }
}

#[test]
fn test_fewer_indices_than_workers() {
    let mut scheduler = ParallelScheduler::with_threads(8);
    assert_exhaustive(&mut scheduler, 5, 8);
    assert_exhaustive(&mut scheduler, 0, 1);
}

#[test]
fn test_repeated_loops_and_resize() {
    let mut scheduler = ParallelScheduler::with_threads(4);
    let total = AtomicUsize::new(0);
    for _ in 0..200 {
        scheduler
            .for_each(0, 64, &|i| {
                total.fetch_add(i, Ordering::Relaxed);
            })
            .unwrap();
    }
    assert_eq!(total.load(Ordering::Relaxed), 200 * (63 * 64 / 2));

    scheduler.set_threads(2).unwrap();
    assert_eq!(scheduler.threads(), 2);
    assert_exhaustive(&mut scheduler, 0, 10_000);
}

#[test]
fn test_survey_independent_of_worker_count() {
    let model = InverseSensorModel::from_stereo_geometry(&StereoGeometryConfig::default());
    let fan = |x: f32, y: f32| -> Vec<EvidenceRay> {
        [(20.0, -0.3f32), (14.0, -0.1), (25.0, 0.1), (18.0, 0.3)]
            .iter()
            .map(|&(disparity, bearing)| {
                let (start, length, fattest) = model.ray_extent(disparity).unwrap();
                EvidenceRay::from_polar(x, y, bearing, start, length, fattest, 60.0, disparity)
            })
            .collect()
    };

    let mut grid = MultiHypothesisGrid::new(GridConfig::default());
    let mut tree = PoseTree::new();
    let mut path = ParticlePath::new(0, 4);
    let pose = path.add(&mut tree, ParticlePose::new(0.0, 0.0, 0.0, 0));
    let cam = Point3D::default();
    for ray in fan(0.0, 0.0) {
        grid.insert(&ray, pose, &mut tree, &model, cam, cam);
    }

    let nominal = Pose3D::planar(60.0, -40.0, 0.0);
    let rays = fan(60.0, -40.0);
    let config = SurveyConfig {
        random_seed: 99,
        ..Default::default()
    };

    let results: Vec<_> = [1, 4]
        .into_iter()
        .map(|threads| {
            let mut survey =
                SurveyLocalizer::new(config.clone(), ParallelScheduler::with_threads(threads));
            survey.survey(&grid, &model, &rays, &nominal).unwrap()
        })
        .collect();

    assert!(results[0].is_some());
    assert_eq!(results[0], results[1]);
}
