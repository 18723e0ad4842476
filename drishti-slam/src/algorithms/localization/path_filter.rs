//! Particle filter over candidate trajectories.
//!
//! Each particle is a [`ParticlePath`] through a shared [`PoseTree`], so
//! the map built by one candidate is visible to its descendants and
//! invisible to unrelated candidates. One filter step is:
//!
//! 1. [`predict`](PathFilter::predict): extend every path with a pose
//!    sampled from the motion model
//! 2. [`observe`](PathFilter::observe): insert the frame's evidence rays
//!    as seen from each path's head and score them against its map
//! 3. [`resample`](PathFilter::resample): fork the paths drawn by
//!    low-variance resampling and prune every previous path

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;
use serde::{Deserialize, Serialize};

use super::motion_model::{MotionModel, MotionModelConfig};
use super::particle_path::ParticlePath;
use super::particle_pose::{ParticlePose, PoseTree};
use crate::algorithms::mapping::{EvidenceRay, HypothesisGrid, InverseSensorModel};
use crate::core::types::Pose3D;
use crate::sensors::stereo::RobotGeometry;

/// Configuration for the path filter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathFilterConfig {
    /// Number of live paths.
    pub num_paths: usize,

    /// Poses kept in each path's window.
    pub max_path_length: usize,

    /// Motion noise.
    pub motion: MotionModelConfig,

    /// Initial position spread (mm, standard deviation).
    pub initial_spread_mm: f32,

    /// Initial heading spread (rad, standard deviation).
    pub initial_spread_pan: f32,

    /// Random seed. 0 seeds from the OS.
    pub seed: u64,
}

impl Default for PathFilterConfig {
    fn default() -> Self {
        Self {
            num_paths: 100,
            max_path_length: 50,
            motion: MotionModelConfig::default(),
            initial_spread_mm: 0.0,
            initial_spread_pan: 0.0,
            seed: 0,
        }
    }
}

/// Particle filter whose particles are trajectories.
#[derive(Debug)]
pub struct PathFilter {
    config: PathFilterConfig,
    tree: PoseTree,
    paths: Vec<ParticlePath>,
    motion_model: MotionModel,
    rng: StdRng,
    next_path_id: u32,
    time_step: u32,
}

impl PathFilter {
    /// Create a filter with every path starting near `initial_pose`.
    pub fn new(config: PathFilterConfig, initial_pose: Pose3D) -> Self {
        let rng = if config.seed == 0 {
            StdRng::from_os_rng()
        } else {
            StdRng::seed_from_u64(config.seed)
        };

        let mut filter = Self {
            motion_model: MotionModel::new(config.motion),
            tree: PoseTree::new(),
            paths: Vec::with_capacity(config.num_paths),
            rng,
            next_path_id: 0,
            time_step: 0,
            config,
        };
        filter.reset(initial_pose);
        filter
    }

    pub fn config(&self) -> &PathFilterConfig {
        &self.config
    }

    /// Live paths.
    pub fn paths(&self) -> &[ParticlePath] {
        &self.paths
    }

    /// The pose arena.
    pub fn tree(&self) -> &PoseTree {
        &self.tree
    }

    pub fn time_step(&self) -> u32 {
        self.time_step
    }

    fn allocate_path_id(&mut self) -> u32 {
        let id = self.next_path_id;
        self.next_path_id = self.next_path_id.wrapping_add(1);
        id
    }

    /// Discard all paths and restart around `pose`.
    ///
    /// Hypotheses of discarded poses are left in whatever grid they were
    /// inserted into; clear it alongside.
    pub fn reset(&mut self, pose: Pose3D) {
        self.tree.clear();
        self.paths.clear();
        self.time_step = 0;

        for _ in 0..self.config.num_paths.max(1) {
            let id = self.allocate_path_id();
            let dx: f32 = self.rng.sample(StandardNormal);
            let dy: f32 = self.rng.sample(StandardNormal);
            let dp: f32 = self.rng.sample(StandardNormal);
            let start = ParticlePose::new(
                pose.x + dx * self.config.initial_spread_mm,
                pose.y + dy * self.config.initial_spread_mm,
                pose.pan + dp * self.config.initial_spread_pan,
                0,
            );

            let mut path = ParticlePath::new(id, self.config.max_path_length);
            path.add(&mut self.tree, start);
            self.paths.push(path);
        }
    }

    /// Extend every path by a robot-frame odometry delta.
    pub fn predict(&mut self, delta: &Pose3D) {
        self.time_step += 1;
        for path in &mut self.paths {
            let Some(head) = path.current_pose().and_then(|id| self.tree.get(id)) else {
                continue;
            };
            let next = self
                .motion_model
                .sample(&head.pose(), delta, &mut self.rng);
            path.add(
                &mut self.tree,
                ParticlePose::new(next.x, next.y, next.pan, self.time_step),
            );
        }
    }

    /// Insert one frame of rays into `grid` from every path's head pose.
    ///
    /// `rays[camera]` holds camera-centred rays for that camera and
    /// `models[camera]` its sensor model. Returns one score per path, in
    /// path order; `None` when none of the path's rays hit visible
    /// evidence.
    pub fn observe<G: HypothesisGrid + ?Sized>(
        &mut self,
        grid: &mut G,
        rays: &[Vec<EvidenceRay>],
        geometry: &RobotGeometry,
        models: &[InverseSensorModel],
    ) -> Vec<Option<f32>> {
        let mut scores = Vec::with_capacity(self.paths.len());

        for path in &mut self.paths {
            let Some(head) = path.current_pose() else {
                scores.push(None);
                continue;
            };
            let Some(robot) = self.tree.get(head).map(|p| p.pose()) else {
                scores.push(None);
                continue;
            };

            let mut total: Option<f32> = None;
            for (camera, camera_rays) in rays.iter().enumerate() {
                let (Some(position), Some(model)) =
                    (geometry.camera_position(camera, &robot), models.get(camera))
                else {
                    log::warn!("No geometry or sensor model for camera {}", camera);
                    continue;
                };

                for ray in camera_rays {
                    let world = ray.transformed(&position.centre);
                    if let Some(score) = grid.insert(
                        &world,
                        head,
                        &mut self.tree,
                        model,
                        position.left,
                        position.right,
                    ) {
                        *total.get_or_insert(0.0) += score;
                    }
                }
            }

            if let Some(score) = total {
                path.add_score(&mut self.tree, score);
            }
            scores.push(total);
        }

        scores
    }

    /// Low-variance resampling.
    ///
    /// Paths are weighted by their total score. Selected paths are forked
    /// (a path may be drawn several times) and then every previous path is
    /// removed, pruning the ancestry no longer shared with a survivor.
    pub fn resample<G: HypothesisGrid + ?Sized>(&mut self, grid: &mut G) {
        let n = self.paths.len();
        if n == 0 {
            return;
        }

        let max_score = self
            .paths
            .iter()
            .map(|p| p.total_score())
            .fold(f32::NEG_INFINITY, f32::max);
        let weights: Vec<f64> = self
            .paths
            .iter()
            .map(|p| ((p.total_score() - max_score) as f64).exp())
            .collect();
        let sum: f64 = weights.iter().sum();

        let mut cumulative = Vec::with_capacity(n);
        let mut acc = 0.0;
        for w in &weights {
            acc += w / sum;
            cumulative.push(acc);
        }

        let step = 1.0 / n as f64;
        let mut r = self.rng.random::<f64>() * step;
        let mut idx = 0;
        let mut forked = Vec::with_capacity(n);
        for _ in 0..n {
            while r > cumulative[idx] && idx < n - 1 {
                idx += 1;
            }
            let id = self.allocate_path_id();
            forked.push(ParticlePath::fork(id, &self.paths[idx], &mut self.tree));
            r += step;
        }

        let mut old = std::mem::replace(&mut self.paths, forked);
        for path in &mut old {
            path.remove(&mut self.tree, grid);
        }

        log::debug!(
            "Resampled {} paths at step {}, {} poses live",
            n,
            self.time_step,
            self.tree.len()
        );
    }

    /// The path with the highest total score.
    pub fn best_path(&self) -> Option<&ParticlePath> {
        self.paths
            .iter()
            .filter(|p| !p.is_consumed())
            .max_by(|a, b| a.total_score().total_cmp(&b.total_score()))
    }

    /// Head pose of the best path.
    pub fn estimate(&self) -> Option<Pose3D> {
        let head = self.best_path()?.current_pose()?;
        self.tree.get(head).map(|p| p.pose())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::mapping::{GridConfig, MultiHypothesisGrid, StereoGeometryConfig};
    use std::collections::HashMap;

    fn config(num_paths: usize) -> PathFilterConfig {
        PathFilterConfig {
            num_paths,
            max_path_length: 5,
            seed: 42,
            ..Default::default()
        }
    }

    #[test]
    fn test_creation() {
        let filter = PathFilter::new(config(10), Pose3D::identity());
        assert_eq!(filter.paths().len(), 10);
        assert_eq!(filter.tree().len(), 10);
        assert!(filter.estimate().is_some());
    }

    #[test]
    fn test_predict_moves_forward() {
        let mut filter = PathFilter::new(config(20), Pose3D::identity());
        filter.predict(&Pose3D::planar(0.0, 200.0, 0.0));

        let mean_y: f32 = filter
            .paths()
            .iter()
            .filter_map(|p| filter.tree().get(p.current_pose()?))
            .map(|p| p.y)
            .sum::<f32>()
            / 20.0;
        assert!((mean_y - 200.0).abs() < 30.0, "Mean Y: {}", mean_y);
        assert_eq!(filter.tree().len(), 40);
    }

    #[test]
    fn test_reset_invalidates_old_poses() {
        let mut filter = PathFilter::new(config(4), Pose3D::identity());
        filter.predict(&Pose3D::planar(0.0, 100.0, 0.0));
        let old_heads: Vec<_> = filter
            .paths()
            .iter()
            .filter_map(|p| p.current_pose())
            .collect();

        filter.reset(Pose3D::planar(5000.0, 5000.0, 0.0));
        filter.predict(&Pose3D::planar(0.0, 100.0, 0.0));

        assert_eq!(filter.tree().len(), 8);
        for head in old_heads {
            assert!(filter.tree().get(head).is_none());
        }
    }

    #[test]
    fn test_resample_conserves_references() {
        let mut grid = MultiHypothesisGrid::new(GridConfig::default());
        let mut filter = PathFilter::new(config(8), Pose3D::identity());

        for _ in 0..4 {
            filter.predict(&Pose3D::planar(0.0, 50.0, 0.05));
            filter.resample(&mut grid);
        }

        // Every reference is a live child link or a path head
        let tree = filter.tree();
        let mut expected: HashMap<_, u32> = HashMap::new();
        for id in tree.ids() {
            if let Some(parent) = tree.get(id).and_then(|p| p.parent) {
                *expected.entry(parent).or_default() += 1;
            }
        }
        for path in filter.paths() {
            *expected.entry(path.current_pose().unwrap()).or_default() += 1;
        }
        for id in tree.ids() {
            assert_eq!(
                tree.get(id).unwrap().children,
                expected.get(&id).copied().unwrap_or(0)
            );
        }

        // Every live path's ancestry resolves
        for path in filter.paths() {
            let head = path.current_pose().unwrap();
            let root = tree.ancestry(head).last().unwrap();
            assert!(tree.get(root).unwrap().parent.is_none());
        }
    }

    #[test]
    fn test_observe_scores_consistent_paths() {
        let model = InverseSensorModel::from_stereo_geometry(&StereoGeometryConfig::default());
        let (start, length, fattest) = model.ray_extent(20.0).unwrap();
        let ray = EvidenceRay::from_polar(0.0, 0.0, 0.0, start, length, fattest, 60.0, 20.0);

        let mut grid = MultiHypothesisGrid::new(GridConfig::default());
        let mut filter = PathFilter::new(
            PathFilterConfig {
                motion: MotionModelConfig::noiseless(),
                ..config(3)
            },
            Pose3D::identity(),
        );
        let geometry = RobotGeometry::default();
        let frame = vec![vec![ray]];

        let first = filter.observe(&mut grid, &frame, &geometry, std::slice::from_ref(&model));
        assert_eq!(first, vec![None, None, None]);

        filter.predict(&Pose3D::identity());
        let second = filter.observe(&mut grid, &frame, &geometry, std::slice::from_ref(&model));
        assert!(second.iter().all(|s| s.is_some_and(|v| v > 0.0)));
        assert!(filter.best_path().unwrap().total_score() > 0.0);
    }
}
