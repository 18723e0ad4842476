//! Two-stage survey search for the robot's pose within a known map.
//!
//! Stage 1 scatters candidate positions over a disc around the nominal
//! position and scores the current frame's rays re-projected to each
//! candidate. Stage 2 holds the best position fixed and searches heading
//! offsets. Position and heading are never searched jointly.
//!
//! The optional pruning pass scores candidates with a thinned ray set
//! taken bucket by bucket over pan, so every bearing in the frame keeps a
//! say in which candidates survive.
//!
//! Candidate scoring runs on a [`ParallelScheduler`]; each candidate's
//! score lands in its own slot, so workers never contend.

use std::sync::atomic::{AtomicU32, Ordering};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::algorithms::mapping::{EvidenceRay, HypothesisGrid, InverseSensorModel, PAN_STEPS};
use crate::core::types::{Point3D, Pose3D};
use crate::threads::{ParallelScheduler, SchedulerError};

/// Every n-th ray of each pan bucket scores candidates in the pruning pass.
const PRUNING_RAY_STRIDE: usize = 4;

/// Survey search parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SurveyConfig {
    /// Diameter of the candidate disc (mm).
    pub diameter_mm: f32,

    /// Number of candidate positions.
    pub trial_poses: usize,

    /// Width given to re-projected rays (mm). 0 keeps each ray's own width.
    pub ray_thickness_mm: f32,

    /// Seed for candidate placement.
    pub random_seed: u64,

    /// Fraction of candidates kept after the coarse pruning pass.
    ///
    /// 0 or 1 disables pruning.
    pub pruning_threshold: f32,

    /// Heading offsets searched span `±max_pan` (rad).
    pub max_pan: f32,

    /// Number of heading offsets tried. 1 or fewer skips stage 2.
    pub pan_trials: usize,
}

impl Default for SurveyConfig {
    fn default() -> Self {
        Self {
            diameter_mm: 400.0,
            trial_poses: 200,
            ray_thickness_mm: 0.0,
            random_seed: 1234,
            pruning_threshold: 0.25,
            max_pan: 5.0_f32.to_radians(),
            pan_trials: 21,
        }
    }
}

/// Outcome of a survey.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SurveyResult {
    /// Best position and heading (nominal pan plus the best offset).
    pub pose: Pose3D,
    /// Best heading offset relative to the nominal pan.
    pub pan_offset: f32,
    /// Stage 1 score of the chosen position.
    pub position_score: f32,
    /// Stage 2 score of the chosen heading.
    pub pan_score: f32,
}

/// Survey localizer.
#[derive(Debug)]
pub struct SurveyLocalizer {
    config: SurveyConfig,
    scheduler: ParallelScheduler,
}

impl SurveyLocalizer {
    pub fn new(config: SurveyConfig, scheduler: ParallelScheduler) -> Self {
        Self { config, scheduler }
    }

    pub fn config(&self) -> &SurveyConfig {
        &self.config
    }

    pub fn scheduler_mut(&mut self) -> &mut ParallelScheduler {
        &mut self.scheduler
    }

    /// Candidate positions: the nominal position first, then uniform over
    /// the disc.
    fn candidates(&self, nominal: &Pose3D) -> Vec<(f32, f32)> {
        let mut rng = StdRng::seed_from_u64(self.config.random_seed);
        let radius = self.config.diameter_mm * 0.5;
        let n = self.config.trial_poses.max(1);

        let mut out = Vec::with_capacity(n);
        out.push((nominal.x, nominal.y));
        while out.len() < n {
            let r = rng.random::<f32>().sqrt() * radius;
            let angle = rng.random::<f32>() * std::f32::consts::TAU;
            let (s, c) = angle.sin_cos();
            out.push((nominal.x + r * s, nominal.y + r * c));
        }
        out
    }

    /// Locate the robot.
    ///
    /// `rays` are world-frame rays observed with the robot at `nominal`.
    /// Returns `None` when no candidate overlaps any evidence in `grid`.
    pub fn survey<G>(
        &mut self,
        grid: &G,
        model: &InverseSensorModel,
        rays: &[EvidenceRay],
        nominal: &Pose3D,
    ) -> Result<Option<SurveyResult>, SchedulerError>
    where
        G: HypothesisGrid + Sync + ?Sized,
    {
        if rays.is_empty() {
            return Ok(None);
        }

        let candidates = self.candidates(nominal);
        let thickness = self.config.ray_thickness_mm;
        let score_at = |subset: &[EvidenceRay], x: f32, y: f32, extra_pan: f32| -> f32 {
            score_rays(grid, model, subset, nominal, x, y, extra_pan, thickness)
        };

        // Stage 1: position
        let scores = new_slots(candidates.len());
        let pruning = self.config.pruning_threshold > 0.0 && self.config.pruning_threshold < 1.0;
        let mut survivors: Vec<usize> = (0..candidates.len()).collect();

        if pruning {
            let coarse = pruning_rays(rays, PRUNING_RAY_STRIDE);
            self.scheduler.for_each(0, candidates.len(), &|i| {
                let (x, y) = candidates[i];
                store(&scores[i], score_at(&coarse, x, y, 0.0));
            })?;

            survivors.retain(|&i| load(&scores[i]).is_finite());
            survivors.sort_by(|&a, &b| load(&scores[b]).total_cmp(&load(&scores[a])));
            let keep = ((candidates.len() as f32 * self.config.pruning_threshold).ceil() as usize).max(1);
            survivors.truncate(keep);
            log::debug!(
                "Survey pruning kept {} of {} candidates",
                survivors.len(),
                candidates.len()
            );
        }

        self.scheduler.for_each(0, survivors.len(), &|k| {
            let i = survivors[k];
            let (x, y) = candidates[i];
            store(&scores[i], score_at(rays, x, y, 0.0));
        })?;

        let Some(best) = survivors
            .iter()
            .copied()
            .filter(|&i| load(&scores[i]).is_finite())
            .max_by(|&a, &b| load(&scores[a]).total_cmp(&load(&scores[b])))
        else {
            log::debug!("Survey found no evidence at any candidate");
            return Ok(None);
        };
        let (best_x, best_y) = candidates[best];
        let position_score = load(&scores[best]);

        // Stage 2: heading at the fixed position
        let trials = self.config.pan_trials;
        let (pan_offset, pan_score) = if trials > 1 {
            let max_pan = self.config.max_pan;
            let step = 2.0 * max_pan / (trials - 1) as f32;
            let offset_of = |k: usize| -max_pan + k as f32 * step;
            let pan_scores = new_slots(trials);

            self.scheduler.for_each(0, trials, &|k| {
                store(&pan_scores[k], score_at(rays, best_x, best_y, offset_of(k)));
            })?;

            (0..trials)
                .map(|k| (offset_of(k), load(&pan_scores[k])))
                .filter(|(_, s)| s.is_finite())
                .max_by(|a, b| {
                    // Prefer the smaller offset on ties
                    a.1.total_cmp(&b.1).then(b.0.abs().total_cmp(&a.0.abs()))
                })
                .unwrap_or((0.0, position_score))
        } else {
            (0.0, position_score)
        };

        let result = SurveyResult {
            pose: Pose3D::planar(best_x, best_y, nominal.pan + pan_offset),
            pan_offset,
            position_score,
            pan_score,
        };
        log::debug!(
            "Survey best: ({:.0}, {:.0}) pan offset {:.3} rad, score {:.2}",
            best_x,
            best_y,
            pan_offset,
            pan_score
        );
        Ok(Some(result))
    }
}

/// Every `stride`-th ray within each pan bucket, buckets in pan order.
///
/// A bucket holding any ray contributes at least its first one.
fn pruning_rays(rays: &[EvidenceRay], stride: usize) -> Vec<EvidenceRay> {
    let mut buckets: Vec<Vec<&EvidenceRay>> = vec![Vec::new(); PAN_STEPS];
    for ray in rays {
        buckets[ray.pan_index.min(PAN_STEPS - 1)].push(ray);
    }
    buckets
        .iter()
        .flat_map(|bucket| bucket.iter().step_by(stride.max(1)))
        .map(|&ray| ray.clone())
        .collect()
}

/// `ray` re-projected for the robot at `(x, y)` turned by `extra_pan`.
///
/// The camera's offset from `nominal` turns with the robot.
fn trial_ray(
    ray: &EvidenceRay,
    nominal: &Pose3D,
    x: f32,
    y: f32,
    extra_pan: f32,
    thickness: f32,
) -> EvidenceRay {
    let offset = Point3D::new(
        ray.observed_from.x - nominal.x,
        ray.observed_from.y - nominal.y,
        0.0,
    )
    .rotate(extra_pan, 0.0, 0.0);
    let mut trial = ray.trial_pose(extra_pan, x + offset.x, y + offset.y);
    if thickness > 0.0 {
        trial.width = thickness;
    }
    trial
}

/// Summed probe score of `rays` re-projected to a candidate.
///
/// Returns `NEG_INFINITY` when no ray overlaps evidence.
#[allow(clippy::too_many_arguments)]
fn score_rays<G: HypothesisGrid + ?Sized>(
    grid: &G,
    model: &InverseSensorModel,
    rays: &[EvidenceRay],
    nominal: &Pose3D,
    x: f32,
    y: f32,
    extra_pan: f32,
    thickness: f32,
) -> f32 {
    let mut total: Option<f32> = None;
    for ray in rays {
        let trial = trial_ray(ray, nominal, x, y, extra_pan, thickness);
        if let Some(score) = grid.probe(&trial, model) {
            *total.get_or_insert(0.0) += score;
        }
    }
    total.unwrap_or(f32::NEG_INFINITY)
}

fn new_slots(n: usize) -> Vec<AtomicU32> {
    (0..n)
        .map(|_| AtomicU32::new(f32::NEG_INFINITY.to_bits()))
        .collect()
}

#[inline]
fn store(slot: &AtomicU32, value: f32) {
    slot.store(value.to_bits(), Ordering::Relaxed);
}

#[inline]
fn load(slot: &AtomicU32) -> f32 {
    f32::from_bits(slot.load(Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::algorithms::localization::{ParticlePath, ParticlePose, PoseTree};
    use crate::algorithms::mapping::{
        GridConfig, MultiHypothesisGrid, StereoGeometryConfig, pan_index,
    };
    use approx::assert_relative_eq;
    use std::f32::consts::FRAC_PI_2;

    fn fan(model: &InverseSensorModel, x: f32, y: f32, pan: f32) -> Vec<EvidenceRay> {
        [20.0, 14.0, 25.0, 18.0]
            .iter()
            .zip([-0.3f32, -0.1, 0.1, 0.3])
            .map(|(&disparity, bearing)| {
                let (start, length, fattest) = model.ray_extent(disparity).unwrap();
                EvidenceRay::from_polar(x, y, pan + bearing, start, length, fattest, 60.0, disparity)
            })
            .collect()
    }

    fn mapped_grid(model: &InverseSensorModel) -> MultiHypothesisGrid {
        let mut grid = MultiHypothesisGrid::new(GridConfig::default());
        let mut tree = PoseTree::new();
        let mut path = ParticlePath::new(1, 10);
        let pose = path.add(&mut tree, ParticlePose::new(0.0, 0.0, 0.0, 0));
        let cam = Point3D::default();
        for ray in fan(model, 0.0, 0.0, 0.0) {
            grid.insert(&ray, pose, &mut tree, model, cam, cam);
        }
        grid
    }

    fn localizer(config: SurveyConfig) -> SurveyLocalizer {
        SurveyLocalizer::new(config, ParallelScheduler::with_threads(4))
    }

    #[test]
    fn test_candidates_are_seeded_and_inside_disc() {
        let survey = localizer(SurveyConfig::default());
        let nominal = Pose3D::planar(100.0, -50.0, 0.0);
        let a = survey.candidates(&nominal);
        let b = survey.candidates(&nominal);

        assert_eq!(a, b);
        assert_eq!(a.len(), 200);
        assert_eq!(a[0], (100.0, -50.0));
        for (x, y) in a {
            let r = ((x - 100.0).powi(2) + (y + 50.0).powi(2)).sqrt();
            assert!(r <= 200.0 + 1e-3);
        }
    }

    #[test]
    fn test_recovers_position_offset() {
        let model = InverseSensorModel::from_stereo_geometry(&StereoGeometryConfig::default());
        let grid = mapped_grid(&model);

        // Observed from the true pose (0, 0) but believed to be at (0, -120)
        let nominal = Pose3D::planar(0.0, -120.0, 0.0);
        let rays: Vec<_> = fan(&model, 0.0, 0.0, 0.0)
            .iter()
            .map(|r| r.trial_pose(0.0, 0.0, -120.0))
            .collect();

        let mut survey = localizer(SurveyConfig {
            diameter_mm: 400.0,
            trial_poses: 300,
            pan_trials: 1,
            ..Default::default()
        });
        let result = survey.survey(&grid, &model, &rays, &nominal).unwrap().unwrap();

        assert!(result.pose.y > -60.0, "y = {}", result.pose.y);
        assert!(result.position_score > 0.0);
    }

    #[test]
    fn test_pan_stage_prefers_true_heading() {
        let model = InverseSensorModel::from_stereo_geometry(&StereoGeometryConfig::default());
        let grid = mapped_grid(&model);

        let offset = 0.1;
        let rays = fan(&model, 0.0, 0.0, -offset);
        let mut survey = localizer(SurveyConfig {
            trial_poses: 1,
            max_pan: 0.2,
            pan_trials: 21,
            pruning_threshold: 0.0,
            ..Default::default()
        });
        let result = survey
            .survey(&grid, &model, &rays, &Pose3D::identity())
            .unwrap()
            .unwrap();

        assert!((result.pan_offset - offset).abs() < 0.03, "offset {}", result.pan_offset);
        assert!(result.pan_score >= result.position_score);
    }

    #[test]
    fn test_pruning_rays_cover_every_pan_bucket() {
        let model = InverseSensorModel::from_stereo_geometry(&StereoGeometryConfig::default());
        let (start, length, fattest) = model.ray_extent(20.0).unwrap();
        let ray = |pan: f32| EvidenceRay::from_polar(0.0, 0.0, pan, start, length, fattest, 60.0, 20.0);

        // Eight rays straight ahead with one lone ray off to the side at
        // index 5, which a plain stride of 4 would skip
        let mut rays: Vec<EvidenceRay> = (0..8).map(|i| ray(i as f32 * 0.01)).collect();
        rays.insert(5, ray(1.0));

        let coarse = pruning_rays(&rays, 4);
        assert_eq!(coarse.len(), 3);
        assert_eq!(coarse.iter().filter(|r| r.pan_index == pan_index(1.0)).count(), 1);
        assert_eq!(coarse[0], rays[0]);
        assert_eq!(pruning_rays(&rays, 1).len(), rays.len());
    }

    #[test]
    fn test_trial_ray_turns_camera_offset() {
        let model = InverseSensorModel::from_stereo_geometry(&StereoGeometryConfig::default());
        let (start, length, fattest) = model.ray_extent(20.0).unwrap();
        // Camera 50mm right of the robot centre, looking ahead
        let nominal = Pose3D::planar(0.0, 0.0, 0.0);
        let ray = EvidenceRay::from_polar(50.0, 0.0, 0.0, start, length, fattest, 60.0, 20.0);

        let straight = trial_ray(&ray, &nominal, 1000.0, 500.0, 0.0, 0.0);
        assert_relative_eq!(straight.observed_from.x, 1050.0, epsilon = 1e-2);
        assert_relative_eq!(straight.observed_from.y, 500.0, epsilon = 1e-2);

        // A quarter turn towards +x swings the right-hand camera behind
        let turned = trial_ray(&ray, &nominal, 1000.0, 500.0, FRAC_PI_2, 25.0);
        assert_relative_eq!(turned.observed_from.x, 1000.0, epsilon = 1e-2);
        assert_relative_eq!(turned.observed_from.y, 450.0, epsilon = 1e-2);
        assert_relative_eq!(turned.pan_angle, FRAC_PI_2, epsilon = 1e-4);
        assert_relative_eq!(turned.width, 25.0);
    }

    #[test]
    fn test_empty_map_returns_none() {
        let model = InverseSensorModel::from_stereo_geometry(&StereoGeometryConfig::default());
        let grid = MultiHypothesisGrid::new(GridConfig::default());
        let rays = fan(&model, 0.0, 0.0, 0.0);

        let mut survey = localizer(SurveyConfig::default());
        assert!(survey.survey(&grid, &model, &rays, &Pose3D::identity()).unwrap().is_none());
        assert!(survey.survey(&grid, &model, &[], &Pose3D::identity()).unwrap().is_none());
    }
}
