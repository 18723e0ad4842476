//! Multi-hypothesis occupancy grid.
//!
//! Every observation is kept as a separate [`GridCellHypothesis`] tagged
//! with the pose that made it, instead of being folded into a single
//! per-cell value. A pose only sees hypotheses made by poses on paths in
//! its own history, so competing trajectories each get a consistent map
//! out of one shared grid.
//!
//! # Scoring
//!
//! An observation scores each cell it covers against the evidence
//! already visible there:
//!
//! ```text
//! score += (p_observed - 0.5) * (p_map - 0.5) * 4
//! ```
//!
//! Agreement (both occupied or both free) is positive, disagreement
//! negative. Cells with no visible evidence don't contribute; an
//! observation that touched no such cell has no score at all.
//!
//! Removal is two-phase: [`HypothesisGrid::remove`] flags a hypothesis and
//! [`HypothesisGrid::garbage_collect`] drops flagged entries in one sweep.

mod config;
pub mod traversal;

pub use config::GridConfig;

use std::collections::HashSet;
use std::sync::Arc;

use self::traversal::{CellLine, band_cells};
use super::evidence_ray::{EvidenceRay, GaussianLookup};
use super::sensor_model::InverseSensorModel;
use crate::algorithms::localization::{GridCellHypothesis, HypothesisId, PoseId, PoseTree};
use crate::core::math::{log_odds_to_probability, probability_to_log_odds};
use crate::core::types::Point3D;

/// Occupancy probability of a cell at the peak of a perfectly confident ray.
const MAX_OCCUPANCY: f32 = 0.9;

/// Storage contract between the particle filter and the occupancy grid.
pub trait HypothesisGrid {
    /// Insert `ray` as observed by `pose` and score it against the map
    /// visible from that pose.
    ///
    /// New hypotheses are recorded on the pose so they can be retracted
    /// when it is destroyed. Returns `None` when the observation overlaps
    /// no visible evidence.
    fn insert(
        &mut self,
        ray: &EvidenceRay,
        pose: PoseId,
        tree: &mut PoseTree,
        model: &InverseSensorModel,
        left_camera: Point3D,
        right_camera: Point3D,
    ) -> Option<f32>;

    /// Flag a hypothesis for removal.
    fn remove(&mut self, hypothesis: &GridCellHypothesis);

    /// Drop every flagged hypothesis. Returns how many were dropped.
    fn garbage_collect(&mut self) -> usize;

    /// Drop everything.
    fn clear(&mut self);

    /// Score `ray` against all live evidence without modifying the grid.
    fn probe(&self, ray: &EvidenceRay, model: &InverseSensorModel) -> Option<f32>;
}

/// One cell touched by an observation.
#[derive(Debug, Clone, Copy)]
struct CellObservation {
    index: usize,
    cx: i16,
    cy: i16,
    probability: f32,
}

/// Square grid of per-cell hypothesis lists.
#[derive(Debug)]
pub struct MultiHypothesisGrid {
    config: GridConfig,
    cells: Vec<Vec<GridCellHypothesis>>,
    /// Flagged by `remove`, dropped by `garbage_collect`.
    pending: HashSet<HypothesisId>,
    origin_x: f32,
    origin_y: f32,
    hypotheses: usize,
    lookup: GaussianLookup,
}

impl MultiHypothesisGrid {
    /// Create an empty grid.
    pub fn new(mut config: GridConfig) -> Self {
        config.dimension_cells = config.dimension_cells.clamp(1, i16::MAX as usize);
        let half = config.dimension_mm() / 2.0;
        let cells = vec![Vec::new(); config.dimension_cells * config.dimension_cells];

        Self {
            origin_x: config.centre_x - half,
            origin_y: config.centre_y - half,
            config,
            cells,
            pending: HashSet::new(),
            hypotheses: 0,
            lookup: GaussianLookup::default(),
        }
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    /// Number of stored hypotheses, including flagged ones not yet collected.
    pub fn hypothesis_count(&self) -> usize {
        self.hypotheses
    }

    /// Number of hypotheses flagged for removal.
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Convert world coordinates to signed cell indices.
    #[inline]
    pub fn world_to_cell(&self, x: f32, y: f32) -> (i32, i32) {
        (
            ((x - self.origin_x) / self.config.cell_size_mm).floor() as i32,
            ((y - self.origin_y) / self.config.cell_size_mm).floor() as i32,
        )
    }

    /// World coordinates of a cell centre.
    #[inline]
    pub fn cell_to_world(&self, cx: i32, cy: i32) -> (f32, f32) {
        (
            self.origin_x + (cx as f32 + 0.5) * self.config.cell_size_mm,
            self.origin_y + (cy as f32 + 0.5) * self.config.cell_size_mm,
        )
    }

    #[inline]
    fn cell_index(&self, cx: i32, cy: i32) -> Option<usize> {
        let dim = self.config.dimension_cells as i32;
        if cx < 0 || cy < 0 || cx >= dim || cy >= dim {
            return None;
        }
        Some(cy as usize * self.config.dimension_cells + cx as usize)
    }

    /// Hypotheses stored in the cell containing `(x, y)`.
    pub fn hypotheses_at(&self, x: f32, y: f32) -> &[GridCellHypothesis] {
        let (cx, cy) = self.world_to_cell(x, y);
        match self.cell_index(cx, cy) {
            Some(index) => &self.cells[index],
            None => &[],
        }
    }

    /// Whether a hypothesis is stored and not flagged.
    pub fn contains(&self, hypothesis: &GridCellHypothesis) -> bool {
        if self.pending.contains(&hypothesis.id) {
            return false;
        }
        self.cell_index(hypothesis.grid_x as i32, hypothesis.grid_y as i32)
            .is_some_and(|index| self.cells[index].iter().any(|h| h.id == hypothesis.id))
    }

    /// Occupancy probability at `(x, y)` from all live evidence.
    pub fn occupancy(&self, x: f32, y: f32) -> Option<f32> {
        let (cx, cy) = self.world_to_cell(x, y);
        let index = self.cell_index(cx, cy)?;
        self.cell_probability(index, |h| !self.pending.contains(&h.id))
    }

    /// Combined probability of the hypotheses in a cell accepted by `visible`.
    fn cell_probability<F>(&self, index: usize, visible: F) -> Option<f32>
    where
        F: Fn(&GridCellHypothesis) -> bool,
    {
        let mut seen = false;
        let mut log_odds = 0.0;
        for h in self.cells[index].iter().filter(|h| visible(h)) {
            seen = true;
            log_odds += h.log_odds;
        }
        let limit = self.config.log_odds_max;
        seen.then(|| log_odds_to_probability(log_odds.clamp(-limit, limit)))
    }

    /// Cells covered by a ray with their observed occupancy probability.
    ///
    /// The ray fans out from `baseline_half_width` at the camera to half
    /// its own width at the far end. Cells between the camera and the ray
    /// start receive the vacancy probability. A non-zero forward bias
    /// moves the occupancy peak along the ray.
    fn observe_cells(
        &self,
        ray: &EvidenceRay,
        model: &InverseSensorModel,
        baseline_half_width: f32,
    ) -> Vec<CellObservation> {
        let disparity_index = InverseSensorModel::disparity_index(ray.disparity);
        if model.length(disparity_index) == 0 || ray.length <= 0.0 {
            return Vec::new();
        }

        let cell = self.config.cell_size_mm;
        let bias = self.config.forward_bias;
        let ox = ray.observed_from.x;
        let oy = ray.observed_from.y;
        let (sin_pan, cos_pan) = ray.pan_angle.sin_cos();
        let end_dist = ray.end_dist().max(f32::EPSILON);
        let half_width_at = |dist: f32| {
            baseline_half_width + (ray.width * 0.5 - baseline_half_width) * (dist / end_dist)
        };

        let to_cell_space = |p: &Point3D| {
            (
                (p.x - self.origin_x) / cell,
                (p.y - self.origin_y) / cell,
            )
        };
        let [start, end] = &ray.vertices;
        let band = half_width_at(ray.start_dist).max(half_width_at(end_dist)) / cell;

        let mut observed = Vec::new();
        for (cx, cy) in band_cells(to_cell_space(start), to_cell_space(end), band) {
            let Some(index) = self.cell_index(cx, cy) else {
                continue;
            };
            let (wx, wy) = self.cell_to_world(cx, cy);
            let p_ray = if bias == 0.0 {
                ray.probability(wx, wy)
            } else {
                ray.probability_biased(wx, wy, bias, &self.lookup)
            };
            if p_ray < 0.0 {
                continue;
            }

            let (dx, dy) = (wx - ox, wy - oy);
            let dist = (dx * dx + dy * dy).sqrt();
            let lateral = (dx * cos_pan - dy * sin_pan).abs();
            if lateral > half_width_at(dist) + cell * 0.5 {
                continue;
            }

            let strength = p_ray * model.normalized_coeff(disparity_index, dist);
            if strength <= 0.0 {
                continue;
            }
            observed.push(CellObservation {
                index,
                cx: cx as i16,
                cy: cy as i16,
                probability: 0.5 + (MAX_OCCUPANCY - 0.5) * strength,
            });
        }

        if self.config.vacancy_probability < 0.5 {
            let (ocx, ocy) = self.world_to_cell(ox, oy);
            let (scx, scy) = self.world_to_cell(start.x, start.y);
            for (cx, cy) in CellLine::new(ocx, ocy, scx, scy) {
                let Some(index) = self.cell_index(cx, cy) else {
                    continue;
                };
                let (wx, wy) = self.cell_to_world(cx, cy);
                let dist = ((wx - ox).powi(2) + (wy - oy).powi(2)).sqrt();
                if dist >= ray.start_dist - cell {
                    break;
                }
                observed.push(CellObservation {
                    index,
                    cx: cx as i16,
                    cy: cy as i16,
                    probability: self.config.vacancy_probability,
                });
            }
        }

        observed
    }

    /// Score observed cells against the evidence accepted by `visible`.
    fn score_cells<F>(&self, observed: &[CellObservation], visible: F) -> Option<f32>
    where
        F: Fn(&GridCellHypothesis) -> bool,
    {
        let mut score = 0.0;
        let mut any = false;
        for obs in observed {
            if let Some(p_map) = self.cell_probability(obs.index, &visible) {
                score += (obs.probability - 0.5) * (p_map - 0.5) * 4.0;
                any = true;
            }
        }
        any.then_some(score)
    }
}

impl HypothesisGrid for MultiHypothesisGrid {
    fn insert(
        &mut self,
        ray: &EvidenceRay,
        pose: PoseId,
        tree: &mut PoseTree,
        model: &InverseSensorModel,
        left_camera: Point3D,
        right_camera: Point3D,
    ) -> Option<f32> {
        let history = Arc::clone(&tree.get(pose)?.previous_paths);
        let baseline_half_width = left_camera.planar_distance(&right_camera) * 0.5;
        let observed = self.observe_cells(ray, model, baseline_half_width);
        if observed.is_empty() {
            return None;
        }

        let score = {
            let tree = &*tree;
            self.score_cells(&observed, |h| {
                !self.pending.contains(&h.id)
                    && tree
                        .get(h.owner)
                        .is_some_and(|owner| history.contains(&owner.path_id))
            })
        };

        let mut created = Vec::with_capacity(observed.len());
        for obs in &observed {
            let hypothesis = GridCellHypothesis {
                id: tree.next_hypothesis_id(),
                grid_x: obs.cx,
                grid_y: obs.cy,
                log_odds: probability_to_log_odds(obs.probability),
                owner: pose,
            };
            self.cells[obs.index].push(hypothesis.clone());
            created.push(hypothesis);
        }
        self.hypotheses += created.len();

        if let Some(owner) = tree.get_mut(pose) {
            owner.observed_grid_cells.extend(created);
        }
        score
    }

    fn remove(&mut self, hypothesis: &GridCellHypothesis) {
        if self
            .cell_index(hypothesis.grid_x as i32, hypothesis.grid_y as i32)
            .is_some()
        {
            self.pending.insert(hypothesis.id);
        }
    }

    fn garbage_collect(&mut self) -> usize {
        if self.pending.is_empty() {
            return 0;
        }

        let pending = &self.pending;
        let mut removed = 0;
        for cell in &mut self.cells {
            let before = cell.len();
            cell.retain(|h| !pending.contains(&h.id));
            removed += before - cell.len();
        }
        self.pending.clear();
        self.hypotheses -= removed;

        log::debug!(
            "Grid garbage collection: {} hypotheses removed, {} remain",
            removed,
            self.hypotheses
        );
        removed
    }

    fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.pending.clear();
        self.hypotheses = 0;
    }

    fn probe(&self, ray: &EvidenceRay, model: &InverseSensorModel) -> Option<f32> {
        let observed = self.observe_cells(ray, model, 0.0);
        self.score_cells(&observed, |h| !self.pending.contains(&h.id))
    }
}
