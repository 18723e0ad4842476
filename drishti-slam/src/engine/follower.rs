//! Follow mode: double-buffered map submaps along a taught route.
//!
//! Waypoints are loaded one per update. Once `points_per_grid` of them
//! are pending, the `next` buffer is built from their observations. When
//! the robot has driven further since the last swap than the span of the
//! `next` buffer, it becomes `current`. The last waypoint of each buffer
//! also starts the following one, so consecutive buffers overlap.
//!
//! ```text
//!   waypoints:  p0  p1  p2  p3  p4 ...
//!   buffers:   [p0  p1] [p1  p2] [p2  p3] ...   (points_per_grid = 2)
//! ```

use std::sync::Arc;

use super::route::{Observation, RouteConfig, Waypoint, span};
use crate::algorithms::localization::{
    ParticlePath, ParticlePose, PoseTree, SurveyLocalizer, SurveyResult,
};
use crate::algorithms::mapping::{
    EvidenceRay, GridConfig, HypothesisGrid, InverseSensorModel, MultiHypothesisGrid,
};
use crate::core::types::Pose3D;
use crate::sensors::stereo::RobotGeometry;
use crate::threads::SchedulerError;

/// Map rebuilt from a run of taught waypoints.
#[derive(Debug)]
pub struct GridBuffer {
    pub grid: MultiHypothesisGrid,
    pub tree: PoseTree,
    pub path: ParticlePath,
    /// Waypoints the map was built from.
    pub waypoints: Vec<Waypoint>,
    /// Route length covered by the waypoints (mm).
    pub span_mm: f32,
}

impl GridBuffer {
    /// Build a map from `observations`, inserting each one's rays along a
    /// single path through their poses.
    pub fn build(
        id: u32,
        observations: &[Observation],
        template: &GridConfig,
        geometry: &RobotGeometry,
        models: &[InverseSensorModel],
    ) -> Self {
        let waypoints: Vec<Waypoint> = observations.iter().map(|o| Waypoint::from(&o.pose)).collect();
        let n = waypoints.len().max(1) as f32;
        let centre_x = waypoints.iter().map(|w| w.x).sum::<f32>() / n;
        let centre_y = waypoints.iter().map(|w| w.y).sum::<f32>() / n;

        let mut grid = MultiHypothesisGrid::new(GridConfig {
            centre_x,
            centre_y,
            ..template.clone()
        });
        let mut tree = PoseTree::new();
        let mut path = ParticlePath::new(id, observations.len().max(1));

        for (step, observation) in observations.iter().enumerate() {
            let pose = &observation.pose;
            let head = path.add(
                &mut tree,
                ParticlePose::new(pose.x, pose.y, pose.pan, step as u32),
            );

            for (camera, rays) in observation.rays.iter().enumerate() {
                let (Some(position), Some(model)) =
                    (geometry.camera_position(camera, pose), models.get(camera))
                else {
                    continue;
                };
                for ray in rays {
                    grid.insert(
                        &ray.transformed(&position.centre),
                        head,
                        &mut tree,
                        model,
                        position.left,
                        position.right,
                    );
                }
            }
        }

        let span_mm = span(&waypoints);
        Self {
            grid,
            tree,
            path,
            waypoints,
            span_mm,
        }
    }
}

/// Outcome of one follower update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowEvent {
    /// Nothing changed.
    Idle,
    /// The `next` buffer was built.
    Built,
    /// `next` became `current`.
    Swapped,
}

/// Drives the submap buffers along a taught route.
#[derive(Debug)]
pub struct RouteFollower {
    points_per_grid: usize,
    grid_config: GridConfig,
    geometry: Arc<RobotGeometry>,
    models: Arc<Vec<InverseSensorModel>>,
    observations: Vec<Observation>,
    /// Index of the next observation to load.
    cursor: usize,
    pending: Vec<Observation>,
    current: Option<GridBuffer>,
    next: Option<GridBuffer>,
    last_pose: Option<Pose3D>,
    /// Distance driven since the last swap.
    travelled: f32,
    swaps: usize,
    built: u32,
}

impl RouteFollower {
    pub fn new(
        config: &RouteConfig,
        grid_config: GridConfig,
        geometry: Arc<RobotGeometry>,
        models: Arc<Vec<InverseSensorModel>>,
        observations: Vec<Observation>,
    ) -> Self {
        Self {
            points_per_grid: config.points_per_grid.max(1),
            grid_config,
            geometry,
            models,
            observations,
            cursor: 0,
            pending: Vec::new(),
            current: None,
            next: None,
            last_pose: None,
            travelled: 0.0,
            swaps: 0,
            built: 0,
        }
    }

    /// The buffer used for localization.
    pub fn current(&self) -> Option<&GridBuffer> {
        self.current.as_ref()
    }

    /// The buffer waiting to be swapped in.
    pub fn next(&self) -> Option<&GridBuffer> {
        self.next.as_ref()
    }

    /// Number of swaps so far.
    pub fn swaps(&self) -> usize {
        self.swaps
    }

    /// Waypoints loaded so far.
    pub fn loaded(&self) -> usize {
        self.cursor
    }

    /// Whether every waypoint has been loaded.
    pub fn is_exhausted(&self) -> bool {
        self.cursor >= self.observations.len()
    }

    /// Advance with the robot's latest pose estimate.
    pub fn update(&mut self, pose: &Pose3D) -> FollowEvent {
        if let Some(last) = self.last_pose {
            self.travelled += last.planar_distance(pose);
        }
        self.last_pose = Some(*pose);

        if let Some(observation) = self.observations.get(self.cursor) {
            self.pending.push(observation.clone());
            self.cursor += 1;
        }

        let ready = self.next.as_ref().map(|next| self.travelled > next.span_mm);
        match ready {
            Some(true) => {
                self.current = self.next.take();
                self.travelled = 0.0;
                self.swaps += 1;
                log::info!("Swapped map buffer ({} swaps)", self.swaps);
                FollowEvent::Swapped
            }
            Some(false) => FollowEvent::Idle,
            None if self.pending.len() >= self.points_per_grid => {
                self.build_next();
                FollowEvent::Built
            }
            None => FollowEvent::Idle,
        }
    }

    fn build_next(&mut self) {
        let buffer = GridBuffer::build(
            self.built,
            &self.pending,
            &self.grid_config,
            &self.geometry,
            &self.models,
        );
        self.built += 1;
        log::debug!(
            "Built map buffer from {} waypoints, {} hypotheses, span {:.0}mm",
            buffer.waypoints.len(),
            buffer.grid.hypothesis_count(),
            buffer.span_mm
        );

        // The last waypoint also starts the following buffer
        let keep = self.pending.len() - 1;
        self.pending.drain(..keep);
        self.next = Some(buffer);
    }

    /// Survey the current buffer with rays observed from `nominal`.
    ///
    /// `rays` are camera-centred and indexed by camera like the sensor
    /// models. Returns `None` without a current buffer or when nothing
    /// overlaps its map.
    pub fn localize(
        &self,
        survey: &mut SurveyLocalizer,
        rays: &[Vec<EvidenceRay>],
        nominal: &Pose3D,
    ) -> Result<Option<SurveyResult>, SchedulerError> {
        let Some(buffer) = self.current.as_ref() else {
            return Ok(None);
        };

        // Survey scores one sensor model at a time
        let mut best: Option<SurveyResult> = None;
        for (camera, camera_rays) in rays.iter().enumerate() {
            let (Some(position), Some(model)) = (
                self.geometry.camera_position(camera, nominal),
                self.models.get(camera),
            ) else {
                continue;
            };
            let world: Vec<EvidenceRay> = camera_rays
                .iter()
                .map(|r| r.transformed(&position.centre))
                .collect();
            if let Some(result) = survey.survey(&buffer.grid, model, &world, nominal)? {
                let total = result.position_score + result.pan_score;
                if best.is_none_or(|b| total > b.position_score + b.pan_score) {
                    best = Some(result);
                }
            }
        }
        Ok(best)
    }

    /// Occupancy of the current buffer at a world position.
    pub fn occupancy(&self, x: f32, y: f32) -> Option<f32> {
        self.current.as_ref()?.grid.occupancy(x, y)
    }

    /// Drop every buffer and restart from the first waypoint.
    pub fn restart(&mut self) {
        self.cursor = 0;
        self.pending.clear();
        self.current = None;
        self.next = None;
        self.last_pose = None;
        self.travelled = 0.0;
        self.swaps = 0;
    }
}
