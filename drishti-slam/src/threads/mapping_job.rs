//! Background map update.
//!
//! Moves a filter and its grid off the control loop, integrates one frame
//! of rays from every path, optionally resamples, then garbage-collects
//! the grid. Both are handed back in the output.

use std::sync::Arc;

use super::jobs::Job;
use crate::algorithms::localization::PathFilter;
use crate::algorithms::mapping::{EvidenceRay, HypothesisGrid, InverseSensorModel};
use crate::sensors::stereo::RobotGeometry;

/// One frame of map integration.
pub struct MappingJob<G> {
    pub filter: PathFilter,
    pub grid: G,
    pub geometry: Arc<RobotGeometry>,
    pub models: Arc<Vec<InverseSensorModel>>,
    /// Camera-centred rays, indexed by camera.
    pub rays: Vec<Vec<EvidenceRay>>,
    /// Resample the filter after observing.
    pub resample: bool,
}

/// What a [`MappingJob`] hands back.
pub struct MappingOutput<G> {
    pub filter: PathFilter,
    pub grid: G,
    /// Per-path observation scores, in path order before resampling.
    pub scores: Vec<Option<f32>>,
    /// Hypotheses reclaimed by garbage collection.
    pub collected: usize,
}

impl<G> MappingJob<G> {
    pub fn new(
        filter: PathFilter,
        grid: G,
        geometry: Arc<RobotGeometry>,
        models: Arc<Vec<InverseSensorModel>>,
        rays: Vec<Vec<EvidenceRay>>,
    ) -> Self {
        Self {
            filter,
            grid,
            geometry,
            models,
            rays,
            resample: false,
        }
    }

    pub fn with_resample(mut self, resample: bool) -> Self {
        self.resample = resample;
        self
    }
}

impl<G: HypothesisGrid + Send + 'static> Job for MappingJob<G> {
    type Output = MappingOutput<G>;

    fn name(&self) -> &'static str {
        "mapping"
    }

    fn execute(mut self) -> MappingOutput<G> {
        let scores = self
            .filter
            .observe(&mut self.grid, &self.rays, &self.geometry, &self.models);
        if self.resample {
            self.filter.resample(&mut self.grid);
        }
        let collected = self.grid.garbage_collect();

        log::debug!(
            "Mapping step {}: {} rays, {} hypotheses collected",
            self.filter.time_step(),
            self.rays.iter().map(Vec::len).sum::<usize>(),
            collected
        );

        MappingOutput {
            filter: self.filter,
            grid: self.grid,
            scores,
            collected,
        }
    }
}
