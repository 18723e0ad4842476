//! Particle poses and the arena that owns them.
//!
//! Every candidate trajectory is a chain of [`ParticlePose`]s linked to
//! their parents. Chains share their common ancestry, so the poses form a
//! tree. The tree lives in a [`PoseTree`] arena and poses are addressed by
//! generation-checked [`PoseId`] handles: a handle to a destroyed pose
//! never resolves, even after its slot is reused.
//!
//! # Reference counting
//!
//! `ParticlePose::children` counts the references that keep a pose alive:
//! one per live child pose, plus one for each path whose head it is.
//! A pose is only destroyed once that count reaches zero, which is what
//! lets sibling paths prune independently.

use std::sync::Arc;

use crate::algorithms::mapping::HypothesisGrid;
use crate::core::types::Pose3D;

/// Number of ancestor path ids kept in a pose's history.
pub const MAX_PATH_HISTORY: usize = 100;

/// Handle to a pose in a [`PoseTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PoseId {
    index: u32,
    generation: u32,
}

/// Unique id of a grid cell hypothesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HypothesisId(pub u64);

/// One pose's occupancy claim about one grid cell.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCellHypothesis {
    pub id: HypothesisId,
    pub grid_x: i16,
    pub grid_y: i16,
    /// Occupancy evidence in log-odds.
    pub log_odds: f32,
    /// The pose that made the observation.
    pub owner: PoseId,
}

/// One step of a candidate robot trajectory.
#[derive(Debug, Clone)]
pub struct ParticlePose {
    /// Position in mm.
    pub x: f32,
    pub y: f32,
    /// Heading in radians.
    pub pan: f32,
    /// Observation score accumulated at this step.
    pub score: f32,
    /// Id of the path that created this pose.
    pub path_id: u32,
    pub time_step: u32,
    pub parent: Option<PoseId>,
    /// Live references: child poses plus paths holding this pose as head.
    pub children: u32,
    /// Hypotheses this pose inserted into the grid.
    pub observed_grid_cells: Vec<GridCellHypothesis>,
    /// Bounded history of path ids whose observations this pose can see.
    pub previous_paths: Arc<Vec<u32>>,
}

impl ParticlePose {
    /// Create a detached pose.
    pub fn new(x: f32, y: f32, pan: f32, time_step: u32) -> Self {
        Self {
            x,
            y,
            pan,
            score: 0.0,
            path_id: 0,
            time_step,
            parent: None,
            children: 0,
            observed_grid_cells: Vec::new(),
            previous_paths: Arc::new(Vec::new()),
        }
    }

    /// Ground-plane pose of the robot centre.
    #[inline]
    pub fn pose(&self) -> Pose3D {
        Pose3D::planar(self.x, self.y, self.pan)
    }

    /// Whether observations made by `path_id` are visible from this pose.
    #[inline]
    pub fn sees_path(&self, path_id: u32) -> bool {
        self.previous_paths.contains(&path_id)
    }
}

#[derive(Debug)]
struct Slot {
    generation: u32,
    pose: Option<ParticlePose>,
}

/// Arena owning every live pose.
#[derive(Debug, Default)]
pub struct PoseTree {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live: usize,
    next_hypothesis: u64,
}

impl PoseTree {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live poses.
    #[inline]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Whether the tree holds no poses.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    /// Store a pose and return its handle.
    pub fn insert(&mut self, pose: ParticlePose) -> PoseId {
        self.live += 1;
        if let Some(index) = self.free.pop() {
            let slot = &mut self.slots[index as usize];
            slot.pose = Some(pose);
            return PoseId {
                index,
                generation: slot.generation,
            };
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            pose: Some(pose),
        });
        PoseId {
            index,
            generation: 0,
        }
    }

    /// Look up a live pose.
    #[inline]
    pub fn get(&self, id: PoseId) -> Option<&ParticlePose> {
        self.slots
            .get(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.pose.as_ref())
    }

    /// Look up a live pose mutably.
    #[inline]
    pub fn get_mut(&mut self, id: PoseId) -> Option<&mut ParticlePose> {
        self.slots
            .get_mut(id.index as usize)
            .filter(|slot| slot.generation == id.generation)
            .and_then(|slot| slot.pose.as_mut())
    }

    /// Whether `id` refers to a live pose.
    #[inline]
    pub fn contains(&self, id: PoseId) -> bool {
        self.get(id).is_some()
    }

    /// Add a reference to a pose. Returns the new count.
    pub fn retain(&mut self, id: PoseId) -> Option<u32> {
        let pose = self.get_mut(id)?;
        pose.children += 1;
        Some(pose.children)
    }

    /// Drop a reference to a pose. Returns the remaining count.
    pub fn release(&mut self, id: PoseId) -> Option<u32> {
        let pose = self.get_mut(id)?;
        pose.children = pose.children.saturating_sub(1);
        Some(pose.children)
    }

    /// Remove a pose from the arena, retracting its hypotheses from `grid`.
    ///
    /// The parent's reference count is not touched; the caller decides
    /// whether to keep walking up the ancestry.
    pub fn destroy<G: HypothesisGrid + ?Sized>(
        &mut self,
        id: PoseId,
        grid: &mut G,
    ) -> Option<ParticlePose> {
        let slot = self.slots.get_mut(id.index as usize)?;
        if slot.generation != id.generation {
            return None;
        }
        let pose = slot.pose.take()?;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(id.index);
        self.live -= 1;

        for hypothesis in &pose.observed_grid_cells {
            grid.remove(hypothesis);
        }
        Some(pose)
    }

    /// Allocate a fresh hypothesis id.
    #[inline]
    pub fn next_hypothesis_id(&mut self) -> HypothesisId {
        let id = HypothesisId(self.next_hypothesis);
        self.next_hypothesis += 1;
        id
    }

    /// Handles of `id` and each of its ancestors, nearest first.
    pub fn ancestry(&self, id: PoseId) -> Ancestry<'_> {
        Ancestry {
            tree: self,
            cursor: self.contains(id).then_some(id),
        }
    }

    /// Handles of every live pose.
    pub fn ids(&self) -> impl Iterator<Item = PoseId> + '_ {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.pose.as_ref().map(|_| PoseId {
                index: index as u32,
                generation: slot.generation,
            })
        })
    }

    /// Drop every pose without touching any grid.
    ///
    /// Slots are kept and their generations advanced, so handles issued
    /// before the clear stay dead.
    pub fn clear(&mut self) {
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.pose.take().is_some() {
                slot.generation = slot.generation.wrapping_add(1);
                self.free.push(index as u32);
            }
        }
        self.live = 0;
    }
}

/// Iterator returned by [`PoseTree::ancestry`].
pub struct Ancestry<'a> {
    tree: &'a PoseTree,
    cursor: Option<PoseId>,
}

impl Iterator for Ancestry<'_> {
    type Item = PoseId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.cursor?;
        self.cursor = self
            .tree
            .get(id)
            .and_then(|pose| pose.parent)
            .filter(|parent| self.tree.contains(*parent));
        Some(id)
    }
}
