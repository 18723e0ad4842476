//! Candidate trajectories through the pose tree.
//!
//! A [`ParticlePath`] owns a reference to its head pose and keeps a bounded
//! window of its most recent poses for scoring and inspection. Paths fork
//! from each other during resampling; a fork shares all of its parent's
//! poses up to the branch point.

use std::collections::VecDeque;
use std::sync::Arc;

use super::particle_pose::{MAX_PATH_HISTORY, ParticlePose, PoseId, PoseTree};
use crate::algorithms::mapping::HypothesisGrid;

/// One candidate trajectory.
#[derive(Debug, Clone)]
pub struct ParticlePath {
    id: u32,
    max_length: usize,
    /// Head of the parent path when this path was forked.
    branch_pose: Option<PoseId>,
    current_pose: Option<PoseId>,
    /// Most recent poses, oldest first. Always a suffix of the ancestry
    /// reachable from `current_pose`.
    window: VecDeque<PoseId>,
    total_score: f32,
}

impl ParticlePath {
    /// Create an empty root path.
    pub fn new(id: u32, max_length: usize) -> Self {
        Self {
            id,
            max_length: max_length.max(1),
            branch_pose: None,
            current_pose: None,
            window: VecDeque::new(),
            total_score: 0.0,
        }
    }

    /// Fork a new path from `parent`'s head.
    ///
    /// The branch pose gains one reference, held by the new path until it
    /// adds its first pose or is removed.
    pub fn fork(id: u32, parent: &ParticlePath, tree: &mut PoseTree) -> Self {
        let branch = parent.current_pose.filter(|&p| tree.retain(p).is_some());
        Self {
            id,
            max_length: parent.max_length,
            branch_pose: branch,
            current_pose: branch,
            window: if branch.is_some() {
                parent.window.clone()
            } else {
                VecDeque::new()
            },
            total_score: parent.total_score,
        }
    }

    #[inline]
    pub fn id(&self) -> u32 {
        self.id
    }

    #[inline]
    pub fn max_length(&self) -> usize {
        self.max_length
    }

    #[inline]
    pub fn branch_pose(&self) -> Option<PoseId> {
        self.branch_pose
    }

    #[inline]
    pub fn current_pose(&self) -> Option<PoseId> {
        self.current_pose
    }

    #[inline]
    pub fn total_score(&self) -> f32 {
        self.total_score
    }

    /// Poses in the window, oldest first.
    pub fn window(&self) -> impl Iterator<Item = PoseId> + '_ {
        self.window.iter().copied()
    }

    /// Number of poses in the window.
    #[inline]
    pub fn len(&self) -> usize {
        self.window.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.window.is_empty()
    }

    /// Whether the path has been consumed by [`remove`](Self::remove).
    #[inline]
    pub fn is_consumed(&self) -> bool {
        self.current_pose.is_none()
    }

    /// Append a pose as the new head.
    ///
    /// The pose's parent becomes the old head and it inherits the parent's
    /// path history, or starts a fresh history (branch ancestry plus this
    /// path's id) when the old head is the branch point.
    pub fn add(&mut self, tree: &mut PoseTree, mut pose: ParticlePose) -> PoseId {
        let parent = self.current_pose.and_then(|id| tree.get(id).map(|p| (id, p)));

        pose.path_id = self.id;
        pose.children = 1;
        pose.previous_paths = match parent {
            Some((id, parent_pose)) if Some(id) == self.branch_pose => {
                let history = &parent_pose.previous_paths;
                let skip = history.len().saturating_sub(MAX_PATH_HISTORY);
                let mut fresh: Vec<u32> = history[skip..].to_vec();
                fresh.push(self.id);
                Arc::new(fresh)
            }
            Some((_, parent_pose)) => Arc::clone(&parent_pose.previous_paths),
            None => Arc::new(vec![self.id]),
        };
        // The path's hold on the old head becomes the new pose's child link
        pose.parent = parent.map(|(id, _)| id);

        self.total_score += pose.score;
        let id = tree.insert(pose);
        self.current_pose = Some(id);

        self.window.push_back(id);
        while self.window.len() > self.max_length {
            self.window.pop_front();
        }
        id
    }

    /// Add observation score to the head pose.
    pub fn add_score(&mut self, tree: &mut PoseTree, score: f32) {
        if let Some(pose) = self.current_pose.and_then(|id| tree.get_mut(id)) {
            pose.score += score;
            self.total_score += score;
        }
    }

    /// Prune this path from the tree.
    ///
    /// Walks back from the head destroying poses (and retracting their grid
    /// hypotheses) until reaching a pose still referenced by a live sibling
    /// or walking off the root. Ancestors left without references after
    /// their own path was removed are reclaimed on the way. Returns whether
    /// the walk reached the branch point; for a root path, whether the whole
    /// chain was destroyed. Calling this on a consumed path does nothing and
    /// returns `false`.
    pub fn remove<G: HypothesisGrid + ?Sized>(&mut self, tree: &mut PoseTree, grid: &mut G) -> bool {
        let Some(head) = self.current_pose.take() else {
            return false;
        };

        let mut reached_branch = false;
        let mut destroyed = 0usize;
        let mut cursor = head;
        let mut remaining = tree.release(head);

        loop {
            if Some(cursor) == self.branch_pose {
                reached_branch = true;
            }
            if remaining != Some(0) {
                break;
            }

            let Some(pose) = tree.destroy(cursor, grid) else {
                break;
            };
            destroyed += 1;

            match pose.parent {
                Some(parent) => {
                    cursor = parent;
                    remaining = tree.release(parent);
                }
                None => {
                    reached_branch |= self.branch_pose.is_none();
                    break;
                }
            }
        }

        log::trace!(
            "Removed path {}: {} poses destroyed, branch reached: {}",
            self.id,
            destroyed,
            reached_branch
        );

        self.window.clear();
        self.total_score = 0.0;
        reached_branch
    }
}
