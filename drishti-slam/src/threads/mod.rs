//! Concurrency primitives and background work.
//!
//! - [`ParallelScheduler`]: persistent fork-join pool for data-parallel loops
//! - [`spawn_job`]: one-shot jobs on their own thread, polled for completion
//! - [`MappingJob`], [`StereoJob`]: the two jobs the follow loop runs

mod jobs;
mod mapping_job;
mod scheduler;
mod stereo_job;

pub use jobs::{Job, JobError, JobHandle, spawn_job};
pub use mapping_job::{MappingJob, MappingOutput};
pub use scheduler::{ParallelScheduler, SchedulerError};
pub use stereo_job::{StereoJob, StereoOutput};
