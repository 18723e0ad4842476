//! DrishtiSLAM - stereo-vision mapping and teach/follow localization
//!
//! # Architecture
//!
//! The crate is organized into layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   main.rs                           │  ← Replay binary
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                 io/, config                         │  ← Infrastructure
//! │          (route XML, observation log, TOML)         │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │          (teach recorder, follow buffers)           │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   threads/                          │  ← Execution
//! │     (fork-join scheduler, mapping/stereo jobs)      │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                  algorithms/                        │  ← Core algorithms
//! │  (evidence rays, sensor model, pose tree, survey)   │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                   sensors/                          │  ← Sensor glue
//! │        (stereo cameras, rays, scan matching)        │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                (types, math)                        │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Data flow
//!
//! Stereo frames go through a [`StereoJob`](threads::StereoJob), which
//! produces camera-centred evidence rays. A [`MappingJob`](threads::MappingJob)
//! inserts the rays into the hypothesis grid from the head pose of every
//! candidate path and returns their scores; resampling forks the strongest
//! paths and prunes the rest, and the grid drops the pruned evidence on
//! garbage collection. When following a taught route, the
//! [`RouteFollower`](engine::RouteFollower) keeps two submaps built from
//! the taught observations and the [`SurveyLocalizer`] searches the active
//! one for the robot's position, then its heading.
//!
//! # Units
//!
//! Millimetres and radians. `+y` is forward, `+x` right and `+z` up; pan
//! is measured from `+y` toward `+x`.

// ============================================================================
// Layer 1: Core foundation (no internal deps)
// ============================================================================
pub mod core;

// ============================================================================
// Layer 2: Sensor glue (depends on core, algorithms::mapping)
// ============================================================================
pub mod sensors;

// ============================================================================
// Layer 3: Algorithms (depends on core, sensors, threads)
// ============================================================================
pub mod algorithms;

// ============================================================================
// Layer 4: Execution (depends on algorithms, sensors)
// ============================================================================
pub mod threads;

// ============================================================================
// Layer 5: Localization driver
// ============================================================================
pub mod engine;

// ============================================================================
// Layer 6: Infrastructure
// ============================================================================
pub mod config;
pub mod io;

// ============================================================================
// Convenience re-exports (flat namespace for common use)
// ============================================================================

// Core types
pub use core::math;
pub use core::types::{Point3D, Pose3D};

// Algorithms - Mapping
pub use algorithms::mapping::{
    EvidenceRay, GridConfig, HypothesisGrid, InverseSensorModel, MultiHypothesisGrid,
    StereoGeometryConfig,
};

// Algorithms - Localization
pub use algorithms::localization::{
    GridCellHypothesis, MotionModel, MotionModelConfig, ParticlePath, ParticlePose, PathFilter,
    PathFilterConfig, PoseId, PoseTree, SurveyConfig, SurveyLocalizer, SurveyResult,
};

// Sensors
pub use sensors::stereo::{
    CorrespondenceEngine, PanTracker, RobotGeometry, ScanMatcher, StereoCamera, StereoFeature,
    StereoRayModel,
};

// Threads
pub use threads::{
    Job, JobError, JobHandle, MappingJob, ParallelScheduler, SchedulerError, StereoJob, spawn_job,
};

// Engine
pub use engine::{FollowEvent, Observation, Route, RouteConfig, RouteFollower, RouteRecorder};

// Infrastructure
pub use config::{ConfigLoadError, DrishtiConfig};
pub use io::PersistenceError;
