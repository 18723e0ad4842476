//! Persistence of taught routes.
//!
//! - [`route_xml`]: waypoint list as `<RobotPath>` XML
//! - [`ray_log`]: binary log of the rays observed at each waypoint
//!
//! Loading a file that doesn't exist is not an error: loaders return
//! `Ok(None)` so a caller can fall back to teaching.

pub mod ray_log;
pub mod route_xml;

use thiserror::Error;

pub use ray_log::{load_observations, save_observations};
pub use route_xml::{load_route, save_route};

/// Errors reading or writing persisted data.
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("XML error: {0}")]
    Xml(String),

    #[error("invalid format: {0}")]
    InvalidFormat(String),
}
