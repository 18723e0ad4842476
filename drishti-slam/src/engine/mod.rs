//! Teach/follow localization driver.
//!
//! - [`RouteRecorder`]: teach mode, records waypoints and their observations
//! - [`RouteFollower`]: follow mode, double-buffered submaps along the route
//!   and survey localization against the active one

mod follower;
mod recorder;
mod route;

pub use follower::{FollowEvent, GridBuffer, RouteFollower};
pub use recorder::RouteRecorder;
pub use route::{Observation, Route, RouteConfig, Waypoint, span};
