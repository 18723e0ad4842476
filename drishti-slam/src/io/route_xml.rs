//! Taught route XML.
//!
//! ```xml
//! <RobotPath>
//!   <Pose>0,0,0</Pose>
//!   <Pose>100,0,90</Pose>
//! </RobotPath>
//! ```
//!
//! Each pose is `x,y,heading` with position in mm and heading in degrees.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::PersistenceError;
use crate::engine::{Route, Waypoint};

#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(rename = "RobotPath")]
struct RobotPath {
    #[serde(rename = "Pose", default)]
    poses: Vec<String>,
}

/// Render a route as XML.
pub fn route_to_xml(route: &Route) -> Result<String, PersistenceError> {
    let doc = RobotPath {
        poses: route
            .waypoints
            .iter()
            .map(|w| format!("{},{},{}", w.x, w.y, w.pan.to_degrees()))
            .collect(),
    };
    quick_xml::se::to_string(&doc).map_err(|e| PersistenceError::Xml(e.to_string()))
}

/// Parse a route from XML.
pub fn route_from_xml(xml: &str) -> Result<Route, PersistenceError> {
    let doc: RobotPath =
        quick_xml::de::from_str(xml).map_err(|e| PersistenceError::Xml(e.to_string()))?;
    let waypoints = doc
        .poses
        .iter()
        .map(|text| parse_pose(text))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Route::new(waypoints))
}

fn parse_pose(text: &str) -> Result<Waypoint, PersistenceError> {
    let fields: Vec<&str> = text.split(',').map(str::trim).collect();
    let [x, y, heading] = fields.as_slice() else {
        return Err(PersistenceError::InvalidFormat(format!(
            "pose '{}' needs 3 fields",
            text
        )));
    };
    let number = |field: &str| {
        field.parse::<f32>().map_err(|_| {
            PersistenceError::InvalidFormat(format!("bad number '{}' in pose '{}'", field, text))
        })
    };
    Ok(Waypoint::new(
        number(*x)?,
        number(*y)?,
        number(*heading)?.to_radians(),
    ))
}

/// Write a route to `path`.
pub fn save_route(path: impl AsRef<Path>, route: &Route) -> Result<(), PersistenceError> {
    let xml = route_to_xml(route)?;
    fs::write(path.as_ref(), xml)?;
    log::info!(
        "Saved route with {} waypoints to {}",
        route.len(),
        path.as_ref().display()
    );
    Ok(())
}

/// Read a route from `path`. A missing file yields `Ok(None)`.
pub fn load_route(path: impl AsRef<Path>) -> Result<Option<Route>, PersistenceError> {
    let xml = match fs::read_to_string(path.as_ref()) {
        Ok(xml) => xml,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::warn!("No route at {}", path.as_ref().display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    route_from_xml(&xml).map(Some)
}
