//! Binary observation log.
//!
//! Stores the rays seen from each taught waypoint. All values are
//! little-endian:
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │ Header                                           │
//! │ - Magic: "DRAY" (4 bytes)                        │
//! │ - Version: u16                                   │
//! │ - Observation count: u32                         │
//! ├──────────────────────────────────────────────────┤
//! │ Per observation                                  │
//! │ - Pose: x, y, z, pan, tilt, roll (f32 × 6)       │
//! │ - Camera count: u32                              │
//! │ - Per camera: ray count u32, then rays           │
//! ├──────────────────────────────────────────────────┤
//! │ Per ray (camera-centred)                         │
//! │ - Vertices: x, y, z (f32 × 3) × 2                │
//! │ - Colour: 3 bytes                                │
//! │ - Width, fattest point (f32 × 2)                 │
//! │ - Length, disparity, uncertainty (f32 × 3)       │
//! └──────────────────────────────────────────────────┘
//! ```
//!
//! Length is stored for readers that don't recompute it; on load it is
//! recomputed from the vertices.

use std::fs::File;
use std::io::{BufReader, BufWriter, ErrorKind, Read, Write};
use std::path::Path;

use super::PersistenceError;
use crate::algorithms::mapping::EvidenceRay;
use crate::core::types::{Point3D, Pose3D};
use crate::engine::Observation;

/// Magic bytes at the start of an observation log.
pub const RAY_LOG_MAGIC: [u8; 4] = *b"DRAY";

/// Current format version.
pub const RAY_LOG_VERSION: u16 = 1;

/// Upper bound on any count field, to reject corrupt files early.
const MAX_COUNT: u32 = 10_000_000;

/// Write observations to any writer.
pub fn write_observations<W: Write>(
    writer: &mut W,
    observations: &[Observation],
) -> Result<(), PersistenceError> {
    writer.write_all(&RAY_LOG_MAGIC)?;
    writer.write_all(&RAY_LOG_VERSION.to_le_bytes())?;
    write_count(writer, observations.len())?;

    for observation in observations {
        let p = &observation.pose;
        write_f32s(writer, &[p.x, p.y, p.z, p.pan, p.tilt, p.roll])?;
        write_count(writer, observation.rays.len())?;
        for rays in &observation.rays {
            write_count(writer, rays.len())?;
            for ray in rays {
                write_ray(writer, ray)?;
            }
        }
    }
    Ok(())
}

fn write_ray<W: Write>(writer: &mut W, ray: &EvidenceRay) -> Result<(), PersistenceError> {
    let [start, end] = &ray.vertices;
    write_f32s(writer, &[start.x, start.y, start.z, end.x, end.y, end.z])?;
    writer.write_all(&ray.colour)?;
    write_f32s(
        writer,
        &[
            ray.width,
            ray.fattest_point,
            ray.length,
            ray.disparity,
            ray.uncertainty,
        ],
    )
}

fn write_count<W: Write>(writer: &mut W, count: usize) -> Result<(), PersistenceError> {
    let count = u32::try_from(count)
        .map_err(|_| PersistenceError::InvalidFormat(format!("count {} too large", count)))?;
    writer.write_all(&count.to_le_bytes())?;
    Ok(())
}

fn write_f32s<W: Write>(writer: &mut W, values: &[f32]) -> Result<(), PersistenceError> {
    for v in values {
        writer.write_all(&v.to_le_bytes())?;
    }
    Ok(())
}

/// Read observations from any reader.
pub fn read_observations<R: Read>(reader: &mut R) -> Result<Vec<Observation>, PersistenceError> {
    let mut magic = [0u8; 4];
    reader.read_exact(&mut magic)?;
    if magic != RAY_LOG_MAGIC {
        return Err(PersistenceError::InvalidFormat(
            "invalid observation log magic bytes".to_string(),
        ));
    }
    let mut version = [0u8; 2];
    reader.read_exact(&mut version)?;
    let version = u16::from_le_bytes(version);
    if version != RAY_LOG_VERSION {
        return Err(PersistenceError::InvalidFormat(format!(
            "unsupported observation log version {}",
            version
        )));
    }

    let count = read_count(reader)?;
    let mut observations = Vec::with_capacity(count.min(1024));
    for _ in 0..count {
        let [x, y, z, pan, tilt, roll] = read_f32s::<_, 6>(reader)?;
        let cameras = read_count(reader)?;
        let mut rays = Vec::with_capacity(cameras.min(16));
        for _ in 0..cameras {
            let n = read_count(reader)?;
            let camera_rays = (0..n)
                .map(|_| read_ray(reader))
                .collect::<Result<Vec<_>, _>>()?;
            rays.push(camera_rays);
        }
        observations.push(Observation::new(
            Pose3D::new(x, y, z, pan, tilt, roll),
            rays,
        ));
    }
    Ok(observations)
}

fn read_ray<R: Read>(reader: &mut R) -> Result<EvidenceRay, PersistenceError> {
    let [sx, sy, sz, ex, ey, ez] = read_f32s::<_, 6>(reader)?;
    let mut colour = [0u8; 3];
    reader.read_exact(&mut colour)?;
    let [width, fattest, _length, disparity, uncertainty] = read_f32s::<_, 5>(reader)?;

    Ok(EvidenceRay::new(
        Pose3D::identity(),
        Point3D::new(sx, sy, sz),
        Point3D::new(ex, ey, ez),
        fattest,
        width,
        disparity,
    )
    .with_uncertainty(uncertainty)
    .with_colour(colour))
}

fn read_count<R: Read>(reader: &mut R) -> Result<usize, PersistenceError> {
    let mut bytes = [0u8; 4];
    reader.read_exact(&mut bytes)?;
    let count = u32::from_le_bytes(bytes);
    if count > MAX_COUNT {
        return Err(PersistenceError::InvalidFormat(format!(
            "count {} exceeds limit",
            count
        )));
    }
    Ok(count as usize)
}

fn read_f32s<R: Read, const N: usize>(reader: &mut R) -> Result<[f32; N], PersistenceError> {
    let mut out = [0.0f32; N];
    let mut bytes = [0u8; 4];
    for v in &mut out {
        reader.read_exact(&mut bytes)?;
        *v = f32::from_le_bytes(bytes);
    }
    Ok(out)
}

/// Write observations to `path`.
pub fn save_observations(
    path: impl AsRef<Path>,
    observations: &[Observation],
) -> Result<(), PersistenceError> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    write_observations(&mut writer, observations)?;
    writer.flush()?;
    log::info!(
        "Saved {} observations to {}",
        observations.len(),
        path.as_ref().display()
    );
    Ok(())
}

/// Read observations from `path`. A missing file yields `Ok(None)`.
pub fn load_observations(
    path: impl AsRef<Path>,
) -> Result<Option<Vec<Observation>>, PersistenceError> {
    let file = match File::open(path.as_ref()) {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::warn!("No observation log at {}", path.as_ref().display());
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    read_observations(&mut BufReader::new(file)).map(Some)
}
