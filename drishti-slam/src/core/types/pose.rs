//! Point and pose types for stereo mapping.
//!
//! All positions are in millimetres and all angles in radians.
//! The frame is robot-style: `+y` forward, `+x` right, `+z` up.

use serde::{Deserialize, Serialize};

/// A 3D point in millimetres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3D {
    /// X coordinate (right)
    pub x: f32,
    /// Y coordinate (forward)
    pub y: f32,
    /// Z coordinate (up)
    pub z: f32,
}

impl Point3D {
    /// Create a new point.
    #[inline]
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Squared distance to another point (avoids sqrt).
    #[inline]
    pub fn distance_squared(&self, other: &Point3D) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        let dz = self.z - other.z;
        dx * dx + dy * dy + dz * dz
    }

    /// Distance to another point.
    #[inline]
    pub fn distance(&self, other: &Point3D) -> f32 {
        self.distance_squared(other).sqrt()
    }

    /// Distance to another point in the ground (x-y) plane.
    #[inline]
    pub fn planar_distance(&self, other: &Point3D) -> f32 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }

    /// Rotate about the origin.
    ///
    /// Applies roll (x-z plane), then tilt (y-z plane), then pan (x-y plane).
    /// Each rotation advances the angle measured from the plane's second
    /// axis toward its first, so pan turns `+y` toward `+x`.
    pub fn rotate(&self, pan: f32, tilt: f32, roll: f32) -> Point3D {
        let (mut x, mut y, mut z) = (self.x, self.y, self.z);

        if roll != 0.0 {
            let (s, c) = roll.sin_cos();
            let (nx, nz) = (x * c + z * s, z * c - x * s);
            x = nx;
            z = nz;
        }

        if tilt != 0.0 {
            let (s, c) = tilt.sin_cos();
            let (ny, nz) = (y * c + z * s, z * c - y * s);
            y = ny;
            z = nz;
        }

        if pan != 0.0 {
            let (s, c) = pan.sin_cos();
            let (nx, ny) = (x * c + y * s, y * c - x * s);
            x = nx;
            y = ny;
        }

        Point3D::new(x, y, z)
    }

    /// Translate by an offset.
    #[inline]
    pub fn translate(&self, dx: f32, dy: f32, dz: f32) -> Point3D {
        Point3D::new(self.x + dx, self.y + dy, self.z + dz)
    }
}

/// Position and orientation in 3D.
///
/// A value type: every operator returns a new pose. Angles are not
/// normalized so that repeated rotations accumulate additively.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose3D {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    /// Rotation about the vertical axis, from `+y` toward `+x`.
    pub pan: f32,
    pub tilt: f32,
    pub roll: f32,
}

impl Pose3D {
    /// Create a new pose.
    #[inline]
    pub fn new(x: f32, y: f32, z: f32, pan: f32, tilt: f32, roll: f32) -> Self {
        Self {
            x,
            y,
            z,
            pan,
            tilt,
            roll,
        }
    }

    /// Ground-plane pose: position in the x-y plane plus heading.
    #[inline]
    pub fn planar(x: f32, y: f32, pan: f32) -> Self {
        Self::new(x, y, 0.0, pan, 0.0, 0.0)
    }

    /// Identity pose at origin with zero orientation.
    #[inline]
    pub fn identity() -> Self {
        Self::default()
    }

    /// The position component.
    #[inline]
    pub fn position(&self) -> Point3D {
        Point3D::new(self.x, self.y, self.z)
    }

    /// Rotate the position about the origin and accumulate the angles.
    pub fn rotate(&self, pan: f32, tilt: f32, roll: f32) -> Pose3D {
        let p = self.position().rotate(pan, tilt, roll);
        Pose3D::new(
            p.x,
            p.y,
            p.z,
            self.pan + pan,
            self.tilt + tilt,
            self.roll + roll,
        )
    }

    /// Translate the position, keeping orientation.
    #[inline]
    pub fn translate(&self, dx: f32, dy: f32, dz: f32) -> Pose3D {
        Pose3D {
            x: self.x + dx,
            y: self.y + dy,
            z: self.z + dz,
            ..*self
        }
    }

    /// Component-wise sum.
    #[inline]
    pub fn add(&self, other: &Pose3D) -> Pose3D {
        Pose3D::new(
            self.x + other.x,
            self.y + other.y,
            self.z + other.z,
            self.pan + other.pan,
            self.tilt + other.tilt,
            self.roll + other.roll,
        )
    }

    /// Component-wise difference.
    #[inline]
    pub fn subtract(&self, other: &Pose3D) -> Pose3D {
        Pose3D::new(
            self.x - other.x,
            self.y - other.y,
            self.z - other.z,
            self.pan - other.pan,
            self.tilt - other.tilt,
            self.roll - other.roll,
        )
    }

    /// Ground-plane distance between two poses.
    #[inline]
    pub fn planar_distance(&self, other: &Pose3D) -> f32 {
        self.position().planar_distance(&other.position())
    }

    /// Transform a point from this pose's local frame into the parent frame.
    ///
    /// The point is rotated by this pose's orientation and then translated
    /// by its position.
    #[inline]
    pub fn transform_point(&self, local: &Point3D) -> Point3D {
        local
            .rotate(self.pan, self.tilt, self.roll)
            .translate(self.x, self.y, self.z)
    }
}
