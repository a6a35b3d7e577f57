//! Minimal rigid-transform math used for 6DoF camera poses.

use std::ops::{Add, Mul, Neg, Sub};

use serde::{Deserialize, Serialize};

const EPSILON: f32 = 1e-6;

/// A 3D vector in scene units (metres).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn dot(self, other: Self) -> f32 {
        self.x * other.x + self.y * other.y + self.z * other.z
    }

    pub fn cross(self, other: Self) -> Self {
        Self {
            x: self.y * other.z - self.z * other.y,
            y: self.z * other.x - self.x * other.z,
            z: self.x * other.y - self.y * other.x,
        }
    }

    pub fn length(self) -> f32 {
        self.dot(self).sqrt()
    }

    /// Returns a unit vector, or zero if the vector is degenerate.
    pub fn normalize(self) -> Self {
        let len = self.length();
        if len > EPSILON {
            self * (1.0 / len)
        } else {
            Self::ZERO
        }
    }

    pub fn distance(self, other: Self) -> f32 {
        (self - other).length()
    }
}

impl Add for Vec3 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl Sub for Vec3 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y, self.z - rhs.z)
    }
}

impl Neg for Vec3 {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.x, -self.y, -self.z)
    }
}

impl Mul<f32> for Vec3 {
    type Output = Self;
    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

/// Unit quaternion stored as `(x, y, z, w)` with `w` the scalar part.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f32,
    pub y: f32,
    pub z: f32,
    pub w: f32,
}

impl Quaternion {
    pub const IDENTITY: Quaternion = Quaternion {
        x: 0.0,
        y: 0.0,
        z: 0.0,
        w: 1.0,
    };

    pub const fn new(x: f32, y: f32, z: f32, w: f32) -> Self {
        Self { x, y, z, w }
    }

    /// Rotation of `angle_radians` around `axis`.
    pub fn from_axis_angle(axis: Vec3, angle_radians: f32) -> Self {
        let axis = axis.normalize();
        let (s, c) = (angle_radians * 0.5).sin_cos();
        Self::new(axis.x * s, axis.y * s, axis.z * s, c)
    }

    pub fn magnitude_squared(self) -> f32 {
        self.x * self.x + self.y * self.y + self.z * self.z + self.w * self.w
    }

    /// Returns the unit quaternion, or identity for a degenerate input.
    pub fn normalize(self) -> Self {
        let mag_sq = self.magnitude_squared();
        if mag_sq > EPSILON {
            let inv = 1.0 / mag_sq.sqrt();
            Self::new(self.x * inv, self.y * inv, self.z * inv, self.w * inv)
        } else {
            Self::IDENTITY
        }
    }

    /// For unit quaternions the conjugate is the inverse rotation.
    pub fn conjugate(self) -> Self {
        Self::new(-self.x, -self.y, -self.z, self.w)
    }

    pub fn rotate(self, v: Vec3) -> Vec3 {
        let u = Vec3::new(self.x, self.y, self.z);
        let s = self.w;
        u * (2.0 * u.dot(v)) + v * (s * s - u.dot(u)) + u.cross(v) * (2.0 * s)
    }

    /// Angle between two rotations, in radians.
    pub fn angle_to(self, other: Self) -> f32 {
        let dot = (self.x * other.x + self.y * other.y + self.z * other.z + self.w * other.w)
            .abs()
            .min(1.0);
        2.0 * dot.acos()
    }
}

impl Default for Quaternion {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Mul for Quaternion {
    type Output = Self;
    /// Hamilton product: `self * rhs` applies `rhs` first.
    fn mul(self, rhs: Self) -> Self {
        Self {
            x: self.w * rhs.x + self.x * rhs.w + self.y * rhs.z - self.z * rhs.y,
            y: self.w * rhs.y - self.x * rhs.z + self.y * rhs.w + self.z * rhs.x,
            z: self.w * rhs.z + self.x * rhs.y - self.y * rhs.x + self.z * rhs.w,
            w: self.w * rhs.w - self.x * rhs.x - self.y * rhs.y - self.z * rhs.z,
        }
    }
}

/// 6DoF camera transform: where the camera is and which way it faces.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vec3,
    pub orientation: Quaternion,
}

impl Pose {
    pub const IDENTITY: Pose = Pose {
        position: Vec3::ZERO,
        orientation: Quaternion::IDENTITY,
    };

    pub fn new(position: Vec3, orientation: Quaternion) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// Applies `other` in the local frame of `self`.
    pub fn compose(&self, other: &Pose) -> Pose {
        Pose {
            position: self.position + self.orientation.rotate(other.position),
            orientation: (self.orientation * other.orientation).normalize(),
        }
    }

    pub fn inverse(&self) -> Pose {
        let orientation = self.orientation.conjugate();
        Pose {
            position: -orientation.rotate(self.position),
            orientation,
        }
    }

    /// Expresses `self` relative to `reference`.
    pub fn relative_to(&self, reference: &Pose) -> Pose {
        reference.inverse().compose(self)
    }
}
