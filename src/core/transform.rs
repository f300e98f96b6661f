//! Rigid transform matrices and pose conversions.
//!
//! A sensor-to-world transform is a 4x4 homogeneous matrix in row-major
//! order. Only the affine 3x4 part is ever applied to points; the bottom
//! row is carried for completeness.

use super::point::Point3D;

/// 4x4 homogeneous transform, row-major.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransformMatrix([f64; 16]);

impl TransformMatrix {
    /// Identity transform.
    pub fn identity() -> Self {
        let mut m = [0.0; 16];
        m[0] = 1.0;
        m[5] = 1.0;
        m[10] = 1.0;
        m[15] = 1.0;
        Self(m)
    }

    /// Wrap a raw row-major 4x4 matrix.
    pub fn from_array(m: [f64; 16]) -> Self {
        Self(m)
    }

    /// Pure translation.
    pub fn from_translation(x: f64, y: f64, z: f64) -> Self {
        let mut t = Self::identity();
        t.0[3] = x;
        t.0[7] = y;
        t.0[11] = z;
        t
    }

    /// Build a transform from a 6D pose (yaw, pitch, roll, x, y, z).
    ///
    /// Angles in radians, ZYX convention.
    pub fn from_pose6d(yaw: f64, pitch: f64, roll: f64, x: f64, y: f64, z: f64) -> Self {
        let (sa, ca) = yaw.sin_cos();
        let (sb, cb) = pitch.sin_cos();
        let (sg, cg) = roll.sin_cos();

        let mut m = [0.0; 16];
        m[0] = ca * cb;
        m[1] = ca * sb * sg - sa * cg;
        m[2] = ca * sb * cg + sa * sg;
        m[3] = x;

        m[4] = sa * cb;
        m[5] = sa * sb * sg + ca * cg;
        m[6] = sa * sb * cg - ca * sg;
        m[7] = y;

        m[8] = -sb;
        m[9] = cb * sg;
        m[10] = cb * cg;
        m[11] = z;

        m[15] = 1.0;
        Self(m)
    }

    /// Recover the 6D pose (yaw, pitch, roll, x, y, z).
    pub fn to_pose6d(&self) -> [f64; 6] {
        let m = &self.0;
        let d = (m[0] * m[0] + m[4] * m[4]).sqrt();

        let (yaw, roll) = if d.abs() > 1e-10 {
            (m[4].atan2(m[0]), m[9].atan2(m[10]))
        } else {
            ((-m[1]).atan2(m[5]), 0.0)
        };
        let pitch = (-m[8]).atan2(d);

        [yaw, pitch, roll, m[3], m[7], m[11]]
    }

    /// Translation components (x, y, z).
    #[inline]
    pub fn translation(&self) -> (f64, f64, f64) {
        (self.0[3], self.0[7], self.0[11])
    }

    /// Apply the affine 3x4 part to a point.
    #[inline]
    pub fn apply(&self, p: Point3D) -> Point3D {
        let m = &self.0;
        let (x, y, z) = (p.x as f64, p.y as f64, p.z as f64);
        Point3D::new(
            (m[0] * x + m[1] * y + m[2] * z + m[3]) as f32,
            (m[4] * x + m[5] * y + m[6] * z + m[7]) as f32,
            (m[8] * x + m[9] * y + m[10] * z + m[11]) as f32,
        )
    }

    /// Raw row-major matrix.
    #[inline]
    pub fn as_array(&self) -> &[f64; 16] {
        &self.0
    }
}

impl Default for TransformMatrix {
    fn default() -> Self {
        Self::identity()
    }
}
