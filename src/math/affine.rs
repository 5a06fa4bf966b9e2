//! 3x4 affine transform used for world and bone matrices.
//!
//! The matrix is stored row-major with an implicit bottom row of
//! `(0, 0, 0, 1)`. The layout matches what shaders expect for a packed
//! `mat3x4`, so slices of transforms can be uploaded with `bytemuck`
//! without conversion.

use bytemuck::{Pod, Zeroable};
use glam::{Mat3, Mat4, Quat, Vec3, Vec4};
use std::ops::Mul;

/// Row-major 3x4 affine transform.
///
/// ```text
///  m00 m01 m02 m03   <- X basis row, translation x
///  m10 m11 m12 m13   <- Y basis row, translation y
///  m20 m21 m22 m23   <- Z basis row, translation z
///  (0   0   0   1)
/// ```
///
/// Non-uniform scale and shear are allowed: skinned bone transforms coming out
/// of animation blending are frequently not rigid.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct AffineTransform {
    pub m00: f32,
    pub m01: f32,
    pub m02: f32,
    pub m03: f32,
    pub m10: f32,
    pub m11: f32,
    pub m12: f32,
    pub m13: f32,
    pub m20: f32,
    pub m21: f32,
    pub m22: f32,
    pub m23: f32,
}

impl AffineTransform {
    /// Identity transform.
    pub const IDENTITY: Self = Self::from_rows(
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
    );

    /// Build from three rows of `[x, y, z, translation]`.
    pub const fn from_rows(r0: [f32; 4], r1: [f32; 4], r2: [f32; 4]) -> Self {
        Self {
            m00: r0[0],
            m01: r0[1],
            m02: r0[2],
            m03: r0[3],
            m10: r1[0],
            m11: r1[1],
            m12: r1[2],
            m13: r1[3],
            m20: r2[0],
            m21: r2[1],
            m22: r2[2],
            m23: r2[3],
        }
    }

    /// Pure translation.
    pub fn from_translation(translation: Vec3) -> Self {
        Self::from_mat3_translation(Mat3::IDENTITY, translation)
    }

    /// Pure rotation.
    pub fn from_rotation(rotation: Quat) -> Self {
        Self::from_mat3_translation(Mat3::from_quat(rotation), Vec3::ZERO)
    }

    /// Pure (possibly non-uniform) scale.
    pub fn from_scale(scale: Vec3) -> Self {
        Self::from_mat3_translation(Mat3::from_diagonal(scale), Vec3::ZERO)
    }

    /// Scale first, then rotate, then translate.
    pub fn from_scale_rotation_translation(scale: Vec3, rotation: Quat, translation: Vec3) -> Self {
        let r = Mat3::from_quat(rotation);
        let linear = Mat3::from_cols(r.x_axis * scale.x, r.y_axis * scale.y, r.z_axis * scale.z);
        Self::from_mat3_translation(linear, translation)
    }

    /// Build from a linear part and a translation.
    pub fn from_mat3_translation(linear: Mat3, translation: Vec3) -> Self {
        Self::from_rows(
            [linear.x_axis.x, linear.y_axis.x, linear.z_axis.x, translation.x],
            [linear.x_axis.y, linear.y_axis.y, linear.z_axis.y, translation.y],
            [linear.x_axis.z, linear.y_axis.z, linear.z_axis.z, translation.z],
        )
    }

    /// Take the top three rows of a 4x4 matrix. The projective row is dropped.
    pub fn from_mat4(m: &Mat4) -> Self {
        Self::from_mat3_translation(
            Mat3::from_cols(m.x_axis.truncate(), m.y_axis.truncate(), m.z_axis.truncate()),
            m.w_axis.truncate(),
        )
    }

    /// The rotation/scale/shear part.
    pub fn linear(&self) -> Mat3 {
        Mat3::from_cols(
            Vec3::new(self.m00, self.m10, self.m20),
            Vec3::new(self.m01, self.m11, self.m21),
            Vec3::new(self.m02, self.m12, self.m22),
        )
    }

    pub fn translation(&self) -> Vec3 {
        Vec3::new(self.m03, self.m13, self.m23)
    }

    /// Length of each basis column.
    pub fn scale(&self) -> Vec3 {
        let linear = self.linear();
        Vec3::new(
            linear.x_axis.length(),
            linear.y_axis.length(),
            linear.z_axis.length(),
        )
    }

    /// Rotation with scale removed. Degenerate axes yield identity.
    pub fn rotation(&self) -> Quat {
        let (_, rotation, _) = self.decompose();
        rotation
    }

    /// Split into `(translation, rotation, scale)`.
    ///
    /// Shear cannot be represented by the result and is lost.
    pub fn decompose(&self) -> (Vec3, Quat, Vec3) {
        let linear = self.linear();
        let scale = self.scale();
        if scale.min_element() <= f32::EPSILON {
            return (self.translation(), Quat::IDENTITY, scale);
        }
        let rotation = Quat::from_mat3(&Mat3::from_cols(
            linear.x_axis / scale.x,
            linear.y_axis / scale.y,
            linear.z_axis / scale.z,
        ))
        .normalize();
        (self.translation(), rotation, scale)
    }

    /// Transform a position (implicit w = 1).
    #[inline]
    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        Vec3::new(
            self.m00 * p.x + self.m01 * p.y + self.m02 * p.z + self.m03,
            self.m10 * p.x + self.m11 * p.y + self.m12 * p.z + self.m13,
            self.m20 * p.x + self.m21 * p.y + self.m22 * p.z + self.m23,
        )
    }

    /// Transform a direction (implicit w = 0, translation ignored).
    #[inline]
    pub fn transform_vector(&self, v: Vec3) -> Vec3 {
        Vec3::new(
            self.m00 * v.x + self.m01 * v.y + self.m02 * v.z,
            self.m10 * v.x + self.m11 * v.y + self.m12 * v.z,
            self.m20 * v.x + self.m21 * v.y + self.m22 * v.z,
        )
    }

    /// Inverse of the affine map, or `None` if the linear part is singular.
    pub fn inverse(&self) -> Option<Self> {
        let linear = self.linear();
        let det = linear.determinant();
        if det.abs() <= f32::EPSILON {
            return None;
        }
        let inv = linear.inverse();
        Some(Self::from_mat3_translation(inv, -(inv * self.translation())))
    }

    /// Expand to a column-major 4x4 matrix.
    pub fn to_mat4(&self) -> Mat4 {
        Mat4::from_cols(
            Vec4::new(self.m00, self.m10, self.m20, 0.0),
            Vec4::new(self.m01, self.m11, self.m21, 0.0),
            Vec4::new(self.m02, self.m12, self.m22, 0.0),
            Vec4::new(self.m03, self.m13, self.m23, 1.0),
        )
    }

    pub fn to_rows(&self) -> [[f32; 4]; 3] {
        [
            [self.m00, self.m01, self.m02, self.m03],
            [self.m10, self.m11, self.m12, self.m13],
            [self.m20, self.m21, self.m22, self.m23],
        ]
    }

    /// Element-wise comparison within `max_abs_diff`.
    pub fn abs_diff_eq(&self, other: &Self, max_abs_diff: f32) -> bool {
        let a: &[f32; 12] = bytemuck::cast_ref(self);
        let b: &[f32; 12] = bytemuck::cast_ref(other);
        a.iter().zip(b).all(|(x, y)| (x - y).abs() <= max_abs_diff)
    }
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl From<Mat4> for AffineTransform {
    fn from(m: Mat4) -> Self {
        Self::from_mat4(&m)
    }
}

/// `a * b` maps a point through `b` first, then `a`.
impl Mul for AffineTransform {
    type Output = Self;

    #[rustfmt::skip]
    fn mul(self, rhs: Self) -> Self {
        let a = &self;
        let b = &rhs;
        Self::from_rows(
            [
                a.m00 * b.m00 + a.m01 * b.m10 + a.m02 * b.m20,
                a.m00 * b.m01 + a.m01 * b.m11 + a.m02 * b.m21,
                a.m00 * b.m02 + a.m01 * b.m12 + a.m02 * b.m22,
                a.m00 * b.m03 + a.m01 * b.m13 + a.m02 * b.m23 + a.m03,
            ],
            [
                a.m10 * b.m00 + a.m11 * b.m10 + a.m12 * b.m20,
                a.m10 * b.m01 + a.m11 * b.m11 + a.m12 * b.m21,
                a.m10 * b.m02 + a.m11 * b.m12 + a.m12 * b.m22,
                a.m10 * b.m03 + a.m11 * b.m13 + a.m12 * b.m23 + a.m13,
            ],
            [
                a.m20 * b.m00 + a.m21 * b.m10 + a.m22 * b.m20,
                a.m20 * b.m01 + a.m21 * b.m11 + a.m22 * b.m21,
                a.m20 * b.m02 + a.m21 * b.m12 + a.m22 * b.m22,
                a.m20 * b.m03 + a.m21 * b.m13 + a.m22 * b.m23 + a.m23,
            ],
        )
    }
}

/// Treats the vector as a position.
impl Mul<Vec3> for AffineTransform {
    type Output = Vec3;

    fn mul(self, rhs: Vec3) -> Vec3 {
        self.transform_point(rhs)
    }
}

impl Mul<Vec3> for &AffineTransform {
    type Output = Vec3;

    fn mul(self, rhs: Vec3) -> Vec3 {
        self.transform_point(rhs)
    }
}
