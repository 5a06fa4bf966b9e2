//! Position/rotation/scale transforms

use glam::{Quat, Vec3};

use crate::math::AffineTransform;

/// Decomposed transform used to pose drawables and bones
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
        }
    }
}

impl Transform {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_position(position: Vec3) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn from_position_rotation(position: Vec3, rotation: Quat) -> Self {
        Self {
            position,
            rotation,
            ..Default::default()
        }
    }

    /// Decompose an affine transform. Shear is lost.
    pub fn from_affine(transform: &AffineTransform) -> Self {
        let (position, rotation, scale) = transform.decompose();
        Self {
            position,
            rotation,
            scale,
        }
    }

    /// Scale, then rotate, then translate.
    pub fn to_affine(&self) -> AffineTransform {
        AffineTransform::from_scale_rotation_translation(self.scale, self.rotation, self.position)
    }
}

impl From<Transform> for AffineTransform {
    fn from(transform: Transform) -> Self {
        transform.to_affine()
    }
}
