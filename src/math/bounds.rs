//! Axis-aligned bounding box.

use glam::Vec3;

use super::AffineTransform;

/// Axis-aligned bounding box. An undefined box has `min > max`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Vec3,
    pub max: Vec3,
}

impl BoundingBox {
    /// A box containing nothing; merging anything into it yields that thing.
    pub const UNDEFINED: Self = Self {
        min: Vec3::splat(f32::INFINITY),
        max: Vec3::splat(f32::NEG_INFINITY),
    };

    pub fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// Smallest box enclosing all points. Undefined for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Self {
        let mut bounds = Self::UNDEFINED;
        for p in points {
            bounds.merge_point(p);
        }
        bounds
    }

    pub fn is_defined(&self) -> bool {
        self.min.cmple(self.max).all()
    }

    pub fn center(&self) -> Vec3 {
        if self.is_defined() {
            (self.min + self.max) * 0.5
        } else {
            Vec3::ZERO
        }
    }

    pub fn size(&self) -> Vec3 {
        if self.is_defined() {
            self.max - self.min
        } else {
            Vec3::ZERO
        }
    }

    pub fn merge_point(&mut self, p: Vec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    pub fn merge(&mut self, other: &BoundingBox) {
        if other.is_defined() {
            self.min = self.min.min(other.min);
            self.max = self.max.max(other.max);
        }
    }

    /// Box enclosing this box after an affine transform.
    pub fn transformed(&self, transform: &AffineTransform) -> Self {
        if !self.is_defined() {
            return *self;
        }
        let center = transform.transform_point(self.center());
        let half = self.size() * 0.5;
        let linear = transform.linear();
        let extent = linear.x_axis.abs() * half.x + linear.y_axis.abs() * half.y + linear.z_axis.abs() * half.z;
        Self::new(center - extent, center + extent)
    }
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Quat;

    #[test]
    fn test_undefined_merge() {
        let mut bounds = BoundingBox::UNDEFINED;
        assert!(!bounds.is_defined());
        bounds.merge(&BoundingBox::new(Vec3::ZERO, Vec3::ONE));
        assert_eq!(bounds, BoundingBox::new(Vec3::ZERO, Vec3::ONE));
    }

    #[test]
    fn test_from_points() {
        let bounds = BoundingBox::from_points([Vec3::new(1.0, -1.0, 0.0), Vec3::new(-2.0, 3.0, 5.0)]);
        assert_eq!(bounds.min, Vec3::new(-2.0, -1.0, 0.0));
        assert_eq!(bounds.max, Vec3::new(1.0, 3.0, 5.0));
        assert_eq!(bounds.center(), Vec3::new(-0.5, 1.0, 2.5));
    }

    #[test]
    fn test_transformed() {
        let unit = BoundingBox::new(Vec3::splat(-1.0), Vec3::splat(1.0));
        let moved = unit.transformed(&AffineTransform::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(moved.center(), Vec3::new(10.0, 0.0, 0.0));

        let rotated = unit.transformed(&AffineTransform::from_rotation(Quat::from_rotation_y(
            std::f32::consts::FRAC_PI_4,
        )));
        let expected = std::f32::consts::SQRT_2;
        assert!((rotated.max.x - expected).abs() < 1e-5);
        assert!((rotated.max.y - 1.0).abs() < 1e-5);
    }
}
