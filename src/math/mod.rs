//! Math types for transforms and bounds.
//!
//! Vector and quaternion types come from `glam`; this module only adds the
//! packed 3x4 transform used on the draw path and a bounding box.

mod affine;
mod bounds;

pub use affine::AffineTransform;
pub use bounds::BoundingBox;
