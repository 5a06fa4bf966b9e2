//! The drawable contract

use glam::Vec3;
use thiserror::Error;

use crate::math::BoundingBox;
use crate::resources::GeometryRange;
use crate::scene::batch::SourceBatch;
use crate::DrawConfig;

/// Errors from configuring a drawable
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DrawableError {
    #[error("Material index {index} out of range ({count} geometries)")]
    MaterialIndex { index: usize, count: usize },
    #[error("Geometry index {index} out of range ({count} geometries)")]
    GeometryIndex { index: usize, count: usize },
    #[error("Bone index {index} out of range ({count} bones)")]
    BoneIndex { index: usize, count: usize },
    #[error("Instance index {index} out of range ({count} instances)")]
    InstanceIndex { index: usize, count: usize },
}

pub type DrawableResult<T> = Result<T, DrawableError>;

/// Which kind of pass batches are collected for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BatchPass {
    /// Camera-visible rendering; LOD follows camera distance.
    #[default]
    View,
    /// Occlusion rendering; LOD follows each drawable's occlusion level.
    Occlusion,
}

/// Per-frame parameters shared by every drawable
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameInfo {
    pub frame_number: u32,
    pub camera_position: Vec3,
    /// Divides camera distance before LOD selection; larger keeps detail
    /// further out.
    pub lod_bias: f32,
    pub view_mask: u32,
    pub pass: BatchPass,
}

impl Default for FrameInfo {
    fn default() -> Self {
        Self {
            frame_number: 0,
            camera_position: Vec3::ZERO,
            lod_bias: 1.0,
            view_mask: u32::MAX,
            pass: BatchPass::View,
        }
    }
}

impl FrameInfo {
    pub fn new(camera_position: Vec3, config: &DrawConfig) -> Self {
        Self {
            camera_position,
            lod_bias: config.lod_bias,
            ..Default::default()
        }
    }

    pub fn with_pass(mut self, pass: BatchPass) -> Self {
        self.pass = pass;
        self
    }

    /// Camera distance scaled by the LOD bias.
    pub fn lod_distance(&self, distance: f32) -> f32 {
        distance / self.lod_bias.max(f32::EPSILON)
    }
}

/// A scene object that turns into draw batches each visible frame.
///
/// The caller first updates every visible drawable, then collects batches;
/// batches borrow from the drawable until the frame ends.
pub trait Drawable {
    /// Refresh distances, LOD selection and transforms for this frame.
    fn update_batches(&mut self, frame: &FrameInfo);

    /// Append this frame's batches to `out`.
    fn collect_batches<'a>(&'a self, frame: &FrameInfo, out: &mut Vec<SourceBatch<'a>>);

    fn world_bounding_box(&self) -> BoundingBox;

    /// Camera distance computed by the last update.
    fn distance(&self) -> f32;

    fn view_mask(&self) -> u32 {
        u32::MAX
    }
}

/// LOD level for `lod_distance`: the highest level past level 0 whose switch
/// distance is below it, stopping at the first that is not.
pub fn select_lod(lods: &[GeometryRange], lod_distance: f32) -> usize {
    let mut selected = 0;
    for (level, range) in lods.iter().enumerate().skip(1) {
        if lod_distance > range.lod_distance() {
            selected = level;
        } else {
            break;
        }
    }
    selected
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn lods(distances: &[f32]) -> Vec<GeometryRange> {
        distances
            .iter()
            .map(|&d| {
                let mut range = GeometryRange::new();
                range.set_lod_distance(d);
                range
            })
            .collect()
    }

    #[rstest]
    #[case(0.0, 0)]
    #[case(10.0, 0)]
    #[case(10.5, 1)]
    #[case(25.0, 2)]
    #[case(1000.0, 2)]
    fn test_select_lod(#[case] lod_distance: f32, #[case] expected: usize) {
        assert_eq!(select_lod(&lods(&[0.0, 10.0, 20.0]), lod_distance), expected);
    }

    #[test]
    fn test_select_lod_stops_at_first_miss() {
        // Out-of-order switch distances: level 2 is never reached past level 1's miss.
        assert_eq!(select_lod(&lods(&[0.0, 50.0, 5.0]), 20.0), 0);
    }

    #[test]
    fn test_lod_bias() {
        let frame = FrameInfo {
            lod_bias: 2.0,
            ..Default::default()
        };
        assert_eq!(frame.lod_distance(10.0), 5.0);
    }
}
