//! Frame-scoped draw units

use std::sync::Arc;

use crate::backend::{GeometryType, GraphicsDevice};
use crate::math::AffineTransform;
use crate::resources::{GeometryRange, Material};

/// Distance ordering for [`SourceBatch::sort_key`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    FrontToBack,
    BackToFront,
}

/// One geometry range with the material and transforms to draw it with.
///
/// Batches borrow from the drawable that produced them and live for one
/// frame at most.
#[derive(Debug, Clone)]
pub struct SourceBatch<'a> {
    /// Camera distance; only used for ordering.
    pub distance: f32,
    pub geometry: &'a GeometryRange,
    pub material: Arc<Material>,
    /// One transform for static and billboard batches, one per bone or
    /// instance otherwise.
    pub world_transforms: &'a [AffineTransform],
    pub geometry_type: GeometryType,
}

impl<'a> SourceBatch<'a> {
    pub fn new(
        geometry: &'a GeometryRange,
        material: Arc<Material>,
        world_transforms: &'a [AffineTransform],
        geometry_type: GeometryType,
    ) -> Self {
        Self {
            distance: 0.0,
            geometry,
            material,
            world_transforms,
            geometry_type,
        }
    }

    pub fn with_distance(mut self, distance: f32) -> Self {
        self.distance = distance;
        self
    }

    pub fn num_transforms(&self) -> usize {
        self.world_transforms.len()
    }

    /// Key that sorts ascending in the requested order.
    pub fn sort_key(&self, order: SortOrder) -> f32 {
        match order {
            SortOrder::FrontToBack => self.distance,
            SortOrder::BackToFront => -self.distance,
        }
    }

    /// Bind the material and transforms, then draw the geometry range.
    ///
    /// An empty range is skipped before any state is bound.
    pub fn issue_draw<D: GraphicsDevice + ?Sized>(&self, device: &mut D, allow_depth_write: bool) {
        if self.geometry.is_empty() {
            log::trace!("skipping empty batch with material '{}'", self.material.name);
            return;
        }
        self.material.bind_for_draw(
            device,
            self.world_transforms,
            self.geometry_type,
            allow_depth_write,
        );
        self.geometry.issue_draw(device);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DeviceCall, PrimitiveTopology, RecordingDevice, VertexElements};
    use crate::resources::VertexBuffer;

    #[test]
    fn test_empty_batch_binds_nothing() {
        let mut device = RecordingDevice::new();
        let material = Arc::new(Material::new("m", device.create_render_pipeline()));
        let geometry = GeometryRange::new();
        let transforms = [AffineTransform::IDENTITY];

        SourceBatch::new(&geometry, material, &transforms, GeometryType::Static).issue_draw(&mut device, true);
        assert!(device.calls().is_empty());
    }

    #[test]
    fn test_issue_binds_then_draws() {
        let mut device = RecordingDevice::new();
        let pipeline = device.create_render_pipeline();
        let material = Arc::new(Material::new("m", pipeline));
        let vb = VertexBuffer::create(&mut device, &[0u8; 36], 3, VertexElements::POSITION, false).unwrap();
        let mut geometry = GeometryRange::new();
        geometry.set_num_vertex_buffers(1);
        geometry.set_vertex_buffer(0, Arc::new(vb)).unwrap();
        geometry.set_draw_range(PrimitiveTopology::TriangleList, 0, 0, 0, 3).unwrap();
        let transforms = [AffineTransform::IDENTITY; 4];

        SourceBatch::new(&geometry, material, &transforms, GeometryType::Skinned).issue_draw(&mut device, false);

        assert_eq!(device.calls()[0], DeviceCall::SetRenderPipeline(pipeline));
        assert!(device.calls().contains(&DeviceCall::SetObjectTransforms {
            geometry_type: GeometryType::Skinned,
            transforms: transforms.to_vec(),
        }));
        assert!(device.calls().contains(&DeviceCall::SetDepthWrite(false)));
        assert_eq!(device.draw_calls().len(), 1);
        assert!(device.calls().last().is_some_and(DeviceCall::is_draw));
    }

    #[test]
    fn test_sort_key() {
        let geometry = GeometryRange::new();
        let mut device = RecordingDevice::new();
        let material = Arc::new(Material::new("m", device.create_render_pipeline()));
        let batch = SourceBatch::new(&geometry, material, &[], GeometryType::Static).with_distance(3.0);
        assert_eq!(batch.sort_key(SortOrder::FrontToBack), 3.0);
        assert_eq!(batch.sort_key(SortOrder::BackToFront), -3.0);
    }
}
