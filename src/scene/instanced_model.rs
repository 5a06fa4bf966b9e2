//! Instanced model drawable

use std::sync::Arc;

use crate::backend::GeometryType;
use crate::math::{AffineTransform, BoundingBox};
use crate::resources::{Material, MeshResource};
use crate::scene::batch::SourceBatch;
use crate::scene::drawable::{Drawable, DrawableError, DrawableResult, FrameInfo};
use crate::scene::static_model::StaticModel;

/// One mesh drawn at many transforms with a single batch per sub-mesh.
///
/// Instance transforms are relative to the model's world transform. Batch
/// distance and LOD follow the instance nearest to the camera.
#[derive(Debug, Clone)]
pub struct InstancedModel {
    model: StaticModel,
    instances: Vec<AffineTransform>,
    world_instances: Vec<AffineTransform>,
    world_bounding_box: BoundingBox,
}

impl InstancedModel {
    pub fn new(fallback_material: Arc<Material>) -> Self {
        Self {
            model: StaticModel::new(fallback_material),
            instances: Vec::new(),
            world_instances: Vec::new(),
            world_bounding_box: BoundingBox::UNDEFINED,
        }
    }

    pub fn set_model(&mut self, mesh: Arc<MeshResource>) {
        self.model.set_model(mesh);
        self.refresh_world();
    }

    pub fn static_model(&self) -> &StaticModel {
        &self.model
    }

    pub fn set_material(&mut self, material: Arc<Material>) {
        self.model.set_material(material);
    }

    pub fn set_material_at(&mut self, index: usize, material: Arc<Material>) -> DrawableResult<()> {
        self.model.set_material_at(index, material)
    }

    pub fn set_geometry_enabled(&mut self, index: usize, enabled: bool) -> DrawableResult<()> {
        self.model.set_geometry_enabled(index, enabled)
    }

    pub fn set_occlusion_lod_level(&mut self, level: Option<usize>) {
        self.model.set_occlusion_lod_level(level);
    }

    pub fn set_cast_shadows(&mut self, enabled: bool) {
        self.model.set_cast_shadows(enabled);
    }

    pub fn set_view_mask(&mut self, mask: u32) {
        self.model.set_view_mask(mask);
    }

    pub fn set_world_transform(&mut self, transform: AffineTransform) {
        self.model.set_world_transform(transform);
        self.refresh_world();
    }

    pub fn add_instance(&mut self, transform: AffineTransform) {
        self.instances.push(transform);
        self.refresh_world();
    }

    pub fn set_instance(&mut self, index: usize, transform: AffineTransform) -> DrawableResult<()> {
        let count = self.instances.len();
        let slot = self
            .instances
            .get_mut(index)
            .ok_or(DrawableError::InstanceIndex { index, count })?;
        *slot = transform;
        self.refresh_world();
        Ok(())
    }

    pub fn remove_instance(&mut self, index: usize) -> DrawableResult<AffineTransform> {
        let count = self.instances.len();
        if index >= count {
            return Err(DrawableError::InstanceIndex { index, count });
        }
        let removed = self.instances.remove(index);
        self.refresh_world();
        Ok(removed)
    }

    pub fn clear_instances(&mut self) {
        self.instances.clear();
        self.refresh_world();
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// World transforms of every instance.
    pub fn world_instances(&self) -> &[AffineTransform] {
        &self.world_instances
    }

    fn refresh_world(&mut self) {
        let world = *self.model.world_transform();
        self.world_instances.clear();
        self.world_instances.extend(self.instances.iter().map(|instance| world * *instance));

        let mut bounds = BoundingBox::UNDEFINED;
        if let Some(mesh) = self.model.model() {
            let local = mesh.bounding_box();
            for instance in &self.world_instances {
                bounds.merge(&local.transformed(instance));
            }
        }
        self.world_bounding_box = bounds;
    }
}

impl Drawable for InstancedModel {
    fn update_batches(&mut self, frame: &FrameInfo) {
        let camera = frame.camera_position;
        let instances = &self.world_instances;
        self.model.update_with(frame, |p| {
            instances
                .iter()
                .map(|t| camera.distance(t.transform_point(p)))
                .fold(f32::INFINITY, f32::min)
        });
    }

    fn collect_batches<'a>(&'a self, frame: &FrameInfo, out: &mut Vec<SourceBatch<'a>>) {
        if self.world_instances.is_empty() {
            return;
        }
        let instances = self.world_instances.as_slice();
        self.model
            .collect_with(frame, out, GeometryType::Instanced, |_| instances);
    }

    fn world_bounding_box(&self) -> BoundingBox {
        self.world_bounding_box
    }

    fn distance(&self) -> f32 {
        self.model.distance()
    }

    fn view_mask(&self) -> u32 {
        self.model.view_mask()
    }
}
