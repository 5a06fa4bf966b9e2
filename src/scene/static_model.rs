//! Static model drawable

use std::sync::Arc;

use glam::Vec3;

use crate::backend::GeometryType;
use crate::math::{AffineTransform, BoundingBox};
use crate::resources::{Material, MeshResource};
use crate::scene::batch::SourceBatch;
use crate::scene::drawable::{select_lod, BatchPass, Drawable, DrawableError, DrawableResult, FrameInfo};
use crate::DrawConfig;

/// A mesh resource placed in the world with one material per sub-mesh.
#[derive(Debug, Clone)]
pub struct StaticModel {
    mesh: Option<Arc<MeshResource>>,
    fallback_material: Arc<Material>,
    materials: Vec<Arc<Material>>,
    /// Per-geometry enable flags, only allocated once something is disabled.
    geometry_enabled: Option<Vec<bool>>,
    lod_levels: Vec<usize>,
    distances: Vec<f32>,
    distance: f32,
    occlusion_lod_level: Option<usize>,
    world_transform: AffineTransform,
    world_bounding_box: BoundingBox,
    cast_shadows: bool,
    view_mask: u32,
}

impl StaticModel {
    /// Empty sub-mesh material slots are filled with `fallback_material`.
    pub fn new(fallback_material: Arc<Material>) -> Self {
        Self {
            mesh: None,
            fallback_material,
            materials: Vec::new(),
            geometry_enabled: None,
            lod_levels: Vec::new(),
            distances: Vec::new(),
            distance: 0.0,
            occlusion_lod_level: None,
            world_transform: AffineTransform::IDENTITY,
            world_bounding_box: BoundingBox::UNDEFINED,
            cast_shadows: false,
            view_mask: u32::MAX,
        }
    }

    /// Like [`StaticModel::new`] with the configured occlusion LOD level.
    pub fn from_config(fallback_material: Arc<Material>, config: &DrawConfig) -> Self {
        let mut model = Self::new(fallback_material);
        model.occlusion_lod_level = config.default_occlusion_lod_level;
        model
    }

    /// Bind a mesh, resetting every per-geometry setting.
    pub fn set_model(&mut self, mesh: Arc<MeshResource>) {
        let count = mesh.num_geometries();
        self.materials = vec![Arc::clone(&self.fallback_material); count];
        self.geometry_enabled = None;
        self.lod_levels = vec![0; count];
        self.distances = vec![0.0; count];
        self.mesh = Some(mesh);
        self.update_world_bounding_box();
        log::trace!("static model bound to '{}' with {count} geometries", self.mesh_name());
    }

    pub fn model(&self) -> Option<&Arc<MeshResource>> {
        self.mesh.as_ref()
    }

    /// Assign one material to every sub-mesh.
    pub fn set_material(&mut self, material: Arc<Material>) {
        for slot in &mut self.materials {
            *slot = Arc::clone(&material);
        }
    }

    /// Assign a material to one sub-mesh. Out of range leaves every slot
    /// untouched.
    pub fn set_material_at(&mut self, index: usize, material: Arc<Material>) -> DrawableResult<()> {
        let count = self.materials.len();
        let slot = self
            .materials
            .get_mut(index)
            .ok_or(DrawableError::MaterialIndex { index, count })?;
        *slot = material;
        Ok(())
    }

    pub fn material(&self, index: usize) -> Option<&Arc<Material>> {
        self.materials.get(index)
    }

    pub fn num_geometries(&self) -> usize {
        self.materials.len()
    }

    pub fn set_geometry_enabled(&mut self, index: usize, enabled: bool) -> DrawableResult<()> {
        let count = self.num_geometries();
        if index >= count {
            return Err(DrawableError::GeometryIndex { index, count });
        }

        match (&mut self.geometry_enabled, enabled) {
            (None, true) => {}
            (None, false) => {
                let mut flags = vec![true; count];
                flags[index] = false;
                self.geometry_enabled = Some(flags);
            }
            (Some(flags), _) => {
                flags[index] = enabled;
                if flags.iter().all(|&e| e) {
                    self.geometry_enabled = None;
                }
            }
        }
        Ok(())
    }

    pub fn is_geometry_enabled(&self, index: usize) -> bool {
        match &self.geometry_enabled {
            Some(flags) => flags.get(index).copied().unwrap_or(false),
            None => index < self.num_geometries(),
        }
    }

    /// Whether any per-geometry enable override exists.
    pub fn has_geometry_overrides(&self) -> bool {
        self.geometry_enabled.is_some()
    }

    /// LOD level used by occlusion passes, clamped to each sub-mesh's levels.
    /// `None` uses the camera-selected level.
    pub fn set_occlusion_lod_level(&mut self, level: Option<usize>) {
        self.occlusion_lod_level = level;
    }

    pub fn occlusion_lod_level(&self) -> Option<usize> {
        self.occlusion_lod_level
    }

    pub fn set_world_transform(&mut self, transform: AffineTransform) {
        self.world_transform = transform;
        self.update_world_bounding_box();
    }

    pub fn world_transform(&self) -> &AffineTransform {
        &self.world_transform
    }

    pub fn set_cast_shadows(&mut self, enabled: bool) {
        self.cast_shadows = enabled;
    }

    pub fn cast_shadows(&self) -> bool {
        self.cast_shadows
    }

    pub fn set_view_mask(&mut self, mask: u32) {
        self.view_mask = mask;
    }

    /// LOD level selected for a sub-mesh by the last update.
    pub fn lod_level(&self, index: usize) -> usize {
        self.lod_levels.get(index).copied().unwrap_or(0)
    }

    /// Distance of one sub-mesh batch computed by the last update.
    pub fn batch_distance(&self, index: usize) -> f32 {
        self.distances.get(index).copied().unwrap_or(self.distance)
    }

    /// Recompute distances and LOD levels with `distance_of` mapping a
    /// model-space point to its camera distance.
    pub(crate) fn update_with(&mut self, frame: &FrameInfo, distance_of: impl Fn(Vec3) -> f32) {
        let Some(mesh) = &self.mesh else {
            return;
        };

        self.distance = distance_of(mesh.bounding_box().center());
        let count = mesh.num_geometries();
        if count == 1 {
            self.distances[0] = self.distance;
        } else {
            for (index, distance) in self.distances.iter_mut().enumerate() {
                *distance = distance_of(mesh.geometry_center(index));
            }
        }

        let lod_distance = frame.lod_distance(self.distance);
        for (index, level) in self.lod_levels.iter_mut().enumerate() {
            *level = select_lod(mesh.geometry_lods(index), lod_distance);
        }
    }

    /// Emit one batch per enabled sub-mesh with a range at the active LOD.
    pub(crate) fn collect_with<'a>(
        &'a self,
        frame: &FrameInfo,
        out: &mut Vec<SourceBatch<'a>>,
        geometry_type: GeometryType,
        transforms_for: impl Fn(usize) -> &'a [AffineTransform],
    ) {
        let Some(mesh) = &self.mesh else {
            return;
        };

        for (index, material) in self.materials.iter().enumerate() {
            if !self.is_geometry_enabled(index) {
                continue;
            }
            let lod = match (frame.pass, self.occlusion_lod_level) {
                (BatchPass::Occlusion, Some(level)) => {
                    level.min(mesh.num_geometry_lod_levels(index).saturating_sub(1))
                }
                _ => self.lod_level(index),
            };
            let Some(geometry) = mesh.geometry(index, lod) else {
                continue;
            };
            out.push(
                SourceBatch::new(geometry, Arc::clone(material), transforms_for(index), geometry_type)
                    .with_distance(self.batch_distance(index)),
            );
        }
    }

    fn update_world_bounding_box(&mut self) {
        self.world_bounding_box = self
            .mesh
            .as_ref()
            .map_or(BoundingBox::UNDEFINED, |mesh| mesh.bounding_box().transformed(&self.world_transform));
    }

    fn mesh_name(&self) -> &str {
        self.mesh.as_ref().map_or("", |mesh| mesh.name())
    }
}

impl Drawable for StaticModel {
    fn update_batches(&mut self, frame: &FrameInfo) {
        let world = self.world_transform;
        let camera = frame.camera_position;
        self.update_with(frame, |p| camera.distance(world.transform_point(p)));
    }

    fn collect_batches<'a>(&'a self, frame: &FrameInfo, out: &mut Vec<SourceBatch<'a>>) {
        let world = std::slice::from_ref(&self.world_transform);
        self.collect_with(frame, out, GeometryType::Static, |_| world);
    }

    fn world_bounding_box(&self) -> BoundingBox {
        self.world_bounding_box
    }

    fn distance(&self) -> f32 {
        self.distance
    }

    fn view_mask(&self) -> u32 {
        self.view_mask
    }
}
