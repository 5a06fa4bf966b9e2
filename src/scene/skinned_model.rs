//! Skinned model drawable

use std::sync::Arc;

use crate::backend::GeometryType;
use crate::math::{AffineTransform, BoundingBox};
use crate::resources::{Material, MeshResource};
use crate::scene::batch::SourceBatch;
use crate::scene::drawable::{Drawable, DrawableError, DrawableResult, FrameInfo};
use crate::scene::static_model::StaticModel;
use crate::scene::transform::Transform;
use crate::DrawConfig;

/// A static model deformed by its mesh's skeleton.
///
/// Batches carry one skin matrix per bone: the bone's world transform times
/// its offset matrix. Geometries with a bone mapping get their own matrix
/// list in local bone order.
#[derive(Debug, Clone)]
pub struct SkinnedModel {
    model: StaticModel,
    max_skin_matrices: usize,
    bone_poses: Vec<AffineTransform>,
    bone_world: Vec<AffineTransform>,
    skin_matrices: Vec<AffineTransform>,
    geometry_skin_matrices: Vec<Vec<AffineTransform>>,
}

impl SkinnedModel {
    pub fn new(fallback_material: Arc<Material>, config: &DrawConfig) -> Self {
        Self {
            model: StaticModel::from_config(fallback_material, config),
            max_skin_matrices: config.max_skin_matrices,
            bone_poses: Vec::new(),
            bone_world: Vec::new(),
            skin_matrices: Vec::new(),
            geometry_skin_matrices: Vec::new(),
        }
    }

    /// Bind a mesh and reset every bone to its bind pose.
    pub fn set_model(&mut self, mesh: Arc<MeshResource>) {
        let bones = mesh.skeleton().map(|s| s.bones()).unwrap_or_default();
        self.bone_poses = bones.iter().map(|b| b.initial_transform()).collect();

        let has_unmapped = (0..mesh.num_geometries()).any(|i| mesh.geometry_bone_mapping(i).is_empty());
        if bones.len() > self.max_skin_matrices && has_unmapped {
            log::warn!(
                "model '{}' has {} bones, only the first {} skin matrices reach unmapped geometries",
                mesh.name(),
                bones.len(),
                self.max_skin_matrices
            );
        }
        if mesh.skeleton().is_none() {
            log::warn!("skinned model bound to '{}' which has no skeleton", mesh.name());
        }

        self.bone_world.clear();
        self.skin_matrices.clear();
        self.geometry_skin_matrices = vec![Vec::new(); mesh.num_geometries()];
        self.model.set_model(mesh);
    }

    pub fn static_model(&self) -> &StaticModel {
        &self.model
    }

    /// Skin matrices are rebuilt from the new transform on the next update.
    pub fn set_world_transform(&mut self, transform: AffineTransform) {
        self.model.set_world_transform(transform);
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

    /// Pose one bone relative to its parent.
    pub fn set_bone_pose(&mut self, index: usize, pose: Transform) -> DrawableResult<()> {
        let count = self.bone_poses.len();
        let slot = self
            .bone_poses
            .get_mut(index)
            .ok_or(DrawableError::BoneIndex { index, count })?;
        *slot = pose.to_affine();
        Ok(())
    }

    /// Skin matrices computed by the last update, in skeleton bone order.
    pub fn skin_matrices(&self) -> &[AffineTransform] {
        &self.skin_matrices
    }

    pub fn bone_world_transform(&self, index: usize) -> Option<&AffineTransform> {
        self.bone_world.get(index)
    }

    fn update_skinning(&mut self) {
        let Some(mesh) = self.model.model() else {
            return;
        };
        let Some(skeleton) = mesh.skeleton() else {
            return;
        };

        skeleton.world_transforms(self.model.world_transform(), &self.bone_poses, &mut self.bone_world);
        self.skin_matrices.clear();
        self.skin_matrices.extend(
            self.bone_world
                .iter()
                .zip(skeleton.bones())
                .map(|(world, bone)| *world * bone.offset_matrix),
        );

        for (index, matrices) in self.geometry_skin_matrices.iter_mut().enumerate() {
            matrices.clear();
            matrices.extend(
                mesh.geometry_bone_mapping(index)
                    .iter()
                    .filter_map(|&bone| self.skin_matrices.get(bone).copied()),
            );
        }
    }

    fn transforms_for(&self, index: usize) -> &[AffineTransform] {
        match self.geometry_skin_matrices.get(index) {
            Some(mapped) if !mapped.is_empty() => mapped,
            _ => {
                let count = self.skin_matrices.len().min(self.max_skin_matrices);
                &self.skin_matrices[..count]
            }
        }
    }
}

impl Drawable for SkinnedModel {
    fn update_batches(&mut self, frame: &FrameInfo) {
        self.model.update_batches(frame);
        self.update_skinning();
    }

    /// Until skin matrices exist (no skeleton, or no update yet) the mesh is
    /// drawn unskinned at its world transform.
    fn collect_batches<'a>(&'a self, frame: &FrameInfo, out: &mut Vec<SourceBatch<'a>>) {
        if self.skin_matrices.is_empty() {
            self.model.collect_batches(frame, out);
            return;
        }
        self.model
            .collect_with(frame, out, GeometryType::Skinned, |index| self.transforms_for(index));
    }

    fn world_bounding_box(&self) -> BoundingBox {
        self.model.world_bounding_box()
    }

    fn distance(&self) -> f32 {
        self.model.distance()
    }

    fn view_mask(&self) -> u32 {
        self.model.view_mask()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{PrimitiveTopology, RecordingDevice, VertexElements};
    use crate::resources::{Bone, GeometryDesc, ModelData, ModelLoader, Skeleton, VertexBufferDesc};
    use glam::{Quat, Vec3};

    fn arm_data(mappings: Vec<Vec<usize>>) -> ModelData {
        let positions = [[0.0f32; 3]; 3];
        let geometry = GeometryDesc {
            vertex_buffers: vec![0],
            topology: PrimitiveTopology::TriangleList,
            vertex_count: 3,
            ..Default::default()
        };
        ModelData {
            name: "arm".to_string(),
            vertex_buffers: vec![VertexBufferDesc {
                data: bytemuck::cast_slice(&positions).to_vec(),
                vertex_count: 3,
                elements: VertexElements::POSITION,
                ..Default::default()
            }],
            geometries: vec![vec![geometry.clone()], vec![geometry]],
            geometry_bone_mappings: mappings,
            skeleton: Some(Skeleton::new(vec![
                Bone::new("shoulder", None),
                Bone::new("elbow", Some(0))
                    .with_initial_pose(Vec3::X, Quat::IDENTITY, Vec3::ONE)
                    .with_offset_matrix(AffineTransform::from_translation(-Vec3::X)),
                Bone::new("wrist", Some(1)).with_initial_pose(Vec3::X, Quat::IDENTITY, Vec3::ONE),
            ])),
            ..Default::default()
        }
    }

    fn skinned_mesh(device: &mut RecordingDevice, mappings: Vec<Vec<usize>>) -> Arc<MeshResource> {
        ModelLoader::load(arm_data(mappings), device, &DrawConfig::default()).unwrap()
    }

    fn skinned(device: &mut RecordingDevice, config: &DrawConfig, mappings: Vec<Vec<usize>>) -> SkinnedModel {
        let fallback = Arc::new(Material::new("skin", device.create_render_pipeline()));
        let mut model = SkinnedModel::new(fallback, config);
        model.set_model(skinned_mesh(device, mappings));
        model
    }

    #[test]
    fn test_bind_pose_skin_matrices() {
        let mut device = RecordingDevice::new();
        let mut model = skinned(&mut device, &DrawConfig::default(), Vec::new());
        model.update_batches(&FrameInfo::default());

        let skin = model.skin_matrices();
        assert_eq!(skin.len(), 3);
        // Offset cancels the bind pose of the elbow.
        assert!(skin[1].abs_diff_eq(&AffineTransform::IDENTITY, 1e-6));
        assert_eq!(
            model.bone_world_transform(2).map(|t| t.translation()),
            Some(Vec3::new(2.0, 0.0, 0.0))
        );
    }

    #[test]
    fn test_skinned_batches_carry_bone_transforms() {
        let mut device = RecordingDevice::new();
        let mut model = skinned(&mut device, &DrawConfig::default(), vec![Vec::new(), vec![2, 0]]);
        model
            .set_bone_pose(0, Transform::from_position(Vec3::Y))
            .unwrap();
        model.update_batches(&FrameInfo::default());

        let mut batches = Vec::new();
        model.collect_batches(&FrameInfo::default(), &mut batches);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.geometry_type == GeometryType::Skinned));
        assert_eq!(batches[0].num_transforms(), 3);
        assert_eq!(batches[1].num_transforms(), 2);
        assert_eq!(batches[1].world_transforms[1].translation(), Vec3::Y);
    }

    #[test]
    fn test_skin_matrix_limit() {
        let mut device = RecordingDevice::new();
        let config = DrawConfig {
            max_skin_matrices: 2,
            ..Default::default()
        };
        let mut model = skinned(&mut device, &config, Vec::new());
        model.update_batches(&FrameInfo::default());

        let mut batches = Vec::new();
        model.collect_batches(&FrameInfo::default(), &mut batches);
        assert_eq!(batches[0].num_transforms(), 2);
    }

    #[test]
    fn test_bone_pose_index_checked() {
        let mut device = RecordingDevice::new();
        let mut model = skinned(&mut device, &DrawConfig::default(), Vec::new());
        assert_eq!(
            model.set_bone_pose(3, Transform::new()),
            Err(DrawableError::BoneIndex { index: 3, count: 3 })
        );
    }

    #[test]
    fn test_unskinned_before_first_update() {
        let mut device = RecordingDevice::new();
        let mut model = skinned(&mut device, &DrawConfig::default(), Vec::new());
        model.set_world_transform(AffineTransform::from_translation(Vec3::Z));

        let mut batches = Vec::new();
        model.collect_batches(&FrameInfo::default(), &mut batches);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.geometry_type == GeometryType::Static));
        assert!(batches.iter().all(|b| b.num_transforms() == 1));
        assert_eq!(batches[0].world_transforms[0].translation(), Vec3::Z);
    }

    #[test]
    fn test_mesh_without_skeleton_draws_static() {
        let mut device = RecordingDevice::new();
        let mut data = arm_data(Vec::new());
        data.skeleton = None;
        let mesh = ModelLoader::load(data, &mut device, &DrawConfig::default()).unwrap();

        let fallback = Arc::new(Material::new("skin", device.create_render_pipeline()));
        let mut model = SkinnedModel::new(fallback, &DrawConfig::default());
        model.set_model(mesh);
        model.update_batches(&FrameInfo::default());
        assert!(model.skin_matrices().is_empty());

        let mut batches = Vec::new();
        model.collect_batches(&FrameInfo::default(), &mut batches);
        assert_eq!(batches.len(), 2);
        assert!(batches.iter().all(|b| b.geometry_type == GeometryType::Static));
        assert!(batches.iter().all(|b| b.num_transforms() == 1));
    }

    #[test]
    fn test_setters_reach_skinned_batches() {
        let mut device = RecordingDevice::new();
        let mut model = skinned(&mut device, &DrawConfig::default(), Vec::new());
        model.set_world_transform(AffineTransform::from_translation(Vec3::Y));
        model.set_geometry_enabled(1, false).unwrap();
        model.set_view_mask(0b100);
        model.update_batches(&FrameInfo::default());

        assert_eq!(model.view_mask(), 0b100);
        assert_eq!(
            model.bone_world_transform(0).map(|t| t.translation()),
            Some(Vec3::Y)
        );
        let mut batches = Vec::new();
        model.collect_batches(&FrameInfo::default(), &mut batches);
        assert_eq!(batches.len(), 1);
        assert_eq!(batches[0].geometry_type, GeometryType::Skinned);
        let other = Arc::new(Material::new("scales", device.create_render_pipeline()));
        assert!(model.set_material_at(2, other).is_err());
    }
}
