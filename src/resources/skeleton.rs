//! Skeleton: bones in a parent-indexed hierarchy

use glam::{Quat, Vec3};

use crate::math::AffineTransform;

/// One bone of a skeleton
#[derive(Debug, Clone)]
pub struct Bone {
    pub name: String,
    /// Parent bone index. Parents always precede their children.
    pub parent: Option<usize>,
    pub initial_position: Vec3,
    pub initial_rotation: Quat,
    pub initial_scale: Vec3,
    /// Maps model space to bone space in the bind pose.
    pub offset_matrix: AffineTransform,
}

impl Bone {
    pub fn new(name: &str, parent: Option<usize>) -> Self {
        Self {
            name: name.to_string(),
            parent,
            initial_position: Vec3::ZERO,
            initial_rotation: Quat::IDENTITY,
            initial_scale: Vec3::ONE,
            offset_matrix: AffineTransform::IDENTITY,
        }
    }

    pub fn with_initial_pose(mut self, position: Vec3, rotation: Quat, scale: Vec3) -> Self {
        self.initial_position = position;
        self.initial_rotation = rotation;
        self.initial_scale = scale;
        self
    }

    pub fn with_offset_matrix(mut self, offset: AffineTransform) -> Self {
        self.offset_matrix = offset;
        self
    }

    /// Bind pose relative to the parent bone.
    pub fn initial_transform(&self) -> AffineTransform {
        AffineTransform::from_scale_rotation_translation(
            self.initial_scale,
            self.initial_rotation,
            self.initial_position,
        )
    }
}

/// Bone hierarchy of a skinned mesh
#[derive(Debug, Clone, Default)]
pub struct Skeleton {
    bones: Vec<Bone>,
}

impl Skeleton {
    pub fn new(bones: Vec<Bone>) -> Self {
        Self { bones }
    }

    pub fn bones(&self) -> &[Bone] {
        &self.bones
    }

    pub fn num_bones(&self) -> usize {
        self.bones.len()
    }

    pub fn bone(&self, index: usize) -> Option<&Bone> {
        self.bones.get(index)
    }

    pub fn bone_index(&self, name: &str) -> Option<usize> {
        self.bones.iter().position(|b| b.name == name)
    }

    /// First bone without a parent.
    pub fn root_bone_index(&self) -> Option<usize> {
        self.bones.iter().position(|b| b.parent.is_none())
    }

    /// First bone whose parent is out of order or out of range.
    pub fn first_invalid_bone(&self) -> Option<usize> {
        self.bones
            .iter()
            .enumerate()
            .find(|(index, bone)| bone.parent.is_some_and(|parent| parent >= *index))
            .map(|(index, _)| index)
    }

    /// Bone world transforms from per-bone local poses, parents first.
    ///
    /// `local_poses` must hold one transform per bone; missing entries fall
    /// back to the bind pose.
    pub fn world_transforms(
        &self,
        root: &AffineTransform,
        local_poses: &[AffineTransform],
        out: &mut Vec<AffineTransform>,
    ) {
        out.clear();
        for (index, bone) in self.bones.iter().enumerate() {
            let local = local_poses
                .get(index)
                .copied()
                .unwrap_or_else(|| bone.initial_transform());
            let parent = bone.parent.and_then(|p| out.get(p)).copied().unwrap_or(*root);
            out.push(parent * local);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> Skeleton {
        Skeleton::new(vec![
            Bone::new("root", None),
            Bone::new("spine", Some(0)).with_initial_pose(Vec3::Y, Quat::IDENTITY, Vec3::ONE),
            Bone::new("head", Some(1)).with_initial_pose(Vec3::Y, Quat::IDENTITY, Vec3::ONE),
        ])
    }

    #[test]
    fn test_world_transforms_follow_hierarchy() {
        let skeleton = chain();
        let root = AffineTransform::from_translation(Vec3::X);
        let mut world = Vec::new();
        skeleton.world_transforms(&root, &[], &mut world);

        assert_eq!(world.len(), 3);
        assert_eq!(world[2].translation(), Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_invalid_parent_order() {
        let mut skeleton = chain();
        assert_eq!(skeleton.first_invalid_bone(), None);
        skeleton.bones[0].parent = Some(2);
        assert_eq!(skeleton.first_invalid_bone(), Some(0));
    }

    #[test]
    fn test_lookup() {
        let skeleton = chain();
        assert_eq!(skeleton.bone_index("head"), Some(2));
        assert_eq!(skeleton.root_bone_index(), Some(0));
        assert!(skeleton.bone(3).is_none());
    }
}
