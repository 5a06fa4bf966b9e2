//! Mesh resources: the shared, immutable product of a model load

use std::sync::Arc;

use glam::Vec3;

use crate::math::BoundingBox;
use crate::resources::buffer::{IndexBuffer, VertexBuffer};
use crate::resources::geometry::GeometryRange;
use crate::resources::morph::ModelMorph;
use crate::resources::skeleton::Skeleton;

/// Vertex/index buffers plus the geometry ranges, morphs and skeleton built
/// over them.
///
/// Geometries are grouped per sub-mesh, each with one range per LOD level.
/// Only a [`ModelLoader`](crate::resources::ModelLoader) builds one; once it
/// is handed out it is read-only and shared by any number of drawables.
#[derive(Debug, Default)]
pub struct MeshResource {
    pub(crate) name: String,
    pub(crate) vertex_buffers: Vec<Arc<VertexBuffer>>,
    pub(crate) index_buffers: Vec<Arc<IndexBuffer>>,
    pub(crate) geometries: Vec<Vec<GeometryRange>>,
    pub(crate) geometry_names: Vec<String>,
    pub(crate) geometry_bone_mappings: Vec<Vec<usize>>,
    pub(crate) geometry_centers: Vec<Vec3>,
    pub(crate) morphs: Vec<ModelMorph>,
    pub(crate) morph_range_starts: Vec<u32>,
    pub(crate) morph_range_counts: Vec<u32>,
    pub(crate) skeleton: Option<Skeleton>,
    pub(crate) bounding_box: BoundingBox,
}

impl MeshResource {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn vertex_buffers(&self) -> &[Arc<VertexBuffer>] {
        &self.vertex_buffers
    }

    pub fn index_buffers(&self) -> &[Arc<IndexBuffer>] {
        &self.index_buffers
    }

    /// Number of sub-meshes.
    pub fn num_geometries(&self) -> usize {
        self.geometries.len()
    }

    pub fn num_geometry_lod_levels(&self, index: usize) -> usize {
        self.geometries.get(index).map_or(0, Vec::len)
    }

    /// LOD levels of one sub-mesh, nearest first.
    pub fn geometry_lods(&self, index: usize) -> &[GeometryRange] {
        self.geometries.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn geometry(&self, index: usize, lod: usize) -> Option<&GeometryRange> {
        self.geometries.get(index)?.get(lod)
    }

    pub fn geometry_name(&self, index: usize) -> Option<&str> {
        self.geometry_names.get(index).map(String::as_str)
    }

    /// Sub-mesh index of the geometry called `name`.
    pub fn geometry_by_name(&self, name: &str) -> Option<usize> {
        self.geometry_names.iter().position(|n| n == name)
    }

    /// Skeleton bone index for each local bone index of the geometry, empty
    /// when the geometry uses global bone indices.
    pub fn geometry_bone_mapping(&self, index: usize) -> &[usize] {
        self.geometry_bone_mappings.get(index).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn geometry_center(&self, index: usize) -> Vec3 {
        self.geometry_centers.get(index).copied().unwrap_or(Vec3::ZERO)
    }

    pub fn morphs(&self) -> &[ModelMorph] {
        &self.morphs
    }

    pub fn morph_by_name(&self, name: &str) -> Option<&ModelMorph> {
        self.morphs.iter().find(|m| m.name == name)
    }

    /// First vertex touched by morphs in a vertex buffer.
    pub fn morph_range_start(&self, buffer_index: usize) -> u32 {
        self.morph_range_starts.get(buffer_index).copied().unwrap_or(0)
    }

    /// Number of vertices touched by morphs in a vertex buffer.
    pub fn morph_range_count(&self, buffer_index: usize) -> u32 {
        self.morph_range_counts.get(buffer_index).copied().unwrap_or(0)
    }

    pub fn skeleton(&self) -> Option<&Skeleton> {
        self.skeleton.as_ref()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.bounding_box
    }
}

static_assertions::assert_impl_all!(MeshResource: Send, Sync);
