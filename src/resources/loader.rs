//! Staged model loading
//!
//! A [`ModelLoader`] walks a mesh through an explicit state machine:
//!
//! ```text
//! Empty -> BuffersStaged -> BuffersRealized -> GeometriesBuilt
//!       -> { morphs, skeleton, bounds attached in any order } -> Ready
//! ```
//!
//! Any error moves the loader to the terminal `Failed` state. Staging only
//! touches CPU memory and may run on a worker thread; realizing buffers and
//! every later stage run on the thread that owns the device. Buffers realized
//! by a load that never reaches `Ready` are released when the loader is
//! cancelled or dropped.

use std::sync::Arc;

use glam::Vec3;
use thiserror::Error;

use crate::backend::{BackendError, GraphicsDevice, IndexFormat, PrimitiveTopology, VertexElements};
use crate::math::BoundingBox;
use crate::resources::buffer::{IndexBuffer, VertexBuffer};
use crate::resources::geometry::{GeometryError, GeometryRange};
use crate::resources::model::MeshResource;
use crate::resources::morph::ModelMorph;
use crate::resources::skeleton::Skeleton;
use crate::DrawConfig;

/// Staged vertex stream payload.
#[derive(Debug, Clone, Default)]
pub struct VertexBufferDesc {
    pub data: Vec<u8>,
    pub vertex_count: u32,
    pub elements: VertexElements,
    /// Vertex range touched by morph targets.
    pub morph_range_start: u32,
    pub morph_range_count: u32,
}

/// Staged index stream payload.
#[derive(Debug, Clone, Default)]
pub struct IndexBufferDesc {
    pub data: Vec<u8>,
    pub index_count: u32,
    /// Bytes per index, 2 or 4.
    pub index_size: u32,
}

/// Descriptor of one geometry range, referencing staged buffers by index.
#[derive(Debug, Clone, Default)]
pub struct GeometryDesc {
    pub vertex_buffers: Vec<usize>,
    pub index_buffer: Option<usize>,
    pub topology: PrimitiveTopology,
    pub index_start: u32,
    pub index_count: u32,
    pub vertex_start: u32,
    pub vertex_count: u32,
    /// Slot within `vertex_buffers` holding positions.
    pub position_buffer_index: usize,
    pub lod_distance: f32,
}

/// Everything a model load consumes.
#[derive(Debug, Clone, Default)]
pub struct ModelData {
    pub name: String,
    pub vertex_buffers: Vec<VertexBufferDesc>,
    pub index_buffers: Vec<IndexBufferDesc>,
    /// One entry per sub-mesh, one descriptor per LOD level.
    pub geometries: Vec<Vec<GeometryDesc>>,
    pub geometry_names: Vec<String>,
    pub geometry_bone_mappings: Vec<Vec<usize>>,
    /// Precomputed per-geometry centers; computed when empty.
    pub geometry_centers: Vec<Vec3>,
    /// Precomputed bounds; computed when absent.
    pub bounding_box: Option<BoundingBox>,
    pub morphs: Vec<ModelMorph>,
    pub skeleton: Option<Skeleton>,
}

/// Optional stages completed after geometries are built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Attachments {
    pub morphs: bool,
    pub skeleton: bool,
    pub bounds: bool,
}

impl Attachments {
    pub fn is_complete(&self) -> bool {
        self.morphs && self.skeleton && self.bounds
    }
}

/// Model load state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Empty,
    BuffersStaged,
    BuffersRealized,
    GeometriesBuilt(Attachments),
    Ready,
    Failed,
}

/// Model load error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LoadError {
    #[error("Cannot {operation} in state {state:?}")]
    InvalidState {
        operation: &'static str,
        state: LoadState,
    },
    #[error("Vertex buffer {index}: {len} bytes of data, expected {expected}")]
    VertexDataSize { index: usize, len: usize, expected: usize },
    #[error("Index buffer {index}: unsupported index size {size}")]
    IndexSize { index: usize, size: u32 },
    #[error("Index buffer {index}: {len} bytes of data, expected {expected}")]
    IndexDataSize { index: usize, len: usize, expected: usize },
    #[error("Geometry {geometry} LOD {lod}: vertex buffer {index} out of range ({count} buffers)")]
    VertexBufferIndex {
        geometry: usize,
        lod: usize,
        index: usize,
        count: usize,
    },
    #[error("Geometry {geometry} LOD {lod}: index buffer {index} out of range ({count} buffers)")]
    IndexBufferIndex {
        geometry: usize,
        lod: usize,
        index: usize,
        count: usize,
    },
    #[error("Geometry {geometry} LOD {lod}: {source}")]
    Geometry {
        geometry: usize,
        lod: usize,
        #[source]
        source: GeometryError,
    },
    #[error("Morph {morph}: vertex buffer {index} out of range ({count} buffers)")]
    MorphBufferIndex { morph: String, index: usize, count: usize },
    #[error("Morph {morph}: {len} bytes of data, expected {expected}")]
    MorphDataSize { morph: String, len: usize, expected: usize },
    #[error("Bone {bone}: parent must precede it")]
    BoneParent { bone: usize },
    #[error("Geometry {geometry}: bone mapping entry {bone} out of range ({count} bones)")]
    BoneMapping { geometry: usize, bone: usize, count: usize },
    #[error("Device error: {0}")]
    Backend(#[from] BackendError),
}

pub type LoadResult<T> = Result<T, LoadError>;

/// Drives one model through the load state machine.
#[derive(Debug, Default)]
pub struct ModelLoader {
    state: LoadState,
    shadow_buffers: bool,
    staged: ModelData,
    mesh: MeshResource,
}

impl ModelLoader {
    pub fn new() -> Self {
        Self::from_config(&DrawConfig::default())
    }

    pub fn from_config(config: &DrawConfig) -> Self {
        let mut loader = Self::default();
        loader.shadow_buffers = config.shadow_buffers;
        loader
    }

    /// Run every stage in order on the current thread.
    pub fn load<D: GraphicsDevice + ?Sized>(
        data: ModelData,
        device: &mut D,
        config: &DrawConfig,
    ) -> LoadResult<Arc<MeshResource>> {
        let mut loader = Self::from_config(config);
        loader.stage(data)?;
        loader.realize_buffers(device)?;
        loader.build_geometries()?;
        loader.attach_morphs()?;
        loader.attach_skeleton()?;
        loader.compute_bounds()?;
        loader.finish()
    }

    pub fn state(&self) -> LoadState {
        self.state
    }

    pub fn is_failed(&self) -> bool {
        self.state == LoadState::Failed
    }

    /// Validate and hold the CPU payloads. Touches no device state.
    pub fn stage(&mut self, data: ModelData) -> LoadResult<()> {
        self.expect_state(LoadState::Empty, "stage buffers")?;

        for (index, vb) in data.vertex_buffers.iter().enumerate() {
            let expected = vb.vertex_count as usize * vb.elements.vertex_size() as usize;
            if vb.data.len() != expected {
                return self.fail(LoadError::VertexDataSize {
                    index,
                    len: vb.data.len(),
                    expected,
                });
            }
        }
        for (index, ib) in data.index_buffers.iter().enumerate() {
            if IndexFormat::from_index_size(ib.index_size).is_none() {
                return self.fail(LoadError::IndexSize {
                    index,
                    size: ib.index_size,
                });
            }
            let expected = ib.index_count as usize * ib.index_size as usize;
            if ib.data.len() != expected {
                return self.fail(LoadError::IndexDataSize {
                    index,
                    len: ib.data.len(),
                    expected,
                });
            }
        }

        log::debug!(
            "staged model '{}': {} vertex buffers, {} index buffers, {} geometries",
            data.name,
            data.vertex_buffers.len(),
            data.index_buffers.len(),
            data.geometries.len()
        );
        self.staged = data;
        self.state = LoadState::BuffersStaged;
        Ok(())
    }

    /// Create GPU buffers from the staged payloads.
    pub fn realize_buffers<D: GraphicsDevice + ?Sized>(&mut self, device: &mut D) -> LoadResult<()> {
        self.expect_state(LoadState::BuffersStaged, "realize buffers")?;

        let shadow = self.shadow_buffers;
        for vb in std::mem::take(&mut self.staged.vertex_buffers) {
            match VertexBuffer::create(device, &vb.data, vb.vertex_count, vb.elements, shadow) {
                Ok(buffer) => {
                    self.mesh.vertex_buffers.push(Arc::new(buffer));
                    self.mesh.morph_range_starts.push(vb.morph_range_start);
                    self.mesh.morph_range_counts.push(vb.morph_range_count);
                }
                Err(err) => return self.fail(err.into()),
            }
        }
        for ib in std::mem::take(&mut self.staged.index_buffers) {
            let Some(format) = IndexFormat::from_index_size(ib.index_size) else {
                let index = self.mesh.index_buffers.len();
                return self.fail(LoadError::IndexSize {
                    index,
                    size: ib.index_size,
                });
            };
            match IndexBuffer::create(device, &ib.data, format, shadow) {
                Ok(buffer) => self.mesh.index_buffers.push(Arc::new(buffer)),
                Err(err) => return self.fail(err.into()),
            }
        }

        log::debug!(
            "realized {} vertex and {} index buffers",
            self.mesh.vertex_buffers.len(),
            self.mesh.index_buffers.len()
        );
        self.state = LoadState::BuffersRealized;
        Ok(())
    }

    /// Instantiate geometry ranges from their descriptors.
    pub fn build_geometries(&mut self) -> LoadResult<()> {
        self.expect_state(LoadState::BuffersRealized, "build geometries")?;

        let descs = std::mem::take(&mut self.staged.geometries);
        let mut geometries = Vec::with_capacity(descs.len());
        for (geometry, lods) in descs.iter().enumerate() {
            let mut ranges = Vec::with_capacity(lods.len());
            for (lod, desc) in lods.iter().enumerate() {
                match self.build_range(geometry, lod, desc) {
                    Ok(range) => ranges.push(range),
                    Err(err) => return self.fail(err),
                }
            }
            geometries.push(ranges);
        }

        self.mesh.geometries = geometries;
        self.mesh.name = std::mem::take(&mut self.staged.name);
        self.state = LoadState::GeometriesBuilt(Attachments::default());
        log::debug!("built {} geometries for '{}'", self.mesh.geometries.len(), self.mesh.name);
        Ok(())
    }

    /// Validate and attach morph targets.
    pub fn attach_morphs(&mut self) -> LoadResult<()> {
        self.expect_attachment("attach morphs", |a| a.morphs)?;

        let morphs = std::mem::take(&mut self.staged.morphs);
        let count = self.mesh.vertex_buffers.len();
        for morph in &morphs {
            for buffer in &morph.buffers {
                if buffer.vertex_buffer_index >= count {
                    return self.fail(LoadError::MorphBufferIndex {
                        morph: morph.name.clone(),
                        index: buffer.vertex_buffer_index,
                        count,
                    });
                }
                let expected = ModelMorph::expected_data_size(buffer.elements, buffer.vertex_count);
                if buffer.data.len() != expected {
                    return self.fail(LoadError::MorphDataSize {
                        morph: morph.name.clone(),
                        len: buffer.data.len(),
                        expected,
                    });
                }
            }
        }

        self.mesh.morphs = morphs;
        self.mark_attached(|a| a.morphs = true);
        Ok(())
    }

    /// Validate and attach the skeleton and per-geometry bone mappings.
    pub fn attach_skeleton(&mut self) -> LoadResult<()> {
        self.expect_attachment("attach skeleton", |a| a.skeleton)?;

        let skeleton = self.staged.skeleton.take();
        let mappings = std::mem::take(&mut self.staged.geometry_bone_mappings);
        let num_bones = skeleton.as_ref().map_or(0, Skeleton::num_bones);

        if let Some(bone) = skeleton.as_ref().and_then(Skeleton::first_invalid_bone) {
            return self.fail(LoadError::BoneParent { bone });
        }
        for (geometry, mapping) in mappings.iter().enumerate() {
            if let Some(&bone) = mapping.iter().find(|&&bone| bone >= num_bones) {
                return self.fail(LoadError::BoneMapping {
                    geometry,
                    bone,
                    count: num_bones,
                });
            }
        }

        self.mesh.skeleton = skeleton;
        self.mesh.geometry_bone_mappings = mappings;
        self.mark_attached(|a| a.skeleton = true);
        Ok(())
    }

    /// Attach bounds and per-geometry centers, computing any that were not
    /// staged from the LOD 0 ranges' position data.
    pub fn compute_bounds(&mut self) -> LoadResult<()> {
        self.expect_attachment("compute bounds", |a| a.bounds)?;

        let num_geometries = self.mesh.geometries.len();
        let lod0_bounds: Vec<BoundingBox> = self
            .mesh
            .geometries
            .iter()
            .map(|lods| lods.first().map_or(BoundingBox::UNDEFINED, GeometryRange::compute_bounds))
            .collect();

        let centers = std::mem::take(&mut self.staged.geometry_centers);
        self.mesh.geometry_centers = if centers.len() == num_geometries {
            centers
        } else {
            lod0_bounds.iter().map(BoundingBox::center).collect()
        };

        self.mesh.bounding_box = match self.staged.bounding_box.take() {
            Some(bounds) => bounds,
            None => {
                let mut bounds = BoundingBox::UNDEFINED;
                for b in &lod0_bounds {
                    bounds.merge(b);
                }
                if !bounds.is_defined() && num_geometries > 0 {
                    log::warn!(
                        "model '{}' has no CPU position data, bounds left undefined",
                        self.mesh.name
                    );
                }
                bounds
            }
        };

        self.mark_attached(|a| a.bounds = true);
        Ok(())
    }

    /// Attach geometry names and hand out the finished mesh.
    pub fn finish(&mut self) -> LoadResult<Arc<MeshResource>> {
        match self.state {
            LoadState::GeometriesBuilt(attachments) if attachments.is_complete() => {}
            state => {
                return self.fail(LoadError::InvalidState {
                    operation: "finish",
                    state,
                })
            }
        }

        let mut names = std::mem::take(&mut self.staged.geometry_names);
        names.resize(self.mesh.geometries.len(), String::new());
        self.mesh.geometry_names = names;

        self.state = LoadState::Ready;
        log::debug!("model '{}' ready", self.mesh.name);
        Ok(Arc::new(std::mem::take(&mut self.mesh)))
    }

    /// Abandon the load, releasing every realized buffer.
    pub fn cancel(&mut self) {
        if self.state == LoadState::Ready {
            return;
        }
        self.release();
        self.state = LoadState::Failed;
    }

    fn build_range(&self, geometry: usize, lod: usize, desc: &GeometryDesc) -> LoadResult<GeometryRange> {
        let vb_count = self.mesh.vertex_buffers.len();
        let ib_count = self.mesh.index_buffers.len();
        let geometry_err = |source: GeometryError| LoadError::Geometry { geometry, lod, source };

        let mut range = GeometryRange::new();
        range.set_num_vertex_buffers(desc.vertex_buffers.len());
        for (slot, &index) in desc.vertex_buffers.iter().enumerate() {
            let buffer = self.mesh.vertex_buffers.get(index).ok_or(LoadError::VertexBufferIndex {
                geometry,
                lod,
                index,
                count: vb_count,
            })?;
            range.set_vertex_buffer(slot, Arc::clone(buffer)).map_err(geometry_err)?;
        }

        if let Some(index) = desc.index_buffer {
            let buffer = self.mesh.index_buffers.get(index).ok_or(LoadError::IndexBufferIndex {
                geometry,
                lod,
                index,
                count: ib_count,
            })?;
            range.set_index_buffer(Some(Arc::clone(buffer)));
        }

        if !desc.vertex_buffers.is_empty() && desc.position_buffer_index >= desc.vertex_buffers.len() {
            return Err(geometry_err(GeometryError::SlotOutOfRange {
                index: desc.position_buffer_index,
                count: desc.vertex_buffers.len(),
            }));
        }
        range.set_position_buffer_index(desc.position_buffer_index);
        range
            .set_draw_range(
                desc.topology,
                desc.index_start,
                desc.index_count,
                desc.vertex_start,
                desc.vertex_count,
            )
            .map_err(geometry_err)?;
        range.set_lod_distance(desc.lod_distance);
        Ok(range)
    }

    fn expect_state(&mut self, expected: LoadState, operation: &'static str) -> LoadResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            let state = self.state;
            self.fail(LoadError::InvalidState { operation, state })
        }
    }

    fn expect_attachment(
        &mut self,
        operation: &'static str,
        done: impl Fn(&Attachments) -> bool,
    ) -> LoadResult<()> {
        match self.state {
            LoadState::GeometriesBuilt(attachments) if !done(&attachments) => Ok(()),
            state => self.fail(LoadError::InvalidState { operation, state }),
        }
    }

    fn mark_attached(&mut self, mark: impl FnOnce(&mut Attachments)) {
        if let LoadState::GeometriesBuilt(attachments) = &mut self.state {
            mark(attachments);
        }
    }

    fn fail<T>(&mut self, err: LoadError) -> LoadResult<T> {
        log::error!("model load failed: {err}");
        self.release();
        self.state = LoadState::Failed;
        Err(err)
    }

    fn release(&mut self) {
        let released = self.mesh.vertex_buffers.len() + self.mesh.index_buffers.len();
        if released > 0 {
            log::debug!("releasing {released} buffers of unfinished load");
        }
        self.mesh = MeshResource::default();
        self.staged = ModelData::default();
    }
}

impl Drop for ModelLoader {
    fn drop(&mut self) {
        if !matches!(self.state, LoadState::Ready | LoadState::Failed | LoadState::Empty) {
            self.release();
        }
    }
}

static_assertions::assert_impl_all!(ModelLoader: Send);
static_assertions::assert_impl_all!(ModelData: Send);
