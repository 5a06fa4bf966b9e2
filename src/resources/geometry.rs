//! Geometry ranges: one drawable slice of a mesh
//!
//! A [`GeometryRange`] references one or more shared vertex streams and an
//! optional shared index stream, plus the sub-range of them that makes up one
//! draw. [`GeometryRange::issue_draw`] translates that description into
//! exactly one device draw call, or nothing when the range is empty.

use std::sync::Arc;

use glam::Vec3;
use thiserror::Error;

use crate::backend::{BufferHandle, GraphicsDevice, IndexFormat, PrimitiveTopology, VertexElements};
use crate::math::BoundingBox;
use crate::resources::buffer::{read_index, IndexBuffer, VertexBuffer};

/// Errors from configuring a geometry range
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    #[error("Vertex buffer slot {index} out of range ({count} slots)")]
    SlotOutOfRange { index: usize, count: usize },
    #[error("Indexed draw range requires an index buffer")]
    MissingIndexBuffer,
    #[error("Index range {start}+{count} exceeds index buffer length {len}")]
    IndexRangeOutOfBounds { start: u32, count: u32, len: u32 },
    #[error("Vertex range {start}+{count} exceeds bound vertex streams of {len} vertices")]
    VertexRangeOutOfBounds { start: u32, count: u32, len: u32 },
    #[error("Raw data of {len} bytes is not a multiple of element size {size}")]
    RawDataSize { len: usize, size: u32 },
}

pub type GeometryResult<T> = Result<T, GeometryError>;

/// CPU-side vertex data used instead of the GPU stream's contents.
#[derive(Debug, Clone)]
pub struct RawVertexData {
    pub data: Arc<[u8]>,
    pub vertex_size: u32,
    pub elements: VertexElements,
}

/// CPU-side index data used instead of the index buffer's contents.
#[derive(Debug, Clone)]
pub struct RawIndexData {
    pub data: Arc<[u8]>,
    pub format: IndexFormat,
}

/// Borrowed view of the CPU data behind a range.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawData<'a> {
    pub vertex_data: Option<&'a [u8]>,
    pub vertex_size: u32,
    pub elements: VertexElements,
    pub index_data: Option<&'a [u8]>,
    pub index_format: Option<IndexFormat>,
}

/// One drawable slice over N vertex streams and an optional index stream.
#[derive(Debug, Clone, Default)]
pub struct GeometryRange {
    vertex_buffers: Vec<Option<Arc<VertexBuffer>>>,
    index_buffer: Option<Arc<IndexBuffer>>,
    // Bound streams in slot order, rebuilt when a slot changes.
    stream_handles: Vec<BufferHandle>,
    stream_elements: Vec<VertexElements>,

    topology: PrimitiveTopology,
    index_start: u32,
    index_count: u32,
    vertex_start: u32,
    vertex_count: u32,
    position_buffer_index: usize,
    lod_distance: f32,

    raw_vertex_data: Option<RawVertexData>,
    raw_index_data: Option<RawIndexData>,
}

impl GeometryRange {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resize the vertex stream slot list. New slots start unbound.
    pub fn set_num_vertex_buffers(&mut self, count: usize) {
        self.vertex_buffers.resize(count, None);
        self.refresh_streams();
    }

    pub fn set_vertex_buffer(&mut self, index: usize, buffer: Arc<VertexBuffer>) -> GeometryResult<()> {
        let count = self.vertex_buffers.len();
        let slot = self
            .vertex_buffers
            .get_mut(index)
            .ok_or(GeometryError::SlotOutOfRange { index, count })?;
        *slot = Some(buffer);
        self.refresh_streams();
        Ok(())
    }

    pub fn set_index_buffer(&mut self, buffer: Option<Arc<IndexBuffer>>) {
        self.index_buffer = buffer;
    }

    /// Set the full draw range.
    ///
    /// Indices are absolute vertex positions. For an indexed range
    /// `vertex_start`/`vertex_count` only describe the vertices the indices
    /// reference; for a direct range they are the vertices drawn.
    ///
    /// The index range is validated against the index buffer and the vertex
    /// range against every bound vertex stream, as are the indices themselves
    /// when a shadow copy is available. On error the range is left unchanged.
    pub fn set_draw_range(
        &mut self,
        topology: PrimitiveTopology,
        index_start: u32,
        index_count: u32,
        vertex_start: u32,
        vertex_count: u32,
    ) -> GeometryResult<()> {
        if index_count > 0 {
            let index_buffer = self.check_index_range(index_start, index_count)?;
            if let Some((min, count)) = index_buffer.used_vertex_range(index_start, index_count) {
                self.check_vertex_range(min, count)?;
            }
        }
        if vertex_count > 0 {
            self.check_vertex_range(vertex_start, vertex_count)?;
        }
        self.topology = topology;
        self.index_start = index_start;
        self.index_count = index_count;
        self.vertex_start = vertex_start;
        self.vertex_count = vertex_count;
        Ok(())
    }

    /// Set an indexed draw range and derive the vertex range from the index
    /// data when a shadow copy is available, else use the position stream.
    pub fn set_draw_range_indexed_only(
        &mut self,
        topology: PrimitiveTopology,
        index_start: u32,
        index_count: u32,
    ) -> GeometryResult<()> {
        let index_buffer = self.check_index_range(index_start, index_count)?;
        let (vertex_start, vertex_count) = index_buffer
            .used_vertex_range(index_start, index_count)
            .unwrap_or_else(|| (0, self.position_buffer().map_or(0, |vb| vb.vertex_count())));
        self.set_draw_range(topology, index_start, index_count, vertex_start, vertex_count)
    }

    pub fn set_position_buffer_index(&mut self, index: usize) {
        self.position_buffer_index = index;
    }

    pub fn set_lod_distance(&mut self, distance: f32) {
        self.lod_distance = distance.max(0.0);
    }

    pub fn set_raw_vertex_data(&mut self, data: Arc<[u8]>, elements: VertexElements) -> GeometryResult<()> {
        let size = elements.vertex_size();
        if size == 0 || data.len() % size as usize != 0 {
            return Err(GeometryError::RawDataSize { len: data.len(), size });
        }
        self.raw_vertex_data = Some(RawVertexData {
            data,
            vertex_size: size,
            elements,
        });
        Ok(())
    }

    pub fn set_raw_index_data(&mut self, data: Arc<[u8]>, format: IndexFormat) -> GeometryResult<()> {
        if data.len() % format.size() as usize != 0 {
            return Err(GeometryError::RawDataSize {
                len: data.len(),
                size: format.size(),
            });
        }
        self.raw_index_data = Some(RawIndexData { data, format });
        Ok(())
    }

    pub fn num_vertex_buffers(&self) -> usize {
        self.vertex_buffers.len()
    }

    pub fn vertex_buffer(&self, index: usize) -> Option<&Arc<VertexBuffer>> {
        self.vertex_buffers.get(index)?.as_ref()
    }

    pub fn index_buffer(&self) -> Option<&Arc<IndexBuffer>> {
        self.index_buffer.as_ref()
    }

    pub fn topology(&self) -> PrimitiveTopology {
        self.topology
    }

    pub fn index_start(&self) -> u32 {
        self.index_start
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn vertex_start(&self) -> u32 {
        self.vertex_start
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn position_buffer_index(&self) -> usize {
        self.position_buffer_index
    }

    pub fn lod_distance(&self) -> f32 {
        self.lod_distance
    }

    pub fn is_empty(&self) -> bool {
        self.index_count == 0 && self.vertex_count == 0
    }

    /// Whether a draw goes through the index stream.
    pub fn is_indexed(&self) -> bool {
        self.index_buffer.is_some() && self.index_count > 0
    }

    pub fn primitive_count(&self) -> u32 {
        if self.is_indexed() {
            self.topology.primitive_count(self.index_count)
        } else {
            self.topology.primitive_count(self.vertex_count)
        }
    }

    /// CPU data for the range: raw overrides first, then shadow copies of
    /// the position stream and the index buffer.
    pub fn raw_data(&self) -> RawData<'_> {
        let mut raw = RawData::default();

        if let Some(vertex) = &self.raw_vertex_data {
            raw.vertex_data = Some(&vertex.data[..]);
            raw.vertex_size = vertex.vertex_size;
            raw.elements = vertex.elements;
        } else if let Some(vb) = self.position_buffer() {
            raw.vertex_data = vb.shadow_data();
            raw.vertex_size = vb.vertex_size();
            raw.elements = vb.elements();
        }

        if let Some(index) = &self.raw_index_data {
            raw.index_data = Some(&index.data[..]);
            raw.index_format = Some(index.format);
        } else if let Some(ib) = &self.index_buffer {
            raw.index_data = ib.shadow_data();
            raw.index_format = Some(ib.format());
        }

        raw
    }

    /// Bounding box of the positions this range draws, from CPU data.
    ///
    /// Indexed ranges visit the referenced vertices; direct ranges visit the
    /// vertex range. Returns an undefined box when no position data is
    /// available on the CPU.
    pub fn compute_bounds(&self) -> BoundingBox {
        let raw = self.raw_data();
        let (Some(vertex_data), Some(offset)) =
            (raw.vertex_data, raw.elements.element_offset(VertexElements::POSITION))
        else {
            return BoundingBox::UNDEFINED;
        };
        let stride = raw.vertex_size as usize;
        let position_at = |vertex: u32| -> Option<Vec3> {
            let start = vertex as usize * stride + offset as usize;
            let bytes = vertex_data.get(start..start + 12)?;
            let xyz: [f32; 3] = bytemuck::pod_read_unaligned(bytes);
            Some(Vec3::from_array(xyz))
        };

        match (raw.index_data, raw.index_format) {
            (Some(index_data), Some(format)) if self.index_count > 0 => BoundingBox::from_points(
                (self.index_start..self.index_start.saturating_add(self.index_count))
                    .filter_map(|i| read_index(index_data, format, i))
                    .filter_map(position_at),
            ),
            _ => {
                let (start, count) = if self.vertex_count > 0 {
                    (self.vertex_start, self.vertex_count)
                } else {
                    (0, (vertex_data.len() / stride.max(1)) as u32)
                };
                BoundingBox::from_points((start..start.saturating_add(count)).filter_map(position_at))
            }
        }
    }

    /// Issue this range to the device as one draw call.
    ///
    /// Binds the index stream (indexed path only) and the vertex streams,
    /// leaving them bound afterwards. The indexed path passes `vertex_start`
    /// as the minimum referenced vertex, never as an offset added to the
    /// indices. An empty range issues nothing.
    pub fn issue_draw<D: GraphicsDevice + ?Sized>(&self, device: &mut D) {
        if self.is_empty() {
            return;
        }
        if self.stream_handles.is_empty() {
            log::warn!("geometry range has no vertex streams bound, skipping draw");
            return;
        }

        match &self.index_buffer {
            Some(index_buffer) if self.index_count > 0 => {
                device.set_index_buffer(index_buffer.handle(), index_buffer.format());
                device.set_vertex_buffers(&self.stream_handles, &self.stream_elements);
                device.draw_indexed(
                    self.topology,
                    self.index_start,
                    self.index_count,
                    self.vertex_start,
                    self.vertex_count,
                );
            }
            _ if self.vertex_count > 0 => {
                device.set_vertex_buffers(&self.stream_handles, &self.stream_elements);
                device.draw(self.topology, self.vertex_start, self.vertex_count);
            }
            _ => log::trace!("indexed range without index buffer, skipping draw"),
        }
    }

    fn position_buffer(&self) -> Option<&Arc<VertexBuffer>> {
        self.vertex_buffer(self.position_buffer_index)
    }

    fn check_index_range(&self, start: u32, count: u32) -> GeometryResult<&Arc<IndexBuffer>> {
        let index_buffer = self.index_buffer.as_ref().ok_or(GeometryError::MissingIndexBuffer)?;
        let len = index_buffer.index_count();
        if start.checked_add(count).map_or(true, |end| end > len) {
            return Err(GeometryError::IndexRangeOutOfBounds { start, count, len });
        }
        Ok(index_buffer)
    }

    /// Vertex range against the shortest bound stream. Passes when no
    /// stream is bound yet.
    fn check_vertex_range(&self, start: u32, count: u32) -> GeometryResult<()> {
        let Some(len) = self.vertex_buffers.iter().flatten().map(|vb| vb.vertex_count()).min() else {
            return Ok(());
        };
        if start.checked_add(count).map_or(true, |end| end > len) {
            return Err(GeometryError::VertexRangeOutOfBounds { start, count, len });
        }
        Ok(())
    }

    fn refresh_streams(&mut self) {
        self.stream_handles.clear();
        self.stream_elements.clear();
        for buffer in self.vertex_buffers.iter().flatten() {
            self.stream_handles.push(buffer.handle());
            self.stream_elements.push(buffer.elements());
        }
    }
}
