//! Shared GPU vertex and index buffers
//!
//! Buffers are handed out as `Arc`s and shared by every geometry range that
//! reads them. When the last owner drops a buffer its handle is pushed to the
//! device's [`ReleaseQueue`]; the device destroys it on its own thread.

use crate::backend::{
    BackendResult, BufferDescriptor, BufferHandle, BufferUsage, GraphicsDevice, IndexFormat,
    ReleaseQueue, VertexElements,
};

/// A GPU vertex stream with an interleaved element layout.
#[derive(Debug)]
pub struct VertexBuffer {
    handle: BufferHandle,
    vertex_count: u32,
    elements: VertexElements,
    shadow: Option<Vec<u8>>,
    release: ReleaseQueue,
}

impl VertexBuffer {
    /// Create a vertex buffer on `device` from interleaved `data`.
    ///
    /// With `keep_shadow` a CPU copy of the data is retained for bounds
    /// computation and index range queries.
    pub fn create<D: GraphicsDevice + ?Sized>(
        device: &mut D,
        data: &[u8],
        vertex_count: u32,
        elements: VertexElements,
        keep_shadow: bool,
    ) -> BackendResult<Self> {
        let desc = BufferDescriptor::new(data.len() as u64, BufferUsage::VERTEX | BufferUsage::COPY_DST)
            .with_label("vertex buffer");
        let handle = device.create_buffer_init(&desc, data)?;
        Ok(Self {
            handle,
            vertex_count,
            elements,
            shadow: keep_shadow.then(|| data.to_vec()),
            release: device.release_queue().clone(),
        })
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn vertex_count(&self) -> u32 {
        self.vertex_count
    }

    pub fn elements(&self) -> VertexElements {
        self.elements
    }

    pub fn vertex_size(&self) -> u32 {
        self.elements.vertex_size()
    }

    /// CPU copy of the buffer contents, if one was kept.
    pub fn shadow_data(&self) -> Option<&[u8]> {
        self.shadow.as_deref()
    }
}

impl Drop for VertexBuffer {
    fn drop(&mut self) {
        log::trace!("releasing vertex buffer {}", self.handle.id());
        self.release.push(self.handle);
    }
}

/// A GPU index stream of 16 or 32 bit indices.
#[derive(Debug)]
pub struct IndexBuffer {
    handle: BufferHandle,
    index_count: u32,
    format: IndexFormat,
    shadow: Option<Vec<u8>>,
    release: ReleaseQueue,
}

impl IndexBuffer {
    pub fn create<D: GraphicsDevice + ?Sized>(
        device: &mut D,
        data: &[u8],
        format: IndexFormat,
        keep_shadow: bool,
    ) -> BackendResult<Self> {
        let desc = BufferDescriptor::new(data.len() as u64, BufferUsage::INDEX | BufferUsage::COPY_DST)
            .with_label("index buffer");
        let handle = device.create_buffer_init(&desc, data)?;
        Ok(Self {
            handle,
            index_count: data.len() as u32 / format.size(),
            format,
            shadow: keep_shadow.then(|| data.to_vec()),
            release: device.release_queue().clone(),
        })
    }

    pub fn handle(&self) -> BufferHandle {
        self.handle
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    pub fn format(&self) -> IndexFormat {
        self.format
    }

    pub fn index_size(&self) -> u32 {
        self.format.size()
    }

    pub fn shadow_data(&self) -> Option<&[u8]> {
        self.shadow.as_deref()
    }

    /// Index value at `position`, read from the shadow copy.
    pub fn index_at(&self, position: u32) -> Option<u32> {
        let data = self.shadow.as_deref()?;
        read_index(data, self.format, position)
    }

    /// Smallest vertex range `(start, count)` referenced by
    /// `[start, start + count)` of the index stream.
    ///
    /// Requires the shadow copy; returns `None` without it or when the range
    /// is empty or out of bounds.
    pub fn used_vertex_range(&self, start: u32, count: u32) -> Option<(u32, u32)> {
        let data = self.shadow.as_deref()?;
        if count == 0 || start.checked_add(count)? > self.index_count {
            return None;
        }
        let (min, max) = (start..start + count)
            .filter_map(|i| read_index(data, self.format, i))
            .fold((u32::MAX, 0), |(min, max), index| (min.min(index), max.max(index)));
        Some((min, max - min + 1))
    }
}

impl Drop for IndexBuffer {
    fn drop(&mut self) {
        log::trace!("releasing index buffer {}", self.handle.id());
        self.release.push(self.handle);
    }
}

pub(crate) fn read_index(data: &[u8], format: IndexFormat, position: u32) -> Option<u32> {
    let size = format.size() as usize;
    let offset = position as usize * size;
    let bytes = data.get(offset..offset + size)?;
    Some(match format {
        IndexFormat::Uint16 => u16::from_le_bytes([bytes[0], bytes[1]]) as u32,
        IndexFormat::Uint32 => u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]),
    })
}
