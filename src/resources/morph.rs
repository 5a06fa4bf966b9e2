//! Morph targets

use std::sync::Arc;

use crate::backend::VertexElements;

/// Morph data for one vertex buffer.
///
/// `data` holds, per affected vertex, the vertex index (u32) followed by the
/// deltas of each element in `elements`.
#[derive(Debug, Clone)]
pub struct VertexBufferMorph {
    pub vertex_buffer_index: usize,
    pub elements: VertexElements,
    pub vertex_count: u32,
    pub data: Arc<[u8]>,
}

/// A named morph target spanning one or more vertex buffers
#[derive(Debug, Clone, Default)]
pub struct ModelMorph {
    pub name: String,
    pub weight: f32,
    pub buffers: Vec<VertexBufferMorph>,
}

impl ModelMorph {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }

    pub fn with_buffer(mut self, buffer: VertexBufferMorph) -> Self {
        self.buffers.push(buffer);
        self
    }

    /// Expected size of `data` for a buffer morph.
    pub fn expected_data_size(elements: VertexElements, vertex_count: u32) -> usize {
        (4 + elements.vertex_size() as usize) * vertex_count as usize
    }
}
