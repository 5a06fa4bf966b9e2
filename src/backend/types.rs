//! Common types shared between backends

/// Buffer usage flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferUsage(u32);

impl BufferUsage {
    pub const COPY_SRC: Self = Self(1 << 0);
    pub const COPY_DST: Self = Self(1 << 1);
    pub const INDEX: Self = Self(1 << 2);
    pub const VERTEX: Self = Self(1 << 3);
    pub const UNIFORM: Self = Self(1 << 4);
    pub const STORAGE: Self = Self(1 << 5);

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    pub fn bits(&self) -> u32 {
        self.0
    }
}

impl std::ops::BitOr for BufferUsage {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// Buffer descriptor
#[derive(Debug, Clone)]
pub struct BufferDescriptor {
    pub label: Option<String>,
    pub size: u64,
    pub usage: BufferUsage,
}

impl BufferDescriptor {
    pub fn new(size: u64, usage: BufferUsage) -> Self {
        Self {
            label: None,
            size,
            usage,
        }
    }

    pub fn with_label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }
}

/// Index format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexFormat {
    Uint16,
    Uint32,
}

impl IndexFormat {
    /// Map an index size in bytes to a format.
    pub fn from_index_size(size: u32) -> Option<Self> {
        match size {
            2 => Some(IndexFormat::Uint16),
            4 => Some(IndexFormat::Uint32),
            _ => None,
        }
    }

    pub fn size(&self) -> u32 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// Primitive topology
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    PointList,
    LineList,
    LineStrip,
    #[default]
    TriangleList,
    TriangleStrip,
}

impl PrimitiveTopology {
    /// Number of primitives assembled from `count` vertices or indices.
    pub fn primitive_count(&self, count: u32) -> u32 {
        match self {
            PrimitiveTopology::PointList => count,
            PrimitiveTopology::LineList => count / 2,
            PrimitiveTopology::LineStrip => count.saturating_sub(1),
            PrimitiveTopology::TriangleList => count / 3,
            PrimitiveTopology::TriangleStrip => count.saturating_sub(2),
        }
    }
}

/// Mask of the vertex elements a vertex stream provides.
///
/// Elements are laid out interleaved in declaration order, so the mask alone
/// determines both the vertex size and every element offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct VertexElements(u32);

impl VertexElements {
    pub const NONE: Self = Self(0);
    pub const POSITION: Self = Self(1 << 0);
    pub const NORMAL: Self = Self(1 << 1);
    pub const COLOR: Self = Self(1 << 2);
    pub const TEXCOORD1: Self = Self(1 << 3);
    pub const TEXCOORD2: Self = Self(1 << 4);
    pub const TANGENT: Self = Self(1 << 5);
    pub const BLEND_WEIGHTS: Self = Self(1 << 6);
    pub const BLEND_INDICES: Self = Self(1 << 7);

    const SIZES: [(VertexElements, u32); 8] = [
        (Self::POSITION, 12),
        (Self::NORMAL, 12),
        (Self::COLOR, 4),
        (Self::TEXCOORD1, 8),
        (Self::TEXCOORD2, 8),
        (Self::TANGENT, 16),
        (Self::BLEND_WEIGHTS, 16),
        (Self::BLEND_INDICES, 4),
    ];

    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    pub fn bits(&self) -> u32 {
        self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }

    /// Size in bytes of one interleaved vertex with these elements.
    pub fn vertex_size(&self) -> u32 {
        Self::SIZES
            .iter()
            .filter(|(element, _)| self.contains(*element))
            .map(|(_, size)| size)
            .sum()
    }

    /// Byte offset of `element` within a vertex, if present.
    pub fn element_offset(&self, element: Self) -> Option<u32> {
        if !self.contains(element) {
            return None;
        }
        let mut offset = 0;
        for (candidate, size) in Self::SIZES {
            if candidate == element {
                return Some(offset);
            }
            if self.contains(candidate) {
                offset += size;
            }
        }
        None
    }
}

impl std::ops::BitOr for VertexElements {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

/// How a batch's transforms are interpreted by the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GeometryType {
    /// One world transform.
    #[default]
    Static,
    /// One skin matrix per bone.
    Skinned,
    /// One world transform per instance.
    Instanced,
    /// One world transform, camera-facing geometry.
    Billboard,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vertex_size() {
        assert_eq!(VertexElements::POSITION.vertex_size(), 12);
        let mask = VertexElements::POSITION | VertexElements::NORMAL | VertexElements::TEXCOORD1;
        assert_eq!(mask.vertex_size(), 32);
        assert_eq!(VertexElements::NONE.vertex_size(), 0);
    }

    #[test]
    fn test_element_offset() {
        let mask = VertexElements::POSITION | VertexElements::TEXCOORD1 | VertexElements::TANGENT;
        assert_eq!(mask.element_offset(VertexElements::POSITION), Some(0));
        assert_eq!(mask.element_offset(VertexElements::TEXCOORD1), Some(12));
        assert_eq!(mask.element_offset(VertexElements::TANGENT), Some(20));
        assert_eq!(mask.element_offset(VertexElements::NORMAL), None);
    }

    #[test]
    fn test_primitive_count() {
        assert_eq!(PrimitiveTopology::TriangleList.primitive_count(36), 12);
        assert_eq!(PrimitiveTopology::TriangleStrip.primitive_count(1), 0);
        assert_eq!(PrimitiveTopology::LineStrip.primitive_count(5), 4);
    }

    #[test]
    fn test_index_format() {
        assert_eq!(IndexFormat::from_index_size(2), Some(IndexFormat::Uint16));
        assert_eq!(IndexFormat::from_index_size(4), Some(IndexFormat::Uint32));
        assert_eq!(IndexFormat::from_index_size(3), None);
    }
}
