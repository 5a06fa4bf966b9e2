//! Core backend abstraction traits
//!
//! These traits define the draw seam every device implementation must provide.
//! Calls are synchronous from the caller's point of view; any queuing is the
//! device's concern.

use crate::backend::types::*;
use crate::math::AffineTransform;
use parking_lot::Mutex;
use std::sync::Arc;
use thiserror::Error;

/// Backend error type
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("Failed to initialize backend: {0}")]
    InitializationFailed(String),
    #[error("Failed to create device: {0}")]
    DeviceCreationFailed(String),
    #[error("Failed to create buffer: {0}")]
    BufferCreationFailed(String),
    #[error("Out of memory")]
    OutOfMemory,
    #[error("Device lost")]
    DeviceLost,
}

pub type BackendResult<T> = Result<T, BackendError>;

/// Handle to a GPU buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferHandle(pub(crate) u64);

impl BufferHandle {
    pub fn id(&self) -> u64 {
        self.0
    }
}

/// Handle to a render pipeline (a linked shader program plus fixed state)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderPipelineHandle(pub(crate) u64);

/// Handle to a bind group (a set of shader parameters)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BindGroupHandle(pub(crate) u64);

/// Buffers whose last owner went away, waiting to be destroyed.
///
/// Shared buffers can be dropped on any thread, but only the thread owning the
/// device may destroy GPU objects. Dropped buffers push their handle here and
/// the device drains the queue in [`GraphicsDevice::purge_released`].
#[derive(Debug, Clone, Default)]
pub struct ReleaseQueue {
    pending: Arc<Mutex<Vec<BufferHandle>>>,
}

impl ReleaseQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, buffer: BufferHandle) {
        self.pending.lock().push(buffer);
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn drain(&self) -> Vec<BufferHandle> {
        std::mem::take(&mut *self.pending.lock())
    }
}

/// Graphics device draw seam.
///
/// Implementations must be driven from a single thread. State set through the
/// binding calls stays in effect until it is overwritten.
pub trait GraphicsDevice {
    // Resource creation

    /// Create a buffer with initial data
    fn create_buffer_init(&mut self, desc: &BufferDescriptor, data: &[u8])
        -> BackendResult<BufferHandle>;

    /// Destroy a buffer
    fn destroy_buffer(&mut self, buffer: BufferHandle);

    /// Queue receiving buffers released by their last owner
    fn release_queue(&self) -> &ReleaseQueue;

    /// Destroy every buffer released since the previous call.
    fn purge_released(&mut self) -> usize {
        let released = self.release_queue().drain();
        let count = released.len();
        for buffer in released {
            self.destroy_buffer(buffer);
        }
        if count > 0 {
            log::trace!("purged {count} released buffers");
        }
        count
    }

    // Render state

    /// Set the render pipeline
    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle);

    /// Set a bind group
    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle);

    /// Enable or disable depth writes for subsequent draws
    fn set_depth_write(&mut self, enabled: bool);

    /// Upload the transforms read by subsequent draws
    fn set_object_transforms(&mut self, geometry_type: GeometryType, transforms: &[AffineTransform]);

    // Geometry binding and draws

    /// Set index buffer
    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat);

    /// Bind vertex streams to consecutive slots starting at 0
    fn set_vertex_buffers(&mut self, buffers: &[BufferHandle], element_masks: &[VertexElements]);

    /// Draw indexed primitives.
    ///
    /// Indices are absolute positions in the bound vertex streams.
    /// `min_vertex` and `vertex_count` describe the vertex range the indices
    /// reference and are a hint only; they never offset the indices.
    fn draw_indexed(
        &mut self,
        topology: PrimitiveTopology,
        index_start: u32,
        index_count: u32,
        min_vertex: u32,
        vertex_count: u32,
    );

    /// Draw primitives without an index stream
    fn draw(&mut self, topology: PrimitiveTopology, vertex_start: u32, vertex_count: u32);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_queue_drains_once() {
        let queue = ReleaseQueue::new();
        let shared = queue.clone();
        shared.push(BufferHandle(1));
        shared.push(BufferHandle(2));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain(), vec![BufferHandle(1), BufferHandle(2)]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_error_display() {
        let err = BackendError::BufferCreationFailed("too large".to_string());
        assert_eq!(err.to_string(), "Failed to create buffer: too large");
    }
}
