//! Recording GPU backend for testing and tooling.
//!
//! This backend doesn't perform actual GPU operations. It keeps every buffer
//! it creates in memory and records each state change and draw so callers can
//! inspect exactly what the draw path submitted.

use std::collections::HashMap;

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::math::AffineTransform;

/// A single call received by [`RecordingDevice`].
#[derive(Debug, Clone, PartialEq)]
pub enum DeviceCall {
    SetRenderPipeline(RenderPipelineHandle),
    SetBindGroup {
        index: u32,
        bind_group: BindGroupHandle,
    },
    SetDepthWrite(bool),
    SetObjectTransforms {
        geometry_type: GeometryType,
        transforms: Vec<AffineTransform>,
    },
    SetIndexBuffer {
        buffer: BufferHandle,
        format: IndexFormat,
    },
    SetVertexBuffers {
        buffers: Vec<BufferHandle>,
        element_masks: Vec<VertexElements>,
    },
    DrawIndexed {
        topology: PrimitiveTopology,
        index_start: u32,
        index_count: u32,
        min_vertex: u32,
        vertex_count: u32,
    },
    Draw {
        topology: PrimitiveTopology,
        vertex_start: u32,
        vertex_count: u32,
    },
}

impl DeviceCall {
    pub fn is_draw(&self) -> bool {
        matches!(self, DeviceCall::Draw { .. } | DeviceCall::DrawIndexed { .. })
    }
}

/// Headless device that records calls instead of executing them.
#[derive(Debug, Default)]
pub struct RecordingDevice {
    calls: Vec<DeviceCall>,
    buffers: HashMap<u64, Vec<u8>>,
    next_buffer_id: u64,
    next_pipeline_id: u64,
    next_bind_group_id: u64,
    release_queue: ReleaseQueue,
    /// Remaining successful buffer creations before failures start.
    buffer_budget: Option<usize>,
}

impl RecordingDevice {
    /// Create a new recording device.
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the backend name.
    pub fn name(&self) -> &'static str {
        "Recording Backend"
    }

    /// Fail every buffer creation after `count` successful ones.
    pub fn fail_buffer_creation_after(&mut self, count: usize) {
        self.buffer_budget = Some(count);
    }

    /// Allocate a pipeline handle (stands in for shader program creation).
    pub fn create_render_pipeline(&mut self) -> RenderPipelineHandle {
        self.next_pipeline_id += 1;
        RenderPipelineHandle(self.next_pipeline_id)
    }

    /// Allocate a bind group handle (stands in for parameter upload).
    pub fn create_bind_group(&mut self) -> BindGroupHandle {
        self.next_bind_group_id += 1;
        BindGroupHandle(self.next_bind_group_id)
    }

    /// All recorded calls in submission order.
    pub fn calls(&self) -> &[DeviceCall] {
        &self.calls
    }

    /// Only the draw calls.
    pub fn draw_calls(&self) -> Vec<&DeviceCall> {
        self.calls.iter().filter(|c| c.is_draw()).collect()
    }

    /// Forget recorded calls, keeping buffers alive.
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Number of buffers that exist on the device.
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    /// Contents of a live buffer.
    pub fn buffer_data(&self, buffer: BufferHandle) -> Option<&[u8]> {
        self.buffers.get(&buffer.0).map(Vec::as_slice)
    }
}

impl GraphicsDevice for RecordingDevice {
    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        if let Some(budget) = self.buffer_budget.as_mut() {
            if *budget == 0 {
                return Err(BackendError::BufferCreationFailed(format!(
                    "{:?}: creation budget exhausted",
                    desc.label
                )));
            }
            *budget -= 1;
        }

        log::trace!(
            "RecordingDevice: creating buffer {:?} (size: {})",
            desc.label,
            desc.size
        );
        self.next_buffer_id += 1;
        let id = self.next_buffer_id;
        self.buffers.insert(id, data.to_vec());
        Ok(BufferHandle(id))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if self.buffers.remove(&buffer.0).is_none() {
            log::warn!("RecordingDevice: destroying unknown buffer {}", buffer.0);
        }
    }

    fn release_queue(&self) -> &ReleaseQueue {
        &self.release_queue
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.calls.push(DeviceCall::SetRenderPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        self.calls.push(DeviceCall::SetBindGroup { index, bind_group });
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.calls.push(DeviceCall::SetDepthWrite(enabled));
    }

    fn set_object_transforms(&mut self, geometry_type: GeometryType, transforms: &[AffineTransform]) {
        self.calls.push(DeviceCall::SetObjectTransforms {
            geometry_type,
            transforms: transforms.to_vec(),
        });
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat) {
        self.calls.push(DeviceCall::SetIndexBuffer { buffer, format });
    }

    fn set_vertex_buffers(&mut self, buffers: &[BufferHandle], element_masks: &[VertexElements]) {
        self.calls.push(DeviceCall::SetVertexBuffers {
            buffers: buffers.to_vec(),
            element_masks: element_masks.to_vec(),
        });
    }

    fn draw_indexed(
        &mut self,
        topology: PrimitiveTopology,
        index_start: u32,
        index_count: u32,
        min_vertex: u32,
        vertex_count: u32,
    ) {
        self.calls.push(DeviceCall::DrawIndexed {
            topology,
            index_start,
            index_count,
            min_vertex,
            vertex_count,
        });
    }

    fn draw(&mut self, topology: PrimitiveTopology, vertex_start: u32, vertex_count: u32) {
        self.calls.push(DeviceCall::Draw {
            topology,
            vertex_start,
            vertex_count,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_lifecycle() {
        let mut device = RecordingDevice::new();
        let desc = BufferDescriptor::new(4, BufferUsage::VERTEX);
        let buffer = device.create_buffer_init(&desc, &[1, 2, 3, 4]).unwrap();
        assert_eq!(device.buffer_data(buffer), Some(&[1u8, 2, 3, 4][..]));

        device.release_queue().push(buffer);
        assert_eq!(device.purge_released(), 1);
        assert_eq!(device.live_buffer_count(), 0);
    }

    #[test]
    fn test_creation_budget() {
        let mut device = RecordingDevice::new();
        device.fail_buffer_creation_after(1);
        let desc = BufferDescriptor::new(0, BufferUsage::INDEX);
        assert!(device.create_buffer_init(&desc, &[]).is_ok());
        assert!(matches!(
            device.create_buffer_init(&desc, &[]),
            Err(BackendError::BufferCreationFailed(_))
        ));
    }
}
