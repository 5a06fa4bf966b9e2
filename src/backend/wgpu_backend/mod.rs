//! wgpu backend implementation
//!
//! Draw-path calls are buffered as [`RenderCommand`]s and replayed into a
//! `wgpu::RenderPass` owned by the caller. Object transforms for the whole
//! frame are packed into one storage buffer; each draw selects its window of
//! transforms through the instance range, so shaders read
//! `transforms[instance_index]` (skinned shaders add the bone index to the
//! first instance).

use crate::backend::traits::*;
use crate::backend::types::*;
use crate::math::AffineTransform;
use std::collections::HashMap;
use std::ops::Range;
use wgpu::util::DeviceExt;

/// Bind group index reserved for the per-frame transform buffer.
pub const TRANSFORM_BIND_GROUP: u32 = 0;

/// Buffered render pass command
#[derive(Clone, Debug)]
enum RenderCommand {
    SetPipeline(RenderPipelineHandle),
    SetBindGroup { index: u32, bind_group: BindGroupHandle },
    SetVertexBuffer { slot: u32, buffer: BufferHandle },
    SetIndexBuffer { buffer: BufferHandle, format: IndexFormat },
    Draw { vertices: Range<u32>, instances: Range<u32> },
    DrawIndexed { indices: Range<u32>, instances: Range<u32> },
}

/// Storage buffer holding the frame's transforms
struct TransformStorage {
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    capacity: usize,
}

/// wgpu backend implementation
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,

    // Resource storage
    buffers: HashMap<u64, wgpu::Buffer>,
    render_pipelines: HashMap<u64, (wgpu::RenderPipeline, PrimitiveTopology)>,
    bind_groups: HashMap<u64, wgpu::BindGroup>,

    // Handle counters
    next_buffer_id: u64,
    next_render_pipeline_id: u64,
    next_bind_group_id: u64,

    release_queue: ReleaseQueue,

    // Frame recording
    commands: Vec<RenderCommand>,
    transforms: Vec<AffineTransform>,
    instances: Range<u32>,
    current_pipeline: Option<RenderPipelineHandle>,
    depth_write: bool,

    transform_layout: wgpu::BindGroupLayout,
    transform_storage: Option<TransformStorage>,
}

impl WgpuDevice {
    fn convert_buffer_usage(usage: BufferUsage) -> wgpu::BufferUsages {
        let mut result = wgpu::BufferUsages::empty();
        if usage.contains(BufferUsage::COPY_SRC) {
            result |= wgpu::BufferUsages::COPY_SRC;
        }
        if usage.contains(BufferUsage::COPY_DST) {
            result |= wgpu::BufferUsages::COPY_DST;
        }
        if usage.contains(BufferUsage::INDEX) {
            result |= wgpu::BufferUsages::INDEX;
        }
        if usage.contains(BufferUsage::VERTEX) {
            result |= wgpu::BufferUsages::VERTEX;
        }
        if usage.contains(BufferUsage::UNIFORM) {
            result |= wgpu::BufferUsages::UNIFORM;
        }
        if usage.contains(BufferUsage::STORAGE) {
            result |= wgpu::BufferUsages::STORAGE;
        }
        result
    }

    fn convert_index_format(format: IndexFormat) -> wgpu::IndexFormat {
        match format {
            IndexFormat::Uint16 => wgpu::IndexFormat::Uint16,
            IndexFormat::Uint32 => wgpu::IndexFormat::Uint32,
        }
    }

    /// Create a device without a surface, for offscreen rendering and tests.
    pub fn new_headless() -> BackendResult<Self> {
        pollster::block_on(Self::new_headless_async())
    }

    pub async fn new_headless_async() -> BackendResult<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or_else(|| BackendError::InitializationFailed("no suitable adapter".into()))?;

        let info = adapter.get_info();
        log::info!("Using adapter {} ({:?})", info.name, info.backend);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("render-geometry device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                },
                None,
            )
            .await
            .map_err(|e| BackendError::DeviceCreationFailed(e.to_string()))?;

        Ok(Self::from_device(device, queue))
    }

    /// Wrap an existing device and queue.
    pub fn from_device(device: wgpu::Device, queue: wgpu::Queue) -> Self {
        let transform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("object transforms layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        Self {
            device,
            queue,
            buffers: HashMap::new(),
            render_pipelines: HashMap::new(),
            bind_groups: HashMap::new(),
            next_buffer_id: 0,
            next_render_pipeline_id: 0,
            next_bind_group_id: 0,
            release_queue: ReleaseQueue::new(),
            commands: Vec::new(),
            transforms: Vec::new(),
            instances: 0..1,
            current_pipeline: None,
            depth_write: true,
            transform_layout,
            transform_storage: None,
        }
    }

    /// Get reference to the wgpu device
    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    /// Get reference to the wgpu queue
    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Layout pipelines must use at [`TRANSFORM_BIND_GROUP`].
    pub fn transform_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.transform_layout
    }

    /// Look up the wgpu buffer behind a handle.
    pub fn buffer(&self, handle: BufferHandle) -> Option<&wgpu::Buffer> {
        self.buffers.get(&handle.0)
    }

    /// Take ownership of a pipeline built for `topology`.
    pub fn register_render_pipeline(
        &mut self,
        pipeline: wgpu::RenderPipeline,
        topology: PrimitiveTopology,
    ) -> RenderPipelineHandle {
        let id = self.next_render_pipeline_id;
        self.next_render_pipeline_id += 1;
        self.render_pipelines.insert(id, (pipeline, topology));
        RenderPipelineHandle(id)
    }

    /// Take ownership of a parameter bind group.
    pub fn register_bind_group(&mut self, bind_group: wgpu::BindGroup) -> BindGroupHandle {
        let id = self.next_bind_group_id;
        self.next_bind_group_id += 1;
        self.bind_groups.insert(id, bind_group);
        BindGroupHandle(id)
    }

    /// Depth write state requested by the last material bind.
    pub fn depth_write(&self) -> bool {
        self.depth_write
    }

    /// Number of commands recorded since the last reset.
    pub fn recorded_command_count(&self) -> usize {
        self.commands.len()
    }

    /// Upload this frame's transforms. Call once before [`Self::replay`].
    pub fn prepare_frame(&mut self) {
        if self.transforms.is_empty() {
            return;
        }

        let needed = self.transforms.len();
        let grow = self
            .transform_storage
            .as_ref()
            .map_or(true, |storage| storage.capacity < needed);
        if grow {
            let capacity = needed.next_power_of_two().max(64);
            let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("object transforms"),
                size: (capacity * std::mem::size_of::<AffineTransform>()) as u64,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("object transforms"),
                layout: &self.transform_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                }],
            });
            log::debug!("transform storage grown to {capacity} transforms");
            self.transform_storage = Some(TransformStorage {
                buffer,
                bind_group,
                capacity,
            });
        }

        if let Some(storage) = &self.transform_storage {
            self.queue
                .write_buffer(&storage.buffer, 0, bytemuck::cast_slice(&self.transforms));
        }
    }

    /// Execute buffered commands into a render pass.
    pub fn replay<'a>(&'a self, render_pass: &mut wgpu::RenderPass<'a>) {
        if let Some(storage) = &self.transform_storage {
            render_pass.set_bind_group(TRANSFORM_BIND_GROUP, &storage.bind_group, &[]);
        }

        for cmd in &self.commands {
            match cmd {
                RenderCommand::SetPipeline(handle) => {
                    if let Some((pipeline, _)) = self.render_pipelines.get(&handle.0) {
                        render_pass.set_pipeline(pipeline);
                    }
                }
                RenderCommand::SetBindGroup { index, bind_group } => {
                    if let Some(bg) = self.bind_groups.get(&bind_group.0) {
                        render_pass.set_bind_group(*index, bg, &[]);
                    }
                }
                RenderCommand::SetVertexBuffer { slot, buffer } => {
                    if let Some(buf) = self.buffers.get(&buffer.0) {
                        render_pass.set_vertex_buffer(*slot, buf.slice(..));
                    }
                }
                RenderCommand::SetIndexBuffer { buffer, format } => {
                    if let Some(buf) = self.buffers.get(&buffer.0) {
                        render_pass.set_index_buffer(buf.slice(..), Self::convert_index_format(*format));
                    }
                }
                RenderCommand::Draw { vertices, instances } => {
                    render_pass.draw(vertices.clone(), instances.clone());
                }
                RenderCommand::DrawIndexed { indices, instances } => {
                    render_pass.draw_indexed(indices.clone(), 0, instances.clone());
                }
            }
        }
    }

    /// Drop recorded commands and transforms and destroy released buffers.
    pub fn reset_frame(&mut self) {
        self.commands.clear();
        self.transforms.clear();
        self.instances = 0..1;
        self.current_pipeline = None;
        self.purge_released();
    }

    /// Pipelines bake their topology; a draw that disagrees is skipped.
    fn topology_matches(&self, topology: PrimitiveTopology) -> bool {
        let Some(handle) = self.current_pipeline else {
            log::warn!("draw issued with no pipeline bound, skipping");
            return false;
        };
        match self.render_pipelines.get(&handle.0) {
            Some((_, expected)) if *expected == topology => true,
            Some((_, expected)) => {
                log::warn!("draw topology {topology:?} does not match pipeline topology {expected:?}, skipping");
                false
            }
            None => {
                log::warn!("draw issued with unknown pipeline {}, skipping", handle.0);
                false
            }
        }
    }
}

impl GraphicsDevice for WgpuDevice {
    fn create_buffer_init(
        &mut self,
        desc: &BufferDescriptor,
        data: &[u8],
    ) -> BackendResult<BufferHandle> {
        let buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: desc.label.as_deref(),
            contents: data,
            usage: Self::convert_buffer_usage(desc.usage),
        });

        let id = self.next_buffer_id;
        self.next_buffer_id += 1;
        self.buffers.insert(id, buffer);

        Ok(BufferHandle(id))
    }

    fn destroy_buffer(&mut self, buffer: BufferHandle) {
        if let Some(buf) = self.buffers.remove(&buffer.0) {
            buf.destroy();
        }
    }

    fn release_queue(&self) -> &ReleaseQueue {
        &self.release_queue
    }

    fn set_render_pipeline(&mut self, pipeline: RenderPipelineHandle) {
        self.current_pipeline = Some(pipeline);
        self.commands.push(RenderCommand::SetPipeline(pipeline));
    }

    fn set_bind_group(&mut self, index: u32, bind_group: BindGroupHandle) {
        if index == TRANSFORM_BIND_GROUP {
            log::warn!("bind group {index} is reserved for object transforms");
            return;
        }
        self.commands.push(RenderCommand::SetBindGroup { index, bind_group });
    }

    fn set_depth_write(&mut self, enabled: bool) {
        self.depth_write = enabled;
    }

    fn set_object_transforms(&mut self, geometry_type: GeometryType, transforms: &[AffineTransform]) {
        let base = self.transforms.len() as u32;
        self.transforms.extend_from_slice(transforms);
        let count = match geometry_type {
            GeometryType::Instanced => transforms.len() as u32,
            GeometryType::Static | GeometryType::Skinned | GeometryType::Billboard => {
                transforms.len().min(1) as u32
            }
        };
        if count == 0 {
            log::warn!("{geometry_type:?} batch submitted without transforms, its draw is empty");
        }
        self.instances = base..base + count;
    }

    fn set_index_buffer(&mut self, buffer: BufferHandle, format: IndexFormat) {
        self.commands.push(RenderCommand::SetIndexBuffer { buffer, format });
    }

    fn set_vertex_buffers(&mut self, buffers: &[BufferHandle], _element_masks: &[VertexElements]) {
        for (slot, buffer) in buffers.iter().enumerate() {
            self.commands.push(RenderCommand::SetVertexBuffer {
                slot: slot as u32,
                buffer: *buffer,
            });
        }
    }

    fn draw_indexed(
        &mut self,
        topology: PrimitiveTopology,
        index_start: u32,
        index_count: u32,
        _min_vertex: u32,
        _vertex_count: u32,
    ) {
        if !self.topology_matches(topology) {
            return;
        }
        let Some(indices) = checked_range(index_start, index_count) else {
            log::warn!("index range {index_start}+{index_count} overflows, skipping draw");
            return;
        };
        self.commands.push(RenderCommand::DrawIndexed {
            indices,
            instances: self.instances.clone(),
        });
    }

    fn draw(&mut self, topology: PrimitiveTopology, vertex_start: u32, vertex_count: u32) {
        if !self.topology_matches(topology) {
            return;
        }
        let Some(vertices) = checked_range(vertex_start, vertex_count) else {
            log::warn!("vertex range {vertex_start}+{vertex_count} overflows, skipping draw");
            return;
        };
        self.commands.push(RenderCommand::Draw {
            vertices,
            instances: self.instances.clone(),
        });
    }
}

fn checked_range(start: u32, count: u32) -> Option<Range<u32>> {
    Some(start..start.checked_add(count)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checked_range() {
        assert_eq!(checked_range(4, 6), Some(4..10));
        assert_eq!(checked_range(0, 0), Some(0..0));
        assert_eq!(checked_range(u32::MAX, 2), None);
    }
}
