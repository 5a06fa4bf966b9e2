//! Materials: the render state a batch binds before drawing

use bytemuck::{Pod, Zeroable};
use glam::Vec4;

use crate::backend::{BindGroupHandle, GeometryType, GraphicsDevice, RenderPipelineHandle};
use crate::math::AffineTransform;

/// Bind group index used for material parameters.
pub const MATERIAL_BIND_GROUP: u32 = 1;

/// A pipeline plus its parameter bind group.
///
/// The parameter system itself lives outside this crate; a material only
/// knows which handles to bind.
#[derive(Debug, Clone)]
pub struct Material {
    pub name: String,
    pub base_color: Vec4,
    pipeline: RenderPipelineHandle,
    /// Variant of `pipeline` with depth writes disabled, for blended passes.
    no_depth_write_pipeline: Option<RenderPipelineHandle>,
    parameters: Option<BindGroupHandle>,
    depth_write: bool,
    blended: bool,
}

impl Material {
    pub fn new(name: &str, pipeline: RenderPipelineHandle) -> Self {
        Self {
            name: name.to_string(),
            base_color: Vec4::ONE,
            pipeline,
            no_depth_write_pipeline: None,
            parameters: None,
            depth_write: true,
            blended: false,
        }
    }

    pub fn with_base_color(mut self, color: Vec4) -> Self {
        self.base_color = color;
        self
    }

    pub fn with_parameters(mut self, bind_group: BindGroupHandle) -> Self {
        self.parameters = Some(bind_group);
        self
    }

    pub fn with_no_depth_write_pipeline(mut self, pipeline: RenderPipelineHandle) -> Self {
        self.no_depth_write_pipeline = Some(pipeline);
        self
    }

    pub fn with_depth_write(mut self, enabled: bool) -> Self {
        self.depth_write = enabled;
        self
    }

    /// Mark as alpha blended; blended batches draw back-to-front without
    /// depth writes.
    pub fn with_blending(mut self, blended: bool) -> Self {
        self.blended = blended;
        self
    }

    pub fn pipeline(&self) -> RenderPipelineHandle {
        self.pipeline
    }

    pub fn parameters(&self) -> Option<BindGroupHandle> {
        self.parameters
    }

    pub fn depth_write(&self) -> bool {
        self.depth_write
    }

    pub fn is_blended(&self) -> bool {
        self.blended
    }

    /// Bind everything a draw with this material needs: pipeline, parameters,
    /// the batch transforms and the effective depth write mask.
    pub fn bind_for_draw<D: GraphicsDevice + ?Sized>(
        &self,
        device: &mut D,
        transforms: &[AffineTransform],
        geometry_type: GeometryType,
        allow_depth_write: bool,
    ) {
        let depth_write = self.depth_write && allow_depth_write;
        let pipeline = match self.no_depth_write_pipeline {
            Some(pipeline) if !depth_write => pipeline,
            _ => self.pipeline,
        };

        device.set_render_pipeline(pipeline);
        if let Some(parameters) = self.parameters {
            device.set_bind_group(MATERIAL_BIND_GROUP, parameters);
        }
        device.set_object_transforms(geometry_type, transforms);
        device.set_depth_write(depth_write);
    }
}

/// Material uniform data for GPU
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
pub struct MaterialUniformData {
    pub base_color: Vec4,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{DeviceCall, RecordingDevice};

    #[test]
    fn test_bind_order() {
        let mut device = RecordingDevice::new();
        let pipeline = device.create_render_pipeline();
        let params = device.create_bind_group();
        let material = Material::new("plain", pipeline).with_parameters(params);
        let transforms = [AffineTransform::IDENTITY];

        material.bind_for_draw(&mut device, &transforms, GeometryType::Static, true);

        assert_eq!(
            device.calls(),
            &[
                DeviceCall::SetRenderPipeline(pipeline),
                DeviceCall::SetBindGroup {
                    index: MATERIAL_BIND_GROUP,
                    bind_group: params
                },
                DeviceCall::SetObjectTransforms {
                    geometry_type: GeometryType::Static,
                    transforms: transforms.to_vec()
                },
                DeviceCall::SetDepthWrite(true),
            ]
        );
    }

    #[test]
    fn test_depth_write_mask() {
        let mut device = RecordingDevice::new();
        let pipeline = device.create_render_pipeline();
        let no_depth = device.create_render_pipeline();
        let material = Material::new("glass", pipeline).with_no_depth_write_pipeline(no_depth);

        material.bind_for_draw(&mut device, &[], GeometryType::Static, false);
        assert_eq!(device.calls()[0], DeviceCall::SetRenderPipeline(no_depth));
        assert_eq!(device.calls().last(), Some(&DeviceCall::SetDepthWrite(false)));

        device.clear_calls();
        let opaque = Material::new("decal", pipeline).with_depth_write(false);
        opaque.bind_for_draw(&mut device, &[], GeometryType::Static, true);
        assert_eq!(device.calls().last(), Some(&DeviceCall::SetDepthWrite(false)));
    }
}
