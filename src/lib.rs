//! Render Geometry - mesh data, drawables and the path from both to GPU draw calls
//!
//! The crate covers the seam between a scene's renderable objects and the
//! graphics device:
//!
//! - **Resources**: shared vertex/index buffers, [`GeometryRange`]s over
//!   them, and [`MeshResource`]s built by a staged [`ModelLoader`]
//! - **Scene**: drawables ([`StaticModel`], [`SkinnedModel`],
//!   [`InstancedModel`]) that emit frame-scoped [`SourceBatch`]es
//! - **Backend**: the [`GraphicsDevice`] draw seam with a recording
//!   implementation and a wgpu implementation
//!
//! A frame updates each visible drawable, collects its batches into a
//! [`BatchQueue`] and issues them against the device:
//!
//! ```no_run
//! # use render_geometry::*;
//! # fn frame(device: &mut impl GraphicsDevice, model: &mut StaticModel, config: &DrawConfig) {
//! let frame = FrameInfo::new(glam::Vec3::new(0.0, 2.0, 10.0), config);
//! model.update_batches(&frame);
//! let queue = BatchQueue::from_drawables([&*model as &dyn Drawable], &frame);
//! queue.draw(device);
//! # }
//! ```

pub mod backend;
pub mod math;
pub mod resources;
pub mod scene;

pub use backend::{GeometryType, GraphicsDevice, RecordingDevice};
#[cfg(feature = "wgpu-backend")]
pub use backend::WgpuDevice;
pub use math::{AffineTransform, BoundingBox};
pub use resources::{
    GeometryRange, LoadError, LoadState, Material, MeshResource, ModelData, ModelLoader,
};
pub use scene::{
    BatchPass, BatchQueue, Drawable, DrawableError, FrameInfo, InstancedModel, SkinnedModel,
    SourceBatch, StaticModel,
};

/// Configuration shared by loaders and drawables
#[derive(Debug, Clone, PartialEq)]
pub struct DrawConfig {
    /// Divides camera distance before LOD selection
    pub lod_bias: f32,
    /// Skin matrices a skinned batch may carry for unmapped geometries
    pub max_skin_matrices: usize,
    /// Keep CPU copies of vertex and index data after upload
    pub shadow_buffers: bool,
    /// Occlusion pass LOD level for new drawables; `None` follows distance
    pub default_occlusion_lod_level: Option<usize>,
}

impl Default for DrawConfig {
    fn default() -> Self {
        Self {
            lod_bias: 1.0,
            max_skin_matrices: 64,
            shadow_buffers: true,
            default_occlusion_lod_level: None,
        }
    }
}
