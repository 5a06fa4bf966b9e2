//! Backend abstraction layer
//!
//! Provides the draw seam ([`GraphicsDevice`]) and the types every backend
//! shares. Two implementations ship with the crate: a recording device that
//! captures calls, and a wgpu device.

pub mod recording;
pub mod traits;
pub mod types;
#[cfg(feature = "wgpu-backend")]
pub mod wgpu_backend;

pub use recording::{DeviceCall, RecordingDevice};
pub use traits::*;
pub use types::*;
#[cfg(feature = "wgpu-backend")]
pub use wgpu_backend::{WgpuDevice, TRANSFORM_BIND_GROUP};
