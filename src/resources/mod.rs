//! Resource management
//!
//! Shared GPU buffers, geometry ranges, materials and the mesh resources a
//! [`ModelLoader`] builds from them.

mod buffer;
mod geometry;
mod loader;
mod material;
mod model;
mod morph;
mod skeleton;

pub use buffer::*;
pub use geometry::*;
pub use loader::*;
pub use material::*;
pub use model::*;
pub use morph::*;
pub use skeleton::*;
