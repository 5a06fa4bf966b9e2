//! Scene-side drawables and the batches they submit

mod batch;
mod drawable;
mod instanced_model;
mod queue;
mod skinned_model;
mod static_model;
mod transform;

pub use batch::*;
pub use drawable::*;
pub use instanced_model::*;
pub use queue::*;
pub use skinned_model::*;
pub use static_model::*;
pub use transform::*;
