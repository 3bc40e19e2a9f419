//! Scene module - model instances indexed by pipeline and mesh.

mod scene;
mod model;
mod transform;
mod uniform;
mod drawer;
mod updater;

pub use scene::{Scene, SceneVisitor};
pub use model::{Model, ModelDesc, ModelFrame, ModelKey};
pub use transform::Transform;
pub use uniform::{FrameUniforms, UniformBufferObject};
pub use drawer::BatchedDrawer;
pub use updater::UniformUpdater;

#[cfg(test)]
pub(crate) mod scene_fixture;
