//! Resource management module
//!
//! Arena-style storage for meshes, textures and pipeline states.

mod resource_manager;
pub mod loader;
pub mod texture;
pub mod mesh;
pub mod pipeline;

pub use resource_manager::{ResourceManager, MeshKey, TextureKey, PipelineKey};
pub use loader::{MeshFormat, MeshData, ImageData, MeshLoader, TextureLoader};
pub use texture::Texture;
pub use mesh::{Mesh, Vertex};
pub use pipeline::{GraphicPipeline, FRAGMENT_TEXTURE_SLOTS};
