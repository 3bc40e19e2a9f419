//! Asset loader collaborators.
//!
//! The engine never parses asset files itself. Applications plug in a
//! `MeshLoader` and a `TextureLoader` that turn a resource name into CPU-side
//! data; the `ResourceManager` uploads the result and keeps the GPU handle.

use crate::error::Result;
use crate::resource::mesh::Vertex;

/// Source format tag carried by a mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MeshFormat {
    /// Wavefront OBJ file (`<name>.obj`)
    Obj,
    /// Geometry supplied directly by the application
    Raw,
}

/// CPU-side indexed triangle mesh
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    /// Largest index, if any
    pub fn max_index(&self) -> Option<u32> {
        self.indices.iter().copied().max()
    }
}

/// CPU-side RGBA8 image
#[derive(Debug, Clone)]
pub struct ImageData {
    pub width: u32,
    pub height: u32,
    /// Tightly packed RGBA8 rows
    pub pixels: Vec<u8>,
    /// Whether the source image had an alpha channel
    pub has_alpha: bool,
}

/// Turns a mesh name into vertex and index data
pub trait MeshLoader: Send + Sync {
    fn load_mesh(&self, name: &str, format: MeshFormat) -> Result<MeshData>;
}

/// Turns a texture name into RGBA8 pixels
pub trait TextureLoader: Send + Sync {
    fn load_texture(&self, name: &str) -> Result<ImageData>;
}
