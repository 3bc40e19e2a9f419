/// Central resource registry.
///
/// Owns every mesh, texture and pipeline state in slot-map arenas. All other
/// code refers to resources through the stable keys handed out here; name
/// tables make repeated loads of the same asset return the existing key.

use rustc_hash::FxHashMap;
use slotmap::{new_key_type, SlotMap};
use crate::error::{Error, Result};
use crate::{engine_bail_warn, engine_info};
use crate::graphics_device::GraphicsDevice;
use crate::resource::loader::{ImageData, MeshData, MeshFormat, MeshLoader, TextureLoader};
use crate::resource::mesh::Mesh;
use crate::resource::pipeline::GraphicPipeline;
use crate::resource::texture::Texture;

// ===== SLOT MAP KEYS =====

new_key_type! {
    /// Stable key for a Mesh in the ResourceManager
    pub struct MeshKey;

    /// Stable key for a Texture in the ResourceManager
    pub struct TextureKey;

    /// Stable key for a GraphicPipeline in the ResourceManager
    pub struct PipelineKey;
}

/// Resource registry
pub struct ResourceManager {
    meshes: SlotMap<MeshKey, Mesh>,
    mesh_names: FxHashMap<String, MeshKey>,
    textures: SlotMap<TextureKey, Texture>,
    texture_names: FxHashMap<String, TextureKey>,
    pipelines: SlotMap<PipelineKey, GraphicPipeline>,
    pipeline_names: FxHashMap<String, PipelineKey>,
    mesh_loader: Option<Box<dyn MeshLoader>>,
    texture_loader: Option<Box<dyn TextureLoader>>,
}

impl ResourceManager {
    /// Create an empty registry without loaders
    pub fn new() -> Self {
        Self {
            meshes: SlotMap::with_key(),
            mesh_names: FxHashMap::default(),
            textures: SlotMap::with_key(),
            texture_names: FxHashMap::default(),
            pipelines: SlotMap::with_key(),
            pipeline_names: FxHashMap::default(),
            mesh_loader: None,
            texture_loader: None,
        }
    }

    pub fn set_mesh_loader(&mut self, loader: Box<dyn MeshLoader>) {
        self.mesh_loader = Some(loader);
    }

    pub fn set_texture_loader(&mut self, loader: Box<dyn TextureLoader>) {
        self.texture_loader = Some(loader);
    }

    // ===== MESHES =====

    /// Load a mesh through the mesh loader, or return the key already
    /// registered under `name`
    pub fn load_mesh(
        &mut self,
        graphics_device: &dyn GraphicsDevice,
        name: &str,
        format: MeshFormat,
    ) -> Result<MeshKey> {
        if let Some(&key) = self.mesh_names.get(name) {
            return Ok(key);
        }
        let data = match &self.mesh_loader {
            Some(loader) => loader.load_mesh(name, format)?,
            None => {
                engine_bail_warn!("emy::ResourceManager", "No mesh loader set, cannot load '{}'", name);
            }
        };
        self.add_mesh(graphics_device, name, format, &data)
    }

    /// Upload caller-provided geometry under a new name
    pub fn add_mesh(
        &mut self,
        graphics_device: &dyn GraphicsDevice,
        name: &str,
        format: MeshFormat,
        data: &MeshData,
    ) -> Result<MeshKey> {
        if self.mesh_names.contains_key(name) {
            engine_bail_warn!("emy::ResourceManager", "Mesh '{}' already registered", name);
        }
        let mesh = Mesh::from_data(graphics_device, name, format, data)?;
        let key = self.meshes.insert(mesh);
        self.mesh_names.insert(name.to_string(), key);
        engine_info!("emy::ResourceManager",
            "Mesh '{}' registered ({} vertices, {} indices)",
            name, data.vertices.len(), data.indices.len());
        Ok(key)
    }

    pub fn mesh(&self, key: MeshKey) -> Option<&Mesh> {
        self.meshes.get(key)
    }

    pub fn mesh_key(&self, name: &str) -> Option<MeshKey> {
        self.mesh_names.get(name).copied()
    }

    pub fn mesh_count(&self) -> usize {
        self.meshes.len()
    }

    // ===== TEXTURES =====

    /// Load a texture (full mip chain) through the texture loader, or return
    /// the key already registered under `name`
    pub fn load_texture(&mut self, graphics_device: &dyn GraphicsDevice, name: &str) -> Result<TextureKey> {
        if let Some(&key) = self.texture_names.get(name) {
            return Ok(key);
        }
        let image = match &self.texture_loader {
            Some(loader) => loader.load_texture(name)?,
            None => {
                engine_bail_warn!("emy::ResourceManager", "No texture loader set, cannot load '{}'", name);
            }
        };
        self.add_texture(graphics_device, name, &image, true)
    }

    /// Upload caller-provided pixels under a new name
    pub fn add_texture(
        &mut self,
        graphics_device: &dyn GraphicsDevice,
        name: &str,
        image: &ImageData,
        generate_mipmaps: bool,
    ) -> Result<TextureKey> {
        if self.texture_names.contains_key(name) {
            engine_bail_warn!("emy::ResourceManager", "Texture '{}' already registered", name);
        }
        let texture = Texture::from_image(graphics_device, name, image, generate_mipmaps)?;
        let mip_levels = texture.mip_levels();
        let key = self.textures.insert(texture);
        self.texture_names.insert(name.to_string(), key);
        engine_info!("emy::ResourceManager",
            "Texture '{}' registered ({}x{}, {} mips)", name, image.width, image.height, mip_levels);
        Ok(key)
    }

    pub fn texture(&self, key: TextureKey) -> Option<&Texture> {
        self.textures.get(key)
    }

    pub fn texture_key(&self, name: &str) -> Option<TextureKey> {
        self.texture_names.get(name).copied()
    }

    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    // ===== PIPELINES =====

    /// Register a pipeline state under its name
    pub fn add_pipeline(&mut self, pipeline: GraphicPipeline) -> Result<PipelineKey> {
        if self.pipeline_names.contains_key(pipeline.name()) {
            engine_bail_warn!("emy::ResourceManager", "Pipeline '{}' already registered", pipeline.name());
        }
        let name = pipeline.name().to_string();
        let key = self.pipelines.insert(pipeline);
        self.pipeline_names.insert(name, key);
        Ok(key)
    }

    pub fn pipeline(&self, key: PipelineKey) -> Option<&GraphicPipeline> {
        self.pipelines.get(key)
    }

    pub fn pipeline_mut(&mut self, key: PipelineKey) -> Option<&mut GraphicPipeline> {
        self.pipelines.get_mut(key)
    }

    pub fn pipeline_key(&self, name: &str) -> Option<PipelineKey> {
        self.pipeline_names.get(name).copied()
    }

    pub fn pipeline_count(&self) -> usize {
        self.pipelines.len()
    }

    /// Recompile every created pipeline against `swapchain`.
    ///
    /// Returns the number of pipelines rebuilt. The device must be idle.
    pub fn rebuild_pipelines(
        &mut self,
        graphics_device: &dyn GraphicsDevice,
        swapchain: &dyn crate::graphics_device::Swapchain,
    ) -> Result<usize> {
        let mut rebuilt = 0;
        for (_, pipeline) in self.pipelines.iter_mut().filter(|(_, p)| p.is_created()) {
            pipeline.rebuild(graphics_device, swapchain)?;
            rebuilt += 1;
        }
        Ok(rebuilt)
    }

    /// Resolve a pipeline key or fail with `InvalidResource`
    pub(crate) fn require_pipeline(&self, key: PipelineKey) -> Result<&GraphicPipeline> {
        self.pipelines.get(key)
            .ok_or_else(|| Error::InvalidResource(format!("unknown pipeline {:?}", key)))
    }
}

impl Default for ResourceManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "resource_manager_tests.rs"]
mod tests;
