/// Scene model instance.
///
/// A Model references one mesh, two textures (albedo, normal) and one
/// pipeline state by key, and owns one uniform buffer plus binding group per
/// frame slot so that a frame in flight never sees writes for the next one.

use std::sync::Arc;
use slotmap::new_key_type;
use crate::error::{Error, Result};
use crate::{engine_bail_warn, engine_err};
use crate::graphics_device::{
    self, BindingGroup, BindingResource, BindingType, Buffer, BufferDesc, BufferUsage,
};
use crate::renderer::MAX_FRAMES_IN_FLIGHT;
use crate::resource::{MeshKey, PipelineKey, ResourceManager, TextureKey};
use super::transform::Transform;
use super::uniform::UniformBufferObject;

// ===== SLOT MAP KEY =====

new_key_type! {
    /// Stable key for a Model within a Scene.
    ///
    /// Stays valid until the model is flushed out of the scene.
    pub struct ModelKey;
}

// ===== DESCRIPTOR =====

/// Everything needed to create a model
#[derive(Debug, Clone, Copy)]
pub struct ModelDesc {
    pub mesh: MeshKey,
    pub albedo: TextureKey,
    /// Normal map; the renderer's default normal texture when `None`
    pub normal: Option<TextureKey>,
    /// Pipeline state; the renderer's default pipeline when `None`
    pub pipeline: Option<PipelineKey>,
    pub transform: Transform,
}

// ===== FRAME DATA =====

/// Per-frame-slot GPU state of a model
pub struct ModelFrame {
    uniform_buffer: Arc<dyn Buffer>,
    binding_group: Arc<dyn BindingGroup>,
}

impl ModelFrame {
    pub fn uniform_buffer(&self) -> &Arc<dyn Buffer> {
        &self.uniform_buffer
    }

    pub fn binding_group(&self) -> &Arc<dyn BindingGroup> {
        &self.binding_group
    }
}

// ===== MODEL =====

pub struct Model {
    key: ModelKey,
    mesh: MeshKey,
    albedo: TextureKey,
    normal: TextureKey,
    pipeline: PipelineKey,
    transform: Transform,
    frames: [ModelFrame; MAX_FRAMES_IN_FLIGHT],
}

impl Model {
    /// Create the uniform buffers and binding groups of a new model.
    ///
    /// The pipeline state must already be created; its binding layout
    /// decides the binding order (uniform buffer, then albedo, then normal).
    pub(crate) fn new(
        graphics_device: &dyn graphics_device::GraphicsDevice,
        resources: &ResourceManager,
        mesh: MeshKey,
        albedo: TextureKey,
        normal: TextureKey,
        pipeline: PipelineKey,
        transform: Transform,
    ) -> Result<Self> {
        if resources.mesh(mesh).is_none() {
            engine_bail_warn!("emy::Model", "Unknown mesh {:?}", mesh);
        }
        let textures = [albedo, normal]
            .iter()
            .map(|&key| match resources.texture(key) {
                Some(texture) => Ok(texture.graphics_device_texture().clone()),
                None => Err(crate::engine_warn_err!("emy::Model", "Unknown texture {:?}", key)),
            })
            .collect::<Result<Vec<_>>>()?;

        let pipeline_state = resources.require_pipeline(pipeline)?;
        let layout = pipeline_state.binding_layout()
            .ok_or_else(|| Error::InvalidState(format!(
                "pipeline '{}' must be created before models use it", pipeline_state.name()
            )))?;

        let mut frames = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
        for _ in 0..MAX_FRAMES_IN_FLIGHT {
            let uniform_buffer = graphics_device.create_buffer(BufferDesc {
                size: std::mem::size_of::<UniformBufferObject>() as u64,
                usage: BufferUsage::Uniform,
            })?;

            let mut next_texture = textures.iter();
            let mut bindings = Vec::with_capacity(layout.entries().len());
            for entry in layout.entries() {
                match entry.binding_type {
                    BindingType::UniformBuffer => {
                        bindings.push(BindingResource::UniformBuffer(uniform_buffer.as_ref()));
                    }
                    BindingType::CombinedImageSampler => {
                        let texture = next_texture.next().ok_or_else(|| engine_err!("emy::Model",
                            "Pipeline '{}' declares more texture slots than a model provides",
                            pipeline_state.name()))?;
                        bindings.push(BindingResource::SampledTexture(texture.as_ref()));
                    }
                }
            }

            let binding_group = graphics_device.create_binding_group(layout, &bindings)?;
            frames.push(ModelFrame { uniform_buffer, binding_group });
        }

        let frames: [ModelFrame; MAX_FRAMES_IN_FLIGHT] = frames
            .try_into()
            .map_err(|_| Error::InvalidState("frame slot count mismatch".to_string()))?;

        Ok(Self {
            key: ModelKey::default(),
            mesh,
            albedo,
            normal,
            pipeline,
            transform,
            frames,
        })
    }

    /// Key assigned by the scene (null until inserted)
    pub fn key(&self) -> ModelKey {
        self.key
    }

    pub(crate) fn set_key(&mut self, key: ModelKey) {
        self.key = key;
    }

    pub fn mesh(&self) -> MeshKey {
        self.mesh
    }

    pub fn albedo(&self) -> TextureKey {
        self.albedo
    }

    pub fn normal(&self) -> TextureKey {
        self.normal
    }

    pub fn pipeline(&self) -> PipelineKey {
        self.pipeline
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        &mut self.transform
    }

    pub fn set_transform(&mut self, transform: Transform) {
        self.transform = transform;
    }

    /// GPU state of frame `slot`
    ///
    /// # Panics
    ///
    /// If `slot >= MAX_FRAMES_IN_FLIGHT`.
    pub fn frame(&self, slot: usize) -> &ModelFrame {
        &self.frames[slot]
    }

    /// Write the uniform block for frame `slot` only
    pub fn write_uniforms(&self, slot: usize, ubo: &UniformBufferObject) -> Result<()> {
        self.frames[slot].uniform_buffer.update(0, bytemuck::bytes_of(ubo))
    }
}

#[cfg(test)]
#[path = "model_tests.rs"]
mod tests;
