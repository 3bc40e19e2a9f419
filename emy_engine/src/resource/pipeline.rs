/// Resource-level pipeline state.
///
/// A `GraphicPipeline` accumulates shader stages (at most one per stage
/// type), derives its binding layout from the stage set, and compiles a
/// device pipeline against the current swapchain. The device pipeline is
/// tied to the swapchain's render pass and sample count, so a recreated
/// swapchain requires `rebuild`.

use std::sync::Arc;
use crate::error::{Error, Result};
use crate::engine_error;
use crate::graphics_device::{
    self, BindingLayout, BindingLayoutEntry, BindingType, GraphicsDevice, PipelineDesc,
    PolygonMode, PrimitiveTopology, RasterizationState, DepthState, Shader, ShaderStage,
    ShaderStageFlags, Swapchain,
};
use crate::resource::mesh::Vertex;

/// Texture slots every fragment stage receives (albedo, normal)
pub const FRAGMENT_TEXTURE_SLOTS: u32 = 2;

/// Shader stage set plus the compiled device pipeline
pub struct GraphicPipeline {
    name: String,
    stages: Vec<Arc<dyn Shader>>,
    polygon_mode: PolygonMode,
    binding_layout: Option<Arc<dyn BindingLayout>>,
    graphics_device_pipeline: Option<Arc<dyn graphics_device::Pipeline>>,
}

impl GraphicPipeline {
    /// Create an empty pipeline state
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            stages: Vec::new(),
            polygon_mode: PolygonMode::Fill,
            binding_layout: None,
            graphics_device_pipeline: None,
        }
    }

    // ===== STAGES =====

    /// Add a shader stage.
    ///
    /// Returns `false` and leaves the stage list untouched if a stage of the
    /// same type exists and `replace` is false. With `replace` the existing
    /// stage is swapped in place.
    pub fn add_shader(&mut self, shader: Arc<dyn Shader>, replace: bool) -> bool {
        let stage = shader.stage();
        match self.stages.iter().position(|s| s.stage() == stage) {
            Some(index) if replace => {
                self.stages[index] = shader;
                true
            }
            Some(_) => false,
            None => {
                self.stages.push(shader);
                true
            }
        }
    }

    /// Shader stages in insertion order
    pub fn stages(&self) -> &[Arc<dyn Shader>] {
        &self.stages
    }

    fn has_stage(&self, stage: ShaderStage) -> bool {
        self.stages.iter().any(|s| s.stage() == stage)
    }

    /// Binding slots derived from the stage set.
    ///
    /// Vertex stage: binding 0, uniform buffer. Fragment stage: the next
    /// `FRAGMENT_TEXTURE_SLOTS` bindings, combined image samplers.
    pub fn binding_entries(&self) -> Vec<BindingLayoutEntry> {
        let mut entries = Vec::new();
        if self.has_stage(ShaderStage::Vertex) {
            entries.push(BindingLayoutEntry {
                binding: 0,
                binding_type: BindingType::UniformBuffer,
                stage_flags: ShaderStageFlags::VERTEX,
            });
        }
        if self.has_stage(ShaderStage::Fragment) {
            let first = entries.len() as u32;
            for slot in 0..FRAGMENT_TEXTURE_SLOTS {
                entries.push(BindingLayoutEntry {
                    binding: first + slot,
                    binding_type: BindingType::CombinedImageSampler,
                    stage_flags: ShaderStageFlags::FRAGMENT,
                });
            }
        }
        entries
    }

    // ===== GPU OBJECTS =====

    /// Compile the pipeline for `swapchain` with the given polygon mode.
    ///
    /// Fails if the vertex or fragment stage is missing, or if the device
    /// rejects the layout or pipeline. The binding layout is only recreated
    /// when the stage set changed since the last build.
    pub fn create(
        &mut self,
        graphics_device: &dyn GraphicsDevice,
        swapchain: &dyn Swapchain,
        polygon_mode: PolygonMode,
    ) -> Result<()> {
        if !self.has_stage(ShaderStage::Vertex) || !self.has_stage(ShaderStage::Fragment) {
            engine_error!("emy::GraphicPipeline",
                "Pipeline '{}' needs a vertex and a fragment stage ({} stages)",
                self.name, self.stages.len());
            return Err(Error::InvalidState(format!(
                "pipeline '{}' is missing a vertex or fragment stage", self.name
            )));
        }

        let entries = self.binding_entries();
        let layout = match &self.binding_layout {
            Some(layout) if layout.entries() == entries.as_slice() => layout.clone(),
            _ => graphics_device.create_binding_layout(&entries)?,
        };

        let desc = PipelineDesc {
            stages: &self.stages,
            binding_layout: &layout,
            vertex_layout: Vertex::layout(),
            topology: PrimitiveTopology::TriangleList,
            rasterization: RasterizationState {
                polygon_mode,
                ..Default::default()
            },
            depth: DepthState::default(),
            blend_enable: false,
        };
        let pipeline = graphics_device.create_pipeline(&desc, swapchain)?;

        crate::engine_debug!("emy::GraphicPipeline",
            "Pipeline '{}' built for {}x{}", self.name, swapchain.width(), swapchain.height());

        self.binding_layout = Some(layout);
        self.graphics_device_pipeline = Some(pipeline);
        self.polygon_mode = polygon_mode;
        Ok(())
    }

    /// Recompile with the same stages, layout and polygon mode against a
    /// recreated swapchain. The device must be idle.
    pub fn rebuild(&mut self, graphics_device: &dyn GraphicsDevice, swapchain: &dyn Swapchain) -> Result<()> {
        if self.graphics_device_pipeline.is_none() {
            return Err(Error::InvalidState(format!(
                "pipeline '{}' was never created", self.name
            )));
        }
        self.create(graphics_device, swapchain, self.polygon_mode)
    }

    // ===== ACCESSORS =====

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn polygon_mode(&self) -> PolygonMode {
        self.polygon_mode
    }

    pub fn is_created(&self) -> bool {
        self.graphics_device_pipeline.is_some()
    }

    /// Compiled device pipeline, once created
    pub fn graphics_device_pipeline(&self) -> Option<&Arc<dyn graphics_device::Pipeline>> {
        self.graphics_device_pipeline.as_ref()
    }

    /// Binding layout shared by every binding group of this pipeline
    pub fn binding_layout(&self) -> Option<&Arc<dyn BindingLayout>> {
        self.binding_layout.as_ref()
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
