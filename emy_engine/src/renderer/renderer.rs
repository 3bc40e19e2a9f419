/// Renderer - frame orchestrator
///
/// Owns the swapchain, the resource registry, the scene and one command list
/// per frame slot, and drives the per-frame cycle:
///
/// 1. flush pending model removals
/// 2. wait for the frame slot's fence
/// 3. acquire a swapchain image
/// 4. write the uniform blocks of the slot
/// 5. record the batched scene draws and the overlay
/// 6. submit, present, advance the slot, wait for the present queue
///
/// The swapchain and every pipeline are recreated when the swapchain is out
/// of date or suboptimal, or when the window reports a resize.

use std::sync::Arc;
use crate::engine::{Engine, RendererSlot};
use crate::error::{Error, Result};
use crate::{engine_bail_warn, engine_debug, engine_info, engine_trace, engine_warn};
use crate::camera::{Camera, Light};
use crate::graphics_device::{
    AcquireResult, ClearValue, CommandList, GraphicsDevice, PolygonMode, Rect2D, ShaderDesc,
    Swapchain, Viewport,
};
use crate::resource::{
    GraphicPipeline, MeshFormat, MeshLoader, PipelineKey, ResourceManager, TextureKey,
    TextureLoader,
};
use crate::scene::{
    BatchedDrawer, FrameUniforms, Model, ModelDesc, ModelKey, Scene, Transform, UniformUpdater,
};
use super::config::RendererConfig;
use super::overlay::Overlay;
use super::surface::WindowSurface;
use super::MAX_FRAMES_IN_FLIGHT;

// ============================================================================
// Frame outcome and statistics
// ============================================================================

/// Result of one `Renderer::present` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// A frame was submitted and presented
    Presented { image_index: u32 },
    /// Nothing was submitted (swapchain out of date or window minimized)
    Skipped,
}

/// Renderer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RendererStats {
    pub frames_presented: u64,
    pub frames_skipped: u64,
    pub swapchain_recreations: u64,
    /// Draw calls recorded by the last presented frame
    pub last_draw_calls: u32,
}

// ============================================================================
// Renderer
// ============================================================================

pub struct Renderer {
    // Declaration order is drop order: GPU objects go before the device
    scene: Scene,
    resources: ResourceManager,
    overlay: Option<Box<dyn Overlay>>,
    command_lists: Vec<Box<dyn CommandList>>,
    swapchain: Box<dyn Swapchain>,
    graphics_device: Arc<dyn GraphicsDevice>,
    camera: Camera,
    light: Light,
    clear_color: [f32; 4],
    clear_depth: f32,
    default_pipeline: Option<PipelineKey>,
    default_normal_texture: Option<TextureKey>,
    frame_slot: usize,
    needs_recreate: bool,
    stats: RendererStats,
    _slot: RendererSlot,
}

impl Renderer {
    /// Create the renderer.
    ///
    /// Only one renderer may be alive at a time.
    ///
    /// # Errors
    ///
    /// `InitializationFailed` if another renderer exists, or any error of the
    /// device while creating the per-slot command lists.
    pub fn new(
        graphics_device: Arc<dyn GraphicsDevice>,
        swapchain: Box<dyn Swapchain>,
        config: RendererConfig,
    ) -> Result<Self> {
        let slot = Engine::claim_renderer_slot()?;

        let command_lists = (0..MAX_FRAMES_IN_FLIGHT)
            .map(|_| graphics_device.create_command_list())
            .collect::<Result<Vec<_>>>()?;

        engine_info!("emy::Renderer",
            "Renderer created ({}x{}, {} swapchain images, {} frames in flight)",
            swapchain.width(), swapchain.height(), swapchain.image_count(), MAX_FRAMES_IN_FLIGHT);

        Ok(Self {
            scene: Scene::new(),
            resources: ResourceManager::new(),
            overlay: None,
            command_lists,
            swapchain,
            graphics_device,
            camera: config.camera,
            light: config.light,
            clear_color: config.clear_color,
            clear_depth: config.clear_depth,
            default_pipeline: None,
            default_normal_texture: None,
            frame_slot: 0,
            needs_recreate: false,
            stats: RendererStats::default(),
            _slot: slot,
        })
    }

    // ===== FRAME =====

    /// Render and present one frame.
    ///
    /// Returns `Skipped` without advancing the frame slot when the swapchain
    /// is out of date at acquire time or the surface has no area. Every other
    /// failure is returned as an error and leaves the renderer unusable.
    pub fn present(&mut self, surface: &mut dyn WindowSurface) -> Result<FrameOutcome> {
        let removed = self.scene.flush_removals();
        if removed > 0 {
            engine_debug!("emy::Renderer", "Flushed {} removed models", removed);
        }

        // A pending recreation reads the current surface extent, which covers
        // a resize reported since
        let resized = surface.take_resized();
        if self.needs_recreate {
            if !self.recreate_swapchain(surface)? {
                self.stats.frames_skipped += 1;
                return Ok(FrameOutcome::Skipped);
            }
        } else if resized {
            self.needs_recreate = true;
        }

        let slot = self.frame_slot;
        self.graphics_device.wait_for_frame(slot)?;

        let image_index = match self.swapchain.acquire_next_image(slot)? {
            AcquireResult::Image { index, suboptimal } => {
                if suboptimal {
                    self.needs_recreate = true;
                }
                index
            }
            AcquireResult::OutOfDate => {
                engine_debug!("emy::Renderer", "Swapchain out of date at acquire, frame skipped");
                self.needs_recreate = true;
                self.stats.frames_skipped += 1;
                return Ok(FrameOutcome::Skipped);
            }
        };

        self.update_uniforms(slot)?;
        let draw_calls = self.record(slot, image_index)?;

        self.graphics_device.submit_frame(
            self.command_lists[slot].as_ref(),
            self.swapchain.as_ref(),
            slot,
        )?;
        let present = self.swapchain.present(image_index, slot)?;

        if present.needs_recreate() {
            self.needs_recreate = true;
        }
        if self.needs_recreate {
            self.recreate_swapchain(surface)?;
        }

        self.frame_slot = (slot + 1) % MAX_FRAMES_IN_FLIGHT;
        self.graphics_device.wait_present_idle()?;

        self.stats.frames_presented += 1;
        self.stats.last_draw_calls = draw_calls;
        engine_trace!("emy::Renderer",
            "Frame presented (image {}, slot {}, {} draws)", image_index, slot, draw_calls);

        Ok(FrameOutcome::Presented { image_index })
    }

    /// Write every model's uniform block for `slot`
    fn update_uniforms(&mut self, slot: usize) -> Result<()> {
        let frame = FrameUniforms::new(
            &self.camera,
            &self.light,
            self.swapchain.width(),
            self.swapchain.height(),
        );
        self.scene.walk(&mut UniformUpdater::new(&frame, slot))
    }

    /// Record the command list of `slot` into the framebuffer of `image_index`.
    ///
    /// Returns the number of scene draw calls.
    fn record(&mut self, slot: usize, image_index: u32) -> Result<u32> {
        let (width, height) = (self.swapchain.width(), self.swapchain.height());
        let clear_values = [
            ClearValue::Color(self.clear_color),
            ClearValue::DepthStencil { depth: self.clear_depth, stencil: 0 },
        ];

        let cmd = self.command_lists[slot].as_mut();
        cmd.begin()?;
        cmd.begin_render_pass(self.swapchain.as_ref(), image_index, &clear_values)?;
        cmd.set_viewport(Viewport::from_extent(width, height))?;
        cmd.set_scissor(Rect2D { x: 0, y: 0, width, height })?;

        let mut drawer = BatchedDrawer::new(&self.resources, &mut *cmd, slot);
        self.scene.walk(&mut drawer)?;
        let draw_calls = drawer.draw_calls();

        if let Some(overlay) = self.overlay.as_mut() {
            overlay.render_into(&mut *cmd)?;
        }

        cmd.end_render_pass()?;
        cmd.end()?;
        Ok(draw_calls)
    }

    /// Recreate the swapchain at the surface extent, then every pipeline.
    ///
    /// Returns `false` and keeps the request pending while the surface has
    /// no area.
    fn recreate_swapchain(&mut self, surface: &dyn WindowSurface) -> Result<bool> {
        let (width, height) = surface.extent();
        if width == 0 || height == 0 {
            engine_trace!("emy::Renderer", "Surface has no area, swapchain recreation deferred");
            return Ok(false);
        }

        self.graphics_device.wait_idle()?;
        self.swapchain.recreate(width, height)?;
        let rebuilt = self.resources.rebuild_pipelines(self.graphics_device.as_ref(), self.swapchain.as_ref())?;

        self.needs_recreate = false;
        self.stats.swapchain_recreations += 1;
        engine_info!("emy::Renderer",
            "Swapchain recreated ({}x{}), {} pipelines rebuilt", width, height, rebuilt);
        Ok(true)
    }

    // ===== SETUP =====

    /// Create shader modules for `stages` and build a pipeline state from them.
    ///
    /// The first pipeline created becomes the default pipeline unless one was
    /// set explicitly.
    pub fn create_pipeline(
        &mut self,
        name: &str,
        stages: &[ShaderDesc],
        polygon_mode: PolygonMode,
    ) -> Result<PipelineKey> {
        let mut pipeline = GraphicPipeline::new(name);
        for desc in stages {
            let shader = self.graphics_device.create_shader(desc.clone())?;
            if !pipeline.add_shader(shader, false) {
                engine_bail_warn!("emy::Renderer",
                    "Pipeline '{}' has two {:?} stages", name, desc.stage);
            }
        }
        pipeline.create(self.graphics_device.as_ref(), self.swapchain.as_ref(), polygon_mode)?;

        let key = self.resources.add_pipeline(pipeline)?;
        if self.default_pipeline.is_none() {
            self.default_pipeline = Some(key);
        }
        engine_info!("emy::Renderer", "Pipeline '{}' created ({:?})", name, polygon_mode);
        Ok(key)
    }

    /// Pipeline used by `load_model` and by descriptors without a pipeline
    pub fn set_default_pipeline(&mut self, key: PipelineKey) -> Result<()> {
        if self.resources.pipeline(key).is_none() {
            engine_bail_warn!("emy::Renderer", "Unknown pipeline {:?}", key);
        }
        self.default_pipeline = Some(key);
        Ok(())
    }

    /// Normal map used by `load_model` and by descriptors without one
    pub fn set_default_normal_texture(&mut self, key: TextureKey) -> Result<()> {
        if self.resources.texture(key).is_none() {
            engine_bail_warn!("emy::Renderer", "Unknown texture {:?}", key);
        }
        self.default_normal_texture = Some(key);
        Ok(())
    }

    /// Set the overlay drawn after the scene each frame
    pub fn set_overlay(&mut self, overlay: Box<dyn Overlay>) {
        self.overlay = Some(overlay);
    }

    /// Remove the overlay
    pub fn clear_overlay(&mut self) -> Option<Box<dyn Overlay>> {
        self.overlay.take()
    }

    /// Set the collaborators that turn asset names into CPU-side data
    pub fn set_asset_loaders(&mut self, meshes: Box<dyn MeshLoader>, textures: Box<dyn TextureLoader>) {
        self.resources.set_mesh_loader(meshes);
        self.resources.set_texture_loader(textures);
    }

    // ===== MODELS =====

    /// Load (or reuse) an OBJ mesh and an albedo texture by name, and insert a
    /// model using the default normal texture and pipeline.
    pub fn load_model(&mut self, mesh_name: &str, texture_name: &str, transform: Transform) -> Result<ModelKey> {
        let device = self.graphics_device.as_ref();
        let mesh = self.resources.load_mesh(device, mesh_name, MeshFormat::Obj)?;
        let albedo = self.resources.load_texture(device, texture_name)?;

        self.add_model(ModelDesc {
            mesh,
            albedo,
            normal: None,
            pipeline: None,
            transform,
        })
    }

    /// Insert a model built from registered resources
    pub fn add_model(&mut self, desc: ModelDesc) -> Result<ModelKey> {
        let normal = desc.normal.or(self.default_normal_texture).ok_or_else(|| {
            engine_warn!("emy::Renderer", "No normal texture given and no default set");
            Error::InvalidState("no default normal texture".to_string())
        })?;
        let pipeline = desc.pipeline.or(self.default_pipeline).ok_or_else(|| {
            engine_warn!("emy::Renderer", "No pipeline given and no default set");
            Error::InvalidState("no default pipeline".to_string())
        })?;

        let model = Model::new(
            self.graphics_device.as_ref(),
            &self.resources,
            desc.mesh,
            desc.albedo,
            normal,
            pipeline,
            desc.transform,
        )?;
        let key = self.scene.add(model);
        engine_debug!("emy::Renderer", "Model {:?} added ({} models)", key, self.scene.model_count());
        Ok(key)
    }

    /// Schedule a model for removal at the start of the next frame.
    ///
    /// Returns `false` for unknown keys and models already scheduled.
    pub fn mark_model_for_removal(&mut self, key: ModelKey) -> bool {
        self.scene.mark_for_removal(key)
    }

    // ===== ACCESSORS =====

    pub fn camera(&self) -> &Camera {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn light(&self) -> &Light {
        &self.light
    }

    pub fn light_mut(&mut self) -> &mut Light {
        &mut self.light
    }

    pub fn clear_color(&self) -> [f32; 4] {
        self.clear_color
    }

    pub fn set_clear_color(&mut self, color: [f32; 4]) {
        self.clear_color = color;
    }

    pub fn resources(&self) -> &ResourceManager {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceManager {
        &mut self.resources
    }

    pub fn scene(&self) -> &Scene {
        &self.scene
    }

    pub fn scene_mut(&mut self) -> &mut Scene {
        &mut self.scene
    }

    pub fn graphics_device(&self) -> &Arc<dyn GraphicsDevice> {
        &self.graphics_device
    }

    pub fn swapchain(&self) -> &dyn Swapchain {
        self.swapchain.as_ref()
    }

    /// Slot the next frame will use
    pub fn frame_slot(&self) -> usize {
        self.frame_slot
    }

    pub fn stats(&self) -> RendererStats {
        self.stats
    }

    /// Block until the device has finished all submitted work
    pub fn wait_idle(&self) -> Result<()> {
        self.graphics_device.wait_idle()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        if let Err(err) = self.graphics_device.wait_idle() {
            crate::engine_error!("emy::Renderer", "wait_idle failed during shutdown: {}", err);
        }
    }
}

#[cfg(test)]
#[path = "renderer_tests.rs"]
mod tests;
