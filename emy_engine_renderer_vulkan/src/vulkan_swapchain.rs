/// Swapchain - Vulkan implementation of the Swapchain trait
///
/// Owns everything that depends on the surface extent: presentable images,
/// the multisampled color and depth attachments, one framebuffer per image.
/// The render pass and per-slot semaphores survive recreation.

use emy_engine::emy::{Result, Error};
use emy_engine::emy::render::{
    Swapchain as RendererSwapchain, AcquireResult, PresentResult, SampleCount, TextureFormat,
};
use emy_engine::emy::renderer::MAX_FRAMES_IN_FLIGHT;
use emy_engine::{engine_info, engine_debug, engine_error, engine_err};
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use gpu_allocator::MemoryLocation;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;
use crate::vulkan_format::{sample_count_to_vk, vk_to_texture_format, has_stencil};

/// Depth formats in order of preference
const DEPTH_FORMAT_CANDIDATES: [vk::Format; 3] = [
    vk::Format::D32_SFLOAT,
    vk::Format::D32_SFLOAT_S8_UINT,
    vk::Format::D24_UNORM_S8_UINT,
];

/// Device-local image used as a render pass attachment
struct Attachment {
    image: vk::Image,
    view: vk::ImageView,
    allocation: Option<Allocation>,
}

impl Attachment {
    unsafe fn destroy(&mut self, ctx: &GpuContext) {
        ctx.device.destroy_image_view(self.view, None);
        if let Some(allocation) = self.allocation.take() {
            ctx.free(allocation);
        }
        ctx.device.destroy_image(self.image, None);
    }
}

/// Vulkan swapchain implementation
pub struct Swapchain {
    ctx: Arc<GpuContext>,

    /// Surface
    surface: vk::SurfaceKHR,
    surface_loader: ash::khr::surface::Instance,

    /// Swapchain
    swapchain: vk::SwapchainKHR,
    swapchain_loader: ash::khr::swapchain::Device,
    swapchain_images: Vec<vk::Image>,
    swapchain_image_views: Vec<vk::ImageView>,
    surface_format: vk::SurfaceFormatKHR,
    format: TextureFormat,
    extent: vk::Extent2D,

    /// Render pass targeting the swapchain images (stable across recreation)
    render_pass: vk::RenderPass,
    sample_count: SampleCount,
    depth_format: vk::Format,

    /// Multisampled color target, `None` when rendering at one sample
    color_target: Option<Attachment>,
    depth_target: Option<Attachment>,
    framebuffers: Vec<vk::Framebuffer>,

    /// One "image available" and one "render finished" semaphore per frame slot
    image_available_semaphores: Vec<vk::Semaphore>,
    render_finished_semaphores: Vec<vk::Semaphore>,
}

impl Swapchain {
    /// Create a new swapchain
    ///
    /// # Arguments
    ///
    /// * `ctx` - Shared GPU context
    /// * `surface` - Window surface (owned by the swapchain from now on)
    /// * `surface_loader` - Surface extension loader
    /// * `width` - Initial width, used when the surface lets the swapchain pick
    /// * `height` - Initial height
    /// * `sample_count` - Sample count of the color and depth attachments
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        surface: vk::SurfaceKHR,
        surface_loader: ash::khr::surface::Instance,
        width: u32,
        height: u32,
        sample_count: SampleCount,
    ) -> Result<Self> {
        let swapchain_loader = ash::khr::swapchain::Device::new(&ctx.instance, &ctx.device);

        let (surface_format, format) = unsafe { Self::choose_surface_format(&ctx, &surface_loader, surface)? };
        let depth_format = unsafe { Self::choose_depth_format(&ctx)? };
        let render_pass = unsafe {
            Self::create_render_pass(&ctx, surface_format.format, depth_format, sample_count)?
        };

        // Construct with empty extent-dependent state, then build it
        let mut swapchain = Self {
            ctx,
            surface,
            surface_loader,
            swapchain: vk::SwapchainKHR::null(),
            swapchain_loader,
            swapchain_images: Vec::new(),
            swapchain_image_views: Vec::new(),
            surface_format,
            format,
            extent: vk::Extent2D { width: 0, height: 0 },
            render_pass,
            sample_count,
            depth_format,
            color_target: None,
            depth_target: None,
            framebuffers: Vec::new(),
            image_available_semaphores: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
            render_finished_semaphores: Vec::with_capacity(MAX_FRAMES_IN_FLIGHT),
        };

        unsafe {
            let semaphore_create_info = vk::SemaphoreCreateInfo::default();
            for _ in 0..MAX_FRAMES_IN_FLIGHT {
                let available = swapchain.ctx.device.create_semaphore(&semaphore_create_info, None)
                    .map_err(|e| {
                        engine_error!("emy::vulkan", "Failed to create image-available semaphore: {:?}", e);
                        Error::InitializationFailed(format!("Failed to create semaphore: {:?}", e))
                    })?;
                swapchain.image_available_semaphores.push(available);

                let finished = swapchain.ctx.device.create_semaphore(&semaphore_create_info, None)
                    .map_err(|e| {
                        engine_error!("emy::vulkan", "Failed to create render-finished semaphore: {:?}", e);
                        Error::InitializationFailed(format!("Failed to create semaphore: {:?}", e))
                    })?;
                swapchain.render_finished_semaphores.push(finished);
            }

            swapchain.build(width, height)?;
        }

        engine_info!("emy::vulkan",
            "Swapchain created: {}x{}, {} images, {:?}, {}x MSAA",
            swapchain.extent.width, swapchain.extent.height,
            swapchain.swapchain_images.len(), swapchain.format, sample_count.count());

        Ok(swapchain)
    }

    /// Render pass all pipelines are compiled against
    pub(crate) fn render_pass(&self) -> vk::RenderPass {
        self.render_pass
    }

    /// Framebuffer of swapchain image `image_index`
    pub(crate) fn framebuffer(&self, image_index: u32) -> Option<vk::Framebuffer> {
        self.framebuffers.get(image_index as usize).copied()
    }

    /// Current image extent
    pub(crate) fn extent(&self) -> vk::Extent2D {
        self.extent
    }

    /// Semaphores of `slot`: (image available, render finished)
    pub(crate) fn sync_info(&self, slot: usize) -> Option<(vk::Semaphore, vk::Semaphore)> {
        Some((
            *self.image_available_semaphores.get(slot)?,
            *self.render_finished_semaphores.get(slot)?,
        ))
    }

    unsafe fn choose_surface_format(
        ctx: &GpuContext,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::SurfaceFormatKHR, TextureFormat)> {
        let surface_formats = surface_loader
            .get_physical_device_surface_formats(ctx.physical_device, surface)
            .map_err(|e| {
                engine_error!("emy::vulkan", "Failed to query surface formats: {:?}", e);
                Error::InitializationFailed(format!("Failed to get surface formats: {:?}", e))
            })?;

        let preferred = surface_formats.iter().find(|f| {
            (f.format == vk::Format::B8G8R8A8_SRGB || f.format == vk::Format::R8G8B8A8_SRGB)
                && f.color_space == vk::ColorSpaceKHR::SRGB_NONLINEAR
        });

        preferred
            .into_iter()
            .chain(surface_formats.iter())
            .find_map(|f| vk_to_texture_format(f.format).map(|format| (*f, format)))
            .ok_or_else(|| {
                engine_error!("emy::vulkan", "Surface offers no supported color format: {:?}", surface_formats);
                Error::InitializationFailed("No supported surface format".to_string())
            })
    }

    unsafe fn choose_depth_format(ctx: &GpuContext) -> Result<vk::Format> {
        DEPTH_FORMAT_CANDIDATES
            .into_iter()
            .find(|&format| {
                ctx.instance
                    .get_physical_device_format_properties(ctx.physical_device, format)
                    .optimal_tiling_features
                    .contains(vk::FormatFeatureFlags::DEPTH_STENCIL_ATTACHMENT)
            })
            .ok_or_else(|| {
                engine_error!("emy::vulkan", "No supported depth attachment format");
                Error::InitializationFailed("No supported depth format".to_string())
            })
    }

    /// Render pass: color (multisampled) + depth, resolved into the swapchain image
    unsafe fn create_render_pass(
        ctx: &GpuContext,
        color_format: vk::Format,
        depth_format: vk::Format,
        sample_count: SampleCount,
    ) -> Result<vk::RenderPass> {
        let samples = sample_count_to_vk(sample_count);
        let multisampled = sample_count != SampleCount::S1;

        let color_attachment = vk::AttachmentDescription::default()
            .format(color_format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(if multisampled { vk::AttachmentStoreOp::DONT_CARE } else { vk::AttachmentStoreOp::STORE })
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(if multisampled {
                vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL
            } else {
                vk::ImageLayout::PRESENT_SRC_KHR
            });

        let depth_attachment = vk::AttachmentDescription::default()
            .format(depth_format)
            .samples(samples)
            .load_op(vk::AttachmentLoadOp::CLEAR)
            .store_op(vk::AttachmentStoreOp::DONT_CARE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);

        let resolve_attachment = vk::AttachmentDescription::default()
            .format(color_format)
            .samples(vk::SampleCountFlags::TYPE_1)
            .load_op(vk::AttachmentLoadOp::DONT_CARE)
            .store_op(vk::AttachmentStoreOp::STORE)
            .stencil_load_op(vk::AttachmentLoadOp::DONT_CARE)
            .stencil_store_op(vk::AttachmentStoreOp::DONT_CARE)
            .initial_layout(vk::ImageLayout::UNDEFINED)
            .final_layout(vk::ImageLayout::PRESENT_SRC_KHR);

        let mut attachments = vec![color_attachment, depth_attachment];
        if multisampled {
            attachments.push(resolve_attachment);
        }

        let color_attachment_ref = vk::AttachmentReference::default()
            .attachment(0)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);
        let depth_attachment_ref = vk::AttachmentReference::default()
            .attachment(1)
            .layout(vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL);
        let resolve_attachment_ref = vk::AttachmentReference::default()
            .attachment(2)
            .layout(vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL);

        let mut subpass = vk::SubpassDescription::default()
            .pipeline_bind_point(vk::PipelineBindPoint::GRAPHICS)
            .color_attachments(std::slice::from_ref(&color_attachment_ref))
            .depth_stencil_attachment(&depth_attachment_ref);
        if multisampled {
            subpass = subpass.resolve_attachments(std::slice::from_ref(&resolve_attachment_ref));
        }

        // Color and depth targets are shared by both frame slots
        let dependency = vk::SubpassDependency::default()
            .src_subpass(vk::SUBPASS_EXTERNAL)
            .dst_subpass(0)
            .src_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS
                    | vk::PipelineStageFlags::LATE_FRAGMENT_TESTS,
            )
            .src_access_mask(vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE)
            .dst_stage_mask(
                vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT
                    | vk::PipelineStageFlags::EARLY_FRAGMENT_TESTS,
            )
            .dst_access_mask(
                vk::AccessFlags::COLOR_ATTACHMENT_WRITE
                    | vk::AccessFlags::DEPTH_STENCIL_ATTACHMENT_WRITE,
            );

        let render_pass_info = vk::RenderPassCreateInfo::default()
            .attachments(&attachments)
            .subpasses(std::slice::from_ref(&subpass))
            .dependencies(std::slice::from_ref(&dependency));

        ctx.device.create_render_pass(&render_pass_info, None)
            .map_err(|e| {
                engine_error!("emy::vulkan", "Failed to create swapchain render pass: {:?}", e);
                Error::InitializationFailed(format!("Failed to create render pass: {:?}", e))
            })
    }

    /// Create swapchain, image views, attachments and framebuffers
    ///
    /// Replaces `self.swapchain` (passed as `old_swapchain`) when not null.
    unsafe fn build(&mut self, width: u32, height: u32) -> Result<()> {
        let surface_capabilities = self.surface_loader
            .get_physical_device_surface_capabilities(self.ctx.physical_device, self.surface)
            .map_err(|e| engine_err!("emy::vulkan", "Failed to get surface capabilities: {:?}", e))?;

        // Choose extent
        let extent = if surface_capabilities.current_extent.width != u32::MAX {
            surface_capabilities.current_extent
        } else {
            vk::Extent2D {
                width: width.clamp(
                    surface_capabilities.min_image_extent.width,
                    surface_capabilities.max_image_extent.width,
                ),
                height: height.clamp(
                    surface_capabilities.min_image_extent.height,
                    surface_capabilities.max_image_extent.height,
                ),
            }
        };

        let image_count = surface_capabilities.min_image_count + 1;
        let image_count = if surface_capabilities.max_image_count > 0 {
            image_count.min(surface_capabilities.max_image_count)
        } else {
            image_count
        };

        let old_swapchain = self.swapchain;
        let swapchain_create_info = vk::SwapchainCreateInfoKHR::default()
            .surface(self.surface)
            .min_image_count(image_count)
            .image_format(self.surface_format.format)
            .image_color_space(self.surface_format.color_space)
            .image_extent(extent)
            .image_array_layers(1)
            .image_usage(vk::ImageUsageFlags::COLOR_ATTACHMENT)
            .image_sharing_mode(vk::SharingMode::EXCLUSIVE)
            .pre_transform(surface_capabilities.current_transform)
            .composite_alpha(vk::CompositeAlphaFlagsKHR::OPAQUE)
            .present_mode(vk::PresentModeKHR::FIFO)
            .clipped(true)
            .old_swapchain(old_swapchain);

        let swapchain = self.swapchain_loader
            .create_swapchain(&swapchain_create_info, None)
            .map_err(|e| engine_err!("emy::vulkan", "Failed to create swapchain: {:?}", e))?;

        if old_swapchain != vk::SwapchainKHR::null() {
            self.swapchain_loader.destroy_swapchain(old_swapchain, None);
        }
        self.swapchain = swapchain;
        self.extent = extent;

        self.swapchain_images = self.swapchain_loader
            .get_swapchain_images(swapchain)
            .map_err(|e| engine_err!("emy::vulkan", "Failed to get swapchain images: {:?}", e))?;

        for &image in &self.swapchain_images {
            let view = create_image_view(&self.ctx, image, self.surface_format.format, vk::ImageAspectFlags::COLOR)?;
            self.swapchain_image_views.push(view);
        }

        let mut depth_aspect = vk::ImageAspectFlags::DEPTH;
        if has_stencil(self.depth_format) {
            depth_aspect |= vk::ImageAspectFlags::STENCIL;
        }
        self.depth_target = Some(self.create_attachment(
            "depth_attachment",
            self.depth_format,
            vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT,
            depth_aspect,
        )?);

        if self.sample_count != SampleCount::S1 {
            self.color_target = Some(self.create_attachment(
                "msaa_color_attachment",
                self.surface_format.format,
                vk::ImageUsageFlags::COLOR_ATTACHMENT | vk::ImageUsageFlags::TRANSIENT_ATTACHMENT,
                vk::ImageAspectFlags::COLOR,
            )?);
        }

        let depth_view = self.depth_target.as_ref().map(|target| target.view).unwrap_or_default();
        for &image_view in &self.swapchain_image_views {
            let attachments = match &self.color_target {
                Some(color) => vec![color.view, depth_view, image_view],
                None => vec![image_view, depth_view],
            };

            let framebuffer_info = vk::FramebufferCreateInfo::default()
                .render_pass(self.render_pass)
                .attachments(&attachments)
                .width(extent.width)
                .height(extent.height)
                .layers(1);

            let framebuffer = self.ctx.device.create_framebuffer(&framebuffer_info, None)
                .map_err(|e| engine_err!("emy::vulkan", "Failed to create framebuffer: {:?}", e))?;
            self.framebuffers.push(framebuffer);
        }

        Ok(())
    }

    unsafe fn create_attachment(
        &self,
        name: &str,
        format: vk::Format,
        usage: vk::ImageUsageFlags,
        aspect_mask: vk::ImageAspectFlags,
    ) -> Result<Attachment> {
        let image_create_info = vk::ImageCreateInfo::default()
            .image_type(vk::ImageType::TYPE_2D)
            .format(format)
            .extent(vk::Extent3D {
                width: self.extent.width,
                height: self.extent.height,
                depth: 1,
            })
            .mip_levels(1)
            .array_layers(1)
            .samples(sample_count_to_vk(self.sample_count))
            .tiling(vk::ImageTiling::OPTIMAL)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE)
            .initial_layout(vk::ImageLayout::UNDEFINED);

        let image = self.ctx.device.create_image(&image_create_info, None)
            .map_err(|e| engine_err!("emy::vulkan", "Failed to create {} image: {:?}", name, e))?;

        let requirements = self.ctx.device.get_image_memory_requirements(image);
        let allocation = match self.ctx.allocate(name, requirements, MemoryLocation::GpuOnly, false) {
            Ok(allocation) => allocation,
            Err(e) => {
                self.ctx.device.destroy_image(image, None);
                return Err(e);
            }
        };

        let mut attachment = Attachment { image, view: vk::ImageView::null(), allocation: Some(allocation) };

        let bound = match &attachment.allocation {
            Some(allocation) => self.ctx.device.bind_image_memory(image, allocation.memory(), allocation.offset()),
            None => Ok(()),
        };
        if let Err(e) = bound {
            attachment.destroy(&self.ctx);
            return Err(engine_err!("emy::vulkan", "Failed to bind {} memory: {:?}", name, e));
        }

        match create_image_view(&self.ctx, image, format, aspect_mask) {
            Ok(view) => attachment.view = view,
            Err(e) => {
                attachment.destroy(&self.ctx);
                return Err(e);
            }
        }

        Ok(attachment)
    }

    /// Destroy everything `build` creates except the swapchain handle
    unsafe fn destroy_targets(&mut self) {
        for framebuffer in self.framebuffers.drain(..) {
            self.ctx.device.destroy_framebuffer(framebuffer, None);
        }
        if let Some(mut color) = self.color_target.take() {
            color.destroy(&self.ctx);
        }
        if let Some(mut depth) = self.depth_target.take() {
            depth.destroy(&self.ctx);
        }
        for image_view in self.swapchain_image_views.drain(..) {
            self.ctx.device.destroy_image_view(image_view, None);
        }
        self.swapchain_images.clear();
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot >= MAX_FRAMES_IN_FLIGHT {
            engine_error!("emy::vulkan", "Frame slot {} out of range", slot);
            return Err(Error::InvalidState(format!("frame slot {} out of range", slot)));
        }
        Ok(())
    }
}

impl RendererSwapchain for Swapchain {
    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireResult> {
        self.check_slot(slot)?;

        let result = unsafe {
            self.swapchain_loader.acquire_next_image(
                self.swapchain,
                u64::MAX,
                self.image_available_semaphores[slot],
                vk::Fence::null(),
            )
        };

        match result {
            Ok((index, suboptimal)) => Ok(AcquireResult::Image { index, suboptimal }),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => {
                engine_debug!("emy::vulkan", "Swapchain out of date during acquire");
                Ok(AcquireResult::OutOfDate)
            }
            Err(e) => Err(engine_err!("emy::vulkan", "Failed to acquire next swapchain image: {:?}", e)),
        }
    }

    fn present(&mut self, image_index: u32, slot: usize) -> Result<PresentResult> {
        self.check_slot(slot)?;

        let swapchains = [self.swapchain];
        let image_indices = [image_index];
        let wait_semaphores = [self.render_finished_semaphores[slot]];

        let present_info = vk::PresentInfoKHR::default()
            .wait_semaphores(&wait_semaphores)
            .swapchains(&swapchains)
            .image_indices(&image_indices);

        let result = {
            let _queue = self.ctx.lock_queue()?;
            unsafe { self.swapchain_loader.queue_present(self.ctx.present_queue, &present_info) }
        };

        match result {
            Ok(false) => Ok(PresentResult::Optimal),
            Ok(true) | Err(vk::Result::SUBOPTIMAL_KHR) => Ok(PresentResult::Suboptimal),
            Err(vk::Result::ERROR_OUT_OF_DATE_KHR) => Ok(PresentResult::OutOfDate),
            Err(e) => Err(engine_err!("emy::vulkan", "Failed to present swapchain image: {:?}", e)),
        }
    }

    fn recreate(&mut self, width: u32, height: u32) -> Result<()> {
        unsafe {
            self.destroy_targets();
            self.build(width, height)?;
        }

        engine_info!("emy::vulkan",
            "Swapchain recreated: {}x{}, {} images",
            self.extent.width, self.extent.height, self.swapchain_images.len());
        Ok(())
    }

    fn image_count(&self) -> usize {
        self.swapchain_images.len()
    }

    fn width(&self) -> u32 {
        self.extent.width
    }

    fn height(&self) -> u32 {
        self.extent.height
    }

    fn format(&self) -> TextureFormat {
        self.format
    }

    fn sample_count(&self) -> SampleCount {
        self.sample_count
    }
}

impl Drop for Swapchain {
    fn drop(&mut self) {
        unsafe {
            // Wait for device to finish
            self.ctx.device.device_wait_idle().ok();

            self.destroy_targets();

            for &semaphore in &self.image_available_semaphores {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }
            for &semaphore in &self.render_finished_semaphores {
                self.ctx.device.destroy_semaphore(semaphore, None);
            }

            if self.swapchain != vk::SwapchainKHR::null() {
                self.swapchain_loader.destroy_swapchain(self.swapchain, None);
            }
            self.ctx.device.destroy_render_pass(self.render_pass, None);
            self.surface_loader.destroy_surface(self.surface, None);
        }
    }
}

/// Create a 2D view over mip 0, layer 0 of `image`
pub(crate) unsafe fn create_image_view(
    ctx: &GpuContext,
    image: vk::Image,
    format: vk::Format,
    aspect_mask: vk::ImageAspectFlags,
) -> Result<vk::ImageView> {
    let create_info = vk::ImageViewCreateInfo::default()
        .image(image)
        .view_type(vk::ImageViewType::TYPE_2D)
        .format(format)
        .components(vk::ComponentMapping {
            r: vk::ComponentSwizzle::IDENTITY,
            g: vk::ComponentSwizzle::IDENTITY,
            b: vk::ComponentSwizzle::IDENTITY,
            a: vk::ComponentSwizzle::IDENTITY,
        })
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask,
            base_mip_level: 0,
            level_count: 1,
            base_array_layer: 0,
            layer_count: 1,
        });

    ctx.device.create_image_view(&create_info, None)
        .map_err(|e| engine_err!("emy::vulkan", "Failed to create image view: {:?}", e))
}
