/// Texture - Vulkan implementation of the Texture trait

use emy_engine::emy::render::{Texture as RendererTexture, TextureInfo};
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Vulkan texture implementation (image + view + sampler)
pub struct Texture {
    /// Shared GPU context (device, allocator)
    ctx: Arc<GpuContext>,
    /// Vulkan image
    pub(crate) image: vk::Image,
    /// Vulkan image view covering every mip level
    pub(crate) view: vk::ImageView,
    /// Sampler owned by this texture
    pub(crate) sampler: vk::Sampler,
    /// GPU memory allocation
    allocation: Option<Allocation>,
    /// Read-only texture properties
    info: TextureInfo,
}

impl Texture {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        image: vk::Image,
        view: vk::ImageView,
        sampler: vk::Sampler,
        allocation: Allocation,
        info: TextureInfo,
    ) -> Self {
        Self {
            ctx,
            image,
            view,
            sampler,
            allocation: Some(allocation),
            info,
        }
    }
}

impl RendererTexture for Texture {
    fn info(&self) -> &TextureInfo {
        &self.info
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_sampler(self.sampler, None);
            self.ctx.device.destroy_image_view(self.view, None);
        }

        if let Some(allocation) = self.allocation.take() {
            self.ctx.free(allocation);
        }

        unsafe {
            self.ctx.device.destroy_image(self.image, None);
        }
    }
}
