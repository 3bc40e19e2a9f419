/// Pipeline - Vulkan implementation of the Pipeline trait

use emy_engine::emy::render::Pipeline as RendererPipeline;
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Vulkan graphics pipeline implementation
pub struct Pipeline {
    ctx: Arc<GpuContext>,
    /// Vulkan graphics pipeline
    pub(crate) pipeline: vk::Pipeline,
    /// Pipeline layout (accessed internally for descriptor set binding)
    pub(crate) pipeline_layout: vk::PipelineLayout,
    /// Swapchain extent the pipeline was built for
    extent: vk::Extent2D,
}

impl Pipeline {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        pipeline: vk::Pipeline,
        pipeline_layout: vk::PipelineLayout,
        extent: vk::Extent2D,
    ) -> Self {
        Self {
            ctx,
            pipeline,
            pipeline_layout,
            extent,
        }
    }
}

impl RendererPipeline for Pipeline {
    fn extent(&self) -> (u32, u32) {
        (self.extent.width, self.extent.height)
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_pipeline(self.pipeline, None);
            self.ctx.device.destroy_pipeline_layout(self.pipeline_layout, None);
        }
    }
}
