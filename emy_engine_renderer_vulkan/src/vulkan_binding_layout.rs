/// BindingLayout - Vulkan implementation of the BindingLayout trait

use emy_engine::emy::render::{BindingLayout as RendererBindingLayout, BindingLayoutEntry};
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Vulkan descriptor set layout
///
/// Shared by every pipeline built for a pipeline state and by the binding
/// groups allocated against it, so it outlives pipeline rebuilds.
pub struct BindingLayout {
    ctx: Arc<GpuContext>,
    /// Vulkan descriptor set layout handle
    pub(crate) layout: vk::DescriptorSetLayout,
    /// Engine-side description, in binding order
    entries: Vec<BindingLayoutEntry>,
}

impl BindingLayout {
    pub(crate) fn new(ctx: Arc<GpuContext>, layout: vk::DescriptorSetLayout, entries: &[BindingLayoutEntry]) -> Self {
        Self {
            ctx,
            layout,
            entries: entries.to_vec(),
        }
    }
}

impl RendererBindingLayout for BindingLayout {
    fn entries(&self) -> &[BindingLayoutEntry] {
        &self.entries
    }
}

impl Drop for BindingLayout {
    fn drop(&mut self) {
        unsafe {
            self.ctx.device.destroy_descriptor_set_layout(self.layout, None);
        }
    }
}
