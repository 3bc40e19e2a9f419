/// BindingGroup - Vulkan implementation of the BindingGroup trait

use emy_engine::emy::render::BindingGroup as RendererBindingGroup;
use ash::vk;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Vulkan binding group implementation
///
/// Wraps a VkDescriptorSet written once at creation. Pools are created with
/// FREE_DESCRIPTOR_SET, so the set goes back to its pool on drop.
pub struct BindingGroup {
    ctx: Arc<GpuContext>,
    /// Pool the set was allocated from
    pool: vk::DescriptorPool,
    /// Vulkan descriptor set handle
    pub(crate) descriptor_set: vk::DescriptorSet,
    /// Number of bindings written
    binding_count: usize,
}

impl BindingGroup {
    pub(crate) fn new(
        ctx: Arc<GpuContext>,
        pool: vk::DescriptorPool,
        descriptor_set: vk::DescriptorSet,
        binding_count: usize,
    ) -> Self {
        Self {
            ctx,
            pool,
            descriptor_set,
            binding_count,
        }
    }
}

impl RendererBindingGroup for BindingGroup {
    fn binding_count(&self) -> usize {
        self.binding_count
    }
}

impl Drop for BindingGroup {
    fn drop(&mut self) {
        // Pool access must be externally synchronized
        if let Ok(_pools) = self.ctx.descriptor_pools.lock() {
            unsafe {
                self.ctx.device.free_descriptor_sets(self.pool, &[self.descriptor_set]).ok();
            }
        }
    }
}
