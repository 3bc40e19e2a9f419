/// Buffer - Vulkan implementation of the Buffer trait

use emy_engine::emy::{Result, Error};
use emy_engine::emy::render::Buffer as RendererBuffer;
use emy_engine::{engine_err, engine_bail_warn};
use ash::vk;
use gpu_allocator::vulkan::Allocation;
use std::sync::Arc;

use crate::vulkan_context::GpuContext;

/// Vulkan buffer implementation
///
/// Host-visible (`CpuToGpu`) and persistently mapped.
pub struct Buffer {
    /// Shared GPU context (device, allocator)
    ctx: Arc<GpuContext>,
    /// Vulkan buffer handle
    pub(crate) buffer: vk::Buffer,
    /// GPU memory allocation
    allocation: Option<Allocation>,
    /// Buffer size in bytes
    size: u64,
}

impl Buffer {
    pub(crate) fn new(ctx: Arc<GpuContext>, buffer: vk::Buffer, allocation: Allocation, size: u64) -> Self {
        Self {
            ctx,
            buffer,
            allocation: Some(allocation),
            size,
        }
    }
}

impl RendererBuffer for Buffer {
    fn update(&self, offset: u64, data: &[u8]) -> Result<()> {
        let end = offset.checked_add(data.len() as u64);
        if end.map_or(true, |end| end > self.size) {
            engine_bail_warn!("emy::vulkan",
                "Buffer update out of range (offset {}, {} bytes, size {})",
                offset, data.len(), self.size);
        }

        let allocation = self.allocation
            .as_ref()
            .ok_or_else(|| engine_err!("emy::vulkan", "Buffer update failed: no GPU allocation"))?;

        let mapped_ptr = allocation
            .mapped_ptr()
            .ok_or_else(|| Error::BackendError("Buffer is not CPU-accessible".to_string()))?
            .as_ptr() as *mut u8;

        unsafe {
            std::ptr::copy_nonoverlapping(
                data.as_ptr(),
                mapped_ptr.add(offset as usize),
                data.len(),
            );
        }

        Ok(())
    }

    fn size(&self) -> u64 {
        self.size
    }
}

impl Drop for Buffer {
    fn drop(&mut self) {
        if let Some(allocation) = self.allocation.take() {
            self.ctx.free(allocation);
        }
        unsafe {
            self.ctx.device.destroy_buffer(self.buffer, None);
        }
    }
}
