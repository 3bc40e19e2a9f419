/// GpuContext - Shared GPU state for all Vulkan objects
///
/// Contains everything resources need after creation:
/// - Device for Vulkan API calls
/// - Allocator for memory management
/// - Graphics queue and the lock serializing its use
/// - Command pool for one-shot upload operations
/// - Descriptor pools binding groups are allocated from

use emy_engine::emy::{Result, Error};
use emy_engine::{engine_err, engine_error};
use ash::vk;
use gpu_allocator::vulkan::{Allocation, AllocationCreateDesc, AllocationScheme, Allocator};
use gpu_allocator::MemoryLocation;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

/// Shared GPU context for all Vulkan resources.
///
/// Shared (via `Arc`) by every buffer, texture, pipeline and binding group
/// so each one can destroy itself on drop.
///
/// Note: device and instance destruction is handled by
/// `VulkanGraphicsDevice::drop()`, after every resource holding this context
/// has been released.
pub struct GpuContext {
    /// Vulkan instance (destroyed by VulkanGraphicsDevice)
    pub(crate) instance: ash::Instance,

    /// Vulkan logical device
    pub(crate) device: ash::Device,

    /// Selected physical device
    pub(crate) physical_device: vk::PhysicalDevice,

    /// GPU memory allocator
    /// Wrapped in ManuallyDrop so it is dropped BEFORE the device is destroyed
    pub(crate) allocator: ManuallyDrop<Mutex<Allocator>>,

    /// Graphics queue and its family index
    pub(crate) graphics_queue: vk::Queue,
    pub(crate) graphics_queue_family: u32,

    /// Present queue (may be the graphics queue)
    pub(crate) present_queue: vk::Queue,

    /// Serializes vkQueueSubmit / vkQueuePresentKHR / vkQueueWaitIdle
    queue_lock: Mutex<()>,

    /// Reusable command pool for one-shot uploads
    /// (created with TRANSIENT + RESET_COMMAND_BUFFER flags)
    upload_command_pool: Mutex<vk::CommandPool>,

    /// Descriptor pools (grows when the last one is exhausted)
    pub(crate) descriptor_pools: Mutex<Vec<vk::DescriptorPool>>,

    /// Device limit used for every texture sampler
    pub(crate) max_sampler_anisotropy: f32,

    /// Bytes currently allocated through `allocate`
    memory_used: AtomicU64,
}

impl GpuContext {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        instance: ash::Instance,
        device: ash::Device,
        physical_device: vk::PhysicalDevice,
        allocator: Allocator,
        graphics_queue: vk::Queue,
        graphics_queue_family: u32,
        present_queue: vk::Queue,
        upload_command_pool: vk::CommandPool,
        descriptor_pool: vk::DescriptorPool,
        max_sampler_anisotropy: f32,
    ) -> Self {
        Self {
            instance,
            device,
            physical_device,
            allocator: ManuallyDrop::new(Mutex::new(allocator)),
            graphics_queue,
            graphics_queue_family,
            present_queue,
            queue_lock: Mutex::new(()),
            upload_command_pool: Mutex::new(upload_command_pool),
            descriptor_pools: Mutex::new(vec![descriptor_pool]),
            max_sampler_anisotropy,
            memory_used: AtomicU64::new(0),
        }
    }

    /// Lock the queues for a submit, present or wait
    pub(crate) fn lock_queue(&self) -> Result<MutexGuard<'_, ()>> {
        self.queue_lock
            .lock()
            .map_err(|_| engine_err!("emy::vulkan", "Queue lock poisoned"))
    }

    /// Allocate memory for `requirements` at `location`
    ///
    /// Logs and returns `Error::OutOfMemory` when the allocator fails.
    pub(crate) fn allocate(
        &self,
        name: &str,
        requirements: vk::MemoryRequirements,
        location: MemoryLocation,
        linear: bool,
    ) -> Result<Allocation> {
        let mut allocator = self.allocator
            .lock()
            .map_err(|_| engine_err!("emy::vulkan", "Allocator lock poisoned"))?;

        let allocation = allocator
            .allocate(&AllocationCreateDesc {
                name,
                requirements,
                location,
                linear,
                allocation_scheme: AllocationScheme::GpuAllocatorManaged,
            })
            .map_err(|e| {
                let size_mb = requirements.size as f64 / (1024.0 * 1024.0);
                engine_error!("emy::vulkan", "Out of GPU memory for {} ({:.2} MB): {:?}", name, size_mb, e);
                Error::OutOfMemory
            })?;

        self.memory_used.fetch_add(allocation.size(), Ordering::Relaxed);
        Ok(allocation)
    }

    /// Return an allocation to the allocator
    ///
    /// Never fails: used from `Drop` impls.
    pub(crate) fn free(&self, allocation: Allocation) {
        let size = allocation.size();
        if let Ok(mut allocator) = self.allocator.lock() {
            if allocator.free(allocation).is_ok() {
                self.memory_used.fetch_sub(size, Ordering::Relaxed);
            }
        }
    }

    /// Bytes currently allocated for buffers, textures and attachments
    pub(crate) fn memory_used(&self) -> u64 {
        self.memory_used.load(Ordering::Relaxed)
    }

    /// Record commands into a one-shot command buffer, submit them and wait
    ///
    /// Used for staging uploads and layout transitions at texture creation.
    pub(crate) fn submit_one_shot<F>(&self, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer) -> Result<()>,
    {
        let pool = self.upload_command_pool
            .lock()
            .map_err(|_| engine_err!("emy::vulkan", "Upload command pool lock poisoned"))?;

        unsafe {
            let allocate_info = vk::CommandBufferAllocateInfo::default()
                .command_pool(*pool)
                .level(vk::CommandBufferLevel::PRIMARY)
                .command_buffer_count(1);

            let command_buffer = self.device.allocate_command_buffers(&allocate_info)
                .map_err(|e| engine_err!("emy::vulkan", "Failed to allocate upload command buffer: {:?}", e))?[0];

            let result = self.record_and_wait(command_buffer, record);
            self.device.free_command_buffers(*pool, &[command_buffer]);
            result
        }
    }

    unsafe fn record_and_wait<F>(&self, command_buffer: vk::CommandBuffer, record: F) -> Result<()>
    where
        F: FnOnce(vk::CommandBuffer) -> Result<()>,
    {
        let begin_info = vk::CommandBufferBeginInfo::default()
            .flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);

        self.device.begin_command_buffer(command_buffer, &begin_info)
            .map_err(|e| engine_err!("emy::vulkan", "Failed to begin upload command buffer: {:?}", e))?;

        record(command_buffer)?;

        self.device.end_command_buffer(command_buffer)
            .map_err(|e| engine_err!("emy::vulkan", "Failed to end upload command buffer: {:?}", e))?;

        let command_buffers = [command_buffer];
        let submit_info = vk::SubmitInfo::default().command_buffers(&command_buffers);

        let _queue = self.lock_queue()?;
        self.device.queue_submit(self.graphics_queue, &[submit_info], vk::Fence::null())
            .map_err(|e| engine_err!("emy::vulkan", "Failed to submit upload commands: {:?}", e))?;
        self.device.queue_wait_idle(self.graphics_queue)
            .map_err(|e| engine_err!("emy::vulkan", "Failed to wait for upload completion: {:?}", e))?;

        Ok(())
    }

    /// Destroy the pools owned by the context
    ///
    /// Called by `VulkanGraphicsDevice::drop()` while the device is alive.
    pub(crate) unsafe fn destroy_pools(&self) {
        if let Ok(mut pool) = self.upload_command_pool.lock() {
            if *pool != vk::CommandPool::null() {
                self.device.destroy_command_pool(*pool, None);
                *pool = vk::CommandPool::null();
            }
        }
        if let Ok(mut pools) = self.descriptor_pools.lock() {
            for pool in pools.drain(..) {
                self.device.destroy_descriptor_pool(pool, None);
            }
        }
    }
}
