/// VulkanGraphicsDevice - Vulkan implementation of the GraphicsDevice trait

use emy_engine::emy::{Result, Error};
use emy_engine::emy::render::{
    GraphicsDevice, GraphicsDeviceStats, Config,
    CommandList as RendererCommandList, Swapchain as RendererSwapchain,
    Texture as RendererTexture, Buffer as RendererBuffer,
    Shader as RendererShader, Pipeline as RendererPipeline,
    BindingLayout as RendererBindingLayout, BindingGroup as RendererBindingGroup,
    BufferDesc, BufferUsage, TextureDesc, TextureInfo, ShaderDesc, ShaderStage, PipelineDesc,
    BindingLayoutEntry, BindingResource, BindingType, SampleCount,
};
use emy_engine::emy::renderer::MAX_FRAMES_IN_FLIGHT;
use emy_engine::{engine_trace, engine_debug, engine_info, engine_warn, engine_error, engine_err, engine_bail_warn, engine_warn_err};
use ash::vk;
use gpu_allocator::vulkan::{Allocator, AllocatorCreateDesc};
use gpu_allocator::MemoryLocation;
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use std::ffi::CString;
use std::mem::ManuallyDrop;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use winit::window::Window;

use crate::vulkan_context::GpuContext;
use crate::vulkan_buffer::Buffer;
use crate::vulkan_texture::Texture;
use crate::vulkan_shader::{self, Shader};
use crate::vulkan_binding_layout::BindingLayout;
use crate::vulkan_binding_group::BindingGroup;
use crate::vulkan_pipeline::Pipeline;
use crate::vulkan_command_list::CommandList;
use crate::vulkan_swapchain::Swapchain;
use crate::vulkan_format::{
    texture_format_to_vk, buffer_format_to_vk, stage_flags_to_vk, shader_stage_to_vk,
    binding_type_to_vk, topology_to_vk, polygon_mode_to_vk, cull_mode_to_vk, front_face_to_vk,
    compare_op_to_vk, sample_count_to_vk, clamp_sample_count, input_rate_to_vk,
};

/// Descriptor sets per pool; a new pool is added when one runs out
const DESCRIPTOR_POOL_MAX_SETS: u32 = 1024;

/// Queue family indices chosen for a physical device
#[derive(Debug, Clone, Copy)]
struct QueueFamilies {
    graphics: u32,
    present: u32,
}

/// Vulkan graphics device
///
/// Creates resources and submits frames. Presentation state lives in
/// `VulkanSwapchain`, created with `create_swapchain`.
pub struct VulkanGraphicsDevice {
    /// Vulkan entry (needed for surface creation)
    entry: ash::Entry,
    /// Shared GPU context for all resources
    ctx: Arc<GpuContext>,
    /// Queue family of `ctx.present_queue`
    present_family: u32,
    /// One fence per frame slot, created signaled
    frame_fences: Vec<vk::Fence>,
    /// Sample count after clamping to the device limits
    msaa_samples: SampleCount,
    frames_submitted: AtomicU64,
    /// Debug messenger (validation builds only)
    #[cfg(feature = "vulkan-validation")]
    debug_messenger: Option<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)>,
}

impl VulkanGraphicsDevice {
    /// Create a new Vulkan device
    ///
    /// # Arguments
    ///
    /// * `window` - Window used to pick a queue family able to present
    /// * `config` - Device configuration
    pub fn new<W: HasDisplayHandle + HasWindowHandle>(
        window: &W,
        config: &Config,
    ) -> Result<Self> {
        unsafe {
            let entry = ash::Entry::load()
                .map_err(|e| {
                    engine_error!("emy::vulkan", "Failed to load Vulkan library: {:?}", e);
                    Error::InitializationFailed(format!("Failed to load Vulkan library: {:?}", e))
                })?;

            let validation = config.enable_validation && cfg!(feature = "vulkan-validation");
            if config.enable_validation && !validation {
                engine_warn!("emy::vulkan",
                    "Validation requested but the backend was built without the vulkan-validation feature");
            }

            // Application Info
            let app_name = CString::new(config.app_name.as_str())
                .map_err(|e| {
                    engine_error!("emy::vulkan", "Invalid application name '{}': {}", config.app_name, e);
                    Error::InitializationFailed(format!("Invalid application name: {}", e))
                })?;
            let (major, minor, patch) = config.app_version;
            let app_info = vk::ApplicationInfo::default()
                .application_name(&app_name)
                .application_version(vk::make_api_version(0, major, minor, patch))
                .engine_name(c"Emy")
                .engine_version(vk::make_api_version(0, 0, 1, 0))
                .api_version(vk::API_VERSION_1_3);

            // Get required extensions
            let display_handle = window.display_handle()
                .map_err(|e| {
                    engine_error!("emy::vulkan", "Failed to get display handle: {}", e);
                    Error::InitializationFailed(format!("Failed to get display handle: {}", e))
                })?;
            #[allow(unused_mut)]
            let mut extension_names = ash_window::enumerate_required_extensions(display_handle.as_raw())
                .map_err(|e| {
                    engine_error!("emy::vulkan", "Failed to get required extensions: {}", e);
                    Error::InitializationFailed(format!("Failed to get required extensions: {}", e))
                })?
                .to_vec();

            #[allow(unused_mut)]
            let mut layer_names: Vec<*const std::ffi::c_char> = Vec::new();

            #[cfg(feature = "vulkan-validation")]
            if validation {
                extension_names.push(ash::ext::debug_utils::NAME.as_ptr());
                layer_names.push(c"VK_LAYER_KHRONOS_validation".as_ptr());
            }

            let create_info = vk::InstanceCreateInfo::default()
                .application_info(&app_info)
                .enabled_layer_names(&layer_names)
                .enabled_extension_names(&extension_names);

            let instance = entry
                .create_instance(&create_info, None)
                .map_err(|e| {
                    engine_error!("emy::vulkan", "Failed to create Vulkan instance: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create instance: {:?}", e))
                })?;

            #[cfg(feature = "vulkan-validation")]
            let debug_messenger = if validation {
                Some(Self::create_debug_messenger(&entry, &instance, config)?)
            } else {
                None
            };

            // Temporary surface for present support queries
            let window_handle = window.window_handle()
                .map_err(|e| {
                    engine_error!("emy::vulkan", "Failed to get window handle: {}", e);
                    Error::InitializationFailed(format!("Failed to get window handle: {}", e))
                })?;
            let surface = ash_window::create_surface(
                &entry,
                &instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| {
                engine_error!("emy::vulkan", "Failed to create surface: {:?}", e);
                Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
            })?;

            let surface_loader = ash::khr::surface::Instance::new(&entry, &instance);
            let selected = Self::select_physical_device(&instance, &surface_loader, surface);
            surface_loader.destroy_surface(surface, None);
            let (physical_device, families) = selected?;

            let properties = instance.get_physical_device_properties(physical_device);
            let supported_features = instance.get_physical_device_features(physical_device);
            let device_name = properties
                .device_name_as_c_str()
                .ok()
                .and_then(|name| name.to_str().ok())
                .unwrap_or("unknown")
                .to_string();

            // MSAA: highest count usable for both color and depth
            let supported_samples = properties.limits.framebuffer_color_sample_counts
                & properties.limits.framebuffer_depth_sample_counts;
            let msaa_samples = clamp_sample_count(config.msaa_samples, supported_samples);
            if msaa_samples != config.msaa_samples {
                engine_warn!("emy::vulkan",
                    "{}x MSAA not supported by {}, using {}x",
                    config.msaa_samples.count(), device_name, msaa_samples.count());
            }

            let anisotropy_supported = supported_features.sampler_anisotropy == vk::TRUE;
            let max_sampler_anisotropy = if anisotropy_supported {
                properties.limits.max_sampler_anisotropy
            } else {
                1.0
            };

            // Create Logical Device
            let queue_priorities = [1.0];
            let mut queue_create_infos = vec![
                vk::DeviceQueueCreateInfo::default()
                    .queue_family_index(families.graphics)
                    .queue_priorities(&queue_priorities),
            ];
            if families.present != families.graphics {
                queue_create_infos.push(
                    vk::DeviceQueueCreateInfo::default()
                        .queue_family_index(families.present)
                        .queue_priorities(&queue_priorities),
                );
            }

            let device_extension_names = [ash::khr::swapchain::NAME.as_ptr()];

            let device_features = vk::PhysicalDeviceFeatures::default()
                .sampler_anisotropy(anisotropy_supported);

            let device_create_info = vk::DeviceCreateInfo::default()
                .queue_create_infos(&queue_create_infos)
                .enabled_extension_names(&device_extension_names)
                .enabled_features(&device_features);

            let device = instance
                .create_device(physical_device, &device_create_info, None)
                .map_err(|e| {
                    engine_error!("emy::vulkan", "Failed to create logical device: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create device: {:?}", e))
                })?;

            let graphics_queue = device.get_device_queue(families.graphics, 0);
            let present_queue = device.get_device_queue(families.present, 0);

            // Create GPU allocator
            let allocator = Allocator::new(&AllocatorCreateDesc {
                instance: instance.clone(),
                device: device.clone(),
                physical_device,
                debug_settings: Default::default(),
                buffer_device_address: false,
                allocation_sizes: Default::default(),
            })
            .map_err(|e| {
                engine_error!("emy::vulkan", "Failed to create GPU allocator: {:?}", e);
                Error::InitializationFailed(format!("Failed to create allocator: {:?}", e))
            })?;

            // Frame fences start signaled so the first wait on each slot returns
            let fence_create_info = vk::FenceCreateInfo::default()
                .flags(vk::FenceCreateFlags::SIGNALED);

            let mut frame_fences = Vec::with_capacity(MAX_FRAMES_IN_FLIGHT);
            for _ in 0..MAX_FRAMES_IN_FLIGHT {
                frame_fences.push(
                    device.create_fence(&fence_create_info, None)
                        .map_err(|e| {
                            engine_error!("emy::vulkan", "Failed to create frame fence: {:?}", e);
                            Error::InitializationFailed(format!("Failed to create fence: {:?}", e))
                        })?
                );
            }

            let descriptor_pool = Self::create_descriptor_pool(&device)?;

            // Upload command pool (TRANSIENT + RESET for reusable one-shot uploads)
            let upload_pool_create_info = vk::CommandPoolCreateInfo::default()
                .queue_family_index(families.graphics)
                .flags(vk::CommandPoolCreateFlags::TRANSIENT | vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER);

            let upload_command_pool = device.create_command_pool(&upload_pool_create_info, None)
                .map_err(|e| {
                    engine_error!("emy::vulkan", "Failed to create upload command pool: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create upload command pool: {:?}", e))
                })?;

            let ctx = Arc::new(GpuContext::new(
                instance,
                device,
                physical_device,
                allocator,
                graphics_queue,
                families.graphics,
                present_queue,
                upload_command_pool,
                descriptor_pool,
                max_sampler_anisotropy,
            ));

            engine_info!("emy::vulkan",
                "Vulkan device created: {} (graphics family {}, present family {}, {}x MSAA, validation {})",
                device_name, families.graphics, families.present, msaa_samples.count(),
                if validation { "on" } else { "off" });

            Ok(Self {
                entry,
                ctx,
                present_family: families.present,
                frame_fences,
                msaa_samples,
                frames_submitted: AtomicU64::new(0),
                #[cfg(feature = "vulkan-validation")]
                debug_messenger,
            })
        }
    }

    /// Create a swapchain for `window` at its current inner size
    ///
    /// Attachments use the device's (clamped) MSAA sample count.
    pub fn create_swapchain(&self, window: &Window) -> Result<Swapchain> {
        let size = window.inner_size();

        let display_handle = window.display_handle()
            .map_err(|e| {
                engine_error!("emy::vulkan", "Failed to get display handle for swapchain: {}", e);
                Error::InitializationFailed(format!("Failed to get display handle: {}", e))
            })?;
        let window_handle = window.window_handle()
            .map_err(|e| {
                engine_error!("emy::vulkan", "Failed to get window handle for swapchain: {}", e);
                Error::InitializationFailed(format!("Failed to get window handle: {}", e))
            })?;

        let surface = unsafe {
            ash_window::create_surface(
                &self.entry,
                &self.ctx.instance,
                display_handle.as_raw(),
                window_handle.as_raw(),
                None,
            )
            .map_err(|e| {
                engine_error!("emy::vulkan", "Failed to create surface for swapchain: {:?}", e);
                Error::InitializationFailed(format!("Failed to create surface: {:?}", e))
            })?
        };

        let surface_loader = ash::khr::surface::Instance::new(&self.entry, &self.ctx.instance);

        let present_supported = unsafe {
            surface_loader
                .get_physical_device_surface_support(self.ctx.physical_device, self.present_family, surface)
                .unwrap_or(false)
        };
        if !present_supported {
            unsafe { surface_loader.destroy_surface(surface, None) };
            engine_error!("emy::vulkan", "Present queue cannot present to this window");
            return Err(Error::InitializationFailed("Surface not supported by present queue".to_string()));
        }

        Swapchain::new(
            Arc::clone(&self.ctx),
            surface,
            surface_loader,
            size.width,
            size.height,
            self.msaa_samples,
        )
    }

    #[cfg(feature = "vulkan-validation")]
    unsafe fn create_debug_messenger(
        entry: &ash::Entry,
        instance: &ash::Instance,
        config: &Config,
    ) -> Result<(ash::ext::debug_utils::Instance, vk::DebugUtilsMessengerEXT)> {
        let debug_utils = ash::ext::debug_utils::Instance::new(entry, instance);

        crate::debug::init_debug_config(crate::debug::Config {
            severity: config.debug_severity,
            output: config.debug_output.clone(),
            message_filter: config.debug_message_filter,
            break_on_error: config.break_on_validation_error,
            panic_on_error: config.panic_on_error,
            enable_stats: config.enable_validation_stats,
        });

        let debug_info = vk::DebugUtilsMessengerCreateInfoEXT::default()
            .message_severity(crate::debug::severity_flags(config.debug_severity))
            .message_type(
                vk::DebugUtilsMessageTypeFlagsEXT::GENERAL
                    | vk::DebugUtilsMessageTypeFlagsEXT::VALIDATION
                    | vk::DebugUtilsMessageTypeFlagsEXT::PERFORMANCE
            )
            .pfn_user_callback(Some(crate::debug::vulkan_debug_callback));

        let messenger = debug_utils
            .create_debug_utils_messenger(&debug_info, None)
            .map_err(|e| {
                engine_error!("emy::vulkan", "Failed to create debug messenger: {:?}", e);
                Error::InitializationFailed(format!("Failed to create debug messenger: {:?}", e))
            })?;

        Ok((debug_utils, messenger))
    }

    /// Pick the best GPU able to render and present to `surface`
    ///
    /// Discrete GPUs first, then integrated, then anything else; a queue
    /// family doing both graphics and present is preferred.
    unsafe fn select_physical_device(
        instance: &ash::Instance,
        surface_loader: &ash::khr::surface::Instance,
        surface: vk::SurfaceKHR,
    ) -> Result<(vk::PhysicalDevice, QueueFamilies)> {
        let physical_devices = instance
            .enumerate_physical_devices()
            .map_err(|e| {
                engine_error!("emy::vulkan", "Failed to enumerate physical devices: {:?}", e);
                Error::InitializationFailed(format!("Failed to enumerate physical devices: {:?}", e))
            })?;

        let mut best: Option<(u32, vk::PhysicalDevice, QueueFamilies)> = None;

        for physical_device in physical_devices {
            let has_swapchain = instance
                .enumerate_device_extension_properties(physical_device)
                .map(|extensions| {
                    extensions.iter().any(|ext| {
                        ext.extension_name_as_c_str().is_ok_and(|name| name == ash::khr::swapchain::NAME)
                    })
                })
                .unwrap_or(false);
            if !has_swapchain {
                continue;
            }

            let queue_families = instance.get_physical_device_queue_family_properties(physical_device);
            let supports_present = |index: u32| {
                surface_loader
                    .get_physical_device_surface_support(physical_device, index, surface)
                    .unwrap_or(false)
            };

            let graphics: Vec<u32> = queue_families
                .iter()
                .enumerate()
                .filter(|(_, qf)| qf.queue_flags.contains(vk::QueueFlags::GRAPHICS))
                .map(|(i, _)| i as u32)
                .collect();

            let families = match graphics.iter().copied().find(|&i| supports_present(i)) {
                Some(index) => QueueFamilies { graphics: index, present: index },
                None => {
                    let present = (0..queue_families.len() as u32).find(|&i| supports_present(i));
                    match (graphics.first(), present) {
                        (Some(&graphics), Some(present)) => QueueFamilies { graphics, present },
                        _ => continue,
                    }
                }
            };

            let properties = instance.get_physical_device_properties(physical_device);
            let score = match properties.device_type {
                vk::PhysicalDeviceType::DISCRETE_GPU => 3,
                vk::PhysicalDeviceType::INTEGRATED_GPU => 2,
                vk::PhysicalDeviceType::VIRTUAL_GPU => 1,
                _ => 0,
            };

            if best.as_ref().map_or(true, |(best_score, _, _)| score > *best_score) {
                best = Some((score, physical_device, families));
            }
        }

        best.map(|(_, physical_device, families)| (physical_device, families))
            .ok_or_else(|| {
                engine_error!("emy::vulkan", "No Vulkan GPU can render and present to this window");
                Error::InitializationFailed("No suitable Vulkan GPU found".to_string())
            })
    }

    /// Create a descriptor pool with fixed capacity
    ///
    /// Called during init and when the current pool is exhausted.
    fn create_descriptor_pool(device: &ash::Device) -> Result<vk::DescriptorPool> {
        let pool_sizes = [
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::UNIFORM_BUFFER,
                descriptor_count: DESCRIPTOR_POOL_MAX_SETS,
            },
            vk::DescriptorPoolSize {
                ty: vk::DescriptorType::COMBINED_IMAGE_SAMPLER,
                descriptor_count: DESCRIPTOR_POOL_MAX_SETS * 2,
            },
        ];
        // Binding groups free their set on drop
        let info = vk::DescriptorPoolCreateInfo::default()
            .flags(vk::DescriptorPoolCreateFlags::FREE_DESCRIPTOR_SET)
            .pool_sizes(&pool_sizes)
            .max_sets(DESCRIPTOR_POOL_MAX_SETS);

        unsafe {
            device.create_descriptor_pool(&info, None)
                .map_err(|e| {
                    engine_error!("emy::vulkan", "Failed to create descriptor pool: {:?}", e);
                    Error::InitializationFailed(format!("Failed to create descriptor pool: {:?}", e))
                })
        }
    }

    /// Allocate a descriptor set, growing the pool list when exhausted
    ///
    /// Pools are tried newest first; older pools regain capacity when their
    /// sets are freed.
    unsafe fn allocate_descriptor_set(
        &self,
        layout: vk::DescriptorSetLayout,
    ) -> Result<(vk::DescriptorPool, vk::DescriptorSet)> {
        let mut pools = self.ctx.descriptor_pools
            .lock()
            .map_err(|_| engine_err!("emy::vulkan", "Descriptor pool lock poisoned"))?;

        let layouts = [layout];

        for &pool in pools.iter().rev() {
            let allocate_info = vk::DescriptorSetAllocateInfo::default()
                .descriptor_pool(pool)
                .set_layouts(&layouts);

            match self.ctx.device.allocate_descriptor_sets(&allocate_info) {
                Ok(sets) => return Ok((pool, sets[0])),
                Err(vk::Result::ERROR_OUT_OF_POOL_MEMORY) | Err(vk::Result::ERROR_FRAGMENTED_POOL) => {}
                Err(e) => return Err(engine_err!("emy::vulkan", "Failed to allocate descriptor set: {:?}", e)),
            }
        }

        let new_pool = Self::create_descriptor_pool(&self.ctx.device)?;
        pools.push(new_pool);
        engine_info!("emy::vulkan",
            "Descriptor pool exhausted, created new pool (total: {})", pools.len());

        let retry_info = vk::DescriptorSetAllocateInfo::default()
            .descriptor_pool(new_pool)
            .set_layouts(&layouts);
        let sets = self.ctx.device.allocate_descriptor_sets(&retry_info)
            .map_err(|e| engine_err!("emy::vulkan",
                "Failed to allocate descriptor set after pool growth: {:?}", e))?;

        Ok((new_pool, sets[0]))
    }

    /// Create a host-visible buffer bound to fresh memory
    unsafe fn create_host_buffer(&self, name: &str, size: u64, usage: vk::BufferUsageFlags) -> Result<Buffer> {
        let buffer_create_info = vk::BufferCreateInfo::default()
            .size(size)
            .usage(usage)
            .sharing_mode(vk::SharingMode::EXCLUSIVE);

        let buffer = self.ctx.device.create_buffer(&buffer_create_info, None)
            .map_err(|e| engine_err!("emy::vulkan", "Failed to create {} of size {} bytes: {:?}", name, size, e))?;

        let requirements = self.ctx.device.get_buffer_memory_requirements(buffer);
        let allocation = match self.ctx.allocate(name, requirements, MemoryLocation::CpuToGpu, true) {
            Ok(allocation) => allocation,
            Err(e) => {
                self.ctx.device.destroy_buffer(buffer, None);
                return Err(e);
            }
        };

        let memory = allocation.memory();
        let offset = allocation.offset();
        // From here the Buffer releases the handle and memory on any error
        let buffer = Buffer::new(Arc::clone(&self.ctx), buffer, allocation, size);

        self.ctx.device.bind_buffer_memory(buffer.buffer, memory, offset)
            .map_err(|e| engine_err!("emy::vulkan", "Failed to bind {} memory: {:?}", name, e))?;

        Ok(buffer)
    }

    /// Record the staging copy and the mip chain generation of a texture
    ///
    /// Leaves every mip level in SHADER_READ_ONLY_OPTIMAL.
    unsafe fn record_texture_upload(
        device: &ash::Device,
        command_buffer: vk::CommandBuffer,
        image: vk::Image,
        staging: vk::Buffer,
        width: u32,
        height: u32,
        mip_levels: u32,
    ) {
        // All levels: UNDEFINED -> TRANSFER_DST_OPTIMAL
        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TOP_OF_PIPE,
            vk::PipelineStageFlags::TRANSFER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[mip_barrier(
                image, 0, mip_levels,
                vk::ImageLayout::UNDEFINED, vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                vk::AccessFlags::empty(), vk::AccessFlags::TRANSFER_WRITE,
            )],
        );

        let region = vk::BufferImageCopy::default()
            .buffer_offset(0)
            .buffer_row_length(0)
            .buffer_image_height(0)
            .image_subresource(color_layers(0))
            .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
            .image_extent(vk::Extent3D { width, height, depth: 1 });

        device.cmd_copy_buffer_to_image(
            command_buffer,
            staging,
            image,
            vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            &[region],
        );

        // Each level is blitted from the previous one, which is then final
        for mip in 1..mip_levels {
            let src_mip = mip - 1;
            let src_width = (width >> src_mip).max(1);
            let src_height = (height >> src_mip).max(1);
            let dst_width = (width >> mip).max(1);
            let dst_height = (height >> mip).max(1);

            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::TRANSFER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[mip_barrier(
                    image, src_mip, 1,
                    vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                    vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::TRANSFER_READ,
                )],
            );

            let blit = vk::ImageBlit::default()
                .src_subresource(color_layers(src_mip))
                .src_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D { x: src_width as i32, y: src_height as i32, z: 1 },
                ])
                .dst_subresource(color_layers(mip))
                .dst_offsets([
                    vk::Offset3D { x: 0, y: 0, z: 0 },
                    vk::Offset3D { x: dst_width as i32, y: dst_height as i32, z: 1 },
                ]);

            device.cmd_blit_image(
                command_buffer,
                image,
                vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
                image,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL,
                &[blit],
                vk::Filter::LINEAR,
            );

            device.cmd_pipeline_barrier(
                command_buffer,
                vk::PipelineStageFlags::TRANSFER,
                vk::PipelineStageFlags::FRAGMENT_SHADER,
                vk::DependencyFlags::empty(),
                &[],
                &[],
                &[mip_barrier(
                    image, src_mip, 1,
                    vk::ImageLayout::TRANSFER_SRC_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                    vk::AccessFlags::TRANSFER_READ, vk::AccessFlags::SHADER_READ,
                )],
            );
        }

        // Last level was only written
        device.cmd_pipeline_barrier(
            command_buffer,
            vk::PipelineStageFlags::TRANSFER,
            vk::PipelineStageFlags::FRAGMENT_SHADER,
            vk::DependencyFlags::empty(),
            &[],
            &[],
            &[mip_barrier(
                image, mip_levels - 1, 1,
                vk::ImageLayout::TRANSFER_DST_OPTIMAL, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
                vk::AccessFlags::TRANSFER_WRITE, vk::AccessFlags::SHADER_READ,
            )],
        );
    }

    fn check_slot(&self, slot: usize) -> Result<()> {
        if slot >= self.frame_fences.len() {
            engine_error!("emy::vulkan", "Frame slot {} out of range", slot);
            return Err(Error::InvalidState(format!("frame slot {} out of range", slot)));
        }
        Ok(())
    }
}

/// Color subresource of one mip level
fn color_layers(mip_level: u32) -> vk::ImageSubresourceLayers {
    vk::ImageSubresourceLayers {
        aspect_mask: vk::ImageAspectFlags::COLOR,
        mip_level,
        base_array_layer: 0,
        layer_count: 1,
    }
}

/// Layout transition of `level_count` color mip levels starting at `base_mip`
#[allow(clippy::too_many_arguments)]
fn mip_barrier(
    image: vk::Image,
    base_mip: u32,
    level_count: u32,
    old_layout: vk::ImageLayout,
    new_layout: vk::ImageLayout,
    src_access: vk::AccessFlags,
    dst_access: vk::AccessFlags,
) -> vk::ImageMemoryBarrier<'static> {
    vk::ImageMemoryBarrier::default()
        .old_layout(old_layout)
        .new_layout(new_layout)
        .src_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .dst_queue_family_index(vk::QUEUE_FAMILY_IGNORED)
        .image(image)
        .subresource_range(vk::ImageSubresourceRange {
            aspect_mask: vk::ImageAspectFlags::COLOR,
            base_mip_level: base_mip,
            level_count,
            base_array_layer: 0,
            layer_count: 1,
        })
        .src_access_mask(src_access)
        .dst_access_mask(dst_access)
}

impl GraphicsDevice for VulkanGraphicsDevice {
    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn RendererBuffer>> {
        if desc.size == 0 {
            engine_bail_warn!("emy::vulkan", "Cannot create a buffer of size 0");
        }

        let usage = match desc.usage {
            BufferUsage::Vertex => vk::BufferUsageFlags::VERTEX_BUFFER,
            BufferUsage::Index => vk::BufferUsageFlags::INDEX_BUFFER,
            BufferUsage::Uniform => vk::BufferUsageFlags::UNIFORM_BUFFER,
        };

        let buffer = unsafe {
            self.create_host_buffer("buffer", desc.size, usage | vk::BufferUsageFlags::TRANSFER_DST)?
        };

        engine_trace!("emy::vulkan", "Buffer created ({:?}, {} bytes)", desc.usage, desc.size);
        Ok(Arc::new(buffer))
    }

    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn RendererTexture>> {
        if desc.format.is_depth() {
            engine_bail_warn!("emy::vulkan",
                "Cannot create a sampled texture with depth format {:?}", desc.format);
        }
        if desc.width == 0 || desc.height == 0 {
            engine_bail_warn!("emy::vulkan",
                "Texture size must be non-zero (got {}x{})", desc.width, desc.height);
        }

        let bytes_per_pixel = desc.format.bytes_per_pixel().unwrap_or(4) as u64;
        let expected = desc.width as u64 * desc.height as u64 * bytes_per_pixel;
        if desc.data.len() as u64 != expected {
            engine_bail_warn!("emy::vulkan",
                "Texture data size mismatch: {} bytes for {}x{} {:?} (expected {})",
                desc.data.len(), desc.width, desc.height, desc.format, expected);
        }

        let format = texture_format_to_vk(desc.format);

        // Blit-based mip generation needs linear filtering support
        let mut mip_levels = desc.mip_levels();
        if mip_levels > 1 {
            let properties = unsafe {
                self.ctx.instance.get_physical_device_format_properties(self.ctx.physical_device, format)
            };
            if !properties.optimal_tiling_features.contains(vk::FormatFeatureFlags::SAMPLED_IMAGE_FILTER_LINEAR) {
                engine_warn!("emy::vulkan",
                    "Format {:?} does not support linear blits, texture created without mipmaps", desc.format);
                mip_levels = 1;
            }
        }

        let mut usage_flags = vk::ImageUsageFlags::SAMPLED | vk::ImageUsageFlags::TRANSFER_DST;
        if mip_levels > 1 {
            usage_flags |= vk::ImageUsageFlags::TRANSFER_SRC;
        }

        unsafe {
            let image_create_info = vk::ImageCreateInfo::default()
                .image_type(vk::ImageType::TYPE_2D)
                .format(format)
                .extent(vk::Extent3D {
                    width: desc.width,
                    height: desc.height,
                    depth: 1,
                })
                .mip_levels(mip_levels)
                .array_layers(1)
                .samples(vk::SampleCountFlags::TYPE_1)
                .tiling(vk::ImageTiling::OPTIMAL)
                .usage(usage_flags)
                .sharing_mode(vk::SharingMode::EXCLUSIVE)
                .initial_layout(vk::ImageLayout::UNDEFINED);

            let image = self.ctx.device.create_image(&image_create_info, None)
                .map_err(|e| engine_err!("emy::vulkan", "Failed to create texture image: {:?}", e))?;

            let requirements = self.ctx.device.get_image_memory_requirements(image);
            let allocation = match self.ctx.allocate("texture", requirements, MemoryLocation::GpuOnly, false) {
                Ok(allocation) => allocation,
                Err(e) => {
                    self.ctx.device.destroy_image(image, None);
                    return Err(e);
                }
            };

            let memory = allocation.memory();
            let offset = allocation.offset();
            let info = TextureInfo {
                width: desc.width,
                height: desc.height,
                format: desc.format,
                mip_levels,
            };
            // View and sampler are filled in below; null handles are ignored on drop
            let mut texture = Texture::new(
                Arc::clone(&self.ctx),
                image,
                vk::ImageView::null(),
                vk::Sampler::null(),
                allocation,
                info,
            );

            self.ctx.device.bind_image_memory(image, memory, offset)
                .map_err(|e| engine_err!("emy::vulkan", "Failed to bind texture image memory: {:?}", e))?;

            let view_create_info = vk::ImageViewCreateInfo::default()
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
                    aspect_mask: vk::ImageAspectFlags::COLOR,
                    base_mip_level: 0,
                    level_count: mip_levels,
                    base_array_layer: 0,
                    layer_count: 1,
                });

            texture.view = self.ctx.device.create_image_view(&view_create_info, None)
                .map_err(|e| engine_err!("emy::vulkan", "Failed to create texture image view: {:?}", e))?;

            let sampler_info = vk::SamplerCreateInfo::default()
                .mag_filter(vk::Filter::LINEAR)
                .min_filter(vk::Filter::LINEAR)
                .mipmap_mode(vk::SamplerMipmapMode::LINEAR)
                .address_mode_u(vk::SamplerAddressMode::REPEAT)
                .address_mode_v(vk::SamplerAddressMode::REPEAT)
                .address_mode_w(vk::SamplerAddressMode::REPEAT)
                .mip_lod_bias(0.0)
                .anisotropy_enable(self.ctx.max_sampler_anisotropy > 1.0)
                .max_anisotropy(self.ctx.max_sampler_anisotropy)
                .compare_enable(false)
                .compare_op(vk::CompareOp::ALWAYS)
                .min_lod(0.0)
                .max_lod(mip_levels as f32)
                .border_color(vk::BorderColor::INT_OPAQUE_BLACK)
                .unnormalized_coordinates(false);

            texture.sampler = self.ctx.device.create_sampler(&sampler_info, None)
                .map_err(|e| engine_err!("emy::vulkan", "Failed to create texture sampler: {:?}", e))?;

            // Staging upload, released when this scope ends
            let staging = self.create_host_buffer("texture_staging_buffer", expected, vk::BufferUsageFlags::TRANSFER_SRC)?;
            staging.update(0, &desc.data)?;

            let device = &self.ctx.device;
            let staging_buffer = staging.buffer;
            self.ctx.submit_one_shot(|command_buffer| {
                Self::record_texture_upload(
                    device,
                    command_buffer,
                    image,
                    staging_buffer,
                    desc.width,
                    desc.height,
                    mip_levels,
                );
                Ok(())
            })?;

            engine_debug!("emy::vulkan",
                "Texture created ({}x{}, {:?}, {} mip levels)", desc.width, desc.height, desc.format, mip_levels);

            Ok(Arc::new(texture))
        }
    }

    fn create_shader(&self, desc: ShaderDesc) -> Result<Arc<dyn RendererShader>> {
        let words = vulkan_shader::spirv_words(desc.name, desc.code)?;
        let reflected_bindings = vulkan_shader::reflect_bindings(desc.name, &words)?;

        let entry_point = CString::new(desc.entry_point)
            .map_err(|e| engine_warn_err!("emy::vulkan",
                "Shader '{}' has an invalid entry point name: {}", desc.name, e))?;

        let create_info = vk::ShaderModuleCreateInfo::default().code(&words);

        let module = unsafe {
            self.ctx.device.create_shader_module(&create_info, None)
                .map_err(|e| engine_err!("emy::vulkan", "Failed to create shader module '{}': {:?}", desc.name, e))?
        };

        engine_debug!("emy::vulkan",
            "Shader '{}' created ({:?}, {} descriptor bindings)", desc.name, desc.stage, reflected_bindings.len());

        Ok(Arc::new(Shader::new(
            Arc::clone(&self.ctx),
            module,
            desc.stage,
            desc.name,
            entry_point,
            reflected_bindings,
        )))
    }

    fn create_binding_layout(&self, entries: &[BindingLayoutEntry]) -> Result<Arc<dyn RendererBindingLayout>> {
        let bindings: Vec<vk::DescriptorSetLayoutBinding> = entries
            .iter()
            .map(|entry| {
                vk::DescriptorSetLayoutBinding::default()
                    .binding(entry.binding)
                    .descriptor_type(binding_type_to_vk(entry.binding_type))
                    .descriptor_count(1)
                    .stage_flags(stage_flags_to_vk(entry.stage_flags))
            })
            .collect();

        let layout_create = vk::DescriptorSetLayoutCreateInfo::default().bindings(&bindings);

        let layout = unsafe {
            self.ctx.device.create_descriptor_set_layout(&layout_create, None)
                .map_err(|e| engine_err!("emy::vulkan", "Failed to create descriptor set layout: {:?}", e))?
        };

        Ok(Arc::new(BindingLayout::new(Arc::clone(&self.ctx), layout, entries)))
    }

    fn create_pipeline(&self, desc: &PipelineDesc, swapchain: &dyn RendererSwapchain) -> Result<Arc<dyn RendererPipeline>> {
        let vk_swapchain = swapchain as *const dyn RendererSwapchain as *const Swapchain;
        let vk_swapchain = unsafe { &*vk_swapchain };

        let vk_layout = desc.binding_layout.as_ref() as *const dyn RendererBindingLayout as *const BindingLayout;
        let vk_layout = unsafe { &*vk_layout };

        let shaders: Vec<&Shader> = desc.stages
            .iter()
            .map(|shader| unsafe { &*(shader.as_ref() as *const dyn RendererShader as *const Shader) })
            .collect();

        let has_stage = |stage: ShaderStage| shaders.iter().any(|shader| shader.stage() == stage);
        if !has_stage(ShaderStage::Vertex) || !has_stage(ShaderStage::Fragment) {
            engine_error!("emy::vulkan", "Pipeline requires a vertex and a fragment shader");
            return Err(Error::InvalidState("Pipeline requires a vertex and a fragment shader".to_string()));
        }

        let mismatches: usize = shaders
            .iter()
            .map(|shader| shader.check_bindings(vk_layout.entries()))
            .sum();

        let shader_stages: Vec<vk::PipelineShaderStageCreateInfo> = shaders
            .iter()
            .map(|shader| {
                vk::PipelineShaderStageCreateInfo::default()
                    .stage(shader_stage_to_vk(shader.stage()))
                    .module(shader.module)
                    .name(&shader.entry_point)
            })
            .collect();

        // Vertex input state
        let vertex_bindings: Vec<vk::VertexInputBindingDescription> = desc.vertex_layout.bindings
            .iter()
            .map(|binding| vk::VertexInputBindingDescription {
                binding: binding.binding,
                stride: binding.stride,
                input_rate: input_rate_to_vk(binding.input_rate),
            })
            .collect();

        let vertex_attributes: Vec<vk::VertexInputAttributeDescription> = desc.vertex_layout.attributes
            .iter()
            .map(|attribute| vk::VertexInputAttributeDescription {
                location: attribute.location,
                binding: attribute.binding,
                format: buffer_format_to_vk(attribute.format),
                offset: attribute.offset,
            })
            .collect();

        let vertex_input_state = vk::PipelineVertexInputStateCreateInfo::default()
            .vertex_binding_descriptions(&vertex_bindings)
            .vertex_attribute_descriptions(&vertex_attributes);

        let input_assembly_state = vk::PipelineInputAssemblyStateCreateInfo::default()
            .topology(topology_to_vk(desc.topology))
            .primitive_restart_enable(false);

        // Viewport and scissor cover the swapchain extent (also set dynamically per frame)
        let extent = vk_swapchain.extent();
        let viewports = [vk::Viewport::default()
            .x(0.0)
            .y(0.0)
            .width(extent.width as f32)
            .height(extent.height as f32)
            .min_depth(0.0)
            .max_depth(1.0)];
        let scissors = [vk::Rect2D {
            offset: vk::Offset2D { x: 0, y: 0 },
            extent,
        }];
        let viewport_state = vk::PipelineViewportStateCreateInfo::default()
            .viewports(&viewports)
            .scissors(&scissors);

        let rasterization_state = vk::PipelineRasterizationStateCreateInfo::default()
            .depth_clamp_enable(false)
            .rasterizer_discard_enable(false)
            .polygon_mode(polygon_mode_to_vk(desc.rasterization.polygon_mode))
            .line_width(1.0)
            .cull_mode(cull_mode_to_vk(desc.rasterization.cull_mode))
            .front_face(front_face_to_vk(desc.rasterization.front_face))
            .depth_bias_enable(false);

        let depth_stencil_state = vk::PipelineDepthStencilStateCreateInfo::default()
            .depth_test_enable(desc.depth.test_enable)
            .depth_write_enable(desc.depth.write_enable)
            .depth_compare_op(compare_op_to_vk(desc.depth.compare_op))
            .depth_bounds_test_enable(false)
            .stencil_test_enable(false);

        let multisample_state = vk::PipelineMultisampleStateCreateInfo::default()
            .sample_shading_enable(false)
            .rasterization_samples(sample_count_to_vk(vk_swapchain.sample_count()));

        let mut color_blend_attachment = vk::PipelineColorBlendAttachmentState::default()
            .color_write_mask(vk::ColorComponentFlags::RGBA)
            .blend_enable(desc.blend_enable);
        if desc.blend_enable {
            color_blend_attachment = color_blend_attachment
                .src_color_blend_factor(vk::BlendFactor::SRC_ALPHA)
                .dst_color_blend_factor(vk::BlendFactor::ONE_MINUS_SRC_ALPHA)
                .color_blend_op(vk::BlendOp::ADD)
                .src_alpha_blend_factor(vk::BlendFactor::ONE)
                .dst_alpha_blend_factor(vk::BlendFactor::ZERO)
                .alpha_blend_op(vk::BlendOp::ADD);
        }

        let color_blend_state = vk::PipelineColorBlendStateCreateInfo::default()
            .logic_op_enable(false)
            .attachments(std::slice::from_ref(&color_blend_attachment));

        let dynamic_states = [vk::DynamicState::VIEWPORT, vk::DynamicState::SCISSOR];
        let dynamic_state = vk::PipelineDynamicStateCreateInfo::default()
            .dynamic_states(&dynamic_states);

        let set_layouts = [vk_layout.layout];
        let layout_create_info = vk::PipelineLayoutCreateInfo::default().set_layouts(&set_layouts);

        unsafe {
            let pipeline_layout = self.ctx.device.create_pipeline_layout(&layout_create_info, None)
                .map_err(|e| engine_err!("emy::vulkan", "Failed to create pipeline layout: {:?}", e))?;

            let pipeline_create_info = vk::GraphicsPipelineCreateInfo::default()
                .stages(&shader_stages)
                .vertex_input_state(&vertex_input_state)
                .input_assembly_state(&input_assembly_state)
                .viewport_state(&viewport_state)
                .rasterization_state(&rasterization_state)
                .depth_stencil_state(&depth_stencil_state)
                .multisample_state(&multisample_state)
                .color_blend_state(&color_blend_state)
                .dynamic_state(&dynamic_state)
                .layout(pipeline_layout)
                .render_pass(vk_swapchain.render_pass())
                .subpass(0);

            let pipelines = match self.ctx.device.create_graphics_pipelines(
                vk::PipelineCache::null(),
                &[pipeline_create_info],
                None,
            ) {
                Ok(pipelines) => pipelines,
                Err((_, e)) => {
                    self.ctx.device.destroy_pipeline_layout(pipeline_layout, None);
                    return Err(engine_err!("emy::vulkan", "Failed to create graphics pipeline: {:?}", e));
                }
            };

            engine_info!("emy::vulkan",
                "Pipeline created ({}x{}, {} stages, {:?}, {} binding mismatches)",
                extent.width, extent.height, shaders.len(), desc.rasterization.polygon_mode, mismatches);

            Ok(Arc::new(Pipeline::new(
                Arc::clone(&self.ctx),
                pipelines[0],
                pipeline_layout,
                extent,
            )))
        }
    }

    fn create_binding_group(
        &self,
        layout: &Arc<dyn RendererBindingLayout>,
        resources: &[BindingResource],
    ) -> Result<Arc<dyn RendererBindingGroup>> {
        let vk_layout = layout.as_ref() as *const dyn RendererBindingLayout as *const BindingLayout;
        let vk_layout = unsafe { &*vk_layout };
        let entries = vk_layout.entries();

        if resources.len() != entries.len() {
            engine_bail_warn!("emy::vulkan",
                "create_binding_group: {} resources for a layout with {} bindings",
                resources.len(), entries.len());
        }

        for (binding_index, resource) in resources.iter().enumerate() {
            let expected = entries
                .iter()
                .find(|entry| entry.binding == binding_index as u32)
                .map(|entry| entry.binding_type);
            let provided = match resource {
                BindingResource::UniformBuffer(_) => BindingType::UniformBuffer,
                BindingResource::SampledTexture(_) => BindingType::CombinedImageSampler,
            };
            if expected != Some(provided) {
                engine_bail_warn!("emy::vulkan",
                    "create_binding_group: binding {} expects {:?}, got {:?}",
                    binding_index, expected, provided);
            }
        }

        unsafe {
            let (pool, descriptor_set) = self.allocate_descriptor_set(vk_layout.layout)?;

            // Infos are collected first so the writes can borrow them
            let mut buffer_infos: Vec<vk::DescriptorBufferInfo> = Vec::new();
            let mut image_infos: Vec<vk::DescriptorImageInfo> = Vec::new();

            for resource in resources {
                match resource {
                    BindingResource::UniformBuffer(buffer) => {
                        let vk_buffer = *buffer as *const dyn RendererBuffer as *const Buffer;
                        let vk_buffer = &*vk_buffer;

                        buffer_infos.push(
                            vk::DescriptorBufferInfo::default()
                                .buffer(vk_buffer.buffer)
                                .offset(0)
                                .range(vk::WHOLE_SIZE)
                        );
                    }
                    BindingResource::SampledTexture(texture) => {
                        let vk_texture = *texture as *const dyn RendererTexture as *const Texture;
                        let vk_texture = &*vk_texture;

                        image_infos.push(
                            vk::DescriptorImageInfo::default()
                                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                                .image_view(vk_texture.view)
                                .sampler(vk_texture.sampler)
                        );
                    }
                }
            }

            let mut writes: Vec<vk::WriteDescriptorSet> = Vec::with_capacity(resources.len());
            let mut buffer_idx = 0usize;
            let mut image_idx = 0usize;

            for (binding_index, resource) in resources.iter().enumerate() {
                let write = vk::WriteDescriptorSet::default()
                    .dst_set(descriptor_set)
                    .dst_binding(binding_index as u32)
                    .dst_array_element(0);

                match resource {
                    BindingResource::UniformBuffer(_) => {
                        writes.push(write
                            .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
                            .buffer_info(std::slice::from_ref(&buffer_infos[buffer_idx])));
                        buffer_idx += 1;
                    }
                    BindingResource::SampledTexture(_) => {
                        writes.push(write
                            .descriptor_type(vk::DescriptorType::COMBINED_IMAGE_SAMPLER)
                            .image_info(std::slice::from_ref(&image_infos[image_idx])));
                        image_idx += 1;
                    }
                }
            }

            self.ctx.device.update_descriptor_sets(&writes, &[]);

            Ok(Arc::new(BindingGroup::new(
                Arc::clone(&self.ctx),
                pool,
                descriptor_set,
                resources.len(),
            )))
        }
    }

    fn create_command_list(&self) -> Result<Box<dyn RendererCommandList>> {
        let command_list = CommandList::new(Arc::clone(&self.ctx))?;
        Ok(Box::new(command_list))
    }

    fn wait_for_frame(&self, slot: usize) -> Result<()> {
        self.check_slot(slot)?;

        unsafe {
            self.ctx.device
                .wait_for_fences(&[self.frame_fences[slot]], true, u64::MAX)
                .map_err(|e| engine_err!("emy::vulkan", "Failed to wait for frame fence {}: {:?}", slot, e))
        }
    }

    fn submit_frame(
        &self,
        commands: &dyn RendererCommandList,
        swapchain: &dyn RendererSwapchain,
        slot: usize,
    ) -> Result<()> {
        self.check_slot(slot)?;

        let vk_commands = commands as *const dyn RendererCommandList as *const CommandList;
        let vk_commands = unsafe { &*vk_commands };

        let vk_swapchain = swapchain as *const dyn RendererSwapchain as *const Swapchain;
        let vk_swapchain = unsafe { &*vk_swapchain };

        let (image_available, render_finished) = vk_swapchain
            .sync_info(slot)
            .ok_or_else(|| engine_err!("emy::vulkan", "Swapchain has no semaphores for slot {}", slot))?;

        let fence = self.frame_fences[slot];
        let wait_semaphores = [image_available];
        let wait_stages = [vk::PipelineStageFlags::COLOR_ATTACHMENT_OUTPUT];
        let signal_semaphores = [render_finished];
        let command_buffers = [vk_commands.command_buffer()];

        let submit_info = vk::SubmitInfo::default()
            .wait_semaphores(&wait_semaphores)
            .wait_dst_stage_mask(&wait_stages)
            .command_buffers(&command_buffers)
            .signal_semaphores(&signal_semaphores);

        unsafe {
            self.ctx.device
                .reset_fences(&[fence])
                .map_err(|e| engine_err!("emy::vulkan", "Failed to reset frame fence {}: {:?}", slot, e))?;

            let _queue = self.ctx.lock_queue()?;
            self.ctx.device
                .queue_submit(self.ctx.graphics_queue, &[submit_info], fence)
                .map_err(|e| engine_err!("emy::vulkan", "Failed to submit frame to GPU queue: {:?}", e))?;
        }

        let frames = self.frames_submitted.fetch_add(1, Ordering::Relaxed) + 1;
        engine_trace!("emy::vulkan", "Frame {} submitted on slot {}", frames, slot);
        Ok(())
    }

    fn wait_present_idle(&self) -> Result<()> {
        let _queue = self.ctx.lock_queue()?;
        unsafe {
            self.ctx.device
                .queue_wait_idle(self.ctx.present_queue)
                .map_err(|e| engine_err!("emy::vulkan", "Failed to wait for present queue: {:?}", e))
        }
    }

    fn wait_idle(&self) -> Result<()> {
        let _queue = self.ctx.lock_queue()?;
        unsafe {
            self.ctx.device
                .device_wait_idle()
                .map_err(|e| engine_err!("emy::vulkan", "Failed to wait idle: {:?}", e))
        }
    }

    fn msaa_samples(&self) -> SampleCount {
        self.msaa_samples
    }

    fn stats(&self) -> GraphicsDeviceStats {
        GraphicsDeviceStats {
            frames_submitted: self.frames_submitted.load(Ordering::Relaxed),
            gpu_memory_used: self.ctx.memory_used(),
            descriptor_pools: self.ctx.descriptor_pools.lock().map(|pools| pools.len() as u32).unwrap_or(0),
        }
    }
}

impl Drop for VulkanGraphicsDevice {
    fn drop(&mut self) {
        unsafe {
            // Wait for device to finish
            self.ctx.device.device_wait_idle().ok();

            // 1. Device-owned objects
            for &fence in &self.frame_fences {
                self.ctx.device.destroy_fence(fence, None);
            }
            self.ctx.destroy_pools();

            // 2. Drop allocator: free VkDeviceMemory pages BEFORE destroying device.
            //    Only possible once every resource has released its context.
            match Arc::get_mut(&mut self.ctx) {
                Some(ctx) => ManuallyDrop::drop(&mut ctx.allocator),
                None => engine_warn!("emy::vulkan",
                    "GPU resources still alive at device destruction, allocator leaked"),
            }

            // 3. Debug messenger BEFORE device and instance
            #[cfg(feature = "vulkan-validation")]
            {
                crate::debug::cleanup_debug_config();
                if let Some((debug_utils, messenger)) = self.debug_messenger.take() {
                    debug_utils.destroy_debug_utils_messenger(messenger, None);
                }
            }

            // 4. Destroy device and instance
            self.ctx.device.destroy_device(None);
            self.ctx.instance.destroy_instance(None);
        }

        engine_info!("emy::vulkan", "Vulkan device destroyed");
    }
}
