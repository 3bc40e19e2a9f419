/*!
# Emy Engine - Vulkan Backend

Vulkan implementation of the `emy_engine` device traits, built on `ash`
for the API bindings and `gpu-allocator` for memory management.

```no_run
use std::sync::Arc;
use emy_engine::emy::render::{Config, GraphicsDevice};
use emy_engine_renderer_vulkan::emy::VulkanGraphicsDevice;
# fn run(window: &winit::window::Window) -> emy_engine::emy::Result<()> {
let device = VulkanGraphicsDevice::new(window, &Config::default())?;
let swapchain = device.create_swapchain(window)?;
let device: Arc<dyn GraphicsDevice> = Arc::new(device);
# let _ = (device, swapchain);
# Ok(())
# }
```

Validation layer support (debug messenger, statistics) is compiled in with
the `vulkan-validation` feature.
*/

// Vulkan implementation modules
mod vulkan;
mod vulkan_context;
mod vulkan_format;
mod vulkan_buffer;
mod vulkan_texture;
mod vulkan_shader;
mod vulkan_binding_layout;
mod vulkan_binding_group;
mod vulkan_pipeline;
mod vulkan_command_list;
mod vulkan_swapchain;
#[cfg(feature = "vulkan-validation")]
mod debug;

// Main emy namespace module
pub mod emy {
    pub use crate::vulkan::VulkanGraphicsDevice;
    pub use crate::vulkan_swapchain::Swapchain as VulkanSwapchain;

    // Validation statistics
    #[cfg(feature = "vulkan-validation")]
    pub use crate::debug::{get_validation_stats, print_validation_stats_report};
}
