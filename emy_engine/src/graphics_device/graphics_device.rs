/// GraphicsDevice trait - backend factory and frame submission interface

use std::sync::Arc;
use crate::error::Result;
use crate::graphics_device::{
    Buffer, Texture, Shader, Pipeline, BindingLayout, BindingGroup, CommandList, Swapchain,
    BufferDesc, TextureDesc, ShaderDesc, PipelineDesc, BindingLayoutEntry, BindingResource,
    SampleCount,
};

// ============================================================================
// Configuration
// ============================================================================

/// Severity filter for validation layer messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DebugSeverity {
    /// Only errors
    ErrorsOnly,
    /// Errors and warnings
    ErrorsAndWarnings,
    /// Everything including info and verbose
    All,
}

/// Destination of validation layer messages
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DebugOutput {
    /// Engine logger only
    Console,
    /// Append to a file
    File(String),
    /// Logger and file
    Both(String),
}

/// Message type filter for validation layer messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessageFilter {
    pub show_general: bool,
    pub show_validation: bool,
    pub show_performance: bool,
}

impl Default for DebugMessageFilter {
    fn default() -> Self {
        Self {
            show_general: true,
            show_validation: true,
            show_performance: true,
        }
    }
}

/// Device configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Enable validation/debug layers
    pub enable_validation: bool,
    /// Application name
    pub app_name: String,
    /// Application version (major, minor, patch)
    pub app_version: (u32, u32, u32),
    /// Requested MSAA sample count, clamped to what the device supports
    pub msaa_samples: SampleCount,
    /// Validation message severity filter
    pub debug_severity: DebugSeverity,
    /// Validation message destination
    pub debug_output: DebugOutput,
    /// Validation message type filter
    pub debug_message_filter: DebugMessageFilter,
    /// Trigger a debugger break on validation errors
    pub break_on_validation_error: bool,
    /// Panic on validation errors
    pub panic_on_error: bool,
    /// Count validation messages by severity
    pub enable_validation_stats: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enable_validation: cfg!(debug_assertions),
            app_name: "Emy Application".to_string(),
            app_version: (1, 0, 0),
            msaa_samples: SampleCount::S8,
            debug_severity: DebugSeverity::ErrorsAndWarnings,
            debug_output: DebugOutput::Console,
            debug_message_filter: DebugMessageFilter::default(),
            break_on_validation_error: false,
            panic_on_error: false,
            enable_validation_stats: false,
        }
    }
}

// ============================================================================
// Statistics
// ============================================================================

/// Validation layer message counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationStats {
    pub errors: u32,
    pub warnings: u32,
    pub info: u32,
    pub verbose: u32,
}

impl ValidationStats {
    /// Sum of all counters
    pub fn total(&self) -> u32 {
        self.errors + self.warnings + self.info + self.verbose
    }
}

/// Device statistics
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphicsDeviceStats {
    /// Frames submitted to the graphics queue
    pub frames_submitted: u64,
    /// GPU memory allocated for buffers and textures (bytes)
    pub gpu_memory_used: u64,
    /// Descriptor pools backing binding groups
    pub descriptor_pools: u32,
}

// ============================================================================
// GraphicsDevice trait
// ============================================================================

/// Main device trait
///
/// Central factory for GPU resources plus the per-frame-slot fences.
/// Implemented by backend-specific devices (e.g., VulkanGraphicsDevice).
/// Every `Err` returned here is fatal for the renderer.
pub trait GraphicsDevice: Send + Sync {
    /// Create a host-visible buffer
    fn create_buffer(&self, desc: BufferDesc) -> Result<Arc<dyn Buffer>>;

    /// Create a sampled texture and upload its pixels
    fn create_texture(&self, desc: TextureDesc) -> Result<Arc<dyn Texture>>;

    /// Create a shader module from SPIR-V
    fn create_shader(&self, desc: ShaderDesc) -> Result<Arc<dyn Shader>>;

    /// Create a descriptor set layout
    fn create_binding_layout(&self, entries: &[BindingLayoutEntry]) -> Result<Arc<dyn BindingLayout>>;

    /// Create a graphics pipeline targeting the render pass and extent of `swapchain`
    fn create_pipeline(&self, desc: &PipelineDesc, swapchain: &dyn Swapchain) -> Result<Arc<dyn Pipeline>>;

    /// Allocate and write a binding group, `resources[i]` going to binding `i`
    fn create_binding_group(
        &self,
        layout: &Arc<dyn BindingLayout>,
        resources: &[BindingResource],
    ) -> Result<Arc<dyn BindingGroup>>;

    /// Create a primary command list
    fn create_command_list(&self) -> Result<Box<dyn CommandList>>;

    /// Block until the fence of frame `slot` signals
    fn wait_for_frame(&self, slot: usize) -> Result<()>;

    /// Reset the fence of `slot` and submit `commands` to the graphics queue
    ///
    /// Waits on the swapchain "image available" semaphore of `slot` at the
    /// color attachment output stage, signals its "render finished"
    /// semaphore and the fence of `slot`.
    fn submit_frame(&self, commands: &dyn CommandList, swapchain: &dyn Swapchain, slot: usize) -> Result<()>;

    /// Block until the present queue is idle
    fn wait_present_idle(&self) -> Result<()>;

    /// Block until the whole device is idle
    fn wait_idle(&self) -> Result<()>;

    /// Sample count used for the color and depth attachments
    fn msaa_samples(&self) -> SampleCount;

    /// Device statistics
    fn stats(&self) -> GraphicsDeviceStats;
}
