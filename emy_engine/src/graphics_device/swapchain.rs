/// Swapchain trait - window presentation and the attachments drawn into it

use crate::error::Result;
use crate::graphics_device::{SampleCount, TextureFormat};

/// Outcome of acquiring a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireResult {
    /// Image acquired; `suboptimal` means it can still be rendered and presented
    Image { index: u32, suboptimal: bool },
    /// Swapchain no longer matches the surface, nothing was acquired
    OutOfDate,
}

/// Outcome of presenting a swapchain image
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PresentResult {
    Optimal,
    Suboptimal,
    OutOfDate,
}

impl PresentResult {
    /// Whether the swapchain should be recreated before the next frame
    pub fn needs_recreate(&self) -> bool {
        !matches!(self, PresentResult::Optimal)
    }
}

/// Swapchain for presenting rendered images to a window
///
/// Owns the presentable images, the render pass that targets them, the
/// multisampled color and depth attachments, one framebuffer per image, and
/// the per-frame-slot "image available" / "render finished" semaphores.
pub trait Swapchain: Send + Sync {
    /// Acquire the next image, signaling the "image available" semaphore of `slot`
    fn acquire_next_image(&mut self, slot: usize) -> Result<AcquireResult>;

    /// Present `image_index` after the "render finished" semaphore of `slot`
    fn present(&mut self, image_index: u32, slot: usize) -> Result<PresentResult>;

    /// Recreate images, attachments and framebuffers at the given size
    ///
    /// The caller must ensure the device is idle.
    fn recreate(&mut self, width: u32, height: u32) -> Result<()>;

    /// Number of swapchain images
    fn image_count(&self) -> usize;

    /// Width of the swapchain images in pixels
    fn width(&self) -> u32;

    /// Height of the swapchain images in pixels
    fn height(&self) -> u32;

    /// Pixel format of the swapchain images
    fn format(&self) -> TextureFormat;

    /// Sample count of the color and depth attachments
    fn sample_count(&self) -> SampleCount;
}
