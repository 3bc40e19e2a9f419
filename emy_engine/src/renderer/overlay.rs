/// Overlay collaborator (debug UI, HUD)

use crate::error::Result;
use crate::graphics_device::CommandList;

/// Draws on top of the scene inside the frame's render pass.
///
/// Called once per presented frame, after every scene draw and before the
/// render pass ends. Pipeline, binding and viewport state is whatever the
/// scene left bound; implementations set what they need.
pub trait Overlay {
    fn render_into(&mut self, cmd: &mut dyn CommandList) -> Result<()>;
}
