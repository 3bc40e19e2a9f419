/// Window surface collaborator

use std::sync::Arc;
use winit::event::WindowEvent;
use winit::window::Window;

/// What the renderer needs to know about the window it presents to
pub trait WindowSurface {
    /// Current framebuffer size in pixels; (0, 0) while minimized
    fn extent(&self) -> (u32, u32);

    /// Whether the window was resized since the last call, clearing the flag
    fn take_resized(&mut self) -> bool;
}

/// `WindowSurface` over a winit window.
///
/// Feed it the window's events with `handle_event`.
pub struct WinitSurface {
    window: Arc<Window>,
    resized: bool,
}

impl WinitSurface {
    pub fn new(window: Arc<Window>) -> Self {
        Self { window, resized: false }
    }

    pub fn window(&self) -> &Arc<Window> {
        &self.window
    }

    /// Record resize events; other events are ignored
    pub fn handle_event(&mut self, event: &WindowEvent) {
        if matches!(event, WindowEvent::Resized(_) | WindowEvent::ScaleFactorChanged { .. }) {
            self.resized = true;
        }
    }
}

impl WindowSurface for WinitSurface {
    fn extent(&self) -> (u32, u32) {
        let size = self.window.inner_size();
        (size.width, size.height)
    }

    fn take_resized(&mut self) -> bool {
        std::mem::take(&mut self.resized)
    }
}
