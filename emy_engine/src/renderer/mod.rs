/// Renderer module - frame orchestration on top of a graphics device

// Module declarations
pub mod renderer;
pub mod config;
pub mod overlay;
pub mod surface;

/// Number of frames that may be recorded or executing at once
pub const MAX_FRAMES_IN_FLIGHT: usize = 2;

pub use renderer::*;
pub use config::*;
pub use overlay::*;
pub use surface::*;
