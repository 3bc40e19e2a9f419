/// Renderer configuration

use crate::camera::{Camera, Light};

/// Frame orchestrator configuration
#[derive(Debug, Clone)]
pub struct RendererConfig {
    /// Color attachment clear value (linear RGBA)
    pub clear_color: [f32; 4],
    /// Depth attachment clear value
    pub clear_depth: f32,
    /// Initial camera
    pub camera: Camera,
    /// Initial scene light
    pub light: Light,
}

impl Default for RendererConfig {
    fn default() -> Self {
        Self {
            clear_color: [100.0 / 255.0, 149.0 / 255.0, 237.0 / 255.0, 1.0],
            clear_depth: 1.0,
            camera: Camera::default(),
            light: Light::default(),
        }
    }
}
