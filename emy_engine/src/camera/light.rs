/// Directional scene light uploaded with every model's uniform block

use glam::{Vec2, Vec3};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    /// Direction toward the light
    pub direction: Vec3,
    /// Linear RGB color
    pub color: Vec3,
    /// Shader-defined parameters (x: intensity, y: ambient factor)
    pub settings: Vec2,
}

impl Default for Light {
    fn default() -> Self {
        Self {
            direction: Vec3::new(0.1, 1.0, 1.0),
            color: Vec3::ONE,
            settings: Vec2::new(5.0, 1.0),
        }
    }
}
