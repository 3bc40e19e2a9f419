/// Per-model uniform block (binding 0, vertex stage)

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};
use crate::camera::{Camera, Light};

/// GPU layout of the uniform block, std140-compatible (256 bytes)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct UniformBufferObject {
    pub view: Mat4,
    pub proj: Mat4,
    pub model: Mat4,
    pub view_pos: Vec4,
    pub light_dir: Vec4,
    pub light_color: Vec4,
    pub light_setting: Vec4,
}

/// Part of the uniform block shared by every model in a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameUniforms {
    pub view: Mat4,
    pub projection: Mat4,
    pub camera_position: Vec3,
    pub light: Light,
}

impl FrameUniforms {
    /// Compute view and projection once for a `width` x `height` target
    pub fn new(camera: &Camera, light: &Light, width: u32, height: u32) -> Self {
        Self {
            view: camera.view_matrix(),
            projection: camera.projection_matrix(width, height),
            camera_position: camera.position(),
            light: *light,
        }
    }

    /// Full uniform block for one model
    pub fn for_model(&self, model: Mat4) -> UniformBufferObject {
        UniformBufferObject {
            view: self.view,
            proj: self.projection,
            model,
            view_pos: self.camera_position.extend(1.0),
            light_dir: self.light.direction.extend(0.0),
            light_color: self.light.color.extend(1.0),
            light_setting: Vec4::new(self.light.settings.x, self.light.settings.y, 0.0, 0.0),
        }
    }
}
