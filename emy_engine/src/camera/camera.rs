/// Camera - position and viewing direction driving the shared view and
/// projection matrices.
///
/// The engine stores one camera; the caller moves it between frames and the
/// renderer recomputes both matrices once per frame.

use glam::{Mat4, Vec3};
use crate::engine_warn;

/// Vertical field of view
pub const FIELD_OF_VIEW_DEGREES: f32 = 45.0;
/// Near clip plane distance
pub const NEAR_PLANE: f32 = 0.1;
/// Far clip plane distance
pub const FAR_PLANE: f32 = 10000.0;
/// World up vector (Z-up)
pub const WORLD_UP: Vec3 = Vec3::Z;
/// Up vector used when looking along `WORLD_UP`
pub const FALLBACK_UP: Vec3 = Vec3::Y;
/// Viewing direction used when the camera direction is zero
pub const FALLBACK_DIRECTION: Vec3 = Vec3::NEG_Y;

/// Camera placed at `position`, looking along `direction`.
///
/// `direction` need not be normalized. A zero direction looks along
/// `FALLBACK_DIRECTION`, and a direction parallel to `WORLD_UP` uses
/// `FALLBACK_UP` as the up vector, so the view matrix stays finite.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    position: Vec3,
    direction: Vec3,
}

impl Camera {
    pub fn new(position: Vec3, direction: Vec3) -> Self {
        Self { position, direction }
    }

    // ===== GETTERS =====

    pub fn position(&self) -> Vec3 {
        self.position
    }

    pub fn direction(&self) -> Vec3 {
        self.direction
    }

    // ===== SETTERS =====

    pub fn set_position(&mut self, position: Vec3) {
        self.position = position;
    }

    pub fn set_direction(&mut self, direction: Vec3) {
        if direction == Vec3::ZERO {
            engine_warn!("emy::Camera", "Zero camera direction, looking along {:?}", FALLBACK_DIRECTION);
        }
        self.direction = direction;
    }

    // ===== MATRICES =====

    /// Right-handed look-at from `position` toward `position + normalize(direction)`
    pub fn view_matrix(&self) -> Mat4 {
        let forward = self.direction.try_normalize().unwrap_or(FALLBACK_DIRECTION);
        let up = if forward.cross(WORLD_UP).length_squared() < 1e-6 {
            FALLBACK_UP
        } else {
            WORLD_UP
        };
        Mat4::look_at_rh(self.position, self.position + forward, up)
    }

    /// Perspective projection for a `width` x `height` target.
    ///
    /// Zero-to-one depth range; the Y term is negated so +Y points up in
    /// framebuffer space.
    pub fn projection_matrix(&self, width: u32, height: u32) -> Mat4 {
        let aspect = width.max(1) as f32 / height.max(1) as f32;
        let mut projection = Mat4::perspective_rh(
            FIELD_OF_VIEW_DEGREES.to_radians(),
            aspect,
            NEAR_PLANE,
            FAR_PLANE,
        );
        projection.y_axis.y *= -1.0;
        projection
    }
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(Vec3::new(0.0, 5.0, 0.0), Vec3::new(0.0, -1.0, 0.0))
    }
}

#[cfg(test)]
#[path = "camera_tests.rs"]
mod tests;
