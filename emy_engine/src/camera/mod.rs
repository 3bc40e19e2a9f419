//! Camera module - viewer and light state shared by every model.

mod camera;
mod light;

pub use camera::{Camera, FIELD_OF_VIEW_DEGREES, NEAR_PLANE, FAR_PLANE, WORLD_UP};
pub use light::Light;
