/*!
# Emy Engine

Core types of the Emy real-time 3D renderer.

The crate is backend-agnostic: GPU objects are created through the
`GraphicsDevice` trait, implemented by a backend crate such as
`emy_engine_renderer_vulkan`.

## Architecture

- **GraphicsDevice / Swapchain / CommandList**: device abstraction
- **ResourceManager**: meshes, textures and pipeline states keyed by slot map handles
- **Scene**: pipeline → mesh → model index walked for batched drawing
- **Renderer**: frame orchestrator (fences, acquire, record, submit, present, resize)
- **Engine**: process-wide logger and single-renderer guard
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod graphics_device;
pub mod resource;
pub mod camera;
pub mod scene;
pub mod renderer;

// Main emy namespace module
pub mod emy {
    // Error types
    pub use crate::error::{Error, Result};

    // Process-wide services
    pub use crate::engine::{Engine, RendererSlot};

    // Frame orchestrator
    pub use crate::renderer::Renderer;

    // Logging sub-module (types only, macros live at the crate root)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Device abstraction
    pub mod render {
        pub use crate::graphics_device::*;
    }

    // Resource sub-module
    pub mod resource {
        pub use crate::resource::*;
    }

    // Camera and light
    pub mod camera {
        pub use crate::camera::*;
    }

    // Scene sub-module
    pub mod scene {
        pub use crate::scene::*;
    }

    // Frame orchestration sub-module
    pub mod renderer {
        pub use crate::renderer::*;
    }
}

// Re-export math library at crate root
pub use glam;
