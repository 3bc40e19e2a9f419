/// BindingGroup trait and binding resources
///
/// A binding group is an immutable descriptor set written once at creation.
/// Each model owns one per frame slot, pointing at that slot's uniform buffer
/// and the model's two textures.

use crate::graphics_device::{Buffer, Texture};

/// One resource written into a binding group slot, in binding order
#[derive(Clone, Copy)]
pub enum BindingResource<'a> {
    /// Uniform buffer, whole range
    UniformBuffer(&'a dyn Buffer),
    /// Texture with its own sampler
    SampledTexture(&'a dyn Texture),
}

/// Descriptor set trait
///
/// Freed back to its pool when dropped.
pub trait BindingGroup: Send + Sync {
    /// Number of bindings written at creation
    fn binding_count(&self) -> usize;
}
