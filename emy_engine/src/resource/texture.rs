/// Resource-level texture type.
///
/// Wraps a sampled GPU texture (image + view + sampler) with the metadata
/// models need: mip count and whether the source had alpha.

use std::sync::Arc;
use crate::error::Result;
use crate::engine_bail_warn;
use crate::graphics_device::{self, TextureFormat};
use crate::resource::loader::ImageData;

/// GPU-resident texture owned by the ResourceManager
pub struct Texture {
    name: String,
    graphics_device_texture: Arc<dyn graphics_device::Texture>,
    has_alpha: bool,
}

impl Texture {
    /// Upload `image` as an sRGB texture, optionally with a full mip chain
    pub(crate) fn from_image(
        graphics_device: &dyn graphics_device::GraphicsDevice,
        name: &str,
        image: &ImageData,
        generate_mipmaps: bool,
    ) -> Result<Self> {
        if image.width == 0 || image.height == 0 {
            engine_bail_warn!("emy::Texture", "Texture '{}' has zero size", name);
        }
        let expected = image.width as usize * image.height as usize * 4;
        if image.pixels.len() != expected {
            engine_bail_warn!("emy::Texture",
                "Texture '{}' has {} bytes of pixels, expected {}",
                name, image.pixels.len(), expected);
        }

        let graphics_device_texture = graphics_device.create_texture(graphics_device::TextureDesc {
            width: image.width,
            height: image.height,
            format: TextureFormat::R8G8B8A8_SRGB,
            data: image.pixels.clone(),
            generate_mipmaps,
        })?;

        Ok(Self {
            name: name.to_string(),
            graphics_device_texture,
            has_alpha: image.has_alpha,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Underlying GPU texture
    pub fn graphics_device_texture(&self) -> &Arc<dyn graphics_device::Texture> {
        &self.graphics_device_texture
    }

    pub fn has_alpha(&self) -> bool {
        self.has_alpha
    }

    pub fn mip_levels(&self) -> u32 {
        self.graphics_device_texture.info().mip_levels
    }

    pub fn width(&self) -> u32 {
        self.graphics_device_texture.info().width
    }

    pub fn height(&self) -> u32 {
        self.graphics_device_texture.info().height
    }
}

#[cfg(test)]
#[path = "texture_tests.rs"]
mod tests;
