/// Texture trait, texture descriptor, and texture info

/// Texture and attachment format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(non_camel_case_types)]
pub enum TextureFormat {
    R8G8B8A8_SRGB,
    R8G8B8A8_UNORM,
    B8G8R8A8_SRGB,
    B8G8R8A8_UNORM,
    D32_FLOAT,
    D32_FLOAT_S8_UINT,
    D24_UNORM_S8_UINT,
}

impl TextureFormat {
    /// Whether this is a depth (or depth/stencil) format
    pub fn is_depth(&self) -> bool {
        matches!(
            self,
            TextureFormat::D32_FLOAT | TextureFormat::D32_FLOAT_S8_UINT | TextureFormat::D24_UNORM_S8_UINT
        )
    }

    /// Bytes per pixel for color formats, `None` for depth formats
    pub fn bytes_per_pixel(&self) -> Option<u32> {
        if self.is_depth() { None } else { Some(4) }
    }
}

/// Descriptor for creating a sampled 2D texture
#[derive(Debug, Clone)]
pub struct TextureDesc {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Pixel format of `data`
    pub format: TextureFormat,
    /// Pixel data, tightly packed, row-major
    pub data: Vec<u8>,
    /// Generate the full mip chain from level 0
    pub generate_mipmaps: bool,
}

impl TextureDesc {
    /// Number of mip levels this descriptor produces
    pub fn mip_levels(&self) -> u32 {
        if self.generate_mipmaps {
            mip_level_count(self.width, self.height)
        } else {
            1
        }
    }
}

/// Full mip chain length: floor(log2(max(width, height))) + 1
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

/// Read-only texture properties
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureInfo {
    pub width: u32,
    pub height: u32,
    pub format: TextureFormat,
    pub mip_levels: u32,
}

/// Texture resource trait (image + view + sampler)
pub trait Texture: Send + Sync {
    /// Texture properties
    fn info(&self) -> &TextureInfo;
}
