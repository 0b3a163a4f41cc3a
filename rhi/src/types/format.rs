//! Image formats and per-format capabilities.
//!
//! Formats are passed through to the backend unchanged. The only questions
//! the RHI answers about them are size/aspect queries and what the device
//! can do with each format (see [`FormatCapabilities`]).

use bitflags::bitflags;

/// Pixel format of a texture, render target or vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
#[repr(u32)]
pub enum ImageFormat {
    /// No format.
    #[default]
    Undefined = 0,

    // 8-bit
    /// 8-bit red, unsigned normalized.
    R8Unorm,
    /// 8-bit red, signed normalized.
    R8Snorm,
    /// 8-bit red, unsigned integer.
    R8Uint,
    /// 8-bit red/green, unsigned normalized.
    R8G8Unorm,

    // 16-bit
    /// 16-bit red, unsigned integer.
    R16Uint,
    /// 16-bit red, float.
    R16Sfloat,
    /// 16-bit red/green, float.
    R16G16Sfloat,

    // 32-bit
    /// 8-bit RGBA, unsigned normalized.
    R8G8B8A8Unorm,
    /// 8-bit RGBA, sRGB.
    R8G8B8A8Srgb,
    /// 8-bit BGRA, unsigned normalized.
    B8G8R8A8Unorm,
    /// 8-bit BGRA, sRGB.
    B8G8R8A8Srgb,
    /// 10-bit RGB with 2-bit alpha, unsigned normalized.
    A2R10G10B10Unorm,
    /// Packed unsigned 11/11/10-bit float.
    B10G11R11Ufloat,
    /// 32-bit red, unsigned integer.
    R32Uint,
    /// 32-bit red, float.
    R32Sfloat,

    // 64-bit and wider
    /// 16-bit RGBA, float.
    R16G16B16A16Sfloat,
    /// 32-bit red/green, float.
    R32G32Sfloat,
    /// 32-bit RGB, float.
    R32G32B32Sfloat,
    /// 32-bit RGBA, float.
    R32G32B32A32Sfloat,

    // Depth/stencil
    /// 16-bit depth.
    D16Unorm,
    /// 24-bit depth with 8-bit stencil.
    D24UnormS8Uint,
    /// 32-bit float depth.
    D32Sfloat,
    /// 32-bit float depth with 8-bit stencil.
    D32SfloatS8Uint,

    // Block compressed
    /// BC1 RGBA, unsigned normalized.
    Dxbc1RgbaUnorm,
    /// BC3 RGBA, unsigned normalized.
    Dxbc3Unorm,
    /// BC5 two-channel, unsigned normalized.
    Dxbc5Unorm,
    /// BC7 RGBA, unsigned normalized.
    Dxbc7Unorm,
    /// BC7 RGBA, sRGB.
    Dxbc7Srgb,
}

impl ImageFormat {
    /// Every defined format, in declaration order.
    pub const ALL: &'static [ImageFormat] = &[
        Self::R8Unorm,
        Self::R8Snorm,
        Self::R8Uint,
        Self::R8G8Unorm,
        Self::R16Uint,
        Self::R16Sfloat,
        Self::R16G16Sfloat,
        Self::R8G8B8A8Unorm,
        Self::R8G8B8A8Srgb,
        Self::B8G8R8A8Unorm,
        Self::B8G8R8A8Srgb,
        Self::A2R10G10B10Unorm,
        Self::B10G11R11Ufloat,
        Self::R32Uint,
        Self::R32Sfloat,
        Self::R16G16B16A16Sfloat,
        Self::R32G32Sfloat,
        Self::R32G32B32Sfloat,
        Self::R32G32B32A32Sfloat,
        Self::D16Unorm,
        Self::D24UnormS8Uint,
        Self::D32Sfloat,
        Self::D32SfloatS8Uint,
        Self::Dxbc1RgbaUnorm,
        Self::Dxbc3Unorm,
        Self::Dxbc5Unorm,
        Self::Dxbc7Unorm,
        Self::Dxbc7Srgb,
    ];

    /// Size in bytes of one pixel, or of one 4x4 block for compressed formats.
    pub fn bytes_per_block(self) -> u32 {
        match self {
            Self::Undefined => 0,
            Self::R8Unorm | Self::R8Snorm | Self::R8Uint => 1,
            Self::R8G8Unorm | Self::R16Uint | Self::R16Sfloat | Self::D16Unorm => 2,
            Self::R16G16Sfloat
            | Self::R8G8B8A8Unorm
            | Self::R8G8B8A8Srgb
            | Self::B8G8R8A8Unorm
            | Self::B8G8R8A8Srgb
            | Self::A2R10G10B10Unorm
            | Self::B10G11R11Ufloat
            | Self::R32Uint
            | Self::R32Sfloat
            | Self::D24UnormS8Uint
            | Self::D32Sfloat => 4,
            Self::R16G16B16A16Sfloat
            | Self::R32G32Sfloat
            | Self::D32SfloatS8Uint
            | Self::Dxbc1RgbaUnorm => 8,
            Self::R32G32B32Sfloat => 12,
            Self::R32G32B32A32Sfloat
            | Self::Dxbc3Unorm
            | Self::Dxbc5Unorm
            | Self::Dxbc7Unorm
            | Self::Dxbc7Srgb => 16,
        }
    }

    /// Width and height in pixels of one block.
    pub fn block_extent(self) -> (u32, u32) {
        if self.is_compressed() { (4, 4) } else { (1, 1) }
    }

    /// Returns true for depth and depth/stencil formats.
    pub fn is_depth(self) -> bool {
        matches!(
            self,
            Self::D16Unorm | Self::D24UnormS8Uint | Self::D32Sfloat | Self::D32SfloatS8Uint
        )
    }

    /// Returns true if the format has a stencil aspect.
    pub fn has_stencil(self) -> bool {
        matches!(self, Self::D24UnormS8Uint | Self::D32SfloatS8Uint)
    }

    /// Returns true for block-compressed formats.
    pub fn is_compressed(self) -> bool {
        matches!(
            self,
            Self::Dxbc1RgbaUnorm
                | Self::Dxbc3Unorm
                | Self::Dxbc5Unorm
                | Self::Dxbc7Unorm
                | Self::Dxbc7Srgb
        )
    }

    /// Returns true for sRGB-encoded formats.
    pub fn is_srgb(self) -> bool {
        matches!(
            self,
            Self::R8G8B8A8Srgb | Self::B8G8R8A8Srgb | Self::Dxbc7Srgb
        )
    }

    /// Bytes needed for a tightly packed `width` x `height` x `depth` image.
    pub fn surface_size(self, width: u32, height: u32, depth: u32) -> u64 {
        let (bw, bh) = self.block_extent();
        let blocks_x = width.div_ceil(bw) as u64;
        let blocks_y = height.div_ceil(bh) as u64;
        blocks_x * blocks_y * depth.max(1) as u64 * self.bytes_per_block() as u64
    }
}

bitflags! {
    /// What the device can do with a given format.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FormatCapabilities: u32 {
        /// Format can be sampled/read in shaders.
        const SHADER_READ = 1 << 0;
        /// Format can be written in shaders (storage image).
        const SHADER_WRITE = 1 << 1;
        /// Format can be used as a color attachment.
        const COLOR_WRITE = 1 << 2;
        /// Format can be used as a depth/stencil attachment.
        const DEPTH_STENCIL = 1 << 3;
        /// Format can be used as a vertex attribute.
        const VERTEX = 1 << 4;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_formats() {
        assert!(ImageFormat::D32Sfloat.is_depth());
        assert!(!ImageFormat::D32Sfloat.has_stencil());
        assert!(ImageFormat::D24UnormS8Uint.has_stencil());
        assert!(!ImageFormat::R8G8B8A8Unorm.is_depth());
    }

    #[test]
    fn test_surface_size() {
        assert_eq!(ImageFormat::R8G8B8A8Unorm.surface_size(4, 4, 1), 64);
        // 8x8 BC1 image is 2x2 blocks of 8 bytes
        assert_eq!(ImageFormat::Dxbc1RgbaUnorm.surface_size(8, 8, 1), 32);
        // Partial blocks round up
        assert_eq!(ImageFormat::Dxbc7Unorm.surface_size(5, 1, 1), 32);
    }

    #[test]
    fn test_all_formats_have_size() {
        for format in ImageFormat::ALL {
            assert!(format.bytes_per_block() > 0, "{format:?}");
        }
    }
}
