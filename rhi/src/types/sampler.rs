//! Sampler types and descriptors.

/// Texel filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum FilterType {
    /// Nearest texel.
    #[default]
    Nearest = 0,
    /// Linear interpolation.
    Linear,
}

/// Behaviour outside the `[0, 1]` texture coordinate range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum AddressMode {
    /// Mirror the texture.
    Mirror = 0,
    /// Repeat the texture.
    Repeat,
    /// Clamp to the edge texel.
    #[default]
    ClampToEdge,
    /// Clamp to the border color.
    ClampToBorder,
}

/// Filter between mip levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum MipMapMode {
    /// Nearest mip.
    #[default]
    Nearest = 0,
    /// Blend between mips.
    Linear,
}

/// Comparison function for depth tests and comparison samplers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum CompareMode {
    /// Never passes. Also means "no comparison" for samplers.
    #[default]
    Never = 0,
    /// Passes if less.
    Less,
    /// Passes if equal.
    Equal,
    /// Passes if less or equal.
    LessEqual,
    /// Passes if greater.
    Greater,
    /// Passes if not equal.
    NotEqual,
    /// Passes if greater or equal.
    GreaterEqual,
    /// Always passes.
    Always,
}

/// Descriptor for creating a sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    /// Minification filter.
    pub min_filter: FilterType,
    /// Magnification filter.
    pub mag_filter: FilterType,
    /// Mip filter.
    pub mip_map_mode: MipMapMode,
    /// Address mode for U.
    pub address_u: AddressMode,
    /// Address mode for V.
    pub address_v: AddressMode,
    /// Address mode for W.
    pub address_w: AddressMode,
    /// Bias added to the computed mip level.
    pub mip_lod_bias: f32,
    /// Maximum anisotropy (0 or 1 disables it).
    pub max_anisotropy: f32,
    /// Comparison function.
    pub compare_func: CompareMode,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            min_filter: FilterType::Nearest,
            mag_filter: FilterType::Nearest,
            mip_map_mode: MipMapMode::Nearest,
            address_u: AddressMode::ClampToEdge,
            address_v: AddressMode::ClampToEdge,
            address_w: AddressMode::ClampToEdge,
            mip_lod_bias: 0.0,
            max_anisotropy: 0.0,
            compare_func: CompareMode::Never,
        }
    }
}

impl SamplerDesc {
    /// Trilinear sampler with the given address mode on every axis.
    pub fn trilinear(address_mode: AddressMode) -> Self {
        Self {
            min_filter: FilterType::Linear,
            mag_filter: FilterType::Linear,
            mip_map_mode: MipMapMode::Linear,
            ..Default::default()
        }
        .with_address_mode(address_mode)
    }

    /// Point sampler.
    pub fn nearest() -> Self {
        Self::default()
    }

    /// Set the address mode for all coordinates.
    pub fn with_address_mode(mut self, mode: AddressMode) -> Self {
        self.address_u = mode;
        self.address_v = mode;
        self.address_w = mode;
        self
    }

    /// Set the comparison function.
    pub fn with_compare(mut self, compare: CompareMode) -> Self {
        self.compare_func = compare;
        self
    }

    /// Set the anisotropy level.
    pub fn with_anisotropy(mut self, level: f32) -> Self {
        self.max_anisotropy = level;
        self
    }
}
