//! Texture and render target descriptors.

use bitflags::bitflags;

use super::{DescriptorType, ImageFormat, ResourceState};
use crate::handle::RenderTargetHandle;

bitflags! {
    /// Texture creation flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct TextureCreationFlags: u32 {
        /// Default allocation strategy.
        const NONE = 0;
        /// Texture allocates its own memory.
        const OWN_MEMORY = 0x01;
        /// Memory can be shared with other processes.
        const EXPORT = 0x02;
        /// Memory can be shared with other adapters.
        const EXPORT_ADAPTER = 0x04;
        /// Texture is imported from another process.
        const IMPORT = 0x08;
        /// Allocate from ESRAM.
        const ESRAM = 0x10;
        /// Keep the texture in on-tile memory.
        const ON_TILE = 0x20;
        /// Disable compression metadata.
        const NO_COMPRESSION = 0x40;
        /// Force a 2D texture.
        const FORCE_2D = 0x80;
        /// Force a 3D texture.
        const FORCE_3D = 0x100;
        /// Texture can be a display target.
        const ALLOW_DISPLAY_TARGET = 0x200;
        /// Create an sRGB texture.
        const SRGB = 0x400;
    }
}

/// MSAA sample count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum SampleCount {
    /// No multisampling.
    #[default]
    Count1 = 1,
    /// 2 samples.
    Count2 = 2,
    /// 4 samples.
    Count4 = 4,
    /// 8 samples.
    Count8 = 8,
    /// 16 samples.
    Count16 = 16,
}

/// Clear value for a color or depth/stencil attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// RGBA color.
    Color([f32; 4]),
    /// Depth and stencil.
    DepthStencil {
        /// Depth value.
        depth: f32,
        /// Stencil value.
        stencil: u32,
    },
}

impl Default for ClearValue {
    fn default() -> Self {
        Self::Color([0.0, 0.0, 0.0, 0.0])
    }
}

impl ClearValue {
    /// Color clear value.
    pub const fn color(r: f32, g: f32, b: f32, a: f32) -> Self {
        Self::Color([r, g, b, a])
    }

    /// Depth clear value with zero stencil.
    pub const fn depth(depth: f32) -> Self {
        Self::DepthStencil { depth, stencil: 0 }
    }
}

/// Descriptor for creating a texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    /// Creation flags.
    pub flags: TextureCreationFlags,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth in pixels (1 unless 3D).
    pub depth: u32,
    /// Array layer count.
    pub array_size: u32,
    /// Mip level count.
    pub mip_levels: u32,
    /// MSAA sample count.
    pub sample_count: SampleCount,
    /// MSAA quality level.
    pub sample_quality: u32,
    /// Pixel format.
    pub format: ImageFormat,
    /// Optimized clear value.
    pub clear_value: ClearValue,
    /// State the texture starts in.
    pub start_state: ResourceState,
    /// How the texture will be bound.
    pub descriptors: DescriptorType,
    /// Debug name.
    pub name: Option<String>,
    /// GPU index in linked mode.
    pub node_index: u32,
    /// Allocate in host-visible memory.
    pub host_visible: bool,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            flags: TextureCreationFlags::NONE,
            width: 1,
            height: 1,
            depth: 1,
            array_size: 1,
            mip_levels: 1,
            sample_count: SampleCount::Count1,
            sample_quality: 0,
            format: ImageFormat::Undefined,
            clear_value: ClearValue::default(),
            start_state: ResourceState::UNDEFINED,
            descriptors: DescriptorType::TEXTURE,
            name: None,
            node_index: 0,
            host_visible: false,
        }
    }
}

impl TextureDesc {
    /// 2D sampled texture.
    pub fn new_2d(width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            width,
            height,
            format,
            ..Default::default()
        }
    }

    /// Set the mip level count.
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    /// Set the start state.
    pub fn with_start_state(mut self, start_state: ResourceState) -> Self {
        self.start_state = start_state;
        self
    }

    /// Set the debug name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Bytes needed to store every mip of every layer, tightly packed.
    pub fn total_size(&self) -> u64 {
        let mut total = 0;
        for mip in 0..self.mip_levels.max(1) {
            let w = (self.width >> mip).max(1);
            let h = (self.height >> mip).max(1);
            let d = (self.depth >> mip).max(1);
            total += self.format.surface_size(w, h, d);
        }
        total * self.array_size.max(1) as u64
    }
}

/// Descriptor for creating a render target.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderTargetDesc {
    /// Creation flags.
    pub flags: TextureCreationFlags,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth in pixels (1 unless 3D).
    pub depth: u32,
    /// Array layer count.
    pub array_size: u32,
    /// Mip level count.
    pub mip_levels: u32,
    /// MSAA sample count.
    pub sample_count: SampleCount,
    /// MSAA quality level.
    pub sample_quality: u32,
    /// Pixel format.
    pub format: ImageFormat,
    /// Optimized clear value.
    pub clear_value: ClearValue,
    /// State the target starts in. Empty means render target or depth write.
    pub start_state: ResourceState,
    /// Extra descriptor types (for sampling the target afterwards).
    pub descriptors: DescriptorType,
    /// Debug name.
    pub name: Option<String>,
    /// GPU index in linked mode.
    pub node_index: u32,
}

impl Default for RenderTargetDesc {
    fn default() -> Self {
        Self {
            flags: TextureCreationFlags::NONE,
            width: 0,
            height: 0,
            depth: 1,
            array_size: 1,
            mip_levels: 1,
            sample_count: SampleCount::Count1,
            sample_quality: 0,
            format: ImageFormat::Undefined,
            clear_value: ClearValue::default(),
            start_state: ResourceState::UNDEFINED,
            descriptors: DescriptorType::UNDEFINED,
            name: None,
            node_index: 0,
        }
    }
}

impl RenderTargetDesc {
    /// 2D render target.
    pub fn new_2d(width: u32, height: u32, format: ImageFormat) -> Self {
        Self {
            width,
            height,
            format,
            ..Default::default()
        }
    }

    /// Set the clear value.
    pub fn with_clear_value(mut self, clear_value: ClearValue) -> Self {
        self.clear_value = clear_value;
        self
    }

    /// Set the creation flags.
    pub fn with_flags(mut self, flags: TextureCreationFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Set the debug name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Initial state of the target.
    pub fn initial_state(&self) -> ResourceState {
        if !self.start_state.is_empty() {
            self.start_state
        } else if self.format.is_depth() {
            ResourceState::DEPTH_WRITE
        } else {
            ResourceState::RENDER_TARGET
        }
    }

    /// Texture descriptor backing this render target.
    pub fn texture_desc(&self) -> TextureDesc {
        TextureDesc {
            flags: self.flags,
            width: self.width,
            height: self.height,
            depth: self.depth,
            array_size: self.array_size,
            mip_levels: self.mip_levels,
            sample_count: self.sample_count,
            sample_quality: self.sample_quality,
            format: self.format,
            clear_value: self.clear_value,
            start_state: self.initial_state(),
            descriptors: self.descriptors,
            name: self.name.clone(),
            node_index: self.node_index,
            host_visible: false,
        }
    }
}

/// What happens to an attachment's contents when it is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum LoadActionType {
    /// Previous contents are discarded.
    #[default]
    DontCare = 0,
    /// Previous contents are preserved.
    Load,
    /// Contents are cleared.
    Clear,
}

/// Load actions for every attachment of a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LoadActionsDesc {
    /// Clear values for color attachments.
    pub clear_color_values: [ClearValue; super::MAX_RENDER_TARGET_ATTACHMENTS],
    /// Load actions for color attachments.
    pub load_actions_color: [LoadActionType; super::MAX_RENDER_TARGET_ATTACHMENTS],
    /// Clear value for the depth attachment.
    pub clear_depth: ClearValue,
    /// Load action for the depth aspect.
    pub load_action_depth: LoadActionType,
    /// Load action for the stencil aspect.
    pub load_action_stencil: LoadActionType,
}

impl LoadActionsDesc {
    /// Clear color slot 0 to `color` and, if given, depth to `depth`.
    pub fn clear(color: ClearValue, depth: Option<ClearValue>) -> Self {
        let mut desc = Self::default();
        desc.load_actions_color[0] = LoadActionType::Clear;
        desc.clear_color_values[0] = color;
        if let Some(depth) = depth {
            desc.load_action_depth = LoadActionType::Clear;
            desc.clear_depth = depth;
        }
        desc
    }

    /// Keep the previous contents of color slot 0.
    pub fn load() -> Self {
        let mut desc = Self::default();
        desc.load_actions_color[0] = LoadActionType::Load;
        desc
    }
}

/// Render targets bound for a render pass.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BindRenderTargetsDesc {
    /// Color attachments, in slot order.
    pub render_targets: Vec<RenderTargetHandle>,
    /// Depth/stencil attachment.
    pub depth_stencil: Option<RenderTargetHandle>,
    /// Load actions for every attachment.
    pub load_actions: Option<LoadActionsDesc>,
    /// Array slice per color attachment (`None` binds every slice).
    pub color_array_slices: Option<Vec<u32>>,
    /// Mip slice per color attachment (`None` binds mip 0).
    pub color_mip_slices: Option<Vec<u32>>,
    /// Depth array slice (`u32::MAX` binds every slice).
    pub depth_array_slice: u32,
    /// Depth mip slice (`u32::MAX` binds mip 0).
    pub depth_mip_slice: u32,
}

impl BindRenderTargetsDesc {
    /// Bind `render_targets` and an optional depth target.
    pub fn new(
        render_targets: Vec<RenderTargetHandle>,
        depth_stencil: Option<RenderTargetHandle>,
    ) -> Self {
        Self {
            render_targets,
            depth_stencil,
            load_actions: None,
            color_array_slices: None,
            color_mip_slices: None,
            depth_array_slice: u32::MAX,
            depth_mip_slice: u32::MAX,
        }
    }

    /// Set the load actions.
    pub fn with_load_actions(mut self, load_actions: LoadActionsDesc) -> Self {
        self.load_actions = Some(load_actions);
        self
    }

    /// Unbinds every render target.
    pub fn unbind() -> Self {
        Self::new(Vec::new(), None)
    }

    /// Returns true if nothing is bound.
    pub fn is_unbind(&self) -> bool {
        self.render_targets.is_empty() && self.depth_stencil.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_target_initial_state() {
        let color = RenderTargetDesc::new_2d(8, 8, ImageFormat::R8G8B8A8Unorm);
        assert_eq!(color.initial_state(), ResourceState::RENDER_TARGET);

        let depth = RenderTargetDesc::new_2d(8, 8, ImageFormat::D32Sfloat);
        assert_eq!(depth.initial_state(), ResourceState::DEPTH_WRITE);

        let mut explicit = RenderTargetDesc::new_2d(8, 8, ImageFormat::R8G8B8A8Unorm);
        explicit.start_state = ResourceState::PRESENT;
        assert_eq!(explicit.initial_state(), ResourceState::PRESENT);
    }

    #[test]
    fn test_texture_total_size_with_mips() {
        let desc = TextureDesc::new_2d(4, 4, ImageFormat::R8G8B8A8Unorm).with_mip_levels(3);
        // 4x4 + 2x2 + 1x1 pixels
        assert_eq!(desc.total_size(), (16 + 4 + 1) * 4);
    }
}
