//! Resource states and barrier descriptions.

use bitflags::bitflags;

use crate::handle::{BufferHandle, RenderTargetHandle, TextureHandle};

bitflags! {
    /// Access state of a buffer, texture or render target.
    ///
    /// Every resource is in exactly one declared state at a time. Moving it
    /// to a different state requires an explicit barrier.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceState: u32 {
        /// Contents are undefined (initial state of most resources).
        const UNDEFINED = 0;
        /// Bound as a vertex or constant buffer.
        const VERTEX_AND_CONSTANT_BUFFER = 0x1;
        /// Bound as an index buffer.
        const INDEX_BUFFER = 0x2;
        /// Written as a color attachment.
        const RENDER_TARGET = 0x4;
        /// Read/write shader access.
        const UNORDERED_ACCESS = 0x8;
        /// Written as a depth attachment.
        const DEPTH_WRITE = 0x10;
        /// Read-only depth attachment.
        const DEPTH_READ = 0x20;
        /// Read by non-pixel shader stages.
        const NON_PIXEL_SHADER_RESOURCE = 0x40;
        /// Read by any shader stage.
        const SHADER_RESOURCE = 0x40 | 0x80;
        /// Stream output target.
        const STREAM_OUT = 0x100;
        /// Indirect argument buffer.
        const INDIRECT_ARGUMENT = 0x200;
        /// Destination of a copy.
        const COPY_DEST = 0x400;
        /// Source of a copy.
        const COPY_SOURCE = 0x800;
        /// Union of every read-only state.
        const GENERIC_READ = 0x1 | 0x2 | 0x40 | 0x80 | 0x200 | 0x800;
        /// Ready for presentation.
        const PRESENT = 0x1000;
        /// Common state usable by any queue.
        const COMMON = 0x2000;
    }
}

impl ResourceState {
    /// Pixel-shader read bit of [`ResourceState::SHADER_RESOURCE`].
    pub const PIXEL_SHADER_RESOURCE: Self = Self::from_bits_retain(0x80);

    /// Returns true if some shader stage may read the resource.
    pub fn is_shader_readable(self) -> bool {
        self.intersects(Self::SHADER_RESOURCE)
    }

    /// Returns true if the state only allows reads.
    pub fn is_read_only(self) -> bool {
        !self.is_empty() && Self::GENERIC_READ.union(Self::DEPTH_READ).contains(self)
    }
}

/// State transition for a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferBarrier {
    /// Buffer to transition.
    pub buffer: BufferHandle,
    /// State the buffer is in after the barrier.
    pub new_state: ResourceState,
    /// Marks the begin half of a split barrier.
    pub split: bool,
}

impl BufferBarrier {
    /// Immediate transition of `buffer` to `new_state`.
    pub fn new(buffer: BufferHandle, new_state: ResourceState) -> Self {
        Self {
            buffer,
            new_state,
            split: false,
        }
    }

    /// Begin half of a split transition.
    pub fn split(buffer: BufferHandle, new_state: ResourceState) -> Self {
        Self {
            buffer,
            new_state,
            split: true,
        }
    }
}

/// State transition for a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureBarrier {
    /// Texture to transition.
    pub texture: TextureHandle,
    /// State the texture is in after the barrier.
    pub new_state: ResourceState,
    /// Marks the begin half of a split barrier.
    pub split: bool,
}

impl TextureBarrier {
    /// Immediate transition of `texture` to `new_state`.
    pub fn new(texture: TextureHandle, new_state: ResourceState) -> Self {
        Self {
            texture,
            new_state,
            split: false,
        }
    }

    /// Begin half of a split transition.
    pub fn split(texture: TextureHandle, new_state: ResourceState) -> Self {
        Self {
            texture,
            new_state,
            split: true,
        }
    }
}

/// State transition for a render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetBarrier {
    /// Render target to transition.
    pub render_target: RenderTargetHandle,
    /// State the render target is in after the barrier.
    pub new_state: ResourceState,
    /// Marks the begin half of a split barrier.
    pub split: bool,
}

impl RenderTargetBarrier {
    /// Immediate transition of `render_target` to `new_state`.
    pub fn new(render_target: RenderTargetHandle, new_state: ResourceState) -> Self {
        Self {
            render_target,
            new_state,
            split: false,
        }
    }

    /// Begin half of a split transition.
    pub fn split(render_target: RenderTargetHandle, new_state: ResourceState) -> Self {
        Self {
            render_target,
            new_state,
            split: true,
        }
    }
}
