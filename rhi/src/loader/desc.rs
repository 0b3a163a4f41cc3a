//! Descriptors of load and update requests.

use std::path::PathBuf;

use bytemuck::Pod;

use crate::config::ResourceDirectory;
use crate::handle::{BufferHandle, TextureHandle};
use crate::types::{
    BufferDesc, ImageFormat, PipelineReflection, ShaderMacro, ShaderTarget, TextureCreationFlags,
    TextureDesc,
};

/// Staging memory of the resource loader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResourceLoaderDesc {
    /// Size of one staging buffer in bytes.
    pub buffer_size: u64,
    /// Number of staging buffers in the ring.
    pub buffer_count: u32,
}

impl Default for ResourceLoaderDesc {
    fn default() -> Self {
        Self {
            buffer_size: 8 << 20,
            buffer_count: 2,
        }
    }
}

/// Request to create a buffer and fill it.
#[derive(Debug, Clone)]
pub struct BufferLoadDesc {
    /// Buffer to create.
    pub desc: BufferDesc,
    /// Initial contents, at most `desc.size` bytes.
    pub data: Option<Vec<u8>>,
    /// Upload zeros when there is no data.
    pub force_reset: bool,
}

impl BufferLoadDesc {
    /// Create the buffer without uploading anything.
    pub fn new(desc: BufferDesc) -> Self {
        Self {
            desc,
            data: None,
            force_reset: false,
        }
    }

    /// Upload `data`.
    pub fn with_data(mut self, data: impl Into<Vec<u8>>) -> Self {
        self.data = Some(data.into());
        self
    }

    /// Upload a slice of plain values.
    pub fn with_contents<T: Pod>(self, contents: &[T]) -> Self {
        self.with_data(bytemuck::cast_slice::<T, u8>(contents))
    }

    /// Upload zeros when there is no data.
    pub fn with_force_reset(mut self, force_reset: bool) -> Self {
        self.force_reset = force_reset;
        self
    }

    /// Returns true if the request uploads nothing.
    pub fn skips_upload(&self) -> bool {
        self.data.is_none() && !self.force_reset
    }
}

/// Uncompressed texels with their layout.
#[derive(Debug, Clone, PartialEq)]
pub struct RawImageData {
    /// Texels, subresource after subresource.
    pub data: Vec<u8>,
    /// Texel format.
    pub format: ImageFormat,
    /// Width of mip 0.
    pub width: u32,
    /// Height of mip 0.
    pub height: u32,
    /// Depth of mip 0.
    pub depth: u32,
    /// Array layers.
    pub array_size: u32,
    /// Mip levels.
    pub mip_levels: u32,
    /// Data holds every layer of mip 0, then every layer of mip 1, and so on.
    /// Otherwise every mip of layer 0 comes first.
    pub mips_after_slices: bool,
    /// Bytes between rows. Zero means tightly packed.
    pub row_stride: u32,
}

impl RawImageData {
    /// Tightly packed single-mip 2D image.
    pub fn new_2d(data: Vec<u8>, format: ImageFormat, width: u32, height: u32) -> Self {
        Self {
            data,
            format,
            width,
            height,
            depth: 1,
            array_size: 1,
            mip_levels: 1,
            mips_after_slices: false,
            row_stride: 0,
        }
    }

    /// Texture described by the image.
    pub fn texture_desc(&self) -> TextureDesc {
        TextureDesc {
            width: self.width,
            height: self.height,
            depth: self.depth.max(1),
            array_size: self.array_size.max(1),
            mip_levels: self.mip_levels.max(1),
            format: self.format,
            ..Default::default()
        }
    }
}

/// Encoded image file contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BinaryImageData {
    /// File bytes.
    pub data: Vec<u8>,
    /// File extension naming the container format, such as `png`.
    pub extension: String,
}

/// Request to create a texture and fill it.
///
/// Exactly one source is used: a file, encoded binary data or raw texels.
/// With no source, `desc` creates an empty texture.
#[derive(Debug, Clone, Default)]
pub struct TextureLoadDesc {
    /// Texture to create. Required when there is no source.
    pub desc: Option<TextureDesc>,
    /// Image file, resolved in `directory`.
    pub file_path: Option<PathBuf>,
    /// Directory class of `file_path`.
    pub directory: Option<ResourceDirectory>,
    /// Raw texels.
    pub raw: Option<RawImageData>,
    /// Encoded image.
    pub binary: Option<BinaryImageData>,
    /// GPU index in linked mode.
    pub node_index: u32,
    /// Creation flags of textures made from a source.
    pub creation_flags: TextureCreationFlags,
}

impl TextureLoadDesc {
    /// Load an image file from the texture directory.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            file_path: Some(path.into()),
            directory: Some(ResourceDirectory::Textures),
            ..Default::default()
        }
    }

    /// Upload raw texels.
    pub fn from_raw(raw: RawImageData) -> Self {
        Self {
            raw: Some(raw),
            ..Default::default()
        }
    }

    /// Decode an encoded image.
    pub fn from_binary(data: Vec<u8>, extension: impl Into<String>) -> Self {
        Self {
            binary: Some(BinaryImageData {
                data,
                extension: extension.into(),
            }),
            ..Default::default()
        }
    }

    /// Create an empty texture.
    pub fn empty(desc: TextureDesc) -> Self {
        Self {
            desc: Some(desc),
            ..Default::default()
        }
    }
}

/// Partial rewrite of a buffer through the loader.
///
/// [`Renderer::begin_update_buffer_resource`](crate::Renderer::begin_update_buffer_resource)
/// hands out `size` bytes to write; ending the update schedules the copy.
#[derive(Debug)]
pub struct BufferUpdateDesc {
    /// Destination buffer.
    pub buffer: BufferHandle,
    /// Destination offset.
    pub dst_offset: u64,
    /// Bytes to write.
    pub size: u64,
    pub(crate) mapped: Option<Vec<u8>>,
}

impl BufferUpdateDesc {
    /// Update `size` bytes of `buffer` at `dst_offset`.
    pub fn new(buffer: BufferHandle, dst_offset: u64, size: u64) -> Self {
        Self {
            buffer,
            dst_offset,
            size,
            mapped: None,
        }
    }
}

/// Rewrite of one texture subresource through the loader.
#[derive(Debug)]
pub struct TextureUpdateDesc {
    /// Destination texture.
    pub texture: TextureHandle,
    /// Destination mip level.
    pub mip_level: u32,
    /// Destination array layer.
    pub array_layer: u32,
    /// Bytes between rows of the mapped data. Zero means tightly packed.
    pub row_stride: u32,
    pub(crate) mapped: Option<Vec<u8>>,
}

impl TextureUpdateDesc {
    /// Update mip 0 of layer 0.
    pub fn new(texture: TextureHandle) -> Self {
        Self {
            texture,
            mip_level: 0,
            array_layer: 0,
            row_stride: 0,
            mapped: None,
        }
    }

    /// Select the subresource.
    pub fn with_subresource(mut self, mip_level: u32, array_layer: u32) -> Self {
        self.mip_level = mip_level;
        self.array_layer = array_layer;
        self
    }
}

/// Source file of one shader stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderStageLoadDesc {
    /// File name, resolved in `directory`.
    pub file_name: String,
    /// Preprocessor definitions.
    pub macros: Vec<ShaderMacro>,
    /// Directory class of the file.
    pub directory: Option<ResourceDirectory>,
    /// Entry point. Empty means `main`.
    pub entry_point: String,
}

impl ShaderStageLoadDesc {
    /// Stage read from the shader source directory.
    pub fn new(file_name: impl Into<String>) -> Self {
        Self {
            file_name: file_name.into(),
            directory: Some(ResourceDirectory::ShaderSources),
            ..Default::default()
        }
    }
}

/// Shader whose stages are read from files.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderLoadDesc {
    /// Vertex stage.
    pub vert: Option<ShaderStageLoadDesc>,
    /// Fragment stage.
    pub frag: Option<ShaderStageLoadDesc>,
    /// Geometry stage.
    pub geom: Option<ShaderStageLoadDesc>,
    /// Hull stage.
    pub hull: Option<ShaderStageLoadDesc>,
    /// Domain stage.
    pub domain: Option<ShaderStageLoadDesc>,
    /// Compute stage.
    pub comp: Option<ShaderStageLoadDesc>,
    /// Shader model the sources target.
    pub target: ShaderTarget,
    /// Reflection of the program.
    pub reflection: PipelineReflection,
}
