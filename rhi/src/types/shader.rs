//! Shader stages, descriptor types and shader reflection.
//!
//! Shader compilation is not done here. A shader is created from source or
//! byte code together with its reflection, which the caller provides.

use bitflags::bitflags;

bitflags! {
    /// Programmable pipeline stages.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderStage: u32 {
        /// Vertex stage.
        const VERT = 0x01;
        /// Tessellation control (hull) stage.
        const TESC = 0x02;
        /// Tessellation evaluation (domain) stage.
        const TESE = 0x04;
        /// Geometry stage.
        const GEOM = 0x08;
        /// Fragment stage.
        const FRAG = 0x10;
        /// Compute stage.
        const COMP = 0x20;
        /// Ray tracing stages.
        const RAYTRACING = 0x40;
        /// Every graphics stage.
        const ALL_GRAPHICS = 0x01 | 0x02 | 0x04 | 0x08 | 0x10;
    }
}

impl ShaderStage {
    /// No stage.
    pub const NONE: Self = Self::empty();
    /// Alias of [`ShaderStage::TESC`].
    pub const HULL: Self = Self::TESC;
    /// Alias of [`ShaderStage::TESE`].
    pub const DOMN: Self = Self::TESE;
}

bitflags! {
    /// How a resource is bound to a shader.
    ///
    /// Some values are unions of two bits (for example `BUFFER_RAW` is a
    /// `BUFFER` with an extra raw-view bit).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct DescriptorType: u32 {
        /// Not bound.
        const UNDEFINED = 0;
        /// Sampler.
        const SAMPLER = 0x01;
        /// Sampled texture.
        const TEXTURE = 0x02;
        /// Read/write texture.
        const RW_TEXTURE = 0x04;
        /// Read-only structured or typed buffer.
        const BUFFER = 0x08;
        /// Read-only raw (byte address) buffer.
        const BUFFER_RAW = 0x08 | 0x10;
        /// Read/write structured or typed buffer.
        const RW_BUFFER = 0x20;
        /// Read/write raw buffer.
        const RW_BUFFER_RAW = 0x20 | 0x40;
        /// Uniform (constant) buffer.
        const UNIFORM_BUFFER = 0x80;
        /// Push constant block.
        const ROOT_CONSTANT = 0x100;
        /// Vertex buffer.
        const VERTEX_BUFFER = 0x200;
        /// Index buffer.
        const INDEX_BUFFER = 0x400;
        /// Indirect argument buffer.
        const INDIRECT_BUFFER = 0x800;
        /// Cube map texture.
        const TEXTURE_CUBE = 0x02 | 0x1000;
        /// Render target with one view per mip.
        const RENDER_TARGET_MIP_SLICES = 0x2000;
        /// Render target with one view per array layer.
        const RENDER_TARGET_ARRAY_SLICES = 0x4000;
        /// Render target with one view per depth slice.
        const RENDER_TARGET_DEPTH_SLICES = 0x8000;
        /// Ray tracing acceleration structure.
        const RAY_TRACING = 0x10000;
        /// Subpass input attachment.
        const INPUT_ATTACHMENT = 0x20000;
        /// Uniform texel buffer.
        const TEXEL_BUFFER = 0x40000;
        /// Storage texel buffer.
        const RW_TEXEL_BUFFER = 0x80000;
    }
}

impl DescriptorType {
    /// Returns true for descriptors backed by a texture.
    pub fn is_texture(self) -> bool {
        self.intersects(Self::TEXTURE | Self::RW_TEXTURE | Self::INPUT_ATTACHMENT)
    }

    /// Returns true for descriptors backed by a buffer.
    pub fn is_buffer(self) -> bool {
        self.intersects(
            Self::BUFFER
                | Self::RW_BUFFER
                | Self::UNIFORM_BUFFER
                | Self::VERTEX_BUFFER
                | Self::INDEX_BUFFER
                | Self::INDIRECT_BUFFER
                | Self::TEXEL_BUFFER
                | Self::RW_TEXEL_BUFFER,
        ) && !self.contains(Self::ROOT_CONSTANT)
    }

    /// Returns true for descriptors the shader can write.
    pub fn is_read_write(self) -> bool {
        self.intersects(Self::RW_TEXTURE | Self::RW_BUFFER | Self::RW_TEXEL_BUFFER)
    }
}

/// Preprocessor definition passed to a shader stage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderMacro {
    /// Macro name.
    pub definition: String,
    /// Macro value.
    pub value: String,
}

/// Source of one shader stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderStageDesc {
    /// File or debug name.
    pub name: String,
    /// Shader source.
    pub code: String,
    /// Entry point (empty for `main`).
    pub entry_point: String,
    /// Preprocessor definitions.
    pub macros: Vec<ShaderMacro>,
}

impl ShaderStageDesc {
    /// Stage from `name` and `code` with the default entry point.
    pub fn new(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            code: code.into(),
            ..Default::default()
        }
    }
}

/// Byte code of one shader stage.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BinaryShaderStageDesc {
    /// Compiled byte code.
    pub byte_code: Vec<u8>,
    /// Entry point (empty for `main`).
    pub entry_point: String,
}

/// Texture dimension of a reflected resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum TextureDimension {
    /// 1D texture.
    Dim1D = 0,
    /// 2D texture.
    Dim2D,
    /// Multisampled 2D texture.
    Dim2DMs,
    /// 3D texture.
    Dim3D,
    /// Cube map.
    Cube,
    /// 1D texture array.
    Dim1DArray,
    /// 2D texture array.
    Dim2DArray,
    /// Multisampled 2D texture array.
    Dim2DMsArray,
    /// Cube map array.
    CubeArray,
    /// Not a texture.
    #[default]
    Undefined = 10,
}

/// A vertex shader input.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VertexInput {
    /// Attribute name.
    pub name: String,
    /// Attribute size in bytes.
    pub size: u32,
}

/// A resource declared by a shader.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderResource {
    /// Resource name, used to bind it.
    pub name: String,
    /// How the resource is bound.
    pub descriptor_type: DescriptorType,
    /// Descriptor set, which is also the update frequency.
    pub set: u32,
    /// Binding register within the set.
    pub reg: u32,
    /// Array size for textures and samplers, byte size for root constants.
    pub size: u32,
    /// Stages using this resource.
    pub used_stages: ShaderStage,
    /// Texture dimension.
    pub dim: TextureDimension,
}

impl ShaderResource {
    /// Resource bound at `set`/`reg`, used by `used_stages`, with array size 1.
    pub fn new(
        name: impl Into<String>,
        descriptor_type: DescriptorType,
        set: u32,
        reg: u32,
        used_stages: ShaderStage,
    ) -> Self {
        Self {
            name: name.into(),
            descriptor_type,
            set,
            reg,
            size: 1,
            used_stages,
            dim: if descriptor_type.is_texture() {
                TextureDimension::Dim2D
            } else {
                TextureDimension::Undefined
            },
        }
    }

    /// Root constant block of `size` bytes.
    pub fn root_constant(name: impl Into<String>, size: u32, used_stages: ShaderStage) -> Self {
        Self {
            size,
            ..Self::new(name, DescriptorType::ROOT_CONSTANT, 0, 0, used_stages)
        }
    }

    /// Set the array size.
    pub fn with_size(mut self, size: u32) -> Self {
        self.size = size;
        self
    }
}

/// A member of a constant block.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderVariable {
    /// Variable name.
    pub name: String,
    /// Index of the owning resource in [`PipelineReflection::resources`].
    pub parent_index: u32,
    /// Offset in bytes within the parent block.
    pub offset: u32,
    /// Size in bytes.
    pub size: u32,
}

/// Reflection of a whole shader program.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PipelineReflection {
    /// Stages present in the program.
    pub shader_stages: ShaderStage,
    /// Resources declared across all stages.
    pub resources: Vec<ShaderResource>,
    /// Constant block members.
    pub variables: Vec<ShaderVariable>,
    /// Vertex stage inputs.
    pub vertex_inputs: Vec<VertexInput>,
    /// Compute thread group size.
    pub num_threads_per_group: [u32; 3],
}

impl PipelineReflection {
    /// Look up a resource by name.
    pub fn resource(&self, name: &str) -> Option<&ShaderResource> {
        self.resources.iter().find(|r| r.name == name)
    }
}

/// Descriptor for creating a shader from source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ShaderDesc {
    /// Stages present in this desc.
    pub stages: ShaderStage,
    /// Vertex stage.
    pub vert: Option<ShaderStageDesc>,
    /// Fragment stage.
    pub frag: Option<ShaderStageDesc>,
    /// Geometry stage.
    pub geom: Option<ShaderStageDesc>,
    /// Hull stage.
    pub hull: Option<ShaderStageDesc>,
    /// Domain stage.
    pub domain: Option<ShaderStageDesc>,
    /// Compute stage.
    pub comp: Option<ShaderStageDesc>,
    /// Reflection of the program.
    pub reflection: PipelineReflection,
}

impl ShaderDesc {
    /// Stage bits of the stage slots that are filled.
    pub fn provided_stages(&self) -> ShaderStage {
        stage_bits([
            self.vert.is_some(),
            self.frag.is_some(),
            self.geom.is_some(),
            self.hull.is_some(),
            self.domain.is_some(),
            self.comp.is_some(),
        ])
    }

    /// Every filled stage slot.
    pub fn stage_descs(&self) -> impl Iterator<Item = (ShaderStage, &ShaderStageDesc)> {
        [
            (ShaderStage::VERT, &self.vert),
            (ShaderStage::FRAG, &self.frag),
            (ShaderStage::GEOM, &self.geom),
            (ShaderStage::HULL, &self.hull),
            (ShaderStage::DOMN, &self.domain),
            (ShaderStage::COMP, &self.comp),
        ]
        .into_iter()
        .filter_map(|(stage, desc)| desc.as_ref().map(|d| (stage, d)))
    }
}

/// Descriptor for creating a shader from byte code.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BinaryShaderDesc {
    /// Stages present in this desc.
    pub stages: ShaderStage,
    /// Vertex stage.
    pub vert: Option<BinaryShaderStageDesc>,
    /// Fragment stage.
    pub frag: Option<BinaryShaderStageDesc>,
    /// Geometry stage.
    pub geom: Option<BinaryShaderStageDesc>,
    /// Hull stage.
    pub hull: Option<BinaryShaderStageDesc>,
    /// Domain stage.
    pub domain: Option<BinaryShaderStageDesc>,
    /// Compute stage.
    pub comp: Option<BinaryShaderStageDesc>,
    /// Reflection of the program.
    pub reflection: PipelineReflection,
}

impl BinaryShaderDesc {
    /// Stage bits of the stage slots that are filled.
    pub fn provided_stages(&self) -> ShaderStage {
        stage_bits([
            self.vert.is_some(),
            self.frag.is_some(),
            self.geom.is_some(),
            self.hull.is_some(),
            self.domain.is_some(),
            self.comp.is_some(),
        ])
    }

    /// Every filled stage slot.
    pub fn stage_descs(&self) -> impl Iterator<Item = (ShaderStage, &BinaryShaderStageDesc)> {
        [
            (ShaderStage::VERT, &self.vert),
            (ShaderStage::FRAG, &self.frag),
            (ShaderStage::GEOM, &self.geom),
            (ShaderStage::HULL, &self.hull),
            (ShaderStage::DOMN, &self.domain),
            (ShaderStage::COMP, &self.comp),
        ]
        .into_iter()
        .filter_map(|(stage, desc)| desc.as_ref().map(|d| (stage, d)))
    }
}

fn stage_bits(present: [bool; 6]) -> ShaderStage {
    const ORDER: [ShaderStage; 6] = [
        ShaderStage::VERT,
        ShaderStage::FRAG,
        ShaderStage::GEOM,
        ShaderStage::HULL,
        ShaderStage::DOMN,
        ShaderStage::COMP,
    ];
    ORDER
        .iter()
        .zip(present)
        .filter(|(_, p)| *p)
        .fold(ShaderStage::empty(), |acc, (s, _)| acc | *s)
}
