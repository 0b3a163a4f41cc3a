//! Pipeline state, vertex layout and root signature descriptors.

use bitflags::bitflags;

use super::{CompareMode, ImageFormat, SampleCount, MAX_RENDER_TARGET_ATTACHMENTS, MAX_VERTEX_ATTRIBS};
use crate::handle::{RootSignatureHandle, SamplerHandle, ShaderHandle};

/// Kind of pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum PipelineType {
    /// Not known yet.
    #[default]
    Undefined = 0,
    /// Compute pipeline.
    Compute,
    /// Graphics pipeline.
    Graphics,
    /// Ray tracing pipeline.
    Raytracing,
}

/// Blend factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum BlendConstant {
    /// 0.
    Zero = 0,
    /// 1.
    #[default]
    One,
    /// Source color.
    SrcColor,
    /// 1 - source color.
    OneMinusSrcColor,
    /// Destination color.
    DstColor,
    /// 1 - destination color.
    OneMinusDstColor,
    /// Source alpha.
    SrcAlpha,
    /// 1 - source alpha.
    OneMinusSrcAlpha,
    /// Destination alpha.
    DstAlpha,
    /// 1 - destination alpha.
    OneMinusDstAlpha,
    /// Saturated source alpha.
    SrcAlphaSaturate,
    /// Constant blend factor.
    BlendFactor,
    /// 1 - constant blend factor.
    OneMinusBlendFactor,
}

/// Blend operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum BlendMode {
    /// src + dst.
    #[default]
    Add = 0,
    /// src - dst.
    Subtract,
    /// dst - src.
    ReverseSubtract,
    /// min(src, dst).
    Min,
    /// max(src, dst).
    Max,
}

/// Stencil operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum StencilOp {
    /// Keep the value.
    #[default]
    Keep = 0,
    /// Set to zero.
    SetZero,
    /// Replace with the reference.
    Replace,
    /// Bitwise invert.
    Invert,
    /// Increment with wrap.
    Incr,
    /// Decrement with wrap.
    Decr,
    /// Increment with saturation.
    IncrSat,
    /// Decrement with saturation.
    DecrSat,
}

/// Face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum CullMode {
    /// No culling.
    #[default]
    None = 0,
    /// Cull back faces.
    Back,
    /// Cull front faces.
    Front,
    /// Cull everything.
    Both,
}

/// Winding of front faces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum FrontFace {
    /// Counter-clockwise.
    #[default]
    Ccw = 0,
    /// Clockwise.
    Cw,
}

/// Polygon fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum FillMode {
    /// Filled triangles.
    #[default]
    Solid = 0,
    /// Lines only.
    Wireframe,
}

/// Primitive assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum PrimitiveTopology {
    /// Points.
    PointList = 0,
    /// Lines.
    LineList,
    /// Connected lines.
    LineStrip,
    /// Triangles.
    #[default]
    TriList,
    /// Connected triangles.
    TriStrip,
    /// Tessellation patches.
    PatchList,
}

/// Step rate of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum VertexAttribRate {
    /// Per vertex.
    #[default]
    Vertex = 0,
    /// Per instance.
    Instance = 1,
}

/// Semantic of a vertex attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u32)]
pub enum ShaderSemantic {
    /// No semantic.
    #[default]
    Undefined = 0,
    /// Position.
    Position,
    /// Normal.
    Normal,
    /// Color.
    Color,
    /// Tangent.
    Tangent,
    /// Bitangent.
    Bitangent,
    /// Texture coordinate 0.
    Texcoord0,
    /// Texture coordinate 1.
    Texcoord1,
    /// Texture coordinate 2.
    Texcoord2,
    /// Texture coordinate 3.
    Texcoord3,
    /// Texture coordinate 4.
    Texcoord4,
    /// Texture coordinate 5.
    Texcoord5,
    /// Texture coordinate 6.
    Texcoord6,
    /// Texture coordinate 7.
    Texcoord7,
    /// Texture coordinate 8.
    Texcoord8,
    /// Texture coordinate 9.
    Texcoord9,
}

bitflags! {
    /// Root signature creation flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RootSignatureFlags: u32 {
        /// Local root signature (ray tracing).
        const LOCAL = 0x1;
    }
}

bitflags! {
    /// Which color attachments a blend state applies to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BlendStateTargets: u32 {
        /// Attachment 0.
        const TARGET_0 = 0x1;
        /// Attachment 1.
        const TARGET_1 = 0x2;
        /// Attachment 2.
        const TARGET_2 = 0x4;
        /// Attachment 3.
        const TARGET_3 = 0x8;
        /// Attachment 4.
        const TARGET_4 = 0x10;
        /// Attachment 5.
        const TARGET_5 = 0x20;
        /// Attachment 6.
        const TARGET_6 = 0x40;
        /// Attachment 7.
        const TARGET_7 = 0x80;
        /// Every attachment.
        const ALL = 0xFF;
    }
}

/// One vertex attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexAttrib {
    /// Semantic.
    pub semantic: ShaderSemantic,
    /// Semantic name (optional).
    pub semantic_name: String,
    /// Attribute format.
    pub format: ImageFormat,
    /// Vertex buffer binding.
    pub binding: u32,
    /// Shader input location.
    pub location: u32,
    /// Offset within the vertex.
    pub offset: u32,
    /// Step rate.
    pub rate: VertexAttribRate,
}

impl VertexAttrib {
    /// Per-vertex attribute on binding 0.
    pub fn new(semantic: ShaderSemantic, format: ImageFormat, location: u32, offset: u32) -> Self {
        Self {
            semantic,
            format,
            location,
            offset,
            ..Default::default()
        }
    }
}

/// Vertex input layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct VertexLayout {
    /// Attributes, at most [`MAX_VERTEX_ATTRIBS`].
    pub attribs: Vec<VertexAttrib>,
}

impl VertexLayout {
    /// Layout from a list of attributes.
    pub fn new(attribs: Vec<VertexAttrib>) -> Self {
        Self { attribs }
    }

    /// Returns true if the layout fits the attribute limit.
    pub fn fits_limits(&self) -> bool {
        self.attribs.len() <= MAX_VERTEX_ATTRIBS
    }
}

/// Blend state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendStateDesc {
    /// Source color factor per attachment.
    pub src_factors: [BlendConstant; MAX_RENDER_TARGET_ATTACHMENTS],
    /// Destination color factor per attachment.
    pub dst_factors: [BlendConstant; MAX_RENDER_TARGET_ATTACHMENTS],
    /// Source alpha factor per attachment.
    pub src_alpha_factors: [BlendConstant; MAX_RENDER_TARGET_ATTACHMENTS],
    /// Destination alpha factor per attachment.
    pub dst_alpha_factors: [BlendConstant; MAX_RENDER_TARGET_ATTACHMENTS],
    /// Color operation per attachment.
    pub blend_modes: [BlendMode; MAX_RENDER_TARGET_ATTACHMENTS],
    /// Alpha operation per attachment.
    pub blend_alpha_modes: [BlendMode; MAX_RENDER_TARGET_ATTACHMENTS],
    /// Write mask per attachment.
    pub masks: [u32; MAX_RENDER_TARGET_ATTACHMENTS],
    /// Attachments this state applies to.
    pub render_target_mask: BlendStateTargets,
    /// Alpha to coverage.
    pub alpha_to_coverage: bool,
    /// Use per-attachment state.
    pub independent_blend: bool,
}

impl Default for BlendStateDesc {
    fn default() -> Self {
        Self {
            src_factors: [BlendConstant::One; MAX_RENDER_TARGET_ATTACHMENTS],
            dst_factors: [BlendConstant::Zero; MAX_RENDER_TARGET_ATTACHMENTS],
            src_alpha_factors: [BlendConstant::One; MAX_RENDER_TARGET_ATTACHMENTS],
            dst_alpha_factors: [BlendConstant::Zero; MAX_RENDER_TARGET_ATTACHMENTS],
            blend_modes: [BlendMode::Add; MAX_RENDER_TARGET_ATTACHMENTS],
            blend_alpha_modes: [BlendMode::Add; MAX_RENDER_TARGET_ATTACHMENTS],
            masks: [0xF; MAX_RENDER_TARGET_ATTACHMENTS],
            render_target_mask: BlendStateTargets::ALL,
            alpha_to_coverage: false,
            independent_blend: false,
        }
    }
}

/// Depth/stencil state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DepthStateDesc {
    /// Enable depth testing.
    pub depth_test: bool,
    /// Enable depth writes.
    pub depth_write: bool,
    /// Depth comparison.
    pub depth_func: CompareMode,
    /// Enable stencil testing.
    pub stencil_test: bool,
    /// Stencil read mask.
    pub stencil_read_mask: u8,
    /// Stencil write mask.
    pub stencil_write_mask: u8,
    /// Front-face stencil comparison.
    pub stencil_front_func: CompareMode,
    /// Front-face stencil fail op.
    pub stencil_front_fail: StencilOp,
    /// Front-face depth fail op.
    pub depth_front_fail: StencilOp,
    /// Front-face pass op.
    pub stencil_front_pass: StencilOp,
    /// Back-face stencil comparison.
    pub stencil_back_func: CompareMode,
    /// Back-face stencil fail op.
    pub stencil_back_fail: StencilOp,
    /// Back-face depth fail op.
    pub depth_back_fail: StencilOp,
    /// Back-face pass op.
    pub stencil_back_pass: StencilOp,
}

impl DepthStateDesc {
    /// Depth test and write with `func`, no stencil.
    pub fn depth_test_write(func: CompareMode) -> Self {
        Self {
            depth_test: true,
            depth_write: true,
            depth_func: func,
            ..Default::default()
        }
    }
}

/// Rasterizer state.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct RasterizerStateDesc {
    /// Face culling.
    pub cull_mode: CullMode,
    /// Constant depth bias.
    pub depth_bias: i32,
    /// Slope-scaled depth bias.
    pub slope_scaled_depth_bias: f32,
    /// Fill mode.
    pub fill_mode: FillMode,
    /// Enable multisampling.
    pub multi_sample: bool,
    /// Enable the scissor test.
    pub scissor: bool,
    /// Front-face winding.
    pub front_face: FrontFace,
    /// Clamp depth instead of clipping.
    pub depth_clamp_enable: bool,
}

impl RasterizerStateDesc {
    /// Solid fill with the given cull mode.
    pub fn with_cull(cull_mode: CullMode) -> Self {
        Self {
            cull_mode,
            ..Default::default()
        }
    }
}

/// Descriptor for a graphics pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct GraphicsPipelineDesc {
    /// Shader program.
    pub shader_program: ShaderHandle,
    /// Root signature.
    pub root_signature: RootSignatureHandle,
    /// Vertex layout (`None` for vertex-pulling shaders).
    pub vertex_layout: Option<VertexLayout>,
    /// Blend state.
    pub blend_state: Option<BlendStateDesc>,
    /// Depth state.
    pub depth_state: Option<DepthStateDesc>,
    /// Rasterizer state.
    pub rasterizer_state: Option<RasterizerStateDesc>,
    /// Color attachment formats.
    pub color_formats: Vec<ImageFormat>,
    /// MSAA sample count.
    pub sample_count: SampleCount,
    /// MSAA quality.
    pub sample_quality: u32,
    /// Depth attachment format (`Undefined` for none).
    pub depth_stencil_format: ImageFormat,
    /// Primitive topology.
    pub primitive_topo: PrimitiveTopology,
    /// Usable from indirect command buffers.
    pub support_indirect_command_buffer: bool,
}

impl GraphicsPipelineDesc {
    /// Pipeline drawing triangle lists with default state.
    pub fn new(shader_program: ShaderHandle, root_signature: RootSignatureHandle) -> Self {
        Self {
            shader_program,
            root_signature,
            vertex_layout: None,
            blend_state: None,
            depth_state: None,
            rasterizer_state: None,
            color_formats: Vec::new(),
            sample_count: SampleCount::Count1,
            sample_quality: 0,
            depth_stencil_format: ImageFormat::Undefined,
            primitive_topo: PrimitiveTopology::TriList,
            support_indirect_command_buffer: false,
        }
    }

    /// Number of color attachments.
    pub fn render_target_count(&self) -> usize {
        self.color_formats.len()
    }
}

/// Descriptor for a compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputePipelineDesc {
    /// Shader program.
    pub shader_program: ShaderHandle,
    /// Root signature.
    pub root_signature: RootSignatureHandle,
}

/// Descriptor for creating a pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum PipelineDesc {
    /// Compute pipeline.
    Compute(ComputePipelineDesc),
    /// Graphics pipeline.
    Graphics(GraphicsPipelineDesc),
}

impl PipelineDesc {
    /// Pipeline type of this desc.
    pub fn pipeline_type(&self) -> PipelineType {
        match self {
            Self::Compute(_) => PipelineType::Compute,
            Self::Graphics(_) => PipelineType::Graphics,
        }
    }

    /// Shader used by the pipeline.
    pub fn shader(&self) -> ShaderHandle {
        match self {
            Self::Compute(desc) => desc.shader_program,
            Self::Graphics(desc) => desc.shader_program,
        }
    }

    /// Root signature used by the pipeline.
    pub fn root_signature(&self) -> RootSignatureHandle {
        match self {
            Self::Compute(desc) => desc.root_signature,
            Self::Graphics(desc) => desc.root_signature,
        }
    }
}

/// Descriptor for creating a root signature.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RootSignatureDesc {
    /// Shaders whose resources are merged.
    pub shaders: Vec<ShaderHandle>,
    /// Maximum size of unbounded texture arrays.
    pub max_bindless_textures: u32,
    /// Immutable samplers, by resource name.
    pub static_samplers: Vec<(String, SamplerHandle)>,
    /// Creation flags.
    pub flags: RootSignatureFlags,
}

impl RootSignatureDesc {
    /// Root signature over `shaders` with no static samplers.
    pub fn new(shaders: Vec<ShaderHandle>) -> Self {
        Self {
            shaders,
            ..Default::default()
        }
    }

    /// Add a static sampler bound to the resource called `name`.
    pub fn with_static_sampler(mut self, name: impl Into<String>, sampler: SamplerHandle) -> Self {
        self.static_samplers.push((name.into(), sampler));
        self
    }
}
