//! Enumerations, limits and descriptor structs of the RHI.
//!
//! Enumerations keep their numeric values so they can be passed to a native
//! backend unchanged. Descriptors are plain structs with `Default` impls and
//! `with_*` builders.

mod buffer;
mod common;
mod descriptor;
mod format;
mod indirect;
mod pipeline;
mod queue;
mod sampler;
mod shader;
mod state;
mod swapchain;
mod texture;

pub use buffer::{BufferCreationFlags, BufferDesc, IndexType, ReadRange, ResourceMemoryUsage};
pub use common::{Extent3d, Region3d, ScissorRect, SubresourceDataDesc, Viewport};
pub use descriptor::{
    DescriptorData, DescriptorResources, DescriptorSetDesc, DescriptorUpdateFrequency,
};
pub use format::{FormatCapabilities, ImageFormat};
pub use indirect::{
    CommandSignatureDesc, IndirectArgumentDescriptor, IndirectArgumentType,
    IndirectDispatchArguments, IndirectDrawArguments, IndirectDrawIndexArguments, QueryDesc,
    QueryPoolDesc, QueryType,
};
pub use pipeline::{
    BlendConstant, BlendMode, BlendStateDesc, BlendStateTargets, ComputePipelineDesc, CullMode,
    DepthStateDesc, FillMode, FrontFace, GraphicsPipelineDesc, PipelineDesc, PipelineType,
    PrimitiveTopology, RasterizerStateDesc, RootSignatureDesc, RootSignatureFlags, ShaderSemantic,
    StencilOp, VertexAttrib, VertexAttribRate, VertexLayout,
};
pub use queue::{
    CmdDesc, CmdPoolDesc, FenceStatus, GpuMode, QueueDesc, QueueFlag, QueuePresentDesc,
    QueuePriority, QueueSubmitDesc, QueueType, RendererApi, ShaderTarget,
};
pub use sampler::{AddressMode, CompareMode, FilterType, MipMapMode, SamplerDesc};
pub use shader::{
    BinaryShaderDesc, BinaryShaderStageDesc, DescriptorType, PipelineReflection, ShaderDesc,
    ShaderMacro, ShaderResource, ShaderStage, ShaderStageDesc, ShaderVariable, TextureDimension,
    VertexInput,
};
pub use state::{BufferBarrier, RenderTargetBarrier, ResourceState, TextureBarrier};
pub use swapchain::{SwapChainDesc, WindowHandle};
pub use texture::{
    BindRenderTargetsDesc, ClearValue, LoadActionType, LoadActionsDesc, RenderTargetDesc,
    SampleCount, TextureCreationFlags, TextureDesc,
};

/// Maximum number of color attachments bound at once.
pub const MAX_RENDER_TARGET_ATTACHMENTS: usize = 8;
/// Default swap chain image count.
pub const MAX_SWAPCHAIN_IMAGES: u32 = 3;
/// Maximum command buffers in one submission.
pub const MAX_SUBMIT_CMDS: usize = 20;
/// Maximum semaphores a submission waits on.
pub const MAX_SUBMIT_WAIT_SEMAPHORES: usize = 8;
/// Maximum semaphores a submission signals.
pub const MAX_SUBMIT_SIGNAL_SEMAPHORES: usize = 8;
/// Maximum semaphores a present waits on.
pub const MAX_PRESENT_WAIT_SEMAPHORES: usize = 8;
/// Maximum vertex buffer bindings.
pub const MAX_VERTEX_BINDINGS: usize = 15;
/// Maximum vertex attributes.
pub const MAX_VERTEX_ATTRIBS: usize = 15;
/// Maximum root constant blocks in a root signature.
pub const MAX_ROOT_CONSTANTS_PER_ROOTSIGNATURE: usize = 4;
/// Number of resource loader priority classes.
pub const LOAD_PRIORITY_COUNT: usize = 4;
/// Smallest swap chain image count.
pub const MIN_SWAPCHAIN_IMAGES: u32 = 2;
/// Largest swap chain image count.
pub const MAX_SWAPCHAIN_IMAGE_COUNT: u32 = 4;
